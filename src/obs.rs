//! Optional observability helpers for gateway calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `unifi_gateway.call` with the `kind`
//!   (read, mutation, dry run), `operation` and `tier` fields. The span's `outcome` and
//!   `attempts` fields are filled in when the call returns. Debug and warn events cover
//!   retries, limiter waits, cache hits and audit writes.
//! - Enable `metrics` to increment `unifi_gateway_call_total` (labeled by `kind` and
//!   `outcome`), `unifi_gateway_retry_total` and `unifi_gateway_rate_limit_wait_total`
//!   (both labeled by `tier`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Call kinds observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Read-only operation executed through the gateway.
	Read,
	/// Confirmed mutation executed through the safety gate.
	Mutation,
	/// Mutation previewed without a network call.
	DryRun,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Read => "read",
			CallKind::Mutation => "mutation",
			CallKind::DryRun => "dry_run",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a gateway call.
	Attempt,
	/// Read served from the response cache.
	CacheHit,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::CacheHit => "cache_hit",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
