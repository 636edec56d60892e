//! Bounded exponential backoff for transient controller failures.
//!
//! Only errors that report [`Error::is_retryable`] (429, 5xx, timeouts, network
//! failures) are retried; auth, validation, not-found, and decode failures return on the
//! first attempt. Delay `n` (1-based) is `base * 2^(n-1)` scaled by a jitter factor in
//! `0.8..=1.2`, raised to the server's `Retry-After` hint when one is present, and capped
//! at `max_delay`. With that jitter range consecutive uncapped delays are strictly
//! increasing.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, error::ConfigError, obs, operation::EndpointTier};

const JITTER_LOW: f64 = 0.8;
const JITTER_HIGH: f64 = 1.2;

/// Result of a retried call together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
	/// Final result; on exhaustion this is the last attempt's error.
	pub result: Result<T>,
	/// Attempts made, including the first.
	pub attempts: u32,
}

/// Bounded retry policy with jittered exponential backoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Retries after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry, before jitter.
	pub base_delay: Duration,
	/// Upper bound for any single delay.
	pub max_delay: Duration,
	/// Whether to scale delays by a random factor.
	pub jitter: bool,
}
impl RetryPolicy {
	/// Creates a policy, validating the bounds.
	pub fn new(
		max_retries: u32,
		base_delay: Duration,
		max_delay: Duration,
	) -> Result<Self, ConfigError> {
		let policy = Self { max_retries, base_delay, max_delay, jitter: true };

		policy.validate()?;

		Ok(policy)
	}

	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { max_retries: 0, ..Self::default() }
	}

	/// Disables jitter, making delays deterministic.
	pub fn without_jitter(mut self) -> Self {
		self.jitter = false;

		self
	}

	/// Checks the bounds for consistency.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_delay.is_zero() && self.max_retries > 0 {
			return Err(ConfigError::InvalidRetryBounds { reason: "base delay must be non-zero" });
		}
		if self.max_delay < self.base_delay {
			return Err(ConfigError::InvalidRetryBounds {
				reason: "max delay must not be shorter than the base delay",
			});
		}

		Ok(())
	}

	/// Delay before retry number `retry` (1-based) for a fixed jitter factor.
	pub fn backoff_for(&self, retry: u32, jitter: f64) -> Duration {
		let exponent = retry.saturating_sub(1).min(32) as i32;
		let raw = self.base_delay.as_secs_f64() * 2_f64.powi(exponent) * jitter;
		let capped = raw.min(self.max_delay.as_secs_f64());

		if capped.is_finite() && capped >= 0.0 {
			Duration::from_secs_f64(capped)
		} else {
			self.max_delay
		}
	}

	/// Delay before retry number `retry`, honouring an upstream hint.
	pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
		let jitter =
			if self.jitter { rand::rng().random_range(JITTER_LOW..=JITTER_HIGH) } else { 1.0 };
		let backoff = self.backoff_for(retry, jitter);

		retry_after.map_or(backoff, |hint| hint.max(backoff)).min(self.max_delay)
	}

	/// Runs `attempt` until it succeeds, fails permanently, or the bound is exhausted.
	///
	/// The closure receives the 1-based attempt number.
	pub async fn run<F, Fut, T>(&self, tier: EndpointTier, mut attempt: F) -> Attempted<T>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempts = 0;

		loop {
			attempts += 1;

			let err = match attempt(attempts).await {
				Ok(value) => return Attempted { result: Ok(value), attempts },
				Err(err) => err,
			};

			if !err.is_retryable() || attempts > self.max_retries {
				return Attempted { result: Err(err), attempts };
			}

			let delay = self.delay_for(attempts, err.retry_after());

			obs::record_retry(tier);

			#[cfg(feature = "tracing")]
			tracing::warn!(
				attempt = attempts,
				delay_ms = delay.as_millis() as u64,
				error = %err,
				"Retrying controller request after a transient failure."
			);

			tokio::time::sleep(delay).await;
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(30),
			jitter: true,
		}
	}
}
