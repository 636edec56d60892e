//! Structured results returned to callers for every execution.

// self
use crate::{_prelude::*, error::ErrorKind};

/// Overall status of an [`Outcome`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
	/// The operation produced a payload.
	Ok,
	/// The operation failed.
	Error,
}
impl OutcomeStatus {
	/// Returns a stable label suitable for logs and audit records.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Error => "error",
		}
	}
}

/// Where a successful payload came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
	/// Fresh controller response.
	Network,
	/// Served from the response cache.
	Cache,
	/// Would-be request body of a dry run.
	DryRun,
}

/// Caller-facing failure: a kind discriminator plus a message free of secrets.
#[derive(Clone, Debug, PartialEq, Eq, ThisError, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Failure {
	/// Error discriminator.
	pub kind: ErrorKind,
	/// Human-readable description.
	pub message: String,
	/// HTTP status observed, when the failure came from the controller.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
}
impl From<&Error> for Failure {
	fn from(err: &Error) -> Self {
		Self { kind: err.kind(), message: err.to_string(), status: err.status() }
	}
}

/// Result of executing one operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Outcome {
	status: OutcomeStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	payload: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	source: Option<PayloadSource>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<Failure>,
	attempts: u32,
	#[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
	elapsed: Duration,
}
impl Outcome {
	/// Successful outcome.
	pub fn ok(payload: Value, source: PayloadSource, attempts: u32, elapsed: Duration) -> Self {
		Self {
			status: OutcomeStatus::Ok,
			payload: Some(payload),
			source: Some(source),
			error: None,
			attempts,
			elapsed,
		}
	}

	/// Failed outcome.
	pub fn failed(error: &Error, attempts: u32, elapsed: Duration) -> Self {
		Self {
			status: OutcomeStatus::Error,
			payload: None,
			source: None,
			error: Some(error.into()),
			attempts,
			elapsed,
		}
	}

	/// Overall status.
	pub fn status(&self) -> OutcomeStatus {
		self.status
	}

	/// Whether the operation succeeded.
	pub fn is_ok(&self) -> bool {
		self.status == OutcomeStatus::Ok
	}

	/// Successful payload.
	pub fn payload(&self) -> Option<&Value> {
		self.payload.as_ref()
	}

	/// Origin of the successful payload.
	pub fn source(&self) -> Option<PayloadSource> {
		self.source
	}

	/// Failure details.
	pub fn error(&self) -> Option<&Failure> {
		self.error.as_ref()
	}

	/// Failure discriminator, if the operation failed.
	pub fn error_kind(&self) -> Option<ErrorKind> {
		self.error.as_ref().map(|failure| failure.kind)
	}

	/// Network attempts made. Zero for cache hits, dry runs, and local rejections.
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Wall time spent, including limiter waits and backoff sleeps.
	pub fn elapsed(&self) -> Duration {
		self.elapsed
	}

	/// Converts into the payload or the failure.
	pub fn into_result(self) -> Result<Value, Failure> {
		match (self.payload, self.error) {
			(_, Some(failure)) => Err(failure),
			(Some(payload), None) => Ok(payload),
			(None, None) => Ok(Value::Null),
		}
	}
}

fn serialize_millis<S>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_u64(elapsed.as_millis().min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::error::ValidationError;

	#[test]
	fn failures_serialize_with_a_kind_discriminator() {
		let err: Error =
			ValidationError::ConfirmationRequired { operation: "restart_device".into() }.into();
		let outcome = Outcome::failed(&err, 0, Duration::from_millis(3));
		let rendered = serde_json::to_value(&outcome).expect("Outcome should serialize.");

		assert_eq!(rendered["status"], json!("error"));
		assert_eq!(rendered["error"]["kind"], json!("confirmation_required"));
		assert_eq!(rendered["attempts"], json!(0));
		assert_eq!(rendered["elapsed_ms"], json!(3));
		assert!(rendered.get("payload").is_none());
	}

	#[test]
	fn ok_outcome_round_trips_into_result() {
		let outcome = Outcome::ok(json!({ "data": [] }), PayloadSource::Cache, 0, Duration::ZERO);

		assert!(outcome.is_ok());
		assert_eq!(outcome.source(), Some(PayloadSource::Cache));
		assert_eq!(outcome.into_result(), Ok(json!({ "data": [] })));
	}
}
