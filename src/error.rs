//! Gateway-level error types shared by the limiter, retry loop, cache, and safety gate.

// self
use crate::{_prelude::*, audit::AuditError, auth::TransportMode, operation::IdentifierError};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential material is missing or the controller rejected it.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// The operation was rejected locally or by the controller as malformed.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Temporary upstream failure; retried up to the policy bound.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Audit trail could not be written or read.
	#[error("{0}")]
	Audit(
		#[from]
		#[source]
		AuditError,
	),

	/// Controller reported that the addressed resource does not exist.
	#[error("Resource not found: {resource}.")]
	NotFound {
		/// Request path that produced the 404.
		resource: String,
	},
	/// Controller responded with a success status but an unparsable payload.
	#[error("Controller returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: Option<u16>,
	},
	/// Caller abandoned the operation before it completed.
	#[error("Operation was cancelled before completion.")]
	Cancelled,
}
impl Error {
	/// Flat discriminator used by [`Outcome`](crate::outcome::Outcome) failures.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Auth(_) => ErrorKind::Auth,
			Self::Validation(ValidationError::ConfirmationRequired { .. }) =>
				ErrorKind::ConfirmationRequired,
			Self::Validation(_) => ErrorKind::Validation,
			Self::Transient(_) | Self::Transport(_) => ErrorKind::Transient,
			Self::Config(_) => ErrorKind::Config,
			Self::Audit(_) => ErrorKind::Audit,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::Decode { .. } => ErrorKind::Decode,
			Self::Cancelled => ErrorKind::Cancelled,
		}
	}

	/// Returns true when the retry policy may attempt the request again.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}

	/// HTTP status code attached to the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Auth(AuthError::Rejected { status, .. }) => Some(*status),
			Self::Validation(ValidationError::Remote { status, .. }) => Some(*status),
			Self::Transient(TransientError::Status { status, .. }) => Some(*status),
			Self::Decode { status, .. } => *status,
			Self::NotFound { .. } => Some(404),
			_ => None,
		}
	}

	/// Server-provided retry hint, when the failure carried one.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::Status { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}

	/// Returns true when the controller answered with HTTP 429.
	pub fn is_throttled(&self) -> bool {
		matches!(self, Self::Transient(TransientError::Status { status: 429, .. }))
	}
}

/// Serializable error discriminator surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Credentials missing, invalid, or expired.
	Auth,
	/// Malformed operation or controller-side 4xx rejection.
	Validation,
	/// Mutation submitted without `confirm=true`.
	ConfirmationRequired,
	/// Addressed resource is absent.
	NotFound,
	/// Network, 429, or 5xx failure that exhausted the retry bound.
	Transient,
	/// Success response with an unparsable body.
	Decode,
	/// Local configuration problem.
	Config,
	/// Audit trail failure.
	Audit,
	/// Operation abandoned by the caller.
	Cancelled,
}
impl ErrorKind {
	/// Returns a stable label suitable for logs and serialized outcomes.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Auth => "auth",
			Self::Validation => "validation",
			Self::ConfirmationRequired => "confirmation_required",
			Self::NotFound => "not_found",
			Self::Transient => "transient",
			Self::Decode => "decode",
			Self::Config => "config",
			Self::Audit => "audit",
			Self::Cancelled => "cancelled",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Credential failures. Messages never carry secret values.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// No API key was configured for the active transport mode.
	#[error("No API key is configured for {mode} mode.")]
	MissingSecret {
		/// Transport mode missing its secret.
		mode: TransportMode,
	},
	/// Controller answered 401/403.
	#[error("Controller rejected the {mode} credentials (HTTP {status}).")]
	Rejected {
		/// Transport mode whose credentials were rejected.
		mode: TransportMode,
		/// HTTP status returned by the controller.
		status: u16,
	},
	/// Local session login did not yield a session.
	#[error("Local session login failed: {reason}.")]
	SessionLogin {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Secret material cannot be encoded as an HTTP header.
	#[error("Credential header `{name}` contains characters that are not valid in HTTP headers.")]
	InvalidHeader {
		/// Header name whose value was rejected.
		name: &'static str,
	},
}

/// Local and controller-side validation failures. None of these are retried.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// `dry_run=true` and `confirm=true` were supplied together.
	#[error("Operation `{operation}` sets both dry_run and confirm; send only one of them.")]
	ContradictoryFlags {
		/// Operation kind label.
		operation: String,
	},
	/// A mutation was submitted without `confirm=true`.
	#[error("Operation `{operation}` mutates controller state and requires confirm=true.")]
	ConfirmationRequired {
		/// Operation kind label.
		operation: String,
	},
	/// A read-only operation was routed through the safety gate.
	#[error("Operation `{operation}` is not a mutation and cannot pass through the safety gate.")]
	NotAMutation {
		/// Operation kind label.
		operation: String,
	},
	/// The operation itself is malformed (bad path, missing body, ...).
	#[error("Operation is malformed: {reason}.")]
	InvalidOperation {
		/// Human-readable reason.
		reason: String,
	},
	/// A path identifier failed hygiene checks.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
	/// Controller rejected the request with a non-retryable 4xx.
	#[error("Controller rejected the request (HTTP {status}): {message}.")]
	Remote {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		message: String,
	},
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Controller returned 429 or 5xx.
	#[error("Controller returned HTTP {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The attempt exceeded the per-request timeout.
	#[error("Request to the controller timed out.")]
	Timeout,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the controller.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the controller.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

/// Configuration and construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// `UNIFI_API_KEY` (or the builder equivalent) was not supplied.
	#[error("An API key is required.")]
	MissingApiKey,
	/// Local mode was selected without a host.
	#[error("A local host is required when the transport mode is local.")]
	MissingLocalHost,
	/// Port outside 1..=65535.
	#[error("Port must be between 1 and 65535, got {port}.")]
	InvalidPort {
		/// Rejected port number.
		port: u32,
	},
	/// A base URL failed to parse.
	#[error("Controller URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A rate budget or window was zero.
	#[error("The {tier} rate budget must allow at least one request in a non-zero window.")]
	EmptyBudget {
		/// Tier label whose budget was rejected.
		tier: &'static str,
	},
	/// Retry bounds are inconsistent.
	#[error("Retry bounds are invalid: {reason}.")]
	InvalidRetryBounds {
		/// Human-readable reason.
		reason: &'static str,
	},
	/// An environment value could not be parsed.
	#[error("Environment variable {name} has an invalid value.")]
	InvalidValue {
		/// Variable name.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
