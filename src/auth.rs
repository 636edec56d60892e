//! Transport modes and the credential providers that serve them.
//!
//! A process runs in exactly one [`TransportMode`], chosen at startup. The matching
//! [`AuthProvider`] produces [`Credentials`] (a redacted header set plus optional expiry)
//! for every request. Providers are the only place that sees secret values; everything
//! else handles `Credentials` through redacting formatters.

pub mod cloud;
pub mod local;
pub mod secret;

pub use cloud::*;
pub use local::*;
pub use secret::*;

// self
use crate::{_prelude::*, error::AuthError};

/// Header carrying the controller API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Boxed future returned by [`AuthProvider`] hooks.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + 'a + Send>>;

/// Which reachability path the process uses to talk to the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
	#[default]
	/// Hosted cloud API with a static API key.
	Cloud,
	/// Locally reachable gateway proxy.
	Local,
}
impl TransportMode {
	/// Returns a stable label suitable for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Cloud => "cloud",
			Self::Local => "local",
		}
	}
}
impl Display for TransportMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for TransportMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"cloud" => Ok(Self::Cloud),
			"local" => Ok(Self::Local),
			other => Err(format!("unknown transport mode `{other}`")),
		}
	}
}

/// Resolved auth material for one transport mode.
///
/// Header values are wrapped in [`Secret`] so `Debug` output only lists header names.
#[derive(Clone)]
pub struct Credentials {
	mode: TransportMode,
	headers: Vec<(String, Secret)>,
	expires_at: Option<OffsetDateTime>,
	generation: u64,
}
impl Credentials {
	/// Creates an empty header set for the given mode.
	pub fn new(mode: TransportMode, generation: u64) -> Self {
		Self { mode, headers: Vec::new(), expires_at: None, generation }
	}

	/// Adds a header to the set.
	pub fn with_header(mut self, name: impl Into<String>, value: Secret) -> Self {
		self.headers.push((name.into(), value));

		self
	}

	/// Sets the instant after which the credentials must be refreshed.
	pub fn with_expiry(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Transport mode the credentials belong to.
	pub fn mode(&self) -> TransportMode {
		self.mode
	}

	/// Monotonic counter distinguishing refreshed sets from stale ones.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Expiry instant, if the material expires.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns true when the credentials are expired at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expiry| expiry <= now)
	}

	/// Header names, safe to log.
	pub fn header_names(&self) -> impl Iterator<Item = &str> {
		self.headers.iter().map(|(name, _)| name.as_str())
	}

	/// Header pairs with exposed values. Callers must not log the values.
	pub fn expose_headers(&self) -> impl Iterator<Item = (&str, &str)> {
		self.headers.iter().map(|(name, value)| (name.as_str(), value.expose()))
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("mode", &self.mode)
			.field("headers", &self.header_names().collect::<Vec<_>>())
			.field("expires_at", &self.expires_at)
			.field("generation", &self.generation)
			.finish()
	}
}

/// Produces credentials for the process's transport mode.
///
/// Implementations are selected once at construction. The session hooks let the local
/// proxy variant re-authenticate after a distinguished response code; the gateway calls
/// [`refresh`](AuthProvider::refresh) at most once per operation.
pub trait AuthProvider
where
	Self: Send + Sync,
{
	/// Transport mode served by this provider.
	fn mode(&self) -> TransportMode;

	/// Whether secret material is present. Safe to log.
	fn is_configured(&self) -> bool;

	/// Resolves the header set for the next request.
	fn resolve(&self) -> AuthFuture<'_, Credentials>;

	/// Returns true when the next [`resolve`](AuthProvider::resolve) will contact the
	/// controller to log in.
	///
	/// The default implementation never logs in.
	fn pending_login(&self) -> bool {
		false
	}

	/// Returns true when `status` signals an expired session that
	/// [`refresh`](AuthProvider::refresh) can repair.
	///
	/// The default implementation never reports session expiry.
	fn is_session_expired(&self, _status: u16) -> bool {
		false
	}

	/// Re-authenticates after `stale` was rejected with a session-expired signal.
	///
	/// The default implementation has no session to renew and reports the rejection.
	fn refresh<'a>(&'a self, stale: &'a Credentials) -> AuthFuture<'a, Credentials> {
		Box::pin(async move { Err(AuthError::Rejected { mode: stale.mode(), status: 401 }) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credentials_debug_lists_names_only() {
		let creds = Credentials::new(TransportMode::Cloud, 1)
			.with_header(API_KEY_HEADER, Secret::new("super-secret"));
		let rendered = format!("{creds:?}");

		assert!(rendered.contains(API_KEY_HEADER));
		assert!(!rendered.contains("super-secret"));
	}

	#[test]
	fn expiry_is_inclusive() {
		let now = OffsetDateTime::now_utc();
		let creds = Credentials::new(TransportMode::Local, 1).with_expiry(now);

		assert!(creds.is_expired_at(now));
		assert!(!Credentials::new(TransportMode::Local, 1).is_expired_at(now));
	}

	#[test]
	fn transport_mode_parses_case_insensitively() {
		assert_eq!("LOCAL".parse::<TransportMode>(), Ok(TransportMode::Local));
		assert_eq!(" cloud ".parse::<TransportMode>(), Ok(TransportMode::Cloud));
		assert!("edge".parse::<TransportMode>().is_err());
	}
}
