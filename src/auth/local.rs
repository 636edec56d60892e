//! Local gateway proxy credentials with optional session login.
//!
//! Plain local mode behaves like cloud mode: a static API key header. When a session
//! login endpoint is configured, the provider exchanges the key for a session header
//! (for example a CSRF token) and renews it when the controller answers with the
//! configured session-expired status. Renewals are singleflight: concurrent callers that
//! observed the same stale session share one login round-trip. Every login is bounded by
//! the session timeout, so a hung endpoint cannot hold the renewal guard indefinitely.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{API_KEY_HEADER, AuthFuture, AuthProvider, Credentials, Secret, TransportMode},
	config::DEFAULT_REQUEST_TIMEOUT,
	error::AuthError,
	http::{ControllerHttpClient, ControllerRequest},
	operation::Method,
};

/// Default header carrying the local session token.
pub const DEFAULT_SESSION_HEADER: &str = "X-CSRF-Token";
/// Default status signalling an expired local session.
pub const DEFAULT_SESSION_EXPIRED_STATUS: u16 = 401;

/// Credential provider for a locally reachable gateway.
pub struct LocalAuth {
	api_key: Option<Secret>,
	session: Option<SessionLogin>,
	session_expired_status: u16,
	current: RwLock<Option<Credentials>>,
	refresh_guard: AsyncMutex<()>,
	generation: AtomicU64,
}
impl LocalAuth {
	/// Creates a provider that sends the API key on every request.
	pub fn new(api_key: Secret) -> Self {
		Self {
			api_key: Some(api_key).filter(|key| !key.is_blank()),
			session: None,
			session_expired_status: DEFAULT_SESSION_EXPIRED_STATUS,
			current: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			generation: AtomicU64::new(0),
		}
	}

	/// Enables session login against `login_url` through the given transport.
	pub fn with_session_login(
		mut self,
		http: Arc<dyn ControllerHttpClient>,
		login_url: Url,
	) -> Self {
		self.session = Some(SessionLogin {
			http,
			login_url,
			header: DEFAULT_SESSION_HEADER.into(),
			ttl: None,
			timeout: DEFAULT_REQUEST_TIMEOUT,
		});

		self
	}

	/// Overrides the response header that carries the session token.
	pub fn session_header(mut self, name: impl Into<String>) -> Self {
		if let Some(session) = self.session.as_mut() {
			session.header = name.into();
		}

		self
	}

	/// Treats sessions as expired after `ttl`, forcing a login before the next request.
	pub fn session_ttl(mut self, ttl: Duration) -> Self {
		if let Some(session) = self.session.as_mut() {
			session.ttl = Some(ttl);
		}

		self
	}

	/// Bounds each login round-trip.
	pub fn session_timeout(mut self, timeout: Duration) -> Self {
		if let Some(session) = self.session.as_mut() {
			session.timeout = timeout;
		}

		self
	}

	/// Overrides the status code that signals an expired session.
	pub fn session_expired_status(mut self, status: u16) -> Self {
		self.session_expired_status = status;

		self
	}

	/// Whether a session login endpoint is configured.
	pub fn uses_session(&self) -> bool {
		self.session.is_some()
	}

	fn api_key(&self) -> Result<Secret, AuthError> {
		let key =
			self.api_key.clone().ok_or(AuthError::MissingSecret { mode: TransportMode::Local })?;

		if !key.is_header_safe() {
			return Err(AuthError::InvalidHeader { name: API_KEY_HEADER });
		}

		Ok(key)
	}

	fn cached_session(&self) -> Option<Credentials> {
		let now = OffsetDateTime::now_utc();

		self.current.read().as_ref().filter(|creds| !creds.is_expired_at(now)).cloned()
	}

	async fn renew(&self, stale_generation: Option<u64>) -> Result<Credentials, AuthError> {
		let _guard = self.refresh_guard.lock().await;

		// Another caller may have renewed while this one waited on the guard.
		let fresh = self
			.cached_session()
			.filter(|current| stale_generation.is_none_or(|stale| current.generation() > stale));

		if let Some(current) = fresh {
			return Ok(current);
		}

		let key = self.api_key()?;
		let Some(session) = self.session.as_ref() else {
			return Ok(Credentials::new(TransportMode::Local, 0).with_header(API_KEY_HEADER, key));
		};
		let token = session.login(&key).await?;
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let mut creds = Credentials::new(TransportMode::Local, generation)
			.with_header(API_KEY_HEADER, key)
			.with_header(session.header.clone(), token);

		if let Some(ttl) = session.ttl {
			creds = creds.with_expiry(OffsetDateTime::now_utc() + ttl);
		}

		*self.current.write() = Some(creds.clone());

		#[cfg(feature = "tracing")]
		tracing::debug!(generation, "Local session renewed.");

		Ok(creds)
	}
}
impl AuthProvider for LocalAuth {
	fn mode(&self) -> TransportMode {
		TransportMode::Local
	}

	fn is_configured(&self) -> bool {
		self.api_key.is_some()
	}

	fn resolve(&self) -> AuthFuture<'_, Credentials> {
		Box::pin(async move {
			if self.session.is_none() {
				return Ok(Credentials::new(TransportMode::Local, 0)
					.with_header(API_KEY_HEADER, self.api_key()?));
			}
			if let Some(current) = self.cached_session() {
				return Ok(current);
			}

			self.renew(None).await
		})
	}

	fn pending_login(&self) -> bool {
		self.session.is_some() && self.cached_session().is_none()
	}

	fn is_session_expired(&self, status: u16) -> bool {
		self.session.is_some() && status == self.session_expired_status
	}

	fn refresh<'a>(&'a self, stale: &'a Credentials) -> AuthFuture<'a, Credentials> {
		Box::pin(async move {
			if self.session.is_none() {
				return Err(AuthError::Rejected {
					mode: TransportMode::Local,
					status: self.session_expired_status,
				});
			}

			self.renew(Some(stale.generation())).await
		})
	}
}
impl Debug for LocalAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LocalAuth")
			.field("configured", &self.is_configured())
			.field("session", &self.session)
			.field("session_expired_status", &self.session_expired_status)
			.finish()
	}
}

struct SessionLogin {
	http: Arc<dyn ControllerHttpClient>,
	login_url: Url,
	header: String,
	ttl: Option<Duration>,
	timeout: Duration,
}
impl SessionLogin {
	async fn login(&self, key: &Secret) -> Result<Secret, AuthError> {
		let request = ControllerRequest::new(Method::Post, self.login_url.clone())
			.with_timeout(self.timeout)
			.with_header(API_KEY_HEADER, key.expose());
		let response = tokio::time::timeout(self.timeout, self.http.send(request))
			.await
			.map_err(|_| AuthError::SessionLogin {
				reason: format!("login endpoint did not answer within {:?}", self.timeout),
			})?
			.map_err(|e| AuthError::SessionLogin { reason: e.to_string() })?;

		if !response.is_success() {
			return Err(AuthError::SessionLogin {
				reason: format!("login endpoint answered HTTP {}", response.status),
			});
		}

		let token = response
			.header(&self.header)
			.map(Secret::new)
			.filter(|token| !token.is_blank())
			.ok_or_else(|| AuthError::SessionLogin {
				reason: format!("login response carried no `{}` header", self.header),
			})?;

		if !token.is_header_safe() {
			return Err(AuthError::SessionLogin {
				reason: format!("`{}` header is not a valid header value", self.header),
			});
		}

		Ok(token)
	}
}
impl Debug for SessionLogin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionLogin")
			.field("login_url", &self.login_url.as_str())
			.field("header", &self.header)
			.field("ttl", &self.ttl)
			.field("timeout", &self.timeout)
			.finish()
	}
}
