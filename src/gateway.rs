//! Request execution: cache, rate limiter, credentials, retry, and status mapping.
//!
//! [`Gateway::execute`] runs one [`Operation`] end to end:
//!
//! 1. Reads with a fresh cache entry return immediately, touching neither the limiter nor
//!    the network.
//! 2. Every network attempt first acquires a limiter slot for the operation's
//!    `(mode, tier)` window, then resolves credentials from the [`AuthProvider`].
//! 3. Attempts run under the [`RetryPolicy`]; HTTP 429 responses also tighten the limiter.
//! 4. A session-expired answer in local mode triggers one credential refresh and an
//!    immediate resend inside the same attempt. Session logins draw their own slot from
//!    the general tier and are bounded by the request timeout.
//! 5. Successful reads populate the cache; successful mutations invalidate it.
//!
//! Failures never escape as `Err`; callers receive an [`Outcome`] with a kind discriminator.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{AuthFuture, AuthProvider, Credentials},
	cache::ResponseCache,
	config::DEFAULT_REQUEST_TIMEOUT,
	error::{TransientError, ValidationError},
	http::{self, ControllerHttpClient, ControllerRequest, ControllerResponse},
	limiter::RateLimiter,
	obs::{self, CallKind, CallOutcome, CallSpan},
	operation::{EndpointTier, Operation},
	outcome::{Outcome, PayloadSource},
	retry::RetryPolicy,
};
#[cfg(feature = "reqwest")]
use crate::{
	auth::{CloudAuth, LocalAuth, TransportMode},
	config::GatewayConfig,
	error::ConfigError,
	http::ReqwestHttpClient,
};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestHttpClient>;

/// Tier charged for session login round-trips.
pub const SESSION_LOGIN_TIER: EndpointTier = EndpointTier::General;

/// How a successful mutation invalidates cached reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationScope {
	/// Drop every cached read of the mutated resource class, plus any read whose path
	/// overlaps the mutated path.
	#[default]
	Resource,
	/// Drop cached reads whose path overlaps the mutated path.
	PathPrefix,
}

/// Executes operations against one controller in one transport mode.
pub struct Gateway<C>
where
	C: ?Sized + ControllerHttpClient,
{
	/// HTTP transport used for every controller request.
	pub http_client: Arc<C>,
	/// Credential provider for the active transport mode.
	pub auth: Arc<dyn AuthProvider>,
	/// Shared sliding-window limiter.
	pub limiter: Arc<RateLimiter>,
	/// Shared read cache.
	pub cache: Arc<ResponseCache>,
	/// Retry bounds applied to every operation.
	pub retry: RetryPolicy,
	/// Controller base URL.
	pub base_url: Url,
	/// Per-attempt timeout.
	pub request_timeout: Duration,
	/// Cache invalidation strategy after mutations.
	pub invalidation: InvalidationScope,
}
impl<C> Gateway<C>
where
	C: ?Sized + ControllerHttpClient,
{
	/// Creates a gateway with default limiter budgets, cache TTLs and retry bounds.
	pub fn with_http_client(
		base_url: Url,
		auth: Arc<dyn AuthProvider>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			auth,
			limiter: Default::default(),
			cache: Default::default(),
			retry: RetryPolicy::default(),
			base_url,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			invalidation: InvalidationScope::default(),
		}
	}

	/// Shares an existing limiter.
	pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
		self.limiter = limiter;

		self
	}

	/// Shares an existing cache.
	pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
		self.cache = cache;

		self
	}

	/// Replaces the retry bounds.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Replaces the per-attempt timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Replaces the invalidation strategy.
	pub fn with_invalidation(mut self, scope: InvalidationScope) -> Self {
		self.invalidation = scope;

		self
	}

	/// Executes an operation and reports the result as an [`Outcome`].
	pub async fn execute(&self, op: &Operation) -> Outcome {
		let kind = if op.is_mutating() { CallKind::Mutation } else { CallKind::Read };
		CallSpan::new(kind, op).run(self.execute_inner(op, kind)).await
	}

	async fn execute_inner(&self, op: &Operation, kind: CallKind) -> Outcome {
		let started = Instant::now();

		obs::record_call_outcome(kind, CallOutcome::Attempt);

		if let Some(entry) = op.fingerprint().and_then(|key| self.cache.get(&key)) {
			obs::record_call_outcome(kind, CallOutcome::CacheHit);

			#[cfg(feature = "tracing")]
			tracing::debug!(
				path = op.path(),
				age_ms = entry.age_at(started).as_millis() as u64,
				"Serving read from cache."
			);

			return Outcome::ok(entry.payload, PayloadSource::Cache, 0, started.elapsed());
		}

		let refreshed = AtomicBool::new(false);
		let attempted = self.retry.run(op.tier(), |_| self.attempt(op, &refreshed)).await;

		match attempted.result {
			Ok(payload) => {
				if op.is_mutating() {
					self.invalidate_after(op);
				} else {
					self.cache.put(op, payload.clone());
				}

				obs::record_call_outcome(kind, CallOutcome::Success);

				Outcome::ok(payload, PayloadSource::Network, attempted.attempts, started.elapsed())
			},
			Err(err) => {
				obs::record_call_outcome(kind, CallOutcome::Failure);

				#[cfg(feature = "tracing")]
				tracing::warn!(
					path = op.path(),
					attempts = attempted.attempts,
					error_kind = err.kind().as_str(),
					error = %err,
					"Controller operation failed."
				);

				Outcome::failed(&err, attempted.attempts, started.elapsed())
			},
		}
	}

	async fn attempt(&self, op: &Operation, refreshed: &AtomicBool) -> Result<Value> {
		let mode = self.auth.mode();

		self.limiter.acquire(mode, op.tier()).await;

		if self.auth.pending_login() {
			self.limiter.acquire(mode, SESSION_LOGIN_TIER).await;
		}

		let creds = self.authenticate(self.auth.resolve()).await?;
		let response = self.send_once(op, &creds).await?;

		// One session refresh per operation; a second rejection is terminal.
		if self.auth.is_session_expired(response.status) && !refreshed.swap(true, Ordering::SeqCst)
		{
			#[cfg(feature = "tracing")]
			tracing::debug!(status = response.status, "Local session expired; re-authenticating.");

			self.limiter.acquire(mode, SESSION_LOGIN_TIER).await;

			let creds = self.authenticate(self.auth.refresh(&creds)).await?;

			self.limiter.acquire(mode, op.tier()).await;

			let response = self.send_once(op, &creds).await?;

			return self.decode(op, &response);
		}

		self.decode(op, &response)
	}

	async fn authenticate(&self, pending: AuthFuture<'_, Credentials>) -> Result<Credentials> {
		let creds = tokio::time::timeout(self.request_timeout, pending)
			.await
			.map_err(|_| TransientError::Timeout)??;

		Ok(creds)
	}

	async fn send_once(&self, op: &Operation, creds: &Credentials) -> Result<ControllerResponse> {
		let url = controller_url(&self.base_url, op)?;
		let mut request =
			ControllerRequest::new(op.method(), url).with_timeout(self.request_timeout);

		for (name, value) in creds.expose_headers() {
			request = request.with_header(name, value);
		}
		if let Some(body) = op.body() {
			request = request.with_json(body)?;
		}

		tokio::time::timeout(self.request_timeout, self.http_client.send(request))
			.await
			.map_err(|_| TransientError::Timeout)?
	}

	fn decode(&self, op: &Operation, response: &ControllerResponse) -> Result<Value> {
		let result = http::decode_response(self.auth.mode(), op.path(), response);

		if let Some(err) = result.as_ref().err().filter(|err| err.is_throttled()) {
			self.limiter.penalize(self.auth.mode(), op.tier(), err.retry_after());
		}

		result
	}

	fn invalidate_after(&self, op: &Operation) {
		let removed = match self.invalidation {
			InvalidationScope::Resource => self.cache.invalidate_mutated(op.resource(), op.path()),
			InvalidationScope::PathPrefix => self.cache.invalidate_overlapping(op.path()),
		};

		#[cfg(feature = "tracing")]
		tracing::debug!(
			resource = op.resource().as_str(),
			path = op.path(),
			removed,
			"Invalidated cached reads after mutation."
		);
		#[cfg(not(feature = "tracing"))]
		let _ = removed;
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient> {
	/// Wires a reqwest-backed gateway from validated configuration.
	pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
		let http = Arc::new(ReqwestHttpClient::build(config.accept_invalid_certs())?);
		let base_url = config.base_url()?;
		let auth: Arc<dyn AuthProvider> = match config.mode {
			TransportMode::Cloud => Arc::new(CloudAuth::new(config.api_key.clone())),
			TransportMode::Local => {
				let mut auth = LocalAuth::new(config.api_key.clone());

				if let Some(path) = config.local.session_path.as_deref() {
					let login_url = join_path(&base_url, path)
						.map_err(|source| ConfigError::InvalidUrl { source })?;

					auth = auth
						.with_session_login(http.clone(), login_url)
						.session_timeout(config.request_timeout);
				}

				Arc::new(auth)
			},
		};

		Ok(Self::with_http_client(base_url, auth, http)
			.with_limiter(Arc::new(config.rate_limiter()?))
			.with_cache(Arc::new(config.response_cache()))
			.with_retry(config.retry.clone())
			.with_request_timeout(config.request_timeout))
	}
}
impl<C> Clone for Gateway<C>
where
	C: ?Sized + ControllerHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			auth: self.auth.clone(),
			limiter: self.limiter.clone(),
			cache: self.cache.clone(),
			retry: self.retry.clone(),
			base_url: self.base_url.clone(),
			request_timeout: self.request_timeout,
			invalidation: self.invalidation,
		}
	}
}
impl<C> Debug for Gateway<C>
where
	C: ?Sized + ControllerHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("mode", &self.auth.mode())
			.field("auth_configured", &self.auth.is_configured())
			.field("base_url", &self.base_url.as_str())
			.field("retry", &self.retry)
			.field("request_timeout", &self.request_timeout)
			.field("invalidation", &self.invalidation)
			.finish()
	}
}

/// Absolute request URL: base URL, operation path, and sorted query parameters.
pub fn controller_url(base_url: &Url, op: &Operation) -> Result<Url> {
	let mut url = join_path(base_url, op.path()).map_err(|e| ValidationError::InvalidOperation {
		reason: format!("path `{}` does not form a valid URL: {e}", op.path()),
	})?;

	if !op.params().is_empty() {
		url.query_pairs_mut().extend_pairs(op.params());
	}

	Ok(url)
}

fn join_path(base_url: &Url, path: &str) -> Result<Url, url::ParseError> {
	let base = base_url.as_str().trim_end_matches('/');
	let path = path.trim_start_matches('/');

	Url::parse(&format!("{base}/{path}"))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn urls_keep_base_path_and_sort_params() {
		let base = Url::parse("https://192.168.1.1:8443/proxy/network/")
			.expect("Base URL fixture should parse.");
		let op = Operation::read("list_clients", "/ea/sites/default/sta")
			.param("offset", 0)
			.param("limit", 50)
			.build()
			.expect("Read fixture should build.");
		let url = controller_url(&base, &op).expect("URL should build.");

		assert_eq!(
			url.as_str(),
			"https://192.168.1.1:8443/proxy/network/ea/sites/default/sta?limit=50&offset=0"
		);
	}
}
