//! Construction-time configuration for the gateway.
//!
//! Values are injected once and never re-read. [`GatewayConfig::builder`] validates the
//! combination; [`GatewayConfig::from_env`] reads the `UNIFI_*` variables documented on
//! [`env`].

pub mod env;

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	auth::{Secret, TransportMode},
	cache::{CacheTtls, ResponseCache},
	error::ConfigError,
	limiter::{EARLY_ACCESS_BUDGET, GENERAL_BUDGET, RateBudget, RateLimiter},
	operation::{EndpointTier, ResourceClass},
	retry::RetryPolicy,
};

/// Hosted cloud API base URL.
pub const DEFAULT_CLOUD_URL: &str = "https://api.ui.com";
/// Default HTTPS port of a local gateway.
pub const DEFAULT_LOCAL_PORT: u16 = 443;
/// Default per-attempt timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default audit log location.
pub const DEFAULT_AUDIT_LOG_PATH: &str = "audit.log";

/// Locally reachable gateway endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEndpoint {
	/// Host name or address.
	pub host: Option<String>,
	/// HTTPS port.
	pub port: u16,
	/// Whether to verify the gateway's TLS certificate.
	pub verify_tls: bool,
	/// Session login path, when the gateway requires a session header.
	pub session_path: Option<String>,
}
impl Default for LocalEndpoint {
	fn default() -> Self {
		Self { host: None, port: DEFAULT_LOCAL_PORT, verify_tls: true, session_path: None }
	}
}

/// Validated gateway configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Active transport mode.
	pub mode: TransportMode,
	/// Controller API key.
	pub api_key: Secret,
	/// Cloud API base URL.
	pub cloud_url: Url,
	/// Local gateway endpoint.
	pub local: LocalEndpoint,
	/// Budget of the early-access tier.
	pub early_access_budget: RateBudget,
	/// Budget of the general tier.
	pub general_budget: RateBudget,
	/// Retry bounds.
	pub retry: RetryPolicy,
	/// Per-attempt timeout.
	pub request_timeout: Duration,
	/// Whether reads are cached.
	pub cache_enabled: bool,
	/// Per-class TTL overrides on top of the defaults.
	pub cache_ttls: BTreeMap<ResourceClass, Duration>,
	/// JSON-lines audit log location.
	pub audit_log_path: PathBuf,
}
impl GatewayConfig {
	/// Starts a builder for the given API key.
	pub fn builder(api_key: Secret) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(api_key)
	}

	/// Controller base URL for the active mode.
	pub fn base_url(&self) -> Result<Url, ConfigError> {
		match self.mode {
			TransportMode::Cloud => Ok(self.cloud_url.clone()),
			TransportMode::Local => {
				let host = self.local.host.as_deref().ok_or(ConfigError::MissingLocalHost)?;

				Url::parse(&format!("https://{host}:{}", self.local.port))
					.map_err(|source| ConfigError::InvalidUrl { source })
			},
		}
	}

	/// Whether the transport should skip TLS verification.
	pub fn accept_invalid_certs(&self) -> bool {
		self.mode == TransportMode::Local && !self.local.verify_tls
	}

	/// Builds the rate limiter described by the budgets.
	pub fn rate_limiter(&self) -> Result<RateLimiter, ConfigError> {
		RateLimiter::new(self.early_access_budget, self.general_budget)
	}

	/// Builds the response cache described by the cache settings.
	pub fn response_cache(&self) -> ResponseCache {
		if !self.cache_enabled {
			return ResponseCache::disabled();
		}

		let ttls = self
			.cache_ttls
			.iter()
			.fold(CacheTtls::default(), |ttls, (class, ttl)| ttls.with(*class, *ttl));

		ResponseCache::new(ttls)
	}

	/// Re-checks every constraint the builder enforces.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.api_key.is_blank() {
			return Err(ConfigError::MissingApiKey);
		}
		if self.mode == TransportMode::Local {
			if self.local.host.as_deref().is_none_or(|host| host.trim().is_empty()) {
				return Err(ConfigError::MissingLocalHost);
			}
			if self.local.port == 0 {
				return Err(ConfigError::InvalidPort { port: 0 });
			}

			self.base_url()?;
		}

		self.early_access_budget.validate(EndpointTier::EarlyAccess)?;
		self.general_budget.validate(EndpointTier::General)?;
		self.retry.validate()?;

		if self.request_timeout.is_zero() {
			return Err(ConfigError::InvalidValue { name: "request_timeout" });
		}

		Ok(())
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	mode: TransportMode,
	api_key: Secret,
	cloud_url: Option<Url>,
	local: LocalEndpoint,
	local_port: u32,
	early_access_budget: RateBudget,
	general_budget: RateBudget,
	retry: RetryPolicy,
	request_timeout: Duration,
	cache_enabled: bool,
	cache_ttls: BTreeMap<ResourceClass, Duration>,
	audit_log_path: PathBuf,
}
impl GatewayConfigBuilder {
	fn new(api_key: Secret) -> Self {
		Self {
			mode: TransportMode::Cloud,
			api_key,
			cloud_url: None,
			local: LocalEndpoint::default(),
			local_port: DEFAULT_LOCAL_PORT.into(),
			early_access_budget: EARLY_ACCESS_BUDGET,
			general_budget: GENERAL_BUDGET,
			retry: RetryPolicy::default(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			cache_enabled: true,
			cache_ttls: BTreeMap::new(),
			audit_log_path: DEFAULT_AUDIT_LOG_PATH.into(),
		}
	}

	/// Selects the transport mode.
	pub fn mode(mut self, mode: TransportMode) -> Self {
		self.mode = mode;

		self
	}

	/// Overrides the cloud API base URL.
	pub fn cloud_url(mut self, url: Url) -> Self {
		self.cloud_url = Some(url);

		self
	}

	/// Sets the local gateway host.
	pub fn local_host(mut self, host: impl Into<String>) -> Self {
		self.local.host = Some(host.into());

		self
	}

	/// Sets the local gateway port; validated on build.
	pub fn local_port(mut self, port: u32) -> Self {
		self.local_port = port;

		self
	}

	/// Enables or disables TLS verification for the local gateway.
	pub fn verify_local_tls(mut self, verify: bool) -> Self {
		self.local.verify_tls = verify;

		self
	}

	/// Enables session login against the given path on the local gateway.
	pub fn local_session_path(mut self, path: impl Into<String>) -> Self {
		self.local.session_path = Some(path.into());

		self
	}

	/// Sets the early-access tier budget.
	pub fn early_access_budget(mut self, budget: RateBudget) -> Self {
		self.early_access_budget = budget;

		self
	}

	/// Sets the general tier budget.
	pub fn general_budget(mut self, budget: RateBudget) -> Self {
		self.general_budget = budget;

		self
	}

	/// Sets the retry bounds.
	pub fn retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Sets the per-attempt timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Enables or disables the read cache.
	pub fn cache_enabled(mut self, enabled: bool) -> Self {
		self.cache_enabled = enabled;

		self
	}

	/// Overrides the TTL of one resource class.
	pub fn cache_ttl(mut self, class: ResourceClass, ttl: Duration) -> Self {
		self.cache_ttls.insert(class, ttl);

		self
	}

	/// Sets the audit log location.
	pub fn audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.audit_log_path = path.into();

		self
	}

	/// Consumes the builder and validates the configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		let port = u16::try_from(self.local_port)
			.ok()
			.filter(|port| *port != 0)
			.ok_or(ConfigError::InvalidPort { port: self.local_port })?;
		let cloud_url = match self.cloud_url {
			Some(url) => url,
			None =>
				Url::parse(DEFAULT_CLOUD_URL).map_err(|source| ConfigError::InvalidUrl { source })?,
		};
		let config = GatewayConfig {
			mode: self.mode,
			api_key: self.api_key,
			cloud_url,
			local: LocalEndpoint { port, ..self.local },
			early_access_budget: self.early_access_budget,
			general_budget: self.general_budget,
			retry: self.retry,
			request_timeout: self.request_timeout,
			cache_enabled: self.cache_enabled,
			cache_ttls: self.cache_ttls,
			audit_log_path: self.audit_log_path,
		};

		config.validate()?;

		Ok(config)
	}
}
