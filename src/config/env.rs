//! Environment variable loading.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `UNIFI_API_KEY` | API key (required) | |
//! | `UNIFI_API_TYPE` | `cloud` or `local` | `cloud` |
//! | `UNIFI_CLOUD_API_URL` | cloud base URL | `https://api.ui.com` |
//! | `UNIFI_LOCAL_HOST` | local gateway host | |
//! | `UNIFI_LOCAL_PORT` | local gateway port | `443` |
//! | `UNIFI_LOCAL_VERIFY_SSL` | verify local TLS | `true` |
//! | `UNIFI_LOCAL_SESSION_PATH` | local session login path | |
//! | `UNIFI_RATE_LIMIT_REQUESTS` | early-access budget | `100` |
//! | `UNIFI_RATE_LIMIT_PERIOD` | window length in seconds | `60` |
//! | `UNIFI_GENERAL_RATE_LIMIT_REQUESTS` | general-tier budget | `10000` |
//! | `UNIFI_MAX_RETRIES` | retries after the first attempt | `3` |
//! | `UNIFI_RETRY_BASE_DELAY_MS` | backoff base | `500` |
//! | `UNIFI_RETRY_MAX_DELAY_MS` | backoff cap | `30000` |
//! | `UNIFI_REQUEST_TIMEOUT` | per-attempt timeout in seconds | `30` |
//! | `UNIFI_CACHE_ENABLED` | enable the read cache | `true` |
//! | `UNIFI_AUDIT_LOG_PATH` | audit log file | `audit.log` |

// self
use crate::{
	_prelude::*,
	auth::{Secret, TransportMode},
	config::GatewayConfig,
	error::ConfigError,
	limiter::{EARLY_ACCESS_BUDGET, GENERAL_BUDGET, RateBudget},
	retry::RetryPolicy,
};

impl GatewayConfig {
	/// Loads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_map(std::env::vars())
	}

	/// Loads the configuration from explicit key/value pairs.
	pub fn from_env_map<I, K, V>(vars: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let vars = vars
			.into_iter()
			.map(|(k, v)| (k.into(), v.into()))
			.filter(|(_, v): &(String, String)| !v.trim().is_empty())
			.collect::<HashMap<String, String>>();
		let get = |name: &str| vars.get(name).map(|v| v.trim());
		let api_key = get("UNIFI_API_KEY").ok_or(ConfigError::MissingApiKey)?;
		let mode = match get("UNIFI_API_TYPE") {
			Some(raw) => raw
				.parse::<TransportMode>()
				.map_err(|_| ConfigError::InvalidValue { name: "UNIFI_API_TYPE" })?,
			None => TransportMode::Cloud,
		};
		let window = Duration::from_secs(parse_or(
			get("UNIFI_RATE_LIMIT_PERIOD"),
			"UNIFI_RATE_LIMIT_PERIOD",
			EARLY_ACCESS_BUDGET.window.as_secs(),
		)?);
		let early_access = RateBudget::new(
			parse_or(
				get("UNIFI_RATE_LIMIT_REQUESTS"),
				"UNIFI_RATE_LIMIT_REQUESTS",
				EARLY_ACCESS_BUDGET.max_requests,
			)?,
			window,
		);
		let general = RateBudget::new(
			parse_or(
				get("UNIFI_GENERAL_RATE_LIMIT_REQUESTS"),
				"UNIFI_GENERAL_RATE_LIMIT_REQUESTS",
				GENERAL_BUDGET.max_requests,
			)?,
			window,
		);
		let defaults = RetryPolicy::default();
		let retry = RetryPolicy::new(
			parse_or(get("UNIFI_MAX_RETRIES"), "UNIFI_MAX_RETRIES", defaults.max_retries)?,
			Duration::from_millis(parse_or(
				get("UNIFI_RETRY_BASE_DELAY_MS"),
				"UNIFI_RETRY_BASE_DELAY_MS",
				defaults.base_delay.as_millis() as u64,
			)?),
			Duration::from_millis(parse_or(
				get("UNIFI_RETRY_MAX_DELAY_MS"),
				"UNIFI_RETRY_MAX_DELAY_MS",
				defaults.max_delay.as_millis() as u64,
			)?),
		)?;
		let mut builder = GatewayConfig::builder(Secret::new(api_key))
			.mode(mode)
			.local_port(parse_or(get("UNIFI_LOCAL_PORT"), "UNIFI_LOCAL_PORT", 443)?)
			.verify_local_tls(parse_bool_or(
				get("UNIFI_LOCAL_VERIFY_SSL"),
				"UNIFI_LOCAL_VERIFY_SSL",
				true,
			)?)
			.early_access_budget(early_access)
			.general_budget(general)
			.retry(retry)
			.request_timeout(Duration::from_secs(parse_or(
				get("UNIFI_REQUEST_TIMEOUT"),
				"UNIFI_REQUEST_TIMEOUT",
				30,
			)?))
			.cache_enabled(parse_bool_or(get("UNIFI_CACHE_ENABLED"), "UNIFI_CACHE_ENABLED", true)?);

		if let Some(url) = get("UNIFI_CLOUD_API_URL") {
			builder = builder
				.cloud_url(Url::parse(url).map_err(|source| ConfigError::InvalidUrl { source })?);
		}
		if let Some(host) = get("UNIFI_LOCAL_HOST") {
			builder = builder.local_host(host);
		}
		if let Some(path) = get("UNIFI_LOCAL_SESSION_PATH") {
			builder = builder.local_session_path(path);
		}
		if let Some(path) = get("UNIFI_AUDIT_LOG_PATH") {
			builder = builder.audit_log_path(path);
		}

		builder.build()
	}
}

fn parse_or<T>(raw: Option<&str>, name: &'static str, default: T) -> Result<T, ConfigError>
where
	T: FromStr,
{
	match raw {
		Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue { name }),
		None => Ok(default),
	}
}

fn parse_bool_or(
	raw: Option<&str>,
	name: &'static str,
	default: bool,
) -> Result<bool, ConfigError> {
	let Some(raw) = raw else { return Ok(default) };

	match raw.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidValue { name }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn reads_local_settings() {
		let config = GatewayConfig::from_env_map([
			("UNIFI_API_KEY", "key"),
			("UNIFI_API_TYPE", "local"),
			("UNIFI_LOCAL_HOST", "192.168.1.1"),
			("UNIFI_LOCAL_PORT", "8443"),
			("UNIFI_LOCAL_VERIFY_SSL", "false"),
			("UNIFI_RATE_LIMIT_REQUESTS", "40"),
			("UNIFI_CACHE_ENABLED", "no"),
		])
		.expect("Local environment should load.");

		assert_eq!(config.mode, TransportMode::Local);
		assert_eq!(config.local.port, 8443);
		assert!(config.accept_invalid_certs());
		assert_eq!(config.early_access_budget.max_requests, 40);
		assert!(!config.cache_enabled);
	}

	#[test]
	fn missing_key_and_bad_values_fail() {
		assert!(matches!(
			GatewayConfig::from_env_map([("UNIFI_API_TYPE", "cloud")]),
			Err(ConfigError::MissingApiKey)
		));
		assert!(matches!(
			GatewayConfig::from_env_map([("UNIFI_API_KEY", "key"), ("UNIFI_MAX_RETRIES", "many")]),
			Err(ConfigError::InvalidValue { name: "UNIFI_MAX_RETRIES" })
		));
		assert!(matches!(
			GatewayConfig::from_env_map([("UNIFI_API_KEY", "key"), ("UNIFI_API_TYPE", "edge")]),
			Err(ConfigError::InvalidValue { name: "UNIFI_API_TYPE" })
		));
	}
}
