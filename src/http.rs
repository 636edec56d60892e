//! Transport primitives for controller exchanges.
//!
//! [`ControllerHttpClient`] is the gateway's only dependency on an HTTP stack. A client
//! executes one [`ControllerRequest`] and hands back the raw [`ControllerResponse`];
//! status classification (success, auth, not-found, throttled, transient) happens in
//! [`decode_response`] so every transport maps responses identically. Transport
//! implementations only translate their own failures into [`TransportError`] or
//! [`TransientError::Timeout`].

// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	auth::TransportMode,
	error::{AuthError, TransientError, TransportError, ValidationError},
	operation::Method,
};

/// Boxed future returned by [`ControllerHttpClient::send`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<ControllerResponse>> + 'a + Send>>;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Abstraction over HTTP transports capable of executing controller requests.
///
/// Implementations must be `Send + Sync + 'static` so one client can be shared by every
/// in-flight operation. They must not follow redirects and must not retry on their own;
/// retries belong to [`RetryPolicy`](crate::retry::RetryPolicy).
pub trait ControllerHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Executes a single HTTP attempt.
	fn send(&self, request: ControllerRequest) -> HttpFuture<'_>;
}

/// One outbound HTTP attempt.
#[derive(Clone)]
pub struct ControllerRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL including the query string.
	pub url: Url,
	/// Header pairs, including credential headers.
	pub headers: Vec<(String, String)>,
	/// Serialized JSON body.
	pub body: Option<Vec<u8>>,
	/// Per-attempt timeout.
	pub timeout: Option<Duration>,
}
impl ControllerRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None, timeout: None }
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Attaches a JSON body.
	pub fn with_json(mut self, body: &Value) -> Result<Self> {
		let bytes = serde_json::to_vec(body).map_err(|e| ValidationError::InvalidOperation {
			reason: format!("body cannot be serialized: {e}"),
		})?;

		self.body = Some(bytes);

		Ok(self)
	}

	/// Sets the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Returns the value of the first header matching `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}
impl Debug for ControllerRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ControllerRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>())
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Raw response captured from the controller.
#[derive(Clone, Debug, Default)]
pub struct ControllerResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers keyed by lower-cased name.
	pub headers: BTreeMap<String, String>,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl ControllerResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Adds a header; the name is stored lower-cased.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.insert(name.to_ascii_lowercase(), value.into());

		self
	}

	/// Returns a header value by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Status and retry hint captured for error mapping.
	pub fn metadata(&self) -> ResponseMetadata {
		ResponseMetadata {
			status: Some(self.status),
			retry_after: self.header("retry-after").and_then(parse_retry_after),
		}
	}

	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body text truncated for error messages.
	pub fn body_preview(&self) -> String {
		let text = String::from_utf8_lossy(&self.body);

		if text.chars().count() <= BODY_PREVIEW_LIMIT {
			return text.trim().to_owned();
		}

		let mut buf = text.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

		buf.push('…');

		buf
	}
}

/// Status metadata of the most recent HTTP response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Maps a controller response onto a JSON payload or the gateway error taxonomy.
///
/// 2xx bodies decode as JSON (empty bodies as `null`); 401/403 become
/// [`AuthError::Rejected`]; 404 becomes [`Error::NotFound`]; 429 and 5xx become retryable
/// [`TransientError::Status`]; every other status is a non-retryable
/// [`ValidationError::Remote`].
pub fn decode_response(
	mode: TransportMode,
	path: &str,
	response: &ControllerResponse,
) -> Result<Value> {
	let meta = response.metadata();

	match response.status {
		status if response.is_success() => decode_payload(&response.body, status),
		status @ (401 | 403) => Err(AuthError::Rejected { mode, status }.into()),
		404 => Err(Error::NotFound { resource: path.to_owned() }),
		status @ 429 | status @ 500..=599 => Err(TransientError::Status {
			status,
			message: response.body_preview(),
			retry_after: meta.retry_after,
		}
		.into()),
		status =>
			Err(ValidationError::Remote { status, message: response.body_preview() }.into()),
	}
}

fn decode_payload(body: &[u8], status: u16) -> Result<Value> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(Value::Null);
	}

	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
		.map_err(|source| Error::Decode { source, status: Some(status) })
}

/// Parses a `Retry-After` header given as delta-seconds or an HTTP-date.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta.unsigned_abs());
		}
	}

	None
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Controller calls should not follow redirects; a redirect from the API almost always
/// means a login page or a misconfigured proxy. Custom clients passed to
/// [`ReqwestHttpClient::with_client`] should disable redirect following as well.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with redirects disabled and optional relaxed TLS verification.
	pub fn build(accept_invalid_certs: bool) -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(accept_invalid_certs)
			.build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ControllerHttpClient for ReqwestHttpClient {
	fn send(&self, request: ControllerRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = self
				.0
				.request(method, request.url)
				.header(reqwest::header::ACCEPT, "application/json");

			for (name, value) in request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = request.body {
				builder =
					builder.header(reqwest::header::CONTENT_TYPE, "application/json").body(body);
			}
			if let Some(timeout) = request.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await.map_err(map_reqwest_error)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

			Ok(ControllerResponse { status, headers, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		return crate::error::ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Timeout.into();
	}

	TransportError::network(err).into()
}
