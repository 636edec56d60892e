//! Cloud API credentials: a static API key header, no session, no expiry.

// self
use crate::{
	_prelude::*,
	auth::{API_KEY_HEADER, AuthFuture, AuthProvider, Credentials, Secret, TransportMode},
	error::AuthError,
};

/// Attaches the configured API key to every cloud request.
#[derive(Clone)]
pub struct CloudAuth {
	api_key: Option<Secret>,
}
impl CloudAuth {
	/// Creates a provider for the given API key.
	pub fn new(api_key: Secret) -> Self {
		Self { api_key: Some(api_key).filter(|key| !key.is_blank()) }
	}

	/// Creates a provider without secret material; every resolve fails.
	pub fn unconfigured() -> Self {
		Self { api_key: None }
	}
}
impl AuthProvider for CloudAuth {
	fn mode(&self) -> TransportMode {
		TransportMode::Cloud
	}

	fn is_configured(&self) -> bool {
		self.api_key.is_some()
	}

	fn resolve(&self) -> AuthFuture<'_, Credentials> {
		Box::pin(async move {
			let key = self
				.api_key
				.clone()
				.ok_or(AuthError::MissingSecret { mode: TransportMode::Cloud })?;

			if !key.is_header_safe() {
				return Err(AuthError::InvalidHeader { name: API_KEY_HEADER });
			}

			Ok(Credentials::new(TransportMode::Cloud, 0).with_header(API_KEY_HEADER, key))
		})
	}
}
impl Debug for CloudAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CloudAuth").field("configured", &self.is_configured()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn resolves_static_header() {
		let auth = CloudAuth::new(Secret::new("cloud-key"));
		let creds = auth.resolve().await.expect("Configured cloud auth should resolve.");
		let headers = creds.expose_headers().collect::<Vec<_>>();

		assert_eq!(headers, vec![(API_KEY_HEADER, "cloud-key")]);
		assert!(creds.expires_at().is_none());
		assert!(!auth.is_session_expired(401));
	}

	#[tokio::test]
	async fn missing_key_is_an_auth_error() {
		let err = CloudAuth::new(Secret::new("   "))
			.resolve()
			.await
			.expect_err("Blank keys must not resolve.");

		assert!(matches!(err, AuthError::MissingSecret { mode: TransportMode::Cloud }));
		assert_eq!(format!("{:?}", CloudAuth::unconfigured()), "CloudAuth { configured: false }");
	}
}
