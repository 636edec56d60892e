#![cfg(feature = "reqwest")]

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use unifi_gateway::{
	ErrorKind, Gateway, GatewayConfig, LocalAuth, Operation, ResponseCache, RetryPolicy,
	auth::Secret,
	gateway::ReqwestGateway,
	http::ReqwestHttpClient,
	operation::{Method, ResourceClass},
	url::Url,
};

fn list_sites() -> Operation {
	Operation::read("list_sites", "/integration/v1/sites")
		.param("limit", 25)
		.resource(ResourceClass::Sites)
		.build()
		.expect("Site listing should build.")
}

#[tokio::test]
async fn cloud_reads_send_the_api_key_and_decode_json() -> Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/integration/v1/sites")
				.query_param("limit", "25")
				.header("x-api-key", "cloud-key");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"data":[{"id":"default"}]}"#);
		})
		.await;
	let config = GatewayConfig::builder(Secret::new("cloud-key"))
		.cloud_url(Url::parse(&server.base_url())?)
		.build()?;
	let gateway = ReqwestGateway::from_config(&config)?;
	let first = gateway.execute(&list_sites()).await.into_result()?;
	let second = gateway.execute(&list_sites()).await.into_result()?;

	assert_eq!(first["data"][0]["id"], "default");
	assert_eq!(first, second);

	mock.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn local_session_header_is_obtained_once_and_reused() -> Result<()> {
	let server = MockServer::start_async().await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login").header("x-api-key", "local-key");
			then.status(200).header("X-CSRF-Token", "csrf-1");
		})
		.await;
	let sites = server
		.mock_async(|when, then| {
			when.method(GET).path("/integration/v1/sites").header("x-csrf-token", "csrf-1");
			then.status(200).header("content-type", "application/json").body(r#"{"data":[]}"#);
		})
		.await;
	let http = Arc::new(ReqwestHttpClient::build(false)?);
	let auth = LocalAuth::new(Secret::new("local-key"))
		.with_session_login(http.clone(), Url::parse(&server.url("/api/auth/login"))?);
	let base_url = Url::parse(&server.base_url())?;
	let gateway = Gateway::<ReqwestHttpClient>::with_http_client(base_url, Arc::new(auth), http)
		.with_cache(Arc::new(ResponseCache::disabled()));

	for _ in 0..2 {
		assert!(gateway.execute(&list_sites()).await.is_ok());
	}

	login.assert_calls_async(1).await;
	sites.assert_calls_async(2).await;

	Ok(())
}

#[tokio::test]
async fn slow_controllers_time_out_as_transient_failures() -> Result<()> {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/integration/v1/sites/default/devices/abc/actions");
			then.status(200).delay(Duration::from_secs(2)).body("{}");
		})
		.await;
	let config = GatewayConfig::builder(Secret::new("cloud-key"))
		.cloud_url(Url::parse(&server.base_url())?)
		.build()?;
	let gateway = ReqwestGateway::from_config(&config)?
		.with_retry(RetryPolicy::disabled())
		.with_request_timeout(Duration::from_millis(200));
	let restart = Operation::builder(
		"restart_device",
		Method::Post,
		"/integration/v1/sites/default/devices/abc/actions",
	)
	.body(serde_json::json!({ "action": "RESTART" }))
	.build()?;
	let outcome = gateway.execute(&restart).await;

	assert_eq!(outcome.error_kind(), Some(ErrorKind::Transient));
	assert_eq!(outcome.attempts(), 1);

	Ok(())
}
