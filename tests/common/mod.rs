#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	env,
	path::PathBuf,
	process,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};
// crates.io
use parking_lot::Mutex;
use serde_json::Value;
use time::OffsetDateTime;
// self
use unifi_gateway::{
	audit::{AuditError, AuditId, AuditLog, AuditQuery, AuditRecord},
	auth::{CloudAuth, Secret},
	gateway::Gateway,
	http::{ControllerHttpClient, ControllerRequest, ControllerResponse, HttpFuture},
	url::Url,
};

pub const BASE_URL: &str = "https://controller.test/proxy/network/";

/// Transport that replays queued responses and records every request it receives.
#[derive(Default)]
pub struct ScriptedClient {
	script: Mutex<VecDeque<ControllerResponse>>,
	requests: Mutex<Vec<ControllerRequest>>,
	hang: AtomicBool,
}
impl ScriptedClient {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn respond(&self, status: u16, body: &str) -> &Self {
		self.script.lock().push_back(ControllerResponse::new(status, body.to_owned()));

		self
	}

	pub fn respond_with(&self, response: ControllerResponse) -> &Self {
		self.script.lock().push_back(response);

		self
	}

	/// Makes every subsequent request wait forever.
	pub fn hang(&self) {
		self.hang.store(true, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.requests.lock().len()
	}

	pub fn requests(&self) -> Vec<ControllerRequest> {
		self.requests.lock().clone()
	}
}
impl ControllerHttpClient for ScriptedClient {
	fn send(&self, request: ControllerRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			self.requests.lock().push(request);

			if self.hang.load(Ordering::SeqCst) {
				std::future::pending::<()>().await;
			}

			// An exhausted script answers with an empty list.
			Ok(self
				.script
				.lock()
				.pop_front()
				.unwrap_or_else(|| ControllerResponse::new(200, r#"{"data":[]}"#)))
		})
	}
}

/// Audit sink whose every write fails.
#[derive(Debug, Default)]
pub struct FailingAuditLog;
impl AuditLog for FailingAuditLog {
	fn append(&self, _record: AuditRecord) -> Result<AuditId, AuditError> {
		Err(AuditError::Backend { message: "disk full".into() })
	}

	fn query(&self, _query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError> {
		Err(AuditError::Backend { message: "disk full".into() })
	}
}

pub fn base_url() -> Url {
	Url::parse(BASE_URL).expect("Base URL fixture should parse.")
}

pub fn cloud_gateway(client: &Arc<ScriptedClient>) -> Gateway<ScriptedClient> {
	let auth = Arc::new(CloudAuth::new(Secret::new("test-key")));

	Gateway::with_http_client(base_url(), auth, client.clone())
}

pub fn json(payload: &str) -> Value {
	serde_json::from_str(payload).expect("JSON fixture should parse.")
}

pub fn temp_path(label: &str) -> PathBuf {
	let unique = format!(
		"unifi_gateway_{label}_{}_{}.jsonl",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}
