mod common;

// std
use std::{fs, sync::Arc, time::Duration};
// self
use common::*;
use unifi_gateway::{
	AuditLog, ErrorKind, FileAuditLog, MemoryAuditLog, MutationRequest, Operation, SafetyFlags,
	SafetyGate,
	audit::{AuditId, AuditPhase, AuditQuery},
	http::ControllerResponse,
	operation::{Method, ResourceClass},
	outcome::PayloadSource,
};

fn restart_device() -> Operation {
	Operation::builder("restart_device", Method::Post, "/ea/sites/default/cmd/devmgr")
		.resource(ResourceClass::Devices)
		.target("aa:bb:cc:dd:ee:ff")
		.body(json(r#"{"cmd":"restart","mac":"aa:bb:cc:dd:ee:ff"}"#))
		.build()
		.expect("Restart mutation should build.")
}

fn list_devices() -> Operation {
	Operation::read("list_devices", "/ea/sites/default/devices")
		.resource(ResourceClass::Devices)
		.build()
		.expect("Device listing should build.")
}

fn gate(client: &Arc<ScriptedClient>, audit: &MemoryAuditLog) -> SafetyGate<ScriptedClient> {
	SafetyGate::new(cloud_gateway(client), Arc::new(audit.clone()))
}

fn phases(audit: &MemoryAuditLog) -> Vec<AuditPhase> {
	audit.records().into_iter().map(|record| record.phase).collect()
}

#[tokio::test(start_paused = true)]
async fn throttled_confirmed_mutation_keeps_one_attempt_record() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();

	client
		.respond_with(ControllerResponse::new(429, "slow down").with_header("Retry-After", "1"))
		.respond(200, r#"{"meta":{"rc":"ok"}}"#);

	let outcome = gate(&client, &audit)
		.submit(
			MutationRequest::new(restart_device(), SafetyFlags::confirmed()).with_actor("agent-7"),
		)
		.await;

	assert!(outcome.is_ok());
	assert_eq!(outcome.source(), Some(PayloadSource::Network));
	assert_eq!(outcome.attempts(), 2);
	assert_eq!(client.calls(), 2);
	assert_eq!(phases(&audit), vec![AuditPhase::Attempt, AuditPhase::Succeeded]);

	let records = audit.records();

	assert_eq!(records[1].supersedes, Some(records[0].id));
	assert_eq!(records[1].attempts, 2);
	assert_eq!(records[0].actor.as_deref(), Some("agent-7"));
	assert!(records[0].confirm);
}

#[tokio::test]
async fn unconfirmed_mutation_never_reaches_the_controller() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();

	let declined = SafetyFlags { confirm: Some(false), dry_run: Some(false) };

	for flags in [SafetyFlags::default(), declined] {
		let outcome =
			gate(&client, &audit).submit(MutationRequest::new(restart_device(), flags)).await;

		assert_eq!(outcome.error_kind(), Some(ErrorKind::ConfirmationRequired));
		assert_eq!(outcome.attempts(), 0);
	}

	assert_eq!(client.calls(), 0);
	assert_eq!(phases(&audit), vec![AuditPhase::Rejected, AuditPhase::Rejected]);
}

#[tokio::test]
async fn dry_run_previews_without_side_effects() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();
	let gate = gate(&client, &audit);

	client.respond(200, r#"{"data":[{"mac":"aa:bb:cc:dd:ee:ff"}]}"#);

	assert!(gate.gateway().execute(&list_devices()).await.is_ok());

	let outcome = gate.submit(MutationRequest::new(restart_device(), SafetyFlags::dry_run())).await;

	assert_eq!(outcome.source(), Some(PayloadSource::DryRun));
	assert_eq!(outcome.payload(), restart_device().body());
	assert_eq!(outcome.attempts(), 0);
	assert_eq!(client.calls(), 1);
	assert_eq!(gate.gateway().cache.len(), 1);
	assert_eq!(phases(&audit), vec![AuditPhase::DryRun]);
}

#[tokio::test]
async fn contradictory_flags_are_rejected() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();
	let outcome = gate(&client, &audit)
		.submit(MutationRequest::new(
			restart_device(),
			SafetyFlags { confirm: Some(true), dry_run: Some(true) },
		))
		.await;

	assert_eq!(outcome.error_kind(), Some(ErrorKind::Validation));
	assert_eq!(client.calls(), 0);
	assert_eq!(phases(&audit), vec![AuditPhase::Rejected]);
}

#[tokio::test]
async fn reads_cannot_pass_through_the_gate() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();
	let outcome = gate(&client, &audit)
		.submit(MutationRequest::new(list_devices(), SafetyFlags::confirmed()))
		.await;

	assert_eq!(outcome.error_kind(), Some(ErrorKind::Validation));
	assert_eq!(client.calls(), 0);
	assert!(audit.is_empty());
}

#[tokio::test]
async fn audit_failure_blocks_the_mutation() {
	let client = ScriptedClient::new();
	let gate = SafetyGate::new(cloud_gateway(&client), Arc::new(FailingAuditLog));
	let outcome =
		gate.submit(MutationRequest::new(restart_device(), SafetyFlags::confirmed())).await;

	assert_eq!(outcome.error_kind(), Some(ErrorKind::Audit));
	assert_eq!(outcome.attempts(), 0);
	assert_eq!(client.calls(), 0);

	let dry_run = gate.submit(MutationRequest::new(restart_device(), SafetyFlags::dry_run())).await;

	assert_eq!(dry_run.error_kind(), Some(ErrorKind::Audit));
}

#[tokio::test(start_paused = true)]
async fn failed_mutation_closes_its_attempt() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();

	client.respond(403, "");

	let outcome = gate(&client, &audit)
		.submit(MutationRequest::new(restart_device(), SafetyFlags::confirmed()))
		.await;

	assert_eq!(outcome.error_kind(), Some(ErrorKind::Auth));

	let records = audit.records();

	assert_eq!(phases(&audit), vec![AuditPhase::Attempt, AuditPhase::Failed]);
	assert_eq!(records[1].error, Some(ErrorKind::Auth));
	assert_eq!(records[1].supersedes, Some(AuditId(1)));
}

#[tokio::test(start_paused = true)]
async fn abandoned_mutation_is_recorded_as_cancelled() {
	let client = ScriptedClient::new();
	let audit = MemoryAuditLog::default();
	let gate = gate(&client, &audit);

	client.hang();

	let submission = gate.submit(MutationRequest::new(restart_device(), SafetyFlags::confirmed()));

	assert!(tokio::time::timeout(Duration::from_secs(1), submission).await.is_err());
	assert_eq!(client.calls(), 1);

	let records = audit.records();

	assert_eq!(phases(&audit), vec![AuditPhase::Attempt, AuditPhase::Failed]);
	assert_eq!(records[1].error, Some(ErrorKind::Cancelled));
	assert_eq!(records[1].supersedes, Some(records[0].id));
}

#[tokio::test]
async fn file_audit_trail_is_queryable_after_reopen() {
	let path = temp_path("safety_audit");
	let client = ScriptedClient::new();
	let log = Arc::new(FileAuditLog::open(&path).expect("Failed to open audit log."));
	let gate = SafetyGate::new(cloud_gateway(&client), log.clone());

	gate.submit(MutationRequest::new(restart_device(), SafetyFlags::confirmed())).await;
	gate.submit(MutationRequest::new(restart_device(), SafetyFlags::dry_run())).await;
	drop(gate);
	drop(log);

	let reopened = FileAuditLog::open(&path).expect("Failed to reopen audit log.");
	let recent = reopened.query(&AuditQuery::default()).expect("Query should succeed.");

	assert_eq!(
		recent.iter().map(|record| record.phase).collect::<Vec<_>>(),
		vec![AuditPhase::DryRun, AuditPhase::Succeeded, AuditPhase::Attempt]
	);

	let attempts = reopened
		.query(&AuditQuery::default().phase(AuditPhase::Attempt).target("aa:bb:cc:dd:ee:ff"))
		.expect("Filtered query should succeed.");

	assert_eq!(attempts.len(), 1);

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary audit log {}: {e}", path.display())
	});
}
