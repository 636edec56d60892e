//! Confirmation, dry-run, and audit discipline in front of every mutation.
//!
//! A [`MutationRequest`] moves through an explicit state machine:
//!
//! ```text
//! Requested -> Validated -> DryRun                                  (terminal)
//!                        -> Confirmed -> Executing -> Succeeded | Failed
//!                        -> Failed (confirmation required, contradictory flags)
//! ```
//!
//! The `attempt` audit record is appended before the gateway is called; if that append
//! fails the controller is never contacted. The terminal record supersedes the attempt.
//! Dropping the submission future while it executes appends a `failed` terminal record
//! with kind `cancelled`, so no attempt is left open.

// self
use crate::{
	_prelude::*,
	audit::{AuditError, AuditId, AuditLog, AuditPhase, AuditQuery, AuditRecord},
	error::{ErrorKind, ValidationError},
	gateway::Gateway,
	http::ControllerHttpClient,
	obs::{self, CallKind, CallOutcome, CallSpan},
	operation::Operation,
	outcome::{Outcome, PayloadSource},
};

/// Safety parameters supplied with a mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyFlags {
	/// Explicit confirmation; required for real execution.
	#[serde(default)]
	pub confirm: Option<bool>,
	/// Preview without contacting the controller.
	#[serde(default)]
	pub dry_run: Option<bool>,
}
impl SafetyFlags {
	/// `confirm=true`.
	pub fn confirmed() -> Self {
		Self { confirm: Some(true), dry_run: None }
	}

	/// `dry_run=true`.
	pub fn dry_run() -> Self {
		Self { confirm: None, dry_run: Some(true) }
	}

	fn is_confirmed(&self) -> bool {
		self.confirm == Some(true)
	}

	fn is_dry_run(&self) -> bool {
		self.dry_run == Some(true)
	}
}

/// A mutation submitted to the [`SafetyGate`].
#[derive(Clone, Debug)]
pub struct MutationRequest {
	/// Mutating operation.
	pub operation: Operation,
	/// Safety parameters.
	pub flags: SafetyFlags,
	/// Caller identity recorded in the audit trail.
	pub actor: Option<String>,
}
impl MutationRequest {
	/// Creates a request without an actor.
	pub fn new(operation: Operation, flags: SafetyFlags) -> Self {
		Self { operation, flags, actor: None }
	}

	/// Records the caller identity.
	pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
		self.actor = Some(actor.into());

		self
	}

	fn record(&self, phase: AuditPhase) -> AuditRecord {
		AuditRecord::new(
			phase,
			self.operation.summary(),
			self.flags.is_confirmed(),
			self.flags.is_dry_run(),
		)
		.with_actor(self.actor.clone())
	}
}

/// Lifecycle of one mutation.
#[derive(Debug)]
enum GateState {
	Requested,
	Validated,
	DryRun,
	Confirmed,
	Executing { attempt: AuditId },
	Succeeded(Outcome),
	Failed(Outcome),
}

/// Enforces confirmation and dry-run semantics and keeps the audit trail.
pub struct SafetyGate<C>
where
	C: ?Sized + ControllerHttpClient,
{
	gateway: Gateway<C>,
	audit: Arc<dyn AuditLog>,
}
impl<C> SafetyGate<C>
where
	C: ?Sized + ControllerHttpClient,
{
	/// Puts `gateway` behind the gate, recording into `audit`.
	pub fn new(gateway: Gateway<C>, audit: Arc<dyn AuditLog>) -> Self {
		Self { gateway, audit }
	}

	/// Gateway used for confirmed mutations.
	pub fn gateway(&self) -> &Gateway<C> {
		&self.gateway
	}

	/// Recent audit records, most recent first.
	pub fn recent(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError> {
		self.audit.query(query)
	}

	/// Runs a mutation through the state machine.
	pub async fn submit(&self, request: MutationRequest) -> Outcome {
		let kind =
			if request.flags.is_dry_run() { CallKind::DryRun } else { CallKind::Mutation };
		let span = CallSpan::new(kind, &request.operation);

		span.run(self.run(request)).await
	}

	async fn run(&self, request: MutationRequest) -> Outcome {
		let started = Instant::now();
		let mut state = GateState::Requested;

		loop {
			state = match state {
				GateState::Requested => match validate(&request) {
					Ok(()) => GateState::Validated,
					Err(err) => GateState::Failed(self.reject(&request, err, started)),
				},
				GateState::Validated => {
					let flags = (request.flags.is_dry_run(), request.flags.is_confirmed());

					match flags {
						(true, _) => GateState::DryRun,
						(false, true) => GateState::Confirmed,
						(false, false) => GateState::Failed(self.reject(
							&request,
							ValidationError::ConfirmationRequired {
								operation: request.operation.kind().into(),
							},
							started,
						)),
					}
				},
				GateState::DryRun => return self.dry_run(&request, started),
				GateState::Confirmed => match self.audit.append(request.record(AuditPhase::Attempt)) {
					Ok(attempt) => GateState::Executing { attempt },
					Err(err) => {
						#[cfg(feature = "tracing")]
						tracing::error!(
							error = %err,
							"Attempt record could not be written; mutation not sent."
						);

						GateState::Failed(Outcome::failed(&Error::from(err), 0, started.elapsed()))
					},
				},
				GateState::Executing { attempt } => self.execute(&request, attempt).await,
				GateState::Succeeded(outcome) | GateState::Failed(outcome) => return outcome,
			};
		}
	}

	fn reject(&self, request: &MutationRequest, err: ValidationError, started: Instant) -> Outcome {
		let err: Error = err.into();

		// Read-only operations never reach the trail.
		if request.operation.is_mutating() {
			let record =
				request.record(AuditPhase::Rejected).failed(err.kind(), err.to_string(), 0);

			if let Err(audit_err) = self.audit.append(record) {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %audit_err, "Rejection record could not be written.");
				#[cfg(not(feature = "tracing"))]
				let _ = audit_err;
			}
		}

		obs::record_call_outcome(CallKind::Mutation, CallOutcome::Failure);

		Outcome::failed(&err, 0, started.elapsed())
	}

	fn dry_run(&self, request: &MutationRequest, started: Instant) -> Outcome {
		obs::record_call_outcome(CallKind::DryRun, CallOutcome::Attempt);

		let record = request.record(AuditPhase::DryRun).succeeded(0);

		if let Err(err) = self.audit.append(record) {
			obs::record_call_outcome(CallKind::DryRun, CallOutcome::Failure);

			return Outcome::failed(&Error::from(err), 0, started.elapsed());
		}

		obs::record_call_outcome(CallKind::DryRun, CallOutcome::Success);

		let payload = request.operation.body().cloned().unwrap_or(Value::Null);

		Outcome::ok(payload, PayloadSource::DryRun, 0, started.elapsed())
	}

	async fn execute(&self, request: &MutationRequest, attempt: AuditId) -> GateState {
		let mut pending = PendingAttempt { audit: &*self.audit, request, attempt, armed: true };
		let outcome = self.gateway.execute(&request.operation).await;

		pending.armed = false;

		let terminal = match outcome.error() {
			None => request.record(AuditPhase::Succeeded).succeeded(outcome.attempts()),
			Some(failure) => request.record(AuditPhase::Failed).failed(
				failure.kind,
				failure.message.clone(),
				outcome.attempts(),
			),
		};

		// The mutation already reached the controller; its outcome stands even if the
		// terminal record cannot be written.
		if let Err(err) = self.audit.append(terminal.superseding(attempt)) {
			#[cfg(feature = "tracing")]
			tracing::error!(
				attempt = attempt.0,
				error = %err,
				"Terminal audit record could not be written."
			);
			#[cfg(not(feature = "tracing"))]
			let _ = err;
		}

		if outcome.is_ok() { GateState::Succeeded(outcome) } else { GateState::Failed(outcome) }
	}
}
impl<C> Debug for SafetyGate<C>
where
	C: ?Sized + ControllerHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SafetyGate").field("gateway", &self.gateway).finish()
	}
}

fn validate(request: &MutationRequest) -> Result<(), ValidationError> {
	let operation = request.operation.kind().to_owned();

	if !request.operation.is_mutating() {
		return Err(ValidationError::NotAMutation { operation });
	}
	if request.flags.is_dry_run() && request.flags.is_confirmed() {
		return Err(ValidationError::ContradictoryFlags { operation });
	}

	Ok(())
}

/// Writes a cancelled terminal record if dropped while armed.
struct PendingAttempt<'a> {
	audit: &'a dyn AuditLog,
	request: &'a MutationRequest,
	attempt: AuditId,
	armed: bool,
}
impl Drop for PendingAttempt<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let record = self
			.request
			.record(AuditPhase::Failed)
			.failed(ErrorKind::Cancelled, Error::Cancelled.to_string(), 0)
			.superseding(self.attempt);

		if let Err(err) = self.audit.append(record) {
			#[cfg(feature = "tracing")]
			tracing::error!(
				attempt = self.attempt.0,
				error = %err,
				"Cancellation record could not be written."
			);
			#[cfg(not(feature = "tracing"))]
			let _ = err;
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::operation::Method;

	fn mutation() -> Operation {
		Operation::builder("restart_device", Method::Post, "/ea/sites/default/cmd/devmgr")
			.body(json!({ "mac": "aa:bb:cc:dd:ee:ff", "cmd": "restart" }))
			.build()
			.expect("Mutation fixture should build.")
	}

	#[test]
	fn contradictory_flags_fail_validation() {
		let request = MutationRequest::new(
			mutation(),
			SafetyFlags { confirm: Some(true), dry_run: Some(true) },
		);

		assert!(matches!(validate(&request), Err(ValidationError::ContradictoryFlags { .. })));
	}

	#[test]
	fn reads_are_not_mutations() {
		let read = Operation::read("list_sites", "/ea/sites").build().expect("Read should build.");
		let request = MutationRequest::new(read, SafetyFlags::confirmed());

		assert!(matches!(validate(&request), Err(ValidationError::NotAMutation { .. })));
	}

	#[test]
	fn flags_deserialize_from_partial_input() {
		let flags: SafetyFlags =
			serde_json::from_value(json!({ "confirm": true })).expect("Flags should deserialize.");

		assert_eq!(flags, SafetyFlags::confirmed());
		assert!(!flags.is_dry_run());
	}
}
