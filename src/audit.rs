//! Append-only audit trail for mutations.
//!
//! Every confirmed mutation produces an `attempt` record before the controller is
//! contacted and a terminal `succeeded`/`failed` record afterwards that references the
//! attempt through [`AuditRecord::supersedes`]. Dry runs and confirmation rejections
//! leave a single lightweight record. Records are never updated or deleted; they carry
//! an [`OperationSummary`] and outcome labels, never request bodies or credentials.
//!
//! The contract is synchronous so a drop guard can still write the terminal record when
//! the caller abandons an in-flight mutation.

pub mod file;
pub mod memory;

pub use file::FileAuditLog;
pub use memory::MemoryAuditLog;

// self
use crate::{
	_prelude::*,
	error::ErrorKind,
	operation::{OperationSummary, ResourceClass},
	outcome::OutcomeStatus,
};

/// Default number of records returned by [`AuditQuery`].
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Storage contract implemented by audit sinks.
pub trait AuditLog
where
	Self: Send + Sync,
{
	/// Durably appends a record, assigning and returning its id.
	///
	/// The call must not return before the record is persisted.
	fn append(&self, record: AuditRecord) -> Result<AuditId, AuditError>;

	/// Returns matching records, most recent first.
	fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError>;
}

/// Error type produced by [`AuditLog`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AuditError {
	/// Record could not be encoded or decoded.
	#[error("Audit serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Storage backend failure.
	#[error("Audit backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Sequential record identifier assigned by the sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub u64);
impl Display for AuditId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}", self.0)
	}
}

/// Lifecycle position of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
	/// Written before the network call of a confirmed mutation.
	Attempt,
	/// Terminal record of a mutation that succeeded.
	Succeeded,
	/// Terminal record of a mutation that failed or was cancelled.
	Failed,
	/// Dry run; nothing was sent.
	DryRun,
	/// Rejected locally before any attempt (missing confirmation, contradictory flags).
	Rejected,
}
impl AuditPhase {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Attempt => "attempt",
			Self::Succeeded => "succeeded",
			Self::Failed => "failed",
			Self::DryRun => "dry_run",
			Self::Rejected => "rejected",
		}
	}

	/// Whether the phase closes a mutation's lifecycle.
	pub const fn is_terminal(self) -> bool {
		!matches!(self, Self::Attempt)
	}
}
impl Display for AuditPhase {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Immutable audit line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
	/// Identifier assigned on append.
	#[serde(default)]
	pub id: AuditId,
	/// When the record was created.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	/// Lifecycle phase.
	pub phase: AuditPhase,
	/// Secret-free operation description.
	pub operation: OperationSummary,
	/// `confirm` flag as supplied.
	pub confirm: bool,
	/// `dry_run` flag as supplied.
	pub dry_run: bool,
	/// Outcome status; absent while the attempt is pending.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub outcome: Option<OutcomeStatus>,
	/// Failure discriminator of failed outcomes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorKind>,
	/// Failure message of failed outcomes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// Network attempts made, for terminal records.
	#[serde(default)]
	pub attempts: u32,
	/// Record this one closes or corrects.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub supersedes: Option<AuditId>,
	/// Caller identity, when supplied.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actor: Option<String>,
}
impl AuditRecord {
	/// Creates a record stamped with the current time. The sink assigns the id.
	pub fn new(
		phase: AuditPhase,
		operation: OperationSummary,
		confirm: bool,
		dry_run: bool,
	) -> Self {
		Self {
			id: AuditId::default(),
			timestamp: OffsetDateTime::now_utc(),
			phase,
			operation,
			confirm,
			dry_run,
			outcome: None,
			error: None,
			message: None,
			attempts: 0,
			supersedes: None,
			actor: None,
		}
	}

	/// Records a successful outcome.
	pub fn succeeded(mut self, attempts: u32) -> Self {
		self.outcome = Some(OutcomeStatus::Ok);
		self.attempts = attempts;

		self
	}

	/// Records a failed outcome.
	pub fn failed(mut self, kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
		self.outcome = Some(OutcomeStatus::Error);
		self.error = Some(kind);
		self.message = Some(message.into());
		self.attempts = attempts;

		self
	}

	/// Links the record to the one it closes.
	pub fn superseding(mut self, id: AuditId) -> Self {
		self.supersedes = Some(id);

		self
	}

	/// Attaches the caller identity.
	pub fn with_actor(mut self, actor: Option<String>) -> Self {
		self.actor = actor;

		self
	}
}

/// Filters for [`AuditLog::query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditQuery {
	/// Operation kind label.
	pub operation: Option<String>,
	/// Resource class.
	pub resource: Option<ResourceClass>,
	/// Lifecycle phase.
	pub phase: Option<AuditPhase>,
	/// Target identifier.
	pub target: Option<String>,
	/// Only records at or after this instant.
	pub since: Option<OffsetDateTime>,
	/// Maximum records returned.
	pub limit: usize,
}
impl AuditQuery {
	/// Restricts to one operation kind.
	pub fn operation(mut self, kind: impl Into<String>) -> Self {
		self.operation = Some(kind.into());

		self
	}

	/// Restricts to one resource class.
	pub fn resource(mut self, resource: ResourceClass) -> Self {
		self.resource = Some(resource);

		self
	}

	/// Restricts to one phase.
	pub fn phase(mut self, phase: AuditPhase) -> Self {
		self.phase = Some(phase);

		self
	}

	/// Restricts to one target identifier.
	pub fn target(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());

		self
	}

	/// Restricts to records at or after `since`.
	pub fn since(mut self, since: OffsetDateTime) -> Self {
		self.since = Some(since);

		self
	}

	/// Caps the number of records returned.
	pub fn limit(mut self, limit: usize) -> Self {
		self.limit = limit;

		self
	}

	/// Whether `record` passes every filter.
	pub fn matches(&self, record: &AuditRecord) -> bool {
		self.operation.as_deref().is_none_or(|kind| record.operation.kind == kind)
			&& self.resource.is_none_or(|resource| record.operation.resource == resource)
			&& self.phase.is_none_or(|phase| record.phase == phase)
			&& self
				.target
				.as_deref()
				.is_none_or(|target| record.operation.target.as_deref() == Some(target))
			&& self.since.is_none_or(|since| record.timestamp >= since)
	}

	/// Applies the filters to records stored oldest first.
	pub fn select<'a, I>(&self, oldest_first: I) -> Vec<AuditRecord>
	where
		I: DoubleEndedIterator<Item = &'a AuditRecord>,
	{
		oldest_first.rev().filter(|record| self.matches(record)).take(self.limit).cloned().collect()
	}
}
impl Default for AuditQuery {
	fn default() -> Self {
		Self {
			operation: None,
			resource: None,
			phase: None,
			target: None,
			since: None,
			limit: DEFAULT_QUERY_LIMIT,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::operation::Method;

	fn summary(kind: &str, target: Option<&str>) -> OperationSummary {
		OperationSummary {
			kind: kind.into(),
			method: Method::Post,
			path: "/ea/sites/default/cmd/devmgr".into(),
			resource: ResourceClass::Devices,
			target: target.map(Into::into),
		}
	}

	#[test]
	fn record_serializes_without_pending_fields() {
		let record =
			AuditRecord::new(AuditPhase::Attempt, summary("restart_device", None), true, false);
		let line = serde_json::to_value(&record).expect("Audit record should serialize.");

		assert_eq!(line["phase"], "attempt");
		assert!(line.get("outcome").is_none());
		assert!(line["timestamp"].as_str().is_some_and(|ts| ts.contains('T')));

		let decoded: AuditRecord =
			serde_json::from_value(line).expect("Audit record should deserialize.");

		assert_eq!(decoded.phase, AuditPhase::Attempt);
	}

	#[test]
	fn query_filters_and_orders_most_recent_first() {
		let records = (1..=5)
			.map(|n| {
				let mut record = AuditRecord::new(
					if n % 2 == 0 { AuditPhase::Succeeded } else { AuditPhase::Attempt },
					summary("restart_device", Some(if n < 3 { "aa" } else { "bb" })),
					true,
					false,
				);

				record.id = AuditId(n);

				record
			})
			.collect::<Vec<_>>();
		let ids = |query: AuditQuery| {
			query.select(records.iter()).into_iter().map(|record| record.id.0).collect::<Vec<_>>()
		};

		assert_eq!(ids(AuditQuery::default()), vec![5, 4, 3, 2, 1]);
		assert_eq!(ids(AuditQuery::default().limit(2)), vec![5, 4]);
		assert_eq!(ids(AuditQuery::default().phase(AuditPhase::Succeeded)), vec![4, 2]);
		assert_eq!(ids(AuditQuery::default().target("aa")), vec![2, 1]);
		assert!(ids(AuditQuery::default().operation("delete_wlan")).is_empty());
	}
}
