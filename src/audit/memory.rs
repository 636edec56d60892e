//! Thread-safe in-memory [`AuditLog`] for tests and demos.

// self
use crate::{
	_prelude::*,
	audit::{AuditError, AuditId, AuditLog, AuditQuery, AuditRecord},
};

/// Audit sink that keeps records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryAuditLog(Arc<Mutex<Vec<AuditRecord>>>);
impl MemoryAuditLog {
	/// Snapshot of every record, oldest first.
	pub fn records(&self) -> Vec<AuditRecord> {
		self.0.lock().clone()
	}

	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Whether nothing was recorded.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl AuditLog for MemoryAuditLog {
	fn append(&self, mut record: AuditRecord) -> Result<AuditId, AuditError> {
		let mut records = self.0.lock();
		let id = AuditId(records.len() as u64 + 1);

		record.id = id;
		records.push(record);

		Ok(id)
	}

	fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError> {
		Ok(query.select(self.0.lock().iter()))
	}
}
