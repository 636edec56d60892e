//! Append-only JSON-lines [`AuditLog`] backed by a local file.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{self, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	audit::{AuditError, AuditId, AuditLog, AuditQuery, AuditRecord},
};

/// Writes one JSON object per line and syncs the file before each append returns.
///
/// A failed append is cut back to the last complete line, so later appends and reads
/// never see a partial record.
#[derive(Debug)]
pub struct FileAuditLog {
	path: PathBuf,
	inner: Mutex<FileState>,
}
#[derive(Debug)]
struct FileState {
	file: File,
	len: u64,
	next_id: u64,
}
impl FileAuditLog {
	/// Opens (or creates) a log at `path`, continuing the id sequence of existing records.
	///
	/// A trailing line without a newline is the remnant of an interrupted append and is
	/// truncated away.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;
		Self::truncate_torn_tail(&path)?;

		let last_id =
			Self::load(&path)?.iter().map(|record| record.id.0).max().unwrap_or_default();
		let file = OpenOptions::new().create(true).append(true).open(&path).map_err(|e| {
			AuditError::Backend { message: format!("Failed to open {}: {e}", path.display()) }
		})?;
		let len = file.metadata().map(|meta| meta.len()).map_err(|e| AuditError::Backend {
			message: format!("Failed to stat {}: {e}", path.display()),
		})?;

		Ok(Self { path, inner: Mutex::new(FileState { file, len, next_id: last_id + 1 }) })
	}

	/// Location of the log file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), AuditError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| AuditError::Backend {
				message: format!("Failed to create audit directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn truncate_torn_tail(path: &Path) -> Result<(), AuditError> {
		if !path.exists() {
			return Ok(());
		}

		let bytes = fs::read(path).map_err(|e| AuditError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() || bytes.ends_with(b"\n") {
			return Ok(());
		}

		let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |idx| idx + 1);
		let file = OpenOptions::new().write(true).open(path).map_err(|e| AuditError::Backend {
			message: format!("Failed to open {}: {e}", path.display()),
		})?;

		file.set_len(keep as u64).map_err(|e| AuditError::Backend {
			message: format!("Failed to truncate {}: {e}", path.display()),
		})?;
		file.sync_all().map_err(|e| AuditError::Backend {
			message: format!("Failed to sync {}: {e}", path.display()),
		})?;

		#[cfg(feature = "tracing")]
		tracing::warn!(
			path = %path.display(),
			dropped_bytes = bytes.len() - keep,
			"Truncated a torn trailing audit line."
		);

		Ok(())
	}

	fn load(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
		if !path.exists() {
			return Ok(Vec::new());
		}

		let contents = fs::read_to_string(path).map_err(|e| AuditError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		contents
			.lines()
			.enumerate()
			.filter(|(_, line)| !line.trim().is_empty())
			.map(|(idx, line)| {
				serde_json::from_str::<AuditRecord>(line).map_err(|e| AuditError::Serialization {
					message: format!("Failed to parse {} line {}: {e}", path.display(), idx + 1),
				})
			})
			.collect()
	}
}
impl AuditLog for FileAuditLog {
	fn append(&self, mut record: AuditRecord) -> Result<AuditId, AuditError> {
		let mut state = self.inner.lock();
		let id = AuditId(state.next_id);

		record.id = id;

		let mut line = serde_json::to_vec(&record).map_err(|e| AuditError::Serialization {
			message: format!("Failed to serialize audit record: {e}"),
		})?;

		line.push(b'\n');

		let committed = state.len;

		state.len = append_line(&mut state.file, committed, &line).map_err(|e| {
			AuditError::Backend { message: format!("Failed to write {}: {e}", self.path.display()) }
		})?;
		state.next_id += 1;

		#[cfg(feature = "tracing")]
		tracing::debug!(id = id.0, phase = record.phase.as_str(), "Audit record appended.");

		Ok(id)
	}

	fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError> {
		// Hold the writer lock so a concurrent append cannot be observed half-written.
		let _state = self.inner.lock();
		let records = Self::load(&self.path)?;

		Ok(query.select(records.iter()))
	}
}

/// File operations an append needs, so a failed write can be rolled back.
trait LogFile: Write {
	fn truncate_to(&mut self, len: u64) -> io::Result<()>;

	fn sync(&mut self) -> io::Result<()>;
}
impl LogFile for File {
	fn truncate_to(&mut self, len: u64) -> io::Result<()> {
		self.set_len(len)
	}

	fn sync(&mut self) -> io::Result<()> {
		self.sync_data()
	}
}

/// Appends `line` after `committed` bytes and returns the new length. On failure the
/// file is cut back to `committed`.
fn append_line(file: &mut impl LogFile, committed: u64, line: &[u8]) -> io::Result<u64> {
	if let Err(err) = file.write_all(line).and_then(|()| file.sync()) {
		if let Err(rollback) = file.truncate_to(committed) {
			#[cfg(feature = "tracing")]
			tracing::error!(error = %rollback, "Partial audit line could not be truncated.");
			#[cfg(not(feature = "tracing"))]
			let _ = rollback;
		}

		return Err(err);
	}

	Ok(committed + line.len() as u64)
}
