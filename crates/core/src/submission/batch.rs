use crate::error::SubmitResult;
use crate::memory::ResidencyContainer;
use crate::submission::BatchBuffer;
use crate::sync::SoftwareTag;
use parking_lot::Mutex;
use std::sync::Arc;

/// Hands a finished batch buffer plus its residency set to whatever executes it: the
/// one-shot kernel path or a test double. The direct submission ring bypasses this and
/// appends to its own buffer instead.
pub trait BatchBufferSubmitter: Send + Sync {
	fn submit(&self, batch: &BatchBuffer, residency: &ResidencyContainer) -> SubmitResult<()>;
}

struct SubmitRecord {
	task_count: u32,
	residency_len: usize,
	used_size: usize,
}

/// Submitter that "executes" every batch immediately by signalling the software tag with
/// the batch's task count, and records what it was handed for inspection.
pub struct SoftwareSubmitter {
	tag: Arc<SoftwareTag>,
	records: Mutex<Vec<SubmitRecord>>,
}

impl SoftwareSubmitter {
	pub fn new(tag: Arc<SoftwareTag>) -> Arc<Self> {
		Arc::new(Self {
			tag,
			records: Mutex::new(Vec::new()),
		})
	}

	pub fn submit_count(&self) -> usize {
		self.records.lock().len()
	}

	pub fn last_residency_len(&self) -> Option<usize> {
		self.records.lock().last().map(|r| r.residency_len)
	}

	pub fn last_task_count(&self) -> Option<u32> {
		self.records.lock().last().map(|r| r.task_count)
	}

	pub fn last_used_size(&self) -> Option<usize> {
		self.records.lock().last().map(|r| r.used_size)
	}
}

impl BatchBufferSubmitter for SoftwareSubmitter {
	fn submit(&self, batch: &BatchBuffer, residency: &ResidencyContainer) -> SubmitResult<()> {
		self.records.lock().push(SubmitRecord {
			task_count: batch.task_count,
			residency_len: residency.len(),
			used_size: batch.used_size,
		});
		self.tag.signal(batch.engine, batch.task_count);
		Ok(())
	}
}
