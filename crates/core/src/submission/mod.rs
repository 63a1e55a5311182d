mod batch;
mod direct;

pub use batch::*;
pub use direct::*;

use crate::memory::AllocId;

/// One submission-ready span of commands inside a command buffer allocation. Produced by
/// the queue, consumed by either the one-shot kernel path or the direct submission ring.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
	pub id: AllocId,
	pub start_offset: usize,
	pub used_size: usize,
	/// GPU address of `start_offset`.
	pub gpu_start: u64,
	pub task_count: u32,
	/// Host-visible address monitor fences write `task_count` to.
	pub tag_address: u64,
	pub engine: usize,
	/// The workload has no ordering dependency on earlier submissions and may be
	/// scheduled out of append order when relaxed ordering is active.
	pub relaxed_ordering_allowed: bool,
}
