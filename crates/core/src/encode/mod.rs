mod soft;

pub use soft::*;

use crate::container::LinearStream;
use crate::error::SubmitResult;

/// Preemption granularity requested for a workload. Finer modes cost setup commands, so
/// the queue only reprograms on change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum PreemptionMode {
	Disabled,
	MidBatch,
	ThreadGroup,
	MidThread,
}

impl PreemptionMode {
	pub fn from_u32(value: u32) -> Option<Self> {
		match value {
			0 => Some(PreemptionMode::Disabled),
			1 => Some(PreemptionMode::MidBatch),
			2 => Some(PreemptionMode::ThreadGroup),
			3 => Some(PreemptionMode::MidThread),
			_ => None,
		}
	}
}

/// Comparison the GPU applies when polling a semaphore location.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum SemaphoreOp {
	Equal,
	GreaterOrEqual,
}

/// Base addresses programmed into the hardware's state base address registers. Any heap
/// replacement shifts one of these and forces reprogramming.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SbaProperties {
	pub general_base: u64,
	pub surface_state_base: u64,
	pub dynamic_state_base: u64,
	pub instruction_base: u64,
}

/// Capability implemented once per hardware family and selected at device init. The core
/// never inspects the bytes an encoder writes; it only budgets sizes and supplies
/// addresses.
pub trait Encoder: Send + Sync {
	fn batch_buffer_start_size(&self) -> usize;
	fn semaphore_wait_size(&self) -> usize;
	fn fence_write_size(&self) -> usize;
	fn sba_size(&self) -> usize;
	fn front_end_size(&self) -> usize;
	fn preemption_size(&self) -> usize;
	fn batch_buffer_end_size(&self) -> usize;
	fn scheduler_size(&self, target_count: usize) -> usize;

	fn default_heap_size(&self) -> usize;
	fn heap_alignment(&self) -> usize;

	/// Unconditional jump. `secondary` marks a call-style start that chains back instead
	/// of ending the primary buffer.
	fn encode_batch_buffer_start(&self, stream: &mut LinearStream, target: u64, secondary: bool) -> SubmitResult<()>;
	/// Poll `address` until `op(value_at_address, value)` holds.
	fn encode_semaphore_wait(
		&self,
		stream: &mut LinearStream,
		address: u64,
		value: u64,
		op: SemaphoreOp,
	) -> SubmitResult<()>;
	/// Post-sync write of `value` to the host-visible tag at `address`.
	fn encode_fence_write(&self, stream: &mut LinearStream, address: u64, value: u32) -> SubmitResult<()>;
	fn encode_state_base_address(&self, stream: &mut LinearStream, sba: &SbaProperties) -> SubmitResult<()>;
	fn encode_front_end_state(&self, stream: &mut LinearStream, scratch_size: u32) -> SubmitResult<()>;
	fn encode_preemption(&self, stream: &mut LinearStream, mode: PreemptionMode) -> SubmitResult<()>;
	/// Terminate a batch buffer.
	fn encode_batch_buffer_end(&self, stream: &mut LinearStream) -> SubmitResult<()>;
	/// Self-scheduling section: the GPU evaluates `targets` and picks execution order
	/// among logically independent workloads.
	fn encode_scheduler(&self, stream: &mut LinearStream, targets: &[u64]) -> SubmitResult<()>;
}
