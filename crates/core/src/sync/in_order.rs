use crate::error::SubmitResult;
use crate::memory::{AllocId, AllocationKind, AllocationProperties, Allocator, MemoryPool};
use std::sync::Arc;

/// Monotonic device/host counter pair expressing happened-before between submissions
/// without a full wait-for-idle.
///
/// The device counter allocation is written by GPU work; `counter_value` is the value the
/// next wait will compare against. `last_waited_counter_value` records the highest value a
/// wait has already been issued for, letting redundant waits short-circuit.
pub struct InOrderExecInfo {
	device_counter: AllocId,
	host_counter: Option<AllocId>,
	counter_value: u64,
	last_waited_counter_value: u64,
	allocation_offset: u64,
	/// Imported from another allocation. External counters have externally observable
	/// state, so waits on them are never elided.
	external_memory: bool,
}

impl InOrderExecInfo {
	/// Counter backed by allocations this subsystem owns.
	pub fn new(allocator: &Arc<dyn Allocator>, host_visible_mirror: bool) -> SubmitResult<Self> {
		// sized for many reset regenerations, each shifting the live counter by 64 bytes
		let counter_props = AllocationProperties {
			size: 4096,
			alignment: 64,
			kind: AllocationKind::CounterBuffer,
			pool: MemoryPool::System,
		};
		let device_counter = allocator.allocate(&counter_props)?;
		let host_counter = if host_visible_mirror {
			Some(allocator.allocate(&counter_props)?)
		} else {
			None
		};
		Ok(Self {
			device_counter,
			host_counter,
			counter_value: 0,
			last_waited_counter_value: 0,
			allocation_offset: 0,
			external_memory: false,
		})
	}

	/// Counter imported from externally owned memory.
	pub fn from_external(device_counter: AllocId) -> Self {
		Self {
			device_counter,
			host_counter: None,
			counter_value: 0,
			last_waited_counter_value: 0,
			allocation_offset: 0,
			external_memory: true,
		}
	}

	#[inline]
	pub fn device_counter(&self) -> AllocId {
		self.device_counter
	}

	#[inline]
	pub fn host_counter(&self) -> Option<AllocId> {
		self.host_counter
	}

	#[inline]
	pub fn counter_value(&self) -> u64 {
		self.counter_value
	}

	#[inline]
	pub fn last_waited_counter_value(&self) -> u64 {
		self.last_waited_counter_value
	}

	#[inline]
	pub fn allocation_offset(&self) -> u64 {
		self.allocation_offset
	}

	#[inline]
	pub fn is_external_memory(&self) -> bool {
		self.external_memory
	}

	/// Advance the logical counter a future GPU wait will compare against.
	pub fn add_counter_value(&mut self, increment: u64) -> u64 {
		self.counter_value += increment;
		self.counter_value
	}

	/// Record that a wait for `value` has been issued. Only raises, and only for counters
	/// this subsystem owns; external counters may be advanced behind our back.
	pub fn set_last_waited_counter_value(&mut self, value: u64) {
		if !self.external_memory && value > self.last_waited_counter_value {
			self.last_waited_counter_value = value;
		}
	}

	/// True iff a wait for `value` is already known satisfied and no allocation-offset
	/// shift has invalidated the comparison.
	pub fn is_counter_already_done(&self, value: u64) -> bool {
		!self.external_memory && self.last_waited_counter_value >= value
	}

	/// Regenerate instead of zeroing device memory: old values may still be referenced by
	/// in-flight waits, so the counter moves to a fresh offset within its allocation and
	/// all host-side knowledge resets.
	pub fn reset(&mut self) {
		self.allocation_offset += 64;
		self.counter_value = 0;
		self.last_waited_counter_value = 0;
	}
}
