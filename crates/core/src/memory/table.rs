use crate::error::{SubmissionError, SubmitResult};
use crate::memory::{AllocationKind, AllocationProperties, GraphicsAllocation, align_up};
use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

/// Generation-tagged handle into an [`AllocationTable`]. Copyable and cheap; a stale handle
/// (slot since freed and reused) fails to resolve instead of aliasing new memory.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct AllocId {
	index: u32,
	generation: u32,
}

impl AllocId {
	#[inline]
	pub fn index(&self) -> u32 {
		self.index
	}

	#[inline]
	pub fn generation(&self) -> u32 {
		self.generation
	}
}

impl Debug for AllocId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "AllocId({}v{})", self.index, self.generation)
	}
}

/// Capability consumed from the memory manager. The submission core never owns device
/// memory policy, it only allocates, resolves and frees through this seam.
pub trait Allocator: Send + Sync {
	fn allocate(&self, properties: &AllocationProperties) -> SubmitResult<AllocId>;
	fn free(&self, id: AllocId);
	fn resolve(&self, id: AllocId) -> Option<Arc<GraphicsAllocation>>;
}

struct Slot {
	alloc: Option<Arc<GraphicsAllocation>>,
	generation: u32,
}

/// Process-wide allocation table. GPU virtual addresses are handed out per allocation kind
/// from disjoint windows by a bump cursor; freed addresses are not recycled (the windows
/// are far larger than any realistic budget, and never recycling keeps stale-address bugs
/// loud).
pub struct AllocationTable {
	slots: RwLock<Vec<Slot>>,
	dead: SegQueue<u32>,
	cursors: [AtomicU64; AllocationKind::VALUES.len()],
	budget: AtomicU64,
}

impl AllocationTable {
	pub fn new(budget: usize) -> Arc<Self> {
		Arc::new(Self {
			slots: RwLock::new(Vec::new()),
			dead: SegQueue::new(),
			cursors: [const { AtomicU64::new(0) }; AllocationKind::VALUES.len()],
			budget: AtomicU64::new(budget as u64),
		})
	}

	/// Bytes still available before `allocate` starts failing with
	/// [`SubmissionError::OutOfDeviceMemory`].
	pub fn remaining_budget(&self) -> usize {
		self.budget.load(Relaxed) as usize
	}

	fn take_budget(&self, size: usize) -> bool {
		let size = size as u64;
		let mut old = self.budget.load(Relaxed);
		loop {
			if old < size {
				return false;
			}
			match self.budget.compare_exchange_weak(old, old - size, Relaxed, Relaxed) {
				Ok(_) => return true,
				Err(o) => old = o,
			}
		}
	}

	fn assign_gpu_address(&self, properties: &AllocationProperties) -> u64 {
		let alignment = properties.alignment.max(1) as u64;
		let cursor = &self.cursors[properties.kind.index()];
		let mut old = cursor.load(Relaxed);
		loop {
			let offset = align_up(old as usize, alignment as usize) as u64;
			match cursor.compare_exchange_weak(old, offset + properties.size as u64, Relaxed, Relaxed) {
				Ok(_) => return properties.kind.window_base() + offset,
				Err(o) => old = o,
			}
		}
	}
}

impl Allocator for AllocationTable {
	fn allocate(&self, properties: &AllocationProperties) -> SubmitResult<AllocId> {
		if !self.take_budget(properties.size) {
			return Err(SubmissionError::OutOfDeviceMemory);
		}
		let alloc = Arc::new(GraphicsAllocation::new(
			properties.size,
			self.assign_gpu_address(properties),
			properties.kind,
			properties.pool,
		));

		if let Some(index) = self.dead.pop() {
			let mut slots = self.slots.write();
			let slot = &mut slots[index as usize];
			debug_assert!(slot.alloc.is_none());
			slot.alloc = Some(alloc);
			Ok(AllocId {
				index,
				generation: slot.generation,
			})
		} else {
			let mut slots = self.slots.write();
			let index = slots.len() as u32;
			slots.push(Slot {
				alloc: Some(alloc),
				generation: 0,
			});
			Ok(AllocId { index, generation: 0 })
		}
	}

	fn free(&self, id: AllocId) {
		let mut slots = self.slots.write();
		let Some(slot) = slots.get_mut(id.index as usize) else {
			return;
		};
		// stale handle, the slot has moved on
		if slot.generation != id.generation {
			return;
		}
		if let Some(alloc) = slot.alloc.take() {
			self.budget.fetch_add(alloc.size() as u64, Relaxed);
			slot.generation += 1;
			drop(slots);
			self.dead.push(id.index);
		}
	}

	fn resolve(&self, id: AllocId) -> Option<Arc<GraphicsAllocation>> {
		let slots = self.slots.read();
		let slot = slots.get(id.index as usize)?;
		if slot.generation != id.generation {
			return None;
		}
		slot.alloc.clone()
	}
}
