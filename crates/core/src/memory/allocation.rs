use crate::memory::{AllocationKind, MAX_ENGINES, MemoryPool};
use std::cell::UnsafeCell;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed};

/// A GPU-addressable memory region: CPU-visible backing storage, an assigned GPU virtual
/// address, and a per-engine record of the last submission that referenced it.
///
/// Storage is interior-mutable because command streams write through a shared handle while
/// the allocation table keeps its own reference. Exactly one CPU writer may touch a region
/// at a time; after submission the contents are never mutated again (the GPU side only
/// reads, and only writes to dedicated tag/semaphore pages through their atomics).
pub struct GraphicsAllocation {
	storage: Box<[UnsafeCell<u8>]>,
	gpu_address: u64,
	kind: AllocationKind,
	pool: MemoryPool,
	task_counts: [AtomicU32; MAX_ENGINES],
}

unsafe impl Send for GraphicsAllocation {}
unsafe impl Sync for GraphicsAllocation {}

impl GraphicsAllocation {
	pub(crate) fn new(size: usize, gpu_address: u64, kind: AllocationKind, pool: MemoryPool) -> Self {
		Self {
			storage: (0..size).map(|_| UnsafeCell::new(0)).collect(),
			gpu_address,
			kind,
			pool,
			task_counts: [const { AtomicU32::new(0) }; MAX_ENGINES],
		}
	}

	#[inline]
	pub fn size(&self) -> usize {
		self.storage.len()
	}

	#[inline]
	pub fn gpu_address(&self) -> u64 {
		self.gpu_address
	}

	#[inline]
	pub fn kind(&self) -> AllocationKind {
		self.kind
	}

	#[inline]
	pub fn pool(&self) -> MemoryPool {
		self.pool
	}

	/// Mutable view of `[offset, offset + len)`.
	///
	/// # Safety
	/// The caller must be the only CPU writer of this range for the lifetime of the slice,
	/// and the range must not be concurrently read by a consumer of submitted work.
	#[allow(clippy::mut_from_ref)]
	pub unsafe fn cpu_slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
		assert!(offset + len <= self.storage.len());
		if len == 0 {
			return &mut [];
		}
		unsafe { std::slice::from_raw_parts_mut(self.storage[offset].get(), len) }
	}

	/// Read-only snapshot of `[offset, offset + len)`.
	///
	/// # Safety
	/// No CPU writer may hold a live mutable slice over this range.
	pub unsafe fn cpu_slice(&self, offset: usize, len: usize) -> &[u8] {
		assert!(offset + len <= self.storage.len());
		if len == 0 {
			return &[];
		}
		unsafe { std::slice::from_raw_parts(self.storage[offset].get(), len) }
	}

	/// Record that `count` was the latest submission on `engine` referencing this
	/// allocation. Task counts only ever advance.
	pub fn update_task_count(&self, engine: usize, count: u32) {
		self.task_counts[engine].fetch_max(count, Relaxed);
	}

	pub fn task_count(&self, engine: usize) -> u32 {
		self.task_counts[engine].load(Acquire)
	}
}

impl Debug for GraphicsAllocation {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GraphicsAllocation")
			.field("gpu_address", &format_args!("{:#x}", self.gpu_address))
			.field("size", &self.size())
			.field("kind", &self.kind)
			.field("pool", &self.pool)
			.finish()
	}
}
