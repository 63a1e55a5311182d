use crate::error::SubmitResult;
use crate::heap::HeapKind;
use crate::memory::{AllocId, AllocationKind, AllocationProperties, Allocator, GraphicsAllocation, MemoryPool, align_up};
use crate::sync::CompletionObserver;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

struct RetiredHeap {
	id: AllocId,
	engine: usize,
	task_count: u32,
}

/// Reuse cache of retired heap allocations, consulted before the allocator. Buckets are
/// keyed by heap kind and power-of-two size class; an entry only leaves its bucket once
/// the submission that last referenced it is observed retired.
pub struct HeapHelper {
	allocator: Arc<dyn Allocator>,
	observer: Arc<dyn CompletionObserver>,
	pools: Mutex<FxHashMap<(HeapKind, usize), Vec<RetiredHeap>>>,
}

impl HeapHelper {
	pub fn new(allocator: Arc<dyn Allocator>, observer: Arc<dyn CompletionObserver>) -> Arc<Self> {
		Arc::new(Self {
			allocator,
			observer,
			pools: Mutex::new(FxHashMap::default()),
		})
	}

	#[inline]
	pub fn allocator(&self) -> &Arc<dyn Allocator> {
		&self.allocator
	}

	fn size_class(size: usize) -> usize {
		size.next_power_of_two()
	}

	fn allocation_kind(kind: HeapKind) -> AllocationKind {
		if kind.is_global() {
			AllocationKind::BindlessHeap
		} else {
			AllocationKind::IndirectHeap
		}
	}

	/// Get a heap allocation of at least `size` bytes: from the reuse cache when a retired
	/// entry of the right kind and size class exists, else freshly allocated.
	pub fn get_heap_allocation(
		&self,
		kind: HeapKind,
		size: usize,
		alignment: usize,
	) -> SubmitResult<(AllocId, Arc<GraphicsAllocation>)> {
		let size = align_up(size, alignment.max(1));
		let class = Self::size_class(size);
		{
			let mut pools = self.pools.lock();
			if let Some(bucket) = pools.get_mut(&(kind, class)) {
				if let Some(pos) = bucket
					.iter()
					.position(|r| self.observer.peek_task_count(r.engine) >= r.task_count)
				{
					let retired = bucket.swap_remove(pos);
					if let Some(alloc) = self.allocator.resolve(retired.id) {
						return Ok((retired.id, alloc));
					}
					// the owner freed it behind our back, fall through and allocate
				}
			}
		}
		let properties = AllocationProperties {
			size: class,
			alignment,
			kind: Self::allocation_kind(kind),
			pool: MemoryPool::System,
		};
		let id = self.allocator.allocate(&properties)?;
		let alloc = self.allocator.resolve(id).expect("freshly allocated");
		Ok((id, alloc))
	}

	/// Return a replaced heap for later reuse, tagged with the submission that must retire
	/// first.
	pub fn store_heap_allocation(&self, kind: HeapKind, id: AllocId, engine: usize, task_count: u32) {
		let Some(alloc) = self.allocator.resolve(id) else {
			return;
		};
		let class = Self::size_class(alloc.size());
		self.pools
			.lock()
			.entry((kind, class))
			.or_default()
			.push(RetiredHeap { id, engine, task_count });
	}

	/// Entries waiting in the reuse cache, across all buckets.
	pub fn cached_count(&self) -> usize {
		self.pools.lock().values().map(Vec::len).sum()
	}
}
