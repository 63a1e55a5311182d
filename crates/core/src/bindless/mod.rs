use crate::config::SubmissionConfig;
use crate::error::SubmitResult;
use crate::heap::{HeapHelper, HeapKind, IndirectHeap};
use crate::memory::{AllocId, BINDLESS_WINDOW_BASE, MAX_ENGINES};
use crate::sync::CompletionObserver;
use parking_lot::ReentrantMutex;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::Ordering::{Relaxed, SeqCst};
use std::sync::atomic::{AtomicU32, AtomicU64};

/// A descriptor slot inside a shared bindless heap: where it sits in the heap, its offset
/// from the bindless window base (what the GPU addresses it by), and its size.
///
/// Slots are released back to a reuse pool while the backing heap allocation stays live;
/// they are never freed individually.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SurfaceStateInHeapInfo {
	pub heap_offset: usize,
	pub gpu_offset: u64,
	pub size: usize,
}

/// Slot sizes are bucketed into power-of-two classes, minimum one cache line.
const MIN_SLOT_SIZE: usize = 64;

/// Space reserved at the very base of the global surface state heap for the default
/// (alpha) border color state, addressable at a known fixed offset.
const BORDER_COLOR_SIZE: usize = MIN_SLOT_SIZE;

struct SlotPool {
	/// Two reuse generations: pops serve from `gens[allocate]`, pushes go to the other
	/// one, and the roles flip on a generation swap. The flip gives released slots a
	/// grace period before reuse.
	gens: [Vec<SurfaceStateInHeapInfo>; 2],
	allocate: usize,
	/// Per-engine task counts that must retire before the release generation may become
	/// the allocate generation. The swap threshold alone is a heuristic; this check makes
	/// eligibility explicit.
	release_fence: [u32; MAX_ENGINES],
}

impl SlotPool {
	fn new() -> Self {
		Self {
			gens: [Vec::new(), Vec::new()],
			allocate: 0,
			release_fence: [0; MAX_ENGINES],
		}
	}
}

struct Heaps {
	surface: IndirectHeap,
	dynamic: IndirectHeap,
	/// Replaced (grown-out-of) heap allocations, kept resident until their referencing
	/// submissions retire.
	past_heaps: Vec<AllocId>,
	pools: FxHashMap<usize, SlotPool>,
}

/// Shared manager for descriptor ("surface state") slots referenced by GPU-visible offset
/// across many command lists.
///
/// Reservation and growth hold a recursive lock for their whole duration: growth allocates
/// through the heap helper, and no other thread's slot pop/push may interleave with it.
pub struct BindlessHeapsHelper {
	heap_helper: Arc<HeapHelper>,
	observer: Arc<dyn CompletionObserver>,
	heaps: ReentrantMutex<RefCell<Heaps>>,
	reuse_slot_count_threshold: usize,
	default_heap_size: usize,
	/// One bit per registered submission context; set on every generation swap to signal
	/// that cached descriptor state referencing reused offsets must be invalidated.
	state_cache_dirty: AtomicU64,
	next_context: AtomicU32,
	/// High-water task count per engine across everything submitted while slots from the
	/// current pools were live.
	last_submitted: [AtomicU32; MAX_ENGINES],
}

impl BindlessHeapsHelper {
	pub fn new(
		heap_helper: Arc<HeapHelper>,
		observer: Arc<dyn CompletionObserver>,
		config: &SubmissionConfig,
	) -> SubmitResult<Arc<Self>> {
		// global heaps sit at the very base of the bindless window so slot 0 has a fixed,
		// known offset
		let (surface_id, surface_alloc) =
			heap_helper.get_heap_allocation(HeapKind::GlobalSurfaceState, config.default_heap_size, MIN_SLOT_SIZE)?;
		let (dynamic_id, dynamic_alloc) =
			heap_helper.get_heap_allocation(HeapKind::GlobalDynamicState, config.default_heap_size, MIN_SLOT_SIZE)?;

		let mut surface = IndirectHeap::new(surface_id, surface_alloc, HeapKind::GlobalSurfaceState);
		surface.get_space(BORDER_COLOR_SIZE).expect("fresh heap holds the border color slot");

		Ok(Arc::new(Self {
			heap_helper,
			observer,
			heaps: ReentrantMutex::new(RefCell::new(Heaps {
				surface,
				dynamic: IndirectHeap::new(dynamic_id, dynamic_alloc, HeapKind::GlobalDynamicState),
				past_heaps: Vec::new(),
				pools: FxHashMap::default(),
			})),
			reuse_slot_count_threshold: config.reuse_slot_count_threshold,
			default_heap_size: config.default_heap_size,
			state_cache_dirty: AtomicU64::new(0),
			next_context: AtomicU32::new(0),
			last_submitted: [const { AtomicU32::new(0) }; MAX_ENGINES],
		}))
	}

	/// Shared-heap descriptor allocation is opt-in; `None` when the configuration keeps
	/// surface state in per-container heaps.
	pub fn new_if_enabled(
		heap_helper: Arc<HeapHelper>,
		observer: Arc<dyn CompletionObserver>,
		config: &SubmissionConfig,
	) -> SubmitResult<Option<Arc<Self>>> {
		if !config.use_bindless {
			return Ok(None);
		}
		Self::new(heap_helper, observer, config).map(Some)
	}

	/// GPU offset of the default border color state, fixed at the window base.
	pub fn default_border_color_offset(&self) -> u64 {
		0
	}

	/// Register a submission context for state-cache-dirty tracking.
	pub fn register_context(&self) -> u32 {
		let id = self.next_context.fetch_add(1, Relaxed);
		assert!(id < u64::BITS, "out of context bits");
		id
	}

	pub fn state_cache_dirty_for_context(&self, context: u32) -> bool {
		self.state_cache_dirty.load(SeqCst) & (1 << context) != 0
	}

	pub fn clear_state_cache_dirty_for_context(&self, context: u32) {
		self.state_cache_dirty.fetch_and(!(1 << context), SeqCst);
	}

	/// Record that `task_count` was submitted on `engine` while pool slots were live;
	/// generation swaps wait for it.
	pub fn notify_submission(&self, engine: usize, task_count: u32) {
		self.last_submitted[engine].fetch_max(task_count, Relaxed);
	}

	fn size_class(size: usize) -> usize {
		size.max(MIN_SLOT_SIZE).next_power_of_two()
	}

	fn heap_of<'a>(heaps: &'a mut Heaps, kind: HeapKind) -> &'a mut IndirectHeap {
		match kind {
			HeapKind::GlobalDynamicState => &mut heaps.dynamic,
			_ => &mut heaps.surface,
		}
	}

	/// Allocate a descriptor slot of at least `size` bytes: from the current allocate
	/// generation when a matching size class is pooled, else bump-allocated from the live
	/// heap, growing it when full.
	pub fn allocate_ss_in_heap(
		&self,
		size: usize,
		_owner: AllocId,
		kind: HeapKind,
	) -> SubmitResult<SurfaceStateInHeapInfo> {
		assert!(kind.is_global(), "bindless slots live in the global heaps");
		let class = Self::size_class(size);
		let guard = self.heaps.lock();
		let mut heaps = guard.borrow_mut();

		if let Some(pool) = heaps.pools.get_mut(&class) {
			let allocate = pool.allocate;
			if let Some(info) = pool.gens[allocate].pop() {
				return Ok(info);
			}
		}

		let space = match Self::heap_of(&mut heaps, kind).get_space_aligned(class, MIN_SLOT_SIZE) {
			Some(space) => space,
			None => {
				let (id, alloc) =
					self.heap_helper
						.get_heap_allocation(kind, class.max(self.default_heap_size), MIN_SLOT_SIZE)?;
				let old = Self::heap_of(&mut heaps, kind).replace_allocation(id, alloc);
				heaps.past_heaps.push(old);
				Self::heap_of(&mut heaps, kind)
					.get_space_aligned(class, MIN_SLOT_SIZE)
					.expect("fresh heap fits slot")
			}
		};
		Ok(SurfaceStateInHeapInfo {
			heap_offset: space.heap_offset,
			gpu_offset: space.gpu_address - BINDLESS_WINDOW_BASE,
			size: class,
		})
	}

	/// Return a slot to the release generation. Once the release generation outgrows the
	/// configured threshold *and* every submission recorded since is observed retired, the
	/// generations swap and every context's state cache dirty bit is raised.
	pub fn release_ss_to_reuse_pool(&self, info: SurfaceStateInHeapInfo) {
		let class = Self::size_class(info.size);
		let guard = self.heaps.lock();
		let mut heaps = guard.borrow_mut();
		let pool = heaps.pools.entry(class).or_insert_with(SlotPool::new);

		for (engine, fence) in pool.release_fence.iter_mut().enumerate() {
			*fence = (*fence).max(self.last_submitted[engine].load(Relaxed));
		}
		let release = 1 - pool.allocate;
		pool.gens[release].push(info);

		if pool.gens[release].len() > self.reuse_slot_count_threshold && self.release_fence_retired(pool) {
			pool.allocate = release;
			pool.release_fence = [0; MAX_ENGINES];
			self.state_cache_dirty.store(u64::MAX, SeqCst);
		}
	}

	fn release_fence_retired(&self, pool: &SlotPool) -> bool {
		pool.release_fence
			.iter()
			.enumerate()
			.all(|(engine, fence)| self.observer.peek_task_count(engine) >= *fence)
	}

	/// Heap allocations (current and grown-out-of) a submission referencing bindless
	/// slots must keep resident.
	pub fn resident_heaps(&self) -> Vec<AllocId> {
		let guard = self.heaps.lock();
		let heaps = guard.borrow();
		let mut ids = vec![heaps.surface.id(), heaps.dynamic.id()];
		ids.extend_from_slice(&heaps.past_heaps);
		ids
	}
}
