mod allocation;
mod residency;
mod table;

pub use allocation::*;
pub use residency::*;
pub use table::*;

use static_assertions::const_assert;

/// Number of engines an allocation tracks task counts for.
pub const MAX_ENGINES: usize = 4;

// the per-kind VA windows must all fit below the canonical 48-bit address limit
const_assert!((AllocationKind::VALUES.len() as u64 + 1) << 40 <= 1 << 48);
const_assert!(MAX_ENGINES <= 64);

/// Where an allocation's backing memory lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MemoryPool {
	#[default]
	System,
	LocalMemory,
	SystemCpuInaccessible,
}

/// What an allocation is used for. Each kind draws GPU virtual addresses from its own
/// address window, so heaps of different kinds can never alias.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AllocationKind {
	CommandBuffer,
	IndirectHeap,
	BindlessHeap,
	RingBuffer,
	SemaphorePage,
	TagBuffer,
	CounterBuffer,
	Scratch,
}

impl AllocationKind {
	pub const VALUES: [AllocationKind; 8] = [
		AllocationKind::CommandBuffer,
		AllocationKind::IndirectHeap,
		AllocationKind::BindlessHeap,
		AllocationKind::RingBuffer,
		AllocationKind::SemaphorePage,
		AllocationKind::TagBuffer,
		AllocationKind::CounterBuffer,
		AllocationKind::Scratch,
	];

	pub fn index(&self) -> usize {
		Self::VALUES.iter().position(|k| k == self).unwrap()
	}

	/// Base of this kind's GPU virtual address window. Windows are 1 TiB apart, far larger
	/// than any budget the table will hand out.
	pub fn window_base(&self) -> u64 {
		((self.index() as u64) + 1) << 40
	}
}

/// Base of the bindless surface state window. The special/global heaps are placed at the
/// very start of it so that slot 0 sits at a known fixed offset.
pub const BINDLESS_WINDOW_BASE: u64 = 3 << 40;

#[derive(Debug, Clone)]
pub struct AllocationProperties {
	pub size: usize,
	pub alignment: usize,
	pub kind: AllocationKind,
	pub pool: MemoryPool,
}

impl AllocationProperties {
	pub fn new(size: usize, kind: AllocationKind) -> Self {
		Self {
			size,
			alignment: 64,
			kind,
			pool: MemoryPool::System,
		}
	}
}

/// Round `value` up to the next multiple of `alignment`. `alignment` must be a power of two.
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
	debug_assert!(alignment.is_power_of_two());
	(value + alignment - 1) & !(alignment - 1)
}
