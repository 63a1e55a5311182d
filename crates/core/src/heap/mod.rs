mod helper;
mod indirect;

pub use helper::*;
pub use indirect::*;

/// The auxiliary descriptor heaps a command container carries, plus the two shared heaps
/// owned by the bindless helper.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeapKind {
	Instruction,
	SurfaceState,
	DynamicState,
	GlobalSurfaceState,
	GlobalDynamicState,
}

impl HeapKind {
	/// The per-container kinds, in the order a container stores them.
	pub const CONTAINER_KINDS: [HeapKind; 3] = [HeapKind::Instruction, HeapKind::SurfaceState, HeapKind::DynamicState];

	pub fn container_index(&self) -> Option<usize> {
		Self::CONTAINER_KINDS.iter().position(|k| k == self)
	}

	pub fn is_global(&self) -> bool {
		matches!(self, HeapKind::GlobalSurfaceState | HeapKind::GlobalDynamicState)
	}
}

/// A claimed region inside an indirect heap, identified by offsets rather than pointers.
/// Writing through it goes via [`IndirectHeap::write`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapSpace {
	pub heap_offset: usize,
	pub gpu_address: u64,
	pub size: usize,
}
