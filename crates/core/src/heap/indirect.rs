use crate::heap::{HeapKind, HeapSpace};
use crate::memory::{AllocId, GraphicsAllocation, align_up};
use std::sync::Arc;

/// Bump-allocated linear region backed by exactly one allocation. A heap that runs out of
/// space is replaced, never grown in place: the old allocation keeps its GPU address until
/// the hardware retires everything referencing it, and the dirty flag tells the state
/// base address programmer that the base moved.
pub struct IndirectHeap {
	id: AllocId,
	alloc: Arc<GraphicsAllocation>,
	kind: HeapKind,
	used: usize,
	dirty: bool,
}

impl IndirectHeap {
	pub fn new(id: AllocId, alloc: Arc<GraphicsAllocation>, kind: HeapKind) -> Self {
		Self {
			id,
			alloc,
			kind,
			used: 0,
			dirty: false,
		}
	}

	#[inline]
	pub fn id(&self) -> AllocId {
		self.id
	}

	#[inline]
	pub fn kind(&self) -> HeapKind {
		self.kind
	}

	#[inline]
	pub fn used(&self) -> usize {
		self.used
	}

	#[inline]
	pub fn capacity(&self) -> usize {
		self.alloc.size()
	}

	#[inline]
	pub fn available(&self) -> usize {
		self.capacity() - self.used
	}

	#[inline]
	pub fn gpu_base(&self) -> u64 {
		self.alloc.gpu_address()
	}

	#[inline]
	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	pub fn clear_dirty(&mut self) {
		self.dirty = false;
	}

	/// Move the cursor back to the heap base; the backing allocation stays.
	pub fn rewind(&mut self) {
		self.used = 0;
	}

	/// Claim `size` contiguous bytes. `None` means the current backing allocation cannot
	/// hold them and the caller must replace the heap.
	pub fn get_space(&mut self, size: usize) -> Option<HeapSpace> {
		if size > self.available() {
			return None;
		}
		let heap_offset = self.used;
		self.used += size;
		Some(HeapSpace {
			heap_offset,
			gpu_address: self.gpu_base() + heap_offset as u64,
			size,
		})
	}

	/// Claim `size` bytes starting at an `alignment`-aligned offset.
	pub fn get_space_aligned(&mut self, size: usize, alignment: usize) -> Option<HeapSpace> {
		let aligned = align_up(self.used, alignment);
		if aligned + size > self.capacity() {
			return None;
		}
		self.used = aligned;
		self.get_space(size)
	}

	/// True when the heap could satisfy `get_space_aligned(size, alignment)` right now.
	pub fn has_space_aligned(&self, size: usize, alignment: usize) -> bool {
		align_up(self.used, alignment) + size <= self.capacity()
	}

	/// Copy `bytes` into a previously claimed region.
	pub fn write(&mut self, space: &HeapSpace, bytes: &[u8]) {
		assert!(bytes.len() <= space.size);
		// Safety: &mut self serializes writers and `space` was claimed from this heap.
		unsafe { self.alloc.cpu_slice_mut(space.heap_offset, bytes.len()) }.copy_from_slice(bytes);
	}

	/// Rebind to a fresh allocation, rewinding the cursor and marking the heap dirty.
	/// Returns the replaced allocation's id; live content is never copied over.
	pub fn replace_allocation(&mut self, id: AllocId, alloc: Arc<GraphicsAllocation>) -> AllocId {
		let old = self.id;
		self.id = id;
		self.alloc = alloc;
		self.used = 0;
		self.dirty = true;
		old
	}
}
