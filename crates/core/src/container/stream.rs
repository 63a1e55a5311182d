use crate::memory::{AllocId, GraphicsAllocation, align_up};
use std::sync::Arc;

/// Append cursor over one command-buffer allocation. The stream holds its own reference to
/// the allocation; the backing bytes are only written through `&mut self`, which upholds
/// the single-CPU-writer contract of [`GraphicsAllocation::cpu_slice_mut`].
pub struct LinearStream {
	id: AllocId,
	alloc: Arc<GraphicsAllocation>,
	used: usize,
}

impl LinearStream {
	pub fn new(id: AllocId, alloc: Arc<GraphicsAllocation>) -> Self {
		Self { id, alloc, used: 0 }
	}

	/// A stream positioned at `offset` into an existing buffer, used to append behind
	/// already recorded commands (e.g. patching a return jump after a client's payload).
	pub fn resume(id: AllocId, alloc: Arc<GraphicsAllocation>, offset: usize) -> Self {
		assert!(offset <= alloc.size());
		Self { id, alloc, used: offset }
	}

	#[inline]
	pub fn id(&self) -> AllocId {
		self.id
	}

	#[inline]
	pub fn allocation(&self) -> &Arc<GraphicsAllocation> {
		&self.alloc
	}

	#[inline]
	pub fn used(&self) -> usize {
		self.used
	}

	#[inline]
	pub fn available(&self) -> usize {
		self.alloc.size() - self.used
	}

	#[inline]
	pub fn capacity(&self) -> usize {
		self.alloc.size()
	}

	/// GPU address of the buffer start.
	#[inline]
	pub fn gpu_base(&self) -> u64 {
		self.alloc.gpu_address()
	}

	/// GPU address of the current append position.
	#[inline]
	pub fn current_gpu_address(&self) -> u64 {
		self.alloc.gpu_address() + self.used as u64
	}

	/// Claim `size` bytes, zero-initialized by the allocation. Returns `None` when the
	/// buffer cannot hold them; the caller decides whether to switch buffers.
	pub fn get_space(&mut self, size: usize) -> Option<&mut [u8]> {
		if size > self.available() {
			return None;
		}
		let offset = self.used;
		self.used += size;
		// Safety: &mut self serializes CPU writers, and [offset, offset+size) was
		// exclusively claimed above.
		Some(unsafe { self.alloc.cpu_slice_mut(offset, size) })
	}

	/// Pad with zeroes until the cursor is `alignment`-aligned.
	pub fn align(&mut self, alignment: usize) -> Option<()> {
		let aligned = align_up(self.used, alignment);
		if aligned > self.capacity() {
			return None;
		}
		self.used = aligned;
		Some(())
	}

	pub fn write_u32(&mut self, value: u32) -> Option<()> {
		self.get_space(4)?.copy_from_slice(&value.to_le_bytes());
		Some(())
	}

	pub fn write_u64(&mut self, value: u64) -> Option<()> {
		self.get_space(8)?.copy_from_slice(&value.to_le_bytes());
		Some(())
	}

	pub fn write_bytes(&mut self, bytes: &[u8]) -> Option<()> {
		self.get_space(bytes.len())?.copy_from_slice(bytes);
		Some(())
	}

	/// Rebind to a fresh buffer, resetting the cursor. Returns the previous buffer's id.
	pub fn replace_buffer(&mut self, id: AllocId, alloc: Arc<GraphicsAllocation>) -> AllocId {
		let old = self.id;
		self.id = id;
		self.alloc = alloc;
		self.used = 0;
		old
	}

	pub fn rewind(&mut self) {
		self.used = 0;
	}

	/// Snapshot of everything recorded so far.
	pub fn recorded(&self) -> &[u8] {
		// Safety: &self guarantees no live &mut [u8] from get_space (those borrow self
		// mutably), so the recorded range is stable.
		unsafe { self.alloc.cpu_slice(0, self.used) }
	}
}
