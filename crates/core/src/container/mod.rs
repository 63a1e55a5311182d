mod stream;

pub use stream::*;

use crate::config::SubmissionConfig;
use crate::encode::Encoder;
use crate::error::{SubmissionError, SubmitResult};
use crate::heap::{HeapHelper, HeapKind, HeapSpace, IndirectHeap};
use crate::memory::{AllocId, AllocationKind, AllocationProperties, ResidencyContainer, align_up};
use smallvec::SmallVec;
use std::sync::Arc;

/// Owns one active command buffer plus one indirect heap per kind. Exactly one command
/// buffer receives writes at any time; closed buffers are either chained-from (a jump at
/// their tail targets the next buffer) or parked for reuse.
pub struct CommandContainer {
	heap_helper: Arc<HeapHelper>,
	encoder: Arc<dyn Encoder>,
	engine: usize,
	command_stream: LinearStream,
	/// Every command buffer this container allocated, first one first; the last entry is
	/// the buffer currently receiving writes.
	command_buffers: SmallVec<[AllocId; 4]>,
	heaps: [Option<IndirectHeap>; HeapKind::CONTAINER_KINDS.len()],
	residency: ResidencyContainer,
	/// Heap allocations replaced while recording; they stay resident until the owning
	/// command buffer's task count retires, then become reusable.
	deallocation_list: Vec<AllocId>,
	default_heap_size: usize,
	command_buffer_size: usize,
	/// Primary batch buffer model: closing a buffer requires a chaining jump into its
	/// successor.
	primary_chaining: bool,
}

impl CommandContainer {
	/// Allocate the first command buffer and, if requested, each indirect heap, recording
	/// every allocation in the residency container.
	pub fn initialize(
		heap_helper: Arc<HeapHelper>,
		encoder: Arc<dyn Encoder>,
		engine: usize,
		config: &SubmissionConfig,
		needs_heaps: bool,
		primary_chaining: bool,
	) -> SubmitResult<Self> {
		let allocator = heap_helper.allocator().clone();
		let buffer_id = allocator.allocate(&AllocationProperties::new(
			config.command_buffer_size,
			AllocationKind::CommandBuffer,
		))?;
		let buffer = allocator.resolve(buffer_id).expect("freshly allocated");

		let mut residency = ResidencyContainer::new();
		residency.add(buffer_id);

		let mut heaps = [None, None, None];
		if needs_heaps {
			for (slot, kind) in heaps.iter_mut().zip(HeapKind::CONTAINER_KINDS) {
				let (id, alloc) =
					heap_helper.get_heap_allocation(kind, config.default_heap_size, encoder.heap_alignment())?;
				residency.add(id);
				*slot = Some(IndirectHeap::new(id, alloc, kind));
			}
		}

		Ok(Self {
			heap_helper,
			encoder,
			engine,
			command_stream: LinearStream::new(buffer_id, buffer),
			command_buffers: SmallVec::from_slice(&[buffer_id]),
			heaps,
			residency,
			deallocation_list: Vec::new(),
			default_heap_size: config.default_heap_size,
			command_buffer_size: config.command_buffer_size,
			primary_chaining,
		})
	}

	#[inline]
	pub fn command_stream(&self) -> &LinearStream {
		&self.command_stream
	}

	#[inline]
	pub fn command_stream_mut(&mut self) -> &mut LinearStream {
		&mut self.command_stream
	}

	#[inline]
	pub fn residency(&self) -> &ResidencyContainer {
		&self.residency
	}

	#[inline]
	pub fn residency_mut(&mut self) -> &mut ResidencyContainer {
		&mut self.residency
	}

	#[inline]
	pub fn deallocation_list(&self) -> &[AllocId] {
		&self.deallocation_list
	}

	#[inline]
	pub fn engine(&self) -> usize {
		self.engine
	}

	pub fn heap(&self, kind: HeapKind) -> Option<&IndirectHeap> {
		self.heaps[kind.container_index()?].as_ref()
	}

	fn heap_mut(&mut self, kind: HeapKind) -> &mut IndirectHeap {
		let index = kind.container_index().expect("container heap kind");
		self.heaps[index].as_mut().expect("container initialized without heaps")
	}

	/// Close the current command buffer and make a fresh one current. Under the primary
	/// batch buffer model the old buffer's tail gets a jump targeting the new buffer's
	/// GPU address; otherwise the old buffer simply ends.
	pub fn allocate_next_command_buffer(&mut self) -> SubmitResult<()> {
		let allocator = self.heap_helper.allocator().clone();
		let id = allocator.allocate(&AllocationProperties::new(
			self.command_buffer_size,
			AllocationKind::CommandBuffer,
		))?;
		let alloc = allocator.resolve(id).expect("freshly allocated");

		if self.primary_chaining {
			self.encoder
				.encode_batch_buffer_start(&mut self.command_stream, alloc.gpu_address(), false)?;
		} else {
			self.encoder.encode_batch_buffer_end(&mut self.command_stream)?;
		}

		self.command_stream.replace_buffer(id, alloc);
		self.command_buffers.push(id);
		self.residency.add(id);
		Ok(())
	}

	/// Rewind to a fresh recording state: every command buffer beyond the first and every
	/// replaced heap go to `free_list`, the first buffer's stream and the heap cursors
	/// rewind, and the residency set is rebuilt from the allocations live now. Heaps
	/// replaced while recording keep their replacement, so the set after a reset is not
	/// necessarily the one `initialize` produced.
	pub fn reset(&mut self, free_list: &mut Vec<AllocId>) {
		let allocator = self.heap_helper.allocator();
		let first = self.command_buffers[0];
		for id in self.command_buffers.drain(1..) {
			free_list.push(id);
		}
		free_list.append(&mut self.deallocation_list);

		if self.command_stream.id() != first {
			let alloc = allocator.resolve(first).expect("first command buffer is never freed");
			self.command_stream.replace_buffer(first, alloc);
		}
		self.command_stream.rewind();

		self.residency.clear();
		self.residency.add(first);
		for heap in self.heaps.iter_mut().flatten() {
			heap.rewind();
			heap.clear_dirty();
			self.residency.add(heap.id());
		}
	}

	fn replace_heap(&mut self, kind: HeapKind, required_size: usize, alignment: usize) -> SubmitResult<()> {
		let size = align_up(required_size.max(self.default_heap_size), alignment);
		let (id, alloc) = self.heap_helper.get_heap_allocation(kind, size, alignment)?;
		self.residency.add(id);
		let old = self.heap_mut(kind).replace_allocation(id, alloc);
		self.deallocation_list.push(old);
		Ok(())
	}

	/// Return the heap of `kind` with `size` bytes of `alignment`-aligned space free,
	/// replacing it if necessary. The `bool` reports whether a replacement happened, which
	/// obliges the caller to reprogram state base addresses.
	pub fn get_heap_with_required_size_and_alignment(
		&mut self,
		kind: HeapKind,
		size: usize,
		alignment: usize,
	) -> SubmitResult<(&mut IndirectHeap, bool)> {
		let mut replaced = false;
		if !self.heap_mut(kind).has_space_aligned(size, alignment) {
			self.replace_heap(kind, size, alignment)?;
			replaced = true;
		}
		Ok((self.heap_mut(kind), replaced))
	}

	/// Claim `size` bytes from the heap of `kind`, replacing a full heap with a
	/// default-sized one. Requests above the default heap size are refused; use
	/// [`Self::get_space_allow_grow`] for those.
	pub fn get_space(&mut self, kind: HeapKind, size: usize) -> SubmitResult<HeapSpace> {
		if size > self.default_heap_size {
			return Err(SubmissionError::OutOfDeviceMemory);
		}
		if let Some(space) = self.heap_mut(kind).get_space(size) {
			return Ok(space);
		}
		self.replace_heap(kind, size, 1)?;
		Ok(self.heap_mut(kind).get_space(size).expect("fresh heap fits request"))
	}

	/// Like [`Self::get_space`], but a single request larger than the default heap size
	/// grows the replacement allocation instead of failing.
	pub fn get_space_allow_grow(&mut self, kind: HeapKind, size: usize) -> SubmitResult<HeapSpace> {
		if let Some(space) = self.heap_mut(kind).get_space(size) {
			return Ok(space);
		}
		self.replace_heap(kind, size, 1)?;
		Ok(self.heap_mut(kind).get_space(size).expect("grown heap fits request"))
	}

	/// True when any heap's base moved since dirty flags were last cleared.
	pub fn any_heap_dirty(&self) -> bool {
		self.heaps.iter().flatten().any(|h| h.is_dirty())
	}

	pub fn clear_heap_dirty(&mut self) {
		for heap in self.heaps.iter_mut().flatten() {
			heap.clear_dirty();
		}
	}
}
