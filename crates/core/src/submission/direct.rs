use crate::config::SubmissionConfig;
use crate::container::LinearStream;
use crate::encode::{Encoder, SemaphoreOp};
use crate::error::{SubmissionError, SubmitResult};
use crate::memory::{
	align_up, AllocId, AllocationKind, AllocationProperties, Allocator, GraphicsAllocation, MemoryPool,
	ResidencyContainer,
};
use crate::submission::BatchBuffer;
use crate::sync::CompletionObserver;
use std::sync::Arc;
use std::time::Duration;

/// Offset of the submission gate counter inside the semaphore page.
const SEMAPHORE_GATE_OFFSET: usize = 0;
/// Offset of the paging fence counter inside the semaphore page.
const PAGING_FENCE_OFFSET: usize = 64;
const SEMAPHORE_PAGE_SIZE: usize = 4096;

/// Ring buffers the pool cycles through. A ring only becomes reusable once the completion
/// fence recorded at its retirement is observed retired.
struct RingBufferUse {
	id: AllocId,
	alloc: Arc<GraphicsAllocation>,
	completion_fence: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RingState {
	Uninitialized,
	Running,
	Stopped,
}

/// Persistent GPU-polled submission ring. The hardware context is started once and then
/// parks on a semaphore wait at the ring tail; each dispatch appends the next workload
/// section behind the parked wait and bumps the gate value in the semaphore page, so no
/// kernel round trip happens per submission.
///
/// Every dispatched section is self-contained: optional paging fence wait, the workload
/// (inline copy or a jump into the client buffer with a patched return jump), an optional
/// monitor fence, and the next parked semaphore wait.
pub struct DirectSubmissionHw {
	allocator: Arc<dyn Allocator>,
	encoder: Arc<dyn Encoder>,
	observer: Arc<dyn CompletionObserver>,
	engine: usize,

	ring_buffer_size: usize,
	max_ring_buffers: usize,
	inline_copy_threshold: usize,
	disable_monitor_fence: bool,
	relaxed_ordering: bool,
	relaxed_ordering_queue_depth: usize,
	wait_timeout: Duration,

	rings: Vec<RingBufferUse>,
	current_ring: usize,
	stream: Option<LinearStream>,

	semaphore_id: AllocId,
	semaphore_alloc: Arc<GraphicsAllocation>,
	/// Value the parked semaphore wait at the ring tail is polling for.
	semaphore_target: u64,

	state: RingState,
	started: bool,
	last_task_count: u32,
	relaxed_targets: Vec<u64>,

	ring_switch_count: u32,
	monitor_fence_count: u32,
	scheduler_dispatch_count: u32,
}

impl DirectSubmissionHw {
	pub fn new(
		allocator: Arc<dyn Allocator>,
		encoder: Arc<dyn Encoder>,
		observer: Arc<dyn CompletionObserver>,
		engine: usize,
		config: &SubmissionConfig,
	) -> SubmitResult<Self> {
		let semaphore_id = allocator.allocate(&AllocationProperties {
			size: SEMAPHORE_PAGE_SIZE,
			alignment: 4096,
			kind: AllocationKind::SemaphorePage,
			pool: MemoryPool::System,
		})?;
		let semaphore_alloc = allocator.resolve(semaphore_id).expect("freshly allocated");
		Ok(Self {
			allocator,
			encoder,
			observer,
			engine,
			ring_buffer_size: config.ring_buffer_size,
			max_ring_buffers: config.max_ring_buffers.max(2),
			inline_copy_threshold: config.ring_inline_copy_threshold,
			disable_monitor_fence: config.disable_monitor_fence,
			relaxed_ordering: config.relaxed_ordering,
			relaxed_ordering_queue_depth: config.relaxed_ordering_queue_depth,
			wait_timeout: Duration::from_millis(config.wait_timeout_ms),
			rings: Vec::new(),
			current_ring: 0,
			stream: None,
			semaphore_id,
			semaphore_alloc,
			semaphore_target: 1,
			state: RingState::Uninitialized,
			started: false,
			last_task_count: 0,
			relaxed_targets: Vec::new(),
			ring_switch_count: 0,
			monitor_fence_count: 0,
			scheduler_dispatch_count: 0,
		})
	}

	fn allocate_ring(&mut self) -> SubmitResult<usize> {
		let id = self.allocator.allocate(&AllocationProperties {
			size: self.ring_buffer_size,
			alignment: 4096,
			kind: AllocationKind::RingBuffer,
			pool: MemoryPool::System,
		})?;
		let alloc = self.allocator.resolve(id).expect("freshly allocated");
		self.rings.push(RingBufferUse {
			id,
			alloc,
			completion_fence: 0,
		});
		Ok(self.rings.len() - 1)
	}

	/// Allocate the semaphore page and the initial ring pair and park the context on the
	/// first semaphore wait. With `submit_on_init` false the parked wait is deferred until
	/// the first dispatch.
	pub fn initialize(&mut self, submit_on_init: bool) -> SubmitResult<()> {
		assert_eq!(self.state, RingState::Uninitialized, "ring already initialized");
		self.allocate_ring()?;
		self.allocate_ring()?;
		let ring = &self.rings[0];
		self.stream = Some(LinearStream::new(ring.id, ring.alloc.clone()));
		self.state = RingState::Running;
		if submit_on_init {
			self.dispatch_parked_wait()?;
			self.started = true;
		}
		Ok(())
	}

	fn semaphore_gate_address(&self) -> u64 {
		self.semaphore_alloc.gpu_address() + SEMAPHORE_GATE_OFFSET as u64
	}

	fn paging_fence_address(&self) -> u64 {
		self.semaphore_alloc.gpu_address() + PAGING_FENCE_OFFSET as u64
	}

	/// Gate value currently published to the GPU.
	pub fn semaphore_gate(&self) -> u64 {
		// Safety: concurrent CPU writes go through &mut self; read of a fully written page.
		let bytes = unsafe { self.semaphore_alloc.cpu_slice(SEMAPHORE_GATE_OFFSET, 8) };
		u64::from_le_bytes(bytes.try_into().expect("8 byte slice"))
	}

	fn publish_semaphore_gate(&mut self, value: u64) {
		// Safety: &mut self is the only CPU writer of the semaphore page.
		let bytes = unsafe { self.semaphore_alloc.cpu_slice_mut(SEMAPHORE_GATE_OFFSET, 8) };
		bytes.copy_from_slice(&value.to_le_bytes());
	}

	/// Publish a paging fence value the GPU may be parked on.
	pub fn signal_paging_fence(&mut self, value: u64) {
		// Safety: &mut self is the only CPU writer of the semaphore page.
		let bytes = unsafe { self.semaphore_alloc.cpu_slice_mut(PAGING_FENCE_OFFSET, 8) };
		bytes.copy_from_slice(&value.to_le_bytes());
	}

	fn stream_mut(&mut self) -> &mut LinearStream {
		self.stream.as_mut().expect("ring initialized")
	}

	fn dispatch_parked_wait(&mut self) -> SubmitResult<()> {
		let address = self.semaphore_gate_address();
		let target = self.semaphore_target;
		let encoder = self.encoder.clone();
		encoder.encode_semaphore_wait(self.stream_mut(), address, target, SemaphoreOp::GreaterOrEqual)
	}

	fn workload_uses_relaxed_ordering(&self, batch: &BatchBuffer) -> bool {
		self.relaxed_ordering
			&& batch.relaxed_ordering_allowed
			&& self.relaxed_targets.len() < self.relaxed_ordering_queue_depth
	}

	/// Ring bytes one dispatch of `batch` will consume, given the current ring state.
	pub fn dispatch_required_size(&self, batch: &BatchBuffer, has_paging_fence: bool) -> usize {
		let e = &self.encoder;
		let mut size = 0;
		if !self.started {
			size += e.semaphore_wait_size();
		}
		if has_paging_fence {
			size += e.semaphore_wait_size();
		}
		if batch.used_size <= self.inline_copy_threshold {
			size += align_up(batch.used_size, 8);
		} else if self.workload_uses_relaxed_ordering(batch) {
			size += e.scheduler_size(self.relaxed_targets.len() + 1);
		} else {
			size += e.batch_buffer_start_size();
		}
		if !self.disable_monitor_fence {
			size += e.fence_write_size();
		}
		size + e.semaphore_wait_size()
	}

	/// Append one workload section behind the parked wait and unblock the GPU. Switches to
	/// another ring first when the current one cannot hold the section plus the switch jump
	/// that may have to follow it.
	pub fn dispatch_command_buffer(&mut self, batch: &BatchBuffer, paging_fence: Option<u64>) -> SubmitResult<()> {
		profiling::scope!("direct_submission_dispatch");
		if self.state != RingState::Running {
			return Err(SubmissionError::DeviceLost);
		}
		let required = self.dispatch_required_size(batch, paging_fence.is_some());
		let reserve = required + self.encoder.batch_buffer_end_size().max(self.encoder.batch_buffer_start_size());
		if self.stream_mut().available() < reserve {
			self.switch_ring_buffers()?;
		}
		if !self.started {
			self.dispatch_parked_wait()?;
			self.started = true;
		}

		let encoder = self.encoder.clone();
		if let Some(value) = paging_fence {
			let address = self.paging_fence_address();
			encoder.encode_semaphore_wait(self.stream_mut(), address, value, SemaphoreOp::GreaterOrEqual)?;
		}

		if batch.used_size <= self.inline_copy_threshold {
			self.copy_workload_inline(batch)?;
			self.relaxed_targets.clear();
		} else if self.workload_uses_relaxed_ordering(batch) {
			self.relaxed_targets.push(batch.gpu_start);
			let targets = std::mem::take(&mut self.relaxed_targets);
			encoder.encode_scheduler(self.stream_mut(), &targets)?;
			self.relaxed_targets = targets;
			self.scheduler_dispatch_count += 1;
			self.patch_return_jump(batch)?;
		} else {
			encoder.encode_batch_buffer_start(self.stream_mut(), batch.gpu_start, true)?;
			self.relaxed_targets.clear();
			self.patch_return_jump(batch)?;
		}

		if !self.disable_monitor_fence {
			encoder.encode_fence_write(self.stream_mut(), batch.tag_address, batch.task_count)?;
			self.monitor_fence_count += 1;
		}

		let gate = self.semaphore_target;
		self.semaphore_target = gate + 1;
		let address = self.semaphore_gate_address();
		let target = self.semaphore_target;
		encoder.encode_semaphore_wait(self.stream_mut(), address, target, SemaphoreOp::GreaterOrEqual)?;
		self.publish_semaphore_gate(gate);

		self.last_task_count = batch.task_count;
		self.rings[self.current_ring].completion_fence = batch.task_count;
		Ok(())
	}

	fn copy_workload_inline(&mut self, batch: &BatchBuffer) -> SubmitResult<()> {
		let client = self
			.allocator
			.resolve(batch.id)
			.ok_or(SubmissionError::DeviceLost)?;
		// Safety: the queue finished recording this span before handing it over.
		let payload = unsafe { client.cpu_slice(batch.start_offset, batch.used_size) };
		let stream = self.stream_mut();
		stream.write_bytes(payload).ok_or(SubmissionError::OutOfDeviceMemory)?;
		stream.align(8).ok_or(SubmissionError::OutOfDeviceMemory)?;
		Ok(())
	}

	/// Append the jump back into the ring at the tail of the client's payload. The client
	/// buffer keeps batch-buffer-start room there instead of a terminator when it targets
	/// the ring.
	fn patch_return_jump(&mut self, batch: &BatchBuffer) -> SubmitResult<()> {
		let return_address = self.stream_mut().current_gpu_address();
		let client = self
			.allocator
			.resolve(batch.id)
			.ok_or(SubmissionError::DeviceLost)?;
		let mut tail = LinearStream::resume(batch.id, client, batch.start_offset + batch.used_size);
		self.encoder.encode_batch_buffer_start(&mut tail, return_address, false)
	}

	/// Move the append cursor to a ring whose completion fence has retired, growing the
	/// pool up to its bound before blocking on the oldest fence. The retiring ring gets a
	/// jump to the new ring's start as its final command.
	pub fn switch_ring_buffers(&mut self) -> SubmitResult<AllocId> {
		profiling::scope!("direct_submission_switch_ring");
		let candidate = (0..self.rings.len())
			.map(|i| (self.current_ring + 1 + i) % self.rings.len())
			.filter(|&i| i != self.current_ring)
			.find(|&i| self.observer.peek_task_count(self.engine) >= self.rings[i].completion_fence);
		let next = match candidate {
			Some(i) => i,
			None if self.rings.len() < self.max_ring_buffers => self.allocate_ring()?,
			None => {
				let oldest = (0..self.rings.len())
					.filter(|&i| i != self.current_ring)
					.min_by_key(|&i| self.rings[i].completion_fence)
					.expect("pool holds at least two rings");
				let fence = self.rings[oldest].completion_fence;
				if !self.observer.wait_for_task_count(self.engine, fence, self.wait_timeout) {
					return Err(SubmissionError::NotReady);
				}
				oldest
			}
		};
		let target = self.rings[next].alloc.gpu_address();
		let encoder = self.encoder.clone();
		encoder.encode_batch_buffer_start(self.stream_mut(), target, false)?;
		let (id, alloc) = (self.rings[next].id, self.rings[next].alloc.clone());
		self.stream_mut().replace_buffer(id, alloc);
		self.stream_mut().rewind();
		self.current_ring = next;
		self.ring_switch_count += 1;
		Ok(id)
	}

	/// Terminate the ring: a final fence write is dispatched even when per-workload monitor
	/// fences are disabled, then the context runs off the end of the buffer.
	pub fn stop_ring_buffer(&mut self) -> SubmitResult<()> {
		if self.state != RingState::Running {
			return Ok(());
		}
		let encoder = self.encoder.clone();
		let needed = encoder.fence_write_size() + encoder.batch_buffer_end_size();
		if self.stream_mut().available() < needed + encoder.batch_buffer_start_size() {
			self.switch_ring_buffers()?;
		}
		if !self.started {
			self.dispatch_parked_wait()?;
			self.started = true;
		}
		let tag_address = self.semaphore_alloc.gpu_address() + 128;
		let final_count = self.last_task_count;
		encoder.encode_fence_write(self.stream_mut(), tag_address, final_count)?;
		encoder.encode_batch_buffer_end(self.stream_mut())?;
		// release the parked wait so the context can reach the terminator
		let target = self.semaphore_target;
		self.publish_semaphore_gate(target);
		self.state = RingState::Stopped;
		Ok(())
	}

	/// Allocations the ring keeps resident for the lifetime of the context.
	pub fn collect_residency(&self, residency: &mut ResidencyContainer) {
		residency.add(self.semaphore_id);
		for ring in &self.rings {
			residency.add(ring.id);
		}
	}

	pub fn ring_count(&self) -> usize {
		self.rings.len()
	}

	pub fn current_ring_id(&self) -> AllocId {
		self.rings[self.current_ring].id
	}

	pub fn ring_completion_fence(&self, index: usize) -> u32 {
		self.rings[index].completion_fence
	}

	pub fn ring_switch_count(&self) -> u32 {
		self.ring_switch_count
	}

	pub fn monitor_fence_count(&self) -> u32 {
		self.monitor_fence_count
	}

	pub fn scheduler_dispatch_count(&self) -> u32 {
		self.scheduler_dispatch_count
	}

	pub fn ring_recorded(&self) -> &[u8] {
		self.stream.as_ref().expect("ring initialized").recorded()
	}

	pub fn is_stopped(&self) -> bool {
		self.state == RingState::Stopped
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::encode::{decode_stream, SoftCommand, SoftEncoder};
	use crate::memory::AllocationTable;
	use crate::sync::SoftwareTag;

	struct Fixture {
		allocator: Arc<dyn Allocator>,
		tag: Arc<SoftwareTag>,
		direct: DirectSubmissionHw,
	}

	fn fixture(config: SubmissionConfig) -> SubmitResult<Fixture> {
		let allocator: Arc<dyn Allocator> = AllocationTable::new(1 << 24);
		let tag = Arc::new(SoftwareTag::new());
		let encoder: Arc<dyn Encoder> = Arc::new(SoftEncoder::default());
		let mut direct = DirectSubmissionHw::new(allocator.clone(), encoder, tag.clone(), 0, &config)?;
		direct.initialize(true)?;
		Ok(Fixture { allocator, tag, direct })
	}

	fn client_batch(allocator: &Arc<dyn Allocator>, payload_size: usize, task_count: u32) -> SubmitResult<BatchBuffer> {
		let size = payload_size + 64;
		let id = allocator.allocate(&AllocationProperties::new(size, AllocationKind::CommandBuffer))?;
		let alloc = allocator.resolve(id).unwrap();
		let mut stream = LinearStream::new(id, alloc);
		stream.get_space(payload_size).unwrap();
		Ok(BatchBuffer {
			id,
			start_offset: 0,
			used_size: payload_size,
			gpu_start: stream.gpu_base(),
			task_count,
			tag_address: 0x4000,
			engine: 0,
			relaxed_ordering_allowed: false,
		})
	}

	#[test]
	fn test_dispatch_sections_and_gate() -> anyhow::Result<()> {
		let mut f = fixture(SubmissionConfig::for_tests())?;
		assert_eq!(f.direct.semaphore_gate(), 0, "parked before any dispatch");

		let batch = client_batch(&f.allocator, 512, 1)?;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.semaphore_gate(), 1, "gate released exactly one section");

		let commands = decode_stream(f.direct.ring_recorded());
		// parked wait, jump to client, monitor fence, next parked wait
		assert!(matches!(commands[0], SoftCommand::SemaphoreWait { value: 1, .. }));
		assert!(matches!(
			commands[1],
			SoftCommand::BatchBufferStart { target, secondary: true } if target == batch.gpu_start
		));
		assert!(matches!(
			commands[2],
			SoftCommand::FenceWrite { address, value: 1 } if address == batch.tag_address
		));
		assert!(matches!(commands[3], SoftCommand::SemaphoreWait { value: 2, .. }));
		Ok(())
	}

	#[test]
	fn test_return_jump_patched_into_client() -> anyhow::Result<()> {
		let mut f = fixture(SubmissionConfig::for_tests())?;
		let batch = client_batch(&f.allocator, 512, 1)?;
		f.direct.dispatch_command_buffer(&batch, None)?;

		let client = f.allocator.resolve(batch.id).unwrap();
		let tail = unsafe { client.cpu_slice(batch.used_size, 24) };
		let commands = decode_stream(tail);
		let ring_base = f.allocator.resolve(f.direct.current_ring_id()).unwrap().gpu_address();
		match commands[0] {
			SoftCommand::BatchBufferStart { target, secondary } => {
				assert!(!secondary);
				assert!(target > ring_base && target < ring_base + 1024, "returns into the ring");
			}
			ref other => panic!("expected return jump, got {other:?}"),
		}
		Ok(())
	}

	#[test]
	fn test_small_payload_copied_inline() -> anyhow::Result<()> {
		let mut f = fixture(SubmissionConfig::for_tests())?;
		// below the 256 byte threshold
		let batch = client_batch(&f.allocator, 128, 1)?;
		f.direct.dispatch_command_buffer(&batch, None)?;
		let commands = decode_stream(f.direct.ring_recorded());
		assert!(
			!commands
				.iter()
				.any(|c| matches!(c, SoftCommand::BatchBufferStart { secondary: true, .. })),
			"inline payloads must not jump to the client buffer"
		);
		Ok(())
	}

	#[test]
	fn test_dispatch_size_accounting() -> anyhow::Result<()> {
		fn dispatch_checked(f: &mut Fixture, batch: &BatchBuffer, paging: Option<u64>) -> anyhow::Result<()> {
			let expected = f.direct.dispatch_required_size(batch, paging.is_some());
			let before = f.direct.ring_recorded().len();
			f.direct.dispatch_command_buffer(batch, paging)?;
			assert_eq!(f.direct.ring_recorded().len() - before, expected);
			Ok(())
		}

		let mut config = SubmissionConfig::for_tests();
		config.relaxed_ordering = true;
		config.relaxed_ordering_queue_depth = 2;
		let mut f = fixture(config)?;

		// jump into the client buffer
		let batch = client_batch(&f.allocator, 512, 1)?;
		dispatch_checked(&mut f, &batch, None)?;
		// inline copy, padded to the stream alignment
		let batch = client_batch(&f.allocator, 124, 2)?;
		dispatch_checked(&mut f, &batch, None)?;
		// paging fence wait ahead of the workload
		let batch = client_batch(&f.allocator, 512, 3)?;
		dispatch_checked(&mut f, &batch, Some(9))?;
		// relaxed-ordering scheduler section
		let mut batch = client_batch(&f.allocator, 512, 4)?;
		batch.relaxed_ordering_allowed = true;
		dispatch_checked(&mut f, &batch, None)?;

		// every section shrinks by the fence write when monitor fences are elided
		let mut config = SubmissionConfig::for_tests();
		config.disable_monitor_fence = true;
		let mut f = fixture(config)?;
		let batch = client_batch(&f.allocator, 512, 1)?;
		dispatch_checked(&mut f, &batch, None)?;
		Ok(())
	}

	#[test]
	fn test_ring_switch_waits_for_fence() -> anyhow::Result<()> {
		let mut config = SubmissionConfig::for_tests();
		config.max_ring_buffers = 2;
		let mut f = fixture(config)?;
		let first_ring = f.direct.current_ring_id();

		let mut task = 0u32;
		let mut switched_to = None;
		while f.direct.ring_switch_count() == 0 {
			task += 1;
			let batch = client_batch(&f.allocator, 512, task)?;
			// second ring's fence is still 0, so the first switch succeeds without a wait
			f.direct.dispatch_command_buffer(&batch, None)?;
			if f.direct.current_ring_id() != first_ring {
				switched_to = Some(f.direct.current_ring_id());
			}
		}
		let second_ring = switched_to.expect("switched off the initial ring");
		assert_ne!(first_ring, second_ring);
		assert_eq!(f.direct.ring_count(), 2);

		// fill the second ring too; the pool is capped, and the first ring's fence has not
		// retired, so the next switch times out
		let switch_count = f.direct.ring_switch_count();
		let result = loop {
			task += 1;
			let batch = client_batch(&f.allocator, 512, task)?;
			match f.direct.dispatch_command_buffer(&batch, None) {
				Ok(()) if f.direct.ring_switch_count() > switch_count => {
					panic!("switched onto a ring with an unretired fence")
				}
				Ok(()) => continue,
				Err(e) => break e,
			}
		};
		assert_eq!(result, SubmissionError::NotReady);

		// retire everything: the switch back to the first ring now succeeds
		f.tag.signal(0, task);
		let batch = client_batch(&f.allocator, 512, task + 1)?;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.current_ring_id(), first_ring);
		Ok(())
	}

	#[test]
	fn test_ring_pool_grows_before_blocking() -> anyhow::Result<()> {
		let mut config = SubmissionConfig::for_tests();
		config.max_ring_buffers = 4;
		let mut f = fixture(config)?;
		let mut task = 0u32;
		// never signal the tag: every switch must come from pool growth
		while f.direct.ring_count() < 4 {
			task += 1;
			let batch = client_batch(&f.allocator, 512, task)?;
			f.direct.dispatch_command_buffer(&batch, None)?;
		}
		assert_eq!(f.direct.ring_count(), 4);
		Ok(())
	}

	#[test]
	fn test_disable_monitor_fence_still_stops_with_fence() -> anyhow::Result<()> {
		let mut config = SubmissionConfig::for_tests();
		config.disable_monitor_fence = true;
		let mut f = fixture(config)?;
		let batch = client_batch(&f.allocator, 512, 1)?;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.monitor_fence_count(), 0);

		f.direct.stop_ring_buffer()?;
		let commands = decode_stream(f.direct.ring_recorded());
		assert!(
			commands.iter().any(|c| matches!(c, SoftCommand::FenceWrite { .. })),
			"stop section always carries a final fence"
		);
		assert!(matches!(commands.last(), Some(SoftCommand::BatchBufferEnd)));
		assert!(f.direct.is_stopped());

		let batch = client_batch(&f.allocator, 512, 2)?;
		assert_eq!(
			f.direct.dispatch_command_buffer(&batch, None),
			Err(SubmissionError::DeviceLost)
		);
		Ok(())
	}

	#[test]
	fn test_paging_fence_wait_precedes_workload() -> anyhow::Result<()> {
		let mut f = fixture(SubmissionConfig::for_tests())?;
		let batch = client_batch(&f.allocator, 512, 1)?;
		f.direct.dispatch_command_buffer(&batch, Some(7))?;
		let commands = decode_stream(f.direct.ring_recorded());
		let fence_pos = commands
			.iter()
			.position(|c| matches!(c, SoftCommand::SemaphoreWait { value: 7, .. }))
			.expect("paging fence wait present");
		let jump_pos = commands
			.iter()
			.position(|c| matches!(c, SoftCommand::BatchBufferStart { secondary: true, .. }))
			.expect("workload jump present");
		assert!(fence_pos < jump_pos);
		Ok(())
	}

	#[test]
	fn test_relaxed_ordering_dispatches_scheduler() -> anyhow::Result<()> {
		let mut config = SubmissionConfig::for_tests();
		config.relaxed_ordering = true;
		config.relaxed_ordering_queue_depth = 2;
		let mut f = fixture(config)?;

		let mut batch = client_batch(&f.allocator, 512, 1)?;
		batch.relaxed_ordering_allowed = true;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.scheduler_dispatch_count(), 1);

		let mut batch = client_batch(&f.allocator, 512, 2)?;
		batch.relaxed_ordering_allowed = true;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.scheduler_dispatch_count(), 2);

		// at the depth bound the dispatch falls back to an ordered jump
		let mut batch = client_batch(&f.allocator, 512, 3)?;
		batch.relaxed_ordering_allowed = true;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.scheduler_dispatch_count(), 2);

		// an ordered dispatch drains the pending target list, re-arming the scheduler
		let mut batch = client_batch(&f.allocator, 512, 4)?;
		batch.relaxed_ordering_allowed = true;
		f.direct.dispatch_command_buffer(&batch, None)?;
		assert_eq!(f.direct.scheduler_dispatch_count(), 3);
		Ok(())
	}
}
