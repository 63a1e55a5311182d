use crate::config::SubmissionConfig;
use crate::container::{CommandContainer, LinearStream};
use crate::encode::{Encoder, PreemptionMode, SbaProperties};
use crate::error::{SubmissionError, SubmitResult};
use crate::heap::HeapKind;
use crate::memory::{AllocId, AllocationKind, AllocationProperties, Allocator, ResidencyContainer};
use crate::submission::{BatchBuffer, BatchBufferSubmitter, DirectSubmissionHw};
use crate::sync::{CompletionObserver, PendingSubmission};
use std::sync::Arc;
use std::time::Duration;

/// Hardware engine families a queue can sit on. A command list records for exactly one
/// group; execution on an incompatible queue is rejected up front.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineGroupType {
	Compute,
	/// Render-capable engine that also accepts compute command lists.
	RenderCompute,
	Copy,
}

impl EngineGroupType {
	pub fn accepts(self, list: EngineGroupType) -> bool {
		self == list || (self == EngineGroupType::RenderCompute && list == EngineGroupType::Compute)
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueuePriority {
	Normal,
	High,
}

/// Creation-time queue flavor. Hints are forwarded to scheduling, they never change the
/// submission protocol.
#[derive(Debug, Copy, Clone)]
pub struct QueueProperties {
	pub priority: QueuePriority,
	pub interrupt_hint: bool,
	pub offload_hint: bool,
	/// Every execute waits for retirement before returning.
	pub synchronized_dispatch: bool,
}

impl Default for QueueProperties {
	fn default() -> Self {
		Self {
			priority: QueuePriority::Normal,
			interrupt_hint: false,
			offload_hint: false,
			synchronized_dispatch: false,
		}
	}
}

type CompletionHook = Box<dyn FnOnce() + Send>;

/// A closed recording, ready to be executed any number of times. Carries everything the
/// queue needs to schedule it: the residency set, the GPU entry point, and the hardware
/// state it assumes.
pub struct CommandList {
	pub engine_group: EngineGroupType,
	pub residency: ResidencyContainer,
	/// GPU address of the recorded commands; `None` for lists that only carry state.
	pub batch_start: Option<u64>,
	pub required_scratch_size: u32,
	pub preemption_mode: PreemptionMode,
	pub sba: SbaProperties,
	/// Set when a heap base moved during recording, obliging SBA reprogramming.
	pub heaps_dirty: bool,
	pub relaxed_ordering_allowed: bool,
	completion_hooks: Vec<CompletionHook>,
}

impl CommandList {
	pub fn new(engine_group: EngineGroupType) -> Self {
		Self {
			engine_group,
			residency: ResidencyContainer::new(),
			batch_start: None,
			required_scratch_size: 0,
			preemption_mode: PreemptionMode::Disabled,
			sba: SbaProperties::default(),
			heaps_dirty: false,
			relaxed_ordering_allowed: false,
			completion_hooks: Vec::new(),
		}
	}

	/// Snapshot a container's recording: its residency set, entry point and heap bases.
	pub fn from_container(engine_group: EngineGroupType, container: &CommandContainer) -> Self {
		let base = |kind: HeapKind| container.heap(kind).map(|h| h.gpu_base()).unwrap_or(0);
		Self {
			engine_group,
			residency: container.residency().clone(),
			batch_start: Some(container.command_stream().gpu_base()),
			required_scratch_size: 0,
			preemption_mode: PreemptionMode::Disabled,
			sba: SbaProperties {
				general_base: base(HeapKind::SurfaceState),
				surface_state_base: base(HeapKind::SurfaceState),
				dynamic_state_base: base(HeapKind::DynamicState),
				instruction_base: base(HeapKind::Instruction),
			},
			heaps_dirty: container.any_heap_dirty(),
			relaxed_ordering_allowed: false,
			completion_hooks: Vec::new(),
		}
	}

	pub fn with_scratch(mut self, size: u32) -> Self {
		self.required_scratch_size = size;
		self
	}

	pub fn with_preemption(mut self, mode: PreemptionMode) -> Self {
		self.preemption_mode = mode;
		self
	}

	/// Queue a side effect (e.g. draining a kernel's printf buffer) to run exactly once
	/// when the submission containing this list retires.
	pub fn add_completion_hook(&mut self, hook: CompletionHook) {
		self.completion_hooks.push(hook);
	}
}

/// State programming one submission must prepend, computed by diffing the lists against
/// what the queue last programmed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CommandListRequiredStateChange {
	pub preemption: Option<PreemptionMode>,
	/// New scratch size; present on first submission and whenever scratch grows.
	pub front_end: Option<u32>,
	pub sba: Option<SbaProperties>,
}

/// Where finished batch buffers go: the one-shot kernel submission path or a persistent
/// direct submission ring owned by this queue.
pub enum SubmitTarget {
	Kernel(Arc<dyn BatchBufferSubmitter>),
	Direct(DirectSubmissionHw),
}

impl SubmitTarget {
	/// Pick the submission path the configuration asks for: a persistent ring, started
	/// here, when direct submission is enabled, else one-shot batch buffers through
	/// `kernel`.
	pub fn from_config(
		allocator: Arc<dyn Allocator>,
		encoder: Arc<dyn Encoder>,
		observer: Arc<dyn CompletionObserver>,
		engine: usize,
		config: &SubmissionConfig,
		kernel: Arc<dyn BatchBufferSubmitter>,
	) -> SubmitResult<Self> {
		if config.direct_submission {
			let mut direct = DirectSubmissionHw::new(allocator, encoder, observer, engine, config)?;
			direct.initialize(true)?;
			Ok(SubmitTarget::Direct(direct))
		} else {
			Ok(SubmitTarget::Kernel(kernel))
		}
	}
}

struct PendingRetirement {
	task_count: u32,
	submission: PendingSubmission,
	hooks: Vec<CompletionHook>,
}

/// Owns the per-engine submission stream and the last-programmed hardware state. Commands
/// recorded by containers are stitched into the queue's stream with a state preamble and
/// handed to the submit target with a deduplicated residency set, once per execute call.
pub struct CommandQueue {
	allocator: Arc<dyn Allocator>,
	encoder: Arc<dyn Encoder>,
	observer: Arc<dyn CompletionObserver>,
	engine: usize,
	engine_group: EngineGroupType,
	properties: QueueProperties,
	inline_copy_threshold: usize,
	wait_timeout: Duration,

	/// Two submission streams used alternately; switching waits for the other stream's last
	/// flush stamp so in-flight commands are never overwritten.
	streams: [LinearStream; 2],
	flush_stamps: [u32; 2],
	current_stream: usize,

	tag_id: AllocId,
	tag_address: u64,

	task_count: u32,
	last_preemption: Option<PreemptionMode>,
	last_scratch_size: u32,
	last_sba: Option<SbaProperties>,
	/// Backing allocation for per-thread scratch, reallocated whenever scratch grows. The
	/// outgrown one stays alive until its last referencing submission retires.
	scratch_allocation: Option<AllocId>,
	retired_scratch: Vec<(u32, AllocId)>,
	pending_paging_fence: Option<u64>,
	pending_retirements: Vec<PendingRetirement>,
	target: SubmitTarget,
	device_lost: bool,

	preemption_programmed_count: u32,
	front_end_programmed_count: u32,
	sba_programmed_count: u32,
}

impl CommandQueue {
	pub fn new(
		allocator: Arc<dyn Allocator>,
		encoder: Arc<dyn Encoder>,
		observer: Arc<dyn CompletionObserver>,
		engine: usize,
		engine_group: EngineGroupType,
		properties: QueueProperties,
		target: SubmitTarget,
		config: &SubmissionConfig,
	) -> SubmitResult<Self> {
		let tag_id = allocator.allocate(&AllocationProperties::new(64, AllocationKind::TagBuffer))?;
		let tag_address = allocator.resolve(tag_id).expect("freshly allocated").gpu_address();
		let mut stream = || -> SubmitResult<LinearStream> {
			let id = allocator.allocate(&AllocationProperties::new(
				config.command_buffer_size,
				AllocationKind::CommandBuffer,
			))?;
			let alloc = allocator.resolve(id).expect("freshly allocated");
			Ok(LinearStream::new(id, alloc))
		};
		let streams = [stream()?, stream()?];
		Ok(Self {
			allocator,
			encoder,
			observer,
			engine,
			engine_group,
			properties,
			inline_copy_threshold: config.ring_inline_copy_threshold,
			wait_timeout: Duration::from_millis(config.wait_timeout_ms),
			streams,
			flush_stamps: [0; 2],
			current_stream: 0,
			tag_id,
			tag_address,
			task_count: 0,
			last_preemption: None,
			last_scratch_size: 0,
			last_sba: None,
			scratch_allocation: None,
			retired_scratch: Vec::new(),
			pending_paging_fence: None,
			pending_retirements: Vec::new(),
			target,
			device_lost: false,
			preemption_programmed_count: 0,
			front_end_programmed_count: 0,
			sba_programmed_count: 0,
		})
	}

	#[inline]
	pub fn engine_group(&self) -> EngineGroupType {
		self.engine_group
	}

	#[inline]
	pub fn task_count(&self) -> u32 {
		self.task_count
	}

	#[inline]
	pub fn properties(&self) -> &QueueProperties {
		&self.properties
	}

	pub fn direct_mut(&mut self) -> Option<&mut DirectSubmissionHw> {
		match &mut self.target {
			SubmitTarget::Direct(ds) => Some(ds),
			SubmitTarget::Kernel(_) => None,
		}
	}

	/// A paging fence the next submission must wait on before its workload executes.
	pub fn set_paging_fence(&mut self, value: u64) {
		self.pending_paging_fence = Some(value);
	}

	/// State programming the next submission of `lists` would have to prepend.
	pub fn required_state_change(&self, lists: &[CommandList]) -> CommandListRequiredStateChange {
		let mut change = CommandListRequiredStateChange::default();
		let requested = lists.iter().map(|l| l.preemption_mode).max();
		if let Some(mode) = requested {
			if self.last_preemption != Some(mode) {
				change.preemption = Some(mode);
			}
		}
		let scratch = lists.iter().map(|l| l.required_scratch_size).max().unwrap_or(0);
		let first = self.task_count == 0;
		if first || scratch > self.last_scratch_size {
			change.front_end = Some(scratch.max(self.last_scratch_size));
		}
		if let Some(last) = lists.last() {
			let heaps_moved = lists.iter().any(|l| l.heaps_dirty);
			if first || heaps_moved || change.front_end.is_some() || self.last_sba != Some(last.sba) {
				change.sba = Some(last.sba);
			}
		}
		change
	}

	fn state_change_size(&self, change: &CommandListRequiredStateChange) -> usize {
		let e = &self.encoder;
		let mut size = 0;
		if change.preemption.is_some() {
			size += e.preemption_size();
		}
		if change.front_end.is_some() {
			size += e.front_end_size();
		}
		if change.sba.is_some() {
			size += e.sba_size();
		}
		size
	}

	/// Make the current stream hold at least `size` free bytes, flipping to the other
	/// stream when it cannot. Flipping blocks until the other stream's last submission
	/// retired; a timeout surfaces as `NotReady` with nothing recorded.
	pub fn reserve_linear_stream_size(&mut self, size: usize) -> SubmitResult<()> {
		if self.streams[self.current_stream].available() >= size {
			return Ok(());
		}
		let other = 1 - self.current_stream;
		let stamp = self.flush_stamps[other];
		if !self.observer.wait_for_task_count(self.engine, stamp, self.wait_timeout) {
			return Err(SubmissionError::NotReady);
		}
		self.streams[other].rewind();
		self.current_stream = other;
		if self.streams[other].available() < size {
			return Err(SubmissionError::OutOfDeviceMemory);
		}
		Ok(())
	}

	#[inline]
	pub fn current_stream_index(&self) -> usize {
		self.current_stream
	}

	pub fn stream_recorded(&self) -> &[u8] {
		self.streams[self.current_stream].recorded()
	}

	/// Execute `lists` as one submission. Engine-group compatibility is validated before
	/// anything else; the state preamble is computed and encoded once for the whole batch,
	/// the merged residency set is deduplicated once, and every list's completion hooks run
	/// exactly once when the submission retires.
	pub fn execute_command_lists(&mut self, lists: &mut [CommandList], synchronous: bool) -> SubmitResult<PendingSubmission> {
		profiling::scope!("execute_command_lists");
		if self.device_lost {
			return Err(SubmissionError::DeviceLost);
		}
		for list in lists.iter() {
			if !self.engine_group.accepts(list.engine_group) {
				return Err(SubmissionError::InvalidCommandListType {
					required: list.engine_group,
					queue: self.engine_group,
				});
			}
		}
		self.process_retirements();
		if lists.is_empty() {
			return Ok(PendingSubmission::new_completed(self.task_count));
		}

		let change = self.required_state_change(lists);
		if let Some(scratch) = change.front_end {
			if scratch > 0 {
				let id = self
					.allocator
					.allocate(&AllocationProperties::new(scratch as usize, AllocationKind::Scratch))?;
				if let Some(old) = self.scratch_allocation.replace(id) {
					self.retired_scratch.push((self.task_count, old));
				}
			}
		}
		let jumps = lists.iter().filter(|l| l.batch_start.is_some()).count();
		let tail = self
			.encoder
			.batch_buffer_end_size()
			.max(self.encoder.batch_buffer_start_size());
		let required = self.state_change_size(&change) + jumps * self.encoder.batch_buffer_start_size() + tail;
		self.reserve_linear_stream_size(required)?;

		let start_offset = self.streams[self.current_stream].used();
		let encoder = self.encoder.clone();
		{
			let stream = &mut self.streams[self.current_stream];
			if let Some(mode) = change.preemption {
				encoder.encode_preemption(stream, mode)?;
				self.preemption_programmed_count += 1;
			}
			if let Some(scratch) = change.front_end {
				encoder.encode_front_end_state(stream, scratch)?;
				self.front_end_programmed_count += 1;
			}
			if let Some(sba) = change.sba {
				encoder.encode_state_base_address(stream, &sba)?;
				self.sba_programmed_count += 1;
			}
			for list in lists.iter() {
				if let Some(target) = list.batch_start {
					encoder.encode_batch_buffer_start(stream, target, true)?;
				}
			}
		}

		let mut residency = ResidencyContainer::new();
		residency.add(self.streams[self.current_stream].id());
		residency.add(self.tag_id);
		if let Some(id) = self.scratch_allocation {
			residency.add(id);
		}
		if let SubmitTarget::Direct(ds) = &self.target {
			ds.collect_residency(&mut residency);
		}
		for list in lists.iter() {
			residency.merge(&list.residency);
		}
		residency.dedup();

		self.task_count += 1;
		let task_count = self.task_count;
		let stream = &self.streams[self.current_stream];
		let batch = BatchBuffer {
			id: stream.id(),
			start_offset,
			used_size: stream.used() - start_offset,
			gpu_start: stream.gpu_base() + start_offset as u64,
			task_count,
			tag_address: self.tag_address,
			engine: self.engine,
			relaxed_ordering_allowed: lists.iter().all(|l| l.relaxed_ordering_allowed)
				&& change == CommandListRequiredStateChange::default(),
		};
		let paging_fence = self.pending_paging_fence.take();
		match &mut self.target {
			SubmitTarget::Kernel(submitter) => {
				encoder.encode_batch_buffer_end(&mut self.streams[self.current_stream])?;
				let stream = &self.streams[self.current_stream];
				let batch = BatchBuffer {
					used_size: stream.used() - start_offset,
					..batch
				};
				submitter.submit(&batch, &residency)?;
			}
			SubmitTarget::Direct(ds) => {
				ds.dispatch_command_buffer(&batch, paging_fence)?;
				if batch.used_size > self.inline_copy_threshold {
					// the ring patched a return jump behind the recorded span; claim it so
					// the next submission cannot overwrite it
					self.streams[self.current_stream]
						.get_space(encoder.batch_buffer_start_size())
						.expect("tail room was reserved");
				}
			}
		}
		self.flush_stamps[self.current_stream] = task_count;

		for id in residency.iter() {
			if let Some(alloc) = self.allocator.resolve(id) {
				alloc.update_task_count(self.engine, task_count);
			}
		}

		if let Some(mode) = change.preemption {
			self.last_preemption = Some(mode);
		}
		if let Some(scratch) = change.front_end {
			self.last_scratch_size = scratch;
		}
		if let Some(sba) = change.sba {
			self.last_sba = Some(sba);
		}

		let submission = PendingSubmission::new(task_count);
		let hooks = lists.iter_mut().flat_map(|l| l.completion_hooks.drain(..)).collect();
		self.pending_retirements.push(PendingRetirement {
			task_count,
			submission: submission.clone(),
			hooks,
		});

		if synchronous || self.properties.synchronized_dispatch {
			self.synchronize()?;
		} else {
			self.process_retirements();
		}
		Ok(submission)
	}

	/// Complete every pending submission the engine has retired, running its hooks, and
	/// free outgrown scratch allocations whose last referencing submission retired.
	fn process_retirements(&mut self) {
		let done = self.observer.peek_task_count(self.engine);
		let allocator = &self.allocator;
		self.retired_scratch.retain(|(stamp, id)| {
			if *stamp <= done {
				allocator.free(*id);
				false
			} else {
				true
			}
		});
		let mut i = 0;
		while i < self.pending_retirements.len() {
			if self.pending_retirements[i].task_count <= done {
				let entry = self.pending_retirements.remove(i);
				entry.submission.complete();
				for hook in entry.hooks {
					hook();
				}
			} else {
				i += 1;
			}
		}
	}

	/// Block until the queue's last submission retires.
	pub fn synchronize(&mut self) -> SubmitResult<()> {
		if !self
			.observer
			.wait_for_task_count(self.engine, self.task_count, self.wait_timeout)
		{
			return Err(SubmissionError::NotReady);
		}
		self.process_retirements();
		Ok(())
	}

	/// Drop into the failed state after an unrecoverable engine fault. Every later call
	/// fails fast with `DeviceLost`.
	pub fn mark_device_lost(&mut self) {
		self.device_lost = true;
	}

	pub fn scratch_allocation(&self) -> Option<AllocId> {
		self.scratch_allocation
	}

	pub fn preemption_programmed_count(&self) -> u32 {
		self.preemption_programmed_count
	}

	pub fn front_end_programmed_count(&self) -> u32 {
		self.front_end_programmed_count
	}

	pub fn sba_programmed_count(&self) -> u32 {
		self.sba_programmed_count
	}
}
