pub mod bindless_reuse;
pub mod heap_reuse;
pub mod in_order_exec;
pub mod ring_submission;
pub mod scratch_state;

use gpu_submit_core::config::SubmissionConfig;
use gpu_submit_core::container::CommandContainer;
use gpu_submit_core::encode::{Encoder, SoftEncoder};
use gpu_submit_core::error::SubmitResult;
use gpu_submit_core::heap::HeapHelper;
use gpu_submit_core::memory::{AllocationTable, Allocator};
use gpu_submit_core::queue::{CommandQueue, EngineGroupType, QueueProperties, SubmitTarget};
use gpu_submit_core::submission::{DirectSubmissionHw, SoftwareSubmitter};
use gpu_submit_core::sync::SoftwareTag;
use std::sync::Arc;

/// Wires an in-memory allocator, the software tag and the soft encoder into the same
/// object graph a real device would provide.
pub struct TestDevice {
	pub config: SubmissionConfig,
	pub allocator: Arc<dyn Allocator>,
	pub tag: Arc<SoftwareTag>,
	pub encoder: Arc<dyn Encoder>,
	pub heap_helper: Arc<HeapHelper>,
}

impl TestDevice {
	pub fn new() -> Self {
		Self::with_config(SubmissionConfig::for_tests())
	}

	pub fn with_config(config: SubmissionConfig) -> Self {
		let allocator: Arc<dyn Allocator> = AllocationTable::new(1 << 26);
		let tag = Arc::new(SoftwareTag::new());
		let heap_helper = HeapHelper::new(allocator.clone(), tag.clone());
		Self {
			config,
			allocator,
			tag,
			encoder: Arc::new(SoftEncoder),
			heap_helper,
		}
	}

	pub fn container(&self) -> SubmitResult<CommandContainer> {
		CommandContainer::initialize(
			self.heap_helper.clone(),
			self.encoder.clone(),
			0,
			&self.config,
			true,
			true,
		)
	}

	/// Queue backed by the one-shot kernel path; the submitter retires every submission the
	/// moment it is handed over.
	pub fn kernel_queue(&self, engine_group: EngineGroupType) -> SubmitResult<(CommandQueue, Arc<SoftwareSubmitter>)> {
		let submitter = SoftwareSubmitter::new(self.tag.clone());
		let queue = CommandQueue::new(
			self.allocator.clone(),
			self.encoder.clone(),
			self.tag.clone(),
			0,
			engine_group,
			QueueProperties::default(),
			SubmitTarget::Kernel(submitter.clone()),
			&self.config,
		)?;
		Ok((queue, submitter))
	}

	/// Queue backed by a started submission ring. Nothing retires work automatically; tests
	/// signal the tag themselves.
	pub fn direct_queue(&self, engine_group: EngineGroupType) -> SubmitResult<CommandQueue> {
		let mut direct = DirectSubmissionHw::new(
			self.allocator.clone(),
			self.encoder.clone(),
			self.tag.clone(),
			0,
			&self.config,
		)?;
		direct.initialize(true)?;
		CommandQueue::new(
			self.allocator.clone(),
			self.encoder.clone(),
			self.tag.clone(),
			0,
			engine_group,
			QueueProperties::default(),
			SubmitTarget::Direct(direct),
			&self.config,
		)
	}
}

impl Default for TestDevice {
	fn default() -> Self {
		Self::new()
	}
}
