/// Immutable configuration threaded through every component constructor. There are no
/// global mutable feature flags; anything tunable lives here and is fixed at device init.
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
	/// Default size of a freshly allocated indirect heap.
	pub default_heap_size: usize,
	/// Size of each command buffer backing a [`LinearStream`](crate::container::LinearStream).
	pub command_buffer_size: usize,
	/// Slot count in a bindless reuse pool's release generation that arms a generation swap.
	pub reuse_slot_count_threshold: usize,
	/// Size of each ring buffer used by direct submission.
	pub ring_buffer_size: usize,
	/// Upper bound on the ring buffer pool. The pool starts at two and grows on demand.
	pub max_ring_buffers: usize,
	/// Payloads at or below this size are copied inline into the ring instead of being
	/// referenced through a batch buffer start.
	pub ring_inline_copy_threshold: usize,
	/// Route submissions through the persistent ring instead of one-shot kernel submission.
	pub direct_submission: bool,
	/// Elide per-workload monitor fences. The stop section always dispatches a final fence.
	pub disable_monitor_fence: bool,
	/// Allow logically independent workloads to be scheduled by the GPU out of append order.
	pub relaxed_ordering: bool,
	/// In-flight workload bound while relaxed ordering is active.
	pub relaxed_ordering_queue_depth: usize,
	/// Allocate surface state through the shared bindless heaps.
	pub use_bindless: bool,
	/// Timeout applied to synchronous waits, in milliseconds.
	pub wait_timeout_ms: u64,
}

impl Default for SubmissionConfig {
	fn default() -> Self {
		Self {
			default_heap_size: 64 * 1024,
			command_buffer_size: 64 * 1024,
			reuse_slot_count_threshold: 512,
			ring_buffer_size: 256 * 1024,
			max_ring_buffers: 8,
			ring_inline_copy_threshold: 4 * 1024,
			direct_submission: false,
			disable_monitor_fence: false,
			relaxed_ordering: false,
			relaxed_ordering_queue_depth: 64,
			use_bindless: false,
			wait_timeout_ms: 2_000,
		}
	}
}

impl SubmissionConfig {
	/// Small sizes that make heap replacement and ring switching easy to provoke.
	pub fn for_tests() -> Self {
		Self {
			default_heap_size: 4 * 1024,
			command_buffer_size: 4 * 1024,
			reuse_slot_count_threshold: 4,
			ring_buffer_size: 1024,
			max_ring_buffers: 4,
			ring_inline_copy_threshold: 256,
			wait_timeout_ms: 100,
			..Self::default()
		}
	}
}
