#![cfg(test)]

use crate::TestDevice;
use gpu_submit_core::bindless::BindlessHeapsHelper;
use gpu_submit_core::config::SubmissionConfig;
use gpu_submit_core::heap::HeapKind;
use gpu_submit_core::queue::{CommandList, EngineGroupType};

#[test]
fn test_slot_reuse_gated_on_queue_retirement() -> anyhow::Result<()> {
	let config = SubmissionConfig {
		reuse_slot_count_threshold: 0,
		..SubmissionConfig::for_tests()
	};
	let device = TestDevice::with_config(config.clone());
	let bindless = BindlessHeapsHelper::new(device.heap_helper.clone(), device.tag.clone(), &config)?;
	let (mut queue, _) = device.kernel_queue(EngineGroupType::Compute)?;
	let owner = device.container()?.command_stream().id();

	// record a submission that references the bindless heaps while the slot is live
	let slot = bindless.allocate_ss_in_heap(64, owner, HeapKind::GlobalSurfaceState)?;
	let mut lists = [CommandList::new(EngineGroupType::Compute)];
	for id in bindless.resident_heaps() {
		lists[0].residency.add(id);
	}
	queue.execute_command_lists(&mut lists, true)?;
	bindless.notify_submission(0, queue.task_count());

	// the kernel path retired the submission on execute, so releasing the slot swaps the
	// generations immediately and the slot comes back
	bindless.release_ss_to_reuse_pool(slot);
	let reused = bindless.allocate_ss_in_heap(64, owner, HeapKind::GlobalSurfaceState)?;
	assert_eq!(reused, slot);
	Ok(())
}

#[test]
fn test_swap_dirties_queue_context() -> anyhow::Result<()> {
	let config = SubmissionConfig {
		reuse_slot_count_threshold: 0,
		..SubmissionConfig::for_tests()
	};
	let device = TestDevice::with_config(config.clone());
	let bindless = BindlessHeapsHelper::new(device.heap_helper.clone(), device.tag.clone(), &config)?;
	let owner = device.container()?.command_stream().id();
	let context = bindless.register_context();
	assert!(!bindless.state_cache_dirty_for_context(context));

	let slot = bindless.allocate_ss_in_heap(64, owner, HeapKind::GlobalSurfaceState)?;
	bindless.release_ss_to_reuse_pool(slot);

	// the generation swap invalidates cached descriptor state; the next submission on the
	// context must flush it and clear the bit
	assert!(bindless.state_cache_dirty_for_context(context));
	bindless.clear_state_cache_dirty_for_context(context);
	assert!(!bindless.state_cache_dirty_for_context(context));
	Ok(())
}
