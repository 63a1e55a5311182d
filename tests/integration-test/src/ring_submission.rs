#![cfg(test)]

use crate::TestDevice;
use gpu_submit_core::encode::{decode_stream, SoftCommand};
use gpu_submit_core::error::SubmissionError;
use gpu_submit_core::queue::{CommandList, EngineGroupType};

#[test]
fn test_direct_queue_end_to_end() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let mut queue = device.direct_queue(EngineGroupType::Compute)?;
	assert_eq!(queue.direct_mut().unwrap().semaphore_gate(), 0);

	let mut lists = [CommandList::new(EngineGroupType::Compute).with_scratch(128)];
	let pending = queue.execute_command_lists(&mut lists, false)?;
	assert!(!pending.completed());

	// the whole submission was small enough to be copied into the ring inline, so the ring
	// itself carries the state preamble
	let ds = queue.direct_mut().unwrap();
	assert_eq!(ds.semaphore_gate(), 1);
	let commands = decode_stream(ds.ring_recorded());
	assert!(commands.iter().any(|c| matches!(c, SoftCommand::FrontEndState { scratch_size: 128 })));
	assert!(commands.iter().any(|c| matches!(c, SoftCommand::StateBaseAddress(_))));
	assert!(commands.iter().any(|c| matches!(c, SoftCommand::FenceWrite { value: 1, .. })));
	assert!(matches!(
		commands.last(),
		Some(SoftCommand::SemaphoreWait { value: 2, .. })
	));

	// "hardware" retires the monitor fence
	device.tag.signal(0, 1);
	queue.synchronize()?;
	assert!(pending.completed());
	Ok(())
}

#[test]
fn test_large_submission_jumps_and_returns() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let mut queue = device.direct_queue(EngineGroupType::Compute)?;

	// enough per-list jumps to push the batch over the inline copy threshold
	let lists = || {
		(0..20)
			.map(|i| {
				let mut list = CommandList::new(EngineGroupType::Compute);
				list.batch_start = Some(0x10_0000 + i * 0x100);
				list
			})
			.collect::<Vec<_>>()
	};
	queue.execute_command_lists(&mut lists(), false)?;
	queue.execute_command_lists(&mut lists(), false)?;

	let ds = queue.direct_mut().unwrap();
	let workload_jumps = decode_stream(ds.ring_recorded())
		.iter()
		.filter(|c| matches!(c, SoftCommand::BatchBufferStart { secondary: true, .. }))
		.count();
	assert_eq!(workload_jumps, 2, "each submission enters through one jump");
	assert_eq!(ds.semaphore_gate(), 2);
	Ok(())
}

#[test]
fn test_ring_exhaustion_blocks_until_retirement() -> anyhow::Result<()> {
	let mut config = gpu_submit_core::config::SubmissionConfig::for_tests();
	config.max_ring_buffers = 2;
	let device = TestDevice::with_config(config);
	let mut queue = device.direct_queue(EngineGroupType::Compute)?;

	// nothing retires: both rings fill up and the next switch runs out of candidates
	let error = loop {
		let mut lists = [CommandList::new(EngineGroupType::Compute)];
		match queue.execute_command_lists(&mut lists, false) {
			Ok(_) => continue,
			Err(e) => break e,
		}
	};
	assert_eq!(error, SubmissionError::NotReady);
	assert!(queue.direct_mut().unwrap().ring_switch_count() >= 1);

	// retire everything; the stalled ring becomes reusable
	device.tag.signal(0, queue.task_count());
	let mut lists = [CommandList::new(EngineGroupType::Compute)];
	queue.execute_command_lists(&mut lists, false)?;
	Ok(())
}

#[test]
fn test_stop_ring_through_queue() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let mut queue = device.direct_queue(EngineGroupType::Compute)?;
	let mut lists = [CommandList::new(EngineGroupType::Compute)];
	queue.execute_command_lists(&mut lists, false)?;

	let ds = queue.direct_mut().unwrap();
	ds.stop_ring_buffer()?;
	assert!(ds.is_stopped());
	let commands = decode_stream(ds.ring_recorded());
	assert!(matches!(commands.last(), Some(SoftCommand::BatchBufferEnd)));

	// the queue surfaces the dead ring as a lost device
	let mut lists = [CommandList::new(EngineGroupType::Compute)];
	assert_eq!(
		queue.execute_command_lists(&mut lists, false).err(),
		Some(SubmissionError::DeviceLost)
	);
	Ok(())
}
