#![cfg(test)]

use crate::TestDevice;
use gpu_submit_core::encode::{count_commands, SoftCommand};
use gpu_submit_core::error::SubmissionError;
use gpu_submit_core::queue::{CommandList, EngineGroupType};

#[test]
fn test_equal_scratch_programs_state_once() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let (mut queue, _) = device.kernel_queue(EngineGroupType::Compute)?;

	let mut lists = [
		CommandList::new(EngineGroupType::Compute).with_scratch(512),
		CommandList::new(EngineGroupType::Compute).with_scratch(512),
	];
	queue.execute_command_lists(&mut lists, true)?;

	assert_eq!(queue.front_end_programmed_count(), 1);
	assert_eq!(queue.sba_programmed_count(), 1);
	let front_ends = count_commands(queue.stream_recorded(), |c| {
		matches!(c, SoftCommand::FrontEndState { .. })
	});
	let sbas = count_commands(queue.stream_recorded(), |c| {
		matches!(c, SoftCommand::StateBaseAddress(_))
	});
	assert_eq!(front_ends, 1);
	assert_eq!(sbas, 1);
	Ok(())
}

#[test]
fn test_interleaved_scratch_growth_reprograms() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let (mut queue, _) = device.kernel_queue(EngineGroupType::Compute)?;

	let mut lists = [CommandList::new(EngineGroupType::Compute).with_scratch(0)];
	queue.execute_command_lists(&mut lists, true)?;
	let mut lists = [CommandList::new(EngineGroupType::Compute).with_scratch(512)];
	queue.execute_command_lists(&mut lists, true)?;
	assert_eq!(queue.front_end_programmed_count(), 2);
	assert_eq!(queue.sba_programmed_count(), 2);

	// scratch only grows; a smaller request reprograms nothing
	let mut lists = [CommandList::new(EngineGroupType::Compute).with_scratch(256)];
	queue.execute_command_lists(&mut lists, true)?;
	assert_eq!(queue.front_end_programmed_count(), 2);
	assert_eq!(queue.sba_programmed_count(), 2);
	Ok(())
}

#[test]
fn test_container_lists_share_residency_and_jumps() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let (mut queue, submitter) = device.kernel_queue(EngineGroupType::Compute)?;
	let container = device.container()?;
	let container_residency = container.residency().len();

	let mut lists = [
		CommandList::from_container(EngineGroupType::Compute, &container),
		CommandList::from_container(EngineGroupType::Compute, &container),
	];
	queue.execute_command_lists(&mut lists, true)?;

	// both lists reference the same container allocations; the submission carries each of
	// them once, plus the queue stream and tag
	assert_eq!(submitter.last_residency_len(), Some(container_residency + 2));
	let jumps = count_commands(queue.stream_recorded(), |c| {
		matches!(c, SoftCommand::BatchBufferStart { secondary: true, .. })
	});
	assert_eq!(jumps, 2);
	Ok(())
}

#[test]
fn test_rejected_list_leaves_no_trace() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let (mut queue, submitter) = device.kernel_queue(EngineGroupType::Copy)?;
	let container = device.container()?;

	let mut lists = [
		CommandList::from_container(EngineGroupType::Copy, &container),
		CommandList::from_container(EngineGroupType::Compute, &container),
	];
	let result = queue.execute_command_lists(&mut lists, true);
	assert!(matches!(
		result.err(),
		Some(SubmissionError::InvalidCommandListType { .. })
	));
	assert_eq!(queue.task_count(), 0);
	assert_eq!(submitter.submit_count(), 0);
	assert!(queue.stream_recorded().is_empty());
	Ok(())
}
