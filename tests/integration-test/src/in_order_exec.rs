#![cfg(test)]

use crate::TestDevice;
use gpu_submit_core::queue::{CommandList, EngineGroupType};
use gpu_submit_core::sync::InOrderExecInfo;

#[test]
fn test_counter_waits_elided_across_submissions() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let (mut queue, _) = device.kernel_queue(EngineGroupType::Compute)?;
	let mut info = InOrderExecInfo::new(&device.allocator, false)?;

	// each submission signals the next counter value; the counter allocation rides along
	// in the residency set
	for _ in 0..3 {
		let signal_value = info.add_counter_value(1);
		let mut lists = [CommandList::new(EngineGroupType::Compute)];
		lists[0].residency.add(info.device_counter());
		queue.execute_command_lists(&mut lists, true)?;
		info.set_last_waited_counter_value(signal_value);
	}
	let counter_alloc = device.allocator.resolve(info.device_counter()).unwrap();
	assert_eq!(counter_alloc.task_count(0), 3);

	// all three waits were issued; a fourth wait on any of those values is redundant
	assert!(info.is_counter_already_done(3));
	assert!(!info.is_counter_already_done(4));
	Ok(())
}

#[test]
fn test_reset_survives_in_flight_waits() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let mut info = InOrderExecInfo::new(&device.allocator, true)?;
	info.add_counter_value(5);
	info.set_last_waited_counter_value(5);

	info.reset();
	// the counter moved to a fresh offset inside the same allocations; host knowledge of
	// satisfied waits does not carry over
	assert_eq!(info.allocation_offset(), 64);
	assert_eq!(info.counter_value(), 0);
	assert!(!info.is_counter_already_done(1));
	assert!(device.allocator.resolve(info.device_counter()).is_some());
	Ok(())
}

#[test]
fn test_pending_submission_visible_to_pollers() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let (mut queue, _) = device.kernel_queue(EngineGroupType::Compute)?;

	let mut lists = [CommandList::new(EngineGroupType::Compute)];
	let pending = queue.execute_command_lists(&mut lists, false)?;
	// the kernel path retires instantly and the queue completes the handle before returning
	assert!(pending.completed());
	assert_eq!(pending.task_count(), 1);

	let clone = pending.clone();
	assert!(clone.completed());
	Ok(())
}
