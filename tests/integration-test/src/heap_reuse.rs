#![cfg(test)]

use crate::TestDevice;
use gpu_submit_core::heap::HeapKind;
use gpu_submit_core::queue::{CommandList, EngineGroupType};

#[test]
fn test_replaced_heap_stays_resident_until_reset() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let mut container = device.container()?;
	let original = container.heap(HeapKind::SurfaceState).unwrap().id();

	// exhaust the surface heap; the next request replaces it
	let available = container.heap(HeapKind::SurfaceState).unwrap().available();
	container.get_space(HeapKind::SurfaceState, available)?;
	container.get_space(HeapKind::SurfaceState, 64)?;
	assert_eq!(container.deallocation_list(), &[original]);
	assert!(container.residency().contains(original), "old heap still referenced");

	let mut free_list = Vec::new();
	container.reset(&mut free_list);
	assert!(free_list.contains(&original));
	assert!(!container.residency().contains(original));
	Ok(())
}

#[test]
fn test_retired_heap_reused_by_next_container() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let mut container = device.container()?;

	let available = container.heap(HeapKind::SurfaceState).unwrap().available();
	container.get_space(HeapKind::SurfaceState, available)?;
	container.get_space(HeapKind::SurfaceState, 64)?;
	let replaced = container.deallocation_list()[0];

	// execute the recording so the replaced heap is tied to a real task count
	let (mut queue, _) = device.kernel_queue(EngineGroupType::Compute)?;
	let mut lists = [CommandList::from_container(EngineGroupType::Compute, &container)];
	queue.execute_command_lists(&mut lists, true)?;

	let mut free_list = Vec::new();
	container.reset(&mut free_list);
	assert!(free_list.contains(&replaced));
	device
		.heap_helper
		.store_heap_allocation(HeapKind::SurfaceState, replaced, 0, queue.task_count());

	// the kernel path already retired the submission, so a new container of the same
	// configuration picks the heap straight out of the cache
	let next = device.container()?;
	assert!(next.residency().contains(replaced));
	Ok(())
}

#[test]
fn test_unretired_heap_not_reused() -> anyhow::Result<()> {
	let device = TestDevice::new();
	let id = {
		let container = device.container()?;
		container.heap(HeapKind::SurfaceState).unwrap().id()
	};

	// park the heap behind a task count nothing has signalled
	device.heap_helper.store_heap_allocation(HeapKind::SurfaceState, id, 0, 7);
	let fresh = device.container()?;
	assert!(!fresh.residency().contains(id));
	assert_eq!(device.heap_helper.cached_count(), 1);

	device.tag.signal(0, 7);
	let reusing = device.container()?;
	assert!(reusing.residency().contains(id));
	Ok(())
}
