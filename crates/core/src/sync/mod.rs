mod in_order;
mod pending;

pub use in_order::*;
pub use pending::*;

use crate::memory::MAX_ENGINES;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::time::Duration;

/// Capability consumed from the completion tracking side of the driver: observe how far an
/// engine has retired, optionally blocking with a timeout.
pub trait CompletionObserver: Send + Sync {
	fn peek_task_count(&self, engine: usize) -> u32;
	/// Returns false when `timeout` elapsed before `count` retired; the wait may be retried.
	fn wait_for_task_count(&self, engine: usize, count: u32, timeout: Duration) -> bool;
}

/// Host-visible tag cells, one per engine, written by monitor fences. In this crate the
/// "hardware" writing them is the test harness or the in-process software submitter;
/// against a real device this would be the mapped tag page.
///
/// Waits block on a condvar rather than spinning; signalling notifies all sleepers.
pub struct SoftwareTag {
	values: [CachePadded<AtomicU32>; MAX_ENGINES],
	mutex: Mutex<()>,
	condvar: Condvar,
}

impl SoftwareTag {
	pub fn new() -> Self {
		Self {
			values: [const { CachePadded::new(AtomicU32::new(0)) }; MAX_ENGINES],
			mutex: Mutex::new(()),
			condvar: Condvar::new(),
		}
	}

	/// Retire everything up to `count` on `engine`. Tag values only advance.
	pub fn signal(&self, engine: usize, count: u32) {
		self.values[engine].fetch_max(count, Release);
		let _guard = self.mutex.lock();
		self.condvar.notify_all();
	}
}

impl Default for SoftwareTag {
	fn default() -> Self {
		Self::new()
	}
}

impl CompletionObserver for SoftwareTag {
	fn peek_task_count(&self, engine: usize) -> u32 {
		self.values[engine].load(Acquire)
	}

	fn wait_for_task_count(&self, engine: usize, count: u32, timeout: Duration) -> bool {
		if self.peek_task_count(engine) >= count {
			return true;
		}
		let deadline = std::time::Instant::now() + timeout;
		let mut guard = self.mutex.lock();
		loop {
			if self.peek_task_count(engine) >= count {
				return true;
			}
			if self.condvar.wait_until(&mut guard, deadline).timed_out() {
				return self.peek_task_count(engine) >= count;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	#[test]
	fn test_signal_wakes_waiter() {
		let tag = Arc::new(SoftwareTag::new());
		let t = {
			let tag = tag.clone();
			std::thread::spawn(move || tag.wait_for_task_count(0, 5, Duration::from_secs(5)))
		};
		tag.signal(0, 5);
		assert!(t.join().unwrap());
	}

	#[test]
	fn test_wait_times_out() {
		let tag = SoftwareTag::new();
		assert!(!tag.wait_for_task_count(0, 1, Duration::from_millis(10)));
		tag.signal(0, 1);
		assert!(tag.wait_for_task_count(0, 1, Duration::from_millis(10)));
	}

	#[test]
	fn test_tag_only_advances() {
		let tag = SoftwareTag::new();
		tag.signal(1, 7);
		tag.signal(1, 3);
		assert_eq!(tag.peek_task_count(1), 7);
	}
}
