use parking_lot::Mutex;
use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::task::{Context, Poll, Waker};

/// Completion handle for one submission. Cloneable; completes exactly once when the
/// monitor fence for its task count is observed retired.
///
/// To avoid racing a waker registration against completion, `completed` is re-checked
/// under the waker mutex before parking.
#[derive(Clone)]
pub struct PendingSubmission {
	inner: Arc<PendingInner>,
}

struct PendingInner {
	task_count: u32,
	completed: AtomicBool,
	wakers: Mutex<SmallVec<[Waker; 1]>>,
}

impl PendingSubmission {
	pub fn new(task_count: u32) -> Self {
		Self {
			inner: Arc::new(PendingInner {
				task_count,
				completed: AtomicBool::new(false),
				wakers: Mutex::new(SmallVec::new()),
			}),
		}
	}

	/// A handle that was born retired.
	pub fn new_completed(task_count: u32) -> Self {
		let pending = Self::new(task_count);
		pending.inner.completed.store(true, Relaxed);
		pending
	}

	#[inline]
	pub fn task_count(&self) -> u32 {
		self.inner.task_count
	}

	#[inline]
	pub fn completed(&self) -> bool {
		self.inner.completed.load(Relaxed)
	}

	/// Mark retired and wake every parked poller.
	pub fn complete(&self) {
		let wakers = {
			let mut guard = self.inner.wakers.lock();
			// must be set while holding the waker lock to prevent a lost wakeup
			self.inner.completed.store(true, Relaxed);
			std::mem::take(&mut *guard)
		};
		for waker in wakers {
			waker.wake();
		}
	}
}

impl Future for PendingSubmission {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		// fast fail
		if self.inner.completed.load(Relaxed) {
			return Poll::Ready(());
		}
		let mut guard = self.inner.wakers.lock();
		// consistent check
		if self.inner.completed.load(Relaxed) {
			Poll::Ready(())
		} else {
			guard.push(cx.waker().clone());
			Poll::Pending
		}
	}
}
