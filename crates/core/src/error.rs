use crate::queue::EngineGroupType;
use thiserror::Error;

/// Errors surfaced by submission paths. Heap replacement, growth and reuse-pool misses are
/// recovered locally and never show up here.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubmissionError {
	/// The allocator could not satisfy a request. Fatal for the current submission,
	/// recoverable for the process.
	#[error("device allocator could not satisfy the request")]
	OutOfDeviceMemory,
	/// A command list built for one engine group was executed on an incompatible queue.
	/// Detected before any GPU-visible side effect.
	#[error("command list recorded for {required:?} cannot execute on a {queue:?} queue")]
	InvalidCommandListType {
		required: EngineGroupType,
		queue: EngineGroupType,
	},
	/// A synchronous wait exceeded its bound. The submission is still in flight and the
	/// wait may be retried.
	#[error("wait timed out, submission still in flight")]
	NotReady,
	/// Unrecoverable engine state. Every further operation on this queue fails fast.
	#[error("engine is in an unrecoverable state")]
	DeviceLost,
}

pub type SubmitResult<T> = Result<T, SubmissionError>;
