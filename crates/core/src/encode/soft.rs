use crate::container::LinearStream;
use crate::encode::{Encoder, PreemptionMode, SbaProperties, SemaphoreOp};
use crate::error::{SubmissionError, SubmitResult};

/// Tagged little-endian record format written by [`SoftEncoder`]. Crate-internal, not a
/// hardware ABI; it exists so streams can be parsed back in tests and in-process
/// execution.
///
/// Every record starts with an 8-byte header of two u32 words: opcode, then an
/// opcode-specific argument. Zero words are padding and skipped by the decoder.
pub const OP_BATCH_BUFFER_START: u32 = 0x1800_0001;
pub const OP_SEMAPHORE_WAIT: u32 = 0x1800_0002;
pub const OP_FENCE_WRITE: u32 = 0x1800_0003;
pub const OP_STATE_BASE_ADDRESS: u32 = 0x1800_0004;
pub const OP_FRONT_END_STATE: u32 = 0x1800_0005;
pub const OP_PREEMPTION: u32 = 0x1800_0006;
pub const OP_BATCH_BUFFER_END: u32 = 0x1800_0007;
pub const OP_SCHEDULER: u32 = 0x1800_0008;

const OVERFLOW: SubmissionError = SubmissionError::OutOfDeviceMemory;

/// In-tree [`Encoder`] implementation. Real hardware families plug in their own encoder;
/// everything in this crate and its tests runs on this one.
#[derive(Debug, Default, Copy, Clone)]
pub struct SoftEncoder;

impl SoftEncoder {
	fn header(stream: &mut LinearStream, opcode: u32, arg: u32) -> SubmitResult<()> {
		stream.write_u32(opcode).ok_or(OVERFLOW)?;
		stream.write_u32(arg).ok_or(OVERFLOW)
	}
}

impl Encoder for SoftEncoder {
	fn batch_buffer_start_size(&self) -> usize {
		16
	}

	fn semaphore_wait_size(&self) -> usize {
		24
	}

	fn fence_write_size(&self) -> usize {
		16
	}

	fn sba_size(&self) -> usize {
		40
	}

	fn front_end_size(&self) -> usize {
		8
	}

	fn preemption_size(&self) -> usize {
		8
	}

	fn batch_buffer_end_size(&self) -> usize {
		8
	}

	fn scheduler_size(&self, target_count: usize) -> usize {
		8 + 8 * target_count
	}

	fn default_heap_size(&self) -> usize {
		64 * 1024
	}

	fn heap_alignment(&self) -> usize {
		64
	}

	fn encode_batch_buffer_start(&self, stream: &mut LinearStream, target: u64, secondary: bool) -> SubmitResult<()> {
		Self::header(stream, OP_BATCH_BUFFER_START, secondary as u32)?;
		stream.write_u64(target).ok_or(OVERFLOW)
	}

	fn encode_semaphore_wait(
		&self,
		stream: &mut LinearStream,
		address: u64,
		value: u64,
		op: SemaphoreOp,
	) -> SubmitResult<()> {
		Self::header(stream, OP_SEMAPHORE_WAIT, op as u32)?;
		stream.write_u64(address).ok_or(OVERFLOW)?;
		stream.write_u64(value).ok_or(OVERFLOW)
	}

	fn encode_fence_write(&self, stream: &mut LinearStream, address: u64, value: u32) -> SubmitResult<()> {
		Self::header(stream, OP_FENCE_WRITE, value)?;
		stream.write_u64(address).ok_or(OVERFLOW)
	}

	fn encode_state_base_address(&self, stream: &mut LinearStream, sba: &SbaProperties) -> SubmitResult<()> {
		Self::header(stream, OP_STATE_BASE_ADDRESS, 0)?;
		stream.write_u64(sba.general_base).ok_or(OVERFLOW)?;
		stream.write_u64(sba.surface_state_base).ok_or(OVERFLOW)?;
		stream.write_u64(sba.dynamic_state_base).ok_or(OVERFLOW)?;
		stream.write_u64(sba.instruction_base).ok_or(OVERFLOW)
	}

	fn encode_front_end_state(&self, stream: &mut LinearStream, scratch_size: u32) -> SubmitResult<()> {
		Self::header(stream, OP_FRONT_END_STATE, scratch_size)
	}

	fn encode_preemption(&self, stream: &mut LinearStream, mode: PreemptionMode) -> SubmitResult<()> {
		Self::header(stream, OP_PREEMPTION, mode as u32)
	}

	fn encode_batch_buffer_end(&self, stream: &mut LinearStream) -> SubmitResult<()> {
		Self::header(stream, OP_BATCH_BUFFER_END, 0)
	}

	fn encode_scheduler(&self, stream: &mut LinearStream, targets: &[u64]) -> SubmitResult<()> {
		Self::header(stream, OP_SCHEDULER, targets.len() as u32)?;
		for target in targets {
			stream.write_u64(*target).ok_or(OVERFLOW)?;
		}
		Ok(())
	}
}

/// Decoded view of a [`SoftEncoder`] record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftCommand {
	BatchBufferStart { target: u64, secondary: bool },
	SemaphoreWait { address: u64, value: u64, op: SemaphoreOp },
	FenceWrite { address: u64, value: u32 },
	StateBaseAddress(SbaProperties),
	FrontEndState { scratch_size: u32 },
	Preemption(PreemptionMode),
	BatchBufferEnd,
	Scheduler { targets: Vec<u64> },
}

fn read_u32(bytes: &[u8], cursor: usize) -> Option<u32> {
	Some(u32::from_le(bytemuck::pod_read_unaligned(bytes.get(cursor..cursor + 4)?)))
}

fn read_u64(bytes: &[u8], cursor: usize) -> Option<u64> {
	Some(u64::from_le(bytemuck::pod_read_unaligned(bytes.get(cursor..cursor + 8)?)))
}

/// Parse a stream of [`SoftEncoder`] records. Stops cleanly at the end of the recorded
/// bytes; zero words are treated as padding. Unknown nonzero opcodes terminate parsing,
/// which keeps the decoder honest when pointed at foreign payload bytes.
pub fn decode_stream(bytes: &[u8]) -> Vec<SoftCommand> {
	let mut commands = Vec::new();
	let mut cursor = 0;
	while cursor + 8 <= bytes.len() {
		let opcode = read_u32(bytes, cursor).unwrap();
		if opcode == 0 {
			cursor += 4;
			continue;
		}
		let arg = read_u32(bytes, cursor + 4).unwrap();
		cursor += 8;
		let command = match opcode {
			OP_BATCH_BUFFER_START => {
				let Some(target) = read_u64(bytes, cursor) else { break };
				cursor += 8;
				SoftCommand::BatchBufferStart {
					target,
					secondary: arg != 0,
				}
			}
			OP_SEMAPHORE_WAIT => {
				let (Some(address), Some(value)) = (read_u64(bytes, cursor), read_u64(bytes, cursor + 8)) else {
					break;
				};
				cursor += 16;
				let op = if arg == SemaphoreOp::Equal as u32 {
					SemaphoreOp::Equal
				} else {
					SemaphoreOp::GreaterOrEqual
				};
				SoftCommand::SemaphoreWait { address, value, op }
			}
			OP_FENCE_WRITE => {
				let Some(address) = read_u64(bytes, cursor) else { break };
				cursor += 8;
				SoftCommand::FenceWrite { address, value: arg }
			}
			OP_STATE_BASE_ADDRESS => {
				let (Some(general_base), Some(surface_state_base), Some(dynamic_state_base), Some(instruction_base)) = (
					read_u64(bytes, cursor),
					read_u64(bytes, cursor + 8),
					read_u64(bytes, cursor + 16),
					read_u64(bytes, cursor + 24),
				) else {
					break;
				};
				cursor += 32;
				SoftCommand::StateBaseAddress(SbaProperties {
					general_base,
					surface_state_base,
					dynamic_state_base,
					instruction_base,
				})
			}
			OP_FRONT_END_STATE => SoftCommand::FrontEndState { scratch_size: arg },
			OP_PREEMPTION => match PreemptionMode::from_u32(arg) {
				Some(mode) => SoftCommand::Preemption(mode),
				None => break,
			},
			OP_BATCH_BUFFER_END => SoftCommand::BatchBufferEnd,
			OP_SCHEDULER => {
				let mut targets = Vec::with_capacity(arg as usize);
				let mut ok = true;
				for i in 0..arg as usize {
					match read_u64(bytes, cursor + 8 * i) {
						Some(t) => targets.push(t),
						None => {
							ok = false;
							break;
						}
					}
				}
				if !ok {
					break;
				}
				cursor += 8 * arg as usize;
				SoftCommand::Scheduler { targets }
			}
			_ => break,
		};
		commands.push(command);
	}
	commands
}

/// Count the commands in `bytes` matching `predicate`.
pub fn count_commands(bytes: &[u8], predicate: impl Fn(&SoftCommand) -> bool) -> usize {
	decode_stream(bytes).iter().filter(|c| predicate(c)).count()
}
