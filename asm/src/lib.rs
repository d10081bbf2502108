//! Instruction word format for the toylang virtual machine.
//!
//! This crate is the single source of truth for the wire format: the code
//! generator's binary emitter and the VM's decoder both depend on it so the
//! two halves of the toolchain can never drift apart on bit layout.

mod arg;
mod datatype;
mod decode;
mod instruction;
mod opcode;
mod panic_reason;
mod predicate;
mod register;
mod syscall;

pub use arg::{AddrArg, Arg, RegIndirect};
pub use datatype::Datatype;
pub use decode::DecodeError;
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use panic_reason::ErrorCode;
pub use predicate::{Predicate, CMP_EQ_BIT, CMP_GT_BIT, CMP_LT_BIT};
pub use register::{RegisterId, FIRST_GENERAL, REGISTER_COUNT};
pub use syscall::Syscall;

/// A 64-bit machine word: the VM's native register/memory-cell width.
pub type Word = u64;

/// Byte length of an encoded instruction word.
pub const INSTRUCTION_LEN: usize = 8;
