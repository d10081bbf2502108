//! Bytecode interpreter for the toylang virtual machine: a fetch/decode/
//! execute loop over [`toylang_asm::Instruction`], architectural state
//! ([`Core`]) separated from the loop driving it ([`Vm`]).

mod consts;
mod core;
mod debug;
mod error;
mod execute;
mod flags;
mod image;
mod interrupt;
mod memory;
mod registers;
mod syscall_handler;
mod vm;

pub use consts::{DEFAULT_INTERRUPT_HANDLER, DRAM_SIZE, IMAGE_HEADER_LEN, REGISTER_COUNT, WORD_SIZE};
pub use debug::{DebugEvent, DebugFlags, DebugSink};
pub use error::{report as report_error, ImageError, VmError};
pub use execute::effective_interrupt_handler;
pub use image::Image;
pub use memory::SegFault;
pub use vm::{Config, Halt, Vm};
