//! VM parameters

use toylang_asm::Word;

/// Number of addressable registers.
pub const REGISTER_COUNT: usize = toylang_asm::REGISTER_COUNT as usize;

/// Size of a machine word, in bytes.
pub const WORD_SIZE: usize = core::mem::size_of::<Word>();

/// Size of DRAM, in bytes (1 MiB).
pub const DRAM_SIZE: u64 = 1024 * 1024;

static_assertions::const_assert!(DRAM_SIZE <= u32::MAX as u64);

/// Default address the program counter jumps to when an interrupt fires
/// and no handler address was supplied by the loaded image.
pub const DEFAULT_INTERRUPT_HANDLER: u32 = 0x400;

/// Byte length of an image's fixed header: entry address + interrupt
/// handler address, both little-endian `u64`s.
pub const IMAGE_HEADER_LEN: usize = 16;
