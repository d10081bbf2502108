use toylang_asm::{ErrorCode, RegisterId, Word};

use crate::consts::DRAM_SIZE;
use crate::debug::{DebugEvent, DebugFlags, DebugSink};
use crate::flags::Flags;
use crate::memory::{Memory, SegFault};
use crate::registers::Registers;

/// The architectural state of one VM instance: registers, DRAM, and the
/// debug sink they report activity to. Holds no notion of "the next
/// instruction" — that belongs to [`crate::vm::Vm`]'s fetch/execute loop.
pub struct Core {
    regs: Registers,
    mem: Memory,
    debug: DebugSink,
    dram_size: u32,
}

impl Core {
    pub fn new(debug_flags: DebugFlags) -> Self {
        Self::with_dram_size(debug_flags, DRAM_SIZE)
    }

    pub fn with_dram_size(debug_flags: DebugFlags, dram_size: u64) -> Self {
        let mut core = Self {
            regs: Registers::ALL_ZERO,
            mem: Memory::with_size(dram_size),
            debug: DebugSink::new(debug_flags),
            dram_size: dram_size as u32,
        };
        core.reset();
        core
    }

    pub fn reset(&mut self) {
        self.regs.reset(self.dram_size);
        self.mem.clear();
    }

    pub fn debug_mut(&mut self) -> &mut DebugSink {
        &mut self.debug
    }

    pub fn reg(&mut self, id: RegisterId) -> Word {
        let value = self.regs[id];
        self.debug
            .record(DebugFlags::REG, DebugEvent::RegisterRead { reg: id, value });
        value
    }

    /// Read without emitting a debug event, for internal bookkeeping (e.g.
    /// the fetch stage reading `$pc`) that shouldn't show up as program-
    /// visible register traffic.
    pub fn reg_silent(&self, id: RegisterId) -> Word {
        self.regs[id]
    }

    pub fn reg_set(&mut self, id: RegisterId, value: Word) {
        self.debug
            .record(DebugFlags::REG, DebugEvent::RegisterWrite { reg: id, value });
        self.regs[id] = value;
    }

    pub fn flags(&self) -> Flags {
        Flags(self.reg_silent(RegisterId::FLAG))
    }

    pub fn set_flags(&mut self, flags: Flags) {
        self.regs[RegisterId::FLAG] = flags.0;
    }

    pub fn mem_load(&mut self, addr: u32, size: u8) -> Result<Word, SegFault> {
        let value = self.mem.load(addr, size)?;
        self.debug.record(
            DebugFlags::MEM,
            DebugEvent::MemoryRead { addr, size, value },
        );
        Ok(value)
    }

    pub fn mem_store(&mut self, addr: u32, size: u8, value: Word) -> Result<(), SegFault> {
        self.mem.store(addr, size, value)?;
        self.debug.record(
            DebugFlags::MEM,
            DebugEvent::MemoryWrite { addr, size, value },
        );
        Ok(())
    }

    pub fn mem_copy(&mut self, src: u32, dest: u32, length: u32) -> Result<(), SegFault> {
        self.mem.copy(src, dest, length)
    }

    pub fn mem_slice(&self, addr: u32, len: u32) -> Result<&[u8], SegFault> {
        self.mem.slice(addr, len)
    }

    pub fn mem_write_image(&mut self, addr: u32, image: &[u8]) -> Result<(), SegFault> {
        self.mem.write_image(addr, image)
    }

    /// Set the error bits and clear `is_running`, matching the reference
    /// `raise_error`: execution halts the moment an in-band error fires.
    pub fn raise_error(&mut self, code: ErrorCode, detail: Word) {
        let mut flags = self.flags();
        flags.set_error(code);
        flags.set_running(false);
        self.set_flags(flags);
        self.regs[RegisterId::RET] = detail;
        self.debug
            .record(DebugFlags::ERRS, DebugEvent::Error { code, detail });
    }

    pub fn is_running(&self) -> bool {
        self.flags().is_running()
    }

    /// Copy one register's value into another, recording both sides as
    /// ordinary register traffic.
    pub fn reg_copy(&mut self, dest: RegisterId, src: RegisterId) {
        let value = self.reg(src);
        self.reg_set(dest, value);
    }

    /// Replace `reg`'s upper 32 bits with `value`, leaving the lower 32
    /// bits untouched, matching `loadupper`'s semantics.
    pub fn reg_upper(&mut self, reg: RegisterId, value: u32) {
        let lower = self.reg_silent(reg);
        self.reg_set(reg, lower | ((value as Word) << 32));
    }
}
