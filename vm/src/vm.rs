use std::io::{BufRead, Write};

use toylang_asm::{DecodeError, ErrorCode, Instruction, RegisterId, Word, INSTRUCTION_LEN};

use crate::core::Core;
use crate::debug::{DebugEvent, DebugFlags};
use crate::error::VmError;
use crate::execute::{self, effective_interrupt_handler};
use crate::image::Image;
use crate::interrupt;
use crate::syscall_handler::Outcome;

/// Configuration for a [`Vm`] instance, separate from the transient state
/// in [`Core`] so the same knobs can be reused across a `reset()`.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub debug_flags: DebugFlags,
    /// Maximum instructions a single [`Vm::run`] call will execute before
    /// giving up, guarding test harnesses (and `rti`-less interrupt loops)
    /// against running forever. `None` means unbounded.
    pub step_limit: Option<u64>,
    /// Whether a `nop` halts the machine instead of being a true no-op,
    /// matching the `halt_on_nop` switch named in the opcode table.
    pub halt_on_nop: bool,
    /// Overrides [`crate::consts::DRAM_SIZE`] for this instance, so tests
    /// can exercise bounds checking against a small address space instead
    /// of allocating a full 1 MiB backing array.
    pub dram_size: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_flags: DebugFlags::empty(),
            step_limit: None,
            halt_on_nop: false,
            dram_size: None,
        }
    }
}

/// Why [`Vm::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The program ran a `syscall exit`.
    Exited,
    /// An in-band error halted the program; see `$flag`'s error bits.
    Error(ErrorCode),
    /// [`Config::step_limit`] was reached without the program halting.
    StepLimitReached,
}

/// The toylang virtual machine: architectural state plus the fetch/decode/
/// execute loop driving it, parameterized over the I/O streams its
/// `syscall` instructions read from and write to.
pub struct Vm<R, W> {
    core: Core,
    interrupt_handler: u32,
    step_limit: Option<u64>,
    halt_on_nop: bool,
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Vm<R, W> {
    pub fn new(config: Config, reader: R, writer: W) -> Self {
        let dram_size = config.dram_size.unwrap_or(crate::consts::DRAM_SIZE);
        Self {
            core: Core::with_dram_size(config.debug_flags, dram_size),
            interrupt_handler: effective_interrupt_handler(0),
            step_limit: config.step_limit,
            halt_on_nop: config.halt_on_nop,
            reader,
            writer,
        }
    }

    /// Reset architectural state and load `image` at address 0, honoring
    /// its entry point and interrupt handler.
    pub fn load(&mut self, image: &Image) -> Result<(), VmError> {
        self.core.reset();
        self.core.mem_write_image(0, &image.code)?;
        self.core.reg_set(RegisterId::PC, image.entry as Word);
        self.interrupt_handler = effective_interrupt_handler(image.interrupt_handler);
        let mut flags = self.core.flags();
        flags.set_running(true);
        self.core.set_flags(flags);
        Ok(())
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    /// Raise an interrupt on `line` (`0..64`), to be taken on the next
    /// fetch if it is unmasked and the VM isn't already servicing one.
    pub fn trigger_interrupt(&mut self, line: u8) {
        let isr = self.core.reg(RegisterId::ISR) | (1 << (line as Word % 64));
        self.core.reg_set(RegisterId::ISR, isr);
    }

    fn maybe_take_interrupt(&mut self) {
        let isr = self.core.reg_silent(RegisterId::ISR);
        let imr = self.core.reg_silent(RegisterId::IMR);
        let flags = self.core.flags();
        if !interrupt::is_pending(isr, imr, flags.in_interrupt()) {
            return;
        }
        let pc = self.core.reg_silent(RegisterId::PC);
        self.core.reg_set(RegisterId::IPC, pc);
        let mut flags = self.core.flags();
        flags.set_in_interrupt(true);
        self.core.set_flags(flags);
        self.core.reg_set(RegisterId::PC, self.interrupt_handler as Word);
        self.core.debug_mut().record(
            DebugFlags::CPU,
            DebugEvent::Interrupt { isr, imr, ipc: pc as Word },
        );
    }

    /// Execute a single instruction, taking a pending interrupt first if
    /// one is due. Returns `Ok(None)` while still running, `Ok(Some(_))`
    /// once the program should stop.
    pub fn step(&mut self, cycle: u64) -> std::io::Result<Option<Halt>> {
        self.maybe_take_interrupt();

        if !self.core.is_running() {
            return Ok(Some(Halt::Error(self.core.flags().error())));
        }

        let pc = self.core.reg_silent(RegisterId::PC) as u32;
        let raw = match self.core.mem_load(pc, INSTRUCTION_LEN as u8) {
            Ok(v) => v,
            Err(e) => {
                self.core.raise_error(ErrorCode::Segfault, e.addr as Word);
                return Ok(Some(Halt::Error(ErrorCode::Segfault)));
            }
        };
        self.core.debug_mut().record(
            DebugFlags::CPU,
            DebugEvent::Cycle { step: cycle, pc, raw },
        );

        self.core
            .reg_set(RegisterId::PC, pc as Word + INSTRUCTION_LEN as Word);

        let insn = match Instruction::decode(raw) {
            Ok(insn) => insn,
            Err(e) => {
                let (code, detail) = match e {
                    DecodeError::Opcode(bits) => (ErrorCode::Opcode, bits as Word),
                    DecodeError::Register(index) => (ErrorCode::Reg, index as Word),
                    DecodeError::Datatype(bits) => (ErrorCode::Datatype, bits as Word),
                };
                self.core.raise_error(code, detail);
                return Ok(Some(Halt::Error(code)));
            }
        };

        if !insn
            .predicate()
            .is_satisfied(self.core.flags().cmp3(), self.core.flags().is_zero())
        {
            return Ok(None);
        }

        if self.halt_on_nop && matches!(insn, Instruction::Nop { .. }) {
            let mut flags = self.core.flags();
            flags.set_running(false);
            self.core.set_flags(flags);
            return Ok(Some(Halt::Exited));
        }

        match execute::execute(&mut self.core, insn, &mut self.reader, &mut self.writer)? {
            Outcome::Exit => {
                let mut flags = self.core.flags();
                flags.set_running(false);
                self.core.set_flags(flags);
                return Ok(Some(Halt::Exited));
            }
            Outcome::Continue => {}
        }

        if !self.core.is_running() {
            return Ok(Some(Halt::Error(self.core.flags().error())));
        }
        Ok(None)
    }

    /// Run until the program halts, errors, or [`Config::step_limit`] is
    /// reached.
    pub fn run(&mut self) -> std::io::Result<Halt> {
        let mut cycle = 0u64;
        loop {
            if let Some(limit) = self.step_limit {
                if cycle >= limit {
                    return Ok(Halt::StepLimitReached);
                }
            }
            if let Some(halt) = self.step(cycle)? {
                return Ok(halt);
            }
            cycle += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toylang_asm::{Arg, Datatype, Predicate};

    fn assemble(insns: &[Instruction]) -> Vec<u8> {
        insns.iter().flat_map(|i| i.encode().to_le_bytes()).collect()
    }

    fn image_from(insns: &[Instruction]) -> Image {
        Image {
            entry: 0,
            interrupt_handler: 0,
            code: assemble(insns),
        }
    }

    fn vm() -> Vm<std::io::BufReader<std::io::Empty>, Vec<u8>> {
        Vm::new(
            Config::default(),
            std::io::BufReader::new(std::io::empty()),
            Vec::new(),
        )
    }

    #[test]
    fn runs_a_small_program_to_completion() {
        let mut vm = vm();
        let program = image_from(&[
            Instruction::Load {
                predicate: Predicate::Na,
                dest: RegisterId::general(1),
                src: Arg::Imm(41),
            },
            Instruction::Add {
                predicate: Predicate::Na,
                datatype: Datatype::U64,
                dest: RegisterId::general(1),
                src: Arg::Imm(1),
            },
            Instruction::Syscall {
                predicate: Predicate::Na,
                code: Arg::Imm(toylang_asm::Syscall::Exit.to_u64() as u32),
            },
        ]);
        vm.load(&program).unwrap();
        let halt = vm.run().unwrap();
        assert_eq!(halt, Halt::Exited);
        assert_eq!(vm.core().reg_silent(RegisterId::general(1)), 42);
    }

    #[test]
    fn invalid_opcode_halts_with_an_in_band_error() {
        let mut vm = vm();
        let program = Image {
            entry: 0,
            interrupt_handler: 0,
            code: vec![0b0001_0101, 0, 0, 0, 0, 0, 0, 0],
        };
        vm.load(&program).unwrap();
        let halt = vm.run().unwrap();
        assert_eq!(halt, Halt::Error(ErrorCode::Opcode));
    }

    #[test]
    fn step_limit_stops_an_infinite_loop() {
        let mut vm = Vm::new(
            Config {
                step_limit: Some(5),
                ..Config::default()
            },
            std::io::BufReader::new(std::io::empty()),
            Vec::new(),
        );
        let jump_to_self = Instruction::Jal {
            predicate: Predicate::Na,
            reg_link: RegisterId::RPC,
            target: Arg::Imm(0),
        };
        let program = image_from(&[jump_to_self]);
        vm.load(&program).unwrap();
        let halt = vm.run().unwrap();
        assert_eq!(halt, Halt::StepLimitReached);
    }

    #[test]
    fn halt_on_nop_stops_instead_of_falling_through() {
        let mut vm = Vm::new(
            Config {
                halt_on_nop: true,
                ..Config::default()
            },
            std::io::BufReader::new(std::io::empty()),
            Vec::new(),
        );
        let program = image_from(&[
            Instruction::Nop { predicate: Predicate::Na },
            Instruction::Load {
                predicate: Predicate::Na,
                dest: RegisterId::general(1),
                src: Arg::Imm(99),
            },
        ]);
        vm.load(&program).unwrap();
        let halt = vm.run().unwrap();
        assert_eq!(halt, Halt::Exited);
        assert_eq!(vm.core().reg_silent(RegisterId::general(1)), 0);
    }

    #[test]
    fn dram_size_override_shrinks_the_address_space() {
        let mut vm = Vm::new(
            Config {
                dram_size: Some(16),
                ..Config::default()
            },
            std::io::BufReader::new(std::io::empty()),
            Vec::new(),
        );
        let program = image_from(&[Instruction::Nop { predicate: Predicate::Na }]);
        vm.load(&program).unwrap();
        assert_eq!(vm.core().reg_silent(RegisterId::SP), 16);
    }

    #[test]
    fn triggered_interrupt_vectors_through_the_handler_and_rti_returns() {
        // The handler at 0x400 is a bare `rti`: taking the interrupt and
        // running the handler's first instruction both happen within the
        // same `step` call, so after one step we expect to already be back
        // where we started, with `in_interrupt` cleared again.
        let mut vm = vm();
        let mut code = assemble(&[Instruction::Nop { predicate: Predicate::Na }]);
        code.resize(0x400, 0);
        code.extend(assemble(&[Instruction::Rti { predicate: Predicate::Na }]));
        let program = Image {
            entry: 0,
            interrupt_handler: 0,
            code,
        };
        vm.load(&program).unwrap();
        vm.core_mut().reg_set(RegisterId::IMR, 0x1);
        vm.trigger_interrupt(0);
        vm.step(0).unwrap();
        assert_eq!(vm.core().reg_silent(RegisterId::PC), 0);
        assert!(!vm.core().flags().in_interrupt());
    }
}
