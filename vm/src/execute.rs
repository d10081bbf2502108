use std::io::{BufRead, Write};

use toylang_asm::{AddrArg, Arg, Datatype, ErrorCode, Instruction, RegIndirect, RegisterId, Word};

use crate::consts::{DEFAULT_INTERRUPT_HANDLER, WORD_SIZE};
use crate::core::Core;
use crate::syscall_handler::{self, Outcome};

/// Resolve a `value` argument to its raw 64-bit payload, following the
/// reference `get_arg_value`: immediates carrying a `double`-tagged
/// instruction are widened from a 32-bit float bit pattern, every other
/// mode loads a full 64-bit word.
fn resolve_value(core: &mut Core, arg: Arg, widen_imm_to_double: bool) -> Option<Word> {
    match arg {
        Arg::Imm(v) => {
            if widen_imm_to_double {
                Some((f32::from_bits(v) as f64).to_bits())
            } else {
                Some(v as Word)
            }
        }
        Arg::Reg(r) => {
            if !register_in_range(r) {
                core.raise_error(ErrorCode::Reg, r.to_u8() as Word);
                return None;
            }
            Some(core.reg(r))
        }
        Arg::Mem(addr) => load_or_fault(core, addr, WORD_SIZE as u8),
        Arg::RegIndirect(ri) => {
            let addr = resolve_reg_indirect(core, ri)?;
            load_or_fault(core, addr, WORD_SIZE as u8)
        }
    }
}

fn resolve_addr(core: &mut Core, arg: AddrArg) -> Option<u32> {
    match arg {
        AddrArg::Mem(addr) => Some(addr),
        AddrArg::RegIndirect(ri) => resolve_reg_indirect(core, ri),
    }
}

fn resolve_reg_indirect(core: &mut Core, ri: RegIndirect) -> Option<u32> {
    if !register_in_range(ri.reg) {
        core.raise_error(ErrorCode::Reg, ri.reg.to_u8() as Word);
        return None;
    }
    let base = core.reg(ri.reg) as i64;
    let addr = base.wrapping_add(ri.offset as i64);
    if !(0..=u32::MAX as i64).contains(&addr) {
        core.raise_error(ErrorCode::Segfault, addr as Word);
        return None;
    }
    Some(addr as u32)
}

fn register_in_range(reg: RegisterId) -> bool {
    (reg.to_u8() as usize) < toylang_asm::REGISTER_COUNT as usize
}

fn load_or_fault(core: &mut Core, addr: u32, size: u8) -> Option<Word> {
    match core.mem_load(addr, size) {
        Ok(v) => Some(v),
        Err(e) => {
            core.raise_error(ErrorCode::Segfault, e.addr as Word);
            None
        }
    }
}

fn store_or_fault(core: &mut Core, addr: u32, size: u8, value: Word) -> Option<()> {
    match core.mem_store(addr, size, value) {
        Ok(()) => Some(()),
        Err(e) => {
            core.raise_error(ErrorCode::Segfault, e.addr as Word);
            None
        }
    }
}

fn test_is_zero(core: &mut Core, reg: RegisterId) {
    let is_zero = core.reg_silent(reg) == 0;
    let mut flags = core.flags();
    flags.set_zero(is_zero);
    core.set_flags(flags);
}

/// Typed view of a raw `Word`, used to give arithmetic and comparison the
/// semantics its `Datatype` tag calls for.
#[derive(Debug, Clone, Copy)]
enum Typed {
    U32(u32),
    U64(u64),
    S32(i32),
    S64(i64),
    Flt(f32),
    Dbl(f64),
}

fn reinterpret(raw: Word, dt: Datatype) -> Typed {
    match dt {
        Datatype::U32 => Typed::U32(raw as u32),
        Datatype::U64 => Typed::U64(raw),
        Datatype::S32 => Typed::S32(raw as u32 as i32),
        Datatype::S64 => Typed::S64(raw as i64),
        Datatype::Flt => Typed::Flt(f32::from_bits(raw as u32)),
        Datatype::Dbl => Typed::Dbl(f64::from_bits(raw)),
    }
}

impl Typed {
    fn to_word(self) -> Word {
        match self {
            Typed::U32(v) => v as Word,
            Typed::U64(v) => v,
            Typed::S32(v) => v as u32 as Word,
            Typed::S64(v) => v as Word,
            Typed::Flt(v) => v.to_bits() as Word,
            Typed::Dbl(v) => v.to_bits(),
        }
    }

    fn compare(self, rhs: Typed) -> (bool, bool, bool) {
        macro_rules! cmp {
            ($l:expr, $r:expr) => {
                ($l < $r, $l > $r, $l == $r)
            };
        }
        match (self, rhs) {
            (Typed::U32(l), Typed::U32(r)) => cmp!(l, r),
            (Typed::U64(l), Typed::U64(r)) => cmp!(l, r),
            (Typed::S32(l), Typed::S32(r)) => cmp!(l, r),
            (Typed::S64(l), Typed::S64(r)) => cmp!(l, r),
            (Typed::Flt(l), Typed::Flt(r)) => cmp!(l, r),
            (Typed::Dbl(l), Typed::Dbl(r)) => cmp!(l, r),
            _ => unreachable!("lhs and rhs are reinterpreted under the same Datatype"),
        }
    }

    fn apply(self, rhs: Typed, op: ArithOp) -> Option<Typed> {
        macro_rules! int_op {
            ($l:expr, $r:expr, $ctor:expr) => {
                match op {
                    ArithOp::Add => Some($ctor($l.wrapping_add($r))),
                    ArithOp::Sub => Some($ctor($l.wrapping_sub($r))),
                    ArithOp::Mul => Some($ctor($l.wrapping_mul($r))),
                    ArithOp::Div => {
                        if $r == 0 {
                            None
                        } else {
                            Some($ctor($l.wrapping_div($r)))
                        }
                    }
                }
            };
        }
        macro_rules! float_op {
            ($l:expr, $r:expr, $ctor:expr) => {
                match op {
                    ArithOp::Add => Some($ctor($l + $r)),
                    ArithOp::Sub => Some($ctor($l - $r)),
                    ArithOp::Mul => Some($ctor($l * $r)),
                    ArithOp::Div => Some($ctor($l / $r)),
                }
            };
        }
        match (self, rhs) {
            (Typed::U32(l), Typed::U32(r)) => int_op!(l, r, Typed::U32),
            (Typed::U64(l), Typed::U64(r)) => int_op!(l, r, Typed::U64),
            (Typed::S32(l), Typed::S32(r)) => int_op!(l, r, Typed::S32),
            (Typed::S64(l), Typed::S64(r)) => int_op!(l, r, Typed::S64),
            (Typed::Flt(l), Typed::Flt(r)) => float_op!(l, r, Typed::Flt),
            (Typed::Dbl(l), Typed::Dbl(r)) => float_op!(l, r, Typed::Dbl),
            _ => unreachable!("lhs and rhs are reinterpreted under the same Datatype"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Execute one decoded instruction against `core`, servicing any syscall
/// through `reader`/`writer`.
///
/// Instructions that hit a memory or register fault call
/// [`Core::raise_error`] internally and return — matching the reference
/// interpreter's "if (!is_running()) return;" style, rather than
/// propagating a `Result` for conditions the running program itself is
/// meant to observe and recover from.
pub fn execute(
    core: &mut Core,
    insn: Instruction,
    reader: &mut impl BufRead,
    writer: &mut impl Write,
) -> std::io::Result<Outcome> {
    match insn {
        Instruction::Nop { .. } => {}
        Instruction::Rti { .. } => {
            let ipc = core.reg(RegisterId::IPC);
            core.reg_set(RegisterId::PC, ipc);
            let mut flags = core.flags();
            flags.set_in_interrupt(false);
            core.set_flags(flags);
        }
        Instruction::Load { dest, src, .. } => {
            let Some(value) = resolve_value(core, src, false) else {
                return Ok(Outcome::Continue);
            };
            core.reg_set(dest, value);
            test_is_zero(core, dest);
        }
        Instruction::LoadUpper { dest, imm, .. } => {
            core.reg_upper(dest, imm);
            test_is_zero(core, dest);
        }
        Instruction::Store { dest, src, .. } => {
            let Some(addr) = resolve_addr(core, dest) else {
                return Ok(Outcome::Continue);
            };
            let value = core.reg(src);
            if store_or_fault(core, addr, WORD_SIZE as u8, value).is_none() {
                return Ok(Outcome::Continue);
            }
        }
        Instruction::Compare { datatype, lhs, rhs, .. } => {
            let Some(raw_rhs) = resolve_value(core, rhs, datatype == Datatype::Dbl) else {
                return Ok(Outcome::Continue);
            };
            let raw_lhs = core.reg(lhs);
            let (lt, gt, eq) = reinterpret(raw_lhs, datatype).compare(reinterpret(raw_rhs, datatype));
            let mut flags = core.flags();
            flags.set_comparison(lt, gt, eq);
            core.set_flags(flags);
        }
        Instruction::Convert { from, to, dest, src, .. } => {
            let Some(raw) = resolve_value(core, src, from == Datatype::Dbl) else {
                return Ok(Outcome::Continue);
            };
            core.reg_set(dest, convert_to(reinterpret(raw, from), to));
            test_is_zero(core, dest);
        }
        Instruction::Not { dest, src, .. } => {
            let Some(value) = resolve_value(core, src, false) else {
                return Ok(Outcome::Continue);
            };
            core.reg_set(dest, !value);
            test_is_zero(core, dest);
        }
        Instruction::And { dest, src, .. } => bitwise(core, dest, src, |a, b| a & b),
        Instruction::Or { dest, src, .. } => bitwise(core, dest, src, |a, b| a | b),
        Instruction::Xor { dest, src, .. } => bitwise(core, dest, src, |a, b| a ^ b),
        Instruction::Shl { dest, src, .. } => bitwise(core, dest, src, |a, b| a.wrapping_shl(b as u32 & 63)),
        Instruction::Shr { dest, src, .. } => bitwise(core, dest, src, |a, b| a.wrapping_shr(b as u32 & 63)),
        Instruction::Zext { dest, src, .. } => {
            let Some(value) = resolve_value(core, src, false) else {
                return Ok(Outcome::Continue);
            };
            core.reg_set(dest, value as u32 as Word);
            test_is_zero(core, dest);
        }
        Instruction::Sext { dest, src, .. } => {
            let Some(value) = resolve_value(core, src, false) else {
                return Ok(Outcome::Continue);
            };
            core.reg_set(dest, value as u32 as i32 as i64 as Word);
            test_is_zero(core, dest);
        }
        Instruction::Mod { dest, src, .. } => {
            let Some(raw_rhs) = resolve_value(core, src, false) else {
                return Ok(Outcome::Continue);
            };
            let rhs = raw_rhs as i64;
            if rhs == 0 {
                core.raise_error(ErrorCode::Unknown, raw_rhs);
                return Ok(Outcome::Continue);
            }
            let lhs = core.reg_silent(dest) as i64;
            core.reg_set(dest, lhs.wrapping_rem(rhs) as u64);
            test_is_zero(core, dest);
        }
        Instruction::Add { datatype, dest, src, .. } => arith(core, datatype, dest, src, ArithOp::Add)?,
        Instruction::Sub { datatype, dest, src, .. } => arith(core, datatype, dest, src, ArithOp::Sub)?,
        Instruction::Mul { datatype, dest, src, .. } => arith(core, datatype, dest, src, ArithOp::Mul)?,
        Instruction::Div { datatype, dest, src, .. } => arith(core, datatype, dest, src, ArithOp::Div)?,
        Instruction::Jal { reg_link, target, .. } => {
            let Some(raw_target) = resolve_value(core, target, false) else {
                return Ok(Outcome::Continue);
            };
            let pc = core.reg_silent(RegisterId::PC);
            core.reg_set(reg_link, pc);
            core.reg_set(RegisterId::PC, raw_target as u32 as Word);
        }
        Instruction::Syscall { code, .. } => {
            let Some(raw) = resolve_value(core, code, false) else {
                return Ok(Outcome::Continue);
            };
            let Some(syscall) = toylang_asm::Syscall::from_u64(raw) else {
                core.raise_error(ErrorCode::Syscall, raw);
                return Ok(Outcome::Continue);
            };
            return syscall_handler::handle(core, syscall, reader, writer);
        }
    }
    Ok(Outcome::Continue)
}

fn bitwise(core: &mut Core, dest: RegisterId, src: Arg, op: impl Fn(Word, Word) -> Word) {
    let Some(rhs) = resolve_value(core, src, false) else {
        return;
    };
    let lhs = core.reg_silent(dest);
    core.reg_set(dest, op(lhs, rhs));
    test_is_zero(core, dest);
}

fn arith(
    core: &mut Core,
    datatype: Datatype,
    dest: RegisterId,
    src: Arg,
    op: ArithOp,
) -> std::io::Result<()> {
    let Some(raw_rhs) = resolve_value(core, src, datatype == Datatype::Dbl) else {
        return Ok(());
    };
    let lhs = reinterpret(core.reg_silent(dest), datatype);
    let rhs = reinterpret(raw_rhs, datatype);
    match lhs.apply(rhs, op) {
        Some(result) => {
            core.reg_set(dest, result.to_word());
            test_is_zero(core, dest);
        }
        None => core.raise_error(ErrorCode::Unknown, raw_rhs),
    }
    Ok(())
}

/// Cast a [`Typed`] value (already reinterpreted under its *source*
/// datatype) to `target`, following the numeric-cast semantics of the
/// reference `cast_value`: each source variant casts through Rust's `as`
/// rules for its own type, not a blind reinterpretation of the raw bits.
fn convert_to(src: Typed, target: Datatype) -> Word {
    macro_rules! cast {
        ($v:expr) => {
            match target {
                Datatype::U32 => ($v as u32) as Word,
                Datatype::U64 => $v as u64,
                Datatype::S32 => ($v as i32) as u32 as Word,
                Datatype::S64 => ($v as i64) as Word,
                Datatype::Flt => ($v as f32).to_bits() as Word,
                Datatype::Dbl => ($v as f64).to_bits(),
            }
        };
    }
    match src {
        Typed::U32(v) => cast!(v),
        Typed::U64(v) => cast!(v),
        Typed::S32(v) => cast!(v),
        Typed::S64(v) => cast!(v),
        Typed::Flt(v) => cast!(v),
        Typed::Dbl(v) => cast!(v),
    }
}

/// Interrupt handler address recorded by the loaded image, falling back
/// to [`DEFAULT_INTERRUPT_HANDLER`] when the image didn't set one.
pub fn effective_interrupt_handler(configured: u32) -> u32 {
    if configured == 0 {
        DEFAULT_INTERRUPT_HANDLER
    } else {
        configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::DebugFlags;
    use toylang_asm::Predicate;

    fn core() -> Core {
        Core::new(DebugFlags::empty())
    }

    fn run(core: &mut Core, insn: Instruction) {
        let mut reader = std::io::BufReader::new(std::io::empty());
        let mut writer = Vec::new();
        execute(core, insn, &mut reader, &mut writer).unwrap();
    }

    #[test]
    fn load_sets_the_zero_flag_on_a_zero_immediate() {
        let mut core = core();
        run(
            &mut core,
            Instruction::Load {
                predicate: Predicate::Na,
                dest: RegisterId::general(1),
                src: Arg::Imm(0),
            },
        );
        assert!(core.flags().is_zero());
    }

    #[test]
    fn add_wraps_on_u32_overflow() {
        let mut core = core();
        core.reg_set(RegisterId::general(1), u32::MAX as Word);
        run(
            &mut core,
            Instruction::Add {
                predicate: Predicate::Na,
                datatype: Datatype::U32,
                dest: RegisterId::general(1),
                src: Arg::Imm(1),
            },
        );
        assert_eq!(core.reg_silent(RegisterId::general(1)), 0);
    }

    #[test]
    fn divide_by_zero_raises_in_band_error() {
        let mut core = core();
        core.reg_set(RegisterId::general(1), 10);
        run(
            &mut core,
            Instruction::Div {
                predicate: Predicate::Na,
                datatype: Datatype::S64,
                dest: RegisterId::general(1),
                src: Arg::Imm(0),
            },
        );
        assert!(!core.is_running());
        assert_eq!(core.flags().error(), ErrorCode::Unknown);
    }

    #[test]
    fn compare_sets_lt_bit_for_signed_operands() {
        let mut core = core();
        core.reg_set(RegisterId::general(1), (-1i64) as u64);
        run(
            &mut core,
            Instruction::Compare {
                predicate: Predicate::Na,
                datatype: Datatype::S64,
                lhs: RegisterId::general(1),
                rhs: Arg::Imm(0),
            },
        );
        assert_eq!(core.flags().cmp3(), toylang_asm::CMP_LT_BIT);
    }

    #[test]
    fn jal_stashes_the_return_address_in_the_requested_link_register() {
        // `$ret` is reserved for a call's return *value* (the codegen's
        // prologue/epilogue convention), so the compiler's own calling
        // convention always names `$rpc` as the link register, but the
        // instruction itself leaves that choice to whoever's encoding it.
        let mut core = core();
        core.reg_set(RegisterId::PC, 0x100);
        run(
            &mut core,
            Instruction::Jal {
                predicate: Predicate::Na,
                reg_link: RegisterId::RPC,
                target: Arg::Imm(0x400),
            },
        );
        assert_eq!(core.reg_silent(RegisterId::RPC), 0x100);
        assert_eq!(core.reg_silent(RegisterId::PC), 0x400);
    }

    #[test]
    fn jal_can_stash_the_return_address_in_a_different_register() {
        let mut core = core();
        core.reg_set(RegisterId::PC, 0x100);
        run(
            &mut core,
            Instruction::Jal {
                predicate: Predicate::Na,
                reg_link: RegisterId::general(5),
                target: Arg::Imm(0x400),
            },
        );
        assert_eq!(core.reg_silent(RegisterId::general(5)), 0x100);
        assert_eq!(core.reg_silent(RegisterId::RPC), 0);
        assert_eq!(core.reg_silent(RegisterId::PC), 0x400);
    }

    #[test]
    fn rti_restores_pc_and_clears_in_interrupt() {
        let mut core = core();
        core.reg_set(RegisterId::IPC, 0x200);
        let mut flags = core.flags();
        flags.set_in_interrupt(true);
        core.set_flags(flags);
        run(&mut core, Instruction::Rti { predicate: Predicate::Na });
        assert_eq!(core.reg_silent(RegisterId::PC), 0x200);
        assert!(!core.flags().in_interrupt());
    }
}
