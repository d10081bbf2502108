use crate::arg::{AddrArg, Arg};
use crate::datatype::Datatype;
use crate::decode::DecodeError;
use crate::opcode::Opcode;
use crate::predicate::Predicate;
use crate::register::RegisterId;
use crate::Word;

const OPCODE_SHIFT: u32 = 0;
const PREDICATE_SHIFT: u32 = Opcode::BITS;
const DATATYPE_SHIFT: u32 = PREDICATE_SHIFT + Predicate::BITS;
const OPERAND_SHIFT_WITH_DT: u32 = DATATYPE_SHIFT + Datatype::BITS;
const OPERAND_SHIFT_NO_DT: u32 = PREDICATE_SHIFT + Predicate::BITS;
/// `convert` carries two [`Datatype`] tags (source, then target) before its
/// register/arg operands, unlike the other typed arithmetic opcodes.
const CONVERT_OPERAND_SHIFT: u32 = DATATYPE_SHIFT + 2 * Datatype::BITS;

const REG_FIELD_BITS: u32 = 8;

/// A fully decoded instruction word.
///
/// Every variant carries the [`Predicate`] that gates whether it executes,
/// matching the instruction word's layout: `opcode[6] | cmp[4] | ..`. Typed
/// arithmetic variants additionally carry a [`Datatype`] tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Nop { predicate: Predicate },
    Load { predicate: Predicate, dest: RegisterId, src: Arg },
    LoadUpper { predicate: Predicate, dest: RegisterId, imm: u32 },
    Store { predicate: Predicate, dest: AddrArg, src: RegisterId },
    Compare { predicate: Predicate, datatype: Datatype, lhs: RegisterId, rhs: Arg },
    Convert { predicate: Predicate, from: Datatype, to: Datatype, dest: RegisterId, src: Arg },
    Not { predicate: Predicate, dest: RegisterId, src: Arg },
    And { predicate: Predicate, dest: RegisterId, src: Arg },
    Or { predicate: Predicate, dest: RegisterId, src: Arg },
    Xor { predicate: Predicate, dest: RegisterId, src: Arg },
    Shl { predicate: Predicate, dest: RegisterId, src: Arg },
    Shr { predicate: Predicate, dest: RegisterId, src: Arg },
    Zext { predicate: Predicate, dest: RegisterId, src: Arg },
    Sext { predicate: Predicate, dest: RegisterId, src: Arg },
    Add { predicate: Predicate, datatype: Datatype, dest: RegisterId, src: Arg },
    Sub { predicate: Predicate, datatype: Datatype, dest: RegisterId, src: Arg },
    Mul { predicate: Predicate, datatype: Datatype, dest: RegisterId, src: Arg },
    Div { predicate: Predicate, datatype: Datatype, dest: RegisterId, src: Arg },
    Mod { predicate: Predicate, dest: RegisterId, src: Arg },
    Jal { predicate: Predicate, reg_link: RegisterId, target: Arg },
    Rti { predicate: Predicate },
    Syscall { predicate: Predicate, code: Arg },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Nop { .. } => Opcode::Nop,
            Self::Load { .. } => Opcode::Load,
            Self::LoadUpper { .. } => Opcode::LoadUpper,
            Self::Store { .. } => Opcode::Store,
            Self::Compare { .. } => Opcode::Compare,
            Self::Convert { .. } => Opcode::Convert,
            Self::Not { .. } => Opcode::Not,
            Self::And { .. } => Opcode::And,
            Self::Or { .. } => Opcode::Or,
            Self::Xor { .. } => Opcode::Xor,
            Self::Shl { .. } => Opcode::Shl,
            Self::Shr { .. } => Opcode::Shr,
            Self::Zext { .. } => Opcode::Zext,
            Self::Sext { .. } => Opcode::Sext,
            Self::Add { .. } => Opcode::Add,
            Self::Sub { .. } => Opcode::Sub,
            Self::Mul { .. } => Opcode::Mul,
            Self::Div { .. } => Opcode::Div,
            Self::Mod { .. } => Opcode::Mod,
            Self::Jal { .. } => Opcode::Jal,
            Self::Rti { .. } => Opcode::Rti,
            Self::Syscall { .. } => Opcode::Syscall,
        }
    }

    pub fn predicate(&self) -> Predicate {
        match *self {
            Self::Nop { predicate }
            | Self::Load { predicate, .. }
            | Self::LoadUpper { predicate, .. }
            | Self::Store { predicate, .. }
            | Self::Compare { predicate, .. }
            | Self::Convert { predicate, .. }
            | Self::Not { predicate, .. }
            | Self::And { predicate, .. }
            | Self::Or { predicate, .. }
            | Self::Xor { predicate, .. }
            | Self::Shl { predicate, .. }
            | Self::Shr { predicate, .. }
            | Self::Zext { predicate, .. }
            | Self::Sext { predicate, .. }
            | Self::Add { predicate, .. }
            | Self::Sub { predicate, .. }
            | Self::Mul { predicate, .. }
            | Self::Div { predicate, .. }
            | Self::Mod { predicate, .. }
            | Self::Jal { predicate, .. }
            | Self::Rti { predicate }
            | Self::Syscall { predicate, .. } => predicate,
        }
    }

    pub fn encode(self) -> Word {
        let op = self.opcode();
        let mut word = (op.to_u8() as Word) << OPCODE_SHIFT;
        word |= (self.predicate().to_u8() as Word) << PREDICATE_SHIFT;

        match self {
            Self::Nop { .. } | Self::Rti { .. } => {}
            Self::Load { dest, src, .. } => {
                word |= reg_field(dest, OPERAND_SHIFT_NO_DT);
                word |= src.pack() << (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS);
            }
            Self::LoadUpper { dest, imm, .. } => {
                word |= reg_field(dest, OPERAND_SHIFT_NO_DT);
                word |= (imm as Word) << (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS);
            }
            Self::Store { dest, src, .. } => {
                word |= dest.pack() << OPERAND_SHIFT_NO_DT;
                word |= reg_field(src, OPERAND_SHIFT_NO_DT + AddrArg::BITS);
            }
            Self::Compare { datatype, lhs, rhs, .. } => {
                word |= (datatype.to_u8() as Word) << DATATYPE_SHIFT;
                word |= reg_field(lhs, OPERAND_SHIFT_WITH_DT);
                word |= rhs.pack() << (OPERAND_SHIFT_WITH_DT + REG_FIELD_BITS);
            }
            Self::Convert { from, to, dest, src, .. } => {
                word |= (from.to_u8() as Word) << DATATYPE_SHIFT;
                word |= (to.to_u8() as Word) << (DATATYPE_SHIFT + Datatype::BITS);
                word |= reg_field(dest, CONVERT_OPERAND_SHIFT);
                word |= src.pack() << (CONVERT_OPERAND_SHIFT + REG_FIELD_BITS);
            }
            Self::Not { dest, src, .. }
            | Self::And { dest, src, .. }
            | Self::Or { dest, src, .. }
            | Self::Xor { dest, src, .. }
            | Self::Shl { dest, src, .. }
            | Self::Shr { dest, src, .. }
            | Self::Zext { dest, src, .. }
            | Self::Sext { dest, src, .. }
            | Self::Mod { dest, src, .. } => {
                word |= reg_field(dest, OPERAND_SHIFT_NO_DT);
                word |= src.pack() << (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS);
            }
            Self::Add { datatype, dest, src, .. }
            | Self::Sub { datatype, dest, src, .. }
            | Self::Mul { datatype, dest, src, .. }
            | Self::Div { datatype, dest, src, .. } => {
                word |= (datatype.to_u8() as Word) << DATATYPE_SHIFT;
                word |= reg_field(dest, OPERAND_SHIFT_WITH_DT);
                word |= src.pack() << (OPERAND_SHIFT_WITH_DT + REG_FIELD_BITS);
            }
            Self::Jal { reg_link, target, .. } => {
                word |= reg_field(reg_link, OPERAND_SHIFT_NO_DT);
                word |= target.pack() << (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS);
            }
            Self::Syscall { code, .. } => {
                word |= code.pack() << OPERAND_SHIFT_NO_DT;
            }
        }
        word
    }

    pub fn decode(word: Word) -> Result<Self, DecodeError> {
        let raw_opcode = (word >> OPCODE_SHIFT) as u8 & 0x3f;
        let opcode = Opcode::from_u8(raw_opcode).ok_or(DecodeError::Opcode(raw_opcode))?;
        let predicate = Predicate::from_u8((word >> PREDICATE_SHIFT) as u8);

        let read_reg = |shift: u32| -> Result<RegisterId, DecodeError> {
            let raw = ((word >> shift) & mask(REG_FIELD_BITS)) as u8;
            RegisterId::checked(raw).ok_or(DecodeError::Register(raw))
        };
        let read_datatype = || -> Result<Datatype, DecodeError> {
            let raw = (word >> DATATYPE_SHIFT) as u8 & 0x7;
            Datatype::from_u8(raw).ok_or(DecodeError::Datatype(raw))
        };

        Ok(match opcode {
            Opcode::Nop => Self::Nop { predicate },
            Opcode::Rti => Self::Rti { predicate },
            Opcode::Load => {
                let dest = read_reg(OPERAND_SHIFT_NO_DT)?;
                let src = Arg::unpack(word >> (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS));
                Self::Load { predicate, dest, src }
            }
            Opcode::LoadUpper => {
                let dest = read_reg(OPERAND_SHIFT_NO_DT)?;
                let imm = (word >> (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS)) as u32;
                Self::LoadUpper { predicate, dest, imm }
            }
            Opcode::Store => {
                let dest = AddrArg::unpack(word >> OPERAND_SHIFT_NO_DT);
                let src = read_reg(OPERAND_SHIFT_NO_DT + AddrArg::BITS)?;
                Self::Store { predicate, dest, src }
            }
            Opcode::Compare => {
                let datatype = read_datatype()?;
                let lhs = read_reg(OPERAND_SHIFT_WITH_DT)?;
                let rhs = Arg::unpack(word >> (OPERAND_SHIFT_WITH_DT + REG_FIELD_BITS));
                Self::Compare { predicate, datatype, lhs, rhs }
            }
            Opcode::Convert => {
                let from = read_datatype()?;
                let raw_to = (word >> (DATATYPE_SHIFT + Datatype::BITS)) as u8 & 0x7;
                let to = Datatype::from_u8(raw_to).ok_or(DecodeError::Datatype(raw_to))?;
                let dest = read_reg(CONVERT_OPERAND_SHIFT)?;
                let src = Arg::unpack(word >> (CONVERT_OPERAND_SHIFT + REG_FIELD_BITS));
                Self::Convert { predicate, from, to, dest, src }
            }
            Opcode::Not | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Shl | Opcode::Shr
            | Opcode::Zext | Opcode::Sext | Opcode::Mod => {
                let dest = read_reg(OPERAND_SHIFT_NO_DT)?;
                let src = Arg::unpack(word >> (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS));
                match opcode {
                    Opcode::Not => Self::Not { predicate, dest, src },
                    Opcode::And => Self::And { predicate, dest, src },
                    Opcode::Or => Self::Or { predicate, dest, src },
                    Opcode::Xor => Self::Xor { predicate, dest, src },
                    Opcode::Shl => Self::Shl { predicate, dest, src },
                    Opcode::Shr => Self::Shr { predicate, dest, src },
                    Opcode::Zext => Self::Zext { predicate, dest, src },
                    Opcode::Sext => Self::Sext { predicate, dest, src },
                    _ => Self::Mod { predicate, dest, src },
                }
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let datatype = read_datatype()?;
                let dest = read_reg(OPERAND_SHIFT_WITH_DT)?;
                let src = Arg::unpack(word >> (OPERAND_SHIFT_WITH_DT + REG_FIELD_BITS));
                match opcode {
                    Opcode::Add => Self::Add { predicate, datatype, dest, src },
                    Opcode::Sub => Self::Sub { predicate, datatype, dest, src },
                    Opcode::Mul => Self::Mul { predicate, datatype, dest, src },
                    _ => Self::Div { predicate, datatype, dest, src },
                }
            }
            Opcode::Jal => {
                let reg_link = read_reg(OPERAND_SHIFT_NO_DT)?;
                let target = Arg::unpack(word >> (OPERAND_SHIFT_NO_DT + REG_FIELD_BITS));
                Self::Jal { predicate, reg_link, target }
            }
            Opcode::Syscall => {
                let code = Arg::unpack(word >> OPERAND_SHIFT_NO_DT);
                Self::Syscall { predicate, code }
            }
        })
    }
}

fn reg_field(reg: RegisterId, shift: u32) -> Word {
    (reg.to_u8() as Word & mask(REG_FIELD_BITS)) << shift
}

const fn mask(bits: u32) -> Word {
    if bits >= Word::BITS {
        Word::MAX
    } else {
        (1 << bits) - 1
    }
}
