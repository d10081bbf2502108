use crate::register::RegisterId;

/// `reg[8] | signed_offset[16]` payload of a `RegIndirect` argument.
/// Effective address = `reg_value + sign_extend(offset)`, bounds-checked by
/// the VM's memory bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegIndirect {
    pub reg: RegisterId,
    pub offset: i16,
}

impl RegIndirect {
    const REG_BITS: u32 = 8;
    const OFFSET_BITS: u32 = 16;

    fn pack(self) -> u32 {
        (self.reg.to_u8() as u32) | ((self.offset as u16 as u32) << Self::REG_BITS)
    }

    fn unpack(raw: u32) -> Self {
        let reg = RegisterId::new_unchecked((raw & 0xff) as u8);
        let offset = ((raw >> Self::REG_BITS) & 0xffff) as u16 as i16;
        Self { reg, offset }
    }

    const _ASSERT_FITS: () = assert!(Self::REG_BITS + Self::OFFSET_BITS == 24);
}

/// A `value` argument: 2 mode bits + 32-bit payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arg {
    Imm(u32),
    Reg(RegisterId),
    Mem(u32),
    RegIndirect(RegIndirect),
}

impl Arg {
    const MODE_BITS: u32 = 2;
    const PAYLOAD_BITS: u32 = 32;
    /// Total bit width of a `value` argument slot.
    pub const BITS: u32 = Self::MODE_BITS + Self::PAYLOAD_BITS;

    const MODE_IMM: u32 = 0b00;
    const MODE_REG: u32 = 0b01;
    const MODE_MEM: u32 = 0b10;
    const MODE_REG_INDIRECT: u32 = 0b11;

    pub fn pack(self) -> u64 {
        let (mode, payload) = match self {
            Self::Imm(v) => (Self::MODE_IMM, v),
            Self::Reg(r) => (Self::MODE_REG, r.to_u8() as u32),
            Self::Mem(addr) => (Self::MODE_MEM, addr),
            Self::RegIndirect(ri) => (Self::MODE_REG_INDIRECT, ri.pack()),
        };
        (mode as u64) | ((payload as u64) << Self::MODE_BITS)
    }

    pub fn unpack(raw: u64) -> Self {
        let mode = (raw & 0b11) as u32;
        let payload = ((raw >> Self::MODE_BITS) & 0xffff_ffff) as u32;
        match mode {
            Self::MODE_IMM => Self::Imm(payload),
            Self::MODE_REG => Self::Reg(RegisterId::new_unchecked((payload & 0xff) as u8)),
            Self::MODE_MEM => Self::Mem(payload),
            _ => Self::RegIndirect(RegIndirect::unpack(payload)),
        }
    }
}

/// An `addr` argument: 1 mode bit + 32-bit payload (33 bits total). Only
/// `mem`/`reg_indirect` modes are valid; an `addr` argument always names a
/// memory location rather than an immediate or register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrArg {
    Mem(u32),
    RegIndirect(RegIndirect),
}

impl AddrArg {
    const MODE_BITS: u32 = 1;
    const PAYLOAD_BITS: u32 = 32;
    pub const BITS: u32 = Self::MODE_BITS + Self::PAYLOAD_BITS;

    const MODE_MEM: u64 = 0;
    const MODE_REG_INDIRECT: u64 = 1;

    pub fn pack(self) -> u64 {
        let (mode, payload) = match self {
            Self::Mem(addr) => (Self::MODE_MEM, addr),
            Self::RegIndirect(ri) => (Self::MODE_REG_INDIRECT, ri.pack()),
        };
        mode | ((payload as u64) << Self::MODE_BITS)
    }

    pub fn unpack(raw: u64) -> Self {
        let mode = raw & 0x1;
        let payload = ((raw >> Self::MODE_BITS) & 0xffff_ffff) as u32;
        if mode == Self::MODE_REG_INDIRECT {
            Self::RegIndirect(RegIndirect::unpack(payload))
        } else {
            Self::Mem(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_arg_round_trips_every_mode() {
        for arg in [
            Arg::Imm(0xdead_beef),
            Arg::Reg(RegisterId::general(3)),
            Arg::Mem(0x1234),
            Arg::RegIndirect(RegIndirect {
                reg: RegisterId::SP,
                offset: -8,
            }),
        ] {
            assert_eq!(Arg::unpack(arg.pack()), arg);
        }
    }

    #[test]
    fn addr_arg_round_trips() {
        for arg in [
            AddrArg::Mem(0x1000_0000),
            AddrArg::RegIndirect(RegIndirect {
                reg: RegisterId::FP,
                offset: 16,
            }),
        ] {
            assert_eq!(AddrArg::unpack(arg.pack()), arg);
        }
    }

    #[test]
    fn reg_indirect_preserves_negative_offsets() {
        let ri = RegIndirect {
            reg: RegisterId::general(1),
            offset: -1,
        };
        assert_eq!(RegIndirect::unpack(ri.pack()).offset, -1);
    }
}
