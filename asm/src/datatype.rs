/// Numeric interpretation tag carried by typed opcodes (`compare`,
/// arithmetic, `convert`). Packs into 3 bits of the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Datatype {
    U32 = 0b000,
    U64 = 0b001,
    S32 = 0b010,
    S64 = 0b011,
    Flt = 0b100,
    Dbl = 0b101,
}

impl Datatype {
    /// Width of the field in the instruction word.
    pub const BITS: u32 = 3;

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Decode from the low 3 bits of `value`; `None` for the two unused
    /// bit patterns (`0b110`, `0b111`), which the VM reports as a
    /// `datatype` error.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value & 0x7 {
            0b000 => Some(Self::U32),
            0b001 => Some(Self::U64),
            0b010 => Some(Self::S32),
            0b011 => Some(Self::S64),
            0b100 => Some(Self::Flt),
            0b101 => Some(Self::Dbl),
            _ => None,
        }
    }

    /// Size in bytes of the VM's native representation for this type.
    pub const fn size_in_bytes(self) -> u8 {
        match self {
            Self::U32 | Self::S32 | Self::Flt => 4,
            Self::U64 | Self::S64 | Self::Dbl => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Flt | Self::Dbl)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::S32 | Self::S64 | Self::Flt | Self::Dbl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn round_trips_through_raw_bits() {
        for dt in Datatype::iter() {
            assert_eq!(Datatype::from_u8(dt.to_u8()), Some(dt));
        }
    }

    #[test]
    fn reserved_bit_patterns_reject() {
        assert_eq!(Datatype::from_u8(0b110), None);
        assert_eq!(Datatype::from_u8(0b111), None);
    }
}
