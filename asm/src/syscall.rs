/// Identifies a VM syscall, the payload of the `syscall` opcode's `value`
/// argument.
///
/// Numbered sequentially with no gaps, unlike some historical syscall
/// ABIs that leave room between groups for future additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Syscall {
    PrintHex = 0,
    PrintInt = 1,
    PrintFloat = 2,
    PrintDouble = 3,
    PrintChar = 4,
    PrintString = 5,
    ReadInt = 6,
    ReadFloat = 7,
    ReadDouble = 8,
    ReadChar = 9,
    ReadString = 10,
    Exit = 11,
    CopyMem = 12,
    PrintRegs = 13,
    PrintMem = 14,
    PrintStack = 15,
}

impl Syscall {
    pub const fn to_u64(self) -> u64 {
        self as u64
    }

    pub const fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::PrintHex),
            1 => Some(Self::PrintInt),
            2 => Some(Self::PrintFloat),
            3 => Some(Self::PrintDouble),
            4 => Some(Self::PrintChar),
            5 => Some(Self::PrintString),
            6 => Some(Self::ReadInt),
            7 => Some(Self::ReadFloat),
            8 => Some(Self::ReadDouble),
            9 => Some(Self::ReadChar),
            10 => Some(Self::ReadString),
            11 => Some(Self::Exit),
            12 => Some(Self::CopyMem),
            13 => Some(Self::PrintRegs),
            14 => Some(Self::PrintMem),
            15 => Some(Self::PrintStack),
            _ => None,
        }
    }

    /// Whether this syscall reads a value back into a register (as opposed
    /// to only producing output or side effects).
    pub const fn produces_result(self) -> bool {
        matches!(
            self,
            Self::ReadInt | Self::ReadFloat | Self::ReadDouble | Self::ReadChar | Self::ReadString
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn round_trips_through_raw_bits() {
        for sc in Syscall::iter() {
            assert_eq!(Syscall::from_u64(sc.to_u64()), Some(sc));
        }
    }

    #[test]
    fn out_of_range_codes_reject() {
        assert_eq!(Syscall::from_u64(16), None);
    }
}
