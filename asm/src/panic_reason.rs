/// The 3-bit error code carried in the flag register's `[5..7]` bits,
/// surfaced to the running program and to any attached debugger.
///
/// Bit pattern `6` is intentionally unused; `Unknown` at `7` is the
/// catch-all for anything that doesn't fit the other categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, derive_more::Display)]
#[repr(u8)]
pub enum ErrorCode {
    #[display(fmt = "ok")]
    Ok = 0,
    #[display(fmt = "invalid opcode")]
    Opcode = 1,
    #[display(fmt = "segmentation fault")]
    Segfault = 2,
    #[display(fmt = "invalid register")]
    Reg = 3,
    #[display(fmt = "invalid syscall")]
    Syscall = 4,
    #[display(fmt = "invalid datatype")]
    Datatype = 5,
    #[display(fmt = "unknown error")]
    Unknown = 7,
}

impl ErrorCode {
    pub const BITS: u32 = 3;

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Self {
        match value & 0x7 {
            0 => Self::Ok,
            1 => Self::Opcode,
            2 => Self::Segfault,
            3 => Self::Reg,
            4 => Self::Syscall,
            5 => Self::Datatype,
            _ => Self::Unknown,
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}
