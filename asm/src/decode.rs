/// Reasons [`crate::Instruction::decode`] can reject a raw word.
///
/// Each variant carries the raw, out-of-range bit pattern that was read, so
/// a caller (the VM's fetch stage, or a disassembler) can report exactly
/// what was seen rather than just "bad instruction".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DecodeError {
    #[display(fmt = "invalid opcode bits {_0:#08b}")]
    Opcode(u8),
    #[display(fmt = "register index {_0} is out of range")]
    Register(u8),
    #[display(fmt = "invalid datatype bits {_0:#05b}")]
    Datatype(u8),
}

impl std::error::Error for DecodeError {}
