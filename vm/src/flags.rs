use toylang_asm::{ErrorCode, Word, CMP_EQ_BIT, CMP_GT_BIT, CMP_LT_BIT};

bitflags::bitflags! {
    /// The single-bit flags packed into the `$flag` register alongside the
    /// comparison result and error code fields (spec's flag register
    /// layout: bit 3 = zero, bit 4 = running, bit 8 = in-interrupt).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusBits: Word {
        const ZERO         = 1 << 3;
        const IS_RUNNING   = 1 << 4;
        const IN_INTERRUPT = 1 << 8;
    }
}

const CMP_SHIFT: u32 = 0;
const CMP_MASK: Word = 0b111;
const ERROR_SHIFT: u32 = 5;
const ERROR_MASK: Word = 0b111;

/// Read/write view over the `$flag` register's bitfields.
///
/// Held by value rather than wrapping a `&mut Word` so callers decide when
/// to write the result back through [`crate::registers::Registers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub Word);

impl Flags {
    pub fn cmp3(self) -> u8 {
        ((self.0 >> CMP_SHIFT) & CMP_MASK) as u8
    }

    pub fn set_cmp3(&mut self, bits: u8) {
        self.0 = (self.0 & !(CMP_MASK << CMP_SHIFT)) | ((bits as Word & CMP_MASK) << CMP_SHIFT);
    }

    pub fn set_comparison(&mut self, less: bool, greater: bool, equal: bool) {
        let mut bits = 0u8;
        if less {
            bits |= CMP_LT_BIT;
        }
        if greater {
            bits |= CMP_GT_BIT;
        }
        if equal {
            bits |= CMP_EQ_BIT;
        }
        self.set_cmp3(bits);
    }

    pub fn status(self) -> StatusBits {
        StatusBits::from_bits_truncate(self.0)
    }

    pub fn is_zero(self) -> bool {
        self.status().contains(StatusBits::ZERO)
    }

    pub fn set_zero(&mut self, value: bool) {
        self.set_status(StatusBits::ZERO, value);
    }

    pub fn is_running(self) -> bool {
        self.status().contains(StatusBits::IS_RUNNING)
    }

    pub fn set_running(&mut self, value: bool) {
        self.set_status(StatusBits::IS_RUNNING, value);
    }

    pub fn in_interrupt(self) -> bool {
        self.status().contains(StatusBits::IN_INTERRUPT)
    }

    pub fn set_in_interrupt(&mut self, value: bool) {
        self.set_status(StatusBits::IN_INTERRUPT, value);
    }

    fn set_status(&mut self, bit: StatusBits, value: bool) {
        let mut status = self.status();
        status.set(bit, value);
        self.0 = (self.0 & !StatusBits::all().bits()) | status.bits();
    }

    pub fn error(self) -> ErrorCode {
        ErrorCode::from_u8(((self.0 >> ERROR_SHIFT) & ERROR_MASK) as u8)
    }

    pub fn set_error(&mut self, code: ErrorCode) {
        self.0 = (self.0 & !(ERROR_MASK << ERROR_SHIFT))
            | ((code.to_u8() as Word & ERROR_MASK) << ERROR_SHIFT);
    }

    pub fn clear_error(&mut self) {
        self.set_error(ErrorCode::Ok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_bits_round_trip_independent_of_status_bits() {
        let mut flags = Flags::default();
        flags.set_running(true);
        flags.set_comparison(true, false, false);
        assert_eq!(flags.cmp3(), CMP_LT_BIT);
        assert!(flags.is_running());
    }

    #[test]
    fn error_code_survives_status_bit_flips() {
        let mut flags = Flags::default();
        flags.set_error(ErrorCode::Segfault);
        flags.set_zero(true);
        flags.set_in_interrupt(true);
        assert_eq!(flags.error(), ErrorCode::Segfault);
        assert!(flags.is_zero());
        assert!(flags.in_interrupt());
    }

    #[test]
    fn clearing_error_does_not_disturb_running_flag() {
        let mut flags = Flags::default();
        flags.set_running(true);
        flags.set_error(ErrorCode::Opcode);
        flags.clear_error();
        assert_eq!(flags.error(), ErrorCode::Ok);
        assert!(flags.is_running());
    }
}
