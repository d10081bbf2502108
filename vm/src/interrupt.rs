use toylang_asm::Word;

/// Whether a pending, unmasked interrupt line should fire this cycle.
///
/// The VM does not allow interrupt stacking: a program already inside a
/// handler (`in_interrupt` set) keeps running even if another masked-in
/// line raises, until it executes `rti`.
pub fn is_pending(isr: Word, imr: Word, in_interrupt: bool) -> bool {
    !in_interrupt && (isr & imr) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_when_unmasked_and_not_already_handling_one() {
        assert!(is_pending(0b1, 0b1, false));
        assert!(!is_pending(0b1, 0b0, false));
        assert!(!is_pending(0b1, 0b1, true));
    }
}
