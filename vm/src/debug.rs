use std::collections::VecDeque;

use toylang_asm::{RegisterId, Word};

bitflags::bitflags! {
    /// Which categories of [`DebugEvent`] the VM should record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u8 {
        const CPU          = 1 << 0;
        const ARGS         = 1 << 1;
        const MEM          = 1 << 2;
        const REG          = 1 << 3;
        const ZFLAG        = 1 << 4;
        const CONDITIONALS = 1 << 5;
        const ERRS         = 1 << 6;
    }
}

/// One observed VM event, emitted to both `tracing` and an in-memory sink
/// any attached debugger can poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Cycle { step: u64, pc: u32, raw: Word },
    RegisterRead { reg: RegisterId, value: Word },
    RegisterWrite { reg: RegisterId, value: Word },
    MemoryRead { addr: u32, size: u8, value: Word },
    MemoryWrite { addr: u32, size: u8, value: Word },
    Interrupt { isr: Word, imr: Word, ipc: Word },
    Error { code: toylang_asm::ErrorCode, detail: Word },
}

/// Bounded queue of recorded [`DebugEvent`]s, drained by a polling debugger.
///
/// Capacity is fixed so a long-running program under `--debug` can't grow
/// the sink without bound; the oldest events are dropped first.
pub struct DebugSink {
    flags: DebugFlags,
    events: VecDeque<DebugEvent>,
    capacity: usize,
}

impl DebugSink {
    pub fn new(flags: DebugFlags) -> Self {
        Self {
            flags,
            events: VecDeque::new(),
            capacity: 4096,
        }
    }

    pub fn flags(&self) -> DebugFlags {
        self.flags
    }

    pub fn record(&mut self, category: DebugFlags, event: DebugEvent) {
        if !self.flags.contains(category) {
            return;
        }
        tracing::trace!(?event, "vm debug event");
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn poll(&mut self) -> Option<DebugEvent> {
        self.events.pop_front()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = DebugEvent> + '_ {
        self.events.drain(..)
    }
}

impl Default for DebugSink {
    fn default() -> Self {
        Self::new(DebugFlags::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_outside_the_enabled_category_are_dropped() {
        let mut sink = DebugSink::new(DebugFlags::CPU);
        sink.record(
            DebugFlags::MEM,
            DebugEvent::MemoryRead { addr: 0, size: 8, value: 0 },
        );
        assert!(sink.poll().is_none());
    }

    #[test]
    fn enabled_categories_are_recorded_in_order() {
        let mut sink = DebugSink::new(DebugFlags::CPU);
        sink.record(DebugFlags::CPU, DebugEvent::Cycle { step: 0, pc: 0, raw: 1 });
        sink.record(DebugFlags::CPU, DebugEvent::Cycle { step: 1, pc: 8, raw: 2 });
        assert_eq!(
            sink.poll(),
            Some(DebugEvent::Cycle { step: 0, pc: 0, raw: 1 })
        );
        assert_eq!(
            sink.poll(),
            Some(DebugEvent::Cycle { step: 1, pc: 8, raw: 2 })
        );
    }
}
