use toylang_asm::{ErrorCode, RegisterId};

use crate::core::Core;
use crate::memory::SegFault;

/// Errors that abort the interpreter outright, as opposed to the in-band
/// errors (`$flag`'s error bits) a running program can observe and recover
/// from. These only arise outside the fetch/execute loop: malformed
/// images, or I/O failures while servicing a syscall.
#[derive(Debug, derive_more::Display)]
pub enum VmError {
    #[display(fmt = "malformed program image: {_0}")]
    Image(ImageError),
    #[display(fmt = "{_0}")]
    Memory(SegFault),
    #[display(fmt = "io error while servicing syscall: {_0}")]
    Io(std::io::Error),
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(e) => Some(e),
            Self::Memory(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<ImageError> for VmError {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<SegFault> for VmError {
    fn from(e: SegFault) -> Self {
        Self::Memory(e)
    }
}

impl From<std::io::Error> for VmError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Render the in-band error currently latched in `$flag`, the way a
/// standalone interpreter would report it to a user before exiting.
/// Returns `None` if no error is latched (`$flag`'s error bits are
/// `ErrorCode::Ok`).
pub fn report(core: &Core, prefix: bool) -> Option<String> {
    let code = core.flags().error();
    if code == ErrorCode::Ok {
        return None;
    }
    let ret = core.reg_silent(RegisterId::RET);
    let pc = core.reg_silent(RegisterId::PC);
    let mut out = String::new();
    if prefix {
        out.push_str("error: ");
    }
    match code {
        ErrorCode::Opcode => out.push_str(&format!("E-OPCODE: invalid opcode {ret:#x} (at $pc={pc:#x})")),
        ErrorCode::Segfault => out.push_str(&format!("E-SEGFAULT: segfault on access of {ret:#x}")),
        ErrorCode::Reg => out.push_str(&format!("E-REG: invalid register index {ret:#x}")),
        ErrorCode::Syscall => out.push_str(&format!("E-SYSCALL: syscall with unknown command {ret:#x}")),
        ErrorCode::Datatype => {
            out.push_str(&format!("E-DATATYPE: invalid datatype specifier {ret:#x} (at $pc={pc:#x})"))
        }
        ErrorCode::Ok => unreachable!("checked above"),
        ErrorCode::Unknown => out.push_str(&format!("E-UNKNOWN: unknown error, $ret={ret:#x}")),
    }
    Some(out)
}

#[cfg(test)]
mod report_tests {
    use super::*;
    use crate::debug::DebugFlags;

    #[test]
    fn no_error_reports_nothing() {
        let core = Core::new(DebugFlags::empty());
        assert_eq!(report(&core, false), None);
    }

    #[test]
    fn segfault_reports_the_faulting_address() {
        let mut core = Core::new(DebugFlags::empty());
        core.raise_error(ErrorCode::Segfault, 0x100000);
        let msg = report(&core, false).unwrap();
        assert!(msg.contains("E-SEGFAULT"));
        assert!(msg.contains("0x100000"));
    }
}

/// Why a byte stream couldn't be loaded as a program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ImageError {
    #[display(fmt = "image is {_0} bytes, shorter than the {_1}-byte header")]
    TooShort(usize, usize),
    #[display(fmt = "image body ({_0} bytes) does not fit in DRAM ({_1} bytes)")]
    TooLarge(usize, u64),
}

impl std::error::Error for ImageError {}
