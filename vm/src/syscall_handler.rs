use std::io::{BufRead, Write};

use toylang_asm::{ErrorCode, RegisterId, Syscall};

use crate::core::Core;

/// Maximum bytes `read_string` will write before truncating, to keep a
/// misbehaving program from reading past a forgotten length register.
const READ_STRING_MAX: u64 = 4096;

/// Outcome of servicing a syscall: either it ran to completion, it asked
/// the VM to halt (`exit`), or it hit a genuine I/O failure that should
/// abort the interpreter rather than stay in-band.
pub enum Outcome {
    Continue,
    Exit,
}

/// Dispatches a decoded [`Syscall`].
///
/// By convention the VM's two scratch registers carry syscall arguments:
/// `$k1` is the primary argument (value to print, or a buffer address),
/// `$k2` a secondary argument (destination address or byte count), and
/// `$ret` is used both for a third argument and to receive results —
/// the same register the fetch/execute loop already uses to report
/// in-band error detail.
pub fn handle(
    core: &mut Core,
    syscall: Syscall,
    reader: &mut impl BufRead,
    writer: &mut impl Write,
) -> std::io::Result<Outcome> {
    match syscall {
        Syscall::PrintHex => {
            write!(writer, "{:#x}", core.reg_silent(RegisterId::K1))?;
        }
        Syscall::PrintInt => {
            write!(writer, "{}", core.reg_silent(RegisterId::K1) as i64)?;
        }
        Syscall::PrintFloat => {
            let bits = core.reg_silent(RegisterId::K1) as u32;
            write!(writer, "{}", f32::from_bits(bits))?;
        }
        Syscall::PrintDouble => {
            let bits = core.reg_silent(RegisterId::K1);
            write!(writer, "{}", f64::from_bits(bits))?;
        }
        Syscall::PrintChar => {
            let byte = core.reg_silent(RegisterId::K1) as u8;
            write!(writer, "{}", byte as char)?;
        }
        Syscall::PrintString => {
            let addr = core.reg_silent(RegisterId::K1) as u32;
            print_c_string(core, addr, writer)?;
        }
        Syscall::ReadInt => {
            let line = read_line(reader)?;
            let value = line.trim().parse::<i64>().unwrap_or(0);
            core.reg_set(RegisterId::K1, value as u64);
        }
        Syscall::ReadFloat => {
            let line = read_line(reader)?;
            let value = line.trim().parse::<f32>().unwrap_or(0.0);
            core.reg_set(RegisterId::K1, value.to_bits() as u64);
        }
        Syscall::ReadDouble => {
            let line = read_line(reader)?;
            let value = line.trim().parse::<f64>().unwrap_or(0.0);
            core.reg_set(RegisterId::K1, value.to_bits());
        }
        Syscall::ReadChar => {
            let mut buf = [0u8; 1];
            let n = reader.read(&mut buf)?;
            core.reg_set(RegisterId::K1, if n == 0 { 0 } else { buf[0] as u64 });
        }
        Syscall::ReadString => {
            let addr = core.reg_silent(RegisterId::K1) as u32;
            let max_len = core.reg_silent(RegisterId::K2).min(READ_STRING_MAX) as u32;
            let line = read_line(reader)?;
            let bytes = line.as_bytes();
            let n = bytes.len().min(max_len.saturating_sub(1) as usize);
            if core.mem_write_image(addr, &bytes[..n]).is_err() {
                core.raise_error(ErrorCode::Segfault, addr as u64);
                return Ok(Outcome::Continue);
            }
            let _ = core.mem_store(addr + n as u32, 1, 0);
        }
        Syscall::Exit => return Ok(Outcome::Exit),
        Syscall::CopyMem => {
            let src = core.reg_silent(RegisterId::K1) as u32;
            let dest = core.reg_silent(RegisterId::K2) as u32;
            let len = core.reg_silent(RegisterId::RET) as u32;
            if core.mem_copy(src, dest, len).is_err() {
                core.raise_error(ErrorCode::Segfault, src as u64);
            }
        }
        Syscall::PrintRegs => print_registers(core, writer)?,
        Syscall::PrintMem => {
            let addr = core.reg_silent(RegisterId::K1) as u32;
            let len = core.reg_silent(RegisterId::K2) as u32;
            print_memory(core, addr, len, writer)?;
        }
        Syscall::PrintStack => print_stack(core, writer)?,
    }
    Ok(Outcome::Continue)
}

fn read_line(reader: &mut impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line)
}

fn print_c_string(core: &mut Core, addr: u32, writer: &mut impl Write) -> std::io::Result<()> {
    let mut offset = 0u32;
    loop {
        let Ok(byte) = core.mem_load(addr + offset, 1) else {
            core.raise_error(ErrorCode::Segfault, (addr + offset) as u64);
            return Ok(());
        };
        if byte == 0 {
            break;
        }
        write!(writer, "{}", byte as u8 as char)?;
        offset += 1;
    }
    Ok(())
}

fn print_registers(core: &mut Core, writer: &mut impl Write) -> std::io::Result<()> {
    for (index, name) in NAMED_REGISTERS.iter().enumerate() {
        let reg = RegisterId::new_unchecked(index as u8);
        writeln!(writer, "{name:<6} = {:#018x}", core.reg_silent(reg))?;
    }
    for n in 1..=21u8 {
        let reg = RegisterId::general(n);
        writeln!(writer, "$r{n:<4} = {:#018x}", core.reg_silent(reg))?;
    }
    Ok(())
}

const NAMED_REGISTERS: [&str; 11] = [
    "$pc", "$rpc", "$sp", "$fp", "$flag", "$isr", "$imr", "$ipc", "$ret", "$k1", "$k2",
];

fn print_memory(core: &Core, addr: u32, len: u32, writer: &mut impl Write) -> std::io::Result<()> {
    match core.mem_slice(addr, len) {
        Ok(bytes) => {
            write!(writer, "mem[{addr:#x}..{:#x}] = {{ ", addr + len)?;
            for byte in bytes {
                write!(writer, "{byte:02x} ")?;
            }
            writeln!(writer, "}}")
        }
        Err(_) => writeln!(writer, "mem[{addr:#x}..] out of bounds"),
    }
}

fn print_stack(core: &mut Core, writer: &mut impl Write) -> std::io::Result<()> {
    let sp = core.reg(RegisterId::SP) as u32;
    let len = (crate::consts::DRAM_SIZE as u32).saturating_sub(sp);
    print_memory(core, sp, len, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::DebugFlags;

    #[test]
    fn print_int_formats_register_as_signed_decimal() {
        let mut core = Core::new(DebugFlags::empty());
        core.reg_set(RegisterId::K1, (-5i64) as u64);
        let mut reader = std::io::BufReader::new(std::io::empty());
        let mut buf = Vec::new();
        handle(&mut core, Syscall::PrintInt, &mut reader, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "-5");
    }

    #[test]
    fn exit_signals_the_caller_to_stop() {
        let mut core = Core::new(DebugFlags::empty());
        let mut reader = std::io::BufReader::new(std::io::empty());
        let mut buf = Vec::new();
        let outcome = handle(&mut core, Syscall::Exit, &mut reader, &mut buf).unwrap();
        assert!(matches!(outcome, Outcome::Exit));
    }

    #[test]
    fn read_int_parses_a_line_from_the_reader() {
        let mut core = Core::new(DebugFlags::empty());
        let input = b"42\n".as_slice();
        let mut reader = std::io::BufReader::new(input);
        let mut buf = Vec::new();
        handle(&mut core, Syscall::ReadInt, &mut reader, &mut buf).unwrap();
        assert_eq!(core.reg_silent(RegisterId::K1), 42);
    }
}
