//! Binary emitter: lowers an [`IrModule`]'s mnemonic-keyed lines down to
//! concrete [`toylang_asm::Instruction`] words and serializes them behind
//! the image header `vm::image::Image` expects (two little-endian `u64`
//! addresses, then the raw code).
//!
//! Two passes: the first walks every block in vector order assigning each
//! a byte address (so forward branches can resolve before they're
//! encoded), the second actually encodes each line, resolving any
//! [`IrArg::Label`] against those addresses. A label's *meaning* depends
//! on which mnemonic references it: `jal`'s target is a literal jump
//! address (`Arg::Imm`), while every other mnemonic addressing a label
//! (a `load`/`store` against a global or function's own block) means
//! "the memory cell at that address" (`Arg::Mem`/`AddrArg::Mem`).

use std::collections::HashMap;

use toylang_asm::{AddrArg, Arg, Instruction, Predicate, RegisterId, INSTRUCTION_LEN};

use crate::ir::{Directive, GenericInstruction, IrArg, IrModule, Label, LineKind, Mnemonic};

/// Number of wire instructions one IR line lowers to, needed to size each
/// block's address before the line's own content is resolved.
fn line_instruction_count(kind: &LineKind) -> usize {
    match kind {
        LineKind::Generic(_) => 1,
        LineKind::LoadImmediate { .. } => 2,
        LineKind::Conversion { .. } => 1,
        LineKind::Directive(_) => 0,
    }
}

fn directive_len(d: &Directive) -> usize {
    match d {
        Directive::Bytes(b) => b.len(),
        Directive::String(s) => s.len() + 1,
        Directive::Data(v) => v.len() * 4,
        Directive::Word(v) => v.len() * 8,
        Directive::Space(n) => *n as usize,
        Directive::Offset(_) => 0,
    }
}

pub struct Emitter<'a> {
    module: &'a IrModule,
    block_addrs: HashMap<Label, u32>,
}

impl<'a> Emitter<'a> {
    pub fn new(module: &'a IrModule) -> Self {
        Self { module, block_addrs: HashMap::new() }
    }

    /// Lay out every block's starting address, in the vector order
    /// `IrModule` already stores them in.
    fn layout(&mut self) {
        let mut addr: u32 = 0;
        for block in self.module.blocks() {
            self.block_addrs.insert(block.label.clone(), addr);
            for line in &block.lines {
                addr += match &line.kind {
                    LineKind::Directive(d) => directive_len(d) as u32,
                    other => (line_instruction_count(other) * INSTRUCTION_LEN) as u32,
                };
            }
        }
    }

    fn label_addr(&self, label: &Label) -> u32 {
        *self.block_addrs.get(label).unwrap_or_else(|| panic!("unresolved label {label}"))
    }

    /// Resolve an [`IrArg`] used as a value operand. A label means "jump
    /// to this address" only for `jal`; everywhere else it means "the
    /// value stored at this address".
    fn resolve_value_arg(&self, mnemonic: Mnemonic, arg: &IrArg) -> Arg {
        match arg {
            IrArg::Imm(v) => Arg::Imm(*v as u32),
            IrArg::Reg(r) => Arg::Reg(*r),
            IrArg::RegIndirect { reg, offset } => {
                Arg::RegIndirect(toylang_asm::RegIndirect { reg: *reg, offset: *offset })
            }
            IrArg::Label(label) => {
                let addr = self.label_addr(label);
                if mnemonic == Mnemonic::Jal {
                    Arg::Imm(addr)
                } else {
                    Arg::Mem(addr)
                }
            }
        }
    }

    /// Resolve an [`IrArg`] used as `store`'s destination, which can only
    /// ever name a memory location.
    fn resolve_addr_arg(&self, arg: &IrArg) -> AddrArg {
        match arg {
            IrArg::Label(label) => AddrArg::Mem(self.label_addr(label)),
            IrArg::RegIndirect { reg, offset } => {
                AddrArg::RegIndirect(toylang_asm::RegIndirect { reg: *reg, offset: *offset })
            }
            IrArg::Imm(v) => AddrArg::Mem(*v as u32),
            IrArg::Reg(_) => panic!("a register cannot be a store destination on its own"),
        }
    }

    fn lower_generic(&self, g: &GenericInstruction) -> Vec<Instruction> {
        let predicate = g.predicate;
        let dt = g.datatype;
        match g.mnemonic {
            Mnemonic::Nop => vec![Instruction::Nop { predicate }],
            Mnemonic::Rti => vec![Instruction::Rti { predicate }],
            Mnemonic::Load => {
                let dest = expect_reg(&g.args[0]);
                let src = self.resolve_value_arg(g.mnemonic, &g.args[1]);
                vec![Instruction::Load { predicate, dest, src }]
            }
            Mnemonic::LoadUpper => {
                let dest = expect_reg(&g.args[0]);
                let imm = match &g.args[1] {
                    IrArg::Imm(v) => *v as u32,
                    other => panic!("load_upper immediate must be an Imm, got {other:?}"),
                };
                vec![Instruction::LoadUpper { predicate, dest, imm }]
            }
            Mnemonic::Store => {
                let dest = self.resolve_addr_arg(&g.args[0]);
                let src = expect_reg(&g.args[1]);
                vec![Instruction::Store { predicate, dest, src }]
            }
            Mnemonic::Compare => {
                let lhs = expect_reg(&g.args[0]);
                let rhs = self.resolve_value_arg(g.mnemonic, &g.args[1]);
                let datatype = dt.expect("compare carries a datatype");
                vec![Instruction::Compare { predicate, datatype, lhs, rhs }]
            }
            Mnemonic::Convert => {
                unreachable!("Convert is only ever emitted as LineKind::Conversion")
            }
            Mnemonic::Not | Mnemonic::And | Mnemonic::Or | Mnemonic::Xor | Mnemonic::Shl | Mnemonic::Shr
            | Mnemonic::Zext | Mnemonic::Sext | Mnemonic::Mod => {
                let dest = expect_reg(&g.args[0]);
                let src = self.resolve_value_arg(g.mnemonic, &g.args[1]);
                match g.mnemonic {
                    Mnemonic::Not => vec![Instruction::Not { predicate, dest, src }],
                    Mnemonic::And => vec![Instruction::And { predicate, dest, src }],
                    Mnemonic::Or => vec![Instruction::Or { predicate, dest, src }],
                    Mnemonic::Xor => vec![Instruction::Xor { predicate, dest, src }],
                    Mnemonic::Shl => vec![Instruction::Shl { predicate, dest, src }],
                    Mnemonic::Shr => vec![Instruction::Shr { predicate, dest, src }],
                    Mnemonic::Zext => vec![Instruction::Zext { predicate, dest, src }],
                    Mnemonic::Sext => vec![Instruction::Sext { predicate, dest, src }],
                    _ => vec![Instruction::Mod { predicate, dest, src }],
                }
            }
            Mnemonic::Add | Mnemonic::Sub | Mnemonic::Mul | Mnemonic::Div => {
                let dest = expect_reg(&g.args[0]);
                let src = self.resolve_value_arg(g.mnemonic, &g.args[1]);
                let datatype = dt.expect("arithmetic op carries a datatype");
                match g.mnemonic {
                    Mnemonic::Add => vec![Instruction::Add { predicate, datatype, dest, src }],
                    Mnemonic::Sub => vec![Instruction::Sub { predicate, datatype, dest, src }],
                    Mnemonic::Mul => vec![Instruction::Mul { predicate, datatype, dest, src }],
                    _ => vec![Instruction::Div { predicate, datatype, dest, src }],
                }
            }
            Mnemonic::Jal => {
                let reg_link = expect_reg(&g.args[0]);
                let target = self.resolve_value_arg(Mnemonic::Jal, &g.args[1]);
                vec![Instruction::Jal { predicate, reg_link, target }]
            }
            Mnemonic::Syscall => {
                let code = self.resolve_value_arg(g.mnemonic, &g.args[0]);
                vec![Instruction::Syscall { predicate, code }]
            }
        }
    }

    fn lower_line(&self, kind: &LineKind) -> Vec<u8> {
        match kind {
            LineKind::Generic(g) => self.lower_generic(g).into_iter().flat_map(|i| i.encode().to_le_bytes()).collect(),
            LineKind::LoadImmediate { predicate, dest, value } => {
                let low = Instruction::Load { predicate: *predicate, dest: *dest, src: Arg::Imm(*value as u32) };
                let high = Instruction::LoadUpper { predicate: *predicate, dest: *dest, imm: (*value >> 32) as u32 };
                let mut bytes = low.encode().to_le_bytes().to_vec();
                bytes.extend(high.encode().to_le_bytes());
                bytes
            }
            LineKind::Conversion { predicate, from, to } => {
                let (from_dt, src_reg) = *from;
                let (to_dt, dest_reg) = *to;
                let insn = Instruction::Convert {
                    predicate: *predicate,
                    from: from_dt,
                    to: to_dt,
                    dest: dest_reg,
                    src: Arg::Reg(src_reg),
                };
                insn.encode().to_le_bytes().to_vec()
            }
            LineKind::Directive(d) => match d {
                Directive::Bytes(b) => b.clone(),
                Directive::String(s) => {
                    let mut bytes = s.as_bytes().to_vec();
                    bytes.push(0);
                    bytes
                }
                Directive::Data(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
                Directive::Word(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
                Directive::Space(n) => vec![0u8; *n as usize],
                Directive::Offset(_) => Vec::new(),
            },
        }
    }

    /// Encode the whole module to its final code bytes (no header).
    pub fn encode(mut self) -> Vec<u8> {
        self.layout();
        let mut code = Vec::new();
        for block in self.module.blocks() {
            for line in &block.lines {
                code.extend(self.lower_line(&line.kind));
            }
        }
        code
    }

    /// Entry point's resolved byte address, or `0` if none was set.
    pub fn entry_addr(&self) -> u32 {
        self.module.entry_point.as_ref().map(|l| self.label_addr(l)).unwrap_or(0)
    }

    /// Interrupt handler's resolved byte address, or `0` (meaning "let the
    /// VM fall back to its own default") if none was generated.
    pub fn interrupt_handler_addr(&self) -> u32 {
        self.module.interrupt_handler.as_ref().map(|l| self.label_addr(l)).unwrap_or(0)
    }
}

fn expect_reg(arg: &IrArg) -> RegisterId {
    match arg {
        IrArg::Reg(r) => *r,
        other => panic!("expected a register operand, got {other:?}"),
    }
}

/// Serialize a whole module to the on-disk image format: 16-byte header
/// (entry address, interrupt handler address, both little-endian `u64`)
/// followed by the encoded code.
pub fn emit_image(module: &IrModule) -> Vec<u8> {
    let mut emitter = Emitter::new(module);
    emitter.layout();
    let entry = emitter.entry_addr();
    let interrupt_handler = emitter.interrupt_handler_addr();
    let code = emitter.encode_after_layout();

    let mut bytes = Vec::with_capacity(16 + code.len());
    bytes.extend((entry as u64).to_le_bytes());
    bytes.extend((interrupt_handler as u64).to_le_bytes());
    bytes.extend(code);
    bytes
}

impl<'a> Emitter<'a> {
    /// Encode without re-running layout, for callers (like
    /// [`emit_image`]) that already called it to read the entry/handler
    /// addresses first.
    fn encode_after_layout(&self) -> Vec<u8> {
        let mut code = Vec::new();
        for block in self.module.blocks() {
            for line in &block.lines {
                code.extend(self.lower_line(&line.kind));
            }
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Mnemonic;
    use toylang_asm::Datatype;

    #[test]
    fn a_trivial_module_emits_a_16_byte_header_plus_its_code() {
        let mut ir = IrModule::new();
        ir.entry_point = Some(ir.current_label());
        ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Syscall,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Imm(toylang_asm::Syscall::Exit.to_u64())],
        }));
        let bytes = emit_image(&ir);
        assert_eq!(bytes.len(), 16 + INSTRUCTION_LEN);
        let entry = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        assert_eq!(entry, 0);
    }

    #[test]
    fn a_jal_to_a_later_block_resolves_to_that_blocks_address() {
        let mut ir = IrModule::new();
        ir.entry_point = Some(ir.current_label());
        let target = Label("fn_target".to_owned());
        ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Jal,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::RPC), IrArg::Label(target.clone())],
        }));
        ir.new_named_block(target);
        ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Rti,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![],
        }));
        let bytes = emit_image(&ir);
        let jal_word = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let decoded = Instruction::decode(jal_word).unwrap();
        match decoded {
            Instruction::Jal { target: Arg::Imm(addr), .. } => assert_eq!(addr, INSTRUCTION_LEN as u32),
            other => panic!("expected an immediate jal target, got {other:?}"),
        }
    }

    #[test]
    fn a_load_immediate_lowers_to_a_load_then_load_upper_pair() {
        let mut ir = IrModule::new();
        ir.emit(LineKind::LoadImmediate { predicate: Predicate::Na, dest: RegisterId::general(1), value: 0x1_0000_0005 });
        let bytes = Emitter::new(&ir).encode();
        assert_eq!(bytes.len(), INSTRUCTION_LEN * 2);
        let low = Instruction::decode(u64::from_le_bytes(bytes[0..8].try_into().unwrap())).unwrap();
        let high = Instruction::decode(u64::from_le_bytes(bytes[8..16].try_into().unwrap())).unwrap();
        assert!(matches!(low, Instruction::Load { src: Arg::Imm(5), .. }));
        assert!(matches!(high, Instruction::LoadUpper { imm: 1, .. }));
    }

    #[test]
    fn a_conversion_line_lowers_to_a_single_convert_instruction() {
        let mut ir = IrModule::new();
        ir.emit(LineKind::Conversion {
            predicate: Predicate::Na,
            from: (Datatype::S32, RegisterId::general(2)),
            to: (Datatype::Dbl, RegisterId::general(2)),
        });
        let bytes = Emitter::new(&ir).encode();
        assert_eq!(bytes.len(), INSTRUCTION_LEN);
        let insn = Instruction::decode(u64::from_le_bytes(bytes.try_into().unwrap())).unwrap();
        assert!(matches!(insn, Instruction::Convert { from: Datatype::S32, to: Datatype::Dbl, .. }));
    }
}
