//! Assembly IR: labeled basic blocks of pre-emission instructions, built by
//! the code generator and consumed by the binary emitter.
//!
//! Two pseudo-instructions stand between the generator and the wire
//! format: `LoadImmediate` (lowered to a `load`/`load_upper` pair so the
//! generator never has to split a 64-bit constant itself) and `Conversion`
//! (lowered to one `convert` per from/to datatype pair). Everything else
//! is a [`GenericInstruction`] keyed by [`Mnemonic`], deferring the exact
//! [`toylang_asm::Instruction`] variant mapping to the emitter so the
//! generator can stay mnemonic-driven instead of matching on wire variants.

use std::fmt;

use toylang_asm::{Datatype, Predicate, RegisterId};

/// A basic block label: either user-supplied (a function or user `goto`
/// target) or auto-generated (`block<N>`, process-wide monotonic).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
pub struct LabelGen(u32);

impl LabelGen {
    pub fn next(&mut self) -> Label {
        let label = Label(format!("block{}", self.0));
        self.0 += 1;
        label
    }
}

/// One of the fixed set of opcodes an instruction line can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Nop,
    Load,
    LoadUpper,
    Store,
    Compare,
    Convert,
    Not,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Zext,
    Sext,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Jal,
    Rti,
    Syscall,
}

/// An IR-level operand: like [`toylang_asm::Arg`] but additionally able to
/// name an unresolved [`Label`], since the emitter hasn't assigned block
/// addresses yet when the generator builds this line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrArg {
    Imm(u64),
    Reg(RegisterId),
    Label(Label),
    RegIndirect { reg: RegisterId, offset: i16 },
}

/// An instruction named by mnemonic rather than already split into its
/// final wire-format variant.
#[derive(Debug, Clone)]
pub struct GenericInstruction {
    pub mnemonic: Mnemonic,
    pub predicate: Predicate,
    pub datatype: Option<Datatype>,
    pub args: Vec<IrArg>,
}

#[derive(Debug, Clone)]
pub enum Directive {
    Bytes(Vec<u8>),
    String(String),
    Data(Vec<u32>),
    Word(Vec<u64>),
    Space(u32),
    /// Pad/seek to an absolute offset within the segment, for fixed-layout
    /// data such as the header-adjacent entry thunk.
    Offset(u32),
}

/// A line of IR within a [`BasicBlock`], with the source origin and any
/// free-form comment the generator chose to attach.
#[derive(Debug, Clone)]
pub struct Line {
    pub kind: LineKind,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LineKind {
    Generic(GenericInstruction),
    /// Splits into `load`/`load_upper` at emission, so a 64-bit constant
    /// never has to be hand-split by the generator.
    LoadImmediate { predicate: Predicate, dest: RegisterId, value: u64 },
    Conversion { predicate: Predicate, from: (Datatype, RegisterId), to: (Datatype, RegisterId) },
    Directive(Directive),
}

impl Line {
    pub fn new(kind: LineKind) -> Self {
        Self { kind, comment: None }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: Label,
    pub comment: Option<String>,
    pub lines: Vec<Line>,
}

impl BasicBlock {
    pub fn new(label: Label) -> Self {
        Self { label, comment: None, lines: Vec::new() }
    }

    pub fn push(&mut self, line: Line) {
        self.lines.push(line);
    }
}

/// The code generator's working set of blocks plus a "current block"
/// cursor, matching `select(block)`'s ability to resume writing into an
/// earlier block (e.g. patching a fallthrough after a forward branch
/// target is known).
pub struct IrModule {
    blocks: Vec<BasicBlock>,
    current: usize,
    labels: LabelGen,
    pub entry_point: Option<Label>,
    pub interrupt_handler: Option<Label>,
}

impl IrModule {
    pub fn new() -> Self {
        let mut labels = LabelGen::default();
        let entry = labels.next();
        Self { blocks: vec![BasicBlock::new(entry)], current: 0, labels, entry_point: None, interrupt_handler: None }
    }

    /// Append a new block with an auto-generated label, make it current,
    /// and return its label so callers can branch to it later.
    pub fn new_block(&mut self, comment: impl Into<Option<String>>) -> Label {
        let label = self.labels.next();
        let mut block = BasicBlock::new(label.clone());
        block.comment = comment.into();
        self.blocks.push(block);
        self.current = self.blocks.len() - 1;
        label
    }

    /// Append a new block with a caller-chosen label (e.g. a function's
    /// mangled name) rather than an auto-generated one.
    pub fn new_named_block(&mut self, label: Label) -> Label {
        self.blocks.push(BasicBlock::new(label.clone()));
        self.current = self.blocks.len() - 1;
        label
    }

    /// Switch the cursor to an already-created block.
    pub fn select(&mut self, label: &Label) {
        if let Some(i) = self.blocks.iter().position(|b| &b.label == label) {
            self.current = i;
        }
    }

    pub fn current_mut(&mut self) -> &mut BasicBlock {
        &mut self.blocks[self.current]
    }

    pub fn emit(&mut self, kind: LineKind) {
        self.current_mut().push(Line::new(kind));
    }

    /// The label of the block the cursor currently points at.
    pub fn current_label(&self) -> Label {
        self.blocks[self.current].label.clone()
    }

    /// How many lines the current block holds, for remembering where a
    /// not-yet-known immediate (e.g. a frame size) will need patching.
    pub fn current_len(&self) -> usize {
        self.blocks[self.current].lines.len()
    }

    /// Overwrite the final immediate argument of an already-emitted line,
    /// used to backpatch a function prologue's frame-size operand once the
    /// whole body has been generated and the allocator knows how big the
    /// frame actually is.
    pub fn patch_imm(&mut self, label: &Label, index: usize, value: u64) {
        let Some(block) = self.blocks.iter_mut().find(|b| &b.label == label) else { return };
        let Some(line) = block.lines.get_mut(index) else { return };
        match &mut line.kind {
            LineKind::Generic(g) => {
                if let Some(IrArg::Imm(v)) = g.args.last_mut() {
                    *v = value;
                }
            }
            LineKind::LoadImmediate { value: v, .. } => *v = value,
            _ => {}
        }
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }
}

impl Default for IrModule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_block_advances_the_cursor() {
        let mut m = IrModule::new();
        let entry = m.blocks()[0].label.clone();
        let b = m.new_block(None);
        assert_ne!(entry, b);
        m.emit(LineKind::Directive(Directive::Space(4)));
        assert_eq!(m.blocks().last().unwrap().lines.len(), 1);
    }

    #[test]
    fn select_moves_the_cursor_back_to_an_earlier_block() {
        let mut m = IrModule::new();
        let entry = m.blocks()[0].label.clone();
        m.new_block(None);
        m.select(&entry);
        m.emit(LineKind::Directive(Directive::Space(1)));
        assert_eq!(m.blocks()[0].lines.len(), 1);
    }

    #[test]
    fn auto_generated_labels_are_distinct() {
        let mut gen = LabelGen::default();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }
}
