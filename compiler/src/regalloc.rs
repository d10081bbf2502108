//! Register allocator: a pool of general-purpose registers with an
//! most-recently-used record, plus the stack-frame spill area for the
//! function currently being generated.
//!
//! One allocator lives per function being generated; it's thrown away
//! once that function's epilogue is emitted.

use std::collections::HashMap;

use toylang_asm::{Predicate, RegisterId};

use crate::ir::{GenericInstruction, IrArg, IrModule, LineKind, Mnemonic};
use crate::symbol::{StorageLocation, SymbolId, SymbolTable};

/// What currently lives in a register, so an eviction knows how to spill
/// it and a later lookup can find it again without a fresh load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupant {
    Symbol(SymbolId),
    Literal(u64),
}

/// Where a value lives right now: a live register, or a spilled slot in
/// the current frame (an offset from `$fp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ref {
    Register(RegisterId),
    Stack(i64),
}

pub struct RegisterAllocator {
    pool: Vec<RegisterId>,
    occupants: HashMap<RegisterId, Occupant>,
    /// Front = most recently used, back = least recently used (the next
    /// eviction victim).
    lru: Vec<RegisterId>,
    frame_size: i64,
    spill_slots: HashMap<Occupant, i64>,
    recent: Option<RegisterId>,
}

impl RegisterAllocator {
    /// `r1..=21`; `k1`/`k2` are reserved scratch and never handed out by
    /// this pool.
    pub fn new() -> Self {
        let pool: Vec<RegisterId> = (1..=21).map(RegisterId::general).collect();
        Self {
            pool,
            occupants: HashMap::new(),
            lru: Vec::new(),
            frame_size: 0,
            spill_slots: HashMap::new(),
            recent: None,
        }
    }

    pub fn frame_size(&self) -> i64 {
        self.frame_size
    }

    fn touch(&mut self, reg: RegisterId) {
        self.lru.retain(|r| *r != reg);
        self.lru.insert(0, reg);
        self.recent = Some(reg);
    }

    fn free_register(&mut self) -> Option<RegisterId> {
        self.pool.iter().copied().find(|r| !self.occupants.contains_key(r))
    }

    /// Reserve a stack slot for `occupant` if it doesn't already have one,
    /// growing the frame downward from `$fp` by 8 bytes.
    fn spill_slot(&mut self, occupant: Occupant) -> i64 {
        *self.spill_slots.entry(occupant).or_insert_with(|| {
            self.frame_size -= 8;
            self.frame_size
        })
    }

    /// Reserve a frame slot for a symbol that isn't live in a register yet
    /// (a `let`/`const` local, or a parameter at function entry), without
    /// touching the register pool. Idempotent: calling it twice for the
    /// same symbol returns the same offset.
    pub fn declare_local(&mut self, symbol: SymbolId) -> i64 {
        self.spill_slot(Occupant::Symbol(symbol))
    }

    /// Free a register for reuse, spilling its current occupant to the
    /// frame first via a `store` instruction.
    fn evict(&mut self, ir: &mut IrModule, reg: RegisterId) {
        if let Some(occupant) = self.occupants.remove(&reg) {
            let offset = self.spill_slot(occupant);
            ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Store,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![IrArg::RegIndirect { reg: RegisterId::FP, offset: offset as i16 }, IrArg::Reg(reg)],
            }));
        }
        self.lru.retain(|r| *r != reg);
    }

    /// Allocate a register for `occupant`, evicting the least-recently-used
    /// occupied register if the pool is exhausted.
    fn allocate(&mut self, ir: &mut IrModule, occupant: Occupant) -> RegisterId {
        let reg = match self.free_register() {
            Some(reg) => reg,
            None => {
                let victim = *self.lru.last().expect("pool exhausted with no LRU record");
                self.evict(ir, victim);
                victim
            }
        };
        self.occupants.insert(reg, occupant);
        self.touch(reg);
        reg
    }

    /// Allocate a register for a value the caller is about to materialize
    /// into it directly (e.g. copying a call's return value out of `$ret`
    /// before the next call clobbers it), without emitting a load — the
    /// caller emits whatever instruction produces the value.
    pub fn allocate_for(&mut self, ir: &mut IrModule, occupant_id: SymbolId) -> RegisterId {
        self.allocate(ir, Occupant::Symbol(occupant_id))
    }

    fn register_holding(&self, occupant: Occupant) -> Option<RegisterId> {
        self.occupants.iter().find(|(_, o)| **o == occupant).map(|(r, _)| *r)
    }

    /// Load a literal into a register, reusing an already-loaded copy if
    /// one is live.
    pub fn find_literal(&mut self, ir: &mut IrModule, value: u64, predicate: Predicate) -> Ref {
        if let Some(reg) = self.register_holding(Occupant::Literal(value)) {
            self.touch(reg);
            return Ref::Register(reg);
        }
        let reg = self.allocate(ir, Occupant::Literal(value));
        ir.emit(LineKind::LoadImmediate { predicate, dest: reg, value });
        Ref::Register(reg)
    }

    /// Make sure `symbol`'s current value is live in a register, loading
    /// from its storage location if it isn't already resident.
    pub fn find_variable(
        &mut self,
        ir: &mut IrModule,
        table: &SymbolTable,
        symbol: SymbolId,
        predicate: Predicate,
    ) -> Ref {
        let occupant = Occupant::Symbol(symbol);
        if let Some(reg) = self.register_holding(occupant) {
            self.touch(reg);
            return Ref::Register(reg);
        }

        let reg = self.allocate(ir, occupant);
        match table.locate(symbol) {
            Some(StorageLocation::Stack { offset, .. }) => {
                ir.emit(LineKind::Generic(GenericInstruction {
                    mnemonic: Mnemonic::Load,
                    predicate,
                    datatype: None,
                    args: vec![
                        IrArg::Reg(reg),
                        IrArg::RegIndirect { reg: RegisterId::FP, offset: offset as i16 },
                    ],
                }));
            }
            Some(StorageLocation::Block { .. }) => {
                // Global/function storage is addressed by the defining
                // block's resolved label; the emitter folds this down to
                // a `mem` argument once block addresses are known.
                ir.emit(LineKind::Generic(GenericInstruction {
                    mnemonic: Mnemonic::Load,
                    predicate,
                    datatype: None,
                    args: vec![IrArg::Reg(reg), IrArg::Label(crate::ir::Label(format!("sym{}", symbol.raw())))],
                }));
            }
            None => {
                // Nothing assigned yet (e.g. an address taken before its
                // first store): leave the register zero-initialized.
            }
        }
        Ref::Register(reg)
    }

    /// If `r` already denotes a register, return it unchanged; if it
    /// denotes a spilled stack slot, load it into a fresh register.
    pub fn guarantee_register(&mut self, ir: &mut IrModule, r: Ref, predicate: Predicate) -> RegisterId {
        match r {
            Ref::Register(reg) => {
                self.touch(reg);
                reg
            }
            Ref::Stack(offset) => {
                let reg = match self.free_register() {
                    Some(reg) => reg,
                    None => {
                        let victim = *self.lru.last().expect("pool exhausted with no LRU record");
                        self.evict(ir, victim);
                        victim
                    }
                };
                ir.emit(LineKind::Generic(GenericInstruction {
                    mnemonic: Mnemonic::Load,
                    predicate,
                    datatype: None,
                    args: vec![IrArg::Reg(reg), IrArg::RegIndirect { reg: RegisterId::FP, offset: offset as i16 }],
                }));
                self.touch(reg);
                reg
            }
        }
    }

    /// The most recently allocated register, used to thread a
    /// just-evaluated expression's value to its consumer.
    pub fn get_recent(&self) -> Option<RegisterId> {
        self.recent
    }

    pub fn release(&mut self, reg: RegisterId) {
        self.occupants.remove(&reg);
        self.lru.retain(|r| *r != reg);
        if self.recent == Some(reg) {
            self.recent = None;
        }
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}
