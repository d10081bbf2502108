//! Semantic passes and code generation: `collate_registry` (pass 1) and
//! `Codegen::process_*` (pass 2), matching the two-pass model described
//! over `original_source/language/src/ast/program.cpp`'s `process()` —
//! collate the current scope's forward-declarable names into a fresh
//! registry, push it, then walk children top-down with type-checking and
//! code generation interleaved.
//!
//! The top-level program's own statement list is itself the entry code
//! (there is no `main`-lookup convention): `Codegen::compile` points
//! `IrModule::entry_point` at the block holding the program's top-level
//! statements and falls through to an implicit `syscall exit` once they
//! finish, since the source language has no exit primitive of its own.

use toylang_asm::{Datatype, Predicate, RegisterId, Syscall};

use crate::ast::{Binding, Expr, FunctionDecl, Literal, Program, Stmt, TypeExpr};
use crate::diagnostics::{Location, MessageList};
use crate::ir::{Directive, GenericInstruction, IrArg, IrModule, Label, LineKind, Mnemonic};
use crate::operators::{Arity, OperatorTable, UserDefinedOperator};
use crate::regalloc::{Ref, RegisterAllocator};
use crate::symbol::{Category, FunctionContext, Registry, Symbol, SymbolId, SymbolTable};
use crate::types::{resolve_overload, OverloadResolution, Type, TypeGraph, TypeId};

/// Pass 1: a shallow collation of one scope's statement list. Only
/// `Function` and `Namespace` statements introduce a name here —
/// variable declarations are deliberately skipped, since forward use of
/// a `let`/`const` binding is not allowed. A `Namespace`'s own body is
/// collated recursively into its `children` registry; a `Function`'s body
/// is *not* descended into here (its parameters and any local forward
/// declarations are collated later, when pass 2 actually enters the
/// function body).
pub fn collate_registry(
    items: &[Stmt],
    registry: &mut Registry,
    ids: &mut crate::symbol::SymbolIdGen,
    graph: &mut TypeGraph,
    operators: &mut OperatorTable,
    messages: &mut MessageList,
) -> bool {
    for item in items {
        match item {
            Stmt::Function(f) => {
                let Some(function_type) = function_signature_type(graph, f, messages) else {
                    return false;
                };
                let token = crate::lexer::Token {
                    kind: crate::lexer::TokenKind::Ident,
                    image: f.name.clone(),
                    location: f.location.clone(),
                    line_snapshot: String::new(),
                    numeric_value: 0,
                    newline_before: false,
                };
                let symbol = Symbol::Variable {
                    token,
                    ty: function_type,
                    category: Category::Function,
                    ref_count: 0,
                };
                let Some(id) = registry.insert(ids, symbol, Some(function_type), messages) else {
                    return false;
                };
                if let Some(op) = &f.operator {
                    if !operators.is_overloadable(op) {
                        messages.error(f.location.clone(), format!("operator {op} cannot be overloaded"));
                        return false;
                    }
                    if let Err(e) = operators.register_user(UserDefinedOperator {
                        name: op.clone(),
                        function_type,
                        symbol: id,
                    }) {
                        messages.error(f.location.clone(), e);
                        return false;
                    }
                }
            }
            Stmt::Namespace { name, body, location } => {
                let mut children = Registry::new(None);
                if !collate_registry(body, &mut children, ids, graph, operators, messages) {
                    return false;
                }
                let token = crate::lexer::Token {
                    kind: crate::lexer::TokenKind::Ident,
                    image: name.clone(),
                    location: location.clone(),
                    line_snapshot: String::new(),
                    numeric_value: 0,
                    newline_before: false,
                };
                let symbol = Symbol::Namespace { token, children };
                if registry.insert(ids, symbol, None, messages).is_none() {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn function_signature_type(graph: &mut TypeGraph, f: &FunctionDecl, messages: &mut MessageList) -> Option<TypeId> {
    let mut params = Vec::with_capacity(f.params.len());
    for p in &f.params {
        params.push(resolve_type(graph, &p.ty, messages)?);
    }
    let returns = match &f.return_type {
        Some(te) => resolve_type(graph, te, messages)?,
        None => graph.unit,
    };
    Some(graph.function_type(params, Some(returns)))
}

/// Resolve a parsed [`TypeExpr`] to a [`TypeId`]. Only built-in scalar
/// keywords are recognized — the source language has no user-defined
/// type declarations.
fn resolve_type(graph: &TypeGraph, texpr: &TypeExpr, messages: &mut MessageList) -> Option<TypeId> {
    let TypeExpr::Named { name, location } = texpr;
    Some(match name.as_str() {
        "u8" => graph.u8_,
        "i8" => graph.i8_,
        "u16" => graph.u16_,
        "i16" => graph.i16_,
        "u32" => graph.u32_,
        "i32" => graph.i32_,
        "u64" => graph.u64_,
        "i64" => graph.i64_,
        "f32" => graph.f32_,
        "f64" => graph.f64_,
        "bool" => graph.bool_,
        other => {
            messages.error(location.clone(), format!("unknown type '{other}'"));
            return None;
        }
    })
}

/// A human-readable spelling of a type, for diagnostics (`"missing return
/// statement in function returning type i32"`).
fn type_display(graph: &TypeGraph, ty: TypeId) -> String {
    match graph.get(ty) {
        Type::Int { signed: true, width } => format!("i{width}"),
        Type::Int { signed: false, width } => format!("u{width}"),
        Type::Float { width } => format!("f{width}"),
        Type::Bool => "bool".to_owned(),
        Type::Unit => "unit".to_owned(),
        other => other.label_suffix(graph),
    }
}

fn literal_type(graph: &TypeGraph, lit: &Literal) -> TypeId {
    match lit {
        Literal::Int(_) => graph.i32_,
        Literal::Float(_) => graph.f32_,
        Literal::Bool(_) => graph.bool_,
        Literal::Unit => graph.unit,
    }
}

fn comparison_predicate(op: &str) -> Option<Predicate> {
    Some(match op {
        "==" => Predicate::Eq,
        "!=" => Predicate::Ne,
        "<" => Predicate::Lt,
        "<=" => Predicate::Le,
        ">" => Predicate::Gt,
        ">=" => Predicate::Ge,
        _ => return None,
    })
}

/// Per-function generation state, pushed while a function body (or any
/// nested function defined inside it) is being processed.
struct FunctionFrame {
    alloc: RegisterAllocator,
    rpc_offset: i64,
    label: Label,
    frame_size_patch: (Label, usize),
}

/// The code generator: owns every cross-cutting table the front end needs
/// (type graph, operator table, symbol table, diagnostics) plus the
/// assembly IR module being built.
pub struct Codegen {
    pub graph: TypeGraph,
    pub operators: OperatorTable,
    pub table: SymbolTable,
    pub messages: MessageList,
    pub ir: IrModule,
    frames: Vec<FunctionFrame>,
    label_counter: u32,
}

impl Codegen {
    pub fn new() -> Self {
        Self {
            graph: TypeGraph::new(),
            operators: OperatorTable::new(),
            table: SymbolTable::new(),
            messages: MessageList::new(),
            ir: IrModule::new(),
            frames: Vec::new(),
            label_counter: 0,
        }
    }

    fn fresh_label(&mut self, tag: &str) -> Label {
        let n = self.label_counter;
        self.label_counter += 1;
        Label(format!("{tag}{n}"))
    }

    fn block_label(id: SymbolId) -> Label {
        Label(format!("sym{}", id.raw()))
    }

    /// Entry point: compile a whole program. The program's own top-level
    /// statements become the entry code; function/namespace bodies are
    /// generated into their own labeled blocks regardless of where they
    /// appear in source order.
    pub fn compile(&mut self, program: &Program) -> bool {
        let entry_label = self.ir.current_label();
        self.ir.entry_point = Some(entry_label.clone());

        let mut registry = Registry::new(None);
        if !collate_registry(
            &program.items,
            &mut registry,
            self.table.ids_mut(),
            &mut self.graph,
            &mut self.operators,
            &mut self.messages,
        ) {
            return false;
        }
        self.table.insert_registry(registry);

        // Top-level statements have nowhere else to borrow scratch registers
        // from, so they get a register allocator the same way a function
        // body does. Unlike a real call frame, nothing ever jumps into this
        // code from elsewhere, so there's no prologue/epilogue to match and
        // the frame is simply dropped once the program's statements are
        // done rather than unwound.
        self.frames.push(FunctionFrame {
            alloc: RegisterAllocator::new(),
            rpc_offset: 0,
            label: entry_label.clone(),
            frame_size_patch: (entry_label, 0),
        });

        for stmt in &program.items {
            if !self.process_stmt(stmt) {
                return false;
            }
        }

        self.frames.pop();

        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Syscall,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Imm(Syscall::Exit.to_u64())],
        }));
        true
    }

    /// Process one statement list as a freshly scoped block: collate its
    /// own forward declarations, push that registry, process children in
    /// order, then pop.
    fn process_block(&mut self, body: &[Stmt]) -> bool {
        let mut registry = Registry::new(None);
        if !collate_registry(
            body,
            &mut registry,
            self.table.ids_mut(),
            &mut self.graph,
            &mut self.operators,
            &mut self.messages,
        ) {
            return false;
        }
        self.table.insert_registry(registry);
        let mut ok = true;
        for stmt in body {
            if !self.process_stmt(stmt) {
                ok = false;
                break;
            }
        }
        self.table.pop();
        ok
    }

    fn process_stmt(&mut self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Error { .. } => false,
            Stmt::Block { body, .. } => self.process_block(body),
            Stmt::Expr(expr) => self.process_expr(expr, None).is_some(),
            Stmt::Declaration { bindings, .. } => {
                for binding in bindings {
                    if !self.process_declaration(binding) {
                        return false;
                    }
                }
                true
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.process_if(cond, then_branch, else_branch.as_deref())
            }
            Stmt::Return { value, location } => self.process_return(value.as_ref(), location),
            Stmt::Function(f) => self.process_function(f),
            Stmt::Namespace { name, body, location } => self.process_namespace(name, body, location),
        }
    }

    fn process_declaration(&mut self, binding: &Binding) -> bool {
        let declared = match &binding.ty {
            Some(te) => match resolve_type(&self.graph, te, &mut self.messages) {
                Some(t) => Some(t),
                None => return false,
            },
            None => None,
        };

        if declared.is_none() && binding.init.is_none() {
            self.messages.error(
                binding.location.clone(),
                format!("declaration of '{}' needs an explicit type or an initializer", binding.name),
            );
            return false;
        }

        let init = match &binding.init {
            Some(expr) => match self.process_expr(expr, declared) {
                Some(r) => Some(r),
                None => return false,
            },
            None => None,
        };

        let final_ty = match (declared, &init) {
            (Some(declared), Some((init_ty, _))) => {
                if !self.graph.is_subtype(*init_ty, declared) {
                    self.messages.error(
                        binding.location.clone(),
                        format!(
                            "cannot initialize '{}' of type {} from {}",
                            binding.name,
                            type_display(&self.graph, declared),
                            type_display(&self.graph, *init_ty)
                        ),
                    );
                    return false;
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some((init_ty, _))) => *init_ty,
            (None, None) => unreachable!("checked above"),
        };

        let category = Category::Ordinary;
        let token = crate::lexer::Token {
            kind: crate::lexer::TokenKind::Ident,
            image: binding.name.clone(),
            location: binding.location.clone(),
            line_snapshot: String::new(),
            numeric_value: 0,
            newline_before: false,
        };
        let symbol = Symbol::Variable { token, ty: final_ty, category, ref_count: 0 };
        let Some(id) = self.table.insert(symbol, None, &mut self.messages) else { return false };

        if self.table.current_function().is_none() {
            // Top-level (or namespace-level) declaration: give it block
            // storage under its own label. The block holds one reserved,
            // zero-initialized word rather than any code — `Directive::Space`
            // keeps it from aliasing whatever instruction happens to land at
            // the same offset — and the cursor moves right back to the
            // surrounding flow so later statements don't get appended into
            // what's meant to be the variable's storage cell.
            self.table.assign_symbol(id, crate::symbol::StorageLocation::Block { offset: 0 });
            let resume = self.ir.current_label();
            self.ir.new_named_block(Self::block_label(id));
            self.ir.emit(LineKind::Directive(Directive::Space(8)));
            self.ir.select(&resume);
            if let Some((_, init_ref)) = init {
                let frame = self.frames.last_mut().expect("compile() keeps a frame pushed at top level");
                let reg = frame.alloc.guarantee_register(&mut self.ir, init_ref, Predicate::Na);
                self.ir.emit(LineKind::Generic(GenericInstruction {
                    mnemonic: Mnemonic::Store,
                    predicate: Predicate::Na,
                    datatype: None,
                    args: vec![IrArg::Label(Self::block_label(id)), IrArg::Reg(reg)],
                }));
            }
            return true;
        }
        let Some(frame) = self.frames.last_mut() else { return false };
        let offset = frame.alloc.declare_local(id);
        self.table.assign_symbol(id, crate::symbol::StorageLocation::Stack { base_offset: 0, offset });
        if let Some((_, init_ref)) = init {
            let reg = frame.alloc.guarantee_register(&mut self.ir, init_ref, Predicate::Na);
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Store,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![IrArg::RegIndirect { reg: RegisterId::FP, offset: offset as i16 }, IrArg::Reg(reg)],
            }));
        }
        true
    }

    fn process_if(&mut self, cond: &Expr, then_branch: &[Stmt], else_branch: Option<&[Stmt]>) -> bool {
        let Some((cond_ty, cond_ref)) = self.process_expr(cond, Some(self.graph.bool_)) else { return false };
        if !self.graph.is_subtype(cond_ty, self.graph.bool_) {
            self.messages.error(cond.location().clone(), "if condition must be bool".to_owned());
            return false;
        }
        let Some(frame) = self.frames.last_mut() else {
            self.messages.error(cond.location().clone(), "if statement outside a function".to_owned());
            return false;
        };
        let cond_reg = frame.alloc.guarantee_register(&mut self.ir, cond_ref, Predicate::Na);
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Compare,
            predicate: Predicate::Na,
            datatype: Some(Datatype::U32),
            args: vec![IrArg::Reg(cond_reg), IrArg::Imm(0)],
        }));

        let else_label = self.fresh_label("else");
        let end_label = self.fresh_label("endif");
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Jal,
            predicate: Predicate::Eq,
            datatype: None,
            args: vec![
                IrArg::Reg(RegisterId::RPC),
                IrArg::Label(if else_branch.is_some() { else_label.clone() } else { end_label.clone() }),
            ],
        }));

        if !self.process_block(then_branch) {
            return false;
        }

        if let Some(else_branch) = else_branch {
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Jal,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![IrArg::Reg(RegisterId::RPC), IrArg::Label(end_label.clone())],
            }));
            self.ir.new_named_block(else_label);
            if !self.process_block(else_branch) {
                return false;
            }
        }
        self.ir.new_named_block(end_label);
        true
    }

    fn process_return(&mut self, value: Option<&Expr>, location: &Location) -> bool {
        let Some(ctx) = self.table.current_function().cloned() else {
            self.messages.error(location.clone(), "return outside a function".to_owned());
            return false;
        };
        let evaluated = match value {
            Some(expr) => self.process_expr(expr, Some(ctx.return_type)),
            None => None,
        };
        let (val_ty, val_ref) = match (value, evaluated) {
            (Some(_), Some((ty, r))) => (ty, Some(r)),
            (Some(_), None) => return false,
            (None, _) => (self.graph.unit, None),
        };
        if !self.graph.is_subtype(val_ty, ctx.return_type) {
            self.messages.error(
                location.clone(),
                format!(
                    "cannot return {} from function returning {}",
                    type_display(&self.graph, val_ty),
                    type_display(&self.graph, ctx.return_type)
                ),
            );
            return false;
        }
        self.emit_epilogue(val_ref)
    }

    /// Emit the register/stack teardown shared by an explicit `return`
    /// and an implicit fallthrough at the end of a unit-returning
    /// function's body.
    fn emit_epilogue(&mut self, value: Option<Ref>) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        if let Some(r) = value {
            let reg = frame.alloc.guarantee_register(&mut self.ir, r, Predicate::Na);
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Load,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![IrArg::Reg(RegisterId::RET), IrArg::Reg(reg)],
            }));
        }
        let rpc_offset = frame.rpc_offset;
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Load,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::K1), IrArg::RegIndirect { reg: RegisterId::FP, offset: rpc_offset as i16 }],
        }));
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Load,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::SP), IrArg::Reg(RegisterId::FP)],
        }));
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Load,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::FP), IrArg::RegIndirect { reg: RegisterId::FP, offset: 0 }],
        }));
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Add,
            predicate: Predicate::Na,
            datatype: Some(Datatype::U64),
            args: vec![IrArg::Reg(RegisterId::SP), IrArg::Imm(8)],
        }));
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Jal,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::RPC), IrArg::Reg(RegisterId::K1)],
        }));
        true
    }

    fn process_namespace(&mut self, name: &str, body: &[Stmt], location: &Location) -> bool {
        let Some(id) = self.table.find(name) else {
            self.messages.error(location.clone(), format!("namespace '{name}' was not collated"));
            return false;
        };
        let Some(Symbol::Namespace { children, .. }) = self.table.symbol(id) else {
            self.messages.error(location.clone(), format!("'{name}' is not a namespace"));
            return false;
        };
        let children = children.clone();
        self.table.insert_registry(children);
        self.table.push_path(name.to_owned());

        let mut ok = true;
        for stmt in body {
            if !self.process_stmt(stmt) {
                ok = false;
                break;
            }
        }

        self.table.pop_path();
        let updated = self.table.pop();
        if let Some(Symbol::Namespace { children, .. }) = self.table.symbol_mut(id) {
            *children = updated;
        }
        ok
    }

    fn process_function(&mut self, f: &FunctionDecl) -> bool {
        let Some(function_type) = function_signature_type(&mut self.graph, f, &mut self.messages) else {
            return false;
        };
        let candidates = self.table.find_function(&f.name);
        let Some(&(id, _)) = candidates.iter().find(|(_, ty)| *ty == function_type) else {
            self.messages.error(f.location.clone(), format!("function '{}' was not collated", f.name));
            return false;
        };

        let Some(body) = &f.body else {
            // Declaration only; nothing to generate.
            return true;
        };

        let Type::Function { params: param_types, returns } = self.graph.get(function_type).clone() else {
            unreachable!("function_signature_type always interns a Function type")
        };

        self.table.assign_symbol(id, crate::symbol::StorageLocation::Block { offset: 0 });

        let mut local = Registry::new(None);
        let mut param_ids = Vec::with_capacity(f.params.len());
        for (param, ty) in f.params.iter().zip(&param_types) {
            let token = crate::lexer::Token {
                kind: crate::lexer::TokenKind::Ident,
                image: param.name.clone(),
                location: param.location.clone(),
                line_snapshot: String::new(),
                numeric_value: 0,
                newline_before: false,
            };
            let symbol = Symbol::Variable { token, ty: *ty, category: Category::Argument, ref_count: 0 };
            let Some(pid) = local.insert(self.table.ids_mut(), symbol, None, &mut self.messages) else {
                return false;
            };
            param_ids.push(pid);
        }
        if !collate_registry(
            body,
            &mut local,
            self.table.ids_mut(),
            &mut self.graph,
            &mut self.operators,
            &mut self.messages,
        ) {
            return false;
        }
        self.table.insert_registry(local);
        self.table.enter_function(FunctionContext { name: self.table.path_name(&f.name), return_type: returns });

        let label = Self::block_label(id);
        self.ir.new_named_block(label.clone());
        let mut alloc = RegisterAllocator::new();

        // Save the caller's frame pointer, establish our own, and reserve
        // a slot for the return address before any further spills.
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Sub,
            predicate: Predicate::Na,
            datatype: Some(Datatype::U64),
            args: vec![IrArg::Reg(RegisterId::SP), IrArg::Imm(8)],
        }));
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Store,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::RegIndirect { reg: RegisterId::SP, offset: 0 }, IrArg::Reg(RegisterId::FP)],
        }));
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Load,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::FP), IrArg::Reg(RegisterId::SP)],
        }));
        let rpc_symbol = self.table.ids_mut().next();
        let rpc_offset = alloc.declare_local(rpc_symbol);
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Store,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::RegIndirect { reg: RegisterId::FP, offset: rpc_offset as i16 }, IrArg::Reg(RegisterId::RPC)],
        }));
        // Placeholder immediate, patched once the body's frame size is
        // known; `frame_size_patch` remembers where to poke the real
        // value back in.
        let patch_index = self.ir.current_len();
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Sub,
            predicate: Predicate::Na,
            datatype: Some(Datatype::U64),
            args: vec![IrArg::Reg(RegisterId::SP), IrArg::Imm(0)],
        }));

        for (i, pid) in param_ids.iter().enumerate() {
            let offset = alloc.declare_local(*pid);
            self.table.assign_symbol(*pid, crate::symbol::StorageLocation::Stack { base_offset: 0, offset });
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Store,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![
                    IrArg::RegIndirect { reg: RegisterId::FP, offset: offset as i16 },
                    IrArg::Reg(RegisterId::general(i as u8 + 1)),
                ],
            }));
        }

        self.frames.push(FunctionFrame { alloc, rpc_offset, label: label.clone(), frame_size_patch: (label.clone(), patch_index) });

        let mut ok = true;
        for stmt in body {
            if !self.process_stmt(stmt) {
                ok = false;
                break;
            }
        }

        if ok && returns == self.graph.unit && !body.last().is_some_and(Stmt::always_returns) {
            ok = self.emit_epilogue(None);
        } else if ok && returns != self.graph.unit && !body.last().is_some_and(Stmt::always_returns) {
            self.messages.error(
                f.location.clone(),
                format!("missing return statement in function returning type {}", type_display(&self.graph, returns)),
            );
            ok = false;
        }

        let frame = self.frames.pop().expect("pushed above");
        let frame_size = (-frame.alloc.frame_size()) as u64;
        let (patch_label, patch_index) = frame.frame_size_patch;
        self.ir.patch_imm(&patch_label, patch_index, frame_size);

        self.table.exit_function();
        self.table.pop();
        ok
    }

    /// Evaluate an expression, returning its type and where its value
    /// lives. `hint` carries the expected type down into literals/calls
    /// the way a declared variable type or return type does; it is not a
    /// requirement, just a steer for overload/conversion choices that
    /// remain ambiguous without it.
    fn process_expr(&mut self, expr: &Expr, hint: Option<TypeId>) -> Option<(TypeId, Ref)> {
        match expr {
            Expr::Error { .. } => None,
            Expr::Literal { value, location } => self.process_literal(value, hint, location),
            Expr::SymbolRef { name, location } => self.process_symbol_ref(name, location),
            Expr::Unary { op, operand, location } => self.process_unary(op, operand, location),
            Expr::Binary { op, lhs, rhs, location } => self.process_binary(op, lhs, rhs, location),
            Expr::Cast { ty, operand, location } => self.process_cast(ty, operand, location),
            Expr::Dot { base, member, location } => self.process_dot(base, member, location),
            Expr::Call { callee, args, location } => self.process_call(callee, args, location),
        }
    }

    fn process_literal(&mut self, value: &Literal, hint: Option<TypeId>, location: &Location) -> Option<(TypeId, Ref)> {
        let ty = match (value, hint.map(|h| self.graph.get(h).clone())) {
            (Literal::Int(_), Some(Type::Int { .. } | Type::Float { .. })) => hint.unwrap(),
            (Literal::Float(_), Some(Type::Float { .. })) => hint.unwrap(),
            _ => literal_type(&self.graph, value),
        };
        let bits = match value {
            Literal::Int(v) | Literal::Float(v) => *v,
            Literal::Bool(b) => *b as u64,
            Literal::Unit => 0,
        };
        let Some(frame) = self.frames.last_mut() else {
            self.messages.error(location.clone(), "expression outside a function".to_owned());
            return None;
        };
        Some((ty, frame.alloc.find_literal(&mut self.ir, bits, Predicate::Na)))
    }

    fn process_symbol_ref(&mut self, name: &str, location: &Location) -> Option<(TypeId, Ref)> {
        let id = self.table.find(name)?;
        if self.table.symbol(id).is_none() {
            self.messages.error(location.clone(), format!("unknown symbol '{name}'"));
            return None;
        }
        if let Some(sym) = self.table.symbol_mut(id) {
            sym.mark_referenced();
        }
        let ty = self.table.symbol(id)?.ty()?;
        let Some(frame) = self.frames.last_mut() else {
            self.messages.error(location.clone(), "expression outside a function".to_owned());
            return None;
        };
        Some((ty, frame.alloc.find_variable(&mut self.ir, &self.table, id, Predicate::Na)))
    }

    /// The common type two numeric operands coerce into: whichever side
    /// the other is a subtype of, or `None` if they're unrelated.
    fn common_arith_type(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if a == b {
            Some(a)
        } else if self.graph.is_subtype(a, b) {
            Some(b)
        } else if self.graph.is_subtype(b, a) {
            Some(a)
        } else {
            None
        }
    }

    /// Make sure `r` is a register holding a value already reinterpreted
    /// per `target` rather than `from`, inserting a `convert` if needed.
    fn coerce_to(&mut self, from: TypeId, target: TypeId, r: Ref) -> Option<RegisterId> {
        let frame = self.frames.last_mut()?;
        let reg = frame.alloc.guarantee_register(&mut self.ir, r, Predicate::Na);
        if from == target {
            return Some(reg);
        }
        let from_dt = self.graph.get(from).asm_datatype(&self.graph)?;
        let to_dt = self.graph.get(target).asm_datatype(&self.graph)?;
        if from_dt == to_dt {
            return Some(reg);
        }
        self.ir.emit(LineKind::Conversion { predicate: Predicate::Na, from: (from_dt, reg), to: (to_dt, reg) });
        Some(reg)
    }

    fn process_unary(&mut self, op: &str, operand: &Expr, location: &Location) -> Option<(TypeId, Ref)> {
        let (ty, r) = self.process_expr(operand, None)?;
        if self.operators.builtin(op, Arity::Unary).is_some() {
            let frame = self.frames.last_mut()?;
            let reg = frame.alloc.guarantee_register(&mut self.ir, r, Predicate::Na);
            match op {
                "!" => {
                    self.ir.emit(LineKind::Generic(GenericInstruction {
                        mnemonic: Mnemonic::Xor,
                        predicate: Predicate::Na,
                        datatype: None,
                        args: vec![IrArg::Reg(reg), IrArg::Imm(1)],
                    }));
                    Some((ty, Ref::Register(reg)))
                }
                "-" => {
                    let dt = self.graph.get(ty).asm_datatype(&self.graph)?;
                    let frame = self.frames.last_mut()?;
                    let zero = frame.alloc.find_literal(&mut self.ir, 0, Predicate::Na);
                    let zero_reg = frame.alloc.guarantee_register(&mut self.ir, zero, Predicate::Na);
                    self.ir.emit(LineKind::Generic(GenericInstruction {
                        mnemonic: Mnemonic::Sub,
                        predicate: Predicate::Na,
                        datatype: Some(dt),
                        args: vec![IrArg::Reg(zero_reg), IrArg::Reg(reg)],
                    }));
                    Some((ty, Ref::Register(zero_reg)))
                }
                "+" => Some((ty, Ref::Register(reg))),
                _ => {
                    self.messages.error(location.clone(), format!("unsupported unary operator '{op}'"));
                    None
                }
            }
        } else {
            self.call_user_operator(op, &[(ty, r)], location)
        }
    }

    fn process_binary(&mut self, op: &str, lhs: &Expr, rhs: &Expr, location: &Location) -> Option<(TypeId, Ref)> {
        if op == "=" {
            return self.process_assign(lhs, rhs, location);
        }
        if op == "." {
            self.messages.error(location.clone(), "'.' is only valid for namespace member access".to_owned());
            return None;
        }

        let (lty, lref) = self.process_expr(lhs, None)?;
        let (rty, rref) = self.process_expr(rhs, Some(lty))?;

        if self.operators.builtin(op, Arity::Binary).is_none() {
            return self.call_user_operator(op, &[(lty, lref), (rty, rref)], location);
        }

        if let Some(pred) = comparison_predicate(op) {
            let common = self.common_arith_type(lty, rty).or(Some(self.graph.f64_))?;
            let lreg = self.coerce_to(lty, common, lref)?;
            let rreg = self.coerce_to(rty, common, rref)?;
            let dt = self.graph.get(common).asm_datatype(&self.graph)?;
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Compare,
                predicate: Predicate::Na,
                datatype: Some(dt),
                args: vec![IrArg::Reg(lreg), IrArg::Reg(rreg)],
            }));
            let frame = self.frames.last_mut()?;
            let zero = frame.alloc.find_literal(&mut self.ir, 0, Predicate::Na);
            let result_reg = frame.alloc.guarantee_register(&mut self.ir, zero, Predicate::Na);
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Load,
                predicate: pred,
                datatype: None,
                args: vec![IrArg::Reg(result_reg), IrArg::Imm(1)],
            }));
            return Some((self.graph.bool_, Ref::Register(result_reg)));
        }

        if op == "&&" || op == "||" {
            if !self.graph.is_subtype(lty, self.graph.bool_) || !self.graph.is_subtype(rty, self.graph.bool_) {
                self.messages.error(location.clone(), format!("operands of '{op}' must be bool"));
                return None;
            }
            let frame = self.frames.last_mut()?;
            let lreg = frame.alloc.guarantee_register(&mut self.ir, lref, Predicate::Na);
            let rreg = frame.alloc.guarantee_register(&mut self.ir, rref, Predicate::Na);
            let mnemonic = if op == "&&" { Mnemonic::And } else { Mnemonic::Or };
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![IrArg::Reg(lreg), IrArg::Reg(rreg)],
            }));
            return Some((self.graph.bool_, Ref::Register(lreg)));
        }

        if op == "%" {
            let lreg = self.coerce_to(lty, self.graph.i64_, lref)?;
            let rreg = self.coerce_to(rty, self.graph.i64_, rref)?;
            self.ir.emit(LineKind::Generic(GenericInstruction {
                mnemonic: Mnemonic::Mod,
                predicate: Predicate::Na,
                datatype: None,
                args: vec![IrArg::Reg(lreg), IrArg::Reg(rreg)],
            }));
            return Some((self.graph.i64_, Ref::Register(lreg)));
        }

        // Arithmetic: +, -, *, /
        let Some(common) = self.common_arith_type(lty, rty) else {
            self.messages.error(
                location.clone(),
                format!(
                    "incompatible operand types {} and {} for '{op}'",
                    type_display(&self.graph, lty),
                    type_display(&self.graph, rty)
                ),
            );
            return None;
        };
        let lreg = self.coerce_to(lty, common, lref)?;
        let rreg = self.coerce_to(rty, common, rref)?;
        let dt = self.graph.get(common).asm_datatype(&self.graph)?;
        let mnemonic = match op {
            "+" => Mnemonic::Add,
            "-" => Mnemonic::Sub,
            "*" => Mnemonic::Mul,
            "/" => Mnemonic::Div,
            _ => {
                self.messages.error(location.clone(), format!("unsupported binary operator '{op}'"));
                return None;
            }
        };
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic,
            predicate: Predicate::Na,
            datatype: Some(dt),
            args: vec![IrArg::Reg(lreg), IrArg::Reg(rreg)],
        }));
        Some((common, Ref::Register(lreg)))
    }

    fn process_assign(&mut self, lhs: &Expr, rhs: &Expr, location: &Location) -> Option<(TypeId, Ref)> {
        let Expr::SymbolRef { name, .. } = lhs else {
            self.messages.error(location.clone(), "left-hand side of '=' must be a variable".to_owned());
            return None;
        };
        let id = self.table.find(name)?;
        let lhs_ty = self.table.symbol(id)?.ty()?;
        let (rty, rref) = self.process_expr(rhs, Some(lhs_ty))?;
        if !self.graph.is_subtype(rty, lhs_ty) {
            self.messages.error(
                location.clone(),
                format!(
                    "cannot assign {} to '{name}' of type {}",
                    type_display(&self.graph, rty),
                    type_display(&self.graph, lhs_ty)
                ),
            );
            return None;
        }
        let rreg = self.coerce_to(rty, lhs_ty, rref)?;
        let frame = self.frames.last_mut()?;
        let lhs_ref = frame.alloc.find_variable(&mut self.ir, &self.table, id, Predicate::Na);
        let lhs_reg = frame.alloc.guarantee_register(&mut self.ir, lhs_ref, Predicate::Na);
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Load,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(lhs_reg), IrArg::Reg(rreg)],
        }));
        Some((lhs_ty, Ref::Register(lhs_reg)))
    }

    fn process_cast(&mut self, ty: &TypeExpr, operand: &Expr, location: &Location) -> Option<(TypeId, Ref)> {
        let target = resolve_type(&self.graph, ty, &mut self.messages)?;
        let (from, r) = self.process_expr(operand, Some(target))?;
        let _ = location;
        let reg = self.coerce_to(from, target, r)?;
        Some((target, Ref::Register(reg)))
    }

    /// Member access is only meaningful as a namespace path here — there
    /// are no aggregate/struct types to project a field out of.
    fn process_dot(&mut self, base: &Expr, member: &str, location: &Location) -> Option<(TypeId, Ref)> {
        let ns = self.resolve_namespace_path(base, location)?;
        let Symbol::Namespace { children, .. } = self.table.symbol(ns)? else {
            self.messages.error(location.clone(), "'.' base is not a namespace".to_owned());
            return None;
        };
        let ids = children.get(member);
        let Some(&id) = ids.last() else {
            self.messages.error(location.clone(), format!("no member '{member}' in namespace"));
            return None;
        };
        let ty = children.symbol(id)?.ty()?;
        let frame = self.frames.last_mut()?;
        Some((ty, frame.alloc.find_variable(&mut self.ir, &self.table, id, Predicate::Na)))
    }

    fn resolve_namespace_path(&mut self, expr: &Expr, location: &Location) -> Option<SymbolId> {
        match expr {
            Expr::SymbolRef { name, .. } => {
                let id = self.table.find(name)?;
                if matches!(self.table.symbol(id)?, Symbol::Namespace { .. }) {
                    Some(id)
                } else {
                    self.messages.error(location.clone(), format!("'{name}' is not a namespace"));
                    None
                }
            }
            Expr::Dot { base, member, location: inner } => {
                let parent = self.resolve_namespace_path(base, inner)?;
                let Symbol::Namespace { children, .. } = self.table.symbol(parent)? else { return None };
                let id = *children.get(member).last()?;
                if matches!(self.table.symbol(id)?, Symbol::Namespace { .. }) {
                    Some(id)
                } else {
                    self.messages.error(location.clone(), format!("'{member}' is not a namespace"));
                    None
                }
            }
            _ => {
                self.messages.error(location.clone(), "expected a namespace path".to_owned());
                None
            }
        }
    }

    fn process_call(&mut self, callee: &Expr, args: &[Expr], location: &Location) -> Option<(TypeId, Ref)> {
        let candidates: Vec<(SymbolId, TypeId)> = match callee {
            Expr::SymbolRef { name, .. } => self.table.find_function(name),
            Expr::Dot { base, member, location: inner } => {
                let ns = self.resolve_namespace_path(base, inner)?;
                let Symbol::Namespace { children, .. } = self.table.symbol(ns)? else { return None };
                children.function_candidates(member).to_vec()
            }
            _ => {
                self.messages.error(location.clone(), "call target must name a function".to_owned());
                return None;
            }
        };
        if candidates.is_empty() {
            self.messages.error(location.clone(), "no matching function".to_owned());
            return None;
        }

        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.process_expr(arg, None)?);
        }
        let actual_params: Vec<TypeId> = evaluated.iter().map(|(t, _)| *t).collect();

        let mut options = Vec::with_capacity(candidates.len());
        for (id, fty) in &candidates {
            if let Type::Function { params, .. } = self.graph.get(*fty) {
                options.push((*id, params.clone()));
            }
        }
        let callee_id = match resolve_overload(&self.graph, &actual_params, &options) {
            OverloadResolution::Unique(id) => id,
            OverloadResolution::Ambiguous(ids) => {
                self.messages.error(location.clone(), "ambiguous call".to_owned());
                for id in ids {
                    self.messages.note(location.clone(), format!("candidate: symbol {}", id.raw()));
                }
                return None;
            }
            OverloadResolution::None => {
                self.messages.error(location.clone(), "no matching overload for call".to_owned());
                return None;
            }
        };
        if let Some(sym) = self.table.symbol_mut(callee_id) {
            sym.mark_referenced();
        }
        self.emit_call(callee_id, evaluated)
    }

    /// Move evaluated arguments into `r1..`, jump into the callee's block,
    /// and capture `$ret` into a fresh register before it can be clobbered
    /// by a subsequent call. Argument registers are moved in declaration
    /// order without cycle detection — adequate as long as an argument's
    /// current register doesn't happen to coincide with a later
    /// argument's target slot.
    fn emit_call(&mut self, callee_id: SymbolId, evaluated: Vec<(TypeId, Ref)>) -> Option<(TypeId, Ref)> {
        let returns = match self.table.symbol(callee_id)?.ty() {
            Some(ty) => match self.graph.get(ty) {
                Type::Function { returns, .. } => *returns,
                _ => self.graph.unit,
            },
            None => self.graph.unit,
        };

        let frame = self.frames.last_mut()?;
        for (i, (_, r)) in evaluated.into_iter().enumerate() {
            let reg = frame.alloc.guarantee_register(&mut self.ir, r, Predicate::Na);
            let dest = RegisterId::general(i as u8 + 1);
            if dest != reg {
                self.ir.emit(LineKind::Generic(GenericInstruction {
                    mnemonic: Mnemonic::Load,
                    predicate: Predicate::Na,
                    datatype: None,
                    args: vec![IrArg::Reg(dest), IrArg::Reg(reg)],
                }));
            }
        }

        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Jal,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(RegisterId::RPC), IrArg::Label(Self::block_label(callee_id))],
        }));

        if returns == self.graph.unit {
            return Some((returns, Ref::Register(RegisterId::RET)));
        }
        let capture_id = self.table.ids_mut().next();
        let frame = self.frames.last_mut()?;
        let dest = frame.alloc.allocate_for(&mut self.ir, capture_id);
        self.ir.emit(LineKind::Generic(GenericInstruction {
            mnemonic: Mnemonic::Load,
            predicate: Predicate::Na,
            datatype: None,
            args: vec![IrArg::Reg(dest), IrArg::Reg(RegisterId::RET)],
        }));
        Some((returns, Ref::Register(dest)))
    }

    fn call_user_operator(&mut self, op: &str, operands: &[(TypeId, Ref)], location: &Location) -> Option<(TypeId, Ref)> {
        let candidates = self.operators.user_candidates(op);
        let actual_params: Vec<TypeId> = operands.iter().map(|(t, _)| *t).collect();
        let mut options = Vec::with_capacity(candidates.len());
        for (id, fty) in &candidates {
            if let Type::Function { params, .. } = self.graph.get(*fty) {
                options.push((*id, params.clone()));
            }
        }
        match resolve_overload(&self.graph, &actual_params, &options) {
            OverloadResolution::Unique(id) => self.emit_call(id, operands.to_vec()),
            OverloadResolution::Ambiguous(_) => {
                self.messages.error(location.clone(), format!("ambiguous overload for operator '{op}'"));
                None
            }
            OverloadResolution::None => {
                self.messages.error(location.clone(), format!("no operator '{op}' for these operand types"));
                None
            }
        }
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile_source(src: &str) -> (Codegen, bool) {
        let mut parser = Parser::new("t", src);
        let program = parser.parse_program();
        let mut codegen = Codegen::new();
        codegen.messages = parser.into_messages();
        let ok = codegen.compile(&program);
        (codegen, ok)
    }

    fn has_mnemonic(ir: &IrModule, m: Mnemonic) -> bool {
        ir.blocks().iter().flat_map(|b| &b.lines).any(|l| matches!(&l.kind, LineKind::Generic(g) if g.mnemonic == m))
    }

    fn has_add_with_dt(ir: &IrModule, dt: Datatype) -> bool {
        ir.blocks()
            .iter()
            .flat_map(|b| &b.lines)
            .any(|l| matches!(&l.kind, LineKind::Generic(g) if g.mnemonic == Mnemonic::Add && g.datatype == Some(dt)))
    }

    #[test]
    fn add_of_two_i32_params_emits_an_s32_add() {
        let (codegen, ok) = compile_source("func add(a: i32, b: i32) -> i32 { return a + b }");
        assert!(ok, "{}", codegen.messages);
        assert!(has_add_with_dt(&codegen.ir, Datatype::S32));
    }

    #[test]
    fn missing_return_in_non_unit_function_is_an_error() {
        let (codegen, ok) = compile_source("func f() -> i32 {}");
        assert!(!ok);
        let text = codegen.messages.to_string();
        assert!(text.contains("missing return statement in function returning type i32"));
    }

    #[test]
    fn mixed_int_float_addition_widens_to_float_and_types_as_f32() {
        let (codegen, ok) = compile_source("let x = 1 + 2.0");
        assert!(ok, "{}", codegen.messages);
        assert!(has_add_with_dt(&codegen.ir, Datatype::Flt));
    }

    #[test]
    fn a_program_with_no_functions_still_ends_in_an_exit_syscall() {
        let (codegen, ok) = compile_source("let x = 5");
        assert!(ok, "{}", codegen.messages);
        assert!(has_mnemonic(&codegen.ir, Mnemonic::Syscall));
    }

    #[test]
    fn calling_a_function_jumps_to_its_labeled_block() {
        let (codegen, ok) = compile_source("func inc(a: i32) -> i32 { return a + 1 }\nlet y = inc(4)");
        assert!(ok, "{}", codegen.messages);
        assert!(has_mnemonic(&codegen.ir, Mnemonic::Jal));
    }
}
