//! Symbol machinery: scoped storage of named entities with
//! runtime storage locations.
//!
//! Symbol identity is a flat, process-wide [`SymbolId`] (mirroring
//! [`crate::types::TypeId`]'s arena-by-id scheme) rather than a
//! reference-counted handle, so popping a block scope's [`Registry`] can
//! never leave a dangling reference in code that cached a `SymbolId`
//! earlier.

use std::collections::HashMap;

use crate::diagnostics::{Location, MessageList};
use crate::lexer::Token;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Monotonic `SymbolId` generator, shared by every [`Registry`] a
/// [`SymbolTable`] creates so ids stay unique across the whole program.
#[derive(Debug, Default)]
pub struct SymbolIdGen(u32);

impl SymbolIdGen {
    pub fn next(&mut self) -> SymbolId {
        let id = SymbolId(self.0);
        self.0 += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Ordinary,
    Argument,
    Function,
    Constant,
}

/// Where a symbol lives at runtime: either an offset from a basic block's
/// address (globals and functions), or a negative offset from the frame
/// pointer (locals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLocation {
    Block { offset: i64 },
    Stack { base_offset: i64, offset: i64 },
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Variable { token: Token, ty: TypeId, category: Category, ref_count: u32 },
    Namespace { token: Token, children: Registry },
}

impl Symbol {
    pub fn token(&self) -> &Token {
        match self {
            Self::Variable { token, .. } => token,
            Self::Namespace { token, .. } => token,
        }
    }

    pub fn name(&self) -> &str {
        &self.token().image
    }

    pub fn ty(&self) -> Option<TypeId> {
        match self {
            Self::Variable { ty, .. } => Some(*ty),
            Self::Namespace { .. } => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Variable { category: Category::Function, .. })
    }

    pub fn mark_referenced(&mut self) {
        if let Self::Variable { ref_count, .. } = self {
            *ref_count += 1;
        }
    }
}

/// Multimap `name -> [SymbolId]` plus the owning `SymbolId -> Symbol` map,
/// with a parent pointer to the enclosing namespace symbol (`None` at top
/// level).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    owned: HashMap<SymbolId, Symbol>,
    by_name: HashMap<String, Vec<SymbolId>>,
    pub parent: Option<SymbolId>,
    /// Function signatures already bound for each overloaded name, used to
    /// reject duplicate signatures and to build overload candidate lists
    /// without re-walking `owned` for every lookup.
    function_signatures: HashMap<String, Vec<(SymbolId, TypeId)>>,
}

impl Registry {
    pub fn new(parent: Option<SymbolId>) -> Self {
        Self { parent, ..Default::default() }
    }

    /// Insert `symbol`. Re-using a name is allowed only when every prior
    /// binding of that name is a `Function` variant with a distinct
    /// signature from the newcomer; otherwise a diagnostic is emitted and
    /// the insertion fails.
    pub fn insert(
        &mut self,
        ids: &mut SymbolIdGen,
        symbol: Symbol,
        function_type: Option<TypeId>,
        messages: &mut MessageList,
    ) -> Option<SymbolId> {
        let name = symbol.name().to_owned();
        let location = symbol.token().location.clone();
        let existing = self.by_name.get(&name).cloned().unwrap_or_default();

        if !existing.is_empty() {
            let all_functions_so_far = existing.iter().all(|id| self.owned[id].is_function());
            let first_location = existing.first().map(|id| self.owned[id].token().location.clone());
            let reject = |messages: &mut MessageList| {
                messages.error(location.clone(), format!("symbol {name} already bound"));
                if let Some(first) = &first_location {
                    messages.note(first.clone(), format!("{name} first declared here"));
                }
            };
            match (all_functions_so_far, symbol.is_function(), function_type) {
                (true, true, Some(ty)) => {
                    let sigs = self.function_signatures.entry(name.clone()).or_default();
                    if sigs.iter().any(|(_, t)| *t == ty) {
                        reject(messages);
                        return None;
                    }
                }
                _ => {
                    reject(messages);
                    return None;
                }
            }
        }

        let id = ids.next();
        if let (true, Some(ty)) = (symbol.is_function(), function_type) {
            self.function_signatures.entry(name.clone()).or_default().push((id, ty));
        }
        self.owned.insert(id, symbol);
        self.by_name.entry(name).or_default().push(id);
        Some(id)
    }

    pub fn get(&self, name: &str) -> &[SymbolId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.owned.get(&id)
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.owned.get_mut(&id)
    }

    pub fn function_candidates(&self, name: &str) -> &[(SymbolId, TypeId)] {
        self.function_signatures.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolId, &Symbol)> {
        self.owned.iter()
    }
}

/// Context for the function currently being processed, so `return`
/// statements can validate against the enclosing function without AST
/// back-pointers.
#[derive(Debug, Clone)]
pub struct FunctionContext {
    pub name: String,
    pub return_type: TypeId,
}

/// Stack of active registries plus the namespace-path and function-call
/// stacks that give meaning to `path_name`/`current_function`.
pub struct SymbolTable {
    ids: SymbolIdGen,
    registries: Vec<Registry>,
    namespace_path: Vec<String>,
    function_stack: Vec<FunctionContext>,
    storage: HashMap<SymbolId, StorageLocation>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            ids: SymbolIdGen::default(),
            registries: vec![Registry::new(None)],
            namespace_path: Vec::new(),
            function_stack: Vec::new(),
            storage: HashMap::new(),
        }
    }

    pub fn ids_mut(&mut self) -> &mut SymbolIdGen {
        &mut self.ids
    }

    pub fn push(&mut self) {
        self.registries.push(Registry::new(None));
    }

    pub fn pop(&mut self) -> Registry {
        self.registries.pop().expect("registry stack underflow")
    }

    /// Make a pre-built registry (e.g. a function's pass-1 collated
    /// locals) visible as the current scope.
    pub fn insert_registry(&mut self, registry: Registry) {
        self.registries.push(registry);
    }

    pub fn current_mut(&mut self) -> &mut Registry {
        self.registries.last_mut().expect("registry stack underflow")
    }

    /// Insert into the current (innermost) scope. A free method rather
    /// than delegating to `current_mut().insert(...)` so callers don't
    /// need to borrow `ids_mut()` and `current_mut()` at the same time.
    pub fn insert(
        &mut self,
        symbol: Symbol,
        function_type: Option<TypeId>,
        messages: &mut MessageList,
    ) -> Option<SymbolId> {
        let registry = self.registries.last_mut().expect("registry stack underflow");
        registry.insert(&mut self.ids, symbol, function_type, messages)
    }

    pub fn current(&self) -> &Registry {
        self.registries.last().expect("registry stack underflow")
    }

    /// Walk the active-registry stack outermost-first; a later (more
    /// inner) match overrides an earlier one, giving correct shadowing
    /// while matching the documented outermost-first walk order.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        let mut found = None;
        for registry in &self.registries {
            if let Some(ids) = registry.by_name.get(name) {
                if let Some(last) = ids.last() {
                    found = Some(*last);
                }
            }
        }
        found
    }

    /// Look up a symbol by id across every active registry, innermost
    /// first. Needed once codegen descends into a `Symbol::Namespace`'s
    /// own `children` registry via [`Self::insert_registry`] but still
    /// has to resolve ids collated from an enclosing scope.
    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.registries.iter().rev().find_map(|r| r.symbol(id))
    }

    /// Mutable counterpart of [`Self::symbol`], used to bump `ref_count`
    /// when a reference resolves to a symbol bound in an outer scope.
    pub fn symbol_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.registries.iter_mut().rev().find_map(|r| r.symbol_mut(id))
    }

    pub fn find_function(&self, name: &str) -> Vec<(SymbolId, TypeId)> {
        let mut candidates = Vec::new();
        for registry in &self.registries {
            candidates.extend(registry.function_candidates(name).iter().copied());
        }
        candidates
    }

    pub fn assign_symbol(&mut self, id: SymbolId, location: StorageLocation) {
        self.storage.insert(id, location);
    }

    pub fn locate(&self, id: SymbolId) -> Option<StorageLocation> {
        self.storage.get(&id).copied()
    }

    pub fn push_path(&mut self, name: String) {
        self.namespace_path.push(name);
    }

    pub fn pop_path(&mut self) {
        self.namespace_path.pop();
    }

    pub fn path_name(&self, name: &str) -> String {
        if self.namespace_path.is_empty() {
            name.to_owned()
        } else {
            format!("{}::{}", self.namespace_path.join("::"), name)
        }
    }

    pub fn enter_function(&mut self, ctx: FunctionContext) {
        self.function_stack.push(ctx);
    }

    pub fn exit_function(&mut self) {
        self.function_stack.pop();
    }

    pub fn current_function(&self) -> Option<&FunctionContext> {
        self.function_stack.last()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

pub fn dummy_location(path: &str) -> Location {
    Location::new(std::rc::Rc::from(path), 1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;

    fn tok(name: &str) -> Token {
        Token {
            kind: TokenKind::Ident,
            image: name.to_owned(),
            location: dummy_location("t"),
            line_snapshot: String::new(),
            numeric_value: 0,
            newline_before: false,
        }
    }

    fn var(name: &str, ty: TypeId) -> Symbol {
        Symbol::Variable { token: tok(name), ty, category: Category::Ordinary, ref_count: 0 }
    }

    #[test]
    fn pop_after_insert_hides_the_symbol_again() {
        let mut table = SymbolTable::new();
        let mut messages = MessageList::new();
        let ty = dummy_type();
        table.push();
        table.insert(var("x", ty), None, &mut messages);
        table.pop();
        assert!(table.find("x").is_none());
    }

    fn dummy_type() -> TypeId {
        crate::types::TypeGraph::new().i32_
    }

    #[test]
    fn duplicate_non_function_symbol_is_an_error() {
        let mut registry = Registry::new(None);
        let mut ids = SymbolIdGen::default();
        let mut messages = MessageList::new();
        let ty = dummy_type();
        assert!(registry.insert(&mut ids, var("x", ty), None, &mut messages).is_some());
        assert!(registry.insert(&mut ids, var("x", ty), None, &mut messages).is_none());
        assert_eq!(messages.errors().count(), 1);
        assert_eq!(messages.len(), 2, "the rejection should also note where it was first declared");
    }

    #[test]
    fn functions_with_distinct_signatures_both_succeed() {
        let mut registry = Registry::new(None);
        let mut ids = SymbolIdGen::default();
        let mut messages = MessageList::new();
        let graph = crate::types::TypeGraph::new();
        let f1 = Symbol::Variable { token: tok("f"), ty: graph.i32_, category: Category::Function, ref_count: 0 };
        let f2 = Symbol::Variable { token: tok("f"), ty: graph.i64_, category: Category::Function, ref_count: 0 };
        assert!(registry.insert(&mut ids, f1, Some(graph.i32_), &mut messages).is_some());
        assert!(registry.insert(&mut ids, f2, Some(graph.i64_), &mut messages).is_some());
        assert!(!messages.has_errors());
    }

    #[test]
    fn functions_with_an_equal_signature_is_an_error() {
        let mut registry = Registry::new(None);
        let mut ids = SymbolIdGen::default();
        let mut messages = MessageList::new();
        let graph = crate::types::TypeGraph::new();
        let f1 = Symbol::Variable { token: tok("f"), ty: graph.i32_, category: Category::Function, ref_count: 0 };
        let f2 = Symbol::Variable { token: tok("f"), ty: graph.i32_, category: Category::Function, ref_count: 0 };
        assert!(registry.insert(&mut ids, f1, Some(graph.i32_), &mut messages).is_some());
        assert!(registry.insert(&mut ids, f2, Some(graph.i32_), &mut messages).is_none());
        assert_eq!(messages.errors().count(), 1);
    }
}
