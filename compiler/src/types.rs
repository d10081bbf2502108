//! Type graph: the registry of [`Type`]s and the
//! subtype relation over integer/float widths and function signatures.
//!
//! Ownership is centralized in the graph itself (an arena keyed by
//! [`TypeId`]) rather than reference-counted `Type` values, so function
//! types can reference their parameter types without creating cycles —
//! mirroring `original_source/language/src/ast/types/graph.cpp`'s global
//! `TypeGraph`.

use std::collections::{HashMap, HashSet};

use toylang_asm::Datatype;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Namespace,
    None,
    Bool,
    Int { signed: bool, width: u8 },
    Float { width: u8 },
    Function { params: Vec<TypeId>, returns: TypeId },
    Wrapper { name: String, inner: TypeId },
    Pointer { inner: TypeId },
    Array { inner: TypeId, len: u64 },
}

impl Type {
    pub fn size_in_bytes(&self, graph: &TypeGraph) -> u32 {
        match self {
            Self::Unit | Self::Namespace | Self::None => 0,
            Self::Bool => 1,
            Self::Int { width, .. } => *width as u32 / 8,
            Self::Float { width } => *width as u32 / 8,
            Self::Function { .. } => 8,
            Self::Wrapper { inner, .. } => graph.get(*inner).size_in_bytes(graph),
            Self::Pointer { .. } => 8,
            Self::Array { inner, len } => graph.get(*inner).size_in_bytes(graph) * *len as u32,
        }
    }

    /// The VM's typed-arithmetic tag for this type. `None` for
    /// `Unit`/`Namespace`/`None`, which carry no runtime representation.
    pub fn asm_datatype(&self, graph: &TypeGraph) -> Option<Datatype> {
        match self {
            Self::Bool | Self::Int { signed: false, width } if *width <= 32 => Some(Datatype::U32),
            Self::Int { signed: false, .. } => Some(Datatype::U64),
            Self::Int { signed: true, width } if *width <= 32 => Some(Datatype::S32),
            Self::Int { signed: true, .. } => Some(Datatype::S64),
            Self::Float { width: 32 } => Some(Datatype::Flt),
            Self::Float { .. } => Some(Datatype::Dbl),
            Self::Wrapper { inner, .. } => graph.get(*inner).asm_datatype(graph),
            Self::Pointer { .. } => Some(Datatype::U64),
            Self::Unit | Self::Namespace | Self::None | Self::Function { .. } | Self::Array { .. } => None,
        }
    }

    /// Name-mangling suffix for this type.
    pub fn label_suffix(&self, graph: &TypeGraph) -> String {
        match self {
            Self::Unit => "unit".into(),
            Self::Namespace => "ns".into(),
            Self::None => "none".into(),
            Self::Bool => "bool".into(),
            Self::Int { signed, width } => format!("{}{}", if *signed { "i" } else { "u" }, width),
            Self::Float { width } => format!("f{width}"),
            Self::Function { params, returns } => {
                let mut s = "fn".to_owned();
                for p in params {
                    s.push('_');
                    s.push_str(&graph.get(*p).label_suffix(graph));
                }
                s.push_str("__");
                s.push_str(&graph.get(*returns).label_suffix(graph));
                s
            }
            Self::Wrapper { name, inner } => format!("{name}_{}", graph.get(*inner).label_suffix(graph)),
            Self::Pointer { inner } => format!("ptr_{}", graph.get(*inner).label_suffix(graph)),
            Self::Array { inner, len } => format!("arr{len}_{}", graph.get(*inner).label_suffix(graph)),
        }
    }

    /// True for aggregates that are passed/returned by reference rather
    /// than by value.
    pub fn reference_as_ptr(&self) -> bool {
        matches!(self, Self::Array { .. })
    }
}

/// Registry of types plus the subtype relation over them.
pub struct TypeGraph {
    arena: Vec<Type>,
    /// `child -> {direct parents}`.
    edges: HashMap<TypeId, HashSet<TypeId>>,

    pub unit: TypeId,
    pub none: TypeId,
    pub namespace: TypeId,
    pub bool_: TypeId,
    pub u8_: TypeId,
    pub u16_: TypeId,
    pub u32_: TypeId,
    pub u64_: TypeId,
    pub i8_: TypeId,
    pub i16_: TypeId,
    pub i32_: TypeId,
    pub i64_: TypeId,
    pub f32_: TypeId,
    pub f64_: TypeId,
}

impl TypeGraph {
    pub fn new() -> Self {
        let mut arena = Vec::new();
        let mut edges = HashMap::new();
        let mut insert = |arena: &mut Vec<Type>, t: Type| -> TypeId {
            let id = TypeId(arena.len() as u32);
            arena.push(t);
            edges.insert(id, HashSet::new());
            id
        };

        let unit = insert(&mut arena, Type::Unit);
        let none = insert(&mut arena, Type::None);
        let namespace = insert(&mut arena, Type::Namespace);
        let bool_ = insert(&mut arena, Type::Bool);

        let u8_ = insert(&mut arena, Type::Int { signed: false, width: 8 });
        let u16_ = insert(&mut arena, Type::Int { signed: false, width: 16 });
        let u32_ = insert(&mut arena, Type::Int { signed: false, width: 32 });
        let u64_ = insert(&mut arena, Type::Int { signed: false, width: 64 });
        let i8_ = insert(&mut arena, Type::Int { signed: true, width: 8 });
        let i16_ = insert(&mut arena, Type::Int { signed: true, width: 16 });
        let i32_ = insert(&mut arena, Type::Int { signed: true, width: 32 });
        let i64_ = insert(&mut arena, Type::Int { signed: true, width: 64 });
        let f32_ = insert(&mut arena, Type::Float { width: 32 });
        let f64_ = insert(&mut arena, Type::Float { width: 64 });

        let mut graph = Self {
            arena,
            edges,
            unit,
            none,
            namespace,
            bool_,
            u8_,
            u16_,
            u32_,
            u64_,
            i8_,
            i16_,
            i32_,
            i64_,
            f32_,
            f64_,
        };

        // int8 < int16 < int32 < int64; uint8 < uint16 < uint32 < uint64
        graph.add_subtype_chain(&[i8_, i16_, i32_, i64_]);
        graph.add_subtype_chain(&[u8_, u16_, u32_, u64_]);

        // uintN <: intM when M > N
        graph.add_subtype(u8_, i16_);
        graph.add_subtype(u8_, i32_);
        graph.add_subtype(u8_, i64_);
        graph.add_subtype(u16_, i32_);
        graph.add_subtype(u16_, i64_);
        graph.add_subtype(u32_, i64_);

        // float32 <: float64
        graph.add_subtype(f32_, f64_);

        // every integer <: float64
        for t in [u8_, u16_, u32_, u64_, i8_, i16_, i32_, i64_] {
            graph.add_subtype(t, f64_);
        }
        // every integer narrower than 64 bits <: float32
        for t in [u8_, u16_, u32_, i8_, i16_, i32_] {
            graph.add_subtype(t, f32_);
        }

        graph
    }

    pub fn insert(&mut self, t: Type) -> TypeId {
        let id = TypeId(self.arena.len() as u32);
        self.arena.push(t);
        self.edges.insert(id, HashSet::new());
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.arena[id.index()]
    }

    pub fn add_subtype(&mut self, child: TypeId, parent: TypeId) {
        self.edges.entry(child).or_default().insert(parent);
    }

    pub fn add_subtype_chain(&mut self, chain: &[TypeId]) {
        for w in chain.windows(2) {
            self.add_subtype(w[0], w[1]);
        }
    }

    /// `child :> parent`... no: is `child` a subtype of `parent`? Reflexive
    /// and transitive by BFS reachability over direct edges.
    pub fn is_subtype(&self, child: TypeId, parent: TypeId) -> bool {
        if child == parent {
            return true;
        }
        let mut seen = HashSet::new();
        let mut queue = vec![child];
        while let Some(cur) = queue.pop() {
            if !seen.insert(cur) {
                continue;
            }
            if cur == parent {
                return true;
            }
            if let Some(next) = self.edges.get(&cur) {
                queue.extend(next.iter().copied());
            }
        }
        false
    }

    /// Intern a function type: reuse an existing one with the same
    /// parameter list (and, when `returns` is supplied, the same return
    /// type too); otherwise create and register a new one. The return
    /// type never participates in subtyping or call-site candidate
    /// filtering, only in this interning check.
    pub fn function_type(&mut self, params: Vec<TypeId>, returns: Option<TypeId>) -> TypeId {
        for (i, t) in self.arena.iter().enumerate() {
            if let Type::Function { params: p, returns: r } = t {
                if *p == params && returns.map_or(true, |ret| ret == *r) {
                    return TypeId(i as u32);
                }
            }
        }
        let returns = returns.unwrap_or(self.unit);
        self.insert(Type::Function { params, returns })
    }
}

impl Default for TypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of scoring a set of overload candidates against actual
/// parameter types at a call site.
pub enum OverloadResolution<T> {
    Unique(T),
    Ambiguous(Vec<T>),
    None,
}

/// Filter `options` down to those admissible for `actual_params`: arity
/// must match and every actual parameter must be a subtype of the
/// candidate's declared parameter. Score = count of exact-type positions;
/// a perfect score short-circuits to that single candidate, otherwise only
/// the candidates tied for the maximum score survive.
pub fn resolve_overload<T: Copy>(
    graph: &TypeGraph,
    actual_params: &[TypeId],
    options: &[(T, Vec<TypeId>)],
) -> OverloadResolution<T> {
    let mut scored: Vec<(T, usize)> = Vec::new();
    for (candidate, params) in options {
        if params.len() != actual_params.len() {
            continue;
        }
        let admissible = actual_params
            .iter()
            .zip(params)
            .all(|(actual, declared)| graph.is_subtype(*actual, *declared));
        if !admissible {
            continue;
        }
        let score = actual_params.iter().zip(params).filter(|(a, d)| a == d).count();
        if score == actual_params.len() {
            return OverloadResolution::Unique(*candidate);
        }
        scored.push((*candidate, score));
    }

    if scored.is_empty() {
        return OverloadResolution::None;
    }
    let max = scored.iter().map(|(_, s)| *s).max().unwrap();
    let survivors: Vec<T> = scored.into_iter().filter(|(_, s)| *s == max).map(|(c, _)| c).collect();
    if survivors.len() == 1 {
        OverloadResolution::Unique(survivors[0])
    } else {
        OverloadResolution::Ambiguous(survivors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_is_a_subtype_of_itself() {
        let g = TypeGraph::new();
        for t in [g.unit, g.none, g.bool_, g.u8_, g.i64_, g.f32_, g.f64_] {
            assert!(g.is_subtype(t, t));
        }
    }

    #[test]
    fn integer_width_chain_holds() {
        let g = TypeGraph::new();
        assert!(g.is_subtype(g.i8_, g.i64_));
        assert!(g.is_subtype(g.u8_, g.i32_));
        assert!(!g.is_subtype(g.i32_, g.u32_));
        assert!(g.is_subtype(g.i32_, g.f64_));
        assert!(!g.is_subtype(g.f64_, g.f32_));
    }

    #[test]
    fn function_type_create_is_idempotent_under_equal_params() {
        let mut g = TypeGraph::new();
        let a = g.function_type(vec![g.i32_], Some(g.i32_));
        let b = g.function_type(vec![g.i32_], Some(g.i32_));
        assert_eq!(a, b);
    }

    #[test]
    fn function_type_create_with_no_returns_hint_matches_on_params_alone() {
        let mut g = TypeGraph::new();
        let f_i32_ret_i32 = g.function_type(vec![g.i32_], Some(g.i32_));
        let lookup = g.function_type(vec![g.i32_], None);
        assert_eq!(f_i32_ret_i32, lookup);
    }

    #[test]
    fn function_type_create_with_a_different_returns_hint_is_distinct() {
        let mut g = TypeGraph::new();
        let f_i32_ret_i32 = g.function_type(vec![g.i32_], Some(g.i32_));
        let f_i32_ret_bool = g.function_type(vec![g.i32_], Some(g.bool_));
        assert_ne!(f_i32_ret_i32, f_i32_ret_bool);
    }

    #[test]
    fn overload_resolution_keeps_all_admissible_supertypes() {
        let mut g = TypeGraph::new();
        let f_i32 = g.function_type(vec![g.i32_], Some(g.unit));
        let f_i64 = g.function_type(vec![g.i64_], Some(g.unit));
        let f_f32f32 = g.function_type(vec![g.f32_, g.f32_], Some(g.unit));
        let options = vec![
            (f_i32, vec![g.i32_]),
            (f_i64, vec![g.i64_]),
            (f_f32f32, vec![g.f32_, g.f32_]),
        ];
        match resolve_overload(&g, &[g.i16_], &options) {
            OverloadResolution::Ambiguous(mut v) => {
                v.sort_by_key(|id| id.0);
                let mut expect = vec![f_i32, f_i64];
                expect.sort_by_key(|id| id.0);
                assert_eq!(v, expect);
            }
            _ => panic!("expected ambiguous resolution"),
        }
    }

    #[test]
    fn overload_resolution_short_circuits_on_exact_match() {
        let mut g = TypeGraph::new();
        let f_i32 = g.function_type(vec![g.i32_], Some(g.unit));
        let f_i64 = g.function_type(vec![g.i64_], Some(g.unit));
        let options = vec![(f_i32, vec![g.i32_]), (f_i64, vec![g.i64_])];
        match resolve_overload(&g, &[g.i32_], &options) {
            OverloadResolution::Unique(t) => assert_eq!(t, f_i32),
            _ => panic!("expected a unique exact match"),
        }
    }
}
