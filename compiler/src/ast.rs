//! AST: the tree the parser produces and the two
//! semantic passes (`collate_registry`, `process`) walk.
//!
//! The tree is a plain tagged sum rather
//! than a hierarchy of node types with virtual `collate_registry`/
//! `process` methods — the passes themselves (in [`crate::codegen`]) are
//! `match`-driven free functions over these variants, a data-driven pass
//! table standing in for virtual dispatch.

use crate::diagnostics::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Int(u64),
    Float(u64),
    Bool(bool),
    Unit,
}

#[derive(Debug, Clone)]
pub enum TypeExpr {
    /// A built-in scalar keyword or a (possibly namespaced) named type.
    Named { name: String, location: Location },
}

impl TypeExpr {
    pub fn location(&self) -> &Location {
        match self {
            Self::Named { location, .. } => location,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal { value: Literal, location: Location },
    SymbolRef { name: String, location: Location },
    Unary { op: String, operand: Box<Expr>, location: Location },
    Binary { op: String, lhs: Box<Expr>, rhs: Box<Expr>, location: Location },
    Cast { ty: TypeExpr, operand: Box<Expr>, location: Location },
    Dot { base: Box<Expr>, member: String, location: Location },
    Call { callee: Box<Expr>, args: Vec<Expr>, location: Location },
    /// Parser error recovery sentinel: never type-checked successfully.
    Error { location: Location },
}

impl Expr {
    pub fn location(&self) -> &Location {
        match self {
            Self::Literal { location, .. }
            | Self::SymbolRef { location, .. }
            | Self::Unary { location, .. }
            | Self::Binary { location, .. }
            | Self::Cast { location, .. }
            | Self::Dot { location, .. }
            | Self::Call { location, .. }
            | Self::Error { location } => location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    /// `Some(lexeme)` when this is an `operator<op>(...)` definition
    /// rather than a plain named function.
    pub operator: Option<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// `None` for a declaration-only function (`func f(i32);`).
    pub body: Option<Vec<Stmt>>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Block { body: Vec<Stmt>, location: Location },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        location: Location,
    },
    Return { value: Option<Expr>, location: Location },
    Declaration { is_const: bool, bindings: Vec<Binding>, location: Location },
    Function(FunctionDecl),
    Namespace { name: String, body: Vec<Stmt>, location: Location },
    Expr(Expr),
    /// Parser error recovery sentinel for a statement that failed to
    /// parse; carried so the surrounding block can keep parsing siblings.
    Error { location: Location },
}

impl Stmt {
    pub fn location(&self) -> &Location {
        match self {
            Self::Block { location, .. }
            | Self::If { location, .. }
            | Self::Return { location, .. }
            | Self::Declaration { location, .. }
            | Self::Namespace { location, .. }
            | Self::Error { location } => location,
            Self::Function(f) => &f.location,
            Self::Expr(e) => e.location(),
        }
    }

    /// "Termination coverage": true for a `return`, an
    /// `if`/`else` whose both branches always return, or a block whose
    /// last statement always returns.
    pub fn always_returns(&self) -> bool {
        match self {
            Self::Return { .. } => true,
            Self::If { else_branch: Some(else_branch), then_branch, .. } => {
                then_branch.last().is_some_and(Stmt::always_returns)
                    && else_branch.last().is_some_and(Stmt::always_returns)
            }
            Self::Block { body, .. } => body.last().is_some_and(Stmt::always_returns),
            _ => false,
        }
    }
}

/// The whole compilation unit: a sequence of top-level statements.
#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Stmt>,
}
