//! Operator table: built-in and user-defined operator
//! overloads keyed by lexeme and signature.
//!
//! The precedence table is fixed as: `|| = 3`,
//! `&& = 4`, `== != = 7`, `< <= > >= = 8`, `+ - = 10`, `* / % = 11`,
//! `unary = 12`, `. () = 13` (1 = loosest, higher binds tighter).

use crate::symbol::SymbolId;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
}

#[derive(Debug, Clone, Copy)]
pub struct OperatorInfo {
    pub precedence: u8,
    pub right_associative: bool,
    pub overloadable: bool,
    pub arity: Arity,
}

const fn info(precedence: u8, right_associative: bool, overloadable: bool, arity: Arity) -> OperatorInfo {
    OperatorInfo { precedence, right_associative, overloadable, arity }
}

/// `(lexeme, binary info, unary info)` — a lexeme may be valid in either
/// or both arities (`-` is both unary negation and binary subtraction).
const BUILTINS: &[(&str, Option<OperatorInfo>, Option<OperatorInfo>)] = &[
    ("=", Some(info(2, true, false, Arity::Binary)), None),
    ("||", Some(info(3, false, true, Arity::Binary)), None),
    ("&&", Some(info(4, false, true, Arity::Binary)), None),
    ("==", Some(info(7, false, true, Arity::Binary)), None),
    ("!=", Some(info(7, false, true, Arity::Binary)), None),
    ("<", Some(info(8, false, true, Arity::Binary)), None),
    ("<=", Some(info(8, false, true, Arity::Binary)), None),
    (">", Some(info(8, false, true, Arity::Binary)), None),
    (">=", Some(info(8, false, true, Arity::Binary)), None),
    ("+", Some(info(10, false, true, Arity::Binary)), Some(info(12, false, true, Arity::Unary))),
    ("-", Some(info(10, false, true, Arity::Binary)), Some(info(12, false, true, Arity::Unary))),
    ("*", Some(info(11, false, true, Arity::Binary)), None),
    ("/", Some(info(11, false, true, Arity::Binary)), None),
    ("%", Some(info(11, false, true, Arity::Binary)), None),
    ("!", None, Some(info(12, false, true, Arity::Unary))),
    (".", Some(info(13, false, false, Arity::Binary)), None),
];

#[derive(Debug, Clone)]
pub struct UserDefinedOperator {
    pub name: String,
    pub function_type: TypeId,
    pub symbol: SymbolId,
}

/// Keyed by lexeme; `()` (call) is represented separately since it has no
/// single-character lexeme of its own but shares `.`'s precedence tier and
/// is likewise non-overloadable.
pub struct OperatorTable {
    user_defined: Vec<UserDefinedOperator>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self { user_defined: Vec::new() }
    }

    pub fn builtin(&self, lexeme: &str, arity: Arity) -> Option<OperatorInfo> {
        let entry = BUILTINS.iter().find(|(l, ..)| *l == lexeme)?;
        match arity {
            Arity::Binary => entry.1,
            Arity::Unary => entry.2,
        }
    }

    /// Precedence for the call-expression `(` / member-access `.` tier
    /// used by the parser even though `()` has no lexeme of
    /// its own in [`BUILTINS`].
    pub const CALL_PRECEDENCE: u8 = 13;

    pub fn is_overloadable(&self, lexeme: &str) -> bool {
        BUILTINS
            .iter()
            .find(|(l, ..)| *l == lexeme)
            .map(|(_, bin, un)| bin.map(|i| i.overloadable).unwrap_or(true) && un.map(|i| i.overloadable).unwrap_or(true))
            .unwrap_or(true)
    }

    /// Register a user-defined operator overload, rejecting lexemes that
    /// convention marks non-overloadable (`=`, `.`, and the call operator).
    pub fn register_user(&mut self, op: UserDefinedOperator) -> Result<(), String> {
        if !self.is_overloadable(&op.name) {
            return Err(format!("operator {} cannot be overloaded", op.name));
        }
        if self.user_defined.iter().any(|u| u.name == op.name && u.function_type == op.function_type) {
            return Err(format!("operator {} already defined for this signature", op.name));
        }
        self.user_defined.push(op);
        Ok(())
    }

    /// A user-defined overload matching `name` and exactly `function_type`.
    pub fn lookup_user(&self, name: &str, function_type: TypeId) -> Option<&UserDefinedOperator> {
        self.user_defined.iter().find(|u| u.name == name && u.function_type == function_type)
    }

    pub fn user_candidates(&self, name: &str) -> Vec<(SymbolId, TypeId)> {
        self.user_defined
            .iter()
            .filter(|u| u.name == name)
            .map(|u| (u.symbol, u.function_type))
            .collect()
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_table_matches_the_resolved_open_question() {
        let ops = OperatorTable::new();
        assert_eq!(ops.builtin("||", Arity::Binary).unwrap().precedence, 3);
        assert_eq!(ops.builtin("&&", Arity::Binary).unwrap().precedence, 4);
        assert_eq!(ops.builtin("==", Arity::Binary).unwrap().precedence, 7);
        assert_eq!(ops.builtin("<=", Arity::Binary).unwrap().precedence, 8);
        assert_eq!(ops.builtin("+", Arity::Binary).unwrap().precedence, 10);
        assert_eq!(ops.builtin("*", Arity::Binary).unwrap().precedence, 11);
        assert_eq!(ops.builtin("-", Arity::Unary).unwrap().precedence, 12);
        assert_eq!(OperatorTable::CALL_PRECEDENCE, 13);
    }

    #[test]
    fn assignment_and_dot_and_call_reject_user_overloads() {
        let mut ops = OperatorTable::new();
        let dummy = dummy_type_id();
        let err = ops.register_user(UserDefinedOperator {
            name: "=".into(),
            function_type: dummy,
            symbol: dummy_symbol_id(),
        });
        assert!(err.is_err());
    }

    #[test]
    fn distinct_signatures_may_both_register() {
        let mut ops = OperatorTable::new();
        let g = crate::types::TypeGraph::new();
        let mut graph = g;
        let sig1 = graph.function_type(vec![graph.i32_, graph.i32_], None);
        let sig2 = graph.function_type(vec![graph.f64_, graph.f64_], None);
        ops.register_user(UserDefinedOperator { name: "+".into(), function_type: sig1, symbol: dummy_symbol_id() })
            .unwrap();
        ops.register_user(UserDefinedOperator { name: "+".into(), function_type: sig2, symbol: dummy_symbol_id() })
            .unwrap();
        assert_eq!(ops.user_candidates("+").len(), 2);
    }

    fn dummy_type_id() -> TypeId {
        crate::types::TypeGraph::new().i32_
    }

    fn dummy_symbol_id() -> SymbolId {
        let mut table = crate::symbol::SymbolTable::new();
        let mut messages = crate::diagnostics::MessageList::new();
        let tok = crate::lexer::Token {
            kind: crate::lexer::TokenKind::Ident,
            image: "f".into(),
            location: crate::symbol::dummy_location("t"),
            line_snapshot: String::new(),
            numeric_value: 0,
            newline_before: false,
        };
        table
            .insert(
                crate::symbol::Symbol::Variable {
                    token: tok,
                    ty: crate::types::TypeGraph::new().i32_,
                    category: crate::symbol::Category::Function,
                    ref_count: 0,
                },
                Some(crate::types::TypeGraph::new().i32_),
                &mut messages,
            )
            .unwrap()
    }
}
