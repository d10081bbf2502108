//! Recursive-descent parser with precedence climbing for expressions.
//!
//! Errors never abort the parse: a statement or expression that can't be
//! parsed becomes an `Error` node and the parser resyncs to the next
//! statement boundary, so a single typo doesn't swallow the rest of a
//! file's diagnostics.

use std::rc::Rc;

use crate::ast::{Binding, Expr, FunctionDecl, Literal, Param, Program, Stmt, TypeExpr};
use crate::diagnostics::{Location, MessageList};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::operators::{Arity, OperatorTable};
use crate::source::SourceStream;

pub struct Parser {
    lexer: Lexer,
    lookahead: Vec<Token>,
    operators: OperatorTable,
    messages: MessageList,
}

impl Parser {
    pub fn new(path: impl Into<Rc<str>>, text: &str) -> Self {
        Self {
            lexer: Lexer::new(SourceStream::new(path, text)),
            lookahead: Vec::new(),
            operators: OperatorTable::new(),
            messages: MessageList::new(),
        }
    }

    pub fn into_messages(self) -> MessageList {
        self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageList {
        &mut self.messages
    }

    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            let t = self.lexer.next_token();
            self.lookahead.push(t);
        }
    }

    fn peek(&mut self, n: usize) -> &Token {
        self.fill(n);
        &self.lookahead[n]
    }

    fn advance(&mut self) -> Token {
        self.fill(0);
        self.lookahead.remove(0)
    }

    fn at(&mut self, kind: TokenKind) -> bool {
        self.peek(0).kind == kind
    }

    fn at_op(&mut self, lexeme: &str) -> bool {
        self.peek(0).is_op(lexeme)
    }

    fn location(&mut self) -> Location {
        self.peek(0).location.clone()
    }

    /// Consume `kind` or emit an error and return a sentinel token built
    /// from the current position, so callers can keep building a partial
    /// node rather than unwinding the whole parse.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        if self.at(kind) {
            self.advance()
        } else {
            let found = self.peek(0).clone();
            self.messages.error(found.location.clone(), format!("expected {what}, found '{}'", found.image));
            found
        }
    }

    fn expect_op(&mut self, lexeme: &str) {
        if self.at_op(lexeme) {
            self.advance();
        } else {
            let found = self.peek(0).clone();
            self.messages.error(found.location, format!("expected '{lexeme}', found '{}'", found.image));
        }
    }

    /// A `;` is consumed; a newline, a closing `}`, or EOF terminates a
    /// statement implicitly and needs nothing consumed. Anything else is a
    /// missing-separator error.
    fn consume_statement_separator(&mut self) {
        if self.at(TokenKind::Semi) {
            self.advance();
            return;
        }
        let t = self.peek(0);
        if t.newline_before || t.kind == TokenKind::RBrace || t.kind == TokenKind::Eof {
            return;
        }
        let found = self.peek(0).clone();
        self.messages.error(found.location, "expected end of statement".to_owned());
    }

    /// Skip tokens until the next statement boundary, for error recovery.
    fn resync_to_statement_boundary(&mut self) {
        loop {
            let t = self.peek(0);
            if t.kind == TokenKind::Eof || t.kind == TokenKind::RBrace {
                return;
            }
            if t.kind == TokenKind::Semi {
                self.advance();
                return;
            }
            if t.newline_before {
                return;
            }
            self.advance();
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            items.push(self.parse_statement());
        }
        Program { items }
    }

    fn parse_statement(&mut self) -> Stmt {
        match self.peek(0).kind {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Let | TokenKind::Const => self.parse_declaration(),
            TokenKind::Func => self.parse_function(),
            TokenKind::Namespace => self.parse_namespace(),
            _ => {
                let expr = self.parse_expr(0);
                let stmt = Stmt::Expr(expr);
                self.consume_statement_separator();
                stmt
            }
        }
    }

    fn parse_block(&mut self) -> Stmt {
        let location = self.location();
        self.advance(); // `{`
        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            body.push(self.parse_statement());
        }
        self.expect(TokenKind::RBrace, "'}'");
        Stmt::Block { body, location }
    }

    fn parse_block_body(&mut self) -> Vec<Stmt> {
        match self.parse_block() {
            Stmt::Block { body, .. } => body,
            other => vec![other],
        }
    }

    fn parse_if(&mut self) -> Stmt {
        let location = self.location();
        self.advance(); // `if`
        let cond = self.parse_expr(0);
        let then_branch = self.parse_block_body();
        let else_branch = if self.at(TokenKind::Else) {
            self.advance();
            if self.at(TokenKind::If) {
                Some(vec![self.parse_if()])
            } else {
                Some(self.parse_block_body())
            }
        } else {
            None
        };
        Stmt::If { cond, then_branch, else_branch, location }
    }

    fn parse_return(&mut self) -> Stmt {
        let location = self.location();
        self.advance(); // `return`
        let t = self.peek(0);
        let value = if t.kind == TokenKind::Semi || t.kind == TokenKind::RBrace || t.newline_before || t.kind == TokenKind::Eof
        {
            None
        } else {
            Some(self.parse_expr(0))
        };
        self.consume_statement_separator();
        Stmt::Return { value, location }
    }

    /// `let`/`const` followed by one or more comma-separated bindings,
    /// each optionally typed and/or initialized: `let a: i32 = 1, b = 2`.
    fn parse_declaration(&mut self) -> Stmt {
        let location = self.location();
        let is_const = self.at(TokenKind::Const);
        self.advance(); // `let` or `const`

        let mut bindings = Vec::new();
        loop {
            bindings.push(self.parse_binding());
            if self.at(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.consume_statement_separator();
        Stmt::Declaration { is_const, bindings, location }
    }

    fn parse_binding(&mut self) -> Binding {
        let location = self.location();
        let name_tok = self.expect(TokenKind::Ident, "a binding name");
        let name = name_tok.image;

        let ty = if self.at(TokenKind::Colon) {
            self.advance();
            Some(self.parse_type_expr())
        } else {
            None
        };

        let init = if self.at_op("=") {
            self.advance();
            Some(self.parse_expr(0))
        } else {
            None
        };

        Binding { name, ty, init, location }
    }

    fn parse_type_expr(&mut self) -> TypeExpr {
        let location = self.location();
        let t = self.peek(0);
        let name = if t.kind.is_type_keyword() || t.kind == TokenKind::Ident {
            self.advance().image
        } else {
            let found = self.advance();
            self.messages.error(found.location.clone(), format!("expected a type, found '{}'", found.image));
            found.image
        };
        TypeExpr::Named { name, location }
    }

    fn parse_function(&mut self) -> Stmt {
        let location = self.location();
        self.advance(); // `func`

        // `func operator<op>(...)`: the `operator` keyword is lexed as a
        // plain identifier, so recognize it by spelling.
        let (name, operator) = if self.peek(0).kind == TokenKind::Ident && self.peek(0).image == "operator" {
            self.advance();
            let op_tok = self.advance();
            (format!("operator{}", op_tok.image), Some(op_tok.image))
        } else {
            let tok = self.expect(TokenKind::Ident, "a function name");
            (tok.image, None)
        };

        self.expect(TokenKind::LParen, "'('");
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            params.push(self.parse_param());
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'");

        let return_type = if self.at(TokenKind::Arrow) {
            self.advance();
            Some(self.parse_type_expr())
        } else {
            None
        };

        let body = if self.at(TokenKind::LBrace) {
            Some(self.parse_block_body())
        } else {
            self.consume_statement_separator();
            None
        };

        Stmt::Function(FunctionDecl { name, operator, params, return_type, body, location })
    }

    fn parse_param(&mut self) -> Param {
        let location = self.location();
        let name = self.expect(TokenKind::Ident, "a parameter name").image;
        self.expect(TokenKind::Colon, "':'");
        let ty = self.parse_type_expr();
        Param { name, ty, location }
    }

    fn parse_namespace(&mut self) -> Stmt {
        let location = self.location();
        self.advance(); // `namespace`
        let name = self.expect(TokenKind::Ident, "a namespace name").image;
        let body = self.parse_block_body();
        Stmt::Namespace { name, body, location }
    }

    /// Precedence-climbing expression parser. `min_precedence` is the
    /// lowest binding power an infix operator may have and still be
    /// consumed at this recursion level.
    fn parse_expr(&mut self, min_precedence: u8) -> Expr {
        let mut lhs = self.parse_unary();

        loop {
            let t = self.peek(0).clone();
            let lexeme = if t.kind == TokenKind::Op { Some(t.image.clone()) } else { None };

            if let Some(lexeme) = &lexeme {
                if let Some(info) = self.operators.builtin(lexeme, Arity::Binary) {
                    if info.precedence < min_precedence {
                        break;
                    }
                    self.advance();
                    let next_min = if info.right_associative { info.precedence } else { info.precedence + 1 };
                    let rhs = self.parse_expr(next_min);
                    let location = lhs.location().clone();
                    lhs = Expr::Binary { op: lexeme.clone(), lhs: Box::new(lhs), rhs: Box::new(rhs), location };
                    continue;
                }
            }

            if t.kind == TokenKind::Dot && OperatorTable::CALL_PRECEDENCE >= min_precedence {
                self.advance();
                let member = self.expect(TokenKind::Ident, "a member name").image;
                let location = lhs.location().clone();
                lhs = Expr::Dot { base: Box::new(lhs), member, location };
                continue;
            }

            if t.kind == TokenKind::LParen && OperatorTable::CALL_PRECEDENCE >= min_precedence {
                self.advance();
                let mut args = Vec::new();
                while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                    args.push(self.parse_expr(0));
                    if self.at(TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')'");
                let location = lhs.location().clone();
                lhs = Expr::Call { callee: Box::new(lhs), args, location };
                continue;
            }

            break;
        }

        lhs
    }

    fn parse_unary(&mut self) -> Expr {
        let t = self.peek(0).clone();
        if t.kind == TokenKind::Op && self.operators.builtin(&t.image, Arity::Unary).is_some() {
            self.advance();
            let operand = self.parse_unary();
            return Expr::Unary { op: t.image, operand: Box::new(operand), location: t.location };
        }
        self.parse_cast_or_postfix()
    }

    /// A `(type)` prefix is a cast when a type keyword or a bare identifier
    /// is immediately followed by `)`; otherwise `(` starts a parenthesized
    /// sub-expression.
    fn parse_cast_or_postfix(&mut self) -> Expr {
        if self.at(TokenKind::LParen) {
            let is_cast = {
                let t1 = self.peek(1).clone();
                let t2 = self.peek(2).clone();
                (t1.kind.is_type_keyword() || t1.kind == TokenKind::Ident) && t2.kind == TokenKind::RParen
            };
            if is_cast {
                let location = self.location();
                self.advance(); // `(`
                let ty = self.parse_type_expr();
                self.expect(TokenKind::RParen, "')'");
                let operand = self.parse_unary();
                return Expr::Cast { ty, operand: Box::new(operand), location };
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Expr {
        let t = self.peek(0).clone();
        match t.kind {
            TokenKind::IntLit => {
                self.advance();
                Expr::Literal { value: Literal::Int(t.numeric_value), location: t.location }
            }
            TokenKind::FloatLit => {
                self.advance();
                Expr::Literal { value: Literal::Float(t.numeric_value), location: t.location }
            }
            TokenKind::True => {
                self.advance();
                Expr::Literal { value: Literal::Bool(true), location: t.location }
            }
            TokenKind::False => {
                self.advance();
                Expr::Literal { value: Literal::Bool(false), location: t.location }
            }
            TokenKind::Ident => {
                self.advance();
                Expr::SymbolRef { name: t.image, location: t.location }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(0);
                self.expect(TokenKind::RParen, "')'");
                inner
            }
            _ => {
                let found = self.advance();
                self.messages.error(found.location.clone(), format!("expected an expression, found '{}'", found.image));
                self.resync_to_statement_boundary();
                Expr::Error { location: found.location }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Program, MessageList) {
        let mut p = Parser::new("t", src);
        let program = p.parse_program();
        (program, p.into_messages())
    }

    #[test]
    fn binary_expression_respects_precedence() {
        let (program, messages) = parse("1 + 2 * 3");
        assert!(!messages.has_errors());
        match &program.items[0] {
            Stmt::Expr(Expr::Binary { op, rhs, .. }) => {
                assert_eq!(op, "+");
                assert!(matches!(**rhs, Expr::Binary { .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn cast_is_distinguished_from_parenthesized_expression() {
        let (program, messages) = parse("(i32) x");
        assert!(!messages.has_errors());
        assert!(matches!(program.items[0], Stmt::Expr(Expr::Cast { .. })));
    }

    #[test]
    fn function_with_multiple_params_and_return_type_parses() {
        let (program, messages) = parse("func add(a: i32, b: i32) -> i32 { return a + b }");
        assert!(!messages.has_errors());
        match &program.items[0] {
            Stmt::Function(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params.len(), 2);
                assert!(f.body.is_some());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn operator_overload_declaration_parses() {
        let (program, messages) = parse("func operator+(a: i32, b: i32) -> i32 { return a }");
        assert!(!messages.has_errors());
        match &program.items[0] {
            Stmt::Function(f) => {
                assert_eq!(f.operator.as_deref(), Some("+"));
                assert_eq!(f.name, "operator+");
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn multi_binding_declaration_parses_each_binding() {
        let (program, messages) = parse("let a = 1, b: i32 = 2");
        assert!(!messages.has_errors());
        match &program.items[0] {
            Stmt::Declaration { bindings, .. } => assert_eq!(bindings.len(), 2),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn if_else_chain_parses() {
        let (program, messages) = parse("if x { return 1 } else if y { return 2 } else { return 3 }");
        assert!(!messages.has_errors());
        match &program.items[0] {
            Stmt::If { else_branch: Some(else_branch), .. } => {
                assert!(matches!(else_branch[0], Stmt::If { .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn member_and_call_postfix_chain() {
        let (program, messages) = parse("a.b.c(1, 2)");
        assert!(!messages.has_errors());
        match &program.items[0] {
            Stmt::Expr(Expr::Call { args, .. }) => assert_eq!(args.len(), 2),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn unparseable_token_recovers_with_an_error_node_and_a_diagnostic() {
        let (program, messages) = parse("@");
        assert!(messages.has_errors());
        assert!(matches!(program.items[0], Stmt::Expr(Expr::Error { .. })));
    }
}
