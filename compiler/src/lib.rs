//! Front-end and code generator for the toylang source language: lexer,
//! parser, type/symbol/operator tables, register allocator, assembly IR,
//! and the binary emitter that lowers that IR to `toylang_asm` wire
//! instructions.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod emit;
pub mod ir;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod regalloc;
pub mod source;
pub mod symbol;
pub mod types;

pub use codegen::Codegen;
pub use diagnostics::MessageList;
pub use emit::emit_image;
pub use parser::Parser;

/// Compile `text` all the way to a loadable image, or the accumulated
/// diagnostics if any pass failed.
pub fn compile(path: impl Into<std::rc::Rc<str>>, text: &str) -> Result<Vec<u8>, MessageList> {
    let mut parser = Parser::new(path, text);
    let program = parser.parse_program();
    let messages = parser.into_messages();
    if messages.has_errors() {
        return Err(messages);
    }

    let mut codegen = Codegen::new();
    codegen.messages = messages;
    if !codegen.compile(&program) {
        return Err(codegen.messages);
    }
    Ok(emit_image(&codegen.ir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiling_a_trivial_program_produces_a_non_empty_image() {
        let bytes = compile("t", "let x = 1 + 2").expect("should compile");
        assert!(bytes.len() > 16, "image should carry more than just its header");
    }

    #[test]
    fn a_syntax_error_surfaces_as_a_message_list() {
        let err = compile("t", "let x = ").unwrap_err();
        assert!(err.has_errors());
    }
}
