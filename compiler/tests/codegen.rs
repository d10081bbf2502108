//! End-to-end tests driving the public [`toylang_compiler::compile`]
//! entry point: source text in, a loadable image (or diagnostics) out.

use toylang_asm::{Datatype, Instruction, INSTRUCTION_LEN};

/// Decode every instruction word following the 16-byte image header,
/// stopping at the first word that doesn't decode (data directives, if
/// any, live past the code and aren't expected in these small programs).
fn decode_instructions(image: &[u8]) -> Vec<Instruction> {
    let code = &image[16..];
    code.chunks_exact(INSTRUCTION_LEN)
        .map_while(|chunk| {
            let word = u64::from_le_bytes(chunk.try_into().unwrap());
            Instruction::decode(word).ok()
        })
        .collect()
}

/// Scenario 1: `func add(a: i32, b: i32) -> i32 { return a + b }` compiles
/// without errors and produces an `add` instruction with `dt=s32`.
#[test]
fn adding_two_i32_parameters_compiles_to_an_s32_add() {
    let image = toylang_compiler::compile("t", "func add(a: i32, b: i32) -> i32 { return a + b }")
        .expect("program should compile without diagnostics");
    let insns = decode_instructions(&image);
    assert!(
        insns
            .iter()
            .any(|i| matches!(i, Instruction::Add { datatype: Datatype::S32, .. })),
        "expected an s32 add among {insns:?}"
    );
}

/// Scenario 2: `func f() -> i32 {}` emits an error naming the missing
/// return's declared type.
#[test]
fn a_non_unit_function_with_no_return_is_rejected() {
    let err = toylang_compiler::compile("t", "func f() -> i32 {}").unwrap_err();
    assert!(err.has_errors());
    let rendered = err.to_string();
    assert!(
        rendered.contains("missing return statement in function returning type i32"),
        "got: {rendered}"
    );
}

/// Scenario 3: `let x = 1 + 2.0` widens `x` to `float32` via the
/// `int32 :> float32` subtype relation, and the adder is emitted with
/// `dt=flt`.
#[test]
fn mixing_an_int_literal_with_a_float_literal_widens_to_float_add() {
    let image = toylang_compiler::compile("t", "let x = 1 + 2.0").expect("program should compile");
    let insns = decode_instructions(&image);
    assert!(
        insns
            .iter()
            .any(|i| matches!(i, Instruction::Add { datatype: Datatype::Flt, .. })),
        "expected a float add among {insns:?}"
    );
}

/// A program with no functions at all is still a valid, loadable image:
/// top-level statements run, then an implicit exit syscall halts the VM.
#[test]
fn a_bare_top_level_program_still_runs_to_completion_in_the_vm() {
    let image = toylang_compiler::compile("t", "let x = 1 + 2").expect("program should compile");

    let mut output = Vec::new();
    let mut vm = toylang_vm::Vm::new(
        toylang_vm::Config::default(),
        std::io::BufReader::new(std::io::empty()),
        &mut output,
    );
    let parsed = toylang_vm::Image::parse(&image).expect("emitted image should parse");
    vm.load(&parsed).expect("image should load into dram");
    let halt = vm.run().expect("vm should not error on io");
    assert_eq!(halt, toylang_vm::Halt::Exited);
}
