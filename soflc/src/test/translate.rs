use sovm::{encode, Board, Instruction, Outcome, StackVm, Trap};

use crate::analyzer::analyze;
use crate::formatter::Formatter;
use crate::parser::{parse_program, ParseMode};
use crate::preprocess::resolve_templates;
use crate::translator::{translate, TranslationResult};
use crate::validator::validate;

/// Cell holding a scalar `result` of main, two below the frame base.
const RESULT_CELL: usize = 19;

fn compile(source: &str) -> TranslationResult {
    let decls = parse_program(source, ParseMode::Source).unwrap();
    let resolved = resolve_templates(decls).unwrap();
    let text = Formatter::default().format(&resolved);
    let reparsed = parse_program(&text, ParseMode::Expanded).unwrap();
    let analysis = analyze(&reparsed).unwrap();
    let errors = validate(&analysis);
    assert!(errors.is_empty(), "validation errors: {:?}", errors);
    translate(&analysis, true).unwrap()
}

fn run_main(source: &str) -> Outcome {
    let compiled = compile(source);
    StackVm::default().run(&compiled.instructions).unwrap()
}

#[test]
fn constant_result() {
    let outcome = run_main("\nNum main() {\n    result = 54\n}\n");
    assert_eq!(outcome.stack[RESULT_CELL], 54);
    assert_eq!(outcome.sp, 20);
}

#[test]
fn factorial_through_the_calling_convention() {
    let outcome = run_main(
        "\nNum factorial(Num n) {\n    result = 1\n    n ...? {\n        result = result * n\n        n = n - 1\n    }\n}\nNum main() {\n    result = factorial(5)\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 120);
    assert_eq!(outcome.sp, 20);
}

#[test]
fn array_with_variable_index() {
    let outcome = run_main(
        "\nNum main() {\n    Num*3 a\n    a[0] = 1\n    a[1] = 2\n    a[2] = 3\n    Num i\n    i = 1\n    result = a[i]\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 2);
}

#[test]
fn array_with_literal_index() {
    let outcome = run_main(
        "\nNum main() {\n    Num*3 a\n    a[2] = 30\n    result = a[2]\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 30);
}

#[test]
fn auto_local_is_cleaned_at_scope_exit() {
    let outcome = run_main("\nNum main() {\n    auto a = 2 + 3\n}\n");
    // The local is popped when the block closes; only the zeroed result
    // region remains.
    assert_eq!(outcome.sp, 20);
    assert!(outcome.stack.iter().all(|&cell| cell == 0));
}

#[test]
fn class_field_access() {
    let outcome = run_main(
        "\nPt: x#Num x y#Num\nNum main() {\n    Pt p\n    p = Pt(7, 9)\n    result = p#y\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 9);
}

#[test]
fn class_passed_to_a_function() {
    let outcome = run_main(
        "\nPt: x#Num x y#Num\nNum second(Pt p) {\n    result = p#y\n}\nNum main() {\n    Pt p\n    p = Pt(3, 41)\n    result = second(p)\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 41);
}

#[test]
fn composite_array_elements() {
    let outcome = run_main(
        "\nPt: x#Num x y#Num\nNum main() {\n    Pt*2 ps\n    Pt p\n    p = Pt(5, 6)\n    ps[1] = p\n    Num i\n    i = 1\n    auto q = ps[i]\n    result = q#y\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 6);
}

#[test]
fn division_by_zero_is_a_trap() {
    let compiled = compile(
        "\nNum main() {\n    Num a\n    a = 0\n    result = 1 / a\n}\n",
    );
    let result = StackVm::default().run(&compiled.instructions);
    assert_eq!(result.err(), Some(Trap::DivisionByZero));
}

#[test]
fn error_statement_crashes() {
    let compiled = compile("\nNum main() {\n    error\n}\n");
    let result = StackVm::default().run(&compiled.instructions);
    assert_eq!(result.err(), Some(Trap::Crash));
}

#[test]
fn conditional_skips_its_body() {
    let outcome = run_main(
        "\nNum main() {\n    Num n\n    n = 0\n    n ?? {\n        result = 1\n    }\n    ~n ?? {\n        result = 2\n    }\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 2);
}

#[test]
fn less_comparison_drives_a_loop() {
    // Counts how many doublings reach 100.
    let outcome = run_main(
        "\nNum main() {\n    Num v\n    v = 1\n    Num c\n    c = 0\n    v < 100 ...? {\n        v = v * 2\n        c = c + 1\n    }\n    result = c\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 7);
}

#[test]
fn template_function_runs_end_to_end() {
    let outcome = run_main(
        "\nNum twice<T>(<T> x) {\n    result = x + x\n}\nNum main() {\n    Num a\n    a = 21\n    result = twice<Num>(a)\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 42);
}

#[test]
fn translated_main_is_laid_out_first() {
    let compiled = compile(
        "\nNum one() {\n    result = 1\n}\nNum main() {\n    result = one()\n}\n",
    );
    // main ends with EXIT; the other function ends with RETURN.
    let exit_index = compiled
        .instructions
        .iter()
        .position(|&i| i == Instruction::Exit)
        .unwrap();
    let return_index = compiled
        .instructions
        .iter()
        .position(|&i| i == Instruction::Return)
        .unwrap();
    assert!(exit_index < return_index);
    // Every absolute jump targets the callee's entry.
    let target = exit_index + 1;
    assert!(compiled.instructions.iter().all(|i| match i {
        Instruction::JumpA(t) => *t as usize == target,
        _ => true,
    }));
}

#[test]
fn caller_stack_height_is_restored_after_return() {
    // The call leaves exactly the result slot behind: height before the
    // call plus the callee's return footprint.
    let outcome = run_main(
        "\nNum id(Num x) {\n    result = x\n}\nNum main() {\n    Num a\n    a = 9\n    Num b\n    b = id(a)\n    result = b\n}\n",
    );
    assert_eq!(outcome.stack[RESULT_CELL], 9);
    assert_eq!(outcome.sp, 20);
}

#[test]
fn emitted_jumps_are_never_zero() {
    let compiled = compile(
        "\nNum main() {\n    Num n\n    n = 3\n    n ...? {\n        n = n - 1\n    }\n    n ?? {\n        result = 1\n    }\n    result = n\n}\n",
    );
    assert!(compiled.instructions.iter().all(|i| match i {
        Instruction::Jump(delta) => *delta != 0,
        _ => true,
    }));
}

#[test]
fn binary_image_and_board_agree_with_the_vm() {
    let compiled = compile(
        "\nNum factorial(Num n) {\n    result = 1\n    n ...? {\n        result = result * n\n        n = n - 1\n    }\n}\nNum main() {\n    result = factorial(5)\n}\n",
    );
    let vm = StackVm::default();
    let direct = vm.run(&compiled.instructions).unwrap();

    let (image, starts) = encode(&compiled.instructions).unwrap();
    let binary = vm.run_binary(&image).unwrap();
    assert_eq!(direct.stack, binary.stack);

    let mut board = Board::default();
    board.load_program(&image).unwrap();
    board.run().unwrap();
    let region = board.result_region().unwrap();
    assert_eq!(region[region.len() - 2], 120);

    // Every byte position in the map points back at a real instruction.
    assert_eq!(starts.len(), compiled.instructions.len());
}

#[test]
fn debug_metadata_tracks_lines_and_allocations() {
    let source = "\nNum main() {\n    Num a\n    a = 5\n    result = a\n}\n";
    let compiled = compile(source);
    assert_eq!(compiled.source_lines.len(), compiled.instructions.len());
    // The ALLOC for `a` carries its name and footprint.
    let alloc_index = compiled
        .instructions
        .iter()
        .position(|&i| i == Instruction::Alloc(1))
        .unwrap();
    assert_eq!(
        compiled.variable_allocations.get(&alloc_index),
        Some(&("a".to_owned(), 1))
    );
    // `Num a` sits on line 2 of the formatted source.
    assert_eq!(compiled.source_lines[alloc_index], 2);
}
