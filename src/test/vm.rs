use crate::constants::RESULT_REGION_WORDS;
use crate::instruction::Instruction;
use crate::vm::{StackVm, Trap};

const BASE: usize = RESULT_REGION_WORDS;

fn run(program: &[Instruction]) -> crate::vm::Outcome {
    StackVm::default().run(program).unwrap()
}

#[test]
fn push_and_add() {
    let outcome = run(&[
        Instruction::Push(40),
        Instruction::Push(2),
        Instruction::Add,
        Instruction::Exit,
    ]);
    assert_eq!(outcome.sp, BASE + 1);
    assert_eq!(outcome.stack[BASE + 1], 42);
    assert_eq!(outcome.steps, 4);
}

#[test]
fn store_addresses_below_the_pushed_value() {
    let outcome = run(&[
        Instruction::Push(1),
        Instruction::Push(2),
        Instruction::Push(3),
        Instruction::Store(2),
        Instruction::Exit,
    ]);
    assert_eq!(outcome.stack[BASE + 1], 3);
    assert_eq!(outcome.stack[BASE + 2], 2);
    assert_eq!(outcome.sp, BASE + 2);
}

#[test]
fn dynamic_load_fetches_through_a_stack_offset() {
    let outcome = run(&[
        Instruction::Push(11),
        Instruction::Push(22),
        Instruction::Push(2),
        Instruction::DLoad,
        Instruction::Exit,
    ]);
    assert_eq!(outcome.sp, BASE + 3);
    assert_eq!(outcome.stack[BASE + 3], 11);
}

#[test]
fn dynamic_store_writes_through_a_stack_offset() {
    let outcome = run(&[
        Instruction::Push(5),
        Instruction::Push(9),
        Instruction::Push(2),
        Instruction::DStore,
        Instruction::Exit,
    ]);
    // rel 2 against the pre-pop pointer addresses the bottom cell.
    assert_eq!(outcome.stack[BASE + 1], 9);
    assert_eq!(outcome.sp, BASE + 1);
}

#[test]
fn popped_cells_are_zeroed() {
    let outcome = run(&[
        Instruction::Push(17),
        Instruction::Pop(1),
        Instruction::Exit,
    ]);
    assert_eq!(outcome.stack[BASE + 1], 0);
    assert_eq!(outcome.sp, BASE);
}

#[test]
fn inv_is_logical_negation() {
    let outcome = run(&[
        Instruction::Push(0),
        Instruction::Inv,
        Instruction::Push(7),
        Instruction::Inv,
        Instruction::Exit,
    ]);
    assert_eq!(outcome.stack[BASE + 1], 1);
    assert_eq!(outcome.stack[BASE + 2], 0);
}

#[test]
fn less_is_signed() {
    let outcome = run(&[
        Instruction::Push(-3),
        Instruction::Push(2),
        Instruction::Less,
        Instruction::Exit,
    ]);
    assert_eq!(outcome.stack[BASE + 1], 1);
}

#[test]
fn division_truncates_towards_zero() {
    let outcome = run(&[
        Instruction::Push(-7),
        Instruction::Push(2),
        Instruction::Div,
        Instruction::Exit,
    ]);
    assert_eq!(outcome.stack[BASE + 1], -3);
}

#[test]
fn division_by_zero_traps() {
    let result = StackVm::default().run(&[
        Instruction::Push(1),
        Instruction::Push(0),
        Instruction::Div,
        Instruction::Exit,
    ]);
    assert_eq!(result.err(), Some(Trap::DivisionByZero));
}

#[test]
fn crash_traps() {
    let result = StackVm::default().run(&[Instruction::Crash]);
    assert_eq!(result.err(), Some(Trap::Crash));
}

#[test]
fn running_off_the_program_is_a_bad_jump() {
    let result = StackVm::default().run(&[Instruction::Noop]);
    assert_eq!(result.err(), Some(Trap::BadJump));
}

#[test]
fn output_interprets_words_as_code_points() {
    let outcome = run(&[
        Instruction::Push(104),
        Instruction::Push(105),
        Instruction::Exit,
    ]);
    let output = outcome.output();
    assert!(output.contains("hi"));
    assert_eq!(outcome.stack.len(), output.chars().count());
}

#[test]
fn binary_flavor_matches_list_flavor() {
    let program = crate::test::countdown_program();
    let vm = StackVm::default();
    let direct = vm.run(&program).unwrap();
    let (image, _) = crate::codec::encode(&program).unwrap();
    let binary = vm.run_binary(&image).unwrap();
    assert_eq!(direct.stack, binary.stack);
    assert_eq!(direct.steps, binary.steps);
}
