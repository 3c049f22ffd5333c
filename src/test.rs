use super::*;

mod board;
mod codec;
mod vm;

use crate::bitnum::Num32;
use crate::constants::{RESULT_REGION_WORDS, WORD_BYTES};

/// Sums 5 + 4 + 3 + 2 + 1 into an accumulator cell with a backwards jump.
pub fn countdown_program() -> Vec<Instruction> {
    vec![
        Instruction::Push(0),
        Instruction::Push(5),
        Instruction::Load(0),
        Instruction::Jump0(10),
        Instruction::Load(0),
        Instruction::Load(2),
        Instruction::Add,
        Instruction::Store(2),
        Instruction::Load(0),
        Instruction::Push(1),
        Instruction::Sub,
        Instruction::Store(1),
        Instruction::Jump(-10),
        Instruction::Exit,
    ]
}

/// Calls a doubling routine through the full DUMP/JUMPA/RETURN convention.
pub fn call_program() -> Vec<Instruction> {
    vec![
        Instruction::Alloc(1),
        Instruction::Dump(3),
        Instruction::Push(7),
        Instruction::JumpA(6),
        Instruction::Noop,
        Instruction::Exit,
        Instruction::Load(0),
        Instruction::Load(1),
        Instruction::Add,
        Instruction::Store(3),
        Instruction::Pop(1),
        Instruction::Return,
    ]
}

/// Runs the program on the list interpreter, the binary interpreter and the
/// board, and checks that the surviving stacks agree cell for cell.
fn assert_execution_equivalence(program: &[Instruction]) -> Outcome {
    let vm = StackVm::default();
    let direct = vm.run(program).unwrap();

    let (image, _) = encode(program).unwrap();
    let binary = vm.run_binary(&image).unwrap();
    assert_eq!(direct.stack, binary.stack);
    assert_eq!(direct.sp, binary.sp);

    let mut board = Board::default();
    board.load_program(&image).unwrap();
    board.run().unwrap();

    // Abstract cell c and the board word at stack_base + 4 * (c - 21) hold
    // the same frame slot; the board's one-past-top pointer must land
    // accordingly.
    let base = i64::from(board.stack_base().to_u32());
    let cell_address = |c: i64| base + i64::from(WORD_BYTES) * (c - RESULT_REGION_WORDS as i64 - 1);
    assert_eq!(
        i64::from(board.cpu().sp().to_u32()),
        cell_address(direct.sp as i64 + 1)
    );
    for c in 0..=direct.sp {
        let address = cell_address(c as i64);
        if address < 0 {
            continue;
        }
        let board_cell = board.read_word(Num32::from_u32(address as u32)).unwrap();
        assert_eq!(direct.stack[c], board_cell, "stacks diverge at cell {}", c);
    }

    direct
}

#[test]
fn countdown_equivalence() {
    let outcome = assert_execution_equivalence(&countdown_program());
    assert_eq!(outcome.stack[RESULT_REGION_WORDS + 1], 15);
    assert_eq!(outcome.sp, RESULT_REGION_WORDS + 2);
}

#[test]
fn call_convention_equivalence() {
    let outcome = assert_execution_equivalence(&call_program());
    assert_eq!(outcome.stack[RESULT_REGION_WORDS + 1], 14);
    assert_eq!(outcome.sp, RESULT_REGION_WORDS + 1);
}
