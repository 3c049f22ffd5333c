use crate::bitnum::Num32;
use crate::board::{Board, Fault};
use crate::codec::encode;
use crate::constants::WORD_BYTES;
use crate::instruction::Instruction;

fn run_program(program: &[Instruction]) -> (Board, u64) {
    let (image, _) = encode(program).unwrap();
    let mut board = Board::default();
    board.load_program(&image).unwrap();
    let cycles = board.run().unwrap();
    (board, cycles)
}

/// Word at `offset` cells below the board's current one-past-top pointer.
fn word_below_top(board: &Board, offset: u32) -> i32 {
    let address = board.cpu().sp() - Num32::from_u32(offset * WORD_BYTES);
    board.read_word(address).unwrap()
}

#[test]
fn stack_base_is_word_aligned_above_the_program() {
    let (image, _) = encode(&[Instruction::Exit]).unwrap();
    let mut board = Board::default();
    board.load_program(&image).unwrap();
    let base = board.stack_base().to_u32();
    assert_eq!(base % WORD_BYTES, 0);
    assert!(base as usize > image.len());
    assert_eq!(board.cpu().sp(), board.stack_base());
}

#[test]
fn add_through_the_gate_level_alu() {
    let (board, _) = run_program(&[
        Instruction::Push(40),
        Instruction::Push(2),
        Instruction::Add,
        Instruction::Exit,
    ]);
    assert_eq!(word_below_top(&board, 1), 42);
}

#[test]
fn backwards_jump_with_negative_offset() {
    let (board, _) = run_program(&crate::test::countdown_program());
    assert_eq!(word_below_top(&board, 2), 15);
    assert_eq!(word_below_top(&board, 1), 0);
}

#[test]
fn call_and_return() {
    let (board, _) = run_program(&crate::test::call_program());
    assert_eq!(word_below_top(&board, 1), 14);
}

#[test]
fn end_sentinel_terminates_normally() {
    let (image, _) = encode(&[Instruction::Noop, Instruction::Exit]).unwrap();
    let mut board = Board::default();
    board.load_program(&image).unwrap();
    assert_eq!(board.run(), Ok(2));
}

#[test]
fn division_by_zero_faults() {
    let (image, _) = encode(&[
        Instruction::Push(1),
        Instruction::Push(0),
        Instruction::Div,
        Instruction::Exit,
    ])
    .unwrap();
    let mut board = Board::default();
    board.load_program(&image).unwrap();
    assert_eq!(board.run(), Err(Fault::DivisionByZero));
}

#[test]
fn crash_faults() {
    let (image, _) = encode(&[Instruction::Crash]).unwrap();
    let mut board = Board::default();
    board.load_program(&image).unwrap();
    assert_eq!(board.run(), Err(Fault::Crash));
}

#[test]
fn unmapped_opcode_faults() {
    let mut board = Board::default();
    board.load_program(&[0x01]).unwrap();
    assert_eq!(board.run(), Err(Fault::InvalidOpcode(1)));
}

#[test]
fn program_larger_than_memory_is_rejected() {
    let mut board = Board::with_memory(64);
    assert!(board.load_program(&[0u8; 64]).is_err());
}

#[test]
fn result_region_reads_back_written_words() {
    // result = 54, written two cells below the frame base, the way a main
    // function's result slot is addressed.
    let (board, _) = run_program(&[
        Instruction::Push(54),
        Instruction::Store(2),
        Instruction::Exit,
    ]);
    let region = board.result_region().unwrap();
    assert_eq!(region[region.len() - 2], 54);
    assert_eq!(region[region.len() - 1], 0);
    assert!(board.output().unwrap().contains('6'));
}
