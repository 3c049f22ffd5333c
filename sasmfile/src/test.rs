use crate::*;
use sovm::{Instruction, Opcode};

#[test]
fn parses_every_mnemonic() {
    let input = "ADD\nSUB\nMUL\nDIV\nINV\nLESS\nPUSH 54\nPOP 3\nSTORE 2\nDSTORE\nLOAD 1\nDLOAD\nJUMP -4\nJUMP0 6\nJUMPA 0\nDUMP 3\nRETURN\nALLOC 5\nCRASH\nNOOP\nEXIT\n";
    let program = parse_sasm(input).unwrap();
    assert_eq!(program.len(), 21);
    assert_eq!(program[6], Instruction::Push(54));
    assert_eq!(program[12], Instruction::Jump(-4));
    assert_eq!(program[20], Instruction::Exit);
}

#[test]
fn blank_lines_and_indentation_are_ignored() {
    let input = "\n  PUSH 1\n\n\tEXIT\n\n";
    let program = parse_sasm(input).unwrap();
    assert_eq!(
        program,
        vec![Instruction::Push(1), Instruction::Exit]
    );
}

#[test]
fn lowercase_mnemonics_are_accepted() {
    let program = parse_sasm("push 7\nexit\n").unwrap();
    assert_eq!(program[0], Instruction::Push(7));
}

#[test]
fn unknown_mnemonic_is_reported_with_its_line() {
    let err = parse_sasm("NOOP\nFROB 1\n").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(matches!(err.kind, ParseErrorKind::UnknownMnemonic(_)));
}

#[test]
fn missing_immediate_is_an_error() {
    let err = parse_sasm("PUSH\n").unwrap_err();
    assert!(matches!(
        err.kind,
        ParseErrorKind::MissingImmediate(Opcode::PUSH)
    ));
}

#[test]
fn stray_immediate_is_an_error() {
    let err = parse_sasm("ADD 1\n").unwrap_err();
    assert!(matches!(
        err.kind,
        ParseErrorKind::UnexpectedImmediate(Opcode::ADD)
    ));
}

#[test]
fn write_then_parse_round_trips() {
    let program = vec![
        Instruction::Alloc(1),
        Instruction::Push(-42),
        Instruction::Store(2),
        Instruction::Jump0(3),
        Instruction::Exit,
    ];
    let mut text = Vec::new();
    write_sasm(&mut text, &program).unwrap();
    let reparsed = parse_sasm(std::str::from_utf8(&text).unwrap()).unwrap();
    assert_eq!(program, reparsed);
}
