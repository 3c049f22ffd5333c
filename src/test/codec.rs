use crate::codec::{decode_at, encode};
use crate::instruction::Instruction;
use crate::vm::Trap;

fn decode_all(image: &[u8]) -> Vec<Instruction> {
    let mut result = Vec::new();
    let mut pos = 0;
    while pos < image.len() {
        let instruction = decode_at(image, pos).unwrap();
        pos += instruction.encoded_len() as usize;
        result.push(instruction);
    }
    result
}

#[test]
fn straight_line_round_trip() {
    let program = vec![
        Instruction::Push(42),
        Instruction::Push(-42),
        Instruction::Alloc(3),
        Instruction::Load(7),
        Instruction::Store(-2),
        Instruction::Add,
        Instruction::Pop(2),
        Instruction::Exit,
    ];
    let (image, starts) = encode(&program).unwrap();
    assert_eq!(decode_all(&image), program);
    assert_eq!(starts.len(), program.len());
    assert_eq!(starts[&0], 0);
    // PUSH is five bytes long.
    assert_eq!(starts[&5], 1);
}

#[test]
fn sign_magnitude_negative_push() {
    let (image, _) = encode(&[Instruction::Push(-5)]).unwrap();
    assert_eq!(image, vec![53, 0x80, 0x00, 0x00, 0x05]);
    assert_eq!(decode_at(&image, 0).unwrap(), Instruction::Push(-5));
}

#[test]
fn sign_magnitude_negative_jump_offset() {
    // NOOP, NOOP, JUMP -2: the rewritten delta is -2 bytes.
    let program = vec![Instruction::Noop, Instruction::Noop, Instruction::Jump(-2)];
    let (image, _) = encode(&program).unwrap();
    assert_eq!(image, vec![66, 66, 59, 0x80, 0x02]);
    assert_eq!(decode_at(&image, 2).unwrap(), Instruction::Jump(-2));
}

#[test]
fn jump_offsets_are_rewritten_to_byte_deltas() {
    // PUSH (5 bytes), JUMP0 +2 over ALLOC (3 bytes), EXIT.
    let program = vec![
        Instruction::Push(1),
        Instruction::Jump0(2),
        Instruction::Alloc(1),
        Instruction::Exit,
    ];
    let (image, starts) = encode(&program).unwrap();
    assert_eq!(decode_at(&image, 5).unwrap(), Instruction::Jump0(6));
    assert_eq!(starts[&8], 2);
    assert_eq!(starts[&11], 3);
}

#[test]
fn absolute_jumps_become_byte_positions() {
    let program = vec![
        Instruction::Dump(2),
        Instruction::JumpA(3),
        Instruction::Exit,
        Instruction::Return,
    ];
    let (image, _) = encode(&program).unwrap();
    // DUMP's delta covers DUMP (3 bytes) and JUMPA (3 bytes).
    assert_eq!(decode_at(&image, 0).unwrap(), Instruction::Dump(6));
    // JUMPA targets the byte position of instruction 3.
    assert_eq!(decode_at(&image, 3).unwrap(), Instruction::JumpA(7));
}

#[test]
fn oversized_immediate_is_rejected() {
    let program = vec![Instruction::Pop(200)];
    assert!(encode(&program).is_err());
}

#[test]
fn invalid_opcode_byte() {
    assert_eq!(decode_at(&[0x00], 0), Err(Trap::InvalidOpcode(0)));
}

#[test]
fn truncated_immediate() {
    assert_eq!(decode_at(&[53, 0x00], 0), Err(Trap::TruncatedImage));
}
