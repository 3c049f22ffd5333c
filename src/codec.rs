//! Binary encoder and decoder for instruction lists.
//!
//! Encoding builds a prefix sum from instruction indices to byte positions
//! and rewrites every jump so that the same control flow holds when `ip`
//! advances in bytes: relative jumps become byte deltas, absolute jumps
//! become byte positions. The returned map from byte position back to the
//! original instruction index survives for debuggers.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use byteorder::ByteOrder;
use num::FromPrimitive;
use util::Endian;

use crate::instruction::{Instruction, Opcode};
use crate::vm::Trap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EncodeError {
    /// An immediate does not fit its sign-magnitude field.
    ImmediateOverflow { index: usize, value: i64 },
    /// A jump points outside the program.
    BadJumpTarget { index: usize, target: i64 },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EncodeError::ImmediateOverflow { index, value } => write!(
                f,
                "immediate {} of instruction {} exceeds its encoded width",
                value, index
            ),
            EncodeError::BadJumpTarget { index, target } => write!(
                f,
                "jump at instruction {} targets {} which is outside the program",
                index, target
            ),
        }
    }
}

impl StdError for EncodeError {}

/// Map from byte position to the index of the instruction encoded there.
pub type InstructionStarts = HashMap<usize, usize>;

pub fn encode(program: &[Instruction]) -> Result<(Vec<u8>, InstructionStarts), EncodeError> {
    let mut prefix = Vec::with_capacity(program.len() + 1);
    prefix.push(0usize);
    for instruction in program {
        let last = *prefix.last().unwrap();
        prefix.push(last + instruction.encoded_len() as usize);
    }

    let mut data = Vec::with_capacity(*prefix.last().unwrap());
    let mut starts = HashMap::new();

    for (i, instruction) in program.iter().enumerate() {
        starts.insert(data.len(), i);
        let overflow = |value: i64| EncodeError::ImmediateOverflow { index: i, value };

        // Relative targets are rewritten from instruction counts into byte
        // deltas; absolute targets into byte positions.
        let byte_delta = |delta: i16| -> Result<i64, EncodeError> {
            let target = i as i64 + i64::from(delta);
            if target < 0 || target as usize >= prefix.len() {
                return Err(EncodeError::BadJumpTarget { index: i, target });
            }
            Ok(prefix[target as usize] as i64 - prefix[i] as i64)
        };

        data.push(instruction.opcode() as u8);
        match *instruction {
            Instruction::Push(value) => {
                encode_immediate(&mut data, i64::from(value), 4).map_err(overflow)?
            }
            Instruction::Pop(count) => {
                encode_immediate(&mut data, i64::from(count), 1).map_err(overflow)?
            }
            Instruction::Store(rel) | Instruction::Load(rel) => {
                encode_immediate(&mut data, i64::from(rel), 2).map_err(overflow)?
            }
            Instruction::Jump(delta) | Instruction::Jump0(delta) | Instruction::Dump(delta) => {
                encode_immediate(&mut data, byte_delta(delta)?, 2).map_err(overflow)?
            }
            Instruction::JumpA(target) => {
                if target as usize >= prefix.len() {
                    return Err(EncodeError::BadJumpTarget {
                        index: i,
                        target: i64::from(target),
                    });
                }
                encode_immediate(&mut data, prefix[target as usize] as i64, 2).map_err(overflow)?
            }
            Instruction::Alloc(size) => {
                encode_immediate(&mut data, i64::from(size), 2).map_err(overflow)?
            }
            _ => {}
        }
    }

    Ok((data, starts))
}

/// Decodes the instruction at byte position `pos` of the image.
pub fn decode_at(image: &[u8], pos: usize) -> Result<Instruction, Trap> {
    let opcode_byte = *image.get(pos).ok_or(Trap::BadJump)?;
    let opcode = Opcode::from_u8(opcode_byte).ok_or(Trap::InvalidOpcode(opcode_byte))?;

    let instruction = match opcode {
        Opcode::ADD => Instruction::Add,
        Opcode::SUB => Instruction::Sub,
        Opcode::MUL => Instruction::Mul,
        Opcode::DIV => Instruction::Div,
        Opcode::INV => Instruction::Inv,
        Opcode::LESS => Instruction::Less,
        Opcode::PUSH => Instruction::Push(decode_immediate(image, pos + 1, 4)? as i32),
        Opcode::POP => Instruction::Pop(decode_immediate(image, pos + 1, 1)? as u8),
        Opcode::STORE => Instruction::Store(decode_immediate(image, pos + 1, 2)? as i16),
        Opcode::DSTORE => Instruction::DStore,
        Opcode::LOAD => Instruction::Load(decode_immediate(image, pos + 1, 2)? as i16),
        Opcode::DLOAD => Instruction::DLoad,
        Opcode::JUMP => Instruction::Jump(decode_immediate(image, pos + 1, 2)? as i16),
        Opcode::JUMP0 => Instruction::Jump0(decode_immediate(image, pos + 1, 2)? as i16),
        Opcode::JUMPA => Instruction::JumpA(decode_immediate(image, pos + 1, 2)? as u16),
        Opcode::DUMP => Instruction::Dump(decode_immediate(image, pos + 1, 2)? as i16),
        Opcode::RETURN => Instruction::Return,
        Opcode::ALLOC => Instruction::Alloc(decode_immediate(image, pos + 1, 2)? as u16),
        Opcode::CRASH => Instruction::Crash,
        Opcode::NOOP => Instruction::Noop,
        Opcode::EXIT => Instruction::Exit,
    };
    Ok(instruction)
}

// Immediates are sign-magnitude, not two's complement: the top bit of the
// field carries the sign, the remaining bits the magnitude, bytes most
// significant first. The CPU decoder mirrors this exactly.

fn encode_immediate(data: &mut Vec<u8>, value: i64, len: usize) -> Result<(), i64> {
    let bound = 1i64 << (len * 8 - 1);
    if value.abs() >= bound {
        return Err(value);
    }
    let raw = if value < 0 {
        (-value) as u64 | bound as u64
    } else {
        value as u64
    };
    let start = data.len();
    data.resize(start + len, 0);
    Endian::write_uint(&mut data[start..], raw, len);
    Ok(())
}

fn decode_immediate(image: &[u8], pos: usize, len: usize) -> Result<i64, Trap> {
    let field = image
        .get(pos..pos + len)
        .ok_or(Trap::TruncatedImage)?;
    let raw = Endian::read_uint(field, len);
    let sign = 1u64 << (len * 8 - 1);
    Ok(if raw & sign != 0 {
        -((raw & (sign - 1)) as i64)
    } else {
        raw as i64
    })
}
