//! Stack-machine core for the S-Lang toolchain.
//!
//! This crate defines the closed instruction set together with its two
//! execution models: [`vm::StackVm`] interprets instruction lists (or binary
//! images) directly, while [`board::Board`] simulates a small 32-bit CPU that
//! fetches, decodes and executes the binary-encoded program out of a
//! byte-addressed memory. All board arithmetic is built gate by gate on the
//! fixed-width bit vectors in [`bitnum`], so the simulation is bit-exact.
//!
//! [`codec`] bridges the two models: it lays the instruction list out as
//! bytes, rewrites symbolic jump offsets into byte offsets and keeps a map
//! back from byte positions to instruction indices for debuggers.

pub mod bitnum;
pub mod board;
pub mod codec;
pub mod constants;
pub mod instruction;
pub mod memory;
pub mod vm;

pub use crate::board::{Board, Fault};
pub use crate::codec::{decode_at, encode, EncodeError};
pub use crate::instruction::{Instruction, Opcode};
pub use crate::vm::{ExecutionContext, Outcome, StackVm, Trap};

/// A single operand-stack cell.
pub type Word = i32;
/// Relative offsets and block sizes carried by instructions.
pub type Immediate = i16;

#[cfg(test)]
mod test;
