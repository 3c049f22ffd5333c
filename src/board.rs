//! The board: a 32-bit CPU over byte-addressed RAM, executing the binary
//! encoding of the instruction set one fetch/decode/execute cycle at a time.
//! Every value the CPU touches is a [`bitnum`](crate::bitnum) bit vector and
//! every arithmetic step goes through the gate-level operations, so the
//! simulation is bit-exact with respect to the abstract machine.
//!
//! Stack cells occupy one machine word each; the stack pointer is kept in
//! byte units and moves in steps of four.

use std::error::Error as StdError;
use std::fmt;

use num::FromPrimitive;
use tracing::debug;

use crate::bitnum::{Num32, Num64, Num8};
use crate::constants;
use crate::instruction::Opcode;
use crate::memory::Memory;
use crate::Word;

/// Terminal conditions of the board. `ProgramEnd` is raised by the reserved
/// end-of-program opcode and is observed by the driver loop as normal
/// termination; everything else is a fatal trap.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    ProgramEnd,
    Crash,
    DivisionByZero,
    BadMemoryAccess,
    InvalidOpcode(u8),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Fault::ProgramEnd => f.write_str("the program has reached its end"),
            Fault::Crash => f.write_str("the program has crashed"),
            Fault::DivisionByZero => f.write_str("division by zero"),
            Fault::BadMemoryAccess => f.write_str("memory access out of range"),
            Fault::InvalidOpcode(byte) => write!(f, "invalid opcode byte {}", byte),
        }
    }
}

impl StdError for Fault {}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoadError {
    TooLarge { size: usize, capacity: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadError::TooLarge { size, capacity } => write!(
                f,
                "program of {} bytes does not fit a memory of {} bytes",
                size, capacity
            ),
        }
    }
}

impl StdError for LoadError {}

/// Register file: instruction pointer, stack pointer, six scratch registers
/// and the 64-bit instruction register.
pub struct Cpu {
    ip: Num32,
    sp: Num32,
    reg0: Num32,
    reg1: Num32,
    reg2: Num32,
    reg3: Num32,
    reg4: Num32,
    reg5: Num32,
    ir: Num64,
}

impl Default for Cpu {
    fn default() -> Cpu {
        Cpu {
            ip: Num32::ZERO,
            sp: Num32::ZERO,
            reg0: Num32::ZERO,
            reg1: Num32::ZERO,
            reg2: Num32::ZERO,
            reg3: Num32::ZERO,
            reg4: Num32::ZERO,
            reg5: Num32::ZERO,
            ir: Num64::ZERO,
        }
    }
}

impl Cpu {
    pub fn ip(&self) -> Num32 {
        self.ip
    }

    pub fn sp(&self) -> Num32 {
        self.sp
    }

    pub fn scratch(&self) -> [Num32; 6] {
        [
            self.reg0, self.reg1, self.reg2, self.reg3, self.reg4, self.reg5,
        ]
    }
}

pub struct Board {
    memory: Memory,
    cpu: Cpu,
    stack_base: Num32,
}

impl Default for Board {
    fn default() -> Board {
        Board::with_memory(constants::BOARD_MEMORY_BYTES)
    }
}

impl Board {
    pub fn with_memory(bytes: usize) -> Board {
        Board {
            memory: Memory::new(bytes),
            cpu: Cpu::default(),
            stack_base: Num32::ZERO,
        }
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn stack_base(&self) -> Num32 {
        self.stack_base
    }

    /// Copies the byte image to address 0 and places the stack pointer above
    /// the program, rounded up to a word boundary, plus the reserved result
    /// region.
    pub fn load_program(&mut self, image: &[u8]) -> Result<(), LoadError> {
        let word = constants::WORD_BYTES as usize;
        let region = (constants::BOARD_RESULT_REGION_WORDS * constants::WORD_BYTES) as usize;
        let base = image.len() + (word - image.len() % word) + region;
        if base >= self.memory.length() {
            return Err(LoadError::TooLarge {
                size: image.len(),
                capacity: self.memory.length(),
            });
        }
        for (i, byte) in image.iter().enumerate() {
            // In range by the check above.
            let _ = self
                .memory
                .write8(Num32::from_u32(i as u32), Num8::from_u8(*byte));
        }
        self.stack_base = Num32::from_u32(base as u32);
        self.cpu = Cpu::default();
        self.cpu.sp = self.stack_base;
        debug!(program_bytes = image.len(), stack_base = base, "program loaded");
        Ok(())
    }

    /// Runs until the end-of-program sentinel, returning the cycle count.
    pub fn run(&mut self) -> Result<u64, Fault> {
        let mut cycles = 0u64;
        loop {
            cycles += 1;
            match self.step() {
                Ok(()) => {}
                Err(Fault::ProgramEnd) => return Ok(cycles),
                Err(fault) => {
                    debug!(%fault, cycle = cycles, "board trapped");
                    return Err(fault);
                }
            }
        }
    }

    /// One fetch/decode/execute cycle.
    pub fn step(&mut self) -> Result<(), Fault> {
        self.fetch()?;
        self.decode();
        self.execute()
    }

    /// Reads the opcode byte at `ip` plus four immediate bytes into the
    /// instruction register.
    fn fetch(&mut self) -> Result<(), Fault> {
        self.cpu.reg0 = self.cpu.ip;
        self.read()?;
        self.cpu.reg3 = self.cpu.reg2;

        self.cpu.reg1 = Num32::ONE;
        self.add();
        self.cpu.reg0 = self.cpu.reg2;
        self.read32()?;
        self.cpu.ir = Num64::from_bytes([
            self.cpu.reg3.byte(3),
            self.cpu.reg2.byte(0),
            self.cpu.reg2.byte(1),
            self.cpu.reg2.byte(2),
            self.cpu.reg2.byte(3),
            Num8::ZERO,
            Num8::ZERO,
            Num8::ZERO,
        ]);
        Ok(())
    }

    /// Extracts the immediate field into `reg0`. Signed fields are stored
    /// sign-magnitude in the binary encoding (top bit of the field = sign)
    /// and are converted back to two's complement here, mirroring the
    /// encoder exactly.
    fn decode(&mut self) {
        let opcode = Opcode::from_u8(self.cpu.ir.byte(0).to_u8());
        match opcode {
            Some(Opcode::PUSH) => {
                let raw = Num32::from_bytes([
                    self.cpu.ir.byte(1),
                    self.cpu.ir.byte(2),
                    self.cpu.ir.byte(3),
                    self.cpu.ir.byte(4),
                ]);
                self.cpu.reg0 = decode_magnitude(raw, 0);
            }
            Some(Opcode::POP) => {
                self.cpu.reg0 =
                    Num32::from_bytes([Num8::ZERO, Num8::ZERO, Num8::ZERO, self.cpu.ir.byte(1)]);
            }
            Some(Opcode::STORE)
            | Some(Opcode::LOAD)
            | Some(Opcode::JUMP)
            | Some(Opcode::JUMP0)
            | Some(Opcode::DUMP) => {
                let raw = Num32::from_bytes([
                    Num8::ZERO,
                    Num8::ZERO,
                    self.cpu.ir.byte(1),
                    self.cpu.ir.byte(2),
                ]);
                self.cpu.reg0 = decode_magnitude(raw, 16);
            }
            Some(Opcode::JUMPA) | Some(Opcode::ALLOC) => {
                self.cpu.reg0 = Num32::from_bytes([
                    Num8::ZERO,
                    Num8::ZERO,
                    self.cpu.ir.byte(1),
                    self.cpu.ir.byte(2),
                ]);
            }
            _ => {}
        }
    }

    fn execute(&mut self) -> Result<(), Fault> {
        let opcode_byte = self.cpu.ir.byte(0).to_u8();
        let opcode = match Opcode::from_u8(opcode_byte) {
            Some(opcode) => opcode,
            None => return Err(Fault::InvalidOpcode(opcode_byte)),
        };

        match opcode {
            Opcode::ADD => {
                self.read_two_args_from_ram()?;
                self.add();
                self.push_result()?;
                self.inc_ip(Num32::ONE);
            }
            Opcode::SUB => {
                self.read_two_args_from_ram()?;
                self.sub();
                self.push_result()?;
                self.inc_ip(Num32::ONE);
            }
            Opcode::MUL => {
                self.read_two_args_from_ram()?;
                self.mul();
                self.push_result()?;
                self.inc_ip(Num32::ONE);
            }
            Opcode::DIV => {
                self.read_two_args_from_ram()?;
                self.div()?;
                self.push_result()?;
                self.inc_ip(Num32::ONE);
            }
            Opcode::LESS => {
                self.read_two_args_from_ram()?;
                self.cpu.reg2 = if self.cpu.reg0.is_less(self.cpu.reg1) {
                    Num32::ONE
                } else {
                    Num32::ZERO
                };
                self.push_result()?;
                self.inc_ip(Num32::ONE);
            }
            Opcode::INV => {
                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;
                self.cpu.reg0 = self.cpu.reg2;
                self.cpu.reg1 = if self.is_zero() {
                    Num32::ONE
                } else {
                    Num32::ZERO
                };
                self.cpu.reg0 = self.cpu.sp;
                self.write32()?;
                self.inc_sp(Num32::FOUR);
                self.inc_ip(Num32::ONE);
            }
            Opcode::PUSH => {
                self.cpu.reg1 = self.cpu.reg0;
                self.cpu.reg0 = self.cpu.sp;
                self.write32()?;
                self.inc_sp(Num32::FOUR);
                self.inc_ip(Num32::FIVE);
            }
            Opcode::POP => {
                self.cpu.reg1 = Num32::FOUR;
                self.mul();
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.sub();
                self.cpu.sp = self.cpu.reg2;
                self.inc_ip(Num32::TWO);
            }
            Opcode::STORE => {
                // Destination is measured from the stack pointer before the
                // value is popped, hence the extra word.
                self.cpu.reg1 = Num32::ONE;
                self.add();

                self.cpu.reg0 = Num32::FOUR;
                self.cpu.reg1 = self.cpu.reg2;
                self.mul();
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.sub();
                self.cpu.reg3 = self.cpu.reg2;

                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;

                self.cpu.reg0 = self.cpu.reg3;
                self.cpu.reg1 = self.cpu.reg2;
                self.write32()?;
                self.inc_ip(Num32::THREE);
            }
            Opcode::DSTORE => {
                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;

                self.cpu.reg0 = Num32::FOUR;
                self.cpu.reg1 = self.cpu.reg2;
                self.mul();
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.sub();
                self.cpu.reg3 = self.cpu.reg2;

                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;

                self.cpu.reg0 = self.cpu.reg3;
                self.cpu.reg1 = self.cpu.reg2;
                self.write32()?;
                self.inc_ip(Num32::ONE);
            }
            Opcode::LOAD => {
                self.cpu.reg1 = Num32::ONE;
                self.add();

                self.cpu.reg0 = Num32::FOUR;
                self.cpu.reg1 = self.cpu.reg2;
                self.mul();
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.sub();

                self.cpu.reg0 = self.cpu.reg2;
                self.read32()?;
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.write32()?;
                self.inc_sp(Num32::FOUR);
                self.inc_ip(Num32::THREE);
            }
            Opcode::DLOAD => {
                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;

                self.cpu.reg0 = Num32::FOUR;
                self.cpu.reg1 = self.cpu.reg2;
                self.mul();
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.sub();

                self.cpu.reg0 = self.cpu.reg2;
                self.read32()?;
                self.cpu.reg0 = self.cpu.sp;
                self.cpu.reg1 = self.cpu.reg2;
                self.write32()?;
                self.inc_sp(Num32::FOUR);
                self.inc_ip(Num32::ONE);
            }
            Opcode::JUMP => {
                self.cpu.reg1 = self.cpu.ip;
                self.add();
                self.cpu.ip = self.cpu.reg2;
            }
            Opcode::JUMP0 => {
                self.cpu.reg3 = self.cpu.reg0;
                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;
                self.cpu.reg0 = self.cpu.reg2;
                if self.is_zero() {
                    self.cpu.reg0 = self.cpu.ip;
                    self.cpu.reg1 = self.cpu.reg3;
                    self.add();
                    self.cpu.ip = self.cpu.reg2;
                } else {
                    self.inc_ip(Num32::THREE);
                }
            }
            Opcode::JUMPA => {
                self.cpu.ip = self.cpu.reg0;
            }
            Opcode::DUMP => {
                self.cpu.reg1 = self.cpu.ip;
                self.add();
                self.cpu.reg1 = self.cpu.reg2;
                self.cpu.reg0 = self.cpu.sp;
                self.write32()?;
                self.inc_sp(Num32::FOUR);
                self.inc_ip(Num32::THREE);
            }
            Opcode::RETURN => {
                self.dec_sp(Num32::FOUR);
                self.cpu.reg0 = self.cpu.sp;
                self.read32()?;
                self.cpu.ip = self.cpu.reg2;
            }
            Opcode::ALLOC => {
                loop {
                    if self.is_zero() {
                        break;
                    }
                    self.cpu.reg3 = self.cpu.reg0;
                    self.cpu.reg0 = self.cpu.sp;
                    self.cpu.reg1 = Num32::ZERO;
                    self.write32()?;
                    self.inc_sp(Num32::FOUR);
                    self.cpu.reg0 = self.cpu.reg3;
                    self.cpu.reg1 = Num32::ONE;
                    self.sub();
                    self.cpu.reg0 = self.cpu.reg2;
                }
                self.inc_ip(Num32::THREE);
            }
            Opcode::CRASH => {
                return Err(Fault::Crash);
            }
            Opcode::NOOP => {
                self.inc_ip(Num32::ONE);
            }
            Opcode::EXIT => {
                return Err(Fault::ProgramEnd);
            }
        }
        Ok(())
    }

    /// Pops the two topmost words into `reg0` (lower) and `reg1` (upper).
    fn read_two_args_from_ram(&mut self) -> Result<(), Fault> {
        self.dec_sp(Num32::FOUR);
        self.cpu.reg0 = self.cpu.sp;
        self.read32()?;
        self.cpu.reg3 = self.cpu.reg2;

        self.dec_sp(Num32::FOUR);
        self.cpu.reg0 = self.cpu.sp;
        self.read32()?;
        self.cpu.reg0 = self.cpu.reg2;
        self.cpu.reg1 = self.cpu.reg3;
        Ok(())
    }

    /// Writes `reg2` to the cell at `sp` and bumps the stack pointer.
    fn push_result(&mut self) -> Result<(), Fault> {
        self.cpu.reg0 = self.cpu.sp;
        self.cpu.reg1 = self.cpu.reg2;
        self.write32()?;
        self.inc_sp(Num32::FOUR);
        Ok(())
    }

    fn add(&mut self) {
        self.cpu.reg2 = self.cpu.reg0 + self.cpu.reg1;
    }

    fn sub(&mut self) {
        self.cpu.reg2 = self.cpu.reg0 - self.cpu.reg1;
    }

    fn mul(&mut self) {
        self.cpu.reg2 = self.cpu.reg0 * self.cpu.reg1;
    }

    fn div(&mut self) -> Result<(), Fault> {
        self.cpu.reg2 = self
            .cpu
            .reg0
            .checked_div(self.cpu.reg1)
            .ok_or(Fault::DivisionByZero)?;
        Ok(())
    }

    fn is_zero(&self) -> bool {
        self.cpu.reg0.is_zero()
    }

    fn inc_ip(&mut self, value: Num32) {
        self.cpu.reg0 = self.cpu.ip;
        self.cpu.reg1 = value;
        self.add();
        self.cpu.ip = self.cpu.reg2;
    }

    fn inc_sp(&mut self, value: Num32) {
        self.cpu.reg0 = self.cpu.sp;
        self.cpu.reg1 = value;
        self.add();
        self.cpu.sp = self.cpu.reg2;
    }

    fn dec_sp(&mut self, value: Num32) {
        self.cpu.reg0 = self.cpu.sp;
        self.cpu.reg1 = value;
        self.sub();
        self.cpu.sp = self.cpu.reg2;
    }

    fn read(&mut self) -> Result<(), Fault> {
        let byte = self
            .memory
            .read8(self.cpu.reg0)
            .map_err(|_| Fault::BadMemoryAccess)?;
        self.cpu.reg2 = Num32::from_bytes([Num8::ZERO, Num8::ZERO, Num8::ZERO, byte]);
        Ok(())
    }

    fn read32(&mut self) -> Result<(), Fault> {
        self.cpu.reg2 = self
            .memory
            .read32(self.cpu.reg0)
            .map_err(|_| Fault::BadMemoryAccess)?;
        Ok(())
    }

    fn write32(&mut self) -> Result<(), Fault> {
        self.memory
            .write32(self.cpu.reg0, self.cpu.reg1)
            .map_err(|_| Fault::BadMemoryAccess)
    }

    /// Reads one machine word; used by drivers and the debugger.
    pub fn read_word(&self, address: Num32) -> Result<Word, Fault> {
        Ok(self
            .memory
            .read32(address)
            .map_err(|_| Fault::BadMemoryAccess)?
            .to_i32())
    }

    /// The words of the reserved result region, bottom first. This is the
    /// board-side equivalent of the abstract machine's surviving stack.
    pub fn result_region(&self) -> Result<Vec<Word>, Fault> {
        let mut words = Vec::with_capacity(constants::BOARD_RESULT_REGION_WORDS as usize);
        let mut address = self.stack_base
            - Num32::from_u32(constants::BOARD_RESULT_REGION_WORDS * constants::WORD_BYTES);
        while address != self.stack_base {
            words.push(self.read_word(address)?);
            address = address + Num32::FOUR;
        }
        Ok(words)
    }

    /// The program's visible output, mirroring
    /// [`Outcome::output`](crate::vm::Outcome::output).
    pub fn output(&self) -> Result<String, Fault> {
        Ok(self
            .result_region()?
            .iter()
            .map(|&word| char::from_u32(word as u32).unwrap_or(std::char::REPLACEMENT_CHARACTER))
            .collect())
    }
}

/// Converts a sign-magnitude field whose sign bit sits at `sign_index` into
/// a two's-complement value.
fn decode_magnitude(value: Num32, sign_index: usize) -> Num32 {
    if value.bit(sign_index) {
        -value.with_bit(sign_index, false)
    } else {
        value
    }
}
