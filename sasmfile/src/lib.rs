//! File formats of the toolchain's intermediate artifacts.
//!
//! A `.sasm` file holds one instruction per line: the uppercase mnemonic
//! followed by its integer immediate, if the opcode carries one. Blank lines
//! are ignored. A `.bsasm` file is the raw binary image produced by
//! [`sovm::codec::encode`].

use std::error::Error as StdError;
use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use sovm::{Instruction, Opcode};
use util::ParseEnumError;

#[derive(Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    UnknownMnemonic(ParseEnumError),
    MissingImmediate(Opcode),
    UnexpectedImmediate(Opcode),
    BadImmediate(std::num::ParseIntError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            ParseErrorKind::UnknownMnemonic(err) => write!(f, "{}", err),
            ParseErrorKind::MissingImmediate(opcode) => {
                write!(f, "{} expects an immediate", opcode)
            }
            ParseErrorKind::UnexpectedImmediate(opcode) => {
                write!(f, "{} takes no immediate", opcode)
            }
            ParseErrorKind::BadImmediate(err) => write!(f, "bad immediate: {}", err),
        }
    }
}

impl StdError for ParseError {}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Parse(ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::Parse(err) => write!(f, "{}", err),
        }
    }
}

impl StdError for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

/// Parses textual assembly. Line numbers in errors are one-based.
pub fn parse_sasm(input: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut result = Vec::new();
    for (index, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        result.push(parse_line(line).map_err(|kind| ParseError {
            line: index + 1,
            kind,
        })?);
    }
    Ok(result)
}

fn parse_line(line: &str) -> Result<Instruction, ParseErrorKind> {
    let mut parts = line.split_whitespace();
    let mnemonic = parts.next().unwrap();
    let opcode: Opcode = mnemonic
        .to_uppercase()
        .parse()
        .map_err(ParseErrorKind::UnknownMnemonic)?;

    let mut immediate = |opcode: Opcode| -> Result<&str, ParseErrorKind> {
        parts
            .next()
            .ok_or(ParseErrorKind::MissingImmediate(opcode))
    };

    let instruction = match opcode {
        Opcode::ADD => Instruction::Add,
        Opcode::SUB => Instruction::Sub,
        Opcode::MUL => Instruction::Mul,
        Opcode::DIV => Instruction::Div,
        Opcode::INV => Instruction::Inv,
        Opcode::LESS => Instruction::Less,
        Opcode::PUSH => Instruction::Push(parse_int(immediate(opcode)?)?),
        Opcode::POP => Instruction::Pop(parse_int(immediate(opcode)?)?),
        Opcode::STORE => Instruction::Store(parse_int(immediate(opcode)?)?),
        Opcode::DSTORE => Instruction::DStore,
        Opcode::LOAD => Instruction::Load(parse_int(immediate(opcode)?)?),
        Opcode::DLOAD => Instruction::DLoad,
        Opcode::JUMP => Instruction::Jump(parse_int(immediate(opcode)?)?),
        Opcode::JUMP0 => Instruction::Jump0(parse_int(immediate(opcode)?)?),
        Opcode::JUMPA => Instruction::JumpA(parse_int(immediate(opcode)?)?),
        Opcode::DUMP => Instruction::Dump(parse_int(immediate(opcode)?)?),
        Opcode::RETURN => Instruction::Return,
        Opcode::ALLOC => Instruction::Alloc(parse_int(immediate(opcode)?)?),
        Opcode::CRASH => Instruction::Crash,
        Opcode::NOOP => Instruction::Noop,
        Opcode::EXIT => Instruction::Exit,
    };

    match parts.next() {
        Some(_) => Err(ParseErrorKind::UnexpectedImmediate(opcode)),
        None => Ok(instruction),
    }
}

fn parse_int<T: std::str::FromStr<Err = std::num::ParseIntError>>(
    text: &str,
) -> Result<T, ParseErrorKind> {
    text.parse().map_err(ParseErrorKind::BadImmediate)
}

pub fn write_sasm<W: Write>(writer: &mut W, program: &[Instruction]) -> std::io::Result<()> {
    for instruction in program {
        writeln!(writer, "{}", instruction)?;
    }
    Ok(())
}

pub trait ReadSasmExt: Read + Sized {
    fn read_sasm(&mut self) -> Result<Vec<Instruction>, Error> {
        let mut text = String::new();
        self.read_to_string(&mut text)?;
        Ok(parse_sasm(&text)?)
    }
}

impl<R: Read + Sized> ReadSasmExt for R {}

pub trait WriteSasmExt: Write + Sized {
    fn write_sasm(&mut self, program: &[Instruction]) -> std::io::Result<()> {
        write_sasm(self, program)
    }
}

impl<W: Write + Sized> WriteSasmExt for W {}

pub fn read_sasm_file<P: AsRef<Path>>(path: P) -> Result<Vec<Instruction>, Error> {
    BufReader::new(File::open(path)?).read_sasm()
}

pub fn write_sasm_file<P: AsRef<Path>>(path: P, program: &[Instruction]) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_sasm(program)
}

pub fn read_bsasm_file<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<u8>> {
    let mut image = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut image)?;
    Ok(image)
}

pub fn write_bsasm_file<P: AsRef<Path>>(path: P, image: &[u8]) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_all(image)
}

#[cfg(test)]
mod test;
