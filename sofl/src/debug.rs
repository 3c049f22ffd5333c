//! Interactive single-stepping over a translated program.
//!
//! The debugger consumes the translator's metadata: the per-instruction
//! source-line map and the allocation events. Live variables are tracked as
//! a stack: an instruction listed in the allocation map pushes a record when
//! it executes, and a record dies as soon as the observed stack pointer
//! drops below its base. Two backends share the driver: the abstract machine
//! (word spacing 1) and the board (byte addresses, word spacing 4, with the
//! instruction index recovered through the byte position map).
//!
//! Commands: an empty line steps one instruction, `l` runs to the next
//! source line, `f` runs until the program stops.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use sovm::bitnum::Num32;
use sovm::{vm, Board, ExecutionContext, Instruction};

use soflc::TranslationResult;

struct VarDebugInfo {
    name: String,
    start_sp: i64,
    size: u16,
}

impl VarDebugInfo {
    fn format<F: Fn(i64) -> i64>(&self, value_at: &F, spacing: i64) -> String {
        if self.size == 1 {
            format!("{} = {}", self.name, value_at(self.start_sp))
        } else {
            let values: Vec<String> = (0..i64::from(self.size))
                .map(|i| value_at(self.start_sp + i * spacing).to_string())
                .collect();
            format!("{} = [{}]", self.name, values.join(", "))
        }
    }
}

pub trait Backend {
    /// Distance between adjacent stack cells in `stack_value` units.
    fn spacing(&self) -> i64;
    /// Address of the current top-of-stack cell.
    fn sp(&self) -> i64;
    /// Index of the instruction about to execute.
    fn ip_index(&self) -> usize;
    fn step(&mut self) -> Result<(), String>;
    fn stack_value(&self, cell: i64) -> i64;
}

/// Steps the instruction list directly.
pub struct VmBackend {
    ec: ExecutionContext,
    program: Vec<Instruction>,
}

impl VmBackend {
    pub fn new(program: Vec<Instruction>) -> VmBackend {
        VmBackend {
            ec: ExecutionContext::new(
                sovm::constants::STACK_WORDS,
                sovm::constants::RESULT_REGION_WORDS,
                false,
            ),
            program,
        }
    }
}

impl Backend for VmBackend {
    fn spacing(&self) -> i64 {
        1
    }

    fn sp(&self) -> i64 {
        self.ec.sp as i64
    }

    fn ip_index(&self) -> usize {
        self.ec.ip
    }

    fn step(&mut self) -> Result<(), String> {
        let instruction = self
            .program
            .get(self.ec.ip)
            .copied()
            .ok_or_else(|| "instruction pointer ran off the program".to_owned())?;
        if instruction == Instruction::Exit {
            return Err("the program has reached its end".to_owned());
        }
        vm::tick(&mut self.ec, instruction).map_err(|trap| trap.to_string())
    }

    fn stack_value(&self, cell: i64) -> i64 {
        if cell < 0 || cell as usize >= self.ec.stack.len() {
            0
        } else {
            i64::from(self.ec.stack[cell as usize])
        }
    }
}

/// Steps the board one cycle at a time.
pub struct BoardBackend {
    board: Board,
    instruction_mapping: HashMap<usize, usize>,
}

impl BoardBackend {
    pub fn new(board: Board, instruction_mapping: HashMap<usize, usize>) -> BoardBackend {
        BoardBackend {
            board,
            instruction_mapping,
        }
    }
}

impl Backend for BoardBackend {
    fn spacing(&self) -> i64 {
        i64::from(sovm::constants::WORD_BYTES)
    }

    fn sp(&self) -> i64 {
        i64::from(self.board.cpu().sp().to_u32()) - self.spacing()
    }

    fn ip_index(&self) -> usize {
        let byte_pos = self.board.cpu().ip().to_u32() as usize;
        self.instruction_mapping
            .get(&byte_pos)
            .copied()
            .unwrap_or(0)
    }

    fn step(&mut self) -> Result<(), String> {
        self.board.step().map_err(|fault| fault.to_string())
    }

    fn stack_value(&self, cell: i64) -> i64 {
        if cell < 0 {
            return 0;
        }
        self.board
            .read_word(Num32::from_u32(cell as u32))
            .map(i64::from)
            .unwrap_or(0)
    }
}

pub struct Debugger<B: Backend> {
    backend: B,
    steps: u64,
    instructions: Vec<Instruction>,
    source_lines: Vec<i32>,
    allocations: HashMap<usize, (String, u16)>,
    source: Vec<String>,
    vars: Vec<VarDebugInfo>,
    cur_line: i32,
}

impl<B: Backend> Debugger<B> {
    pub fn new(backend: B, translated: TranslationResult, source_text: String) -> Debugger<B> {
        let cur_line = translated.source_lines.first().copied().unwrap_or(-1);
        Debugger {
            backend,
            steps: 0,
            instructions: translated.instructions,
            source_lines: translated.source_lines,
            allocations: translated.variable_allocations,
            source: source_text.lines().map(str::to_owned).collect(),
            vars: Vec::new(),
            cur_line,
        }
    }

    pub fn current_line(&self) -> i32 {
        self.cur_line
    }

    pub fn forward(&mut self) -> Result<(), String> {
        self.steps += 1;
        let cur_ip = self.backend.ip_index();
        self.backend.step()?;
        if let Some((name, size)) = self.allocations.get(&cur_ip) {
            let spacing = self.backend.spacing();
            self.vars.push(VarDebugInfo {
                name: name.clone(),
                start_sp: self.backend.sp() - (i64::from(*size) - 1) * spacing,
                size: *size,
            });
        }
        while self
            .vars
            .last()
            .map(|var| self.backend.sp() < var.start_sp)
            .unwrap_or(false)
        {
            self.vars.pop();
        }
        self.cur_line = self
            .source_lines
            .get(self.backend.ip_index())
            .copied()
            .unwrap_or(-1);
        Ok(())
    }

    pub fn print_state<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let spacing = self.backend.spacing();
        let stack_end = self.backend.sp() + spacing;
        let stack_start = std::cmp::max(stack_end - 40 * spacing - 1, 0);
        let backend = &self.backend;
        let value_at = move |cell: i64| backend.stack_value(cell);

        writeln!(out)?;
        let mut shown: Vec<String> = Vec::new();
        let mut cell = stack_start;
        while cell < stack_end {
            shown.push(self.backend.stack_value(cell).to_string());
            cell += spacing;
        }
        shown.reverse();
        writeln!(
            out,
            "-----------------------------------------------------------{}",
            stack_end
        )?;
        writeln!(out, "| {}", shown.join(" "))?;
        writeln!(out, "--------------------------------------------------------------")?;
        if self.cur_line >= 0 {
            if let Some(code_line) = self.source.get(self.cur_line as usize) {
                let trimmed = code_line.trim();
                writeln!(out, "{}", trimmed)?;
                writeln!(out, "{}", "-".repeat(trimmed.len()))?;
            }
        }
        for var in &self.vars {
            writeln!(out, "{}", var.format(&value_at, spacing))?;
        }
        writeln!(out)?;

        let cur_ip = self.backend.ip_index();
        let prefix = format!("{}", cur_ip + 1);
        let shift = " ".repeat(prefix.len() + 3);
        if cur_ip >= 1 {
            if let Some(instruction) = self.instructions.get(cur_ip - 1) {
                writeln!(out, "{}{}", shift, instruction)?;
            }
        }
        if let Some(instruction) = self.instructions.get(cur_ip) {
            writeln!(out, "{} > {}", prefix, instruction)?;
        }
        if let Some(instruction) = self.instructions.get(cur_ip + 1) {
            writeln!(out, "{}{}", shift, instruction)?;
        }
        writeln!(out)
    }
}

pub fn run_debugger<B: Backend, R: BufRead, W: Write>(
    debugger: &mut Debugger<B>,
    input: R,
    out: &mut W,
) -> std::io::Result<()> {
    debugger.print_state(out)?;
    for line in input.lines() {
        let line = line?;
        let outcome = match line.trim() {
            "" => debugger.forward(),
            "l" => {
                let start_line = debugger.current_line();
                let mut outcome = Ok(());
                while outcome.is_ok() && debugger.current_line() == start_line {
                    outcome = debugger.forward();
                }
                outcome
            }
            "f" => {
                let mut outcome = Ok(());
                while outcome.is_ok() {
                    outcome = debugger.forward();
                }
                outcome
            }
            _ => Ok(()),
        };
        if let Err(message) = outcome {
            writeln!(out, "Exception: {}", message)?;
            debugger.print_state(out)?;
            return Ok(());
        }
        debugger.print_state(out)?;
    }
    Ok(())
}
