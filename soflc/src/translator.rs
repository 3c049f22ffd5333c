//! Lowers the typed program to stack-machine instructions.
//!
//! Each function is translated against a symbolic stack model: a depth
//! counter starting at -1 plus a table mapping every in-scope variable to
//! its fixed base position. Reads and writes become `LOAD`/`STORE` with
//! relative offsets computed from the current depth. `main` is laid out
//! first so its entry is instruction 0; calls emit an absolute-jump
//! placeholder that a final pass patches once every function start is known.
//!
//! Frame layout at a call: caller locals, result slot, return address,
//! arguments. The callee addresses its result slot through the `result`
//! pseudo-variable at a negative offset, frees locals and arguments, and
//! `RETURN` pops the return address.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use sovm::Instruction;
use tracing::debug;

use crate::analyzer::{
    Analysis, Atom, Class, Expression, Function, Index, SpaceCalc, Statement, Target, RESULT,
};
use crate::ast::BinOp;

#[derive(Clone, Debug, PartialEq)]
pub enum TranslateError {
    MissingMain,
    UnknownClass(String),
    UnknownVariable(String),
    UnknownFunction(String),
    UnknownField { class: String, field: String },
    OffsetOverflow { function: String },
    FrameTooLarge { variable: String },
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TranslateError::MissingMain => f.write_str("program has no main function"),
            TranslateError::UnknownClass(name) => write!(f, "unknown class \"{}\"", name),
            TranslateError::UnknownVariable(name) => write!(f, "unknown variable \"{}\"", name),
            TranslateError::UnknownFunction(name) => write!(f, "unknown function \"{}\"", name),
            TranslateError::UnknownField { class, field } => {
                write!(f, "class \"{}\" has no field \"{}\"", class, field)
            }
            TranslateError::OffsetOverflow { function } => {
                write!(f, "relative offset overflow in function \"{}\"", function)
            }
            TranslateError::FrameTooLarge { variable } => {
                write!(f, "variable \"{}\" does not fit a stack frame", variable)
            }
        }
    }
}

impl StdError for TranslateError {}

/// Instruction list plus the debug metadata gathered while emitting it: the
/// source line of every instruction and, per `ALLOC`-like site, the variable
/// it materializes.
pub struct TranslationResult {
    pub instructions: Vec<Instruction>,
    pub source_lines: Vec<i32>,
    pub variable_allocations: HashMap<usize, (String, u16)>,
}

pub fn translate(analysis: &Analysis, with_debug: bool) -> Result<TranslationResult, TranslateError> {
    let functions: HashMap<&str, &Function> = analysis
        .functions
        .iter()
        .map(|func| (func.name.as_str(), func))
        .collect();
    if !functions.contains_key("main") {
        return Err(TranslateError::MissingMain);
    }

    let mut space = SpaceCalc::new(&analysis.classes);
    let mut result = TranslationResult {
        instructions: Vec::new(),
        source_lines: Vec::new(),
        variable_allocations: HashMap::new(),
    };
    let mut function_starts: HashMap<String, usize> = HashMap::new();
    let mut call_sites: Vec<(usize, String)> = Vec::new();

    function_starts.insert("main".to_owned(), 0);
    run_function(
        functions["main"],
        &functions,
        &analysis.classes,
        &mut space,
        with_debug,
        &mut result,
        &mut call_sites,
    )?;
    for func in &analysis.functions {
        if func.name == "main" {
            continue;
        }
        function_starts.insert(func.name.clone(), result.instructions.len());
        run_function(
            func,
            &functions,
            &analysis.classes,
            &mut space,
            with_debug,
            &mut result,
            &mut call_sites,
        )?;
    }

    for (index, name) in call_sites {
        let start = *function_starts
            .get(&name)
            .ok_or_else(|| TranslateError::UnknownFunction(name.clone()))?;
        if start > u16::max_value() as usize {
            return Err(TranslateError::OffsetOverflow { function: name });
        }
        result.instructions[index] = Instruction::JumpA(start as u16);
    }

    Ok(result)
}

fn run_function<'a, 'c>(
    func: &'c Function,
    functions: &'a HashMap<&'c str, &'c Function>,
    classes: &'c HashMap<String, Class>,
    space: &'a mut SpaceCalc<'c>,
    with_debug: bool,
    result: &mut TranslationResult,
    call_sites: &mut Vec<(usize, String)>,
) -> Result<(), TranslateError> {
    let shift = result.instructions.len();
    let mut translator = FunctionTranslator::new(functions, classes, space);
    translator.translate_function(func)?;
    debug!(
        function = func.name.as_str(),
        start = shift,
        instructions = translator.instructions.len(),
        "function translated"
    );
    call_sites.extend(
        translator
            .call_sites
            .into_iter()
            .map(|(index, name)| (index + shift, name)),
    );
    result.instructions.extend(translator.instructions);
    if with_debug {
        result.source_lines.extend(translator.source_lines);
        for (index, info) in translator.variable_allocations {
            result.variable_allocations.insert(index + shift, info);
        }
    }
    Ok(())
}

struct FunctionTranslator<'a, 'c> {
    instructions: Vec<Instruction>,
    call_sites: Vec<(usize, String)>,
    source_lines: Vec<i32>,
    variable_allocations: HashMap<usize, (String, u16)>,
    var_positions: HashMap<String, i32>,
    var_sizes: HashMap<String, u32>,
    var_classes: HashMap<String, String>,
    stack_pos: i32,
    cur_line: i32,
    functions: &'a HashMap<&'c str, &'c Function>,
    classes: &'c HashMap<String, Class>,
    space: &'a mut SpaceCalc<'c>,
    function_name: String,
}

impl<'a, 'c> FunctionTranslator<'a, 'c> {
    fn new(
        functions: &'a HashMap<&'c str, &'c Function>,
        classes: &'c HashMap<String, Class>,
        space: &'a mut SpaceCalc<'c>,
    ) -> FunctionTranslator<'a, 'c> {
        FunctionTranslator {
            instructions: Vec::new(),
            call_sites: Vec::new(),
            source_lines: Vec::new(),
            variable_allocations: HashMap::new(),
            var_positions: HashMap::new(),
            var_sizes: HashMap::new(),
            var_classes: HashMap::new(),
            stack_pos: -1,
            cur_line: -1,
            functions,
            classes,
            space,
            function_name: String::new(),
        }
    }

    fn translate_function(&mut self, func: &Function) -> Result<(), TranslateError> {
        self.function_name = func.name.clone();
        let result_size = self.footprint(&func.return_class, func.return_array_size)?;
        self.var_positions
            .insert(RESULT.to_owned(), -1 - result_size as i32);
        self.var_sizes.insert(RESULT.to_owned(), result_size);
        self.var_classes
            .insert(RESULT.to_owned(), func.return_class.clone());
        for param in &func.parameters {
            let space = self.footprint(&param.class_type, param.array_size)?;
            self.var_positions
                .insert(param.name.clone(), self.stack_pos + 1);
            self.var_sizes.insert(param.name.clone(), space);
            self.var_classes
                .insert(param.name.clone(), param.class_type.clone());
            self.stack_pos += space as i32;
        }
        self.parse_body(&func.body)?;
        let params: Vec<String> = func.parameters.iter().map(|p| p.name.clone()).collect();
        self.clean_stack(params)?;
        if func.name == "main" {
            self.save_instr(Instruction::Exit);
        } else {
            self.save_instr(Instruction::Return);
        }
        Ok(())
    }

    fn save_instr(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
        self.source_lines.push(self.cur_line);
    }

    fn footprint(
        &mut self,
        class_type: &str,
        array_size: Option<u32>,
    ) -> Result<u32, TranslateError> {
        self.space
            .footprint(class_type, array_size)
            .map_err(|err| TranslateError::UnknownClass(err.0))
    }

    fn rel(&self, value: i32) -> Result<i16, TranslateError> {
        use std::convert::TryInto;
        value.try_into().map_err(|_| TranslateError::OffsetOverflow {
            function: self.function_name.clone(),
        })
    }

    fn var_position(&self, name: &str) -> Result<i32, TranslateError> {
        self.var_positions
            .get(name)
            .copied()
            .ok_or_else(|| TranslateError::UnknownVariable(name.to_owned()))
    }

    fn var_size(&self, name: &str) -> Result<u32, TranslateError> {
        self.var_sizes
            .get(name)
            .copied()
            .ok_or_else(|| TranslateError::UnknownVariable(name.to_owned()))
    }

    fn var_class(&self, name: &str) -> Result<String, TranslateError> {
        self.var_classes
            .get(name)
            .cloned()
            .ok_or_else(|| TranslateError::UnknownVariable(name.to_owned()))
    }

    /// Emits the `ALLOC` for a declaration and records it for the debugger.
    fn calc_and_alloc(
        &mut self,
        name: &str,
        class_type: &str,
        array_size: Option<u32>,
    ) -> Result<u32, TranslateError> {
        use std::convert::TryInto;
        let space = self.footprint(class_type, array_size)?;
        let words: u16 = space.try_into().map_err(|_| TranslateError::FrameTooLarge {
            variable: name.to_owned(),
        })?;
        self.variable_allocations
            .insert(self.instructions.len(), (name.to_owned(), words));
        self.save_instr(Instruction::Alloc(words));
        self.stack_pos += space as i32;
        Ok(space)
    }

    /// Copies a variable's words onto the top of the stack, most significant
    /// word first so the in-stack order is preserved.
    fn load_var(&mut self, name: &str) -> Result<u32, TranslateError> {
        let size = self.var_size(name)?;
        let position = self.var_position(name)?;
        for i in 0..size as i32 {
            let rel = self.rel(self.stack_pos - position - i)?;
            self.save_instr(Instruction::Load(rel));
            self.stack_pos += 1;
        }
        Ok(size)
    }

    fn parse_atom(&mut self, atom: &Atom) -> Result<(), TranslateError> {
        match atom {
            Atom::Literal(value) => {
                self.save_instr(Instruction::Push(*value));
                self.stack_pos += 1;
            }
            Atom::Var(name) => {
                self.load_var(name)?;
            }
            Atom::Element { name, index } => {
                let element_size = {
                    let class = self.var_class(name)?;
                    self.footprint(&class, None)? as i32
                };
                match index {
                    Index::Literal(index) => {
                        let position = self.var_position(name)?;
                        for i in 0..element_size {
                            let array_start = self.stack_pos - position;
                            let rel = self.rel(array_start - index * element_size - i)?;
                            self.save_instr(Instruction::Load(rel));
                            self.stack_pos += 1;
                        }
                    }
                    Index::Var(index_name) => {
                        // The element address is materialized on the stack:
                        // start+1 minus index times element footprint, then
                        // fetched with a dynamic load.
                        let position = self.var_position(name)?;
                        for i in 0..element_size {
                            let array_start = self.stack_pos - position;
                            self.save_instr(Instruction::Push(array_start + 1 - i));
                            self.stack_pos += 1;
                            self.load_var(index_name)?;
                            self.save_instr(Instruction::Push(element_size));
                            self.stack_pos += 1;
                            self.save_instr(Instruction::Mul);
                            self.stack_pos -= 1;
                            self.save_instr(Instruction::Sub);
                            self.stack_pos -= 1;
                            self.save_instr(Instruction::DLoad);
                        }
                    }
                }
            }
            Atom::Field { name, field } => {
                let position = self.var_position(name)?;
                let class_name = self.var_class(name)?;
                let fields = self
                    .classes
                    .get(&class_name)
                    .ok_or_else(|| TranslateError::UnknownClass(class_name.clone()))?
                    .fields
                    .clone();
                let mut shift = 0i32;
                let mut found = false;
                for class_field in &fields {
                    let size =
                        self.footprint(&class_field.class_type, class_field.array_size)?;
                    if class_field.name == *field {
                        for i in 0..size as i32 {
                            let rel =
                                self.rel(self.stack_pos - position - shift - i)?;
                            self.save_instr(Instruction::Load(rel));
                            self.stack_pos += 1;
                        }
                        found = true;
                        break;
                    }
                    shift += size as i32;
                }
                if !found {
                    return Err(TranslateError::UnknownField {
                        class: class_name,
                        field: field.clone(),
                    });
                }
            }
            Atom::Call { name, args } => {
                let callee = *self
                    .functions
                    .get(name.as_str())
                    .ok_or_else(|| TranslateError::UnknownFunction(name.clone()))?;
                self.calc_and_alloc(
                    &format!("{}_res", callee.name),
                    &callee.return_class,
                    callee.return_array_size,
                )?;
                let dump_pos = self.instructions.len();
                self.save_instr(Instruction::Dump(0));
                self.stack_pos += 1;
                let mut allocated = 0i32;
                for (param, arg) in callee.parameters.iter().zip(args) {
                    let before = self.stack_pos;
                    self.parse_atom(arg)?;
                    let size = self.stack_pos - before;
                    allocated += size;
                    self.variable_allocations.insert(
                        self.instructions.len() - 1,
                        (param.name.clone(), size as u16),
                    );
                }
                self.call_sites
                    .push((self.instructions.len(), callee.name.clone()));
                self.save_instr(Instruction::JumpA(0));
                let after_jump = self.instructions.len();
                let delta = self.rel((after_jump - dump_pos) as i32)?;
                self.instructions[dump_pos] = Instruction::Dump(delta);
                // The callee frees the return address and the arguments.
                self.stack_pos -= 1 + allocated;
            }
            Atom::Construct { args, .. } => {
                // The arguments' words concatenate to the aggregate's
                // layout; no further code is needed.
                for arg in args {
                    self.parse_atom(arg)?;
                }
            }
        }
        Ok(())
    }

    fn parse_expr(&mut self, expr: &Expression) -> Result<(), TranslateError> {
        match expr {
            Expression::Atom(atom) => self.parse_atom(atom),
            Expression::Binary { left, op, right } => {
                self.parse_atom(left)?;
                self.parse_atom(right)?;
                self.save_instr(match op {
                    BinOp::Add => Instruction::Add,
                    BinOp::Sub => Instruction::Sub,
                    BinOp::Mul => Instruction::Mul,
                    BinOp::Div => Instruction::Div,
                    BinOp::Less => Instruction::Less,
                });
                self.stack_pos -= 1;
                Ok(())
            }
            Expression::Unary { inner } => {
                self.parse_atom(inner)?;
                self.save_instr(Instruction::Inv);
                Ok(())
            }
        }
    }

    fn parse_body(&mut self, body: &[Statement]) -> Result<(), TranslateError> {
        let mut local_vars: Vec<String> = Vec::new();
        for stmt in body {
            self.cur_line = match stmt {
                Statement::Declare { line, .. }
                | Statement::DeclareInit { line, .. }
                | Statement::Assign { line, .. }
                | Statement::If { line, .. }
                | Statement::While { line, .. }
                | Statement::Abort { line } => *line as i32,
            };
            match stmt {
                Statement::Assign { target, value, .. } => {
                    self.parse_expr(value)?;
                    match target {
                        Target::Var(name) => {
                            let size = self.var_size(name)? as i32;
                            let position = self.var_position(name)?;
                            for i in 0..size {
                                let rel = self
                                    .rel(self.stack_pos - position - (size - 1 - i))?;
                                self.save_instr(Instruction::Store(rel));
                                self.stack_pos -= 1;
                            }
                        }
                        Target::Element { name, index } => {
                            let element_size = {
                                let class = self.var_class(name)?;
                                self.footprint(&class, None)? as i32
                            };
                            let position = self.var_position(name)?;
                            match index {
                                Index::Literal(index) => {
                                    for i in 0..element_size {
                                        let array_start = self.stack_pos - position;
                                        let rel = self.rel(
                                            array_start
                                                - index * element_size
                                                - (element_size - 1 - i),
                                        )?;
                                        self.save_instr(Instruction::Store(rel));
                                        self.stack_pos -= 1;
                                    }
                                }
                                Index::Var(index_name) => {
                                    for i in 0..element_size {
                                        let array_start = self.stack_pos - position;
                                        self.save_instr(Instruction::Push(
                                            array_start + 1 - (element_size - 1 - i),
                                        ));
                                        self.stack_pos += 1;
                                        self.load_var(index_name)?;
                                        self.save_instr(Instruction::Push(element_size));
                                        self.stack_pos += 1;
                                        self.save_instr(Instruction::Mul);
                                        self.stack_pos -= 1;
                                        self.save_instr(Instruction::Sub);
                                        self.stack_pos -= 1;
                                        self.save_instr(Instruction::DStore);
                                        self.stack_pos -= 2;
                                    }
                                }
                            }
                        }
                    }
                }
                Statement::Declare { var, .. } => {
                    let space =
                        self.calc_and_alloc(&var.name, &var.class_type, var.array_size)?;
                    self.var_positions
                        .insert(var.name.clone(), self.stack_pos - space as i32 + 1);
                    self.var_sizes.insert(var.name.clone(), space);
                    self.var_classes
                        .insert(var.name.clone(), var.class_type.clone());
                    local_vars.push(var.name.clone());
                }
                Statement::DeclareInit { var, value, .. } => {
                    use std::convert::TryInto;
                    self.parse_expr(value)?;
                    let space = self.footprint(&var.class_type, var.array_size)?;
                    let words: u16 =
                        space.try_into().map_err(|_| TranslateError::FrameTooLarge {
                            variable: var.name.clone(),
                        })?;
                    self.var_positions
                        .insert(var.name.clone(), self.stack_pos - space as i32 + 1);
                    self.var_sizes.insert(var.name.clone(), space);
                    self.var_classes
                        .insert(var.name.clone(), var.class_type.clone());
                    self.variable_allocations
                        .insert(self.instructions.len() - 1, (var.name.clone(), words));
                    local_vars.push(var.name.clone());
                }
                Statement::If {
                    condition, body, ..
                } => {
                    self.parse_expr(condition)?;
                    let jump_pos = self.instructions.len();
                    self.save_instr(Instruction::Jump0(-1));
                    self.stack_pos -= 1;
                    self.parse_body(body)?;
                    let after_body = self.instructions.len();
                    let delta = self.rel((after_body - jump_pos) as i32)?;
                    self.instructions[jump_pos] = Instruction::Jump0(delta);
                }
                Statement::While {
                    condition, body, ..
                } => {
                    let calc_pos = self.instructions.len();
                    self.parse_expr(condition)?;
                    let jump_pos = self.instructions.len();
                    self.save_instr(Instruction::Jump0(-1));
                    self.stack_pos -= 1;
                    self.parse_body(body)?;
                    let after_body = self.instructions.len();
                    let back = self.rel(calc_pos as i32 - after_body as i32)?;
                    self.save_instr(Instruction::Jump(back));
                    let after_all = self.instructions.len();
                    let delta = self.rel((after_all - jump_pos) as i32)?;
                    self.instructions[jump_pos] = Instruction::Jump0(delta);
                }
                Statement::Abort { .. } => {
                    self.save_instr(Instruction::Crash);
                }
            }
        }

        // Locals die in reverse declaration order.
        local_vars.reverse();
        self.clean_stack(local_vars)
    }

    fn clean_stack(&mut self, vars: Vec<String>) -> Result<(), TranslateError> {
        use std::convert::TryInto;
        for name in vars {
            let size = self
                .var_sizes
                .remove(&name)
                .ok_or_else(|| TranslateError::UnknownVariable(name.clone()))?;
            self.var_classes.remove(&name);
            self.var_positions.remove(&name);
            let count: u8 = size.try_into().map_err(|_| TranslateError::FrameTooLarge {
                variable: name.clone(),
            })?;
            self.save_instr(Instruction::Pop(count));
            self.stack_pos -= size as i32;
        }
        Ok(())
    }
}
