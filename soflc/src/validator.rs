//! Static checks over the typed program. Errors are accumulated and
//! reported together; translation only runs on a clean report.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use crate::analyzer::{
    Analysis, Atom, Expression, Function, Index, SpaceCalc, Statement, Target, NUM, RESULT,
};

type VarType = (String, Option<u32>);

fn type_name(ty: &VarType) -> String {
    match ty.1 {
        Some(size) => format!("{}*{}", ty.0, size),
        None => ty.0.clone(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisError {
    UndefinedVariable {
        name: String,
        context: String,
    },
    UndefinedFunction {
        name: String,
        context: String,
    },
    UndefinedClass {
        name: String,
        context: String,
    },
    UnknownField {
        class: String,
        field: String,
        context: String,
    },
    TypeMismatch {
        expected: String,
        actual: String,
        context: String,
    },
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },
    ConstructorArity {
        class: String,
        expected_words: u32,
        actual_words: u32,
    },
    ReservedResult {
        function: String,
    },
    IndexOnNonArray {
        name: String,
        context: String,
    },
    NegativeIndex {
        name: String,
        context: String,
    },
    NonScalarIndex {
        name: String,
        context: String,
    },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalysisError::UndefinedVariable { name, context } => {
                write!(f, "Undefined variable: {} ({})", name, context)
            }
            AnalysisError::UndefinedFunction { name, context } => {
                write!(f, "Undefined function: {} ({})", name, context)
            }
            AnalysisError::UndefinedClass { name, context } => {
                write!(f, "Undefined class: {} ({})", name, context)
            }
            AnalysisError::UnknownField {
                class,
                field,
                context,
            } => write!(f, "Class {} has no field {} ({})", class, field, context),
            AnalysisError::TypeMismatch {
                expected,
                actual,
                context,
            } => write!(
                f,
                "Type mismatch: expected {}, got {} ({})",
                expected, actual, context
            ),
            AnalysisError::ArgumentCount {
                function,
                expected,
                actual,
            } => write!(
                f,
                "Function {} expects {} arguments, got {}",
                function, expected, actual
            ),
            AnalysisError::ConstructorArity {
                class,
                expected_words,
                actual_words,
            } => write!(
                f,
                "Constructor of {} needs {} words, arguments provide {}",
                class, expected_words, actual_words
            ),
            AnalysisError::ReservedResult { function } => write!(
                f,
                "variable '{}' cannot be declared in function {}",
                RESULT, function
            ),
            AnalysisError::IndexOnNonArray { name, context } => {
                write!(f, "array operation on non-array variable {} ({})", name, context)
            }
            AnalysisError::NegativeIndex { name, context } => {
                write!(f, "array index must be non-negative for {} ({})", name, context)
            }
            AnalysisError::NonScalarIndex { name, context } => {
                write!(f, "array index must be a scalar for {} ({})", name, context)
            }
        }
    }
}

impl StdError for AnalysisError {}

pub fn validate(analysis: &Analysis) -> Vec<AnalysisError> {
    let functions: HashMap<&str, &Function> = analysis
        .functions
        .iter()
        .map(|func| (func.name.as_str(), func))
        .collect();
    let mut validator = Validator {
        functions,
        space: SpaceCalc::new(&analysis.classes),
        analysis,
        errors: Vec::new(),
    };
    for func in &analysis.functions {
        validator.check_function(func);
    }
    validator.errors
}

struct Validator<'a> {
    functions: HashMap<&'a str, &'a Function>,
    space: SpaceCalc<'a>,
    analysis: &'a Analysis,
    errors: Vec<AnalysisError>,
}

impl<'a> Validator<'a> {
    fn check_function(&mut self, func: &Function) {
        let mut scope: HashMap<String, VarType> = HashMap::new();
        scope.insert(
            RESULT.to_owned(),
            (func.return_class.clone(), func.return_array_size),
        );
        let context = format!("in function {}", func.name);
        self.check_known_class(&func.return_class, &context);
        for param in &func.parameters {
            self.check_known_class(&param.class_type, &context);
            scope.insert(
                param.name.clone(),
                (param.class_type.clone(), param.array_size),
            );
        }
        self.check_statements(&func.body, &mut scope, func);
    }

    fn check_known_class(&mut self, class_type: &str, context: &str) {
        if self.space.footprint(class_type, None).is_err() {
            self.errors.push(AnalysisError::UndefinedClass {
                name: class_type.to_owned(),
                context: context.to_owned(),
            });
        }
    }

    fn check_statements(
        &mut self,
        body: &[Statement],
        scope: &mut HashMap<String, VarType>,
        func: &Function,
    ) {
        let context = format!("in function {}", func.name);
        for stmt in body {
            match stmt {
                Statement::Declare { var, .. } => {
                    if var.name == RESULT {
                        self.errors.push(AnalysisError::ReservedResult {
                            function: func.name.clone(),
                        });
                    } else {
                        self.check_known_class(&var.class_type, &context);
                        scope.insert(var.name.clone(), (var.class_type.clone(), var.array_size));
                    }
                }
                Statement::DeclareInit { var, value, .. } => {
                    if var.name == RESULT {
                        self.errors.push(AnalysisError::ReservedResult {
                            function: func.name.clone(),
                        });
                        continue;
                    }
                    self.check_known_class(&var.class_type, &context);
                    let var_type = (var.class_type.clone(), var.array_size);
                    if let Some(actual) = self.expr_type(value, scope, func) {
                        if actual != var_type {
                            self.errors.push(AnalysisError::TypeMismatch {
                                expected: type_name(&var_type),
                                actual: type_name(&actual),
                                context: format!(
                                    "initializer of {} in function {}",
                                    var.name, func.name
                                ),
                            });
                        }
                    }
                    scope.insert(var.name.clone(), var_type);
                }
                Statement::Assign { target, value, .. } => {
                    self.check_assignment(target, value, scope, func);
                }
                Statement::If {
                    condition, body, ..
                }
                | Statement::While {
                    condition, body, ..
                } => {
                    if let Some(cond_type) = self.expr_type(condition, scope, func) {
                        if cond_type != (NUM.to_owned(), None) {
                            self.errors.push(AnalysisError::TypeMismatch {
                                expected: NUM.to_owned(),
                                actual: type_name(&cond_type),
                                context: format!("condition in function {}", func.name),
                            });
                        }
                    }
                    let mut inner_scope = scope.clone();
                    self.check_statements(body, &mut inner_scope, func);
                }
                Statement::Abort { .. } => {}
            }
        }
    }

    fn check_assignment(
        &mut self,
        target: &Target,
        value: &Expression,
        scope: &HashMap<String, VarType>,
        func: &Function,
    ) {
        let value_type = self.expr_type(value, scope, func);
        match target {
            Target::Var(name) => {
                let var_type = match scope.get(name) {
                    Some(ty) => ty.clone(),
                    None => {
                        self.errors.push(AnalysisError::UndefinedVariable {
                            name: name.clone(),
                            context: format!("in function {}", func.name),
                        });
                        return;
                    }
                };
                if let Some(actual) = value_type {
                    if actual != var_type {
                        self.errors.push(AnalysisError::TypeMismatch {
                            expected: type_name(&var_type),
                            actual: type_name(&actual),
                            context: format!("assignment to {} in function {}", name, func.name),
                        });
                    }
                }
            }
            Target::Element { name, index } => {
                let var_type = match scope.get(name) {
                    Some(ty) => ty.clone(),
                    None => {
                        self.errors.push(AnalysisError::UndefinedVariable {
                            name: name.clone(),
                            context: format!("in function {}", func.name),
                        });
                        return;
                    }
                };
                if var_type.1.is_none() {
                    self.errors.push(AnalysisError::IndexOnNonArray {
                        name: name.clone(),
                        context: format!("in function {}", func.name),
                    });
                    return;
                }
                self.check_index(index, name, scope, func);
                let element_type = (var_type.0, None);
                if let Some(actual) = value_type {
                    if actual != element_type {
                        self.errors.push(AnalysisError::TypeMismatch {
                            expected: type_name(&element_type),
                            actual: type_name(&actual),
                            context: format!(
                                "element assignment to {} in function {}",
                                name, func.name
                            ),
                        });
                    }
                }
            }
        }
    }

    fn check_index(
        &mut self,
        index: &Index,
        name: &str,
        scope: &HashMap<String, VarType>,
        func: &Function,
    ) {
        match index {
            Index::Literal(value) => {
                if *value < 0 {
                    self.errors.push(AnalysisError::NegativeIndex {
                        name: name.to_owned(),
                        context: format!("in function {}", func.name),
                    });
                }
            }
            Index::Var(index_name) => match scope.get(index_name) {
                None => self.errors.push(AnalysisError::UndefinedVariable {
                    name: index_name.clone(),
                    context: format!("as array index for {} in function {}", name, func.name),
                }),
                Some(ty) => {
                    if *ty != (NUM.to_owned(), None) {
                        self.errors.push(AnalysisError::NonScalarIndex {
                            name: name.to_owned(),
                            context: format!("in function {}", func.name),
                        });
                    }
                }
            },
        }
    }

    fn expr_type(
        &mut self,
        expr: &Expression,
        scope: &HashMap<String, VarType>,
        func: &Function,
    ) -> Option<VarType> {
        match expr {
            Expression::Binary { left, op, right } => {
                self.check_scalar_operand(left, scope, func, &format!("operand of {}", op));
                self.check_scalar_operand(right, scope, func, &format!("operand of {}", op));
                Some((NUM.to_owned(), None))
            }
            Expression::Unary { inner } => {
                self.check_scalar_operand(inner, scope, func, "operand of ~");
                Some((NUM.to_owned(), None))
            }
            Expression::Atom(atom) => self.atom_type(atom, scope, func),
        }
    }

    fn check_scalar_operand(
        &mut self,
        atom: &Atom,
        scope: &HashMap<String, VarType>,
        func: &Function,
        what: &str,
    ) {
        if let Some(ty) = self.atom_type(atom, scope, func) {
            if ty != (NUM.to_owned(), None) {
                self.errors.push(AnalysisError::TypeMismatch {
                    expected: NUM.to_owned(),
                    actual: type_name(&ty),
                    context: format!("{} in function {}", what, func.name),
                });
            }
        }
    }

    fn atom_type(
        &mut self,
        atom: &Atom,
        scope: &HashMap<String, VarType>,
        func: &Function,
    ) -> Option<VarType> {
        match atom {
            Atom::Literal(_) => Some((NUM.to_owned(), None)),
            Atom::Var(name) => match scope.get(name) {
                Some(ty) => Some(ty.clone()),
                None => {
                    self.errors.push(AnalysisError::UndefinedVariable {
                        name: name.clone(),
                        context: format!("in function {}", func.name),
                    });
                    None
                }
            },
            Atom::Element { name, index } => {
                let var_type = match scope.get(name) {
                    Some(ty) => ty.clone(),
                    None => {
                        self.errors.push(AnalysisError::UndefinedVariable {
                            name: name.clone(),
                            context: format!("in function {}", func.name),
                        });
                        return None;
                    }
                };
                if var_type.1.is_none() {
                    self.errors.push(AnalysisError::IndexOnNonArray {
                        name: name.clone(),
                        context: format!("in function {}", func.name),
                    });
                    return None;
                }
                self.check_index(index, name, scope, func);
                Some((var_type.0, None))
            }
            Atom::Field { name, field } => {
                let var_type = match scope.get(name) {
                    Some(ty) => ty.clone(),
                    None => {
                        self.errors.push(AnalysisError::UndefinedVariable {
                            name: name.clone(),
                            context: format!("in function {}", func.name),
                        });
                        return None;
                    }
                };
                let class = self.analysis.classes.get(&var_type.0)?;
                match class.fields.iter().find(|f| &f.name == field) {
                    Some(field) => Some((field.class_type.clone(), field.array_size)),
                    None => {
                        self.errors.push(AnalysisError::UnknownField {
                            class: var_type.0,
                            field: field.clone(),
                            context: format!("in function {}", func.name),
                        });
                        None
                    }
                }
            }
            Atom::Call { name, args } => {
                let callee = match self.functions.get(name.as_str()) {
                    Some(callee) => *callee,
                    None => {
                        self.errors.push(AnalysisError::UndefinedFunction {
                            name: name.clone(),
                            context: format!("in function {}", func.name),
                        });
                        return None;
                    }
                };
                if args.len() != callee.parameters.len() {
                    self.errors.push(AnalysisError::ArgumentCount {
                        function: name.clone(),
                        expected: callee.parameters.len(),
                        actual: args.len(),
                    });
                }
                for (param, arg) in callee.parameters.iter().zip(args) {
                    if let Some(actual) = self.atom_type(arg, scope, func) {
                        let expected = (param.class_type.clone(), param.array_size);
                        if actual != expected {
                            self.errors.push(AnalysisError::TypeMismatch {
                                expected: type_name(&expected),
                                actual: type_name(&actual),
                                context: format!(
                                    "argument {} of {} in function {}",
                                    param.name, name, func.name
                                ),
                            });
                        }
                    }
                }
                Some((callee.return_class.clone(), callee.return_array_size))
            }
            Atom::Construct { class, args } => {
                let expected_words = match self.space.footprint(class, None) {
                    Ok(words) => words,
                    Err(_) => {
                        self.errors.push(AnalysisError::UndefinedClass {
                            name: class.clone(),
                            context: format!("in function {}", func.name),
                        });
                        return None;
                    }
                };
                let mut actual_words = 0;
                for arg in args {
                    if let Some(ty) = self.atom_type(arg, scope, func) {
                        if let Ok(words) = self.space.footprint(&ty.0, ty.1) {
                            actual_words += words;
                        }
                    }
                }
                if actual_words != expected_words {
                    self.errors.push(AnalysisError::ConstructorArity {
                        class: class.clone(),
                        expected_words,
                        actual_words,
                    });
                }
                Some((class.clone(), None))
            }
        }
    }
}
