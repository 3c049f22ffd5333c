//! Turns the expanded syntax tree into the typed program the validator and
//! translator consume. Functions, classes and typed statements are built
//! once here and never mutated afterwards.
//!
//! Types are a class name plus an optional fixed array count. `Num` is the
//! built-in scalar class of footprint one; every other class is an ordered
//! sequence of named fields laid out by concatenation.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use crate::ast::{self, BinOp};

pub const NUM: &str = "Num";
pub const RESULT: &str = "result";

#[derive(Clone, Debug, PartialEq)]
pub struct Class {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub class_type: String,
    pub array_size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub class_type: String,
    pub array_size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub return_class: String,
    pub return_array_size: Option<u32>,
    pub parameters: Vec<Variable>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Declare {
        var: Variable,
        line: usize,
    },
    DeclareInit {
        var: Variable,
        value: Expression,
        line: usize,
    },
    Assign {
        target: Target,
        value: Expression,
        line: usize,
    },
    If {
        condition: Expression,
        body: Vec<Statement>,
        line: usize,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        line: usize,
    },
    Abort {
        line: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Var(String),
    Element { name: String, index: Index },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Index {
    Literal(i32),
    Var(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Atom(Atom),
    Binary { left: Atom, op: BinOp, right: Atom },
    Unary { inner: Atom },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Literal(i32),
    Var(String),
    Element { name: String, index: Index },
    Field { name: String, field: String },
    Call { name: String, args: Vec<Atom> },
    Construct { class: String, args: Vec<Atom> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub functions: Vec<Function>,
    pub classes: HashMap<String, Class>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnalyzeError {
    UnresolvedPlaceholder(String),
    UnresolvedTemplate(String),
    AutoInference { variable: String, function: String },
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalyzeError::UnresolvedPlaceholder(name) => {
                write!(f, "placeholder \"{}\" survived template expansion", name)
            }
            AnalyzeError::UnresolvedTemplate(name) => {
                write!(f, "template reference \"{}\" survived expansion", name)
            }
            AnalyzeError::AutoInference { variable, function } => write!(
                f,
                "cannot infer a type for \"auto {}\" in function {}",
                variable, function
            ),
        }
    }
}

impl StdError for AnalyzeError {}

pub fn analyze(decls: &[ast::Decl]) -> Result<Analysis, AnalyzeError> {
    let mut classes = HashMap::new();
    for decl in decls {
        if let ast::Decl::Class(class) = decl {
            let mut fields = Vec::new();
            for field in &class.fields {
                let (class_type, array_size) = concrete_type(&field.ty)?;
                fields.push(Field {
                    name: field.name.clone(),
                    class_type,
                    array_size,
                });
            }
            classes.insert(
                class.name.clone(),
                Class {
                    name: class.name.clone(),
                    fields,
                },
            );
        }
    }

    // Signatures first so that auto inference can see calls to functions
    // declared later.
    let mut signatures: HashMap<String, (String, Option<u32>)> = HashMap::new();
    for decl in decls {
        if let ast::Decl::Func(func) = decl {
            signatures.insert(func.name.clone(), concrete_type(&func.ret)?);
        }
    }

    let mut functions = Vec::new();
    for decl in decls {
        if let ast::Decl::Func(func) = decl {
            functions.push(analyze_function(func, &classes, &signatures)?);
        }
    }

    Ok(Analysis { functions, classes })
}

fn analyze_function(
    func: &ast::FuncDecl,
    classes: &HashMap<String, Class>,
    signatures: &HashMap<String, (String, Option<u32>)>,
) -> Result<Function, AnalyzeError> {
    let (return_class, return_array_size) = concrete_type(&func.ret)?;
    let mut parameters = Vec::new();
    let mut scope: HashMap<String, (String, Option<u32>)> = HashMap::new();
    scope.insert(
        RESULT.to_owned(),
        (return_class.clone(), return_array_size),
    );
    for param in &func.params {
        let (class_type, array_size) = concrete_type(&param.ty)?;
        scope.insert(param.name.clone(), (class_type.clone(), array_size));
        parameters.push(Variable {
            name: param.name.clone(),
            class_type,
            array_size,
        });
    }

    let context = FunctionContext {
        name: &func.name,
        classes,
        signatures,
    };
    let body = analyze_body(&func.body, &mut scope, &context)?;

    Ok(Function {
        name: func.name.clone(),
        return_class,
        return_array_size,
        parameters,
        body,
    })
}

struct FunctionContext<'a> {
    name: &'a str,
    classes: &'a HashMap<String, Class>,
    signatures: &'a HashMap<String, (String, Option<u32>)>,
}

fn analyze_body(
    stmts: &[ast::Stmt],
    scope: &mut HashMap<String, (String, Option<u32>)>,
    context: &FunctionContext,
) -> Result<Vec<Statement>, AnalyzeError> {
    let mut body = Vec::new();
    for stmt in stmts {
        body.push(match stmt {
            ast::Stmt::VarDecl { ty, name, line } => {
                let (class_type, array_size) = concrete_type(ty)?;
                scope.insert(name.clone(), (class_type.clone(), array_size));
                Statement::Declare {
                    var: Variable {
                        name: name.clone(),
                        class_type,
                        array_size,
                    },
                    line: *line,
                }
            }
            ast::Stmt::VarDeclInit {
                ty,
                name,
                value,
                line,
            } => {
                let value = convert_expr(value)?;
                let (class_type, array_size) = match ty {
                    Some(ty) => concrete_type(ty)?,
                    None => infer_expr(&value, scope, context).ok_or_else(|| {
                        AnalyzeError::AutoInference {
                            variable: name.clone(),
                            function: context.name.to_owned(),
                        }
                    })?,
                };
                scope.insert(name.clone(), (class_type.clone(), array_size));
                Statement::DeclareInit {
                    var: Variable {
                        name: name.clone(),
                        class_type,
                        array_size,
                    },
                    value,
                    line: *line,
                }
            }
            ast::Stmt::Assign { dest, value, line } => Statement::Assign {
                target: match dest {
                    ast::AssignDest::Var(name) => Target::Var(name.clone()),
                    ast::AssignDest::Element { name, index } => Target::Element {
                        name: name.clone(),
                        index: convert_index(index),
                    },
                },
                value: convert_expr(value)?,
                line: *line,
            },
            ast::Stmt::If { cond, body, line } => {
                let mut inner_scope = scope.clone();
                Statement::If {
                    condition: convert_expr(cond)?,
                    body: analyze_body(body, &mut inner_scope, context)?,
                    line: *line,
                }
            }
            ast::Stmt::While { cond, body, line } => {
                let mut inner_scope = scope.clone();
                Statement::While {
                    condition: convert_expr(cond)?,
                    body: analyze_body(body, &mut inner_scope, context)?,
                    line: *line,
                }
            }
            ast::Stmt::Fail { line } => Statement::Abort { line: *line },
        });
    }
    Ok(body)
}

fn convert_expr(expr: &ast::Expr) -> Result<Expression, AnalyzeError> {
    Ok(match expr {
        ast::Expr::Binary { left, op, right } => Expression::Binary {
            left: convert_atom(left)?,
            op: *op,
            right: convert_atom(right)?,
        },
        ast::Expr::Unary { inner } => Expression::Unary {
            inner: convert_atom(inner)?,
        },
        ast::Expr::Atom(atom) => Expression::Atom(convert_atom(atom)?),
    })
}

fn convert_atom(atom: &ast::Atom) -> Result<Atom, AnalyzeError> {
    Ok(match atom {
        ast::Atom::Int(value) => Atom::Literal(*value),
        ast::Atom::Ident(name) => Atom::Var(name.clone()),
        ast::Atom::Index { name, index } => Atom::Element {
            name: name.clone(),
            index: convert_index(index),
        },
        ast::Atom::Field { name, field } => Atom::Field {
            name: name.clone(),
            field: field.clone(),
        },
        ast::Atom::Call {
            name,
            template_args,
            args,
        } => {
            if !template_args.is_empty() {
                return Err(AnalyzeError::UnresolvedTemplate(name.clone()));
            }
            Atom::Call {
                name: name.clone(),
                args: args
                    .iter()
                    .map(convert_atom)
                    .collect::<Result<Vec<_>, _>>()?,
            }
        }
        ast::Atom::Construct {
            class,
            template_args,
            args,
        } => {
            if !template_args.is_empty() {
                return Err(AnalyzeError::UnresolvedTemplate(class.clone()));
            }
            Atom::Construct {
                class: class.clone(),
                args: args
                    .iter()
                    .map(convert_atom)
                    .collect::<Result<Vec<_>, _>>()?,
            }
        }
        ast::Atom::Placeholder(name) => {
            return Err(AnalyzeError::UnresolvedPlaceholder(name.clone()))
        }
    })
}

fn convert_index(index: &ast::IndexExpr) -> Index {
    match index {
        ast::IndexExpr::Int(value) => Index::Literal(*value),
        ast::IndexExpr::Var(name) => Index::Var(name.clone()),
    }
}

fn concrete_type(ty: &ast::TypeRef) -> Result<(String, Option<u32>), AnalyzeError> {
    let name = match &ty.base {
        ast::TypeBase::Class(name) => name.clone(),
        ast::TypeBase::Placeholder(name) => {
            return Err(AnalyzeError::UnresolvedPlaceholder(name.clone()))
        }
    };
    if !ty.template_args.is_empty() {
        return Err(AnalyzeError::UnresolvedTemplate(name));
    }
    let array_size = match &ty.array_size {
        None => None,
        Some(ast::ArraySize::Literal(size)) => Some(*size),
        Some(ast::ArraySize::Placeholder(name)) => {
            return Err(AnalyzeError::UnresolvedPlaceholder(name.clone()))
        }
    };
    Ok((name, array_size))
}

/// Static type of an expression, if it can be determined from the current
/// scope. Used only for `auto` inference; full checking happens in the
/// validator.
fn infer_expr(
    expr: &Expression,
    scope: &HashMap<String, (String, Option<u32>)>,
    context: &FunctionContext,
) -> Option<(String, Option<u32>)> {
    match expr {
        Expression::Binary { .. } | Expression::Unary { .. } => Some((NUM.to_owned(), None)),
        Expression::Atom(atom) => infer_atom(atom, scope, context),
    }
}

fn infer_atom(
    atom: &Atom,
    scope: &HashMap<String, (String, Option<u32>)>,
    context: &FunctionContext,
) -> Option<(String, Option<u32>)> {
    match atom {
        Atom::Literal(_) => Some((NUM.to_owned(), None)),
        Atom::Var(name) => scope.get(name).cloned(),
        Atom::Element { name, .. } => {
            let (class_type, _) = scope.get(name)?;
            Some((class_type.clone(), None))
        }
        Atom::Field { name, field } => {
            let (class_type, _) = scope.get(name)?;
            let class = context.classes.get(class_type)?;
            let field = class.fields.iter().find(|f| &f.name == field)?;
            Some((field.class_type.clone(), field.array_size))
        }
        Atom::Call { name, .. } => context.signatures.get(name).cloned(),
        Atom::Construct { class, .. } => Some((class.clone(), None)),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnknownClass(pub String);

impl fmt::Display for UnknownClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown class \"{}\"", self.0)
    }
}

impl StdError for UnknownClass {}

/// Memoized footprint calculator. The footprint of a type is the number of
/// machine words a value occupies on the operand stack: 1 for `Num`, the sum
/// of field footprints for a class, element footprint times count for an
/// array.
pub struct SpaceCalc<'a> {
    classes: &'a HashMap<String, Class>,
    cache: HashMap<String, u32>,
}

impl<'a> SpaceCalc<'a> {
    pub fn new(classes: &'a HashMap<String, Class>) -> SpaceCalc<'a> {
        let mut cache = HashMap::new();
        cache.insert(NUM.to_owned(), 1);
        SpaceCalc { classes, cache }
    }

    pub fn footprint(
        &mut self,
        class_type: &str,
        array_size: Option<u32>,
    ) -> Result<u32, UnknownClass> {
        let count = array_size.unwrap_or(1);
        if !self.cache.contains_key(class_type) {
            let classes: &'a HashMap<String, Class> = self.classes;
            let class = classes
                .get(class_type)
                .ok_or_else(|| UnknownClass(class_type.to_owned()))?;
            let mut size = 0;
            for field in &class.fields {
                size += self.footprint(&field.class_type, field.array_size)?;
            }
            self.cache.insert(class_type.to_owned(), size);
        }
        Ok(count * self.cache[class_type])
    }
}
