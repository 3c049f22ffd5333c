//! Source preprocessing: transitive `load` resolution and template
//! monomorphization.
//!
//! Imports are walked depth first; a set of resolved canonical paths breaks
//! cycles. Templates are expanded on demand per concrete argument tuple: the
//! declaration is deep-copied under a mangled name (declaration name and
//! argument spellings joined with underscores) with every placeholder
//! substituted. The expansion memo is seeded with a sentinel before
//! recursing, so self-referential generics terminate. The fully expanded
//! program is finally formatted back to text and reparsed in expanded mode.

use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::*;
use crate::formatter::Formatter;
use crate::parser::{self, ParseMode};

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateError {
    DuplicateTemplate(String),
    UnknownTemplate(String),
    UnboundPlaceholder(String),
    ArgumentCount {
        template: String,
        expected: usize,
        actual: usize,
    },
    BadSubstitution {
        placeholder: String,
        expected: &'static str,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TemplateError::DuplicateTemplate(name) => {
                write!(f, "multiple templates named \"{}\"", name)
            }
            TemplateError::UnknownTemplate(name) => write!(f, "unknown template \"{}\"", name),
            TemplateError::UnboundPlaceholder(name) => {
                write!(f, "placeholder \"{}\" is not bound here", name)
            }
            TemplateError::ArgumentCount {
                template,
                expected,
                actual,
            } => write!(
                f,
                "template \"{}\" expects {} arguments, got {}",
                template, expected, actual
            ),
            TemplateError::BadSubstitution {
                placeholder,
                expected,
            } => write!(
                f,
                "placeholder \"{}\" must be bound to {}",
                placeholder, expected
            ),
        }
    }
}

impl StdError for TemplateError {}

#[derive(Debug)]
pub enum PreprocessError {
    Io(std::io::Error, PathBuf),
    Parse(Box<parser::Error>, PathBuf),
    Template(TemplateError),
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PreprocessError::Io(err, path) => {
                write!(f, "reading \"{}\" failed: {}", path.display(), err)
            }
            PreprocessError::Parse(err, path) => {
                writeln!(f, "parsing \"{}\" failed:", path.display())?;
                write!(f, "{}", err)
            }
            PreprocessError::Template(err) => write!(f, "{}", err),
        }
    }
}

impl StdError for PreprocessError {}

impl From<TemplateError> for PreprocessError {
    fn from(err: TemplateError) -> PreprocessError {
        PreprocessError::Template(err)
    }
}

/// Parses `filepath` and every transitively `load`ed file into one flat
/// declaration list. Library imports (`@/...`) resolve against `lib_root`,
/// plain imports against the importing file's directory.
pub fn recursive_parse(filepath: &Path, lib_root: &Path) -> Result<Vec<Decl>, PreprocessError> {
    let initial = fs::canonicalize(filepath)
        .map_err(|err| PreprocessError::Io(err, filepath.to_owned()))?;
    let mut checked: HashSet<PathBuf> = HashSet::new();
    let mut load_queue = vec![initial];
    let mut result = Vec::new();

    while let Some(path) = load_queue.pop() {
        debug!(path = %path.display(), "loading source file");
        let text =
            fs::read_to_string(&path).map_err(|err| PreprocessError::Io(err, path.clone()))?;
        let decls = parser::parse_program(&text, ParseMode::Source)
            .map_err(|err| PreprocessError::Parse(Box::new(err), path.clone()))?;
        for decl in decls {
            match decl {
                Decl::Import(import) => {
                    let (root, name) = if let Some(stripped) = import.name.strip_prefix("@/") {
                        (lib_root.to_owned(), stripped)
                    } else {
                        let parent = path.parent().unwrap_or_else(|| Path::new("."));
                        (parent.to_owned(), import.name.as_str())
                    };
                    let raw = root.join(format!("{}.sofl", name));
                    let next = fs::canonicalize(&raw)
                        .map_err(|err| PreprocessError::Io(err, raw.clone()))?;
                    if checked.insert(next.clone()) {
                        load_queue.push(next);
                    }
                }
                other => result.push(other),
            }
        }
    }
    Ok(result)
}

/// A template argument with all placeholders already resolved.
#[derive(Clone, Debug)]
enum Binding {
    Int(i32),
    Type(TypeRef),
}

#[derive(Default)]
struct Expander {
    templates: HashMap<String, Decl>,
    resolved: HashMap<String, Option<Decl>>,
    order: Vec<String>,
}

impl Expander {
    /// Expands `name` for the given argument tuple, returning the mangled
    /// name. The memo entry is seeded with a sentinel before the recursive
    /// substitution so that cyclic references resolve to the name alone.
    fn expand(&mut self, name: &str, args: Vec<Binding>) -> Result<String, TemplateError> {
        let mangled = mangled_name(name, &args)?;
        if self.resolved.contains_key(&mangled) {
            return Ok(mangled);
        }
        self.resolved.insert(mangled.clone(), None);
        self.order.push(mangled.clone());

        let template = self
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::UnknownTemplate(name.to_owned()))?;
        let params = template_params_of(&template);
        if params.len() != args.len() {
            return Err(TemplateError::ArgumentCount {
                template: name.to_owned(),
                expected: params.len(),
                actual: args.len(),
            });
        }
        let bindings: HashMap<String, Binding> =
            params.iter().cloned().zip(args.into_iter()).collect();

        let mut copy = template;
        match &mut copy {
            Decl::Class(class) => {
                class.name = mangled.clone();
                class.template_params.clear();
            }
            Decl::Func(func) => {
                func.name = mangled.clone();
                func.template_params.clear();
            }
            Decl::Import(_) => unreachable!(),
        }
        self.substitute_decl(&mut copy, &bindings)?;
        self.resolved.insert(mangled.clone(), Some(copy));
        Ok(mangled)
    }

    fn resolve_args(
        &mut self,
        args: &[TemplateArg],
        bindings: &HashMap<String, Binding>,
    ) -> Result<Vec<Binding>, TemplateError> {
        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            resolved.push(match arg {
                TemplateArg::Int(value) => Binding::Int(*value),
                TemplateArg::Type(ty) => {
                    let mut ty = ty.clone();
                    self.substitute_type(&mut ty, bindings)?;
                    Binding::Type(ty)
                }
                TemplateArg::Placeholder(name) => bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TemplateError::UnboundPlaceholder(name.clone()))?,
            });
        }
        Ok(resolved)
    }

    fn substitute_decl(
        &mut self,
        decl: &mut Decl,
        bindings: &HashMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        match decl {
            Decl::Import(_) => Ok(()),
            Decl::Class(class) => {
                for field in &mut class.fields {
                    self.substitute_type(&mut field.ty, bindings)?;
                }
                Ok(())
            }
            Decl::Func(func) => {
                self.substitute_type(&mut func.ret, bindings)?;
                for param in &mut func.params {
                    self.substitute_type(&mut param.ty, bindings)?;
                }
                for stmt in &mut func.body {
                    self.substitute_stmt(stmt, bindings)?;
                }
                Ok(())
            }
        }
    }

    fn substitute_type(
        &mut self,
        ty: &mut TypeRef,
        bindings: &HashMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        if let Some(ArraySize::Placeholder(name)) = &ty.array_size {
            match bindings.get(name) {
                Some(Binding::Int(value)) if *value >= 0 => {
                    ty.array_size = Some(ArraySize::Literal(*value as u32));
                }
                Some(_) => {
                    return Err(TemplateError::BadSubstitution {
                        placeholder: name.clone(),
                        expected: "a non-negative integer",
                    })
                }
                None => return Err(TemplateError::UnboundPlaceholder(name.clone())),
            }
        }
        if let TypeBase::Placeholder(name) = &ty.base {
            match bindings.get(name) {
                Some(Binding::Type(bound)) => ty.base = bound.base.clone(),
                Some(Binding::Int(_)) => {
                    return Err(TemplateError::BadSubstitution {
                        placeholder: name.clone(),
                        expected: "a type",
                    })
                }
                None => return Err(TemplateError::UnboundPlaceholder(name.clone())),
            }
        }
        if !ty.template_args.is_empty() {
            let args = std::mem::replace(&mut ty.template_args, Vec::new());
            let resolved = self.resolve_args(&args, bindings)?;
            let base = match &ty.base {
                TypeBase::Class(name) => name.clone(),
                TypeBase::Placeholder(_) => unreachable!(),
            };
            ty.base = TypeBase::Class(self.expand(&base, resolved)?);
        }
        Ok(())
    }

    fn substitute_stmt(
        &mut self,
        stmt: &mut Stmt,
        bindings: &HashMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        match stmt {
            Stmt::VarDecl { ty, .. } => self.substitute_type(ty, bindings),
            Stmt::VarDeclInit { ty, value, .. } => {
                if let Some(ty) = ty {
                    self.substitute_type(ty, bindings)?;
                }
                self.substitute_expr(value, bindings)
            }
            Stmt::Assign { value, .. } => self.substitute_expr(value, bindings),
            Stmt::If { cond, body, .. } | Stmt::While { cond, body, .. } => {
                self.substitute_expr(cond, bindings)?;
                for stmt in body {
                    self.substitute_stmt(stmt, bindings)?;
                }
                Ok(())
            }
            Stmt::Fail { .. } => Ok(()),
        }
    }

    fn substitute_expr(
        &mut self,
        expr: &mut Expr,
        bindings: &HashMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        match expr {
            Expr::Binary { left, right, .. } => {
                self.substitute_atom(left, bindings)?;
                self.substitute_atom(right, bindings)
            }
            Expr::Unary { inner } => self.substitute_atom(inner, bindings),
            Expr::Atom(atom) => self.substitute_atom(atom, bindings),
        }
    }

    fn substitute_atom(
        &mut self,
        atom: &mut Atom,
        bindings: &HashMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        match atom {
            Atom::Int(_) | Atom::Ident(_) | Atom::Index { .. } | Atom::Field { .. } => Ok(()),
            Atom::Placeholder(name) => match bindings.get(name) {
                // An integer parameter used as a value becomes a literal.
                Some(Binding::Int(value)) => {
                    *atom = Atom::Int(*value);
                    Ok(())
                }
                Some(Binding::Type(_)) => Err(TemplateError::BadSubstitution {
                    placeholder: name.clone(),
                    expected: "an integer",
                }),
                None => Err(TemplateError::UnboundPlaceholder(name.clone())),
            },
            Atom::Call {
                name,
                template_args,
                args,
            } => {
                for arg in args.iter_mut() {
                    self.substitute_atom(arg, bindings)?;
                }
                if !template_args.is_empty() {
                    let raw = std::mem::replace(template_args, Vec::new());
                    let resolved = self.resolve_args(&raw, bindings)?;
                    *name = self.expand(name, resolved)?;
                }
                Ok(())
            }
            Atom::Construct {
                class,
                template_args,
                args,
            } => {
                for arg in args.iter_mut() {
                    self.substitute_atom(arg, bindings)?;
                }
                if !template_args.is_empty() {
                    let raw = std::mem::replace(template_args, Vec::new());
                    let resolved = self.resolve_args(&raw, bindings)?;
                    *class = self.expand(class, resolved)?;
                }
                Ok(())
            }
        }
    }
}

fn template_params_of(decl: &Decl) -> Vec<String> {
    match decl {
        Decl::Class(class) => class.template_params.clone(),
        Decl::Func(func) => func.template_params.clone(),
        Decl::Import(_) => Vec::new(),
    }
}

/// Joins the declaration name and the argument spellings with underscores.
fn mangled_name(name: &str, args: &[Binding]) -> Result<String, TemplateError> {
    let mut parts = vec![name.to_owned()];
    for arg in args {
        parts.push(match arg {
            Binding::Int(value) => {
                if *value < 0 {
                    return Err(TemplateError::BadSubstitution {
                        placeholder: name.to_owned(),
                        expected: "a non-negative integer",
                    });
                }
                value.to_string()
            }
            Binding::Type(ty) => match &ty.base {
                TypeBase::Class(class) => class.clone(),
                TypeBase::Placeholder(placeholder) => {
                    return Err(TemplateError::UnboundPlaceholder(placeholder.clone()))
                }
            },
        });
    }
    Ok(parts.join("_"))
}

/// Splits off template declarations, expands every concrete use and returns
/// the flat, non-parametric program: plain declarations first (in source
/// order), then the expansions in the order they were first needed.
pub fn resolve_templates(decls: Vec<Decl>) -> Result<Vec<Decl>, TemplateError> {
    let mut expander = Expander::default();
    let mut plain = Vec::new();
    for decl in decls {
        let is_template = !template_params_of(&decl).is_empty();
        if is_template {
            let name = decl.name().to_owned();
            if expander.templates.insert(name.clone(), decl).is_some() {
                return Err(TemplateError::DuplicateTemplate(name));
            }
        } else {
            plain.push(decl);
        }
    }

    let empty = HashMap::new();
    let mut result = Vec::new();
    for mut decl in plain {
        expander.substitute_decl(&mut decl, &empty)?;
        result.push(decl);
    }
    let order = std::mem::replace(&mut expander.order, Vec::new());
    for name in order {
        result.push(expander.resolved.remove(&name).unwrap().unwrap());
    }
    Ok(result)
}

/// The full front half of the pipeline: transitive parse, template
/// expansion, canonical formatting and a reparse of the formatted text.
/// Returns the expanded declarations together with the formatted source the
/// debugger displays.
pub fn load_program(
    filepath: &Path,
    lib_root: &Path,
) -> Result<(Vec<Decl>, String), PreprocessError> {
    let parsed = recursive_parse(filepath, lib_root)?;
    let resolved = resolve_templates(parsed)?;
    let text = Formatter::default().format(&resolved);
    debug!(decls = resolved.len(), "templates resolved");
    let reparsed = parser::parse_program(&text, ParseMode::Expanded)
        .map_err(|err| PreprocessError::Parse(Box::new(err), filepath.to_owned()))?;
    Ok((reparsed, text))
}
