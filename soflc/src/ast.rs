//! The untyped syntax tree delivered by the parser.
//!
//! This is the shape the preprocessor rewrites (imports flattened, templates
//! monomorphized) and the analyzer consumes. It serializes to JSON so that
//! parsing and the rest of the pipeline can run as separate commands.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Import(ImportDecl),
    Class(ClassDecl),
    Func(FuncDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Import(import) => &import.name,
            Decl::Class(class) => &class.name,
            Decl::Func(func) => &func.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub template_params: Vec<String>,
    pub fields: Vec<FieldDecl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub template_params: Vec<String>,
    pub ret: TypeRef,
    pub params: Vec<ParamDecl>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub base: TypeBase,
    pub template_args: Vec<TemplateArg>,
    pub array_size: Option<ArraySize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypeBase {
    Class(String),
    Placeholder(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TemplateArg {
    Int(i32),
    Type(TypeRef),
    Placeholder(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArraySize {
    Literal(u32),
    Placeholder(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    VarDecl {
        ty: TypeRef,
        name: String,
        line: usize,
    },
    /// `ty` of `None` is an `auto` declaration; the analyzer infers the
    /// concrete type from the initializer.
    VarDeclInit {
        ty: Option<TypeRef>,
        name: String,
        value: Expr,
        line: usize,
    },
    Assign {
        dest: AssignDest,
        value: Expr,
        line: usize,
    },
    If {
        cond: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
    /// The unconditional `error` abort.
    Fail { line: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AssignDest {
    Var(String),
    Element { name: String, index: IndexExpr },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IndexExpr {
    Int(i32),
    Var(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Less => "<",
        })
    }
}

/// Binary operands are deliberately restricted to atoms; the expression
/// grammar is flat and carries no precedence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Binary { left: Atom, op: BinOp, right: Atom },
    Unary { inner: Atom },
    Atom(Atom),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Atom {
    Int(i32),
    Ident(String),
    Index {
        name: String,
        index: IndexExpr,
    },
    Field {
        name: String,
        field: String,
    },
    Call {
        name: String,
        template_args: Vec<TemplateArg>,
        args: Vec<Atom>,
    },
    Construct {
        class: String,
        template_args: Vec<TemplateArg>,
        args: Vec<Atom>,
    },
    Placeholder(String),
}
