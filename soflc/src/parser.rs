use matches::debug_assert_matches;
use pest::iterators::Pair;
use pest::{Parser, Span};
use pest_derive::Parser;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "sofl.pest"]
pub struct SoflParser;

pub type Error = pest::error::Error<Rule>;

pub type Result<T> = std::result::Result<T, Error>;

/// Identifier discipline. Plain source restricts identifiers to lowercase
/// and class names to letters and digits; after template expansion the
/// mangled names (underscores, embedded class names) are admitted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParseMode {
    Source,
    Expanded,
}

pub fn parse_program(input: &str, mode: ParseMode) -> Result<Vec<Decl>> {
    let pair = SoflParser::parse(Rule::program, input)?.next().unwrap();
    Builder { mode }.process_program(pair)
}

fn new_parser_error(span: Span, message: String) -> Error {
    Error::new_from_span(pest::error::ErrorVariant::CustomError { message }, span)
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0 - 1
}

struct Builder {
    mode: ParseMode,
}

impl Builder {
    fn process_program(&self, pair: Pair<Rule>) -> Result<Vec<Decl>> {
        debug_assert_matches!(pair.as_rule(), Rule::program);
        let mut decls = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::import_decl => decls.push(self.process_import(inner)?),
                Rule::clazz_decl => decls.push(self.process_class(inner)?),
                Rule::func_decl => decls.push(self.process_func(inner)?),
                Rule::EOI => {}
                _ => unreachable!(),
            }
        }
        Ok(decls)
    }

    fn process_import(&self, pair: Pair<Rule>) -> Result<Decl> {
        let mut pairs = pair.into_inner();
        pairs.next().unwrap(); // the keyword
        Ok(Decl::Import(ImportDecl {
            name: pairs.next().unwrap().as_str().to_owned(),
        }))
    }

    fn process_class(&self, pair: Pair<Rule>) -> Result<Decl> {
        let mut pairs = pair.into_inner().peekable();
        let name = self.process_clazz_name(pairs.next().unwrap())?;
        let template_params = match pairs.peek().map(Pair::as_rule) {
            Some(Rule::template_params) => self.process_template_params(pairs.next().unwrap()),
            _ => Vec::new(),
        };
        let mut fields = Vec::new();
        for field in pairs {
            if field.as_rule() == Rule::field_sep {
                continue;
            }
            debug_assert_matches!(field.as_rule(), Rule::field_decl);
            let mut inner = field.into_inner();
            fields.push(FieldDecl {
                name: self.process_identifier(inner.next().unwrap())?,
                ty: self.process_type(inner.next().unwrap())?,
            });
        }
        Ok(Decl::Class(ClassDecl {
            name,
            template_params,
            fields,
        }))
    }

    fn process_func(&self, pair: Pair<Rule>) -> Result<Decl> {
        let mut pairs = pair.into_inner().peekable();
        let ret = self.process_type(pairs.next().unwrap())?;
        let name = self.process_identifier(pairs.next().unwrap())?;
        let template_params = match pairs.peek().map(Pair::as_rule) {
            Some(Rule::template_params) => self.process_template_params(pairs.next().unwrap()),
            _ => Vec::new(),
        };
        let mut params = Vec::new();
        let mut body = Vec::new();
        for inner in pairs {
            match inner.as_rule() {
                Rule::var_decl => {
                    let mut decl = inner.into_inner();
                    params.push(ParamDecl {
                        ty: self.process_type(decl.next().unwrap())?,
                        name: self.process_identifier(decl.next().unwrap())?,
                    });
                }
                Rule::stmt => body.push(self.process_stmt(inner)?),
                _ => unreachable!(),
            }
        }
        Ok(Decl::Func(FuncDecl {
            name,
            template_params,
            ret,
            params,
            body,
        }))
    }

    fn process_template_params(&self, pair: Pair<Rule>) -> Vec<String> {
        debug_assert_matches!(pair.as_rule(), Rule::template_params);
        pair.into_inner()
            .map(|p| p.as_str().to_owned())
            .collect()
    }

    fn process_type(&self, pair: Pair<Rule>) -> Result<TypeRef> {
        debug_assert_matches!(pair.as_rule(), Rule::type_ref);
        let inner = pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::simple_type => self.process_simple_type(inner, None),
            Rule::array_type => {
                let mut pairs = inner.into_inner();
                let simple = pairs.next().unwrap();
                let size = self.process_array_size(pairs.next().unwrap())?;
                self.process_simple_type(simple, Some(size))
            }
            _ => unreachable!(),
        }
    }

    fn process_array_size(&self, pair: Pair<Rule>) -> Result<ArraySize> {
        debug_assert_matches!(pair.as_rule(), Rule::array_size);
        let inner = pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::integer => {
                let span = inner.as_span();
                let value: i64 = self.process_int(inner)?;
                if value < 0 {
                    return Err(new_parser_error(
                        span,
                        "array sizes must be non-negative".to_owned(),
                    ));
                }
                Ok(ArraySize::Literal(value as u32))
            }
            Rule::stemplate => Ok(ArraySize::Placeholder(placeholder_name(inner))),
            _ => unreachable!(),
        }
    }

    fn process_simple_type(&self, pair: Pair<Rule>, array_size: Option<ArraySize>) -> Result<TypeRef> {
        debug_assert_matches!(pair.as_rule(), Rule::simple_type);
        let mut pairs = pair.into_inner();
        let base_pair = pairs.next().unwrap();
        let base = match base_pair.as_rule() {
            Rule::clazz => TypeBase::Class(self.process_clazz_name(base_pair)?),
            Rule::stemplate => TypeBase::Placeholder(placeholder_name(base_pair)),
            _ => unreachable!(),
        };
        let template_args = match pairs.next() {
            Some(args) => self.process_template_args(args)?,
            None => Vec::new(),
        };
        Ok(TypeRef {
            base,
            template_args,
            array_size,
        })
    }

    fn process_template_args(&self, pair: Pair<Rule>) -> Result<Vec<TemplateArg>> {
        debug_assert_matches!(pair.as_rule(), Rule::template_args);
        let mut args = Vec::new();
        for arg in pair.into_inner() {
            let inner = arg.into_inner().next().unwrap();
            args.push(match inner.as_rule() {
                Rule::integer => TemplateArg::Int(self.process_i32(inner)?),
                Rule::simple_type => TemplateArg::Type(self.process_simple_type(inner, None)?),
                Rule::placeholder => TemplateArg::Placeholder(inner.as_str().to_owned()),
                _ => unreachable!(),
            });
        }
        Ok(args)
    }

    fn process_stmt(&self, pair: Pair<Rule>) -> Result<Stmt> {
        debug_assert_matches!(pair.as_rule(), Rule::stmt);
        let inner = pair.into_inner().next().unwrap();
        let line = line_of(&inner);
        match inner.as_rule() {
            Rule::assignment => {
                let mut pairs = inner.into_inner();
                let dest = self.process_assign_dest(pairs.next().unwrap())?;
                let value = self.process_expr(pairs.next().unwrap())?;
                Ok(Stmt::Assign { dest, value, line })
            }
            Rule::var_decl => {
                let mut pairs = inner.into_inner();
                Ok(Stmt::VarDecl {
                    ty: self.process_type(pairs.next().unwrap())?,
                    name: self.process_identifier(pairs.next().unwrap())?,
                    line,
                })
            }
            Rule::var_decl_init => {
                let mut pairs = inner.into_inner();
                let ty_pair = pairs.next().unwrap();
                let ty = match ty_pair.as_rule() {
                    Rule::kw_auto => None,
                    Rule::type_ref => Some(self.process_type(ty_pair)?),
                    _ => unreachable!(),
                };
                Ok(Stmt::VarDeclInit {
                    ty,
                    name: self.process_identifier(pairs.next().unwrap())?,
                    value: self.process_expr(pairs.next().unwrap())?,
                    line,
                })
            }
            Rule::if_stmt => {
                let (cond, body) = self.process_cond_block(inner)?;
                Ok(Stmt::If { cond, body, line })
            }
            Rule::while_stmt => {
                let (cond, body) = self.process_cond_block(inner)?;
                Ok(Stmt::While { cond, body, line })
            }
            Rule::error_stmt => Ok(Stmt::Fail { line }),
            _ => unreachable!(),
        }
    }

    fn process_cond_block(&self, pair: Pair<Rule>) -> Result<(Expr, Vec<Stmt>)> {
        let mut pairs = pair.into_inner();
        let cond = self.process_expr(pairs.next().unwrap())?;
        let mut body = Vec::new();
        for stmt in pairs {
            body.push(self.process_stmt(stmt)?);
        }
        Ok((cond, body))
    }

    fn process_assign_dest(&self, pair: Pair<Rule>) -> Result<AssignDest> {
        debug_assert_matches!(pair.as_rule(), Rule::assign_dest);
        let inner = pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::identifier => Ok(AssignDest::Var(self.process_identifier(inner)?)),
            Rule::array_index => {
                let (name, index) = self.process_array_index(inner)?;
                Ok(AssignDest::Element { name, index })
            }
            _ => unreachable!(),
        }
    }

    fn process_array_index(&self, pair: Pair<Rule>) -> Result<(String, IndexExpr)> {
        debug_assert_matches!(pair.as_rule(), Rule::array_index);
        let mut pairs = pair.into_inner();
        let name = self.process_identifier(pairs.next().unwrap())?;
        let index_pair = pairs.next().unwrap().into_inner().next().unwrap();
        let index = match index_pair.as_rule() {
            Rule::integer => IndexExpr::Int(self.process_i32(index_pair)?),
            Rule::identifier => IndexExpr::Var(self.process_identifier(index_pair)?),
            _ => unreachable!(),
        };
        Ok((name, index))
    }

    fn process_expr(&self, pair: Pair<Rule>) -> Result<Expr> {
        debug_assert_matches!(pair.as_rule(), Rule::expr);
        let inner = pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::bin_expr => {
                let mut pairs = inner.into_inner();
                let left = self.process_atom(pairs.next().unwrap())?;
                let op = match pairs.next().unwrap().as_str() {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    "/" => BinOp::Div,
                    "<" => BinOp::Less,
                    _ => unreachable!(),
                };
                let right = self.process_atom(pairs.next().unwrap())?;
                Ok(Expr::Binary { left, op, right })
            }
            Rule::un_expr => Ok(Expr::Unary {
                inner: self.process_atom(inner.into_inner().next().unwrap())?,
            }),
            Rule::atom => Ok(Expr::Atom(self.process_atom(inner)?)),
            _ => unreachable!(),
        }
    }

    fn process_atom(&self, pair: Pair<Rule>) -> Result<Atom> {
        debug_assert_matches!(pair.as_rule(), Rule::atom);
        let inner = pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::integer => Ok(Atom::Int(self.process_i32(inner)?)),
            Rule::identifier => Ok(Atom::Ident(self.process_identifier(inner)?)),
            Rule::array_index => {
                let (name, index) = self.process_array_index(inner)?;
                Ok(Atom::Index { name, index })
            }
            Rule::field_access => {
                let mut pairs = inner.into_inner();
                Ok(Atom::Field {
                    name: self.process_identifier(pairs.next().unwrap())?,
                    field: self.process_identifier(pairs.next().unwrap())?,
                })
            }
            Rule::function_call => {
                let mut pairs = inner.into_inner().peekable();
                let name = self.process_identifier(pairs.next().unwrap())?;
                let template_args = match pairs.peek().map(Pair::as_rule) {
                    Some(Rule::template_args) => {
                        self.process_template_args(pairs.next().unwrap())?
                    }
                    _ => Vec::new(),
                };
                let mut args = Vec::new();
                for arg in pairs {
                    args.push(self.process_atom(arg)?);
                }
                Ok(Atom::Call {
                    name,
                    template_args,
                    args,
                })
            }
            Rule::constructor_call => {
                let mut pairs = inner.into_inner().peekable();
                let class = self.process_clazz_name(pairs.next().unwrap())?;
                let template_args = match pairs.peek().map(Pair::as_rule) {
                    Some(Rule::template_args) => {
                        self.process_template_args(pairs.next().unwrap())?
                    }
                    _ => Vec::new(),
                };
                let mut args = Vec::new();
                for arg in pairs {
                    args.push(self.process_atom(arg)?);
                }
                Ok(Atom::Construct {
                    class,
                    template_args,
                    args,
                })
            }
            Rule::stemplate => Ok(Atom::Placeholder(placeholder_name(inner))),
            _ => unreachable!(),
        }
    }

    fn process_identifier(&self, pair: Pair<Rule>) -> Result<String> {
        debug_assert_matches!(pair.as_rule(), Rule::identifier);
        let text = pair.as_str();
        if self.mode == ParseMode::Source && text.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(new_parser_error(
                pair.as_span(),
                format!("identifier \"{}\" may not contain uppercase letters", text),
            ));
        }
        Ok(text.to_owned())
    }

    fn process_clazz_name(&self, pair: Pair<Rule>) -> Result<String> {
        debug_assert_matches!(pair.as_rule(), Rule::clazz);
        let text = pair.as_str();
        if self.mode == ParseMode::Source && text.contains('_') {
            return Err(new_parser_error(
                pair.as_span(),
                format!("class name \"{}\" may not contain underscores", text),
            ));
        }
        Ok(text.to_owned())
    }

    fn process_i32(&self, pair: Pair<Rule>) -> Result<i32> {
        debug_assert_matches!(pair.as_rule(), Rule::integer);
        pair.as_str()
            .parse()
            .map_err(|err| new_parser_error(pair.as_span(), format!("bad integer: {}", err)))
    }

    fn process_int(&self, pair: Pair<Rule>) -> Result<i64> {
        debug_assert_matches!(pair.as_rule(), Rule::integer);
        pair.as_str()
            .parse()
            .map_err(|err| new_parser_error(pair.as_span(), format!("bad integer: {}", err)))
    }
}

fn placeholder_name(pair: Pair<Rule>) -> String {
    debug_assert_matches!(pair.as_rule(), Rule::stemplate);
    pair.into_inner().next().unwrap().as_str().to_owned()
}
