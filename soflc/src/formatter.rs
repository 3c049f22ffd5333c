//! Serializes an AST back to canonical source text. The preprocessor formats
//! the template-expanded program and reparses it in expanded mode, so the
//! output must round-trip through the grammar exactly.

use crate::ast::*;

pub struct Formatter {
    indent_size: usize,
}

impl Default for Formatter {
    fn default() -> Formatter {
        Formatter { indent_size: 4 }
    }
}

impl Formatter {
    pub fn format(&self, decls: &[Decl]) -> String {
        let mut result = String::from("\n");
        for decl in decls {
            match decl {
                Decl::Import(import) => result.push_str(&format!("load {}", import.name)),
                Decl::Class(class) => result.push_str(&self.format_class(class)),
                Decl::Func(func) => result.push_str(&self.format_func(func)),
            }
            result.push('\n');
        }
        result
    }

    fn format_class(&self, class: &ClassDecl) -> String {
        let fields: Vec<String> = class
            .fields
            .iter()
            .map(|field| format!("{}#{}", field.name, self.format_type(&field.ty)))
            .collect();
        format!(
            "{}{}: {}",
            class.name,
            self.format_template_params(&class.template_params),
            fields.join(" x ")
        )
    }

    fn format_func(&self, func: &FuncDecl) -> String {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|param| format!("{} {}", self.format_type(&param.ty), param.name))
            .collect();
        let body: Vec<String> = func
            .body
            .iter()
            .map(|stmt| self.format_stmt(stmt, 1))
            .collect();
        let header = format!(
            "{} {}{}({})",
            self.format_type(&func.ret),
            func.name,
            self.format_template_params(&func.template_params),
            params.join(", ")
        );
        if body.is_empty() {
            format!("{} {{\n}}", header)
        } else {
            format!("{} {{\n{}\n}}", header, body.join("\n"))
        }
    }

    fn format_template_params(&self, params: &[String]) -> String {
        if params.is_empty() {
            String::new()
        } else {
            format!("<{}>", params.join(", "))
        }
    }

    fn format_type(&self, ty: &TypeRef) -> String {
        let base = match &ty.base {
            TypeBase::Class(name) => name.clone(),
            TypeBase::Placeholder(name) => format!("<{}>", name),
        };
        let args = if ty.template_args.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = ty
                .template_args
                .iter()
                .map(|arg| self.format_template_arg(arg))
                .collect();
            format!("<{}>", parts.join(", "))
        };
        match &ty.array_size {
            None => format!("{}{}", base, args),
            Some(ArraySize::Literal(size)) => format!("{}{}*{}", base, args, size),
            Some(ArraySize::Placeholder(name)) => format!("{}{}*<{}>", base, args, name),
        }
    }

    fn format_template_arg(&self, arg: &TemplateArg) -> String {
        match arg {
            TemplateArg::Int(value) => value.to_string(),
            TemplateArg::Type(ty) => self.format_type(ty),
            TemplateArg::Placeholder(name) => name.clone(),
        }
    }

    fn format_stmt(&self, stmt: &Stmt, indent_level: usize) -> String {
        let indent = " ".repeat(indent_level * self.indent_size);
        match stmt {
            Stmt::VarDecl { ty, name, .. } => {
                format!("{}{} {}", indent, self.format_type(ty), name)
            }
            Stmt::VarDeclInit {
                ty, name, value, ..
            } => {
                let ty_str = match ty {
                    Some(ty) => self.format_type(ty),
                    None => "auto".to_owned(),
                };
                format!("{}{} {} = {}", indent, ty_str, name, self.format_expr(value))
            }
            Stmt::Assign { dest, value, .. } => {
                let dest_str = match dest {
                    AssignDest::Var(name) => name.clone(),
                    AssignDest::Element { name, index } => {
                        format!("{}[{}]", name, self.format_index(index))
                    }
                };
                format!("{}{} = {}", indent, dest_str, self.format_expr(value))
            }
            Stmt::If { cond, body, .. } => {
                self.format_cond_block(&indent, self.format_expr(cond), "??", body, indent_level)
            }
            Stmt::While { cond, body, .. } => {
                self.format_cond_block(&indent, self.format_expr(cond), "...?", body, indent_level)
            }
            Stmt::Fail { .. } => format!("{}error", indent),
        }
    }

    fn format_cond_block(
        &self,
        indent: &str,
        cond: String,
        keyword: &str,
        body: &[Stmt],
        indent_level: usize,
    ) -> String {
        let lines: Vec<String> = body
            .iter()
            .map(|stmt| self.format_stmt(stmt, indent_level + 1))
            .collect();
        format!(
            "{}{} {} {{\n{}\n{}}}",
            indent,
            cond,
            keyword,
            lines.join("\n"),
            indent
        )
    }

    fn format_expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Binary { left, op, right } => format!(
                "{} {} {}",
                self.format_atom(left),
                op,
                self.format_atom(right)
            ),
            Expr::Unary { inner } => format!("~{}", self.format_atom(inner)),
            Expr::Atom(atom) => self.format_atom(atom),
        }
    }

    fn format_index(&self, index: &IndexExpr) -> String {
        match index {
            IndexExpr::Int(value) => value.to_string(),
            IndexExpr::Var(name) => name.clone(),
        }
    }

    fn format_atom(&self, atom: &Atom) -> String {
        match atom {
            Atom::Int(value) => value.to_string(),
            Atom::Ident(name) => name.clone(),
            Atom::Index { name, index } => format!("{}[{}]", name, self.format_index(index)),
            Atom::Field { name, field } => format!("{}#{}", name, field),
            Atom::Call {
                name,
                template_args,
                args,
            } => self.format_call(name, template_args, args),
            Atom::Construct {
                class,
                template_args,
                args,
            } => self.format_call(class, template_args, args),
            Atom::Placeholder(name) => format!("<{}>", name),
        }
    }

    fn format_call(&self, name: &str, template_args: &[TemplateArg], args: &[Atom]) -> String {
        let template = if template_args.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = template_args
                .iter()
                .map(|arg| self.format_template_arg(arg))
                .collect();
            format!("<{}>", parts.join(", "))
        };
        let parts: Vec<String> = args.iter().map(|arg| self.format_atom(arg)).collect();
        format!("{}{}({})", name, template, parts.join(", "))
    }
}
