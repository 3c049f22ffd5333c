use crate::analyzer::{self, analyze};
use crate::ast::*;
use crate::parser::{parse_program, ParseMode};
use crate::validator::{validate, AnalysisError};

mod pest;
mod translate;

fn parse(source: &str) -> Vec<Decl> {
    parse_program(source, ParseMode::Source).unwrap()
}

fn validation_errors(source: &str) -> Vec<AnalysisError> {
    let decls = parse(source);
    let analysis = analyze(&decls).unwrap();
    validate(&analysis)
}

#[test]
fn function_declaration() {
    let decls = parse("\nNum add(Num a, Num b) {\n    result = a + b\n}\n");
    assert_eq!(decls.len(), 1);
    match &decls[0] {
        Decl::Func(func) => {
            assert_eq!(func.name, "add");
            assert_eq!(func.params.len(), 2);
            assert_eq!(func.params[0].name, "a");
            assert_eq!(
                func.body,
                vec![Stmt::Assign {
                    dest: AssignDest::Var("result".to_owned()),
                    value: Expr::Binary {
                        left: Atom::Ident("a".to_owned()),
                        op: BinOp::Add,
                        right: Atom::Ident("b".to_owned()),
                    },
                    line: 2,
                }]
            );
        }
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn class_declaration() {
    let decls = parse("\nPt: x#Num x y#Num\n");
    match &decls[0] {
        Decl::Class(class) => {
            assert_eq!(class.name, "Pt");
            let names: Vec<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["x", "y"]);
        }
        other => panic!("expected a class, got {:?}", other),
    }
}

#[test]
fn array_declaration_and_indexing() {
    let decls = parse("\nNum main() {\n    Num*100 arr\n    arr[0] = 5\n    result = arr[i]\n}\n");
    match &decls[0] {
        Decl::Func(func) => {
            assert_eq!(
                func.body[0],
                Stmt::VarDecl {
                    ty: TypeRef {
                        base: TypeBase::Class("Num".to_owned()),
                        template_args: vec![],
                        array_size: Some(ArraySize::Literal(100)),
                    },
                    name: "arr".to_owned(),
                    line: 2,
                }
            );
            assert_eq!(
                func.body[1],
                Stmt::Assign {
                    dest: AssignDest::Element {
                        name: "arr".to_owned(),
                        index: IndexExpr::Int(0),
                    },
                    value: Expr::Atom(Atom::Int(5)),
                    line: 3,
                }
            );
            assert_eq!(
                func.body[2],
                Stmt::Assign {
                    dest: AssignDest::Var("result".to_owned()),
                    value: Expr::Atom(Atom::Index {
                        name: "arr".to_owned(),
                        index: IndexExpr::Var("i".to_owned()),
                    }),
                    line: 4,
                }
            );
        }
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn control_flow_keywords() {
    let decls = parse(
        "\nNum test(Num n) {\n    n ?? {\n        result = 1\n    }\n    n ...? {\n        n = n - 1\n    }\n    error\n}\n",
    );
    match &decls[0] {
        Decl::Func(func) => {
            assert!(matches!(func.body[0], Stmt::If { line: 2, .. }));
            assert!(matches!(func.body[1], Stmt::While { line: 5, .. }));
            assert!(matches!(func.body[2], Stmt::Fail { line: 8 }));
        }
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn unary_negation_and_comparison() {
    let decls = parse("\nNum test(Num n) {\n    result = ~n\n    n = n < 3\n}\n");
    match &decls[0] {
        Decl::Func(func) => {
            assert!(matches!(
                &func.body[0],
                Stmt::Assign {
                    value: Expr::Unary { .. },
                    ..
                }
            ));
            assert!(matches!(
                &func.body[1],
                Stmt::Assign {
                    value: Expr::Binary {
                        op: BinOp::Less,
                        ..
                    },
                    ..
                }
            ));
        }
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn constructor_call_with_literals() {
    let decls = parse("\nPt: x#Num x y#Num\nNum main() {\n    Pt p\n    p = Pt(7, 9)\n}\n");
    match &decls[1] {
        Decl::Func(func) => assert_eq!(
            func.body[1],
            Stmt::Assign {
                dest: AssignDest::Var("p".to_owned()),
                value: Expr::Atom(Atom::Construct {
                    class: "Pt".to_owned(),
                    template_args: vec![],
                    args: vec![Atom::Int(7), Atom::Int(9)],
                }),
                line: 3,
            }
        ),
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn auto_declaration() {
    let decls = parse("\nNum main() {\n    auto a = 2 + 3\n}\n");
    match &decls[0] {
        Decl::Func(func) => assert!(matches!(
            &func.body[0],
            Stmt::VarDeclInit { ty: None, .. }
        )),
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn template_declarations() {
    let decls = parse("\nPair<T>: a#<T> x b#<T>\nNum get<T>(<T> x) {\n    result = 0\n}\n");
    match &decls[0] {
        Decl::Class(class) => {
            assert_eq!(class.template_params, vec!["T".to_owned()]);
            assert_eq!(
                class.fields[0].ty.base,
                TypeBase::Placeholder("T".to_owned())
            );
        }
        other => panic!("expected a class, got {:?}", other),
    }
    match &decls[1] {
        Decl::Func(func) => assert_eq!(func.template_params, vec!["T".to_owned()]),
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn import_declaration() {
    let decls = parse("\nload @/strings\nload lib/extra\nNum main() {\n}\n");
    assert_eq!(
        decls[0],
        Decl::Import(ImportDecl {
            name: "@/strings".to_owned()
        })
    );
    assert_eq!(
        decls[1],
        Decl::Import(ImportDecl {
            name: "lib/extra".to_owned()
        })
    );
}

#[test]
fn general_expression_index_is_rejected() {
    assert!(parse_program(
        "\nNum main() {\n    Num*3 a\n    result = a[i + 1]\n}\n",
        ParseMode::Source
    )
    .is_err());
}

#[test]
fn chained_binary_expression_is_rejected() {
    assert!(parse_program(
        "\nNum main() {\n    result = 1 + 2 + 3\n}\n",
        ParseMode::Source
    )
    .is_err());
}

#[test]
fn mangled_identifiers_only_parse_in_expanded_mode() {
    let source = "\nNum main() {\n    result = getNum(a)\n}\n";
    assert!(parse_program(source, ParseMode::Source).is_err());
    assert!(parse_program(source, ParseMode::Expanded).is_ok());
}

#[test]
fn json_round_trip() {
    let decls = parse("\nPt: x#Num x y#Num\nNum main() {\n    Pt p\n    result = p#x\n}\n");
    let json = serde_json::to_string(&decls).unwrap();
    let back: Vec<Decl> = serde_json::from_str(&json).unwrap();
    assert_eq!(decls, back);
}

#[test]
fn auto_infers_scalar_from_arithmetic() {
    let decls = parse("\nNum main() {\n    auto a = 2 + 3\n    result = a\n}\n");
    let analysis = analyze(&decls).unwrap();
    let main = &analysis.functions[0];
    match &main.body[0] {
        analyzer::Statement::DeclareInit { var, .. } => {
            assert_eq!(var.class_type, "Num");
            assert_eq!(var.array_size, None);
        }
        other => panic!("expected a declaration, got {:?}", other),
    }
}

#[test]
fn auto_infers_class_from_constructor() {
    let decls = parse("\nPt: x#Num x y#Num\nNum main() {\n    auto p = Pt(1, 2)\n}\n");
    let analysis = analyze(&decls).unwrap();
    match &analysis.functions[0].body[0] {
        analyzer::Statement::DeclareInit { var, .. } => assert_eq!(var.class_type, "Pt"),
        other => panic!("expected a declaration, got {:?}", other),
    }
}

#[test]
fn valid_program_has_no_errors() {
    let errors = validation_errors("\nNum factorial(Num n) {\n    result = 1\n}\n");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn undefined_variable_is_reported() {
    let errors = validation_errors("\nNum test() {\n    x = 1\n}\n");
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::UndefinedVariable { name, .. } if name == "x")));
}

#[test]
fn undefined_function_is_reported() {
    let errors = validation_errors("\nNum test() {\n    result = foo()\n}\n");
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::UndefinedFunction { name, .. } if name == "foo")));
}

#[test]
fn result_cannot_be_redeclared() {
    let errors = validation_errors("\nNum test() {\n    Num result\n}\n");
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::ReservedResult { .. })));
}

#[test]
fn argument_count_mismatch_is_reported() {
    let errors = validation_errors(
        "\nNum two(Num a, Num b) {\n    result = a\n}\nNum main() {\n    Num x\n    x = 1\n    result = two(x)\n}\n",
    );
    assert!(errors.iter().any(|e| matches!(
        e,
        AnalysisError::ArgumentCount {
            expected: 2,
            actual: 1,
            ..
        }
    )));
}

#[test]
fn indexing_a_scalar_is_reported() {
    let errors = validation_errors("\nNum test() {\n    Num a\n    a[0] = 1\n}\n");
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::IndexOnNonArray { name, .. } if name == "a")));
}

#[test]
fn array_index_must_be_scalar() {
    let errors = validation_errors(
        "\nNum test() {\n    Num*3 a\n    Num*3 b\n    result = a[b]\n}\n",
    );
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::NonScalarIndex { .. })));
}

#[test]
fn class_type_mismatch_is_reported() {
    let errors = validation_errors(
        "\nPt: x#Num x y#Num\nNum test() {\n    Pt p\n    p = 5\n}\n",
    );
    assert!(errors.iter().any(|e| matches!(
        e,
        AnalysisError::TypeMismatch { expected, actual, .. } if expected == "Pt" && actual == "Num"
    )));
}

#[test]
fn array_size_mismatch_is_reported() {
    let errors = validation_errors(
        "\nNum*3 three() {\n    Num*3 a\n    result = a\n}\nNum main() {\n    Num*4 b\n    b = three()\n}\n",
    );
    assert!(errors.iter().any(|e| matches!(
        e,
        AnalysisError::TypeMismatch { expected, actual, .. }
            if expected == "Num*4" && actual == "Num*3"
    )));
}

#[test]
fn parameters_are_in_scope() {
    let errors = validation_errors("\nNum test(Num x) {\n    result = x\n}\n");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn block_locals_do_not_leak() {
    let errors = validation_errors(
        "\nNum test(Num n) {\n    n ?? {\n        Num inner\n        inner = 1\n    }\n    result = inner\n}\n",
    );
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::UndefinedVariable { name, .. } if name == "inner")));
}
