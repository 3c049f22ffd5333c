use crate::parser::{Rule, SoflParser};
use ::pest::*;

#[test]
fn identifier() {
    parses_to! {
        parser: SoflParser,
        input: "counter_2",
        rule: Rule::identifier,
        tokens: [ identifier(0, 9) ]
    };
}

#[test]
fn clazz_needs_two_characters() {
    parses_to! {
        parser: SoflParser,
        input: "Num",
        rule: Rule::clazz,
        tokens: [ clazz(0, 3) ]
    };
    assert!(SoflParser::parse(Rule::clazz, "N").is_err());
}

#[test]
fn integer_literals() {
    parses_to! {
        parser: SoflParser,
        input: "-42",
        rule: Rule::integer,
        tokens: [ integer(0, 3) ]
    };
    parses_to! {
        parser: SoflParser,
        input: "+7",
        rule: Rule::integer,
        tokens: [ integer(0, 2) ]
    };
}

#[test]
fn array_type() {
    parses_to! {
        parser: SoflParser,
        input: "Num*3",
        rule: Rule::type_ref,
        tokens: [
            type_ref(0, 5, [
                array_type(0, 5, [
                    simple_type(0, 3, [ clazz(0, 3) ]),
                    array_size(4, 5, [ integer(4, 5) ])
                ])
            ])
        ]
    };
}

#[test]
fn templated_type() {
    parses_to! {
        parser: SoflParser,
        input: "List<Num>",
        rule: Rule::type_ref,
        tokens: [
            type_ref(0, 9, [
                simple_type(0, 9, [
                    clazz(0, 4),
                    template_args(4, 9, [
                        template_arg(5, 8, [ simple_type(5, 8, [ clazz(5, 8) ]) ])
                    ])
                ])
            ])
        ]
    };
}

#[test]
fn placeholder_type() {
    parses_to! {
        parser: SoflParser,
        input: "<T>",
        rule: Rule::stemplate,
        tokens: [ stemplate(0, 3, [ placeholder(1, 2) ]) ]
    };
}

#[test]
fn field_access() {
    parses_to! {
        parser: SoflParser,
        input: "p#y",
        rule: Rule::field_access,
        tokens: [ field_access(0, 3, [ identifier(0, 1), identifier(2, 3) ]) ]
    };
}

#[test]
fn binary_expression() {
    parses_to! {
        parser: SoflParser,
        input: "a + 2",
        rule: Rule::bin_expr,
        tokens: [
            bin_expr(0, 5, [
                atom(0, 1, [ identifier(0, 1) ]),
                bin_op(2, 3),
                atom(4, 5, [ integer(4, 5) ])
            ])
        ]
    };
}

#[test]
fn function_call_with_template_args() {
    parses_to! {
        parser: SoflParser,
        input: "get<Num>(a)",
        rule: Rule::function_call,
        tokens: [
            function_call(0, 11, [
                identifier(0, 3),
                template_args(3, 8, [
                    template_arg(4, 7, [ simple_type(4, 7, [ clazz(4, 7) ]) ])
                ]),
                atom(9, 10, [ identifier(9, 10) ])
            ])
        ]
    };
}

#[test]
fn comments_are_skipped() {
    let input = "\n// leading comment\nNum main() {\n    // inner comment\n    result = 1\n}\n";
    assert!(SoflParser::parse(Rule::program, input).is_ok());
}

#[test]
fn keywords_require_a_boundary() {
    assert!(SoflParser::parse(Rule::import_decl, "loadlib").is_err());
    assert!(SoflParser::parse(Rule::import_decl, "load lib").is_ok());
}
