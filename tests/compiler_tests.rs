mod common;

use common::{table_with, tdl};
use ion11::macros::{
    Cardinality, Expression, MacroRef, MacroTable, MutableMacroTable, ParameterEncoding, TemplateCompiler,
};
use ion11::ErrorType;
use serde_json::json;

/// Every range lies inside its parent's range and inside the tape.
fn assert_ranges_nest(tape: &[Expression], start: usize, end: usize) {
    let mut index = start;
    while index < end {
        let next = tape[index].end_at(index);
        assert!(next > index && next <= end, "expression {index} escapes {start}..{end}");
        if let Some((child_start, child_end)) = tape[index].child_range() {
            assert_eq!(child_start, index + 1);
            assert_ranges_nest(tape, child_start, child_end);
        }
        index = next;
    }
}

#[test]
fn compiled_bodies_have_nested_ranges() {
    let table = table_with(&[json!([
        "macro",
        "m",
        ["a", "b*"],
        ["values", [";", ["literal", ["x", ["y"]]], {"k": ["make_string", "b"]}, "a", ["sum", 1, "a"]]]
    ])])
    .unwrap();
    let Some(m) = table.get(&MacroRef::name("m")) else {
        panic!("macro m was not added");
    };
    let ion11::macros::Macro::Template(template) = m.as_ref() else {
        panic!("expected a template macro");
    };
    assert_ranges_nest(&template.body, 0, template.body.len());
    assert_eq!(template.body[0].end_at(0), template.body.len());
}

#[test]
fn signatures_parse_sigils_and_encodings() {
    let table = table_with(&[json!(["macro", "m", ["flex_uint::a", "b", "?", "c+", "d*"], "a"])]).unwrap();
    let m = table.get(&MacroRef::Address(0)).unwrap();
    let signature = m.signature();
    assert_eq!(signature[0].encoding, ParameterEncoding::FlexUInt);
    assert_eq!(signature[1].cardinality, Cardinality::AtMostOne);
    assert_eq!(signature[2].cardinality, Cardinality::AtLeastOne);
    assert_eq!(signature[3].cardinality, Cardinality::Any);
}

#[test]
fn signature_errors() {
    let cases = [
        json!(["macro", "m", ["*", "a"], "a"]),
        json!(["macro", "m", ["a", "a"], "a"]),
        json!(["macro", "m", ["null"], 1]),
        json!(["macro", "m", ["bogus::a"], "a"]),
        json!(["macro", "m", [], "unbound"]),
        json!(["macro", "m", [], ["no_such_macro"]]),
        json!(["macro", "m", [], ["sum", 1]]),
        json!(["not_macro", "m", [], 1]),
    ];
    for case in cases {
        let table = MutableMacroTable::new();
        let err = TemplateCompiler::new(&table)
            .compile_element(&tdl(case.clone()))
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Signature, "{case}");
    }
}

#[test]
fn duplicate_macro_names_are_rejected() {
    let err = table_with(&[json!(["macro", "m", [], 1]), json!(["macro", "m", [], 2])]).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Signature);
}
