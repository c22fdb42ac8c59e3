//! Shared builders for the integration tests.

#![allow(dead_code)]

use std::rc::Rc;

use ion11::cli::tdl;
use ion11::config::{EvaluatorOptions, WriterOptions};
use ion11::macros::{compile_invocation, MacroEvaluator, MacroTable, MutableMacroTable, TemplateCompiler};
use ion11::model::Element;
use ion11::writer::BinaryRawWriter;
use ion11::IonResult;

/// A raw writer over a `Vec` with the given prefix preallocation.
pub fn raw_writer(preallocation: u8) -> BinaryRawWriter<Vec<u8>> {
    let options = WriterOptions {
        length_prefix_preallocation: preallocation,
        ..WriterOptions::default()
    };
    BinaryRawWriter::new(Vec::new(), &options).expect("valid writer options")
}

/// Runs `write` against a fresh writer and returns the flushed bytes.
pub fn written(
    preallocation: u8,
    write: impl FnOnce(&mut BinaryRawWriter<Vec<u8>>) -> IonResult<()>,
) -> Vec<u8> {
    let mut writer = raw_writer(preallocation);
    write(&mut writer).expect("write succeeds");
    writer.close().expect("flush succeeds")
}

/// Parses a TDL form given as JSON (arrays are s-expressions, `'text` is a string).
pub fn tdl(json: serde_json::Value) -> Element {
    tdl::to_element(&json).expect("valid TDL")
}

/// Compiles each definition into a fresh table, in order.
pub fn table_with(definitions: &[serde_json::Value]) -> IonResult<MutableMacroTable> {
    let mut table = MutableMacroTable::new();
    for definition in definitions {
        let template = TemplateCompiler::new(&table).compile_element(&tdl(definition.clone()))?;
        table.add(template)?;
    }
    Ok(table)
}

/// Expands `invocation` against `table` and materialises the result.
pub fn expand_with(
    table: MutableMacroTable,
    invocation: serde_json::Value,
    options: &EvaluatorOptions,
) -> IonResult<Vec<Element>> {
    let table: Rc<dyn MacroTable> = Rc::new(table);
    let tape = compile_invocation(table.as_ref(), &tdl(invocation))?;
    let mut evaluator = MacroEvaluator::new(Rc::clone(&table), options);
    evaluator.init_expansion(tape, 0)?;
    evaluator.expand_all()
}

/// Expands `invocation` using only the system macros.
pub fn expand(invocation: serde_json::Value) -> IonResult<Vec<Element>> {
    expand_with(MutableMacroTable::new(), invocation, &EvaluatorOptions::default())
}
