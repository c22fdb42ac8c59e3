//! The `ion11` command-line interface.
//!
//! Each subcommand is a thin wrapper over the library: `varint` over the integer encodings,
//! `encode` over the managed writer, `macros` over the system catalogue, and `expand` over the
//! template compiler and the evaluator.

use std::fs;
use std::path::Path;
use std::process;
use std::rc::Rc;

use bigdecimal::num_bigint::BigInt;
use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Command, Ion11Args, VarintKind};
use crate::cli::diagnostics::IonDiagnostic;
use crate::config::Options;
use crate::encoding::{FixedInt, FixedUInt, WriteBuffer};
use crate::macros::{compile_invocation, MacroEvaluator, MacroTable, MutableMacroTable, TemplateCompiler};
use crate::model::Element;
use crate::writer::ManagedWriter;
use crate::{err_help, err_msg, IonResult};

pub mod args;
pub mod diagnostics;
pub mod output;
pub mod tdl;

/// The main entry point for the CLI.
pub fn run() {
    let args = Ion11Args::parse();
    init_tracing();

    if let Err(e) = execute(args.command) {
        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        if IonDiagnostic::new(&e).render(&mut stderr).is_err() {
            eprintln!("{}", IonDiagnostic::new(&e));
        }
        process::exit(1);
    }
}

/// Installs a stderr subscriber filtered by `RUST_LOG`, defaulting to `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn execute(command: Command) -> IonResult<()> {
    match command {
        Command::Varint { kind, value } => {
            output::print_hex(&encode_varint(kind, &value)?);
            Ok(())
        }
        Command::Encode {
            file,
            delimited,
            preallocation,
            config,
            output: destination,
        } => {
            let mut options = load_options(config.as_deref())?;
            options.writer.delimited_containers |= delimited;
            if let Some(preallocation) = preallocation {
                options.writer.length_prefix_preallocation = preallocation;
            }
            let bytes = encode_json_file(&file, &options)?;
            match destination {
                Some(path) => fs::write(path, &bytes)?,
                None => output::print_hex(&bytes),
            }
            Ok(())
        }
        Command::Macros => Ok(output::print_macros()?),
        Command::Expand { file, config } => {
            let options = load_options(config.as_deref())?;
            let elements = expand_file(&file, &options)?;
            output::print_elements(&elements);
            Ok(())
        }
    }
}

fn load_options(path: Option<&Path>) -> IonResult<Options> {
    match path {
        Some(path) => Options::from_path(path),
        None => Ok(Options::default()),
    }
}

fn read_json(path: &Path) -> IonResult<serde_json::Value> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| err_msg!(Encoding, "'{}' is not valid JSON: {}", path.display(), e))
}

/// Encodes `value` in the chosen primitive encoding.
pub fn encode_varint(kind: VarintKind, value: &str) -> IonResult<Vec<u8>> {
    let value: BigInt = value
        .trim()
        .parse()
        .map_err(|_| err_msg!(Encoding, "'{}' is not an integer", value))?;
    let mut buffer = WriteBuffer::new();
    match kind {
        VarintKind::FlexInt => {
            buffer.write_flex_int_big(&value);
        }
        VarintKind::FixedInt => {
            let length = FixedInt::length_of_big(&value);
            buffer.write_fixed_int_big(&value, length);
        }
        VarintKind::FlexUint | VarintKind::FixedUint => {
            let Some(magnitude) = value.to_biguint() else {
                return Err(err_help!(
                    Encoding,
                    format!("{value} is negative"),
                    "use flex-int or fixed-int for signed values"
                ));
            };
            if kind == VarintKind::FlexUint {
                buffer.write_flex_uint_big(&magnitude);
            } else {
                let length = FixedUInt::length_of_big(&magnitude);
                buffer.write_fixed_uint_big(&magnitude, length);
            }
        }
    }
    Ok(buffer.to_vec())
}

/// Transcodes a JSON file to a complete Ion 1.1 binary stream.
pub fn encode_json_file(path: &Path, options: &Options) -> IonResult<Vec<u8>> {
    let json = read_json(path)?;
    let mut writer = ManagedWriter::new(Vec::new(), &options.writer)?;
    writer.write_json(&json)?;
    writer.close()
}

/// Compiles the document's `macros` and expands its `invoke` form.
pub fn expand_file(path: &Path, options: &Options) -> IonResult<Vec<Element>> {
    let json = read_json(path)?;
    let Some(invoke) = json.get("invoke") else {
        return Err(err_help!(
            Encoding,
            format!("'{}' has no \"invoke\" form", path.display()),
            "expected {\"macros\": [...], \"invoke\": [...]}"
        ));
    };

    let mut table = MutableMacroTable::new();
    let definitions = json.get("macros").and_then(|m| m.as_array()).cloned().unwrap_or_default();
    for definition in &definitions {
        let element = tdl::to_element(definition)?;
        let template = TemplateCompiler::new(&table).compile_element(&element)?;
        table.add(template)?;
    }

    let table: Rc<dyn MacroTable> = Rc::new(table);
    let tape = compile_invocation(table.as_ref(), &tdl::to_element(invoke)?)?;
    let mut evaluator = MacroEvaluator::new(Rc::clone(&table), &options.evaluator);
    evaluator.init_expansion(tape, 0)?;
    evaluator.expand_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorType;

    #[test]
    fn varint_encodings() {
        assert_eq!(encode_varint(VarintKind::FlexUint, "0").unwrap(), vec![0x01]);
        assert_eq!(encode_varint(VarintKind::FlexUint, "128").unwrap(), vec![0x02, 0x02]);
        assert_eq!(encode_varint(VarintKind::FlexInt, "-1").unwrap(), vec![0xFF]);
        assert_eq!(encode_varint(VarintKind::FixedUint, "256").unwrap(), vec![0x00, 0x01]);
        assert_eq!(encode_varint(VarintKind::FixedInt, "-128").unwrap(), vec![0x80]);
    }

    #[test]
    fn negative_unsigned_is_rejected() {
        let err = encode_varint(VarintKind::FlexUint, "-3").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Encoding);
        assert!(encode_varint(VarintKind::FlexInt, "1.5").is_err());
    }
}
