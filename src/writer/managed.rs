//! A managed writer: the raw writer plus a symbol table and the stream-level rules.
//!
//! The managed layer writes the version marker before the first value, decides between symbol
//! IDs and inline text, and rejects top-level values a reader would mistake for system values.

use std::io::Write;

use bigdecimal::num_bigint::BigInt;
use tracing::trace;

use super::raw::BinaryRawWriter;
use super::symbols::{LocalSymbolTable, SymbolTable, ION_1_0_SID, ION_SYMBOL_TABLE_SID};
use crate::config::WriterOptions;
use crate::model::{Decimal, Element, ElementData, Int, IonType, SymbolToken, Timestamp, Value};
use crate::{err_help, IonResult};

pub struct ManagedWriter<W: Write, S: SymbolTable = LocalSymbolTable> {
    raw: BinaryRawWriter<W>,
    symbols: S,
    options: WriterOptions,
    ivm_written: bool,
}

impl<W: Write> ManagedWriter<W, LocalSymbolTable> {
    pub fn new(sink: W, options: &WriterOptions) -> IonResult<Self> {
        Self::with_symbol_table(sink, options, LocalSymbolTable::new())
    }
}

impl<W: Write, S: SymbolTable> ManagedWriter<W, S> {
    pub fn with_symbol_table(sink: W, options: &WriterOptions, symbols: S) -> IonResult<Self> {
        Ok(Self {
            raw: BinaryRawWriter::new(sink, options)?,
            symbols,
            options: options.clone(),
            ivm_written: false,
        })
    }

    pub fn symbols(&self) -> &S {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut S {
        &mut self.symbols
    }

    /// The underlying raw writer, for e-expressions and other encoding-level output.
    pub fn raw_mut(&mut self) -> IonResult<&mut BinaryRawWriter<W>> {
        self.ensure_ivm()?;
        Ok(&mut self.raw)
    }

    pub fn depth(&self) -> usize {
        self.raw.depth()
    }

    fn ensure_ivm(&mut self) -> IonResult<()> {
        if self.options.write_ivm && !self.ivm_written {
            self.raw.write_ivm()?;
            self.ivm_written = true;
            trace!("wrote Ion 1.1 version marker");
        }
        Ok(())
    }

    /// The token to write for `text`: a SID if the table knows it and inline text is off.
    fn token_for(&self, text: &str) -> SymbolToken {
        if !self.options.inline_symbol_text {
            if let Some(sid) = self.symbols.find_symbol(text) {
                return SymbolToken::Sid(sid);
            }
        }
        SymbolToken::Text(text.to_string())
    }

    fn resolve(&self, symbol: &SymbolToken) -> SymbolToken {
        match symbol {
            SymbolToken::Text(text) => self.token_for(text),
            SymbolToken::Sid(_) => symbol.clone(),
        }
    }

    fn is_symbol(&self, symbol: &SymbolToken, text: &str, sid: u64) -> bool {
        match symbol {
            SymbolToken::Text(t) => t == text,
            SymbolToken::Sid(s) => *s == sid,
        }
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    pub fn write_value(&mut self, value: &Value) -> IonResult<()> {
        self.ensure_ivm()?;
        match value {
            Value::Symbol(symbol) => self.write_symbol(symbol),
            other => self.raw.write_value(other),
        }
    }

    pub fn write_null(&mut self, ion_type: IonType) -> IonResult<()> {
        self.write_value(&Value::Null(ion_type))
    }

    pub fn write_bool(&mut self, value: bool) -> IonResult<()> {
        self.write_value(&Value::Bool(value))
    }

    pub fn write_int(&mut self, value: impl Into<Int>) -> IonResult<()> {
        self.write_value(&Value::Int(value.into()))
    }

    pub fn write_float(&mut self, value: f64) -> IonResult<()> {
        self.write_value(&Value::Float(value))
    }

    pub fn write_decimal(&mut self, value: Decimal) -> IonResult<()> {
        self.write_value(&Value::Decimal(value))
    }

    pub fn write_timestamp(&mut self, value: Timestamp) -> IonResult<()> {
        self.write_value(&Value::Timestamp(value))
    }

    pub fn write_string(&mut self, value: &str) -> IonResult<()> {
        self.ensure_ivm()?;
        self.raw.write_string(value)
    }

    pub fn write_symbol(&mut self, symbol: &SymbolToken) -> IonResult<()> {
        self.ensure_ivm()?;
        if self.raw.depth() == 0 && self.is_symbol(symbol, "$ion_1_0", ION_1_0_SID) {
            return Err(err_help!(
                Encoding,
                "a top-level $ion_1_0 symbol would be read as a version marker",
                "annotate the symbol or write it as a string"
            ));
        }
        let token = self.resolve(symbol);
        self.raw.write_symbol(&token)
    }

    pub fn write_blob(&mut self, bytes: &[u8]) -> IonResult<()> {
        self.ensure_ivm()?;
        self.raw.write_blob(bytes)
    }

    pub fn write_clob(&mut self, bytes: &[u8]) -> IonResult<()> {
        self.ensure_ivm()?;
        self.raw.write_clob(bytes)
    }

    pub fn add_annotation(&mut self, annotation: &SymbolToken) -> IonResult<()> {
        if self.raw.depth() == 0 && self.is_symbol(annotation, "$ion_symbol_table", ION_SYMBOL_TABLE_SID) {
            return Err(err_help!(
                Encoding,
                "$ion_symbol_table cannot annotate a top-level value",
                "symbol tables are managed by the writer"
            ));
        }
        let token = self.resolve(annotation);
        self.raw.add_annotation(token);
        Ok(())
    }

    pub fn write_field_name(&mut self, name: &str) -> IonResult<()> {
        let token = self.token_for(name);
        self.raw.write_field_name(&token)
    }

    // ------------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------------

    pub fn step_in(&mut self, ion_type: IonType) -> IonResult<()> {
        self.ensure_ivm()?;
        let delimited = self.options.delimited_containers;
        match ion_type {
            IonType::List => self.raw.step_in_list(delimited),
            IonType::SExp => self.raw.step_in_sexp(delimited),
            IonType::Struct => self.raw.step_in_struct(delimited),
            other => Err(err_help!(
                Encoding,
                format!("cannot step into a {}", other),
                "only lists, s-expressions and structs are containers"
            )),
        }
    }

    pub fn step_out(&mut self) -> IonResult<()> {
        self.raw.step_out()
    }

    pub fn write_element(&mut self, element: &Element) -> IonResult<()> {
        for annotation in &element.annotations {
            self.add_annotation(annotation)?;
        }
        match &element.data {
            ElementData::Scalar(value) => self.write_value(value),
            ElementData::List(children) | ElementData::SExp(children) => {
                self.step_in(element.ion_type())?;
                for child in children {
                    self.write_element(child)?;
                }
                self.step_out()
            }
            ElementData::Struct(fields) => {
                self.step_in(IonType::Struct)?;
                for (name, child) in fields {
                    let token = self.resolve(name);
                    self.raw.write_field_name(&token)?;
                    self.write_element(child)?;
                }
                self.step_out()
            }
        }
    }

    /// Writes a JSON document: integers become Ion ints (unsigned values above `i64::MAX` are
    /// written as big ints), other numbers floats, objects structs.
    pub fn write_json(&mut self, json: &serde_json::Value) -> IonResult<()> {
        use serde_json::Value as Json;
        match json {
            Json::Null => self.write_null(IonType::Null),
            Json::Bool(b) => self.write_bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    self.write_int(i)
                } else if let Some(u) = n.as_u64() {
                    self.write_int(BigInt::from(u))
                } else {
                    self.write_float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => self.write_string(s),
            Json::Array(items) => {
                self.step_in(IonType::List)?;
                for item in items {
                    self.write_json(item)?;
                }
                self.step_out()
            }
            Json::Object(fields) => {
                self.step_in(IonType::Struct)?;
                for (name, item) in fields {
                    self.write_field_name(name)?;
                    self.write_json(item)?;
                }
                self.step_out()
            }
        }
    }

    pub fn flush(&mut self) -> IonResult<()> {
        self.ensure_ivm()?;
        self.raw.flush()
    }

    pub fn close(mut self) -> IonResult<W> {
        self.ensure_ivm()?;
        self.raw.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorType;

    fn managed(options: WriterOptions) -> ManagedWriter<Vec<u8>> {
        ManagedWriter::new(Vec::new(), &options).unwrap()
    }

    #[test]
    fn version_marker_is_written_once() {
        let mut writer = managed(WriterOptions::default());
        writer.write_bool(true).unwrap();
        writer.flush().unwrap();
        writer.write_bool(false).unwrap();
        let bytes = writer.close().unwrap();
        assert_eq!(bytes, vec![0xE0, 0x01, 0x01, 0xEA, 0x6E, 0x6F]);
    }

    #[test]
    fn reserved_top_level_symbols_are_rejected() {
        let mut writer = managed(WriterOptions::default());
        let err = writer.write_symbol(&SymbolToken::text("$ion_1_0")).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Encoding);
        assert!(writer.write_symbol(&SymbolToken::Sid(2)).is_err());
        assert!(writer.add_annotation(&SymbolToken::text("$ion_symbol_table")).is_err());

        writer.step_in(IonType::List).unwrap();
        writer.write_symbol(&SymbolToken::text("$ion_1_0")).unwrap();
        writer.step_out().unwrap();
    }

    #[test]
    fn known_symbols_become_sids_when_inline_text_is_off() {
        let options = WriterOptions {
            inline_symbol_text: false,
            write_ivm: false,
            ..WriterOptions::default()
        };
        let mut writer = managed(options);
        writer.write_symbol(&SymbolToken::text("name")).unwrap();
        writer.write_symbol(&SymbolToken::text("zz")).unwrap();
        assert_eq!(writer.close().unwrap(), vec![0xE1, 0x04, 0xA2, b'z', b'z']);
    }

    #[test]
    fn json_objects_become_structs() {
        let options = WriterOptions {
            write_ivm: false,
            ..WriterOptions::default()
        };
        let mut writer = managed(options);
        writer.write_json(&serde_json::json!({"a": [1, true]})).unwrap();
        let bytes = writer.close().unwrap();
        // Struct, FlexSym switch, field "a", list of two values.
        assert_eq!(bytes, vec![0xD7, 0x01, 0xFF, b'a', 0xB3, 0x61, 0x01, 0x6E]);
    }
}
