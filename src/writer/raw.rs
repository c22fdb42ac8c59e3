//! The Ion 1.1 binary raw writer.
//!
//! Values are encoded into a [`WriteBuffer`] as they are written. Container lengths are not known
//! when a container is opened, so each length-prefixed container reserves
//! `length_prefix_preallocation` bytes and settles its prefix on `step_out`:
//!
//! - an empty container collapses to its zero-length opcode,
//! - a body of at most 15 bytes moves into the opcode's low nibble (the reservation is compacted
//!   away),
//! - a length whose FlexUInt fits the reservation exactly is backfilled in place,
//! - anything else becomes a [`PatchPoint`] that `flush` applies while copying the buffer out.
//!
//! Every container tracks the final encoded size of its contents, so lengths stay correct even
//! when nested prefixes are patched.

use std::io::Write;

use num_traits::{Signed, ToPrimitive, Zero};
use tracing::{debug, trace};

use super::container::{ArgumentState, ContainerInfo, ContainerType, Framing, PatchPoint};
use crate::config::WriterOptions;
use crate::encoding::opcodes;
use crate::encoding::{FixedInt, FixedUInt, FlexInt, FlexUInt, Presence, PresenceBitmap, WriteBuffer};
use crate::macros::{Cardinality, Macro, Parameter, ParameterEncoding, SystemMacro};
use crate::model::{Decimal, Element, ElementData, Int, IonType, SymbolToken, Timestamp, Value};
use crate::{err_help, err_msg, IonResult};

/// Unknown local offset in the long-form timestamp offset field.
const UNKNOWN_OFFSET: u64 = 0xFFF;
const OFFSET_BIAS: i64 = 1440;

pub struct BinaryRawWriter<W: Write> {
    sink: W,
    buffer: WriteBuffer,
    containers: Vec<ContainerInfo>,
    patch_points: Vec<PatchPoint>,
    annotations: Vec<SymbolToken>,
    preallocation: usize,
    delimited_containers: bool,
}

impl<W: Write> BinaryRawWriter<W> {
    pub fn new(sink: W, options: &WriterOptions) -> IonResult<Self> {
        options.validate()?;
        Ok(Self {
            sink,
            buffer: WriteBuffer::new(),
            containers: vec![ContainerInfo::top()],
            patch_points: Vec::new(),
            annotations: Vec::new(),
            preallocation: options.length_prefix_preallocation as usize,
            delimited_containers: options.delimited_containers,
        })
    }

    pub fn with_defaults(sink: W) -> Self {
        Self {
            sink,
            buffer: WriteBuffer::new(),
            containers: vec![ContainerInfo::top()],
            patch_points: Vec::new(),
            annotations: Vec::new(),
            preallocation: 1,
            delimited_containers: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.containers.len() - 1
    }

    /// Bytes encoded but not yet flushed (reserved prefix bytes included).
    pub fn buffered(&self) -> usize {
        self.buffer.position()
    }

    pub fn patch_point_count(&self) -> usize {
        self.patch_points.len()
    }

    pub fn container_type(&self) -> ContainerType {
        self.top().container_type
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    fn top(&self) -> &ContainerInfo {
        &self.containers[self.containers.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ContainerInfo {
        let last = self.containers.len() - 1;
        &mut self.containers[last]
    }

    // ========================================================================
    // VALUE FRAMING
    // ========================================================================

    /// Validates the position of a tagged value and writes its pending annotations.
    fn begin_value(&mut self) -> IonResult<()> {
        let top = self.top_mut();
        match top.container_type {
            ContainerType::Struct => {
                if !top.has_field_name {
                    return Err(err_help!(
                        Encoding,
                        "a value in a struct needs a field name",
                        "call write_field_name_sid or write_field_name_text first"
                    ));
                }
                top.has_field_name = false;
            }
            ContainerType::EExpression => {
                let parameter = self.next_parameter()?;
                if parameter.encoding.is_tagless() {
                    return Err(err_msg!(
                        Encoding,
                        "parameter '{}' is tagless; use the write_tagless_* methods",
                        parameter.name
                    ));
                }
                self.mark_argument(Presence::Expression, &parameter)?;
            }
            ContainerType::ExpressionGroup => {
                if top.group_encoding.is_tagless() {
                    return Err(err_msg!(
                        Encoding,
                        "a {:?} expression group only accepts tagless values",
                        top.group_encoding
                    ));
                }
            }
            ContainerType::Top | ContainerType::List | ContainerType::SExp => {}
        }
        self.write_pending_annotations()
    }

    fn end_value(&mut self, written: usize) {
        let top = self.top_mut();
        top.length += written;
        top.num_children += 1;
    }

    /// Encodes one tagged scalar.
    fn scalar(&mut self, encode: impl FnOnce(&mut WriteBuffer)) -> IonResult<()> {
        self.begin_value()?;
        let start = self.buffer.position();
        encode(&mut self.buffer);
        let written = self.buffer.position() - start;
        self.end_value(written);
        Ok(())
    }

    fn write_pending_annotations(&mut self) -> IonResult<()> {
        if self.annotations.is_empty() {
            return Ok(());
        }
        let annotations = std::mem::take(&mut self.annotations);
        let start = self.buffer.position();
        write_annotations(&mut self.buffer, &annotations);
        let written = self.buffer.position() - start;
        self.top_mut().length += written;
        Ok(())
    }

    fn reject_annotations(&self, what: &str) -> IonResult<()> {
        if self.annotations.is_empty() {
            Ok(())
        } else {
            Err(err_msg!(Encoding, "{} cannot be annotated", what))
        }
    }

    // ========================================================================
    // SCALARS
    // ========================================================================

    /// Writes the Ion 1.1 version marker. Only valid at the top level.
    pub fn write_ivm(&mut self) -> IonResult<()> {
        if self.depth() > 0 {
            return Err(err_msg!(Encoding, "the version marker cannot be written inside a container"));
        }
        self.reject_annotations("the version marker")?;
        self.buffer.write_bytes(&opcodes::IVM);
        Ok(())
    }

    pub fn write_null(&mut self, ion_type: IonType) -> IonResult<()> {
        self.scalar(|buffer| match opcodes::typed_null_byte(ion_type) {
            None => buffer.write_byte(opcodes::NULL_UNTYPED),
            Some(type_byte) => buffer.write_bytes(&[opcodes::NULL_TYPED, type_byte]),
        })
    }

    pub fn write_bool(&mut self, value: bool) -> IonResult<()> {
        let opcode = if value { opcodes::BOOL_TRUE } else { opcodes::BOOL_FALSE };
        self.scalar(|buffer| buffer.write_byte(opcode))
    }

    pub fn write_i64(&mut self, value: i64) -> IonResult<()> {
        self.scalar(|buffer| write_int_body(buffer, &Int::I64(value)))
    }

    pub fn write_int(&mut self, value: &Int) -> IonResult<()> {
        self.scalar(|buffer| write_int_body(buffer, value))
    }

    /// Writes `0e0` as a bare opcode, values that survive a round trip through `f32` in four
    /// bytes, and everything else in eight.
    pub fn write_float(&mut self, value: f64) -> IonResult<()> {
        self.scalar(|buffer| {
            if value == 0.0 && value.is_sign_positive() {
                buffer.write_byte(opcodes::FLOAT_ZERO);
            } else if value.is_nan() || (value as f32) as f64 == value {
                buffer.write_byte(opcodes::FLOAT_32);
                buffer.write_bytes(&(value as f32).to_le_bytes());
            } else {
                buffer.write_byte(opcodes::FLOAT_64);
                buffer.write_bytes(&value.to_le_bytes());
            }
        })
    }

    pub fn write_decimal(&mut self, value: &Decimal) -> IonResult<()> {
        let body = decimal_body(value);
        self.scalar(|buffer| {
            write_with_length(buffer, Some(opcodes::DECIMAL_BASE), opcodes::VARIABLE_DECIMAL, &body)
        })
    }

    /// Writes a timestamp in the long form.
    pub fn write_timestamp(&mut self, value: &Timestamp) -> IonResult<()> {
        value.validate().map_err(|e| err_msg!(Encoding, "cannot write timestamp {}: {}", value, e))?;
        let body = timestamp_body(value);
        self.scalar(|buffer| write_with_length(buffer, None, opcodes::VARIABLE_TIMESTAMP, &body))
    }

    pub fn write_string(&mut self, value: &str) -> IonResult<()> {
        self.scalar(|buffer| {
            write_with_length(buffer, Some(opcodes::STRING_BASE), opcodes::VARIABLE_STRING, value.as_bytes())
        })
    }

    pub fn write_symbol_id(&mut self, sid: u64) -> IonResult<()> {
        self.scalar(|buffer| {
            if sid < opcodes::SYMBOL_SID_2_BIAS {
                buffer.write_byte(opcodes::SYMBOL_SID_1);
                buffer.write_fixed_uint(sid, 1);
            } else if sid < opcodes::SYMBOL_SID_FLEX_BIAS {
                buffer.write_byte(opcodes::SYMBOL_SID_2);
                buffer.write_fixed_uint(sid - opcodes::SYMBOL_SID_2_BIAS, 2);
            } else {
                buffer.write_byte(opcodes::SYMBOL_SID_FLEX);
                buffer.write_flex_uint(sid - opcodes::SYMBOL_SID_FLEX_BIAS);
            }
        })
    }

    pub fn write_symbol_text(&mut self, text: &str) -> IonResult<()> {
        self.scalar(|buffer| {
            write_with_length(
                buffer,
                Some(opcodes::SYMBOL_TEXT_BASE),
                opcodes::VARIABLE_SYMBOL_TEXT,
                text.as_bytes(),
            )
        })
    }

    pub fn write_symbol(&mut self, symbol: &SymbolToken) -> IonResult<()> {
        match symbol {
            SymbolToken::Sid(sid) => self.write_symbol_id(*sid),
            SymbolToken::Text(text) => self.write_symbol_text(text),
        }
    }

    pub fn write_blob(&mut self, bytes: &[u8]) -> IonResult<()> {
        self.scalar(|buffer| write_with_length(buffer, None, opcodes::VARIABLE_BLOB, bytes))
    }

    pub fn write_clob(&mut self, bytes: &[u8]) -> IonResult<()> {
        self.scalar(|buffer| write_with_length(buffer, None, opcodes::VARIABLE_CLOB, bytes))
    }

    pub fn write_value(&mut self, value: &Value) -> IonResult<()> {
        match value {
            Value::Null(ion_type) => self.write_null(*ion_type),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(i) => self.write_int(i),
            Value::Float(f) => self.write_float(*f),
            Value::Decimal(d) => self.write_decimal(d),
            Value::Timestamp(t) => self.write_timestamp(t),
            Value::String(s) => self.write_string(s),
            Value::Symbol(s) => self.write_symbol(s),
            Value::Blob(b) => self.write_blob(b),
            Value::Clob(c) => self.write_clob(c),
        }
    }

    /// Writes a materialised element, using delimited containers if the writer was configured
    /// with `delimited_containers`.
    pub fn write_element(&mut self, element: &Element) -> IonResult<()> {
        for annotation in &element.annotations {
            self.add_annotation(annotation.clone());
        }
        let delimited = self.delimited_containers;
        match &element.data {
            ElementData::Scalar(value) => self.write_value(value),
            ElementData::List(children) | ElementData::SExp(children) => {
                if matches!(element.data, ElementData::List(_)) {
                    self.step_in_list(delimited)?;
                } else {
                    self.step_in_sexp(delimited)?;
                }
                for child in children {
                    self.write_element(child)?;
                }
                self.step_out()
            }
            ElementData::Struct(fields) => {
                self.step_in_struct(delimited)?;
                for (name, child) in fields {
                    self.write_field_name(name)?;
                    self.write_element(child)?;
                }
                self.step_out()
            }
        }
    }

    // ========================================================================
    // ANNOTATIONS AND FIELD NAMES
    // ========================================================================

    /// Queues an annotation for the next value.
    pub fn add_annotation(&mut self, annotation: SymbolToken) {
        self.annotations.push(annotation);
    }

    pub fn add_annotation_sid(&mut self, sid: u64) {
        self.add_annotation(SymbolToken::Sid(sid));
    }

    pub fn add_annotation_text(&mut self, text: &str) {
        self.add_annotation(SymbolToken::Text(text.to_string()));
    }

    pub fn write_field_name_sid(&mut self, sid: u64) -> IonResult<()> {
        self.write_field_name(&SymbolToken::Sid(sid))
    }

    pub fn write_field_name_text(&mut self, text: &str) -> IonResult<()> {
        self.write_field_name(&SymbolToken::Text(text.to_string()))
    }

    pub fn write_field_name(&mut self, name: &SymbolToken) -> IonResult<()> {
        let Some(top) = self.containers.last_mut() else {
            return Err(err_msg!(Internal, "container stack is empty"));
        };
        if top.container_type != ContainerType::Struct {
            return Err(err_msg!(Encoding, "field name '{}' written outside a struct", name));
        }
        if top.has_field_name {
            return Err(err_msg!(Encoding, "field name '{}' follows another field name", name));
        }
        let start = self.buffer.position();
        match name {
            SymbolToken::Sid(sid) if *sid > 0 && !top.flex_sym_mode => {
                self.buffer.write_flex_uint(*sid);
            }
            _ => {
                if !top.flex_sym_mode {
                    // FlexUInt zero switches the struct to FlexSym field names.
                    self.buffer.write_byte(opcodes::FLEX_UINT_ZERO);
                    top.flex_sym_mode = true;
                }
                write_flex_sym(&mut self.buffer, name);
            }
        }
        top.length += self.buffer.position() - start;
        top.has_field_name = true;
        Ok(())
    }

    // ========================================================================
    // CONTAINERS
    // ========================================================================

    pub fn step_in_list(&mut self, delimited: bool) -> IonResult<()> {
        self.step_in_container(ContainerType::List, delimited)
    }

    pub fn step_in_sexp(&mut self, delimited: bool) -> IonResult<()> {
        self.step_in_container(ContainerType::SExp, delimited)
    }

    pub fn step_in_struct(&mut self, delimited: bool) -> IonResult<()> {
        self.step_in_container(ContainerType::Struct, delimited)
    }

    fn step_in_container(&mut self, container_type: ContainerType, delimited: bool) -> IonResult<()> {
        self.begin_value()?;
        let position = self.buffer.position();
        let mut info = if delimited {
            self.buffer.write_byte(container_type.delimited_opcode());
            let mut info = ContainerInfo::new(container_type, Framing::Delimited, position);
            info.flex_sym_mode = container_type == ContainerType::Struct;
            info
        } else {
            self.buffer.write_byte(container_type.inline_base());
            self.buffer.reserve(self.preallocation);
            let mut info = ContainerInfo::new(container_type, Framing::Prefixed, position);
            info.preallocated = self.preallocation;
            info
        };
        info.metadata_offset = 1;
        self.containers.push(info);
        Ok(())
    }

    /// Opens an e-expression invoking the user macro at `address`.
    ///
    /// Addresses beyond the reach of the two-byte form are always written length-prefixed.
    pub fn step_in_eexp(&mut self, address: usize, length_prefixed: bool, invoked: &Macro) -> IonResult<()> {
        self.begin_eexp()?;
        let position = self.buffer.position();
        let length_prefixed = length_prefixed || address >= opcodes::EEXP_LENGTH_PREFIXED_MIN;
        if length_prefixed {
            self.buffer.write_byte(opcodes::EEXP_LENGTH_PREFIXED);
            self.buffer.write_flex_uint(address as u64);
        } else if address <= opcodes::EEXP_INLINE_MAX as usize {
            self.buffer.write_byte(address as u8);
        } else if address < opcodes::EEXP_TWO_BYTE_BIAS {
            let biased = address - opcodes::EEXP_ONE_BYTE_BIAS;
            self.buffer.write_byte(opcodes::EEXP_ONE_BYTE_BASE | (biased & 0x0F) as u8);
            self.buffer.write_fixed_uint((biased >> 4) as u64, 1);
        } else {
            let biased = address - opcodes::EEXP_TWO_BYTE_BIAS;
            self.buffer.write_byte(opcodes::EEXP_TWO_BYTE_BASE | (biased & 0x0F) as u8);
            self.buffer.write_fixed_uint((biased >> 4) as u64, 2);
        }
        let framing = if length_prefixed { Framing::Prefixed } else { Framing::None };
        self.open_eexp(position, framing, invoked.signature())
    }

    /// Opens an e-expression invoking a system macro.
    pub fn step_in_system_eexp(&mut self, system: SystemMacro) -> IonResult<()> {
        self.begin_eexp()?;
        let position = self.buffer.position();
        self.buffer.write_byte(opcodes::SYSTEM_EEXP);
        self.buffer.write_fixed_uint(system.address() as u64, 1);
        self.open_eexp(position, Framing::None, system.signature())
    }

    fn begin_eexp(&mut self) -> IonResult<()> {
        self.reject_annotations("an e-expression")?;
        self.begin_value()
    }

    fn open_eexp(&mut self, position: usize, framing: Framing, signature: &[Parameter]) -> IonResult<()> {
        let bitmap = PresenceBitmap::new(signature)?;
        let mut info = ContainerInfo::new(ContainerType::EExpression, framing, position);
        info.metadata_offset = self.buffer.position() - position;
        if framing == Framing::Prefixed {
            self.buffer.reserve(self.preallocation);
            info.preallocated = self.preallocation;
        }
        let bitmap_position = self.buffer.position();
        self.buffer.reserve(bitmap.byte_size());
        info.length = bitmap.byte_size();
        info.arguments = Some(Box::new(ArgumentState {
            parameters: signature.to_vec(),
            bitmap,
            bitmap_position,
        }));
        self.containers.push(info);
        Ok(())
    }

    /// Opens an expression group for the next argument of the enclosing e-expression.
    ///
    /// Groups of tagless parameters are always length-prefixed.
    pub fn step_in_expression_group(&mut self, delimited: bool) -> IonResult<()> {
        if self.top().container_type != ContainerType::EExpression {
            return Err(err_msg!(Encoding, "expression groups can only be written as e-expression arguments"));
        }
        self.reject_annotations("an expression group")?;
        let parameter = self.next_parameter()?;
        if parameter.cardinality == Cardinality::One {
            return Err(err_msg!(
                Encoding,
                "parameter '{}' takes exactly one value and cannot receive a group",
                parameter.name
            ));
        }
        if parameter.cardinality == Cardinality::AtMostOne && self.has_bitmap() {
            return Err(err_msg!(
                Encoding,
                "parameter '{}' takes at most one value; write it directly or mark it absent",
                parameter.name
            ));
        }
        let position = self.buffer.position();
        let delimited = delimited && !parameter.encoding.is_tagless();
        let mut info = if delimited {
            self.buffer.write_byte(opcodes::FLEX_UINT_ZERO);
            let mut info = ContainerInfo::new(ContainerType::ExpressionGroup, Framing::Delimited, position);
            info.metadata_offset = 1;
            info
        } else {
            self.buffer.reserve(self.preallocation);
            let mut info = ContainerInfo::new(ContainerType::ExpressionGroup, Framing::Prefixed, position);
            info.preallocated = self.preallocation;
            info
        };
        info.group_encoding = parameter.encoding;
        self.containers.push(info);
        Ok(())
    }

    /// Marks the next e-expression argument as absent.
    pub fn write_absent_argument(&mut self) -> IonResult<()> {
        if self.top().container_type != ContainerType::EExpression {
            return Err(err_msg!(Encoding, "absent arguments can only be written inside an e-expression"));
        }
        self.reject_annotations("an absent argument")?;
        let parameter = self.next_parameter()?;
        self.write_absent(&parameter)?;
        self.top_mut().num_children += 1;
        Ok(())
    }

    fn write_absent(&mut self, parameter: &Parameter) -> IonResult<()> {
        if parameter.cardinality.min() > 0 {
            return Err(err_msg!(
                Encoding,
                "parameter '{}' requires at least one value",
                parameter.name
            ));
        }
        if self.has_bitmap() {
            return self.mark_argument(Presence::Void, parameter);
        }
        // Without a bitmap an absent argument is the empty delimited group.
        self.buffer.write_bytes(&[opcodes::FLEX_UINT_ZERO, opcodes::DELIMITED_END]);
        self.top_mut().length += 2;
        Ok(())
    }

    fn has_bitmap(&self) -> bool {
        self.top()
            .arguments
            .as_ref()
            .is_some_and(|args| args.bitmap.is_written())
    }

    /// The parameter the next argument of the innermost e-expression binds to.
    fn next_parameter(&self) -> IonResult<Parameter> {
        let top = self.top();
        let Some(arguments) = &top.arguments else {
            return Err(err_msg!(Internal, "e-expression frame has no argument state"));
        };
        arguments.parameters.get(top.num_children).cloned().ok_or_else(|| {
            err_msg!(
                Encoding,
                "too many arguments: the macro takes {}",
                arguments.parameters.len()
            )
        })
    }

    /// Records the presence of the argument being written for `parameter`.
    fn mark_argument(&mut self, presence: Presence, parameter: &Parameter) -> IonResult<()> {
        let top = self.top_mut();
        let index = top.num_children;
        let Some(arguments) = top.arguments.as_mut() else {
            return Err(err_msg!(Internal, "e-expression frame has no argument state"));
        };
        if arguments.bitmap.is_written() {
            arguments.bitmap.set(index, presence);
        } else if presence == Presence::Expression && parameter.cardinality != Cardinality::One {
            return Err(err_help!(
                Encoding,
                format!("parameter '{}' must be written as an expression group", parameter.name),
                "this signature has no presence bitmap, so variadic arguments are always groups"
            ));
        }
        Ok(())
    }

    // ========================================================================
    // TAGLESS ARGUMENTS
    // ========================================================================

    /// Resolves the tagless encoding for the next argument value.
    fn begin_tagless(&mut self) -> IonResult<ParameterEncoding> {
        self.reject_annotations("a tagless value")?;
        match self.top().container_type {
            ContainerType::EExpression => {
                let parameter = self.next_parameter()?;
                if !parameter.encoding.is_tagless() {
                    return Err(err_msg!(Encoding, "parameter '{}' is tagged", parameter.name));
                }
                self.mark_argument(Presence::Expression, &parameter)?;
                Ok(parameter.encoding)
            }
            ContainerType::ExpressionGroup if self.top().group_encoding.is_tagless() => {
                Ok(self.top().group_encoding)
            }
            _ => Err(err_msg!(Encoding, "tagless values can only be written as e-expression arguments")),
        }
    }

    pub fn write_tagless_int(&mut self, value: impl Into<Int>) -> IonResult<()> {
        let value = value.into();
        let encoding = self.begin_tagless()?;
        let big = value.to_big();
        let start = self.buffer.position();
        match encoding {
            ParameterEncoding::FlexUInt => {
                let magnitude = big
                    .to_biguint()
                    .ok_or_else(|| err_msg!(Encoding, "flex_uint argument cannot be negative: {}", value))?;
                self.buffer.write_flex_uint_big(&magnitude);
            }
            ParameterEncoding::FlexInt => {
                self.buffer.write_flex_int_big(&big);
            }
            ParameterEncoding::UInt8 | ParameterEncoding::UInt16 | ParameterEncoding::UInt32 | ParameterEncoding::UInt64 => {
                let width = encoding.fixed_width().unwrap_or(8);
                let fits = big.to_u64().filter(|v| width == 8 || *v < 1u64 << (8 * width));
                let Some(v) = fits else {
                    return Err(err_msg!(Encoding, "{} does not fit in {:?}", value, encoding));
                };
                self.buffer.write_fixed_uint(v, width);
            }
            ParameterEncoding::Int8 | ParameterEncoding::Int16 | ParameterEncoding::Int32 | ParameterEncoding::Int64 => {
                let width = encoding.fixed_width().unwrap_or(8);
                let fits = big.to_i64().filter(|v| width == 8 || FixedInt::length_of(*v) <= width);
                let Some(v) = fits else {
                    return Err(err_msg!(Encoding, "{} does not fit in {:?}", value, encoding));
                };
                self.buffer.write_fixed_int(v, width);
            }
            other => {
                return Err(err_msg!(Encoding, "cannot write an int as a {:?} argument", other));
            }
        }
        let written = self.buffer.position() - start;
        self.end_value(written);
        Ok(())
    }

    pub fn write_tagless_float(&mut self, value: f64) -> IonResult<()> {
        let encoding = self.begin_tagless()?;
        match encoding {
            ParameterEncoding::Float32 => self.buffer.write_bytes(&(value as f32).to_le_bytes()),
            ParameterEncoding::Float64 => self.buffer.write_bytes(&value.to_le_bytes()),
            other => return Err(err_msg!(Encoding, "cannot write a float as a {:?} argument", other)),
        }
        let written = encoding.fixed_width().unwrap_or(8);
        self.end_value(written);
        Ok(())
    }

    pub fn write_tagless_symbol(&mut self, symbol: &SymbolToken) -> IonResult<()> {
        let encoding = self.begin_tagless()?;
        if encoding != ParameterEncoding::FlexSym {
            return Err(err_msg!(Encoding, "cannot write a symbol as a {:?} argument", encoding));
        }
        let written = write_flex_sym(&mut self.buffer, symbol);
        self.end_value(written);
        Ok(())
    }

    // ========================================================================
    // STEP OUT
    // ========================================================================

    pub fn step_out(&mut self) -> IonResult<()> {
        if self.depth() == 0 {
            return Err(err_msg!(Encoding, "step_out called with no open container"));
        }
        let mut info = match self.containers.pop() {
            Some(info) => info,
            None => return Err(err_msg!(Internal, "container stack is empty")),
        };
        if info.has_field_name {
            let name_error = err_msg!(Encoding, "struct closed after a field name with no value");
            self.containers.push(info);
            return Err(name_error);
        }
        let closed = match info.container_type {
            ContainerType::List | ContainerType::SExp | ContainerType::Struct => Ok(self.close_data_model(&mut info)),
            ContainerType::EExpression => self.close_eexp(&mut info),
            ContainerType::ExpressionGroup => self.close_group(&mut info),
            ContainerType::Top => Err(err_msg!(Internal, "popped the top-level frame")),
        };
        // A container that fails to close stays open.
        let total = match closed {
            Ok(total) => total,
            Err(e) => {
                self.containers.push(info);
                return Err(e);
            }
        };
        let parent = self.top_mut();
        parent.length += total;
        parent.num_children += 1;
        Ok(())
    }

    /// Settles a list, s-expression, or struct and returns its full encoded size.
    fn close_data_model(&mut self, info: &mut ContainerInfo) -> usize {
        let base = info.container_type.inline_base();
        if info.num_children == 0 {
            // Empty containers are a bare zero-length opcode, whatever their framing.
            self.buffer.truncate(info.position + 1);
            self.buffer.write_byte_at(info.position, base);
            return 1;
        }
        match info.framing {
            Framing::Delimited => {
                if info.container_type == ContainerType::Struct {
                    self.buffer.write_bytes(&[opcodes::FLEX_SYM_ESCAPE, opcodes::FLEX_SYM_END]);
                    info.length += 2;
                } else {
                    self.buffer.write_byte(opcodes::DELIMITED_END);
                    info.length += 1;
                }
                1 + info.length
            }
            _ => {
                if info.patch_index.is_none() && info.length <= opcodes::MAX_INLINE_LENGTH {
                    self.buffer.shift_bytes_left(info.length, info.preallocated);
                    self.buffer.write_byte_at(info.position, base + info.length as u8);
                    1 + info.length
                } else {
                    self.buffer.write_byte_at(info.position, info.container_type.variable_opcode());
                    1 + self.write_container_length(info) + info.length
                }
            }
        }
    }

    fn close_eexp(&mut self, info: &mut ContainerInfo) -> IonResult<usize> {
        let Some(arguments) = info.arguments.as_ref() else {
            return Err(err_msg!(Internal, "e-expression frame has no argument state"));
        };
        let written = info.num_children.min(arguments.parameters.len());
        // Trailing arguments that were never written are absent.
        for parameter in &arguments.parameters[written..] {
            if parameter.cardinality.min() > 0 {
                return Err(err_msg!(Encoding, "missing argument for parameter '{}'", parameter.name));
            }
            if !arguments.bitmap.is_written() {
                self.buffer.write_bytes(&[opcodes::FLEX_UINT_ZERO, opcodes::DELIMITED_END]);
                info.length += 2;
            }
        }
        if arguments.bitmap.is_written() {
            arguments.bitmap.validate()?;
            let mut bytes = Vec::with_capacity(arguments.bitmap.byte_size());
            arguments.bitmap.write_to(&mut bytes);
            self.buffer.write_bytes_at(arguments.bitmap_position, &bytes);
        }
        let prefix = match info.framing {
            Framing::Prefixed => self.write_container_length(info),
            _ => 0,
        };
        Ok(info.metadata_offset + prefix + info.length)
    }

    fn close_group(&mut self, info: &mut ContainerInfo) -> IonResult<usize> {
        let bitmap = self.has_bitmap();
        let parameter = self.next_parameter()?;
        if info.num_children == 0 {
            if parameter.cardinality.min() > 0 {
                return Err(err_msg!(Encoding, "parameter '{}' requires at least one value", parameter.name));
            }
            self.buffer.truncate(info.position);
            if bitmap {
                // An empty group collapses to VOID.
                self.mark_argument(Presence::Void, &parameter)?;
                return Ok(0);
            }
            self.buffer.write_bytes(&[opcodes::FLEX_UINT_ZERO, opcodes::DELIMITED_END]);
            return Ok(2);
        }
        self.mark_argument(Presence::Group, &parameter)?;
        match info.framing {
            Framing::Delimited => {
                self.buffer.write_byte(opcodes::DELIMITED_END);
                Ok(info.metadata_offset + info.length + 1)
            }
            _ => Ok(self.write_container_length(info) + info.length),
        }
    }

    /// Writes the length prefix of a container that was just popped and returns its final size.
    fn write_container_length(&mut self, info: &mut ContainerInfo) -> usize {
        let length = info.length as u64;
        let required = FlexUInt::length_of(length);
        let position = info.length_position();
        if let Some(index) = info.patch_index {
            self.patch_points[index].length = length;
            return required;
        }
        if required == info.preallocated {
            self.buffer.write_flex_uint_at(position, length, required);
            return required;
        }
        self.ensure_ancestor_patch_points();
        info.patch_index = Some(self.patch_points.len());
        self.patch_points.push(PatchPoint {
            old_position: position,
            old_length: info.preallocated,
            length,
        });
        trace!(position, length, preallocated = info.preallocated, "allocated patch point");
        required
    }

    /// Gives every open length-prefixed ancestor a patch point, outermost first, so the patch
    /// queue stays ordered by position.
    fn ensure_ancestor_patch_points(&mut self) {
        let mut first = self.containers.len();
        while first > 1 {
            let info = &self.containers[first - 1];
            if info.patch_index.is_some() {
                break;
            }
            first -= 1;
        }
        for index in first..self.containers.len() {
            let info = &mut self.containers[index];
            if info.framing != Framing::Prefixed {
                continue;
            }
            info.patch_index = Some(self.patch_points.len());
            self.patch_points.push(PatchPoint {
                old_position: info.length_position(),
                old_length: info.preallocated,
                length: 0,
            });
            trace!(position = info.position, "allocated ancestor patch point");
        }
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Writes everything buffered to the sink, applying patch points, and clears the buffer.
    pub fn flush(&mut self) -> IonResult<()> {
        if self.depth() > 0 {
            return Err(err_msg!(Encoding, "cannot flush with {} open container(s)", self.depth()));
        }
        self.reject_annotations("the end of the stream")?;
        let mut written = 0;
        let mut cursor = 0;
        for patch in &self.patch_points {
            self.buffer
                .write_range_to(&mut self.sink, cursor, patch.old_position - cursor)?;
            let length = FlexUInt::encode(patch.length);
            self.sink.write_all(&length)?;
            written += patch.old_position - cursor + length.len();
            cursor = patch.old_position + patch.old_length;
        }
        let rest = self.buffer.position() - cursor;
        self.buffer.write_range_to(&mut self.sink, cursor, rest)?;
        written += rest;
        self.sink.flush()?;
        debug!(bytes = written, patch_points = self.patch_points.len(), "flushed binary writer");
        self.buffer.reset();
        self.patch_points.clear();
        let top = self.top_mut();
        top.length = 0;
        top.num_children = 0;
        Ok(())
    }

    /// Flushes and returns the sink.
    pub fn close(mut self) -> IonResult<W> {
        self.flush()?;
        Ok(self.sink)
    }
}

// ============================================================================
// ENCODING HELPERS
// ============================================================================

/// Writes `body` behind an opcode carrying its length, or behind `variable` and a FlexUInt.
fn write_with_length(buffer: &mut WriteBuffer, inline_base: Option<u8>, variable: u8, body: &[u8]) {
    match inline_base {
        Some(base) if body.len() <= opcodes::MAX_INLINE_LENGTH => buffer.write_byte(base + body.len() as u8),
        _ => {
            buffer.write_byte(variable);
            buffer.write_flex_uint(body.len() as u64);
        }
    }
    buffer.write_bytes(body);
}

fn write_int_body(buffer: &mut WriteBuffer, value: &Int) {
    match value {
        Int::I64(0) => buffer.write_byte(opcodes::INTEGER_BASE),
        Int::I64(v) => {
            let length = FixedInt::length_of(*v);
            buffer.write_byte(opcodes::INTEGER_BASE + length as u8);
            buffer.write_fixed_int(*v, length);
        }
        Int::Big(big) => {
            let length = FixedInt::length_of_big(big);
            if length <= 8 {
                buffer.write_byte(opcodes::INTEGER_BASE + length as u8);
            } else {
                buffer.write_byte(opcodes::VARIABLE_INTEGER);
                buffer.write_flex_uint(length as u64);
            }
            buffer.write_fixed_int_big(big, length);
        }
    }
}

/// FlexInt exponent, then a FixedInt coefficient. A zero coefficient is omitted; a single zero
/// byte marks negative zero.
fn decimal_body(value: &Decimal) -> Vec<u8> {
    let mut body = FlexInt::encode(value.exponent);
    let coefficient = value.coefficient.to_big();
    if coefficient.is_zero() {
        if value.negative_zero {
            body.push(0x00);
        }
        return body;
    }
    let length = FixedInt::length_of_big(&coefficient);
    let start = body.len();
    body.resize(start + length, 0);
    FixedInt::write_big(&mut body, start, &coefficient, length);
    body
}

/// The long-form timestamp body.
///
/// Bit fields, least significant first: year (14), month (4), day (5), hour (5), minute (6),
/// offset (12, biased by 1440, all ones when unknown), second (6). Precision selects how many
/// bytes are kept: 2 for a year, 3 for a month or day, 6 for minutes, 7 for seconds. Fractional
/// seconds follow as a FlexUInt scale and a FixedUInt coefficient.
fn timestamp_body(value: &Timestamp) -> Vec<u8> {
    let mut bits = value.year as u64;
    bits |= (value.month.unwrap_or(0) as u64) << 14;
    bits |= (value.day.unwrap_or(0) as u64) << 18;
    let length = if value.month.is_none() {
        2
    } else if value.minute.is_none() {
        3
    } else {
        bits |= (value.hour.unwrap_or(0) as u64) << 23;
        bits |= (value.minute.unwrap_or(0) as u64) << 28;
        let offset = match value.offset_minutes {
            Some(offset) => (offset as i64 + OFFSET_BIAS) as u64,
            None => UNKNOWN_OFFSET,
        };
        bits |= offset << 34;
        match value.second {
            None => 6,
            Some(second) => {
                bits |= (second as u64) << 46;
                7
            }
        }
    };
    let mut body = bits.to_le_bytes()[..length].to_vec();
    if let Some((coefficient, scale)) = &value.fraction {
        body.extend(FlexUInt::encode(*scale as u64));
        let magnitude = coefficient.abs().to_biguint().unwrap_or_default();
        let width = FixedUInt::length_of_big(&magnitude);
        let start = body.len();
        body.resize(start + width, 0);
        FixedUInt::write_big(&mut body, start, &magnitude, width);
    }
    body
}

fn flex_sym_length(symbol: &SymbolToken) -> usize {
    match symbol {
        SymbolToken::Sid(0) => 2,
        SymbolToken::Sid(sid) => FlexInt::length_of(*sid as i64),
        SymbolToken::Text(text) if text.is_empty() => 2,
        SymbolToken::Text(text) => FlexInt::length_of(-(text.len() as i64)) + text.len(),
    }
}

/// Writes a FlexSym and returns its length.
///
/// A positive FlexInt is a SID, a negative one the length of inline UTF-8 text. Zero escapes to
/// `$0` and empty text.
fn write_flex_sym(buffer: &mut WriteBuffer, symbol: &SymbolToken) -> usize {
    match symbol {
        SymbolToken::Sid(0) => buffer.write_bytes(&[opcodes::FLEX_SYM_ESCAPE, opcodes::FLEX_SYM_SID_ZERO]),
        SymbolToken::Sid(sid) => {
            buffer.write_flex_int(*sid as i64);
        }
        SymbolToken::Text(text) if text.is_empty() => {
            buffer.write_bytes(&[opcodes::FLEX_SYM_ESCAPE, opcodes::FLEX_SYM_EMPTY_TEXT])
        }
        SymbolToken::Text(text) => {
            buffer.write_flex_int(-(text.len() as i64));
            buffer.write_bytes(text.as_bytes());
        }
    }
    flex_sym_length(symbol)
}

fn write_annotations(buffer: &mut WriteBuffer, annotations: &[SymbolToken]) {
    let sids: Option<Vec<u64>> = annotations
        .iter()
        .map(|a| match a {
            SymbolToken::Sid(sid) => Some(*sid),
            SymbolToken::Text(_) => None,
        })
        .collect();
    match sids {
        Some(sids) => {
            match sids.len() {
                1 => buffer.write_byte(opcodes::ANNOTATIONS_1_SID),
                2 => buffer.write_byte(opcodes::ANNOTATIONS_2_SID),
                _ => {
                    buffer.write_byte(opcodes::ANNOTATIONS_N_SID);
                    let total: usize = sids.iter().map(|sid| FlexUInt::length_of(*sid)).sum();
                    buffer.write_flex_uint(total as u64);
                }
            }
            for sid in sids {
                buffer.write_flex_uint(sid);
            }
        }
        None => {
            match annotations.len() {
                1 => buffer.write_byte(opcodes::ANNOTATIONS_1_FLEXSYM),
                2 => buffer.write_byte(opcodes::ANNOTATIONS_2_FLEXSYM),
                _ => {
                    buffer.write_byte(opcodes::ANNOTATIONS_N_FLEXSYM);
                    let total: usize = annotations.iter().map(flex_sym_length).sum();
                    buffer.write_flex_uint(total as u64);
                }
            }
            for annotation in annotations {
                write_flex_sym(buffer, annotation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> BinaryRawWriter<Vec<u8>> {
        BinaryRawWriter::with_defaults(Vec::new())
    }

    fn bytes(writer: BinaryRawWriter<Vec<u8>>) -> Vec<u8> {
        writer.close().unwrap()
    }

    #[test]
    fn ints_use_the_shortest_fixed_width() {
        let mut w = writer();
        w.write_i64(0).unwrap();
        w.write_i64(1).unwrap();
        w.write_i64(-1).unwrap();
        w.write_i64(128).unwrap();
        assert_eq!(bytes(w), vec![0x60, 0x61, 0x01, 0x61, 0xFF, 0x62, 0x80, 0x00]);
    }

    #[test]
    fn floats_pick_the_narrowest_lossless_width() {
        let mut w = writer();
        w.write_float(0.0).unwrap();
        w.write_float(1.5).unwrap();
        w.write_float(0.1).unwrap();
        let out = bytes(w);
        assert_eq!(&out[..2], &[0x6A, 0x6C]);
        assert_eq!(out[6], 0x6D);
        assert_eq!(out.len(), 1 + 5 + 9);
    }

    #[test]
    fn short_and_long_strings() {
        let mut w = writer();
        w.write_string("hi").unwrap();
        w.write_string(&"x".repeat(16)).unwrap();
        let out = bytes(w);
        assert_eq!(&out[..3], &[0x92, b'h', b'i']);
        assert_eq!(&out[3..5], &[0xF9, 0x21]);
    }

    #[test]
    fn symbol_ids_use_biased_forms() {
        let mut w = writer();
        w.write_symbol_id(4).unwrap();
        w.write_symbol_id(300).unwrap();
        assert_eq!(bytes(w), vec![0xE1, 0x04, 0xE2, 0x2C, 0x00]);
    }

    #[test]
    fn annotations_prefix_the_next_value() {
        let mut w = writer();
        w.add_annotation_sid(4);
        w.write_bool(true).unwrap();
        w.add_annotation_text("a");
        w.write_bool(false).unwrap();
        assert_eq!(bytes(w), vec![0xE4, 0x09, 0x6E, 0xE7, 0xFF, b'a', 0x6F]);
    }

    #[test]
    fn struct_switches_to_flex_sym_field_names() {
        let mut w = writer();
        w.step_in_struct(false).unwrap();
        w.write_field_name_sid(4).unwrap();
        w.write_bool(true).unwrap();
        w.write_field_name_text("a").unwrap();
        w.write_bool(false).unwrap();
        w.step_out().unwrap();
        assert_eq!(bytes(w), vec![0xD6, 0x09, 0x6E, 0x01, 0xFF, b'a', 0x6F]);
    }

    #[test]
    fn delimited_struct_ends_with_flex_sym_escape() {
        let mut w = writer();
        w.step_in_struct(true).unwrap();
        w.write_field_name_text("a").unwrap();
        w.write_i64(1).unwrap();
        w.step_out().unwrap();
        assert_eq!(bytes(w), vec![0xF3, 0xFF, b'a', 0x61, 0x01, 0x01, 0xF0]);
    }

    #[test]
    fn misuse_is_reported() {
        let mut w = writer();
        assert!(w.step_out().is_err());
        assert!(w.write_field_name_text("a").is_err());
        w.step_in_struct(false).unwrap();
        assert!(w.write_bool(true).is_err(), "missing field name");
        assert!(w.step_in_list(false).is_err());
        w.write_field_name_sid(4).unwrap();
        w.step_in_list(false).unwrap();
        assert!(w.write_ivm().is_err());
        assert!(w.flush().is_err());
    }

    #[test]
    fn inline_eexp_with_a_single_required_argument() {
        let mut w = writer();
        w.step_in_system_eexp(SystemMacro::MakeString).unwrap();
        w.step_in_expression_group(false).unwrap();
        w.write_string("a").unwrap();
        w.write_string("b").unwrap();
        w.step_out().unwrap();
        w.step_out().unwrap();
        // make_string (address 9) takes one `*` parameter: no bitmap, so the argument is a group.
        assert_eq!(bytes(w), vec![0xEF, 0x09, 0x09, 0x91, b'a', 0x91, b'b']);
    }

    #[test]
    fn absent_argument_without_bitmap_is_an_empty_delimited_group() {
        let mut w = writer();
        w.step_in_system_eexp(SystemMacro::Values).unwrap();
        w.write_absent_argument().unwrap();
        w.step_out().unwrap();
        assert_eq!(bytes(w), vec![0xEF, 0x01, 0x01, 0xF0]);
    }

    #[test]
    fn user_macro_addresses() {
        let invoked = Macro::System(SystemMacro::None);
        let mut w = writer();
        w.step_in_eexp(5, false, &invoked).unwrap();
        w.step_out().unwrap();
        w.step_in_eexp(64 + 0x123, false, &invoked).unwrap();
        w.step_out().unwrap();
        assert_eq!(bytes(w), vec![0x05, 0x43, 0x12]);
    }

    #[test]
    fn length_prefixed_eexp_records_argument_length() {
        let invoked = Macro::System(SystemMacro::Values);
        let mut w = writer();
        w.step_in_eexp(2, true, &invoked).unwrap();
        w.step_in_expression_group(false).unwrap();
        w.write_i64(1).unwrap();
        w.step_out().unwrap();
        w.step_out().unwrap();
        // F5, address 2, argument length 3, then the group: length 2, int 1.
        assert_eq!(bytes(w), vec![0xF5, 0x05, 0x07, 0x05, 0x61, 0x01]);
    }

    #[test]
    fn decimal_bodies() {
        assert_eq!(decimal_body(&Decimal::new(Int::I64(0), 0)), vec![0x01]);
        assert_eq!(decimal_body(&Decimal::negative_zero(0)), vec![0x01, 0x00]);
        assert_eq!(decimal_body(&Decimal::new(Int::I64(5), -1)), vec![0xFF, 0x05]);
    }

    #[test]
    fn timestamp_precision_sets_body_length() {
        let mut ts = Timestamp::with_year(2024);
        assert_eq!(timestamp_body(&ts).len(), 2);
        ts.month = Some(1);
        ts.day = Some(2);
        assert_eq!(timestamp_body(&ts).len(), 3);
        ts.hour = Some(3);
        ts.minute = Some(4);
        assert_eq!(timestamp_body(&ts).len(), 6);
        ts.second = Some(5);
        assert_eq!(timestamp_body(&ts).len(), 7);
    }
}
