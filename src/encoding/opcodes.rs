//! Ion 1.1 binary opcode assignments.
//!
//! Opcodes with a `_BASE` suffix carry a small length in their low nibble.

pub const IVM: [u8; 4] = [0xE0, 0x01, 0x01, 0xEA];

// E-expression address forms
pub const EEXP_INLINE_MAX: u8 = 0x3F;
pub const EEXP_ONE_BYTE_BASE: u8 = 0x40;
pub const EEXP_TWO_BYTE_BASE: u8 = 0x50;
pub const EEXP_ONE_BYTE_BIAS: usize = 64;
pub const EEXP_TWO_BYTE_BIAS: usize = 4160;
/// First address that needs the length-prefixed form.
pub const EEXP_LENGTH_PREFIXED_MIN: usize = 1_052_736;

// Scalars
pub const INTEGER_BASE: u8 = 0x60;
pub const FLOAT_ZERO: u8 = 0x6A;
pub const FLOAT_32: u8 = 0x6C;
pub const FLOAT_64: u8 = 0x6D;
pub const BOOL_TRUE: u8 = 0x6E;
pub const BOOL_FALSE: u8 = 0x6F;
pub const DECIMAL_BASE: u8 = 0x70;
pub const TIMESTAMP_SHORT_BASE: u8 = 0x80;
pub const STRING_BASE: u8 = 0x90;
pub const SYMBOL_TEXT_BASE: u8 = 0xA0;
pub const LIST_BASE: u8 = 0xB0;
pub const SEXP_BASE: u8 = 0xC0;
pub const STRUCT_SID_BASE: u8 = 0xD0;

// Symbol IDs
pub const SYMBOL_SID_1: u8 = 0xE1;
pub const SYMBOL_SID_2: u8 = 0xE2;
pub const SYMBOL_SID_FLEX: u8 = 0xE3;
pub const SYMBOL_SID_2_BIAS: u64 = 256;
pub const SYMBOL_SID_FLEX_BIAS: u64 = 65_792;

// Annotations
pub const ANNOTATIONS_1_SID: u8 = 0xE4;
pub const ANNOTATIONS_2_SID: u8 = 0xE5;
pub const ANNOTATIONS_N_SID: u8 = 0xE6;
pub const ANNOTATIONS_1_FLEXSYM: u8 = 0xE7;
pub const ANNOTATIONS_2_FLEXSYM: u8 = 0xE8;
pub const ANNOTATIONS_N_FLEXSYM: u8 = 0xE9;

pub const NULL_UNTYPED: u8 = 0xEA;
pub const NULL_TYPED: u8 = 0xEB;
pub const NOP: u8 = 0xEC;
pub const NOP_LENGTH_PREFIXED: u8 = 0xED;
pub const SYSTEM_EEXP: u8 = 0xEF;

// Delimited containers
pub const DELIMITED_END: u8 = 0xF0;
pub const DELIMITED_LIST: u8 = 0xF1;
pub const DELIMITED_SEXP: u8 = 0xF2;
pub const DELIMITED_STRUCT: u8 = 0xF3;

// Length-prefixed forms (FlexUInt length follows)
pub const EEXP_LENGTH_PREFIXED: u8 = 0xF5;
pub const VARIABLE_INTEGER: u8 = 0xF6;
pub const VARIABLE_DECIMAL: u8 = 0xF7;
pub const VARIABLE_TIMESTAMP: u8 = 0xF8;
pub const VARIABLE_STRING: u8 = 0xF9;
pub const VARIABLE_SYMBOL_TEXT: u8 = 0xFA;
pub const VARIABLE_LIST: u8 = 0xFB;
pub const VARIABLE_SEXP: u8 = 0xFC;
pub const VARIABLE_STRUCT_SID: u8 = 0xFD;
pub const VARIABLE_BLOB: u8 = 0xFE;
pub const VARIABLE_CLOB: u8 = 0xFF;

/// Largest body that fits in an opcode's low nibble.
pub const MAX_INLINE_LENGTH: usize = 15;

/// FlexUInt zero: in SID-mode struct field position it switches the struct to FlexSym mode.
pub const FLEX_UINT_ZERO: u8 = 0x01;

/// FlexSym escape byte (FlexInt zero) followed by one of the escape codes below.
pub const FLEX_SYM_ESCAPE: u8 = 0x01;
pub const FLEX_SYM_SID_ZERO: u8 = 0x60;
pub const FLEX_SYM_EMPTY_TEXT: u8 = 0x90;
pub const FLEX_SYM_END: u8 = 0xF0;

/// The type byte that follows `NULL_TYPED`.
pub fn typed_null_byte(ion_type: crate::model::IonType) -> Option<u8> {
    use crate::model::IonType;
    let byte = match ion_type {
        IonType::Null => return None,
        IonType::Bool => 0x00,
        IonType::Int => 0x01,
        IonType::Float => 0x02,
        IonType::Decimal => 0x03,
        IonType::Timestamp => 0x04,
        IonType::String => 0x05,
        IonType::Symbol => 0x06,
        IonType::Blob => 0x07,
        IonType::Clob => 0x08,
        IonType::List => 0x09,
        IonType::SExp => 0x0A,
        IonType::Struct => 0x0B,
    };
    Some(byte)
}
