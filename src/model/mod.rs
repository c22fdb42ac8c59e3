//! The Ion data model as seen by the writer and the macro engine.
//!
//! This module provides the scalar value types, symbol tokens, and a small materialised
//! [`Element`] tree. The tree is only used at the edges of the crate: it feeds the template
//! compiler (through the [`ValueReader`] contract) and collects the output of a full expansion.

use std::fmt;

use bigdecimal::num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

pub mod element;
pub mod value;

pub use element::{Element, ElementData, ElementReader, ValueReader};
pub use value::{Decimal, Timestamp, TimestampPrecision, Value};

// ============================================================================
// ION TYPES
// ============================================================================

/// The thirteen Ion data model types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IonType {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    Timestamp,
    Symbol,
    String,
    Clob,
    Blob,
    List,
    SExp,
    Struct,
}

impl IonType {
    pub fn is_container(&self) -> bool {
        matches!(self, IonType::List | IonType::SExp | IonType::Struct)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, IonType::List | IonType::SExp)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IonType::Null => "null",
            IonType::Bool => "bool",
            IonType::Int => "int",
            IonType::Float => "float",
            IonType::Decimal => "decimal",
            IonType::Timestamp => "timestamp",
            IonType::Symbol => "symbol",
            IonType::String => "string",
            IonType::Clob => "clob",
            IonType::Blob => "blob",
            IonType::List => "list",
            IonType::SExp => "sexp",
            IonType::Struct => "struct",
        }
    }
}

impl fmt::Display for IonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SYMBOL TOKENS
// ============================================================================

/// A symbol as it appears in a stream: either inline text or a symbol ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolToken {
    Text(String),
    Sid(u64),
}

impl SymbolToken {
    pub fn text(text: impl Into<String>) -> Self {
        SymbolToken::Text(text.into())
    }

    /// The symbol's text, if it is known without a symbol table.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SymbolToken::Text(text) => Some(text.as_str()),
            SymbolToken::Sid(_) => None,
        }
    }
}

impl fmt::Display for SymbolToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolToken::Text(text) => write!(f, "{text}"),
            SymbolToken::Sid(sid) => write!(f, "${sid}"),
        }
    }
}

impl From<&str> for SymbolToken {
    fn from(text: &str) -> Self {
        SymbolToken::Text(text.to_string())
    }
}

// ============================================================================
// INTEGERS
// ============================================================================

/// An Ion integer: a machine word when it fits, arbitrary precision otherwise.
#[derive(Debug, Clone)]
pub enum Int {
    I64(i64),
    Big(BigInt),
}

impl Int {
    /// Normalises a big integer, demoting it to `I64` when it fits.
    pub fn from_big(value: BigInt) -> Self {
        match value.to_i64() {
            Some(small) => Int::I64(small),
            None => Int::Big(value),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Int::I64(value) => Some(*value),
            Int::Big(value) => value.to_i64(),
        }
    }

    pub fn to_big(&self) -> BigInt {
        match self {
            Int::I64(value) => BigInt::from(*value),
            Int::Big(value) => value.clone(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Int::I64(value) => *value == 0,
            Int::Big(value) => value.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Int::I64(value) => *value < 0,
            Int::Big(value) => value.sign() == bigdecimal::num_bigint::Sign::Minus,
        }
    }
}

impl PartialEq for Int {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Int::I64(a), Int::I64(b)) => a == b,
            _ => self.to_big() == other.to_big(),
        }
    }
}

impl Eq for Int {}

impl From<i64> for Int {
    fn from(value: i64) -> Self {
        Int::I64(value)
    }
}

impl From<BigInt> for Int {
    fn from(value: BigInt) -> Self {
        Int::from_big(value)
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int::I64(value) => write!(f, "{value}"),
            Int::Big(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_ints_are_demoted_when_they_fit() {
        assert_eq!(Int::from_big(BigInt::from(42)), Int::I64(42));
        let huge: BigInt = BigInt::from(i64::MAX) * 4;
        assert!(matches!(Int::from_big(huge.clone()), Int::Big(_)));
        assert_eq!(Int::Big(BigInt::from(7)), Int::I64(7));
        assert!(Int::Big(-huge).is_negative());
    }

    #[test]
    fn symbol_display() {
        assert_eq!(SymbolToken::Sid(4).to_string(), "$4");
        assert_eq!(SymbolToken::text("name").to_string(), "name");
    }
}
