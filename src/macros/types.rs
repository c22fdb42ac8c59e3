//!
//! Macro definitions and their signatures.
//!
//! This module has no dependencies on the other macro modules except the flat expression IR that a
//! template body is made of.
//!
//! ## Ownership
//!
//! - `Macro` values are shared through `Rc<Macro>`: a compiled body refers to the macros it
//!   invokes directly, so lookups happen once at compile time.
//! - A template body is an `Rc<[Expression]>`; the evaluator walks it by index and never copies it.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::expression::Expression;
use super::system::SystemMacro;

// ============================================================================
// CARDINALITY
// ============================================================================

/// How many values an argument may expand to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// `!` exactly one value.
    One,
    /// `?` zero or one value.
    AtMostOne,
    /// `+` one or more values.
    AtLeastOne,
    /// `*` any number of values.
    Any,
}

impl Cardinality {
    pub fn from_sigil(sigil: &str) -> Option<Self> {
        match sigil {
            "!" => Some(Cardinality::One),
            "?" => Some(Cardinality::AtMostOne),
            "+" => Some(Cardinality::AtLeastOne),
            "*" => Some(Cardinality::Any),
            _ => None,
        }
    }

    pub fn sigil(&self) -> &'static str {
        match self {
            Cardinality::One => "!",
            Cardinality::AtMostOne => "?",
            Cardinality::AtLeastOne => "+",
            Cardinality::Any => "*",
        }
    }

    pub fn min(&self) -> usize {
        match self {
            Cardinality::One | Cardinality::AtLeastOne => 1,
            Cardinality::AtMostOne | Cardinality::Any => 0,
        }
    }

    pub fn max(&self) -> Option<usize> {
        match self {
            Cardinality::One | Cardinality::AtMostOne => Some(1),
            Cardinality::AtLeastOne | Cardinality::Any => None,
        }
    }

    /// True when an argument may be omitted entirely.
    pub fn is_optional(&self) -> bool {
        self.min() == 0
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min() && self.max().map_or(true, |max| count <= max)
    }
}

// ============================================================================
// PARAMETER ENCODING
// ============================================================================

/// How an argument is encoded in an e-expression.
///
/// `Tagged` arguments carry their own opcode. All other encodings are tagless: the writer emits
/// only the payload, so the signature must tell the reader how to decode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterEncoding {
    Tagged,
    FlexUInt,
    FlexInt,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    FlexSym,
}

impl ParameterEncoding {
    /// Parses a parameter-name annotation such as `uint8::x`.
    pub fn from_annotation(text: &str) -> Option<Self> {
        let encoding = match text {
            "flex_uint" => ParameterEncoding::FlexUInt,
            "flex_int" => ParameterEncoding::FlexInt,
            "uint8" => ParameterEncoding::UInt8,
            "uint16" => ParameterEncoding::UInt16,
            "uint32" => ParameterEncoding::UInt32,
            "uint64" => ParameterEncoding::UInt64,
            "int8" => ParameterEncoding::Int8,
            "int16" => ParameterEncoding::Int16,
            "int32" => ParameterEncoding::Int32,
            "int64" => ParameterEncoding::Int64,
            "float32" => ParameterEncoding::Float32,
            "float64" => ParameterEncoding::Float64,
            "flex_sym" => ParameterEncoding::FlexSym,
            _ => return None,
        };
        Some(encoding)
    }

    pub fn annotation(&self) -> Option<&'static str> {
        let text = match self {
            ParameterEncoding::Tagged => return None,
            ParameterEncoding::FlexUInt => "flex_uint",
            ParameterEncoding::FlexInt => "flex_int",
            ParameterEncoding::UInt8 => "uint8",
            ParameterEncoding::UInt16 => "uint16",
            ParameterEncoding::UInt32 => "uint32",
            ParameterEncoding::UInt64 => "uint64",
            ParameterEncoding::Int8 => "int8",
            ParameterEncoding::Int16 => "int16",
            ParameterEncoding::Int32 => "int32",
            ParameterEncoding::Int64 => "int64",
            ParameterEncoding::Float32 => "float32",
            ParameterEncoding::Float64 => "float64",
            ParameterEncoding::FlexSym => "flex_sym",
        };
        Some(text)
    }

    pub fn is_tagless(&self) -> bool {
        !matches!(self, ParameterEncoding::Tagged)
    }

    /// Payload width of the fixed-size tagless encodings.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ParameterEncoding::UInt8 | ParameterEncoding::Int8 => Some(1),
            ParameterEncoding::UInt16 | ParameterEncoding::Int16 => Some(2),
            ParameterEncoding::UInt32 | ParameterEncoding::Int32 | ParameterEncoding::Float32 => {
                Some(4)
            }
            ParameterEncoding::UInt64 | ParameterEncoding::Int64 | ParameterEncoding::Float64 => {
                Some(8)
            }
            _ => None,
        }
    }
}

// ============================================================================
// PARAMETERS AND MACROS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub encoding: ParameterEncoding,
    pub cardinality: Cardinality,
}

impl Parameter {
    pub fn new(name: impl Into<String>, encoding: ParameterEncoding, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            encoding,
            cardinality,
        }
    }

    pub fn tagged(name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self::new(name, ParameterEncoding::Tagged, cardinality)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(annotation) = self.encoding.annotation() {
            write!(f, "{annotation}::")?;
        }
        write!(f, "{}", self.name)?;
        if self.cardinality != Cardinality::One {
            write!(f, "{}", self.cardinality.sigil())?;
        }
        Ok(())
    }
}

/// A user-defined macro whose expansion is a compiled, flat template body.
#[derive(Debug, Clone)]
pub struct TemplateMacro {
    pub name: Option<String>,
    pub signature: Vec<Parameter>,
    /// Exactly one top-level expression, occupying the whole tape.
    pub body: Rc<[Expression]>,
}

/// Either a user template or a built-in system macro.
#[derive(Debug, Clone)]
pub enum Macro {
    Template(TemplateMacro),
    System(SystemMacro),
}

impl Macro {
    pub fn name(&self) -> Option<&str> {
        match self {
            Macro::Template(template) => template.name.as_deref(),
            Macro::System(system) => Some(system.name()),
        }
    }

    pub fn signature(&self) -> &[Parameter] {
        match self {
            Macro::Template(template) => &template.signature,
            Macro::System(system) => system.signature(),
        }
    }

    pub fn as_system(&self) -> Option<SystemMacro> {
        match self {
            Macro::System(system) => Some(*system),
            Macro::Template(_) => None,
        }
    }

    /// Number of parameters that are not `One`: the slots a presence bitmap may encode.
    pub fn variadic_parameter_count(&self) -> usize {
        self.signature()
            .iter()
            .filter(|p| p.cardinality != Cardinality::One)
            .count()
    }

    /// The index of a parameter, by name.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.signature().iter().position(|p| p.name == name)
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(macro {} (", self.name().unwrap_or("null"))?;
        for (i, parameter) in self.signature().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{parameter}")?;
        }
        write!(f, "))")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils_round_trip() {
        for cardinality in [
            Cardinality::One,
            Cardinality::AtMostOne,
            Cardinality::AtLeastOne,
            Cardinality::Any,
        ] {
            assert_eq!(Cardinality::from_sigil(cardinality.sigil()), Some(cardinality));
        }
        assert_eq!(Cardinality::from_sigil("%"), None);
    }

    #[test]
    fn cardinality_bounds() {
        assert!(Cardinality::One.accepts(1));
        assert!(!Cardinality::One.accepts(0));
        assert!(!Cardinality::AtMostOne.accepts(2));
        assert!(Cardinality::AtLeastOne.accepts(7));
        assert!(Cardinality::Any.accepts(0));
    }

    #[test]
    fn parameter_display_includes_encoding_and_sigil() {
        let p = Parameter::new("x", ParameterEncoding::UInt8, Cardinality::AtMostOne);
        assert_eq!(p.to_string(), "uint8::x?");
        assert_eq!(Parameter::tagged("y", Cardinality::One).to_string(), "y");
    }
}
