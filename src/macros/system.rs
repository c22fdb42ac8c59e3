//! The system macro catalogue.
//!
//! Most system macros expand natively in the evaluator. `default`, `make_list`, `make_sexp`,
//! `make_struct`, and `make_field` are defined by template bodies over other system macros;
//! [`SystemMacro::template_body`] builds those bodies.

use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;

use super::expression::{Expression, TapeBuilder};
use super::types::{Cardinality, Macro, Parameter};
use crate::model::IonType;

/// Text prefix that always resolves to the system macro namespace.
pub const SYSTEM_NAMESPACE_PREFIX: &str = "$ion::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemMacro {
    None,
    Values,
    Default,
    Meta,
    Repeat,
    Flatten,
    Delta,
    Sum,
    Annotate,
    MakeString,
    MakeSymbol,
    MakeDecimal,
    MakeTimestamp,
    MakeBlob,
    MakeList,
    MakeSExp,
    MakeField,
    MakeStruct,
    IfNone,
    IfSome,
    IfSingle,
    IfMulti,
    PrivateFlattenStruct,
    PrivateMakeFieldNameAndValue,
}

/// Every system macro, ordered by address.
pub const ALL_SYSTEM_MACROS: [SystemMacro; 24] = [
    SystemMacro::None,
    SystemMacro::Values,
    SystemMacro::Default,
    SystemMacro::Meta,
    SystemMacro::Repeat,
    SystemMacro::Flatten,
    SystemMacro::Delta,
    SystemMacro::Sum,
    SystemMacro::Annotate,
    SystemMacro::MakeString,
    SystemMacro::MakeSymbol,
    SystemMacro::MakeDecimal,
    SystemMacro::MakeTimestamp,
    SystemMacro::MakeBlob,
    SystemMacro::MakeList,
    SystemMacro::MakeSExp,
    SystemMacro::MakeField,
    SystemMacro::MakeStruct,
    SystemMacro::IfNone,
    SystemMacro::IfSome,
    SystemMacro::IfSingle,
    SystemMacro::IfMulti,
    SystemMacro::PrivateFlattenStruct,
    SystemMacro::PrivateMakeFieldNameAndValue,
];

static SIGNATURES: Lazy<Vec<Vec<Parameter>>> = Lazy::new(|| {
    use Cardinality::*;
    let p = |name: &str, cardinality: Cardinality| Parameter::tagged(name, cardinality);
    ALL_SYSTEM_MACROS
        .iter()
        .map(|m| match m {
            SystemMacro::None => vec![],
            SystemMacro::Values => vec![p("values", Any)],
            SystemMacro::Default => vec![p("expr", Any), p("default_expr", Any)],
            SystemMacro::Meta => vec![p("anything", Any)],
            SystemMacro::Repeat => vec![p("n", One), p("value", Any)],
            SystemMacro::Flatten => vec![p("sequences", Any)],
            SystemMacro::Delta => vec![p("deltas", Any)],
            SystemMacro::Sum => vec![p("a", One), p("b", One)],
            SystemMacro::Annotate => vec![p("annotations", Any), p("value", One)],
            SystemMacro::MakeString | SystemMacro::MakeSymbol => vec![p("text", Any)],
            SystemMacro::MakeDecimal => vec![p("coefficient", One), p("exponent", One)],
            SystemMacro::MakeTimestamp => vec![
                p("year", One),
                p("month", AtMostOne),
                p("day", AtMostOne),
                p("hour", AtMostOne),
                p("minute", AtMostOne),
                p("second", AtMostOne),
                p("offset_minutes", AtMostOne),
            ],
            SystemMacro::MakeBlob => vec![p("lobs", Any)],
            SystemMacro::MakeList | SystemMacro::MakeSExp => vec![p("sequences", Any)],
            SystemMacro::MakeField | SystemMacro::PrivateMakeFieldNameAndValue => {
                vec![p("field_name", One), p("value", One)]
            }
            SystemMacro::MakeStruct | SystemMacro::PrivateFlattenStruct => vec![p("structs", Any)],
            SystemMacro::IfNone | SystemMacro::IfSome | SystemMacro::IfSingle | SystemMacro::IfMulti => {
                vec![p("stream", Any), p("true_branch", Any), p("false_branch", Any)]
            }
        })
        .collect()
});

impl SystemMacro {
    pub fn address(self) -> usize {
        self as usize
    }

    pub fn from_address(address: usize) -> Option<Self> {
        ALL_SYSTEM_MACROS.get(address).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemMacro::None => "none",
            SystemMacro::Values => "values",
            SystemMacro::Default => "default",
            SystemMacro::Meta => "meta",
            SystemMacro::Repeat => "repeat",
            SystemMacro::Flatten => "flatten",
            SystemMacro::Delta => "delta",
            SystemMacro::Sum => "sum",
            SystemMacro::Annotate => "annotate",
            SystemMacro::MakeString => "make_string",
            SystemMacro::MakeSymbol => "make_symbol",
            SystemMacro::MakeDecimal => "make_decimal",
            SystemMacro::MakeTimestamp => "make_timestamp",
            SystemMacro::MakeBlob => "make_blob",
            SystemMacro::MakeList => "make_list",
            SystemMacro::MakeSExp => "make_sexp",
            SystemMacro::MakeField => "make_field",
            SystemMacro::MakeStruct => "make_struct",
            SystemMacro::IfNone => "if_none",
            SystemMacro::IfSome => "if_some",
            SystemMacro::IfSingle => "if_single",
            SystemMacro::IfMulti => "if_multi",
            SystemMacro::PrivateFlattenStruct => "_private_flatten_struct",
            SystemMacro::PrivateMakeFieldNameAndValue => "_private_make_field_name_and_value",
        }
    }

    /// Looks up a system macro by name, with or without the `$ion::` prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix(SYSTEM_NAMESPACE_PREFIX).unwrap_or(name);
        ALL_SYSTEM_MACROS.iter().copied().find(|m| m.name() == name)
    }

    pub fn signature(self) -> &'static [Parameter] {
        &SIGNATURES[self.address()]
    }

    pub fn is_template_backed(self) -> bool {
        matches!(
            self,
            SystemMacro::Default
                | SystemMacro::MakeList
                | SystemMacro::MakeSExp
                | SystemMacro::MakeStruct
                | SystemMacro::MakeField
        )
    }

    /// Builds the body of a template-backed system macro.
    pub fn template_body(self) -> Option<Rc<[Expression]>> {
        let system = |m: SystemMacro| Rc::new(Macro::System(m));
        let mut tape = TapeBuilder::new();
        match self {
            // (if_none (%expr) (%default_expr) (%expr))
            SystemMacro::Default => {
                tape.invoke(system(SystemMacro::IfNone))
                    .variable(0)
                    .variable(1)
                    .variable(0);
            }
            // [(flatten (%sequences))]
            SystemMacro::MakeList | SystemMacro::MakeSExp => {
                let ion_type = if self == SystemMacro::MakeList {
                    IonType::List
                } else {
                    IonType::SExp
                };
                tape.container(ion_type, vec![])
                    .invoke(system(SystemMacro::Flatten))
                    .variable(0);
            }
            // {(_private_flatten_struct (%structs))}
            SystemMacro::MakeStruct => {
                tape.container(IonType::Struct, vec![])
                    .invoke(system(SystemMacro::PrivateFlattenStruct))
                    .variable(0);
            }
            // {(_private_make_field_name_and_value (%field_name) (%value))}
            SystemMacro::MakeField => {
                tape.container(IonType::Struct, vec![])
                    .invoke(system(SystemMacro::PrivateMakeFieldNameAndValue))
                    .variable(0)
                    .variable(1);
            }
            _ => return None,
        }
        Some(tape.build())
    }
}

impl fmt::Display for SystemMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_match_catalogue_order() {
        for (address, system) in ALL_SYSTEM_MACROS.iter().enumerate() {
            assert_eq!(system.address(), address);
            assert_eq!(SystemMacro::from_address(address), Some(*system));
        }
        assert_eq!(SystemMacro::from_address(ALL_SYSTEM_MACROS.len()), None);
    }

    #[test]
    fn names_resolve_with_and_without_prefix() {
        assert_eq!(SystemMacro::from_name("make_string"), Some(SystemMacro::MakeString));
        assert_eq!(SystemMacro::from_name("$ion::repeat"), Some(SystemMacro::Repeat));
        assert_eq!(SystemMacro::from_name("nope"), None);
    }

    #[test]
    fn template_bodies_are_single_expressions() {
        for system in ALL_SYSTEM_MACROS {
            match system.template_body() {
                Some(body) => {
                    assert!(system.is_template_backed());
                    assert_eq!(body[0].end_at(0), body.len(), "{system}");
                }
                None => assert!(!system.is_template_backed()),
            }
        }
    }
}
