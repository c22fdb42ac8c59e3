//! # Ion 1.1 Macros
//!
//! Templates are compiled once into a flat, range-addressed expression tape and evaluated lazily.
//!
//! ## Pipeline
//!
//! - [`TemplateCompiler`] reads `(macro name (params...) body...)` and produces a
//!   [`TemplateMacro`] whose body is a tape of [`Expression`]s.
//! - A [`MacroTable`] resolves [`MacroRef`]s to user macros or to the [`SystemMacro`] catalogue.
//! - [`MacroEvaluator`] pulls values out of a tape one at a time. Each invocation runs in its own
//!   [`Environment`], and frames are recycled through a per-session pool.
//!
//! ## Tape layout
//!
//! A container, invocation or group at index `i` stores the exclusive end of its children, so its
//! children occupy `tape[i + 1..end]` and skipping it is a single jump.

pub mod compiler;
pub mod evaluator;
pub mod expression;
pub mod system;
pub mod table;
pub mod types;

pub use compiler::{compile_invocation, validate_identifier, TemplateCompiler};
pub use evaluator::{Environment, ExpandedData, ExpandedValue, MacroEvaluator, Produced, Session};
pub use expression::{Expression, TapeBuilder};
pub use system::{SystemMacro, ALL_SYSTEM_MACROS, SYSTEM_NAMESPACE_PREFIX};
pub use table::{MacroRef, MacroTable, MutableMacroTable};
pub use types::{Cardinality, Macro, Parameter, ParameterEncoding, TemplateMacro};
