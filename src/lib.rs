//! # ion11
//!
//! Ion 1.1 binary encoding primitives, a container writer that defers length prefixes through
//! patch points, and a lazy macro expansion engine over compiled template tapes.

pub use crate::diagnostics::{ErrorContext, ErrorType, IonError, IonResult};

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod encoding;
pub mod macros;
pub mod model;
pub mod writer;
