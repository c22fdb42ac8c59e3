//!
//! Unified, `miette`-based diagnostics for the encoder and the macro engine.
//!
//! # Overview
//!
//! Every failure produced by the writer, the template compiler, or the evaluator is an
//! [`IonError`]. Each variant corresponds to one failure category, and each category carries a
//! stable diagnostic code so callers (and tests) can classify errors without string matching.
//!
//! # Error Construction Macros
//!
//! - **Use `err_msg!` for message-only errors.**
//!   - `err_msg!(Encoding, "cannot step out at depth {}", depth)`
//!
//! - **Use `err_help!` when the caller can do something about it.**
//!   - `err_help!(Signature, "duplicate parameter 'x'", "rename one of the parameters")`
//!
//! - **Never build `ErrorContext` by hand in module code.** The macros fill it in.

use miette::Diagnostic;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type IonResult<T> = Result<T, IonError>;

/// Type-safe error classification that corresponds to `IonError` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Caller misuse of the writer or evaluator.
    Encoding,
    /// Macro definition errors found at compile time.
    Signature,
    /// Argument violations found while expanding.
    Expansion,
    /// The expansion step budget was exhausted.
    StepLimit,
    /// Broken internal invariants.
    Internal,
    /// Sink or file failures.
    Io,
    /// Malformed configuration documents.
    Config,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Encoding => "Encoding",
            ErrorType::Signature => "Signature",
            ErrorType::Expansion => "Expansion",
            ErrorType::StepLimit => "StepLimit",
            ErrorType::Internal => "Internal",
            ErrorType::Io => "Io",
            ErrorType::Config => "Config",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minimal context attached to every error.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// An optional help message.
    pub help: Option<String>,
    /// Byte offset (writer) or expression index (compiler/evaluator) the error refers to.
    pub position: Option<usize>,
}

impl ErrorContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_help(help: impl Into<String>) -> Self {
        Self {
            help: Some(help.into()),
            position: None,
        }
    }

    pub fn at(position: usize) -> Self {
        Self {
            help: None,
            position: Some(position),
        }
    }
}

/// Unified error type for all failure modes of the crate.
#[derive(Debug, Error)]
pub enum IonError {
    #[error("Encoding error: {message}")]
    Encoding { message: String, ctx: ErrorContext },
    #[error("Signature error: {message}")]
    Signature { message: String, ctx: ErrorContext },
    #[error("Expansion error: {message}")]
    Expansion { message: String, ctx: ErrorContext },
    #[error("Expansion exceeded the step limit of {limit}")]
    StepLimitExceeded { limit: usize, ctx: ErrorContext },
    #[error("Internal error: {message}")]
    Internal { message: String, ctx: ErrorContext },
    #[error("I/O error: {message}")]
    Io {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration error: {message}")]
    Config { message: String, ctx: ErrorContext },
}

impl IonError {
    fn get_ctx(&self) -> &ErrorContext {
        match self {
            IonError::Encoding { ctx, .. } => ctx,
            IonError::Signature { ctx, .. } => ctx,
            IonError::Expansion { ctx, .. } => ctx,
            IonError::StepLimitExceeded { ctx, .. } => ctx,
            IonError::Internal { ctx, .. } => ctx,
            IonError::Io { ctx, .. } => ctx,
            IonError::Config { ctx, .. } => ctx,
        }
    }

    /// Returns the type-safe error classification for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            IonError::Encoding { .. } => ErrorType::Encoding,
            IonError::Signature { .. } => ErrorType::Signature,
            IonError::Expansion { .. } => ErrorType::Expansion,
            IonError::StepLimitExceeded { .. } => ErrorType::StepLimit,
            IonError::Internal { .. } => ErrorType::Internal,
            IonError::Io { .. } => ErrorType::Io,
            IonError::Config { .. } => ErrorType::Config,
        }
    }

    /// The position recorded with this error, if any.
    pub fn position(&self) -> Option<usize> {
        self.get_ctx().position
    }

    /// Returns a copy of this error with `position` recorded in its context.
    pub fn at(mut self, position: usize) -> Self {
        let ctx = match &mut self {
            IonError::Encoding { ctx, .. }
            | IonError::Signature { ctx, .. }
            | IonError::Expansion { ctx, .. }
            | IonError::StepLimitExceeded { ctx, .. }
            | IonError::Internal { ctx, .. }
            | IonError::Io { ctx, .. }
            | IonError::Config { ctx, .. } => ctx,
        };
        ctx.position = Some(position);
        self
    }
}

impl Diagnostic for IonError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match self.error_type() {
            ErrorType::Encoding => "ion11::encoding",
            ErrorType::Signature => "ion11::signature",
            ErrorType::Expansion => "ion11::expansion",
            ErrorType::StepLimit => "ion11::step_limit",
            ErrorType::Internal => "ion11::internal",
            ErrorType::Io => "ion11::io",
            ErrorType::Config => "ion11::config",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.get_ctx()
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn std::fmt::Display + 'a>)
    }
}

impl From<std::io::Error> for IonError {
    fn from(source: std::io::Error) -> Self {
        IonError::Io {
            message: source.to_string(),
            ctx: ErrorContext::none(),
            source,
        }
    }
}

/// Constructs an `IonError` variant with a formatted message and no help.
#[macro_export]
macro_rules! err_msg {
    ($variant:ident, $msg:expr, $($arg:expr),+ $(,)?) => {
        $crate::IonError::$variant {
            message: format!($msg, $($arg),+),
            ctx: $crate::ErrorContext::none(),
        }
    };
    ($variant:ident, $msg:expr) => {
        $crate::IonError::$variant {
            message: format!("{}", $msg),
            ctx: $crate::ErrorContext::none(),
        }
    };
}

/// Constructs an `IonError` variant with a message and a help line.
#[macro_export]
macro_rules! err_help {
    ($variant:ident, $msg:expr, $help:expr) => {
        $crate::IonError::$variant {
            message: $msg.to_string(),
            ctx: $crate::ErrorContext::with_help($help),
        }
    };
}

#[cfg(test)]
mod diagnostics_tests {
    use miette::Report;

    use super::*;

    #[test]
    fn test_error_type_classification() {
        let err = err_msg!(Expansion, "expected {} value(s), found {}", 1, 2);
        assert_eq!(err.error_type(), ErrorType::Expansion);
        assert_eq!(err.to_string(), "Expansion error: expected 1 value(s), found 2");
    }

    #[test]
    fn test_help_is_reported() {
        let err = err_help!(Signature, "duplicate parameter 'x'", "rename one of them");
        let report = Report::new(err);
        let output = format!("{report:?}");
        assert!(output.contains("duplicate parameter"));
        assert!(output.contains("rename one of them"));
        assert!(output.contains("ion11::signature"));
    }

    #[test]
    fn test_position_is_attached() {
        let err = err_msg!(Encoding, "bad").at(17);
        assert_eq!(err.position(), Some(17));
    }
}
