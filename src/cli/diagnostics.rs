//! Error presentation for the CLI.
//!
//! `IonDiagnostic` renders an [`IonError`] as a colored header, the message, and the help line
//! the error carries, if any.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;

use miette::Diagnostic;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::IonError;

pub struct IonDiagnostic<'a> {
    error: &'a IonError,
}

impl<'a> IonDiagnostic<'a> {
    pub fn new(error: &'a IonError) -> Self {
        Self { error }
    }

    /// Writes the diagnostic with a colored header.
    pub fn render(&self, out: &mut dyn WriteColor) -> io::Result<()> {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "error")?;
        out.reset()?;
        if let Some(code) = self.error.code() {
            write!(out, "[{code}]")?;
        }
        writeln!(out, ": {}", self.error)?;
        if let Some(help) = self.error.help() {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(out, "  help")?;
            out.reset()?;
            writeln!(out, ": {help}")?;
        }
        Ok(())
    }
}

impl Display for IonDiagnostic<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "error")?;
        if let Some(code) = self.error.code() {
            write!(f, "[{code}]")?;
        }
        write!(f, ": {}", self.error)?;
        if let Some(position) = self.error.position() {
            write!(f, " (at {position})")?;
        }
        if let Some(help) = self.error.help() {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err_help;

    #[test]
    fn help_follows_the_message() {
        let err = err_help!(Config, "bad option", "remove it");
        let text = IonDiagnostic::new(&err).to_string();
        assert_eq!(
            text,
            "error[ion11::config]: Configuration error: bad option\n  help: remove it"
        );
    }

    #[test]
    fn render_without_color() {
        let err = err_help!(Encoding, "oops", "try again");
        let mut out = termcolor::NoColor::new(Vec::new());
        IonDiagnostic::new(&err).render(&mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.starts_with("error[ion11::encoding]: Encoding error: oops"));
        assert!(text.contains("help: try again"));
    }
}
