//! Handles all user-facing output for the CLI.

use std::io;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::macros::{SystemMacro, ALL_SYSTEM_MACROS};
use crate::model::Element;

/// Space-separated uppercase hex, e.g. `E0 01 01 EA`.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_hex(bytes: &[u8]) {
    println!("{}", hex(bytes));
}

pub fn print_elements(elements: &[Element]) {
    for element in elements {
        println!("{element}");
    }
}

/// One catalogue line: address, name, and `(signature)`.
pub fn describe_macro(system: SystemMacro) -> String {
    let parameters = system
        .signature()
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("({parameters})")
}

pub fn print_macros() -> io::Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    write_macros(&mut stdout)
}

fn write_macros(out: &mut dyn WriteColor) -> io::Result<()> {
    for system in ALL_SYSTEM_MACROS {
        write!(out, "{:>2}  ", system.address())?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        write!(out, "{}", system.name())?;
        out.reset()?;
        writeln!(out, " {}", describe_macro(system))?;
    }
    out.flush()
}
