//! Command-line arguments and subcommands for the `ion11` CLI.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "ion11",
    version,
    about = "Ion 1.1 binary encoding and macro expansion tools."
)]
pub struct Ion11Args {
    #[command(subcommand)]
    pub command: Command,
}

/// The primitive integer encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VarintKind {
    FlexUint,
    FlexInt,
    FixedUint,
    FixedInt,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the encoding of an integer as hex bytes.
    Varint {
        #[arg(value_enum)]
        kind: VarintKind,
        /// Any decimal integer; arbitrary precision is accepted.
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Transcode a JSON document to an Ion 1.1 binary stream.
    Encode {
        #[arg(required = true)]
        file: PathBuf,
        /// Write containers with end markers instead of length prefixes.
        #[arg(long)]
        delimited: bool,
        /// Bytes reserved for each container length prefix.
        #[arg(long)]
        preallocation: Option<u8>,
        /// A YAML or JSON options file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the binary stream here instead of printing hex.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the system macros with their addresses and signatures.
    Macros,
    /// Compile the macros in a JSON document and expand its invocation.
    Expand {
        #[arg(required = true)]
        file: PathBuf,
        /// A YAML or JSON options file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
