//! # Ion 1.1 Binary Writers
//!
//! [`BinaryRawWriter`] encodes exactly what it is told, including e-expressions and tagless
//! arguments. [`ManagedWriter`] sits on top of it with a [`SymbolTable`] and the stream-level
//! rules (version marker, reserved symbols, SID selection).

pub mod container;
pub mod managed;
pub mod raw;
pub mod symbols;

pub use container::{ContainerInfo, ContainerType, Framing, PatchPoint};
pub use managed::ManagedWriter;
pub use raw::BinaryRawWriter;
pub use symbols::{LocalSymbolTable, SymbolTable, SYSTEM_SYMBOLS};
