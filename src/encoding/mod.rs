//! Binary encoding primitives: integer encodings, opcodes, the paged output buffer, and the
//! presence bitmap.

pub mod buffer;
pub mod opcodes;
pub mod presence;
pub mod varint;

pub use buffer::WriteBuffer;
pub use presence::{Presence, PresenceBitmap};
pub use varint::{FixedInt, FixedUInt, FlexInt, FlexUInt};
