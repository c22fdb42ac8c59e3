//! Bookkeeping for open containers and deferred length prefixes.

use crate::encoding::opcodes;
use crate::encoding::PresenceBitmap;
use crate::macros::{Parameter, ParameterEncoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    /// The implicit root; never popped.
    Top,
    List,
    SExp,
    Struct,
    EExpression,
    ExpressionGroup,
}

impl ContainerType {
    pub fn is_data_model(&self) -> bool {
        matches!(self, ContainerType::List | ContainerType::SExp | ContainerType::Struct)
    }

    /// Opcode for a length-prefixed container whose body fits in the low nibble.
    pub(crate) fn inline_base(&self) -> u8 {
        match self {
            ContainerType::SExp => opcodes::SEXP_BASE,
            ContainerType::Struct => opcodes::STRUCT_SID_BASE,
            _ => opcodes::LIST_BASE,
        }
    }

    /// Opcode for a container followed by a FlexUInt length.
    pub(crate) fn variable_opcode(&self) -> u8 {
        match self {
            ContainerType::SExp => opcodes::VARIABLE_SEXP,
            ContainerType::Struct => opcodes::VARIABLE_STRUCT_SID,
            _ => opcodes::VARIABLE_LIST,
        }
    }

    pub(crate) fn delimited_opcode(&self) -> u8 {
        match self {
            ContainerType::SExp => opcodes::DELIMITED_SEXP,
            ContainerType::Struct => opcodes::DELIMITED_STRUCT,
            _ => opcodes::DELIMITED_LIST,
        }
    }
}

/// How a container's extent is recorded in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No length and no end marker (the top level, addressed e-expressions).
    None,
    /// A FlexUInt length, or a length in the opcode's low nibble.
    Prefixed,
    /// An end marker.
    Delimited,
}

/// Argument bookkeeping for an open e-expression.
#[derive(Debug, Clone)]
pub struct ArgumentState {
    pub parameters: Vec<Parameter>,
    pub bitmap: PresenceBitmap,
    pub bitmap_position: usize,
}

/// One open container on the writer's stack.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub container_type: ContainerType,
    pub framing: Framing,
    /// Buffer position of the container's first byte (its opcode, or a group's length).
    pub position: usize,
    /// Bytes between `position` and the reserved length prefix.
    pub metadata_offset: usize,
    /// Bytes reserved for the length prefix.
    pub preallocated: usize,
    /// Final encoded size of everything written into the container so far.
    pub length: usize,
    pub num_children: usize,
    pub patch_index: Option<usize>,
    /// Struct field names are FlexSyms rather than FlexUInt SIDs.
    pub flex_sym_mode: bool,
    pub has_field_name: bool,
    pub arguments: Option<Box<ArgumentState>>,
    /// The encoding of the parameter an expression group belongs to.
    pub group_encoding: ParameterEncoding,
}

impl ContainerInfo {
    pub fn new(container_type: ContainerType, framing: Framing, position: usize) -> Self {
        Self {
            container_type,
            framing,
            position,
            metadata_offset: 0,
            preallocated: 0,
            length: 0,
            num_children: 0,
            patch_index: None,
            flex_sym_mode: false,
            has_field_name: false,
            arguments: None,
            group_encoding: ParameterEncoding::Tagged,
        }
    }

    pub fn top() -> Self {
        Self::new(ContainerType::Top, Framing::None, 0)
    }

    /// Position of the reserved length prefix.
    pub fn length_position(&self) -> usize {
        self.position + self.metadata_offset
    }
}

/// A length prefix whose final encoding differs in size from the space reserved for it.
///
/// The buffer keeps the reserved bytes; `flush` skips them and writes `length` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchPoint {
    pub old_position: usize,
    pub old_length: usize,
    pub length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_families() {
        assert_eq!(ContainerType::List.inline_base(), 0xB0);
        assert_eq!(ContainerType::Struct.variable_opcode(), 0xFD);
        assert_eq!(ContainerType::SExp.delimited_opcode(), 0xF2);
        assert!(!ContainerType::ExpressionGroup.is_data_model());
    }
}
