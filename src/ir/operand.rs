//! Operand and storage-location types.
//!
//! Operands form a closed sum type over the shapes the engine understands:
//! immediate constants, abstract registers, stack slots, globals, nested
//! instructions (sub-expressions), block references, and the empty slot.
//! Each value-carrying variant records its byte width so narrow arithmetic
//! can be modeled faithfully during symbolic evaluation.

use std::fmt;

use crate::ir::Insn;

/// Logical identity of a register or stack slot.
///
/// Storage locations are compared by register id / stack offset, not by
/// operand object identity - this is the matching key used across blocks when
/// joining state assignments against the dispatcher carrier and the state
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// An abstract register, identified by its host-assigned id.
    Reg(u32),
    /// A stack slot, identified by its frame offset.
    StackSlot(u64),
}

impl Storage {
    /// Canonical name of this location, as used to join against oracle facts.
    ///
    /// Stack slots render as `%0xOFF` (matching the dump format of the legacy
    /// value-range oracle), registers as `rN`.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Reg(id) => format!("r{id}"),
            Self::StackSlot(off) => format!("%0x{off:X}"),
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Empty operand slot.
    None,
    /// Immediate constant.
    Imm {
        /// The constant value, zero-extended to 64 bits.
        value: u64,
        /// Byte width of the constant (1, 2, 4 or 8).
        width: u8,
    },
    /// Abstract register reference.
    Reg {
        /// Host-assigned register id.
        reg: u32,
        /// Byte width of the access.
        width: u8,
    },
    /// Stack slot reference.
    StackSlot {
        /// Frame offset of the slot.
        offset: u64,
        /// Byte width of the access.
        width: u8,
    },
    /// Global (memory) reference by absolute address.
    Global {
        /// Absolute address of the referenced location.
        address: u64,
        /// Byte width of the access.
        width: u8,
    },
    /// Nested instruction (sub-expression).
    Insn(Box<Insn>),
    /// Reference to a block by serial number.
    Block(usize),
}

impl Operand {
    /// Creates an immediate constant operand.
    #[must_use]
    pub fn imm(value: u64, width: u8) -> Self {
        Self::Imm { value, width }
    }

    /// Creates a register operand.
    #[must_use]
    pub fn reg(reg: u32, width: u8) -> Self {
        Self::Reg { reg, width }
    }

    /// Creates a stack-slot operand.
    #[must_use]
    pub fn stack(offset: u64, width: u8) -> Self {
        Self::StackSlot { offset, width }
    }

    /// Creates a global (memory) operand.
    #[must_use]
    pub fn global(address: u64, width: u8) -> Self {
        Self::Global { address, width }
    }

    /// Creates a block-reference operand.
    #[must_use]
    pub fn block(serial: usize) -> Self {
        Self::Block(serial)
    }

    /// Wraps an instruction as a nested sub-expression operand.
    #[must_use]
    pub fn insn(insn: Insn) -> Self {
        Self::Insn(Box::new(insn))
    }

    /// Byte width of the operand, if it has one.
    ///
    /// Nested instructions report the width of their destination; block
    /// references and empty slots have no width.
    #[must_use]
    pub fn width(&self) -> Option<u8> {
        match self {
            Self::Imm { width, .. }
            | Self::Reg { width, .. }
            | Self::StackSlot { width, .. }
            | Self::Global { width, .. } => Some(*width),
            Self::Insn(insn) => insn.dest.width(),
            Self::None | Self::Block(_) => None,
        }
    }

    /// Returns the immediate value if this is a constant operand.
    #[must_use]
    pub fn as_imm(&self) -> Option<u64> {
        match self {
            Self::Imm { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Returns the referenced block serial if this is a block reference.
    #[must_use]
    pub fn as_block(&self) -> Option<usize> {
        match self {
            Self::Block(serial) => Some(*serial),
            _ => None,
        }
    }

    /// Returns the storage identity if this operand names a register or
    /// stack slot.
    #[must_use]
    pub fn storage(&self) -> Option<Storage> {
        match self {
            Self::Reg { reg, .. } => Some(Storage::Reg(*reg)),
            Self::StackSlot { offset, .. } => Some(Storage::StackSlot(*offset)),
            _ => None,
        }
    }

    /// True if the operand slot is empty.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "_"),
            Self::Imm { value, width } => write!(f, "#0x{value:X}.{width}"),
            Self::Reg { reg, width } => write!(f, "r{reg}.{width}"),
            Self::StackSlot { offset, width } => write!(f, "%0x{offset:X}.{width}"),
            Self::Global { address, width } => write!(f, "@0x{address:X}.{width}"),
            Self::Insn(insn) => write!(f, "({insn})"),
            Self::Block(serial) => write!(f, "b{serial}"),
        }
    }
}
