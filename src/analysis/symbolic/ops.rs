//! Symbolic operation types.
//!
//! [`SymOp`] is the closed set of operations a [`SymExpr`](super::SymExpr)
//! tree can contain. Unsigned operations work directly on the masked 64-bit
//! values; signed comparisons additionally carry the byte width of the
//! original operands, since "less than, signed, at 4 bytes" cannot be
//! recovered from a zero-extended 64-bit value alone.

use std::fmt;

/// A symbolic operation in an expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Unsigned division.
    DivU,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Bitwise NOT (unary).
    Not,
    /// Shift left.
    Shl,
    /// Logical shift right (zero-fill).
    ShrU,

    /// Equal; returns 0 or 1.
    Eq,
    /// Not equal; returns 0 or 1.
    Ne,
    /// Unsigned less than; returns 0 or 1.
    LtU,
    /// Unsigned greater than; returns 0 or 1.
    GtU,
    /// Unsigned less than or equal; returns 0 or 1.
    LeU,
    /// Unsigned greater than or equal; returns 0 or 1.
    GeU,
    /// Signed less than at the given byte width; returns 0 or 1.
    LtS(u8),
    /// Signed greater than at the given byte width; returns 0 or 1.
    GtS(u8),
    /// Signed less than or equal at the given byte width; returns 0 or 1.
    LeS(u8),
    /// Signed greater than or equal at the given byte width; returns 0 or 1.
    GeS(u8),
}

impl SymOp {
    /// True for operations that return 0 or 1.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Ne
                | Self::LtU
                | Self::GtU
                | Self::LeU
                | Self::GeU
                | Self::LtS(_)
                | Self::GtS(_)
                | Self::LeS(_)
                | Self::GeS(_)
        )
    }

    /// True for the single-operand operations.
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::Not)
    }
}

impl fmt::Display for SymOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::DivU => "/u",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Not => "~",
            Self::Shl => "<<",
            Self::ShrU => ">>u",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::LtU => "<u",
            Self::GtU => ">u",
            Self::LeU => "<=u",
            Self::GeU => ">=u",
            Self::LtS(_) => "<s",
            Self::GtS(_) => ">s",
            Self::LeS(_) => "<=s",
            Self::GeS(_) => ">=s",
        };
        f.write_str(s)
    }
}
