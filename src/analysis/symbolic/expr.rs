//! Symbolic expression trees.

use std::fmt;

use crate::analysis::symbolic::ops::SymOp;

/// A symbolic expression over 64-bit values.
///
/// Variables are named after the storage location or memory cell they read
/// (see [`Storage::name`](crate::ir::Storage::name)), so two reads of the
/// same slot in the same scope alias the same solver variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymExpr {
    /// A constant, zero-extended to 64 bits.
    Const(u64),
    /// A free variable identified by its canonical storage name.
    Var(String),
    /// A unary operation.
    Unary {
        /// The operation to perform.
        op: SymOp,
        /// The operand.
        operand: Box<SymExpr>,
    },
    /// A binary operation.
    Binary {
        /// The operation to perform.
        op: SymOp,
        /// The left operand.
        left: Box<SymExpr>,
        /// The right operand.
        right: Box<SymExpr>,
    },
}

impl SymExpr {
    /// Creates a constant expression.
    #[must_use]
    pub fn constant(value: u64) -> Self {
        Self::Const(value)
    }

    /// Creates a free variable.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Creates a unary operation node.
    #[must_use]
    pub fn unary(op: SymOp, operand: SymExpr) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Creates a binary operation node.
    #[must_use]
    pub fn binary(op: SymOp, left: SymExpr, right: SymExpr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Masks the expression to the low `width` bytes.
    ///
    /// A width of 8 (or more) is the full 64-bit word and returns the
    /// expression unchanged; masking a constant folds immediately.
    #[must_use]
    pub fn masked(self, width: u8) -> Self {
        if width >= 8 {
            return self;
        }
        let mask = (1u64 << (u64::from(width) * 8)) - 1;
        match self {
            Self::Const(v) => Self::Const(v & mask),
            other => Self::binary(SymOp::And, other, Self::Const(mask)),
        }
    }

    /// Returns the constant value if the expression is a bare constant.
    #[must_use]
    pub fn as_const(&self) -> Option<u64> {
        match self {
            Self::Const(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "0x{v:X}"),
            Self::Var(name) => f.write_str(name),
            Self::Unary { op, operand } => write!(f, "{op}({operand})"),
            Self::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
        }
    }
}
