//! Symbolic expression IR and SMT solving.
//!
//! Instructions and their nested sub-expressions are lifted into
//! [`SymExpr`] trees by the [`SymbolicEvaluator`], then handed to the
//! [`ScopedSolver`] for satisfiability queries over 64-bit bitvectors.
//! Sub-width operands are modeled by masking rather than by narrow
//! bitvectors, so a 4-byte register read becomes `var & 0xFFFFFFFF`.

mod eval;
mod expr;
mod ops;
mod solver;

pub use eval::SymbolicEvaluator;
pub use expr::SymExpr;
pub use ops::SymOp;
pub use solver::ScopedSolver;
