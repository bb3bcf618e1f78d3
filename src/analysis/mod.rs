//! Static analysis support for the deobfuscation passes.
//!
//! Currently this is the symbolic layer: an expression IR built from
//! instruction trees, and a scoped SMT solver used to decide whether a
//! comparison can ever be true, ever be false, or is opaque.

pub mod symbolic;

pub use symbolic::{ScopedSolver, SymExpr, SymOp, SymbolicEvaluator};
