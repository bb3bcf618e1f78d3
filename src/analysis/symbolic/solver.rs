//! Scoped SMT queries over symbolic expressions.
//!
//! All computations use 64-bit bitvectors; sub-width operands arrive
//! pre-masked from the evaluator. Signed comparisons extract the low bits of
//! their original width before comparing, so 4-byte signed semantics survive
//! the zero-extension.

use std::collections::HashMap;

use crate::analysis::symbolic::{expr::SymExpr, ops::SymOp};

/// An SMT solver scoped to one block (or one analysis region).
///
/// Point queries - can these two expressions ever be equal, can they ever
/// differ - run inside a push/pop scope, so they never leak assertions into
/// each other. Facts established by the caller (for example a comparison
/// result that was just folded to a constant) are added with
/// [`assume_eq`](Self::assume_eq) and persist for the solver's lifetime,
/// which is why one solver instance must not outlive the block it models.
pub struct ScopedSolver {
    solver: z3::Solver,
    vars: HashMap<String, z3::ast::BV>,
}

impl ScopedSolver {
    /// Creates a solver with an empty assertion set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            vars: HashMap::new(),
        }
    }

    /// Permanently asserts `left == right`.
    ///
    /// Used to feed back facts discovered earlier in the same block, so a
    /// later query sees them.
    pub fn assume_eq(&mut self, left: &SymExpr, right: &SymExpr) {
        let l = self.translate(left);
        let r = self.translate(right);
        self.solver.assert(l.eq(&r));
    }

    /// Whether `left == right` is satisfiable under the current assumptions.
    ///
    /// Returns `Some(true)` for sat, `Some(false)` for unsat, and `None` if
    /// the solver gave up.
    pub fn satisfiable_eq(&mut self, left: &SymExpr, right: &SymExpr) -> Option<bool> {
        let l = self.translate(left);
        let r = self.translate(right);
        self.check_scoped(l.eq(&r))
    }

    /// Whether `left != right` is satisfiable under the current assumptions.
    ///
    /// Returns `Some(true)` for sat, `Some(false)` for unsat, and `None` if
    /// the solver gave up.
    pub fn satisfiable_ne(&mut self, left: &SymExpr, right: &SymExpr) -> Option<bool> {
        let l = self.translate(left);
        let r = self.translate(right);
        self.check_scoped(l.eq(&r).not())
    }

    fn check_scoped(&mut self, assertion: z3::ast::Bool) -> Option<bool> {
        self.solver.push();
        self.solver.assert(assertion);
        let verdict = match self.solver.check() {
            z3::SatResult::Sat => Some(true),
            z3::SatResult::Unsat => Some(false),
            z3::SatResult::Unknown => None,
        };
        self.solver.pop(1);
        verdict
    }

    /// Translates a symbolic expression to Z3's bitvector AST.
    ///
    /// Variables are interned per solver, so every occurrence of a storage
    /// name maps to the same Z3 constant across queries and assumptions.
    fn translate(&mut self, expr: &SymExpr) -> z3::ast::BV {
        match expr {
            SymExpr::Const(v) => z3::ast::BV::from_u64(*v, 64),

            SymExpr::Var(name) => self
                .vars
                .entry(name.clone())
                .or_insert_with(|| z3::ast::BV::new_const(name.as_str(), 64))
                .clone(),

            SymExpr::Unary { op, operand } => {
                let operand = self.translate(operand);
                match op {
                    SymOp::Not => operand.bvnot(),
                    _ => operand,
                }
            }

            SymExpr::Binary { op, left, right } => {
                let left = self.translate(left);
                let right = self.translate(right);
                let one = z3::ast::BV::from_u64(1, 64);
                let zero = z3::ast::BV::from_u64(0, 64);

                match op {
                    SymOp::Add => left.bvadd(&right),
                    SymOp::Sub => left.bvsub(&right),
                    SymOp::Mul => left.bvmul(&right),
                    SymOp::DivU => left.bvudiv(&right),
                    SymOp::And => left.bvand(&right),
                    SymOp::Or => left.bvor(&right),
                    SymOp::Xor => left.bvxor(&right),
                    SymOp::Shl => left.bvshl(&right),
                    SymOp::ShrU => left.bvlshr(&right),
                    SymOp::Eq => left.eq(&right).ite(&one, &zero),
                    SymOp::Ne => left.eq(&right).not().ite(&one, &zero),
                    SymOp::LtU => left.bvult(&right).ite(&one, &zero),
                    SymOp::GtU => left.bvugt(&right).ite(&one, &zero),
                    SymOp::LeU => left.bvule(&right).ite(&one, &zero),
                    SymOp::GeU => left.bvuge(&right).ite(&one, &zero),
                    SymOp::LtS(w) => {
                        let (l, r) = Self::narrow(&left, &right, *w);
                        l.bvslt(&r).ite(&one, &zero)
                    }
                    SymOp::GtS(w) => {
                        let (l, r) = Self::narrow(&left, &right, *w);
                        l.bvsgt(&r).ite(&one, &zero)
                    }
                    SymOp::LeS(w) => {
                        let (l, r) = Self::narrow(&left, &right, *w);
                        l.bvsle(&r).ite(&one, &zero)
                    }
                    SymOp::GeS(w) => {
                        let (l, r) = Self::narrow(&left, &right, *w);
                        l.bvsge(&r).ite(&one, &zero)
                    }
                    SymOp::Not => left,
                }
            }
        }
    }

    /// Truncates both operands to `width` bytes so signed comparisons see
    /// the original sign bit rather than the zero-extended one.
    fn narrow(left: &z3::ast::BV, right: &z3::ast::BV, width: u8) -> (z3::ast::BV, z3::ast::BV) {
        let bits = u32::from(width.clamp(1, 8)) * 8;
        if bits >= 64 {
            return (left.clone(), right.clone());
        }
        (left.extract(bits - 1, 0), right.extract(bits - 1, 0))
    }
}

impl Default for ScopedSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `x * (x + 1)` is always even, the classic opaque predicate shape.
    #[test]
    fn even_product_predicate_is_opaque() {
        let mut solver = ScopedSolver::new();
        let x = SymExpr::var("x");
        let product = SymExpr::binary(
            SymOp::Mul,
            x.clone(),
            SymExpr::binary(SymOp::Add, x, SymExpr::constant(1)),
        );
        let low_bit = SymExpr::binary(SymOp::And, product, SymExpr::constant(1));
        let zero = SymExpr::constant(0);

        assert_eq!(solver.satisfiable_eq(&low_bit, &zero), Some(true));
        assert_eq!(solver.satisfiable_ne(&low_bit, &zero), Some(false));
    }

    #[test]
    fn genuine_two_way_comparison_stays_undecided() {
        let mut solver = ScopedSolver::new();
        let x = SymExpr::var("%0x10").masked(4);
        let c = SymExpr::constant(0x11223344);

        assert_eq!(solver.satisfiable_eq(&x, &c), Some(true));
        assert_eq!(solver.satisfiable_ne(&x, &c), Some(true));
    }

    #[test]
    fn assumptions_persist_across_queries() {
        let mut solver = ScopedSolver::new();
        let x = SymExpr::var("r1").masked(4);
        solver.assume_eq(&x, &SymExpr::constant(7));

        assert_eq!(solver.satisfiable_ne(&x, &SymExpr::constant(7)), Some(false));
        assert_eq!(solver.satisfiable_eq(&x, &SymExpr::constant(7)), Some(true));
    }

    #[test]
    fn signed_compare_respects_narrow_width() {
        let mut solver = ScopedSolver::new();
        // At 4 bytes, 0xFFFFFFFF is -1 and is < 0 signed.
        let minus_one = SymExpr::constant(0xFFFF_FFFF);
        let cmp = SymExpr::binary(SymOp::LtS(4), minus_one, SymExpr::constant(0));
        assert_eq!(solver.satisfiable_eq(&cmp, &SymExpr::constant(1)), Some(true));
        assert_eq!(solver.satisfiable_ne(&cmp, &SymExpr::constant(1)), Some(false));
    }
}
