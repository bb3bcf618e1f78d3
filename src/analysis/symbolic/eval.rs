//! Lifting instructions into symbolic expressions.

use crate::{
    analysis::symbolic::{expr::SymExpr, ops::SymOp},
    ir::{Insn, Opcode, Operand},
    Error, Result,
};

/// Lifts [`Insn`] trees and [`Operand`]s into [`SymExpr`]s.
///
/// The evaluator is deliberately partial: memory loads, calls and anything
/// else it cannot model faithfully abort the lift with
/// [`Error::UnsupportedConstruct`], and the caller leaves the code as is.
/// An over-approximate lift would let the solver prove branches dead that
/// are not.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolicEvaluator;

impl SymbolicEvaluator {
    /// Creates a new evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Lifts an operand into an expression, masked to the operand's width.
    ///
    /// Registers, stack slots and globals become free variables named after
    /// the storage they read; nested instructions are lifted recursively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedConstruct`] for empty slots, block
    /// references, and any nested instruction the evaluator cannot model.
    pub fn lift_operand(&self, operand: &Operand) -> Result<SymExpr> {
        match operand {
            Operand::Imm { value, width } => Ok(SymExpr::constant(*value).masked(*width)),
            Operand::Reg { .. } | Operand::StackSlot { .. } => {
                let storage = operand
                    .storage()
                    .ok_or_else(|| Error::UnsupportedConstruct("storage operand".into()))?;
                let width = operand.width().unwrap_or(8);
                Ok(SymExpr::var(storage.name()).masked(width))
            }
            Operand::Global { address, width } => {
                Ok(SymExpr::var(format!("@0x{address:X}")).masked(*width))
            }
            Operand::Insn(insn) => self.lift_insn(insn),
            Operand::None | Operand::Block(_) => Err(Error::UnsupportedConstruct(format!(
                "operand {operand} has no value"
            ))),
        }
    }

    /// Lifts an instruction into the expression it computes.
    ///
    /// Only value-producing opcodes are supported; jumps and memory loads
    /// are not. The result is masked to the destination width where the
    /// operation can produce bits above it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedConstruct`] for any opcode or operand
    /// shape outside the modeled subset, `ldx` in particular.
    pub fn lift_insn(&self, insn: &Insn) -> Result<SymExpr> {
        let dest_width = insn.dest.width().or_else(|| insn.left.width()).unwrap_or(8);

        let expr = match insn.opcode {
            Opcode::Mov => self.lift_operand(&insn.left)?,
            // Zero extension of an already-masked narrower value.
            Opcode::Xdu => return self.lift_operand(&insn.left),

            Opcode::Add => self.lift_binary(SymOp::Add, insn)?,
            Opcode::Sub => self.lift_binary(SymOp::Sub, insn)?,
            Opcode::Mul => self.lift_binary(SymOp::Mul, insn)?,
            Opcode::Udiv => self.lift_binary(SymOp::DivU, insn)?,
            Opcode::And => self.lift_binary(SymOp::And, insn)?,
            Opcode::Or => self.lift_binary(SymOp::Or, insn)?,
            Opcode::Xor => self.lift_binary(SymOp::Xor, insn)?,
            Opcode::Shl => self.lift_binary(SymOp::Shl, insn)?,
            Opcode::Shr => self.lift_binary(SymOp::ShrU, insn)?,
            Opcode::Bnot => SymExpr::unary(SymOp::Not, self.lift_operand(&insn.left)?),

            Opcode::Setz => return self.lift_binary(SymOp::Eq, insn),
            Opcode::Setnz => return self.lift_binary(SymOp::Ne, insn),
            Opcode::Setl => return self.lift_compare_signed(insn, SymOp::LtS),
            Opcode::Setle => return self.lift_compare_signed(insn, SymOp::LeS),
            Opcode::Setg => return self.lift_compare_signed(insn, SymOp::GtS),
            Opcode::Lnot => {
                return Ok(SymExpr::binary(
                    SymOp::Eq,
                    self.lift_operand(&insn.left)?,
                    SymExpr::constant(0),
                ))
            }

            Opcode::Ldx => {
                return Err(Error::UnsupportedConstruct("memory load".into()));
            }
            other => {
                return Err(Error::UnsupportedConstruct(format!(
                    "non-value opcode {other}"
                )));
            }
        };

        Ok(expr.masked(dest_width))
    }

    fn lift_binary(&self, op: SymOp, insn: &Insn) -> Result<SymExpr> {
        Ok(SymExpr::binary(
            op,
            self.lift_operand(&insn.left)?,
            self.lift_operand(&insn.right)?,
        ))
    }

    fn lift_compare_signed(&self, insn: &Insn, op: fn(u8) -> SymOp) -> Result<SymExpr> {
        let width = insn.left.width().or_else(|| insn.right.width()).unwrap_or(8);
        Ok(SymExpr::binary(
            op(width),
            self.lift_operand(&insn.left)?,
            self.lift_operand(&insn.right)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifts_masked_storage_reads() {
        let eval = SymbolicEvaluator::new();
        let e = eval.lift_operand(&Operand::stack(0x38, 4)).unwrap();
        assert_eq!(e.to_string(), "(%0x38 & 0xFFFFFFFF)");

        let g = eval.lift_operand(&Operand::global(0x601040, 8)).unwrap();
        assert_eq!(g, SymExpr::var("@0x601040"));
    }

    #[test]
    fn lifts_nested_expression_trees() {
        let eval = SymbolicEvaluator::new();
        // xor (add %0x10, #1), #0x55
        let add = Insn::with_operands(
            Opcode::Add,
            Operand::stack(0x10, 4),
            Operand::imm(1, 4),
            Operand::reg(0, 4),
        );
        let xor = Insn::with_operands(
            Opcode::Xor,
            Operand::insn(add),
            Operand::imm(0x55, 4),
            Operand::reg(0, 4),
        );
        let e = eval.lift_insn(&xor).unwrap();
        assert_eq!(
            e.to_string(),
            "(((((%0x10 & 0xFFFFFFFF) + 0x1) & 0xFFFFFFFF) ^ 0x55) & 0xFFFFFFFF)"
        );
    }

    #[test]
    fn signed_compare_carries_operand_width() {
        let eval = SymbolicEvaluator::new();
        let setl = Insn::with_operands(
            Opcode::Setl,
            Operand::reg(1, 4),
            Operand::imm(0, 4),
            Operand::reg(2, 1),
        );
        match eval.lift_insn(&setl).unwrap() {
            SymExpr::Binary { op, .. } => assert_eq!(op, SymOp::LtS(4)),
            other => panic!("unexpected lift: {other}"),
        }
    }

    #[test]
    fn memory_loads_are_rejected() {
        let eval = SymbolicEvaluator::new();
        let ldx = Insn::with_operands(
            Opcode::Ldx,
            Operand::reg(3, 8),
            Operand::None,
            Operand::reg(0, 8),
        );
        assert!(matches!(
            eval.lift_insn(&ldx),
            Err(Error::UnsupportedConstruct(_))
        ));
    }
}
