//! Instructions and the closed opcode set.
//!
//! The opcode enum is deliberately closed: the symbolic evaluator matches on
//! it exhaustively, so a newly added opcode surfaces as a compile-time gap
//! rather than a silent runtime failure.

use std::fmt;

use strum::Display;

use crate::ir::Operand;

/// Instruction opcode.
///
/// The set mirrors the arithmetic/logic/compare/move/jump categories of the
/// host microcode. Comparison opcodes (`Set*`) produce 0/1 into their
/// destination; `J*` opcodes terminate a block.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    /// No operation.
    Nop,
    /// Move left operand into destination.
    Mov,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Unsigned division.
    Udiv,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Bitwise NOT.
    Bnot,
    /// Shift left.
    Shl,
    /// Logical (unsigned) shift right.
    Shr,
    /// Zero-extend left operand into a wider destination.
    Xdu,
    /// Set destination to 1 if left < right (signed), else 0.
    Setl,
    /// Set destination to 1 if left <= right (signed), else 0.
    Setle,
    /// Set destination to 1 if left > right (signed), else 0.
    Setg,
    /// Set destination to 1 if left == right, else 0.
    Setz,
    /// Set destination to 1 if left != right, else 0.
    Setnz,
    /// Logical NOT: set destination to 1 if left == 0, else 0.
    Lnot,
    /// Load from memory (address in left operand).
    Ldx,
    /// Unconditional jump; target block in left operand.
    Goto,
    /// Conditional jump on a boolean condition in the left operand.
    Jcnd,
    /// Jump to destination if left == right.
    Jz,
    /// Jump to destination if left != right.
    Jnz,
    /// Jump if above (unsigned >).
    Ja,
    /// Jump if above or equal (unsigned >=).
    Jae,
    /// Jump if below (unsigned <).
    Jb,
    /// Jump if below or equal (unsigned <=).
    Jbe,
    /// Jump if greater (signed >).
    Jg,
    /// Jump if greater or equal (signed >=).
    Jge,
    /// Jump if less (signed <).
    Jl,
    /// Jump if less or equal (signed <=).
    Jle,
    /// Return from the function.
    Ret,
}

impl Opcode {
    /// True for the two-operand comparison jumps the dispatcher analysis
    /// handles when extracting the state carrier.
    #[must_use]
    pub const fn is_handled_jump(self) -> bool {
        matches!(
            self,
            Self::Jnz
                | Self::Jz
                | Self::Jae
                | Self::Jb
                | Self::Ja
                | Self::Jbe
                | Self::Jge
                | Self::Jg
                | Self::Jl
                | Self::Jle
        )
    }

    /// True for any conditional jump, including the one-operand `jcnd`.
    #[must_use]
    pub const fn is_conditional_jump(self) -> bool {
        self.is_handled_jump() || matches!(self, Self::Jcnd)
    }

    /// True for any control transfer that terminates a block.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        self.is_conditional_jump() || matches!(self, Self::Goto)
    }
}

/// A single microcode instruction: an opcode plus up to three operand slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    /// The operation.
    pub opcode: Opcode,
    /// Left source operand.
    pub left: Operand,
    /// Right source operand.
    pub right: Operand,
    /// Destination operand. For conditional jumps this is the target block
    /// reference; for `goto` the target lives in `left`.
    pub dest: Operand,
}

impl Insn {
    /// Creates an instruction with all operand slots empty.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            left: Operand::None,
            right: Operand::None,
            dest: Operand::None,
        }
    }

    /// Creates an instruction with the given operands.
    #[must_use]
    pub fn with_operands(opcode: Opcode, left: Operand, right: Operand, dest: Operand) -> Self {
        Self {
            opcode,
            left,
            right,
            dest,
        }
    }

    /// Creates an unconditional jump to `target`.
    #[must_use]
    pub fn goto(target: usize) -> Self {
        Self::with_operands(Opcode::Goto, Operand::block(target), Operand::None, Operand::None)
    }

    /// Creates a `mov` of an immediate into a destination operand.
    #[must_use]
    pub fn mov_imm(value: u64, width: u8, dest: Operand) -> Self {
        Self::with_operands(Opcode::Mov, Operand::imm(value, width), Operand::None, dest)
    }

    /// Target block of this instruction, if it is a jump.
    ///
    /// `goto` carries its target in the left operand, conditional jumps in
    /// the destination operand.
    #[must_use]
    pub fn jump_target(&self) -> Option<usize> {
        match self.opcode {
            Opcode::Goto => self.left.as_block(),
            op if op.is_conditional_jump() => self.dest.as_block(),
            _ => None,
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for op in [&self.left, &self.right, &self.dest] {
            if !op.is_none() {
                write!(f, " {op}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handled_jumps_exclude_goto_and_jcnd() {
        assert!(Opcode::Jz.is_handled_jump());
        assert!(Opcode::Jle.is_handled_jump());
        assert!(!Opcode::Goto.is_handled_jump());
        assert!(!Opcode::Jcnd.is_handled_jump());
        assert!(Opcode::Jcnd.is_conditional_jump());
        assert!(Opcode::Goto.is_jump());
    }

    #[test]
    fn jump_target_location_depends_on_opcode() {
        assert_eq!(Insn::goto(7).jump_target(), Some(7));

        let jz = Insn::with_operands(
            Opcode::Jz,
            Operand::stack(0x10, 4),
            Operand::imm(0x11223344, 4),
            Operand::block(3),
        );
        assert_eq!(jz.jump_target(), Some(3));
        assert_eq!(Insn::new(Opcode::Mov).jump_target(), None);
    }
}
