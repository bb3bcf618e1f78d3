//! Opaque-predicate branch folding.
//!
//! A flattening obfuscator hides constant branches behind arithmetic: the
//! condition of a `jz`/`jnz` is a computed expression that in fact takes only
//! one side for all reachable inputs. Per block, the pass lifts such
//! conditions symbolically and asks the solver whether each side is
//! satisfiable at all; a one-sided branch is folded to unconditional flow.
//!
//! `xdu` instructions whose source is a computed 0/1 expression get the same
//! treatment: a provably constant result becomes a `mov`, and the proven
//! value is fed back into the block-scoped solver so later conditions in the
//! same block see it.

use crate::{
    analysis::{ScopedSolver, SymExpr, SymbolicEvaluator},
    ir::{BlockFlags, BlockKind, Function, Insn, Opcode, Operand},
    log::*,
};

/// Folds provably one-sided conditional branches across the whole function.
/// Returns the number of folded branches and rewritten `xdu`s.
///
/// Each mutated function is re-verified afterwards; a verification failure is
/// logged and the pass result kept, since a partially cleaned graph is still
/// more useful to the host than an untouched one.
pub fn simplify_branches(func: &mut Function) -> usize {
    let mut folded = 0;
    for serial in func.inner_serials().collect::<Vec<_>>() {
        let in_block = simplify_block(func, serial);
        if in_block > 0 {
            folded += in_block;
            if let Err(err) = func.verify() {
                error!("verification failed after branch folding"; "block" => serial, "err" => %err);
            }
        }
    }
    folded
}

/// One solver scope per block: facts proven while walking the instruction
/// list stay visible to later instructions of the same block and no further.
fn simplify_block(func: &mut Function, serial: usize) -> usize {
    let eval = SymbolicEvaluator::new();
    let mut solver = ScopedSolver::new();
    let mut folded = 0;

    let mut idx = 0;
    while idx < func.block(serial).insns.len() {
        let insn = func.block(serial).insns[idx].clone();
        let is_tail = idx + 1 == func.block(serial).insns.len();

        match insn.opcode {
            Opcode::Jz | Opcode::Jnz if is_tail && matches!(insn.left, Operand::Insn(_)) => {
                if fold_jump(func, serial, &insn, &eval, &mut solver) {
                    folded += 1;
                    break;
                }
            }
            Opcode::Xdu if matches!(insn.left, Operand::Insn(_)) => {
                folded += fold_xdu(func, serial, idx, &insn, &eval, &mut solver);
            }
            _ => {}
        }
        idx += 1;
    }
    folded
}

/// Decides a `jz`/`jnz` whose condition is a nested expression compared to a
/// constant, and rewrites the block if one side is unsatisfiable.
fn fold_jump(
    func: &mut Function,
    serial: usize,
    insn: &Insn,
    eval: &SymbolicEvaluator,
    solver: &mut ScopedSolver,
) -> bool {
    let (Some(value), Some(target)) = (insn.right.as_imm(), insn.jump_target()) else {
        return false;
    };
    let Ok(expr) = eval.lift_operand(&insn.left) else {
        return false; // unsupported construct, leave the branch alone
    };
    let constant = SymExpr::constant(value).masked(insn.right.width().unwrap_or(8));

    let equal_sat = solver.satisfiable_eq(&expr, &constant);
    let differ_sat = solver.satisfiable_ne(&expr, &constant);

    let always_equal = match (equal_sat, differ_sat) {
        (Some(true), Some(false)) => true,
        (Some(false), Some(true)) => false,
        (Some(false), Some(false)) => {
            // The solver contradicting itself means the lift is wrong or the
            // block is unreachable. Fold to the equal side but flag it.
            warn!("contradictory branch verdict"; "block" => serial, "insn" => %insn);
            true
        }
        _ => return false, // genuinely two-sided, or solver gave up
    };

    // jz takes its target on equality, jnz on inequality.
    let taken = (insn.opcode == Opcode::Jz) == always_equal;

    func.block_mut(serial).remove_tail();
    func.clear_edges(serial);
    if taken {
        func.block_mut(serial).push(Insn::goto(target));
        func.add_edge(serial, target);
        func.block_mut(serial).kind = BlockKind::OneWay;
        func.block_mut(serial).flags |= BlockFlags::GOTO;
    } else {
        func.add_edge(serial, serial + 1);
        func.block_mut(serial).kind = BlockKind::Fallthrough;
    }
    func.block_mut(serial).mark_lists_dirty();
    func.mark_chains_dirty();

    info!(
        "folded opaque branch";
        "block" => serial,
        "always_equal" => always_equal,
        "successor" => if taken { target } else { serial + 1 }
    );
    true
}

/// Rewrites `xdu` of a provably constant 0/1 expression to a `mov`, feeding
/// the proven value (or, failing proof, the symbolic equality) back into the
/// block's solver scope.
fn fold_xdu(
    func: &mut Function,
    serial: usize,
    idx: usize,
    insn: &Insn,
    eval: &SymbolicEvaluator,
    solver: &mut ScopedSolver,
) -> usize {
    let (Ok(expr), Ok(dest)) = (eval.lift_operand(&insn.left), eval.lift_operand(&insn.dest))
    else {
        return 0;
    };
    let one = SymExpr::constant(1);
    let zero = SymExpr::constant(0);
    let width = insn.dest.width().unwrap_or(8);

    // The rewrite needs "never anything else", not "can be this", so the
    // proof refutes the complement.
    let proven = match (
        solver.satisfiable_ne(&expr, &one),
        solver.satisfiable_ne(&expr, &zero),
    ) {
        (Some(false), _) => Some(1u64),
        (_, Some(false)) => Some(0u64),
        _ => None,
    };

    match proven {
        Some(value) => {
            func.block_mut(serial).insns[idx] =
                Insn::mov_imm(value, width, insn.dest.clone());
            solver.assume_eq(&dest, &SymExpr::constant(value));
            info!("folded xdu to constant"; "block" => serial, "value" => value);
            1
        }
        None => {
            solver.assume_eq(&dest, &expr);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SegmentMap;

    /// entry -> b1 (two-way) -> {b2, b3} -> exit
    fn two_way_function(cond: Insn) -> Function {
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        let b1 = func.add_block(BlockKind::TwoWay);
        let b2 = func.add_block(BlockKind::Fallthrough);
        let b3 = func.add_block(BlockKind::OneWay);
        let exit = func.add_block(BlockKind::Exit);
        func.add_edge(0, b1);
        func.add_edge(b1, b2); // fallthrough first
        func.add_edge(b1, b3); // conditional target last
        func.add_edge(b2, exit);
        func.block_mut(b3).push(Insn::goto(exit));
        func.add_edge(b3, exit);
        func.block_mut(b1).push(cond);
        func
    }

    /// `x * (x + 1)` is even for every x, so `(x*(x+1)) & 1` is always zero:
    /// compared against 0 the equality always holds, against 1 never.
    fn even_product_cond(jump: Opcode, against: u64) -> Insn {
        let x = Operand::stack(0x20, 4);
        let plus_one = Insn::with_operands(
            Opcode::Add,
            x.clone(),
            Operand::imm(1, 4),
            Operand::reg(0, 4),
        );
        let product = Insn::with_operands(
            Opcode::Mul,
            x,
            Operand::insn(plus_one),
            Operand::reg(0, 4),
        );
        let low_bit = Insn::with_operands(
            Opcode::And,
            Operand::insn(product),
            Operand::imm(1, 4),
            Operand::reg(0, 4),
        );
        Insn::with_operands(
            jump,
            Operand::insn(low_bit),
            Operand::imm(against, 4),
            Operand::block(3),
        )
    }

    #[test]
    fn always_true_jz_becomes_goto() {
        let mut func = two_way_function(even_product_cond(Opcode::Jz, 0));
        assert_eq!(simplify_branches(&mut func), 1);

        assert_eq!(func.block(1).kind, BlockKind::OneWay);
        assert!(func.block(1).ends_in_goto());
        assert_eq!(func.block(1).succs, vec![3]);
        assert!(func.block(2).preds.is_empty());
        assert!(func.verify().is_ok());
    }

    #[test]
    fn always_false_jnz_falls_through() {
        let mut func = two_way_function(even_product_cond(Opcode::Jnz, 0));
        assert_eq!(simplify_branches(&mut func), 1);

        assert_eq!(func.block(1).kind, BlockKind::Fallthrough);
        assert!(func.block(1).insns.is_empty());
        assert_eq!(func.block(1).succs, vec![2]);
        assert!(func.block(3).preds.is_empty());
        assert!(func.verify().is_ok());
    }

    #[test]
    fn unsat_equality_takes_the_differ_side() {
        // `(x*(x+1)) & 1 == 1` is unsatisfiable; the jz must never take its
        // target, even though the inequality side is trivially reachable.
        let mut func = two_way_function(even_product_cond(Opcode::Jz, 1));
        assert_eq!(simplify_branches(&mut func), 1);

        assert_eq!(func.block(1).kind, BlockKind::Fallthrough);
        assert!(func.block(1).insns.is_empty());
        assert_eq!(func.block(1).succs, vec![2]);
        assert!(func.block(3).preds.is_empty());
        assert!(func.verify().is_ok());
    }

    #[test]
    fn contradictory_facts_fold_to_the_equal_side() {
        // Two xdu rewrites pin r5 to 1 and then to 0, leaving the block's
        // solver scope unsatisfiable; the terminal branch then hits the
        // both-unsat row and is folded to its equal side.
        let probe = Insn::with_operands(
            Opcode::Xor,
            Operand::stack(0x20, 4),
            Operand::imm(0x55, 4),
            Operand::reg(0, 4),
        );
        let cond = Insn::with_operands(
            Opcode::Jz,
            Operand::insn(probe),
            Operand::imm(0, 4),
            Operand::block(3),
        );
        let mut func = two_way_function(cond);

        let always_one = Insn::with_operands(
            Opcode::Setz,
            Operand::imm(0, 4),
            Operand::imm(0, 4),
            Operand::reg(5, 1),
        );
        let always_zero = Insn::with_operands(
            Opcode::Setnz,
            Operand::imm(0, 4),
            Operand::imm(0, 4),
            Operand::reg(5, 1),
        );
        let xdu = |src| {
            Insn::with_operands(Opcode::Xdu, Operand::insn(src), Operand::None, Operand::reg(5, 4))
        };
        func.block_mut(1).insns.insert(0, xdu(always_zero));
        func.block_mut(1).insns.insert(0, xdu(always_one));

        // Two xdu rewrites plus the branch fold.
        assert_eq!(simplify_branches(&mut func), 3);
        assert!(func.block(1).ends_in_goto());
        assert_eq!(func.block(1).succs, vec![3]);
        assert!(func.verify().is_ok());
    }

    #[test]
    fn non_boolean_xdu_is_not_folded() {
        // `x | 1` can never be 0, but it is not constant either: proving
        // "cannot be 0" must not count as proving "always 1".
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        let b = func.add_block(BlockKind::Fallthrough);
        func.add_block(BlockKind::Exit);
        func.add_edge(0, b);
        func.add_edge(b, 2);

        let low_bit_set = Insn::with_operands(
            Opcode::Or,
            Operand::stack(0x20, 4),
            Operand::imm(1, 4),
            Operand::reg(5, 4),
        );
        func.block_mut(b).push(Insn::with_operands(
            Opcode::Xdu,
            Operand::insn(low_bit_set),
            Operand::None,
            Operand::reg(5, 8),
        ));

        assert_eq!(simplify_branches(&mut func), 0);
        assert_eq!(func.block(b).insns[0].opcode, Opcode::Xdu);
        assert!(matches!(func.block(b).insns[0].left, Operand::Insn(_)));
    }

    #[test]
    fn genuine_branches_are_left_alone() {
        // A straight comparison of a free variable is two-sided.
        let probe = Insn::with_operands(
            Opcode::Xor,
            Operand::stack(0x20, 4),
            Operand::imm(0x55, 4),
            Operand::reg(0, 4),
        );
        let cond = Insn::with_operands(
            Opcode::Jz,
            Operand::insn(probe),
            Operand::imm(0, 4),
            Operand::block(3),
        );
        let mut func = two_way_function(cond);
        assert_eq!(simplify_branches(&mut func), 0);
        assert_eq!(func.block(1).kind, BlockKind::TwoWay);
        assert_eq!(func.block(1).succs, vec![2, 3]);
    }

    #[test]
    fn folded_xdu_feeds_later_conditions() {
        // xdu(setz(0, 0)) is always 1; a following jz comparing the xdu
        // destination to 1 must then fold as well.
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        let b1 = func.add_block(BlockKind::TwoWay);
        let b2 = func.add_block(BlockKind::Fallthrough);
        let b3 = func.add_block(BlockKind::OneWay);
        let exit = func.add_block(BlockKind::Exit);
        func.add_edge(0, b1);
        func.add_edge(b1, b2);
        func.add_edge(b1, b3);
        func.add_edge(b2, exit);
        func.block_mut(b3).push(Insn::goto(exit));
        func.add_edge(b3, exit);

        let setz = Insn::with_operands(
            Opcode::Setz,
            Operand::imm(0, 4),
            Operand::imm(0, 4),
            Operand::reg(5, 1),
        );
        func.block_mut(b1).push(Insn::with_operands(
            Opcode::Xdu,
            Operand::insn(setz),
            Operand::None,
            Operand::reg(5, 4),
        ));
        let probe = Insn::with_operands(
            Opcode::Sub,
            Operand::reg(5, 4),
            Operand::imm(1, 4),
            Operand::reg(6, 4),
        );
        func.block_mut(b1).push(Insn::with_operands(
            Opcode::Jz,
            Operand::insn(probe),
            Operand::imm(0, 4),
            Operand::block(b3),
        ));

        // One xdu rewrite plus one branch fold.
        assert_eq!(simplify_branches(&mut func), 2);
        assert_eq!(func.block(b1).insns[0], Insn::mov_imm(1, 4, Operand::reg(5, 4)));
        assert!(func.block(b1).ends_in_goto());
        assert_eq!(func.block(b1).succs, vec![b3]);
    }

    #[test]
    fn zeroed_global_comparison_folds_after_dead_zero() {
        // A `.bss` global that is never written reads as zero; comparing it
        // to zero is then an always-equal branch.
        let mut segments = SegmentMap::new();
        segments.add(".bss", 0x60_2000, 0x60_3000, true);

        let probe = Insn::with_operands(
            Opcode::Xdu,
            Operand::global(0x60_2040, 4),
            Operand::None,
            Operand::reg(0, 8),
        );
        let cond = Insn::with_operands(
            Opcode::Jz,
            Operand::insn(probe),
            Operand::imm(0, 8),
            Operand::block(3),
        );
        let mut func = two_way_function(cond);

        assert_eq!(super::super::zero_dead_reads(&mut func, &segments), 1);
        assert_eq!(simplify_branches(&mut func), 1);
        assert_eq!(func.block(1).succs, vec![3]);
        assert!(func.verify().is_ok());
    }
}
