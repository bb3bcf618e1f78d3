//! Graph mutation primitives.
//!
//! Every structural change to a function goes through these methods, which
//! keep predecessor and successor sets mutually consistent and mark the
//! affected blocks and dataflow chains dirty. Successor order is significant
//! for two-way blocks (`[fallthrough-or-false, conditional]`), so edge
//! replacement is positional rather than remove-then-append.

use crate::ir::{Block, BlockFlags, BlockKind, Function, Insn, Operand};

impl Function {
    /// Adds the edge `from -> to` to both edge sets.
    ///
    /// Appends to the end of `from`'s successor list; for two-way blocks the
    /// caller is responsible for insertion order.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
        self.mark_chains_dirty();
    }

    /// Removes the edge `from -> to` from both edge sets, if present.
    pub fn remove_edge(&mut self, from: usize, to: usize) {
        self.block_mut(from).succs.retain(|&s| s != to);
        self.block_mut(to).preds.retain(|&p| p != from);
        self.mark_chains_dirty();
    }

    /// Replaces the edge `from -> to_old` with `from -> to_new`, preserving
    /// its position in `from`'s successor list.
    ///
    /// If `to_old` is `None` or not currently a successor of `from`, the new
    /// edge is appended instead. A `to_old` equal to `to_new` degenerates to
    /// a no-op on the successor side but still dedups the predecessor entry.
    pub fn add_or_replace_edge(&mut self, from: usize, to_new: usize, to_old: Option<usize>) {
        let pos = to_old.and_then(|old| self.block(from).succs.iter().position(|&s| s == old));
        match (pos, to_old) {
            (Some(pos), Some(old)) => {
                self.block_mut(from).succs[pos] = to_new;
                self.block_mut(old).preds.retain(|&p| p != from);
                if !self.block(to_new).preds.contains(&from) {
                    self.block_mut(to_new).preds.push(from);
                }
                self.mark_chains_dirty();
            }
            _ => self.add_edge(from, to_new),
        }
    }

    /// Removes every outgoing edge of `serial` from both edge sets.
    pub fn clear_edges(&mut self, serial: usize) {
        let succs = std::mem::take(&mut self.block_mut(serial).succs);
        for succ in succs {
            self.block_mut(succ).preds.retain(|&p| p != serial);
        }
        self.mark_chains_dirty();
    }

    /// Retargets the control transfer at the end of `serial` to `new_target`
    /// and rewires the corresponding edge.
    ///
    /// Three shapes are handled:
    /// - the block ends in `goto`: its target operand is rewritten;
    /// - the block ends in a conditional jump: the taken-branch target is
    ///   rewritten, the fallthrough edge is left alone;
    /// - the block falls through: a `goto new_target` is synthesized, the
    ///   block becomes one-way and loses its fallthrough edge to the next
    ///   serial.
    ///
    /// Returns `true` if a `goto` had to be synthesized.
    pub fn change_jump_target(&mut self, serial: usize, new_target: usize) -> bool {
        enum TailShape {
            Goto,
            Cond,
            None,
        }
        let shape = match self.block(serial).tail() {
            Some(tail) if tail.opcode == crate::ir::Opcode::Goto => TailShape::Goto,
            Some(tail) if tail.opcode.is_conditional_jump() => TailShape::Cond,
            _ => TailShape::None,
        };

        let (old_target, appended) = match shape {
            TailShape::Goto | TailShape::Cond => {
                let is_goto = matches!(shape, TailShape::Goto);
                let mut old = None;
                if let Some(tail) = self.block_mut(serial).tail_mut() {
                    if is_goto {
                        old = tail.left.as_block();
                        tail.left = Operand::block(new_target);
                    } else {
                        old = tail.dest.as_block();
                        tail.dest = Operand::block(new_target);
                    }
                }
                (old, false)
            }
            TailShape::None => {
                let block = self.block_mut(serial);
                block.push(Insn::goto(new_target));
                block.flags |= BlockFlags::GOTO;
                if block.kind == BlockKind::Fallthrough {
                    block.kind = BlockKind::OneWay;
                }
                (Some(serial + 1), true)
            }
        };

        self.add_or_replace_edge(serial, new_target, old_target);
        self.block_mut(serial).mark_lists_dirty();
        appended
    }

    /// Inserts a one-way trampoline block at serial `at` that jumps to
    /// `target` (a pre-insertion serial), and returns its serial.
    ///
    /// The block carries a fictitious address and the `GOTO` flag. The edge
    /// `at -> target` is wired; edges into the trampoline are the caller's
    /// business.
    pub fn insert_goto_block(&mut self, at: usize, target: usize) -> usize {
        let target = if target >= at { target + 1 } else { target };
        let ea = self.alloc_fict_ea(self.block(at.saturating_sub(1)).end);

        let block = self.insert_block(at);
        block.kind = BlockKind::OneWay;
        block.flags |= BlockFlags::GOTO;
        block.start = ea;
        block.end = ea;
        block.push(Insn::goto(target));

        self.add_edge(at, target);
        at
    }

    /// Inserts a two-way trampoline block at serial `at` ending in the given
    /// conditional jump, and returns its serial.
    ///
    /// `true_target` and `false_target` are pre-insertion serials. The jump's
    /// destination operand is pointed at `true_target`; successors are wired
    /// in the order `[false_target, true_target]` as required for two-way
    /// blocks.
    pub fn insert_cond_block(
        &mut self,
        at: usize,
        mut jump: Insn,
        true_target: usize,
        false_target: usize,
    ) -> usize {
        debug_assert!(jump.opcode.is_conditional_jump());
        let true_target = if true_target >= at { true_target + 1 } else { true_target };
        let false_target = if false_target >= at { false_target + 1 } else { false_target };
        let ea = self.alloc_fict_ea(self.block(at.saturating_sub(1)).end);

        jump.dest = Operand::block(true_target);
        let block = self.insert_block(at);
        block.kind = BlockKind::TwoWay;
        block.start = ea;
        block.end = ea;
        block.push(jump);

        self.add_edge(at, false_target);
        self.add_edge(at, true_target);
        at
    }
}

/// Returns the fallthrough successor of a two-way block, i.e. the successor
/// that is not the conditional-jump target.
#[must_use]
pub fn fallthrough_succ(block: &Block) -> Option<usize> {
    if block.kind != BlockKind::TwoWay {
        return None;
    }
    let taken = block.tail().and_then(Insn::jump_target)?;
    block.succs.iter().copied().find(|&s| s != taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Opcode;

    fn linear(n: usize) -> Function {
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        for _ in 1..n - 1 {
            func.add_block(BlockKind::Fallthrough);
        }
        func.add_block(BlockKind::Exit);
        for i in 0..n - 1 {
            func.add_edge(i, i + 1);
        }
        func
    }

    #[test]
    fn replace_edge_is_positional() {
        let mut func = linear(6);
        // Turn block 2 into a two-way: [fallthrough 3, taken 4].
        func.block_mut(2).kind = BlockKind::TwoWay;
        func.block_mut(2).push(Insn::with_operands(
            Opcode::Jz,
            Operand::stack(0x10, 4),
            Operand::imm(1, 4),
            Operand::block(4),
        ));
        func.add_edge(2, 4);

        func.add_or_replace_edge(2, 1, Some(4));
        assert_eq!(func.block(2).succs, vec![3, 1]);
        assert_eq!(func.block(4).preds, vec![3]);
        assert_eq!(func.block(1).preds, vec![0, 2]);
    }

    #[test]
    fn absent_old_edge_appends() {
        let mut func = linear(5);
        func.add_or_replace_edge(1, 3, Some(9));
        assert_eq!(func.block(1).succs, vec![2, 3]);
        assert!(func.block(3).preds.contains(&1));
    }

    #[test]
    fn change_jump_target_synthesizes_goto_for_fallthrough() {
        let mut func = linear(5);
        let appended = func.change_jump_target(1, 3);
        assert!(appended);
        assert!(func.block(1).ends_in_goto());
        assert_eq!(func.block(1).kind, BlockKind::OneWay);
        assert_eq!(func.block(1).succs, vec![3]);
        assert!(!func.block(2).preds.contains(&1));
    }

    #[test]
    fn change_jump_target_rewrites_existing_goto() {
        let mut func = linear(5);
        func.block_mut(1).kind = BlockKind::OneWay;
        func.block_mut(1).push(Insn::goto(2));
        let appended = func.change_jump_target(1, 3);
        assert!(!appended);
        assert_eq!(func.block(1).tail().unwrap().jump_target(), Some(3));
        assert_eq!(func.block(1).succs, vec![3]);
    }

    #[test]
    fn goto_trampoline_wires_its_edge_and_shifts_targets() {
        let mut func = linear(5);
        // Insert at 2 targeting old serial 3; the target shifts to 4.
        let serial = func.insert_goto_block(2, 3);
        assert_eq!(serial, 2);
        assert!(func.block(2).flags.contains(BlockFlags::GOTO));
        assert_eq!(func.block(2).tail().unwrap().jump_target(), Some(4));
        assert!(func.block(4).preds.contains(&2));
        assert!(func.block(2).start >= 0xFF00_0000_0000_0000);
    }

    #[test]
    fn cond_trampoline_orders_false_then_true() {
        let mut func = linear(5);
        let jz = Insn::with_operands(
            Opcode::Jz,
            Operand::stack(0x10, 4),
            Operand::imm(0x1122_3344, 4),
            Operand::None,
        );
        // True side targets old serial 3 (shifts to 4), false side serial 1.
        let serial = func.insert_cond_block(2, jz, 3, 1);
        assert_eq!(func.block(serial).kind, BlockKind::TwoWay);
        assert_eq!(func.block(serial).succs, vec![1, 4]);
        assert_eq!(func.block(serial).tail().unwrap().jump_target(), Some(4));
        assert_eq!(fallthrough_succ(func.block(serial)), Some(1));
        assert_eq!(fallthrough_succ(func.block(1)), None);
    }

    #[test]
    fn clear_edges_empties_both_sides() {
        let mut func = linear(4);
        func.clear_edges(1);
        assert!(func.block(1).succs.is_empty());
        assert!(func.block(2).preds.is_empty());
        assert!(func.verify().is_err()); // one-way block with no successor
    }
}
