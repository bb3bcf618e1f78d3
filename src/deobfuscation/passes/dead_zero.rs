//! Folding reads of zero-initialized globals.
//!
//! Obfuscators like to source "unknown" values for opaque predicates from
//! globals that live in a zero-initialized segment and are never written
//! before the code under analysis runs. Rewriting such reads to literal
//! zeros turns those predicates into constant expressions the branch
//! simplifier can then fold.

use crate::{
    ir::{Function, Insn, Operand, SegmentMap},
    log::*,
};

/// Rewrites every global read from a zero-initialized segment to a zero
/// immediate of the same width. Returns the number of rewritten operands.
///
/// Only source positions are rewritten; a global in the destination slot is
/// a store and keeps its meaning.
pub fn zero_dead_reads(func: &mut Function, segments: &SegmentMap) -> usize {
    let mut rewrites = 0;
    for serial in 0..func.qty() {
        for insn in &mut func.block_mut(serial).insns {
            rewrites += zero_insn_sources(insn, segments);
        }
    }
    if rewrites > 0 {
        debug!("folded zero-initialized global reads"; "count" => rewrites);
    }
    rewrites
}

fn zero_insn_sources(insn: &mut Insn, segments: &SegmentMap) -> usize {
    let mut rewrites = zero_operand(&mut insn.left, segments) + zero_operand(&mut insn.right, segments);
    // The destination slot itself is never a read, but a nested instruction
    // stored there still has source operands of its own.
    if let Operand::Insn(sub) = &mut insn.dest {
        rewrites += zero_insn_sources(sub, segments);
    }
    rewrites
}

fn zero_operand(operand: &mut Operand, segments: &SegmentMap) -> usize {
    match operand {
        Operand::Global { address, width } if segments.is_zero_init(*address) => {
            trace!("zeroing global read"; "address" => format!("0x{address:X}"));
            *operand = Operand::imm(0, *width);
            1
        }
        Operand::Insn(sub) => zero_insn_sources(sub, segments),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockKind, Opcode};

    fn bss_map() -> SegmentMap {
        let mut map = SegmentMap::new();
        map.add(".bss", 0x60_2000, 0x60_3000, true);
        map.add(".data", 0x60_1000, 0x60_2000, false);
        map
    }

    #[test]
    fn rewrites_reads_but_not_stores() {
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        let b = func.add_block(BlockKind::Fallthrough);
        func.add_block(BlockKind::Exit);

        // mov @bss, rax  (read)  /  mov rax, @bss (store)
        func.block_mut(b).push(Insn::with_operands(
            Opcode::Mov,
            Operand::global(0x60_2010, 4),
            Operand::None,
            Operand::reg(0, 4),
        ));
        func.block_mut(b).push(Insn::with_operands(
            Opcode::Mov,
            Operand::reg(0, 4),
            Operand::None,
            Operand::global(0x60_2010, 4),
        ));

        assert_eq!(zero_dead_reads(&mut func, &bss_map()), 1);
        assert_eq!(func.block(b).insns[0].left, Operand::imm(0, 4));
        assert_eq!(func.block(b).insns[1].dest, Operand::global(0x60_2010, 4));
    }

    #[test]
    fn reaches_nested_expressions_and_skips_data() {
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        let b = func.add_block(BlockKind::Fallthrough);
        func.add_block(BlockKind::Exit);

        let add = Insn::with_operands(
            Opcode::Add,
            Operand::global(0x60_2020, 4),
            Operand::global(0x60_1020, 4),
            Operand::reg(1, 4),
        );
        func.block_mut(b).push(Insn::with_operands(
            Opcode::Xdu,
            Operand::insn(add),
            Operand::None,
            Operand::reg(1, 8),
        ));

        assert_eq!(zero_dead_reads(&mut func, &bss_map()), 1);
        let Operand::Insn(sub) = &func.block(b).insns[0].left else {
            panic!("nested operand lost");
        };
        assert_eq!(sub.left, Operand::imm(0, 4));
        assert_eq!(sub.right, Operand::global(0x60_1020, 4));
    }
}
