//! The function-level block arena.

use crate::{
    ir::{Block, BlockKind, Insn, Operand},
    Error, Result,
};

/// A function's IR: an ordered arena of blocks indexed by stable serial.
///
/// Serial 0 is the entry sentinel and the last serial the exit sentinel; the
/// deobfuscation passes only ever analyze the blocks in between. The arena is
/// owned by the host and mutated in place - there is no copy-on-write.
///
/// # Panics
///
/// Accessing a serial outside the arena is a programmer error, not a property
/// of obfuscated input, and panics rather than returning an error. All
/// callers are expected to hold valid serials.
#[derive(Debug, Clone)]
pub struct Function {
    entry_ea: u64,
    blocks: Vec<Block>,
    next_fict_ea: u64,
    chains_dirty: bool,
}

impl Function {
    /// Base of the fictitious address space used for synthesized blocks.
    const FICT_EA_BASE: u64 = 0xFF00_0000_0000_0000;

    /// Creates an empty function identified by its entry address.
    #[must_use]
    pub fn new(entry_ea: u64) -> Self {
        Self {
            entry_ea,
            blocks: Vec::new(),
            next_fict_ea: Self::FICT_EA_BASE,
            chains_dirty: false,
        }
    }

    /// Entry address; serves as the function's identity across invocations.
    #[must_use]
    pub fn entry_ea(&self) -> u64 {
        self.entry_ea
    }

    /// Number of blocks, sentinels included.
    #[must_use]
    pub fn qty(&self) -> usize {
        self.blocks.len()
    }

    /// Serials of the non-sentinel blocks, in ascending order.
    pub fn inner_serials(&self) -> impl Iterator<Item = usize> {
        1..self.qty().saturating_sub(1)
    }

    /// Appends a block of the given kind and returns its serial.
    ///
    /// Blocks are appended in serial order; callers building a function are
    /// responsible for making serial 0 an [`BlockKind::Entry`] block and the
    /// last an [`BlockKind::Exit`] block.
    pub fn add_block(&mut self, kind: BlockKind) -> usize {
        let serial = self.blocks.len();
        self.blocks.push(Block::new(serial, kind));
        serial
    }

    /// Borrows the block with the given serial.
    ///
    /// # Panics
    ///
    /// Panics if `serial` does not name a live block.
    #[must_use]
    pub fn block(&self, serial: usize) -> &Block {
        assert!(serial < self.blocks.len(), "invalid block serial {serial}");
        &self.blocks[serial]
    }

    /// Mutably borrows the block with the given serial.
    ///
    /// # Panics
    ///
    /// Panics if `serial` does not name a live block.
    pub fn block_mut(&mut self, serial: usize) -> &mut Block {
        assert!(serial < self.blocks.len(), "invalid block serial {serial}");
        &mut self.blocks[serial]
    }

    /// All blocks in serial order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Allocates a fresh fictitious address for a synthesized block. The
    /// caller's `hint` is accepted for API symmetry with host allocators, but
    /// addresses are always drawn from a dedicated range that never collides
    /// with real code.
    pub fn alloc_fict_ea(&mut self, _hint: u64) -> u64 {
        let ea = self.next_fict_ea;
        self.next_fict_ea += 4;
        ea
    }

    /// Marks dependent dataflow chains as out of date.
    pub fn mark_chains_dirty(&mut self) {
        self.chains_dirty = true;
    }

    /// True if a mutation has invalidated dependent dataflow chains.
    #[must_use]
    pub fn chains_dirty(&self) -> bool {
        self.chains_dirty
    }

    /// Inserts a fresh, empty block at the given serial and returns it.
    ///
    /// All blocks at `serial` and above are renumbered, and every serial
    /// stored anywhere in the function - predecessor/successor sets and
    /// block-reference operands, nested instructions included - is patched to
    /// keep referring to the same block.
    ///
    /// # Panics
    ///
    /// Panics if `serial` is 0 (before the entry sentinel) or past the end of
    /// the arena.
    pub fn insert_block(&mut self, serial: usize) -> &mut Block {
        assert!(
            serial > 0 && serial <= self.blocks.len(),
            "invalid insertion serial {serial}"
        );

        let shift = |s: usize| if s >= serial { s + 1 } else { s };
        for block in &mut self.blocks {
            block.serial = shift(block.serial);
            for p in &mut block.preds {
                *p = shift(*p);
            }
            for s in &mut block.succs {
                *s = shift(*s);
            }
            for insn in &mut block.insns {
                Self::shift_insn_refs(insn, serial);
            }
        }

        self.blocks
            .insert(serial, Block::new(serial, BlockKind::OneWay));
        &mut self.blocks[serial]
    }

    fn shift_insn_refs(insn: &mut Insn, inserted_at: usize) {
        for op in [&mut insn.left, &mut insn.right, &mut insn.dest] {
            match op {
                Operand::Block(s) if *s >= inserted_at => *s += 1,
                Operand::Insn(sub) => Self::shift_insn_refs(sub, inserted_at),
                _ => {}
            }
        }
    }

    /// Verifies the structural invariants of the graph.
    ///
    /// Checks that every block-reference operand names a live serial, that
    /// predecessor and successor sets are mutually consistent (A is in
    /// succ(B) iff B is in pred(A)), and that each block's successor count
    /// matches its kind.
    ///
    /// This is a post-mutation diagnostic: callers log failures and continue,
    /// since partial deobfuscation is strictly better than none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] describing the first violation
    /// found.
    pub fn verify(&self) -> Result<()> {
        let qty = self.qty();
        for block in &self.blocks {
            for insn in &block.insns {
                Self::verify_insn_refs(insn, block.serial, qty)?;
            }

            for &succ in &block.succs {
                if succ >= qty {
                    return Err(Error::InvariantViolation(format!(
                        "block {} lists dead successor {succ}",
                        block.serial
                    )));
                }
                if !self.blocks[succ].preds.contains(&block.serial) {
                    return Err(Error::InvariantViolation(format!(
                        "edge {} -> {succ} missing from predecessor set",
                        block.serial
                    )));
                }
            }
            for &pred in &block.preds {
                if pred >= qty {
                    return Err(Error::InvariantViolation(format!(
                        "block {} lists dead predecessor {pred}",
                        block.serial
                    )));
                }
                if !self.blocks[pred].succs.contains(&block.serial) {
                    return Err(Error::InvariantViolation(format!(
                        "edge {pred} -> {} missing from successor set",
                        block.serial
                    )));
                }
            }

            let nsucc = block.nsucc();
            let ok = match block.kind {
                BlockKind::Exit => nsucc == 0,
                BlockKind::Entry => nsucc <= 1,
                BlockKind::Fallthrough | BlockKind::OneWay => nsucc == 1,
                BlockKind::TwoWay => nsucc == 2,
                BlockKind::NWay => nsucc >= 1,
            };
            if !ok {
                return Err(Error::InvariantViolation(format!(
                    "block {} has {} successors, inconsistent with {:?}",
                    block.serial, nsucc, block.kind
                )));
            }
        }
        Ok(())
    }

    fn verify_insn_refs(insn: &Insn, serial: usize, qty: usize) -> Result<()> {
        for op in [&insn.left, &insn.right, &insn.dest] {
            match op {
                Operand::Block(s) if *s >= qty => {
                    return Err(Error::InvariantViolation(format!(
                        "block {serial}: instruction references dead serial {s}"
                    )));
                }
                Operand::Insn(sub) => Self::verify_insn_refs(sub, serial, qty)?,
                _ => {}
            }
        }
        Ok(())
    }
}
