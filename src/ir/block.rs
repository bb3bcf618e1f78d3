//! Basic blocks.

use bitflags::bitflags;

use crate::ir::Insn;

/// Kind of a basic block, constraining its successor count.
///
/// The successor-set cardinality must match the kind: two-way blocks have
/// exactly two successors ordered `[fallthrough-or-false, conditional]`,
/// one-way and fallthrough blocks exactly one, the exit sentinel none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Entry sentinel (serial 0).
    Entry,
    /// Falls through to the next serial without a terminating jump.
    Fallthrough,
    /// Ends in an unconditional transfer; exactly one successor.
    OneWay,
    /// Ends in a conditional jump; exactly two successors, the conditional
    /// target last.
    TwoWay,
    /// Multi-way dispatch; any number of successors.
    NWay,
    /// Exit sentinel (last serial).
    Exit,
}

bitflags! {
    /// Per-block status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u32 {
        /// Block ends in a synthesized unconditional jump.
        const GOTO = 0b0001;
        /// Instruction lists of dependent analyses are out of date.
        const LISTS_DIRTY = 0b0010;
    }
}

/// A basic block: ordered instruction list plus explicit edge sets.
///
/// Predecessor and successor sets hold block serials and are kept mutually
/// consistent by the mutation primitives on [`Function`](crate::ir::Function);
/// they must never be edited directly.
#[derive(Debug, Clone)]
pub struct Block {
    /// Stable serial number of this block within its function.
    pub serial: usize,
    /// Block kind; must agree with the successor count.
    pub kind: BlockKind,
    /// Status flags.
    pub flags: BlockFlags,
    /// Start of the (possibly fictitious) address range.
    pub start: u64,
    /// End of the (possibly fictitious) address range.
    pub end: u64,
    /// Ordered instruction list.
    pub insns: Vec<Insn>,
    /// Serials of predecessor blocks.
    pub preds: Vec<usize>,
    /// Serials of successor blocks, in successor order.
    pub succs: Vec<usize>,
}

impl Block {
    /// Creates an empty block with the given serial and kind.
    #[must_use]
    pub fn new(serial: usize, kind: BlockKind) -> Self {
        Self {
            serial,
            kind,
            flags: BlockFlags::empty(),
            start: 0,
            end: 0,
            insns: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Number of predecessors.
    #[must_use]
    pub fn npred(&self) -> usize {
        self.preds.len()
    }

    /// Number of successors.
    #[must_use]
    pub fn nsucc(&self) -> usize {
        self.succs.len()
    }

    /// Last instruction of the block, if any.
    #[must_use]
    pub fn tail(&self) -> Option<&Insn> {
        self.insns.last()
    }

    /// Mutable access to the last instruction.
    pub fn tail_mut(&mut self) -> Option<&mut Insn> {
        self.insns.last_mut()
    }

    /// Removes and returns the last instruction.
    pub fn remove_tail(&mut self) -> Option<Insn> {
        self.insns.pop()
    }

    /// Appends an instruction.
    pub fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    /// True if the block terminates in an unconditional `goto`.
    #[must_use]
    pub fn ends_in_goto(&self) -> bool {
        matches!(self.tail(), Some(insn) if insn.opcode == crate::ir::Opcode::Goto)
    }

    /// Marks the block's derived instruction lists as out of date.
    pub fn mark_lists_dirty(&mut self) {
        self.flags |= BlockFlags::LISTS_DIRTY;
    }
}
