//! Microcode-style intermediate representation.
//!
//! This module provides the block arena the deobfuscation passes operate on:
//! a [`Function`] owning an ordered vector of [`Block`]s indexed by stable
//! serial number, each holding an ordered list of [`Insn`]s over typed
//! [`Operand`]s. Serial 0 and the last serial are sentinel entry/exit blocks.
//!
//! The IR is supplied and owned by the host; the engine mutates it in place
//! through the primitives in [`edit`](self), which enforce the
//! predecessor/successor consistency invariant on every change - edge sets
//! are never hand-edited ad hoc.

mod block;
mod edit;
mod function;
mod instruction;
mod operand;
mod segment;

pub use block::{Block, BlockFlags, BlockKind};
pub use edit::fallthrough_succ;
pub use function::Function;
pub use instruction::{Insn, Opcode};
pub use operand::{Operand, Storage};
pub use segment::{Segment, SegmentMap};
