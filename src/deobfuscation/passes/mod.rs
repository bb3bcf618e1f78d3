//! The individual deobfuscation passes.

mod branch_simplify;
mod dead_zero;

pub mod unflatten;

pub use branch_simplify::simplify_branches;
pub use dead_zero::zero_dead_reads;
pub use unflatten::Unflattener;
