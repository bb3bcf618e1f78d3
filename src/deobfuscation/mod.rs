//! The deobfuscation passes and their driver.
//!
//! Three passes are available, all operating in place on a
//! [`Function`](crate::ir::Function):
//!
//! - **dead-value elimination**: reads of zero-initialized globals fold to
//!   literal zeros, exposing constant conditions to the later passes;
//! - **branch simplification**: opaque conditional branches are proven
//!   one-sided with an SMT solver and folded to unconditional flow;
//! - **deflattening**: the dispatcher/state-variable machinery of
//!   control-flow flattening is analyzed, and state assignment blocks are
//!   redirected straight to their successors.
//!
//! Hosts drive the passes through a [`Session`], which owns the per-function
//! bookkeeping and the configuration. Chained dispatch hops are not chased to
//! a fixed point internally; the host re-invokes the session after its own
//! normalization, until [`Disposition::Done`].

pub mod passes;

mod config;
mod oracle;
mod session;

pub use config::{SessionConfig, Strategy};
pub use oracle::{TextFacts, ValueRangeFact, ValueRangeOracle};
pub use session::{Disposition, Session};
