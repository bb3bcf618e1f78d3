//! The session driver.

use std::collections::HashSet;

use crate::{
    deobfuscation::{
        passes::{simplify_branches, zero_dead_reads, Unflattener},
        SessionConfig, ValueRangeOracle,
    },
    ir::{Function, SegmentMap},
    log::*,
    Result,
};

/// What the host should do after a [`Session::run`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The passes ran. The host should apply its own normalization to the
    /// mutated graph and invoke the session again for the same function.
    RunAgain,
    /// The function was already processed in the previous invocation;
    /// nothing was done and the host can move on.
    Done,
}

/// Drives the deobfuscation passes over the functions of one compilation
/// unit.
///
/// The engine deliberately does not iterate to a fixed point on its own:
/// after a pass has rewritten edges, the host's normalization (dead block
/// removal, jump threading) exposes the next layer of dispatch hops. The
/// session therefore implements a two-step protocol keyed on the function's
/// entry address - the first invocation runs every enabled pass and asks to
/// be re-entered, the second observes the mark and yields. Hosts that loop
/// until [`Disposition::Done`] get exactly one full pass per normalization
/// round.
#[derive(Debug, Default)]
pub struct Session {
    config: SessionConfig,
    processed: HashSet<u64>,
}

impl Session {
    /// Creates a session with the given configuration.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            processed: HashSet::new(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs the enabled passes over `func`, or yields if the previous
    /// invocation already did.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice - pass-internal conditions are
    /// logged, not propagated - but wired through [`Result`] so the host's
    /// error plumbing does not need to change if a fatal variant appears.
    pub fn run(
        &mut self,
        func: &mut Function,
        oracle: &dyn ValueRangeOracle,
        segments: &SegmentMap,
    ) -> Result<Disposition> {
        let entry = func.entry_ea();
        if self.processed.remove(&entry) {
            debug!("function already processed, yielding"; "entry" => format!("0x{entry:X}"));
            return Ok(Disposition::Done);
        }

        if self.config.enable_dead_zero {
            zero_dead_reads(func, segments);
        }
        if self.config.enable_branch_simplify {
            simplify_branches(func);
        }
        if self.config.enable_deflatten {
            Unflattener::new(func, self.config.dispatcher_override)
                .deflatten(self.config.strategy, oracle);
        }

        self.processed.insert(entry);
        Ok(Disposition::RunAgain)
    }
}
