//! Control-flow deflattening.
//!
//! Flattening rewrites a function so that every original block ends by
//! storing a constant into a hidden state variable and jumping back to a
//! central dispatcher, which compares the state against its table of
//! constants to pick the next block. Deflattening inverts this:
//!
//! 1. **Dispatcher analysis** - the dispatcher is the block every flattened
//!    block returns to, so it has by far the highest in-degree; its terminal
//!    comparison jump names the state carrier.
//! 2. **State table** - the value-range oracle proves, per block, which
//!    carrier value routes there. Entropy filtering keeps only plausible
//!    PRNG-drawn state constants.
//! 3. **Assignment scan** - every `mov` of an entropic constant into a
//!    register or stack slot is a candidate state update.
//! 4. **Matching** - assignments are joined against the table under one of
//!    four strategies, and each matched block is redirected to jump straight
//!    to its successor, bypassing the dispatcher.
//!
//! One invocation resolves one dispatch hop per assignment; chains are
//! resolved by the host re-running the pass after its own cleanup.

mod dispatcher;
mod states;

pub use states::{has_entropy, scan_assignments, StateAssignment, StateEntry, StateTable};

use crate::{
    deobfuscation::{Strategy, ValueRangeOracle},
    ir::{Function, Storage},
    log::*,
};

/// The four matching strategies, reduced to their two degrees of freedom.
#[derive(Debug, Clone)]
struct MatchRule {
    /// Restrict matching to assignments writing this carrier, if set.
    carrier: Option<Storage>,
    /// Require the state-table entry name to equal the assignment's storage.
    name_qualified: bool,
}

/// Deflattening engine for a single function.
///
/// Borrows the function for its lifetime; scratch data (table, assignments)
/// is rebuilt on every [`deflatten`](Self::deflatten) call, so re-running
/// with a different strategy needs no reset.
pub struct Unflattener<'f> {
    func: &'f mut Function,
    dispatcher: Option<usize>,
    carrier: Option<Storage>,
}

impl<'f> Unflattener<'f> {
    /// Creates an engine over `func`.
    ///
    /// `dispatcher` pins the dispatcher serial; `None` means detect it by
    /// in-degree.
    pub fn new(func: &'f mut Function, dispatcher: Option<usize>) -> Self {
        Self {
            func,
            dispatcher,
            carrier: None,
        }
    }

    /// Runs deflattening under the given strategy and returns the number of
    /// redirected blocks.
    ///
    /// Zero is a normal outcome: no dispatcher shape, no carrier, an empty
    /// state table, or no assignment surviving the match rule all mean the
    /// function is left untouched.
    pub fn deflatten(&mut self, strategy: Strategy, oracle: &dyn ValueRangeOracle) -> usize {
        let dispatcher = match self.dispatcher.or_else(|| dispatcher::detect(self.func)) {
            Some(serial) => serial,
            None => return 0,
        };
        self.dispatcher = Some(dispatcher);

        if self.carrier.is_none() {
            self.carrier = dispatcher::extract_carrier(self.func, dispatcher);
        }
        let Some(carrier) = self.carrier else {
            debug!("no dispatch carrier, skipping deflattening"; "block" => dispatcher);
            return 0;
        };

        let table = StateTable::from_facts(oracle.facts());
        if table.is_empty() {
            debug!("no entropic state facts, skipping deflattening");
            return 0;
        }
        let assignments = scan_assignments(self.func);

        let Some(rule) = self.match_rule(strategy, carrier) else {
            return 0;
        };
        let redirects = self.apply(&table, &assignments, &rule);
        info!(
            "deflattening finished";
            "strategy" => strategy.level(),
            "dispatcher" => dispatcher,
            "redirects" => redirects
        );
        redirects
    }

    fn match_rule(&self, strategy: Strategy, dispatcher_carrier: Storage) -> Option<MatchRule> {
        let rule = match strategy {
            Strategy::CarrierMatched => MatchRule {
                carrier: Some(dispatcher_carrier),
                name_qualified: false,
            },
            Strategy::Unrestricted => MatchRule {
                carrier: None,
                name_qualified: false,
            },
            Strategy::BusiestCarrier => MatchRule {
                carrier: Some(dispatcher::busiest_carrier(self.func)?),
                name_qualified: false,
            },
            Strategy::NameQualified => MatchRule {
                carrier: None,
                name_qualified: true,
            },
        };
        Some(rule)
    }

    fn apply(
        &mut self,
        table: &StateTable,
        assignments: &[StateAssignment],
        rule: &MatchRule,
    ) -> usize {
        let mut redirects = 0;
        for assignment in assignments {
            if let Some(carrier) = &rule.carrier {
                if assignment.storage != *carrier {
                    continue;
                }
            }

            let name = assignment.storage.name();
            let qualifier = rule.name_qualified.then_some(name.as_str());
            let Some(entry) = table.lookup(assignment.value, qualifier) else {
                continue;
            };
            // Qualification may only narrow the match set: a value that is
            // ambiguous on its own never redirects, qualified or not.
            if rule.name_qualified && table.lookup(assignment.value, None).is_none() {
                continue;
            }

            self.func.change_jump_target(assignment.block, entry.block);
            redirects += 1;
            info!(
                "redirected state assignment";
                "block" => assignment.block,
                "target" => entry.block,
                "state" => format!("0x{:X}", assignment.value)
            );
        }
        redirects
    }
}
