// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # unflat
//!
//! A control-flow deobfuscation engine operating on a microcode-style
//! intermediate representation of compiled code. `unflat` reverses two
//! transforms commonly injected by compiler-level obfuscators:
//!
//! - **Control-flow flattening** - all original branching is funneled through
//!   a single dispatcher block that selects the next block at runtime via a
//!   hidden integer state variable. The engine locates the dispatcher,
//!   recovers the state variable, builds a state-value-to-block table from
//!   value-range facts, and rewrites edges to bypass the dispatcher.
//! - **Opaque-predicate branching** - conditional branches whose outcome is
//!   provably constant for all reachable inputs. The engine folds these to
//!   unconditional control flow using an SMT solver.
//!
//! The IR itself (instruction decoding, semantics) is supplied by the host;
//! `unflat` only mutates the graph. Value-range analysis is likewise consumed
//! as an oracle, either through the [`deobfuscation::ValueRangeOracle`] trait
//! or via the legacy textual dump format.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use unflat::{
//!     deobfuscation::{Disposition, Session, SessionConfig, TextFacts},
//!     ir::{Function, SegmentMap},
//! };
//!
//! # fn load_function() -> Function { unimplemented!() }
//! # fn load_valranges_dump() -> String { unimplemented!() }
//! let mut func = load_function();
//! let facts = TextFacts::parse(&load_valranges_dump());
//! let segments = SegmentMap::new();
//!
//! let mut session = Session::new(SessionConfig::default());
//! loop {
//!     match session.run(&mut func, &facts, &segments)? {
//!         Disposition::RunAgain => continue, // host normalizes, then re-enters
//!         Disposition::Done => break,
//!     }
//! }
//! # Ok::<(), unflat::Error>(())
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ir`] | Block arena, instructions, operands, CFG mutation primitives |
//! | [`analysis`] | Symbolic evaluation and the scoped constraint solver |
//! | [`deobfuscation`] | The passes: branch simplification, dead-value elimination, deflattening |
//!
//! The engine is single-threaded and run-to-completion: one function's IR is
//! processed start to finish with no internal suspension points, and the IR
//! is owned exclusively by the engine for the duration of a pass.

pub mod analysis;
pub mod deobfuscation;
pub mod ir;

mod error;

pub use error::{Error, Result};

/// Logging facade for the crate.
///
/// Re-exports the `slog-scope` macros used at call sites and provides a
/// terminal drain builder for hosts and tests that do not install their own
/// global logger. All engine output flows through here; there is no other
/// user-facing error surface.
pub mod log {
    pub use slog_scope::{crit, debug, error, info, trace, warn};

    /// Builds a stderr terminal logger at the given verbosity.
    ///
    /// `debug_level` maps 0 → warnings, 1 → info, 2 → debug, 3+ → trace.
    /// Install the result with [`slog_scope::set_global_logger`]; keep the
    /// returned guard alive for the duration of the run.
    #[must_use]
    pub fn terminal_logger(debug_level: usize) -> slog::Logger {
        use sloggers::Build;

        let severity = match debug_level {
            0 => sloggers::types::Severity::Warning,
            1 => sloggers::types::Severity::Info,
            2 => sloggers::types::Severity::Debug,
            _ => sloggers::types::Severity::Trace,
        };

        sloggers::terminal::TerminalLoggerBuilder::new()
            .destination(sloggers::terminal::Destination::Stderr)
            .level(severity)
            .overflow_strategy(sloggers::types::OverflowStrategy::Block)
            .format(sloggers::types::Format::Compact)
            .build()
            .expect("terminal logger construction cannot fail")
    }
}
