//! Value-range oracle consumption.
//!
//! The engine does not perform value-range analysis itself; it consumes the
//! per-block equality facts of an external analysis. Hosts with a structured
//! interface implement [`ValueRangeOracle`] directly; hosts that only expose
//! the legacy textual listing go through [`TextFacts`].

use crate::log::*;

/// One equality fact: at the entry of `block`, the location named `name` is
/// known to hold `value`.
///
/// Names are kept verbatim, including any literal-qualifier suffix
/// (`%0x10.4`); the state-table builder strips the qualifier when it joins
/// facts against storage identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRangeFact {
    /// Serial of the block the fact holds for.
    pub block: usize,
    /// Name of the storage location, as rendered by the producing analysis.
    pub name: String,
    /// The constant value, zero-extended to 64 bits.
    pub value: u64,
}

/// Source of per-block value-range equality facts.
pub trait ValueRangeOracle {
    /// All known facts for the function under analysis.
    fn facts(&self) -> &[ValueRangeFact];
}

/// [`ValueRangeOracle`] backed by the legacy textual value-range listing.
///
/// The listing interleaves block headers with per-line annotations:
///
/// ```text
/// 2. 2 ; 2WAY-BLOCK 2 INBOUNDS: 1 7 OUTBOUNDS: 3 4 [START=401040 END=401058]
/// VALRANGES: %0x10.4:==11223344, rax.8:==55667788
/// ```
///
/// A header line names the current block; every following `VALRANGES:` line
/// contributes `name:==hexvalue` facts to it until the next header. All other
/// lines, and anything on a header beyond the block id, are ignored.
/// Malformed entries are skipped with a warning rather than failing the
/// parse; a partial fact set degrades recall, not correctness.
#[derive(Debug, Clone, Default)]
pub struct TextFacts {
    facts: Vec<ValueRangeFact>,
}

impl TextFacts {
    /// Parses a textual value-range listing.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut facts = Vec::new();
        let mut current_block = None;

        for line in text.lines() {
            if let Some((_, rest)) = line.split_once("BLOCK ") {
                match rest.split_whitespace().next().map(str::parse::<usize>) {
                    Some(Ok(id)) => current_block = Some(id),
                    _ => {
                        warn!("skipping malformed block header"; "line" => line);
                        current_block = None;
                    }
                }
                continue;
            }

            let Some((_, values)) = line.split_once("VALRANGES: ") else {
                continue;
            };
            let Some(block) = current_block else {
                warn!("value ranges before any block header"; "line" => line);
                continue;
            };

            for entry in values.split(", ") {
                let Some((name, value)) = entry.split_once(":==") else {
                    continue; // range facts other than equalities
                };
                let raw = value.trim().trim_start_matches("0x");
                match u64::from_str_radix(raw, 16) {
                    Ok(value) => facts.push(ValueRangeFact {
                        block,
                        name: name.trim().to_owned(),
                        value,
                    }),
                    Err(_) => {
                        warn!("skipping malformed value-range entry"; "entry" => entry);
                    }
                }
            }
        }

        Self { facts }
    }
}

impl ValueRangeOracle for TextFacts {
    fn facts(&self) -> &[ValueRangeFact] {
        &self.facts
    }
}
