//! State table and assignment scanning.
//!
//! Deflattening joins two sets of observations: where the value-range oracle
//! proved the dispatch carrier to hold a given constant (the state table),
//! and where the function assigns such a constant to a storage location (the
//! state assignments). The join key is the constant itself, filtered through
//! the entropy predicate so small counters and flags never masquerade as
//! dispatch states.

use crate::{
    deobfuscation::ValueRangeFact,
    ir::{Function, Opcode, Storage},
    log::*,
};

/// Byte-spread test for plausible 32-bit dispatch-state constants.
///
/// Accepts a value only if all four low bytes are non-zero. Obfuscators draw
/// state constants from a PRNG, so each byte is non-zero with high
/// probability; loop counters and flags fail the test almost surely.
#[must_use]
pub fn has_entropy(value: u64) -> bool {
    (0..4).all(|i| (value >> (i * 8)) & 0xFF != 0)
}

/// A state-table entry: the oracle proved that on entry to `block`, the
/// location named `name` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    /// Serial of the block reached when the dispatch state equals `value`.
    pub block: usize,
    /// Name of the proven location, qualifier stripped.
    pub name: String,
    /// The state constant.
    pub value: u64,
}

/// The state-value-to-block table recovered from oracle facts.
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    entries: Vec<StateEntry>,
}

impl StateTable {
    /// Builds the table from oracle facts.
    ///
    /// Facts failing the entropy predicate are dropped; surviving names lose
    /// their literal-qualifier suffix (everything from the first `.`), so
    /// `%0x10.4` joins against the storage identity `%0x10`.
    #[must_use]
    pub fn from_facts(facts: &[ValueRangeFact]) -> Self {
        let entries = facts
            .iter()
            .filter(|fact| has_entropy(fact.value))
            .map(|fact| {
                let name = match fact.name.split_once('.') {
                    Some((base, _)) => base.to_owned(),
                    None => fact.name.clone(),
                };
                StateEntry {
                    block: fact.block,
                    name,
                    value: fact.value,
                }
            })
            .collect::<Vec<_>>();
        debug!("state table built"; "entries" => entries.len());
        Self { entries }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no fact survived the entropy filter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the entry for a state value, optionally requiring the entry
    /// name to match as well.
    ///
    /// The match must be unique: zero candidates is a miss, and more than one
    /// means the value cannot be attributed to a single block, which is also
    /// treated as a miss rather than picking one arbitrarily.
    #[must_use]
    pub fn lookup(&self, value: u64, name: Option<&str>) -> Option<&StateEntry> {
        let mut matches = self
            .entries
            .iter()
            .filter(|e| e.value == value && name.is_none_or(|n| e.name == n));

        let first = matches.next()?;
        if matches.next().is_some() {
            debug!("ambiguous state value, skipping"; "value" => format!("0x{value:X}"));
            return None;
        }
        Some(first)
    }
}

/// A constant store that is a candidate state-variable update:
/// `mov #value, storage` where the constant passes the entropy test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateAssignment {
    /// Serial of the block containing the store.
    pub block: usize,
    /// The written register or stack slot.
    pub storage: Storage,
    /// The stored constant.
    pub value: u64,
}

/// Scans all non-sentinel blocks for candidate state assignments.
#[must_use]
pub fn scan_assignments(func: &Function) -> Vec<StateAssignment> {
    let mut assignments = Vec::new();
    for serial in func.inner_serials() {
        for insn in &func.block(serial).insns {
            if insn.opcode != Opcode::Mov {
                continue;
            }
            let (Some(value), Some(storage)) = (insn.left.as_imm(), insn.dest.storage()) else {
                continue;
            };
            if has_entropy(value) {
                assignments.push(StateAssignment {
                    block: serial,
                    storage,
                    value,
                });
            }
        }
    }
    debug!("state assignments scanned"; "count" => assignments.len());
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockKind, Insn, Operand};

    #[test]
    fn entropy_requires_all_four_low_bytes() {
        assert!(has_entropy(0x1122_3344));
        assert!(has_entropy(0xDEAD_BEEF));
        assert!(!has_entropy(0x5)); // loop counter shapes
        assert!(!has_entropy(0x1100_3344)); // one zero byte
        assert!(!has_entropy(0));
        // High bytes are not consulted.
        assert!(has_entropy(0xFF00_0000_1122_3344));
    }

    #[test]
    fn table_filters_and_strips_qualifiers() {
        let facts = vec![
            ValueRangeFact {
                block: 3,
                name: "%0x10.4".into(),
                value: 0x1122_3344,
            },
            ValueRangeFact {
                block: 4,
                name: "rax.8".into(),
                value: 0x5, // fails entropy
            },
        ];
        let table = StateTable::from_facts(&facts);
        assert_eq!(table.len(), 1);
        let entry = table.lookup(0x1122_3344, None).unwrap();
        assert_eq!(entry.name, "%0x10");
        assert_eq!(entry.block, 3);
        assert!(table.lookup(0x5, None).is_none());
    }

    #[test]
    fn ambiguous_values_never_match() {
        let facts = vec![
            ValueRangeFact {
                block: 3,
                name: "%0x10.4".into(),
                value: 0x1122_3344,
            },
            ValueRangeFact {
                block: 4,
                name: "rax.8".into(),
                value: 0x1122_3344,
            },
        ];
        let table = StateTable::from_facts(&facts);
        assert!(table.lookup(0x1122_3344, None).is_none());
        // Name qualification disambiguates.
        assert_eq!(table.lookup(0x1122_3344, Some("rax")).unwrap().block, 4);
    }

    #[test]
    fn scanner_keeps_only_entropic_constant_stores() {
        let mut func = Function::new(0x401000);
        func.add_block(BlockKind::Entry);
        let b = func.add_block(BlockKind::Fallthrough);
        func.add_block(BlockKind::Exit);

        func.block_mut(b)
            .push(Insn::mov_imm(0x1122_3344, 4, Operand::stack(0x10, 4)));
        func.block_mut(b).push(Insn::mov_imm(3, 4, Operand::reg(1, 4)));
        // Not a constant source.
        func.block_mut(b).push(Insn::with_operands(
            Opcode::Mov,
            Operand::reg(2, 4),
            Operand::None,
            Operand::stack(0x10, 4),
        ));

        let assignments = scan_assignments(&func);
        assert_eq!(
            assignments,
            vec![StateAssignment {
                block: b,
                storage: Storage::StackSlot(0x10),
                value: 0x1122_3344,
            }]
        );
    }
}
