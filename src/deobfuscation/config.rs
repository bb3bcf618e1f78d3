//! Configuration for a deobfuscation session.

/// State-assignment matching strategy for the deflattening pass.
///
/// The strategies trade recall against false-positive risk. Which one works
/// best depends on the obfuscator version that produced the binary, so the
/// choice stays with the operator rather than being hard-coded; when in
/// doubt, [`Strategy::NameQualified`] is the conservative default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Match only assignments to the dispatcher's own carrier, looking up
    /// state-table entries by value alone.
    CarrierMatched,
    /// Match every assignment regardless of storage identity. Highest
    /// recall, highest false-positive risk.
    Unrestricted,
    /// Recompute the carrier as the storage most frequently compared across
    /// all dispatch-style jumps in the function, then match like
    /// [`Strategy::CarrierMatched`] against that majority carrier.
    BusiestCarrier,
    /// Require the state-table entry's name qualifier to equal the
    /// assignment's storage identity in addition to the value. Safest.
    #[default]
    NameQualified,
}

impl Strategy {
    /// Maps the legacy numeric mode (1 through 4) to a strategy.
    #[must_use]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::CarrierMatched),
            2 => Some(Self::Unrestricted),
            3 => Some(Self::BusiestCarrier),
            4 => Some(Self::NameQualified),
            _ => None,
        }
    }

    /// The legacy numeric mode of this strategy.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::CarrierMatched => 1,
            Self::Unrestricted => 2,
            Self::BusiestCarrier => 3,
            Self::NameQualified => 4,
        }
    }
}

/// Configuration for a [`Session`](crate::deobfuscation::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Matching strategy for the deflattening pass.
    pub strategy: Strategy,

    /// Dispatcher block serial, if known. When unset the dispatcher is
    /// detected as the non-sentinel block with the most predecessors; an
    /// obfuscator-inserted preprocessing block can fool that heuristic, in
    /// which case the operator pins the serial here.
    pub dispatcher_override: Option<usize>,

    /// Enable the deflattening pass.
    pub enable_deflatten: bool,

    /// Enable opaque-predicate branch simplification.
    pub enable_branch_simplify: bool,

    /// Enable folding of zero-initialized global reads to constants.
    pub enable_dead_zero: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            dispatcher_override: None,
            enable_deflatten: true,
            enable_branch_simplify: true,
            enable_dead_zero: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_round_trip() {
        for level in 1..=4 {
            let strategy = Strategy::from_level(level).unwrap();
            assert_eq!(strategy.level(), level);
        }
        assert_eq!(Strategy::from_level(0), None);
        assert_eq!(Strategy::from_level(5), None);
        assert_eq!(Strategy::default(), Strategy::NameQualified);
    }
}
