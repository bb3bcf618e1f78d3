use thiserror::Error;

/// The generic Error type, which provides coverage for all errors this library
/// can potentially return.
///
/// The taxonomy is deliberately small. Most conditions the engine meets are
/// not errors at all: an ambiguous state-table lookup is a missed opportunity,
/// not a failure, and a post-mutation verification problem is logged rather
/// than propagated, since partial deobfuscation is strictly better than none.
/// Invalid block serials are programmer errors and panic instead of returning
/// a variant; all callers are expected to hold valid serials.
#[derive(Error, Debug)]
pub enum Error {
    /// The symbolic evaluator met an opcode or operand shape it cannot model.
    ///
    /// Non-fatal: aborts only the evaluation of the containing expression.
    /// Callers treat this as "cannot statically determine - leave as is",
    /// never as a hard failure of the whole pass.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// Post-mutation graph verification failed.
    ///
    /// Produced by [`crate::ir::Function::verify`]. Callers log this with
    /// diagnostic detail and continue; the host's own pipeline may still
    /// recover the graph.
    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
