//! Error types for spreadsheet loading and formula resolution.
//!
//! Two layers: [`EngineError`] stops the whole run, [`DropReason`] only
//! removes the metric being resolved.

/// Fatal conditions. Any of these aborts the resolution run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Unbalanced parentheses in a formula at any stage.
    #[error("mismatched parentheses in expression: {0}")]
    MalformedExpression(String),

    /// The family has no inheritance chain or sleep-state entry.
    #[error("unknown hardware family: {0}")]
    UnknownFamily(String),

    /// No row starting with `Key` was found.
    #[error("spreadsheet has no header row (first cell \"Key\")")]
    MissingHeader,

    /// The header row lacks columns the loader depends on.
    #[error("spreadsheet header is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A topdown node below level 1 appeared before any shallower node.
    #[error("topdown node '{node}' at level {level} has no parent")]
    OrphanNode {
        /// Node name.
        node: String,
        /// Level column it was found in.
        level: u8,
    },
}

/// Per-metric conditions. The metric is dropped and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    /// A deny-listed signal was reached.
    #[error("{0}")]
    Unsupported(String),

    /// A reference chain leads back to itself.
    #[error("cyclic reference {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A macro or hierarchy token names nothing in the sheet.
    #[error("unknown reference {0}")]
    UnknownReference(String),

    /// A macro token or known name survived resolution.
    #[error("unresolved token {0}")]
    Leftover(String),
}

/// Count-based balance check applied at every stage.
pub fn check_expr(expr: &str) -> Result<&str, EngineError> {
    if expr.matches('(').count() != expr.matches(')').count() {
        return Err(EngineError::MalformedExpression(expr.to_string()));
    }
    Ok(expr)
}
