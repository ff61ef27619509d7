//! Error types shared by every stage of the distance pipeline.
//!
//! Parsing problems are reported as [`NewickParseError`] wrapped in
//! [`RfError::Parse`]; everything after parsing (duplicate taxa, taxon
//! mismatch between trees, broken internal invariants) is a dedicated
//! [`RfError`] variant so callers can tell malformed input apart from
//! incomparable trees.

use itertools::Itertools;
use thiserror::Error;

/// Errors that can occur while reading a Newick string.
///
/// Every variant carries the byte offset (into the untrimmed input) at which
/// the problem was detected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NewickParseError {
    /// The input contained nothing but whitespace and comments.
    #[error("The newick string is empty.")]
    Empty,
    /// A `)` without matching `(`, or a `;`/end of input with open groups.
    #[error("Unbalanced parentheses at byte {position}.")]
    UnbalancedParentheses { position: usize },
    /// A leaf was expected but no label was given (e.g. `(A,,B);`).
    #[error("Expected a leaf label at byte {position}.")]
    EmptyLabel { position: usize },
    /// The text after a `:` is not a number.
    #[error("Could not parse branch length '{value}' at byte {position}.")]
    InvalidBranchLength { value: String, position: usize },
    /// The tree is not terminated by `;`.
    #[error("The tree is missing a semicolon at the end.")]
    MissingSemicolon,
    /// Something other than whitespace follows the terminating `;`.
    #[error("Unexpected input after the terminating semicolon at byte {position}.")]
    TrailingInput { position: usize },
    /// A token that is not allowed at this point of the grammar.
    #[error("Unexpected '{found}' at byte {position}.")]
    UnexpectedToken { found: String, position: usize },
    /// A quoted label is never closed.
    #[error("Unterminated quoted label starting at byte {position}.")]
    UnterminatedQuote { position: usize },
    /// A `[` comment is never closed.
    #[error("Unterminated comment starting at byte {position}.")]
    UnterminatedComment { position: usize },
}

/// Errors that can occur when computing a distance between trees.
#[derive(Error, Debug)]
pub enum RfError {
    /// The input is not valid Newick.
    #[error("Invalid newick string: {0}")]
    Parse(#[from] NewickParseError),
    /// The same leaf label appears twice in one tree.
    #[error("Leaf label '{label}' appears more than once in the tree.")]
    DuplicateLabel { label: String },
    /// The two trees do not share the same taxon set.
    /// `labels` is the sorted symmetric difference of both leaf sets.
    #[error("Trees do not share the same taxon set; differing labels: {{{}}}", .labels.iter().join(", "))]
    LabelMismatch { labels: Vec<String> },
    /// An internal consistency check failed. Should not be reachable
    /// through the public API.
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
    /// Reading or writing a tree / matrix file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A tree from another library could not be converted.
    #[error("Could not convert tree: {0}")]
    Conversion(String),
}

impl RfError {
    /// True for errors caused by the text of one input on its own
    /// (syntax or duplicate taxa), as opposed to the pair of trees.
    pub fn is_input_error(&self) -> bool {
        matches!(self, RfError::Parse(_) | RfError::DuplicateLabel { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_mismatch_message_lists_labels() {
        let err = RfError::LabelMismatch {
            labels: vec!["B".to_string(), "C".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Trees do not share the same taxon set; differing labels: {B, C}"
        );
    }

    #[test]
    fn parse_errors_convert() {
        let err: RfError = NewickParseError::MissingSemicolon.into();
        assert!(err.is_input_error());
        assert!(matches!(err, RfError::Parse(NewickParseError::MissingSemicolon)));
    }
}
