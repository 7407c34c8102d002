//! Error types for greedy tree construction.
//!
//! Every variant signals a broken precondition or a violated invariant of the
//! construction. None of them is recoverable, so callers are expected to
//! surface them as they are.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GreedyError {
    #[error("invalid constants: tidy {tidy}, move {move_const}, nbr {nbr}: {reason}")]
    InvalidConstants {
        tidy: f64,
        move_const: f64,
        nbr: f64,
        reason: String,
    },

    #[error("cannot tidy a cell with tidy constant {0}; it must be at least 1")]
    MissingTidyParameter(f64),

    #[error("approximate radii need a scale above 1, got scale {scale} and gp {greedy_param}")]
    MissingScaleParameters { scale: f64, greedy_param: f64 },

    #[error("splitting a leaf with center {center} in cell {cell}")]
    SplitLeaf { center: String, cell: String },

    #[error("trying to remove node {node} from cell {cell}, which does not hold it")]
    RemoveMissingMember { node: String, cell: String },

    #[error("trying to remove missing edge ({u}, {v})")]
    RemoveMissingEdge { u: usize, v: usize },

    #[error("cannot attach below node {center}, it is not a leaf")]
    AttachToInternal { center: String },

    #[error("point {index} has {found} coordinates, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, found: usize },

    #[error("cannot build a greedy tree from no input trees")]
    EmptyInput,

    #[error("cell {center} has no members left to pick a site from")]
    EmptyCell { center: String },

    #[error("node index does not belong to this tree")]
    StaleIndex,
}

pub type Result<T> = std::result::Result<T, GreedyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_constants_display() {
        let err = GreedyError::InvalidConstants {
            tidy: 1.0,
            move_const: 2.0,
            nbr: 1.0,
            reason: "move must not exceed nbr".to_string(),
        };
        let shown = err.to_string();
        assert!(shown.contains("move 2"));
        assert!(shown.contains("move must not exceed nbr"));
    }

    #[test]
    fn test_split_leaf_names_center() {
        let err = GreedyError::SplitLeaf {
            center: "[1.0, 2.0]".to_string(),
            cell: "[0.0, 0.0]".to_string(),
        };
        assert!(err.to_string().contains("[1.0, 2.0]"));
    }
}
