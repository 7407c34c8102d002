//! Greedy ball trees built with Clarkson's farthest-point algorithm.
//!
//! The greedy permutation of a finite metric space starts anywhere and then
//! repeatedly picks the point farthest from everything picked so far. This
//! crate computes it with a neighbor graph of cells: every chosen point owns
//! the input tree nodes closest to it, and only nearby cells are ever
//! compared. The result is a binary ball tree whose leaves are the points.
//!
//! ```
//! use greedy_permutation::{greedy_tree_from_points, TreeParameters, VectorMetric};
//!
//! let points = vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![0.0, 10.0], vec![10.0, 10.0]];
//! let tree = greedy_tree_from_points(points, TreeParameters::default(), VectorMetric::Euclidean).unwrap();
//! assert_eq!(tree.len(), 4);
//! ```

pub mod common_types;
pub mod error;
pub mod fvm;
pub mod trees;

#[cfg(feature = "python")]
mod python;

pub use common_types::{DataPoint, FnMetric, Metric, VectorMetric};
pub use error::{GreedyError, Result};
pub use fvm::{greedy_permutation, greedy_tree, greedy_tree_from_points, TreeParameters};
pub use trees::BallTree;
