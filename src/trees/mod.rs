// Ball trees that hold the greedy permutation.
pub mod simple_ball;

pub use simple_ball::{BallNode, BallTree, LeafNodes, Leaves};
