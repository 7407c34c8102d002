// Clarkson's algorithm over a neighbor graph of cells.
pub mod bucket_queue;
pub mod cell;
pub mod graph;
pub mod greedy;
pub mod heap_utils;
pub mod neighbor_graph;
pub mod params;

pub use cell::{Cell, CellId, Placement};
pub use greedy::{GreedyTreeBuilder, Phase, Site, Sites, greedy_permutation, greedy_tree, greedy_tree_from_points};
pub use neighbor_graph::NeighborGraph;
pub use params::{RadiusScale, TreeParameters};
