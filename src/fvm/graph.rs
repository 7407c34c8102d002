//! Undirected adjacency graph over dense vertex ids.
//!
//! Neighbor sets are ordered, so every walk over a vertex's neighbors visits
//! them in id order and construction stays deterministic.

use std::collections::BTreeSet;

use crate::error::{GreedyError, Result};

#[derive(Debug, Default, Clone)]
pub struct Graph {
    adjacency: Vec<BTreeSet<usize>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex and returns its id; ids are handed out as 0, 1, 2, ...
    pub fn add_vertex(&mut self) -> usize {
        self.adjacency.push(BTreeSet::new());
        self.adjacency.len() - 1
    }

    pub fn num_vertices(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of edges, each self-loop counted once.
    pub fn num_edges(&self) -> usize {
        let (loops, others) = self
            .adjacency
            .iter()
            .enumerate()
            .fold((0, 0), |(loops, others), (u, nbrs)| {
                let has_loop = nbrs.contains(&u) as usize;
                (loops + has_loop, others + nbrs.len() - has_loop)
            });
        loops + others / 2
    }

    /// Adds the edge `(u, v)` in both directions; `u == v` adds a self-loop.
    /// Both vertices must already exist.
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<()> {
        if u >= self.adjacency.len() || v >= self.adjacency.len() {
            return Err(GreedyError::StaleIndex);
        }
        self.adjacency[u].insert(v);
        self.adjacency[v].insert(u);
        Ok(())
    }

    pub fn remove_edge(&mut self, u: usize, v: usize) -> Result<()> {
        let removed = self.adjacency.get_mut(u).is_some_and(|nbrs| nbrs.remove(&v));
        if !removed {
            return Err(GreedyError::RemoveMissingEdge { u, v });
        }
        if let Some(nbrs) = self.adjacency.get_mut(v) {
            nbrs.remove(&u);
        }
        Ok(())
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.adjacency.get(u).is_some_and(|nbrs| nbrs.contains(&v))
    }

    /// Neighbors of `u` in id order, `u` itself included when it has a self-loop.
    pub fn neighbors(&self, u: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.get(u).into_iter().flatten().copied()
    }

    pub fn degree(&self, u: usize) -> usize {
        self.adjacency.get(u).map_or(0, BTreeSet::len)
    }

    /// Every vertex reachable from `u` in exactly two steps. With self-loops
    /// in place this contains the direct neighbors of `u` as well.
    pub fn neighbors_of_neighbors(&self, u: usize) -> BTreeSet<usize> {
        self.neighbors(u).flat_map(|a| self.neighbors(a)).collect()
    }
}
