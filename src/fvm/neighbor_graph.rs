//! The neighbor graph of cells.
//!
//! Cells are vertices; an edge joins two cells that are close enough for a
//! node of one to end up in the other. The graph always keeps a self-loop on
//! every cell: `neighbors_of_neighbors` relies on it to include the direct
//! neighbors, and `add_cell` relies on it to rebalance the parent cell itself.

use generational_arena::Index;
use std::fmt::Debug;
use tracing::{debug, instrument, trace};

use crate::common_types::Metric;
use crate::error::{GreedyError, Result};
use crate::trees::BallTree;

use super::cell::{Cell, CellContext, CellId, Placement, SPENT_PRIORITY};
use super::graph::Graph;
use super::heap_utils::{CellQueue, PrioritySelector};
use super::params::TreeParameters;

#[derive(Debug)]
pub struct NeighborGraph<P, M> {
    forest: BallTree<P>,
    metric: M,
    params: TreeParameters,
    cells: Vec<Cell<P>>,
    graph: Graph,
    queue: CellQueue,
    num_points: usize,
    first_root: Index,
}

impl<P: Clone + Debug, M: Metric<P>> NeighborGraph<P, M> {
    /// Start a graph with one cell, centered at the first input root and
    /// holding every input root.
    ///
    /// The constants are checked before anything else is built.
    #[instrument(level = "debug", skip_all, fields(inputs = inputs.len()))]
    pub fn new(inputs: Vec<BallTree<P>>, params: TreeParameters, metric: M) -> Result<Self> {
        params.validate()?;

        let mut forest = BallTree::empty();
        let roots: Vec<Index> = inputs.into_iter().filter_map(|tree| forest.absorb(tree)).collect();
        let first = *roots.first().ok_or(GreedyError::EmptyInput)?;
        let num_points = roots.iter().map(|&root| forest.leaves_below(root).count()).sum();

        let mut root_cell = Cell::new(forest.get(first)?.center.clone());
        for &root in &roots {
            root_cell.add(root);
        }
        root_cell.tidy(&CellContext {
            forest: &forest,
            metric: &metric,
            params: &params,
        })?;

        let mut graph = Graph::new();
        let root_id = graph.add_vertex();
        graph.add_edge(root_id, root_id)?;

        let mut queue = CellQueue::for_params(&params);
        queue.insert(root_id, root_cell.priority());
        debug!(
            points = num_points,
            out_radius = root_cell.out_radius(),
            exact_queue = queue.is_exact(),
            "seeded root cell"
        );

        Ok(NeighborGraph {
            forest,
            metric,
            params,
            cells: vec![root_cell],
            graph,
            queue,
            num_points,
            first_root: first,
        })
    }

    pub fn params(&self) -> &TreeParameters {
        &self.params
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// The arena holding every input node; cell members index into it.
    pub fn forest(&self) -> &BallTree<P> {
        &self.forest
    }

    /// Number of points over all input trees.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell<P>> {
        self.cells.get(id)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell<P>)> + '_ {
        self.cells.iter().enumerate()
    }

    pub fn neighbors(&self, id: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.graph.neighbors(id)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The cell with the largest out-radius, up to the queue's precision.
    pub fn max_cell(&self) -> Option<CellId> {
        self.queue.find_max()
    }

    /// The input root the root cell was centered on.
    pub fn first_root(&self) -> Index {
        self.first_root
    }

    /// Rank `id` below every cell that can still produce a site. The next
    /// rebalance of `id` gives it its real key back.
    pub fn retire(&mut self, id: CellId) -> Result<()> {
        if id >= self.cells.len() {
            return Err(GreedyError::StaleIndex);
        }
        self.queue.change_priority(id, SPENT_PRIORITY);
        Ok(())
    }

    /// `d(u, v) <= u.out + v.out + nbr * max(u.out, v.out)`
    pub fn is_close_enough(&self, u: CellId, v: CellId) -> bool {
        let (Some(a), Some(b)) = (self.cells.get(u), self.cells.get(v)) else {
            return false;
        };
        let (ra, rb) = (a.out_radius(), b.out_radius());
        self.metric.distance(a.center(), b.center()) <= ra + rb + self.params.nbr_const * ra.max(rb)
    }

    /// Add a cell at `new_center`, a point held by the cell `parent`.
    ///
    /// Nodes move into the new cell from the neighbors of `parent`, the new
    /// cell is linked to the close neighbors-of-neighbors of `parent`, and
    /// stale edges around `parent` are pruned once every radius is settled.
    #[instrument(level = "trace", skip(self, new_center))]
    pub fn add_cell(&mut self, new_center: P, parent: CellId) -> Result<CellId> {
        if parent >= self.cells.len() {
            return Err(GreedyError::StaleIndex);
        }
        let new_id = self.graph.add_vertex();
        self.graph.add_edge(new_id, new_id)?;
        self.cells.push(Cell::new(new_center));

        let nbrs: Vec<CellId> = self.graph.neighbors(parent).collect();
        for &nbr in &nbrs {
            self.rebalance(new_id, nbr)?;
        }
        self.cells[new_id].tidy(&CellContext {
            forest: &self.forest,
            metric: &self.metric,
            params: &self.params,
        })?;

        for candidate in self.graph.neighbors_of_neighbors(parent) {
            if self.is_close_enough(new_id, candidate) {
                self.graph.add_edge(new_id, candidate)?;
            }
        }

        let nbrs: Vec<CellId> = self.graph.neighbors(parent).collect();
        for nbr in nbrs {
            self.prune(nbr)?;
        }

        self.queue.insert(new_id, self.cells[new_id].priority());
        trace!(
            cell = new_id,
            nodes = self.cells[new_id].num_nodes(),
            out_radius = self.cells[new_id].out_radius(),
            degree = self.graph.degree(new_id),
            "added cell"
        );
        Ok(new_id)
    }

    /// Move every node of `b` that provably belongs to `a` over to `a`,
    /// splitting the undecided ones until each piece is decided.
    pub fn rebalance(&mut self, a: CellId, b: CellId) -> Result<()> {
        if a == b || a >= self.cells.len() || b >= self.cells.len() {
            return Err(GreedyError::StaleIndex);
        }

        let mut to_move = Vec::new();
        let mut to_check: Vec<Index> = self.cells[b].members().collect();
        let mut splits = 0usize;
        while !to_check.is_empty() {
            let mut to_split = Vec::new();
            {
                let ctx = CellContext {
                    forest: &self.forest,
                    metric: &self.metric,
                    params: &self.params,
                };
                let (from, to) = (&self.cells[b], &self.cells[a]);
                for node in to_check.drain(..) {
                    match from.classify(node, to, &ctx)? {
                        Placement::MoveTo => to_move.push(node),
                        Placement::Stay => {}
                        Placement::Ambiguous => to_split.push(node),
                    }
                }
            }
            for node in to_split {
                let (left, right) = self.cells[b].split(node, &self.forest)?;
                to_check.push(left);
                to_check.push(right);
                splits += 1;
            }
        }

        for &node in &to_move {
            self.cells[b].remove(node)?;
            self.cells[a].add(node);
        }

        let ctx = CellContext {
            forest: &self.forest,
            metric: &self.metric,
            params: &self.params,
        };
        self.cells[a].tidy(&ctx)?;
        self.cells[b].tidy(&ctx)?;
        self.queue.change_priority(b, self.cells[b].priority());

        trace!(from = b, to = a, moved = to_move.len(), splits, "rebalanced");
        Ok(())
    }

    /// Drop every edge at `u` that is no longer close enough.
    pub fn prune(&mut self, u: CellId) -> Result<()> {
        let stale: Vec<CellId> = self
            .graph
            .neighbors(u)
            .filter(|&v| !self.is_close_enough(u, v))
            .collect();
        for v in stale {
            self.graph.remove_edge(u, v)?;
        }
        Ok(())
    }
}
