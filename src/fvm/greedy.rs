//! Clarkson's loop: pick sites from the neighbor graph and assemble the greedy tree.

use generational_arena::Index;
use std::collections::HashSet;
use std::fmt::Debug;
use tracing::{debug, error, info, instrument, trace};

use crate::common_types::Metric;
use crate::error::{GreedyError, Result};
use crate::trees::BallTree;

use super::cell::CellId;
use super::neighbor_graph::NeighborGraph;
use super::params::{RadiusScale, TreeParameters};

/// One point of the greedy permutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Site<P> {
    pub point: P,
    /// The cell created for this site; also its position in the permutation.
    pub cell: CellId,
    /// The cell that held `point` when it was chosen. `None` for the first site.
    pub predecessor: Option<CellId>,
}

/// The greedy permutation as an iterator.
///
/// Each item after the first is the farthest member of the cell with the
/// largest out-radius. Iteration stops after `num_points` sites, or right
/// after the first error.
pub struct Sites<P, M> {
    graph: NeighborGraph<P, M>,
    emitted: HashSet<Index>, // forest leaves already handed out as sites
    failed: bool,
}

impl<P: Clone + Debug, M: Metric<P>> Sites<P, M> {
    pub fn new(inputs: Vec<BallTree<P>>, params: TreeParameters, metric: M) -> Result<Self> {
        Ok(Sites {
            graph: NeighborGraph::new(inputs, params, metric)?,
            emitted: HashSet::new(),
            failed: false,
        })
    }

    pub fn graph(&self) -> &NeighborGraph<P, M> {
        &self.graph
    }

    /// Sites not yet produced.
    pub fn remaining(&self) -> usize {
        self.graph.num_points().saturating_sub(self.emitted.len())
    }

    fn first_site(&mut self) -> Result<Site<P>> {
        let root = self.graph.cell(0).ok_or(GreedyError::StaleIndex)?;
        let point = root.center().clone();
        self.emitted.insert(self.graph.forest().leftmost_leaf(self.graph.first_root()));
        Ok(Site {
            point,
            cell: 0,
            predecessor: None,
        })
    }

    /// The leaf `cell` offers as the next site.
    ///
    /// Normally the leaf holding the farthest member's center. When that one is
    /// already a site the cell's out-radius is 0 and every unused leaf left in
    /// it duplicates the center, so the lowest arena slot among them is taken.
    fn candidate(&self, cell: CellId) -> Result<Option<Index>> {
        let cell = self.graph.cell(cell).ok_or(GreedyError::StaleIndex)?;
        let Some(farthest) = cell.farthest() else { return Ok(None) };
        let forest = self.graph.forest();
        let leaf = forest.leftmost_leaf(farthest);
        if !self.emitted.contains(&leaf) {
            return Ok(Some(leaf));
        }
        Ok(cell
            .members()
            .flat_map(|member| forest.leaf_nodes_below(member))
            .filter(|leaf| !self.emitted.contains(leaf))
            .min_by_key(|leaf| leaf.into_raw_parts()))
    }

    fn next_site(&mut self) -> Result<Site<P>> {
        let mut retired = HashSet::new();
        loop {
            let parent = self.graph.max_cell().ok_or(GreedyError::StaleIndex)?;
            if let Some(leaf) = self.candidate(parent)? {
                let cell = self.graph.cell(parent).ok_or(GreedyError::StaleIndex)?;
                debug!(cell = parent, out_radius = cell.out_radius(), "max cell");
                let point = self.graph.forest().get(leaf)?.center.clone();
                let new_cell = self.graph.add_cell(point.clone(), parent)?;
                self.emitted.insert(leaf);
                return Ok(Site {
                    point,
                    cell: new_cell,
                    predecessor: Some(parent),
                });
            }
            // Nothing left in this cell; the same cell surfacing again means no cell has anything left.
            if !retired.insert(parent) {
                let center = self.graph.cell(parent).map(|c| format!("{:?}", c.center())).unwrap_or_default();
                error!(cell = parent, remaining = self.remaining(), "no cell has points left");
                return Err(GreedyError::EmptyCell { center });
            }
            trace!(cell = parent, "retiring spent cell");
            self.graph.retire(parent)?;
        }
    }
}

impl<P: Clone + Debug, M: Metric<P>> Iterator for Sites<P, M> {
    type Item = Result<Site<P>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining() == 0 {
            return None;
        }
        let site = if self.emitted.is_empty() {
            self.first_site()
        } else {
            self.next_site()
        };
        if site.is_err() {
            self.failed = true;
        }
        Some(site)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Growing,
    Finalizing,
    Done,
}

/// Builds the greedy tree one site at a time.
///
/// Every site becomes a leaf; a new site is attached beneath the leaf that
/// currently stands for its predecessor, which keeps the predecessor's point
/// as the left child and the new point as the right child.
pub struct GreedyTreeBuilder<P, M> {
    sites: Sites<P, M>,
    phase: Phase,
    tree: BallTree<P>,
    leaf_slots: Vec<Index>, // site -> its current leaf in `tree`
    scale: RadiusScale,
}

impl<P: Clone + Debug, M: Metric<P>> GreedyTreeBuilder<P, M> {
    pub fn new(inputs: Vec<BallTree<P>>, params: TreeParameters, metric: M) -> Result<Self> {
        let scale = params.radius_scale();
        Ok(GreedyTreeBuilder {
            sites: Sites::new(inputs, params, metric)?,
            phase: Phase::Growing,
            tree: BallTree::empty(),
            leaf_slots: Vec::new(),
            scale,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sites(&self) -> &Sites<P, M> {
        &self.sites
    }

    /// The tree as built so far. Radii and sizes are only valid once `Done`.
    pub fn tree(&self) -> &BallTree<P> {
        &self.tree
    }

    /// Advance by one site, or finish the tree once every site is placed.
    pub fn step(&mut self) -> Result<Phase> {
        match self.phase {
            Phase::Growing => match self.sites.next() {
                Some(site) => {
                    self.place(site?)?;
                    if self.sites.remaining() == 0 {
                        self.phase = Phase::Finalizing;
                    }
                }
                None => self.phase = Phase::Finalizing,
            },
            Phase::Finalizing => {
                self.tree.count();
                let metric = self.sites.graph().metric();
                self.tree.compute_radii(metric, &self.scale)?;
                self.phase = Phase::Done;
            }
            Phase::Done => {}
        }
        Ok(self.phase)
    }

    #[instrument(level = "debug", skip(self), fields(points = self.sites.graph().num_points()))]
    pub fn build(mut self) -> Result<BallTree<P>> {
        while self.step()? != Phase::Done {}
        info!(
            cells = self.sites.graph().num_cells(),
            edges = self.sites.graph().graph().num_edges(),
            radius = self.tree.radius(),
            "greedy tree built"
        );
        Ok(self.tree)
    }

    fn place(&mut self, site: Site<P>) -> Result<()> {
        let Some(pred) = site.predecessor else {
            self.tree = BallTree::singleton(site.point);
            self.leaf_slots = self.tree.root().into_iter().collect();
            return Ok(());
        };
        let slot = *self.leaf_slots.get(pred).ok_or(GreedyError::StaleIndex)?;
        let (left, right) = self.tree.attach(slot, site.point)?;
        self.leaf_slots[pred] = left;
        self.leaf_slots.push(right);
        debug_assert_eq!(self.leaf_slots.len(), site.cell + 1);
        Ok(())
    }
}

/// Greedy tree over the points of every input tree.
pub fn greedy_tree<P, M>(inputs: Vec<BallTree<P>>, params: TreeParameters, metric: M) -> Result<BallTree<P>>
where
    P: Clone + Debug,
    M: Metric<P>,
{
    GreedyTreeBuilder::new(inputs, params, metric)?.build()
}

/// Greedy tree over plain points, each starting out as its own leaf.
pub fn greedy_tree_from_points<P, M>(points: Vec<P>, params: TreeParameters, metric: M) -> Result<BallTree<P>>
where
    P: Clone + Debug,
    M: Metric<P>,
{
    greedy_tree(points.into_iter().map(BallTree::singleton).collect(), params, metric)
}

/// The greedy permutation of `points`, each paired with the position of its predecessor.
pub fn greedy_permutation<P, M>(points: Vec<P>, params: TreeParameters, metric: M) -> Result<Vec<(P, Option<usize>)>>
where
    P: Clone + Debug,
    M: Metric<P>,
{
    let inputs = points.into_iter().map(BallTree::singleton).collect();
    Sites::new(inputs, params, metric)?
        .map(|site| site.map(|s| (s.point, s.predecessor)))
        .collect()
}
