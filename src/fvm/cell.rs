//! Cells: the tree nodes currently assigned to one chosen site.

use generational_arena::Index;
use std::collections::HashSet;
use std::fmt::Debug;
use tracing::error;

use crate::common_types::Metric;
use crate::error::{GreedyError, Result};
use crate::trees::BallTree;

use super::params::TreeParameters;

pub type CellId = usize;

/// Selector key of a cell with nothing left to offer. Below every real
/// out-radius, including the 0 of a cell holding only duplicates of its center.
pub const SPENT_PRIORITY: f64 = -1.0;

/// Everything a cell reads but does not own: the arena its members live in,
/// the metric and the tuning constants of the graph.
pub struct CellContext<'a, P, M> {
    pub forest: &'a BallTree<P>,
    pub metric: &'a M,
    pub params: &'a TreeParameters,
}

/// Where a node should go when a new cell appears next to its current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Every point below the node is provably close enough to the other cell.
    MoveTo,
    /// Every point below the node provably stays.
    Stay,
    /// Undecided; the node has to be split and its children classified.
    Ambiguous,
}

#[derive(Debug, Clone)]
pub struct Cell<P> {
    center: P,
    members: HashSet<Index>,
    out_radius: f64,
    farthest: Option<Index>,
}

impl<P: Clone + Debug> Cell<P> {
    pub fn new(center: P) -> Self {
        Cell {
            center,
            members: HashSet::new(),
            out_radius: 0.0,
            farthest: None,
        }
    }

    pub fn center(&self) -> &P {
        &self.center
    }

    /// Max over members of `d(center, member.center) + member.radius`, 0 when empty.
    /// Valid as of the last `update_out_radius` or `tidy`.
    pub fn out_radius(&self) -> f64 {
        self.out_radius
    }

    /// Key under which the cell sits in the selector: the out-radius, or
    /// [`SPENT_PRIORITY`] once the cell is empty.
    pub fn priority(&self) -> f64 {
        if self.members.is_empty() {
            SPENT_PRIORITY
        } else {
            self.out_radius
        }
    }

    /// The member realising the out-radius.
    pub fn farthest(&self) -> Option<Index> {
        self.farthest
    }

    pub fn members(&self) -> impl Iterator<Item = Index> + '_ {
        self.members.iter().copied()
    }

    pub fn contains(&self, node: Index) -> bool {
        self.members.contains(&node)
    }

    /// Number of tree nodes in the cell.
    pub fn num_nodes(&self) -> usize {
        self.members.len()
    }

    /// Number of points covered by the cell's members.
    pub fn num_points(&self, forest: &BallTree<P>) -> usize {
        self.members
            .iter()
            .map(|&idx| forest.leaves_below(idx).count())
            .sum()
    }

    pub fn add(&mut self, node: Index) {
        self.members.insert(node);
    }

    pub fn remove(&mut self, node: Index) -> Result<()> {
        if !self.members.remove(&node) {
            error!(cell = ?self.center, "removing a node the cell does not hold");
            return Err(GreedyError::RemoveMissingMember {
                node: format!("{:?}", node.into_raw_parts()),
                cell: format!("{:?}", self.center),
            });
        }
        Ok(())
    }

    /// Recompute the out-radius and the farthest member with one scan.
    /// Ties go to the member in the lowest arena slot.
    pub fn update_out_radius<M: Metric<P>>(&mut self, forest: &BallTree<P>, metric: &M) -> Result<()> {
        let mut best: Option<(f64, Index)> = None;
        for &idx in &self.members {
            let node = forest.get(idx)?;
            let reach = metric.distance(&self.center, &node.center) + node.radius;
            let better = match best {
                None => true,
                Some((best_reach, best_idx)) => {
                    reach > best_reach
                        || (reach == best_reach && idx.into_raw_parts() < best_idx.into_raw_parts())
                }
            };
            if better {
                best = Some((reach, idx));
            }
        }
        self.out_radius = best.map_or(0.0, |(reach, _)| reach);
        self.farthest = best.map(|(_, idx)| idx);
        Ok(())
    }

    /// Decide whether `node`, a member of this cell, belongs to `other`.
    ///
    /// - move: `move * (d(other, x) + r) <= d(self, x) - r`
    /// - stay: `nbr * (d(other, x) - r) >= d(self, x) + r`
    pub fn classify<M: Metric<P>>(
        &self,
        node: Index,
        other: &Cell<P>,
        ctx: &CellContext<'_, P, M>,
    ) -> Result<Placement> {
        let x = ctx.forest.get(node)?;
        let to_self = ctx.metric.distance(&self.center, &x.center);
        let to_other = ctx.metric.distance(&other.center, &x.center);

        if ctx.params.move_const * (to_other + x.radius) <= to_self - x.radius {
            Ok(Placement::MoveTo)
        } else if ctx.params.nbr_const * (to_other - x.radius) >= to_self + x.radius {
            Ok(Placement::Stay)
        } else {
            Ok(Placement::Ambiguous)
        }
    }

    /// Replace `node` by its two children. Returns `(left, right)`.
    pub fn split(&mut self, node: Index, forest: &BallTree<P>) -> Result<(Index, Index)> {
        let x = forest.get(node)?;
        let Some((left, right)) = x.children else {
            error!(center = ?x.center, cell = ?self.center, "splitting a leaf");
            return Err(GreedyError::SplitLeaf {
                center: format!("{:?}", x.center),
                cell: format!("{:?}", self.center),
            });
        };
        self.remove(node)?;
        self.members.insert(left);
        self.members.insert(right);
        Ok((left, right))
    }

    /// Split the farthest member until `farthest.radius <= (tidy - 1) * d(center, farthest)`.
    ///
    /// Splitting only ever shrinks the member radii and leaves have radius 0,
    /// so the loop ends once the farthest member is tight enough or a leaf.
    pub fn tidy<M: Metric<P>>(&mut self, ctx: &CellContext<'_, P, M>) -> Result<()> {
        let tidy = ctx.params.tidy_const;
        if tidy < 1.0 {
            error!(cell = ?self.center, nodes = self.members.len(), "tidying without a usable tidy constant");
            return Err(GreedyError::MissingTidyParameter(tidy));
        }
        self.update_out_radius(ctx.forest, ctx.metric)?;
        while let Some(idx) = self.farthest {
            let x = ctx.forest.get(idx)?;
            if x.radius <= (tidy - 1.0) * ctx.metric.distance(&self.center, &x.center) {
                break;
            }
            self.split(idx, ctx.forest)?;
            self.update_out_radius(ctx.forest, ctx.metric)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common_types::VectorMetric;

    const EPSILON: f64 = 1e-9;

    fn pt(x: f64, y: f64) -> Vec<f64> {
        vec![x, y]
    }

    // Forest with one tree ((0,0), (4,0)) and a lone leaf at (10, 0).
    fn sample_forest() -> (BallTree<Vec<f64>>, Index, Index) {
        let m = VectorMetric::Euclidean;
        let pair = BallTree::join(BallTree::singleton(pt(0.0, 0.0)), BallTree::singleton(pt(4.0, 0.0)), &m).unwrap();
        let mut forest = BallTree::empty();
        let pair_root = forest.absorb(pair).unwrap();
        let lone = forest.absorb(BallTree::singleton(pt(10.0, 0.0))).unwrap();
        (forest, pair_root, lone)
    }

    #[test]
    fn test_out_radius_and_farthest() {
        let (forest, pair, lone) = sample_forest();
        let mut cell = Cell::new(pt(0.0, 0.0));
        cell.add(pair);
        cell.add(lone);
        cell.update_out_radius(&forest, &VectorMetric::Euclidean).unwrap();
        assert!((cell.out_radius() - 10.0).abs() < EPSILON);
        assert_eq!(cell.farthest(), Some(lone));
        assert_eq!(cell.num_nodes(), 2);
        assert_eq!(cell.num_points(&forest), 3);
    }

    #[test]
    fn test_empty_cell_has_zero_radius() {
        let (forest, _, _) = sample_forest();
        let mut cell: Cell<Vec<f64>> = Cell::new(pt(1.0, 1.0));
        cell.update_out_radius(&forest, &VectorMetric::Euclidean).unwrap();
        assert_eq!(cell.out_radius(), 0.0);
        assert_eq!(cell.farthest(), None);
        assert_eq!(cell.priority(), SPENT_PRIORITY);
    }

    #[test]
    fn test_duplicate_of_center_ranks_above_empty() {
        let mut forest = BallTree::empty();
        let a = forest.absorb(BallTree::singleton(pt(2.0, 2.0))).unwrap();
        let b = forest.absorb(BallTree::singleton(pt(2.0, 2.0))).unwrap();
        let mut cell = Cell::new(pt(2.0, 2.0));
        cell.add(a);
        cell.add(b);
        cell.update_out_radius(&forest, &VectorMetric::Euclidean).unwrap();
        assert_eq!(cell.priority(), 0.0);
        assert_eq!(cell.farthest(), Some(a));
        assert!(cell.priority() > Cell::<Vec<f64>>::new(pt(0.0, 0.0)).priority());
    }

    #[test]
    fn test_remove_missing_member_fails() {
        let (_, pair, _) = sample_forest();
        let mut cell: Cell<Vec<f64>> = Cell::new(pt(0.0, 0.0));
        assert!(matches!(cell.remove(pair), Err(GreedyError::RemoveMissingMember { .. })));
    }

    #[test]
    fn test_split_replaces_node_by_children() {
        let (forest, pair, lone) = sample_forest();
        let mut cell = Cell::new(pt(0.0, 0.0));
        cell.add(pair);
        let (left, right) = cell.split(pair, &forest).unwrap();
        assert!(!cell.contains(pair));
        assert!(cell.contains(left) && cell.contains(right));

        cell.add(lone);
        assert!(matches!(cell.split(lone, &forest), Err(GreedyError::SplitLeaf { .. })));
        assert!(cell.contains(lone));
    }

    #[test]
    fn test_classify_move_stay_ambiguous() {
        let (forest, pair, lone) = sample_forest();
        let params = TreeParameters::default();
        let metric = VectorMetric::Euclidean;
        let ctx = CellContext { forest: &forest, metric: &metric, params: &params };

        let mut home = Cell::new(pt(0.0, 0.0));
        home.add(pair);
        home.add(lone);

        // The lone leaf at 10 is closer to a cell at 9 than to the home center.
        let near_lone = Cell::new(pt(9.0, 0.0));
        assert_eq!(home.classify(lone, &near_lone, &ctx).unwrap(), Placement::MoveTo);

        // Far away on the other side: both the pair and the leaf stay.
        let far = Cell::new(pt(-50.0, 0.0));
        assert_eq!(home.classify(pair, &far, &ctx).unwrap(), Placement::Stay);
        assert_eq!(home.classify(lone, &far, &ctx).unwrap(), Placement::Stay);

        // A cell at (3, 0) cuts through the pair: (0,0) stays, (4,0) would move.
        let cutting = Cell::new(pt(3.0, 0.0));
        assert_eq!(home.classify(pair, &cutting, &ctx).unwrap(), Placement::Ambiguous);
    }

    #[test]
    fn test_tidy_splits_until_leaves_with_tidy_one() {
        let (forest, pair, lone) = sample_forest();
        let params = TreeParameters::default();
        let metric = VectorMetric::Euclidean;
        let ctx = CellContext { forest: &forest, metric: &metric, params: &params };

        // Centered at (10, 0) the pair reaches 10 + 4 = 14 and must be opened.
        let mut cell = Cell::new(pt(10.0, 0.0));
        cell.add(pair);
        cell.add(lone);
        cell.tidy(&ctx).unwrap();
        assert!(!cell.contains(pair));
        assert_eq!(cell.num_nodes(), 3);
        assert!((cell.out_radius() - 10.0).abs() < EPSILON);
        let farthest = forest.node(cell.farthest().unwrap()).unwrap();
        assert!(farthest.is_leaf());
    }

    #[test]
    fn test_tidy_keeps_loose_node_with_larger_constant() {
        let (forest, pair, _) = sample_forest();
        let params = TreeParameters::from((3.0, 3.0, 3.0, 1.0));
        let metric = VectorMetric::Euclidean;
        let ctx = CellContext { forest: &forest, metric: &metric, params: &params };

        // radius 4 <= (3 - 1) * 10, so the pair stays whole.
        let mut cell = Cell::new(pt(10.0, 0.0));
        cell.add(pair);
        cell.tidy(&ctx).unwrap();
        assert!(cell.contains(pair));
        assert!((cell.out_radius() - 14.0).abs() < EPSILON);
    }
}
