//! Arena-based greedy ball trees.
//!
//! A ball has a center, a covering radius, the number of points below it and
//! either no children or exactly two. The left child of an internal ball
//! always has the same center as the ball itself, which is what lets the
//! exact radius pass skip the left subtree.

use generational_arena::{Arena, Index};
use std::collections::HashMap;
use std::fmt;
use termtree::Tree;
use tracing::{debug, instrument};

use crate::common_types::Metric;
use crate::error::{GreedyError, Result};
use crate::fvm::params::RadiusScale;

#[derive(Debug, Clone)]
pub struct BallNode<P> {
    pub center: P,
    /// Max distance from `center` to any point below this node.
    pub radius: f64,
    /// Number of leaves below this node, as of the last `count()`.
    pub size: usize,
    /// `(left, right)`; `None` marks a leaf.
    pub children: Option<(Index, Index)>,
}

impl<P> BallNode<P> {
    fn leaf(center: P) -> Self {
        BallNode {
            center,
            radius: 0.0,
            size: 1,
            children: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn left(&self) -> Option<Index> {
        self.children.map(|(left, _)| left)
    }

    pub fn right(&self) -> Option<Index> {
        self.children.map(|(_, right)| right)
    }
}

/// A binary ball tree whose nodes live in one arena.
///
/// A tree with no root is a valid, empty arena; the neighbor graph uses one
/// as a forest holding every input tree.
#[derive(Debug, Clone)]
pub struct BallTree<P> {
    arena: Arena<BallNode<P>>,
    root: Option<Index>,
}

impl<P> Default for BallTree<P> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<P> BallTree<P> {
    pub fn empty() -> Self {
        BallTree {
            arena: Arena::new(),
            root: None,
        }
    }

    /// A tree holding the single point `point`: radius 0, size 1.
    pub fn singleton(point: P) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(BallNode::leaf(point));
        BallTree {
            arena,
            root: Some(root),
        }
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn root_node(&self) -> Option<&BallNode<P>> {
        self.root.and_then(|idx| self.arena.get(idx))
    }

    pub fn node(&self, idx: Index) -> Option<&BallNode<P>> {
        self.arena.get(idx)
    }

    pub(crate) fn get(&self, idx: Index) -> Result<&BallNode<P>> {
        self.arena.get(idx).ok_or(GreedyError::StaleIndex)
    }

    pub fn center(&self) -> Option<&P> {
        self.root_node().map(|node| &node.center)
    }

    pub fn radius(&self) -> f64 {
        self.root_node().map_or(0.0, |node| node.radius)
    }

    /// Number of points in the tree, as recorded on the root by the last `count()`.
    pub fn len(&self) -> usize {
        self.root_node().map_or(0, |node| node.size)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Total number of nodes, internal ones included.
    pub fn num_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Points at the leaves, left to right.
    pub fn leaves(&self) -> Leaves<'_, P> {
        Leaves::new(self, self.root)
    }

    /// Points at the leaves below `idx`, left to right.
    pub fn leaves_below(&self, idx: Index) -> Leaves<'_, P> {
        Leaves::new(self, Some(idx))
    }

    /// Arena slots of the leaves below `idx`, left to right.
    pub fn leaf_nodes_below(&self, idx: Index) -> LeafNodes<'_, P> {
        LeafNodes::new(self, Some(idx))
    }

    /// The leaf reached from `idx` by following left children; it holds `idx`'s center.
    pub fn leftmost_leaf(&self, idx: Index) -> Index {
        let mut current = idx;
        while let Some(left) = self.arena.get(current).and_then(BallNode::left) {
            current = left;
        }
        current
    }

    /// Nodes under `start`, children before their parent.
    fn postorder(&self, start: Index) -> Vec<Index> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut stack = vec![(start, false)];
        while let Some((idx, visited)) = stack.pop() {
            if visited {
                order.push(idx);
                continue;
            }
            stack.push((idx, true));
            if let Some((left, right)) = self.arena.get(idx).and_then(|node| node.children) {
                stack.push((right, false));
                stack.push((left, false));
            }
        }
        order
    }

    /// Recompute `size` on every node. Idempotent.
    #[instrument(level = "debug", skip(self))]
    pub fn count(&mut self) {
        let Some(root) = self.root else { return };
        for idx in self.postorder(root) {
            let size = match self.arena[idx].children {
                None => 1,
                Some((left, right)) => self.arena[left].size + self.arena[right].size,
            };
            self.arena[idx].size = size;
        }
    }

    /// Moves every node of `other` into this arena and returns the new index
    /// of `other`'s root. The root of `self` is left untouched.
    pub fn absorb(&mut self, other: BallTree<P>) -> Option<Index> {
        let BallTree { mut arena, root } = other;
        let mut remap: HashMap<Index, Index> = HashMap::with_capacity(arena.len());
        let mut moved = Vec::with_capacity(arena.len());
        for (old_idx, node) in arena.drain() {
            let new_idx = self.arena.insert(node);
            remap.insert(old_idx, new_idx);
            moved.push(new_idx);
        }
        for new_idx in moved {
            if let Some((left, right)) = self.arena[new_idx].children {
                self.arena[new_idx].children = Some((remap[&left], remap[&right]));
            }
        }
        root.map(|old_root| remap[&old_root])
    }
}

impl<P: Clone + fmt::Debug> BallTree<P> {
    /// Merge two trees under a new root centered at the left tree's center.
    ///
    /// The new root's radius is computed exactly from the children, so a tree
    /// built only from `singleton` and `join` always has valid radii and sizes.
    pub fn join<M: Metric<P>>(left: BallTree<P>, right: BallTree<P>, metric: &M) -> Result<Self> {
        let mut tree = left;
        let left_root = tree.root.ok_or(GreedyError::EmptyInput)?;
        let right_root = tree.absorb(right).ok_or(GreedyError::EmptyInput)?;

        let center = tree.arena[left_root].center.clone();
        let radius = tree.arena[left_root]
            .radius
            .max(tree.farthest_distance(right_root, &center, metric));
        let size = tree.arena[left_root].size + tree.arena[right_root].size;
        let root = tree.arena.insert(BallNode {
            center,
            radius,
            size,
            children: Some((left_root, right_root)),
        });
        tree.root = Some(root);
        Ok(tree)
    }

    /// Turn the leaf `leaf` into an internal node whose left child keeps the
    /// old center and whose right child holds `point`.
    ///
    /// Returns `(left, right)`: the new leaf slots of the old and the new point.
    pub fn attach(&mut self, leaf: Index, point: P) -> Result<(Index, Index)> {
        let node = self.get(leaf)?;
        if !node.is_leaf() {
            return Err(GreedyError::AttachToInternal {
                center: format!("{:?}", node.center),
            });
        }
        let center = node.center.clone();
        let left = self.arena.insert(BallNode::leaf(center));
        let right = self.arena.insert(BallNode::leaf(point));
        self.arena[leaf].children = Some((left, right));
        Ok((left, right))
    }

    /// Distance from `query` to the farthest point below `idx`.
    ///
    /// Branch and bound on the radii: a subtree is only opened when
    /// `d(center, query) + radius` beats the best distance seen so far.
    pub fn farthest_distance<M: Metric<P>>(&self, idx: Index, query: &P, metric: &M) -> f64 {
        let mut best = 0.0_f64;
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let Some(ball) = self.arena.get(current) else { continue };
            let dist = metric.distance(&ball.center, query);
            best = best.max(dist);
            if let Some((left, right)) = ball.children {
                if dist + ball.radius > best {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        best
    }

    /// Exact covering radius for every node: `max(left.radius, farthest(right, center))`.
    #[instrument(level = "debug", skip_all)]
    pub fn exact_radii<M: Metric<P>>(&mut self, metric: &M) {
        let Some(root) = self.root else { return };
        for idx in self.postorder(root) {
            let radius = match self.arena[idx].children {
                None => 0.0,
                Some((left, right)) => {
                    let center = &self.arena[idx].center;
                    self.arena[left]
                        .radius
                        .max(self.farthest_distance(right, center, metric))
                }
            };
            self.arena[idx].radius = radius;
        }
    }

    /// Closed-form radius bound for every node:
    /// `min(max(left.r, d + right.r), scale * gp * d / (scale - 1))` with
    /// `d` the distance between a node's center and its right child's center.
    #[instrument(level = "debug", skip(self, metric))]
    pub fn approx_radii<M: Metric<P>>(&mut self, metric: &M, scale: &RadiusScale) -> Result<()> {
        let factor = scale.bound_factor()?;
        let Some(root) = self.root else { return Ok(()) };
        for idx in self.postorder(root) {
            let radius = match self.arena[idx].children {
                None => 0.0,
                Some((left, right)) => {
                    let d = metric.distance(&self.arena[idx].center, &self.arena[right].center);
                    let covering = self.arena[left].radius.max(d + self.arena[right].radius);
                    covering.min(factor * d)
                }
            };
            self.arena[idx].radius = radius;
        }
        Ok(())
    }

    /// Approximate radii when `scale > 1`, exact radii otherwise.
    pub fn compute_radii<M: Metric<P>>(&mut self, metric: &M, scale: &RadiusScale) -> Result<()> {
        if scale.is_approximate() {
            debug!(scale = scale.scale, gp = scale.greedy_param, "computing approximate radii");
            self.approx_radii(metric, scale)
        } else {
            debug!("computing exact radii");
            self.exact_radii(metric);
            Ok(())
        }
    }
}

/// Lazy in-order walk over the leaf nodes of a tree, driven by an explicit stack.
pub struct LeafNodes<'a, P> {
    tree: &'a BallTree<P>,
    stack: Vec<Index>,
}

impl<'a, P> LeafNodes<'a, P> {
    fn new(tree: &'a BallTree<P>, start: Option<Index>) -> Self {
        LeafNodes {
            tree,
            stack: start.into_iter().collect(),
        }
    }
}

impl<'a, P> Iterator for LeafNodes<'a, P> {
    type Item = Index;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.stack.pop() {
            let Some(node) = self.tree.arena.get(idx) else { continue };
            match node.children {
                None => return Some(idx),
                Some((left, right)) => {
                    // Right first so the left subtree comes out first.
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }
        None
    }
}

/// The points at the leaves, in the order of [`LeafNodes`].
pub struct Leaves<'a, P> {
    nodes: LeafNodes<'a, P>,
}

impl<'a, P> Leaves<'a, P> {
    fn new(tree: &'a BallTree<P>, start: Option<Index>) -> Self {
        Leaves {
            nodes: LeafNodes::new(tree, start),
        }
    }
}

impl<'a, P> Iterator for Leaves<'a, P> {
    type Item = &'a P;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.nodes.tree;
        self.nodes
            .by_ref()
            .find_map(|idx| tree.arena.get(idx).map(|node| &node.center))
    }
}

impl<P: fmt::Debug> BallTree<P> {
    /// The tree as a `termtree` outline, one line per node.
    ///
    /// Built bottom-up from the post-order, so deep trees need no recursion.
    pub fn outline(&self) -> Option<Tree<String>> {
        let root = self.root?;
        let mut built: HashMap<Index, Tree<String>> = HashMap::new();
        for idx in self.postorder(root) {
            let Some(node) = self.arena.get(idx) else { continue };
            let label = format!("{:?} (r={:.4}, n={})", node.center, node.radius, node.size);
            let leaves: Vec<Tree<String>> = match node.children {
                None => Vec::new(),
                Some((left, right)) => [left, right].iter().filter_map(|child| built.remove(child)).collect(),
            };
            built.insert(idx, Tree::new(label).with_leaves(leaves));
        }
        built.remove(&root)
    }
}

impl<P: fmt::Debug> fmt::Display for BallTree<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outline() {
            Some(tree) => write!(f, "{tree}"),
            None => writeln!(f, "<empty>"),
        }
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

    // Builds ((a, b), (c, d)) with `join`, so radii are exact by construction.
    fn build_sample_tree() -> BallTree<Vec<f64>> {
        let m = VectorMetric::Euclidean;
        let ab = BallTree::join(BallTree::singleton(pt(0.0, 0.0)), BallTree::singleton(pt(1.0, 0.0)), &m).unwrap();
        let cd = BallTree::join(BallTree::singleton(pt(5.0, 0.0)), BallTree::singleton(pt(5.0, 3.0)), &m).unwrap();
        BallTree::join(ab, cd, &m).unwrap()
    }

    fn brute_force_radius(tree: &BallTree<Vec<f64>>, idx: Index) -> f64 {
        let center = &tree.node(idx).unwrap().center;
        tree.leaves_below(idx)
            .map(|p| VectorMetric::Euclidean.between(p, center))
            .fold(0.0, f64::max)
    }

    fn assert_radii_match_brute_force(tree: &BallTree<Vec<f64>>) {
        for idx in tree.postorder(tree.root().unwrap()) {
            let node = tree.node(idx).unwrap();
            let expected = brute_force_radius(tree, idx);
            assert!(
                (node.radius - expected).abs() < EPSILON,
                "node {:?}: radius {} but farthest leaf at {}",
                node.center,
                node.radius,
                expected
            );
        }
    }

    #[test]
    fn test_singleton_is_a_leaf() {
        let tree = BallTree::singleton(pt(1.0, 2.0));
        let root = tree.root_node().unwrap();
        assert!(root.is_leaf());
        assert_eq!(root.size, 1);
        assert!((root.radius - 0.0).abs() < EPSILON);
        assert_eq!(tree.leaves().count(), 1);
    }

    #[test]
    fn test_empty_tree() {
        let mut tree: BallTree<Vec<f64>> = BallTree::empty();
        tree.count();
        tree.exact_radii(&VectorMetric::Euclidean);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.leaves().count(), 0);
    }

    #[test]
    fn test_join_keeps_left_center_and_sizes() {
        let tree = build_sample_tree();
        let root = tree.root_node().unwrap();
        assert_eq!(root.center, pt(0.0, 0.0));
        assert_eq!(root.size, 4);
        let left = tree.node(root.left().unwrap()).unwrap();
        assert_eq!(left.center, root.center);
        assert_radii_match_brute_force(&tree);
    }

    #[test]
    fn test_join_rejects_empty_side() {
        let m = VectorMetric::Euclidean;
        let result = BallTree::join(BallTree::singleton(pt(0.0, 0.0)), BallTree::empty(), &m);
        assert_eq!(result.err(), Some(GreedyError::EmptyInput));
    }

    #[test]
    fn test_leaves_in_order() {
        let tree = build_sample_tree();
        let leaves: Vec<_> = tree.leaves().cloned().collect();
        assert_eq!(leaves, vec![pt(0.0, 0.0), pt(1.0, 0.0), pt(5.0, 0.0), pt(5.0, 3.0)]);
        // A second walk starts over.
        assert_eq!(tree.leaves().count(), 4);
    }

    #[test]
    fn test_attach_turns_leaf_internal() {
        let mut tree = BallTree::singleton(pt(0.0, 0.0));
        let root = tree.root().unwrap();
        let (left, right) = tree.attach(root, pt(3.0, 4.0)).unwrap();
        assert_eq!(tree.node(left).unwrap().center, pt(0.0, 0.0));
        assert_eq!(tree.node(right).unwrap().center, pt(3.0, 4.0));
        assert!(!tree.node(root).unwrap().is_leaf());

        let (_, far) = tree.attach(left, pt(-1.0, 0.0)).unwrap();
        assert!(tree.node(far).unwrap().is_leaf());

        tree.count();
        assert_eq!(tree.len(), 3);
        tree.exact_radii(&VectorMetric::Euclidean);
        assert!((tree.radius() - 5.0).abs() < EPSILON);
        assert_radii_match_brute_force(&tree);
    }

    #[test]
    fn test_attach_to_internal_node_fails() {
        let mut tree = build_sample_tree();
        let root = tree.root().unwrap();
        assert!(matches!(
            tree.attach(root, pt(9.0, 9.0)),
            Err(GreedyError::AttachToInternal { .. })
        ));
    }

    #[test]
    fn test_farthest_distance_matches_brute_force() {
        let tree = build_sample_tree();
        let m = VectorMetric::Euclidean;
        for query in [pt(0.0, 0.0), pt(10.0, 10.0), pt(-3.0, 1.0), pt(5.0, 1.5)] {
            let expected = tree.leaves().map(|p| m.between(p, &query)).fold(0.0, f64::max);
            let found = tree.farthest_distance(tree.root().unwrap(), &query, &m);
            assert!((found - expected).abs() < EPSILON);
        }
    }

    #[test]
    fn test_count_and_exact_radii_are_idempotent() {
        let mut tree = build_sample_tree();
        let m = VectorMetric::Euclidean;
        tree.count();
        tree.exact_radii(&m);
        let first: Vec<(usize, f64)> = tree.arena.iter().map(|(_, n)| (n.size, n.radius)).collect();
        tree.count();
        tree.exact_radii(&m);
        let second: Vec<(usize, f64)> = tree.arena.iter().map(|(_, n)| (n.size, n.radius)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_approx_radii_bounds() {
        let m = VectorMetric::Euclidean;
        let mut exact = build_sample_tree();
        exact.exact_radii(&m);
        let mut approx = exact.clone();
        let scale = RadiusScale { scale: 2.0, greedy_param: 1.0 };
        approx.approx_radii(&m, &scale).unwrap();

        for (idx, node) in approx.arena.iter() {
            let exact_radius = exact.node(idx).unwrap().radius;
            if node.is_leaf() {
                assert!((node.radius - 0.0).abs() < EPSILON);
            } else {
                // The covering term alone is never below the exact radius, and the
                // closed-form term is at least the center-to-right-child distance.
                assert!(node.radius >= 0.5 * exact_radius - EPSILON);
            }
        }
    }

    #[test]
    fn test_approx_radii_rejects_small_scale() {
        let mut tree = build_sample_tree();
        let scale = RadiusScale { scale: 1.0, greedy_param: 1.0 };
        assert!(matches!(
            tree.approx_radii(&VectorMetric::Euclidean, &scale),
            Err(GreedyError::MissingScaleParameters { .. })
        ));
    }

    #[test]
    fn test_display_lists_every_node() {
        let tree = build_sample_tree();
        let shown = tree.to_string();
        assert_eq!(shown.lines().count(), tree.num_nodes());
        assert!(shown.starts_with("[0.0, 0.0]"));
        // Children are drawn with termtree's branch markers.
        assert!(shown.lines().skip(1).all(|line| line.contains("── ")));
        assert_eq!(BallTree::<Vec<f64>>::empty().to_string(), "<empty>\n");
    }

    #[test]
    fn test_outline_nests_children_under_parents() {
        let tree = build_sample_tree();
        let outline = tree.outline().unwrap();
        assert_eq!(outline.leaves.len(), 2);
        assert!(outline.leaves.iter().all(|child| child.leaves.len() == 2));
        assert!(BallTree::<Vec<f64>>::empty().outline().is_none());
    }

    #[test]
    fn test_outline_of_a_deep_chain() {
        // Attaching under the newest leaf again and again gives a path of depth 500.
        let mut tree = BallTree::singleton(pt(0.0, 0.0));
        let mut slot = tree.root().unwrap();
        for i in 1..500 {
            let (_, right) = tree.attach(slot, pt(i as f64, 0.0)).unwrap();
            slot = right;
        }
        tree.count();
        assert_eq!(tree.to_string().lines().count(), tree.num_nodes());
    }

    #[test]
    fn test_leftmost_leaf_shares_the_center() {
        let tree = build_sample_tree();
        let root = tree.root().unwrap();
        let leaf = tree.leftmost_leaf(root);
        assert!(tree.node(leaf).unwrap().is_leaf());
        assert_eq!(tree.node(leaf).unwrap().center, tree.root_node().unwrap().center);
        let below: Vec<Index> = tree.leaf_nodes_below(root).collect();
        assert_eq!(below.len(), 4);
        assert_eq!(below[0], leaf);
    }
}
