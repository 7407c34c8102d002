//! This module contains the point and metric types shared by the tree and cell code.

use num_traits::{AsPrimitive, Float};

use crate::error::{GreedyError, Result};

/// A labeled point: coordinates plus an arbitrary payload.
///
/// - `F`: The type of the coordinates (e.g., `f64`, `f32`).
/// - `L`: The type of the label (e.g., an index into the caller's data).
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint<F, L> {
    pub features: Vec<F>,
    pub label: L,
}

impl<F, L> DataPoint<F, L> {
    pub fn new(features: Vec<F>, label: L) -> Self {
        DataPoint { features, label }
    }
}

/// The common dimension of `points`. Vector metrics zip coordinates, so a
/// ragged set would be compared on its shortest prefix.
pub fn check_dimensions<F>(points: &[Vec<F>]) -> Result<usize> {
    let dim = points.first().map(Vec::len).ok_or(GreedyError::EmptyInput)?;
    match points.iter().position(|p| p.len() != dim) {
        Some(index) => Err(GreedyError::DimensionMismatch {
            index,
            expected: dim,
            found: points[index].len(),
        }),
        None => Ok(dim),
    }
}

/// A metric on points of type `P`.
///
/// `distance` must be non-negative, symmetric and obey the triangle
/// inequality; the pruning in the tree and the move/stay rules of the cells
/// are only sound under those assumptions.
pub trait Metric<P: ?Sized> {
    fn distance(&self, a: &P, b: &P) -> f64;

    /// Returns true iff `p` is closer to `a` than to `b` with slack `alpha`,
    /// i.e. `alpha * d(p, a) <= d(p, b)`.
    fn closer(&self, p: &P, a: &P, b: &P, alpha: f64) -> bool {
        alpha * self.distance(p, a) <= self.distance(p, b)
    }
}

impl<P: ?Sized, M: Metric<P> + ?Sized> Metric<P> for &M {
    fn distance(&self, a: &P, b: &P) -> f64 {
        (**self).distance(a, b)
    }

    fn closer(&self, p: &P, a: &P, b: &P, alpha: f64) -> bool {
        (**self).closer(p, a, b, alpha)
    }
}

/// The usual metrics on coordinate vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorMetric {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
    Minkowski { p: u32 }, // p is the order; 0 is treated as 1
}

impl VectorMetric {
    pub fn between<F>(&self, a: &[F], b: &[F]) -> f64
    where
        F: Float + AsPrimitive<f64>,
    {
        let diffs = a.iter().zip(b.iter()).map(|(&x, &y)| (x - y).abs().as_());
        match *self {
            VectorMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            VectorMetric::Manhattan => diffs.sum(),
            VectorMetric::Chebyshev => diffs.fold(0.0, f64::max),
            VectorMetric::Minkowski { p } => {
                let p = p.max(1);
                let sum_of_powers: f64 = match i32::try_from(p) {
                    Ok(exp) => diffs.map(|d| d.powi(exp)).sum(),
                    Err(_) => diffs.map(|d| d.powf(p as f64)).sum(),
                };
                sum_of_powers.powf(1.0 / p as f64)
            }
        }
    }
}

impl<F> Metric<[F]> for VectorMetric
where
    F: Float + AsPrimitive<f64>,
{
    fn distance(&self, a: &[F], b: &[F]) -> f64 {
        self.between(a, b)
    }
}

impl<F> Metric<Vec<F>> for VectorMetric
where
    F: Float + AsPrimitive<f64>,
{
    fn distance(&self, a: &Vec<F>, b: &Vec<F>) -> f64 {
        self.between(a, b)
    }
}

impl<F, L> Metric<DataPoint<F, L>> for VectorMetric
where
    F: Float + AsPrimitive<f64>,
{
    fn distance(&self, a: &DataPoint<F, L>, b: &DataPoint<F, L>) -> f64 {
        self.between(&a.features, &b.features)
    }
}

/// Adapts a closure `Fn(&P, &P) -> f64` into a [`Metric`].
#[derive(Debug, Clone, Copy)]
pub struct FnMetric<D>(pub D);

impl<P: ?Sized, D> Metric<P> for FnMetric<D>
where
    D: Fn(&P, &P) -> f64,
{
    fn distance(&self, a: &P, b: &P) -> f64 {
        (self.0)(a, b)
    }
}
