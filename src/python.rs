// Python bindings, built with `--features python`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::common_types::{DataPoint, VectorMetric, check_dimensions};
use crate::error::GreedyError;
use crate::fvm::greedy::{greedy_permutation as permute, greedy_tree_from_points};
use crate::fvm::params::TreeParameters;

impl From<GreedyError> for PyErr {
    fn from(err: GreedyError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

fn parse_metric(name: &str, p: u32) -> PyResult<VectorMetric> {
    match name.to_ascii_lowercase().as_str() {
        "euclidean" => Ok(VectorMetric::Euclidean),
        "manhattan" => Ok(VectorMetric::Manhattan),
        "chebyshev" => Ok(VectorMetric::Chebyshev),
        "minkowski" => Ok(VectorMetric::Minkowski { p }),
        other => Err(PyValueError::new_err(format!("unknown metric '{other}'"))),
    }
}

// Points are labeled with their input position so the order can be reported as indices.
fn labeled(points: Vec<Vec<f64>>) -> PyResult<Vec<DataPoint<f64, usize>>> {
    check_dimensions(&points)?;
    Ok(points
        .into_iter()
        .enumerate()
        .map(|(i, features)| DataPoint::new(features, i))
        .collect())
}

/// Greedy permutation of `points` as `(index, predecessor_index)` pairs,
/// `predecessor_index` being `None` for the first point.
#[pyfunction]
#[pyo3(signature = (points, move_const = 1.0, nbr_const = 1.0, tidy_const = 1.0, bucket_size = 1.0, metric = "euclidean", p = 2))]
#[allow(clippy::too_many_arguments)]
fn greedy_permutation_py(
    points: Vec<Vec<f64>>,
    move_const: f64,
    nbr_const: f64,
    tidy_const: f64,
    bucket_size: f64,
    metric: &str,
    p: u32,
) -> PyResult<Vec<(usize, Option<usize>)>> {
    let params = TreeParameters::from((move_const, nbr_const, tidy_const, bucket_size));
    let order = permute(labeled(points)?, params, parse_metric(metric, p)?)?;
    // Predecessors come back as positions in the permutation; map them to input indices.
    let labels: Vec<usize> = order.iter().map(|(point, _)| point.label).collect();
    Ok(order
        .iter()
        .map(|(point, pred)| (point.label, pred.map(|pos| labels[pos])))
        .collect())
}

/// Root radius and size of the greedy tree over `points`.
#[pyfunction]
#[pyo3(signature = (points, move_const = 1.0, nbr_const = 1.0, tidy_const = 1.0, bucket_size = 1.0, metric = "euclidean", p = 2))]
#[allow(clippy::too_many_arguments)]
fn greedy_tree_radii_py(
    points: Vec<Vec<f64>>,
    move_const: f64,
    nbr_const: f64,
    tidy_const: f64,
    bucket_size: f64,
    metric: &str,
    p: u32,
) -> PyResult<(f64, usize)> {
    let params = TreeParameters::from((move_const, nbr_const, tidy_const, bucket_size));
    let tree = greedy_tree_from_points(labeled(points)?, params, parse_metric(metric, p)?)?;
    Ok((tree.radius(), tree.len()))
}

/// The name of this function must match the `lib.name` in `Cargo.toml`.
#[pymodule]
fn greedy_permutation(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(greedy_permutation_py, m)?)?;
    m.add_function(wrap_pyfunction!(greedy_tree_radii_py, m)?)?;
    Ok(())
}

