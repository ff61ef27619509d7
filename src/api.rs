//! Python binding layer for tree distance calculations.
//!
//! Provides Python functions for comparing Newick strings.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::compare::{calculate_rf_distance, Distance, RfOptions};
use crate::distances::{build_bitset_snapshots, compute_pairwise_rf_bitset_parallel};
use crate::error::RfError;
use crate::newick::parse_newick;
use crate::tree::Tree;

fn to_py_err(e: RfError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Compute the Robinson-Foulds distance between two Newick strings.
///
/// Args:
///     tree1: First tree in Newick format, e.g. "((A,B),(C,D));"
///     tree2: Second tree in Newick format
///     rooted: Compare clusters of rooted trees instead of unrooted splits (default: False)
///     normalized: Scale the distance into [0, 1] (default: False)
///     weighted: Use branch lengths (default: False)
///
/// Returns:
///     An int for the plain RF distance, a float when normalized or weighted
///
/// Raises:
///     ValueError: If a tree is not valid Newick, repeats a taxon, or the
///     trees do not share the same taxa
#[pyfunction]
#[pyo3(name = "calculate_RF_distance", signature = (tree1, tree2, rooted=false, normalized=false, weighted=false))]
fn calculate_rf_distance_py(
    py: Python<'_>,
    tree1: &str,
    tree2: &str,
    rooted: bool,
    normalized: bool,
    weighted: bool,
) -> PyResult<Py<PyAny>> {
    let options = RfOptions::default()
        .with_rooted(rooted)
        .with_normalized(normalized)
        .with_weighted(weighted);

    match calculate_rf_distance(tree1, tree2, &options).map_err(to_py_err)? {
        Distance::Count(count) => Ok(count.into_pyobject(py)?.into_any().unbind()),
        Distance::Real(value) => Ok(value.into_pyobject(py)?.into_any().unbind()),
    }
}

/// Compute pairwise Robinson-Foulds distances for a list of Newick strings.
///
/// Args:
///     newicks: List of trees in Newick format, all over the same taxa
///     rooted: Compare clusters of rooted trees instead of unrooted splits (default: False)
///
/// Returns:
///     A 2D list of RF distances
///
/// Raises:
///     ValueError: If fewer than 2 trees are given, a tree cannot be parsed,
///     or trees have different leaf sets
#[pyfunction]
#[pyo3(signature = (newicks, rooted=false))]
fn pairwise_rf(newicks: Vec<String>, rooted: bool) -> PyResult<Vec<Vec<usize>>> {
    if newicks.len() < 2 {
        return Err(PyValueError::new_err(
            "Need at least 2 trees to compute pairwise distances",
        ));
    }

    let trees: Vec<Tree> = newicks
        .iter()
        .enumerate()
        .map(|(idx, newick)| {
            parse_newick(newick).map_err(|e| PyValueError::new_err(format!("Tree {idx}: {e}")))
        })
        .collect::<PyResult<_>>()?;

    let (_, snapshots) = build_bitset_snapshots(&trees, rooted).map_err(to_py_err)?;

    let n = snapshots.len();
    let mut matrix = vec![vec![0usize; n]; n];
    for (i, j, dist) in compute_pairwise_rf_bitset_parallel(&snapshots) {
        matrix[i][j] = dist;
        matrix[j][i] = dist;
    }

    Ok(matrix)
}

/// Python module definition
#[pymodule]
fn rf_tree_distance(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(calculate_rf_distance_py, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_rf, m)?)?;
    Ok(())
}
