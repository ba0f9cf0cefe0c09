// stats.rs

use crate::error::{AncestryError, Result};
use crate::labels::OTHER;
use crate::table::{Sample, SampleTable, CLASSIFICATION_PCS};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_linalg::{Determinant, Inverse};
use statrs::statistics::Statistics;

/// Added to every covariance diagonal entry when the determinant is exactly zero.
pub const RIDGE: f64 = 1e-6;

/// Distribution of one reference population over the classification PCs.
#[derive(Debug, Clone)]
pub struct PopulationStats {
    pub group: String,
    pub n_samples: usize,
    pub mean: Array1<f64>,
    pub cov: Array2<f64>,
    pub inv_cov: Array2<f64>,
    pub std: Array1<f64>,
    /// Whether the ridge was added to `cov` before inversion.
    pub regularized: bool,
}

/// Per-population statistics in a fixed iteration order.
#[derive(Debug, Clone, Default)]
pub struct PopulationStatsSet {
    stats: Vec<PopulationStats>,
}

impl PopulationStatsSet {
    pub fn new(stats: Vec<PopulationStats>) -> Self {
        Self { stats }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PopulationStats> {
        self.stats.iter()
    }

    pub fn get(&self, group: &str) -> Option<&PopulationStats> {
        self.stats.iter().find(|s| s.group == group)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

fn add_ridge(cov: &mut Array2<f64>) {
    cov.diag_mut().mapv_inplace(|v| v + RIDGE);
}

/// Mean, unbiased standard deviation, covariance and inverse covariance of `data`
/// (samples as rows, PCs as columns).
///
/// A covariance with a determinant of exactly zero gets [`RIDGE`] on its diagonal. If
/// LAPACK still rejects an unregularised matrix as singular, the ridge is applied and the
/// inversion retried once.
pub fn compute_group_stats(group: &str, data: ArrayView2<'_, f64>) -> Result<PopulationStats> {
    let n_samples = data.nrows();
    if n_samples < 2 {
        return Err(AncestryError::invalid_input(format!(
            "Population '{}' needs at least 2 samples for a covariance, found {}.",
            group, n_samples
        )));
    }

    let mean: Array1<f64> = data.axis_iter(Axis(1)).map(|col| col.iter().mean()).collect();
    let std: Array1<f64> = data
        .axis_iter(Axis(1))
        .map(|col| col.iter().std_dev())
        .collect();

    let centered = &data - &mean;
    let mut cov = centered.t().dot(&centered) / (n_samples - 1) as f64;

    let det = cov
        .det()
        .map_err(|e| AncestryError::linalg(group, e.to_string()))?;
    let mut regularized = false;
    if det == 0.0 {
        warn!(
            "Covariance for population '{}' is singular; adding {:e} to the diagonal.",
            group, RIDGE
        );
        add_ridge(&mut cov);
        regularized = true;
    }

    let inv_cov = match cov.inv() {
        Ok(inv) if inv.iter().all(|v| v.is_finite()) => inv,
        Ok(_) | Err(_) if !regularized => {
            warn!(
                "Covariance for population '{}' (det={:e}) could not be inverted; adding {:e} to the diagonal.",
                group, det, RIDGE
            );
            add_ridge(&mut cov);
            regularized = true;
            cov.inv()
                .map_err(|e| AncestryError::linalg(group, e.to_string()))?
        }
        Ok(_) => {
            return Err(AncestryError::linalg(
                group,
                "inverse covariance has non-finite entries",
            ))
        }
        Err(e) => return Err(AncestryError::linalg(group, e.to_string())),
    };

    debug!(
        "Population '{}': n={}, mean={:?}, std={:?}",
        group, n_samples, mean, std
    );

    Ok(PopulationStats {
        group: group.to_string(),
        n_samples,
        mean,
        cov,
        inv_cov,
        std,
        regularized,
    })
}

fn classification_matrix(samples: &[&Sample]) -> Result<Array2<f64>> {
    let flat: Vec<f64> = samples
        .iter()
        .flat_map(|s| s.classification_pcs().to_vec())
        .collect();
    Array2::from_shape_vec((samples.len(), CLASSIFICATION_PCS), flat)
        .map_err(|e| AncestryError::invalid_input(e.to_string()))
}

/// Builds statistics for every reference group present in `table`.
///
/// Study rows and the `OTHER` group never contribute. Groups are visited in order of first
/// appearance, which fixes the classifier's iteration order. Reference rows with a
/// non-finite classification PC are left out, and groups left with fewer than two rows
/// are skipped.
pub fn build_population_stats(table: &SampleTable) -> Result<PopulationStatsSet> {
    let mut stats = Vec::new();
    for group in table.reference_groups() {
        if group == OTHER {
            debug!("Skipping reference rows with unmapped labels (group {}).", OTHER);
            continue;
        }
        let members: Vec<&Sample> = table
            .samples()
            .iter()
            .filter(|s| !s.is_study() && s.group() == group)
            .collect();
        let usable: Vec<&Sample> = members
            .iter()
            .copied()
            .filter(|s| s.has_finite_classification_pcs())
            .collect();
        if usable.len() < members.len() {
            warn!(
                "Population '{}': {} reference sample(s) with missing PC values excluded.",
                group,
                members.len() - usable.len()
            );
        }
        if usable.len() < 2 {
            warn!(
                "Population '{}' has {} usable reference sample(s); it will not be used for classification.",
                group,
                usable.len()
            );
            continue;
        }
        let data = classification_matrix(&usable)?;
        let group_stats = compute_group_stats(group, data.view())?;
        info!(
            "Population '{}': {} reference samples{}",
            group_stats.group,
            group_stats.n_samples,
            if group_stats.regularized { " (regularized covariance)" } else { "" }
        );
        stats.push(group_stats);
    }
    info!(
        "Built statistics for {} reference population(s): {:?}",
        stats.len(),
        stats.iter().map(|s| s.group.as_str()).collect::<Vec<_>>()
    );
    Ok(PopulationStatsSet::new(stats))
}
