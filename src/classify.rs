// classify.rs

use crate::labels::OTHER;
use crate::stats::{PopulationStats, PopulationStatsSet};
use crate::table::{Sample, SampleTable};
use log::{debug, info, warn};
use ndarray::ArrayView1;
use std::fmt;

/// Inferred population given to every non-study row.
pub const REF: &str = "REF";
pub const DEFAULT_MAHALANOBIS_THRESHOLD: f64 = 6.0;
pub const DEFAULT_SD_MULTIPLIER: f64 = 4.0;

/// How study samples are split into ancestry cohorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SplitMethod {
    /// Plot only, no classification.
    None,
    /// Nearest population by Mahalanobis distance, below a fixed threshold.
    Mahalanobis,
    /// First population whose mean +/- k*SD box contains all classification PCs.
    Sd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassificationPolicy {
    Mahalanobis { threshold: f64 },
    StandardDeviation { multiplier: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub method: SplitMethod,
    pub mahalanobis_threshold: f64,
    pub sd_multiplier: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            method: SplitMethod::None,
            mahalanobis_threshold: DEFAULT_MAHALANOBIS_THRESHOLD,
            sd_multiplier: DEFAULT_SD_MULTIPLIER,
        }
    }
}

impl ClassifierConfig {
    /// The policy to run, or `None` when the run only plots.
    pub fn policy(&self) -> Option<ClassificationPolicy> {
        match self.method {
            SplitMethod::None => None,
            SplitMethod::Mahalanobis => Some(ClassificationPolicy::Mahalanobis {
                threshold: self.mahalanobis_threshold,
            }),
            SplitMethod::Sd => Some(ClassificationPolicy::StandardDeviation {
                multiplier: self.sd_multiplier,
            }),
        }
    }
}

/// Terminal ancestry state of one sample after a classification pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InferredPopulation {
    Reference,
    Population(String),
    Other,
}

impl InferredPopulation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Reference => REF,
            Self::Population(name) => name,
            Self::Other => OTHER,
        }
    }
}

impl fmt::Display for InferredPopulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Covariance-normalised distance from `x` to the population mean.
pub fn mahalanobis_distance(x: ArrayView1<'_, f64>, stats: &PopulationStats) -> f64 {
    let delta = &x - &stats.mean;
    delta.dot(&stats.inv_cov.dot(&delta)).sqrt()
}

fn assign_mahalanobis(
    x: ArrayView1<'_, f64>,
    populations: &PopulationStatsSet,
    threshold: f64,
) -> InferredPopulation {
    let mut min_dist = f64::INFINITY;
    let mut min_pop: Option<&str> = None;
    for stats in populations.iter() {
        let dist = mahalanobis_distance(x, stats);
        if dist < min_dist {
            min_dist = dist;
            min_pop = Some(&stats.group);
        }
    }
    match min_pop {
        Some(pop) if min_dist < threshold => InferredPopulation::Population(pop.to_string()),
        _ => InferredPopulation::Other,
    }
}

fn within_sd_box(x: ArrayView1<'_, f64>, stats: &PopulationStats, multiplier: f64) -> bool {
    x.iter()
        .zip(stats.mean.iter().zip(stats.std.iter()))
        .all(|(&val, (&mean, &std))| {
            mean - multiplier * std < val && val < mean + multiplier * std
        })
}

fn assign_sd(
    x: ArrayView1<'_, f64>,
    populations: &PopulationStatsSet,
    multiplier: f64,
) -> InferredPopulation {
    populations
        .iter()
        .find(|stats| within_sd_box(x, stats, multiplier))
        .map_or(InferredPopulation::Other, |stats| {
            InferredPopulation::Population(stats.group.clone())
        })
}

/// Classifies one sample. Reference rows are always `REF`; study rows with a missing
/// classification PC are `OTHER` under either policy.
pub fn classify_sample(
    sample: &Sample,
    populations: &PopulationStatsSet,
    policy: ClassificationPolicy,
) -> InferredPopulation {
    if !sample.is_study() {
        return InferredPopulation::Reference;
    }
    if !sample.has_finite_classification_pcs() {
        debug!(
            "Sample {} has non-finite classification PCs; assigning {}.",
            sample.id.iid, OTHER
        );
        return InferredPopulation::Other;
    }
    let x = sample.classification_pcs();
    match policy {
        ClassificationPolicy::Mahalanobis { threshold } => {
            assign_mahalanobis(x, populations, threshold)
        }
        ClassificationPolicy::StandardDeviation { multiplier } => {
            assign_sd(x, populations, multiplier)
        }
    }
}

/// Classifies every row of `table`, returning assignments in row order.
pub fn classify_table(
    table: &SampleTable,
    populations: &PopulationStatsSet,
    policy: ClassificationPolicy,
) -> Vec<InferredPopulation> {
    info!(
        "Classifying {} study samples against {} population(s) with {:?}.",
        table.study_count(),
        populations.len(),
        policy
    );
    let non_finite = table
        .samples()
        .iter()
        .filter(|s| s.is_study() && !s.has_finite_classification_pcs())
        .count();
    if non_finite > 0 {
        warn!(
            "{} study sample(s) have missing classification PCs and will be assigned {}.",
            non_finite, OTHER
        );
    }
    table
        .samples()
        .iter()
        .map(|sample| classify_sample(sample, populations, policy))
        .collect()
}
