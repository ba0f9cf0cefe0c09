// partition.rs

use crate::classify::InferredPopulation;
use crate::error::{AncestryError, Result};
use crate::table::{Sample, SampleId, SampleTable};
use log::info;

/// Study samples that share one inferred population.
#[derive(Debug, Clone)]
pub struct Cohort<'a> {
    pub population: InferredPopulation,
    pub members: Vec<&'a SampleId>,
}

impl Cohort<'_> {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// `OTHER` gets an identifier list but no comparison plots.
    pub fn has_reference_group(&self) -> bool {
        !matches!(self.population, InferredPopulation::Other)
    }
}

/// Classification results grouped for output.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    /// Every non-`REF` row with its assignment, in table order.
    pub classified: Vec<(&'a Sample, &'a InferredPopulation)>,
    /// One cohort per population observed among study samples, in order of first appearance.
    pub cohorts: Vec<Cohort<'a>>,
}

impl Partition<'_> {
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.cohorts
            .iter()
            .map(|c| (c.population.as_str(), c.count()))
            .collect()
    }
}

fn check_lengths(table: &SampleTable, assignments: &[InferredPopulation]) -> Result<()> {
    if table.len() != assignments.len() {
        return Err(AncestryError::invalid_input(format!(
            "{} assignments for {} samples.",
            assignments.len(),
            table.len()
        )));
    }
    Ok(())
}

/// Groups classified study samples by inferred population.
pub fn partition<'a>(
    table: &'a SampleTable,
    assignments: &'a [InferredPopulation],
) -> Result<Partition<'a>> {
    check_lengths(table, assignments)?;

    let classified: Vec<(&Sample, &InferredPopulation)> = table
        .samples()
        .iter()
        .zip(assignments)
        .filter(|(_, inferred)| **inferred != InferredPopulation::Reference)
        .collect();

    let mut cohorts: Vec<Cohort<'a>> = Vec::new();
    for (sample, inferred) in table.samples().iter().zip(assignments) {
        if !sample.is_study() {
            continue;
        }
        match cohorts.iter_mut().find(|c| c.population == *inferred) {
            Some(cohort) => cohort.members.push(&sample.id),
            None => cohorts.push(Cohort {
                population: inferred.clone(),
                members: vec![&sample.id],
            }),
        }
    }

    for cohort in &cohorts {
        info!("{}: {} study sample(s)", cohort.population, cohort.count());
    }
    Ok(Partition {
        classified,
        cohorts,
    })
}

/// Rows inferred as `population` together with the reference rows of the same-named group.
pub fn comparison_rows<'a>(
    table: &'a SampleTable,
    assignments: &[InferredPopulation],
    population: &str,
) -> Result<Vec<&'a Sample>> {
    check_lengths(table, assignments)?;
    Ok(table
        .samples()
        .iter()
        .zip(assignments)
        .filter(|(sample, inferred)| inferred.as_str() == population || sample.group() == population)
        .map(|(sample, _)| sample)
        .collect())
}
