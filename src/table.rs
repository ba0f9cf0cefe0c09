// table.rs

use crate::error::{AncestryError, Result};
use crate::labels::LabelMapper;
use log::{debug, info, warn};
use ndarray::{s, Array1, ArrayView1};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Label and group given to samples without a reference label.
pub const STUDY: &str = "Study";
/// Label given to reference rows whose label column is empty or NA.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";
/// Leading PCs used for classification.
pub const CLASSIFICATION_PCS: usize = 5;
/// Leading PCs carried into the per-sample output table.
pub const OUTPUT_PCS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId {
    pub fid: String,
    pub iid: String,
}

impl SampleId {
    pub fn new(fid: impl Into<String>, iid: impl Into<String>) -> Self {
        Self {
            fid: fid.into(),
            iid: iid.into(),
        }
    }
}

/// Where a sample came from: the study cohort, or the labeled reference panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Study,
    Reference { label: String, group: String },
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub id: SampleId,
    pub pcs: Array1<f64>,
    pub origin: Origin,
}

impl Sample {
    pub fn is_study(&self) -> bool {
        matches!(self.origin, Origin::Study)
    }

    /// Raw population code, or `Study`.
    pub fn label(&self) -> &str {
        match &self.origin {
            Origin::Study => STUDY,
            Origin::Reference { label, .. } => label,
        }
    }

    /// Coarse (or fine-split) group, or `Study`.
    pub fn group(&self) -> &str {
        match &self.origin {
            Origin::Study => STUDY,
            Origin::Reference { group, .. } => group,
        }
    }

    /// PC value by 0-based axis index.
    pub fn pc(&self, axis: usize) -> Option<f64> {
        self.pcs.get(axis).copied()
    }

    pub fn classification_pcs(&self) -> ArrayView1<'_, f64> {
        self.pcs.slice(s![..CLASSIFICATION_PCS])
    }

    /// True when every classification PC is a finite number.
    pub fn has_finite_classification_pcs(&self) -> bool {
        self.classification_pcs().iter().all(|v| v.is_finite())
    }
}

/// Samples merged with their reference labels, in eigenvec row order.
#[derive(Debug, Clone)]
pub struct SampleTable {
    samples: Vec<Sample>,
    n_pcs: usize,
}

impl SampleTable {
    pub fn new(samples: Vec<Sample>, n_pcs: usize) -> Result<Self> {
        if n_pcs < CLASSIFICATION_PCS {
            return Err(AncestryError::invalid_input(format!(
                "At least {} principal components are required, found {}.",
                CLASSIFICATION_PCS, n_pcs
            )));
        }
        if let Some(bad) = samples.iter().find(|s| s.pcs.len() != n_pcs) {
            return Err(AncestryError::invalid_input(format!(
                "Sample {} has {} PCs, expected {}.",
                bad.id.iid,
                bad.pcs.len(),
                n_pcs
            )));
        }
        Ok(Self { samples, n_pcs })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn n_pcs(&self) -> usize {
        self.n_pcs
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn study_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_study()).count()
    }

    /// Distinct non-study groups in order of first appearance.
    pub fn reference_groups(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.samples
            .iter()
            .filter(|s| !s.is_study())
            .map(Sample::group)
            .filter(|g| seen.insert(*g))
            .collect()
    }

    /// Row counts per (group, label), the same breakdown the reference summary logs.
    pub fn counts_by_group_and_label(&self) -> BTreeMap<(String, String), usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts
                .entry((sample.group().to_string(), sample.label().to_string()))
                .or_insert(0) += 1;
        }
        counts
    }
}

/// One row of a PCA eigenvector file.
#[derive(Debug, Clone)]
pub struct PcaRow {
    pub id: SampleId,
    pub pcs: Array1<f64>,
}

fn parse_pc_value(token: &str) -> Option<f64> {
    if token.eq_ignore_ascii_case("na") || token.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    token.parse::<f64>().ok()
}

fn find_column(header: &[&str], names: &[&str]) -> Option<usize> {
    header.iter().position(|h| names.contains(h))
}

/// Reads a whitespace-delimited eigenvector file (`#FID IID PC1 .. PCk`).
///
/// The FID column is optional and defaults to `0`. `NA`/`nan` PC values become NaN,
/// anything else that is not a number is a parse error. Returns the rows and `k`.
pub fn read_eigenvec(path: &Path) -> Result<(Vec<PcaRow>, usize)> {
    info!("Reading eigenvectors from {}", path.display());
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines().enumerate();

    let header_line = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => {
                return Err(AncestryError::invalid_input(format!(
                    "Eigenvector file {} is empty.",
                    path.display()
                )))
            }
        }
    };
    let header: Vec<&str> = header_line.split_whitespace().collect();
    let iid_idx = find_column(&header, &["IID", "#IID"])
        .ok_or_else(|| AncestryError::missing_column(path, "IID"))?;
    let fid_idx = find_column(&header, &["#FID", "FID"]);
    let pc_indices: Vec<usize> = (1..)
        .map(|k| format!("PC{}", k))
        .map_while(|name| header.iter().position(|h| *h == name))
        .collect();
    let n_pcs = pc_indices.len();
    if n_pcs < CLASSIFICATION_PCS {
        return Err(AncestryError::invalid_input(format!(
            "Eigenvector file {} has {} PC columns; at least {} are required.",
            path.display(),
            n_pcs,
            CLASSIFICATION_PCS
        )));
    }
    debug!(
        "Eigenvector header: IID column {}, FID column {:?}, {} PCs.",
        iid_idx, fid_idx, n_pcs
    );

    let mut rows = Vec::new();
    let mut seen_iids = HashSet::new();
    for (line_idx, line) in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_num = line_idx + 1;
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != header.len() {
            return Err(AncestryError::parse(
                path,
                line_num,
                format!("expected {} fields, found {}", header.len(), fields.len()),
            ));
        }
        let iid = fields[iid_idx].to_string();
        if !seen_iids.insert(iid.clone()) {
            return Err(AncestryError::parse(
                path,
                line_num,
                format!("duplicate IID '{}'", iid),
            ));
        }
        let fid = fid_idx.map_or_else(|| "0".to_string(), |idx| fields[idx].to_string());
        let pcs = pc_indices
            .iter()
            .map(|&idx| {
                parse_pc_value(fields[idx]).ok_or_else(|| {
                    AncestryError::parse(
                        path,
                        line_num,
                        format!("non-numeric PC value '{}'", fields[idx]),
                    )
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(PcaRow {
            id: SampleId::new(fid, iid),
            pcs: Array1::from_vec(pcs),
        });
    }
    info!("Read {} samples with {} PCs.", rows.len(), n_pcs);
    Ok((rows, n_pcs))
}

/// Reads a headerless eigenvalue file, one value per line.
pub fn read_eigenval(path: &Path) -> Result<Vec<f64>> {
    let file = File::open(path)?;
    let mut values = Vec::new();
    for (line_idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = trimmed.parse::<f64>().map_err(|e| {
            AncestryError::parse(path, line_idx + 1, format!("'{}': {}", trimmed, e))
        })?;
        values.push(value);
    }
    debug!("Read {} eigenvalues from {}", values.len(), path.display());
    Ok(values)
}

/// Reads `(IID, label)` pairs from a tab-separated reference label file with a header.
///
/// Empty or NA labels become `UNKNOWN`. The first row wins for a repeated IID.
pub fn read_reference_labels(path: &Path, label_col: &str) -> Result<Vec<(String, String)>> {
    info!(
        "Reading reference labels from {} (column '{}')",
        path.display(),
        label_col
    );
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let iid_idx = headers
        .iter()
        .position(|h| h == "IID")
        .ok_or_else(|| AncestryError::missing_column(path, "IID"))?;
    let label_idx = headers
        .iter()
        .position(|h| h == label_col)
        .ok_or_else(|| AncestryError::missing_column(path, label_col))?;

    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates = 0usize;
    for record in reader.records() {
        let record = record?;
        let iid = match record.get(iid_idx).map(str::trim) {
            Some(iid) if !iid.is_empty() => iid.to_string(),
            _ => continue,
        };
        let label = match record.get(label_idx).map(str::trim) {
            Some(l) if !l.is_empty() && !l.eq_ignore_ascii_case("na") => l.to_string(),
            _ => UNKNOWN_LABEL.to_string(),
        };
        if !seen.insert(iid.clone()) {
            duplicates += 1;
            continue;
        }
        labels.push((iid, label));
    }
    if duplicates > 0 {
        warn!(
            "{} duplicate IID rows in {} ignored; the first occurrence was kept.",
            duplicates,
            path.display()
        );
    }
    info!("Read {} reference labels.", labels.len());
    Ok(labels)
}

/// Left-joins PCA rows with reference labels on IID.
///
/// Rows without a label form the study cohort.
pub fn build_sample_table(
    pca_rows: Vec<PcaRow>,
    n_pcs: usize,
    labels: &[(String, String)],
    mapper: &LabelMapper,
) -> Result<SampleTable> {
    let label_by_iid: HashMap<&str, &str> = labels
        .iter()
        .map(|(iid, label)| (iid.as_str(), label.as_str()))
        .collect();

    let samples: Vec<Sample> = pca_rows
        .into_iter()
        .map(|row| {
            let origin = match label_by_iid.get(row.id.iid.as_str()) {
                Some(&label) => Origin::Reference {
                    label: label.to_string(),
                    group: mapper.group_for(label).to_string(),
                },
                None => Origin::Study,
            };
            Sample {
                id: row.id,
                pcs: row.pcs,
                origin,
            }
        })
        .collect();

    let table = SampleTable::new(samples, n_pcs)?;
    info!(
        "Sample table: {} samples ({} study, {} reference).",
        table.len(),
        table.study_count(),
        table.len() - table.study_count()
    );
    Ok(table)
}
