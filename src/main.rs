// main.rs

mod classify;
mod error;
mod labels;
mod panel;
mod partition;
mod plot;
mod stats;
mod table;

// --- External Crate Imports ---
use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;
use env_logger;
use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use plot::{ColorBy, NoopPlotter, PlotSink, ScatterPlot, SvgPlotter};
use table::Sample;

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting pc_ancestry with args: {:?}", cli_args);

    match &cli_args.command {
        cli::Command::Classify(args) => run_classify(args)?,
        cli::Command::ExtendPanel(args) => run_extend_panel(args)?,
    }

    info!(
        "pc_ancestry finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

fn run_classify(args: &cli::ClassifyArgs) -> Result<()> {
    let config = args.classifier_config()?;

    // --- 1. Read PCA output and reference labels ---
    let eigenvec_path = PathBuf::from(format!("{}.eigenvec", args.pc_prefix));
    let eigenval_path = PathBuf::from(format!("{}.eigenval", args.pc_prefix));
    let (pca_rows, n_pcs) = table::read_eigenvec(&eigenvec_path)
        .with_context(|| format!("Failed to read eigenvectors from {}", eigenvec_path.display()))?;
    let eigenvalues = table::read_eigenval(&eigenval_path)
        .with_context(|| format!("Failed to read eigenvalues from {}", eigenval_path.display()))?;
    let reference_labels = table::read_reference_labels(&args.ref_label, &args.ref_label_col)
        .with_context(|| format!("Failed to read reference labels from {}", args.ref_label.display()))?;

    // --- 2. Merge into the sample table ---
    let mapper = labels::LabelMapper::continental(args.eur_aj_sep);
    debug!(
        "Base taxonomy groups: {:?}",
        mapper.base().group_names().collect::<Vec<_>>()
    );
    let sample_table = table::build_sample_table(pca_rows, n_pcs, &reference_labels, &mapper)?;
    if sample_table.is_empty() {
        return Err(anyhow!("No samples found in {}.", eigenvec_path.display()));
    }
    if sample_table.study_count() == 0 {
        warn!("Every sample in {} has a reference label; the study cohort is empty.", eigenvec_path.display());
    }
    info!("Samples per group and label:");
    for ((group, label), count) in sample_table.counts_by_group_and_label() {
        info!("  {}\t{}\t{}", group, label, count);
    }

    // --- 3. Whole-cohort figures ---
    output_writer::ensure_output_dir(&args.out_prefix)?;
    let mut plotter: Box<dyn PlotSink> = if args.no_plots {
        Box::new(NoopPlotter)
    } else {
        Box::new(SvgPlotter::default())
    };
    plotter.scree(
        &eigenvalues,
        &output_writer::output_path(&args.out_prefix, "screeplot.svg"),
    )?;
    let all_samples: Vec<&Sample> = sample_table.samples().iter().collect();
    for (title, color_by) in [("Whole_group", ColorBy::Group), ("Whole_ancestry", ColorBy::Label)] {
        let figure = ScatterPlot::from_samples(title, &all_samples, color_by, 1, 2);
        plotter.scatter(&figure, &output_writer::scatter_path(&args.out_prefix, &figure))?;
    }

    // --- 4. Infer ancestry ---
    let Some(policy) = config.policy() else {
        info!("Split method is 'none'; skipping ancestry inference.");
        return Ok(());
    };
    let populations = stats::build_population_stats(&sample_table)?;
    if populations.is_empty() {
        warn!("No reference population has enough samples; every study sample will be OTHER.");
    }
    let assignments = classify::classify_table(&sample_table, &populations, policy);

    let mut inferred_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for inferred in &assignments {
        *inferred_counts.entry(inferred.as_str()).or_insert(0) += 1;
    }
    info!("Inferred population counts (all rows): {:?}", inferred_counts);

    // --- 5. Partition and write cohorts ---
    let cohorts = partition::partition(&sample_table, &assignments)?;
    output_writer::write_classified_table(&args.out_prefix, &cohorts, n_pcs)?;
    for cohort in &cohorts.cohorts {
        output_writer::write_cohort_list(&args.out_prefix, cohort)?;
        if !cohort.has_reference_group() {
            continue;
        }
        let population = cohort.population.as_str();
        let rows = partition::comparison_rows(&sample_table, &assignments, population)?;
        for y_pc in [2, 3] {
            let figure = ScatterPlot::from_samples(population, &rows, ColorBy::Label, 1, y_pc);
            plotter.scatter(&figure, &output_writer::scatter_path(&args.out_prefix, &figure))?;
        }
    }
    #[cfg(feature = "counts-json")]
    output_writer::write_counts_json(&args.out_prefix, &cohorts)?;

    Ok(())
}

fn run_extend_panel(args: &cli::ExtendPanelArgs) -> Result<()> {
    let reference_labels = table::read_reference_labels(&args.ref_label, &args.ref_label_col)
        .with_context(|| format!("Failed to read reference labels from {}", args.ref_label.display()))?;
    let extra_ids = panel::read_id_list(&args.extra_list)
        .with_context(|| format!("Failed to read sample list {}", args.extra_list.display()))?;

    let mapper = labels::LabelMapper::continental(false);
    let extension = panel::PanelExtension {
        extra_label: args.extra_label.clone(),
        extra_group: args.extra_group.clone(),
        keep_group: args.keep_group.clone(),
    };
    let reference = panel::reference_entries(&reference_labels, &mapper);
    let merged = panel::extend_panel(reference, extra_ids, &extension);
    if merged.is_empty() {
        return Err(anyhow!(
            "No samples belong to group '{}' after extending the panel.",
            args.keep_group
        ));
    }
    for (label, count) in panel::label_counts(&merged) {
        info!("  {}\t{}", label, count);
    }

    output_writer::ensure_output_dir(&args.out)?;
    output_writer::write_panel(&args.out, &merged)?;
    info!(
        "Extended panel: {} samples in group '{}'.",
        merged.len(),
        args.keep_group
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use crate::classify::{
        ClassifierConfig, SplitMethod, DEFAULT_MAHALANOBIS_THRESHOLD, DEFAULT_SD_MULTIPLIER,
    };
    use anyhow::{anyhow, Result};
    use clap::{Args, Parser, Subcommand};
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Genetic ancestry inference from precomputed principal components.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        #[arg(long, default_value = "Info", global = true)]
        pub(crate) log_level: String,

        #[command(subcommand)]
        pub(crate) command: Command,
    }

    #[derive(Subcommand, Debug)]
    pub(crate) enum Command {
        /// Plot PCs against the reference panel and split study samples by inferred ancestry
        Classify(ClassifyArgs),
        /// Fold an extra sample list into one group of the reference panel
        ExtendPanel(ExtendPanelArgs),
    }

    #[derive(Args, Debug)]
    pub(crate) struct ClassifyArgs {
        /// Prefix of the PCA output (<prefix>.eigenvec, <prefix>.eigenval)
        #[arg(long, required = true)]
        pub(crate) pc_prefix: String,

        /// Population label file for the reference panel
        #[arg(long, default_value = "all_hg38_filtered_chrpos_pop.txt")]
        pub(crate) ref_label: PathBuf,

        /// Population label column for the reference panel
        #[arg(long, required = true)]
        pub(crate) ref_label_col: String,

        #[arg(long, default_value = "genetic_ancestry")]
        pub(crate) out_prefix: String,

        #[arg(long, value_enum, default_value_t = SplitMethod::None)]
        pub(crate) split_method: SplitMethod,

        /// Split EUR into EUR-AJ and EUR-nonAJ
        #[arg(long)]
        pub(crate) eur_aj_sep: bool,

        /// Maximum Mahalanobis distance for an assignment
        #[arg(long, default_value_t = DEFAULT_MAHALANOBIS_THRESHOLD)]
        pub(crate) threshold: f64,

        /// Half-width of the per-axis box, in standard deviations
        #[arg(long, default_value_t = DEFAULT_SD_MULTIPLIER)]
        pub(crate) sd_multiplier: f64,

        #[arg(long)]
        pub(crate) no_plots: bool,
    }

    impl ClassifyArgs {
        pub(crate) fn classifier_config(&self) -> Result<ClassifierConfig> {
            if !(self.threshold.is_finite() && self.threshold > 0.0) {
                return Err(anyhow!("--threshold must be a positive number, got {}", self.threshold));
            }
            if !(self.sd_multiplier.is_finite() && self.sd_multiplier > 0.0) {
                return Err(anyhow!(
                    "--sd-multiplier must be a positive number, got {}",
                    self.sd_multiplier
                ));
            }
            Ok(ClassifierConfig {
                method: self.split_method,
                mahalanobis_threshold: self.threshold,
                sd_multiplier: self.sd_multiplier,
            })
        }
    }

    #[derive(Args, Debug)]
    pub(crate) struct ExtendPanelArgs {
        #[arg(long, default_value = "all_hg38_filtered_chrpos_pop.txt")]
        pub(crate) ref_label: PathBuf,

        #[arg(long, default_value = "Population")]
        pub(crate) ref_label_col: String,

        /// Headerless FID/IID list to add, e.g. a <prefix>_EUR.list from `classify`
        #[arg(long, required = true)]
        pub(crate) extra_list: PathBuf,

        #[arg(long, default_value = "AJ")]
        pub(crate) extra_label: String,

        #[arg(long, default_value = "EUR")]
        pub(crate) extra_group: String,

        #[arg(long, default_value = "EUR")]
        pub(crate) keep_group: String,

        /// Output prefix (<out>.list, <out>_label.list)
        #[arg(long, required = true)]
        pub(crate) out: String,
    }
}

mod output_writer {
    use super::{anyhow, info, BufWriter, File, Path, PathBuf, Result, Write};
    use crate::panel::PanelEntry;
    use crate::partition::{Cohort, Partition};
    use crate::plot::ScatterPlot;
    use crate::table::OUTPUT_PCS;

    pub(crate) fn output_path(prefix: &str, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}_{}", prefix, suffix))
    }

    pub(crate) fn scatter_path(prefix: &str, figure: &ScatterPlot<'_>) -> PathBuf {
        output_path(
            prefix,
            &format!("{}_PC{}xPC{}.svg", figure.title, figure.x_pc, figure.y_pc),
        )
    }

    pub(crate) fn ensure_output_dir(prefix: &str) -> Result<()> {
        let output_prefix_path = PathBuf::from(prefix);
        if let Some(parent) = output_prefix_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow!("Failed to create output directory {}: {}", parent.display(), e)
                })?;
                info!("Created output directory: {}", parent.display());
            }
        }
        Ok(())
    }

    fn create_output_file(path: &Path) -> Result<BufWriter<File>> {
        File::create(path)
            .map(BufWriter::new)
            .map_err(|e| anyhow!("Failed to create output file {}: {}", path.display(), e))
    }

    fn format_pc(value: f64) -> String {
        if value.is_finite() {
            value.to_string()
        } else {
            String::new()
        }
    }

    /// `#FID,IID,InfPop,PC1..` for every non-REF row, up to the first ten PCs.
    pub(crate) fn write_classified_table(
        prefix: &str,
        partition: &Partition<'_>,
        n_pcs: usize,
    ) -> Result<()> {
        let path = output_path(prefix, "all_pca.csv");
        let n_out = n_pcs.min(OUTPUT_PCS);
        let mut writer = csv::Writer::from_writer(create_output_file(&path)?);

        let mut header = vec!["#FID".to_string(), "IID".to_string(), "InfPop".to_string()];
        header.extend((1..=n_out).map(|k| format!("PC{}", k)));
        writer.write_record(&header)?;

        for (sample, inferred) in &partition.classified {
            let mut record = vec![
                sample.id.fid.clone(),
                sample.id.iid.clone(),
                inferred.to_string(),
            ];
            record.extend(sample.pcs.iter().take(n_out).map(|v| format_pc(*v)));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        info!(
            "Wrote {} classified samples to {}",
            partition.classified.len(),
            path.display()
        );
        Ok(())
    }

    /// Tab-separated `FID IID` list without a header.
    pub(crate) fn write_cohort_list(prefix: &str, cohort: &Cohort<'_>) -> Result<()> {
        let path = output_path(prefix, &format!("{}.list", cohort.population));
        let mut writer = create_output_file(&path)?;
        for id in &cohort.members {
            writeln!(writer, "{}\t{}", id.fid, id.iid)?;
        }
        writer.flush()?;
        info!(
            "{} {} list saved to {}",
            cohort.population,
            cohort.count(),
            path.display()
        );
        Ok(())
    }

    /// `<out>.list` (FID IID) and `<out>_label.list` (#FID IID label, with header).
    pub(crate) fn write_panel(out: &str, entries: &[PanelEntry]) -> Result<()> {
        let list_path = PathBuf::from(format!("{}.list", out));
        let mut list_writer = create_output_file(&list_path)?;
        for entry in entries {
            writeln!(list_writer, "{}\t{}", entry.id.fid, entry.id.iid)?;
        }
        list_writer.flush()?;
        info!("Saved panel list to {}", list_path.display());

        let label_path = PathBuf::from(format!("{}_label.list", out));
        let mut label_writer = create_output_file(&label_path)?;
        writeln!(label_writer, "#FID\tIID\tlabel")?;
        for entry in entries {
            writeln!(
                label_writer,
                "{}\t{}\t{}",
                entry.id.fid, entry.id.iid, entry.label
            )?;
        }
        label_writer.flush()?;
        info!("Saved panel labels to {}", label_path.display());
        Ok(())
    }

    #[cfg(feature = "counts-json")]
    pub(crate) fn write_counts_json(prefix: &str, partition: &Partition<'_>) -> Result<()> {
        let path = output_path(prefix, "counts.json");
        let counts: serde_json::Map<String, serde_json::Value> = partition
            .counts()
            .into_iter()
            .map(|(population, n)| (population.to_string(), serde_json::Value::from(n)))
            .collect();
        serde_json::to_writer_pretty(create_output_file(&path)?, &counts)?;
        info!("Wrote population counts to {}", path.display());
        Ok(())
    }
}
