// plot.rs
//
// Rendering lives behind `PlotSink` so the classification core never touches a drawing
// backend. The SVG sink uses plotters; `--no-plots` swaps in `NoopPlotter`.

use crate::error::{AncestryError, Result};
use crate::table::Sample;
use log::{debug, info};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

/// Which column colours the points of a scatter plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorBy {
    Group,
    Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPoint<'a> {
    pub label: &'a str,
    pub x: f64,
    pub y: f64,
    pub is_study: bool,
}

/// A PC scatter plot: study samples drawn solid, reference labels drawn translucent.
#[derive(Debug, Clone)]
pub struct ScatterPlot<'a> {
    pub title: String,
    /// 1-based PC numbers.
    pub x_pc: usize,
    pub y_pc: usize,
    pub points: Vec<ScatterPoint<'a>>,
}

impl<'a> ScatterPlot<'a> {
    /// Samples without a finite value on either axis are dropped.
    pub fn from_samples(
        title: impl Into<String>,
        samples: &[&'a Sample],
        color_by: ColorBy,
        x_pc: usize,
        y_pc: usize,
    ) -> Self {
        let points = samples
            .iter()
            .filter_map(|s| {
                let x = s.pc(x_pc.checked_sub(1)?)?;
                let y = s.pc(y_pc.checked_sub(1)?)?;
                if !x.is_finite() || !y.is_finite() {
                    return None;
                }
                let label = match color_by {
                    ColorBy::Group => s.group(),
                    ColorBy::Label => s.label(),
                };
                Some(ScatterPoint {
                    label,
                    x,
                    y,
                    is_study: s.is_study(),
                })
            })
            .collect();
        Self {
            title: title.into(),
            x_pc,
            y_pc,
            points,
        }
    }

    pub fn n_study(&self) -> usize {
        self.points.iter().filter(|p| p.is_study).count()
    }

    pub fn caption(&self) -> String {
        format!(
            "{},n={}:PC{}_vs_PC{}",
            self.title,
            self.n_study(),
            self.x_pc,
            self.y_pc
        )
    }

    /// Points grouped by label, labels in sorted order.
    pub fn series(&self) -> BTreeMap<&'a str, Vec<&ScatterPoint<'a>>> {
        let mut series: BTreeMap<&str, Vec<&ScatterPoint>> = BTreeMap::new();
        for point in &self.points {
            series.entry(point.label).or_default().push(point);
        }
        series
    }

    pub fn x_range(&self) -> Range<f64> {
        padded_range(self.points.iter().map(|p| p.x))
    }

    pub fn y_range(&self) -> Range<f64> {
        padded_range(self.points.iter().map(|p| p.y))
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return -1.0..1.0;
    }
    let span = max - min;
    if span <= 0.0 {
        return (min - 1.0)..(max + 1.0);
    }
    (min - 0.05 * span)..(max + 0.05 * span)
}

/// Destination for every figure a run produces.
pub trait PlotSink {
    fn scree(&mut self, eigenvalues: &[f64], path: &Path) -> Result<()>;
    fn scatter(&mut self, plot: &ScatterPlot<'_>, path: &Path) -> Result<()>;
}

/// Discards plots.
#[derive(Debug, Default)]
pub struct NoopPlotter;

impl PlotSink for NoopPlotter {
    fn scree(&mut self, _eigenvalues: &[f64], path: &Path) -> Result<()> {
        debug!("Plotting disabled, skipping {}", path.display());
        Ok(())
    }

    fn scatter(&mut self, _plot: &ScatterPlot<'_>, path: &Path) -> Result<()> {
        debug!("Plotting disabled, skipping {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub point_size: u32,
    pub reference_alpha: f64,
    pub palette: Vec<RGBColor>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            point_size: 3,
            reference_alpha: 0.35,
            // tab10
            palette: vec![
                RGBColor(31, 119, 180),
                RGBColor(255, 127, 14),
                RGBColor(44, 160, 44),
                RGBColor(214, 39, 40),
                RGBColor(148, 103, 189),
                RGBColor(140, 86, 75),
                RGBColor(227, 119, 194),
                RGBColor(127, 127, 127),
                RGBColor(188, 189, 34),
                RGBColor(23, 190, 207),
            ],
        }
    }
}

/// Writes SVG figures with plotters.
#[derive(Debug, Clone, Default)]
pub struct SvgPlotter {
    config: PlotConfig,
}

impl SvgPlotter {
    pub fn new(config: PlotConfig) -> Self {
        Self { config }
    }
}

fn plot_error(path: &Path, e: impl std::fmt::Display) -> AncestryError {
    AncestryError::Plot {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

impl PlotSink for SvgPlotter {
    fn scree(&mut self, eigenvalues: &[f64], path: &Path) -> Result<()> {
        if eigenvalues.is_empty() {
            info!("No eigenvalues to plot, skipping {}", path.display());
            return Ok(());
        }
        let root = SVGBackend::new(path, (self.config.width, self.config.height))
            .into_drawing_area();
        draw_scree_impl(&root, eigenvalues, &self.config).map_err(|e| plot_error(path, e))?;
        root.present().map_err(|e| plot_error(path, e))?;
        info!("Scree plot written to {}", path.display());
        Ok(())
    }

    fn scatter(&mut self, plot: &ScatterPlot<'_>, path: &Path) -> Result<()> {
        if plot.points.is_empty() {
            info!("No points to plot, skipping {}", path.display());
            return Ok(());
        }
        let root = SVGBackend::new(path, (self.config.width, self.config.height))
            .into_drawing_area();
        draw_scatter_impl(&root, plot, &self.config).map_err(|e| plot_error(path, e))?;
        root.present().map_err(|e| plot_error(path, e))?;
        info!("Population plot written to {}", path.display());
        Ok(())
    }
}

fn draw_scree_impl<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    eigenvalues: &[f64],
    config: &PlotConfig,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;
    let points: Vec<(f64, f64)> = eigenvalues
        .iter()
        .enumerate()
        .map(|(i, v)| ((i + 1) as f64, *v))
        .collect();
    let x_range = 0.5..(eigenvalues.len() as f64 + 0.5);
    let y_range = padded_range(eigenvalues.iter().copied().chain(std::iter::once(0.0)));

    let mut chart = ChartBuilder::on(root)
        .caption("Scree plot", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc("Principal component")
        .y_desc("Eigenvalue")
        .draw()?;

    let color = config.palette[0];
    chart.draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?;
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), config.point_size, color.filled())),
    )?;
    Ok(())
}

fn draw_scatter_impl<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    plot: &ScatterPlot<'_>,
    config: &PlotConfig,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(root)
        .caption(plot.caption(), ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(plot.x_range(), plot.y_range())?;
    chart
        .configure_mesh()
        .x_desc(format!("PC{}", plot.x_pc))
        .y_desc(format!("PC{}", plot.y_pc))
        .draw()?;

    for (i, (label, points)) in plot.series().into_iter().enumerate() {
        let color = config.palette[i % config.palette.len()];
        let is_study = points.iter().all(|p| p.is_study);
        let style = if is_study {
            color.filled()
        } else {
            color.mix(config.reference_alpha).filled()
        };
        chart
            .draw_series(
                points
                    .iter()
                    .map(|p| Circle::new((p.x, p.y), config.point_size, style)),
            )?
            .label(label)
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    Ok(())
}
