//! Shared chart plumbing for the trend and country plots.

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::table::DATE_FORMAT;

pub const PLOT_SIZE: (u32, u32) = (1280, 720);
pub const FONT: &str = "sans-serif";

// Matplotlib's tab10 palette
pub const TAB_ORANGE: RGBColor = RGBColor(255, 127, 14);
pub const TAB_RED: RGBColor = RGBColor(214, 39, 40);
pub const TAB_BLUE: RGBColor = RGBColor(31, 119, 180);

/// Image formats charts can be written in.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, EnumString, Display, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum PlotFormat {
    #[default]
    Svg,
    Png,
}

impl PlotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PlotFormat::Svg => "svg",
            PlotFormat::Png => "png",
        }
    }
}

pub fn plot_path(dir: &Path, stem: &str, format: PlotFormat) -> PathBuf {
    dir.join(format!("{stem}.{}", format.extension()))
}

/// Something that can draw itself on any plotters backend.
pub trait Chart {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()>
    where
        DB::ErrorType: 'static;
}

/// Renders `chart` to `path` in the given format.
pub fn render(chart: &impl Chart, path: &Path, format: PlotFormat) -> Result<()> {
    match format {
        PlotFormat::Svg => {
            let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
            chart.draw(&root)?;
            root.present()?;
        }
        PlotFormat::Png => {
            let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
            chart.draw(&root)?;
            root.present()?;
        }
    }
    info!("Wrote chart to '{}'", path.display());
    Ok(())
}

/// Y axis range covering all finite values and zero, padded by 5%.
pub fn value_range(values: &[f64]) -> Range<f64> {
    let (min, max) = values
        .iter()
        .filter(|value| value.is_finite())
        .fold((0.0f64, 0.0f64), |(min, max), &value| {
            (min.min(value), max.max(value))
        });
    let padding = if max > min { (max - min) * 0.05 } else { 1.0 };
    (min - padding)..(max + padding)
}

/// Label for the x axis position `idx`, left blank except for every `every`th date.
pub fn sparse_date_label(dates: &[NaiveDate], idx: usize, every: usize) -> String {
    if idx % every.max(1) != 0 {
        return String::new();
    }
    dates
        .get(idx)
        .map(|date| date.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}
