//! National totals with their day-over-day change and inflection ratio.

use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use polars::prelude::{DataFrame, DataType};

use crate::error::CovidError;
use crate::plot::{self, sparse_date_label, value_range, Chart, PlotFormat, FONT};
use crate::table::DATE_FORMAT;

const TITLE: &str = "The Netherlands - Covid-19 cases / inflection";

/// `delta[i] = confirmed[i] - confirmed[i - 1]`, with `delta[0] = 0`.
pub fn delta(confirmed: &[f64]) -> Vec<f64> {
    std::iter::once(0.0)
        .chain(confirmed.windows(2).map(|pair| pair[1] - pair[0]))
        .take(confirmed.len())
        .collect()
}

/// `inflection[i] = delta[i] / delta[i - 1]` from `i = 2` on. The first two entries and every
/// ratio over a zero delta are `0.0`.
pub fn inflection(delta: &[f64]) -> Vec<f64> {
    delta
        .iter()
        .enumerate()
        .map(|(i, &current)| match i {
            0 | 1 => 0.0,
            _ if delta[i - 1] == 0.0 => 0.0,
            _ => current / delta[i - 1],
        })
        .collect()
}

/// Sums every date-labeled column of the wide table, in column order.
pub fn national_totals(df: &DataFrame) -> Result<Vec<(NaiveDate, f64)>> {
    let mut totals = vec![];
    for series in df.get_columns() {
        let Ok(date) = NaiveDate::parse_from_str(series.name(), DATE_FORMAT) else {
            debug!("Skipping non-date column '{}'", series.name());
            continue;
        };
        let counts = series.cast(&DataType::Float64)?;
        let total: f64 = counts.f64()?.into_iter().flatten().sum();
        totals.push((date, total));
    }
    Ok(totals)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub dates: Vec<NaiveDate>,
    pub confirmed: Vec<f64>,
    pub delta: Vec<f64>,
    pub inflection: Vec<f64>,
}

impl TrendSeries {
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Self {
        let (dates, confirmed): (Vec<_>, Vec<_>) = points.into_iter().unzip();
        let delta = delta(&confirmed);
        let inflection = inflection(&delta);
        Self {
            dates,
            confirmed,
            delta,
            inflection,
        }
    }

    pub fn from_wide_table(df: &DataFrame) -> Result<Self> {
        Ok(Self::new(national_totals(df)?))
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

struct TrendChart<'a> {
    series: &'a TrendSeries,
    tick_every: usize,
}

impl Chart for TrendChart<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()>
    where
        DB::ErrorType: 'static,
    {
        let series = self.series;
        let n = series.len();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(root)
            .caption(TITLE, (FONT, 24))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(80)
            .right_y_label_area_size(80)
            .build_cartesian_2d(0..n, value_range(&series.confirmed))?
            .set_secondary_coord(0..n, value_range(&series.inflection));

        chart
            .configure_mesh()
            .x_labels(n)
            .x_label_formatter(&|idx| sparse_date_label(&series.dates, *idx, self.tick_every))
            .x_label_style((FONT, 11))
            .x_desc("Date")
            .y_desc("Confirmed")
            .y_label_style((FONT, 14).into_font().color(&plot::TAB_ORANGE))
            .draw()?;
        chart
            .configure_secondary_axes()
            .y_desc("Inflection")
            .label_style((FONT, 14).into_font().color(&plot::TAB_RED))
            .draw()?;

        chart
            .draw_series(LineSeries::new(
                series.confirmed.iter().copied().enumerate(),
                plot::TAB_ORANGE.stroke_width(2),
            ))?
            .label("Confirmed")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], plot::TAB_ORANGE));
        chart
            .draw_secondary_series(LineSeries::new(
                series.inflection.iter().copied().enumerate(),
                plot::TAB_RED.stroke_width(2),
            ))?
            .label("Inflection")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], plot::TAB_RED));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        Ok(())
    }
}

/// Draws cumulative confirmed cases against the inflection ratio on a second y axis.
pub fn plot_trend(
    series: &TrendSeries,
    path: &Path,
    format: PlotFormat,
    tick_every: usize,
) -> Result<()> {
    if series.len() < 2 {
        return Err(CovidError::EmptySeries(format!(
            "the trend needs at least two days, got {}",
            series.len()
        ))
        .into());
    }
    plot::render(&TrendChart { series, tick_every }, path, format)
}
