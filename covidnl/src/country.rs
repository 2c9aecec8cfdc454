//! Per-country series from the public JHU-derived JSON time series.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use polars::prelude::{DataFrame, NamedFrom, PolarsResult, Series};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CovidError;
use crate::plot::{self, sparse_date_label, value_range, Chart, PlotFormat, FONT};
use crate::COL;

/// Raw record as published in the feed. Dates are not zero padded (`2020-1-22`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DailyRecord {
    #[serde(deserialize_with = "feed_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub confirmed: Option<u64>,
    #[serde(default)]
    pub deaths: Option<u64>,
    #[serde(default)]
    pub recovered: Option<u64>,
}

fn feed_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<NaiveDate, D::Error> {
    let value = String::deserialize(deserializer)?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

/// Country name to its daily records, oldest first.
pub type CountryFeed = HashMap<String, Vec<DailyRecord>>;

pub async fn fetch_timeseries(url: &str) -> Result<CountryFeed> {
    info!("Fetching country time series from {url}");
    let feed = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<CountryFeed>()
        .await
        .with_context(|| format!("Failed to parse time series from {url}"))?;
    info!("Fetched time series for {} countries", feed.len());
    Ok(feed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryDay {
    pub date: NaiveDate,
    pub confirmed: f64,
    pub deaths: f64,
    pub recovered: f64,
    pub death_rate: f64,
}

/// `deaths / confirmed * 100`, or `0.0` before the first confirmed case.
pub fn death_rate(deaths: f64, confirmed: f64) -> f64 {
    if confirmed == 0.0 {
        0.0
    } else {
        deaths / confirmed * 100.0
    }
}

fn ln_or_zero(value: f64) -> f64 {
    if value > 0.0 {
        value.ln()
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountrySeries {
    pub country: String,
    pub days: Vec<CountryDay>,
}

impl CountrySeries {
    pub fn from_records(country: &str, records: &[DailyRecord]) -> Self {
        let days = records
            .iter()
            .map(|record| {
                let confirmed = record.confirmed.unwrap_or(0) as f64;
                let deaths = record.deaths.unwrap_or(0) as f64;
                CountryDay {
                    date: record.date,
                    confirmed,
                    deaths,
                    recovered: record.recovered.unwrap_or(0) as f64,
                    death_rate: death_rate(deaths, confirmed),
                }
            })
            .collect();
        Self {
            country: country.to_string(),
            days,
        }
    }

    pub fn from_feed(feed: &CountryFeed, country: &str) -> Result<Self> {
        let records = feed
            .get(country)
            .ok_or_else(|| CovidError::CountryNotFound(country.to_string()))?;
        Ok(Self::from_records(country, records))
    }

    /// The series from the first day with a confirmed case on. Empty if there is none.
    pub fn sliced(&self) -> Self {
        let start = self
            .days
            .iter()
            .position(|day| day.confirmed != 0.0)
            .unwrap_or(self.days.len());
        Self {
            country: self.country.clone(),
            days: self.days[start..].to_vec(),
        }
    }

    /// Natural log of the three counts, so exponential growth shows as a straight line. The
    /// death rate keeps its linear value. Zero counts stay zero.
    pub fn log_scaled(&self) -> Self {
        let days = self
            .days
            .iter()
            .map(|day| CountryDay {
                confirmed: ln_or_zero(day.confirmed),
                deaths: ln_or_zero(day.deaths),
                recovered: ln_or_zero(day.recovered),
                ..day.clone()
            })
            .collect();
        Self {
            country: self.country.clone(),
            days,
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    fn values(&self, f: impl Fn(&CountryDay) -> f64) -> Vec<f64> {
        self.days.iter().map(f).collect()
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new(
                COL::DATE,
                self.days.iter().map(|day| day.date).collect::<Vec<_>>(),
            ),
            Series::new(COL::CONFIRMED, self.values(|day| day.confirmed)),
            Series::new(COL::DEATHS, self.values(|day| day.deaths)),
            Series::new(COL::RECOVERED, self.values(|day| day.recovered)),
            Series::new(COL::DEATH_RATE, self.values(|day| day.death_rate)),
        ])
    }
}

struct CountryChart<'a> {
    series: &'a CountrySeries,
    tick_every: usize,
    log_scale: bool,
}

impl Chart for CountryChart<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()>
    where
        DB::ErrorType: 'static,
    {
        let n = self.series.len();
        let dates: Vec<NaiveDate> = self.series.days.iter().map(|day| day.date).collect();
        let suffix = if self.log_scale { " (log)" } else { "" };
        let panels = [
            (
                format!("# confirmed{suffix}"),
                self.series.values(|day| day.confirmed),
                plot::TAB_ORANGE,
            ),
            (
                format!("# deaths{suffix}"),
                self.series.values(|day| day.deaths),
                plot::TAB_RED,
            ),
            (
                "% death rate".to_string(),
                self.series.values(|day| day.death_rate),
                plot::TAB_BLUE,
            ),
        ];

        root.fill(&WHITE)?;
        let title = format!("Covid-19 {}", self.series.country);
        let root = root.titled(&title, (FONT, 24))?;
        for (area, (label, values, color)) in root.split_evenly((3, 1)).iter().zip(panels) {
            let mut chart = ChartBuilder::on(area)
                .margin(10)
                .x_label_area_size(40)
                .y_label_area_size(80)
                .build_cartesian_2d(0..n, value_range(&values))?;
            chart
                .configure_mesh()
                .x_labels(n)
                .x_label_formatter(&|idx| sparse_date_label(&dates, *idx, self.tick_every))
                .x_label_style((FONT, 11))
                .y_desc(label)
                .y_label_style((FONT, 14).into_font().color(&color))
                .draw()?;
            chart.draw_series(LineSeries::new(
                values.iter().copied().enumerate(),
                color.stroke_width(2),
            ))?;
        }
        Ok(())
    }
}

/// Draws confirmed cases, deaths and the death rate as three stacked panels sharing the date
/// axis. `log_scale` only changes the axis labels; pass a series from `log_scaled`.
pub fn plot_country(
    series: &CountrySeries,
    path: &Path,
    format: PlotFormat,
    tick_every: usize,
    log_scale: bool,
) -> Result<()> {
    if series.len() < 2 {
        return Err(CovidError::EmptySeries(format!(
            "{} has {} days of data",
            series.country,
            series.len()
        ))
        .into());
    }
    let chart = CountryChart {
        series,
        tick_every,
        log_scale,
    };
    plot::render(&chart, path, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn feed() -> serde_json::Value {
        json!({
            "Netherlands": [
                {"date": "2020-2-26", "confirmed": 0, "deaths": 0, "recovered": 0},
                {"date": "2020-2-27", "confirmed": 1, "deaths": 0, "recovered": 0},
                {"date": "2020-2-28", "confirmed": 2, "deaths": 0, "recovered": 0},
                {"date": "2020-3-1", "confirmed": 10, "deaths": 1, "recovered": null}
            ],
            "Ireland": [
                {"date": "2020-2-26", "confirmed": 0, "deaths": 0, "recovered": 0}
            ]
        })
    }

    #[test]
    fn death_rate_should_be_zero_without_cases() {
        assert_eq!(death_rate(0.0, 0.0), 0.0);
        assert_eq!(death_rate(3.0, 0.0), 0.0);
        assert_eq!(death_rate(1.0, 10.0), 10.0);
    }

    #[test]
    fn records_should_parse_unpadded_dates() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let series = CountrySeries::from_feed(&feed, "Netherlands").unwrap();
        assert_eq!(series.days[3].date, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
        assert_eq!(series.days[3].recovered, 0.0, "null counts become zero");
        assert_eq!(series.days[3].death_rate, 10.0);
    }

    #[test]
    fn slicing_should_start_at_first_confirmed_case() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let series = CountrySeries::from_feed(&feed, "Netherlands").unwrap().sliced();
        assert_eq!(series.len(), 3);
        assert_eq!(series.days[0].date, NaiveDate::from_ymd_opt(2020, 2, 27).unwrap());

        let no_cases = CountrySeries::from_feed(&feed, "Ireland").unwrap().sliced();
        assert!(no_cases.is_empty());
    }

    #[test]
    fn log_scale_should_keep_zero_and_death_rate() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let series = CountrySeries::from_feed(&feed, "Netherlands").unwrap();
        let logged = series.log_scaled();
        assert_eq!(logged.days[0].confirmed, 0.0);
        assert_eq!(logged.days[1].confirmed, 0.0, "ln(1) is zero");
        assert!((logged.days[3].confirmed - 10f64.ln()).abs() < 1e-12);
        assert_eq!(logged.days[3].death_rate, series.days[3].death_rate);
    }

    #[test]
    fn unknown_country_should_fail() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let err = CountrySeries::from_feed(&feed, "Atlantis").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CovidError>(),
            Some(CovidError::CountryNotFound(_))
        ));
    }

    #[test]
    fn dataframe_should_carry_all_columns() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let df = CountrySeries::from_feed(&feed, "Netherlands")
            .unwrap()
            .to_dataframe()
            .unwrap();
        assert_eq!(df.shape(), (4, 5));
        assert_eq!(
            df.get_column_names(),
            vec!["date", "confirmed", "deaths", "recovered", "% death rate"]
        );
    }

    #[test]
    fn country_should_render_in_both_formats() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let series = CountrySeries::from_feed(&feed, "Netherlands").unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        for (format, log_scale) in [(PlotFormat::Svg, false), (PlotFormat::Png, true)] {
            let path = plot::plot_path(dir.path(), "country_netherlands", format);
            let series = if log_scale {
                series.log_scaled()
            } else {
                series.clone()
            };
            plot_country(&series, &path, format, 1, log_scale).unwrap();
            let size = std::fs::metadata(&path).unwrap().len();
            assert!(size > 0, "{} is empty", path.display());
        }
    }

    #[test]
    fn sliced_series_without_cases_should_not_plot() {
        let feed: CountryFeed = serde_json::from_value(feed()).unwrap();
        let series = CountrySeries::from_feed(&feed, "Ireland").unwrap().sliced();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("country_ireland.svg");
        let err = plot_country(&series, &path, PlotFormat::Svg, 1, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CovidError>(),
            Some(CovidError::EmptySeries(_))
        ));
    }

    #[tokio::test]
    async fn feed_should_be_fetched_over_http() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/covid19/timeseries.json");
                then.status(200).json_body(feed());
            })
            .await;
        let feed = fetch_timeseries(&server.url("/covid19/timeseries.json"))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(feed.len(), 2);
        assert_eq!(feed["Netherlands"].len(), 4);
    }
}
