use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::cleaning::MergeRules;
use crate::config::Config;
use crate::export::{long_dataframe, long_export_path, wide_dataframe, wide_export_path, write_csv};
use crate::geo::{enrich, CoordinateCache, CoordinateOverrides, Geocoder, NominatimGeocoder};
use crate::loader::load_reports;
use crate::parquet::{wide_table_path, write_wide_table};
use crate::table::{CombinedTable, DATE_FORMAT};

pub const COORDINATE_CACHE_FILE: &str = "coordinates.csv";

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub municipalities: usize,
    pub days: usize,
    pub as_of: NaiveDate,
    pub confirmed_as_of: f64,
    pub unresolved: Vec<String>,
    pub wide_table: PathBuf,
    pub wide_export: PathBuf,
    pub long_export: PathBuf,
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs every stage against the configured Nominatim endpoint.
    pub async fn run(&self) -> Result<PipelineSummary> {
        let geocoder = NominatimGeocoder::new(&self.config.geocoder)?;
        self.run_with(&geocoder).await
    }

    /// Loads, cleans and labels the daily reports. Nothing is written.
    pub fn prepare(&self) -> Result<CombinedTable> {
        let config = &self.config;
        let rules = MergeRules::load_or_bundled(config.merge_rules.as_deref())?;
        let reports = load_reports(
            &config.input_dir,
            &config.input_pattern,
            &config.per_capita_column,
        )?;
        let table = CombinedTable::merge(&reports)
            .canonicalize(&rules)
            .relabel_dates(config.start_date, config.as_of_date())?;
        info!(
            "Cleaned table has {} municipalities over {} days",
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }

    pub async fn run_with<G: Geocoder>(&self, geocoder: &G) -> Result<PipelineSummary> {
        let config = &self.config;
        let as_of = config.as_of_date();
        let overrides =
            CoordinateOverrides::load_or_bundled(config.coordinate_overrides.as_deref())?;
        let table = self.prepare()?;

        std::fs::create_dir_all(&config.output_dir).with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                config.output_dir.display()
            )
        })?;
        let wide_table = wide_table_path(&config.output_dir);
        write_wide_table(&wide_table, &table)?;

        let mut cache = CoordinateCache::open(config.output_dir.join(COORDINATE_CACHE_FILE))?;
        let (table, report) = enrich(&table, geocoder, &mut cache, &overrides).await?;

        let wide_export = wide_export_path(&config.output_dir);
        write_csv(&mut wide_dataframe(&table)?, &wide_export)?;
        let long_export = long_export_path(&config.output_dir, as_of);
        write_csv(&mut long_dataframe(&table)?, &long_export)?;

        let confirmed_as_of: f64 = table
            .column_values(&as_of.format(DATE_FORMAT).to_string())
            .map(|counts| counts.iter().sum())
            .unwrap_or_default();
        info!("Confirmed cases on {as_of}: {confirmed_as_of}");

        Ok(PipelineSummary {
            municipalities: table.len(),
            days: table.columns().len(),
            as_of,
            confirmed_as_of,
            unresolved: report.unresolved,
            wide_table,
            wide_export,
            long_export,
        })
    }
}
