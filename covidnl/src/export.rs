//! Wide and long exports of the combined table.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use polars::prelude::*;

use crate::table::{CombinedTable, DATE_FORMAT};
use crate::COL;

pub const WIDE_EXPORT_FILE: &str = "rivm_data_nl.csv";
const LONG_EXPORT_PREFIX: &str = "rivm_data_nl";

pub fn wide_export_path(dir: &Path) -> PathBuf {
    dir.join(WIDE_EXPORT_FILE)
}

/// The long export is kept per as-of date so earlier runs are never overwritten.
pub fn long_export_path(dir: &Path, as_of: NaiveDate) -> PathBuf {
    dir.join(format!(
        "{LONG_EXPORT_PREFIX}_{}.csv",
        as_of.format(DATE_FORMAT)
    ))
}

/// `city` followed by one column per label.
pub fn counts_dataframe(table: &CombinedTable) -> PolarsResult<DataFrame> {
    let mut columns = vec![Series::new(COL::CITY, table.cities().collect::<Vec<_>>())];
    for (idx, label) in table.columns().iter().enumerate() {
        let counts: Vec<f64> = table.rows().iter().map(|row| row.counts[idx]).collect();
        columns.push(Series::new(label, counts));
    }
    DataFrame::new(columns)
}

/// `city, latitude, longitude` followed by one column per date. Municipalities without a
/// coordinate get the sentinel `0.0, 0.0`.
pub fn wide_dataframe(table: &CombinedTable) -> PolarsResult<DataFrame> {
    let coordinates = table
        .rows()
        .iter()
        .map(|row| row.coordinate.unwrap_or_default())
        .collect::<Vec<_>>();
    let mut df = counts_dataframe(table)?;
    df.insert_column(
        1,
        Series::new(
            COL::LATITUDE,
            coordinates.iter().map(|c| c.latitude).collect::<Vec<_>>(),
        ),
    )?;
    df.insert_column(
        2,
        Series::new(
            COL::LONGITUDE,
            coordinates.iter().map(|c| c.longitude).collect::<Vec<_>>(),
        ),
    )?;
    Ok(df)
}

/// Unpivots the date columns into one `city, latitude, longitude, date, confirmed` row per
/// municipality and day, date by date. Counts are truncated to `i32`; fractional counts are
/// reported since the source only publishes whole numbers.
pub fn long_dataframe(table: &CombinedTable) -> Result<DataFrame> {
    let dates = table.dates()?;
    let capacity = table.len() * dates.len();
    let mut cities: Vec<&str> = Vec::with_capacity(capacity);
    let mut latitudes: Vec<f64> = Vec::with_capacity(capacity);
    let mut longitudes: Vec<f64> = Vec::with_capacity(capacity);
    let mut long_dates: Vec<NaiveDate> = Vec::with_capacity(capacity);
    let mut confirmed: Vec<i32> = Vec::with_capacity(capacity);
    let mut fractional = 0;

    for (idx, date) in dates.iter().enumerate() {
        for row in table.rows() {
            let coordinate = row.coordinate.unwrap_or_default();
            let count = row.counts[idx];
            if count.fract() != 0.0 {
                fractional += 1;
            }
            cities.push(&row.city);
            latitudes.push(coordinate.latitude);
            longitudes.push(coordinate.longitude);
            long_dates.push(*date);
            confirmed.push(count as i32);
        }
    }
    if fractional > 0 {
        warn!("{fractional} counts were not whole numbers and have been truncated");
    }

    Ok(DataFrame::new(vec![
        Series::new(COL::CITY, cities),
        Series::new(COL::LATITUDE, latitudes),
        Series::new(COL::LONGITUDE, longitudes),
        Series::new(COL::DATE, long_dates),
        Series::new(COL::CONFIRMED, confirmed),
    ])?)
}

/// Writes `df` as a comma-delimited CSV with a header row.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    info!("Wrote {} rows to '{}'", df.height(), path.display());
    Ok(())
}
