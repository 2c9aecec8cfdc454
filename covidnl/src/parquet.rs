use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use polars::prelude::*;

use crate::export::counts_dataframe;
use crate::table::CombinedTable;

pub const WIDE_TABLE_FILE: &str = "nl_wide_table.parquet";

pub fn wide_table_path(dir: &Path) -> PathBuf {
    dir.join(WIDE_TABLE_FILE)
}

/// Serializes the cleaned, date-labeled counts for reuse by the trend plot.
pub fn write_wide_table<P: AsRef<Path>>(path: P, table: &CombinedTable) -> Result<()> {
    let path = path.as_ref();
    let mut df = counts_dataframe(table)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut df)?;
    info!("Wrote intermediate table with shape {:?}", df.shape());
    Ok(())
}

pub fn read_wide_table<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    LazyFrame::scan_parquet(path, ScanArgsParquet::default())
        .and_then(|df| df.collect())
        .with_context(|| format!("Failed to load '{}'", path.display()))
}
