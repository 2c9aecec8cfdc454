//! Reading the per-day RIVM municipality reports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info};
use nonempty::NonEmpty;
use polars::prelude::*;
use regex::Regex;

use crate::error::CovidError;

/// The case counts of a single report day, keyed by municipality name.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub source: PathBuf,
    /// File stem, used as the column label until the columns are relabeled to dates.
    pub label: String,
    pub counts: BTreeMap<String, f64>,
}

impl DailyReport {
    pub fn new(source: impl Into<PathBuf>, counts: BTreeMap<String, f64>) -> Self {
        let source = source.into();
        let label = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            source,
            label,
            counts,
        }
    }
}

fn non_digit() -> &'static Regex {
    static NON_DIGIT: OnceLock<Regex> = OnceLock::new();
    NON_DIGIT.get_or_init(|| Regex::new(r"\D").expect("static pattern"))
}

/// All digits of the file name read as one number. File names without digits map to 0.
fn embedded_number(path: &Path) -> Result<u64> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let digits = non_digit().replace_all(&name, "");
    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse().map_err(|err| {
        CovidError::InputFile {
            path: path.to_path_buf(),
            reason: format!("number in file name cannot be used for ordering: {err}"),
        }
        .into()
    })
}

/// Sorts report files by the number embedded in their names, so that `r10` follows `r9`.
pub fn sort_by_embedded_number(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut keyed = paths
        .into_iter()
        .map(|path| Ok((embedded_number(&path)?, path)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort();
    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}

/// Lists the files in `dir` matching the glob `pattern`, in report order.
pub fn find_report_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
    let full_pattern = Path::new(&escaped_dir)
        .join(pattern)
        .to_string_lossy()
        .to_string();
    let paths = glob::glob(&full_pattern)
        .with_context(|| format!("Invalid report pattern '{full_pattern}'"))?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|path| path.is_file())
        .collect_vec();
    if paths.is_empty() {
        return Err(CovidError::NoReports(dir.join(pattern).display().to_string()).into());
    }
    sort_by_embedded_number(paths)
}

/// Reads one semicolon-delimited report. The first column holds the municipality name, the
/// per-capita column is dropped and exactly one count column must remain.
pub fn read_daily_report(path: &Path, per_capita_column: &str) -> Result<DailyReport> {
    let input_error = |reason: String| CovidError::InputFile {
        path: path.to_path_buf(),
        reason,
    };

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(b';')
                .with_encoding(CsvEncoding::LossyUtf8),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|err| input_error(err.to_string()))?;

    let columns = df.get_columns();
    let key = columns
        .first()
        .ok_or_else(|| input_error("file has no columns".into()))?;
    let count_columns = columns
        .iter()
        .skip(1)
        .filter(|column| column.name() != per_capita_column)
        .collect_vec();
    let count = match count_columns.as_slice() {
        [count] => *count,
        [] => {
            return Err(CovidError::MissingColumn {
                path: path.to_path_buf(),
                column: "case count".into(),
            }
            .into())
        }
        more => {
            return Err(input_error(format!(
                "expected a single count column, found {:?}",
                more.iter().map(|column| column.name()).collect_vec()
            ))
            .into())
        }
    };

    let keys = key.cast(&DataType::String)?;
    let counts = count.cast(&DataType::Float64)?;
    let mut report: BTreeMap<String, f64> = BTreeMap::new();
    for (name, value) in keys.str()?.into_iter().zip(counts.f64()?.into_iter()) {
        let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
            continue;
        };
        *report.entry(name.to_string()).or_default() += value.unwrap_or(0.0);
    }
    debug!(
        "Read {} municipalities from '{}'",
        report.len(),
        path.display()
    );
    Ok(DailyReport::new(path, report))
}

/// Loads every report matching `pattern` in `dir`. Any unreadable report fails the whole load.
pub fn load_reports(
    dir: &Path,
    pattern: &str,
    per_capita_column: &str,
) -> Result<NonEmpty<DailyReport>> {
    let files = find_report_files(dir, pattern)?;
    info!("Loading {} daily reports from '{}'", files.len(), dir.display());
    let reports = files
        .iter()
        .map(|path| read_daily_report(path, per_capita_column))
        .collect::<Result<Vec<_>>>()?;
    NonEmpty::from_vec(reports)
        .ok_or_else(|| CovidError::NoReports(dir.join(pattern).display().to_string()).into())
}
