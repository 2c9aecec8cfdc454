//! The wide municipality-by-day table and the transformations that clean it.
//!
//! Every transformation consumes or borrows a `CombinedTable` and returns a new one. Rows are
//! addressed through an explicit name to row-index map, so a count can never end up in the
//! wrong row after rows are added or removed.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use log::{debug, info};
use nonempty::NonEmpty;

use crate::cleaning::MergeRules;
use crate::error::CovidError;
use crate::geo::Coordinate;
use crate::loader::DailyReport;

/// Format of the column labels once they have been relabeled to dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq)]
pub struct CityRow {
    pub city: String,
    /// One count per column label, in column order.
    pub counts: Vec<f64>,
    pub coordinate: Option<Coordinate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    columns: Vec<String>,
    rows: Vec<CityRow>,
    index: HashMap<String, usize>,
}

impl CombinedTable {
    /// Builds a table from rows, sorting them by municipality name.
    pub fn new(columns: Vec<String>, rows: Vec<CityRow>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.counts.len() != columns.len()) {
            anyhow::bail!(
                "Row '{}' has {} counts for {} columns",
                row.city,
                row.counts.len(),
                columns.len()
            );
        }
        let rows = rows
            .into_iter()
            .sorted_by(|a, b| a.city.cmp(&b.city))
            .collect_vec();
        if let Some((a, _)) = rows.iter().tuple_windows().find(|(a, b)| a.city == b.city) {
            anyhow::bail!("Municipality '{}' appears more than once", a.city);
        }
        let index = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.city.clone(), idx))
            .collect();
        Ok(Self {
            columns,
            rows,
            index,
        })
    }

    /// Full outer join of the daily reports on municipality name. A municipality missing from
    /// a report gets a zero count for that day.
    pub fn merge(reports: &NonEmpty<DailyReport>) -> Self {
        let columns = reports.iter().map(|report| report.label.clone()).collect_vec();
        let cities: BTreeSet<&String> = reports
            .iter()
            .flat_map(|report| report.counts.keys())
            .collect();
        let rows = cities
            .into_iter()
            .map(|city| CityRow {
                city: city.clone(),
                counts: reports
                    .iter()
                    .map(|report| report.counts.get(city).copied().unwrap_or(0.0))
                    .collect(),
                coordinate: None,
            })
            .collect_vec();
        info!(
            "Merged {} reports into {} municipalities",
            columns.len(),
            rows.len()
        );
        Self::from_sorted_rows(columns, rows)
    }

    fn from_sorted_rows(columns: Vec<String>, rows: Vec<CityRow>) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.city.clone(), idx))
            .collect();
        Self {
            columns,
            rows,
            index,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[CityRow] {
        &self.rows
    }

    pub fn cities(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.city.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, city: &str) -> Option<&CityRow> {
        self.index.get(city).map(|&idx| &self.rows[idx])
    }

    /// Counts of one column across all rows.
    pub fn column_values(&self, column: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|label| label == column)?;
        Some(self.rows.iter().map(|row| row.counts[idx]).collect())
    }

    /// Folds every duplicate spelling into its canonical row by summing the counts. Rules whose
    /// duplicate is absent are skipped, so applying the rules to a clean table changes nothing.
    pub fn canonicalize(&self, rules: &MergeRules) -> Self {
        let mut rows = self.rows.clone();
        for rule in rules.iter() {
            let Some(duplicate_idx) = rows.iter().position(|row| row.city == rule.duplicate)
            else {
                continue;
            };
            let duplicate = rows.remove(duplicate_idx);
            match rows.iter_mut().find(|row| row.city == rule.canonical) {
                Some(canonical) => {
                    for (total, count) in canonical.counts.iter_mut().zip(&duplicate.counts) {
                        *total += count;
                    }
                    canonical.coordinate = canonical.coordinate.or(duplicate.coordinate);
                }
                None => rows.push(CityRow {
                    city: rule.canonical.clone(),
                    ..duplicate
                }),
            }
            debug!("Merged '{}' into '{}'", rule.duplicate, rule.canonical);
        }
        rows.sort_by(|a, b| a.city.cmp(&b.city));
        Self::from_sorted_rows(self.columns.clone(), rows)
    }

    /// Relabels the columns, in file order, to consecutive days from `start` up to and
    /// including `as_of`. Fails when the number of columns does not match the number of days.
    pub fn relabel_dates(&self, start: NaiveDate, as_of: NaiveDate) -> Result<Self> {
        let expected = usize::try_from((as_of - start).num_days() + 1).unwrap_or(0);
        if expected != self.columns.len() {
            return Err(CovidError::ColumnCountMismatch {
                expected,
                found: self.columns.len(),
            }
            .into());
        }
        let columns = (0..expected)
            .map(|offset| {
                (start + Duration::days(offset as i64))
                    .format(DATE_FORMAT)
                    .to_string()
            })
            .collect_vec();
        Ok(Self::from_sorted_rows(columns, self.rows.clone()))
    }

    /// Returns a copy of the table with the coordinate of `city` replaced. Unknown cities are
    /// ignored.
    pub fn with_coordinates<'a>(
        &self,
        coordinates: impl IntoIterator<Item = (&'a str, Coordinate)>,
    ) -> Self {
        let mut rows = self.rows.clone();
        for (city, coordinate) in coordinates {
            if let Some(&idx) = self.index.get(city) {
                rows[idx].coordinate = Some(coordinate);
            }
        }
        Self::from_sorted_rows(self.columns.clone(), rows)
    }

    /// Parses the column labels as dates, failing on the first label that is not a date.
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        self.columns
            .iter()
            .map(|label| {
                NaiveDate::parse_from_str(label, DATE_FORMAT)
                    .map_err(|err| anyhow::anyhow!("Column '{label}' is not a date: {err}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::MergeRule;
    use nonempty::nonempty;
    use std::collections::BTreeMap;

    fn report(label: &str, counts: &[(&str, f64)]) -> DailyReport {
        DailyReport::new(
            format!("{label}.csv"),
            counts
                .iter()
                .map(|(city, count)| (city.to_string(), *count))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn rules(pairs: &[(&str, &str)]) -> MergeRules {
        MergeRules::new(
            pairs
                .iter()
                .map(|(duplicate, canonical)| MergeRule {
                    duplicate: duplicate.to_string(),
                    canonical: canonical.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn merge_should_zero_fill_missing_days() {
        let reports = nonempty![
            report("r1", &[("Utrecht", 5.0)]),
            report("r2", &[("Utrecht", 9.0), ("Amsterdam", 3.0)]),
        ];
        let table = CombinedTable::merge(&reports);
        assert_eq!(table.columns(), ["r1", "r2"]);
        assert_eq!(table.row("Utrecht").unwrap().counts, vec![5.0, 9.0]);
        assert_eq!(table.row("Amsterdam").unwrap().counts, vec![0.0, 3.0]);
        assert_eq!(table.cities().collect_vec(), vec!["Amsterdam", "Utrecht"]);
    }

    #[test]
    fn merged_rows_should_be_union_minus_duplicates() {
        let reports = nonempty![
            report("r1", &[("Beekdaelen", 2.0), ("Epe", 1.0)]),
            report("r2", &[("BeekDaelen", 3.0), ("Hengelo", 4.0)]),
        ];
        let table = CombinedTable::merge(&reports)
            .canonicalize(&rules(&[("BeekDaelen", "Beekdaelen"), ("Hengelo", "Hengelo (O)")]));
        assert_eq!(
            table.cities().collect_vec(),
            vec!["Beekdaelen", "Epe", "Hengelo (O)"]
        );
        assert_eq!(table.row("Hengelo (O)").unwrap().counts, vec![0.0, 4.0]);
    }

    #[test]
    fn canonicalize_should_sum_duplicate_into_canonical() {
        let reports = nonempty![report("r1", &[("Beekdaelen", 2.0), ("BeekDaelen", 3.0)])];
        let table =
            CombinedTable::merge(&reports).canonicalize(&rules(&[("BeekDaelen", "Beekdaelen")]));
        assert_eq!(table.len(), 1);
        assert_eq!(table.row("Beekdaelen").unwrap().counts, vec![5.0]);
        assert!(table.row("BeekDaelen").is_none());
    }

    #[test]
    fn canonicalize_should_conserve_column_totals() {
        let reports = nonempty![
            report("r1", &[("Bergen (NH)", 1.0), ("Bergen (NH.)", 2.0), ("Ede", 7.0)]),
            report("r2", &[("Bergen (NH)", 4.0), ("Bergen (NH.)", 8.0), ("Ede", 9.0)]),
        ];
        let merged = CombinedTable::merge(&reports);
        let clean = merged.canonicalize(&rules(&[("Bergen (NH.)", "Bergen (NH)")]));
        for column in ["r1", "r2"] {
            let before: f64 = merged.column_values(column).unwrap().iter().sum();
            let after: f64 = clean.column_values(column).unwrap().iter().sum();
            assert_eq!(before, after);
        }
        assert_eq!(clean.row("Bergen (NH)").unwrap().counts, vec![3.0, 12.0]);
    }

    #[test]
    fn canonicalize_should_be_idempotent() {
        let reports = nonempty![
            report("r1", &[("Hengelo", 1.0), ("Hengelo (O)", 2.0)]),
            report("r2", &[("Súdwest Fryslân", 3.0)]),
        ];
        let rules = rules(&[
            ("Hengelo", "Hengelo (O)"),
            ("Súdwest Fryslân", "Súdwest-Fryslân"),
        ]);
        let once = CombinedTable::merge(&reports).canonicalize(&rules);
        let twice = once.canonicalize(&rules);
        assert_eq!(once, twice);
        assert_eq!(twice.row("Súdwest-Fryslân").unwrap().counts, vec![0.0, 3.0]);
    }

    #[test]
    fn relabel_should_use_consecutive_dates() {
        let reports = nonempty![
            report("r1", &[("Utrecht", 5.0)]),
            report("r2", &[("Utrecht", 9.0)]),
            report("r3", &[("Utrecht", 11.0)]),
        ];
        let start = NaiveDate::from_ymd_opt(2020, 3, 30).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2020, 4, 1).unwrap();
        let table = CombinedTable::merge(&reports)
            .relabel_dates(start, as_of)
            .unwrap();
        assert_eq!(table.columns(), ["2020-03-30", "2020-03-31", "2020-04-01"]);
        assert_eq!(table.dates().unwrap()[2], as_of);
    }

    #[test]
    fn relabel_should_reject_column_count_mismatch() {
        let reports = nonempty![report("r1", &[("Utrecht", 5.0)])];
        let start = NaiveDate::from_ymd_opt(2020, 3, 4).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2020, 3, 5).unwrap();
        let err = CombinedTable::merge(&reports)
            .relabel_dates(start, as_of)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CovidError>(),
            Some(CovidError::ColumnCountMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn new_should_reject_ragged_rows() {
        let rows = vec![CityRow {
            city: "Ede".into(),
            counts: vec![1.0],
            coordinate: None,
        }];
        assert!(CombinedTable::new(vec!["a".into(), "b".into()], rows).is_err());
    }
}
