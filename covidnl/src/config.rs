use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::plot::PlotFormat;

/// First day RIVM published per-municipality figures.
pub const RIVM_FIRST_REPORT: (i32, u32, u32) = (2020, 3, 4);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub input_dir: PathBuf,
    pub input_pattern: String,
    pub output_dir: PathBuf,
    pub start_date: NaiveDate,
    /// Date of the last daily report. Defaults to today when unset.
    pub as_of: Option<NaiveDate>,
    pub per_capita_column: String,
    /// TOML table of duplicate municipality spellings. The bundled table is used when unset.
    pub merge_rules: Option<PathBuf>,
    /// TOML table of manual coordinates. The bundled table is used when unset.
    pub coordinate_overrides: Option<PathBuf>,
    pub plot_format: PlotFormat,
    pub geocoder: GeocoderConfig,
    pub trend: TrendConfig,
    pub country: CountryConfig,
}

impl Default for Config {
    fn default() -> Self {
        let (year, month, day) = RIVM_FIRST_REPORT;
        Config {
            input_dir: "rivm_daily_report".into(),
            input_pattern: "*.csv".into(),
            output_dir: "output".into(),
            start_date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default(),
            as_of: None,
            per_capita_column: "Aantal per 100.000 inwoners".into(),
            merge_rules: None,
            coordinate_overrides: None,
            plot_format: PlotFormat::default(),
            geocoder: GeocoderConfig::default(),
            trend: TrendConfig::default(),
            country: CountryConfig::default(),
        }
    }
}

impl Config {
    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Restricts matches to these ISO 3166-1 alpha-2 codes (comma separated).
    pub country_codes: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
    /// Pause between two network lookups.
    pub delay_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig {
            base_url: "https://nominatim.openstreetmap.org".into(),
            user_agent: concat!("covidnl/", env!("CARGO_PKG_VERSION")).into(),
            country_codes: Some("nl".into()),
            timeout_secs: 3,
            retries: 2,
            delay_ms: 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrendConfig {
    /// Label every Nth date on the x axis.
    pub tick_every: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig { tick_every: 2 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CountryConfig {
    pub url: String,
    pub name: String,
    /// Start the series at the first day with a confirmed case.
    pub slice: bool,
    pub log_scale: bool,
    pub tick_every: usize,
}

impl Default for CountryConfig {
    fn default() -> Self {
        CountryConfig {
            url: "https://pomber.github.io/covid19/timeseries.json".into(),
            name: "Netherlands".into(),
            slice: true,
            log_scale: false,
            tick_every: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_should_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            input_dir = "reports"
            as_of = "2020-03-25"

            [country]
            name = "Ireland"
            log_scale = true
            "#,
        )
        .unwrap();
        assert_eq!(config.input_dir, PathBuf::from("reports"));
        assert_eq!(config.as_of_date(), NaiveDate::from_ymd_opt(2020, 3, 25).unwrap());
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2020, 3, 4).unwrap());
        assert_eq!(config.country.name, "Ireland");
        assert!(config.country.log_scale);
        assert!(config.country.slice, "unset fields keep their defaults");
        assert_eq!(config.geocoder, GeocoderConfig::default());
    }

    #[test]
    fn default_config_should_serialize_to_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
