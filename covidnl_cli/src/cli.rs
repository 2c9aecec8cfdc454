use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use covidnl::{
    config::Config,
    country::{fetch_timeseries, plot_country, CountrySeries},
    parquet::{read_wide_table, wide_table_path},
    plot::{plot_path, PlotFormat},
    trend::{plot_trend, TrendSeries},
    Pipeline,
};
use enum_dispatch::enum_dispatch;
use log::info;
use spinners::{Spinner, Spinners};

use crate::display::{display_country_tail, display_summary, display_trend_tail};
use crate::error::CovidCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const TREND_PLOT_STEM: &str = "nl_trend";
const TAIL_ROWS: usize = 7;

fn spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop(sp: Option<Spinner>) {
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// File stem for a country chart, e.g. `country_united_kingdom`.
fn country_plot_stem(country: &str) -> String {
    format!("country_{}", country.to_lowercase().replace(' ', "_"))
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CovidCliResult<()>;
}

/// The `run` command loads the daily reports and writes the cleaned, geocoded exports.
#[derive(Args, Debug)]
pub struct PipelineCommand {
    #[arg(long, help = "Directory holding the daily RIVM reports")]
    input_dir: Option<PathBuf>,
    #[arg(short = 'o', long, help = "Directory to write the exports to")]
    output_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "YYYY-MM-DD",
        help = "Date of the last daily report (defaults to today)"
    )]
    as_of: Option<NaiveDate>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for PipelineCommand {
    async fn run(&self, mut config: Config) -> CovidCliResult<()> {
        info!("Running `run` subcommand");
        if let Some(input_dir) = &self.input_dir {
            config.input_dir = input_dir.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        config.as_of = self.as_of.or(config.as_of);

        let sp = spinner(self.quiet, "Loading, cleaning and geocoding daily reports");
        let summary = Pipeline::new(config).run().await;
        stop(sp);
        display_summary(&summary?);
        Ok(())
    }
}

/// The `trend` command plots national totals from the table written by `run`.
#[derive(Args, Debug)]
pub struct TrendCommand {
    #[arg(short = 'f', long, value_name = "svg|png", help = "Image format of the chart")]
    format: Option<PlotFormat>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for TrendCommand {
    async fn run(&self, config: Config) -> CovidCliResult<()> {
        info!("Running `trend` subcommand");
        let format = self.format.unwrap_or(config.plot_format);
        let df = read_wide_table(wide_table_path(&config.output_dir))?;
        let series = TrendSeries::from_wide_table(&df)?;
        let path = plot_path(&config.output_dir, TREND_PLOT_STEM, format);
        plot_trend(&series, &path, format, config.trend.tick_every)?;
        display_trend_tail(&series, TAIL_ROWS);
        println!("\nChart written to {}", path.display());
        Ok(())
    }
}

/// The `country` command plots one country from the global time series.
#[derive(Args, Debug)]
pub struct CountryCommand {
    #[arg(short = 'c', long, help = "Country name as it appears in the time series")]
    country: Option<String>,
    #[arg(long = "log", help = "Plot the natural log of the counts")]
    log_scale: bool,
    #[arg(long, help = "Keep the days before the first confirmed case")]
    no_slice: bool,
    #[arg(short = 'f', long, value_name = "svg|png", help = "Image format of the chart")]
    format: Option<PlotFormat>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CountryCommand {
    async fn run(&self, config: Config) -> CovidCliResult<()> {
        info!("Running `country` subcommand");
        let country = self.country.as_deref().unwrap_or(&config.country.name);
        let log_scale = self.log_scale || config.country.log_scale;
        let slice = config.country.slice && !self.no_slice;
        let format = self.format.unwrap_or(config.plot_format);

        let sp = spinner(self.quiet, "Downloading time series");
        let feed = fetch_timeseries(&config.country.url).await;
        stop(sp);
        let mut series = CountrySeries::from_feed(&feed?, country)?;
        if slice {
            series = series.sliced();
        }
        display_country_tail(&series, TAIL_ROWS)?;
        if log_scale {
            series = series.log_scaled();
        }

        std::fs::create_dir_all(&config.output_dir)?;
        let path = plot_path(&config.output_dir, &country_plot_stem(country), format);
        plot_country(&series, &path, format, config.country.tick_every, log_scale)?;
        println!("\nChart written to {}", path.display());
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Collects the RIVM daily Covid-19 reports per Dutch municipality",
    long_about = None,
    name = "covidnl"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        long = "config",
        value_name = "FILE",
        help = "Config file to use instead of <config dir>/covidnl/config.toml",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinners to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands available for use in the CLI.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Merge, clean and geocode the daily reports and write the exports
    Run(PipelineCommand),
    /// Plot national confirmed cases against their inflection
    Trend(TrendCommand),
    /// Plot confirmed cases, deaths and death rate for one country
    Country(CountryCommand),
}
