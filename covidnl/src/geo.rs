//! Attaching coordinates to municipalities.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use itertools::izip;
use log::{debug, info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::GeocoderConfig;
use crate::error::CovidError;
use crate::table::CombinedTable;
use crate::COL;

const BUNDLED_OVERRIDES: &str = include_str!("../data/coordinate_overrides.toml");

/// Latitude and longitude in degrees. The default value is the sentinel written for
/// municipalities that could not be located.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Resolves a free-text place name to a coordinate. `Ok(None)` means the service answered but
/// knows no such place.
#[allow(async_fn_in_trait)]
pub trait Geocoder {
    async fn geocode(&self, name: &str) -> Result<Option<Coordinate>>;
}

#[derive(Deserialize, Debug)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Geocoder backed by a Nominatim search endpoint.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    country_codes: Option<String>,
    retries: u32,
    delay: Duration,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country_codes: config.country_codes.clone(),
            retries: config.retries,
            delay: Duration::from_millis(config.delay_ms),
        })
    }

    async fn search(&self, name: &str) -> Result<Option<Coordinate>> {
        let mut params = vec![("q", name), ("format", "json"), ("limit", "1")];
        if let Some(codes) = self.country_codes.as_deref() {
            params.push(("countrycodes", codes));
        }
        let url = reqwest::Url::parse_with_params(&format!("{}/search", self.base_url), &params)?;
        let places: Vec<NominatimPlace> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        debug!("'{name}' resolved to '{}'", place.display_name);
        let coordinate = Coordinate::new(
            place
                .lat
                .parse()
                .with_context(|| format!("Invalid latitude '{}'", place.lat))?,
            place
                .lon
                .parse()
                .with_context(|| format!("Invalid longitude '{}'", place.lon))?,
        );
        Ok(Some(coordinate))
    }
}

impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, name: &str) -> Result<Option<Coordinate>> {
        let mut attempt = 0;
        loop {
            // The public service allows one request per second
            tokio::time::sleep(self.delay).await;
            match self.search(name).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    debug!("Lookup of '{name}' failed (attempt {attempt}): {err}");
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "Lookup of '{name}' failed after {} attempts",
                        attempt + 1
                    )))
                }
            }
        }
    }
}

/// Geocoder results persisted as a `city,latitude,longitude` CSV. Every insert is written
/// through, so an interrupted run keeps what it already resolved.
#[derive(Debug, Default)]
pub struct CoordinateCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Coordinate>,
}

impl CoordinateCache {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the cache at `path`. A missing file gives an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            read_coordinates(&path)
                .with_context(|| format!("Failed to read coordinate cache '{}'", path.display()))?
        } else {
            BTreeMap::new()
        };
        info!(
            "Loaded {} cached coordinates from '{}'",
            entries.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn get(&self, city: &str) -> Option<Coordinate> {
        self.entries.get(city).copied()
    }

    pub fn insert(&mut self, city: &str, coordinate: Coordinate) -> Result<()> {
        self.entries.insert(city.to_string(), coordinate);
        if let Some(path) = &self.path {
            write_coordinates(path, &self.entries)
                .with_context(|| format!("Failed to write coordinate cache '{}'", path.display()))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_coordinates(path: &Path) -> Result<BTreeMap<String, Coordinate>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    let latitudes = df.column(COL::LATITUDE)?.cast(&DataType::Float64)?;
    let longitudes = df.column(COL::LONGITUDE)?.cast(&DataType::Float64)?;
    let entries = izip!(
        df.column(COL::CITY)?.str()?,
        latitudes.f64()?,
        longitudes.f64()?
    )
    .filter_map(|(city, latitude, longitude)| {
        Some((city?.to_string(), Coordinate::new(latitude?, longitude?)))
    })
    .collect();
    Ok(entries)
}

fn write_coordinates(path: &Path, entries: &BTreeMap<String, Coordinate>) -> Result<()> {
    let mut df = DataFrame::new(vec![
        Series::new(COL::CITY, entries.keys().map(String::as_str).collect::<Vec<_>>()),
        Series::new(
            COL::LATITUDE,
            entries.values().map(|c| c.latitude).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::LONGITUDE,
            entries.values().map(|c| c.longitude).collect::<Vec<_>>(),
        ),
    ])?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}

#[derive(Serialize, Deserialize, Debug)]
struct OverrideEntry {
    city: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct OverridesFile {
    #[serde(default)]
    location: Vec<OverrideEntry>,
}

/// Manual coordinates that always replace whatever the geocoder returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinateOverrides(BTreeMap<String, Coordinate>);

impl CoordinateOverrides {
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: OverridesFile = toml::from_str(contents)
            .map_err(|err| CovidError::InvalidOverrides(err.to_string()))?;
        let mut overrides = BTreeMap::new();
        for entry in file.location {
            let coordinate = Coordinate::new(entry.latitude, entry.longitude);
            if !coordinate.is_valid() {
                return Err(CovidError::InvalidOverrides(format!(
                    "'{}' has out of range coordinates {coordinate:?}",
                    entry.city
                ))
                .into());
            }
            if overrides.insert(entry.city.clone(), coordinate).is_some() {
                return Err(CovidError::InvalidOverrides(format!(
                    "'{}' is listed more than once",
                    entry.city
                ))
                .into());
            }
        }
        Ok(Self(overrides))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read coordinate overrides '{}'", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn bundled() -> Result<Self> {
        Self::from_toml(BUNDLED_OVERRIDES)
    }

    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(Self::bundled, Self::load)
    }

    pub fn get(&self, city: &str) -> Option<Coordinate> {
        self.0.get(city).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Coordinate)> {
        self.0.iter().map(|(city, coordinate)| (city.as_str(), *coordinate))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct EnrichReport {
    pub from_cache: usize,
    pub looked_up: usize,
    pub overridden: usize,
    /// Municipalities left without coordinates; they export with the sentinel coordinate.
    pub unresolved: Vec<String>,
}

/// Looks up every municipality without a coordinate, then applies the overrides. Lookups run
/// one after another and overrides are only applied once all of them have finished.
pub async fn enrich<G: Geocoder>(
    table: &CombinedTable,
    geocoder: &G,
    cache: &mut CoordinateCache,
    overrides: &CoordinateOverrides,
) -> Result<(CombinedTable, EnrichReport)> {
    let mut report = EnrichReport::default();
    let mut resolved: Vec<(&str, Coordinate)> = vec![];
    let pending = table
        .rows()
        .iter()
        .filter(|row| row.coordinate.is_none())
        .map(|row| row.city.as_str());

    for city in pending {
        if let Some(coordinate) = cache.get(city) {
            report.from_cache += 1;
            resolved.push((city, coordinate));
            continue;
        }
        match geocoder.geocode(city).await {
            Ok(Some(coordinate)) => {
                report.looked_up += 1;
                cache.insert(city, coordinate)?;
                resolved.push((city, coordinate));
            }
            Ok(None) => debug!("No match for '{city}'"),
            Err(err) => warn!("{err:#}"),
        }
    }
    info!(
        "Coordinates: {} from cache, {} looked up",
        report.from_cache, report.looked_up
    );

    let table = table.with_coordinates(resolved);
    let overridden = overrides
        .iter()
        .filter(|(city, _)| table.row(city).is_some())
        .collect::<Vec<_>>();
    report.overridden = overridden.len();
    let table = table.with_coordinates(overridden);

    report.unresolved = table
        .rows()
        .iter()
        .filter(|row| row.coordinate.is_none())
        .map(|row| row.city.clone())
        .collect();
    for city in &report.unresolved {
        warn!("No coordinates for '{city}'; add it to the coordinate overrides");
    }
    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DailyReport;
    use httpmock::prelude::*;
    use nonempty::nonempty;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeGeocoder {
        places: HashMap<String, Coordinate>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn with(places: &[(&str, f64, f64)]) -> Self {
            Self {
                places: places
                    .iter()
                    .map(|(name, lat, lon)| (name.to_string(), Coordinate::new(*lat, *lon)))
                    .collect(),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, name: &str) -> Result<Option<Coordinate>> {
            self.calls.lock().unwrap().push(name.to_string());
            Ok(self.places.get(name).copied())
        }
    }

    fn city_table(cities: &[&str]) -> CombinedTable {
        let counts = cities.iter().map(|city| (city.to_string(), 1.0)).collect();
        CombinedTable::merge(&nonempty![DailyReport::new("r1.csv", counts)])
    }

    fn overrides(entries: &str) -> CoordinateOverrides {
        CoordinateOverrides::from_toml(entries).unwrap()
    }

    #[tokio::test]
    async fn overrides_should_win_over_lookup() {
        // The geocoder finds Harlingen, Texas
        let geocoder = FakeGeocoder::with(&[("Harlingen", 26.19, -97.69), ("Ede", 52.04, 5.66)]);
        let overrides = overrides(
            "[[location]]\ncity = \"Harlingen\"\nlatitude = 53.17364\nlongitude = 5.42087\n",
        );
        let mut cache = CoordinateCache::in_memory();
        let table = city_table(&["Ede", "Harlingen"]);
        let (table, report) = enrich(&table, &geocoder, &mut cache, &overrides)
            .await
            .unwrap();
        assert_eq!(
            table.row("Harlingen").unwrap().coordinate,
            Some(Coordinate::new(53.17364, 5.42087))
        );
        assert_eq!(
            table.row("Ede").unwrap().coordinate,
            Some(Coordinate::new(52.04, 5.66))
        );
        assert_eq!(report.overridden, 1);
        assert!(report.unresolved.is_empty());
    }

    #[tokio::test]
    async fn override_should_cover_failed_lookup() {
        let geocoder = FakeGeocoder::default();
        let overrides =
            overrides("[[location]]\ncity = \"Epe\"\nlatitude = 52.34781\nlongitude = 5.98399\n");
        let mut cache = CoordinateCache::in_memory();
        let table = city_table(&["Epe", "Nergenshuizen"]);
        let (table, report) = enrich(&table, &geocoder, &mut cache, &overrides)
            .await
            .unwrap();
        assert_eq!(
            table.row("Epe").unwrap().coordinate,
            Some(Coordinate::new(52.34781, 5.98399))
        );
        assert_eq!(table.row("Nergenshuizen").unwrap().coordinate, None);
        assert_eq!(report.unresolved, vec!["Nergenshuizen".to_string()]);
    }

    #[tokio::test]
    async fn cached_coordinates_should_not_be_looked_up_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache_path = dir.path().join("coordinates.csv");
        let geocoder = FakeGeocoder::with(&[("Ede", 52.04, 5.66), ("Epe", 52.35, 5.98)]);
        let no_overrides = CoordinateOverrides::default();

        let mut cache = CoordinateCache::open(&cache_path).unwrap();
        enrich(&city_table(&["Ede", "Epe"]), &geocoder, &mut cache, &no_overrides)
            .await
            .unwrap();
        assert_eq!(geocoder.calls(), vec!["Ede", "Epe"]);

        let mut reopened = CoordinateCache::open(&cache_path).unwrap();
        assert_eq!(reopened.len(), 2);
        let table = city_table(&["Ede", "Epe", "Goes"]);
        let (table, report) = enrich(&table, &geocoder, &mut reopened, &no_overrides)
            .await
            .unwrap();
        assert_eq!(geocoder.calls(), vec!["Ede", "Epe", "Goes"]);
        assert_eq!(report.from_cache, 2);
        assert_eq!(
            table.row("Epe").unwrap().coordinate,
            Some(Coordinate::new(52.35, 5.98))
        );
    }

    #[test]
    fn bundled_overrides_should_parse() {
        let overrides = CoordinateOverrides::bundled().unwrap();
        assert_eq!(overrides.len(), 16);
        assert_eq!(
            overrides.get("Vlissingen"),
            Some(Coordinate::new(51.455681, 3.576490))
        );
    }

    #[test]
    fn out_of_range_override_should_be_rejected() {
        let result = CoordinateOverrides::from_toml(
            "[[location]]\ncity = \"Goes\"\nlatitude = 351.5\nlongitude = 3.89\n",
        );
        assert!(result.is_err());
    }

    fn geocoder_config(server: &MockServer) -> GeocoderConfig {
        GeocoderConfig {
            base_url: server.base_url(),
            delay_ms: 0,
            timeout_secs: 5,
            ..GeocoderConfig::default()
        }
    }

    #[tokio::test]
    async fn nominatim_should_parse_first_match() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/search")
                    .query_param("q", "Utrecht")
                    .query_param("format", "json")
                    .query_param("countrycodes", "nl");
                then.status(200).json_body(json!([
                    {"lat": "52.0907006", "lon": "5.1215634", "display_name": "Utrecht, Nederland"}
                ]));
            })
            .await;
        let geocoder = NominatimGeocoder::new(&geocoder_config(&server)).unwrap();
        let coordinate = geocoder.geocode("Utrecht").await.unwrap();
        mock.assert_async().await;
        assert_eq!(coordinate, Some(Coordinate::new(52.0907006, 5.1215634)));
    }

    #[tokio::test]
    async fn nominatim_should_return_none_without_matches() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).json_body(json!([]));
            })
            .await;
        let geocoder = NominatimGeocoder::new(&geocoder_config(&server)).unwrap();
        assert_eq!(geocoder.geocode("Nergenshuizen").await.unwrap(), None);
    }

    #[tokio::test]
    async fn nominatim_should_retry_failed_requests() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(503);
            })
            .await;
        let config = GeocoderConfig {
            retries: 2,
            ..geocoder_config(&server)
        };
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        assert!(geocoder.geocode("Utrecht").await.is_err());
        mock.assert_hits_async(3).await;
    }
}
