use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;

use crate::finder::{DEFAULT_MAX_RESULTS, DEFAULT_PACING};

const ENV_NAME_DATASET: &str = "FILMS_DATASET";
const ENV_NAME_OUTPUT_DIR: &str = "FILMS_OUTPUT_DIR";
const ENV_NAME_MAX_RESULTS: &str = "FILMS_MAX_RESULTS";
const ENV_NAME_GEOCODER_ENDPOINT: &str = "GEOCODER_ENDPOINT";
const ENV_NAME_GEOCODER_PACING_MS: &str = "GEOCODER_PACING_MS";
const ENV_NAME_GDP_SOURCE: &str = "GDP_SOURCE";
const ENV_NAME_GDP_NAME_COLUMN: &str = "GDP_NAME_COLUMN";
const ENV_NAME_GDP_VALUE_COLUMN: &str = "GDP_VALUE_COLUMN";
const ENV_NAME_BOUNDARIES_SOURCE: &str = "BOUNDARIES_SOURCE";
const ENV_NAME_BOUNDARY_NAME_PROPERTY: &str = "BOUNDARY_NAME_PROPERTY";

const DEFAULT_DATASET: &str = "locations.csv";
const DEFAULT_GDP_SOURCE: &str = "gdp_per_capita.csv";
const DEFAULT_GDP_NAME_COLUMN: &str = "country";
const DEFAULT_GDP_VALUE_COLUMN: &str = "gdp_per_capita";
const DEFAULT_BOUNDARIES_SOURCE: &str = "world.geojson";
const DEFAULT_BOUNDARY_NAME_PROPERTY: &str = "name";

#[derive(Debug, Clone)]
pub struct Config {
    /// Flat record file produced by `prepare`.
    pub dataset: PathBuf,
    pub output_dir: PathBuf,
    pub max_results: usize,
    pub geocoder: Geocoder,
    pub choropleth: ChoroplethSources,
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    /// Nominatim endpoint, the public OpenStreetMap instance if unset.
    pub endpoint: Option<String>,
    /// Delay between two consecutive lookups.
    pub pacing: Duration,
}

/// Where the choropleth layer comes from. Sources are file paths or
/// http(s) URLs.
#[derive(Debug, Clone)]
pub struct ChoroplethSources {
    pub gdp: String,
    pub gdp_name_column: String,
    pub gdp_value_column: String,
    pub boundaries: String,
    pub boundary_name_property: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let max_results = match var(ENV_NAME_MAX_RESULTS) {
            Some(n) => n
                .trim()
                .parse()
                .with_context(|| format!("{ENV_NAME_MAX_RESULTS}={n}"))?,
            None => DEFAULT_MAX_RESULTS,
        };
        let pacing = match var(ENV_NAME_GEOCODER_PACING_MS) {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("{ENV_NAME_GEOCODER_PACING_MS}={ms}"))?,
            ),
            None => DEFAULT_PACING,
        };

        Ok(Self {
            dataset: or(ENV_NAME_DATASET, DEFAULT_DATASET).into(),
            output_dir: or(ENV_NAME_OUTPUT_DIR, ".").into(),
            max_results,
            geocoder: Geocoder {
                endpoint: var(ENV_NAME_GEOCODER_ENDPOINT).filter(|e| !e.trim().is_empty()),
                pacing,
            },
            choropleth: ChoroplethSources {
                gdp: or(ENV_NAME_GDP_SOURCE, DEFAULT_GDP_SOURCE),
                gdp_name_column: or(ENV_NAME_GDP_NAME_COLUMN, DEFAULT_GDP_NAME_COLUMN),
                gdp_value_column: or(ENV_NAME_GDP_VALUE_COLUMN, DEFAULT_GDP_VALUE_COLUMN),
                boundaries: or(ENV_NAME_BOUNDARIES_SOURCE, DEFAULT_BOUNDARIES_SOURCE),
                boundary_name_property: or(
                    ENV_NAME_BOUNDARY_NAME_PROPERTY,
                    DEFAULT_BOUNDARY_NAME_PROPERTY,
                ),
            },
        })
    }
}
