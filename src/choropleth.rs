use std::{collections::HashMap, io::Read};

use anyhow::{anyhow, Context};
use serde_json::{json, Value};

use crate::config::ChoroplethSources;

pub const NEUTRAL_COLOR: &str = "#d9d9d9";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// below the 25th percentile
    Low,
    LowerMiddle,
    UpperMiddle,
    /// at or above the 75th percentile
    High,
}

impl Bucket {
    pub fn color(self) -> &'static str {
        match self {
            Bucket::Low => "#fee5d9",
            Bucket::LowerMiddle => "#fcae91",
            Bucket::UpperMiddle => "#fb6a4a",
            Bucket::High => "#cb181d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

impl Thresholds {
    /// Quartiles of `values`, `None` if there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted = values.into_iter().collect::<Vec<_>>();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            p25: percentile(&sorted, 0.25),
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
        })
    }
}

/// Linear interpolation between the closest ranks of a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

pub fn classify(value: f64, thresholds: &Thresholds) -> Bucket {
    if value < thresholds.p25 {
        Bucket::Low
    } else if value < thresholds.p50 {
        Bucket::LowerMiddle
    } else if value < thresholds.p75 {
        Bucket::UpperMiddle
    } else {
        Bucket::High
    }
}

/// GDP per capita keyed by region name.
#[derive(Debug, Default)]
pub struct GdpTable {
    values: HashMap<String, f64>,
}

impl GdpTable {
    pub fn from_csv<R: Read>(
        input: R,
        name_column: &str,
        value_column: &str,
    ) -> anyhow::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(input);
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| anyhow!("GDP table has no column '{name}'"))
        };
        let name_idx = column(name_column)?;
        let value_idx = column(value_column)?;

        let mut values = HashMap::new();
        for row in rdr.records() {
            let row = row?;
            let (Some(name), Some(value)) = (row.get(name_idx), row.get(value_idx)) else {
                continue;
            };
            match value.trim().replace(',', "").parse::<f64>() {
                Ok(v) if v.is_finite() => {
                    values.insert(name.trim().to_owned(), v);
                }
                _ => log::debug!("No GDP value for '{name}'"),
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn regions(&self) -> usize {
        self.values.len()
    }

    pub fn thresholds(&self) -> Option<Thresholds> {
        Thresholds::from_values(self.values.values().copied())
    }
}

/// Boundary polygons annotated with a fill color per region.
#[derive(Debug, Clone)]
pub struct Choropleth {
    pub geojson: Value,
}

impl Choropleth {
    /// Joins `boundaries` (a GeoJSON feature collection) with `table` by the
    /// `name_property` of each feature. Each feature gets `region` (the joined
    /// name), `fill` and `gdp` properties; unmatched regions are filled with
    /// [`NEUTRAL_COLOR`].
    pub fn build(
        mut boundaries: Value,
        table: &GdpTable,
        name_property: &str,
    ) -> anyhow::Result<Self> {
        let thresholds = table.thresholds();
        let features = boundaries
            .get_mut("features")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| anyhow!("boundaries are not a GeoJSON feature collection"))?;

        let mut matched = 0;
        for feature in features.iter_mut().filter(|f| f.is_object()) {
            if !feature["properties"].is_object() {
                feature["properties"] = json!({});
            }
            let properties = &mut feature["properties"];
            let region = properties
                .get(name_property)
                .and_then(Value::as_str)
                .map(str::to_owned);
            let gdp = region.as_deref().and_then(|name| table.get(name));
            let fill = match (gdp, thresholds.as_ref()) {
                (Some(v), Some(t)) => {
                    matched += 1;
                    classify(v, t).color()
                }
                _ => NEUTRAL_COLOR,
            };
            properties["region"] = json!(region);
            properties["fill"] = json!(fill);
            properties["gdp"] = json!(gdp);
        }
        log::debug!("Matched GDP values for {matched}/{} regions", features.len());

        Ok(Self {
            geojson: boundaries,
        })
    }
}

async fn fetch_source(source: &str) -> anyhow::Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        log::debug!("Fetching {source}");
        let text = reqwest::get(source)
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    } else {
        Ok(tokio::fs::read_to_string(source).await?)
    }
}

pub async fn load_choropleth(sources: &ChoroplethSources) -> anyhow::Result<Choropleth> {
    let table = fetch_source(&sources.gdp)
        .await
        .with_context(|| format!("load GDP table from {}", sources.gdp))?;
    let table = GdpTable::from_csv(
        table.as_bytes(),
        &sources.gdp_name_column,
        &sources.gdp_value_column,
    )?;
    log::info!("Loaded GDP per capita for {} regions", table.regions());

    let boundaries = fetch_source(&sources.boundaries)
        .await
        .with_context(|| format!("load boundaries from {}", sources.boundaries))?;
    let boundaries = serde_json::from_str(&boundaries)?;

    Choropleth::build(boundaries, &table, &sources.boundary_name_property)
}
