use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde_json::json;

use crate::{
    choropleth::{Bucket, Choropleth, NEUTRAL_COLOR},
    structs::{Coordinate, RankedFilm},
};

const LEAFLET_CSS_URL: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS_URL: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

const MAP_CSS: &str = "html, body, #map { height: 100%; margin: 0; }";

// Expects `data` to be defined by the preceding script.
const MAP_JS: &str = r##"
function latLng(c) {
  return [c.latitude, c.longitude];
}

function label(text) {
  const span = document.createElement("span");
  span.textContent = text;
  return span;
}

const map = L.map("map").setView(latLng(data.query), 4);
const tiles = L.tileLayer("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", {
  maxZoom: 19,
  attribution: "&copy; OpenStreetMap contributors"
}).addTo(map);

const you = L.layerGroup([
  L.marker(latLng(data.query)).bindTooltip(label("You are here"))
]).addTo(map);

const films = L.layerGroup(data.films.map(function (film) {
  return L.circleMarker(latLng(film.coordinate), { radius: 8, color: "#08519c", fillOpacity: 0.8 })
    .bindTooltip(label(film.title));
})).addTo(map);

const overlays = { "Your location": you, ["Films of " + data.year]: films };

if (data.choropleth) {
  const gdp = L.geoJSON(data.choropleth, {
    style: function (feature) {
      const fill = (feature.properties && feature.properties.fill) || data.neutral;
      return { fillColor: fill, color: "#555", weight: 0.5, fillOpacity: 0.6 };
    },
    onEachFeature: function (feature, layer) {
      const p = feature.properties || {};
      if (p.gdp !== null && p.gdp !== undefined) {
        layer.bindTooltip(label(p.region + ": " + p.gdp));
      }
    }
  }).addTo(map);
  gdp.bringToBack();
  overlays["GDP per capita"] = gdp;
}

L.control.layers({ "OpenStreetMap": tiles }, overlays).addTo(map);
"##;

pub fn map_file_name(year: i32) -> String {
    format!("{year}_movies_map.html")
}

/// Serializes `value` for a `<script>` element. JSON only has `<` inside
/// strings, where `<` means the same, so no tag can start in the data.
fn script_json(value: &serde_json::Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}

fn leaflet_links() -> Markup {
    html! {
        link rel="stylesheet" href=(LEAFLET_CSS_URL);
        script src=(LEAFLET_JS_URL) {}
    }
}

fn map_scripts(data: &serde_json::Value) -> anyhow::Result<Markup> {
    let data = format!("const data = {};", script_json(data)?);
    Ok(html! {
        script { (PreEscaped(data)) }
        script { (PreEscaped(MAP_JS)) }
    })
}

/// Renders a standalone Leaflet page with the query location, one marker per
/// film and, if given, the GDP choropleth. Every layer can be toggled.
pub fn render_map(
    year: i32,
    query: Coordinate,
    films: &[RankedFilm],
    choropleth: Option<&Choropleth>,
) -> anyhow::Result<String> {
    let data = json!({
        "year": year,
        "query": query,
        "films": films,
        "choropleth": choropleth.map(|c| &c.geojson),
        "neutral": NEUTRAL_COLOR,
        "legend": [
            Bucket::Low.color(),
            Bucket::LowerMiddle.color(),
            Bucket::UpperMiddle.color(),
            Bucket::High.color(),
        ],
    });

    let page = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Films of " (year) }
                (leaflet_links())
                style { (PreEscaped(MAP_CSS)) }
            }
            body {
                div id="map" {}
                (map_scripts(&data)?)
            }
        }
    };
    Ok(page.into_string())
}

/// Writes `{year}_movies_map.html` into `dir` and returns its path.
pub fn save_map(
    dir: &Path,
    year: i32,
    query: Coordinate,
    films: &[RankedFilm],
    choropleth: Option<&Choropleth>,
) -> anyhow::Result<PathBuf> {
    let html = render_map(year, query, films, choropleth)?;
    let path = dir.join(map_file_name(year));

    let output = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    let mut output = BufWriter::new(output);
    output.write_all(html.as_bytes())?;
    output.flush()?;

    Ok(path)
}
