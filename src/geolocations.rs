use geocoding::{Forward, Openstreetmap, Point};
use thiserror::Error;

use crate::structs::Coordinate;

#[derive(Debug, Error)]
pub enum LookupFailure {
    #[error("no match for address")]
    NotFound,
    #[error("geocoding provider unavailable: {0}")]
    Unavailable(String),
}

pub trait Geocoder {
    fn lookup(&self, address: &str) -> Result<Coordinate, LookupFailure>;

    /// Best-effort lookup: both failure kinds collapse into `None`.
    fn resolve(&self, address: &str) -> Option<Coordinate> {
        match self.lookup(address) {
            Ok(coordinate) => {
                log::debug!("Resolved '{address}' to {coordinate}");
                Some(coordinate)
            }
            Err(LookupFailure::NotFound) => {
                log::debug!("No location found for '{address}'");
                None
            }
            Err(err) => {
                log::warn!("Failed to resolve '{address}': {err}");
                None
            }
        }
    }
}

impl<G: Geocoder + ?Sized> Geocoder for &G {
    fn lookup(&self, address: &str) -> Result<Coordinate, LookupFailure> {
        (**self).lookup(address)
    }
}

/// Forward geocoding through OpenStreetMap Nominatim.
pub struct NominatimGeocoder {
    provider: Openstreetmap,
}

impl NominatimGeocoder {
    pub fn new(endpoint: Option<String>) -> Self {
        let provider = match endpoint {
            Some(endpoint) => Openstreetmap::new_with_endpoint(endpoint),
            None => Openstreetmap::new(),
        };
        Self { provider }
    }
}

impl Geocoder for NominatimGeocoder {
    fn lookup(&self, address: &str) -> Result<Coordinate, LookupFailure> {
        let points: Vec<Point<f64>> = self
            .provider
            .forward(address)
            .map_err(|err| LookupFailure::Unavailable(err.to_string()))?;
        first_hit(&points)
    }
}

/// Nominatim ranks its answers, so the first one is taken. Points are
/// `x = longitude`, `y = latitude`.
fn first_hit(points: &[Point<f64>]) -> Result<Coordinate, LookupFailure> {
    points
        .first()
        .map(|p| Coordinate::new(p.y(), p.x()))
        .ok_or(LookupFailure::NotFound)
}
