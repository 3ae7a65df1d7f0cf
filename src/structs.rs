use std::fmt;

#[derive(Debug, serde::Deserialize, serde::Serialize, Clone, PartialEq, Eq)]
pub struct FilmRecord {
    pub title: String,
    pub year: i32,
    pub address: String,
}

/// A point on the globe in decimal degrees.
#[derive(Debug, serde::Serialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_on_globe(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

#[derive(Debug, serde::Serialize, Clone, PartialEq)]
pub struct RankedFilm {
    pub title: String,
    pub coordinate: Coordinate,
}
