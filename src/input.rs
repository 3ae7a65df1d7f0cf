use std::{
    io::{self, BufRead, Write},
    time::Duration,
};

use thiserror::Error;

use crate::structs::Coordinate;

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("'{0}' is not a year")]
    Year(String),
    #[error("'{0}' is not a location, expected 'lat, lon'")]
    Location(String),
    #[error("location {0} is outside of the globe")]
    OffGlobe(Coordinate),
    #[error("'{0}' is not a wait time, expected e.g. '30', '30s' or '2 minutes'")]
    Wait(String),
    #[error("no input given")]
    Closed,
}

pub fn parse_year(s: &str) -> Result<i32, InputError> {
    s.trim().parse().map_err(|_| InputError::Year(s.to_owned()))
}

/// Parses a `"lat, lon"` pair in decimal degrees.
pub fn parse_location(s: &str) -> Result<Coordinate, InputError> {
    let err = || InputError::Location(s.to_owned());
    let (lat, lon) = s.split_once(',').ok_or_else(err)?;
    let lat = lat.trim().parse::<f64>().map_err(|_| err())?;
    let lon = lon.trim().parse::<f64>().map_err(|_| err())?;

    let coordinate = Coordinate::new(lat, lon);
    if coordinate.is_on_globe() {
        Ok(coordinate)
    } else {
        Err(InputError::OffGlobe(coordinate))
    }
}

/// Parses a wait budget such as `30`, `12.5s`, `30 seconds` or `2 min`.
/// Without a unit the value is taken as seconds.
pub fn parse_wait(s: &str) -> Result<Duration, InputError> {
    let err = || InputError::Wait(s.to_owned());
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value = number.trim().parse::<f64>().map_err(|_| err())?;
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        _ => return Err(err()),
    };
    Duration::try_from_secs_f64(value * scale).map_err(|_| err())
}

/// Prints `question` and reads one line from `input`.
pub fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<Option<String>> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_owned()))
}
