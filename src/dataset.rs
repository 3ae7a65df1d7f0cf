use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::Context;
use regex::Regex;

use crate::structs::FilmRecord;

/// Lines before the first entry of a `locations.list` dump.
const LISTING_HEADER_LINES: usize = 14;

fn tabs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t+").unwrap())
}

fn year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d{4})\)").unwrap())
}

fn annotations() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(.*?\)|\{.*?\}").unwrap())
}

/// Parses one line of the raw listing into a record.
///
/// Returns `None` for lines without a parenthesized year or without a
/// location column.
pub fn parse_listing_line(line: &str) -> Option<FilmRecord> {
    let line = tabs().replace_all(line, "\t");
    let mut fields = line.trim().split('\t');

    let raw_title = fields.next()?;
    let year = year().captures(raw_title)?[1].parse().ok()?;
    let address = fields.next()?.trim();
    if address.is_empty() {
        return None;
    }

    let title = annotations().replace_all(raw_title, "");

    Some(FilmRecord {
        title: title.trim().to_owned(),
        year,
        address: address.to_owned(),
    })
}

/// Reads a Latin-1 encoded listing, skipping its header and footer lines.
pub fn parse_listing<R: Read>(mut input: R) -> anyhow::Result<Vec<FilmRecord>> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    // Latin-1 maps every byte to the code point of the same value
    let text = bytes.iter().map(|&b| b as char).collect::<String>();

    let lines = text.lines().collect::<Vec<_>>();
    let body = lines
        .get(LISTING_HEADER_LINES..lines.len().saturating_sub(1))
        .unwrap_or_default();

    Ok(body.iter().filter_map(|l| parse_listing_line(l)).collect())
}

pub fn write_records<W: Write>(output: W, records: &[FilmRecord]) -> anyhow::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    for r in records {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Converts a raw listing into the flat record file.
pub fn prepare_dataset(input: &Path, output: &Path) -> anyhow::Result<usize> {
    let listing = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let records = parse_listing(BufReader::new(listing))?;

    let out = File::create(output).with_context(|| format!("create {}", output.display()))?;
    write_records(BufWriter::new(out), &records)?;

    Ok(records.len())
}

/// Reads flat records, keeping only those shot in `year`.
pub fn read_records<R: Read>(input: R, year: i32) -> anyhow::Result<Vec<FilmRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let mut records = Vec::new();
    for (i, r) in rdr.deserialize::<FilmRecord>().enumerate() {
        match r {
            Ok(r) if r.year == year => records.push(r),
            Ok(_) => {}
            Err(e) => log::debug!("Skipping malformed record {}: {e}", i + 1),
        }
    }
    Ok(records)
}

pub fn load_records(path: &Path, year: i32) -> anyhow::Result<Vec<FilmRecord>> {
    let input = File::open(path).with_context(|| format!("open dataset {}", path.display()))?;
    read_records(BufReader::new(input), year)
}
