use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use clap::{Parser, Subcommand};
use dotenv::dotenv;

mod choropleth;
mod config;
mod dataset;
mod distances;
mod finder;
mod geolocations;
mod input;
mod plotting;
mod structs;

use crate::{
    config::Config,
    finder::{NearestFilmFinder, SystemClock},
    geolocations::NominatimGeocoder,
    input::InputError,
    structs::Coordinate,
};

#[derive(Parser)]
#[command(name = "closest-films", version)]
#[command(about = "Map the ten film locations of a year closest to you", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a raw locations.list into the flat record file
    Prepare {
        /// Raw listing (Latin-1)
        #[arg(long, default_value = "locations.list")]
        input: PathBuf,

        /// Record file to write, FILMS_DATASET if not given
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate the map; missing values are asked for interactively
    Map(MapArgs),
}

#[derive(clap::Args, Default)]
struct MapArgs {
    /// Year the films were shot in
    #[arg(long)]
    year: Option<i32>,

    /// Your location as "lat, lon"
    #[arg(long)]
    location: Option<String>,

    /// Maximum time to spend geocoding, e.g. "30 seconds"
    #[arg(long)]
    wait: Option<String>,

    /// Record file produced by `prepare`
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Directory the map is written to
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

struct Query {
    year: i32,
    location: Coordinate,
    wait: Duration,
}

fn ask<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    question: &str,
) -> anyhow::Result<String> {
    input::prompt(reader, writer, question)?.ok_or_else(|| InputError::Closed.into())
}

fn read_query(args: &MapArgs) -> anyhow::Result<Query> {
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout();

    let year = match args.year {
        Some(year) => year,
        None => input::parse_year(&ask(
            &mut stdin,
            &mut stdout,
            "Please enter a year you would like to have a map for: ",
        )?)?,
    };
    let location = match &args.location {
        Some(location) => input::parse_location(location)?,
        None => input::parse_location(&ask(
            &mut stdin,
            &mut stdout,
            "Please enter your location (format: lat, long): ",
        )?)?,
    };
    let wait = match &args.wait {
        Some(wait) => input::parse_wait(wait)?,
        None => input::parse_wait(&ask(
            &mut stdin,
            &mut stdout,
            "Please enter how long you are ready to wait (e.g. 30 seconds): ",
        )?)?,
    };

    Ok(Query {
        year,
        location,
        wait,
    })
}

async fn generate_map(args: MapArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(dataset) = args.dataset.clone() {
        config.dataset = dataset;
    }
    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = dir;
    }
    let Query {
        year,
        location,
        wait,
    } = read_query(&args)?;

    println!("Map is generating...");
    let records = dataset::load_records(&config.dataset, year)?;
    log::info!(
        "{} records for {year} in {}",
        records.len(),
        config.dataset.display()
    );

    let choropleth = match choropleth::load_choropleth(&config.choropleth).await {
        Ok(choropleth) => Some(choropleth),
        Err(err) => {
            log::warn!("Rendering without GDP per capita layer: {err:#}");
            None
        }
    };

    println!("Please wait...");
    let geocoder = config.geocoder.clone();
    let max_results = config.max_results;
    let ranked = tokio::task::spawn_blocking(move || {
        NearestFilmFinder::new(NominatimGeocoder::new(geocoder.endpoint), SystemClock::default())
            .with_pacing(geocoder.pacing)
            .with_max_results(max_results)
            .find_closest(&records, location, wait)
    })
    .await?;

    for (i, film) in ranked.iter().enumerate() {
        println!("{:>2}. {} ({})", i + 1, film.title, film.coordinate);
    }

    let path = plotting::save_map(
        &config.output_dir,
        year,
        location,
        &ranked,
        choropleth.as_ref(),
    )?;
    println!("Finished. Please have look at the map {}", path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = Config::from_env()?;

    match args.command.unwrap_or(Command::Map(MapArgs::default())) {
        Command::Prepare { input, output } => {
            let output = output.unwrap_or(config.dataset);
            let count = dataset::prepare_dataset(&input, &output)?;
            println!("Wrote {count} records to {}", output.display());
        }
        Command::Map(args) => generate_map(args, config).await?,
    }

    Ok(())
}
