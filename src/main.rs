use clap::{Args, Parser, Subcommand};
use csv::WriterBuilder;
use log::{debug, error, info};
use ratemap::file::{open_writer, FileError};
use ratemap::genetic_map::DEFAULT_EFFECTIVE_POPULATION_SIZE;
use ratemap::prelude::*;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const INFO: &str = "\
ratemap: convert between physical and genetic distance
usage: ratemap [--help] <subcommand>

Subcommands:

  to-genetic:  convert physical positions to cumulative genetic distances.
  to-physical: convert cumulative genetic distances to physical positions.
  summary:     print the lengths and rates of a recombination map.
  profile:     write the rate step function and cumulative distance curve.
";

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Map(#[from] RateMapError),
    #[error("{0}")]
    GeneticMap(#[from] GeneticMapError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    File(#[from] FileError),
    #[error("TSV output error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to parse coordinate from '{0}'")]
    ParseError(String),
    #[error("One of --map or --breakpoints is required")]
    MissingMapSource,
}

#[derive(Parser)]
#[clap(name = "ratemap", version)]
#[clap(about = INFO)]
struct Cli {
    /// The log level to use, one of Off, Error, Warn, Info, Debug, Trace
    #[arg(long, default_value = "Info", value_parser = parse_level)]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    LevelFilter::from_str(level).map_err(|_| format!("unknown log level '{}'", level))
}

/// Where the recombination map comes from, and how its rates are scaled.
#[derive(Args)]
struct MapSource {
    /// a genetic map file with position, rate (cM/Mb), and cumulative map (cM) columns
    #[arg(long, conflicts_with = "breakpoints", required_unless_present = "breakpoints")]
    map: Option<PathBuf>,
    /// a TSV file of breakpoint positions and the rates of the intervals ending there
    #[arg(long)]
    breakpoints: Option<PathBuf>,
    /// the effective population size used to scale genetic map rates by 4Ne
    #[arg(long, default_value_t = DEFAULT_EFFECTIVE_POPULATION_SIZE)]
    ne: f64,
    /// use per-generation rates in Morgans rather than population-scaled rates
    #[arg(long, default_value_t = false, conflicts_with = "ne")]
    morgans: bool,
}

impl MapSource {
    fn scaling(&self) -> RateScaling {
        if self.morgans {
            RateScaling::Morgans
        } else {
            RateScaling::Population {
                effective_population_size: self.ne,
            }
        }
    }

    fn load(&self) -> Result<RecombinationMap, CliError> {
        let map = match (&self.map, &self.breakpoints) {
            (Some(path), _) => read_genetic_map(path, self.scaling())?,
            (None, Some(path)) => RecombinationMap::from_tsv(path)?,
            (None, None) => return Err(CliError::MissingMapSource),
        };
        info!(
            "loaded recombination map with {} breakpoints over [0, {}]",
            map.len(),
            map.total_physical_length()
        );
        Ok(map)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert physical positions to cumulative genetic distances.
    ///
    /// Coordinates are taken from the command line or, if none are given,
    /// one per line from standard input. Outputs a TSV with physical and
    /// genetic columns. Any position past the end of the map is an error.
    ToGenetic {
        #[command(flatten)]
        source: MapSource,
        /// the output file path (if not set, uses standard out)
        #[arg(long)]
        output: Option<PathBuf>,
        /// physical positions to convert
        coords: Vec<f64>,
    },
    /// Convert cumulative genetic distances to physical positions.
    ///
    /// Distances that fall inside a zero-rate interval have no unique
    /// physical position and are reported as errors.
    ToPhysical {
        #[command(flatten)]
        source: MapSource,
        /// the output file path (if not set, uses standard out)
        #[arg(long)]
        output: Option<PathBuf>,
        /// genetic distances to convert
        coords: Vec<f64>,
    },
    /// Print the number of breakpoints, total lengths, and rates of a map.
    Summary {
        #[command(flatten)]
        source: MapSource,
    },
    /// Write the rate step function and the cumulative genetic distance curve as TSVs.
    Profile {
        #[command(flatten)]
        source: MapSource,
        /// output path for the (position, rate) step function vertices
        #[arg(long, required = true)]
        rates: PathBuf,
        /// output path for the (position, genetic distance) curve
        #[arg(long, required = true)]
        cumulative: PathBuf,
    },
}

/// Use the coordinates given on the command line, or read them from stdin.
fn collect_coords(coords: &[f64]) -> Result<Vec<f64>, CliError> {
    if !coords.is_empty() {
        return Ok(coords.to_vec());
    }
    debug!("reading coordinates from standard input");
    let mut parsed = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        let field = line.trim();
        if field.is_empty() || field.starts_with('#') {
            continue;
        }
        let value = field
            .parse()
            .map_err(|_| CliError::ParseError(field.to_string()))?;
        parsed.push(value);
    }
    Ok(parsed)
}

fn write_pairs(
    filepath: Option<&Path>,
    header: (&str, &str),
    pairs: impl Iterator<Item = (f64, f64)>,
) -> Result<(), CliError> {
    let mut writer = open_writer(filepath)?;
    {
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(&mut writer);
        wtr.write_record([header.0, header.1])?;
        for pair in pairs {
            wtr.serialize(pair)?;
        }
        wtr.flush()?;
    }
    writer.finish()?;
    Ok(())
}

fn convert(
    source: &MapSource,
    output: Option<&Path>,
    coords: &[f64],
    to_genetic: bool,
) -> Result<(), CliError> {
    let map = source.load()?;
    let inputs = collect_coords(coords)?;
    let converted = if to_genetic {
        map.physical_to_genetic_many(&inputs)?
    } else {
        map.genetic_to_physical_many(&inputs)?
    };
    let header = if to_genetic {
        ("physical", "genetic")
    } else {
        ("genetic", "physical")
    };
    info!("converted {} coordinates", inputs.len());
    write_pairs(
        output,
        header,
        inputs.iter().copied().zip(converted.iter().copied()),
    )
}

fn summary(source: &MapSource) -> Result<(), CliError> {
    let map = source.load()?;
    println!("breakpoints\t{}", map.len());
    println!("physical_length\t{}", map.total_physical_length());
    println!("genetic_length\t{}", map.total_genetic_length());
    println!("mean_rate\t{:e}", map.mean_rate());
    println!("max_rate\t{:e}", map.max_rate());
    Ok(())
}

fn profile(source: &MapSource, rates: &Path, cumulative: &Path) -> Result<(), CliError> {
    let map = source.load()?;
    write_pairs(
        Some(rates),
        ("position", "rate"),
        map.rate_steps().into_iter(),
    )?;
    write_pairs(
        Some(cumulative),
        ("position", "genetic"),
        map.cumulative_curve().into_iter(),
    )?;
    info!(
        "wrote rate profile to {} and cumulative curve to {}",
        rates.display(),
        cumulative.display()
    );
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Some(Commands::ToGenetic {
            source,
            output,
            coords,
        }) => convert(source, output.as_deref(), coords, true),
        Some(Commands::ToPhysical {
            source,
            output,
            coords,
        }) => convert(source, output.as_deref(), coords, false),
        Some(Commands::Summary { source }) => summary(source),
        Some(Commands::Profile {
            source,
            rates,
            cumulative,
        }) => profile(source, rates, cumulative),
        None => {
            println!("{}\n", INFO);
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = TermLogger::init(
        cli.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Warning: could not initialise logging: {}", e);
    }

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
