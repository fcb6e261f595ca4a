//! Loading external genetic maps into a [`RecombinationMap`].
//!
//! The supported format is the whitespace-delimited three column layout used
//! by the HapMap / 1000 Genomes per-chromosome maps:
//!
//! ```text
//! position COMBINED_rate(cM/Mb) Genetic_Map(cM)
//! 55550    2.981822             0
//! 82571    2.082414             0.080572
//! 88169    2.081358             0.092229
//! ```
//!
//! The rate on each row applies to the interval between that row and the
//! next, so the rate on the final row is unused. Rates in cM/Mb are converted
//! to Morgans per base pair and optionally scaled by `4 Ne` to give
//! population-scaled rates.

use log::{debug, info};
use std::io::{self, BufRead};
use std::path::Path;
use thiserror::Error;

use crate::file::{FileError, InputFile};
use crate::numeric::is_coordinate;
use crate::ratemap::{Breakpoint, Position, RateFloat, RateMapError, RecombinationMap};

/// Converts cM/Mb to Morgans per base pair.
pub const CM_MB_CONVERSION: RateFloat = 1e-8;

/// Centimorgans per Morgan.
const CM_PER_MORGAN: RateFloat = 100.0;

/// The effective population size used when none is given.
pub const DEFAULT_EFFECTIVE_POPULATION_SIZE: f64 = 10_000.0;

#[derive(Error, Debug)]
pub enum GeneticMapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("File reading error: {0}")]
    File(#[from] FileError),
    #[error("Failed to parse genetic map at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Genetic map not sorted at line {line}")]
    NotSorted { line: usize },
    #[error("Improper rate value, either NaN or negative, at line {line}")]
    ImproperRate { line: usize },
    #[error("Genetic map needs at least two records, found {0}")]
    TooFewRecords(usize),
    #[error("Invalid rate scaling: {0}")]
    InvalidScaling(String),
    #[error("Recombination map error: {0}")]
    Map(#[from] RateMapError),
}

/// How rates read from a genetic map are rescaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateScaling {
    /// Per-generation rates in Morgans per base pair.
    Morgans,
    /// Population-scaled rates, `4 Ne` times the per-generation rate.
    Population { effective_population_size: f64 },
}

impl Default for RateScaling {
    fn default() -> Self {
        RateScaling::Population {
            effective_population_size: DEFAULT_EFFECTIVE_POPULATION_SIZE,
        }
    }
}

impl RateScaling {
    /// The multiplier applied to per-generation rates.
    pub fn factor(&self) -> Result<f64, GeneticMapError> {
        match *self {
            RateScaling::Morgans => Ok(1.0),
            RateScaling::Population {
                effective_population_size: ne,
            } => {
                if ne.is_finite() && ne > 0.0 {
                    Ok(4.0 * ne)
                } else {
                    Err(GeneticMapError::InvalidScaling(format!(
                        "effective population size must be positive, got {}",
                        ne
                    )))
                }
            }
        }
    }
}

/// One row of a genetic map file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneticMapRecord {
    pub position: Position,
    /// Recombination rate in cM/Mb from this position to the next.
    pub rate: RateFloat,
    /// Cumulative map position in cM.
    pub map_cm: RateFloat,
}

/// The sorted rows of a single-chromosome genetic map file.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneticMapFile {
    records: Vec<GeneticMapRecord>,
}

fn parse_field(field: Option<&str>, line: usize, name: &str) -> Result<f64, GeneticMapError> {
    let field = field.ok_or_else(|| GeneticMapError::Parse {
        line,
        message: format!("missing {} column", name),
    })?;
    field.parse().map_err(|_| GeneticMapError::Parse {
        line,
        message: format!("failed to parse {} from '{}'", name, field),
    })
}

fn looks_like_header(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .map_or(false, |first| first.parse::<f64>().is_err())
}

impl GeneticMapFile {
    /// Read a genetic map file, which may be gzip-compressed.
    ///
    /// A first row whose leading field is not numeric is taken as a header.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn read(filepath: impl AsRef<Path>) -> Result<Self, GeneticMapError> {
        let input_file = InputFile::new(filepath.as_ref());

        let mut skip_header = input_file
            .first_data_line()?
            .map_or(false, |line| looks_like_header(&line));
        debug!(
            "{}: header {}",
            input_file.filepath.display(),
            if skip_header { "found" } else { "absent" }
        );

        let mut records: Vec<GeneticMapRecord> = Vec::new();
        for (i, line) in input_file.reader()?.lines().enumerate() {
            let line_num = i + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if skip_header {
                skip_header = false;
                continue;
            }

            let mut fields = line.split_whitespace();
            let position = parse_field(fields.next(), line_num, "position")?;
            let rate = parse_field(fields.next(), line_num, "rate")?;
            let map_cm = parse_field(fields.next(), line_num, "map position")?;

            if !is_coordinate(position) {
                return Err(GeneticMapError::Parse {
                    line: line_num,
                    message: format!("improper position {}", position),
                });
            }
            if !rate.is_finite() || rate < 0.0 {
                return Err(GeneticMapError::ImproperRate { line: line_num });
            }
            if let Some(last) = records.last() {
                if position <= last.position {
                    return Err(GeneticMapError::NotSorted { line: line_num });
                }
            }

            records.push(GeneticMapRecord {
                position,
                rate,
                map_cm,
            });
        }

        if records.len() < 2 {
            return Err(GeneticMapError::TooFewRecords(records.len()));
        }
        info!(
            "read {} genetic map records from {}",
            records.len(),
            input_file.filepath.display()
        );
        Ok(Self { records })
    }

    /// Build from records already in memory, with the same checks as [`GeneticMapFile::read`].
    pub fn from_records(records: Vec<GeneticMapRecord>) -> Result<Self, GeneticMapError> {
        if records.len() < 2 {
            return Err(GeneticMapError::TooFewRecords(records.len()));
        }
        if let Some(i) = records.iter().position(|r| !is_coordinate(r.position)) {
            return Err(GeneticMapError::Parse {
                line: i + 1,
                message: format!("improper position {}", records[i].position),
            });
        }
        for (i, pair) in records.windows(2).enumerate() {
            if pair[1].position <= pair[0].position {
                return Err(GeneticMapError::NotSorted { line: i + 2 });
            }
        }
        if let Some(i) = records
            .iter()
            .position(|r| !r.rate.is_finite() || r.rate < 0.0)
        {
            return Err(GeneticMapError::ImproperRate { line: i + 1 });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[GeneticMapRecord] {
        &self.records
    }

    /// The position of the last record.
    pub fn physical_length(&self) -> Position {
        self.records.last().map_or(0.0, |r| r.position)
    }

    /// The expected number of crossovers per generation over the whole map,
    /// i.e. the final map position in Morgans.
    pub fn num_crossovers(&self) -> RateFloat {
        self.records.last().map_or(0.0, |r| r.map_cm) / CM_PER_MORGAN
    }

    /// The average rate over the whole map, per base pair.
    pub fn overall_rate(&self, scaling: RateScaling) -> Result<RateFloat, GeneticMapError> {
        Ok(scaling.factor()? * self.num_crossovers() / self.physical_length())
    }

    /// The widths of the intervals between consecutive records.
    pub fn spans(&self) -> Vec<Position> {
        self.records
            .windows(2)
            .map(|pair| pair[1].position - pair[0].position)
            .collect()
    }

    /// The rescaled rate of each interval between consecutive records.
    pub fn scaled_rates(&self, scaling: RateScaling) -> Result<Vec<RateFloat>, GeneticMapError> {
        let factor = scaling.factor()?;
        Ok(self.records[..self.records.len() - 1]
            .iter()
            .map(|r| factor * r.rate * CM_MB_CONVERSION)
            .collect())
    }

    /// The rescaled genetic length of each interval between consecutive records.
    pub fn interval_masses(&self, scaling: RateScaling) -> Result<Vec<RateFloat>, GeneticMapError> {
        Ok(self
            .spans()
            .iter()
            .zip(self.scaled_rates(scaling)?)
            .map(|(&span, rate)| span * rate)
            .collect())
    }

    /// Convert to a [`RecombinationMap`] of rescaled rates.
    ///
    /// The stretch before the first record carries no information, so if the
    /// first record is not at zero it is given a rate of zero.
    pub fn to_recombination_map(
        &self,
        scaling: RateScaling,
    ) -> Result<RecombinationMap, GeneticMapError> {
        let rates = self.scaled_rates(scaling)?;
        let mut breakpoints = Vec::with_capacity(self.records.len());

        let first = self.records[0].position;
        if first > 0.0 {
            debug!("padding unmapped prefix [0, {}] with rate zero", first);
            breakpoints.push(Breakpoint::new(first, 0.0));
        }
        breakpoints.extend(
            self.records[1..]
                .iter()
                .zip(rates)
                .map(|(record, rate)| Breakpoint::new(record.position, rate)),
        );

        Ok(RecombinationMap::new(breakpoints)?)
    }
}

/// Read a genetic map file and convert it to a [`RecombinationMap`].
pub fn read_genetic_map(
    filepath: impl AsRef<Path>,
    scaling: RateScaling,
) -> Result<RecombinationMap, GeneticMapError> {
    GeneticMapFile::read(filepath)?.to_recombination_map(scaling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::OutputFile;
    use crate::numeric::{assert_float_eq, assert_floats_eq};
    use std::io::Write;
    use tempfile::tempdir;

    const TEST_MAP: &str = "tests/data/genetic_map_test.txt";

    fn write_map(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.txt");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_with_header() {
        let gm = GeneticMapFile::read(TEST_MAP).unwrap();
        assert_eq!(gm.records().len(), 5);
        assert_eq!(gm.records()[0].position, 55550.0);
        assert_eq!(gm.physical_length(), 564598.0);
        assert_float_eq(gm.num_crossovers(), 0.01478148, 1e-12);
    }

    #[test]
    fn test_read_without_header() {
        let (_dir, path) = write_map("# no header\n100 1.0 0\n\n200 2.0 0.0001\n");
        let gm = GeneticMapFile::read(&path).unwrap();
        assert_eq!(gm.records().len(), 2);
        assert_eq!(gm.records()[1].rate, 2.0);
    }

    #[test]
    fn test_read_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.txt.gz");
        {
            let mut writer = OutputFile::new(&path, None).writer().unwrap();
            write!(writer, "{}", std::fs::read_to_string(TEST_MAP).unwrap()).unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(
            GeneticMapFile::read(&path).unwrap(),
            GeneticMapFile::read(TEST_MAP).unwrap()
        );
    }

    #[test]
    fn test_map_matches_cumulative_column() {
        let gm = GeneticMapFile::read(TEST_MAP).unwrap();
        let map = gm.to_recombination_map(RateScaling::Morgans).unwrap();
        // padded prefix plus one breakpoint per interval
        assert_eq!(map.len(), 5);
        assert_eq!(map.breakpoints()[0], Breakpoint::new(55550.0, 0.0));
        for record in gm.records() {
            let morgans = map.physical_to_genetic(record.position).unwrap();
            assert_float_eq(morgans * CM_PER_MORGAN, record.map_cm, 1e-4);
        }
        assert!(map.physical_to_genetic(564599.0).is_err());
    }

    #[test]
    fn test_population_scaling() {
        let gm = GeneticMapFile::read(TEST_MAP).unwrap();
        let scaling = RateScaling::Population {
            effective_population_size: 1e4,
        };
        let morgans = gm.to_recombination_map(RateScaling::Morgans).unwrap();
        let scaled = gm.to_recombination_map(scaling).unwrap();
        assert_float_eq(
            scaled.total_genetic_length(),
            4e4 * morgans.total_genetic_length(),
            1e-6,
        );
        assert_float_eq(
            gm.overall_rate(scaling).unwrap(),
            4e4 * 0.01478148 / 564598.0,
            1e-12,
        );
        assert_eq!(scaling, RateScaling::default());
    }

    #[test]
    fn test_interval_masses() {
        let gm = GeneticMapFile::read(TEST_MAP).unwrap();
        assert_floats_eq(
            &gm.spans(),
            &[27021.0, 5598.0, 166827.0, 309602.0],
            1e-9,
        );
        let masses = gm.interval_masses(RateScaling::Morgans).unwrap();
        assert_eq!(masses.len(), 4);
        assert_float_eq(masses[0], 27021.0 * 2.981822e-8, 1e-12);
    }

    #[test]
    fn test_map_starting_at_zero_is_not_padded() {
        let (_dir, path) = write_map("0 1.0 0\n1000000 1.0 1.0\n");
        let map = read_genetic_map(&path, RateScaling::Morgans).unwrap();
        assert_eq!(map.len(), 1);
        assert_float_eq(map.total_genetic_length(), 0.01, 1e-12);
    }

    #[test]
    fn test_unsorted() {
        let (_dir, path) = write_map("pos rate map\n200 1.0 0\n100 1.0 0.1\n");
        match GeneticMapFile::read(&path) {
            Err(GeneticMapError::NotSorted { line }) => assert_eq!(line, 3),
            other => panic!("expected NotSorted, got {:?}", other),
        }
    }

    #[test]
    fn test_improper_rate() {
        let (_dir, path) = write_map("100 -1.0 0\n200 1.0 0.1\n");
        assert!(matches!(
            GeneticMapFile::read(&path),
            Err(GeneticMapError::ImproperRate { line: 1 })
        ));
    }

    #[test]
    fn test_parse_errors() {
        let (_dir, path) = write_map("pos rate map\n100 1.0\n");
        assert!(matches!(
            GeneticMapFile::read(&path),
            Err(GeneticMapError::Parse { line: 2, .. })
        ));
        let (_dir, path) = write_map("pos rate map\n100 abc 0\n");
        assert!(matches!(
            GeneticMapFile::read(&path),
            Err(GeneticMapError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_too_few_records() {
        let (_dir, path) = write_map("pos rate map\n100 1.0 0\n");
        assert!(matches!(
            GeneticMapFile::read(&path),
            Err(GeneticMapError::TooFewRecords(1))
        ));
    }

    #[test]
    fn test_invalid_scaling() {
        let gm = GeneticMapFile::read(TEST_MAP).unwrap();
        let scaling = RateScaling::Population {
            effective_population_size: 0.0,
        };
        assert!(matches!(
            gm.to_recombination_map(scaling),
            Err(GeneticMapError::InvalidScaling(_))
        ));
    }

    #[test]
    fn test_from_records_rejects_improper_positions() {
        for position in [-100.0, f64::NAN, f64::NEG_INFINITY] {
            let records = vec![
                GeneticMapRecord {
                    position,
                    rate: 1.0,
                    map_cm: 0.0,
                },
                GeneticMapRecord {
                    position: 100.0,
                    rate: 1.0,
                    map_cm: 0.0002,
                },
            ];
            assert!(
                matches!(
                    GeneticMapFile::from_records(records),
                    Err(GeneticMapError::Parse { line: 1, .. })
                ),
                "position {} should be rejected",
                position
            );
        }
    }

    #[test]
    fn test_from_records_masses_match_map() {
        let records = vec![
            GeneticMapRecord {
                position: 100.0,
                rate: 1.0,
                map_cm: 0.0,
            },
            GeneticMapRecord {
                position: 300.0,
                rate: 1.0,
                map_cm: 0.0002,
            },
        ];
        let gm = GeneticMapFile::from_records(records).unwrap();
        let total: f64 = gm.interval_masses(RateScaling::Morgans).unwrap().iter().sum();
        let map = gm.to_recombination_map(RateScaling::Morgans).unwrap();
        assert_float_eq(map.total_genetic_length(), total, 1e-15);
    }

    #[test]
    fn test_from_records() {
        let records = vec![
            GeneticMapRecord {
                position: 10.0,
                rate: 1.0,
                map_cm: 0.0,
            },
            GeneticMapRecord {
                position: 5.0,
                rate: 1.0,
                map_cm: 0.0,
            },
        ];
        assert!(matches!(
            GeneticMapFile::from_records(records),
            Err(GeneticMapError::NotSorted { line: 2 })
        ));
    }
}
