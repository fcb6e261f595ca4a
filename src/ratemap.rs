use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use super::file::{open_writer, FileError, InputFile};
use super::numeric::{cumulative_masses, is_coordinate, search_sorted, SearchResult};

/// The float type for physical positions.
pub type Position = f64;

/// The float type for recombination rates and genetic distances.
pub type RateFloat = f64;

#[derive(Error, Debug)]
pub enum RateMapError {
    #[error("coordinate {value} is outside the map domain [0, {limit}]")]
    OutOfDomain { value: f64, limit: f64 },
    #[error("genetic distance {value} falls inside the zero-rate interval ({start}, {end}]")]
    UndefinedInverse {
        value: RateFloat,
        start: Position,
        end: Position,
    },
    #[error("invalid recombination map: {0}")]
    InvalidMap(String),
    #[error("breakpoint file parsing error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("File reading error: {0}")]
    File(#[from] FileError),
}

/// A position at which the recombination rate changes.
///
/// The rate applies to the interval ending at `position`, starting at the
/// previous breakpoint (or zero, for the first one).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub position: Position,
    pub rate: RateFloat,
}

impl Breakpoint {
    pub fn new(position: Position, rate: RateFloat) -> Self {
        Self { position, rate }
    }
}

impl From<(Position, RateFloat)> for Breakpoint {
    fn from((position, rate): (Position, RateFloat)) -> Self {
        Self::new(position, rate)
    }
}

/// An immutable piecewise-constant recombination rate map.
///
/// The map partitions `[0, last breakpoint]` into intervals
/// `(previous position, position]`, each with its own constant rate. The
/// cumulative genetic distance at every breakpoint is computed once when the
/// map is built.
#[derive(Debug, Clone, PartialEq)]
pub struct RecombinationMap {
    ends: Vec<Position>,
    rates: Vec<RateFloat>,
    map_pos: Vec<RateFloat>,
}

impl RecombinationMap {
    /// Build a map from breakpoints sorted by position.
    ///
    /// Returns [`RateMapError::InvalidMap`] if there are no breakpoints, if
    /// positions are not strictly increasing, or if any position or rate is
    /// negative or non-finite.
    pub fn new(breakpoints: Vec<Breakpoint>) -> Result<Self, RateMapError> {
        if breakpoints.is_empty() {
            return Err(RateMapError::InvalidMap("no breakpoints".to_string()));
        }

        let mut last: Option<Position> = None;
        for (i, bp) in breakpoints.iter().enumerate() {
            if !is_coordinate(bp.position) {
                return Err(RateMapError::InvalidMap(format!(
                    "breakpoint {} has improper position {}",
                    i, bp.position
                )));
            }
            if !is_coordinate(bp.rate) {
                return Err(RateMapError::InvalidMap(format!(
                    "breakpoint {} at position {} has improper rate {}",
                    i, bp.position, bp.rate
                )));
            }
            if let Some(last) = last {
                if bp.position <= last {
                    return Err(RateMapError::InvalidMap(format!(
                        "breakpoints not sorted: position {} follows {}",
                        bp.position, last
                    )));
                }
            }
            last = Some(bp.position);
        }

        let (ends, rates): (Vec<_>, Vec<_>) = breakpoints
            .into_iter()
            .map(|bp| (bp.position, bp.rate))
            .unzip();
        let map_pos = cumulative_masses(&ends, &rates);
        if let Some(total) = map_pos.last() {
            if !total.is_finite() {
                return Err(RateMapError::InvalidMap(
                    "total genetic length overflows".to_string(),
                ));
            }
        }

        Ok(Self {
            ends,
            rates,
            map_pos,
        })
    }

    /// Build a map from `(position, rate)` pairs.
    pub fn from_pairs(pairs: &[(Position, RateFloat)]) -> Result<Self, RateMapError> {
        Self::new(pairs.iter().copied().map(Breakpoint::from).collect())
    }

    /// Read a map from a two-column, tab-separated file of positions and rates.
    ///
    /// Lines starting with `#` are ignored and the file may be gzip-compressed.
    pub fn from_tsv(filepath: impl AsRef<Path>) -> Result<Self, RateMapError> {
        Self::new(read_breakpoints(filepath)?)
    }

    /// The number of breakpoints (and so intervals) in the map.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    /// Always `false`: a valid map has at least one breakpoint.
    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Iterate over the breakpoints in position order.
    pub fn iter(&self) -> impl Iterator<Item = Breakpoint> + '_ {
        self.ends
            .iter()
            .zip(self.rates.iter())
            .map(|(&position, &rate)| Breakpoint { position, rate })
    }

    /// A copy of the breakpoint table.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.iter().collect()
    }

    /// The cumulative genetic distance at each breakpoint.
    pub fn cumulative_distances(&self) -> &[RateFloat] {
        &self.map_pos
    }

    /// The physical position of the last breakpoint.
    pub fn total_physical_length(&self) -> Position {
        self.ends.last().copied().unwrap_or(0.0)
    }

    /// The cumulative genetic distance at the last breakpoint.
    pub fn total_genetic_length(&self) -> RateFloat {
        self.map_pos.last().copied().unwrap_or(0.0)
    }

    /// The largest rate in the map.
    pub fn max_rate(&self) -> RateFloat {
        self.rates.iter().copied().fold(0.0, RateFloat::max)
    }

    /// The genetic length per unit of physical length, over the whole map.
    ///
    /// Zero if the map only covers position zero.
    pub fn mean_rate(&self) -> RateFloat {
        let length = self.total_physical_length();
        if length > 0.0 {
            self.total_genetic_length() / length
        } else {
            0.0
        }
    }

    /// The start of the interval ending at breakpoint `idx`, and the
    /// cumulative genetic distance there.
    fn interval_start(&self, idx: usize) -> (Position, RateFloat) {
        match idx.checked_sub(1) {
            Some(prev) => (self.ends[prev], self.map_pos[prev]),
            None => (0.0, 0.0),
        }
    }

    /// Convert a physical position to a cumulative genetic distance.
    ///
    /// Positions on a breakpoint return the cumulative distance at that
    /// breakpoint exactly; positions inside an interval add the partial
    /// interval at that interval's rate.
    ///
    /// # Errors
    /// [`RateMapError::OutOfDomain`] if `position` is negative, NaN, or past
    /// the last breakpoint.
    pub fn physical_to_genetic(&self, position: Position) -> Result<RateFloat, RateMapError> {
        let out_of_domain = || RateMapError::OutOfDomain {
            value: position,
            limit: self.total_physical_length(),
        };
        if !is_coordinate(position) {
            return Err(out_of_domain());
        }
        match search_sorted(&self.ends, &position) {
            SearchResult::Exact(idx) => Ok(self.map_pos[idx]),
            SearchResult::Within(idx) => {
                let (last, s) = self.interval_start(idx);
                if position == last {
                    return Ok(s);
                }
                let rate = self.rates[idx];
                Ok(s + (position - last) * rate)
            }
            SearchResult::Beyond => Err(out_of_domain()),
        }
    }

    /// Convert a cumulative genetic distance back to a physical position.
    ///
    /// A genetic distance shared by a run of zero-rate intervals maps to the
    /// first position reaching it. Zero maps to zero.
    ///
    /// # Errors
    /// [`RateMapError::OutOfDomain`] if `distance` is negative, NaN, or larger
    /// than the total genetic length. [`RateMapError::UndefinedInverse`] if
    /// the distance lies strictly inside a zero-rate interval.
    pub fn genetic_to_physical(&self, distance: RateFloat) -> Result<Position, RateMapError> {
        let out_of_domain = || RateMapError::OutOfDomain {
            value: distance,
            limit: self.total_genetic_length(),
        };
        if !is_coordinate(distance) {
            return Err(out_of_domain());
        }
        if distance == 0.0 {
            return Ok(0.0);
        }
        match search_sorted(&self.map_pos, &distance) {
            SearchResult::Exact(idx) => Ok(self.ends[idx]),
            SearchResult::Within(idx) => {
                let (start, _) = self.interval_start(idx);
                solve_within_interval(
                    start,
                    self.ends[idx],
                    self.map_pos[idx],
                    self.rates[idx],
                    distance,
                )
            }
            SearchResult::Beyond => Err(out_of_domain()),
        }
    }

    /// Convert many physical positions, stopping at the first failure.
    pub fn physical_to_genetic_many(
        &self,
        positions: &[Position],
    ) -> Result<Array1<RateFloat>, RateMapError> {
        positions
            .iter()
            .map(|&p| self.physical_to_genetic(p))
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from_vec)
    }

    /// Convert many genetic distances, stopping at the first failure.
    pub fn genetic_to_physical_many(
        &self,
        distances: &[RateFloat],
    ) -> Result<Array1<Position>, RateMapError> {
        distances
            .iter()
            .map(|&d| self.genetic_to_physical(d))
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from_vec)
    }

    /// The vertices of the rate step function: the start and end of every
    /// interval, each paired with that interval's rate.
    pub fn rate_steps(&self) -> Vec<(Position, RateFloat)> {
        let mut steps = Vec::with_capacity(2 * self.len());
        let mut last = 0.0;
        for bp in self.iter() {
            steps.push((last, bp.rate));
            steps.push((bp.position, bp.rate));
            last = bp.position;
        }
        steps
    }

    /// The cumulative genetic distance curve, starting at the origin and
    /// passing through every breakpoint.
    pub fn cumulative_curve(&self) -> Vec<(Position, RateFloat)> {
        std::iter::once((0.0, 0.0))
            .chain(self.ends.iter().copied().zip(self.map_pos.iter().copied()))
            .collect()
    }

    /// Write the map as a TSV of `start`, `end`, `rate`, and the cumulative
    /// genetic distance at `end`.
    ///
    /// # Arguments
    ///  * `filepath`: the output path; a `.gz` extension gives gzip output.
    ///  If `None`, the map is written to standard out.
    pub fn write_tsv(&self, filepath: Option<&Path>) -> Result<(), RateMapError> {
        let mut writer = open_writer(filepath)?;
        {
            let mut wtr = WriterBuilder::new()
                .delimiter(b'\t')
                .has_headers(false)
                .from_writer(&mut writer);
            let mut last = 0.0;
            for (bp, cumulative) in self.iter().zip(self.map_pos.iter()) {
                wtr.serialize((last, bp.position, bp.rate, cumulative))?;
                last = bp.position;
            }
            wtr.flush()?;
        }
        writer.finish()?;
        Ok(())
    }
}

/// Back-solve the position of `distance` inside the interval `(start, end]`,
/// whose cumulative distance at `end` is `s` and whose rate is `rate`.
fn solve_within_interval(
    start: Position,
    end: Position,
    s: RateFloat,
    rate: RateFloat,
    distance: RateFloat,
) -> Result<Position, RateMapError> {
    if s == distance {
        return Ok(end);
    }
    if rate == 0.0 {
        return Err(RateMapError::UndefinedInverse {
            value: distance,
            start,
            end,
        });
    }
    Ok(end - (s - distance) / rate)
}

/// Read a tab-delimited file of breakpoint positions and rates.
pub fn read_breakpoints(filepath: impl AsRef<Path>) -> Result<Vec<Breakpoint>, RateMapError> {
    let reader = InputFile::new(filepath).reader()?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut breakpoints = Vec::new();
    for result in rdr.deserialize() {
        let record: Breakpoint = result?;
        breakpoints.push(record);
    }
    Ok(breakpoints)
}
