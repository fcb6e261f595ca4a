//! Conversion between physical and genetic distance on recombination maps.
//!
//! A [`RecombinationMap`] is a piecewise-constant recombination rate map: a
//! sorted table of breakpoints, each giving the rate of the interval that
//! ends at it. The cumulative genetic distance is the integral of the rate
//! from position zero, so [`RecombinationMap::physical_to_genetic`] is a
//! monotone piecewise-linear function, and
//! [`RecombinationMap::genetic_to_physical`] is its inverse wherever the rate
//! is positive.
//!
//! ```
//! use ratemap::prelude::*;
//! let map = RecombinationMap::from_pairs(&[(10.0, 0.1), (20.0, 1.0), (30.0, 0.1)])
//!               .expect("invalid map");
//!
//! let genetic = map.physical_to_genetic(15.0).unwrap();
//! assert!((genetic - 6.0).abs() < 1e-12);
//! let physical = map.genetic_to_physical(genetic).unwrap();
//! assert!((physical - 15.0).abs() < 1e-9);
//!
//! // past the last breakpoint there is no rate to use
//! assert!(map.physical_to_genetic(31.0).is_err());
//! ```
//!
//! Maps can also be loaded from HapMap-style genetic map files with
//! [`read_genetic_map`], which converts rates in cM/Mb to (optionally
//! population-scaled) rates per base pair.
//!
//! ```no_run
//! use ratemap::prelude::*;
//! let map = read_genetic_map("genetic_map_chr1_b36.txt.gz", RateScaling::default())
//!               .expect("cannot read genetic map");
//! println!("{}", map.total_genetic_length());
//! ```

pub mod file;
pub mod genetic_map;
mod numeric;
pub mod ratemap;

pub use genetic_map::{read_genetic_map, GeneticMapError, GeneticMapFile, RateScaling};
pub use ratemap::{read_breakpoints, Breakpoint, Position, RateFloat, RateMapError, RecombinationMap};

pub mod prelude {
    pub use crate::genetic_map::{read_genetic_map, GeneticMapError, GeneticMapFile, RateScaling};
    pub use crate::ratemap::{
        read_breakpoints, Breakpoint, Position, RateFloat, RateMapError, RecombinationMap,
    };
}
