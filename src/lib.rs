//! cmip5: utility functions for CMIP5 model output
//!
//! A Rust library for working with archives of the Coupled Model
//! Intercomparison Project Phase 5. It understands the CMIP5 file naming
//! scheme, talks to Earth System Grid Federation (ESGF) search nodes, and
//! generates command lines for the Climate Data Operators (CDO).
//!
//! ## Key Features
//!
//! - **File names**: Split and rebuild `<var>_<table>_<model>_<exp>_<ens>_<period>.nc`
//! - **ESGF queries**: Search, aggregation and wget URLs, plus an async client
//! - **wget pruning**: Drop downloads outside a date window
//! - **CDO commands**: Concatenate time slices and compute monthly climatologies
//! - **Parallel execution**: Run generated commands on a Rayon thread pool
//! - **Metadata inspection**: Check netCDF global attributes against the file name
//!
//! ## Module Organization
//!
//! - [`filename`]: CMIP5 file names and periods
//! - [`nested`]: Auto-vivifying nested map used to index files
//! - [`cluster`]: Grouping of time slices by simulation
//! - [`commands`]: CDO command generation
//! - [`runner`]: Execution of generated commands
//! - [`esg`]: ESGF query URLs, client and wget pruning
//! - [`inspect`]: NetCDF metadata inspection
//! - [`parallel`]: Parallel processing configuration
//! - [`logging`]: Diagnostic logging setup
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cmip5::prelude::*;
//! use std::path::Path;
//!
//! let name = Cmip5FileName::parse("tas_Amon_HADCM3_historical_r1i1p1_185001-200512.nc").unwrap();
//! assert_eq!(name.model, "HADCM3");
//!
//! let plan = concatenate(Path::new("/data/cmip5/tas")).unwrap();
//! for cmd in plan.commands() {
//!     println!("{}", cmd);
//! }
//! ```

pub mod cluster;
pub mod commands;
pub mod errors;
pub mod esg;
pub mod filename;
pub mod inspect;
pub mod logging;
pub mod nested;
pub mod parallel;
pub mod runner;

pub use errors::{Cmip5Error, Result};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::cluster::cluster_time_slices;
    pub use crate::commands::{
        concatenate, monthly_climatology, ClimatologyRequest, CommandLine, ConcatJob,
        ConcatenationPlan, YearSelection,
    };
    pub use crate::errors::{Cmip5Error, Result};
    pub use crate::esg::{prune_wget, EsgClient, EsgQuery, QueryKind};
    pub use crate::filename::{aggregated_file_name, Cmip5FileName, Period};
    pub use crate::nested::{KeySubset, NestedMap, Subset};
    pub use crate::parallel::ParallelConfig;
    pub use crate::runner::CommandRunner;
}
