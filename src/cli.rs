//! Defines command-line interface options using `clap` for the cmip5 tool.

use clap::{Parser, Subcommand, ValueEnum};
use cmip5::commands::{YearSelection, DEFAULT_CDO_OPTIONS};
use cmip5::esg::{parse_criterion, EsgQuery, QueryKind, DEFAULT_ESG_NODE, ESG_NODE_ENV};
use std::path::PathBuf;

/// Utilities for CMIP5 archives
#[derive(Parser, Debug)]
#[command(
    name = "cmip5",
    version,
    about = "CMIP5 file names, ESGF queries and CDO command generation"
)]
pub struct Args {
    /// Enable verbose output.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads used to run commands. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// ESGF gateway receiving search and wget queries
    #[arg(long, global = true, env = ESG_NODE_ENV, default_value = DEFAULT_ESG_NODE)]
    pub esg_node: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split CMIP5 file names into their components
    Split {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Concatenate the time slices of each simulation found in a directory
    Concat {
        /// Directory holding the netCDF files
        dir: PathBuf,

        /// Run the `cdo cat` commands instead of printing them
        #[arg(long)]
        execute: bool,

        /// With --execute, delete the slices of every successful concatenation
        #[arg(long, requires = "execute")]
        remove: bool,
    },

    /// Monthly climatology of one simulation with `cdo ymonavg`
    Clim {
        /// Time slices of a single simulation and variable
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Inclusive year range, formatted as <first>:<last>
        #[arg(long, value_parser = parse_years_arg, conflicts_with_all = ["last", "first"])]
        years: Option<(i32, i32)>,

        /// Use the last N years spanned by the files
        #[arg(long, conflicts_with = "first", value_parser = clap::value_parser!(u32).range(1..))]
        last: Option<u32>,

        /// Use the first N years spanned by the files
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        first: Option<u32>,

        /// Tag appended to `clim` in the generated output name
        #[arg(long, default_value = "")]
        tag: String,

        /// Output file. Defaults to a CMIP5 name in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Options passed to cdo before the operator
        #[arg(long, default_value = DEFAULT_CDO_OPTIONS, allow_hyphen_values = true)]
        cdo_options: String,

        /// Run the command instead of printing it
        #[arg(long)]
        execute: bool,
    },

    /// Print an ESGF query URL
    Url {
        #[arg(value_enum)]
        kind: UrlKind,

        #[command(flatten)]
        criteria: CriteriaArgs,
    },

    /// Query the ESGF node and list matching datasets
    Search {
        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Maximum number of datasets returned
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Fetch the wget script for matching files, pruned to a date window
    Wget {
        #[command(flatten)]
        criteria: CriteriaArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Where to write the script. If not set, prints to terminal.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove files outside a date window from an existing wget script
    PruneWget {
        script: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Print netCDF metadata and check it against the CMIP5 file name
    Inspect { file: PathBuf },
}

/// ESGF endpoint selected by the `url` subcommand
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum UrlKind {
    Search,
    Aggregation,
    Wget,
}

impl From<UrlKind> for QueryKind {
    fn from(kind: UrlKind) -> Self {
        match kind {
            UrlKind::Search => QueryKind::Search,
            UrlKind::Aggregation => QueryKind::Aggregation,
            UrlKind::Wget => QueryKind::Wget,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Criterion {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CriteriaArgs {
    /// Search criterion, formatted as <key>=<value>[,<value>...]. Repeat for several keys.
    #[arg(short = 'c', long = "criterion", value_parser = parse_criterion_arg)]
    pub criteria: Vec<Criterion>,

    /// Include superseded dataset versions
    #[arg(long)]
    pub no_latest: bool,

    /// Return replicas instead of master records
    #[arg(long)]
    pub replica: bool,
}

impl CriteriaArgs {
    pub fn to_query(&self, kind: QueryKind) -> EsgQuery {
        let query = EsgQuery::new(kind)
            .latest(!self.no_latest)
            .replica(self.replica);
        self.criteria.iter().fold(query, |query, c| {
            query.constrain_any(c.key.clone(), c.values.iter().cloned())
        })
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct WindowArgs {
    /// Keep files ending after this month, formatted as YYYYMM
    #[arg(long)]
    pub start: Option<String>,

    /// Keep files starting before this month, formatted as YYYYMM
    #[arg(long)]
    pub end: Option<String>,
}

/// Year selection from the mutually exclusive `--years`, `--last` and `--first`
pub fn year_selection(
    years: Option<(i32, i32)>,
    last: Option<u32>,
    first: Option<u32>,
) -> Option<YearSelection> {
    match (years, last, first) {
        (Some((y1, y2)), _, _) => Some(YearSelection::Range(y1, y2)),
        (None, Some(n), _) => Some(YearSelection::Slice {
            start: Some(-(n as isize)),
            stop: None,
        }),
        (None, None, Some(n)) => Some(YearSelection::Slice {
            start: None,
            stop: Some(n as isize),
        }),
        (None, None, None) => None,
    }
}

fn parse_years_arg(s: &str) -> Result<(i32, i32), String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [y1, y2] => {
            let y1 = y1
                .parse::<i32>()
                .map_err(|_| format!("Invalid first year '{}'", y1))?;
            let y2 = y2
                .parse::<i32>()
                .map_err(|_| format!("Invalid last year '{}'", y2))?;
            if y1 > y2 {
                return Err(format!("First year {} is after last year {}", y1, y2));
            }
            Ok((y1, y2))
        }
        _ => Err("Invalid format: Expected '<first>:<last>'.".to_string()),
    }
}

fn parse_criterion_arg(s: &str) -> Result<Criterion, String> {
    parse_criterion(s)
        .map(|(key, values)| Criterion { key, values })
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_ranges() {
        assert_eq!(parse_years_arg("1970:1999"), Ok((1970, 1999)));
        assert!(parse_years_arg("1999:1970").is_err());
        assert!(parse_years_arg("1970").is_err());
        assert!(parse_years_arg("abc:1999").is_err());
    }

    #[test]
    fn builds_queries_from_arguments() {
        let args = Args::parse_from([
            "cmip5",
            "url",
            "wget",
            "-c",
            "project=CMIP5",
            "-c",
            "experiment=rcp45,rcp85",
            "--no-latest",
        ]);
        let Command::Url { kind, criteria } = args.command else {
            panic!("expected url subcommand");
        };
        let query = criteria.to_query(kind.into());
        assert_eq!(query.kind(), QueryKind::Wget);
        assert_eq!(query.values("latest"), Some(&["false".to_string()][..]));
        assert_eq!(
            query.values("experiment"),
            Some(&["rcp45".to_string(), "rcp85".to_string()][..])
        );
    }

    #[test]
    fn clim_options_accept_hyphens() {
        let args = Args::parse_from([
            "cmip5",
            "clim",
            "tas_Amon_M_e_r1i1p1_185001-200512.nc",
            "--last",
            "30",
            "--cdo-options",
            "-f nc4c -z zip",
        ]);
        let Command::Clim {
            years,
            last,
            first,
            cdo_options,
            ..
        } = args.command
        else {
            panic!("expected clim subcommand");
        };
        assert_eq!(cdo_options, "-f nc4c -z zip");
        assert_eq!(
            year_selection(years, last, first),
            Some(YearSelection::Slice {
                start: Some(-30),
                stop: None
            })
        );
    }

    #[test]
    fn rejects_conflicting_year_flags() {
        let result = Args::try_parse_from([
            "cmip5",
            "clim",
            "a.nc",
            "--years",
            "1970:1999",
            "--last",
            "30",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_year_counts() {
        for flag in ["--last", "--first"] {
            let result = Args::try_parse_from(["cmip5", "clim", "a.nc", flag, "0"]);
            assert!(result.is_err(), "{} 0 should be rejected", flag);
        }
    }

    #[test]
    fn esg_node_comes_from_environment() {
        std::env::set_var(ESG_NODE_ENV, "https://esgf.example.org/esg-search");
        let args = Args::parse_from(["cmip5", "url", "search"]);
        std::env::remove_var(ESG_NODE_ENV);
        assert_eq!(args.esg_node, "https://esgf.example.org/esg-search");

        let flagged = Args::parse_from(["cmip5", "url", "search", "--esg-node", "http://localhost"]);
        assert_eq!(flagged.esg_node, "http://localhost");
    }
}
