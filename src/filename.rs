//! CMIP5 DRS file names and their period component
//!
//! CMIP5 output files are named
//! `<variable>_<table>_<model>_<experiment>_<ensemble>[_<period>].nc`, where
//! the period is `<start>-<end>` with an optional climatology suffix
//! (`-clim`, `-clim<tag>`). Time-invariant fields (table `fx`) carry no
//! period at all.

use crate::errors::{Cmip5Error, Result};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;
use std::path::Path;

/// MIP table holding time-invariant fields
pub const FIXED_TABLE: &str = "fx";

/// Precision of a period bound, inferred from its digit count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

impl DatePrecision {
    fn from_len(len: usize) -> Option<Self> {
        match len {
            4 => Some(Self::Year),
            6 => Some(Self::Month),
            8 => Some(Self::Day),
            10 => Some(Self::Hour),
            12 => Some(Self::Minute),
            _ => None,
        }
    }
}

/// One end of a period, keeping the raw text so names round-trip exactly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodBound {
    pub raw: String,
    pub instant: NaiveDateTime,
    pub precision: DatePrecision,
}

impl PeriodBound {
    /// Parse a `YYYY[MM[DD[hh[mm]]]]` date
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Cmip5Error::InvalidPeriod {
            period: raw.to_string(),
            reason: reason.to_string(),
        };

        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("dates must be numeric"));
        }
        let precision = DatePrecision::from_len(raw.len())
            .ok_or_else(|| invalid("expected YYYY, YYYYMM, YYYYMMDD, YYYYMMDDhh or YYYYMMDDhhmm"))?;

        // All-digit ASCII, so byte slicing is safe.
        let field = |range: std::ops::Range<usize>, default: u32| -> u32 {
            raw.get(range)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        let year: i32 = raw[0..4]
            .parse()
            .map_err(|_| invalid("year is not a number"))?;
        let month = field(4..6, 1);
        let day = field(6..8, 1);
        let hour = field(8..10, 0);
        let minute = field(10..12, 0);

        let instant = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .ok_or_else(|| invalid("date is out of range"))?;

        Ok(Self {
            raw: raw.to_string(),
            instant,
            precision,
        })
    }

    pub fn year(&self) -> i32 {
        self.instant.year()
    }

    /// The instant one unit of this bound's precision later
    fn successor(&self) -> Option<NaiveDateTime> {
        match self.precision {
            DatePrecision::Year => self.instant.checked_add_months(Months::new(12)),
            DatePrecision::Month => self.instant.checked_add_months(Months::new(1)),
            DatePrecision::Day => self.instant.checked_add_days(Days::new(1)),
            DatePrecision::Hour | DatePrecision::Minute => None,
        }
    }
}

impl fmt::Display for PeriodBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Time span covered by a file, `<start>-<end>[-<clim>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub start: PeriodBound,
    pub end: PeriodBound,
    pub clim: Option<String>,
}

impl Period {
    /// Parse a period such as `185001-200512` or `204001-206912-clim`
    pub fn parse(period: &str) -> Result<Self> {
        let mut parts = period.splitn(3, '-');
        let (start, end) = match (parts.next(), parts.next()) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(Cmip5Error::InvalidPeriod {
                    period: period.to_string(),
                    reason: "expected '<start>-<end>'".to_string(),
                })
            }
        };
        let clim = parts.next().map(str::to_string);
        if clim.as_deref() == Some("") {
            return Err(Cmip5Error::InvalidPeriod {
                period: period.to_string(),
                reason: "empty climatology tag".to_string(),
            });
        }

        let start = PeriodBound::parse(start)?;
        let end = PeriodBound::parse(end)?;
        if end.instant < start.instant {
            return Err(Cmip5Error::InvalidPeriod {
                period: period.to_string(),
                reason: "end precedes start".to_string(),
            });
        }

        Ok(Self { start, end, clim })
    }

    /// Build a period from explicit year bounds at monthly precision
    pub fn from_years(first_year: i32, last_year: i32, clim: Option<String>) -> Result<Self> {
        let mut period = Self::parse(&format!("{:04}01-{:04}12", first_year, last_year))?;
        period.clim = clim;
        Ok(period)
    }

    /// Span from the start of `first` to the end of `last`, without climatology tag
    pub fn join(first: &Period, last: &Period) -> Self {
        Self {
            start: first.start.clone(),
            end: last.end.clone(),
            clim: None,
        }
    }

    pub fn is_climatology(&self) -> bool {
        self.clim.is_some()
    }

    /// Whether this period starts right where `previous` ends.
    ///
    /// Sub-daily bounds carry the time of the last record rather than the
    /// end of the interval, so for those any start within a day after the
    /// previous end counts as contiguous.
    pub fn follows(&self, previous: &Period) -> bool {
        match previous.end.successor() {
            Some(next) => self.start.instant == next,
            None => {
                let gap = self.start.instant - previous.end.instant;
                gap > chrono::Duration::zero() && gap <= chrono::Duration::days(1)
            }
        }
    }

    /// Whether `other` lies entirely within this period
    pub fn covers(&self, other: &Period) -> bool {
        self.start.instant <= other.start.instant && other.end.instant <= self.end.instant
    }

    /// Years touched by this period, inclusive
    pub fn years(&self) -> (i32, i32) {
        (self.start.year(), self.end.year())
    }

    /// Time of day of the start bound, mostly useful for sub-daily data
    pub fn start_hour(&self) -> u32 {
        self.start.instant.hour()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)?;
        if let Some(clim) = &self.clim {
            write!(f, "-{}", clim)?;
        }
        Ok(())
    }
}

/// Components of a CMIP5 file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmip5FileName {
    pub variable: String,
    pub mip_table: String,
    pub model: String,
    pub experiment: String,
    pub ensemble: String,
    pub period: Option<Period>,
}

impl Cmip5FileName {
    /// Split the last component of `path` into its CMIP5 fields.
    ///
    /// Any directory part is ignored.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Cmip5Error::InvalidFileName {
                name: path.display().to_string(),
                reason: "no UTF-8 file name".to_string(),
            })?;
        let invalid = |reason: String| Cmip5Error::InvalidFileName {
            name: name.to_string(),
            reason,
        };

        let stem = name.strip_suffix(".nc").unwrap_or(name);
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 5 && parts.len() != 6 {
            return Err(invalid(format!(
                "expected 5 or 6 '_'-separated components, found {}",
                parts.len()
            )));
        }
        if let Some(idx) = parts.iter().position(|p| p.is_empty()) {
            return Err(invalid(format!("component {} is empty", idx + 1)));
        }

        let period = match parts.get(5) {
            Some(p) => Some(Period::parse(p)?),
            None => None,
        };

        Ok(Self {
            variable: parts[0].to_string(),
            mip_table: parts[1].to_string(),
            model: parts[2].to_string(),
            experiment: parts[3].to_string(),
            ensemble: parts[4].to_string(),
            period,
        })
    }

    /// Rebuild the file name, `.nc` extension included
    pub fn file_name(&self) -> String {
        self.to_string()
    }

    pub fn is_fixed(&self) -> bool {
        self.mip_table == FIXED_TABLE
    }

    /// Same variable, table, model, experiment and ensemble
    pub fn same_simulation(&self, other: &Self) -> bool {
        self.differing_component(other).is_none()
    }

    /// First non-period component that differs from `other`
    pub fn differing_component(&self, other: &Self) -> Option<&'static str> {
        if self.variable != other.variable {
            Some("variable")
        } else if self.mip_table != other.mip_table {
            Some("MIP table")
        } else if self.model != other.model {
            Some("model")
        } else if self.experiment != other.experiment {
            Some("experiment")
        } else if self.ensemble != other.ensemble {
            Some("ensemble")
        } else {
            None
        }
    }

    pub fn with_period(&self, period: Option<Period>) -> Self {
        Self {
            period,
            ..self.clone()
        }
    }

    /// Key used to group time slices of one simulation
    pub fn simulation_key(&self) -> Vec<String> {
        vec![
            self.variable.clone(),
            self.mip_table.clone(),
            self.model.clone(),
            self.experiment.clone(),
            self.ensemble.clone(),
        ]
    }
}

impl fmt::Display for Cmip5FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.variable, self.mip_table, self.model, self.experiment, self.ensemble
        )?;
        if let Some(period) = &self.period {
            write!(f, "_{}", period)?;
        }
        f.write_str(".nc")
    }
}

/// File name of the concatenation of consecutive time slices.
///
/// A single file is returned unchanged. Otherwise the first file's name is
/// reused with its period stretched to the end of the last file.
pub fn aggregated_file_name<P: AsRef<Path>>(files: &[P]) -> Result<String> {
    match files {
        [] => Err(Cmip5Error::Generic(
            "Cannot aggregate an empty list of files".to_string(),
        )),
        [single] => Ok(single.as_ref().display().to_string()),
        [first, .., last] => {
            let head = Cmip5FileName::parse(first)?;
            let tail = Cmip5FileName::parse(last)?;
            let period = match (&head.period, &tail.period) {
                (Some(p1), Some(p2)) => Period::join(p1, p2),
                _ => {
                    return Err(Cmip5Error::InvalidFileName {
                        name: head.file_name(),
                        reason: "time slices must carry a period".to_string(),
                    })
                }
            };
            Ok(head.with_period(Some(period)).file_name())
        }
    }
}
