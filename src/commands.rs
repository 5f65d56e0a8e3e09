//! CDO command generation
//!
//! Builds command lines for the Climate Data Operators:
//!
//! * concatenate time slices of one simulation (`cdo cat`)
//! * monthly climatologies over a range of years (`cdo ymonavg`)
//!
//! Nothing here runs a process. The commands are returned for the caller to
//! print or hand to [`crate::runner::CommandRunner`].

use crate::cluster::cluster_time_slices;
use crate::errors::{Cmip5Error, Result};
use crate::filename::{aggregated_file_name, Cmip5FileName, Period};
use crate::nested::Subset;
use std::fmt;
use std::path::{Path, PathBuf};

/// Options passed to CDO ahead of the operator when none are given
pub const DEFAULT_CDO_OPTIONS: &str = "-f nc4";

/// A program invocation as an argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn arguments(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Concatenation of consecutive time slices into one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatJob {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

impl ConcatJob {
    /// `cdo cat <inputs...> <output>`
    pub fn command(&self) -> CommandLine {
        self.inputs
            .iter()
            .fold(CommandLine::new("cdo").arg("cat"), |cmd, input| cmd.path(input))
            .path(&self.output)
    }

    /// `rm <inputs...>`
    pub fn removal(&self) -> CommandLine {
        self.inputs
            .iter()
            .fold(CommandLine::new("rm"), |cmd, input| cmd.path(input))
    }

    /// Neighbouring inputs whose periods do not follow each other
    pub fn gaps(&self) -> Vec<(Period, Period)> {
        let periods: Vec<Period> = self
            .inputs
            .iter()
            .filter_map(|f| Cmip5FileName::parse(f).ok()?.period)
            .collect();
        periods
            .windows(2)
            .filter(|pair| !pair[1].follows(&pair[0]))
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }
}

/// Every concatenation found in a directory
#[derive(Debug, Clone, Default)]
pub struct ConcatenationPlan {
    pub jobs: Vec<ConcatJob>,
    /// Outputs already on disk, whose jobs were left out
    pub existing: Vec<PathBuf>,
}

impl ConcatenationPlan {
    pub fn commands(&self) -> Vec<CommandLine> {
        self.jobs.iter().map(ConcatJob::command).collect()
    }

    pub fn removals(&self) -> Vec<CommandLine> {
        self.jobs.iter().map(ConcatJob::removal).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Plan the concatenation of every multi-file simulation in `dir`.
///
/// Outputs are written next to the inputs and named after the combined
/// period. Slices contained in a longer file of the same simulation, such as
/// the aggregate of an earlier run, are replaced by that file. Simulations
/// whose slices partly overlap are skipped with a warning.
pub fn concatenate(dir: &Path) -> Result<ConcatenationPlan> {
    let index = cluster_time_slices(dir)?;
    let mut plan = ConcatenationPlan::default();

    for (keys, files) in index.walk(&Subset::new()) {
        if files.len() < 2 {
            continue;
        }
        let simulation = keys.join("/");

        let slices = chronological_slices(files);
        if let Some(pair) = slices
            .windows(2)
            .find(|pair| pair[1].1.start.instant <= pair[0].1.end.instant)
        {
            tracing::warn!(
                simulation = %simulation,
                "skipping: time slices {} and {} overlap",
                pair[0].1,
                pair[1].1
            );
            continue;
        }

        let inputs: Vec<PathBuf> = slices.into_iter().map(|(path, _)| path).collect();
        if let [aggregate] = inputs.as_slice() {
            tracing::info!(output = %aggregate.display(), "already concatenated");
            plan.existing.push(aggregate.clone());
            continue;
        }

        let output = dir.join(aggregated_file_name(&inputs)?);
        if output.exists() {
            tracing::info!(output = %output.display(), "already concatenated");
            plan.existing.push(output);
            continue;
        }

        let job = ConcatJob { inputs, output };
        for (previous, next) in job.gaps() {
            tracing::warn!(
                simulation = %simulation,
                "time slices {} and {} are not contiguous",
                previous,
                next
            );
        }
        plan.jobs.push(job);
    }

    Ok(plan)
}

/// Slices ordered by start, dropping those that lie within another file
fn chronological_slices(files: &[PathBuf]) -> Vec<(PathBuf, Period)> {
    let mut slices: Vec<(PathBuf, Period)> = files
        .iter()
        .filter_map(|f| Some((f.clone(), Cmip5FileName::parse(f).ok()?.period?)))
        .collect();
    // Longest first among equal starts, so a covering file precedes its parts
    slices.sort_by(|(_, a), (_, b)| {
        a.start
            .instant
            .cmp(&b.start.instant)
            .then(b.end.instant.cmp(&a.end.instant))
    });

    let mut kept: Vec<(PathBuf, Period)> = Vec::with_capacity(slices.len());
    for (path, period) in slices {
        if let Some((outer, _)) = kept.last().filter(|(_, p)| p.covers(&period)) {
            tracing::debug!(
                file = %path.display(),
                within = %outer.display(),
                "skipping slice contained in a longer file"
            );
            continue;
        }
        kept.push((path, period));
    }
    kept
}

/// Years over which a climatology is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSelection {
    /// Inclusive first and last year
    Range(i32, i32),
    /// Slice of the years spanned by the input files.
    ///
    /// Indices follow Python slice rules: negative values count from the
    /// end and `None` leaves that side open. `Slice { start: Some(-30), stop: None }`
    /// selects the last thirty years.
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
    },
}

impl YearSelection {
    /// Resolve to inclusive `(first, last)` years within `[span_start, span_end]`
    pub fn resolve(self, span_start: i32, span_end: i32) -> Result<(i32, i32)> {
        match self {
            YearSelection::Range(y1, y2) => {
                if y1 > y2 {
                    return Err(Cmip5Error::InvalidYearSelection {
                        message: format!("first year {} is after last year {}", y1, y2),
                    });
                }
                Ok((y1, y2))
            }
            YearSelection::Slice { start, stop } => {
                let len = (span_end - span_start + 1).max(0) as isize;
                let clamp = |idx: isize| {
                    if idx < 0 {
                        (idx + len).max(0)
                    } else {
                        idx.min(len)
                    }
                };
                let lo = start.map_or(0, clamp);
                let hi = stop.map_or(len, clamp);
                if lo >= hi {
                    return Err(Cmip5Error::InvalidYearSelection {
                        message: format!(
                            "slice {:?}:{:?} selects no year in {}-{}",
                            start, stop, span_start, span_end
                        ),
                    });
                }
                Ok((span_start + lo as i32, span_start + hi as i32 - 1))
            }
        }
    }
}

/// Parameters of a monthly climatology
#[derive(Debug, Clone)]
pub struct ClimatologyRequest {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub years: Option<YearSelection>,
    /// Appended to `clim` in generated output names, e.g. `ctl` for 1970-1999
    pub tag: String,
    pub options: String,
}

impl ClimatologyRequest {
    pub fn new<I, P>(inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: None,
            years: None,
            tag: String::new(),
            options: DEFAULT_CDO_OPTIONS.to_string(),
        }
    }

    pub fn years(mut self, years: YearSelection) -> Self {
        self.years = Some(years);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }
}

/// Build the `cdo ymonavg` command computing a monthly climatology.
///
/// Returns `Ok(None)` when no input file overlaps the selected years.
pub fn monthly_climatology(request: &ClimatologyRequest) -> Result<Option<CommandLine>> {
    let names = request
        .inputs
        .iter()
        .map(Cmip5FileName::parse)
        .collect::<Result<Vec<_>>>()?;
    let first = names.first().ok_or_else(|| {
        Cmip5Error::Generic("A climatology needs at least one input file".to_string())
    })?;

    if let Some(component) = names.iter().find_map(|n| first.differing_component(n)) {
        return Err(Cmip5Error::MixedSimulations {
            component: component.to_string(),
        });
    }

    let mut slices = Vec::with_capacity(names.len());
    for (path, name) in request.inputs.iter().zip(&names) {
        match &name.period {
            Some(p) if p.is_climatology() => {
                return Err(Cmip5Error::ClimatologyInput {
                    file: name.file_name(),
                })
            }
            Some(p) => slices.push((path, name, p)),
            None => {
                return Err(Cmip5Error::InvalidFileName {
                    name: name.file_name(),
                    reason: "a climatology needs time slices with a period".to_string(),
                })
            }
        }
    }
    slices.sort_by_key(|(_, _, period)| period.start.instant);

    let span_start = slices[0].2.start.year();
    let span_end = slices
        .iter()
        .map(|(_, _, period)| period.end.year())
        .max()
        .unwrap_or(span_start);
    let years = request
        .years
        .map(|sel| sel.resolve(span_start, span_end))
        .transpose()?;

    let selected: Vec<(&PathBuf, &Cmip5FileName)> = slices
        .iter()
        .filter(|(_, _, period)| match years {
            Some((y1, y2)) => period.end.year() >= y1 && period.start.year() <= y2,
            None => true,
        })
        .map(|&(path, name, _)| (path, name))
        .collect();

    let Some((_, first_selected)) = selected.first() else {
        tracing::info!(?years, "no input file overlaps the selected years");
        return Ok(None);
    };

    let output = match &request.output {
        Some(path) => path.clone(),
        None => {
            let (y1, y2) = years.unwrap_or((span_start, span_end));
            let period = Period::from_years(y1, y2, Some(format!("clim{}", request.tag)))?;
            PathBuf::from(first_selected.with_period(Some(period)).file_name())
        }
    };

    let mut cmd = CommandLine::new("cdo")
        .args(request.options.split_whitespace())
        .arg("ymonavg");
    if let Some((y1, y2)) = years {
        cmd = cmd.arg(format!("-seldate,{}-01-01,{}-12-31", y1, y2));
    }
    cmd = match selected.as_slice() {
        [(only, _)] => cmd.path(only),
        many => many
            .iter()
            .fold(cmd.arg("-cat"), |cmd, (path, _)| cmd.path(path)),
    };

    Ok(Some(cmd.path(&output)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    const SIC: &str = "../data/sic_OImon_CCSM4_rcp85_r1i1p1_200601-210012.nc";

    #[test]
    fn climatology_over_selected_years() {
        let request = ClimatologyRequest::new([SIC])
            .years(YearSelection::Range(2040, 2069))
            .tag("<f50>")
            .options("");
        let cmd = monthly_climatology(&request).unwrap().unwrap();
        assert_eq!(
            cmd.to_string(),
            "cdo ymonavg -seldate,2040-01-01,2069-12-31 \
             ../data/sic_OImon_CCSM4_rcp85_r1i1p1_200601-210012.nc \
             sic_OImon_CCSM4_rcp85_r1i1p1_204001-206912-clim<f50>.nc"
        );
    }

    #[test]
    fn climatology_defaults_to_full_span_and_nc4() {
        let request = ClimatologyRequest::new([
            "tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc",
            "tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc",
        ]);
        let cmd = monthly_climatology(&request).unwrap().unwrap();
        assert_eq!(cmd.program(), "cdo");
        assert_eq!(
            cmd.to_string(),
            "cdo -f nc4 ymonavg -cat \
             tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc \
             tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc \
             tas_Amon_CCSM4_historical_r1i1p1_185001-200512-clim.nc"
        );
    }

    #[test]
    fn climatology_keeps_only_overlapping_files() {
        let request = ClimatologyRequest::new([
            "tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc",
            "tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc",
        ])
        .years(YearSelection::Slice {
            start: Some(-30),
            stop: None,
        })
        .tag("ctl")
        .output("out.nc");
        let cmd = monthly_climatology(&request).unwrap().unwrap();
        assert_eq!(
            cmd.to_string(),
            "cdo -f nc4 ymonavg -seldate,1976-01-01,2005-12-31 \
             tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc out.nc"
        );
    }

    #[test]
    fn climatology_outside_data_is_none() {
        let request = ClimatologyRequest::new([SIC]).years(YearSelection::Range(1900, 1950));
        assert!(monthly_climatology(&request).unwrap().is_none());
    }

    #[test]
    fn climatology_rejects_mixed_and_clim_inputs() {
        let mixed = ClimatologyRequest::new([
            "tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc",
            "pr_Amon_CCSM4_historical_r1i1p1_195001-200512.nc",
        ]);
        assert!(matches!(
            monthly_climatology(&mixed),
            Err(Cmip5Error::MixedSimulations { component }) if component == "variable"
        ));

        let clim = ClimatologyRequest::new(["tas_Amon_CCSM4_historical_r1i1p1_197001-199912-clim.nc"]);
        assert!(matches!(
            monthly_climatology(&clim),
            Err(Cmip5Error::ClimatologyInput { .. })
        ));

        let empty = ClimatologyRequest::new(Vec::<PathBuf>::new());
        assert!(monthly_climatology(&empty).is_err());
    }

    #[test]
    fn year_slices_follow_python_rules() {
        let last30 = YearSelection::Slice {
            start: Some(-30),
            stop: None,
        };
        assert_eq!(last30.resolve(2006, 2100).unwrap(), (2071, 2100));

        let first10 = YearSelection::Slice {
            start: None,
            stop: Some(10),
        };
        assert_eq!(first10.resolve(2006, 2100).unwrap(), (2006, 2015));

        let whole = YearSelection::Slice {
            start: Some(-500),
            stop: Some(500),
        };
        assert_eq!(whole.resolve(2006, 2100).unwrap(), (2006, 2100));

        let empty = YearSelection::Slice {
            start: Some(5),
            stop: Some(5),
        };
        assert!(empty.resolve(2006, 2100).is_err());
        assert!(YearSelection::Range(2000, 1990).resolve(1850, 2005).is_err());
    }

    #[test]
    fn concatenation_plan_for_directory() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
            "pr_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc",
            "psl_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "psl_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
            "psl_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let plan = concatenate(dir.path()).unwrap();
        // pr is a single file and psl already has its aggregate on disk
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.existing.len(), 1);
        let tas = plan
            .jobs
            .iter()
            .find(|job| job.output.ends_with("tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc"))
            .unwrap();
        assert_eq!(tas.inputs.len(), 2);
        assert_eq!(tas.output.parent(), Some(dir.path()));

        let cmd = tas.command();
        assert_eq!(cmd.program(), "cdo");
        assert_eq!(cmd.arguments()[0], "cat");
        assert_eq!(cmd.arguments().len(), 4);
        assert_eq!(tas.removal().program(), "rm");
        assert_eq!(plan.commands().len(), plan.removals().len());
    }

    #[test]
    fn concatenation_skips_existing_outputs() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("slices");
        std::fs::create_dir(&sub).unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
        ] {
            File::create(sub.join(name)).unwrap();
        }
        assert_eq!(concatenate(&sub).unwrap().jobs.len(), 1);

        File::create(sub.join("tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc")).unwrap();
        // The aggregate covers both slices, leaving nothing to do
        let plan = concatenate(&sub).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.existing.len(), 1);
    }

    #[test]
    fn earlier_aggregate_replaces_its_slices() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_210101-215012.nc",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let plan = concatenate(dir.path()).unwrap();
        assert_eq!(plan.jobs.len(), 1);
        let job = &plan.jobs[0];
        assert_eq!(
            job.inputs,
            vec![
                dir.path().join("tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc"),
                dir.path().join("tas_Amon_CCSM4_rcp85_r1i1p1_210101-215012.nc"),
            ]
        );
        assert_eq!(
            job.output,
            dir.path().join("tas_Amon_CCSM4_rcp85_r1i1p1_200601-215012.nc")
        );
        assert!(job.gaps().is_empty());
    }

    #[test]
    fn partly_overlapping_slices_are_skipped() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_204001-210012.nc",
            "pr_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "pr_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let plan = concatenate(dir.path()).unwrap();
        assert_eq!(plan.jobs.len(), 1);
        assert!(plan.jobs[0]
            .output
            .ends_with("pr_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc"));
    }

    #[test]
    fn name_without_period_does_not_abort_plan() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc",
            "pr_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "pr_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let plan = concatenate(dir.path()).unwrap();
        assert_eq!(plan.jobs.len(), 1);
        assert!(plan.jobs[0]
            .output
            .ends_with("pr_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc"));
    }

    #[test]
    fn gaps_between_slices_are_reported() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_historical_r1i1p1_185001-189912.nc",
            "tas_Amon_CCSM4_historical_r1i1p1_190001-194912.nc",
            "tas_Amon_CCSM4_historical_r1i1p1_195101-200512.nc",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let plan = concatenate(dir.path()).unwrap();
        // A gap is only a warning, the job is still planned
        assert_eq!(plan.jobs.len(), 1);
        let gaps = plan.jobs[0].gaps();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].0.to_string(), "190001-194912");
        assert_eq!(gaps[0].1.to_string(), "195101-200512");
    }

    #[test]
    fn climatology_sorts_inputs_by_time() {
        let request = ClimatologyRequest::new([
            "tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc",
            "tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc",
        ]);
        let cmd = monthly_climatology(&request).unwrap().unwrap();
        assert_eq!(
            cmd.to_string(),
            "cdo -f nc4 ymonavg -cat \
             tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc \
             tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc \
             tas_Amon_CCSM4_historical_r1i1p1_185001-200512-clim.nc"
        );

        let ranged = request.years(YearSelection::Range(1940, 1960));
        let cmd = monthly_climatology(&ranged).unwrap().unwrap();
        assert_eq!(
            cmd.to_string(),
            "cdo -f nc4 ymonavg -seldate,1940-01-01,1960-12-31 -cat \
             tas_Amon_CCSM4_historical_r1i1p1_185001-194912.nc \
             tas_Amon_CCSM4_historical_r1i1p1_195001-200512.nc \
             tas_Amon_CCSM4_historical_r1i1p1_194001-196012-clim.nc"
        );
    }
}
