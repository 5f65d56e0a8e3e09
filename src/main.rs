//! Entry point for the cmip5 tool.
//! Handles CLI parsing and dispatches to file-name, ESGF and CDO operations.

use clap::Parser;
use cmip5::commands::{concatenate, monthly_climatology, ClimatologyRequest};
use cmip5::errors::Cmip5Error;
use cmip5::esg::{prune_wget, EsgClient, QueryKind};
use cmip5::filename::Cmip5FileName;
use cmip5::inspect::{check_consistency, print_metadata};
use cmip5::logging::init_cli_logger;
use cmip5::parallel::{get_parallel_info, ParallelConfig};
use cmip5::runner::CommandRunner;
use std::fs;
use std::path::Path;

mod cli;

use cli::{year_selection, Args, Command, CriteriaArgs, WindowArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();
    init_cli_logger(args.verbose);

    ParallelConfig::new(args.threads).setup_global_pool()?;
    get_parallel_info().log();

    match args.command {
        Command::Split { files } => {
            for file in &files {
                print_components(file)?;
            }
        }
        Command::Concat {
            dir,
            execute,
            remove,
        } => run_concat(&dir, execute, remove).await?,
        Command::Clim {
            files,
            years,
            last,
            first,
            tag,
            output,
            cdo_options,
            execute,
        } => {
            let mut request = ClimatologyRequest::new(files).tag(tag).options(cdo_options);
            if let Some(selection) = year_selection(years, last, first) {
                request = request.years(selection);
            }
            if let Some(output) = output {
                request = request.output(output);
            }

            match monthly_climatology(&request)? {
                Some(cmd) if execute => {
                    let line = cmd.to_string();
                    CommandRunner::new().run_blocking(cmd).await?;
                    println!("✅ {}", line);
                }
                Some(cmd) => println!("{}", cmd),
                None => eprintln!("⚠ No input file overlaps the selected years"),
            }
        }
        Command::Url { kind, criteria } => {
            let query = criteria.to_query(kind.into());
            println!("{}", query.url(&args.esg_node)?);
        }
        Command::Search { criteria, limit } => {
            run_search(&args.esg_node, &criteria, limit).await?;
        }
        Command::Wget {
            criteria,
            window,
            output,
        } => {
            let client = EsgClient::new(args.esg_node.as_str());
            let script = client
                .wget_script(&criteria.to_query(QueryKind::Wget))
                .await?;
            let script = prune(&script, &window)?;
            match output {
                Some(path) => {
                    fs::write(&path, script)?;
                    println!("✅ Saved wget script to {}", path.display());
                }
                None => println!("{}", script),
            }
        }
        Command::PruneWget { script, window } => {
            let contents = fs::read_to_string(&script)?;
            println!("{}", prune(&contents, &window)?);
        }
        Command::Inspect { file } => {
            let nc = netcdf::open(&file)?;
            println!("Successfully opened NetCDF file: {}", file.display());

            match Cmip5FileName::parse(&file) {
                Ok(name) => {
                    print_components(&file)?;
                    let mismatches = check_consistency(&nc, &name)?;
                    if mismatches.is_empty() {
                        println!("\n✅ Global attributes match the file name");
                    } else {
                        println!("\n⚠ Global attributes disagree with the file name:");
                        for mismatch in &mismatches {
                            println!("   • {}", mismatch);
                        }
                    }
                }
                Err(e) => tracing::warn!("not a CMIP5 file name: {}", e),
            }

            print_metadata(&nc)?;
        }
    }

    Ok(())
}

fn print_components(file: &Path) -> Result<(), Cmip5Error> {
    let name = Cmip5FileName::parse(file)?;
    println!("\n {}", file.display());
    println!("    variable:   {}", name.variable);
    println!("    MIP table:  {}", name.mip_table);
    println!("    model:      {}", name.model);
    println!("    experiment: {}", name.experiment);
    println!("    ensemble:   {}", name.ensemble);
    match &name.period {
        Some(period) => {
            println!("    period:     {} to {}", period.start.instant, period.end.instant);
            if let Some(clim) = &period.clim {
                println!("    clim:       {}", clim);
            }
        }
        None => println!("    period:     (time-invariant)"),
    }
    Ok(())
}

async fn run_concat(dir: &Path, execute: bool, remove: bool) -> Result<(), Cmip5Error> {
    let plan = concatenate(dir)?;
    if plan.is_empty() {
        println!("Nothing to concatenate in {}", dir.display());
        return Ok(());
    }

    if !execute {
        for cmd in plan.commands() {
            println!("{}", cmd);
        }
        println!();
        for cmd in plan.removals() {
            println!("{}", cmd);
        }
        return Ok(());
    }

    let results = CommandRunner::new()
        .execute_plan_blocking(plan, remove)
        .await?;
    let mut failed = 0;
    for result in &results {
        match result {
            Ok(output) => println!("✅ {}", output.display()),
            Err(e) => {
                failed += 1;
                eprintln!("❌ {}", e);
            }
        }
    }

    if failed > 0 {
        return Err(Cmip5Error::Generic(format!(
            "{} of {} concatenations failed",
            failed,
            results.len()
        )));
    }
    Ok(())
}

async fn run_search(node: &str, criteria: &CriteriaArgs, limit: usize) -> Result<(), Cmip5Error> {
    let client = EsgClient::new(node);
    let query = criteria
        .to_query(QueryKind::Search)
        .constrain("limit", limit.to_string());
    let response = client.search(&query).await?;

    println!("Found {} datasets on {}", response.num_found, client.node());
    for id in response.ids() {
        println!("- {}", id);
    }
    Ok(())
}

fn prune(script: &str, window: &WindowArgs) -> Result<String, Cmip5Error> {
    prune_wget(script, window.start.as_deref(), window.end.as_deref())
}
