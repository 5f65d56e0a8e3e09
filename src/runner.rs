//! Execution of generated command lines
//!
//! Commands are spawned directly, without a shell, so file names never need
//! quoting. Batches run on the Rayon pool configured through
//! [`crate::parallel::ParallelConfig`].

use crate::commands::{CommandLine, ConcatJob, ConcatenationPlan};
use crate::errors::{Cmip5Error, Result};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner {
    dry_run: bool,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that only logs what it would do
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run one command and wait for it
    pub fn run(&self, cmd: &CommandLine) -> Result<()> {
        if self.dry_run {
            tracing::info!(command = %cmd, "dry run");
            return Ok(());
        }

        tracing::info!(command = %cmd, "running");
        let status = Command::new(cmd.program())
            .args(cmd.arguments())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Cmip5Error::CommandFailed {
                command: cmd.to_string(),
                status: status.code(),
            })
        }
    }

    /// Run a batch in parallel, one result per command in input order
    pub fn run_all(&self, cmds: &[CommandLine]) -> Vec<Result<()>> {
        cmds.par_iter().map(|cmd| self.run(cmd)).collect()
    }

    /// Delete the time slices consumed by a concatenation
    pub fn remove_inputs(&self, job: &ConcatJob) -> Result<()> {
        for input in &job.inputs {
            if self.dry_run {
                tracing::info!(file = %input.display(), "dry run: would remove");
                continue;
            }
            fs::remove_file(input)?;
            tracing::debug!(file = %input.display(), "removed");
        }
        Ok(())
    }

    /// Run every job of a plan, optionally removing inputs of the jobs that
    /// succeeded. Inputs of a failed job are never touched.
    pub fn execute_plan(&self, plan: &ConcatenationPlan, remove_inputs: bool) -> Vec<Result<PathBuf>> {
        plan.jobs
            .par_iter()
            .map(|job| {
                self.run(&job.command())?;
                if remove_inputs {
                    self.remove_inputs(job)?;
                }
                Ok(job.output.clone())
            })
            .collect()
    }

    /// [`run`](Self::run) on the blocking thread pool, for async callers
    pub async fn run_blocking(self, cmd: CommandLine) -> Result<()> {
        tokio::task::spawn_blocking(move || self.run(&cmd))
            .await
            .map_err(|e| Cmip5Error::Generic(format!("Command task failed: {}", e)))?
    }

    /// [`execute_plan`](Self::execute_plan) on the blocking thread pool, for async callers
    pub async fn execute_plan_blocking(
        self,
        plan: ConcatenationPlan,
        remove_inputs: bool,
    ) -> Result<Vec<Result<PathBuf>>> {
        tokio::task::spawn_blocking(move || self.execute_plan(&plan, remove_inputs))
            .await
            .map_err(|e| Cmip5Error::Generic(format!("Concatenation task failed: {}", e)))
    }
}
