//! CLI entry point for sitewatch.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod app;
mod app_config;
mod cli;

use cli::Args;

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything requested was done.
    Success,
    /// Some pages failed but a snapshot or export was still produced.
    Partial,
    /// Nothing was produced.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(1),
            ProcessExit::Failure => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let exit = app::runtime::run_sitewatch(args).await?;
    Ok(exit.into())
}
