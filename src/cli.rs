//! CLI argument definitions using clap derive macros.
//!
//! Tunables are optional here so that unset flags fall back to the config
//! file, then to built-in defaults.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Watch web pages for text changes and crawl sites for their URLs.
///
/// Sitewatch captures the title and paragraph text of a list of pages, keeps
/// the last few captures on disk, and reports what changed between runs.
#[derive(Parser, Debug)]
#[command(name = "sitewatch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file (default: $XDG_CONFIG_HOME/sitewatch/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture the target pages, keep history, and report changes
    Watch(WatchArgs),
    /// Discover every same-domain page reachable from a start URL
    Crawl(CrawlArgs),
}

/// Arguments of `sitewatch watch`.
#[derive(ClapArgs, Debug)]
pub struct WatchArgs {
    /// CSV or text file whose first column lists the URLs to watch
    pub targets_file: PathBuf,

    /// Directory holding one archive per target set (default: ./archive)
    #[arg(long, value_name = "DIR")]
    pub archive_root: Option<PathBuf>,

    /// Snapshots kept per archive (1-100, default 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub retention: Option<u8>,

    /// Maximum concurrent fetches (1-100, default 10)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Per-request timeout in seconds (1-3600, default 30)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Maximum attempts per page for transient failures (0-10, default 3)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Also write each change report as JSON into this directory
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Repeat the run every SECS seconds until interrupted
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

/// Arguments of `sitewatch crawl`.
#[derive(ClapArgs, Debug)]
pub struct CrawlArgs {
    /// URL to start crawling from
    pub start_url: String,

    /// Follow only links whose host ends with this (default: the start URL's host)
    #[arg(long)]
    pub domain: Option<String>,

    /// Maximum concurrent fetches per round (1-100, default 10)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: Option<u8>,

    /// Per-request timeout in seconds (1-3600, default 10)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Directory the visited URL list is written to (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,
}
