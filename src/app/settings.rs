//! Effective run settings: CLI flag, then config file, then built-in default.

use std::path::PathBuf;

use sitewatch_core::DEFAULT_CONCURRENCY;
use sitewatch_core::DEFAULT_RETENTION;
use sitewatch_core::crawl::DEFAULT_WORKERS;
use sitewatch_core::fetch::DEFAULT_MAX_RETRIES;

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::{Args, CrawlArgs, WatchArgs};

const DEFAULT_ARCHIVE_ROOT: &str = "archive";
const DEFAULT_WATCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CRAWL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EXPORT_DIR: &str = ".";

/// Settings for `sitewatch watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchSettings {
    pub targets_file: PathBuf,
    pub archive_root: PathBuf,
    pub retention: usize,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub report_dir: Option<PathBuf>,
    pub interval_secs: Option<u64>,
}

/// Settings for `sitewatch crawl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CrawlSettings {
    pub start_url: String,
    pub domain: Option<String>,
    pub workers: usize,
    pub timeout_secs: u64,
    pub export_dir: PathBuf,
}

/// Default log level. `--quiet` and `-v` win over the config verbosity.
pub(crate) fn log_level(args: &Args, config: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => {}
        1 => return "debug",
        _ => return "trace",
    }
    match config.verbosity {
        Some(VerbositySetting::Quiet) => "error",
        Some(VerbositySetting::Verbose) => "debug",
        Some(VerbositySetting::Debug) => "trace",
        Some(VerbositySetting::Default) | None => "info",
    }
}

/// Whether non-error terminal output (spinner, summaries) is suppressed.
pub(crate) fn is_quiet(args: &Args, config: &FileConfig) -> bool {
    args.quiet || (args.verbose == 0 && config.verbosity == Some(VerbositySetting::Quiet))
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

pub(crate) fn watch_settings(args: &WatchArgs, config: &FileConfig) -> WatchSettings {
    WatchSettings {
        targets_file: args.targets_file.clone(),
        archive_root: args
            .archive_root
            .clone()
            .or_else(|| config.archive_root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_ROOT)),
        retention: args
            .retention
            .map(usize::from)
            .or(config.retention.map(to_usize))
            .unwrap_or(DEFAULT_RETENTION),
        concurrency: args
            .concurrency
            .map(usize::from)
            .or(config.concurrency.map(to_usize))
            .unwrap_or(DEFAULT_CONCURRENCY),
        timeout_secs: args
            .timeout
            .or(config.timeout_secs)
            .unwrap_or(DEFAULT_WATCH_TIMEOUT_SECS),
        max_retries: args
            .max_retries
            .map(u32::from)
            .or(config
                .max_retries
                .map(|value| u32::try_from(value).unwrap_or(u32::MAX)))
            .unwrap_or(DEFAULT_MAX_RETRIES),
        report_dir: args.report_dir.clone().or_else(|| config.report_dir.clone()),
        interval_secs: args.interval,
    }
}

pub(crate) fn crawl_settings(args: &CrawlArgs, config: &FileConfig) -> CrawlSettings {
    CrawlSettings {
        start_url: args.start_url.clone(),
        domain: args.domain.clone(),
        workers: args
            .workers
            .map(usize::from)
            .or(config.crawl_workers.map(to_usize))
            .unwrap_or(DEFAULT_WORKERS),
        // The shared `timeout_secs` key targets `watch`; crawls keep their shorter default.
        timeout_secs: args.timeout.unwrap_or(DEFAULT_CRAWL_TIMEOUT_SECS),
        export_dir: args
            .export_dir
            .clone()
            .or_else(|| config.export_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
    }
}
