use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use sitewatch_core::RunContext;
use tracing::debug;

use crate::ProcessExit;
use crate::app::{crawl, settings, terminal, watch};
use crate::app_config::{self, VerbositySetting};
use crate::cli::{Args, Command};

pub(crate) async fn run_sitewatch(args: Args) -> Result<ProcessExit> {
    let file_config = app_config::load_config(args.config.as_deref())?;

    let default_level = settings::log_level(&args, &file_config);
    let no_color = terminal::is_no_color_requested(args.no_color);
    terminal::init_tracing(default_level, no_color, args.log_file.as_deref())?;
    debug!(?args, "CLI arguments parsed");
    debug!(
        verbosity = file_config.verbosity.map(VerbositySetting::as_str),
        "config loaded"
    );

    let quiet = settings::is_quiet(&args, &file_config);
    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });
    let ctx = RunContext::with_interrupt_flag(interrupted);

    match &args.command {
        Command::Watch(watch_args) => {
            let watch_settings = settings::watch_settings(watch_args, &file_config);
            debug!(?watch_settings, "resolved watch settings");
            watch::run_watch(watch_settings, ctx, use_spinner, quiet).await
        }
        Command::Crawl(crawl_args) => {
            let crawl_settings = settings::crawl_settings(crawl_args, &file_config);
            debug!(?crawl_settings, "resolved crawl settings");
            crawl::run_crawl(crawl_settings, ctx, use_spinner, quiet).await
        }
    }
}
