//! Binary-side plumbing: settings resolution, terminal setup, and the
//! `watch` and `crawl` commands.

pub(crate) mod crawl;
pub(crate) mod exit_handler;
pub(crate) mod progress;
pub(crate) mod runtime;
pub(crate) mod settings;
pub(crate) mod terminal;
pub(crate) mod watch;
