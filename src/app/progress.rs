//! Progress UI (spinner) driven by the shared run counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sitewatch_core::RunProgress;

/// Spawns the spinner when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    progress: Arc<RunProgress>,
    verb: &'static str,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(progress, verb, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    progress: Arc<RunProgress>,
    verb: &'static str,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            spinner.set_message(progress_message(&progress, verb));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

fn progress_message(progress: &RunProgress, verb: &str) -> String {
    let failed = progress.failed();
    let mut message = format!("[{}/{}] {verb}", progress.done(), progress.total());
    if failed > 0 {
        message.push_str(&format!(" ({failed} failed)"));
    }
    message
}

/// Stops the spinner and waits for it to clear the line.
pub(crate) async fn stop_progress_ui(
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: &AtomicBool,
) {
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_progress_ui_when_disabled_returns_none_handle_and_stop_already_true() {
        let (handle, stop) = spawn_progress_ui(false, Arc::new(RunProgress::new()), "Fetching");

        assert!(handle.is_none());
        assert!(
            stop.load(Ordering::SeqCst),
            "stop signal should be true when spinner disabled"
        );
    }

    #[tokio::test]
    async fn spawn_progress_ui_when_enabled_stops_on_signal() {
        let (handle, stop) = spawn_progress_ui(true, Arc::new(RunProgress::new()), "Fetching");

        assert!(handle.is_some(), "handle should be Some when spinner enabled");
        assert!(!stop.load(Ordering::SeqCst), "stop should be false initially");

        stop_progress_ui(handle, &stop).await;
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_progress_message_counts() {
        let progress = RunProgress::new();
        progress.add_total(3);
        progress.record_success();
        assert_eq!(progress_message(&progress, "Fetching"), "[1/3] Fetching");

        progress.record_failure();
        assert_eq!(
            progress_message(&progress, "Fetching"),
            "[2/3] Fetching (1 failed)"
        );
    }
}
