//! Process exit outcome from run counts.

use crate::ProcessExit;

/// Determines exit outcome from captured and failed page counts.
pub(crate) fn determine_exit_outcome(captured: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if captured > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
