//! Constants for the fetch module (timeouts, body limits).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout (30 seconds). Bounds a single slow page.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum body size kept from a single response (10 MiB); the rest is dropped.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
