use thiserror::Error;

/// Errors surfaced while classifying an inbound frame.
///
/// Only control frames can fail; ordinary output that is not valid JSON
/// degrades to plain text instead of producing an error.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame carried the system-info prefix but its payload was not
    /// a `{username, hostname}` object.
    #[error("malformed system info payload: {0}")]
    MalformedSystemInfo(#[source] serde_json::Error),
}
