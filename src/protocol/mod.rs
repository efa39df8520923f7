//! Line protocol spoken with the worker process.
//!
//! The worker writes two newline-delimited streams:
//! - stdout (data channel): one JSON object per line describing a fix
//! - stderr (control channel): one status/error token per line
//!
//! Each channel gets its own [`LineBuffer`] per worker instance so partial
//! lines never leak across a reconnect.

mod control;
mod data;
mod lines;
#[cfg(test)]
mod tests;

pub use control::ControlToken;
pub use data::{decode_data_line, DataLine};
pub use lines::{LineBuffer, RawLine};

/// Longest snippet of an offending line kept for logs and counters.
pub(crate) const SNIPPET_MAX_CHARS: usize = 50;

pub(crate) fn snippet(line: &str) -> String {
    line.chars().take(SNIPPET_MAX_CHARS).collect()
}
