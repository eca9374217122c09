// ai
//! 💀 PipelineError: the taxonomy of things that end a run.
//!
//! Backends speak `anyhow` (context chains, written with love, or despair).
//! The pipeline needs to tell a few failures apart: a bad line is not a bad
//! network, and a table that keeps saying "later" is not a table that said "no".
//! So the driver wraps whatever bubbled up into one of these variants.

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum PipelineError {
    /// 📨 The trigger payload was not an S3 notification we understand.
    Event(String),
    /// 📄 A line would not decode. Fatal. No skip-and-continue.
    Decode { line: u64, reason: String },
    /// 🪣 Fetching or reading (or un-gzipping) the source object failed.
    Source(anyhow::Error),
    /// 🧱 The bulk write request itself failed. Not throttled items: the whole request.
    Store(anyhow::Error),
    /// 🔁 The store kept handing items back and we ran out of patience.
    RetriesExhausted { attempts: u32, remaining: usize },
    /// 🔧 The knobs are set to something impossible.
    Config(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(reason) => write!(f, "invalid trigger event: {reason}"),
            Self::Decode { line, reason } => write!(f, "line {line} failed to decode: {reason}"),
            Self::Source(_) => write!(f, "source object could not be read"),
            Self::Store(_) => write!(f, "bulk write request failed"),
            Self::RetriesExhausted {
                attempts,
                remaining,
            } => write!(
                f,
                "{remaining} items still unprocessed after {attempts} retry attempts"
            ),
            Self::Config(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) | Self::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// 🧅 Peels the whole cause chain into one line: `outer: middle: root`.
///
/// This is what lands in the report's `error` field, so it has to make sense
/// to someone reading a JSON blob at 3am with no stack trace in sight.
pub fn chain_message(err: &(dyn Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    message
}
