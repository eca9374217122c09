// ai
//! 📋 Run Report: the one thing a run leaves behind besides the rows in the table.
//!
//! Created when a run starts, mutated only by the driver, finalized when the run
//! ends. Success or failure, the caller always gets one of these back. A failed
//! report still says how far we got, because "it failed" and "it failed after
//! writing 40,000 of 41,000 rows" are very different 3am conversations.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

/// 🚦 Where a run is in its life. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Started,
    Reading,
    Batching,
    Writing,
    Draining,
    Flushing,
    Finished { success: bool },
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Reading => write!(f, "READING"),
            Self::Batching => write!(f, "BATCHING"),
            Self::Writing => write!(f, "WRITING"),
            Self::Draining => write!(f, "DRAINING"),
            Self::Flushing => write!(f, "FLUSHING"),
            Self::Finished { success: true } => write!(f, "FINISHED(success)"),
            Self::Finished { success: false } => write!(f, "FINISHED(failed)"),
        }
    }
}

/// 📋 The summary returned from every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    /// 📏 size of the source object as advertised, or compressed bytes read when it was not
    pub file_size_bytes: u64,
    pub execution_time_ms: u64,
    /// 📦 compressed bytes actually pulled from the source
    pub bytes_read: u64,
    /// 📄 records decoded from the stream
    pub records_processed: u64,
    /// ✅ records the store acknowledged
    pub records_written: u64,
    /// 🧺 batches fully written and drained
    pub batches_written: u64,
    /// 🔁 resubmissions of unprocessed remainders, across all batches
    pub retry_attempts: u64,
    /// 🛑 the run stopped at a batch boundary because someone asked it to
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// 💀 A report for a run that failed before it could start: nothing read, nothing written.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// ⏱️ A report under construction, plus the clock it is measured against.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    started: Instant,
    pub(crate) report: RunReport,
}

impl ReportBuilder {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
            report: RunReport::default(),
        }
    }

    /// 🏁 Stamp elapsed time and outcome. Consumes the builder: a finished report stays finished.
    pub(crate) fn finish(mut self, error: Option<String>) -> RunReport {
        self.report.execution_time_ms =
            u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if self.report.file_size_bytes == 0 {
            self.report.file_size_bytes = self.report.bytes_read;
        }
        self.report.success = error.is_none() && !self.report.cancelled;
        self.report.error = error;
        self.report
    }
}
