// ai
//! 🚂 Pipeline Driver: one trigger in, one report out.
//!
//! ```text
//!   open object ─▶ gunzip ─▶ lines ─▶ decode ─▶ batch ─┬─▶ submit ─▶ drain ─┐
//!                                                     │                    │
//!                                                     └────── next line ◀──┘
//!   end of stream ─▶ flush ─▶ submit ─▶ drain ─▶ report
//! ```
//!
//! Everything runs on one task, strictly in order: a batch is written and fully
//! drained before the next line is read. The driver is the only place errors are
//! caught. Whatever goes wrong below it becomes a failed [`RunReport`] with the
//! cause chain in `error`; `run` itself never returns `Err`.
//!
//! 🧠 Knowledge graph:
//! - Blank lines are skipped and do not count as records. Line numbers still count them.
//! - A line that will not decode ends the run. The half-full batch is NOT flushed.
//! - Cancellation is honored at batch boundaries only. An emitted batch always finishes draining.
//! - Partial progress survives failure: `recordsWritten` and `batchesWritten` say how far we got.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app_config::AppConfig;
use crate::backends::{BulkWriter, ObjectSource, SourceBackend, WriterBackend};
use crate::batcher::{Batch, Batcher};
use crate::decoder::RecordDecoder;
use crate::drainer::{DrainReport, RetryDrainer};
use crate::error::{PipelineError, chain_message};
use crate::event::{ObjectLocation, parse_notification};
use crate::executor::BulkWriteExecutor;
use crate::item::count_requests;
use crate::lines::{GzipLineReader, InvalidUtf8Line};
use crate::progress::ProgressMetrics;
use crate::report::{ReportBuilder, RunPhase, RunReport};

/// 🚂 A configured loader. Build it once, run it per trigger.
#[derive(Debug)]
pub struct Pipeline {
    config: AppConfig,
    source: SourceBackend,
    writer: WriterBackend,
    decoder: RecordDecoder,
}

impl Pipeline {
    /// 🏗️ Refuses a config that `load_config` would have refused, so a hand-built
    /// one cannot sneak a 100-item batch past the store's ceiling.
    pub fn new(
        config: AppConfig,
        source: SourceBackend,
        writer: WriterBackend,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let decoder = RecordDecoder::new(config.payload_key.clone(), config.payload_encoding);
        Ok(Self {
            config,
            source,
            writer,
            decoder,
        })
    }

    /// 📨 Parse an S3 notification and load the object it points at.
    ///
    /// A payload that is not a usable notification yields a failed report without
    /// touching the source or the table.
    pub async fn run_event(&mut self, payload: &str, cancel: &CancellationToken) -> RunReport {
        match parse_notification(payload) {
            Ok(location) => self.run(&location, cancel).await,
            Err(err) => {
                let message = chain_message(&err);
                error!("💀 {}: {}", RunPhase::Finished { success: false }, message);
                RunReport::failed(message)
            }
        }
    }

    /// 🚀 Load one gzip NDJSON object into the table.
    pub async fn run(&mut self, location: &ObjectLocation, cancel: &CancellationToken) -> RunReport {
        let mut builder = ReportBuilder::start();
        info!(
            "🚦 {}: loading {} into table '{}' (batches of {})",
            RunPhase::Started,
            location,
            self.config.table_name,
            self.config.batch_size
        );

        let outcome = self.load(location, cancel, &mut builder.report).await;
        let error = match outcome {
            Ok(()) => None,
            Err(err) => {
                let message = chain_message(&err);
                error!(
                    "💀 loading {} failed after {} record(s) written: {}",
                    location, builder.report.records_written, message
                );
                Some(message)
            }
        };

        let report = builder.finish(error);
        info!(
            "🏁 {}: {} record(s) in {} batch(es), {} retry attempt(s), {} ms",
            RunPhase::Finished {
                success: report.success
            },
            report.records_written,
            report.batches_written,
            report.retry_attempts,
            report.execution_time_ms
        );
        report
    }

    async fn load(
        &mut self,
        location: &ObjectLocation,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            warn!("🛑 cancelled before {} was opened", location);
            report.cancelled = true;
            return Ok(());
        }

        let object = self
            .source
            .open(location)
            .await
            .map_err(PipelineError::Source)?;
        report.file_size_bytes = object.content_length.unwrap_or(0);
        info!(
            "🚦 {}: {} ({} compressed bytes advertised)",
            RunPhase::Reading,
            object.label,
            object
                .content_length
                .map_or_else(|| "unknown".to_string(), |len| len.to_string())
        );

        let mut progress = ProgressMetrics::new(object.label, object.content_length);
        let mut lines = GzipLineReader::new(object.reader);
        let mut batcher = Batcher::new(self.config.batch_size);
        let mut executor = BulkWriteExecutor::new(&mut self.writer, &self.config.table_name);
        let drainer = RetryDrainer::new(&self.config.retry);
        let decoder = &self.decoder;

        let outcome = async {
            loop {
                let next = lines.next_line().await;
                report.bytes_read = lines.compressed_bytes_read();
                let Some(line) = next.map_err(classify_read_error)? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let item = decoder
                    .decode_line(&line)
                    .map_err(|reason| PipelineError::Decode {
                        line: lines.line_number(),
                        reason,
                    })?;
                report.records_processed += 1;

                if let Some(batch) = batcher.add(item) {
                    debug!(
                        "🧺 {}: batch #{} is full",
                        RunPhase::Batching,
                        report.batches_written + 1
                    );
                    write_batch(&mut executor, &drainer, batch, report).await?;
                    progress.update(report.bytes_read, report.records_processed, report.records_written);

                    if cancel.is_cancelled() {
                        warn!(
                            "🛑 cancelled after batch #{}; {} buffered record(s) left unwritten",
                            report.batches_written,
                            batcher.pending()
                        );
                        report.cancelled = true;
                        return Ok(());
                    }
                }
            }

            if cancel.is_cancelled() {
                warn!(
                    "🛑 cancelled at end of stream; the final {} record(s) were not flushed",
                    batcher.pending()
                );
                report.cancelled = true;
                return Ok(());
            }

            info!(
                "🚦 {}: end of stream, {} record(s) still buffered",
                RunPhase::Flushing,
                batcher.pending()
            );
            if let Some(batch) = batcher.flush() {
                write_batch(&mut executor, &drainer, batch, report).await?;
                progress.update(report.bytes_read, report.records_processed, report.records_written);
            }
            Ok::<(), PipelineError>(())
        }
        .await;

        progress.finish();
        outcome
    }
}

/// 🔤 A line that is not UTF-8 is bad input, not a bad stream.
fn classify_read_error(err: anyhow::Error) -> PipelineError {
    match err.downcast::<InvalidUtf8Line>() {
        Ok(bad_line) => PipelineError::Decode {
            line: bad_line.line,
            reason: bad_line.to_string(),
        },
        Err(err) => PipelineError::Source(err),
    }
}

/// 📬 Submit one batch and drain its remainder. Counters move only for what the store kept.
async fn write_batch<W: BulkWriter + Send>(
    executor: &mut BulkWriteExecutor<'_, W>,
    drainer: &RetryDrainer<'_>,
    batch: Batch,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    let size = batch.len();
    debug!(
        "📬 {}: batch #{} with {} item(s)",
        RunPhase::Writing,
        report.batches_written + 1,
        size
    );
    let remainder = executor.submit(batch).await?;

    let rejected = count_requests(&remainder);
    if rejected > 0 {
        debug!(
            "🔁 {}: {} of {} item(s) came back unprocessed",
            RunPhase::Draining,
            rejected,
            size
        );
    }

    let DrainReport {
        summary,
        remaining,
        failure,
    } = drainer.drain(executor, remainder).await;
    if summary.attempts > 0 {
        debug!(
            "🔁 batch #{} took {} resend(s), {} item(s) resent in total",
            report.batches_written + 1,
            summary.attempts,
            summary.items_retried
        );
    }
    report.retry_attempts += u64::from(summary.attempts);
    report.records_written += (size - remaining) as u64;

    match failure {
        Some(err) => Err(err),
        None => {
            report.batches_written += 1;
            Ok(())
        }
    }
}
