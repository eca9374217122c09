// ai
//! 🔁 Retry Drainer: keeps resubmitting the unprocessed remainder until there isn't one.
//!
//! 🎬 *[the table returns 200 OK]* *[three items are missing from the acknowledgement]*
//! *["try again," it says, without saying which part of "again" it means]*
//!
//! A bulk write that comes back with unprocessed items is not a failure. It is the
//! store saying "not now". The drainer is an explicit little state machine:
//!
//! ```text
//!   Draining(remainder) ──resubmit──▶ Draining(smaller or same remainder)
//!          │                               │
//!          │ remainder empty               │ request error / too many attempts
//!          ▼                               ▼
//!       Drained                         Failed(error)
//! ```
//!
//! Between attempts it sleeps with capped exponential backoff plus jitter, and after
//! `max_attempts` resubmissions it gives up with `RetriesExhausted` instead of looping
//! until the heat death of the provisioned capacity.
//!
//! 🧠 Knowledge graph:
//! - Only the remainder is ever resent. Accepted items never go out twice.
//! - Items are never dropped: each is either acknowledged or still in the remainder.
//! - The executor does the I/O; the drainer only decides when and whether.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::backends::BulkWriter;
use crate::error::PipelineError;
use crate::executor::BulkWriteExecutor;
use crate::item::{WriteRequests, count_requests};

/// 🔧 How patient the drainer is.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// 🔁 resubmissions per batch before the run is declared failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// ⏱️ sleep before the first resubmission, doubled each time after
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 🧢 no single sleep is longer than this
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(PipelineError::Config(format!(
                "retry.initial_backoff_ms ({}) must be <= retry.max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// ⏱️ Sleep before resubmission number `attempt` (0-based).
    ///
    /// `initial * 2^attempt`, capped, then ±25% jitter, clamped back under the cap so
    /// jitter never blows through the ceiling.
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let capped = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        let jitter_range = capped / 4;
        let jitter = if jitter_range > 0 {
            let seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64;
            seed % (jitter_range * 2)
        } else {
            0
        };
        let with_jitter = capped
            .saturating_sub(jitter_range)
            .saturating_add(jitter)
            .min(self.max_backoff_ms);
        Duration::from_millis(with_jitter)
    }
}

/// 🚦 The drainer's whole life story.
#[derive(Debug)]
enum DrainState {
    Draining(WriteRequests),
    Drained,
    Failed(PipelineError),
}

/// 📊 What draining one batch cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DrainSummary {
    /// 🔁 resubmissions issued (0 when the first write took everything)
    pub attempts: u32,
    /// 📦 items resent, summed over attempts
    pub items_retried: u64,
}

/// 🔁 Outcome of a drain: the summary, plus the error if the drain ended in `Failed`.
#[derive(Debug)]
pub(crate) struct DrainReport {
    pub summary: DrainSummary,
    /// 📦 items not acknowledged when the drain stopped (0 once drained)
    pub remaining: usize,
    pub failure: Option<PipelineError>,
}

pub(crate) struct RetryDrainer<'c> {
    config: &'c RetryConfig,
}

impl<'c> RetryDrainer<'c> {
    pub(crate) fn new(config: &'c RetryConfig) -> Self {
        Self { config }
    }

    /// 🔁 Resubmit `remainder` until it is empty, the store refuses the request, or we run out of attempts.
    pub(crate) async fn drain<W: BulkWriter + Send>(
        &self,
        executor: &mut BulkWriteExecutor<'_, W>,
        remainder: WriteRequests,
    ) -> DrainReport {
        let mut summary = DrainSummary::default();
        let mut remaining = count_requests(&remainder);
        let mut state = if count_requests(&remainder) == 0 {
            DrainState::Drained
        } else {
            DrainState::Draining(remainder)
        };

        loop {
            state = match state {
                DrainState::Drained => {
                    return DrainReport {
                        summary,
                        remaining: 0,
                        failure: None,
                    };
                }
                DrainState::Failed(err) => {
                    return DrainReport {
                        summary,
                        remaining,
                        failure: Some(err),
                    };
                }
                DrainState::Draining(remainder) => {
                    let pending = count_requests(&remainder);
                    remaining = pending;
                    if summary.attempts >= self.config.max_attempts {
                        warn!(
                            "🔁 giving up: {} item(s) still unprocessed after {} attempt(s)",
                            pending, summary.attempts
                        );
                        DrainState::Failed(PipelineError::RetriesExhausted {
                            attempts: summary.attempts,
                            remaining: pending,
                        })
                    } else {
                        let delay = self.config.backoff(summary.attempts);
                        debug!(
                            "🔁 retrying the unprocessed {} item(s) in {:?} (attempt {})",
                            pending,
                            delay,
                            summary.attempts + 1
                        );
                        tokio::time::sleep(delay).await;

                        summary.attempts += 1;
                        summary.items_retried += pending as u64;
                        match executor.resubmit(remainder).await {
                            Ok(next) if count_requests(&next) == 0 => DrainState::Drained,
                            Ok(next) => DrainState::Draining(next),
                            Err(err) => DrainState::Failed(err),
                        }
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryWriter, WriteScript};
    use crate::item::{AttributeValue, Item, PutRequest};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    fn batch(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| Item::from([("pk".to_string(), AttributeValue::S(format!("k{i}")))]))
            .collect()
    }

    async fn submit_and_drain(
        writer: &mut InMemoryWriter,
        config: &RetryConfig,
        items: Vec<Item>,
    ) -> Result<DrainReport, PipelineError> {
        let mut executor = BulkWriteExecutor::new(writer, "orders");
        let remainder = executor.submit(items).await?;
        Ok(RetryDrainer::new(config).drain(&mut executor, remainder).await)
    }

    #[tokio::test]
    async fn the_one_where_the_store_says_yes_the_second_time() -> anyhow::Result<()> {
        let mut the_writer = InMemoryWriter::scripted([WriteScript::RejectFirst(3)]);
        let the_report = submit_and_drain(&mut the_writer, &fast(), batch(25)).await?;

        assert!(the_report.failure.is_none());
        assert_eq!(the_report.summary.attempts, 1);
        assert_eq!(the_report.summary.items_retried, 3);
        let the_ledger = the_writer.ledger.lock().await;
        assert_eq!(the_ledger.calls, vec![25, 3], "exactly two write calls, second one only the rejects");
        assert_eq!(the_ledger.accepted.len(), 25);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_nothing_is_lost_or_doubled_under_a_stubborn_table() -> anyhow::Result<()> {
        let mut the_writer = InMemoryWriter::scripted([
            WriteScript::RejectEveryNth(2),
            WriteScript::RejectFirst(5),
            WriteScript::RejectEveryNth(3),
            WriteScript::RejectFirst(1),
            WriteScript::RejectEveryNth(1),
        ]);
        let the_items = batch(25);
        let the_report = submit_and_drain(&mut the_writer, &fast(), the_items.clone()).await?;
        assert!(the_report.failure.is_none());

        let the_ledger = the_writer.ledger.lock().await;
        let mut the_accepted: Vec<Item> = the_ledger.accepted.iter().map(|p| p.item.clone()).collect();
        let mut the_expected = the_items;
        the_accepted.sort_by_key(|item| format!("{item:?}"));
        the_expected.sort_by_key(|item| format!("{item:?}"));
        assert_eq!(the_accepted, the_expected, "accepted multiset must equal the original batch");
        Ok(())
    }

    /// 🎲 Tiny deterministic generator so every failing seed can be replayed.
    struct Lcg(u64);

    impl Lcg {
        fn below(&mut self, n: u64) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 33) % n
        }
    }

    #[tokio::test]
    async fn the_one_where_no_rejection_sequence_loses_or_doubles_an_item() -> anyhow::Result<()> {
        let mut the_drained = 0;
        let mut the_exhausted = 0;

        for seed in 0..200u64 {
            let mut the_rng = Lcg(seed);
            let the_size = 1 + the_rng.below(25) as usize;
            let the_script: Vec<WriteScript> = (0..1 + the_rng.below(8))
                .map(|_| {
                    if the_rng.below(2) == 0 {
                        WriteScript::RejectFirst(the_rng.below(the_size as u64 + 1) as usize)
                    } else {
                        WriteScript::RejectEveryNth(1 + the_rng.below(4) as usize)
                    }
                })
                .collect();
            let the_config = RetryConfig {
                max_attempts: 1 + the_rng.below(4) as u32,
                ..fast()
            };

            let the_items = batch(the_size);
            let mut the_writer = InMemoryWriter::scripted(the_script.clone());
            let the_report = submit_and_drain(&mut the_writer, &the_config, the_items.clone()).await?;

            let the_ledger = the_writer.ledger.lock().await;
            let mut the_accepted: Vec<String> =
                the_ledger.accepted.iter().map(|p| format!("{:?}", p.item)).collect();
            the_accepted.sort();
            let before_dedup = the_accepted.len();
            the_accepted.dedup();
            assert_eq!(before_dedup, the_accepted.len(), "seed {seed}: an item was written twice ({the_script:?})");

            let the_originals: Vec<String> = the_items.iter().map(|item| format!("{item:?}")).collect();
            assert!(
                the_accepted.iter().all(|item| the_originals.contains(item)),
                "seed {seed}: the table accepted an item nobody sent"
            );
            assert_eq!(
                the_accepted.len(),
                the_size - the_report.remaining,
                "seed {seed}: accepted must be the batch minus the final remainder ({the_script:?})"
            );

            match the_report.failure {
                None => {
                    assert_eq!(the_report.remaining, 0, "seed {seed}");
                    the_drained += 1;
                }
                Some(PipelineError::RetriesExhausted { remaining, .. }) => {
                    assert_eq!(remaining, the_report.remaining, "seed {seed}");
                    assert!(remaining > 0, "seed {seed}");
                    the_exhausted += 1;
                }
                Some(other) => panic!("seed {seed}: unexpected failure {other}"),
            }
        }

        assert!(the_drained > 0 && the_exhausted > 0, "the seeds should cover both endings");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_patience_runs_out() -> anyhow::Result<()> {
        let the_config = RetryConfig {
            max_attempts: 2,
            ..fast()
        };
        let mut the_writer = InMemoryWriter::scripted(vec![WriteScript::RejectFirst(1); 10]);
        let the_report = submit_and_drain(&mut the_writer, &the_config, batch(4)).await?;

        assert!(matches!(
            the_report.failure,
            Some(PipelineError::RetriesExhausted { attempts: 2, remaining: 1 })
        ));
        assert_eq!(the_report.remaining, 1);
        assert_eq!(the_writer.ledger.lock().await.calls, vec![4, 1, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_request_error_mid_drain_is_fatal() -> anyhow::Result<()> {
        let mut the_writer = InMemoryWriter::scripted([
            WriteScript::RejectFirst(2),
            WriteScript::Fail("ValidationException".into()),
        ]);
        let the_report = submit_and_drain(&mut the_writer, &fast(), batch(5)).await?;
        assert!(matches!(the_report.failure, Some(PipelineError::Store(_))));
        assert_eq!(the_report.summary.attempts, 1);
        assert_eq!(the_report.remaining, 2, "the failed resend's items are not counted as written");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_remainder_needs_no_drain() {
        let mut the_writer = InMemoryWriter::new();
        let mut the_executor = BulkWriteExecutor::new(&mut the_writer, "orders");
        let the_report = RetryDrainer::new(&fast())
            .drain(&mut the_executor, WriteRequests::from([("orders".to_string(), Vec::<PutRequest>::new())]))
            .await;
        assert!(the_report.failure.is_none());
        assert_eq!(the_report.summary, DrainSummary::default());
        assert!(the_writer.ledger.lock().await.calls.is_empty());
    }

    #[test]
    fn the_one_where_backoff_doubles_and_hits_the_ceiling() {
        let the_config = RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        for (attempt, base) in [(0u32, 100u64), (1, 200), (2, 400), (3, 800)] {
            let the_delay = the_config.backoff(attempt).as_millis() as u64;
            assert!(
                the_delay >= base - base / 4 && the_delay <= base + base / 4,
                "attempt {attempt}: {the_delay}ms not within 25% of {base}ms"
            );
        }
        for attempt in [4u32, 10, 63, 64, 200] {
            assert!(the_config.backoff(attempt) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn the_one_where_initial_above_max_is_rejected() {
        let the_config = RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 10,
            max_backoff_ms: 5,
        };
        assert!(matches!(the_config.validate(), Err(PipelineError::Config(_))));
    }
}
