// ai
//! 📬 Bulk Write Executor: one batch in, one request out, one honest answer back.
//!
//! Wraps a batch as `{table: [put, put, ...]}`, fires it through the writer backend,
//! and returns the unprocessed remainder. That's it. Request-level failures are
//! not retried here; they become `PipelineError::Store` and end the run. Item-level
//! rejections are handed to the drainer, which has the patience for them.

use tracing::trace;

use crate::backends::BulkWriter;
use crate::batcher::Batch;
use crate::error::PipelineError;
use crate::item::{PutRequest, WriteRequests, count_requests};

pub(crate) struct BulkWriteExecutor<'w, W> {
    writer: &'w mut W,
    table_name: &'w str,
}

impl<'w, W: BulkWriter + Send> BulkWriteExecutor<'w, W> {
    pub(crate) fn new(writer: &'w mut W, table_name: &'w str) -> Self {
        Self { writer, table_name }
    }

    /// 📬 First submission of a freshly emitted batch. Returns the unprocessed remainder.
    pub(crate) async fn submit(&mut self, batch: Batch) -> Result<WriteRequests, PipelineError> {
        let puts = batch.into_iter().map(PutRequest::new).collect();
        let requests = WriteRequests::from([(self.table_name.to_string(), puts)]);
        self.send(requests).await
    }

    /// 🔁 Resubmit exactly the remainder the store handed back, nothing more.
    pub(crate) async fn resubmit(
        &mut self,
        remainder: WriteRequests,
    ) -> Result<WriteRequests, PipelineError> {
        self.send(remainder).await
    }

    async fn send(&mut self, requests: WriteRequests) -> Result<WriteRequests, PipelineError> {
        let sent = count_requests(&requests);
        let outcome = self
            .writer
            .write(requests)
            .await
            .map_err(PipelineError::Store)?;
        trace!(
            "📬 sent {} item(s), {} came back unprocessed",
            sent,
            outcome.unprocessed_count()
        );
        Ok(outcome.unprocessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryWriter, WriteScript};
    use crate::item::{AttributeValue, Item};

    fn batch(n: usize) -> Batch {
        (0..n)
            .map(|i| Item::from([("pk".to_string(), AttributeValue::S(i.to_string()))]))
            .collect()
    }

    #[tokio::test]
    async fn the_one_where_a_batch_goes_out_under_the_table_name() -> anyhow::Result<()> {
        let mut the_writer = InMemoryWriter::scripted([WriteScript::RejectFirst(2)]);
        let mut the_executor = BulkWriteExecutor::new(&mut the_writer, "orders");
        let the_remainder = the_executor.submit(batch(5)).await?;

        assert_eq!(count_requests(&the_remainder), 2);
        assert!(the_remainder.contains_key("orders"));
        let the_ledger = the_writer.ledger.lock().await;
        assert_eq!(the_ledger.calls, vec![5]);
        assert_eq!(the_ledger.accepted.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_request_failure_is_a_store_error() {
        let mut the_writer = InMemoryWriter::scripted([WriteScript::Fail("AccessDenied".into())]);
        let mut the_executor = BulkWriteExecutor::new(&mut the_writer, "orders");
        let the_error = the_executor.submit(batch(1)).await.unwrap_err();
        assert!(matches!(the_error, PipelineError::Store(_)));
    }
}
