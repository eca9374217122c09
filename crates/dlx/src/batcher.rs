// ai
//! 🧺 Batcher: collects items until the basket is full, then hands the basket over.
//!
//! DynamoDB takes at most 25 puts per `BatchWriteItem`. The batcher is the
//! bouncer counting heads at the door. `add` returns a full batch the moment one
//! exists; `flush` returns the stragglers at end of stream. Forgetting to call
//! `flush` silently drops the tail of every file, which is why the driver calls it
//! on every clean exit and why there is a test that screams if it does not.

use crate::app_config::MAX_BATCH_SIZE;
use crate::item::Item;

/// 🧺 An ordered group of items, `len() <= batch_size`.
pub type Batch = Vec<Item>;

#[derive(Debug)]
pub(crate) struct Batcher {
    batch_size: usize,
    in_flight: Batch,
}

impl Batcher {
    /// 🏗️ `batch_size` is clamped to `1..=MAX_BATCH_SIZE`. Config validation already
    /// refuses anything outside that; the batcher still never emits more than the store takes.
    pub(crate) fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            batch_size,
            in_flight: Vec::with_capacity(batch_size),
        }
    }

    /// ➕ Append one item. Returns the batch if this item filled it.
    pub(crate) fn add(&mut self, item: Item) -> Option<Batch> {
        self.in_flight.push(item);
        if self.in_flight.len() >= self.batch_size {
            Some(std::mem::replace(
                &mut self.in_flight,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// 🏁 End of stream: hand over whatever is left, if anything is.
    pub(crate) fn flush(&mut self) -> Option<Batch> {
        if self.in_flight.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.in_flight))
        }
    }

    /// 🔢 Items waiting for their batch to fill up.
    pub(crate) fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::AttributeValue;

    fn item(n: usize) -> Item {
        Item::from([("n".to_string(), AttributeValue::N(n.to_string()))])
    }

    fn batch_everything(total: usize, batch_size: usize) -> Vec<Batch> {
        let mut the_batcher = Batcher::new(batch_size);
        let mut the_batches: Vec<Batch> = (0..total).filter_map(|n| the_batcher.add(item(n))).collect();
        the_batches.extend(the_batcher.flush());
        the_batches
    }

    #[test]
    fn the_one_where_batch_count_is_the_ceiling_of_n_over_b() {
        for (total, batch_size) in [(0, 25), (1, 25), (10, 25), (25, 25), (26, 25), (30, 25), (100, 7), (7, 1)] {
            let the_batches = batch_everything(total, batch_size);
            assert_eq!(
                the_batches.len(),
                total.div_ceil(batch_size),
                "{total} items at {batch_size} per batch"
            );
            // ✅ every batch but the last is exactly full
            if let Some((the_last, the_rest)) = the_batches.split_last() {
                assert!(the_rest.iter().all(|b| b.len() == batch_size));
                assert!(!the_last.is_empty() && the_last.len() <= batch_size);
            }
            assert_eq!(the_batches.iter().map(Vec::len).sum::<usize>(), total);
        }
    }

    #[test]
    fn the_one_where_the_basket_never_outgrows_the_store() {
        let the_batches = batch_everything(60, 100);
        assert_eq!(the_batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![25, 25, 10]);
        assert_eq!(batch_everything(3, 0).len(), 3, "zero is clamped up to one");
    }

    #[test]
    fn the_one_where_order_is_preserved_across_batches() {
        let the_batches = batch_everything(30, 25);
        let the_order: Vec<Item> = the_batches.into_iter().flatten().collect();
        assert_eq!(the_order, (0..30).map(item).collect::<Vec<_>>());
    }

    #[test]
    fn the_one_where_flush_after_an_exact_fit_produces_nothing() {
        let mut the_batcher = Batcher::new(2);
        assert!(the_batcher.add(item(1)).is_none());
        assert_eq!(the_batcher.pending(), 1);
        assert!(the_batcher.add(item(2)).is_some());
        assert_eq!(the_batcher.pending(), 0);
        assert!(the_batcher.flush().is_none(), "an empty tail must not become an empty write");
    }

    #[test]
    fn the_one_where_the_trailing_partial_batch_is_not_forgotten() {
        let mut the_batcher = Batcher::new(25);
        for n in 0..5 {
            assert!(the_batcher.add(item(n)).is_none());
        }
        let the_tail = the_batcher.flush().expect("💀 five items vanished into the void");
        assert_eq!(the_tail.len(), 5);
        assert!(the_batcher.flush().is_none());
    }
}
