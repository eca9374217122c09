//! # Previously, on DLX...
//!
//! 🎬 The table was throttling. Not always. Not predictably. Just often enough to
//! make every integration test a coin toss. Someone had to build a table that
//! throttles on command. A table with a script. A method actor of a table.
//!
//! `in_mem` provides an in-memory [`ObjectSource`] (objects are byte vectors keyed
//! by bucket and key) and an [`InMemoryWriter`] whose behaviour per call is scripted
//! with [`WriteScript`]: accept everything, hand back the first N items, hand back
//! every Nth item, or fail the request outright. Everything the writer saw and kept
//! lives behind an `Arc<Mutex<...>>` so tests can inspect it after the pipeline is done.
//!
//! ⚠️ Tests and local experiments only. A table that forgets on exit is not a table.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{BulkWriter, ObjectReader, ObjectSource, SourceObject};
use crate::event::ObjectLocation;
use crate::item::{BulkWriteOutcome, PutRequest, WriteRequests, count_requests};

/// 📦 A bucket made of RAM.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    objects: HashMap<(String, String), Vec<u8>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// ➕ Stash raw (already compressed) bytes under `bucket/key`.
    pub fn with_object(mut self, bucket: &str, key: &str, bytes: Vec<u8>) -> Self {
        self.objects
            .insert((bucket.to_string(), key.to_string()), bytes);
        self
    }
}

#[async_trait]
impl ObjectSource for InMemorySource {
    async fn open(&self, location: &ObjectLocation) -> Result<SourceObject> {
        let the_bytes = self
            .objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .cloned()
            .ok_or_else(|| anyhow!("💀 no such object in memory: {location}"))?;
        let the_len = the_bytes.len() as u64;
        let the_reader: ObjectReader = Box::new(std::io::Cursor::new(the_bytes));
        Ok(SourceObject {
            reader: the_reader,
            content_length: Some(the_len),
            label: location.to_string(),
        })
    }
}

/// 🎭 What the scripted table does on one call. Calls past the end of the script accept everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteScript {
    /// ✅ keep everything
    AcceptAll,
    /// 🔁 hand back the first N items of the request (in request order), keep the rest
    RejectFirst(usize),
    /// 🔁 hand back every Nth item (1-based: N=2 rejects the 2nd, 4th, ...)
    RejectEveryNth(usize),
    /// 💀 fail the whole request with this message
    Fail(String),
}

/// 📊 Everything the scripted table saw, in order.
#[derive(Debug, Default)]
pub struct WriterLedger {
    /// 📬 number of items per call, one entry per `write`
    pub calls: Vec<usize>,
    /// ✅ items the table kept, in the order it kept them
    pub accepted: Vec<PutRequest>,
}

/// 🕳️ A table that never forgets, and occasionally refuses, on cue.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWriter {
    script: Arc<Mutex<VecDeque<WriteScript>>>,
    pub ledger: Arc<Mutex<WriterLedger>>,
}

impl InMemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🎬 Writer that plays `script` one step per call, then accepts everything forever.
    pub fn scripted(script: impl IntoIterator<Item = WriteScript>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ledger: Arc::default(),
        }
    }
}

#[async_trait]
impl BulkWriter for InMemoryWriter {
    async fn write(&mut self, requests: WriteRequests) -> Result<BulkWriteOutcome> {
        let the_step = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(WriteScript::AcceptAll);
        let mut the_ledger = self.ledger.lock().await;
        the_ledger.calls.push(count_requests(&requests));

        if let WriteScript::Fail(message) = the_step {
            return Err(anyhow!("{message}"));
        }

        let mut the_outcome = BulkWriteOutcome::default();
        let mut position = 0usize;
        for (table, puts) in requests {
            for put in puts {
                position += 1;
                let rejected = match &the_step {
                    WriteScript::AcceptAll | WriteScript::Fail(_) => false,
                    WriteScript::RejectFirst(n) => position <= *n,
                    WriteScript::RejectEveryNth(n) => *n > 0 && position % n == 0,
                };
                if rejected {
                    the_outcome
                        .unprocessed
                        .entry(table.clone())
                        .or_default()
                        .push(put);
                } else {
                    the_ledger.accepted.push(put);
                }
            }
        }
        Ok(the_outcome)
    }
}
