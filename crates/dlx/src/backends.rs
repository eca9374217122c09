//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Source backends pour compressed bytes, Writer backends slurp up batches.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → backend enum that dispatches. Callers hold the enum.
//! - Sources: S3 (`GetObject` body), local file (dev mode), in-memory (tests).
//! - Writers: DynamoDB (`BatchWriteItem`), in-memory scripted writer (tests).
//! - Backends do I/O only. Batching lives in the batcher, retrying lives in the drainer.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::event::ObjectLocation;
use crate::item::{BulkWriteOutcome, WriteRequests};

pub mod dynamodb;
pub mod file;
pub mod in_mem;
pub mod s3;

pub use dynamodb::DynamoDbWriter;
pub use file::FileSource;
pub use s3::S3Source;
pub use in_mem::{InMemorySource, InMemoryWriter, WriteScript};

// ===== Source Trait and Backend Enum =====

// 🧠 Boxed because every origin hands us a different opaque reader type, and a struct
// field cannot hold `impl AsyncRead`. One vtable hop per read. S3 latency laughs at it.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// 📦 An opened object: the byte stream plus whatever the origin told us about its size.
pub struct SourceObject {
    pub reader: ObjectReader,
    /// 📏 `None` when the origin did not say. The report then falls back to bytes read.
    pub content_length: Option<u64>,
    /// 🏷️ Human label for logs and the progress bar, e.g. `s3://bucket/key`.
    pub label: String,
}

impl std::fmt::Debug for SourceObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceObject")
            .field("content_length", &self.content_length)
            .field("label", &self.label)
            .finish()
    }
}

/// 🚰 Something that can open an object by location and hand back its raw bytes.
///
/// # Contract 📜
/// - `open` does one fetch and returns a stream positioned at byte 0.
/// - The source does NOT decompress, split, or parse. It's a faucet, not a chef.
/// - Dropping the returned reader releases the underlying connection or file handle.
#[async_trait]
pub trait ObjectSource: std::fmt::Debug {
    async fn open(&self, location: &ObjectLocation) -> Result<SourceObject>;
}

/// 🎭 The many faces of a Source. Callers never need to know whether the bytes came
/// from a bucket, a disk, or a `Vec` that a test made up thirty milliseconds ago.
#[derive(Debug)]
pub enum SourceBackend {
    S3(S3Source),
    File(FileSource),
    InMemory(InMemorySource),
}

#[async_trait]
impl ObjectSource for SourceBackend {
    async fn open(&self, location: &ObjectLocation) -> Result<SourceObject> {
        match self {
            SourceBackend::S3(s3) => s3.open(location).await,
            SourceBackend::File(file) => file.open(location).await,
            SourceBackend::InMemory(mem) => mem.open(location).await,
        }
    }
}

// ===== Writer Trait and Backend Enum =====

/// 🕳️ Something that accepts one bulk write request and says which items it did not keep.
///
/// # Contract 📜
/// - `write` issues exactly one request. No retries in here. Retries are the drainer's job.
/// - `Ok(outcome)` means the request as a whole succeeded; `outcome.unprocessed` lists the
///   items the store declined this time (throttling, mostly).
/// - `Err(..)` means the request itself failed: auth, validation, network. Fatal for the run.
#[async_trait]
pub trait BulkWriter: std::fmt::Debug {
    async fn write(&mut self, requests: WriteRequests) -> Result<BulkWriteOutcome>;
}

/// 🎭 Mirrors `SourceBackend` on the other end of the pipeline. Symmetry. Or we ran out of ideas.
#[derive(Debug)]
pub enum WriterBackend {
    DynamoDb(DynamoDbWriter),
    InMemory(InMemoryWriter),
}

#[async_trait]
impl BulkWriter for WriterBackend {
    async fn write(&mut self, requests: WriteRequests) -> Result<BulkWriteOutcome> {
        match self {
            WriterBackend::DynamoDb(writer) => writer.write(requests).await,
            WriterBackend::InMemory(writer) => writer.write(requests).await,
        }
    }
}
