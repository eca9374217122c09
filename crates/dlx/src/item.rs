// ai
//! 📦 Items: the building blocks of dlx.
//!
//! 🎬 COLD OPEN. INT. S3 BUCKET, 4:12 AM
//!
//! A gzipped export sits in a bucket. Inside it, a million rows, each one
//! wrapped in `{"Item": ...}` like a burrito nobody asked for. Somewhere a
//! DynamoDB table waits, arms crossed, willing to accept exactly twenty-five
//! of them at a time. Not twenty-six. It counted.
//!
//! This module defines the structs that ferry those rows from the bucket to the
//! table: [`AttributeValue`] (the table's native value encoding), [`Item`] (one
//! record), [`PutRequest`] (one write operation) and the bulk request/outcome
//! shapes the executor and drainer pass around.
//!
//! 🦆 The duck is typed. Exhaustively.

use std::collections::BTreeMap;

/// 🏷️ One attribute value in the store's native encoding.
///
/// Mirrors DynamoDB's attribute model minus binary: numbers travel as their
/// decimal text so nothing gets rounded on the way through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    S(String),
    N(String),
    M(BTreeMap<String, AttributeValue>),
    L(Vec<AttributeValue>),
    Ss(Vec<String>),
    Ns(Vec<String>),
}

/// 📄 A decoded record: field name → attribute value. Immutable once decoded.
pub type Item = BTreeMap<String, AttributeValue>;

/// ✍️ A single "put" operation. The only write kind the loader ever issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub item: Item,
}

impl PutRequest {
    pub fn new(item: Item) -> Self {
        Self { item }
    }
}

/// 📬 Table name → ordered list of puts. Same shape going out (request) and
/// coming back (unprocessed remainder), because the store likes symmetry.
pub type WriteRequests = BTreeMap<String, Vec<PutRequest>>;

/// 🧮 Counts every put across every table in a request map.
pub fn count_requests(requests: &WriteRequests) -> usize {
    requests.values().map(Vec::len).sum()
}

/// 📡 What the store said about one bulk write: which items it did NOT persist.
///
/// Accepted items are implicit: everything that went out and did not come back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    pub unprocessed: WriteRequests,
}

impl BulkWriteOutcome {
    /// ✅ Everything landed.
    pub fn all_accepted() -> Self {
        Self::default()
    }

    pub fn unprocessed_count(&self) -> usize {
        count_requests(&self.unprocessed)
    }

    /// 🧹 True when the remainder is empty. Tables with empty lists count as empty too;
    /// some stores send `{"table": []}` just to keep you on your toes.
    pub fn is_fully_processed(&self) -> bool {
        self.unprocessed_count() == 0
    }
}
