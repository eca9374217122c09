// ai
//! # 📡 THE DYNAMODB WRITER
//!
//! 🎬 COLD OPEN, INT. AWS CONSOLE, 2:15 AM
//!
//! The provisioned capacity graph is a flat line pressed against its ceiling.
//! `BatchWriteItem` keeps returning 200 OK. Every response also quietly hands back
//! a handful of items under `UnprocessedItems`, like a waiter returning a plate
//! you did not finish. "The kitchen is busy," it says. "Try again."
//!
//! This module is the part that talks to the kitchen. One call, one request, one
//! honest answer about which items were kept. It does not retry; the drainer owns
//! patience. It does convert: our [`AttributeValue`] goes out in SDK form, and the
//! unprocessed remainder comes back into ours.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue as SdkAttributeValue, PutRequest as SdkPutRequest,
    WriteRequest as SdkWriteRequest,
};
use tracing::{debug, trace};

use crate::backends::BulkWriter;
use crate::item::{AttributeValue, BulkWriteOutcome, Item, PutRequest, WriteRequests};

/// 📡 Sends `BatchWriteItem` requests. Holds a client built once per process.
#[derive(Debug, Clone)]
pub struct DynamoDbWriter {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoDbWriter {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BulkWriter for DynamoDbWriter {
    /// 📡 One `BatchWriteItem`. Request-level failures bubble up; item-level
    /// rejections come back as the outcome's unprocessed remainder.
    async fn write(&mut self, requests: WriteRequests) -> Result<BulkWriteOutcome> {
        let the_request_items = to_sdk_requests(requests)?;
        trace!(
            "📡 BatchWriteItem across {} table(s)",
            the_request_items.len()
        );

        let the_response = self
            .client
            .batch_write_item()
            .set_request_items(Some(the_request_items))
            .send()
            .await
            .context(
                "💀 BatchWriteItem failed as a whole. Not throttled items, the entire request. \
                 Check credentials, table name, region, and item shape (the key attributes must be present).",
            )?;

        let the_outcome = match the_response.unprocessed_items() {
            Some(unprocessed) => BulkWriteOutcome {
                unprocessed: from_sdk_requests(unprocessed)?,
            },
            None => BulkWriteOutcome::all_accepted(),
        };
        debug!(
            "📬 BatchWriteItem came back with {} unprocessed item(s)",
            the_outcome.unprocessed_count()
        );
        Ok(the_outcome)
    }
}

fn to_sdk_requests(requests: WriteRequests) -> Result<HashMap<String, Vec<SdkWriteRequest>>> {
    requests
        .into_iter()
        .map(|(table, puts)| {
            let the_writes = puts
                .into_iter()
                .map(|put| {
                    let the_put = SdkPutRequest::builder()
                        .set_item(Some(to_sdk_item(put.item)))
                        .build()
                        .context("💀 the SDK refused to build a PutRequest")?;
                    Ok(SdkWriteRequest::builder().put_request(the_put).build())
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((table, the_writes))
        })
        .collect()
}

fn from_sdk_requests(
    requests: &HashMap<String, Vec<SdkWriteRequest>>,
) -> Result<WriteRequests> {
    let mut the_requests = WriteRequests::new();
    for (table, writes) in requests {
        let mut the_puts = Vec::with_capacity(writes.len());
        for write in writes {
            // -- 🧐 we only ever send puts, so a delete coming back means someone else is talking to us
            let the_put = write.put_request().ok_or_else(|| {
                anyhow!("💀 the store returned an unprocessed write for '{table}' that is not a put")
            })?;
            the_puts.push(PutRequest::new(from_sdk_item(the_put.item())?));
        }
        the_requests.insert(table.clone(), the_puts);
    }
    Ok(the_requests)
}

fn to_sdk_item(item: Item) -> HashMap<String, SdkAttributeValue> {
    item.into_iter()
        .map(|(name, value)| (name, to_sdk_value(value)))
        .collect()
}

/// 🔄 Ours → SDK. Exhaustive and total: every variant we can hold, the SDK can hold.
pub(crate) fn to_sdk_value(value: AttributeValue) -> SdkAttributeValue {
    match value {
        AttributeValue::Null => SdkAttributeValue::Null(true),
        AttributeValue::Bool(b) => SdkAttributeValue::Bool(b),
        AttributeValue::S(s) => SdkAttributeValue::S(s),
        AttributeValue::N(n) => SdkAttributeValue::N(n),
        AttributeValue::M(fields) => SdkAttributeValue::M(to_sdk_item(fields)),
        AttributeValue::L(items) => {
            SdkAttributeValue::L(items.into_iter().map(to_sdk_value).collect())
        }
        AttributeValue::Ss(set) => SdkAttributeValue::Ss(set),
        AttributeValue::Ns(set) => SdkAttributeValue::Ns(set),
    }
}

fn from_sdk_item(item: &HashMap<String, SdkAttributeValue>) -> Result<Item> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), from_sdk_value(value)?)))
        .collect()
}

/// 🔄 SDK → ours, for the unprocessed remainder. Binary and future variants are
/// refused: we never send them, so seeing one back means the wires are crossed.
pub(crate) fn from_sdk_value(value: &SdkAttributeValue) -> Result<AttributeValue> {
    Ok(match value {
        SdkAttributeValue::Null(_) => AttributeValue::Null,
        SdkAttributeValue::Bool(b) => AttributeValue::Bool(*b),
        SdkAttributeValue::S(s) => AttributeValue::S(s.clone()),
        SdkAttributeValue::N(n) => AttributeValue::N(n.clone()),
        SdkAttributeValue::M(fields) => AttributeValue::M(from_sdk_item(fields)?),
        SdkAttributeValue::L(items) => AttributeValue::L(
            items
                .iter()
                .map(from_sdk_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        SdkAttributeValue::Ss(set) => AttributeValue::Ss(set.clone()),
        SdkAttributeValue::Ns(set) => AttributeValue::Ns(set.clone()),
        other => {
            return Err(anyhow!(
                "💀 unrecognized value category in store response: {other:?}"
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> aws_sdk_dynamodb::Client {
        let the_config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(server.uri())
            .build();
        aws_sdk_dynamodb::Client::from_conf(the_config)
    }

    fn order(pk: &str) -> PutRequest {
        PutRequest::new(Item::from([
            ("pk".to_string(), AttributeValue::S(pk.to_string())),
            ("total".to_string(), AttributeValue::N("12.50".to_string())),
        ]))
    }

    #[test]
    fn the_one_where_every_variant_survives_the_round_trip() -> Result<()> {
        let the_value = AttributeValue::M(Item::from([
            ("nil".to_string(), AttributeValue::Null),
            ("yes".to_string(), AttributeValue::Bool(true)),
            (
                "list".to_string(),
                AttributeValue::L(vec![
                    AttributeValue::S("a".to_string()),
                    AttributeValue::N("1".to_string()),
                ]),
            ),
            ("ss".to_string(), AttributeValue::Ss(vec!["x".to_string()])),
            ("ns".to_string(), AttributeValue::Ns(vec!["2".to_string()])),
        ]));
        let the_sdk_value = to_sdk_value(the_value.clone());
        assert_eq!(from_sdk_value(&the_sdk_value)?, the_value);
        Ok(())
    }

    #[test]
    fn the_one_where_null_goes_out_as_null_true() {
        assert_eq!(to_sdk_value(AttributeValue::Null), SdkAttributeValue::Null(true));
    }

    #[test]
    fn the_one_where_binary_coming_back_is_refused() {
        let the_blob = SdkAttributeValue::B(aws_sdk_dynamodb::primitives::Blob::new(vec![1u8]));
        assert!(from_sdk_value(&the_blob).is_err());
    }

    #[tokio::test]
    async fn the_one_where_unprocessed_items_come_back_home() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "DynamoDB_20120810.BatchWriteItem"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-amz-json-1.0")
                    .set_body_json(json!({
                        "UnprocessedItems": {
                            "orders": [
                                {"PutRequest": {"Item": {"pk": {"S": "b"}, "total": {"N": "12.50"}}}}
                            ]
                        }
                    })),
            )
            .expect(1)
            .mount(&the_server)
            .await;

        let mut the_writer = DynamoDbWriter::new(client_for(&the_server));
        let the_requests = WriteRequests::from([("orders".to_string(), vec![order("a"), order("b")])]);
        let the_outcome = the_writer.write(the_requests).await?;

        assert_eq!(the_outcome.unprocessed_count(), 1);
        assert_eq!(the_outcome.unprocessed["orders"], vec![order("b")]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_remainder_means_everything_landed() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-amz-json-1.0")
                    .set_body_json(json!({ "UnprocessedItems": {} })),
            )
            .mount(&the_server)
            .await;

        let mut the_writer = DynamoDbWriter::new(client_for(&the_server));
        let the_requests = WriteRequests::from([("orders".to_string(), vec![order("a")])]);
        let the_outcome = the_writer.write(the_requests).await?;
        assert!(the_outcome.is_fully_processed());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_validation_error_fails_the_whole_request() {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .insert_header("content-type", "application/x-amz-json-1.0")
                    .set_body_json(json!({
                        "__type": "com.amazon.coral.validate#ValidationException",
                        "message": "One of the required keys was not given a value"
                    })),
            )
            .mount(&the_server)
            .await;

        let mut the_writer = DynamoDbWriter::new(client_for(&the_server));
        let the_requests = WriteRequests::from([("orders".to_string(), vec![order("a")])]);
        let the_error = the_writer
            .write(the_requests)
            .await
            .expect_err("💀 a 400 should not look like success");
        assert!(the_error.to_string().contains("BatchWriteItem failed"));
    }
}
