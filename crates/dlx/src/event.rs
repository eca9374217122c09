// ai
//! 📨 Trigger Event: the S3 notification that starts a run.
//!
//! The notification is a big JSON envelope. We care about exactly two fields
//! of the first record: the bucket name and the object key. The key arrives
//! URL-encoded (`+` for spaces, `%XX` for everything else that scared the encoder),
//! so it gets decoded before anyone tries `GetObject` with it.

use std::fmt;

use serde::Deserialize;
use tracing::warn;

use crate::error::PipelineError;

/// 📍 Where the export lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

// -- 📦 only the slice of the notification we read. serde ignores the rest of the envelope.
#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// 📨 Pull `(bucket, url-decoded key)` out of an S3 notification payload.
///
/// Only the first record is used. More than one is logged and ignored.
pub fn parse_notification(payload: &str) -> Result<ObjectLocation, PipelineError> {
    let notification: Notification = serde_json::from_str(payload)
        .map_err(|err| PipelineError::Event(format!("not an S3 notification: {err}")))?;

    let record_count = notification.records.len();
    let first = notification
        .records
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Event("notification carries no records".to_string()))?;

    if record_count > 1 {
        warn!(
            "📨 notification carries {} records; only the first one gets loaded",
            record_count
        );
    }

    let key = url_decode_key(&first.s3.object.key)?;
    if first.s3.bucket.name.is_empty() || key.is_empty() {
        return Err(PipelineError::Event(
            "bucket name and object key must both be non-empty".to_string(),
        ));
    }
    Ok(ObjectLocation::new(first.s3.bucket.name, key))
}

/// 🔓 S3 event keys are form-encoded: `+` is a space and `%XX` is a byte.
fn url_decode_key(raw: &str) -> Result<String, PipelineError> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|pair| std::str::from_utf8(pair).ok())
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| {
                        PipelineError::Event(format!("object key has a broken escape: {raw}"))
                    })?;
                decoded.push(hex);
                i += 2;
            }
            other => decoded.push(other),
        }
        i += 1;
    }
    String::from_utf8(decoded)
        .map_err(|_| PipelineError::Event(format!("object key is not UTF-8 once decoded: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const THE_NOTIFICATION: &str = r#"{
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "us-east-1",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "s3SchemaVersion": "1.0",
                "bucket": {"name": "exports", "arn": "arn:aws:s3:::exports"},
                "object": {"key": "daily/2024-01-01/My+Table%3A+part%2B1.json.gz", "size": 1024}
            }
        }]
    }"#;

    #[test]
    fn the_one_where_bucket_and_decoded_key_come_out() -> Result<(), PipelineError> {
        let the_location = parse_notification(THE_NOTIFICATION)?;
        assert_eq!(the_location.bucket, "exports");
        assert_eq!(the_location.key, "daily/2024-01-01/My Table: part+1.json.gz");
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_envelope_is_an_input_error() {
        let the_error = parse_notification(r#"{"Records": []}"#).unwrap_err();
        assert!(matches!(the_error, PipelineError::Event(_)));
    }

    #[test]
    fn the_one_where_some_other_event_shape_is_rejected() {
        let the_error = parse_notification(r#"{"detail-type": "Scheduled Event"}"#).unwrap_err();
        assert!(matches!(the_error, PipelineError::Event(_)));

        let the_error = parse_notification(r#"{"Records": [{"s3": {"bucket": {}}}]}"#).unwrap_err();
        assert!(matches!(the_error, PipelineError::Event(_)));
    }

    #[test]
    fn the_one_where_a_broken_escape_is_caught() {
        assert!(url_decode_key("bad%2").is_err());
        assert!(url_decode_key("bad%zz").is_err());
        assert_eq!(url_decode_key("caf%C3%A9").ok().as_deref(), Some("café"));
    }
}
