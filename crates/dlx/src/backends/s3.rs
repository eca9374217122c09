// ai
//! 🪣📡 S3 Source: streaming export objects from the cloud, one chunk at a time.
//!
//! COLD OPEN, EXT. LOADING DOCK, 6:02 AM
//!
//! An export job finished. An object landed. A notification fired. Somewhere a
//! process woke up holding nothing but a bucket name and a URL-encoded key, and
//! the quiet confidence that `GetObject` would work this time.
//!
//! 🧠 Knowledge graph:
//! - Transport: `GetObject` → `ByteStream::into_async_read()` → boxed `AsyncRead`.
//! - Content length comes straight off the `GetObject` response. No separate HEAD,
//!   one round trip is plenty.
//! - The client is built once by the caller and shared; this struct just holds it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::backends::{ObjectReader, ObjectSource, SourceObject};
use crate::event::ObjectLocation;

/// 🪣 Opens objects from S3. Holds a client, nothing else. Cheap to keep around between runs.
#[derive(Debug, Clone)]
pub struct S3Source {
    client: aws_sdk_s3::Client,
}

impl S3Source {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectSource for S3Source {
    /// 🚀 `GetObject` and hand back the body as an async reader.
    ///
    /// 💀 Fails if credentials are missing, the bucket or key does not exist, or the
    /// IAM policy was written by someone who has since left the company.
    async fn open(&self, location: &ObjectLocation) -> Result<SourceObject> {
        let the_response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 GetObject failed for {location}. The bucket ghosted us. \
                     Check: bucket name, key path, region, credentials, and whether the \
                     object was deleted between the notification and now."
                )
            })?;

        // 📏 might be missing on exotic responses. negative would be a lie we refuse to believe.
        let the_content_length = the_response
            .content_length()
            .and_then(|len| u64::try_from(len).ok());

        debug!(
            "🪣 opened {} ({} bytes advertised)",
            location,
            the_content_length.map_or("unknown".to_string(), |len| len.to_string())
        );

        let the_reader: ObjectReader = Box::new(the_response.body.into_async_read());

        Ok(SourceObject {
            reader: the_reader,
            content_length: the_content_length,
            label: location.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::GzipLineReader;
    use crate::lines::tests::gzip;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> aws_sdk_s3::Client {
        let the_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(server.uri())
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(the_config)
    }

    #[tokio::test]
    async fn the_one_where_the_object_body_streams_through_gzip() -> Result<()> {
        let the_server = MockServer::start().await;
        let the_body = gzip("{\"Item\":{\"pk\":\"1\"}}\n{\"Item\":{\"pk\":\"2\"}}\n");
        let the_body_len = the_body.len() as u64;
        Mock::given(method("GET"))
            .and(path("/exports/2024/part-1.json.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(the_body))
            .mount(&the_server)
            .await;

        let the_source = S3Source::new(client_for(&the_server));
        let the_location = ObjectLocation::new("exports", "2024/part-1.json.gz");
        let the_object = the_source.open(&the_location).await?;

        assert_eq!(the_object.content_length, Some(the_body_len));
        assert_eq!(the_object.label, "s3://exports/2024/part-1.json.gz");

        let mut the_lines = GzipLineReader::new(the_object.reader);
        assert_eq!(the_lines.next_line().await?.as_deref(), Some("{\"Item\":{\"pk\":\"1\"}}"));
        assert_eq!(the_lines.next_line().await?.as_deref(), Some("{\"Item\":{\"pk\":\"2\"}}"));
        assert_eq!(the_lines.next_line().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_object_is_loud_about_it() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>NoSuchKey</Code><Message>gone</Message></Error>",
            ))
            .mount(&the_server)
            .await;

        let the_source = S3Source::new(client_for(&the_server));
        let the_error = the_source
            .open(&ObjectLocation::new("exports", "nope.json.gz"))
            .await
            .expect_err("💀 a 404 should not open successfully");
        assert!(the_error.to_string().contains("s3://exports/nope.json.gz"));
    }
}
