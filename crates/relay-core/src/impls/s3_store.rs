//! S3Gateway - aws-sdk-s3 を使った StorageGateway
//!
//! 認証情報は aws-config の既定チェーン（環境変数・プロファイル・IMDS）から。
//! `endpoint` を指定すると path-style で MinIO などの互換ストアに向けられます。

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::ports::{GatewayError, ObjectInfo, StorageGateway, StorageOp};

#[derive(Debug, Clone)]
pub struct S3Gateway {
    client: Client,
    bucket: String,
}

impl S3Gateway {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the default credential chain.
    pub async fn connect(bucket: &str, region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let client = match endpoint {
            Some(url) => {
                let config = aws_sdk_s3::config::Builder::from(&shared)
                    .endpoint_url(url)
                    .force_path_style(true)
                    .build();
                Client::from_conf(config)
            }
            None => Client::new(&shared),
        };
        Self::new(client, bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn classify<E>(op: StorageOp, key: &str, err: &SdkError<E>) -> GatewayError
where
    E: std::error::Error + 'static,
{
    let message = DisplayErrorContext(err).to_string();
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(401 | 403) => GatewayError::denied(op, message),
        Some(404) => GatewayError::not_found(key),
        _ => GatewayError::transient(op, message),
    }
}

fn to_utc(at: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(at.secs(), at.subsec_nanos())
}

#[async_trait]
impl StorageGateway for S3Gateway {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), GatewayError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| classify(StorageOp::Put, key, &e))?;
        debug!(bucket = %self.bucket, key, size = data.len(), "put object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(GatewayError::not_found(key));
            }
            Err(e) => return Err(classify(StorageOp::Get, key, &e)),
        };

        let body = output.body.collect().await.map_err(|e| {
            GatewayError::transient(StorageOp::Get, format!("reading body of {key}: {e}"))
        })?;
        Ok(body.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, GatewayError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify(StorageOp::List, prefix, &e))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let size = u64::try_from(object.size().unwrap_or(0)).unwrap_or(0);
                let mut info = ObjectInfo::new(key, size);
                if let Some(at) = object.last_modified().and_then(to_utc) {
                    info = info.modified_at(at);
                }
                objects.push(info);
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(bucket = %self.bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }
}
