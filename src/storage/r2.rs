//! Cloudflare R2 client
//!
//! R2 speaks the S3 API, so this is a thin wrapper over the AWS SDK pointed
//! at the account-scoped R2 endpoint with region "auto".

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::StorageConfig;

use super::backend::{StorageBackend, UploadOutcome};
use super::error::StorageError;

/// Real object-storage backend over Cloudflare R2
pub struct R2Client {
    client: Client,
    bucket: String,
    account_id: String,
    public_domain: Option<String>,
}

impl R2Client {
    /// Build a client from storage configuration.
    ///
    /// Fails with `NotConfigured` when any credential is missing so callers
    /// can degrade to the mock backend instead of panicking at request time.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let account_id = require(&config.account_id, "account_id")?;
        let bucket = require(&config.bucket, "bucket")?;
        let access_key_id = require(&config.access_key_id, "access_key_id")?;
        let secret_access_key = require(&config.secret_access_key, "secret_access_key")?;

        let credentials =
            Credentials::new(access_key_id, secret_access_key, None, None, "suzaku-r2");
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", account_id);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .load()
            .await;

        debug!(bucket = %bucket, "Created R2 client");

        Ok(Self {
            client: Client::new(&sdk_config),
            bucket,
            account_id,
            public_domain: config.public_domain.clone(),
        })
    }
}

fn require(value: &Option<String>, name: &str) -> Result<String, StorageError> {
    value
        .clone()
        .ok_or_else(|| StorageError::NotConfigured(name.to_string()))
}

#[async_trait]
impl StorageBackend for R2Client {
    fn provider(&self) -> &'static str {
        "cloudflare-r2"
    }

    async fn upload_buffer(
        &self,
        data: Bytes,
        path: &str,
        content_type: &str,
    ) -> Result<UploadOutcome, StorageError> {
        let size = data.len() as u64;
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::operation("put_object", e.to_string()))?;

        debug!(path = %path, size, "Uploaded object to R2");

        Ok(UploadOutcome {
            url: self.file_url(path),
            path: path.to_string(),
            size,
            etag: result.e_tag().map(|t| t.trim_matches('"').to_string()),
        })
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::operation("delete_object", e.to_string()))?;

        debug!(path = %path, "Deleted object from R2");
        Ok(())
    }

    fn file_url(&self, path: &str) -> String {
        match &self.public_domain {
            Some(domain) => format!("https://{}/{}", domain, path),
            None => format!("https://pub-{}.r2.dev/{}", self.account_id, path),
        }
    }

    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(p) = prefix {
                request = request.prefix(p);
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let page = request
                .send()
                .await
                .map_err(|e| StorageError::operation("list_objects_v2", e.to_string()))?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(bucket = %self.bucket, error = %e, "R2 health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_requires_credentials() {
        let config = StorageConfig::default();
        let result = R2Client::new(&config).await;
        assert!(matches!(result, Err(StorageError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_new_reports_first_missing_field() {
        let config = StorageConfig {
            account_id: Some("acct".to_string()),
            ..Default::default()
        };
        match R2Client::new(&config).await {
            Err(StorageError::NotConfigured(field)) => assert_eq!(field, "bucket"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_file_url_uses_public_domain_when_set() {
        let config = StorageConfig {
            account_id: Some("acct123".to_string()),
            bucket: Some("media".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            public_domain: Some("cdn.example.com".to_string()),
            ..Default::default()
        };
        let client = R2Client::new(&config).await.unwrap();
        assert_eq!(client.file_url("a/b.png"), "https://cdn.example.com/a/b.png");
    }

    #[tokio::test]
    async fn test_file_url_falls_back_to_r2_dev() {
        let config = StorageConfig {
            account_id: Some("acct123".to_string()),
            bucket: Some("media".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..Default::default()
        };
        let client = R2Client::new(&config).await.unwrap();
        assert_eq!(
            client.file_url("a/b.png"),
            "https://pub-acct123.r2.dev/a/b.png"
        );
    }
}
