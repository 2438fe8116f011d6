//! [`ObjectStore`] implementation backed by Amazon S3 or any S3-compatible
//! service reachable through `aws-sdk-s3`.
//!
//! Every failure is classified into the two store error kinds the engine
//! understands: `NoSuchKey` (or a bare HTTP 404) becomes
//! [`StoreError::NotFound`], everything else becomes [`StoreError::Other`].

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::primitives::DateTimeFormat;
use ruststack_web_core::error::StoreError;
use ruststack_web_core::store::{
    ListObjectsPage, ListObjectsRequest, ObjectMetadata, ObjectStore, StoreFuture, StoredObject,
};
use ruststack_web_core::WebConfig;
use tracing::info;

/// Region used when only a custom endpoint is configured.
const FALLBACK_REGION: &str = "us-east-1";

/// Maximum keys requested per listing page.
const MAX_KEYS: i32 = 1000;

/// Object store reading from one bucket.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the web configuration.
    ///
    /// Static credentials are used when configured, otherwise the default
    /// AWS provider chain.
    pub async fn from_config(config: &WebConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.s3_region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(id), Some(secret)) = (&config.aws_access_key_id, &config.aws_secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "ruststack-web",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.s3_force_path_style);
        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if shared.region().is_none() {
            builder = builder.region(Region::new(FALLBACK_REGION));
        }

        info!(
            bucket = %config.s3_bucket,
            region = ?config.s3_region,
            endpoint = ?config.s3_endpoint,
            path_style = config.s3_force_path_style,
            "S3 client configured"
        );

        Self::new(aws_sdk_s3::Client::from_conf(builder.build()), config.s3_bucket.clone())
    }

    /// The bucket this store reads from.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(key, e))?;
        into_stored_object(key, output).await
    }

    async fn list(&self, request: ListObjectsRequest<'_>) -> Result<ListObjectsPage, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(request.prefix)
            .delimiter(request.delimiter)
            .set_continuation_token(request.continuation_token.map(ToOwned::to_owned))
            .set_start_after(request.start_after.map(ToOwned::to_owned))
            .max_keys(MAX_KEYS)
            .send()
            .await
            .map_err(|e| StoreError::other("ListObjectsV2", request.prefix, e))?;
        Ok(into_page(&output))
    }
}

impl ObjectStore for S3ObjectStore {
    fn fetch_object<'a>(&'a self, key: &'a str) -> StoreFuture<'a, StoredObject> {
        Box::pin(self.get(key))
    }

    fn list_objects<'a>(&'a self, request: ListObjectsRequest<'a>) -> StoreFuture<'a, ListObjectsPage> {
        Box::pin(self.list(request))
    }
}

fn classify_get_error(key: &str, err: SdkError<GetObjectError, HttpResponse>) -> StoreError {
    let no_such_key = err.as_service_error().is_some_and(GetObjectError::is_no_such_key);
    let status_404 = err.raw_response().is_some_and(|r| r.status().as_u16() == 404);
    if no_such_key || status_404 {
        StoreError::not_found(key)
    } else {
        StoreError::other("GetObject", key, err)
    }
}

async fn into_stored_object(key: &str, output: GetObjectOutput) -> Result<StoredObject, StoreError> {
    let metadata = ObjectMetadata {
        content_length: output.content_length.and_then(|l| u64::try_from(l).ok()),
        last_modified: output
            .last_modified
            .and_then(|t| t.fmt(DateTimeFormat::HttpDate).ok()),
        etag: output.e_tag,
        content_encoding: output.content_encoding,
        expiration: output.expiration,
    };
    let body = output
        .body
        .collect()
        .await
        .map_err(|e| StoreError::other("GetObject", key, e))?
        .into_bytes();

    Ok(StoredObject {
        body,
        content_type: output.content_type,
        metadata,
    })
}

fn into_page(output: &ListObjectsV2Output) -> ListObjectsPage {
    ListObjectsPage {
        keys: output
            .contents()
            .iter()
            .filter_map(|o| o.key().map(ToOwned::to_owned))
            .collect(),
        common_prefixes: output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(ToOwned::to_owned))
            .collect(),
        is_truncated: output.is_truncated().unwrap_or(false),
        next_continuation_token: output.next_continuation_token().map(ToOwned::to_owned),
    }
}
