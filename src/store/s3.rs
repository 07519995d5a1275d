//! [`ObjectStore`] backed by the AWS SDK.
//!
//! Works against AWS S3 and S3-compatible hosts (MinIO, R2, ...). With a
//! custom endpoint the client switches to path-style addressing.
//!
//! The SDK is async; the publisher's transfer pool is plain OS threads. The
//! store owns a private multi-threaded tokio runtime and blocks on it per
//! call, so any number of transfer workers can share one handle.
//!
//! Credentials come from the standard AWS provider chain (environment,
//! profile, instance metadata).

use super::backend::{
    CopyRequest, DeleteFailure, ListPage, ListedObject, ObjectStore, PutRequest, StoreError,
};
use crate::config::BucketConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, MetadataDirective, ObjectCannedAcl, ObjectIdentifier};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::runtime::Runtime;

/// Characters escaped in the `x-amz-copy-source` header. `/` separates the
/// bucket and key segments and must stay literal.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct S3Store {
    runtime: Runtime,
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

fn request_error(err: impl std::error::Error) -> StoreError {
    StoreError::Request(DisplayErrorContext(err).to_string())
}

impl S3Store {
    /// Build a client for the configured bucket.
    pub fn connect(bucket: &BucketConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let client = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &bucket.region {
                loader = loader.region(Region::new(region.clone()));
            }
            let sdk_config = loader.load().await;

            let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
            if let Some(endpoint) = &bucket.endpoint {
                builder = builder.endpoint_url(endpoint).force_path_style(true);
            }
            Client::from_conf(builder.build())
        });

        Ok(Self {
            runtime,
            client,
            bucket: bucket.name.clone(),
        })
    }
}

impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        let max_keys = i32::try_from(max_keys)
            .map_err(|_| StoreError::InvalidRequest(format!("max_keys {max_keys} too large")))?;
        let request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .set_prefix(prefix.map(String::from))
            .set_continuation_token(continuation_token.map(String::from));

        let response = self
            .runtime
            .block_on(request.send())
            .map_err(request_error)?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ListedObject {
                    key: object.key()?.to_string(),
                    etag: object.e_tag().unwrap_or_default().to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    fn put_object(&self, request: PutRequest) -> Result<(), StoreError> {
        let send = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .body(ByteStream::from(request.body))
            .set_content_type(request.content_type)
            .set_content_encoding(request.content_encoding)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl.as_deref().map(ObjectCannedAcl::from))
            .send();

        self.runtime.block_on(send).map_err(request_error)?;
        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteFailure>, StoreError> {
        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        let send = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send();
        let response = self.runtime.block_on(send).map_err(request_error)?;

        // Quiet mode: only failures are reported back.
        Ok(response
            .errors()
            .iter()
            .map(|err| DeleteFailure {
                key: err.key().unwrap_or_default().to_string(),
                message: err
                    .message()
                    .or(err.code())
                    .unwrap_or("unknown error")
                    .to_string(),
            })
            .collect())
    }

    fn copy_object(&self, request: CopyRequest) -> Result<(), StoreError> {
        let source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&request.key, COPY_SOURCE)
        );
        let send = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .copy_source(source)
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(request.content_type)
            .set_website_redirect_location(request.website_redirect)
            .set_acl(request.acl.as_deref().map(ObjectCannedAcl::from))
            .send();

        self.runtime.block_on(send).map_err(request_error)?;
        Ok(())
    }
}
