//! kvpbase REST storage backend.
//!
//! Objects live at `{endpoint}/{user_guid}/{container}/{key}`. Every request
//! carries the API key in the `x-api-key` header. Listing goes through the
//! container URL with `_index` / `_max` query parameters; the continuation
//! token is the index of the next entry.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{
    Body,
    Client,
    Method,
    RequestBuilder,
    Response,
    StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{
    BlobError,
    BlobMetadata,
    BlobReader,
    BlobResult,
    BlobStore,
    BlobStream,
    EnumerationResult,
    KvpbaseSettings,
    streaming::read_chunks,
    traits::{non_empty_token, validate_key},
};

pub const API_KEY_HEADER: &str = "x-api-key";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object record as the service reports it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectRecord {
    key: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content_length: u64,
    #[serde(default)]
    created_utc: Option<String>,
    #[serde(default)]
    md5: Option<String>,
}

impl ObjectRecord {
    fn into_metadata(self) -> BlobMetadata {
        BlobMetadata {
            created: self
                .created_utc
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_default(),
            key: self.key,
            content_length: self.content_length,
            content_type: self.content_type,
            etag: self.md5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerListing {
    #[serde(default)]
    objects: Vec<ObjectRecord>,
}

/// Accepts RFC 3339 as well as the zone-less form the service emits.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.and_utc())
}

/// kvpbase REST storage backend.
pub struct KvpBlobStore {
    client: Client,
    container_url: Url,
    api_key: String,
    page_size: usize,
}

impl KvpBlobStore {
    pub fn new(settings: &KvpbaseSettings) -> BlobResult<Self> {
        settings.validate()?;

        let mut container_url = Url::parse(settings.endpoint.trim())?;
        if !matches!(container_url.scheme(), "http" | "https") {
            return Err(BlobError::InvalidSettings {
                reason: format!("endpoint must be http or https: {}", settings.endpoint),
            });
        }
        container_url
            .path_segments_mut()
            .map_err(|_| BlobError::InvalidSettings {
                reason: format!("endpoint cannot be a base URL: {}", settings.endpoint),
            })?
            .pop_if_empty()
            .push(&settings.user_guid)
            .push(&settings.container);

        let client = Client::builder()
            .build()
            .map_err(|e| BlobError::NetworkError {
                source: anyhow::Error::from(e),
            })?;

        debug!(container_url = %container_url, "Created kvpbase blob store");

        Ok(Self {
            client,
            container_url,
            api_key: settings.api_key.clone(),
            page_size: settings.page_size,
        })
    }

    pub fn container_url(&self) -> &Url {
        &self.container_url
    }

    fn object_url(&self, key: &str) -> BlobResult<Url> {
        validate_key(key)?;
        let mut url = self.container_url.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::InvalidKey {
                key: key.to_string(),
                reason: "cannot build object URL".to_string(),
            })?
            .extend(key.split('/'));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// Sends a request against an object, mapping 404 to `None`.
    async fn send_for_object(&self, request: RequestBuilder) -> BlobResult<Option<Response>> {
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(response).await?))
    }

    async fn check(response: Response) -> BlobResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = response.text().await.unwrap_or_default();
        Err(BlobError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl BlobStore for KvpBlobStore {
    async fn write(&self, key: &str, content_type: Option<&str>, data: Bytes) -> BlobResult<()> {
        let url = self.object_url(key)?;
        debug!(key, size = data.len(), "writing blob to kvpbase");
        let response = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
            .body(data)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn write_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        reader: BlobReader,
    ) -> BlobResult<()> {
        let url = self.object_url(key)?;
        debug!(key, content_length, "streaming blob to kvpbase");
        let body = Body::wrap_stream(read_chunks(reader, content_length));
        let response = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
            .header(CONTENT_LENGTH, content_length)
            .body(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        let url = self.object_url(key)?;
        let Some(response) = self.send_for_object(self.request(Method::GET, url)).await? else {
            return Ok(None);
        };
        Ok(Some(response.bytes().await?))
    }

    async fn get_stream(&self, key: &str) -> BlobResult<Option<BlobStream>> {
        let url = self.object_url(key)?;
        let Some(response) = self.send_for_object(self.request(Method::GET, url)).await? else {
            return Ok(None);
        };
        let content_length = response.content_length().ok_or_else(|| BlobError::Other {
            source: anyhow::anyhow!("kvpbase response for {} has no content length", key),
        })?;
        Ok(Some(BlobStream::from_stream(
            content_length,
            Box::pin(response.bytes_stream()),
        )))
    }

    async fn delete(&self, key: &str) -> BlobResult<bool> {
        let url = self.object_url(key)?;
        Ok(self
            .send_for_object(self.request(Method::DELETE, url))
            .await?
            .is_some())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let url = self.object_url(key)?;
        Ok(self
            .send_for_object(self.request(Method::HEAD, url))
            .await?
            .is_some())
    }

    async fn get_metadata(&self, key: &str) -> BlobResult<Option<BlobMetadata>> {
        let url = self.object_url(key)?;
        let request = self
            .request(Method::GET, url)
            .query(&[("_metadata", "true")]);
        let Some(response) = self.send_for_object(request).await? else {
            return Ok(None);
        };
        let record: ObjectRecord = response.json().await?;
        Ok(Some(record.into_metadata()))
    }

    async fn enumerate(&self, continuation_token: Option<&str>) -> BlobResult<EnumerationResult> {
        let index = match non_empty_token(continuation_token) {
            Some(token) => {
                token
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| BlobError::InvalidContinuationToken {
                        token: token.to_string(),
                    })?
            }
            None => 0,
        };

        // One extra entry tells whether another page exists.
        let request = self
            .request(Method::GET, self.container_url.clone())
            .query(&[("_index", index), ("_max", self.page_size + 1)]);
        let Some(response) = self.send_for_object(request).await? else {
            return Ok(EnumerationResult::default());
        };
        let mut listing: ContainerListing = response.json().await?;

        let next_token = if listing.objects.len() > self.page_size {
            listing.objects.truncate(self.page_size);
            Some((index + self.page_size).to_string())
        } else {
            None
        };

        Ok(EnumerationResult {
            next_token,
            blobs: listing
                .objects
                .into_iter()
                .map(ObjectRecord::into_metadata)
                .collect(),
        })
    }
}
