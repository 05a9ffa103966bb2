//! Blocking S3 REST backend.
//!
//! Talks ListObjectsV2 / HeadObject / PutObject / DeleteObject over the
//! shared `ureq` agent and signs every request with SigV4. Without a custom
//! endpoint the bucket is addressed virtual-host style on AWS; with one
//! (MinIO, LocalStack) path-style addressing is used.
//!
//! Every `put` records the locally computed MD5 as
//! `x-amz-meta-content-md5`, so a content fingerprint is still available
//! when the store-assigned ETag is not an MD5 (multipart uploads).

use std::fmt;
use std::fs::File;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use ureq::Agent;
use url::Url;

use mirror_core::{Fingerprint, Presence, StoreObject};

use crate::error::{store_io_err, StoreError};
use crate::store::sigv4::{self, Credentials, RequestParts, EMPTY_PAYLOAD_SHA256, UNSIGNED_PAYLOAD};
use crate::store::ObjectStore;

/// User metadata header carrying our own content digest.
pub const CONTENT_MD5_META: &str = "x-amz-meta-content-md5";

const MAX_KEY_BYTES: usize = 1024;
const MAX_ERROR_BODY_CHARS: usize = 512;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Static AWS credentials.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and optional
    /// `AWS_SESSION_TOKEN` from the process environment.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let access_key_id = non_empty("AWS_ACCESS_KEY_ID").ok_or(StoreError::MissingCredentials)?;
        let secret_access_key =
            non_empty("AWS_SECRET_ACCESS_KEY").ok_or(StoreError::MissingCredentials)?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty("AWS_SESSION_TOKEN"),
        })
    }
}

// ---------------------------------------------------------------------------
// Listing payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    #[serde(default)]
    e_tag: String,
}

/// One decoded ListObjectsV2 page.
#[derive(Debug)]
pub(crate) struct ListPage {
    pub objects: Vec<StoreObject>,
    pub next_token: Option<String>,
}

pub(crate) fn parse_list_page(body: &str) -> Result<ListPage, StoreError> {
    let page: ListBucketResult = quick_xml::de::from_str(body)?;
    let objects = page
        .contents
        .into_iter()
        .map(|o| StoreObject {
            key: o.key,
            fingerprint: Fingerprint::from_store_value(&o.e_tag),
        })
        .collect();
    let next_token = match (page.is_truncated, page.next_continuation_token) {
        (false, _) => None,
        (true, Some(token)) if !token.is_empty() => Some(token),
        (true, _) => {
            return Err(StoreError::MalformedListing(
                "truncated page without a continuation token".to_string(),
            ))
        }
    };
    Ok(ListPage {
        objects,
        next_token,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// An S3 (or S3-compatible) bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    agent: Agent,
    bucket: String,
    region: String,
    endpoint: Option<Url>,
    credentials: S3Credentials,
}

impl S3Store {
    pub fn new(
        agent: Agent,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<Url>,
        credentials: S3Credentials,
    ) -> Self {
        Self {
            agent,
            bucket: bucket.into(),
            region: region.into(),
            endpoint,
            credentials,
        }
    }

    fn scheme(&self) -> &str {
        self.endpoint.as_ref().map_or("https", |e| e.scheme())
    }

    fn host(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint.host_str().unwrap_or_default();
                match endpoint.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                }
            }
            None => format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    /// Unencoded request path for `key` (or the bucket root).
    fn raw_path(&self, key: Option<&str>) -> String {
        let mut path = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}",
                endpoint.path().trim_end_matches('/'),
                self.bucket
            ),
            None => String::new(),
        };
        match key {
            Some(key) => {
                path.push('/');
                path.push_str(key);
            }
            None if path.is_empty() => path.push('/'),
            None => {}
        }
        path
    }

    /// Build a signed request. Only headers passed in `headers` or produced
    /// by signing are attached.
    fn request(
        &self,
        method: &str,
        key: Option<&str>,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
        payload_hash: &str,
    ) -> ureq::Request {
        let host = self.host();
        let canonical_uri = sigv4::encode_path(&self.raw_path(key));
        let canonical_query = sigv4::canonical_query(query);

        let parts = RequestParts {
            method,
            host: &host,
            canonical_uri: &canonical_uri,
            canonical_query: &canonical_query,
            headers,
            payload_hash,
        };
        let credentials = Credentials {
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            session_token: self.credentials.session_token.as_deref(),
        };
        let signed = sigv4::sign(&parts, &credentials, &self.region, Utc::now());

        let mut url = format!("{}://{host}{canonical_uri}", self.scheme());
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        signed
            .iter()
            .fold(self.agent.request(method, &url), |req, (name, value)| {
                req.set(name, value)
            })
    }

    fn http_error(&self, operation: &'static str, err: ureq::Error) -> StoreError {
        match err {
            ureq::Error::Status(status, response) => {
                let body: String = response
                    .into_string()
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_ERROR_BODY_CHARS)
                    .collect();
                StoreError::Status {
                    operation,
                    status,
                    body,
                }
            }
            ureq::Error::Transport(transport) => StoreError::Transport {
                endpoint: format!("{}://{}", self.scheme(), self.host()),
                reason: transport.to_string(),
            },
        }
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key is empty",
        });
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key exceeds 1024 bytes",
        });
    }
    Ok(())
}

impl ObjectStore for S3Store {
    fn container(&self) -> &str {
        &self.bucket
    }

    fn inventory(&self) -> Result<Vec<StoreObject>, StoreError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut query = vec![("list-type", "2")];
            if let Some(token) = token.as_deref() {
                query.push(("continuation-token", token));
            }
            let response = self
                .request("GET", None, &query, &[], EMPTY_PAYLOAD_SHA256)
                .call()
                .map_err(|e| self.http_error("ListObjectsV2", e))?;
            let body = response.into_string().map_err(|e| StoreError::Transport {
                endpoint: self.host(),
                reason: e.to_string(),
            })?;

            let page = parse_list_page(&body)?;
            pages += 1;
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            bucket = %self.bucket,
            pages,
            objects = objects.len(),
            "bucket inventory complete"
        );
        Ok(objects)
    }

    fn fingerprint(&self, key: &str) -> Result<Presence, StoreError> {
        validate_key(key)?;
        match self
            .request("HEAD", Some(key), &[], &[], EMPTY_PAYLOAD_SHA256)
            .call()
        {
            Ok(response) => {
                let raw = response
                    .header(CONTENT_MD5_META)
                    .or_else(|| response.header("ETag"))
                    .unwrap_or_default();
                Ok(Presence::Present(Fingerprint::from_store_value(raw)))
            }
            Err(ureq::Error::Status(404, _)) => Ok(Presence::Absent),
            Err(e) => Err(self.http_error("HeadObject", e)),
        }
    }

    fn put(&self, key: &str, body: &Path, digest: &Fingerprint) -> Result<(), StoreError> {
        validate_key(key)?;
        let file = File::open(body).map_err(|e| store_io_err(body, e))?;
        let len = file.metadata().map_err(|e| store_io_err(body, e))?.len();

        self.request(
            "PUT",
            Some(key),
            &[],
            &[(CONTENT_MD5_META, digest.as_str())],
            UNSIGNED_PAYLOAD,
        )
        .set("Content-Length", &len.to_string())
        .send(file)
        .map_err(|e| self.http_error("PutObject", e))?;

        tracing::debug!(bucket = %self.bucket, key = %key, bytes = len, "put object");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        match self
            .request("DELETE", Some(key), &[], &[], EMPTY_PAYLOAD_SHA256)
            .call()
        {
            Ok(_) | Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(e) => Err(self.http_error("DeleteObject", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
