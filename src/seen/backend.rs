// src/seen/backend.rs
//! Where the seen-set blob physically lives.

#[cfg(any(test, feature = "test-util"))]
use std::collections::HashMap;
use std::path::PathBuf;
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
#[cfg(any(test, feature = "test-util"))]
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};

use crate::auth::{connection_pairs, decode_key, hmac_sha256_b64, http_date, shared_key_string_to_sign};
use crate::error::{ConfigError, StoreError};

/// A single blob container. Blobs are read whole and overwritten whole.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// `Ok(None)` when the blob does not exist yet.
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
    /// Human-readable location for logs (never includes credentials).
    fn describe(&self) -> String;
}

/// Pick a backend from `BLOB_CONNECTION_STRING`:
/// - a storage account connection string (`AccountName=…;AccountKey=…`);
/// - an `http(s)://` SAS container URL;
/// - otherwise a local directory (optionally prefixed with `file://`).
pub fn backend_from_connection_string(
    conn: &str,
    container: &str,
    client: Client,
) -> Result<Box<dyn BlobBackend>, ConfigError> {
    let conn = conn.trim();
    if conn.starts_with("http://") || conn.starts_with("https://") {
        let backend = HttpBlobBackend::new(client, conn)?;
        return Ok(Box::new(backend));
    }
    if is_key_value_string(conn) {
        let backend = HttpBlobBackend::from_storage_connection_string(client, conn, container)?;
        return Ok(Box::new(backend));
    }
    let root = conn.strip_prefix("file://").unwrap_or(conn);
    if root.is_empty() {
        return Err(ConfigError::Invalid {
            name: "BLOB_CONNECTION_STRING",
            reason: "empty path".into(),
        });
    }
    Ok(Box::new(FsBackend::new(PathBuf::from(root).join(container))))
}

// `Key=Value;…` rather than a path; such strings may carry credentials
fn is_key_value_string(conn: &str) -> bool {
    const STORAGE_KEYS: [&str; 6] = [
        "defaultendpointsprotocol",
        "accountname",
        "accountkey",
        "blobendpoint",
        "sharedaccesssignature",
        "usedevelopmentstorage",
    ];
    let pairs = connection_pairs(conn);
    pairs.keys().any(|k| STORAGE_KEYS.contains(&k.as_str())) || (conn.contains(';') && !pairs.is_empty())
}

// ------------------------------------------------------------
// Local directory
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BlobBackend for FsBackend {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        // write-then-rename so a crash never leaves a truncated blob
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }
}

// ------------------------------------------------------------
// Blob container over HTTP (SAS-signed container URL)
// ------------------------------------------------------------

const STORAGE_API_VERSION: &str = "2021-08-06";

#[derive(Clone)]
enum BlobAuth {
    /// Credentials travel in the URL query.
    Sas,
    SharedKey { account: String, key: Vec<u8> },
}

#[derive(Clone)]
pub struct HttpBlobBackend {
    client: Client,
    container: Url,
    auth: BlobAuth,
    timeout: Duration,
}

fn invalid_blob(reason: &str) -> ConfigError {
    // never echo the value, it may hold an account key
    ConfigError::Invalid {
        name: "BLOB_CONNECTION_STRING",
        reason: reason.to_string(),
    }
}

impl HttpBlobBackend {
    pub fn new(client: Client, container_url: &str) -> Result<Self, ConfigError> {
        let container = Url::parse(container_url).map_err(|e| ConfigError::Invalid {
            name: "BLOB_CONNECTION_STRING",
            reason: e.to_string(),
        })?;
        Self::with_auth(client, container, BlobAuth::Sas)
    }

    /// `DefaultEndpointsProtocol=https;AccountName=…;AccountKey=…;EndpointSuffix=…`,
    /// optionally with `BlobEndpoint=` instead of the suffix, or a
    /// `SharedAccessSignature=` instead of the key.
    pub fn from_storage_connection_string(
        client: Client,
        conn: &str,
        container: &str,
    ) -> Result<Self, ConfigError> {
        let pairs = connection_pairs(conn);
        if pairs.contains_key("usedevelopmentstorage") {
            return Err(invalid_blob("development storage emulator is not supported"));
        }

        let endpoint = match pairs.get("blobendpoint") {
            Some(ep) => ep.trim_end_matches('/').to_string(),
            None => {
                let account = pairs
                    .get("accountname")
                    .ok_or_else(|| invalid_blob("storage connection string has no AccountName"))?;
                let protocol = pairs
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = pairs
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                format!("{protocol}://{account}.blob.{suffix}")
            }
        };
        let mut url = Url::parse(&format!("{endpoint}/{container}"))
            .map_err(|_| invalid_blob("storage connection string has an unusable blob endpoint"))?;

        let auth = match (pairs.get("accountname"), pairs.get("accountkey")) {
            (Some(account), Some(key)) => BlobAuth::SharedKey {
                account: account.clone(),
                key: decode_key(key).map_err(|_| invalid_blob("AccountKey is not valid base64"))?,
            },
            _ => match pairs.get("sharedaccesssignature") {
                Some(sas) => {
                    url.set_query(Some(sas.trim_start_matches('?')));
                    BlobAuth::Sas
                }
                None => {
                    return Err(invalid_blob(
                        "storage connection string has neither AccountKey nor SharedAccessSignature",
                    ))
                }
            },
        };
        Self::with_auth(client, url, auth)
    }

    fn with_auth(client: Client, container: Url, auth: BlobAuth) -> Result<Self, ConfigError> {
        if container.cannot_be_a_base() {
            return Err(invalid_blob("container URL cannot carry a blob path"));
        }
        Ok(Self {
            client,
            container,
            auth,
            timeout: Duration::from_secs(15),
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn blob_url(&self, name: &str) -> Url {
        let mut url = self.container.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        url
    }

    /// Attach `x-ms-date`/`x-ms-version` and, for shared keys, the signature.
    fn authorize(
        &self,
        req: RequestBuilder,
        method: &Method,
        url: &Url,
        content_length: usize,
        content_type: &str,
        extra: &[(&str, &str)],
    ) -> Result<RequestBuilder, StoreError> {
        let date = http_date(Utc::now());
        let mut req = req
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION);
        for (k, v) in extra {
            req = req.header(*k, *v);
        }
        if let BlobAuth::SharedKey { account, key } = &self.auth {
            let mut ms_headers = vec![("x-ms-date", date.as_str()), ("x-ms-version", STORAGE_API_VERSION)];
            ms_headers.extend_from_slice(extra);
            let to_sign = shared_key_string_to_sign(
                method.as_str(),
                content_length,
                content_type,
                &ms_headers,
                account,
                url.path(),
            );
            let signature = hmac_sha256_b64(key, &to_sign).map_err(|_| StoreError::Signing)?;
            req = req.header(AUTHORIZATION, format!("SharedKey {account}:{signature}"));
        }
        Ok(req)
    }
}

// BlobAuth::SharedKey holds the raw account key
impl std::fmt::Debug for HttpBlobBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobBackend")
            .field("container", &self.describe())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl BlobBackend for HttpBlobBackend {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let url = self.blob_url(name);
        let req = self.client.get(url.clone()).timeout(self.timeout);
        let rsp = self
            .authorize(req, &Method::GET, &url, 0, "", &[])?
            .send()
            .await?;
        match rsp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(rsp.bytes().await?.to_vec())),
            s => Err(StoreError::Status(s.as_u16())),
        }
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let url = self.blob_url(name);
        let req = self
            .client
            .put(url.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json");
        let rsp = self
            .authorize(
                req,
                &Method::PUT,
                &url,
                bytes.len(),
                "application/json",
                &[("x-ms-blob-type", "BlockBlob")],
            )?
            .body(bytes)
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(StoreError::Status(rsp.status().as_u16()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        // drop the SAS query, it is a credential
        let mut shown = self.container.clone();
        shown.set_query(None);
        shown.to_string()
    }
}

// ------------------------------------------------------------
// In-process (tests)
// ------------------------------------------------------------

#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: Mutex<usize>,
}

#[cfg(any(test, feature = "test-util"))]
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.blobs
            .lock()
            .insert(name.to_string(), bytes.into());
        self
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn blob(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .get(name)
            .cloned()
    }

    /// Number of successful `put` calls.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("simulated read failure")));
        }
        Ok(self.blob(name))
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("simulated write failure")));
        }
        self.blobs
            .lock()
            .insert(name.to_string(), bytes);
        *self.writes.lock() += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ------------------------------------------------------------
// Dry runs: read the real blob, never write it
// ------------------------------------------------------------

pub struct ReadOnlyBackend {
    inner: Box<dyn BlobBackend>,
}

impl ReadOnlyBackend {
    pub fn new(inner: Box<dyn BlobBackend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl BlobBackend for ReadOnlyBackend {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        tracing::info!(blob = name, size = bytes.len(), location = %self.inner.describe(), "dry-run: skipping blob write");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("read-only {}", self.inner.describe())
    }
}
