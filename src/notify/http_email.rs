// src/notify/http_email.rs
//! Transactional email over HTTP: submit, then poll the operation until it settles.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{EmailTransport, OutboundEmail};
use crate::auth::{connection_pairs, decode_key, hmac_sha256_b64, hmac_string_to_sign, http_date, sha256_b64};
use crate::error::{ConfigError, NotifyError};

const API_VERSION: &str = "2023-03-31";

/// Requests are signed with HMAC-SHA256 over the access key.
#[derive(Clone)]
pub struct HttpEmailTransport {
    client: Client,
    endpoint: String,
    access_key: Vec<u8>,
    timeout: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

impl HttpEmailTransport {
    /// `access_key` is the decoded key, not its base64 form.
    pub fn new(client: Client, endpoint: impl Into<String>, access_key: Vec<u8>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_key,
            timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
            max_polls: 10,
        }
    }

    /// Parse `endpoint=https://…;accesskey=<base64>` (keys are case-insensitive).
    pub fn from_connection_string(client: Client, conn: &str) -> Result<Self, ConfigError> {
        let pairs = connection_pairs(conn);
        let invalid = |reason: &str| ConfigError::Invalid {
            name: "ACS_CONNECTION_STRING",
            reason: reason.to_string(),
        };
        let endpoint = pairs.get("endpoint").ok_or_else(|| invalid("no endpoint="))?;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(invalid("endpoint must be an http(s) URL"));
        }
        let key = pairs
            .get("accesskey")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| invalid("no accesskey="))?;
        let key = decode_key(key).map_err(|_| invalid("accesskey is not valid base64"))?;
        Ok(Self::new(client, endpoint.clone(), key))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn send_url(&self) -> String {
        format!("{}/emails:send?api-version={API_VERSION}", self.endpoint)
    }

    /// Build a request carrying `x-ms-date`, `x-ms-content-sha256` and the
    /// `HMAC-SHA256` authorization over `date;host;hash`.
    fn signed(&self, method: Method, url: &str, body: &[u8]) -> Result<RequestBuilder, NotifyError> {
        let parsed = Url::parse(url).map_err(|e| NotifyError::Transport(format!("bad URL {url}: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(NotifyError::Transport(format!("URL without host: {url}"))),
        };
        let path_and_query = match parsed.query() {
            Some(q) => format!("{}?{q}", parsed.path()),
            None => parsed.path().to_string(),
        };
        let date = http_date(Utc::now());
        let content_hash = sha256_b64(body);
        let to_sign = hmac_string_to_sign(method.as_str(), &path_and_query, &date, &host, &content_hash);
        let signature = hmac_sha256_b64(&self.access_key, &to_sign)
            .map_err(|_| NotifyError::Transport("could not sign request".into()))?;

        Ok(self
            .client
            .request(method, parsed)
            .timeout(self.timeout)
            .header("x-ms-date", date)
            .header("x-ms-content-sha256", content_hash)
            .header(
                AUTHORIZATION,
                format!("HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"),
            ))
    }

    async fn poll(&self, operation_url: &str) -> Result<(), NotifyError> {
        let mut last = String::from("unknown");
        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let rsp = self
                .signed(Method::GET, operation_url, b"")?
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            if !rsp.status().is_success() {
                return Err(NotifyError::Rejected(format!(
                    "status poll answered {}",
                    rsp.status()
                )));
            }
            let op: OperationStatus = rsp
                .json()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            debug!(attempt, status = %op.status, "email operation polled");
            last = op.status.clone();
            if settle(op)?.is_some() {
                return Ok(());
            }
        }
        Err(NotifyError::Timeout(last))
    }
}

/// `Some(())` once succeeded, `None` while still in flight.
fn settle(op: OperationStatus) -> Result<Option<()>, NotifyError> {
    match op.status.as_str() {
        "Succeeded" => Ok(Some(())),
        "Failed" | "Canceled" => {
            let reason = op
                .error
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| op.status.clone());
            Err(NotifyError::Rejected(reason))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, msg: &OutboundEmail) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(msg).map_err(|e| NotifyError::Transport(format!("encode message: {e}")))?;
        let rsp = self
            .signed(Method::POST, &self.send_url(), &body)?
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(NotifyError::Rejected(format!("{status}: {body}")));
        }

        let operation = rsp
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match (status, operation) {
            (StatusCode::ACCEPTED, Some(url)) => self.poll(&url).await,
            _ => {
                // synchronous answer; honour a terminal status if the body has one
                let op: Option<OperationStatus> = rsp.json().await.ok();
                match op {
                    Some(op) => settle(op).map(|_| ()),
                    None => Ok(()),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_parses_in_any_case_and_order() {
        let t = HttpEmailTransport::from_connection_string(
            Client::new(),
            "AccessKey=YWNzLWFjY2Vzcy1rZXk=; Endpoint=https://acs.example.com/",
        )
        .unwrap();
        assert_eq!(t.endpoint, "https://acs.example.com");
        assert_eq!(t.access_key, b"acs-access-key");
        assert_eq!(
            t.send_url(),
            "https://acs.example.com/emails:send?api-version=2023-03-31"
        );
    }

    #[test]
    fn connection_string_requires_both_parts() {
        assert!(HttpEmailTransport::from_connection_string(Client::new(), "accesskey=x").is_err());
        assert!(HttpEmailTransport::from_connection_string(
            Client::new(),
            "endpoint=https://acs.example.com"
        )
        .is_err());
        assert!(HttpEmailTransport::from_connection_string(
            Client::new(),
            "endpoint=acs.example.com;accesskey=YWNzLWFjY2Vzcy1rZXk="
        )
        .is_err());
        assert!(HttpEmailTransport::from_connection_string(
            Client::new(),
            "endpoint=https://acs.example.com;accesskey=not base64!"
        )
        .is_err());
    }

    #[test]
    fn signed_request_carries_hmac_headers() {
        let t = HttpEmailTransport::new(Client::new(), "https://acs.example.com:8443", b"acs-access-key".to_vec());
        let req = t
            .signed(Method::POST, &t.send_url(), br#"{"a":1}"#)
            .unwrap()
            .build()
            .unwrap();
        let h = req.headers();
        assert_eq!(h["x-ms-content-sha256"], "AVq9f1zFei3ZS3WQ8ErYCEJzkF7jPsXOvq5iJ2qX+GI=");
        assert!(h.contains_key("x-ms-date"));
        let auth = h[AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature="));

        // recompute the signature from the sent date
        let date = h["x-ms-date"].to_str().unwrap();
        let expected = hmac_sha256_b64(
            b"acs-access-key",
            &hmac_string_to_sign(
                "POST",
                "/emails:send?api-version=2023-03-31",
                date,
                "acs.example.com:8443",
                "AVq9f1zFei3ZS3WQ8ErYCEJzkF7jPsXOvq5iJ2qX+GI=",
            ),
        )
        .unwrap();
        assert!(auth.ends_with(&format!("Signature={expected}")));
    }

    #[test]
    fn settle_maps_terminal_states() {
        let ok = OperationStatus { status: "Succeeded".into(), error: None };
        assert!(matches!(settle(ok), Ok(Some(()))));
        let running = OperationStatus { status: "Running".into(), error: None };
        assert!(matches!(settle(running), Ok(None)));
        let failed = OperationStatus {
            status: "Failed".into(),
            error: Some(OperationError { message: "bad recipient".into() }),
        };
        match settle(failed) {
            Err(NotifyError::Rejected(m)) => assert_eq!(m, "bad recipient"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
