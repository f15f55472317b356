// src/auth.rs
//! Shared-key request signing for the blob storage and email APIs, and the
//! `Key=Value;…` connection strings those credentials come in.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Split `Key=Value;Key=Value` into a map with lowercased keys. Values keep
/// everything after the first `=` (account keys end in `==`).
pub fn connection_pairs(conn: &str) -> HashMap<String, String> {
    conn.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect()
}

/// Base64 account/access key to raw HMAC key bytes.
pub fn decode_key(b64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(b64.trim())
}

/// `x-ms-date` value (RFC 1123, always GMT).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn sha256_b64(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

pub fn hmac_sha256_b64(key: &[u8], message: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Storage "SharedKey" string-to-sign for a request without conditional or
/// range headers. `ms_headers` are the `x-ms-*` headers sent.
pub fn shared_key_string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    account: &str,
    path: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort();

    let mut s = format!("{verb}\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n");
    for (k, v) in headers {
        s.push_str(&k);
        s.push(':');
        s.push_str(v);
        s.push('\n');
    }
    s.push('/');
    s.push_str(account);
    s.push_str(path);
    s
}

/// Email API HMAC string-to-sign: verb, path+query, then `date;host;hash`.
pub fn hmac_string_to_sign(verb: &str, path_and_query: &str, date: &str, host: &str, content_hash: &str) -> String {
    format!("{verb}\n{path_and_query}\n{date};{host};{content_hash}")
}
