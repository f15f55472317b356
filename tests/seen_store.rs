// tests/seen_store.rs
//
// SeenStore over the on-disk and HTTP blob backends.

use std::sync::Arc;

use chrono::Utc;
use listing_watch::auth::{decode_key, hmac_sha256_b64, shared_key_string_to_sign};
use listing_watch::seen::backend::{BlobBackend, FsBackend, HttpBlobBackend};
use listing_watch::seen::{SeenStore, BLOB_NAME};
use listing_watch::{ListingId, SeenSet};
use reqwest::Client;
use wiremock::matchers::{header, header_exists, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn set(ids: &[&str]) -> SeenSet {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn save_then_load_returns_the_same_set() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SeenStore::new(Arc::new(FsBackend::new(tmp.path())));

    let original = set(&["c", "a", "b"]);
    store.save(&original).await.unwrap();
    let loaded = store.load().await;
    assert_eq!(loaded, set(&["a", "b", "c"]));

    let raw = std::fs::read_to_string(tmp.path().join(BLOB_NAME)).unwrap();
    let mut parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
    parsed.sort();
    assert_eq!(parsed, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn missing_directory_loads_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SeenStore::new(Arc::new(FsBackend::new(tmp.path().join("never-created"))));
    assert!(store.load().await.is_empty());
    assert!(store.try_load().await.unwrap().is_none());
}

#[tokio::test]
async fn blob_of_wrong_shape_loads_empty_but_try_load_reports_it() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(BLOB_NAME), br#"{"ids":["1"]}"#).unwrap();
    let store = SeenStore::new(Arc::new(FsBackend::new(tmp.path())));

    assert!(store.load().await.is_empty());
    assert!(store.try_load().await.is_err());
}

#[tokio::test]
async fn retention_writes_stamped_entries_that_load_back() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SeenStore::new(Arc::new(FsBackend::new(tmp.path()))).with_retention_days(Some(7));

    let now = Utc::now();
    let merged = store.merge(&SeenSet::new(), &[ListingId::from("42")], now);
    store.save(&merged).await.unwrap();

    let loaded = store.load().await;
    assert_eq!(loaded.first_seen(&ListingId::from("42")), Some(now));
}

#[tokio::test]
async fn http_backend_missing_blob_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/seen-ads/{BLOB_NAME}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend =
        HttpBlobBackend::new(Client::new(), &format!("{}/seen-ads?sig=x", server.uri())).unwrap();
    assert!(backend.get(BLOB_NAME).await.unwrap().is_none());
}

#[tokio::test]
async fn http_backend_puts_block_blob_and_reads_it() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/seen-ads/{BLOB_NAME}")))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/seen-ads/{BLOB_NAME}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["9","10"]"#))
        .mount(&server)
        .await;

    let backend =
        HttpBlobBackend::new(Client::new(), &format!("{}/seen-ads?sig=x", server.uri())).unwrap();
    let store = SeenStore::new(Arc::new(backend));

    store.save(&set(&["9", "10"])).await.unwrap();
    assert_eq!(store.load().await, set(&["9", "10"]));
}

#[tokio::test]
async fn http_backend_server_error_is_a_store_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let backend =
        HttpBlobBackend::new(Client::new(), &format!("{}/seen-ads", server.uri())).unwrap();
    let err = backend.put(BLOB_NAME, b"[]".to_vec()).await.unwrap_err();
    assert!(matches!(err, listing_watch::StoreError::Status(403)));
}

const ACCOUNT_KEY: &str = "c3RvcmFnZS1rZXktYnl0ZXM=";

fn shared_key_backend(server: &MockServer) -> HttpBlobBackend {
    HttpBlobBackend::from_storage_connection_string(
        Client::new(),
        &format!("BlobEndpoint={};AccountName=acct;AccountKey={ACCOUNT_KEY}", server.uri()),
        "seen-ads",
    )
    .unwrap()
}

#[tokio::test]
async fn shared_key_backend_signs_get_and_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/seen-ads/{BLOB_NAME}")))
        .and(header_regex("authorization", r"^SharedKey acct:[A-Za-z0-9+/]{43}=$"))
        .and(header("x-ms-version", "2021-08-06"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .and(header_exists("x-ms-date"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/seen-ads/{BLOB_NAME}")))
        .and(header_regex("authorization", r"^SharedKey acct:[A-Za-z0-9+/]{43}=$"))
        .and(header("x-ms-version", "2021-08-06"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["5"]"#))
        .expect(1)
        .mount(&server)
        .await;

    let store = SeenStore::new(Arc::new(shared_key_backend(&server)));
    store.save(&set(&["5"])).await.unwrap();
    assert_eq!(store.load().await, set(&["5"]));
}

#[tokio::test]
async fn shared_key_signature_verifies_against_the_received_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    shared_key_backend(&server)
        .put(BLOB_NAME, br#"["1"]"#.to_vec())
        .await
        .unwrap();

    let requests = server.received_requests().await.expect("recording enabled");
    let req = &requests[0];
    let header = |name: &str| req.headers.get(name).unwrap().to_str().unwrap().to_string();
    let date = header("x-ms-date");
    let to_sign = shared_key_string_to_sign(
        "PUT",
        req.body.len(),
        "application/json",
        &[
            ("x-ms-date", date.as_str()),
            ("x-ms-version", "2021-08-06"),
            ("x-ms-blob-type", "BlockBlob"),
        ],
        "acct",
        req.url.path(),
    );
    let expected = hmac_sha256_b64(&decode_key(ACCOUNT_KEY).unwrap(), &to_sign).unwrap();
    assert_eq!(header("authorization"), format!("SharedKey acct:{expected}"));
}

#[tokio::test]
async fn sas_backend_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend =
        HttpBlobBackend::new(Client::new(), &format!("{}/seen-ads?sig=x", server.uri())).unwrap();
    assert!(backend.get(BLOB_NAME).await.unwrap().is_none());

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("authorization").is_none());
    assert_eq!(requests[0].url.query(), Some("sig=x"));
}
