// src/fetch/leboncoin.rs
//! Client for leboncoin's finder search endpoint (single page, newest first).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::FetchError;
use crate::fetch::ListingFetcher;
use crate::listing::{Listing, ListingId, SearchFilter};

pub const SEARCH_URL: &str = "https://api.leboncoin.fr/finder/search";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Clone)]
pub struct LeboncoinFetcher {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl LeboncoinFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: SEARCH_URL.to_string(),
            timeout: Duration::from_secs(20),
        }
    }

    /// Point at another endpoint (mock servers, proxies).
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// Finder request body for `filter`.
pub fn search_body(filter: &SearchFilter) -> Value {
    let loc = &filter.location;
    let mut enums = json!({ "ad_type": ["offer"] });
    if filter.furnished {
        enums["furnished"] = json!(["1"]);
    }

    let mut filters = json!({
        "category": { "id": filter.category_id },
        "enums": enums,
        "location": {
            "locations": [{
                "locationType": "city",
                "city": loc.city,
                "area": { "lat": loc.lat, "lng": loc.lng, "radius": loc.radius },
            }],
        },
        "ranges": {
            "price": { "min": filter.price.0, "max": filter.price.1 },
            "square": { "min": filter.square.0, "max": filter.square.1 },
        },
    });
    if filter.title_only {
        filters["keywords"] = json!({ "type": "subject" });
    }

    json!({
        "filters": filters,
        "limit": filter.limit,
        "limit_alu": 0,
        "offset": 0,
        "sort_by": "time",
        "sort_order": "desc",
        "owner_type": "all",
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    ads: Option<Vec<RawAd>>,
}

#[derive(Debug, Deserialize)]
struct RawAd {
    list_id: u64,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    price: Option<Vec<f64>>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    images: Option<RawImages>,
    index_date: Option<String>,
    first_publication_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawImages {
    #[serde(default)]
    urls_large: Vec<String>,
    #[serde(default)]
    urls: Vec<String>,
}

fn parse_provider_time(s: &str) -> Option<chrono::DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

impl RawAd {
    fn into_listing(self) -> Listing {
        let published_at = self
            .index_date
            .as_deref()
            .and_then(parse_provider_time)
            .or_else(|| self.first_publication_date.as_deref().and_then(parse_provider_time))
            .unwrap_or_else(Utc::now);
        let images = match self.images {
            Some(RawImages { urls_large, .. }) if !urls_large.is_empty() => urls_large,
            Some(RawImages { urls, .. }) => urls,
            None => Vec::new(),
        };
        Listing {
            id: ListingId::from(self.list_id),
            title: self.subject,
            body: self.body,
            price: self.price.and_then(|p| p.first().copied()),
            url: self.url,
            images,
            published_at,
        }
    }
}

/// Decode a finder response body, keeping at most `limit` ads in provider order.
pub fn parse_search_response(bytes: &[u8], limit: usize) -> Result<Vec<Listing>, FetchError> {
    let rsp: SearchResponse = serde_json::from_slice(bytes)?;
    Ok(rsp
        .ads
        .unwrap_or_default()
        .into_iter()
        .take(limit)
        .map(RawAd::into_listing)
        .collect())
}

#[async_trait]
impl ListingFetcher for LeboncoinFetcher {
    async fn fetch(&self, filter: &SearchFilter) -> Result<Vec<Listing>, FetchError> {
        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&search_body(filter))
            .send()
            .await?;

        let status = rsp.status();
        let bytes = rsp.bytes().await?;
        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let listings = parse_search_response(&bytes, filter.limit)?;
        tracing::debug!(provider = self.name(), count = listings.len(), "search page decoded");
        Ok(listings)
    }

    fn name(&self) -> &'static str {
        "leboncoin"
    }
}
