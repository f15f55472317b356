// src/listing.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-assigned identifier, stable across repeated fetches of the same ad.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ListingId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub body: String,
    pub price: Option<f64>,
    pub url: String,
    pub images: Vec<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoCenter {
    pub city: &'static str,
    pub lat: f64,
    pub lng: f64,
    /// Metres; 0 means "the whole city".
    pub radius: u32,
}

/// The search the watcher runs on every invocation.
///
/// Fixed at deployment: `Default` is the only constructor used outside tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub location: GeoCenter,
    pub category_id: &'static str,
    pub price: (u32, u32),
    pub square: (u32, u32),
    pub furnished: bool,
    pub limit: usize,
    pub title_only: bool,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            location: GeoCenter {
                city: "Paris",
                lat: 48.85994982004764,
                lng: 2.33801967847424,
                radius: 0,
            },
            // "locations" (rentals)
            category_id: "10",
            price: (900, 1250),
            square: (20, 400),
            furnished: true,
            limit: 5,
            title_only: true,
        }
    }
}
