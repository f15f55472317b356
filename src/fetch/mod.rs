// src/fetch/mod.rs
pub mod leboncoin;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-util"))]
use parking_lot::Mutex;

use crate::error::FetchError;
use crate::listing::{Listing, SearchFilter};

/// One bounded search against a listings provider.
///
/// Implementations must report provider failures as `Err`; an empty vector
/// means the provider answered with no results.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    async fn fetch(&self, filter: &SearchFilter) -> Result<Vec<Listing>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Canned fetcher for tests. Each call returns the current script.
#[cfg(any(test, feature = "test-util"))]
pub struct FixtureFetcher {
    script: Mutex<Script>,
    calls: Mutex<usize>,
}

#[cfg(any(test, feature = "test-util"))]
enum Script {
    Listings(Vec<Listing>),
    Failure { status: u16, body: String },
}

#[cfg(any(test, feature = "test-util"))]
impl FixtureFetcher {
    pub fn from_listings(listings: Vec<Listing>) -> Self {
        Self {
            script: Mutex::new(Script::Listings(listings)),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            script: Mutex::new(Script::Failure {
                status,
                body: body.to_string(),
            }),
            calls: Mutex::new(0),
        }
    }

    pub fn set_listings(&self, listings: Vec<Listing>) {
        *self.script.lock() = Script::Listings(listings);
    }

    pub fn set_failure(&self, status: u16, body: &str) {
        *self.script.lock() = Script::Failure {
            status,
            body: body.to_string(),
        };
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl ListingFetcher for FixtureFetcher {
    async fn fetch(&self, filter: &SearchFilter) -> Result<Vec<Listing>, FetchError> {
        *self.calls.lock() += 1;
        match &*self.script.lock() {
            Script::Listings(v) => Ok(v.iter().take(filter.limit).cloned().collect()),
            Script::Failure { status, body } => Err(FetchError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
