// src/context.rs
//! Long-lived handles for the job, built once per process and passed by reference.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::config::Settings;
use crate::fetch::leboncoin::LeboncoinFetcher;
use crate::fetch::ListingFetcher;
use crate::listing::SearchFilter;
use crate::notify::{
    transport_from_connection_string, EmailTransport, LogTransport, NotificationDispatcher,
};
use crate::seen::backend::{backend_from_connection_string, BlobBackend, ReadOnlyBackend};
use crate::seen::{SeenStore, CONTAINER_NAME};

pub struct JobContext {
    pub fetcher: Arc<dyn ListingFetcher>,
    pub store: SeenStore,
    pub dispatcher: NotificationDispatcher,
    pub recipient: String,
    pub filter: SearchFilter,
    pub jitter_max: Duration,
}

impl JobContext {
    /// Wire explicit collaborators (tests, embedding). No jitter, default filter.
    pub fn new(
        fetcher: Arc<dyn ListingFetcher>,
        store: SeenStore,
        dispatcher: NotificationDispatcher,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            dispatcher,
            recipient: recipient.into(),
            filter: SearchFilter::default(),
            jitter_max: Duration::ZERO,
        }
    }

    pub fn with_jitter_max(mut self, max: Duration) -> Self {
        self.jitter_max = max;
        self
    }

    /// Production wiring. With `dry_run`, the seen-set is read but never written
    /// and emails are only logged.
    pub fn from_settings(settings: &Settings, dry_run: bool) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build HTTP client")?;

        let fetcher: Arc<dyn ListingFetcher> = Arc::new(LeboncoinFetcher::new(client.clone()));

        let backend = backend_from_connection_string(
            &settings.blob_connection,
            CONTAINER_NAME,
            client.clone(),
        )?;
        let backend: Arc<dyn BlobBackend> = if dry_run {
            Arc::new(ReadOnlyBackend::new(backend))
        } else {
            Arc::from(backend)
        };
        let store = SeenStore::new(backend).with_retention_days(settings.retention_days);

        let transport: Arc<dyn EmailTransport> = if dry_run {
            Arc::new(LogTransport)
        } else {
            transport_from_connection_string(&settings.email_connection, client)?
        };
        let dispatcher = NotificationDispatcher::new(transport, settings.sender_address.clone());

        info!(
            provider = fetcher.name(),
            store = %store.location(),
            dry_run,
            retention_days = ?settings.retention_days,
            "job context ready"
        );

        Ok(Self {
            fetcher,
            store,
            dispatcher,
            recipient: settings.recipient.clone(),
            filter: SearchFilter::default(),
            jitter_max: settings.jitter_max,
        })
    }
}
