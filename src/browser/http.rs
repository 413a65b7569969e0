//! HTTP-backed page capability.
//!
//! Fetches the server-rendered results document and answers selector queries
//! against that snapshot. Transient fetch errors are retried with backoff
//! here; *render*-level retries (results container never appearing) belong to
//! the navigator, which re-navigates with the rate limiter interposed.

use async_trait::async_trait;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::debug;

use super::{Browser, Element, select_in_document};
use crate::config::ScraperConfig;
use crate::error::BrowserError;

pub struct HttpBrowser {
    client: reqwest::Client,
    document: Option<String>,
}

impl HttpBrowser {
    pub fn new(config: &ScraperConfig) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // The site sets session cookies on first hit; keep them.
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            document: None,
        })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("GET {}", url);

        let strategy = ExponentialBackoff::from_millis(300).map(jitter).take(2);
        let client = &self.client;
        let body = Retry::spawn(strategy, || async move {
            client.get(url).send().await?.error_for_status()?.text().await
        })
        .await?;

        self.document = Some(body);
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, BrowserError> {
        // The snapshot does not render progressively, so the bounded wait
        // degenerates to a single check. A driver-backed implementation
        // would poll the live DOM up to the timeout.
        Ok(!self.query_all(selector)?.is_empty())
    }

    fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, BrowserError> {
        let doc = self.document.as_deref().ok_or(BrowserError::NoPage)?;
        select_in_document(doc, selector)
    }
}
