//! Drives a route search to a settled results page.

use anyhow::anyhow;
use chrono::Local;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{Browser, Element};
use crate::config::ScraperConfig;
use crate::error::NavigationError;
use crate::models::SearchQuery;
use crate::scraper::cleaner::tidy;
use crate::scraper::extractor::LISTING_SELECTOR;
use crate::scraper::rate_limit::RateLimiter;

/// The site's explicit "no buses found" marker. An empty page is only
/// treated as a valid zero-listing result when this is present — absence of
/// listings alone is indistinguishable from a half-rendered page.
const NO_RESULTS_SELECTOR: &str = ".oops-wrapper";

/// Snapshot of the rendered listing elements. Consumed by value by the
/// extractor: once extraction starts the page cannot be re-walked.
pub struct ResultsPage {
    listings: Vec<Box<dyn Element>>,
}

impl ResultsPage {
    pub(crate) fn new(listings: Vec<Box<dyn Element>>) -> Self {
        Self { listings }
    }

    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    pub(crate) fn into_listings(self) -> Vec<Box<dyn Element>> {
        self.listings
    }
}

pub struct PageNavigator<B: Browser> {
    browser: B,
    limiter: RateLimiter,
    base_url: String,
    max_retries: u32,
    wait_timeout: Duration,
}

impl<B: Browser> PageNavigator<B> {
    pub fn new(browser: B, config: &ScraperConfig) -> Self {
        Self {
            browser,
            limiter: RateLimiter::new(
                Duration::from_millis(config.request_delay_ms),
                config.jitter_ms,
            ),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
        }
    }

    /// Run the search and wait for a settled results page. Retries transient
    /// load failures with the rate limiter interposed between attempts.
    pub async fn search(&mut self, query: &SearchQuery) -> Result<ResultsPage, NavigationError> {
        let source = tidy(&query.source);
        let destination = tidy(&query.destination);
        if source.is_empty() || destination.is_empty() {
            return Err(NavigationError::InvalidQuery(
                "source and destination must be non-empty".into(),
            ));
        }

        let date = query.effective_date();
        if date < Local::now().date_naive() {
            return Err(NavigationError::InvalidQuery(format!(
                "journey date {} is in the past",
                date
            )));
        }

        let url = self.search_url(&source, &destination, date)?;
        let attempts = self.max_retries + 1;
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=attempts {
            self.limiter.wait().await;
            debug!("search attempt {}/{}: {}", attempt, attempts, url);

            match self.try_load(url.as_str()).await {
                Ok(page) => {
                    info!(
                        "{} → {} on {}: {} listings",
                        source,
                        destination,
                        date,
                        page.listing_count()
                    );
                    return Ok(page);
                }
                Err(e) => {
                    warn!("attempt {}/{} failed: {:#}", attempt, attempts, e);
                    last_err = Some(e);
                }
            }
        }

        Err(NavigationError::RetriesExhausted {
            attempts,
            timeout: self.wait_timeout,
            cause: last_err.unwrap_or_else(|| anyhow!("no attempts made")),
        })
    }

    async fn try_load(&mut self, url: &str) -> anyhow::Result<ResultsPage> {
        self.browser.navigate(url).await?;

        if self
            .browser
            .wait_for_selector(LISTING_SELECTOR, self.wait_timeout)
            .await?
        {
            return Ok(ResultsPage::new(self.browser.query_all(LISTING_SELECTOR)?));
        }

        // Zero listings is fine, but only when the page says so itself.
        if !self.browser.query_all(NO_RESULTS_SELECTOR)?.is_empty() {
            return Ok(ResultsPage::new(Vec::new()));
        }

        Err(anyhow!("results container never became visible"))
    }

    fn search_url(
        &self,
        source: &str,
        destination: &str,
        date: chrono::NaiveDate,
    ) -> Result<Url, NavigationError> {
        let path = format!("{}/bus-tickets/{}-to-{}", self.base_url, slug(source), slug(destination));
        let mut url = Url::parse(&path)
            .map_err(|e| NavigationError::InvalidQuery(format!("bad search url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("onward", &date.format("%d-%b-%Y").to_string());
        Ok(url)
    }
}

/// "New  Delhi" → "new-delhi"
fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
