pub mod cleaner;
pub mod extractor;
pub mod navigator;
pub mod rate_limit;

use async_trait::async_trait;

use crate::browser::Browser;
use crate::config::ScraperConfig;
use crate::error::NavigationError;
use crate::models::{ListingOutcome, SearchQuery};

use self::navigator::PageNavigator;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable listing source: run a route search and return per-listing
/// outcomes. The persistence pipeline only sees this seam.
#[async_trait]
pub trait ListingSource: Send {
    async fn harvest(&mut self, query: &SearchQuery)
    -> Result<Vec<ListingOutcome>, NavigationError>;
}

// ── redbus results pages ──────────────────────────────────────────────────────

pub struct RedbusSource<B: Browser> {
    navigator: PageNavigator<B>,
}

impl<B: Browser> RedbusSource<B> {
    pub fn new(browser: B, config: &ScraperConfig) -> Self {
        Self {
            navigator: PageNavigator::new(browser, config),
        }
    }
}

#[async_trait]
impl<B: Browser> ListingSource for RedbusSource<B> {
    async fn harvest(
        &mut self,
        query: &SearchQuery,
    ) -> Result<Vec<ListingOutcome>, NavigationError> {
        let page = self.navigator.search(query).await?;
        Ok(extractor::extract(page).collect())
    }
}
