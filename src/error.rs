use std::time::Duration;
use thiserror::Error;

/// Failures of the page-automation capability itself.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no page loaded — call navigate() first")]
    NoPage,

    #[error("invalid selector {0:?}")]
    Selector(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// Fatal to a single route's scrape: the site was unreachable or the results
/// container never stabilised. The session for that route is marked `failed`;
/// remaining routes in a batch are unaffected.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    #[error("results never stabilised after {attempts} attempt(s) (timeout {timeout:?})")]
    RetriesExhausted {
        attempts: u32,
        timeout: Duration,
        #[source]
        cause: anyhow::Error,
    },
}

/// A normalized identity key resolved to more than one stored entity.
/// This indicates a key-normalization bug and is surfaced, never swallowed.
#[derive(Debug, Error)]
#[error("{collection}: key {key:?} matches {ids:?} — duplicate identities")]
pub struct ResolutionConflict {
    pub collection: &'static str,
    pub key: String,
    pub ids: Vec<i64>,
}
