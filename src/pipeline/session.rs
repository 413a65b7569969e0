//! Scraping-session bookkeeping.
//!
//! A recorder is opened before navigation begins and must always be
//! finalised — a session is never left `running`. The Drop guard covers the
//! paths explicit code can miss (early `?` returns, panics): an unfinished
//! recorder finalises its session as failed with whatever counts it has.

use anyhow::Result;
use chrono::NaiveDate;
use tracing::warn;

use super::IngestSummary;
use crate::models::SessionStatus;
use crate::storage::FareStore;

pub struct SessionRecorder<'a> {
    store: &'a dyn FareStore,
    session_id: i64,
    found: usize,
    succeeded: usize,
    finished: bool,
}

impl<'a> SessionRecorder<'a> {
    /// Open a session with status `running` and zeroed counts.
    pub fn begin(store: &'a dyn FareStore, route_id: i64, journey_date: NaiveDate) -> Result<Self> {
        let session_id = store.begin_session(route_id, journey_date)?;
        Ok(Self {
            store,
            session_id,
            found: 0,
            succeeded: 0,
            finished: false,
        })
    }

    pub fn id(&self) -> i64 {
        self.session_id
    }

    pub fn record(&mut self, summary: &IngestSummary) {
        self.found = summary.found;
        self.succeeded = summary.succeeded;
    }

    pub fn finish(mut self, status: SessionStatus) -> Result<()> {
        self.finished = true;
        self.store
            .finish_session(self.session_id, self.found, self.succeeded, status)
    }
}

impl Drop for SessionRecorder<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.store.finish_session(
                self.session_id,
                self.found,
                self.succeeded,
                SessionStatus::Failed,
            ) {
                warn!("could not finalise session {}: {:#}", self.session_id, e);
            }
        }
    }
}
