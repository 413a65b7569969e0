//! Pipeline orchestrator: ties navigator/extractor → storage together.
//!
//! One route scrape runs strictly sequentially: open a session, harvest the
//! results page, then resolve + persist listing by listing. Per-listing
//! trouble (a malformed card, a failed write) is counted and logged, never
//! escalated — one bad record must not discard the rest of the page. Only a
//! whole-page navigation failure marks the session `failed`.

pub mod demand;
pub mod resolver;
pub mod session;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::models::{ListingOutcome, ListingRecord, NewObservation, SearchQuery, SessionStatus};
use crate::scraper::ListingSource;
use crate::storage::FareStore;

use self::demand::DemandModel;
use self::resolver::ReferenceResolver;
use self::session::SessionRecorder;

/// Per-route accounting. `found` counts every listing the extractor saw,
/// including skipped ones; `succeeded` counts listings with at least one
/// durably written observation. `succeeded ≤ found` always.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSummary {
    pub found: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Scrape one route end to end. The session is finalised on every path:
/// `completed` when the pipeline ran (regardless of per-listing failures),
/// `failed` when navigation could not produce a results page at all.
pub async fn scrape_route(
    store: &dyn FareStore,
    source: &mut dyn ListingSource,
    demand: &dyn DemandModel,
    query: &SearchQuery,
    cancel: &AtomicBool,
) -> Result<IngestSummary> {
    let resolver = ReferenceResolver::new(store);
    let route_id = resolver.resolve_route(&query.source, &query.destination)?;
    let journey_date = query.effective_date();

    let mut session = SessionRecorder::begin(store, route_id, journey_date)?;
    info!(
        "session {}: {} → {} on {}",
        session.id(),
        query.source,
        query.destination,
        journey_date
    );

    let outcomes = match source.harvest(query).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            if let Err(fin) = session.finish(SessionStatus::Failed) {
                warn!("session finalisation failed: {:#}", fin);
            }
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("scrape {} → {}", query.source, query.destination));
        }
    };

    let pipeline = PersistencePipeline::new(store, demand);
    let summary = pipeline.ingest(route_id, journey_date, outcomes, cancel);
    session.record(&summary);
    session.finish(SessionStatus::Completed)?;

    info!(
        "route done: {} found | {} stored | {} skipped | {} failed",
        summary.found, summary.succeeded, summary.skipped, summary.failed
    );
    Ok(summary)
}

pub struct PersistencePipeline<'a> {
    store: &'a dyn FareStore,
    demand: &'a dyn DemandModel,
}

impl<'a> PersistencePipeline<'a> {
    pub fn new(store: &'a dyn FareStore, demand: &'a dyn DemandModel) -> Self {
        Self { store, demand }
    }

    /// Consume extraction outcomes one listing at a time. Cancellation is
    /// honoured between listings: the in-flight listing finishes (or fails)
    /// before the loop stops, so session counters stay consistent.
    pub fn ingest(
        &self,
        route_id: i64,
        journey_date: NaiveDate,
        outcomes: impl IntoIterator<Item = ListingOutcome>,
        cancel: &AtomicBool,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for outcome in outcomes {
            if cancel.load(Ordering::Relaxed) {
                info!("stop requested — leaving remaining listings for a later run");
                break;
            }

            match outcome {
                ListingOutcome::Skipped { index, reason } => {
                    summary.found += 1;
                    summary.skipped += 1;
                    warn!("listing {}: skipped during extraction: {}", index, reason);
                }
                ListingOutcome::Extracted(listing) => {
                    summary.found += 1;
                    match self.persist_listing(route_id, journey_date, &listing) {
                        Ok(written) => {
                            summary.succeeded += 1;
                            info!(
                                "{}: {} fare observation(s) written",
                                listing.operator_name, written
                            );
                        }
                        Err(e) => {
                            summary.failed += 1;
                            warn!("{}: persistence failed: {:#}", listing.operator_name, e);
                        }
                    }
                }
            }
        }

        summary
    }

    /// Resolve references, upsert the service, append one observation per
    /// seat-category tuple. Succeeds when at least one observation landed.
    fn persist_listing(
        &self,
        route_id: i64,
        journey_date: NaiveDate,
        listing: &ListingRecord,
    ) -> Result<usize> {
        let resolver = ReferenceResolver::new(self.store);
        let operator_id =
            resolver.resolve_operator(&listing.operator_name, listing.operator_rating)?;
        let service_id = resolver.resolve_service(route_id, operator_id, listing)?;

        let scraped_at = Utc::now().naive_utc();
        let mut written = 0usize;
        let mut last_err = None;

        for seat in &listing.seat_fares {
            let observation = NewObservation {
                service_id,
                journey_date,
                seat_category: seat.seat_category.clone(),
                fare: seat.fare,
                available_seats: seat.available_seats,
                starting_price: listing.starting_price,
                demand_factor: self
                    .demand
                    .score(seat.fare, listing.starting_price, seat.available_seats),
                scraped_at,
            };
            match self.store.insert_observation(&observation) {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!(
                        "{} / {}: observation not written: {:#}",
                        listing.operator_name, seat.seat_category, e
                    );
                    last_err = Some(e);
                }
            }
        }

        if written == 0 {
            Err(last_err.unwrap_or_else(|| anyhow!("listing had no seat fares")))
        } else {
            Ok(written)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavigationError;
    use crate::models::{SeatFare, SearchQuery};
    use crate::scraper::ListingSource;
    use crate::storage::{FareStore, MemoryStore};
    use async_trait::async_trait;
    use demand::SeatPressureModel;
    use std::time::Duration;

    fn listing(operator: &str, fares: &[(&str, f64, i64)]) -> ListingRecord {
        ListingRecord {
            operator_name: operator.to_string(),
            operator_rating: Some(4.0),
            bus_type: "AC Sleeper".into(),
            departure_time: "21:30".into(),
            arrival_time: "05:45".into(),
            duration: "08h 15m".into(),
            starting_price: fares.iter().map(|f| f.1).reduce(f64::min),
            seat_fares: fares
                .iter()
                .map(|(category, fare, seats)| SeatFare {
                    seat_category: category.to_string(),
                    fare: *fare,
                    available_seats: *seats,
                })
                .collect(),
        }
    }

    struct ScriptedSource {
        result: Option<Result<Vec<ListingOutcome>, NavigationError>>,
    }

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn harvest(
            &mut self,
            _query: &SearchQuery,
        ) -> Result<Vec<ListingOutcome>, NavigationError> {
            self.result.take().expect("harvest called twice")
        }
    }

    fn query() -> SearchQuery {
        SearchQuery::new("Hyderabad", "Bangalore", None)
    }

    #[test]
    fn two_listings_one_malformed_end_to_end() {
        let store = MemoryStore::new();
        let demand = SeatPressureModel::new(40.0);
        let mut source = ScriptedSource {
            result: Some(Ok(vec![
                ListingOutcome::Extracted(listing(
                    "A",
                    &[("Sleeper", 800.0, 10), ("Seater", 500.0, 5)],
                )),
                ListingOutcome::Skipped {
                    index: 1,
                    reason: "seat row without a numeric fare".into(),
                },
            ])),
        };

        let cancel = AtomicBool::new(false);
        let summary = tokio_test::block_on(scrape_route(
            &store, &mut source, &demand, &query(), &cancel,
        ))
        .unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);

        // One service for "A", none for the malformed listing.
        assert_eq!(store.dump("bus_services").len(), 1);
        assert_eq!(store.dump("fare_observations").len(), 2);

        let sessions = store.dump("scraping_sessions");
        assert_eq!(sessions[0]["status"], "completed");
        assert_eq!(sessions[0]["total_buses_found"], 2);
        assert_eq!(sessions[0]["successful_scrapes"], 1);
    }

    #[test]
    fn navigation_failure_marks_the_session_failed() {
        let store = MemoryStore::new();
        let demand = SeatPressureModel::new(40.0);
        let mut source = ScriptedSource {
            result: Some(Err(NavigationError::RetriesExhausted {
                attempts: 3,
                timeout: Duration::from_secs(10),
                cause: anyhow!("site unreachable"),
            })),
        };

        let cancel = AtomicBool::new(false);
        let result = tokio_test::block_on(scrape_route(
            &store, &mut source, &demand, &query(), &cancel,
        ));
        assert!(result.is_err());

        let sessions = store.dump("scraping_sessions");
        assert_eq!(sessions[0]["status"], "failed");
        assert_eq!(sessions[0]["successful_scrapes"], 0);
        assert!(!sessions[0]["session_end"].is_null());
    }

    /// Delegating store whose observation writes fail for one poisoned seat
    /// category — simulates a transient write error mid-listing.
    struct PoisonStore {
        inner: MemoryStore,
    }

    impl FareStore for PoisonStore {
        fn upsert_route(&self, r: &crate::models::NewRoute) -> Result<i64> {
            self.inner.upsert_route(r)
        }
        fn upsert_operator(&self, o: &crate::models::NewOperator) -> Result<i64> {
            self.inner.upsert_operator(o)
        }
        fn upsert_service(&self, s: &crate::models::NewService) -> Result<i64> {
            self.inner.upsert_service(s)
        }
        fn insert_observation(&self, obs: &NewObservation) -> Result<i64> {
            if obs.seat_category == "Poison" {
                Err(anyhow!("write timed out"))
            } else {
                self.inner.insert_observation(obs)
            }
        }
        fn begin_session(&self, route_id: i64, d: NaiveDate) -> Result<i64> {
            self.inner.begin_session(route_id, d)
        }
        fn finish_session(
            &self,
            id: i64,
            total: usize,
            ok: usize,
            status: SessionStatus,
        ) -> Result<()> {
            self.inner.finish_session(id, total, ok, status)
        }
        fn fare_history(
            &self,
            route: Option<&crate::models::RouteKey>,
            days_back: u32,
        ) -> Result<Vec<crate::models::FareRow>> {
            self.inner.fare_history(route, days_back)
        }
        fn list_routes(&self) -> Result<Vec<crate::models::RouteSummary>> {
            self.inner.list_routes()
        }
    }

    #[test]
    fn partial_write_failure_still_counts_the_listing() {
        let store = PoisonStore {
            inner: MemoryStore::new(),
        };
        let demand = SeatPressureModel::new(40.0);
        let pipeline = PersistencePipeline::new(&store, &demand);
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let cancel = AtomicBool::new(false);

        let route_id = ReferenceResolver::new(&store)
            .resolve_route("Pune", "Mumbai")
            .unwrap();
        let summary = pipeline.ingest(
            route_id,
            date,
            vec![ListingOutcome::Extracted(listing(
                "A",
                &[("Poison", 700.0, 3), ("Seater", 500.0, 5)],
            ))],
            &cancel,
        );

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(store.inner.dump("fare_observations").len(), 1);
    }

    #[test]
    fn total_write_failure_is_counted_not_escalated() {
        let store = PoisonStore {
            inner: MemoryStore::new(),
        };
        let demand = SeatPressureModel::new(40.0);
        let pipeline = PersistencePipeline::new(&store, &demand);
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let cancel = AtomicBool::new(false);

        let route_id = ReferenceResolver::new(&store)
            .resolve_route("Pune", "Mumbai")
            .unwrap();
        let summary = pipeline.ingest(
            route_id,
            date,
            vec![
                ListingOutcome::Extracted(listing("Bad", &[("Poison", 700.0, 3)])),
                ListingOutcome::Extracted(listing("Good", &[("Seater", 500.0, 5)])),
            ],
            &cancel,
        );

        // The poisoned listing fails alone; the next one still lands.
        assert_eq!(summary.found, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
    }

    #[test]
    fn cancellation_stops_before_the_next_listing() {
        let store = MemoryStore::new();
        let demand = SeatPressureModel::new(40.0);
        let pipeline = PersistencePipeline::new(&store, &demand);
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let cancel = AtomicBool::new(true);

        let summary = pipeline.ingest(
            1,
            date,
            vec![ListingOutcome::Extracted(listing(
                "A",
                &[("Seater", 500.0, 5)],
            ))],
            &cancel,
        );

        assert_eq!(summary.found, 0);
        assert!(store.dump("fare_observations").is_empty());
    }

    #[test]
    fn demand_factor_rides_along_on_observations() {
        let store = MemoryStore::new();
        let demand = SeatPressureModel::new(40.0);
        let pipeline = PersistencePipeline::new(&store, &demand);
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let cancel = AtomicBool::new(false);

        let route_id = ReferenceResolver::new(&store)
            .resolve_route("Pune", "Mumbai")
            .unwrap();
        pipeline.ingest(
            route_id,
            date,
            vec![ListingOutcome::Extracted(listing(
                "A",
                &[("Sleeper", 800.0, 10)],
            ))],
            &cancel,
        );

        let obs = store.dump("fare_observations");
        assert_eq!(obs[0]["demand_factor"].as_f64(), Some(0.75));
    }
}
