//! Storage capability.
//!
//! The pipeline talks to a `FareStore`, not a database. Two backings satisfy
//! it: `Repository` (DuckDB, relational — the production store) and
//! `MemoryStore` (document-oriented over serde_json docs, mirroring the
//! collection layout a document database would use). Upserts are keyed on the
//! normalized identity keys and must be idempotent — repeated resolutions of
//! the same key converge on one id.

pub mod duckdb_store;
pub mod memory;

pub use duckdb_store::Repository;
pub use memory::MemoryStore;

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{
    FareRow, NewObservation, NewOperator, NewRoute, NewService, RouteKey, RouteSummary,
    SessionStatus,
};

pub trait FareStore {
    /// Lookup-or-create by normalized (source, destination). Existing routes
    /// only ever gain a distance backfill; they are never rewritten.
    fn upsert_route(&self, route: &NewRoute) -> Result<i64>;

    /// Lookup-or-create by normalized name. Rating refreshes on re-sighting.
    fn upsert_operator(&self, operator: &NewOperator) -> Result<i64>;

    /// Lookup-or-create by (route, operator, departure_time, bus_type) — a
    /// service is a recurring scheduled run, not a single day's trip.
    fn upsert_service(&self, service: &NewService) -> Result<i64>;

    /// Append-only. No update or delete path exists for observations.
    fn insert_observation(&self, observation: &NewObservation) -> Result<i64>;

    fn begin_session(&self, route_id: i64, journey_date: NaiveDate) -> Result<i64>;

    fn finish_session(
        &self,
        session_id: i64,
        total_found: usize,
        succeeded: usize,
        status: SessionStatus,
    ) -> Result<()>;

    /// Observations joined through Service → Route/Operator, flattened, for
    /// the given route (or all routes), captured within the last `days_back`
    /// days. Ordered by journey date then capture time.
    fn fare_history(&self, route: Option<&RouteKey>, days_back: u32) -> Result<Vec<FareRow>>;

    /// All known routes with observation counts, busiest first.
    fn list_routes(&self) -> Result<Vec<RouteSummary>>;
}
