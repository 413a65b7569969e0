use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::scraper::cleaner::normalise_key;

// ── Search query ──────────────────────────────────────────────────────────────

/// One route to scrape. Also the row format of a JSON batch-config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub source: String,
    pub destination: String,
    /// None means "earliest available", which resolves to tomorrow.
    #[serde(default)]
    pub journey_date: Option<NaiveDate>,
}

impl SearchQuery {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, journey_date: Option<NaiveDate>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            journey_date,
        }
    }

    pub fn effective_date(&self) -> NaiveDate {
        self.journey_date
            .unwrap_or_else(|| Local::now().date_naive() + Days::new(1))
    }
}

// ── Extracted listings ────────────────────────────────────────────────────────

/// One seat-category fare tuple inside a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SeatFare {
    pub seat_category: String,
    pub fare: f64,
    pub available_seats: i64,
}

/// A fully extracted bus listing. `seat_fares` is never empty — listings
/// without a usable fare set are skipped at extraction time.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub operator_name: String,
    pub operator_rating: Option<f64>,
    pub bus_type: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub duration: String,
    pub starting_price: Option<f64>,
    pub seat_fares: Vec<SeatFare>,
}

/// Per-item extraction result. Skips carry the listing's position on the page
/// and a reason, so failure accounting stays precise without exceptions.
#[derive(Debug)]
pub enum ListingOutcome {
    Extracted(ListingRecord),
    Skipped { index: usize, reason: String },
}

// ── Store rows ────────────────────────────────────────────────────────────────

/// Normalized route identity. Built once, via `RouteKey::new`, so every
/// lookup agrees on trimming and case-folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteKey {
    pub source_key: String,
    pub dest_key: String,
}

impl RouteKey {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source_key: normalise_key(source),
            dest_key: normalise_key(destination),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRoute {
    pub source: String,
    pub destination: String,
    pub key: RouteKey,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewOperator {
    pub name: String,
    pub name_key: String,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub route_id: i64,
    pub operator_id: i64,
    pub bus_type: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub duration: String,
    pub rating: Option<f64>,
}

/// Append-only fare snapshot. Identical values on a later scrape still get a
/// fresh row — the point is tracking change over time.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub service_id: i64,
    pub journey_date: NaiveDate,
    pub seat_category: String,
    pub fare: f64,
    pub available_seats: i64,
    pub starting_price: Option<f64>,
    pub demand_factor: Option<f64>,
    pub scraped_at: NaiveDateTime,
}

// ── Read-side rows ────────────────────────────────────────────────────────────

/// One observation with its Service/Route/Operator fields flattened in.
/// Field order is the CSV export column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareRow {
    pub source: String,
    pub destination: String,
    pub operator: String,
    pub bus_type: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub duration: String,
    pub journey_date: NaiveDate,
    pub seat_category: String,
    pub fare: f64,
    pub available_seats: i64,
    pub starting_price: Option<f64>,
    pub demand_factor: Option<f64>,
    pub scraped_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct RouteSummary {
    pub source: String,
    pub destination: String,
    pub observations: i64,
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_key_folds_case_and_whitespace() {
        let a = RouteKey::new("  Hyderabad ", "Bangalore");
        let b = RouteKey::new("hyderabad", "BANGALORE  ");
        assert_eq!(a, b);
    }

    #[test]
    fn unset_journey_date_means_tomorrow() {
        let q = SearchQuery::new("A", "B", None);
        assert_eq!(q.effective_date(), Local::now().date_naive() + Days::new(1));
    }

    #[test]
    fn batch_config_rows_deserialize() {
        let json = r#"[{"source": "Pune", "destination": "Mumbai"},
                       {"source": "Delhi", "destination": "Jaipur", "journey_date": "2026-09-04"}]"#;
        let queries: Vec<SearchQuery> = serde_json::from_str(json).unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].journey_date.is_none());
        assert_eq!(
            queries[1].journey_date,
            Some(NaiveDate::from_ymd_opt(2026, 9, 4).unwrap())
        );
    }
}
