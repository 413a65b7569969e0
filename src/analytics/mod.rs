//! Read-side aggregation over persisted fare observations.
//!
//! Everything here is a pure read: rows come out of the store joined through
//! Service → Route/Operator, and the aggregation happens in memory. Empty
//! windows produce empty/zero-valued results, never errors.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Write;

use crate::models::RouteKey;
use crate::storage::FareStore;

/// Per-journey-date fare aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub avg_fare: f64,
    pub min_fare: f64,
    pub max_fare: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandSummary {
    pub avg_fare: f64,
    pub avg_available_seats: f64,
    pub observations: usize,
}

pub struct AnalyticsEngine<'a> {
    store: &'a dyn FareStore,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(store: &'a dyn FareStore) -> Self {
        Self { store }
    }

    /// Fare aggregates grouped by journey date, chronological.
    pub fn fare_trend(&self, route: &RouteKey, days_back: u32) -> Result<Vec<TrendPoint>> {
        let rows = self.store.fare_history(Some(route), days_back)?;

        let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for row in &rows {
            by_date.entry(row.journey_date).or_default().push(row.fare);
        }

        Ok(by_date
            .into_iter()
            .map(|(date, fares)| {
                let sum: f64 = fares.iter().sum();
                TrendPoint {
                    date,
                    avg_fare: sum / fares.len() as f64,
                    min_fare: fares.iter().cloned().fold(f64::INFINITY, f64::min),
                    max_fare: fares.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    observations: fares.len(),
                }
            })
            .collect())
    }

    pub fn demand_summary(&self, route: &RouteKey, days_back: u32) -> Result<DemandSummary> {
        let rows = self.store.fare_history(Some(route), days_back)?;
        if rows.is_empty() {
            return Ok(DemandSummary::default());
        }

        let n = rows.len() as f64;
        Ok(DemandSummary {
            avg_fare: rows.iter().map(|r| r.fare).sum::<f64>() / n,
            avg_available_seats: rows.iter().map(|r| r.available_seats as f64).sum::<f64>() / n,
            observations: rows.len(),
        })
    }

    /// Write one flattened CSV row per observation. Returns the row count.
    pub fn export_csv<W: Write>(
        &self,
        route: Option<&RouteKey>,
        days_back: u32,
        out: W,
    ) -> Result<usize> {
        let rows = self.store.fare_history(route, days_back)?;
        let mut writer = csv::Writer::from_writer(out);
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }
}

/// Percent change between the two most recent trend points. None with fewer
/// than two points or a zero baseline.
pub fn trend_shift(points: &[TrendPoint]) -> Option<f64> {
    let [.., prev, last] = points else {
        return None;
    };
    (prev.avg_fare != 0.0).then(|| (last.avg_fare - prev.avg_fare) / prev.avg_fare * 100.0)
}

pub fn shift_direction(pct: f64) -> &'static str {
    if pct > 0.0 {
        "up"
    } else if pct < 0.0 {
        "down"
    } else {
        "stable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FareRow, NewObservation, NewOperator, NewRoute, NewService};
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn seed(store: &MemoryStore) -> RouteKey {
        let route_id = store
            .upsert_route(&NewRoute {
                source: "Hyderabad".into(),
                destination: "Bangalore".into(),
                key: RouteKey::new("Hyderabad", "Bangalore"),
                distance_km: Some(570.0),
            })
            .unwrap();
        let operator_id = store
            .upsert_operator(&NewOperator {
                name: "VRL Travels".into(),
                name_key: "vrl travels".into(),
                rating: Some(4.3),
            })
            .unwrap();
        let service_id = store
            .upsert_service(&NewService {
                route_id,
                operator_id,
                bus_type: "AC Sleeper".into(),
                departure_time: "21:30".into(),
                arrival_time: "05:45".into(),
                duration: "08h 15m".into(),
                rating: Some(4.3),
            })
            .unwrap();

        let day1 = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2026, 9, 2).unwrap();
        for (date, fare, seats) in [
            (day1, 800.0, 10),
            (day1, 500.0, 5),
            (day2, 900.0, 2),
        ] {
            store
                .insert_observation(&NewObservation {
                    service_id,
                    journey_date: date,
                    seat_category: "Sleeper".into(),
                    fare,
                    available_seats: seats,
                    starting_price: Some(500.0),
                    demand_factor: None,
                    scraped_at: Utc::now().naive_utc(),
                })
                .unwrap();
        }

        RouteKey::new("Hyderabad", "Bangalore")
    }

    #[test]
    fn trend_groups_by_journey_date_in_order() {
        let store = MemoryStore::new();
        let key = seed(&store);
        let engine = AnalyticsEngine::new(&store);

        let points = engine.fare_trend(&key, 30).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        assert_eq!(points[0].avg_fare, 650.0);
        assert_eq!(points[0].min_fare, 500.0);
        assert_eq!(points[0].max_fare, 800.0);
        assert_eq!(points[0].observations, 2);
        assert_eq!(points[1].avg_fare, 900.0);

        let pct = trend_shift(&points).unwrap();
        assert!((pct - 38.46).abs() < 0.01);
        assert_eq!(shift_direction(pct), "up");
    }

    #[test]
    fn empty_window_yields_empty_trend_and_zero_summary() {
        let store = MemoryStore::new();
        let engine = AnalyticsEngine::new(&store);
        let key = RouteKey::new("Nowhere", "Elsewhere");

        assert!(engine.fare_trend(&key, 30).unwrap().is_empty());
        assert_eq!(engine.demand_summary(&key, 30).unwrap(), DemandSummary::default());
    }

    #[test]
    fn demand_summary_averages_fares_and_availability() {
        let store = MemoryStore::new();
        let key = seed(&store);
        let engine = AnalyticsEngine::new(&store);

        let summary = engine.demand_summary(&key, 30).unwrap();
        assert_eq!(summary.observations, 3);
        assert!((summary.avg_fare - 733.33).abs() < 0.01);
        assert!((summary.avg_available_seats - 5.666).abs() < 0.01);
    }

    #[test]
    fn csv_round_trip_reproduces_the_average_fare() {
        let store = MemoryStore::new();
        let key = seed(&store);
        let engine = AnalyticsEngine::new(&store);

        let mut buf = Vec::new();
        let written = engine.export_csv(Some(&key), 30, &mut buf).unwrap();
        assert_eq!(written, 3);

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let rows: Vec<FareRow> = reader.deserialize().collect::<csv::Result<_>>().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].source, "Hyderabad");
        assert_eq!(rows[0].operator, "VRL Travels");

        let reaggregated = rows.iter().map(|r| r.fare).sum::<f64>() / rows.len() as f64;
        assert_eq!(
            reaggregated,
            engine.demand_summary(&key, 30).unwrap().avg_fare
        );
    }
}
