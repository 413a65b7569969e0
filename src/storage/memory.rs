//! Document-oriented backing: serde_json documents in per-entity
//! collections, the same shape a document database would hold. Interior
//! mutability keeps the `FareStore` surface identical to the relational
//! backing; it is also the store every pipeline test runs against.

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Value, json};
use std::sync::Mutex;

use super::FareStore;
use crate::error::ResolutionConflict;
use crate::models::{
    FareRow, NewObservation, NewOperator, NewRoute, NewService, RouteKey, RouteSummary,
    SessionStatus,
};

#[derive(Default)]
struct Collections {
    routes: Vec<Value>,
    operators: Vec<Value>,
    services: Vec<Value>,
    observations: Vec<Value>,
    sessions: Vec<Value>,
    next_id: i64,
}

impl Collections {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn dump(&self, collection: &str) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        match collection {
            "routes" => state.routes.clone(),
            "bus_operators" => state.operators.clone(),
            "bus_services" => state.services.clone(),
            "fare_observations" => state.observations.clone(),
            "scraping_sessions" => state.sessions.clone(),
            other => panic!("unknown collection {other:?}"),
        }
    }
}

fn id_of(doc: &Value) -> i64 {
    doc["id"].as_i64().unwrap_or_default()
}

fn str_of(doc: &Value, field: &str) -> String {
    doc[field].as_str().unwrap_or_default().to_string()
}

/// Single match for a key, or a surfaced `ResolutionConflict` — more than one
/// document behind one normalized key means normalization broke somewhere.
fn find_unique<'a, F>(
    docs: &'a [Value],
    collection: &'static str,
    key: &str,
    pred: F,
) -> Result<Option<&'a Value>>
where
    F: Fn(&Value) -> bool,
{
    let matches: Vec<&Value> = docs.iter().filter(|d| pred(d)).collect();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0])),
        _ => Err(ResolutionConflict {
            collection,
            key: key.to_string(),
            ids: matches.iter().map(|d| id_of(d)).collect(),
        }
        .into()),
    }
}

impl FareStore for MemoryStore {
    fn upsert_route(&self, route: &NewRoute) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let key_str = format!("{}→{}", route.key.source_key, route.key.dest_key);

        let existing = find_unique(&state.routes, "routes", &key_str, |d| {
            str_of(d, "source_key") == route.key.source_key
                && str_of(d, "dest_key") == route.key.dest_key
        })?
        .map(id_of);

        if let Some(id) = existing {
            if let Some(distance) = route.distance_km {
                let doc = state.routes.iter_mut().find(|d| id_of(d) == id).unwrap();
                if doc["distance_km"].is_null() {
                    doc["distance_km"] = json!(distance);
                }
            }
            return Ok(id);
        }

        let id = state.next_id();
        state.routes.push(json!({
            "id": id,
            "source": route.source,
            "destination": route.destination,
            "source_key": route.key.source_key,
            "dest_key": route.key.dest_key,
            "distance_km": route.distance_km,
            "created_at": Utc::now().naive_utc(),
        }));
        Ok(id)
    }

    fn upsert_operator(&self, operator: &NewOperator) -> Result<i64> {
        let mut state = self.state.lock().unwrap();

        let existing = find_unique(&state.operators, "bus_operators", &operator.name_key, |d| {
            str_of(d, "name_key") == operator.name_key
        })?
        .map(id_of);

        if let Some(id) = existing {
            if let Some(rating) = operator.rating {
                let doc = state.operators.iter_mut().find(|d| id_of(d) == id).unwrap();
                doc["rating"] = json!(rating);
            }
            return Ok(id);
        }

        let id = state.next_id();
        state.operators.push(json!({
            "id": id,
            "name": operator.name,
            "name_key": operator.name_key,
            "rating": operator.rating,
            "created_at": Utc::now().naive_utc(),
        }));
        Ok(id)
    }

    fn upsert_service(&self, service: &NewService) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let key_str = format!(
            "{}/{}/{}/{}",
            service.route_id, service.operator_id, service.departure_time, service.bus_type
        );

        let existing = find_unique(&state.services, "bus_services", &key_str, |d| {
            d["route_id"].as_i64() == Some(service.route_id)
                && d["operator_id"].as_i64() == Some(service.operator_id)
                && str_of(d, "departure_time") == service.departure_time
                && str_of(d, "bus_type") == service.bus_type
        })?
        .map(id_of);

        if let Some(id) = existing {
            let doc = state.services.iter_mut().find(|d| id_of(d) == id).unwrap();
            doc["arrival_time"] = json!(service.arrival_time);
            doc["duration"] = json!(service.duration);
            if let Some(rating) = service.rating {
                doc["rating"] = json!(rating);
            }
            return Ok(id);
        }

        let id = state.next_id();
        state.services.push(json!({
            "id": id,
            "route_id": service.route_id,
            "operator_id": service.operator_id,
            "bus_type": service.bus_type,
            "departure_time": service.departure_time,
            "arrival_time": service.arrival_time,
            "duration": service.duration,
            "rating": service.rating,
            "created_at": Utc::now().naive_utc(),
        }));
        Ok(id)
    }

    fn insert_observation(&self, observation: &NewObservation) -> Result<i64> {
        anyhow::ensure!(observation.fare >= 0.0, "fare must be non-negative");
        anyhow::ensure!(
            observation.available_seats >= 0,
            "available_seats must be non-negative"
        );

        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.observations.push(json!({
            "id": id,
            "service_id": observation.service_id,
            "journey_date": observation.journey_date,
            "seat_category": observation.seat_category,
            "fare": observation.fare,
            "available_seats": observation.available_seats,
            "starting_price": observation.starting_price,
            "demand_factor": observation.demand_factor,
            "scraped_at": observation.scraped_at,
        }));
        Ok(id)
    }

    fn begin_session(&self, route_id: i64, journey_date: NaiveDate) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.sessions.push(json!({
            "id": id,
            "route_id": route_id,
            "journey_date": journey_date,
            "total_buses_found": 0,
            "successful_scrapes": 0,
            "session_start": Utc::now().naive_utc(),
            "session_end": null,
            "status": SessionStatus::Running.as_str(),
        }));
        Ok(id)
    }

    fn finish_session(
        &self,
        session_id: i64,
        total_found: usize,
        succeeded: usize,
        status: SessionStatus,
    ) -> Result<()> {
        debug_assert!(succeeded <= total_found);
        let mut state = self.state.lock().unwrap();
        let doc = state
            .sessions
            .iter_mut()
            .find(|d| id_of(d) == session_id)
            .with_context(|| format!("no session {}", session_id))?;
        doc["total_buses_found"] = json!(total_found);
        doc["successful_scrapes"] = json!(succeeded);
        doc["session_end"] = json!(Utc::now().naive_utc());
        doc["status"] = json!(status.as_str());
        Ok(())
    }

    fn fare_history(&self, route: Option<&RouteKey>, days_back: u32) -> Result<Vec<FareRow>> {
        let cutoff = Utc::now().naive_utc() - Duration::days(days_back as i64);
        let state = self.state.lock().unwrap();

        let mut rows = Vec::new();
        for obs in &state.observations {
            let scraped_at: NaiveDateTime = serde_json::from_value(obs["scraped_at"].clone())?;
            if scraped_at < cutoff {
                continue;
            }

            let service_id = obs["service_id"].as_i64().unwrap_or_default();
            let Some(service) = state.services.iter().find(|d| id_of(d) == service_id) else {
                continue;
            };
            let route_id = service["route_id"].as_i64().unwrap_or_default();
            let operator_id = service["operator_id"].as_i64().unwrap_or_default();
            let Some(route_doc) = state.routes.iter().find(|d| id_of(d) == route_id) else {
                continue;
            };
            let Some(operator) = state.operators.iter().find(|d| id_of(d) == operator_id) else {
                continue;
            };

            if let Some(key) = route {
                if str_of(route_doc, "source_key") != key.source_key
                    || str_of(route_doc, "dest_key") != key.dest_key
                {
                    continue;
                }
            }

            rows.push(FareRow {
                source: str_of(route_doc, "source"),
                destination: str_of(route_doc, "destination"),
                operator: str_of(operator, "name"),
                bus_type: str_of(service, "bus_type"),
                departure_time: str_of(service, "departure_time"),
                arrival_time: str_of(service, "arrival_time"),
                duration: str_of(service, "duration"),
                journey_date: serde_json::from_value(obs["journey_date"].clone())?,
                seat_category: str_of(obs, "seat_category"),
                fare: obs["fare"].as_f64().unwrap_or_default(),
                available_seats: obs["available_seats"].as_i64().unwrap_or_default(),
                starting_price: obs["starting_price"].as_f64(),
                demand_factor: obs["demand_factor"].as_f64(),
                scraped_at,
            });
        }

        rows.sort_by(|a, b| {
            (a.journey_date, a.scraped_at).cmp(&(b.journey_date, b.scraped_at))
        });
        Ok(rows)
    }

    fn list_routes(&self) -> Result<Vec<RouteSummary>> {
        let state = self.state.lock().unwrap();

        let mut summaries: Vec<RouteSummary> = state
            .routes
            .iter()
            .map(|route_doc| {
                let route_id = id_of(route_doc);
                let service_ids: Vec<i64> = state
                    .services
                    .iter()
                    .filter(|s| s["route_id"].as_i64() == Some(route_id))
                    .map(id_of)
                    .collect();
                let observations = state
                    .observations
                    .iter()
                    .filter(|o| {
                        o["service_id"]
                            .as_i64()
                            .is_some_and(|sid| service_ids.contains(&sid))
                    })
                    .count() as i64;
                RouteSummary {
                    source: str_of(route_doc, "source"),
                    destination: str_of(route_doc, "destination"),
                    observations,
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.observations.cmp(&a.observations));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RouteKey;

    fn route(source: &str, destination: &str) -> NewRoute {
        NewRoute {
            source: source.to_string(),
            destination: destination.to_string(),
            key: RouteKey::new(source, destination),
            distance_km: None,
        }
    }

    #[test]
    fn repeated_upserts_converge_on_one_id() {
        let store = MemoryStore::new();
        let a = store.upsert_route(&route("Hyderabad", "Bangalore")).unwrap();
        let b = store.upsert_route(&route("HYDERABAD ", " bangalore")).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.dump("routes").len(), 1);
    }

    #[test]
    fn distance_backfills_once_and_sticks() {
        let store = MemoryStore::new();
        let mut r = route("Pune", "Mumbai");
        store.upsert_route(&r).unwrap();

        r.distance_km = Some(148.0);
        store.upsert_route(&r).unwrap();
        r.distance_km = Some(999.0);
        store.upsert_route(&r).unwrap();

        assert_eq!(store.dump("routes")[0]["distance_km"].as_f64(), Some(148.0));
    }

    #[test]
    fn duplicate_key_documents_surface_as_conflict() {
        let store = MemoryStore::new();
        // Plant two docs behind the same key, as a normalization bug would.
        {
            let mut state = store.state.lock().unwrap();
            for id in [1, 2] {
                state.routes.push(json!({
                    "id": id, "source": "X", "destination": "Y",
                    "source_key": "x", "dest_key": "y",
                    "distance_km": null,
                }));
            }
        }
        let err = store.upsert_route(&route("X", "Y")).unwrap_err();
        assert!(err.downcast_ref::<ResolutionConflict>().is_some());
    }

    #[test]
    fn negative_values_are_rejected() {
        let store = MemoryStore::new();
        let obs = NewObservation {
            service_id: 1,
            journey_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            seat_category: "Seater".into(),
            fare: -1.0,
            available_seats: 0,
            starting_price: None,
            demand_factor: None,
            scraped_at: Utc::now().naive_utc(),
        };
        assert!(store.insert_observation(&obs).is_err());
    }
}
