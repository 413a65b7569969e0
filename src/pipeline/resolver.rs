//! Normalized-key resolution of reference entities.
//!
//! All trimming and case-folding happens here, once, so entity identity never
//! depends on how the page rendered whitespace or casing. Resolution is a
//! lookup-or-create against the store's idempotent upserts: the same key
//! always converges on the same id, in this run or any later one.

use anyhow::{Result, ensure};

use crate::models::{ListingRecord, NewOperator, NewRoute, NewService, RouteKey};
use crate::scraper::cleaner::{normalise_key, tidy};
use crate::storage::FareStore;

pub struct ReferenceResolver<'a> {
    store: &'a dyn FareStore,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(store: &'a dyn FareStore) -> Self {
        Self { store }
    }

    pub fn resolve_route(&self, source: &str, destination: &str) -> Result<i64> {
        let source = tidy(source);
        let destination = tidy(destination);
        ensure!(
            !source.is_empty() && !destination.is_empty(),
            "route endpoints must be non-empty"
        );

        self.store.upsert_route(&NewRoute {
            key: RouteKey::new(&source, &destination),
            source,
            destination,
            distance_km: None,
        })
    }

    pub fn resolve_operator(&self, name: &str, rating: Option<f64>) -> Result<i64> {
        let name = tidy(name);
        ensure!(!name.is_empty(), "operator name must be non-empty");

        self.store.upsert_operator(&NewOperator {
            name_key: normalise_key(&name),
            name,
            rating,
        })
    }

    pub fn resolve_service(
        &self,
        route_id: i64,
        operator_id: i64,
        listing: &ListingRecord,
    ) -> Result<i64> {
        self.store.upsert_service(&NewService {
            route_id,
            operator_id,
            bus_type: tidy(&listing.bus_type),
            departure_time: tidy(&listing.departure_time),
            arrival_time: tidy(&listing.arrival_time),
            duration: tidy(&listing.duration),
            rating: listing.operator_rating,
        })
    }
}
