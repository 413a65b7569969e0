//! Walks a settled results page and turns listing cards into records.
//!
//! Extraction is isolated per listing: one malformed card becomes a
//! `ListingOutcome::Skipped` and the sequence keeps going. The page's markup
//! is not contractually stable, so nothing short of losing the whole page is
//! allowed to abort a scrape from here.

use tracing::warn;

use crate::browser::Element;
use crate::models::{ListingOutcome, ListingRecord, SeatFare};
use crate::scraper::cleaner::{parse_price, parse_rating, parse_seat_count, tidy};
use crate::scraper::navigator::ResultsPage;

pub const LISTING_SELECTOR: &str = ".bus-item";

const OPERATOR: &str = ".travels";
const BUS_TYPE: &str = ".bus-type";
const DEPARTURE: &str = ".dp-time";
const ARRIVAL: &str = ".bp-time";
const DURATION: &str = ".dur";
const RATING: &str = ".rating";
const STARTING_FARE: &str = ".fare";
const SEATS_LEFT: &str = ".seat-left";

const SEAT_ROW: &str = ".seat-type-fare";
const SEAT_CATEGORY: &str = ".seat-type";
const SEAT_FARE: &str = ".fare-details";
const SEAT_AVAILABLE: &str = ".available-seats";

/// Consume the page into a lazy sequence of per-listing outcomes. Finite and
/// not restartable — the page snapshot is moved in.
pub fn extract(page: ResultsPage) -> Listings {
    Listings {
        inner: page.into_listings().into_iter().enumerate(),
    }
}

pub struct Listings {
    inner: std::iter::Enumerate<std::vec::IntoIter<Box<dyn Element>>>,
}

impl Iterator for Listings {
    type Item = ListingOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, card) = self.inner.next()?;
        Some(match extract_listing(card.as_ref()) {
            Ok(record) => ListingOutcome::Extracted(record),
            Err(reason) => {
                warn!("listing {} skipped: {}", index, reason);
                ListingOutcome::Skipped { index, reason }
            }
        })
    }
}

fn first_text(el: &dyn Element, selector: &str) -> Option<String> {
    let text = tidy(&el.select_first(selector)?.text());
    (!text.is_empty()).then_some(text)
}

fn extract_listing(card: &dyn Element) -> Result<ListingRecord, String> {
    let operator_name =
        first_text(card, OPERATOR).ok_or_else(|| "missing operator name".to_string())?;
    let departure_time =
        first_text(card, DEPARTURE).ok_or_else(|| "missing departure time".to_string())?;

    let bus_type = first_text(card, BUS_TYPE).unwrap_or_else(|| "Unknown".to_string());
    let arrival_time = first_text(card, ARRIVAL).unwrap_or_default();
    let duration = first_text(card, DURATION).unwrap_or_default();
    let operator_rating = first_text(card, RATING).as_deref().and_then(parse_rating);
    let starting_price = first_text(card, STARTING_FARE)
        .as_deref()
        .and_then(parse_price)
        .filter(|p| *p > 0.0);

    let mut seat_fares = Vec::new();
    for row in card.select(SEAT_ROW) {
        let seat_category = first_text(row.as_ref(), SEAT_CATEGORY)
            .ok_or_else(|| "seat row without a category".to_string())?;
        let fare = first_text(row.as_ref(), SEAT_FARE)
            .as_deref()
            .and_then(parse_price)
            .filter(|f| *f > 0.0)
            .ok_or_else(|| format!("seat row {:?} without a numeric fare", seat_category))?;
        let available_seats = first_text(row.as_ref(), SEAT_AVAILABLE)
            .as_deref()
            .and_then(parse_seat_count)
            .unwrap_or(0);

        seat_fares.push(SeatFare {
            seat_category,
            fare,
            available_seats,
        });
    }

    // Cards without a seat-fare breakdown still show a card-level price;
    // record it as a single Standard tuple rather than losing the listing.
    if seat_fares.is_empty() {
        match starting_price {
            Some(fare) => seat_fares.push(SeatFare {
                seat_category: "Standard".to_string(),
                fare,
                available_seats: first_text(card, SEATS_LEFT)
                    .as_deref()
                    .and_then(parse_seat_count)
                    .unwrap_or(0),
            }),
            None => return Err("no seat fares and no starting price".to_string()),
        }
    }

    Ok(ListingRecord {
        operator_name,
        operator_rating,
        bus_type,
        departure_time,
        arrival_time,
        duration,
        starting_price,
        seat_fares,
    })
}
