//! Tolerant field parsers for text lifted off the results page.
//!
//! Everything here returns `Option` — the page renders "N/A", stray
//! whitespace, currency glyphs and the odd truncated cell, and a single bad
//! field must never take down more than its own listing.

use chrono::NaiveDate;

/// Parse a fare or price: keep digits, dot and minus, drop the rest.
/// "₹ 1,234.50" → 1234.5 | "Rs. 800" → 800.0
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Parse an operator/service rating. Ratings render like "4.3" or
/// "4.3 (211 ratings)"; anything outside 0..=5 is treated as noise.
pub fn parse_rating(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" {
        return None;
    }
    let lead: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let rating: f64 = lead.parse().ok()?;
    (0.0..=5.0).contains(&rating).then_some(rating)
}

/// Parse a seat count out of text like "23 Seats available" or "1 seat left".
/// Takes the first run of digits.
pub fn parse_seat_count(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" {
        return None;
    }
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parse a journey date from CLI input or a batch-config file.
pub fn parse_journey_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d-%m-%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d %b %Y") {
        return Some(d);
    }

    None
}

/// Collapse runs of whitespace and trim. Display form of scraped text.
pub fn tidy(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity-key form: tidy + case-fold. Entity identity must not depend on
/// how the page happened to render whitespace or casing.
pub fn normalise_key(s: &str) -> String {
    tidy(s).to_lowercase()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
