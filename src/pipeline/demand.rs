//! Demand scoring for fare observations.
//!
//! The score is a pluggable function of one fare tuple, not a fixed formula:
//! swap the model in `main` to experiment without touching the pipeline.

/// Scores one fare tuple. Returns a value in `[0, 1]` or None when the
/// inputs cannot be scored.
pub trait DemandModel: Send + Sync {
    fn score(&self, fare: f64, starting_price: Option<f64>, available_seats: i64) -> Option<f64>;
}

/// Seat-pressure model: `clamp(1 - available_seats / capacity, 0, 1)`.
///
/// A sold-out bus scores 1.0, a bus with `capacity` or more seats left
/// scores 0.0. `capacity` is the assumed sellable seat count per bus
/// (`pipeline.seat_capacity`, default 40). Fare and starting price are
/// accepted but unused by this model.
pub struct SeatPressureModel {
    capacity: f64,
}

impl SeatPressureModel {
    pub fn new(capacity: f64) -> Self {
        Self { capacity }
    }
}

impl DemandModel for SeatPressureModel {
    fn score(&self, _fare: f64, _starting_price: Option<f64>, available_seats: i64) -> Option<f64> {
        (self.capacity > 0.0)
            .then(|| (1.0 - available_seats as f64 / self.capacity).clamp(0.0, 1.0))
    }
}
