use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("Seat {seat_number} on trip {trip_id} is already held or booked")]
    SeatUnavailable { trip_id: Uuid, seat_number: u32 },

    #[error("Seat {seat_number} is outside the trip's capacity of {total_seats}")]
    CapacityExceeded { seat_number: u32, total_seats: u32 },

    #[error("No active hold on seat {seat_number} of trip {trip_id} for this holder")]
    HoldExpiredOrNotFound { trip_id: Uuid, seat_number: u32 },

    #[error("Persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Trip {trip_id} still has {held} seat(s) on hold")]
    TripHasActiveHolds { trip_id: Uuid, held: usize },

    #[error("Vehicle not in current transit data: {0}")]
    VehicleNotFound(String),

    #[error("Transit data not loaded yet")]
    CacheNotReady,

    #[error("Booking coordinator is shutting down")]
    ShuttingDown,
}
