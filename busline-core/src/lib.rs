pub mod geo;
pub mod transit;
pub mod booking;
pub mod repository;

pub use geo::GeoPoint;
pub use transit::{Route, Snapshot, Stop, VehiclePosition};
pub use booking::{Booking, ClaimState, SeatClaim, Trip};
pub use repository::{BookingRepository, RepoResult};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
