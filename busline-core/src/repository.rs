use async_trait::async_trait;
use uuid::Uuid;

use crate::booking::{Booking, Trip};
use crate::transit::Route;

pub type RepoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Durable storage for confirmed bookings, trip capacity and route metadata.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn save(&self, booking: &Booking) -> RepoResult<()>;

    async fn save_trip(&self, trip: &Trip) -> RepoResult<()>;

    /// Seat ceiling recorded for a trip, if the trip is known.
    async fn load_capacity(&self, trip_id: Uuid) -> RepoResult<Option<u32>>;

    async fn save_routes(&self, routes: &[Route]) -> RepoResult<()>;
}
