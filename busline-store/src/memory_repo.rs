use async_trait::async_trait;
use busline_core::repository::{BookingRepository, RepoResult};
use busline_core::{Booking, Route, Trip};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local repository, used when no database is configured.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    trips: RwLock<HashMap<Uuid, Trip>>,
    routes: RwLock<HashMap<Uuid, Route>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bookings_for_trip(&self, trip_id: Uuid) -> Vec<Booking> {
        let mut list: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect();
        list.sort_by_key(|b| b.seat_number);
        list
    }

    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn save(&self, booking: &Booking) -> RepoResult<()> {
        let mut bookings = self.bookings.write().await;
        // Re-saving the same booking is a no-op, like ON CONFLICT (booking_id)
        if bookings.contains_key(&booking.booking_id) {
            return Ok(());
        }
        // Same uniqueness rule as the bookings table
        if bookings
            .values()
            .any(|b| b.trip_id == booking.trip_id && b.seat_number == booking.seat_number)
        {
            return Err(format!(
                "seat {} already booked on trip {}",
                booking.seat_number, booking.trip_id
            )
            .into());
        }
        bookings.insert(booking.booking_id, booking.clone());
        Ok(())
    }

    async fn save_trip(&self, trip: &Trip) -> RepoResult<()> {
        self.trips
            .write()
            .await
            .entry(trip.trip_id)
            .or_insert_with(|| trip.clone());
        Ok(())
    }

    async fn load_capacity(&self, trip_id: Uuid) -> RepoResult<Option<u32>> {
        Ok(self.trips.read().await.get(&trip_id).map(|t| t.total_seats))
    }

    async fn save_routes(&self, routes: &[Route]) -> RepoResult<()> {
        let mut stored = self.routes.write().await;
        for route in routes {
            stored.insert(route.id, route.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::SeatClaim;
    use chrono::Utc;

    #[tokio::test]
    async fn test_trip_capacity_round_trip() {
        let repo = InMemoryBookingRepository::new();
        let trip = Trip::new("1101".to_string(), Uuid::new_v4(), 40);

        assert_eq!(repo.load_capacity(trip.trip_id).await.unwrap(), None);
        repo.save_trip(&trip).await.unwrap();
        assert_eq!(repo.load_capacity(trip.trip_id).await.unwrap(), Some(40));
    }

    #[tokio::test]
    async fn test_duplicate_seat_rejected() {
        let repo = InMemoryBookingRepository::new();
        let trip = Trip::new("1101".to_string(), Uuid::new_v4(), 40);
        let claim = SeatClaim::held(trip.trip_id, 7, "u1".to_string(), Utc::now());

        repo.save(&Booking::from_claim(Uuid::new_v4(), &trip, &claim)).await.unwrap();
        assert!(repo.save(&Booking::from_claim(Uuid::new_v4(), &trip, &claim)).await.is_err());
        assert_eq!(repo.bookings_for_trip(trip.trip_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_resaving_same_booking_is_ok() {
        let repo = InMemoryBookingRepository::new();
        let trip = Trip::new("1101".to_string(), Uuid::new_v4(), 40);
        let claim = SeatClaim::held(trip.trip_id, 7, "u1".to_string(), Utc::now());
        let booking_id = Uuid::new_v4();

        repo.save(&Booking::from_claim(booking_id, &trip, &claim)).await.unwrap();
        repo.save(&Booking::from_claim(booking_id, &trip, &claim)).await.unwrap();

        let stored = repo.bookings_for_trip(trip.trip_id).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].booking_id, booking_id);
    }

    #[tokio::test]
    async fn test_routes_upsert() {
        let repo = InMemoryBookingRepository::new();
        repo.save_routes(&[Route::new("243", "Whalley"), Route::new("212", "Dixwell")])
            .await
            .unwrap();
        repo.save_routes(&[Route::new("243", "Whalley Ave")]).await.unwrap();
        assert_eq!(repo.route_count().await, 2);
    }
}
