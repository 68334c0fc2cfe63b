use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One bookable run of a vehicle with a fixed seat ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: Uuid,
    pub vehicle_id: String,
    pub route_id: Uuid,
    pub total_seats: u32,
    pub opened_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(vehicle_id: String, route_id: Uuid, total_seats: u32) -> Self {
        Self {
            trip_id: Uuid::new_v4(),
            vehicle_id,
            route_id,
            total_seats,
            opened_at: Utc::now(),
        }
    }

    /// Seats are numbered `1..=total_seats`.
    pub fn has_seat(&self, seat_number: u32) -> bool {
        (1..=self.total_seats).contains(&seat_number)
    }
}

/// Claim lifecycle: Held -> Confirmed, or Held -> Released.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimState {
    Held,
    Confirmed,
    Released,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatClaim {
    pub trip_id: Uuid,
    pub seat_number: u32,
    pub holder_id: String,
    pub state: ClaimState,
    pub held_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SeatClaim {
    pub fn held(
        trip_id: Uuid,
        seat_number: u32,
        holder_id: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            trip_id,
            seat_number,
            holder_id,
            state: ClaimState::Held,
            held_at: now,
            expires_at,
            updated_at: now,
        }
    }

    /// Whether the claim currently blocks the seat for anyone else.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            ClaimState::Confirmed => true,
            ClaimState::Held => self.expires_at > now,
            ClaimState::Released => false,
        }
    }

    pub fn update_state(&mut self, state: ClaimState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// The durable record handed to persistence when a hold is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub vehicle_id: String,
    pub route_id: Uuid,
    pub seat_number: u32,
    pub holder_id: String,
    pub confirmed_at: DateTime<Utc>,
}

impl Booking {
    /// `booking_id` is fixed when the seat is held, so a retried confirm
    /// writes the same record.
    pub fn from_claim(booking_id: Uuid, trip: &Trip, claim: &SeatClaim) -> Self {
        Self {
            booking_id,
            trip_id: trip.trip_id,
            vehicle_id: trip.vehicle_id.clone(),
            route_id: trip.route_id,
            seat_number: claim.seat_number,
            holder_id: claim.holder_id.clone(),
            confirmed_at: Utc::now(),
        }
    }
}
