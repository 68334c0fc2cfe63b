use busline_core::SeatClaim;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatEventKind {
    Held,
    Confirmed,
    Released,
    Expired,
}

/// Broadcast on every seat transition, for live seat maps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatEvent {
    pub trip_id: Uuid,
    pub seat_number: u32,
    pub holder_id: String,
    pub kind: SeatEventKind,
    pub at: i64,
}

impl SeatEvent {
    pub fn from_claim(claim: &SeatClaim, kind: SeatEventKind) -> Self {
        Self {
            trip_id: claim.trip_id,
            seat_number: claim.seat_number,
            holder_id: claim.holder_id.clone(),
            kind,
            at: Utc::now().timestamp(),
        }
    }
}
