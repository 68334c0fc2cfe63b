use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use busline_core::{Booking, BookingRepository, ClaimState, SeatClaim, Trip};
use busline_feed::SnapshotCache;
use busline_store::app_config::BookingConfig;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::events::{SeatEvent, SeatEventKind};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Deadline used when a hold duration does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Serializes seat claims per trip.
///
/// Every transition for a trip runs under that trip's mutex; different
/// trips never contend. Only `Held` and `Confirmed` seats are tracked, a
/// seat with no entry is free.
#[derive(Clone)]
pub struct BookingCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    cache: SnapshotCache,
    repository: Arc<dyn BookingRepository>,
    trips: RwLock<HashMap<Uuid, SharedLedger>>,
    events: broadcast::Sender<SeatEvent>,
    persistence_timeout: Duration,
    next_token: AtomicU64,
    shutting_down: AtomicBool,
}

type SharedLedger = Arc<Mutex<TripLedger>>;

struct TripLedger {
    trip: Trip,
    seats: HashMap<u32, SeatEntry>,
    /// Set by `close_trip`; callers that cloned the ledger before removal
    /// see the trip as gone.
    closed: bool,
}

struct SeatEntry {
    claim: SeatClaim,
    /// Identifies one particular hold, so a stale timer can't release a
    /// later hold on the same seat.
    token: u64,
    /// Minted with the hold so every confirm attempt writes the same booking.
    booking_id: Uuid,
    deadline: Instant,
    timer: Option<AbortHandle>,
}

impl SeatEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl TripLedger {
    /// Drops a hold whose deadline has passed even if its timer has not run.
    fn expire_if_due(&mut self, seat_number: u32, now: Instant) -> Option<SeatClaim> {
        let due = self
            .seats
            .get(&seat_number)
            .is_some_and(|e| e.claim.state == ClaimState::Held && e.deadline <= now);
        if !due {
            return None;
        }
        self.seats.remove(&seat_number).map(|mut entry| {
            entry.cancel_timer();
            entry.claim.update_state(ClaimState::Released);
            entry.claim
        })
    }

    fn remove_hold(&mut self, seat_number: u32, token: u64) -> Option<SeatClaim> {
        let matches = self
            .seats
            .get(&seat_number)
            .is_some_and(|e| e.token == token && e.claim.state == ClaimState::Held);
        if !matches {
            return None;
        }
        self.seats.remove(&seat_number).map(|entry| {
            let mut claim = entry.claim;
            claim.update_state(ClaimState::Released);
            claim
        })
    }

    fn held_count(&self, now: Instant) -> usize {
        self.seats
            .values()
            .filter(|e| e.claim.state == ClaimState::Held && e.deadline > now)
            .count()
    }

    fn active_claims(&self, now: Instant) -> impl Iterator<Item = &SeatEntry> {
        self.seats
            .values()
            .filter(move |e| e.claim.state == ClaimState::Confirmed || e.deadline > now)
    }
}

impl BookingCoordinator {
    pub fn new(
        cache: SnapshotCache,
        repository: Arc<dyn BookingRepository>,
        config: &BookingConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                cache,
                repository,
                trips: RwLock::new(HashMap::new()),
                events,
                persistence_timeout: config.persistence_timeout(),
                next_token: AtomicU64::new(1),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatEvent> {
        self.inner.events.subscribe()
    }

    fn ensure_running(&self) -> Result<(), BookingError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(BookingError::ShuttingDown);
        }
        Ok(())
    }

    fn emit(&self, claim: &SeatClaim, kind: SeatEventKind) {
        // No subscribers is fine
        let _ = self.inner.events.send(SeatEvent::from_claim(claim, kind));
    }

    async fn ledger(&self, trip_id: Uuid) -> Result<SharedLedger, BookingError> {
        self.inner
            .trips
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .ok_or(BookingError::TripNotFound(trip_id))
    }

    async fn register(&self, trip: Trip) -> Trip {
        let shared = {
            let mut trips = self.inner.trips.write().await;
            trips
                .entry(trip.trip_id)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(TripLedger {
                        trip,
                        seats: HashMap::new(),
                        closed: false,
                    }))
                })
                .clone()
        };
        // The map lock is never held while waiting on a trip.
        let registered = shared.lock().await.trip.clone();
        registered
    }

    async fn persist<T, F>(&self, what: &str, op: F) -> Result<T, BookingError>
    where
        F: std::future::Future<Output = busline_core::RepoResult<T>>,
    {
        match timeout(self.inner.persistence_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(error = %e, "Failed to {}", what);
                Err(BookingError::PersistenceFailure(e.to_string()))
            }
            Err(_) => {
                error!(
                    timeout_ms = self.inner.persistence_timeout.as_millis() as u64,
                    "Timed out trying to {}",
                    what
                );
                Err(BookingError::PersistenceFailure(format!(
                    "timed out after {:?}",
                    self.inner.persistence_timeout
                )))
            }
        }
    }

    /// Opens a bookable trip on a vehicle present in the current snapshot.
    /// The snapshot's seat capacity becomes the trip's ceiling.
    pub async fn open_trip(&self, vehicle_id: &str) -> Result<Trip, BookingError> {
        self.ensure_running()?;
        let snapshot = self
            .inner
            .cache
            .current()
            .map_err(|_| BookingError::CacheNotReady)?;
        let vehicle = snapshot
            .vehicle(vehicle_id)
            .ok_or_else(|| BookingError::VehicleNotFound(vehicle_id.to_string()))?;

        let trip = Trip::new(vehicle.vehicle_id.clone(), vehicle.route_id, vehicle.seat_capacity);
        self.persist("save trip", self.inner.repository.save_trip(&trip))
            .await?;

        info!(
            trip_id = %trip.trip_id,
            vehicle_id = %trip.vehicle_id,
            total_seats = trip.total_seats,
            snapshot_version = snapshot.version(),
            "Trip opened"
        );
        Ok(self.register(trip).await)
    }

    /// Re-registers a trip opened before a restart, using the capacity
    /// recorded by persistence.
    pub async fn reopen_trip(&self, trip_id: Uuid, vehicle_id: &str) -> Result<Trip, BookingError> {
        self.ensure_running()?;
        if let Ok(ledger) = self.ledger(trip_id).await {
            return Ok(ledger.lock().await.trip.clone());
        }

        let total_seats = self
            .persist("load trip capacity", self.inner.repository.load_capacity(trip_id))
            .await?
            .ok_or(BookingError::TripNotFound(trip_id))?;
        let snapshot = self
            .inner
            .cache
            .current()
            .map_err(|_| BookingError::CacheNotReady)?;
        let vehicle = snapshot
            .vehicle(vehicle_id)
            .ok_or_else(|| BookingError::VehicleNotFound(vehicle_id.to_string()))?;

        let trip = Trip {
            trip_id,
            vehicle_id: vehicle.vehicle_id.clone(),
            route_id: vehicle.route_id,
            total_seats,
            opened_at: Utc::now(),
        };
        info!(trip_id = %trip_id, total_seats, "Trip reopened");
        Ok(self.register(trip).await)
    }

    pub async fn trip(&self, trip_id: Uuid) -> Option<Trip> {
        let ledger = self.ledger(trip_id).await.ok()?;
        let trip = ledger.lock().await.trip.clone();
        Some(trip)
    }

    /// Places a time-bounded hold on one seat. The hold is released
    /// automatically unless confirmed within `hold_duration`.
    pub async fn hold(
        &self,
        trip_id: Uuid,
        seat_number: u32,
        holder_id: &str,
        hold_duration: Duration,
    ) -> Result<SeatClaim, BookingError> {
        self.ensure_running()?;
        let shared = self.ledger(trip_id).await?;
        let mut ledger = shared.lock().await;
        // Shutdown may have swept this trip while we waited for the lock.
        self.ensure_running()?;
        if ledger.closed {
            return Err(BookingError::TripNotFound(trip_id));
        }

        if !ledger.trip.has_seat(seat_number) {
            return Err(BookingError::CapacityExceeded {
                seat_number,
                total_seats: ledger.trip.total_seats,
            });
        }

        let now = Instant::now();
        if let Some(expired) = ledger.expire_if_due(seat_number, now) {
            info!(trip_id = %trip_id, seat_number, holder_id = %expired.holder_id, "Hold expired");
            self.emit(&expired, SeatEventKind::Expired);
        }
        if ledger.seats.contains_key(&seat_number) {
            return Err(BookingError::SeatUnavailable { trip_id, seat_number });
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        let expires_at = chrono::Duration::from_std(hold_duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let deadline = now
            .checked_add(hold_duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let claim = SeatClaim::held(trip_id, seat_number, holder_id.to_string(), expires_at);
        let timer = self.schedule_expiry(shared.clone(), seat_number, token, deadline);

        ledger.seats.insert(
            seat_number,
            SeatEntry {
                claim: claim.clone(),
                token,
                booking_id: Uuid::new_v4(),
                deadline,
                timer: Some(timer),
            },
        );

        info!(trip_id = %trip_id, seat_number, holder_id, "Seat held");
        self.emit(&claim, SeatEventKind::Held);
        Ok(claim)
    }

    fn schedule_expiry(
        &self,
        ledger: SharedLedger,
        seat_number: u32,
        token: u64,
        deadline: Instant,
    ) -> AbortHandle {
        let events = self.inner.events.clone();
        tokio::spawn(async move {
            sleep_until(deadline).await;
            let mut ledger = ledger.lock().await;
            if let Some(claim) = ledger.remove_hold(seat_number, token) {
                info!(trip_id = %claim.trip_id, seat_number, holder_id = %claim.holder_id, "Hold expired");
                let _ = events.send(SeatEvent::from_claim(&claim, SeatEventKind::Expired));
            }
        })
        .abort_handle()
    }

    /// Makes the caller's hold durable. The trip stays locked for the
    /// persistence hand-off, bounded by the configured timeout; if it fails
    /// the claim is still `Held` and can be retried until it expires.
    pub async fn confirm(
        &self,
        trip_id: Uuid,
        seat_number: u32,
        holder_id: &str,
    ) -> Result<Booking, BookingError> {
        let not_held = BookingError::HoldExpiredOrNotFound { trip_id, seat_number };
        let shared = self.ledger(trip_id).await.map_err(|_| not_held.clone())?;
        let mut ledger = shared.lock().await;

        if let Some(expired) = ledger.expire_if_due(seat_number, Instant::now()) {
            info!(trip_id = %trip_id, seat_number, holder_id = %expired.holder_id, "Hold expired");
            self.emit(&expired, SeatEventKind::Expired);
        }

        let booking = match ledger.seats.get(&seat_number) {
            Some(entry)
                if entry.claim.state == ClaimState::Held && entry.claim.holder_id == holder_id =>
            {
                Booking::from_claim(entry.booking_id, &ledger.trip, &entry.claim)
            }
            _ => return Err(not_held),
        };

        if let Err(e) = self
            .persist("save booking", self.inner.repository.save(&booking))
            .await
        {
            warn!(trip_id = %trip_id, seat_number, holder_id, "Confirmation failed, seat stays held");
            return Err(e);
        }

        let entry = ledger.seats.get_mut(&seat_number).ok_or(not_held)?;
        entry.cancel_timer();
        entry.claim.update_state(ClaimState::Confirmed);
        let claim = entry.claim.clone();

        info!(trip_id = %trip_id, seat_number, holder_id, booking_id = %booking.booking_id, "Seat confirmed");
        self.emit(&claim, SeatEventKind::Confirmed);
        Ok(booking)
    }

    /// Gives up a hold. Idempotent: returns `false` when the caller holds
    /// nothing on that seat, including unknown trips and confirmed seats.
    pub async fn release(&self, trip_id: Uuid, seat_number: u32, holder_id: &str) -> bool {
        let Ok(shared) = self.ledger(trip_id).await else {
            return false;
        };
        let mut ledger = shared.lock().await;

        let is_callers_hold = ledger.seats.get(&seat_number).is_some_and(|e| {
            e.claim.state == ClaimState::Held && e.claim.holder_id == holder_id
        });
        if !is_callers_hold {
            return false;
        }

        let Some(mut entry) = ledger.seats.remove(&seat_number) else {
            return false;
        };
        entry.cancel_timer();
        entry.claim.update_state(ClaimState::Released);

        info!(trip_id = %trip_id, seat_number, holder_id, "Seat released");
        self.emit(&entry.claim, SeatEventKind::Released);
        true
    }

    /// The live claim on a seat, if any.
    pub async fn claim(&self, trip_id: Uuid, seat_number: u32) -> Option<SeatClaim> {
        let shared = self.ledger(trip_id).await.ok()?;
        let ledger = shared.lock().await;
        let now = Instant::now();
        let claim = ledger
            .active_claims(now)
            .find(|e| e.claim.seat_number == seat_number)
            .map(|e| e.claim.clone());
        claim
    }

    /// Seat numbers nobody holds or has booked, ascending.
    pub async fn available_seats(&self, trip_id: Uuid) -> Result<Vec<u32>, BookingError> {
        let shared = self.ledger(trip_id).await?;
        let ledger = shared.lock().await;
        let now = Instant::now();
        let taken: Vec<u32> = ledger.active_claims(now).map(|e| e.claim.seat_number).collect();

        Ok((1..=ledger.trip.total_seats)
            .filter(|seat| !taken.contains(seat))
            .collect())
    }

    /// Retires a trip once nobody is mid-booking on it. Confirmed seats stay
    /// in persistence; live holds make this fail with `TripHasActiveHolds`.
    pub async fn close_trip(&self, trip_id: Uuid) -> Result<(), BookingError> {
        let shared = self.ledger(trip_id).await?;
        let mut ledger = shared.lock().await;
        if ledger.closed {
            return Err(BookingError::TripNotFound(trip_id));
        }

        let now = Instant::now();
        let due: Vec<u32> = ledger
            .seats
            .iter()
            .filter(|(_, e)| e.claim.state == ClaimState::Held && e.deadline <= now)
            .map(|(seat, _)| *seat)
            .collect();
        for seat in due {
            if let Some(expired) = ledger.expire_if_due(seat, now) {
                self.emit(&expired, SeatEventKind::Expired);
            }
        }

        let held = ledger.held_count(now);
        if held > 0 {
            return Err(BookingError::TripHasActiveHolds { trip_id, held });
        }

        let confirmed = ledger.seats.len();
        ledger.closed = true;
        ledger.seats.clear();
        // Ledger before map: no path waits on a ledger while holding the map.
        self.inner.trips.write().await.remove(&trip_id);

        info!(trip_id = %trip_id, confirmed, "Trip closed");
        Ok(())
    }

    /// Number of trips currently accepting claims.
    pub async fn open_trip_count(&self) -> usize {
        self.inner.trips.read().await.len()
    }

    /// Stops accepting holds and releases every outstanding hold.
    /// Confirmed seats are untouched. Returns how many holds were released.
    pub async fn shutdown(&self) -> usize {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let ledgers: Vec<SharedLedger> = self.inner.trips.read().await.values().cloned().collect();

        let mut released = 0;
        for shared in ledgers {
            let mut ledger = shared.lock().await;
            let held: Vec<u32> = ledger
                .seats
                .iter()
                .filter(|(_, e)| e.claim.state == ClaimState::Held)
                .map(|(seat, _)| *seat)
                .collect();

            for seat in held {
                if let Some(mut entry) = ledger.seats.remove(&seat) {
                    entry.cancel_timer();
                    entry.claim.update_state(ClaimState::Released);
                    self.emit(&entry.claim, SeatEventKind::Released);
                    released += 1;
                }
            }
        }

        info!(released, "Booking coordinator shut down");
        released
    }
}
