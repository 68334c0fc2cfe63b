use async_trait::async_trait;
use busline_core::repository::{BookingRepository, RepoResult};
use busline_core::{Booking, Route, Trip};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn save(&self, booking: &Booking) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, trip_id, vehicle_id, route_id, seat_number, holder_id, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (booking_id) DO NOTHING
            "#,
        )
        .bind(booking.booking_id)
        .bind(booking.trip_id)
        .bind(&booking.vehicle_id)
        .bind(booking.route_id)
        .bind(i32::try_from(booking.seat_number)?)
        .bind(&booking.holder_id)
        .bind(booking.confirmed_at)
        .execute(&self.pool)
        .await?;

        debug!(booking_id = %booking.booking_id, "booking row inserted");
        Ok(())
    }

    async fn save_trip(&self, trip: &Trip) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trips (trip_id, vehicle_id, route_id, total_seats, opened_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (trip_id) DO NOTHING
            "#,
        )
        .bind(trip.trip_id)
        .bind(&trip.vehicle_id)
        .bind(trip.route_id)
        .bind(i32::try_from(trip.total_seats)?)
        .bind(trip.opened_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_capacity(&self, trip_id: Uuid) -> RepoResult<Option<u32>> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT total_seats FROM trips WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((seats,)) => Ok(Some(u32::try_from(seats)?)),
            None => Ok(None),
        }
    }

    async fn save_routes(&self, routes: &[Route]) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        for route in routes {
            sqlx::query(
                r#"
                INSERT INTO routes (id, external_code, display_name, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (id) DO UPDATE
                SET display_name = EXCLUDED.display_name, updated_at = now()
                "#,
            )
            .bind(route.id)
            .bind(&route.external_code)
            .bind(&route.display_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = routes.len(), "route metadata upserted");
        Ok(())
    }
}
