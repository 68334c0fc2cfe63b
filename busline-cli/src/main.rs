use std::sync::Arc;

use anyhow::{bail, Context, Result};
use busline_booking::BookingCoordinator;
use busline_core::{BookingRepository, GeoPoint};
use busline_feed::{CycleOutcome, GeoFilter, GtfsRtSource, Refresher, RouteView, SnapshotCache};
use busline_store::app_config::Config;
use busline_store::{DbClient, InMemoryBookingRepository, PgBookingRepository};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;

/// Live bus positions and seat booking
#[derive(Parser, Debug)]
#[command(name = "busline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List buses near a location, nearest first
    Nearby(Location),
    /// Keep refreshing and reprint nearby buses on every update
    Watch(Location),
    /// Show the buses, stop predictions and alerts for one route
    Route {
        /// Route code as published by the provider (e.g. "243")
        code: String,
    },
    /// Hold and confirm a seat on a bus
    Book {
        /// Vehicle id from `nearby`
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        seat: u32,
        /// Name the booking is made under
        #[arg(long)]
        holder: String,
    },
    /// Show the state of the transit data cache
    Status,
}

#[derive(Args, Debug)]
struct Location {
    /// Latitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    /// Longitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,
    /// Search radius in miles [default: geo.default_radius_miles]
    #[arg(long)]
    radius: Option<f64>,
}

impl Location {
    fn origin(&self) -> Result<GeoPoint> {
        GeoPoint::new(self.lat, self.lon).context("Invalid location")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline=info,busline_feed=info,busline_booking=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load config")?;

    let source = Arc::new(GtfsRtSource::new(&config.feed).context("Failed to build feed client")?);
    if !matches!(cli.command, Command::Status) {
        if let Err(e) = source.preload_static().await {
            tracing::warn!(error = %e, "Static GTFS unavailable, names will fall back to ids");
        }
    }
    let cache = SnapshotCache::new(config.refresh.degraded_after);
    let refresher = Refresher::new(source.clone(), cache.clone(), config.refresh.clone())
        .with_fetch_timeout(config.feed.request_timeout())
        .with_default_seat_capacity(config.booking.default_seat_capacity);

    match cli.command {
        Command::Nearby(location) => {
            let origin = location.origin()?;
            let radius = location.radius.unwrap_or(config.geo.default_radius_miles);
            load_once(&refresher).await?;

            let snapshot = cache.current()?;
            let result = GeoFilter::new(cache.clone()).nearby_on(&snapshot, origin, radius)?;
            print!("{}", output::render_nearby(&result, &snapshot, radius));
        }
        Command::Watch(location) => {
            let origin = location.origin()?;
            let radius = location.radius.unwrap_or(config.geo.default_radius_miles);
            watch(refresher, cache, origin, radius).await?;
        }
        Command::Route { code } => {
            load_once(&refresher).await?;
            let info = RouteView::new(cache.clone(), source.clone())
                .route_info(&code)
                .await?;
            print!("{}", output::render_route(&info));
        }
        Command::Book {
            vehicle,
            seat,
            holder,
        } => {
            let repository = repository(&config).await?;
            let refresher = refresher.with_route_store(repository.clone());
            load_once(&refresher).await?;
            book(cache, repository, &config, &vehicle, seat, &holder).await?;
        }
        Command::Status => {
            let outcome = refresher.refresh_once().await;
            tracing::debug!(?outcome, "Refresh finished");
            println!("{}", output::render_status(&cache.status()));
        }
    }

    Ok(())
}

async fn load_once(refresher: &Refresher) -> Result<()> {
    match refresher.refresh_once().await {
        CycleOutcome::Published { .. } => Ok(()),
        CycleOutcome::Failed { attempts } => {
            bail!("Transit data unavailable after {} attempt(s)", attempts)
        }
        CycleOutcome::Cancelled => bail!("Refresh cancelled"),
    }
}

async fn repository(config: &Config) -> Result<Arc<dyn BookingRepository>> {
    match &config.database.url {
        Some(url) => {
            let db = DbClient::connect(url, &config.database)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Ok(Arc::new(PgBookingRepository::new(db.pool.clone())))
        }
        None => {
            tracing::info!("No database configured, bookings are kept in memory");
            Ok(Arc::new(InMemoryBookingRepository::new()))
        }
    }
}

async fn watch(refresher: Refresher, cache: SnapshotCache, origin: GeoPoint, radius: f64) -> Result<()> {
    let filter = GeoFilter::new(cache.clone());
    let mut updates = cache.subscribe();
    let mut health = cache.subscribe_health();
    let handle = refresher.spawn();

    loop {
        // Redraw on new data and when the data goes stale or recovers
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                health.borrow_and_update();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }

        let snapshot = updates.borrow_and_update().clone();
        let Some(snapshot) = snapshot else { continue };
        match filter.nearby_on(&snapshot, origin, radius) {
            Ok(result) => println!("{}", output::render_nearby(&result, &snapshot, radius)),
            Err(e) => tracing::warn!(error = %e, "Nearby query failed"),
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn book(
    cache: SnapshotCache,
    repository: Arc<dyn BookingRepository>,
    config: &Config,
    vehicle: &str,
    seat: u32,
    holder: &str,
) -> Result<()> {
    let coordinator = BookingCoordinator::new(cache, repository, &config.booking);
    let mut events = coordinator.subscribe();

    let trip = coordinator.open_trip(vehicle).await?;
    coordinator
        .hold(trip.trip_id, seat, holder, config.booking.hold_duration())
        .await?;

    let result = coordinator.confirm(trip.trip_id, seat, holder).await;
    while let Ok(event) = events.try_recv() {
        tracing::debug!("{}", output::render_event(&event));
    }

    // Release the hold if confirmation failed
    coordinator.shutdown().await;
    let booking = result?;
    println!("{}", output::render_booking(&booking));
    Ok(())
}
