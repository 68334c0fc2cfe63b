use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub vehicle_positions_url: String,
    pub static_gtfs_url: Option<String>, // GTFS zip with routes.txt and stops.txt
    pub trip_updates_url: Option<String>,
    pub alerts_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// The static archive is several megabytes.
    #[serde(default = "default_static_timeout")]
    pub static_timeout_secs: u64,
}

fn default_request_timeout() -> u64 { 10 }
fn default_static_timeout() -> u64 { 60 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            vehicle_positions_url: "https://cttprdtmgtfs.ctttrpcloud.com/TMGTFSRealTimeWebService/Vehicle/VehiclePositions.json".to_string(),
            static_gtfs_url: Some("https://www.cttransit.com/sites/default/files/gtfs/googlect_transit.zip".to_string()),
            trip_updates_url: Some("https://cttprdtmgtfs.ctttrpcloud.com/TMGTFSRealTimeWebService/TripUpdate/TripUpdates.json".to_string()),
            alerts_url: Some("https://cttprdtmgtfs.ctttrpcloud.com/TMGTFSRealTimeWebService/Alert/Alerts.json".to_string()),
            request_timeout_secs: default_request_timeout(),
            static_timeout_secs: default_static_timeout(),
        }
    }
}

impl FeedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn static_timeout(&self) -> Duration {
        Duration::from_secs(self.static_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed cycles before the cache is flagged degraded.
    pub degraded_after: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            degraded_after: 3,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Delay before retry number `attempt` (zero-based): doubles from the
    /// initial backoff and saturates at the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeoConfig {
    pub default_radius_miles: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self { default_radius_miles: 3.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BookingConfig {
    pub hold_seconds: u64,
    pub persistence_timeout_secs: u64,
    pub default_seat_capacity: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_seconds: 300,
            persistence_timeout_secs: 5,
            default_seat_capacity: 30,
        }
    }
}

impl BookingConfig {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_seconds)
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence_timeout_secs)
    }
}

/// Without a `url`, bookings live in process memory only.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_secs: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment specific overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BUSLINE__REFRESH__INTERVAL_SECS=15`
            .add_source(config::Environment::with_prefix("BUSLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let cfg = RefreshConfig::default();
        assert_eq!(cfg.backoff(0), Duration::from_millis(500));
        assert_eq!(cfg.backoff(1), Duration::from_millis(1_000));
        assert_eq!(cfg.backoff(3), Duration::from_millis(4_000));
        assert_eq!(cfg.backoff(4), Duration::from_millis(8_000));
        assert_eq!(cfg.backoff(63), Duration::from_millis(8_000));
        assert_eq!(cfg.backoff(200), Duration::from_millis(8_000));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [feed]
                vehicle_positions_url = "http://localhost/vp.json"

                [refresh]
                interval_secs = 15
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: Config = s.try_deserialize().unwrap();

        assert_eq!(cfg.feed.request_timeout_secs, 10);
        assert_eq!(cfg.feed.static_timeout_secs, 60);
        assert!(cfg.feed.static_gtfs_url.is_none());
        assert!(cfg.feed.alerts_url.is_none());
        assert_eq!(cfg.refresh.interval_secs, 15);
        assert_eq!(cfg.refresh.degraded_after, 3);
        assert_eq!(cfg.geo.default_radius_miles, 3.0);
        assert_eq!(cfg.booking.default_seat_capacity, 30);
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.database.max_connections, 5);
    }
}
