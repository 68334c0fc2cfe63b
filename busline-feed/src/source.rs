use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use busline_store::app_config::FeedConfig;
use reqwest::{Client, Response};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{FeedError, MalformedRecord};
use crate::gtfs::{read_static_archive, FeedEntity, FeedMessage, StaticGtfs};

/// Provider data as fetched, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawFeed {
    pub entities: Vec<FeedEntity>,
    /// `None` when the static schedule could not be loaded yet.
    pub static_gtfs: Option<Arc<StaticGtfs>>,
    /// Records the adapter itself could not read.
    pub skipped: Vec<MalformedRecord>,
}

/// Decodes a vehicle positions body. Only a body that is not a feed at all
/// is an error; entities that fail to decode land in `skipped`.
pub fn parse_vehicle_positions(body: &str) -> Result<RawFeed, FeedError> {
    let message: FeedMessage = serde_json::from_str(body)?;
    let (entities, skipped) = message.into_entities();
    Ok(RawFeed {
        entities,
        static_gtfs: None,
        skipped,
    })
}

/// The external transit data provider.
#[async_trait]
pub trait TransitSource: Send + Sync {
    async fn fetch(&self) -> Result<RawFeed, FeedError>;

    /// Realtime stop-time predictions. Sources without them report none.
    async fn trip_updates(&self) -> Result<Vec<FeedEntity>, FeedError> {
        Ok(Vec::new())
    }

    /// Active service alerts. Sources without them report none.
    async fn alerts(&self) -> Result<Vec<FeedEntity>, FeedError> {
        Ok(Vec::new())
    }
}

/// GTFS-realtime JSON feeds over HTTP, with the static GTFS archive for
/// route and stop names.
pub struct GtfsRtSource {
    client: Client,
    vehicle_positions_url: String,
    trip_updates_url: Option<String>,
    alerts_url: Option<String>,
    static_gtfs: Option<Arc<StaticLoader>>,
}

/// Holds the static archive once downloaded. The download is kept out of
/// `fetch` because it outlasts a refresh's fetch timeout.
struct StaticLoader {
    client: Client,
    url: String,
    timeout: Duration,
    cached: RwLock<Option<Arc<StaticGtfs>>>,
    loading: AtomicBool,
}

impl StaticLoader {
    async fn load(&self) -> Result<Arc<StaticGtfs>, FeedError> {
        let response = get(&self.client, &self.url, Some(self.timeout)).await?;
        let bytes = response.bytes().await?;
        debug!(kb = bytes.len() / 1024, "Static GTFS downloaded");

        let (gtfs, skipped) = read_static_archive(&bytes)?;
        for record in &skipped {
            warn!(record = %record, "Skipped static GTFS row");
        }
        info!(
            routes = gtfs.routes.len(),
            stops = gtfs.stops.len(),
            skipped = skipped.len(),
            "Static GTFS loaded"
        );

        let gtfs = Arc::new(gtfs);
        *self.cached.write().await = Some(gtfs.clone());
        Ok(gtfs)
    }

    /// The cached archive, starting one background download when missing.
    async fn current(loader: &Arc<Self>) -> Option<Arc<StaticGtfs>> {
        let cached = loader.cached.read().await.clone();
        if cached.is_none() && !loader.loading.swap(true, Ordering::SeqCst) {
            let loader = loader.clone();
            tokio::spawn(async move {
                if let Err(e) = loader.load().await {
                    warn!(error = %e, "Static GTFS unavailable, names will fall back to ids");
                }
                loader.loading.store(false, Ordering::SeqCst);
            });
        }
        cached
    }
}

async fn get(client: &Client, url: &str, timeout: Option<Duration>) -> Result<Response, FeedError> {
    let mut request = client.get(url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::SourceUnavailable(format!(
            "{} returned {}",
            url, status
        )));
    }
    Ok(response)
}

impl GtfsRtSource {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("busline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let static_gtfs = config.static_gtfs_url.as_ref().map(|url| {
            Arc::new(StaticLoader {
                client: client.clone(),
                url: url.clone(),
                timeout: config.static_timeout(),
                cached: RwLock::new(None),
                loading: AtomicBool::new(false),
            })
        });

        Ok(Self {
            client,
            vehicle_positions_url: config.vehicle_positions_url.clone(),
            trip_updates_url: config.trip_updates_url.clone(),
            alerts_url: config.alerts_url.clone(),
            static_gtfs,
        })
    }

    /// Downloads the static archive up front so the first snapshot already
    /// has route and stop names.
    pub async fn preload_static(&self) -> Result<(), FeedError> {
        match &self.static_gtfs {
            Some(loader) => loader.load().await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FeedError> {
        Ok(get(&self.client, url, None).await?.text().await?)
    }

    async fn fetch_entities(&self, url: &str, feed: &str) -> Result<Vec<FeedEntity>, FeedError> {
        let message: FeedMessage = serde_json::from_str(&self.get_text(url).await?)?;
        let (entities, skipped) = message.into_entities();
        for record in &skipped {
            warn!(feed, record = %record, "Skipped malformed entity");
        }
        debug!(feed, entities = entities.len(), "Feed fetched");
        Ok(entities)
    }
}

#[async_trait]
impl TransitSource for GtfsRtSource {
    async fn fetch(&self) -> Result<RawFeed, FeedError> {
        let body = self.get_text(&self.vehicle_positions_url).await?;
        let mut feed = parse_vehicle_positions(&body)?;
        debug!(
            entities = feed.entities.len(),
            skipped = feed.skipped.len(),
            "Vehicle positions fetched"
        );

        if let Some(loader) = &self.static_gtfs {
            feed.static_gtfs = StaticLoader::current(loader).await;
        }
        Ok(feed)
    }

    async fn trip_updates(&self) -> Result<Vec<FeedEntity>, FeedError> {
        match &self.trip_updates_url {
            Some(url) => self.fetch_entities(url, "trip_updates").await,
            None => Ok(Vec::new()),
        }
    }

    async fn alerts(&self) -> Result<Vec<FeedEntity>, FeedError> {
        match &self.alerts_url {
            Some(url) => self.fetch_entities(url, "alerts").await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_bad_entity_keeps_the_rest() {
        let body = r#"{"entity": [
            {"id": "ok", "vehicle": {
                "trip": {"route_id": "243"},
                "vehicle": {"id": "1101"},
                "position": {"latitude": 41.31, "longitude": -72.92},
                "timestamp": 1700000000
            }},
            {"id": "bad", "vehicle": {
                "trip": {"route_id": "243"},
                "vehicle": {"id": "1102"},
                "position": {"latitude": "41.30", "longitude": -72.93},
                "timestamp": "abc"
            }}
        ]}"#;
        let feed = parse_vehicle_positions(body).unwrap();

        assert_eq!(feed.entities.len(), 1);
        assert_eq!(feed.entities[0].id.as_deref(), Some("ok"));
        assert_eq!(feed.skipped.len(), 1);
        assert_eq!(feed.skipped[0].key, "bad");
    }

    #[test]
    fn test_non_feed_body_is_an_error() {
        assert!(matches!(parse_vehicle_positions("<html>"), Err(FeedError::Parse(_))));
        assert!(matches!(
            parse_vehicle_positions(r#"{"entity": 5}"#),
            Err(FeedError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_sources_without_realtime_extras_report_none() {
        struct PositionsOnly;

        #[async_trait]
        impl TransitSource for PositionsOnly {
            async fn fetch(&self) -> Result<RawFeed, FeedError> {
                Ok(RawFeed::default())
            }
        }

        assert!(PositionsOnly.trip_updates().await.unwrap().is_empty());
        assert!(PositionsOnly.alerts().await.unwrap().is_empty());
    }
}
