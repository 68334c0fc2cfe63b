//! Live transit data cache: fetches provider data on a schedule, publishes
//! immutable snapshots and answers proximity and route queries against them.

pub mod error;
pub mod gtfs;
pub mod source;
pub mod normalize;
pub mod cache;
pub mod refresher;
pub mod geo_filter;
pub mod route_view;

pub use error::{FeedError, MalformedRecord};
pub use source::{parse_vehicle_positions, GtfsRtSource, RawFeed, TransitSource};
pub use normalize::{normalize, Normalized};
pub use cache::{CacheError, CacheStatus, SnapshotCache};
pub use refresher::{CycleOutcome, Refresher, RefresherHandle};
pub use geo_filter::{GeoError, GeoFilter, NearbyResult, NearbyVehicle};
pub use route_view::{RouteInfo, RouteView, RouteViewError, ServiceAlert, TripProgress};
