//! Wire schemas for the provider's GTFS-realtime JSON feeds and the static
//! GTFS archive (`routes.txt`, `stops.txt`).
//!
//! Every field is optional here; deciding what a usable record looks like
//! is the normalizer's job.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use busline_core::Stop;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{FeedError, MalformedRecord};

/// Entities stay as raw JSON until [`FeedMessage::into_entities`], so one
/// record with a bad field does not reject the whole feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedMessage {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub entity: Vec<Value>,
}

impl FeedMessage {
    pub fn into_entities(self) -> (Vec<FeedEntity>, Vec<MalformedRecord>) {
        let mut entities = Vec::with_capacity(self.entity.len());
        let mut skipped = Vec::new();
        for (idx, value) in self.entity.into_iter().enumerate() {
            let key = entity_key(&value, idx);
            match serde_json::from_value::<FeedEntity>(value) {
                Ok(entity) => entities.push(entity),
                Err(e) => skipped.push(MalformedRecord::new(key, e.to_string())),
            }
        }
        (entities, skipped)
    }
}

fn entity_key(value: &Value, idx: usize) -> String {
    match value.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => format!("entity#{}", idx),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEntity {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, alias = "isDeleted")]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub vehicle: Option<VehiclePositionRecord>,
    #[serde(default, alias = "tripUpdate")]
    pub trip_update: Option<TripUpdateRecord>,
    #[serde(default)]
    pub alert: Option<AlertRecord>,
}

impl FeedEntity {
    pub fn is_deleted(&self) -> bool {
        self.is_deleted == Some(true)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehiclePositionRecord {
    #[serde(default)]
    pub trip: Option<TripDescriptor>,
    #[serde(default)]
    pub vehicle: Option<VehicleDescriptor>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub timestamp: Option<u64>,
    #[serde(default, alias = "stopId", deserialize_with = "lenient_string")]
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripDescriptor {
    #[serde(default, alias = "tripId", deserialize_with = "lenient_string")]
    pub trip_id: Option<String>,
    #[serde(default, alias = "routeId", deserialize_with = "lenient_string")]
    pub route_id: Option<String>,
    #[serde(default, alias = "startTime")]
    pub start_time: Option<String>,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(default, alias = "scheduleRelationship", deserialize_with = "lenient_string")]
    pub schedule_relationship: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleDescriptor {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: Option<String>,
    /// Non-standard extension some agencies publish.
    #[serde(default, alias = "seatCapacity", deserialize_with = "lenient_u64")]
    pub seat_capacity: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripUpdateRecord {
    #[serde(default)]
    pub trip: Option<TripDescriptor>,
    #[serde(default)]
    pub vehicle: Option<VehicleDescriptor>,
    #[serde(default, alias = "stopTimeUpdate", deserialize_with = "nullable_vec")]
    pub stop_time_update: Vec<StopTimeUpdateRecord>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopTimeUpdateRecord {
    #[serde(default, alias = "stopSequence", deserialize_with = "lenient_u64")]
    pub stop_sequence: Option<u64>,
    #[serde(default, alias = "stopId", deserialize_with = "lenient_string")]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub arrival: Option<StopTimeEvent>,
    #[serde(default)]
    pub departure: Option<StopTimeEvent>,
    #[serde(default, alias = "scheduleRelationship", deserialize_with = "lenient_string")]
    pub schedule_relationship: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopTimeEvent {
    /// Seconds relative to the schedule, negative when early.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub delay: Option<i64>,
    /// POSIX seconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertRecord {
    #[serde(default, alias = "activePeriod", deserialize_with = "nullable_vec")]
    pub active_period: Vec<TimeRange>,
    #[serde(default, alias = "informedEntity", deserialize_with = "nullable_vec")]
    pub informed_entity: Vec<EntitySelector>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cause: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub effect: Option<String>,
    #[serde(default, alias = "severityLevel", deserialize_with = "lenient_string")]
    pub severity_level: Option<String>,
    #[serde(default, alias = "headerText")]
    pub header_text: Option<TranslatedString>,
    #[serde(default, alias = "descriptionText")]
    pub description_text: Option<TranslatedString>,
}

impl AlertRecord {
    pub fn affects_route(&self, route_code: &str) -> bool {
        self.informed_entity
            .iter()
            .any(|e| e.route_id.as_deref() == Some(route_code))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeRange {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitySelector {
    #[serde(default, alias = "routeId", deserialize_with = "lenient_string")]
    pub route_id: Option<String>,
    #[serde(default, alias = "stopId", deserialize_with = "lenient_string")]
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslatedString {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub translation: Vec<Translation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl TranslatedString {
    /// English text when tagged, otherwise the first non-empty translation.
    pub fn text(&self) -> Option<&str> {
        let non_empty = |t: &&Translation| t.text.as_deref().is_some_and(|s| !s.trim().is_empty());
        self.translation
            .iter()
            .filter(non_empty)
            .find(|t| t.language.as_deref().is_some_and(|l| l.starts_with("en")))
            .or_else(|| self.translation.iter().find(non_empty))
            .and_then(|t| t.text.as_deref())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
}

/// Protobuf-to-JSON encoders emit 64-bit integers as strings.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Uint(n)) => Ok(Some(n)),
        Some(NumOrString::Int(n)) => u64::try_from(n).map(Some).map_err(serde::de::Error::custom),
        Some(NumOrString::Float(n)) => Err(serde::de::Error::custom(format!("expected integer, got {}", n))),
        Some(NumOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(NumOrString::Str(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Int(n)) => Ok(Some(n)),
        Some(NumOrString::Uint(n)) => i64::try_from(n).map(Some).map_err(serde::de::Error::custom),
        Some(NumOrString::Float(n)) => Err(serde::de::Error::custom(format!("expected integer, got {}", n))),
        Some(NumOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(NumOrString::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Ids and enum values arrive as strings or numbers depending on the encoder.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<NumOrString>::deserialize(deserializer)? {
        None => None,
        Some(NumOrString::Int(n)) => Some(n.to_string()),
        Some(NumOrString::Uint(n)) => Some(n.to_string()),
        Some(NumOrString::Float(n)) => Some(n.to_string()),
        Some(NumOrString::Str(s)) => Some(s),
    })
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One row of `routes.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub route_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

impl RouteRecord {
    pub fn display_name(&self) -> String {
        match (&self.short_name, &self.long_name) {
            (Some(short), Some(long)) => format!("{} - {}", short, long),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.route_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: Option<String>,
    route_short_name: Option<String>,
    route_long_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: Option<String>,
    stop_name: Option<String>,
    stop_lat: Option<String>,
    stop_lon: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn table_reader(body: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.trim_start_matches('\u{feff}').as_bytes())
}

fn row_key(table: &str, position: Option<&csv::Position>) -> String {
    match position {
        Some(pos) => format!("{}:{}", table, pos.line()),
        None => table.to_string(),
    }
}

/// Reads a GTFS table row by row. Rows that cannot be read are returned
/// beside the good ones instead of failing the whole table.
fn read_table<Row, T>(
    table: &str,
    body: &str,
    required: &str,
    mut convert: impl FnMut(Row) -> Result<T, &'static str>,
) -> (Vec<T>, Vec<MalformedRecord>)
where
    Row: serde::de::DeserializeOwned,
{
    let mut reader = table_reader(body);
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => return (Vec::new(), vec![MalformedRecord::new(table, e.to_string())]),
    };
    if !headers.iter().any(|h| h == required) {
        return (
            Vec::new(),
            vec![MalformedRecord::new(table, format!("missing {} column", required))],
        );
    }

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                skipped.push(MalformedRecord::new(row_key(table, e.position()), e.to_string()));
                continue;
            }
        };
        let key = || row_key(table, row.position());
        match row.deserialize::<Row>(Some(&headers)) {
            Ok(parsed) => match convert(parsed) {
                Ok(record) => records.push(record),
                Err(reason) => skipped.push(MalformedRecord::new(key(), reason)),
            },
            Err(e) => skipped.push(MalformedRecord::new(key(), e.to_string())),
        }
    }
    (records, skipped)
}

pub fn parse_routes_txt(body: &str) -> (Vec<RouteRecord>, Vec<MalformedRecord>) {
    read_table("routes.txt", body, "route_id", |row: RouteRow| {
        let route_id = non_empty(row.route_id).ok_or("empty route_id")?;
        Ok(RouteRecord {
            route_id,
            short_name: non_empty(row.route_short_name),
            long_name: non_empty(row.route_long_name),
        })
    })
}

/// Stops without a name are labelled with their id; unreadable
/// coordinates are dropped rather than the stop.
pub fn parse_stops_txt(body: &str) -> (Vec<Stop>, Vec<MalformedRecord>) {
    let coordinate = |v: Option<String>| v.and_then(|v| v.parse::<f64>().ok()).filter(|c| c.is_finite());
    read_table("stops.txt", body, "stop_id", |row: StopRow| {
        let stop_id = non_empty(row.stop_id).ok_or("empty stop_id")?;
        Ok(Stop {
            name: non_empty(row.stop_name).unwrap_or_else(|| stop_id.clone()),
            latitude: coordinate(row.stop_lat),
            longitude: coordinate(row.stop_lon),
            stop_id,
        })
    })
}

/// Route and stop tables loaded from the static GTFS archive.
#[derive(Debug, Clone, Default)]
pub struct StaticGtfs {
    pub routes: Vec<RouteRecord>,
    pub stops: Arc<HashMap<String, Stop>>,
}

/// Reads `routes.txt` and, when present, `stops.txt` out of a GTFS zip.
pub fn read_static_archive(bytes: &[u8]) -> Result<(StaticGtfs, Vec<MalformedRecord>), FeedError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| FeedError::Archive(e.to_string()))?;

    let routes_body = read_entry(&mut archive, "routes.txt")?
        .ok_or_else(|| FeedError::Archive("routes.txt not found".to_string()))?;
    let (routes, mut skipped) = parse_routes_txt(&routes_body);

    let stops = match read_entry(&mut archive, "stops.txt")? {
        Some(body) => {
            let (stops, bad) = parse_stops_txt(&body);
            skipped.extend(bad);
            stops.into_iter().map(|s| (s.stop_id.clone(), s)).collect()
        }
        None => HashMap::new(),
    };

    Ok((
        StaticGtfs {
            routes,
            stops: Arc::new(stops),
        },
        skipped,
    ))
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, FeedError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(FeedError::Archive(format!("{}: {}", name, e))),
    };
    let mut body = String::new();
    file.read_to_string(&mut body)
        .map_err(|e| FeedError::Archive(format!("{}: {}", name, e)))?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, body) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_feed_message_accepts_string_timestamps() {
        let json = r#"{
            "header": {"gtfs_realtime_version": "2.0"},
            "entity": [
                {"id": "1", "vehicle": {
                    "trip": {"trip_id": "T1", "route_id": "243"},
                    "vehicle": {"id": "v-1101", "label": "1101"},
                    "position": {"latitude": 41.31, "longitude": -72.92, "speed": 8.5},
                    "timestamp": "1700000000",
                    "stop_id": "S9"
                }},
                {"id": "2", "isDeleted": true},
                {"id": 3, "vehicle": {"trip": {"routeId": 212}, "timestamp": 1700000100}}
            ]
        }"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();
        let (entities, skipped) = msg.into_entities();

        assert!(skipped.is_empty());
        assert_eq!(entities.len(), 3);
        let v = entities[0].vehicle.as_ref().unwrap();
        assert_eq!(v.timestamp, Some(1_700_000_000));
        assert_eq!(v.vehicle.as_ref().unwrap().label.as_deref(), Some("1101"));
        assert!(entities[1].is_deleted());
        assert_eq!(entities[2].id.as_deref(), Some("3"));
        let third = entities[2].vehicle.as_ref().unwrap();
        assert_eq!(third.trip.as_ref().unwrap().route_id.as_deref(), Some("212"));
        assert_eq!(third.timestamp, Some(1_700_000_100));
    }

    #[test]
    fn test_bad_entity_is_isolated() {
        let json = r#"{"entity": [
            {"id": "good", "vehicle": {"position": {"latitude": 41.3, "longitude": -72.9}}},
            {"id": "bad", "vehicle": {"position": {"latitude": "41.30", "longitude": -72.9}}},
            {"vehicle": {"timestamp": "abc"}}
        ]}"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();
        let (entities, skipped) = msg.into_entities();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id.as_deref(), Some("good"));
        let keys: Vec<_> = skipped.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["bad", "entity#2"]);
    }

    #[test]
    fn test_null_entity_list() {
        let msg: FeedMessage = serde_json::from_str(r#"{"entity": null}"#).unwrap();
        assert!(msg.into_entities().0.is_empty());
    }

    #[test]
    fn test_trip_update_schema() {
        let json = r#"{"id": "tu-1", "trip_update": {
            "trip": {"trip_id": "T77", "route_id": "243", "start_time": "08:15:00",
                     "start_date": "20241002", "schedule_relationship": "SCHEDULED"},
            "vehicle": {"id": "1101"},
            "stop_time_update": [
                {"stop_sequence": 4, "stop_id": "10021", "arrival": {"time": "1700000400", "delay": -30}},
                {"stopSequence": 5, "stopId": 10022, "departure": {"time": 1700000500},
                 "scheduleRelationship": 1}
            ]
        }}"#;
        let entity: FeedEntity = serde_json::from_str(json).unwrap();
        let update = entity.trip_update.unwrap();

        let trip = update.trip.unwrap();
        assert_eq!(trip.start_time.as_deref(), Some("08:15:00"));
        assert_eq!(trip.schedule_relationship.as_deref(), Some("SCHEDULED"));
        assert_eq!(update.stop_time_update.len(), 2);
        let first = &update.stop_time_update[0];
        assert_eq!(first.arrival.as_ref().unwrap().time, Some(1_700_000_400));
        assert_eq!(first.arrival.as_ref().unwrap().delay, Some(-30));
        let second = &update.stop_time_update[1];
        assert_eq!(second.stop_id.as_deref(), Some("10022"));
        assert_eq!(second.schedule_relationship.as_deref(), Some("1"));
    }

    #[test]
    fn test_alert_schema() {
        let json = r#"{"id": "a-1", "alert": {
            "active_period": [{"start": "1700000000"}],
            "informed_entity": [{"agency_id": "CT"}, {"route_id": "243"}],
            "effect": "DETOUR",
            "header_text": {"translation": [
                {"text": "", "language": "es"},
                {"text": "Detour on Whalley Ave", "language": "en"}
            ]},
            "description_text": {"translation": [{"text": "Use Goffe St"}]}
        }}"#;
        let entity: FeedEntity = serde_json::from_str(json).unwrap();
        let alert = entity.alert.unwrap();

        assert!(alert.affects_route("243"));
        assert!(!alert.affects_route("212"));
        assert_eq!(alert.effect.as_deref(), Some("DETOUR"));
        assert_eq!(alert.active_period[0].start, Some(1_700_000_000));
        assert_eq!(alert.header_text.unwrap().text(), Some("Detour on Whalley Ave"));
        assert_eq!(alert.description_text.unwrap().text(), Some("Use Goffe St"));
    }

    #[test]
    fn test_parse_routes_txt() {
        let body = "\u{feff}route_id,agency_id,route_short_name,route_long_name,route_type\r\n\
                    243,CT,243,\"Whalley Ave, Westville\",3\r\n\
                    212,CT,212,,3\r\n\
                    ,CT,999,Ghost,3\r\n";
        let (records, skipped) = parse_routes_txt(body);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_name(), "243 - Whalley Ave, Westville");
        assert_eq!(records[1].display_name(), "212");
        assert_eq!(skipped, vec![MalformedRecord::new("routes.txt:4", "empty route_id")]);
    }

    #[test]
    fn test_parse_routes_txt_without_id_column() {
        let (records, skipped) = parse_routes_txt("route_short_name\nA\n");
        assert!(records.is_empty());
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn test_parse_stops_txt() {
        let body = "stop_id,stop_code,stop_name,stop_desc,stop_lat,stop_lon\n\
                    10021,21,\"Chapel St & Church St\",,41.306,-72.926\n\
                    10022,22,,,bad,-72.93\n\
                    ,23,Nowhere,,41.0,-72.0\n";
        let (stops, skipped) = parse_stops_txt(body);

        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].name, "Chapel St & Church St");
        assert_eq!(stops[0].latitude, Some(41.306));
        assert_eq!(stops[1].name, "10022");
        assert_eq!(stops[1].latitude, None);
        assert_eq!(skipped, vec![MalformedRecord::new("stops.txt:4", "empty stop_id")]);
    }

    #[test]
    fn test_read_static_archive() {
        let bytes = archive(&[
            ("agency.txt", "agency_id,agency_name\nCT,CTtransit\n"),
            ("routes.txt", "route_id,route_short_name,route_long_name\n243,243,Whalley Ave\n"),
            ("stops.txt", "stop_id,stop_name,stop_lat,stop_lon\n10021,Chapel St,41.306,-72.926\n"),
        ]);
        let (gtfs, skipped) = read_static_archive(&bytes).unwrap();

        assert!(skipped.is_empty());
        assert_eq!(gtfs.routes[0].display_name(), "243 - Whalley Ave");
        assert_eq!(gtfs.stops["10021"].name, "Chapel St");
    }

    #[test]
    fn test_static_archive_needs_routes() {
        let bytes = archive(&[("stops.txt", "stop_id,stop_name\n1,A\n")]);
        assert!(matches!(read_static_archive(&bytes), Err(FeedError::Archive(_))));

        let (gtfs, _) = read_static_archive(&archive(&[("routes.txt", "route_id\n243\n")])).unwrap();
        assert!(gtfs.stops.is_empty());

        assert!(matches!(read_static_archive(b"not a zip"), Err(FeedError::Archive(_))));
    }
}
