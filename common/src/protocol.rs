use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{BucketKey, Camera, MissingInterval, MotionBucket, MotionInterval, SourceType};

// ============================================================================
// Lenient numbers
// ============================================================================

/// Largest epoch second that still converts to milliseconds without overflow.
const MAX_EPOCH_SECONDS: i64 = i64::MAX / 1000;

/// The server mixes numbers and numeric strings; falsy values (0, "", null) mean absent.
/// Values too large to express in epoch milliseconds are treated as absent too.
fn lenient_i64(value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    };
    parsed.filter(|v| *v != 0 && v.unsigned_abs() <= MAX_EPOCH_SECONDS as u64)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_i64(&value))
}

fn deserialize_offset_minutes<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_i64(&value).unwrap_or(0) as i32)
}

// ============================================================================
// Camera descriptor handed to the player at mount time
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCamera {
    pub name: String,
    pub cam_id: i64,
    #[serde(default)]
    pub primary_source: Option<String>,
    #[serde(default)]
    pub secondary_source: Option<String>,
    pub depth_user: u32,
    #[serde(rename = "realTime")]
    pub real_time: i64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub dvr_protected: Option<bool>,
    #[serde(default)]
    pub access: Option<bool>,
    #[serde(default)]
    pub video_codec: Option<String>,
    pub playback_config: PlaybackCredentials,
    pub server: ServerEndpoint,
    #[serde(rename = "objectData")]
    pub object_data: ObjectData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackCredentials {
    pub token: String,
    #[serde(rename = "dToken", default)]
    pub d_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub hostname: String,
    pub https_port: u16,
    pub http_port: u16,
    pub ssl: bool,
}

impl ServerEndpoint {
    pub fn base_url(&self) -> String {
        if self.ssl {
            format!("https://{}:{}", self.hostname, self.https_port)
        } else {
            format!("http://{}:{}", self.hostname, self.http_port)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectData {
    pub time_zone: TimeZoneInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeZoneInfo {
    #[serde(deserialize_with = "deserialize_offset_minutes")]
    pub offset_minutes: i32,
}

impl PlayerCamera {
    /// Build the session camera. `access` defaults to granted.
    pub fn to_camera(&self) -> Camera {
        Camera {
            name: self.name.clone(),
            host: self.server.base_url(),
            token: self.playback_config.token.clone(),
            d_token: self.playback_config.d_token.clone().unwrap_or_default(),
            src: String::new(),
            src_type: SourceType::Live,
            width: self.width.unwrap_or(0),
            height: self.height.unwrap_or(0),
            thumbnails: false,
            blocked: !self.access.unwrap_or(true),
            codec: self.video_codec.clone().unwrap_or_default(),
            dvr_depth: self.depth_user,
            real_time: self.real_time,
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.object_data.time_zone.offset_minutes
    }
}

// ============================================================================
// Archive metadata response
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CameraDataResponse {
    pub data: CameraData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraData {
    #[serde(rename = "archiveData", default)]
    pub archive_data: Option<ArchiveData>,
    #[serde(rename = "archiveBorderTop", default, deserialize_with = "deserialize_lenient")]
    pub archive_border_top: Option<i64>,
    #[serde(rename = "realTime", default, deserialize_with = "deserialize_lenient")]
    pub real_time: Option<i64>,
    #[serde(default)]
    pub server: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveData {
    #[serde(rename = "missingFragments", default)]
    pub missing_fragments: Vec<RawInterval>,
    #[serde(rename = "motionDetect", default)]
    pub motion_detect: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "minThumbnails", default)]
    pub min_thumbnails: Value,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawInterval {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub end: Option<i64>,
}

impl RawInterval {
    fn endpoints(&self) -> Option<(i64, i64)> {
        Some((self.start?, self.end?))
    }
}

/// Normalized result of one metadata fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub recorded_border: Option<i64>,
    pub server_real_time: i64,
    pub missing: Vec<MissingInterval>,
    pub motion: Vec<MotionBucket>,
    pub min_thumbnails_available: bool,
}

impl CameraDataResponse {
    /// `None` when the server returned no archive data at all.
    pub fn into_metadata(self, fallback_real_time: i64) -> Option<ArchiveMetadata> {
        let data = self.data;
        let archive = data.archive_data?;

        let missing = archive
            .missing_fragments
            .iter()
            .filter_map(RawInterval::endpoints)
            .map(|(start, end)| MissingInterval { start, end })
            .collect();

        let motion = archive
            .motion_detect
            .as_ref()
            .map(parse_motion_tree)
            .unwrap_or_default();

        Some(ArchiveMetadata {
            recorded_border: data.archive_border_top,
            server_real_time: data.real_time.unwrap_or(fallback_real_time),
            missing,
            motion,
            min_thumbnails_available: data
                .server
                .map(|s| is_truthy(&s.min_thumbnails))
                .unwrap_or(false),
        })
    }
}

/// Flatten the year → month → day → hour tree. Non-numeric keys and non-object levels are skipped.
pub fn parse_motion_tree(tree: &Value) -> Vec<MotionBucket> {
    let mut buckets = Vec::new();
    let Some(years) = tree.as_object() else {
        return buckets;
    };

    for (year, months) in years {
        let (Ok(year), Some(months)) = (year.parse::<i32>(), months.as_object()) else {
            continue;
        };
        for (month, days) in months {
            let (Ok(month), Some(days)) = (month.parse::<u32>(), days.as_object()) else {
                continue;
            };
            for (day, hours) in days {
                let (Ok(day), Some(hours)) = (day.parse::<u32>(), hours.as_object()) else {
                    continue;
                };
                for (hour, list) in hours {
                    let (Ok(hour), Some(list)) = (hour.parse::<u32>(), list.as_array()) else {
                        continue;
                    };
                    let intervals = list
                        .iter()
                        .filter_map(|item| serde_json::from_value::<RawInterval>(item.clone()).ok())
                        .filter_map(|raw| raw.endpoints())
                        .map(|(start, end)| MotionInterval { start, end })
                        .collect();
                    buckets.push(MotionBucket {
                        key: BucketKey { year, month, day, hour },
                        intervals,
                    });
                }
            }
        }
    }

    buckets.sort_by_key(|b| b.key);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_descriptor_conversion() {
        let json = r#"{
            "name": "cam-7",
            "cam_id": 7,
            "depth_user": 7,
            "realTime": 1000000,
            "video_codec": "h264",
            "access": true,
            "playback_config": { "token": "tok", "dToken": "dtok" },
            "server": { "hostname": "video.example", "https_port": 443, "http_port": 80, "ssl": true },
            "objectData": { "time_zone": { "offset_minutes": "180" } }
        }"#;

        let descriptor: PlayerCamera = serde_json::from_str(json).unwrap();
        let camera = descriptor.to_camera();

        assert_eq!(camera.host, "https://video.example:443");
        assert_eq!(camera.d_token, "dtok");
        assert_eq!(camera.dvr_depth, 7);
        assert!(!camera.blocked);
        assert_eq!(descriptor.offset_minutes(), 180);
    }

    #[test]
    fn test_camera_descriptor_requires_keys() {
        let json = r#"{ "name": "cam-7", "cam_id": 7 }"#;
        assert!(serde_json::from_str::<PlayerCamera>(json).is_err());
    }

    #[test]
    fn test_metadata_parsing() {
        let json = r#"{
            "data": {
                "archiveBorderTop": "500000",
                "server": { "minThumbnails": 1 },
                "archiveData": {
                    "missingFragments": [
                        { "start": "1000", "end": 2000 },
                        { "start": 0, "end": 3000 }
                    ],
                    "motionDetect": {
                        "2024": { "1": { "15": {
                            "10": [ { "start": 1705312800, "end": "1705312860" } ],
                            "9": [ { "start": 1705309200, "end": 1705309260 } ],
                            "11": null
                        } } }
                    }
                }
            }
        }"#;

        let response: CameraDataResponse = serde_json::from_str(json).unwrap();
        let metadata = response.into_metadata(999).unwrap();

        assert_eq!(metadata.recorded_border, Some(500_000));
        assert_eq!(metadata.server_real_time, 999);
        assert!(metadata.min_thumbnails_available);
        assert_eq!(metadata.missing, vec![MissingInterval { start: 1000, end: 2000 }]);
        assert_eq!(metadata.motion.len(), 2);
        assert_eq!(metadata.motion[0].key.hour, 9);
        assert_eq!(metadata.motion[1].intervals[0].end, 1_705_312_860);
    }

    #[test]
    fn test_oversized_numbers_are_dropped() {
        let json = r#"{
            "data": {
                "realTime": "1e30",
                "archiveData": {
                    "missingFragments": [
                        { "start": 1000, "end": 99999999999999999999 },
                        { "start": "9223372036854775807", "end": 2000 },
                        { "start": 1000, "end": 2000 }
                    ],
                    "motionDetect": {
                        "2024": { "1": { "15": {
                            "10": [ { "start": 1705312800, "end": "92233720368547758" } ]
                        } } }
                    }
                }
            }
        }"#;

        let response: CameraDataResponse = serde_json::from_str(json).unwrap();
        let metadata = response.into_metadata(42).unwrap();

        assert_eq!(metadata.server_real_time, 42);
        assert_eq!(metadata.missing, vec![MissingInterval { start: 1000, end: 2000 }]);
        assert!(metadata.motion[0].intervals.is_empty());
    }

    #[test]
    fn test_metadata_without_archive_data() {
        let response: CameraDataResponse = serde_json::from_str(r#"{ "data": {} }"#).unwrap();
        assert!(response.into_metadata(1).is_none());
    }

    #[test]
    fn test_empty_motion_array_is_tolerated() {
        let json = r#"{ "data": { "archiveData": { "missingFragments": [], "motionDetect": [] } } }"#;
        let response: CameraDataResponse = serde_json::from_str(json).unwrap();
        let metadata = response.into_metadata(1).unwrap();
        assert!(metadata.motion.is_empty());
    }
}
