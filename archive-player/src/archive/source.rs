use common::{Camera, SourceType};
use serde::{Deserialize, Serialize};

use crate::clock::ClockModel;

/// Source the streaming session has to play
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRequest {
    pub kind: SourceType,
    pub url: String,
    /// Seconds into the loaded hour to start from; live sources start at the edge
    pub start_position: Option<u32>,
}

pub fn two_digits(value: u32) -> String {
    format!("{:02}", value)
}

pub fn live_url(camera: &Camera, quality: &str) -> String {
    format!(
        "{}/stream/{}/hls/{}/stream.m3u8?token={}",
        camera.host, camera.name, quality, camera.token
    )
}

/// Archive hour source for `unixtime` (ms) plus the seek offset into that hour.
pub fn archive_url(camera: &Camera, unixtime: i64) -> (String, u32) {
    let parts = ClockModel::utc_calendar(unixtime);
    let url = format!(
        "{}/stream/{}/archive/{}/{}/{}/{}/stream.m3u8?token={}",
        camera.host,
        camera.name,
        parts.year,
        two_digits(parts.month),
        two_digits(parts.day),
        two_digits(parts.hour),
        camera.token
    );
    (url, parts.minute * 60 + parts.second)
}

pub fn preview_url(camera: &Camera) -> String {
    format!("{}/cameras/{}/preview?token={}", camera.host, camera.name, camera.token)
}

/// Hover thumbnail near `instant` (ms)
pub fn thumbnail_url(camera: &Camera, instant: i64) -> String {
    format!(
        "{}/cameras/{}/min-preview/{}?token={}",
        camera.host,
        camera.name,
        (instant as f64 / 1000.0).round() as i64,
        camera.token
    )
}

/// Full-size still frame at `instant` (ms)
pub fn snapshot_url(camera: &Camera, instant: i64) -> String {
    format!("{}&time={}", preview_url(camera), instant.div_euclid(1000))
}

pub fn metadata_url(camera: &Camera) -> String {
    format!(
        "{}/ajax/cameras/{}?archiveData=1&token={}&dToken={}&groupingMt=true",
        camera.host, camera.name, camera.token, camera.d_token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera {
            name: "cam-7".to_string(),
            host: "https://video.example".to_string(),
            token: "tok".to_string(),
            d_token: "dtok".to_string(),
            ..Camera::default()
        }
    }

    #[test]
    fn test_live_url_format() {
        assert_eq!(
            live_url(&camera(), "best"),
            "https://video.example/stream/cam-7/hls/best/stream.m3u8?token=tok"
        );
    }

    #[test]
    fn test_archive_url_is_zero_padded() {
        // 2024-03-05 07:08:09 UTC
        let (url, load) = archive_url(&camera(), 1_709_622_489_000);
        assert_eq!(
            url,
            "https://video.example/stream/cam-7/archive/2024/03/05/07/stream.m3u8?token=tok"
        );
        assert_eq!(load, 8 * 60 + 9);
    }

    #[test]
    fn test_auxiliary_urls() {
        let camera = camera();
        assert_eq!(
            thumbnail_url(&camera, 1_709_622_489_600),
            "https://video.example/cameras/cam-7/min-preview/1709622490?token=tok"
        );
        assert_eq!(
            snapshot_url(&camera, 1_709_622_489_600),
            "https://video.example/cameras/cam-7/preview?token=tok&time=1709622489"
        );
        assert!(metadata_url(&camera).ends_with("archiveData=1&token=tok&dToken=dtok&groupingMt=true"));
    }
}
