use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};

/// 摄像头信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub host: String,
    pub token: String,
    pub d_token: String,
    /// Source URL currently handed to the streaming session
    pub src: String,
    pub src_type: SourceType,
    pub width: u32,
    pub height: u32,
    /// Server exposes hover thumbnails for this camera
    pub thumbnails: bool,
    /// Archive access is denied for the current user
    pub blocked: bool,
    pub codec: String,
    /// DVR retention depth in days
    pub dvr_depth: u32,
    /// Server's epoch second at the last data fetch
    pub real_time: i64,
}

impl Camera {
    /// H.265 archives cannot be played by any strategy, so metadata is never fetched for them.
    pub fn is_codec_supported(&self) -> bool {
        let codec = self.codec.to_lowercase();
        !(codec.contains("265") || codec.contains("hevc"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Live,
    Archive,
}

/// Live quality tiers offered by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    pub display: bool,
    pub list: Vec<String>,
    pub current: String,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            display: false,
            list: Vec::new(),
            current: "best".to_string(),
        }
    }
}

/// Closed interval in epoch milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(PlayerError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn length(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, instant: i64) -> bool {
        instant >= self.start && instant <= self.end
    }

    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        !(self.end < start || self.start > end)
    }

    pub fn clamp(&self, instant: i64) -> i64 {
        instant.max(self.start).min(self.end)
    }
}

/// Gap with no recording, epoch seconds as received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInterval {
    pub start: i64,
    pub end: i64,
}

impl MissingInterval {
    pub fn contains_millis(&self, instant: i64) -> bool {
        self.start != 0 && instant >= self.start.saturating_mul(1000) && instant <= self.end.saturating_mul(1000)
    }

    pub fn contains_second(&self, unix: i64) -> bool {
        unix >= self.start && unix <= self.end
    }
}

/// Raw motion-detection interval, epoch seconds. Source data may be inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionInterval {
    pub start: i64,
    pub end: i64,
}

impl MotionInterval {
    /// Milliseconds with inverted endpoints swapped.
    pub fn to_millis(&self) -> (i64, i64) {
        let (start, end) = (self.start.saturating_mul(1000), self.end.saturating_mul(1000));
        if end < start {
            (end, start)
        } else {
            (start, end)
        }
    }
}

/// UTC bucket of the motion index; derived `Ord` is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionBucket {
    pub key: BucketKey,
    pub intervals: Vec<MotionInterval>,
}

/// Timeline row a fragment is drawn in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FragmentGroup {
    Recorded = 1,
    Missing = 2,
    Motion = 3,
}

impl FragmentGroup {
    /// Parse the `data-group` attribute the timeline widget attaches to clicked elements.
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(Self::Recorded),
            "2" => Some(Self::Missing),
            "3" => Some(Self::Motion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentClass {
    #[serde(rename = "archive-fragment")]
    Archive,
    #[serde(rename = "non-processed-fragment")]
    NonProcessed,
    #[serde(rename = "missing-fragment")]
    Missing,
    #[serde(rename = "motion-fragment")]
    Motion,
}

impl FragmentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentClass::Archive => "archive-fragment",
            FragmentClass::NonProcessed => "non-processed-fragment",
            FragmentClass::Missing => "missing-fragment",
            FragmentClass::Motion => "motion-fragment",
        }
    }
}

/// Display-ready interval consumed by the timeline widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFragment {
    pub id: u64,
    pub class: FragmentClass,
    pub start: i64,
    pub end: i64,
    pub group: FragmentGroup,
}

/// Temporal state of one archive session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDate {
    /// Live edge, epoch ms
    pub live: i64,
    /// Recorded range start, epoch ms
    pub start: i64,
    /// Recorded range end, epoch ms
    pub end: i64,
    /// Epoch ms matching the video element's `currentTime == 0`
    pub last: i64,
    /// Authoritative playhead, epoch ms
    pub current: i64,
    /// Seconds into the hour to seek to on source (re)load
    pub load: u32,
    /// Local hour bucket of the loaded archive source
    pub hour: u32,
    /// Display UTC offset, minutes
    pub offset: i32,
    /// Segment clock correction, seconds
    pub server_offset: f64,
    /// Externally requested start time, consumed once
    pub url: Option<i64>,
}

impl ArchiveDate {
    pub fn range(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end.max(self.start),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Live,
    Archive,
}

impl Mode {
    pub fn is_live(&self) -> bool {
        matches!(self, Mode::Live)
    }
}

/// Sticky user-visible playback error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackErrorKind {
    /// Playback stalled, controls disabled
    Soft,
    /// Fully broken
    Hard,
}
