//! Time conversion between the video element clock, the archive timeline and the display offset.
//!
//! Every position computation in the player goes through [`ClockModel`], so raw wall-clock
//! values are never compared against archive timestamps directly.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Timelike, Utc};

/// Calendar fields of an instant in some offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl<Tz: TimeZone> From<&DateTime<Tz>> for CalendarFields {
    fn from(value: &DateTime<Tz>) -> Self {
        Self {
            year: value.year(),
            month: value.month(),
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockModel {
    offset_minutes: i32,
    server_offset: f64,
}

impl ClockModel {
    pub fn new(offset_minutes: i32, server_offset: f64) -> Self {
        Self {
            offset_minutes,
            server_offset,
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }

    pub fn server_offset(&self) -> f64 {
        self.server_offset
    }

    /// Absolute instant of a video-element position measured from `base_epoch_ms`.
    pub fn to_absolute(local_seconds: f64, base_epoch_ms: i64) -> i64 {
        base_epoch_ms + (local_seconds * 1000.0).round() as i64
    }

    fn fixed_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    fn utc(epoch_ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(epoch_ms).unwrap_or_default()
    }

    /// The instant seen through the display offset.
    pub fn with_offset(&self, epoch_ms: i64) -> DateTime<FixedOffset> {
        Self::utc(epoch_ms).with_timezone(&self.fixed_offset())
    }

    pub fn calendar(&self, epoch_ms: i64) -> CalendarFields {
        CalendarFields::from(&self.with_offset(epoch_ms))
    }

    pub fn utc_calendar(epoch_ms: i64) -> CalendarFields {
        CalendarFields::from(&Self::utc(epoch_ms))
    }

    pub fn local_hour(&self, epoch_ms: i64) -> u32 {
        self.with_offset(epoch_ms).hour()
    }

    fn from_local(&self, naive: NaiveDateTime, fallback: i64) -> i64 {
        self.fixed_offset()
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(fallback)
    }

    /// Server offset encoded as the trailing `-<number>` token of a segment name.
    ///
    /// `/archive/2024/01/15/10/segment-1705312800-1200.mt.ts?x=1` yields `1200.0`.
    /// Anything unparseable yields zero.
    pub fn derive_server_offset(segment_url: &str) -> f64 {
        let without_query = segment_url.split(['?', '#']).next().unwrap_or("");
        let stem = if let Some(index) = without_query.find(".mt.ts") {
            &without_query[..index]
        } else if let Some(index) = without_query.find(".ts") {
            &without_query[..index]
        } else {
            without_query
        };

        let file_name = stem.rsplit('/').next().unwrap_or("");
        let token = file_name.rsplit('-').next().unwrap_or("");
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// Playhead inside an hour-long archive source.
    ///
    /// The video element restarts at zero for every hour source, so its elapsed time plus the
    /// server offset is minutes and seconds into `hour_bucket`. Past 60 minutes the playhead
    /// moves into the next hour.
    pub fn archive_position(&self, current_ms: i64, hour_bucket: u32, elapsed_secs: f64) -> i64 {
        let local = self.with_offset(current_ms);
        let time = (elapsed_secs + self.server_offset).max(0.0);
        let minute = (time / 60.0).floor() as i64;
        let second = (time % 60.0).floor() as i64;
        let millis = i64::from(local.timestamp_subsec_millis());

        let Some(midnight) = local.date_naive().and_hms_opt(0, 0, 0) else {
            return current_ms;
        };

        let naive = if minute >= 60 {
            midnight
                + Duration::hours(i64::from(hour_bucket) + 1)
                + Duration::seconds(second)
                + Duration::milliseconds(millis)
        } else {
            midnight
                + Duration::hours(i64::from(local.hour()))
                + Duration::minutes(minute)
                + Duration::seconds(second)
                + Duration::milliseconds(millis)
        };

        self.from_local(naive, current_ms)
    }

    /// Start of the local hour following `epoch_ms`.
    pub fn start_of_next_hour(&self, epoch_ms: i64) -> i64 {
        let local = self.with_offset(epoch_ms);
        match local.date_naive().and_hms_opt(local.hour(), 0, 0) {
            Some(hour_start) => self.from_local(hour_start + Duration::hours(1), epoch_ms),
            None => epoch_ms,
        }
    }

    /// `target`'s local date combined with `reference`'s local time of day.
    pub fn with_time_of_day(&self, target_ms: i64, reference_ms: i64) -> i64 {
        let target = self.with_offset(target_ms);
        let reference = self.with_offset(reference_ms);
        match target
            .date_naive()
            .and_hms_milli_opt(
                reference.hour(),
                reference.minute(),
                reference.second(),
                target.timestamp_subsec_millis(),
            ) {
            Some(naive) => self.from_local(naive, target_ms),
            None => target_ms,
        }
    }
}
