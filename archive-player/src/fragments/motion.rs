use common::{BucketKey, MotionBucket, MotionInterval, TimeWindow};

use crate::clock::ClockModel;

/// Window-length thresholds that scale the motion join distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinThresholds {
    /// At or below this length nothing is joined
    pub start: i64,
    /// At or above this length the distance is capped at `max`
    pub end: i64,
    pub max: i64,
    pub divisor: i64,
}

impl Default for JoinThresholds {
    fn default() -> Self {
        Self {
            start: 10_000_000,
            end: 63_000_000,
            max: 400_000,
            divisor: 100,
        }
    }
}

impl JoinThresholds {
    /// Maximum gap (ms) that still merges two motion intervals for a window of `length` ms.
    pub fn join_distance(&self, length: i64) -> i64 {
        if length <= self.start {
            0
        } else if length >= self.end {
            self.max
        } else {
            length / self.divisor.max(1)
        }
    }
}

/// Hour buckets of motion intervals, sorted chronologically by UTC key
#[derive(Debug, Clone, Default)]
pub struct MotionIndex {
    buckets: Vec<MotionBucket>,
}

impl MotionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_key(epoch_ms: i64) -> BucketKey {
        let fields = ClockModel::utc_calendar(epoch_ms);
        BucketKey {
            year: fields.year,
            month: fields.month,
            day: fields.day,
            hour: fields.hour,
        }
    }

    /// Insert a bucket, replacing any bucket with the same key.
    pub fn insert(&mut self, bucket: MotionBucket) {
        match self.buckets.binary_search_by_key(&bucket.key, |b| b.key) {
            Ok(index) => self.buckets[index] = bucket,
            Err(index) => self.buckets.insert(index, bucket),
        }
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Buckets whose hour overlaps `window`, in chronological order.
    pub fn buckets_in(&self, window: TimeWindow) -> &[MotionBucket] {
        let first = Self::bucket_key(window.start);
        let last = Self::bucket_key(window.end);
        let from = self.buckets.partition_point(|b| b.key < first);
        let to = self.buckets.partition_point(|b| b.key <= last);
        &self.buckets[from..to.max(from)]
    }

    pub fn query(&self, window: TimeWindow) -> impl Iterator<Item = &MotionInterval> {
        self.buckets_in(window)
            .iter()
            .flat_map(|bucket| bucket.intervals.iter())
    }
}

/// Clip raw intervals to `main`, keep those touching `visible` and join neighbours.
///
/// Input order is trusted. An interval ending before the current merged interval ends is
/// dropped instead of being sorted in.
pub fn merge_motion<'a, I>(intervals: I, main: TimeWindow, visible: TimeWindow, join: i64) -> Vec<(i64, i64)>
where
    I: IntoIterator<Item = &'a MotionInterval>,
{
    let mut merged: Vec<(i64, i64)> = Vec::new();

    for interval in intervals {
        let (mut start, mut end) = interval.to_millis();
        if start < main.start {
            start = main.start;
        }
        if end > main.end {
            end = main.end;
        }

        if !visible.overlaps(start, end) {
            continue;
        }

        let Some(last) = merged.last_mut() else {
            merged.push((start, end));
            continue;
        };

        let difference = end - last.1;
        if difference < 0 {
            continue;
        }
        if difference > join {
            merged.push((start, end));
        } else {
            last.1 = end;
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: i64, end: i64) -> MotionInterval {
        MotionInterval { start, end }
    }

    #[test]
    fn test_join_distance_thresholds() {
        let thresholds = JoinThresholds::default();
        assert_eq!(thresholds.join_distance(5_000_000), 0);
        assert_eq!(thresholds.join_distance(10_000_000), 0);
        assert_eq!(thresholds.join_distance(31_500_000), 315_000);
        assert_eq!(thresholds.join_distance(63_000_000), 400_000);
        assert_eq!(thresholds.join_distance(100_000_000), 400_000);
    }

    #[test]
    fn test_index_replaces_same_key() {
        let key = BucketKey { year: 2024, month: 1, day: 1, hour: 0 };
        let mut index = MotionIndex::new();
        index.insert(MotionBucket { key, intervals: vec![interval(1, 2)] });
        index.insert(MotionBucket { key, intervals: vec![interval(3, 4)] });
        assert_eq!(index.len(), 1);
        assert_eq!(index.buckets_in(TimeWindow { start: 1_704_067_200_000, end: 1_704_067_200_000 })[0].intervals[0].start, 3);
    }

    #[test]
    fn test_index_prunes_by_hour() {
        let mut index = MotionIndex::new();
        for hour in [8, 9, 10, 11] {
            index.insert(MotionBucket {
                key: BucketKey { year: 2024, month: 1, day: 15, hour },
                intervals: vec![interval(i64::from(hour), i64::from(hour) + 1)],
            });
        }

        // 2024-01-15 09:30 UTC .. 10:30 UTC
        let window = TimeWindow { start: 1_705_311_000_000, end: 1_705_314_600_000 };
        let hours: Vec<u32> = index.buckets_in(window).iter().map(|b| b.key.hour).collect();
        assert_eq!(hours, vec![9, 10]);
    }

    #[test]
    fn test_merge_joins_within_distance() {
        let main = TimeWindow { start: 0, end: 1_000_000 };
        let visible = main;
        let data = [interval(10, 20), interval(25, 30), interval(100, 110)];

        let merged = merge_motion(data.iter(), main, visible, 10_000);
        assert_eq!(merged, vec![(10_000, 30_000), (100_000, 110_000)]);

        let separate = merge_motion(data.iter(), main, visible, 0);
        assert_eq!(separate.len(), 3);
    }

    #[test]
    fn test_merge_drops_out_of_order_input() {
        let main = TimeWindow { start: 0, end: 1_000_000 };
        let data = [interval(50, 60), interval(10, 20), interval(70, 80)];

        let merged = merge_motion(data.iter(), main, main, 0);
        assert_eq!(merged, vec![(50_000, 60_000), (70_000, 80_000)]);
    }

    #[test]
    fn test_merge_clips_and_filters() {
        let main = TimeWindow { start: 15_000, end: 500_000 };
        let visible = TimeWindow { start: 0, end: 200_000 };
        let data = [interval(20, 10), interval(300, 400)];

        let merged = merge_motion(data.iter(), main, visible, 0);
        assert_eq!(merged, vec![(15_000, 20_000)]);
    }
}
