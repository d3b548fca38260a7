//! Interval collections behind the timeline: the recorded range, missing gaps and motion overlays.

pub mod motion;

use std::collections::BTreeMap;

use common::{
    FragmentClass, FragmentGroup, MissingInterval, MotionBucket, RenderedFragment, TimeWindow,
};
use tracing::debug;

pub use motion::{merge_motion, JoinThresholds, MotionIndex};

const NON_PROCESSED_ID: u64 = 0;
const ARCHIVE_ID: u64 = 1;
const FIRST_DYNAMIC_ID: u64 = 2;

/// Fragment data for one camera.
///
/// Collections are replaced on every metadata refresh. `records` mirrors what the timeline
/// widget currently displays, keyed by fragment id.
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    main: TimeWindow,
    live: i64,
    missing: Vec<MissingInterval>,
    motion: MotionIndex,
    records: BTreeMap<u64, RenderedFragment>,
    thresholds: JoinThresholds,
}

impl FragmentStore {
    pub fn new(thresholds: JoinThresholds) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.main = TimeWindow::default();
        self.live = 0;
        self.missing.clear();
        self.motion.clear();
        self.records.clear();
    }

    pub fn set_main_range(&mut self, range: TimeWindow, live: i64) {
        self.main = range;
        self.live = live;
    }

    pub fn main_range(&self) -> TimeWindow {
        self.main
    }

    pub fn live_edge(&self) -> i64 {
        self.live
    }

    pub fn add_missing(&mut self, list: Vec<MissingInterval>) {
        self.missing = list;
    }

    pub fn add_motion_bucket(&mut self, bucket: MotionBucket) {
        self.motion.insert(bucket);
    }

    pub fn missing(&self) -> &[MissingInterval] {
        &self.missing
    }

    pub fn motion(&self) -> &MotionIndex {
        &self.motion
    }

    pub fn thresholds(&self) -> JoinThresholds {
        self.thresholds
    }

    /// Lowest id above every record still held, so new fragments never replace live ones.
    fn next_free_id(&self) -> u64 {
        self.records
            .keys()
            .next_back()
            .map_or(FIRST_DYNAMIC_ID, |id| (id + 1).max(FIRST_DYNAMIC_ID))
    }

    /// Recorded range plus the not-yet-processed stretch up to the live edge.
    pub fn render_main(&mut self) -> [RenderedFragment; 2] {
        let fragments = [
            RenderedFragment {
                id: ARCHIVE_ID,
                class: FragmentClass::Archive,
                start: self.main.start,
                end: self.main.end,
                group: FragmentGroup::Recorded,
            },
            RenderedFragment {
                id: NON_PROCESSED_ID,
                class: FragmentClass::NonProcessed,
                start: self.main.end,
                end: self.live.max(self.main.end),
                group: FragmentGroup::Recorded,
            },
        ];
        for fragment in fragments {
            self.records.insert(fragment.id, fragment);
        }
        fragments
    }

    /// Missing gaps clipped to the recorded range. Without DVR retention there is nothing to show.
    pub fn render_missing(&mut self, dvr_depth: u32) -> Vec<RenderedFragment> {
        self.records.retain(|_, f| f.group != FragmentGroup::Missing);
        if self.missing.is_empty() || dvr_depth == 0 {
            return Vec::new();
        }

        let mut id = self.next_free_id();
        let mut rendered = Vec::with_capacity(self.missing.len());
        for item in &self.missing {
            let start = item.start.saturating_mul(1000).max(self.main.start);
            let end = item.end.saturating_mul(1000).min(self.main.end);
            if start > end {
                continue;
            }
            let fragment = RenderedFragment {
                id,
                class: FragmentClass::Missing,
                start,
                end,
                group: FragmentGroup::Missing,
            };
            rendered.push(fragment);
            id += 1;
        }
        for fragment in &rendered {
            self.records.insert(fragment.id, *fragment);
        }
        rendered
    }

    /// Recompute the motion overlay for `visible`. Previous motion records are always discarded first.
    pub fn render_motion(&mut self, visible: TimeWindow, dvr_depth: u32) -> Vec<RenderedFragment> {
        self.remove_motion_fragments();
        if self.motion.is_empty() || dvr_depth == 0 {
            return Vec::new();
        }

        let join = self.thresholds.join_distance(visible.length());
        let merged = merge_motion(self.motion.query(visible), self.main, visible, join);
        let base = self.next_free_id();

        let rendered: Vec<RenderedFragment> = merged
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| RenderedFragment {
                id: base + index as u64,
                class: FragmentClass::Motion,
                start,
                end,
                group: FragmentGroup::Motion,
            })
            .collect();

        for fragment in &rendered {
            self.records.insert(fragment.id, *fragment);
        }

        debug!(
            join_distance = join,
            count = rendered.len(),
            "Rendered motion fragments"
        );
        rendered
    }

    /// Drop every motion record; returns the removed ids.
    pub fn remove_motion_fragments(&mut self) -> Vec<u64> {
        let ids: Vec<u64> = self
            .records
            .values()
            .filter(|f| f.group == FragmentGroup::Motion)
            .map(|f| f.id)
            .collect();
        for id in &ids {
            self.records.remove(id);
        }
        ids
    }

    pub fn records(&self) -> impl Iterator<Item = &RenderedFragment> {
        self.records.values()
    }

    pub fn records_in(&self, group: FragmentGroup) -> Vec<RenderedFragment> {
        self.records.values().filter(|f| f.group == group).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Gap containing `instant` (ms). Gaps starting at zero are placeholders and never match.
    pub fn missing_at(&self, instant: i64) -> Option<MissingInterval> {
        self.missing.iter().find(|m| m.contains_millis(instant)).copied()
    }

    /// Gap containing the epoch second `unix`.
    pub fn missing_at_second(&self, unix: i64) -> Option<MissingInterval> {
        self.missing.iter().find(|m| m.contains_second(unix)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BucketKey, MotionInterval};

    fn store_with_range(start: i64, end: i64, live: i64) -> FragmentStore {
        let mut store = FragmentStore::new(JoinThresholds::default());
        store.set_main_range(TimeWindow { start, end }, live);
        store
    }

    #[test]
    fn test_render_main_is_update_not_insert() {
        let mut store = store_with_range(1_000, 5_000, 6_000);
        let first = store.render_main();
        assert_eq!(first[0].id, ARCHIVE_ID);
        assert_eq!((first[1].start, first[1].end), (5_000, 6_000));

        store.set_main_range(TimeWindow { start: 1_000, end: 6_000 }, 7_000);
        store.render_main();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_render_missing_clips_to_range() {
        let mut store = store_with_range(1_500_000, 2_500_000, 2_600_000);
        store.render_main();
        store.add_missing(vec![
            MissingInterval { start: 1_000, end: 2_000 },
            MissingInterval { start: 2_400, end: 3_000 },
        ]);

        let rendered = store.render_missing(7);
        assert_eq!(rendered.len(), 2);
        assert_eq!((rendered[0].start, rendered[0].end), (1_500_000, 2_000_000));
        assert_eq!((rendered[1].start, rendered[1].end), (2_400_000, 2_500_000));
        assert_eq!(rendered[0].id, 2);
        assert!(rendered.iter().all(|f| f.group == FragmentGroup::Missing));
    }

    #[test]
    fn test_render_missing_requires_dvr_depth() {
        let mut store = store_with_range(0, 10_000_000, 10_000_000);
        store.add_missing(vec![MissingInterval { start: 1_000, end: 2_000 }]);
        assert!(store.render_missing(0).is_empty());
    }

    #[test]
    fn test_render_motion_is_idempotent() {
        // 2024-01-15 10:00 UTC
        let hour_start = 1_705_312_800;
        let mut store = store_with_range(hour_start * 1000, (hour_start + 3600) * 1000, (hour_start + 3700) * 1000);
        store.render_main();
        store.add_motion_bucket(MotionBucket {
            key: BucketKey { year: 2024, month: 1, day: 15, hour: 10 },
            intervals: vec![
                MotionInterval { start: hour_start + 10, end: hour_start + 20 },
                MotionInterval { start: hour_start + 600, end: hour_start + 610 },
            ],
        });

        let visible = TimeWindow { start: hour_start * 1000, end: (hour_start + 3600) * 1000 };
        let first = store.render_motion(visible, 7);
        let second = store.render_motion(visible, 7);

        assert_eq!(first, second);
        assert_eq!(store.records_in(FragmentGroup::Motion).len(), 2);
        assert_eq!(store.len(), 4);

        let removed = store.remove_motion_fragments();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ids_stay_unique_when_gaps_clip_out() {
        // 2024-01-15 11:00 UTC
        let hour_start = 1_705_316_400;
        let mut store = store_with_range(hour_start * 1000, (hour_start + 3600) * 1000, (hour_start + 3660) * 1000);
        store.render_main();
        store.add_missing(vec![
            MissingInterval { start: hour_start - 7_200, end: hour_start - 7_100 },
            MissingInterval { start: hour_start - 3_600, end: hour_start - 3_500 },
            MissingInterval { start: hour_start + 100, end: hour_start + 200 },
        ]);
        store.add_motion_bucket(MotionBucket {
            key: BucketKey { year: 2024, month: 1, day: 15, hour: 11 },
            intervals: vec![MotionInterval { start: hour_start + 900, end: hour_start + 960 }],
        });

        let missing = store.render_missing(7);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, FIRST_DYNAMIC_ID);

        let visible = TimeWindow { start: hour_start * 1000, end: (hour_start + 3600) * 1000 };
        let motion = store.render_motion(visible, 7);
        assert_eq!(motion.len(), 1);
        assert_ne!(motion[0].id, missing[0].id);

        assert_eq!(store.records_in(FragmentGroup::Missing), missing);
        store.remove_motion_fragments();
        assert_eq!(store.records_in(FragmentGroup::Missing).len(), 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_oversized_gap_is_clipped_without_overflow() {
        let mut store = store_with_range(1_000_000, 2_000_000, 2_100_000);
        store.render_main();
        store.add_missing(vec![MissingInterval { start: 1_500, end: i64::MAX / 10 }]);

        let rendered = store.render_missing(7);
        assert_eq!(rendered.len(), 1);
        assert_eq!((rendered[0].start, rendered[0].end), (1_500_000, 2_000_000));
        assert!(store.missing_at(1_800_000).is_some());
    }

    #[test]
    fn test_missing_lookup() {
        let mut store = store_with_range(0, 10_000_000, 10_000_000);
        store.add_missing(vec![MissingInterval { start: 1_000, end: 2_000 }]);
        assert!(store.missing_at(1_500_000).is_some());
        assert!(store.missing_at(2_000_001).is_none());
        assert!(store.missing_at_second(2_000).is_some());
    }
}
