use std::collections::BTreeMap;

use common::{RenderedFragment, TimeWindow};
use tracing::{debug, trace};

use crate::archive::FragmentChange;

/// Scrubbable timeline the player draws into.
pub trait TimelineWidget: Send {
    fn add(&mut self, fragments: &[RenderedFragment]);

    /// Upsert by id
    fn update(&mut self, fragments: &[RenderedFragment]);

    fn remove(&mut self, ids: &[u64]);

    fn clear(&mut self);

    /// Center the view on `instant`
    fn move_to(&mut self, instant: i64);

    fn set_marker(&mut self, instant: i64);

    fn visible_window(&self) -> TimeWindow;

    /// User zoomed or panned
    fn set_visible_window(&mut self, window: TimeWindow);
}

pub fn apply_changes(widget: &mut dyn TimelineWidget, changes: &[FragmentChange]) {
    for change in changes {
        match change {
            FragmentChange::Clear => widget.clear(),
            FragmentChange::Add(fragments) => widget.add(fragments),
            FragmentChange::Update(fragments) => widget.update(fragments),
            FragmentChange::Remove(ids) => widget.remove(ids),
        }
    }
}

/// Timeline that keeps its items in memory and logs what it would draw.
#[derive(Debug, Default)]
pub struct TracingTimeline {
    items: BTreeMap<u64, RenderedFragment>,
    marker: Option<i64>,
    window: TimeWindow,
}

impl TracingTimeline {
    pub fn new(window_length: i64) -> Self {
        Self {
            window: TimeWindow {
                start: 0,
                end: window_length,
            },
            ..Self::default()
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &RenderedFragment> {
        self.items.values()
    }

    pub fn marker(&self) -> Option<i64> {
        self.marker
    }
}

impl TimelineWidget for TracingTimeline {
    fn add(&mut self, fragments: &[RenderedFragment]) {
        for fragment in fragments {
            self.items.insert(fragment.id, *fragment);
        }
        debug!(count = fragments.len(), total = self.items.len(), "Timeline items added");
    }

    fn update(&mut self, fragments: &[RenderedFragment]) {
        for fragment in fragments {
            self.items.insert(fragment.id, *fragment);
        }
        trace!(count = fragments.len(), "Timeline items updated");
    }

    fn remove(&mut self, ids: &[u64]) {
        for id in ids {
            self.items.remove(id);
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.marker = None;
    }

    fn move_to(&mut self, instant: i64) {
        let half = self.window.length() / 2;
        self.window = TimeWindow {
            start: instant - half,
            end: instant - half + self.window.length(),
        };
    }

    fn set_marker(&mut self, instant: i64) {
        self.marker = Some(instant);
        trace!(instant, "Marker moved");
    }

    fn visible_window(&self) -> TimeWindow {
        self.window
    }

    fn set_visible_window(&mut self, window: TimeWindow) {
        self.window = window;
    }
}
