//! Windowed view over a data source.
//!
//! The view caches a slice of the timeline around an anchor item: up to `limit` items before it
//! and `limit` after it. [`WindowedView::jump_to`] repopulates the cache;
//! [`WindowedView::load_forward`] (toward the head) and [`WindowedView::load_backward`] (toward
//! the tail) top it up as the anchor moves inside the window.
//!
//! Every cached item carries excerpts of its two predecessors and two successors, which the
//! reordering functions use to pick new sort keys.

use crate::error::Result;
use crate::item::{ItemId, ItemKind, SortKey};
use crate::source::{DataSource, Entry, Page, PageQuery};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Window sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Items kept on each side of the anchor.
    pub limit: usize,
    /// Extra items fetched before the target by `jump_to(.., true)`.
    pub overscan: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            overscan: 100,
        }
    }
}

/// Excerpt of a neighboring item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    /// A real item.
    Item {
        /// Its sort key.
        key: SortKey,
        /// Its kind.
        kind: ItemKind,
    },
    /// The true start or end of the whole sequence.
    Boundary,
    /// Outside the window and not known yet.
    Unknown,
}

impl Neighbor {
    /// Sort key of a real neighbor.
    pub fn key(&self) -> Option<SortKey> {
        match self {
            Neighbor::Item { key, .. } => Some(*key),
            Neighbor::Boundary | Neighbor::Unknown => None,
        }
    }

    fn of(entry: &Entry) -> Self {
        Neighbor::Item {
            key: entry.item.key,
            kind: entry.item.kind(),
        }
    }
}

/// A cached entry with its neighbor excerpts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewItem {
    /// The entry as served by the source.
    pub entry: Entry,
    /// Nearest predecessor first.
    pub prev: [Neighbor; 2],
    /// Nearest successor first.
    pub next: [Neighbor; 2],
}

impl ViewItem {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            prev: [Neighbor::Unknown; 2],
            next: [Neighbor::Unknown; 2],
        }
    }
}

/// Position of the window relative to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    /// Source index of the first cached item.
    pub global_index: usize,
    /// Offset of the anchor item inside the cache.
    pub local_index: usize,
    /// The first cached item is the first item of the source.
    pub at_start: bool,
    /// The last cached item is the last item of the source.
    pub at_end: bool,
    /// Sort key of the anchor item.
    pub date: Option<SortKey>,
    /// Identity of the anchor item.
    pub id: Option<ItemId>,
}

impl Tracker {
    /// Source index of the anchor item.
    pub fn anchor_index(&self) -> usize {
        self.global_index + self.local_index
    }
}

/// Lifecycle of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Nothing loaded yet.
    Empty,
    /// A window is cached.
    Populated,
}

#[derive(Debug, Default)]
struct Window {
    items: Vec<ViewItem>,
    tracker: Option<Tracker>,
    generation: u64,
}

impl Window {
    fn excerpt(&self, index: isize) -> Neighbor {
        let (at_start, at_end) = self
            .tracker
            .as_ref()
            .map_or((false, false), |t| (t.at_start, t.at_end));
        let known = if index < 0 {
            at_start
        } else if index as usize >= self.items.len() {
            at_end
        } else {
            return Neighbor::of(&self.items[index as usize].entry);
        };
        if known {
            Neighbor::Boundary
        } else {
            Neighbor::Unknown
        }
    }

    fn refresh(&mut self, i: usize) -> bool {
        let at = i as isize;
        let prev = [self.excerpt(at - 1), self.excerpt(at - 2)];
        let next = [self.excerpt(at + 1), self.excerpt(at + 2)];
        let item = &mut self.items[i];
        let changed = item.prev != prev || item.next != next;
        item.prev = prev;
        item.next = next;
        changed
    }

    // Walk in from both ends; an interior item whose excerpts did not change ends the walk.
    fn annotate(&mut self) {
        let n = self.items.len();
        let interior = |i: usize| i >= 2 && i + 2 < n;
        for i in 0..n {
            if !self.refresh(i) && interior(i) {
                break;
            }
        }
        for i in (0..n).rev() {
            if !self.refresh(i) && interior(i) {
                break;
            }
        }
    }
}

/// A windowed cache over a [`DataSource`].
pub struct WindowedView<S> {
    source: Arc<S>,
    config: ViewConfig,
    window: Mutex<Window>,
}

impl<S: DataSource> WindowedView<S> {
    /// Create an empty view.
    pub fn new(source: Arc<S>, config: ViewConfig) -> Self {
        Self {
            source,
            config,
            window: Mutex::new(Window::default()),
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Window sizing in effect.
    pub fn config(&self) -> ViewConfig {
        self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ViewState {
        if self.window.lock().tracker.is_some() {
            ViewState::Populated
        } else {
            ViewState::Empty
        }
    }

    /// Snapshot of the tracker.
    pub fn tracker(&self) -> Option<Tracker> {
        self.window.lock().tracker.clone()
    }

    /// Snapshot of the cached items.
    pub fn items(&self) -> Vec<ViewItem> {
        self.window.lock().items.clone()
    }

    /// Cached item at source index `index`.
    pub fn item_at(&self, index: usize) -> Option<ViewItem> {
        let window = self.window.lock();
        let global = window.tracker.as_ref()?.global_index;
        window.items.get(index.checked_sub(global)?).cloned()
    }

    /// Counter bumped by every jump and every applied load.
    pub fn generation(&self) -> u64 {
        self.window.lock().generation
    }

    /// Drop the cache and load a window whose anchor is `target`.
    ///
    /// With `load_forward`, up to `overscan` extra items before the target are fetched as well.
    /// Returns `false` when a later jump superseded this one before it completed.
    #[instrument(level = "debug", skip(self))]
    pub async fn jump_to(&self, target: usize, load_forward: bool) -> Result<bool> {
        let generation = {
            let mut window = self.window.lock();
            window.generation += 1;
            window.items.clear();
            window.tracker = None;
            window.generation
        };

        let back = if load_forward {
            self.config.overscan.min(target)
        } else {
            0
        };
        let requested = self.config.limit + 1 + back;
        let page = self
            .source
            .after(PageQuery::at_index((target - back) as isize).limit(requested))
            .await?;

        let mut window = self.window.lock();
        if window.generation != generation {
            debug!(target, "discarding superseded jump");
            return Ok(false);
        }

        let got = page.len();
        let local_index = back.min(got.saturating_sub(1));
        let anchor = page.entries.get(local_index).map(|entry| &entry.item);
        let tracker = Tracker {
            global_index: page.first_index,
            local_index,
            at_start: page.first_index == 0,
            at_end: got < requested,
            date: anchor.map(|item| item.key),
            id: anchor.map(|item| item.id),
        };
        window.items = page.entries.into_iter().map(ViewItem::new).collect();
        window.tracker = Some(tracker);
        window.annotate();
        debug!(target, got, "window populated");
        Ok(true)
    }

    /// Fetch missing items before the window.
    ///
    /// Returns `false` when the view is empty, already at the start, already has `limit` items
    /// before the anchor, or the fetch was superseded.
    pub async fn load_forward(&self) -> Result<bool> {
        let Some((generation, tracker)) = self.snapshot() else {
            return Ok(false);
        };
        if tracker.at_start {
            return Ok(false);
        }
        let missing = self.config.limit.saturating_sub(tracker.local_index);
        if missing == 0 {
            return Ok(false);
        }

        let page = self
            .source
            .before(
                PageQuery::at_index(tracker.global_index as isize)
                    .limit(missing)
                    .excluding(),
            )
            .await?;

        let mut window = self.window.lock();
        if window.generation != generation {
            debug!("discarding superseded forward load");
            return Ok(false);
        }
        let limit = self.config.limit;
        prepend(&mut window, page, missing, limit);
        window.annotate();
        window.generation += 1;
        Ok(true)
    }

    /// Fetch missing items after the window.
    ///
    /// Mirror of [`load_forward`](WindowedView::load_forward).
    pub async fn load_backward(&self) -> Result<bool> {
        let Some((generation, tracker)) = self.snapshot() else {
            return Ok(false);
        };
        if tracker.at_end {
            return Ok(false);
        }
        let len = self.window.lock().items.len();
        let after_anchor = len.saturating_sub(tracker.local_index + 1);
        let missing = self.config.limit.saturating_sub(after_anchor);
        if missing == 0 {
            return Ok(false);
        }

        let last = tracker.global_index + len;
        let page = self
            .source
            .after(
                PageQuery::at_index(last as isize - 1)
                    .limit(missing)
                    .excluding(),
            )
            .await?;

        let mut window = self.window.lock();
        if window.generation != generation {
            debug!("discarding superseded backward load");
            return Ok(false);
        }
        let limit = self.config.limit;
        append(&mut window, page, missing, limit);
        window.annotate();
        window.generation += 1;
        Ok(true)
    }

    fn snapshot(&self) -> Option<(u64, Tracker)> {
        let window = self.window.lock();
        window
            .tracker
            .clone()
            .map(|tracker| (window.generation, tracker))
    }
}

fn prepend(window: &mut Window, page: Page, requested: usize, limit: usize) {
    let got = page.len();
    let first_index = page.first_index;
    let was_empty = window.items.is_empty();
    let mut items: Vec<ViewItem> = page.entries.into_iter().map(ViewItem::new).collect();
    items.append(&mut window.items);
    window.items = items;

    let len = window.items.len();
    let anchor = window.items.last().map(|item| (item.entry.item.key, item.entry.item.id));
    let Some(tracker) = window.tracker.as_mut() else {
        return;
    };
    if was_empty {
        // A jump past the end left no anchor; the last fetched item becomes it.
        tracker.local_index = len.saturating_sub(1);
        if let Some((date, id)) = anchor {
            tracker.date = Some(date);
            tracker.id = Some(id);
        }
    } else {
        tracker.local_index += got;
    }
    tracker.global_index = if got > 0 {
        first_index
    } else {
        tracker.global_index
    };
    tracker.at_start = got < requested || tracker.global_index == 0;

    let keep = tracker.local_index + 1 + limit;
    if len > keep {
        window.items.truncate(keep);
        tracker.at_end = false;
    }
    debug!(got, local = tracker.local_index, "window grew toward the head");
}

fn append(window: &mut Window, page: Page, requested: usize, limit: usize) {
    let got = page.len();
    window
        .items
        .extend(page.entries.into_iter().map(ViewItem::new));

    let Some(tracker) = window.tracker.as_mut() else {
        return;
    };
    tracker.at_end = got < requested;

    if tracker.local_index > limit {
        let excess = tracker.local_index - limit;
        window.items.drain(..excess);
        tracker.global_index += excess;
        tracker.local_index -= excess;
        tracker.at_start = false;
    }
    debug!(got, local = tracker.local_index, "window grew toward the tail");
}

impl<S> std::fmt::Debug for WindowedView<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let window = self.window.lock();
        f.debug_struct("WindowedView")
            .field("config", &self.config)
            .field("cached", &window.items.len())
            .field("tracker", &window.tracker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    fn entry(ms: i64) -> Entry {
        Entry::original(Item::image(SortKey::from_millis(ms), 0, 1, 1))
    }

    fn key(ms: i64) -> Neighbor {
        Neighbor::Item {
            key: SortKey::from_millis(ms),
            kind: ItemKind::Image,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ViewConfig::default();
        assert_eq!(config.limit, 100);
        assert_eq!(config.overscan, config.limit);
    }

    #[test]
    fn test_annotate_marks_boundaries_and_unknowns() {
        let mut window = Window {
            items: (0..3).map(|i| ViewItem::new(entry(i * 10))).collect(),
            tracker: Some(Tracker {
                global_index: 0,
                local_index: 0,
                at_start: true,
                at_end: false,
                date: None,
                id: None,
            }),
            generation: 0,
        };
        window.annotate();

        assert_eq!(window.items[0].prev, [Neighbor::Boundary, Neighbor::Boundary]);
        assert_eq!(window.items[0].next, [key(10), key(20)]);
        assert_eq!(window.items[1].prev, [key(0), Neighbor::Boundary]);
        assert_eq!(window.items[2].prev, [key(10), key(0)]);
        assert_eq!(window.items[2].next, [Neighbor::Unknown, Neighbor::Unknown]);
        assert_eq!(window.items[1].next, [key(20), Neighbor::Unknown]);
    }

    #[test]
    fn test_annotate_refreshes_after_prepend() {
        let mut window = Window {
            items: (2..5).map(|i| ViewItem::new(entry(i * 10))).collect(),
            tracker: Some(Tracker {
                global_index: 2,
                local_index: 0,
                at_start: false,
                at_end: true,
                date: None,
                id: None,
            }),
            generation: 0,
        };
        window.annotate();
        assert_eq!(window.items[0].prev, [Neighbor::Unknown, Neighbor::Unknown]);

        let page = Page {
            first_index: 0,
            entries: vec![entry(0), entry(10)],
        };
        prepend(&mut window, page, 2, 100);
        window.annotate();

        let tracker = window.tracker.as_ref().unwrap();
        assert_eq!(tracker.global_index, 0);
        assert_eq!(tracker.local_index, 2);
        assert!(tracker.at_start);
        assert_eq!(window.items[2].prev, [key(10), key(0)]);
        assert_eq!(window.items[0].prev, [Neighbor::Boundary, Neighbor::Boundary]);
        assert_eq!(window.items[4].next, [Neighbor::Boundary, Neighbor::Boundary]);
        assert_eq!(window.items[1].next, [key(20), key(30)]);
    }
}
