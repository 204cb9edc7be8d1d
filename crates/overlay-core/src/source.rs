//! The paged data-source contract and an in-memory bottom source.
//!
//! A data source serves a sorted timeline in pages. Both the bottom source (backed by storage or
//! a server) and the overlay itself implement [`DataSource`], so overlays stack and the windowed
//! view does not care which one it talks to.

use crate::bridge::EditMarks;
use crate::error::{OverlayError, Result};
use crate::item::{HighlightedItem, Item, SortKey};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::trace;

/// Where a page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// A position in the source's index space. May be `-1` or past the end.
    Index(isize),
    /// A sort key; resolved against the source's ordering.
    Key(SortKey),
}

/// Parameters of a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    /// Page anchor.
    pub anchor: Anchor,
    /// Maximum number of items to return.
    pub limit: usize,
    /// Whether the anchor position itself is part of the page.
    pub includes: bool,
}

impl PageQuery {
    /// Query anchored at index `index`, including it, with a limit of one.
    pub fn at_index(index: isize) -> Self {
        Self {
            anchor: Anchor::Index(index),
            limit: 1,
            includes: true,
        }
    }

    /// Query anchored at key `key`, including it, with a limit of one.
    pub fn at_key(key: SortKey) -> Self {
        Self {
            anchor: Anchor::Key(key),
            limit: 1,
            includes: true,
        }
    }

    /// Set the page limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Exclude the anchor position from the page.
    pub fn excluding(mut self) -> Self {
        self.includes = false;
        self
    }

    /// Include the anchor position in the page.
    pub fn including(mut self) -> Self {
        self.includes = true;
        self
    }

    /// Index range `(first, last)` (inclusive, unclamped) of a `before` page.
    pub fn before_span(&self, anchor: isize) -> (isize, isize) {
        let last = if self.includes { anchor } else { anchor - 1 };
        (last - self.limit as isize + 1, last)
    }

    /// Index range `(first, last)` (inclusive, unclamped) of an `after` page.
    pub fn after_span(&self, anchor: isize) -> (isize, isize) {
        let first = if self.includes { anchor } else { anchor + 1 };
        (first, first + self.limit as isize - 1)
    }
}

/// One entry of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The item.
    pub item: Item,
    /// Whether the item is a local addition rather than an original.
    pub added: bool,
    /// Edit-boundary markers around the item.
    pub marks: EditMarks,
}

impl Entry {
    /// Entry for an original item.
    pub fn original(item: Item) -> Self {
        Self {
            item,
            added: false,
            marks: EditMarks::default(),
        }
    }
}

/// A page of items in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Source index of the first entry (or of where it would be, for an empty page).
    pub first_index: usize,
    /// Entries in ascending index order.
    pub entries: Vec<Entry>,
}

impl Page {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the page is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Items of the page, dropping the entry metadata.
    pub fn into_items(self) -> Vec<Item> {
        self.entries.into_iter().map(|entry| entry.item).collect()
    }
}

/// An ordered, paged timeline.
///
/// Index anchors outside `[0, size)` are clamped: a request past either end returns a short or
/// empty page, never an error. Errors are reserved for transport/storage failures and for
/// requests the source does not support.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Up to `limit` items ending at the anchor (inclusive or exclusive), ascending.
    async fn before(&self, query: PageQuery) -> Result<Page>;

    /// Up to `limit` items starting at the anchor (inclusive or exclusive), ascending.
    async fn after(&self, query: PageQuery) -> Result<Page>;

    /// Total number of items.
    async fn count_all(&self) -> Result<usize>;

    /// Highlighted positions, in this source's index space.
    async fn highlighted_items(&self) -> Result<Vec<HighlightedItem>>;
}

/// Clamp an inclusive index span to `[0, size)`, returning a half-open range.
pub(crate) fn clamp_span(first: isize, last: isize, size: usize) -> std::ops::Range<usize> {
    let first = first.max(0) as usize;
    let end = (last + 1).clamp(0, size as isize) as usize;
    first.min(end)..end
}

/// A bottom source over a sorted in-memory list.
///
/// Useful as the bottom of an overlay in tests and tools. Counts fetches so callers can assert
/// how many round-trips a query needed, and can be told to fail every read.
#[derive(Debug, Default)]
pub struct MemorySource {
    items: RwLock<Vec<Item>>,
    highlights: RwLock<Vec<HighlightedItem>>,
    fetches: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySource {
    /// Create a source over `items`, sorting them by key.
    pub fn new(mut items: Vec<Item>) -> Self {
        items.sort_by_key(|item| item.key);
        Self {
            items: RwLock::new(items),
            ..Self::default()
        }
    }

    /// Replace the highlighted positions (bottom indices).
    pub fn with_highlights(self, highlights: Vec<HighlightedItem>) -> Self {
        *self.highlights.write() = highlights;
        self
    }

    /// Number of `before`/`after` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Snapshot of the stored items.
    pub fn items(&self) -> Vec<Item> {
        self.items.read().clone()
    }

    fn guard(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(OverlayError::Upstream("memory source is offline".into()));
        }
        Ok(())
    }

    // Key anchors resolve like an index: `before` ends at the last key <= anchor, `after` starts
    // at the first key >= anchor.
    fn resolve(&self, items: &[Item], anchor: Anchor, forward: bool) -> isize {
        match anchor {
            Anchor::Index(index) => index,
            Anchor::Key(key) if forward => items.partition_point(|item| item.key < key) as isize,
            Anchor::Key(key) => items.partition_point(|item| item.key <= key) as isize - 1,
        }
    }

    fn page(&self, items: &[Item], range: std::ops::Range<usize>) -> Page {
        Page {
            first_index: range.start,
            entries: items[range]
                .iter()
                .cloned()
                .map(Entry::original)
                .collect(),
        }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn before(&self, query: PageQuery) -> Result<Page> {
        self.guard()?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let items = self.items.read();
        let anchor = self.resolve(&items, query.anchor, false);
        let (first, last) = query.before_span(anchor);
        let range = clamp_span(first, last, items.len());
        trace!(anchor, ?range, "memory source before");
        Ok(self.page(&items, range))
    }

    async fn after(&self, query: PageQuery) -> Result<Page> {
        self.guard()?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let items = self.items.read();
        let anchor = self.resolve(&items, query.anchor, true);
        let (first, last) = query.after_span(anchor);
        let range = clamp_span(first, last, items.len());
        trace!(anchor, ?range, "memory source after");
        Ok(self.page(&items, range))
    }

    async fn count_all(&self) -> Result<usize> {
        self.guard()?;
        Ok(self.items.read().len())
    }

    async fn highlighted_items(&self) -> Result<Vec<HighlightedItem>> {
        self.guard()?;
        Ok(self.highlights.read().clone())
    }
}
