//! Overlay data source: local edits layered over a read-only bottom source.
//!
//! Reads translate the requested virtual window through the [`Bridge`], fetch every referenced
//! original with a single bottom request, and splice local additions back in. Mutations are
//! synchronous bridge edits followed by a re-projection of the size and highlight list.
//!
//! Highlights must be synchronized once (see [`OverlaySource::highlights`]) before the first
//! edit; the projection has no baseline otherwise.

use crate::bridge::{Bridge, EditMarks, Resolved};
use crate::error::{OverlayError, Result};
use crate::item::{HighlightedItem, Item, ItemId, Tombstone};
use crate::observable::Observable;
use crate::source::{Anchor, DataSource, Entry, Page, PageQuery};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, trace};

type Baseline = Vec<(usize, String)>;

/// Flattened local edits, ready to be encoded for the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Collected {
    /// Every locally added item, in virtual order.
    pub added: Vec<Item>,
    /// Extras of every deleted original, in bottom order.
    pub deleted: Vec<Tombstone>,
}

impl Collected {
    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

enum Slot {
    Bottom(usize),
    Added(Item),
}

/// A [`DataSource`] presenting a bottom source plus local edits.
pub struct OverlaySource<S> {
    bottom: Arc<S>,
    bridge: RwLock<Bridge<Item, Tombstone>>,
    baseline: OnceCell<Baseline>,
    /// Bumped under the bridge write lock by every successful edit.
    revision: AtomicU64,
    size: Observable<usize>,
    highlighted: Observable<Vec<HighlightedItem>>,
}

fn project(bridge: &Bridge<Item, Tombstone>, baseline: &[(usize, String)]) -> Vec<HighlightedItem> {
    bridge
        .project(baseline, |item| item.highlight.clone())
        .into_iter()
        .map(|(index, tag)| HighlightedItem { index, tag })
        .collect()
}

fn baseline_tag(baseline: Option<&Baseline>, bottom_index: usize) -> Option<String> {
    let baseline = baseline?;
    let at = baseline
        .binary_search_by_key(&bottom_index, |(index, _)| *index)
        .ok()?;
    Some(baseline[at].1.clone())
}

fn with_fresh_ids(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|mut item| {
            item.id = ItemId::fresh();
            item
        })
        .collect()
}

impl<S: DataSource> OverlaySource<S> {
    /// Open an overlay over `bottom`, reading its size.
    pub async fn open(bottom: Arc<S>) -> Result<Self> {
        let bottom_size = bottom.count_all().await?;
        Ok(Self::with_bottom_size(bottom, bottom_size))
    }

    /// Create an overlay over a bottom source whose size is already known.
    pub fn with_bottom_size(bottom: Arc<S>, bottom_size: usize) -> Self {
        Self {
            bottom,
            bridge: RwLock::new(Bridge::new(bottom_size)),
            baseline: OnceCell::new(),
            revision: AtomicU64::new(0),
            size: Observable::new(bottom_size),
            highlighted: Observable::new(Vec::new()),
        }
    }

    /// The wrapped bottom source.
    pub fn bottom(&self) -> &Arc<S> {
        &self.bottom
    }

    /// Current virtual size.
    pub fn size(&self) -> usize {
        self.bridge.read().size()
    }

    /// Whether the overlay carries no effective edit.
    pub fn is_pristine(&self) -> bool {
        self.bridge.read().is_pristine()
    }

    /// Register a callback fired whenever the virtual size changes.
    pub fn subscribe_size<F>(&self, callback: F)
    where
        F: FnMut(&usize) + Send + 'static,
    {
        self.size.subscribe(callback);
    }

    /// Register a callback fired whenever the projected highlight list changes.
    pub fn subscribe_highlights<F>(&self, callback: F)
    where
        F: FnMut(&Vec<HighlightedItem>) + Send + 'static,
    {
        self.highlighted.subscribe(callback);
    }

    /// Highlighted positions in virtual index space.
    ///
    /// The first call fetches the bottom highlight list; concurrent first calls share a single
    /// fetch. Later calls only re-project the cached baseline.
    pub async fn highlights(&self) -> Result<Vec<HighlightedItem>> {
        let baseline = self
            .baseline
            .get_or_try_init(|| async {
                let mut items = self.bottom.highlighted_items().await?;
                items.sort_by_key(|h| h.index);
                debug!(count = items.len(), "highlight baseline synchronized");
                Ok::<_, OverlayError>(items.into_iter().map(|h| (h.index, h.tag)).collect())
            })
            .await?;
        let (revision, projected) = {
            let bridge = self.bridge.read();
            (self.revision.load(Ordering::Relaxed), project(&bridge, baseline))
        };
        self.highlighted.publish(revision, projected.clone());
        Ok(projected)
    }

    /// Entry at virtual index `index`.
    pub async fn at(&self, index: usize) -> Result<Entry> {
        let page = self.query(index as isize, index as isize).await?;
        page.entries.into_iter().next().ok_or(OverlayError::IndexOutOfRange {
            index,
            size: self.size(),
        })
    }

    #[instrument(level = "trace", skip(self))]
    async fn query(&self, tstart: isize, tend: isize) -> Result<Page> {
        let (first_index, span, slots, marks) = {
            let bridge = self.bridge.read();
            let translation = bridge.range_virtual_to_bottom(tstart, tend);
            let slots = translation
                .slots
                .iter()
                .map(|slot| match slot {
                    Resolved::Bottom(b) => Ok(Slot::Bottom(*b)),
                    Resolved::Added(handle) => bridge.item(*handle).cloned().map(Slot::Added),
                })
                .collect::<Result<Vec<_>>>()?;
            (
                translation.range.start,
                translation.bottom_span(),
                slots,
                translation.marks,
            )
        };

        let originals = match span {
            Some((first, last)) => {
                let expected = last - first + 1;
                trace!(first, last, "fetching bottom window");
                let page = self
                    .bottom
                    .after(PageQuery::at_index(first as isize).limit(expected))
                    .await?;
                if page.len() != expected {
                    return Err(OverlayError::ShortRead {
                        expected,
                        got: page.len(),
                    });
                }
                page.into_items()
            }
            None => Vec::new(),
        };
        let base = span.map_or(0, |(first, _)| first);

        let entries = slots
            .into_iter()
            .zip(marks)
            .map(|(slot, marks): (Slot, EditMarks)| match slot {
                Slot::Bottom(b) => {
                    let mut item = originals[b - base].clone();
                    item.origin = Some(b);
                    if let Some(tag) = baseline_tag(self.baseline.get(), b) {
                        item.highlight = Some(tag);
                    }
                    Entry {
                        item,
                        added: false,
                        marks,
                    }
                }
                Slot::Added(item) => Entry {
                    item,
                    added: true,
                    marks,
                },
            })
            .collect();

        Ok(Page {
            first_index,
            entries,
        })
    }

    // Apply `op` under the write lock, then publish size and highlights once the lock is gone.
    // Publications carry the revision so a slower, older one cannot overwrite them.
    fn edit<R>(&self, op: impl FnOnce(&mut Bridge<Item, Tombstone>) -> Result<R>) -> Result<R> {
        let baseline = self
            .baseline
            .get()
            .ok_or(OverlayError::HighlightsNotSynced)?;
        let (result, revision, size, projected) = {
            let mut bridge = self.bridge.write();
            let result = op(&mut *bridge)?;
            (
                result,
                self.revision.fetch_add(1, Ordering::Relaxed) + 1,
                bridge.size(),
                project(&bridge, baseline),
            )
        };
        self.size.publish(revision, size);
        self.highlighted.publish(revision, projected);
        Ok(result)
    }

    /// Insert `items` right after virtual position `tstart` (`-1` = front).
    ///
    /// Every inserted item gets a fresh identity.
    pub fn insert(&self, tstart: isize, items: Vec<Item>) -> Result<()> {
        let count = items.len();
        self.edit(|bridge| {
            bridge.insert(tstart, with_fresh_ids(items));
            debug!(tstart, count, size = bridge.size(), "overlay insert");
            Ok(())
        })
    }

    /// Remove the inclusive virtual range `[tstart, tend]`; returns the number removed.
    pub fn remove(&self, tstart: isize, tend: isize, extras: Vec<Tombstone>) -> Result<usize> {
        self.edit(|bridge| {
            let removed = bridge.remove(tstart, tend, extras);
            debug!(tstart, tend, removed, size = bridge.size(), "overlay remove");
            Ok(removed)
        })
    }

    /// Move the item at `index` one position toward the head; returns its new index.
    ///
    /// `item` is the (possibly rekeyed) item to put back; `extras` become the deletion extras
    /// when `index` is an original.
    pub fn move_forward(&self, index: usize, item: Item, extras: Vec<Tombstone>) -> Result<usize> {
        self.edit(|bridge| {
            check_index(bridge, index)?;
            let at = index as isize;
            bridge.remove(at, at, extras);
            bridge.insert(at - 2, with_fresh_ids(vec![item]));
            let moved_to = index.saturating_sub(1);
            debug!(index, moved_to, "overlay move forward");
            Ok(moved_to)
        })
    }

    /// Move the item at `index` one position toward the tail; returns its new index.
    pub fn move_backward(&self, index: usize, item: Item, extras: Vec<Tombstone>) -> Result<usize> {
        self.edit(|bridge| {
            check_index(bridge, index)?;
            let at = index as isize;
            bridge.remove(at, at, extras);
            bridge.insert(at, with_fresh_ids(vec![item]));
            let moved_to = (index + 1).min(bridge.size() - 1);
            debug!(index, moved_to, "overlay move backward");
            Ok(moved_to)
        })
    }

    /// Replace the item at `index` without changing its position.
    ///
    /// Added items are replaced in place. Originals cannot be changed, so they are deleted and
    /// the replacement is inserted in the same spot.
    pub fn inplace_mutate(&self, index: usize, item: Item, extras: Vec<Tombstone>) -> Result<usize> {
        self.edit(|bridge| {
            let at = index as isize;
            let translation = bridge.range_virtual_to_bottom(at, at);
            let mut item = item;
            item.id = ItemId::fresh();
            match translation.slots.first() {
                Some(Resolved::Added(handle)) => {
                    bridge.replace(*handle, item)?;
                }
                Some(Resolved::Bottom(_)) => {
                    bridge.remove(at, at, extras);
                    bridge.insert(at - 1, vec![item]);
                }
                None => {
                    return Err(OverlayError::IndexOutOfRange {
                        index,
                        size: bridge.size(),
                    })
                }
            }
            debug!(index, "overlay inplace mutate");
            Ok(index)
        })
    }

    /// Drop delete + re-insert pairs that cancel out; returns the number of cancelled items.
    pub fn squash(&self) -> Result<usize> {
        self.edit(|bridge| {
            let cancelled = bridge.squash();
            debug!(cancelled, "overlay squash");
            Ok(cancelled)
        })
    }

    /// Flatten the local edits.
    pub fn collect(&self) -> Collected {
        let (added, deleted) = self.bridge.read().collect();
        Collected { added, deleted }
    }
}

fn check_index(bridge: &Bridge<Item, Tombstone>, index: usize) -> Result<()> {
    if index < bridge.size() {
        Ok(())
    } else {
        Err(OverlayError::IndexOutOfRange {
            index,
            size: bridge.size(),
        })
    }
}

#[async_trait]
impl<S: DataSource> DataSource for OverlaySource<S> {
    async fn before(&self, query: PageQuery) -> Result<Page> {
        let Anchor::Index(anchor) = query.anchor else {
            return Err(OverlayError::Unsupported("key-anchored paging"));
        };
        let (first, last) = query.before_span(anchor);
        self.query(first, last).await
    }

    async fn after(&self, query: PageQuery) -> Result<Page> {
        let Anchor::Index(anchor) = query.anchor else {
            return Err(OverlayError::Unsupported("key-anchored paging"));
        };
        let (first, last) = query.after_span(anchor);
        self.query(first, last).await
    }

    async fn count_all(&self) -> Result<usize> {
        Ok(self.size())
    }

    async fn highlighted_items(&self) -> Result<Vec<HighlightedItem>> {
        self.highlights().await
    }
}

impl<S> std::fmt::Debug for OverlaySource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bridge = self.bridge.read();
        f.debug_struct("OverlaySource")
            .field("bottom_size", &bridge.bottom_size())
            .field("size", &bridge.size())
            .field("synced", &self.baseline.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SortKey;
    use crate::source::MemorySource;

    fn overlay(n: usize) -> OverlaySource<MemorySource> {
        let items = (0..n)
            .map(|i| Item::image(SortKey::from_millis(i as i64 * 1000), i as u32, 1, 1))
            .collect();
        OverlaySource::with_bottom_size(Arc::new(MemorySource::new(items)), n)
    }

    #[test]
    fn test_mutation_before_sync_is_rejected() {
        let overlay = overlay(3);
        let err = overlay
            .insert(0, vec![Item::widget(SortKey::from_millis(500), 'n', "x")])
            .unwrap_err();
        assert!(matches!(err, OverlayError::HighlightsNotSynced));
        assert_eq!(overlay.size(), 3);
    }

    #[tokio::test]
    async fn test_insert_assigns_fresh_ids() {
        let overlay = overlay(3);
        overlay.highlights().await.unwrap();
        let item = Item::widget(SortKey::from_millis(500), 'n', "x");
        let id = item.id;
        overlay.insert(0, vec![item]).unwrap();
        let entry = overlay.at(1).await.unwrap();
        assert!(entry.added);
        assert_ne!(entry.item.id, id);
    }

    #[tokio::test]
    async fn test_composite_edits_validate_index() {
        let overlay = overlay(3);
        overlay.highlights().await.unwrap();
        let item = Item::widget(SortKey::from_millis(0), 'n', "x");
        let err = overlay.move_forward(3, item.clone(), vec![]).unwrap_err();
        assert!(matches!(err, OverlayError::IndexOutOfRange { index: 3, size: 3 }));
        let err = overlay.inplace_mutate(7, item, vec![]).unwrap_err();
        assert!(matches!(err, OverlayError::IndexOutOfRange { index: 7, .. }));
        assert!(overlay.is_pristine());
    }

    #[tokio::test]
    async fn test_key_anchor_is_unsupported() {
        let overlay = overlay(3);
        let err = overlay
            .before(PageQuery::at_key(SortKey::from_millis(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::Unsupported(_)));
    }
}
