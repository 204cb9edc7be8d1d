//! Reordering and editing of single items through an overlay.
//!
//! Every function takes an item annotated by the [`WindowedView`](crate::view::WindowedView)
//! and picks a new sort key from its neighbor excerpts. A move into a large gap only rekeys the
//! item in place; otherwise the item swaps places with its neighbor and gets a key between the
//! neighbor and the neighbor's neighbor.

use crate::error::{OverlayError, Result};
use crate::item::{Item, Payload, SortKey, Tombstone};
use crate::overlay::OverlaySource;
use crate::source::DataSource;
use crate::view::{Neighbor, ViewItem};
use serde::{Deserialize, Serialize};

/// Key placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderPolicy {
    /// Gap (in key units) from which two neighbors are considered far apart.
    pub large_gap_ms: i64,
    /// Minimal key step.
    pub unit_ms: i64,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            large_gap_ms: 30 * 60 * 1000,
            unit_ms: 1,
        }
    }
}

impl ReorderPolicy {
    /// Whether `later` is at least `large_gap_ms` after `earlier`.
    pub fn is_large_gap(&self, earlier: SortKey, later: SortKey) -> bool {
        earlier.gap_to(later) >= self.large_gap_ms
    }
}

enum Side {
    Boundary,
    Item(SortKey),
}

fn side(neighbor: Neighbor, index: usize) -> Result<Side> {
    match neighbor {
        Neighbor::Item { key, .. } => Ok(Side::Item(key)),
        Neighbor::Boundary => Ok(Side::Boundary),
        Neighbor::Unknown => Err(OverlayError::NeighborUnknown { index }),
    }
}

fn touched(item: &ViewItem, index: usize) -> Item {
    let mut item = item.entry.item.clone();
    item.dirty = true;
    item.moved_from.get_or_insert(index);
    item
}

fn tombstone(item: &ViewItem) -> Vec<Tombstone> {
    vec![Tombstone::of(&item.entry.item)]
}

/// Move the item at `index` one position toward the head; returns its new index.
///
/// A boundary before the item makes this a no-op.
pub fn move_forward<S: DataSource>(
    overlay: &OverlaySource<S>,
    index: usize,
    item: &ViewItem,
    policy: &ReorderPolicy,
) -> Result<usize> {
    let Side::Item(prev0) = side(item.prev[0], index)? else {
        return Ok(index);
    };
    let mut moved = touched(item, index);

    if policy.is_large_gap(prev0, moved.key) {
        moved.key = prev0.shifted(policy.unit_ms);
        return overlay.inplace_mutate(index, moved, tombstone(item));
    }

    moved.key = match side(item.prev[1], index)? {
        Side::Boundary => prev0.shifted(-policy.unit_ms),
        Side::Item(prev1) if policy.is_large_gap(prev1, prev0) => prev0.shifted(-policy.unit_ms),
        Side::Item(prev1) => prev1.midpoint(prev0),
    };
    overlay.move_forward(index, moved, tombstone(item))
}

/// Move the item at `index` one position toward the tail; returns its new index.
///
/// A boundary after the item makes this a no-op.
pub fn move_backward<S: DataSource>(
    overlay: &OverlaySource<S>,
    index: usize,
    item: &ViewItem,
    policy: &ReorderPolicy,
) -> Result<usize> {
    let Side::Item(next0) = side(item.next[0], index)? else {
        return Ok(index);
    };
    let mut moved = touched(item, index);

    if policy.is_large_gap(moved.key, next0) {
        moved.key = next0.shifted(-policy.unit_ms);
        return overlay.inplace_mutate(index, moved, tombstone(item));
    }

    moved.key = match side(item.next[1], index)? {
        Side::Boundary => next0.shifted(policy.unit_ms),
        Side::Item(next1) if policy.is_large_gap(next0, next1) => next0.shifted(policy.unit_ms),
        Side::Item(next1) => next0.midpoint(next1),
    };
    overlay.move_backward(index, moved, tombstone(item))
}

/// Insert `new` right before the item at `index`; returns the index of the new item.
pub fn add_before<S: DataSource>(
    overlay: &OverlaySource<S>,
    index: usize,
    item: &ViewItem,
    new: Item,
    policy: &ReorderPolicy,
) -> Result<usize> {
    let key = item.entry.item.key;
    let mut new = new;
    new.key = match side(item.prev[0], index)? {
        Side::Item(prev0) if !policy.is_large_gap(prev0, key) => prev0.midpoint(key),
        Side::Item(_) | Side::Boundary => key.shifted(-policy.unit_ms),
    };
    new.dirty = true;
    overlay.insert(index as isize - 1, vec![new])?;
    Ok(index)
}

/// Insert `new` right after the item at `index`; returns the index of the new item.
pub fn add_after<S: DataSource>(
    overlay: &OverlaySource<S>,
    index: usize,
    item: &ViewItem,
    new: Item,
    policy: &ReorderPolicy,
) -> Result<usize> {
    let key = item.entry.item.key;
    let mut new = new;
    new.key = match side(item.next[0], index)? {
        Side::Item(next0) if !policy.is_large_gap(key, next0) => key.midpoint(next0),
        Side::Item(_) | Side::Boundary => key.shifted(policy.unit_ms),
    };
    new.dirty = true;
    overlay.insert(index as isize, vec![new])?;
    Ok(index + 1)
}

/// Replace the payload of the item at `index`, keeping its key and position.
pub fn edit<S: DataSource>(
    overlay: &OverlaySource<S>,
    index: usize,
    item: &ViewItem,
    payload: Payload,
) -> Result<usize> {
    let mut edited = touched(item, index);
    edited.payload = payload;
    overlay.inplace_mutate(index, edited, tombstone(item))
}

/// Remove the item at `index`; returns the number of removed items.
pub fn remove<S: DataSource>(
    overlay: &OverlaySource<S>,
    index: usize,
    item: &ViewItem,
) -> Result<usize> {
    let at = index as isize;
    overlay.remove(at, at, tombstone(item))
}
