//! Index bridge between the virtual sequence and the bottom sequence.
//!
//! The bottom sequence is immutable. Local edits are kept as two sorted edit lists:
//!
//! - `adds`: runs of locally added items, each anchored at a *slot*. Slot `i` sits right after
//!   bottom item `i`; slot `-1` sits before everything. The last run is the tail sentinel
//!   (anchored at `bottom_size - 1`) and is never pruned, even when empty.
//! - `dels`: deleted bottom positions, strictly increasing, each carrying an opaque extra. The
//!   first entry is a sentinel at `-1` and is never removed.
//!
//! ```text
//! slot:  -1        0      1      2       3
//!        [a, b]  0 []   1 []   2 [c, d] 3 [e]        bottom size 4, bottom 2 deleted
//!
//! virtual: a b 0 1 c d 3 e
//! ```
//!
//! Every query walks the two lists in lock-step with a [`Segments`] cursor. Edits are sparse,
//! so a merge-scan over the edit lists is cheaper than any per-item index.

use crate::error::{OverlayError, Result};
use crate::item::{Item, SortKey, Tombstone};
use std::ops::Range;

/// A run of locally added items anchored at a bottom slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRun<T> {
    slot: isize,
    items: Vec<T>,
}

impl<T> AddRun<T> {
    /// Bottom slot the run is anchored at (`-1` = before everything).
    pub fn slot(&self) -> isize {
        self.slot
    }

    /// Items of the run, in virtual order.
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

/// A deleted bottom position plus its caller-supplied extra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion<X> {
    bottom: isize,
    extra: Option<X>,
}

impl<X> Deletion<X> {
    fn sentinel() -> Self {
        Self {
            bottom: -1,
            extra: None,
        }
    }

    /// Deleted bottom index (`-1` for the sentinel).
    pub fn bottom(&self) -> isize {
        self.bottom
    }

    /// Extra recorded when the position was deleted.
    pub fn extra(&self) -> Option<&X> {
        self.extra.as_ref()
    }
}

/// Generation-stamped reference to an added item.
///
/// A handle is only valid for the bridge generation it was produced in; any mutation of the
/// bridge invalidates every outstanding handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    generation: u64,
    run: usize,
    index: usize,
}

impl Handle {
    /// Index of the add run in the bridge's `adds` list.
    pub fn run(&self) -> usize {
        self.run
    }

    /// Index of the item inside its run.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// What a virtual position resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// An original item at this bottom index.
    Bottom(usize),
    /// A locally added item.
    Added(Handle),
}

/// Edit-boundary markers for a virtual position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditMarks {
    /// At least one deleted original sits right before this position.
    pub del_before: bool,
    /// At least one deleted original sits right after this position.
    pub del_after: bool,
}

/// Result of translating a virtual range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// The clamped virtual range that was translated (half-open).
    pub range: Range<usize>,
    /// One entry per virtual position in `range`.
    pub slots: Vec<Resolved>,
    /// Edit-boundary markers, parallel to `slots`.
    pub marks: Vec<EditMarks>,
}

impl Translation {
    fn empty(at: usize) -> Self {
        Self {
            range: at..at,
            slots: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// Number of translated positions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the clamped range was empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// First and last bottom index referenced by the translation (inclusive).
    ///
    /// Deleted positions may lie inside the span; fetching the whole span from the bottom
    /// source once covers every [`Resolved::Bottom`] slot.
    pub fn bottom_span(&self) -> Option<(usize, usize)> {
        let mut bottoms = self.slots.iter().filter_map(|slot| match slot {
            Resolved::Bottom(b) => Some(*b),
            Resolved::Added(_) => None,
        });
        let first = bottoms.next()?;
        let last = bottoms.last().unwrap_or(first);
        Some((first, last))
    }
}

/// Items that can be recognized as unmodified copies of original items.
pub trait Squashable {
    /// Bottom index and key of the original this item was copied from.
    fn origin(&self) -> Option<(usize, SortKey)>;

    /// Whether the item was edited after being copied.
    fn is_dirty(&self) -> bool;
}

/// Deletion extras that remember the key of the deleted item.
pub trait DeletionExtra {
    /// Key of the deleted original, if known.
    fn deleted_key(&self) -> Option<SortKey>;
}

impl Squashable for Item {
    fn origin(&self) -> Option<(usize, SortKey)> {
        self.origin.map(|index| (index, self.key))
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl DeletionExtra for Tombstone {
    fn deleted_key(&self) -> Option<SortKey> {
        Some(self.key)
    }
}

impl DeletionExtra for SortKey {
    fn deleted_key(&self) -> Option<SortKey> {
        Some(*self)
    }
}

impl DeletionExtra for () {
    fn deleted_key(&self) -> Option<SortKey> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Deleted,
    Original { first: usize, len: usize },
    Added { run: usize, len: usize },
}

impl Segment {
    fn len(&self) -> usize {
        match *self {
            Segment::Deleted => 0,
            Segment::Original { len, .. } | Segment::Added { len, .. } => len,
        }
    }

    fn resolve(&self, offset: usize, generation: u64) -> Option<Resolved> {
        match *self {
            Segment::Deleted => None,
            Segment::Original { first, .. } => Some(Resolved::Bottom(first + offset)),
            Segment::Added { run, .. } => Some(Resolved::Added(Handle {
                generation,
                run,
                index: offset,
            })),
        }
    }
}

/// Cursor over the virtual sequence, one segment at a time, in virtual order.
///
/// Three cursors advance together: the next bottom index, the next add run and the next
/// deletion. Consecutive surviving bottom items are reported as one segment.
struct Segments<'a, T, X> {
    adds: &'a [AddRun<T>],
    dels: &'a [Deletion<X>],
    bottom_size: usize,
    next_bottom: usize,
    run: usize,
    del: usize,
}

impl<T, X> Iterator for Segments<'_, T, X> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let limit = self
            .adds
            .get(self.run)
            .map_or(self.bottom_size as isize - 1, |run| run.slot);

        if (self.next_bottom as isize) <= limit {
            let first = self.next_bottom;
            let next_del = self.dels.get(self.del).map(|d| d.bottom);
            if next_del == Some(first as isize) {
                self.del += 1;
                self.next_bottom += 1;
                return Some(Segment::Deleted);
            }

            let mut last = limit as usize;
            if let Some(del) = next_del {
                debug_assert!(del > first as isize, "deletions must stay sorted");
                if del <= limit {
                    last = del as usize - 1;
                }
            }
            self.next_bottom = last + 1;
            return Some(Segment::Original {
                first,
                len: last + 1 - first,
            });
        }

        if self.run < self.adds.len() {
            let run = self.run;
            self.run += 1;
            return Some(Segment::Added {
                run,
                len: self.adds[run].items.len(),
            });
        }

        None
    }
}

/// Maps the virtual index space onto the bottom index space plus locally added items.
///
/// The bridge is pure bookkeeping: it performs no I/O and never sees bottom items.
#[derive(Debug, Clone)]
pub struct Bridge<T, X> {
    bottom_size: usize,
    adds: Vec<AddRun<T>>,
    dels: Vec<Deletion<X>>,
    size: usize,
    generation: u64,
}

impl<T, X> Bridge<T, X> {
    /// Create a bridge with no edits over a bottom sequence of `bottom_size` items.
    pub fn new(bottom_size: usize) -> Self {
        Self {
            bottom_size,
            adds: vec![AddRun {
                slot: bottom_size as isize - 1,
                items: Vec::new(),
            }],
            dels: vec![Deletion::sentinel()],
            size: bottom_size,
            generation: 0,
        }
    }

    /// Create a bridge from existing edit lists.
    ///
    /// `adds` must be sorted by slot with distinct slots; `dels` must be strictly increasing and
    /// must not include the sentinel. A tail run is appended when `adds` does not end at
    /// `bottom_size - 1`.
    pub fn from_parts(bottom_size: usize, adds: Vec<(isize, Vec<T>)>, dels: Vec<(usize, X)>) -> Self {
        let tail = bottom_size as isize - 1;
        let mut adds: Vec<AddRun<T>> = adds
            .into_iter()
            .map(|(slot, items)| AddRun { slot, items })
            .collect();
        if adds.last().is_none_or(|run| run.slot != tail) {
            adds.push(AddRun {
                slot: tail,
                items: Vec::new(),
            });
        }

        let mut all_dels = Vec::with_capacity(dels.len() + 1);
        all_dels.push(Deletion::sentinel());
        all_dels.extend(dels.into_iter().map(|(bottom, extra)| Deletion {
            bottom: bottom as isize,
            extra: Some(extra),
        }));

        let added: usize = adds.iter().map(|run| run.items.len()).sum();
        let size = bottom_size + added - (all_dels.len() - 1);
        Self {
            bottom_size,
            adds,
            dels: all_dels,
            size,
            generation: 0,
        }
    }

    /// Current virtual size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the bottom sequence the bridge was built over.
    pub fn bottom_size(&self) -> usize {
        self.bottom_size
    }

    /// Mutation counter; handles from older generations are rejected.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Add runs, sorted by slot.
    pub fn adds(&self) -> &[AddRun<T>] {
        &self.adds
    }

    /// Deletions, sentinel first.
    pub fn dels(&self) -> &[Deletion<X>] {
        &self.dels
    }

    /// Whether the bridge carries no effective edit.
    pub fn is_pristine(&self) -> bool {
        self.dels.len() == 1 && self.adds.iter().all(|run| run.items.is_empty())
    }

    fn segments(&self) -> Segments<'_, T, X> {
        Segments {
            adds: &self.adds,
            dels: &self.dels,
            bottom_size: self.bottom_size,
            next_bottom: 0,
            run: 0,
            del: 1,
        }
    }

    /// Translate the inclusive virtual range `[tstart, tend]`.
    ///
    /// The range is clamped to `[0, size - 1]`; `tstart > tend` (after clamping) yields an empty
    /// translation.
    pub fn range_virtual_to_bottom(&self, tstart: isize, tend: isize) -> Translation {
        let tstart = tstart.max(0);
        let tend = tend.min(self.size as isize - 1);
        if tstart > tend {
            return Translation::empty((tstart as usize).min(self.size));
        }
        let (start, end) = (tstart as usize, tend as usize);
        let count = end - start + 1;
        let mut out = Translation {
            range: start..end + 1,
            slots: Vec::with_capacity(count),
            marks: Vec::with_capacity(count),
        };

        let mut pos = 0usize;
        let mut pending_del = false;
        for segment in self.segments() {
            if segment == Segment::Deleted {
                if pos > start && pos - 1 <= end {
                    out.marks[pos - 1 - start].del_after = true;
                }
                pending_del = true;
                continue;
            }

            let len = segment.len();
            if len == 0 {
                continue;
            }
            if pos > end {
                break;
            }
            if pos + len > start {
                let from = start.max(pos) - pos;
                let to = end.min(pos + len - 1) - pos;
                for offset in from..=to {
                    if let Some(slot) = segment.resolve(offset, self.generation) {
                        out.slots.push(slot);
                        out.marks.push(EditMarks {
                            del_before: offset == 0 && pending_del,
                            del_after: false,
                        });
                    }
                }
            }
            pending_del = false;
            pos += len;
        }

        out
    }

    /// Virtual index of bottom item `bottom`, or `None` when it is deleted or out of range.
    pub fn virtual_index_of_bottom(&self, bottom: usize) -> Option<usize> {
        let mut pos = 0;
        for segment in self.segments() {
            if let Segment::Original { first, len } = segment {
                if bottom < first {
                    return None;
                }
                if bottom < first + len {
                    return Some(pos + bottom - first);
                }
            }
            pos += segment.len();
        }
        None
    }

    /// Virtual index of the added item behind `handle`.
    pub fn virtual_index_of_handle(&self, handle: Handle) -> Result<usize> {
        self.check(handle)?;
        let mut pos = 0;
        for segment in self.segments() {
            if let Segment::Added { run, .. } = segment {
                if run == handle.run {
                    return Ok(pos + handle.index);
                }
            }
            pos += segment.len();
        }
        Err(OverlayError::InvalidHandle)
    }

    fn check(&self, handle: Handle) -> Result<()> {
        let live = handle.generation == self.generation
            && self
                .adds
                .get(handle.run)
                .is_some_and(|run| handle.index < run.items.len());
        if live {
            Ok(())
        } else {
            Err(OverlayError::InvalidHandle)
        }
    }

    /// Borrow the added item behind `handle`.
    pub fn item(&self, handle: Handle) -> Result<&T> {
        self.check(handle)?;
        Ok(&self.adds[handle.run].items[handle.index])
    }

    /// Replace the added item behind `handle`, returning the previous item.
    ///
    /// Replacing does not change the shape of the edit lists, so outstanding handles stay valid.
    pub fn replace(&mut self, handle: Handle, item: T) -> Result<T> {
        self.check(handle)?;
        Ok(std::mem::replace(
            &mut self.adds[handle.run].items[handle.index],
            item,
        ))
    }

    /// Remove the inclusive virtual range `[tstart, tend]`.
    ///
    /// Original items become deletions carrying `extras[i]` (the extra at the same offset in the
    /// range; missing extras are recorded as `None`). Added items are dropped from their run.
    /// Returns the number of removed positions.
    pub fn remove(&mut self, tstart: isize, tend: isize, extras: Vec<X>) -> usize {
        let translation = self.range_virtual_to_bottom(tstart, tend);
        let count = translation.len();
        if count == 0 {
            return 0;
        }

        let mut extras: Vec<Option<X>> = extras.into_iter().map(Some).collect();
        extras.resize_with(count, || None);

        // Back to front, so earlier handles keep pointing at the same items.
        for (slot, extra) in translation.slots.into_iter().zip(extras).rev() {
            match slot {
                Resolved::Bottom(bottom) => {
                    let bottom = bottom as isize;
                    let at = self.dels.partition_point(|d| d.bottom < bottom);
                    self.dels.insert(at, Deletion { bottom, extra });
                }
                Resolved::Added(handle) => {
                    let items = &mut self.adds[handle.run].items;
                    items.remove(handle.index);
                    if items.is_empty() && handle.run + 1 != self.adds.len() {
                        self.adds.remove(handle.run);
                    }
                }
            }
        }

        self.size -= count;
        self.generation += 1;
        count
    }

    /// Insert `items` as one contiguous run right after virtual position `tstart`.
    ///
    /// `tstart = -1` inserts at the very front; `tstart >= size - 1` appends to the tail run.
    pub fn insert(&mut self, tstart: isize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let count = items.len();
        let last = self.size as isize - 1;

        if tstart < 0 {
            match self.adds.first_mut() {
                Some(run) if run.slot == -1 => splice_front(&mut run.items, 0, items),
                _ => self.adds.insert(0, AddRun { slot: -1, items }),
            }
        } else if tstart >= last {
            self.append_to_tail(items);
        } else {
            let translation = self.range_virtual_to_bottom(tstart, tstart + 1);
            match translation.slots.as_slice() {
                [Resolved::Added(handle), ..] => {
                    splice_front(&mut self.adds[handle.run].items, handle.index + 1, items)
                }
                [_, Resolved::Added(handle)] => {
                    splice_front(&mut self.adds[handle.run].items, handle.index, items)
                }
                [Resolved::Bottom(bottom), ..] => {
                    let slot = *bottom as isize;
                    let at = self.adds.partition_point(|run| run.slot < slot);
                    match self.adds.get_mut(at) {
                        Some(run) if run.slot == slot => splice_front(&mut run.items, 0, items),
                        _ => self.adds.insert(at, AddRun { slot, items }),
                    }
                }
                [] => self.append_to_tail(items),
            }
        }

        self.size += count;
        self.generation += 1;
    }

    fn append_to_tail(&mut self, items: Vec<T>) {
        match self.adds.last_mut() {
            Some(tail) => tail.items.extend(items),
            None => self.adds.push(AddRun {
                slot: self.bottom_size as isize - 1,
                items,
            }),
        }
    }

    /// Whether the first virtual item is an original that directly follows deleted originals
    /// at the very front of the bottom sequence.
    pub fn has_deletion_at_front(&self) -> bool {
        let front = self.range_virtual_to_bottom(0, 0);
        matches!(front.slots.first(), Some(Resolved::Bottom(_)))
            && front.marks.first().is_some_and(|m| m.del_before)
    }

    /// Re-project sorted bottom positions (plus flagged added items) into virtual indices.
    ///
    /// `bottom` must be sorted by index. Deleted bottom positions are dropped. Added items are
    /// included when `flagged` returns a value for them. The output is sorted by virtual index.
    pub fn project<K, F>(&self, bottom: &[(usize, K)], flagged: F) -> Vec<(usize, K)>
    where
        K: Clone,
        F: Fn(&T) -> Option<K>,
    {
        let mut out = Vec::with_capacity(bottom.len());
        let mut next = 0;
        let mut pos = 0;
        for segment in self.segments() {
            match segment {
                Segment::Deleted => {}
                Segment::Original { first, len } => {
                    while next < bottom.len() && bottom[next].0 < first {
                        next += 1;
                    }
                    while next < bottom.len() && bottom[next].0 < first + len {
                        out.push((pos + bottom[next].0 - first, bottom[next].1.clone()));
                        next += 1;
                    }
                }
                Segment::Added { run, .. } => {
                    for (offset, item) in self.adds[run].items.iter().enumerate() {
                        if let Some(key) = flagged(item) {
                            out.push((pos + offset, key));
                        }
                    }
                }
            }
            pos += segment.len();
        }
        out
    }

    /// Flatten the edit lists into `(added items, deletion extras)` in virtual/bottom order.
    pub fn collect(&self) -> (Vec<T>, Vec<X>)
    where
        T: Clone,
        X: Clone,
    {
        let added = self
            .adds
            .iter()
            .flat_map(|run| run.items.iter().cloned())
            .collect();
        let deleted = self.dels[1..]
            .iter()
            .filter_map(|d| d.extra.clone())
            .collect();
        (added, deleted)
    }

    fn deletion_index(&self, bottom: isize) -> Option<usize> {
        self.dels[1..]
            .binary_search_by_key(&bottom, |d| d.bottom)
            .ok()
            .map(|i| i + 1)
    }
}

fn splice_front<T>(items: &mut Vec<T>, at: usize, inserted: Vec<T>) {
    let tail = items.split_off(at);
    items.extend(inserted);
    items.extend(tail);
}

enum Placed<T> {
    Original { first: usize, last: usize },
    Kept { slot: isize, item: T },
    Restored(usize),
}

impl<T: Squashable, X: DeletionExtra> Bridge<T, X> {
    /// Cancel deletions against unmodified copies of the deleted originals.
    ///
    /// A copy (an added item with the original's bottom index and key, not dirty) cancels its
    /// deletion when it sits exactly where the original would appear: after every visible
    /// bottom item with a smaller index and before every one with a larger index. Copies are
    /// taken greedily in virtual order, so a run of copies restored in order cancels as a
    /// whole. Remaining added items keep their slot unless a restored original now sits on the
    /// other side of it. The virtual sequence is unchanged; returns the number of cancelled
    /// deletions.
    pub fn squash(&mut self) -> usize {
        let layout: Vec<Segment> = self
            .segments()
            .filter(|segment| *segment != Segment::Deleted)
            .collect();

        let mut runs = std::mem::take(&mut self.adds).into_iter();
        let mut placed = Vec::new();
        for segment in layout {
            match segment {
                Segment::Original { first, len } => placed.push(Placed::Original {
                    first,
                    last: first + len - 1,
                }),
                Segment::Added { .. } => {
                    if let Some(run) = runs.next() {
                        let slot = run.slot;
                        placed.extend(
                            run.items
                                .into_iter()
                                .map(|item| Placed::Kept { slot, item }),
                        );
                    }
                }
                Segment::Deleted => {}
            }
        }

        let next_visible = self.next_visible(&placed);
        let mut last = -1isize;
        let mut restored = Vec::new();
        for (place, next) in placed.iter_mut().zip(next_visible) {
            let candidate = match place {
                Placed::Original { last: bottom, .. } => {
                    last = *bottom as isize;
                    None
                }
                Placed::Kept { item, .. } => self.cancellable(item, last, next),
                Placed::Restored(_) => None,
            };
            if let Some(bottom) = candidate {
                *place = Placed::Restored(bottom);
                last = bottom as isize;
                restored.push(bottom);
            }
        }

        let next_bound = self.next_visible(&placed);
        let mut adds: Vec<AddRun<T>> = Vec::new();
        let mut last = -1isize;
        for (place, next) in placed.into_iter().zip(next_bound) {
            match place {
                Placed::Original { last: bottom, .. } | Placed::Restored(bottom) => {
                    last = bottom as isize
                }
                Placed::Kept { slot, item } => {
                    let slot = slot.clamp(last, next as isize - 1);
                    match adds.last_mut() {
                        Some(run) if run.slot == slot => run.items.push(item),
                        _ => adds.push(AddRun {
                            slot,
                            items: vec![item],
                        }),
                    }
                }
            }
        }
        let tail = self.bottom_size as isize - 1;
        if adds.last().is_none_or(|run| run.slot != tail) {
            adds.push(AddRun {
                slot: tail,
                items: Vec::new(),
            });
        }

        self.adds = adds;
        self.dels
            .retain(|d| d.bottom < 0 || restored.binary_search(&(d.bottom as usize)).is_err());
        self.generation += 1;
        restored.len()
    }

    // First visible (or restored) bottom index strictly after each position.
    fn next_visible(&self, placed: &[Placed<T>]) -> Vec<usize> {
        let mut next = vec![self.bottom_size; placed.len()];
        let mut bound = self.bottom_size;
        for (i, place) in placed.iter().enumerate().rev() {
            next[i] = bound;
            match place {
                Placed::Original { first, .. } => bound = *first,
                Placed::Restored(bottom) => bound = *bottom,
                Placed::Kept { .. } => {}
            }
        }
        next
    }

    fn cancellable(&self, item: &T, last: isize, next: usize) -> Option<usize> {
        if item.is_dirty() {
            return None;
        }
        let (bottom, key) = item.origin()?;
        if bottom as isize <= last || bottom >= next {
            return None;
        }
        let del = &self.dels[self.deletion_index(bottom as isize)?];
        let deleted_key = del.extra.as_ref().and_then(DeletionExtra::deleted_key);
        (deleted_key == Some(key)).then_some(bottom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn worked_example() -> Bridge<&'static str, ()> {
        Bridge::from_parts(
            4,
            vec![(-1, vec!["a", "b"]), (2, vec!["c", "d"]), (3, vec!["e"])],
            vec![(2, ())],
        )
    }

    fn render(bridge: &Bridge<&'static str, ()>, tstart: isize, tend: isize) -> Vec<String> {
        let translation = bridge.range_virtual_to_bottom(tstart, tend);
        translation
            .slots
            .iter()
            .map(|slot| match slot {
                Resolved::Bottom(b) => b.to_string(),
                Resolved::Added(handle) => bridge.item(*handle).unwrap().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_worked_example_translation() {
        let bridge = worked_example();
        assert_eq!(bridge.size(), 8);
        assert_eq!(
            render(&bridge, 0, 7),
            vec!["a", "b", "0", "1", "c", "d", "3", "e"]
        );
        assert_eq!(
            bridge.range_virtual_to_bottom(0, 7).bottom_span(),
            Some((0, 3))
        );
    }

    #[test]
    fn test_partial_ranges_report_bottom_span() {
        let bridge = worked_example();

        let t = bridge.range_virtual_to_bottom(0, 1);
        assert_eq!(t.bottom_span(), None);
        assert_eq!(render(&bridge, 0, 1), vec!["a", "b"]);

        let t = bridge.range_virtual_to_bottom(3, 6);
        assert_eq!(t.bottom_span(), Some((1, 3)));
        assert_eq!(render(&bridge, 3, 6), vec!["1", "c", "d", "3"]);

        assert_eq!(render(&bridge, 7, 7), vec!["e"]);
        assert_eq!(render(&bridge, 6, 6), vec!["3"]);
    }

    #[test]
    fn test_range_is_clamped() {
        let bridge = worked_example();
        assert_eq!(render(&bridge, -5, 100).len(), 8);
        let t = bridge.range_virtual_to_bottom(5, 2);
        assert!(t.is_empty());
        let t = bridge.range_virtual_to_bottom(20, 30);
        assert!(t.is_empty());
        assert_eq!(t.range, 8..8);
    }

    #[test]
    fn test_deletion_marks() {
        let bridge = worked_example();
        let t = bridge.range_virtual_to_bottom(0, 7);
        // "1" (virtual 3) is followed by the deleted bottom 2, "c" follows it.
        assert!(t.marks[3].del_after);
        assert!(t.marks[4].del_before);
        let flagged = t
            .marks
            .iter()
            .filter(|m| m.del_before || m.del_after)
            .count();
        assert_eq!(flagged, 2);

        // Marks are computed even when the neighbor lies outside the range.
        let t = bridge.range_virtual_to_bottom(3, 3);
        assert!(t.marks[0].del_after);
        let t = bridge.range_virtual_to_bottom(4, 4);
        assert!(t.marks[0].del_before);
    }

    #[test]
    fn test_trailing_deletion_marks_last_item() {
        let bridge: Bridge<&str, ()> = Bridge::from_parts(4, vec![], vec![(3, ())]);
        let t = bridge.range_virtual_to_bottom(0, 2);
        assert_eq!(t.slots.last(), Some(&Resolved::Bottom(2)));
        assert!(t.marks[2].del_after);
    }

    #[test]
    fn test_empty_runs_and_consecutive_deletions() {
        let bridge: Bridge<&str, ()> = Bridge::from_parts(
            4,
            vec![(-1, vec![]), (2, vec!["c", "d"]), (3, vec!["e"])],
            vec![(1, ()), (2, ())],
        );
        assert_eq!(bridge.size(), 5);
        assert_eq!(render(&bridge, 0, 4), vec!["0", "c", "d", "3", "e"]);
        assert_eq!(render(&bridge, 1, 3), vec!["c", "d", "3"]);
        assert_eq!(
            bridge.range_virtual_to_bottom(1, 3).bottom_span(),
            Some((3, 3))
        );
    }

    #[test]
    fn test_insert_at_front_creates_then_merges_leading_run() {
        let mut bridge: Bridge<&str, ()> = Bridge::new(3);
        assert_eq!(bridge.adds().len(), 1);

        bridge.insert(-1, vec!["x"]);
        assert_eq!(bridge.adds().len(), 2);
        assert_eq!(bridge.adds()[0].slot(), -1);

        bridge.insert(-1, vec!["y"]);
        assert_eq!(bridge.adds().len(), 2);
        assert_eq!(bridge.adds()[0].items(), &["y", "x"]);
        assert_eq!(render(&bridge, 0, 4), vec!["y", "x", "0", "1", "2"]);
    }

    #[test]
    fn test_insert_between_originals_and_after_added() {
        let mut bridge: Bridge<&str, ()> = Bridge::new(3);
        bridge.insert(0, vec!["x"]);
        assert_eq!(render(&bridge, 0, 3), vec!["0", "x", "1", "2"]);

        // After an added item: same run.
        bridge.insert(1, vec!["y"]);
        assert_eq!(render(&bridge, 0, 4), vec!["0", "x", "y", "1", "2"]);
        assert_eq!(bridge.adds().len(), 2);

        // Before an added item: same run, in front of it.
        bridge.insert(0, vec!["w"]);
        assert_eq!(render(&bridge, 0, 5), vec!["0", "w", "x", "y", "1", "2"]);

        // Append at the end goes to the tail run.
        bridge.insert(5, vec!["z"]);
        assert_eq!(render(&bridge, 0, 6), vec!["0", "w", "x", "y", "1", "2", "z"]);
        assert_eq!(bridge.adds().last().unwrap().items(), &["z"]);
    }

    #[test]
    fn test_remove_records_deletions_and_prunes_runs() {
        let mut bridge: Bridge<&str, u8> = Bridge::new(4);
        bridge.insert(1, vec!["x"]);
        assert_eq!(bridge.size(), 5);

        let removed = bridge.remove(1, 2, vec![10, 20]);
        assert_eq!(removed, 2);
        assert_eq!(bridge.size(), 3);
        // bottom 1 deleted with extra 10; "x" dropped and its run pruned.
        assert_eq!(bridge.dels().len(), 2);
        assert_eq!(bridge.dels()[1].bottom(), 1);
        assert_eq!(bridge.dels()[1].extra(), Some(&10));
        assert_eq!(bridge.adds().len(), 1);
    }

    #[test]
    fn test_remove_keeps_tail_run() {
        let mut bridge: Bridge<&str, ()> = Bridge::new(2);
        bridge.insert(1, vec!["x"]);
        bridge.remove(2, 2, vec![]);
        assert_eq!(bridge.adds().len(), 1);
        assert_eq!(bridge.adds()[0].slot(), 1);
        assert!(bridge.adds()[0].items().is_empty());
        assert!(bridge.is_pristine());
    }

    #[test]
    fn test_missing_extras_are_none() {
        let mut bridge: Bridge<&str, u8> = Bridge::new(4);
        bridge.remove(0, 2, vec![1]);
        let extras: Vec<_> = bridge.dels()[1..].iter().map(|d| d.extra().copied()).collect();
        assert_eq!(extras, vec![Some(1), None, None]);
        let (_, deleted) = bridge.collect();
        assert_eq!(deleted, vec![1]);
    }

    #[test]
    fn test_handles_expire_after_mutation() {
        let mut bridge: Bridge<&str, ()> = Bridge::new(2);
        bridge.insert(0, vec!["x"]);
        let Resolved::Added(handle) = bridge.range_virtual_to_bottom(1, 1).slots[0] else {
            panic!("expected an added item");
        };
        assert_eq!(bridge.item(handle).unwrap(), &"x");
        assert_eq!(bridge.virtual_index_of_handle(handle).unwrap(), 1);

        assert_eq!(bridge.replace(handle, "y").unwrap(), "x");
        assert_eq!(bridge.item(handle).unwrap(), &"y");

        bridge.insert(-1, vec!["z"]);
        assert!(matches!(
            bridge.item(handle),
            Err(OverlayError::InvalidHandle)
        ));
    }

    #[test]
    fn test_virtual_index_of_bottom() {
        let bridge = worked_example();
        assert_eq!(bridge.virtual_index_of_bottom(0), Some(2));
        assert_eq!(bridge.virtual_index_of_bottom(1), Some(3));
        assert_eq!(bridge.virtual_index_of_bottom(2), None);
        assert_eq!(bridge.virtual_index_of_bottom(3), Some(6));
        assert_eq!(bridge.virtual_index_of_bottom(4), None);
    }

    #[test]
    fn test_project_shifts_and_collapses() {
        let bridge = worked_example();
        let highlights = vec![(0, "h0"), (2, "h2"), (3, "h3")];
        let projected = bridge.project(&highlights, |item| (*item == "d").then_some("hd"));
        assert_eq!(projected, vec![(2, "h0"), (5, "hd"), (6, "h3")]);
    }

    #[test]
    fn test_has_deletion_at_front() {
        let mut bridge: Bridge<&str, ()> = Bridge::new(3);
        assert!(!bridge.has_deletion_at_front());
        bridge.remove(0, 0, vec![]);
        assert!(bridge.has_deletion_at_front());
        bridge.insert(-1, vec!["x"]);
        assert!(!bridge.has_deletion_at_front());
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Restored {
        origin: Option<usize>,
        key: i64,
        dirty: bool,
    }

    impl Squashable for Restored {
        fn origin(&self) -> Option<(usize, SortKey)> {
            self.origin.map(|o| (o, SortKey::from_millis(self.key)))
        }

        fn is_dirty(&self) -> bool {
            self.dirty
        }
    }

    fn original(index: usize) -> Restored {
        Restored {
            origin: Some(index),
            key: index as i64 * 1000,
            dirty: false,
        }
    }

    fn tomb(index: usize) -> SortKey {
        SortKey::from_millis(index as i64 * 1000)
    }

    #[test]
    fn test_squash_reinsert_after_slot_before() {
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(5);
        bridge.remove(2, 2, vec![tomb(2)]);
        bridge.insert(1, vec![original(2)]);
        assert!(!bridge.is_pristine());

        assert_eq!(bridge.squash(), 1);
        assert!(bridge.is_pristine());
        assert_eq!(bridge.adds().len(), 1);
        let (added, deleted) = bridge.collect();
        assert!(added.is_empty());
        assert!(deleted.is_empty());
        assert_eq!(bridge.size(), 5);
    }

    #[test]
    fn test_squash_reinsert_at_head_of_existing_run() {
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(5);
        let fresh = Restored {
            origin: None,
            key: 2500,
            dirty: false,
        };
        bridge.insert(2, vec![fresh.clone()]);
        bridge.remove(2, 2, vec![tomb(2)]);
        // Virtual: 0 1 fresh 3 4; put bottom 2 back in front of `fresh`.
        bridge.insert(1, vec![original(2)]);

        assert_eq!(bridge.squash(), 1);
        assert_eq!(bridge.dels().len(), 1);
        let (added, _) = bridge.collect();
        assert_eq!(added, vec![fresh]);
    }

    #[test]
    fn test_squash_multi_item_run() {
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(6);
        bridge.remove(1, 3, vec![tomb(1), tomb(2), tomb(3)]);
        bridge.insert(0, vec![original(1), original(2), original(3)]);
        assert_eq!(bridge.squash(), 3);
        assert!(bridge.is_pristine());
    }

    #[test]
    fn test_squash_skips_dirty_and_moved_items() {
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(5);
        bridge.remove(2, 2, vec![tomb(2)]);
        let mut edited = original(2);
        edited.dirty = true;
        bridge.insert(1, vec![edited]);
        assert_eq!(bridge.squash(), 0);
        assert_eq!(bridge.dels().len(), 2);

        // Same item, different place: not adjacent to its deletion.
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(5);
        bridge.remove(2, 2, vec![tomb(2)]);
        bridge.insert(2, vec![original(2)]);
        assert_eq!(bridge.squash(), 0);

        // Same place, different key.
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(5);
        bridge.remove(2, 2, vec![tomb(2)]);
        let mut rekeyed = original(2);
        rekeyed.key += 1;
        bridge.insert(1, vec![rekeyed]);
        assert_eq!(bridge.squash(), 0);
    }

    #[test]
    fn test_squash_reanchors_items_behind_restored_originals() {
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(6);
        let fresh = Restored {
            origin: None,
            key: 2500,
            dirty: false,
        };
        // Fresh item anchored after bottom 2, then bottoms 2 and 3 deleted.
        bridge.insert(2, vec![fresh.clone()]);
        bridge.remove(2, 2, vec![tomb(2)]);
        bridge.remove(3, 3, vec![tomb(3)]);
        // Virtual: 0 1 fresh 4 5. Copies of 2 and 3 go back after bottom 1.
        bridge.insert(1, vec![original(2), original(3)]);

        assert_eq!(bridge.squash(), 2);
        assert_eq!(bridge.dels().len(), 1);
        assert_eq!(bridge.adds()[0].slot(), 3);
        assert_eq!(bridge.adds()[0].items(), &[fresh]);
        assert_eq!(bridge.virtual_index_of_bottom(3), Some(3));
        assert_eq!(bridge.size(), 7);
    }

    #[test]
    fn test_squash_prefers_copies_in_virtual_order() {
        let mut bridge: Bridge<Restored, SortKey> = Bridge::new(4);
        bridge.remove(1, 1, vec![tomb(1)]);
        // Two copies of bottom 1 side by side; only the first can become the original again.
        bridge.insert(0, vec![original(1), original(1)]);
        assert_eq!(bridge.squash(), 1);
        assert_eq!(bridge.dels().len(), 1);
        let (added, _) = bridge.collect();
        assert_eq!(added, vec![original(1)]);
        assert_eq!(bridge.virtual_index_of_bottom(1), Some(1));
    }
}
