//! Timeline items and their sort keys.
//!
//! Every entry of a timeline is an [`Item`]: a payload (photo, widget, ...) positioned by a
//! [`SortKey`]. Items served by a bottom source are *original*; items created locally get a
//! fresh [`ItemId`] and are *added*.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of key units (milliseconds) per coarse timestamp unit (second).
pub const UNITS_PER_SECOND: i64 = 1000;

/// Totally ordered timeline key (`dto`).
///
/// The key is stored as signed milliseconds. It can be viewed as a coarse timestamp
/// [`dt`](SortKey::dt) (seconds) paired with a fine [`offset`](SortKey::offset) in milliseconds;
/// the split rounds to the nearest second so the offset stays in `(-500, 500]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(i64);

impl SortKey {
    /// Create a key from raw milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Create a key from a coarse second and a millisecond offset.
    pub const fn from_parts(dt: i64, offset: i64) -> Self {
        Self(dt * UNITS_PER_SECOND + offset)
    }

    /// Raw milliseconds.
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Coarse timestamp (seconds), rounded to the nearest second.
    pub fn dt(self) -> i64 {
        let rem = self.0.rem_euclid(UNITS_PER_SECOND);
        let base = (self.0 - rem) / UNITS_PER_SECOND;
        if rem > UNITS_PER_SECOND / 2 {
            base + 1
        } else {
            base
        }
    }

    /// Fine offset in milliseconds relative to [`dt`](SortKey::dt).
    pub fn offset(self) -> i64 {
        self.0 - self.dt() * UNITS_PER_SECOND
    }

    /// Key moved by `units` minimal units (negative moves toward the past).
    pub fn shifted(self, units: i64) -> Self {
        Self(self.0.saturating_add(units))
    }

    /// Key halfway between `self` and `other`, rounded toward negative infinity.
    pub fn midpoint(self, other: SortKey) -> Self {
        let (lo, hi) = if self <= other {
            (self.0, other.0)
        } else {
            (other.0, self.0)
        };
        Self(lo + (hi - lo).div_euclid(2))
    }

    /// Distance from `self` to a later key (negative when `later` is earlier).
    pub fn gap_to(self, later: SortKey) -> i64 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:+})", self.dt(), self.offset())
    }
}

/// Unique identity of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Mint a new, never-before-seen identity.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn get(self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Kind tag of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A photo.
    Image,
    /// A text widget (message, note, ...).
    Widget,
}

/// Item payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Photo reference.
    Image {
        /// Photo id on the storage side.
        pid: u32,
        /// Thumbnail height (storage units).
        height: u8,
        /// Thumbnail width (storage units).
        width: u8,
    },
    /// Text widget.
    Widget {
        /// One-character widget type tag.
        widget_type: char,
        /// Widget text.
        text: String,
    },
}

impl Payload {
    /// Kind tag derived from the payload variant.
    pub fn kind(&self) -> ItemKind {
        match self {
            Payload::Image { .. } => ItemKind::Image,
            Payload::Widget { .. } => ItemKind::Widget,
        }
    }
}

/// A timeline item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Identity (fresh for every locally added or mutated item).
    pub id: ItemId,
    /// Sort key.
    pub key: SortKey,
    /// Payload fields.
    pub payload: Payload,
    /// Bottom index this item was read from, if it came from the bottom source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<usize>,
    /// Set by reordering/editing; dirty items are never squashed away.
    #[serde(default)]
    pub dirty: bool,
    /// Virtual index the item had before its first reordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_from: Option<usize>,
    /// Highlight tag carried by a locally added item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

impl Item {
    /// Create an item with a fresh identity.
    pub fn new(key: SortKey, payload: Payload) -> Self {
        Self {
            id: ItemId::fresh(),
            key,
            payload,
            origin: None,
            dirty: false,
            moved_from: None,
            highlight: None,
        }
    }

    /// Create a photo item.
    pub fn image(key: SortKey, pid: u32, height: u8, width: u8) -> Self {
        Self::new(
            key,
            Payload::Image {
                pid,
                height,
                width,
            },
        )
    }

    /// Create a text widget item.
    pub fn widget(key: SortKey, widget_type: char, text: impl Into<String>) -> Self {
        Self::new(
            key,
            Payload::Widget {
                widget_type,
                text: text.into(),
            },
        )
    }

    /// Attach a highlight tag.
    pub fn with_highlight(mut self, tag: impl Into<String>) -> Self {
        self.highlight = Some(tag.into());
        self
    }

    /// Kind tag of this item.
    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }
}

/// Deletion extra recorded for every removed original item.
///
/// The overlay hands these back verbatim from `collect()`; the commit payload only needs the
/// deleted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Key of the removed item.
    pub key: SortKey,
    /// Kind of the removed item.
    pub kind: ItemKind,
}

impl Tombstone {
    /// Tombstone describing `item` as it is right now.
    pub fn of(item: &Item) -> Self {
        Self {
            key: item.key,
            kind: item.kind(),
        }
    }
}

/// A highlighted position reported by a data source.
///
/// Bottom sources report bottom indices; the overlay reports virtual indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighlightedItem {
    /// Position in the source's index space.
    pub index: usize,
    /// Highlight tag.
    pub tag: String,
}

impl HighlightedItem {
    /// Create a highlight record.
    pub fn new(index: usize, tag: impl Into<String>) -> Self {
        Self {
            index,
            tag: tag.into(),
        }
    }
}
