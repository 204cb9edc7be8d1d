#![warn(missing_docs)]
//! Overlay Core - Speculative Edits over a Paginated Timeline
//!
//! # Overview
//!
//! `overlay-core` presents a long, remotely stored, sorted sequence of items (a photo/message
//! timeline) as one editable list. The original sequence is read-only and fetched in pages;
//! local inserts, deletes, moves and edits live in an overlay on top of it until they are
//! collected and committed.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Reordering Functions                       │  ← Key placement
//! ├─────────────────────────────────────────────┤
//! │  Windowed View (cache + neighbor excerpts)  │  ← Scrolling window
//! ├─────────────────────────────────────────────┤
//! │  Overlay Data Source                        │  ← Paged reads + edits
//! ├─────────────────────────────────────────────┤
//! │  Index Bridge (adds / dels)                 │  ← Index translation
//! ├─────────────────────────────────────────────┤
//! │  Bottom Data Source                         │  ← Original sequence
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use overlay_core::{Bridge, Resolved};
//!
//! // Four originals; bottom 2 deleted, "x" inserted after bottom 0.
//! let mut bridge: Bridge<&str, ()> = Bridge::new(4);
//! bridge.remove(2, 2, vec![()]);
//! bridge.insert(0, vec!["x"]);
//!
//! assert_eq!(bridge.size(), 4);
//! let translation = bridge.range_virtual_to_bottom(0, 3);
//! assert_eq!(translation.slots[0], Resolved::Bottom(0));
//! assert!(matches!(translation.slots[1], Resolved::Added(_)));
//! assert_eq!(translation.slots[2], Resolved::Bottom(1));
//! assert_eq!(translation.slots[3], Resolved::Bottom(3));
//! assert!(translation.marks[2].del_after);
//! ```
//!
//! # Module Description
//!
//! - [`item`] - Items, sort keys and identities
//! - [`source`] - Paged data-source contract and the in-memory bottom source
//! - [`bridge`] - Virtual ↔ bottom index translation over sparse edit lists
//! - [`overlay`] - Overlay data source (reads, edits, highlights, collect)
//! - [`view`] - Windowed view with neighbor annotation
//! - [`reorder`] - Move/add/edit/remove with neighbor-derived keys
//! - [`observable`] - Publish-on-change value cells
//!
//! # Concurrency
//!
//! Bridge edits are synchronous and run under the overlay's write lock; reads share a read lock
//! that is released before any bottom fetch. Views discard fetch results that a later
//! [`WindowedView::jump_to`] superseded.

pub mod bridge;
pub mod error;
pub mod item;
pub mod observable;
pub mod overlay;
pub mod reorder;
pub mod source;
pub mod view;

pub use bridge::{
    AddRun, Bridge, Deletion, DeletionExtra, EditMarks, Handle, Resolved, Squashable, Translation,
};
pub use error::{OverlayError, Result, UpstreamError};
pub use item::{
    HighlightedItem, Item, ItemId, ItemKind, Payload, SortKey, Tombstone, UNITS_PER_SECOND,
};
pub use observable::{ChangeCallback, Observable};
pub use overlay::{Collected, OverlaySource};
pub use reorder::ReorderPolicy;
pub use source::{Anchor, DataSource, Entry, MemorySource, Page, PageQuery};
pub use view::{Neighbor, Tracker, ViewConfig, ViewItem, ViewState, WindowedView};
