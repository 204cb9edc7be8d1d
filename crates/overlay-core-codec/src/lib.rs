#![warn(missing_docs)]
//! Overlay Core Codec - Binary Formats around the Overlay Engine
//!
//! # Overview
//!
//! `overlay-core` never touches bytes. This crate holds the binary collaborators around it:
//!
//! - decoding the media descriptor files (`images.bin`, `widgets.bin`) a bottom source is
//!   populated from;
//! - encoding the output of [`OverlaySource::collect`](overlay_core::OverlaySource::collect)
//!   into the commit payload sent to the server;
//! - applying such a payload to a widget descriptor file, the way the server does.
//!
//! # Quick Start
//!
//! ```rust
//! use overlay_core::{Collected, Item, SortKey};
//! use overlay_core_codec::{apply_commit, decode_widgets, encode_commit};
//!
//! let collected = Collected {
//!     added: vec![Item::widget(SortKey::from_millis(5_000), 'm', "hello")],
//!     deleted: vec![],
//! };
//! let payload = encode_commit(&collected).unwrap();
//! let file = apply_commit(&[], &payload).unwrap();
//!
//! let widgets = decode_widgets(&file).unwrap();
//! assert_eq!(widgets.len(), 1);
//! // Offsets are renumbered inside every second.
//! assert_eq!(widgets[0].key, SortKey::from_millis(5_001));
//! ```
//!
//! # Module Description
//!
//! - [`wire`] - Big-endian field reader and the `(base, offset)` key split
//! - [`descriptor`] - Image/widget records and the chunked [`DescriptorReader`]
//! - [`commit`] - Commit payload encode/decode and server-side merge

pub mod commit;
pub mod descriptor;
pub mod error;
pub mod wire;

pub use commit::{Commit, apply_commit, decode_commit, encode_commit};
pub use descriptor::{
    DEFAULT_CHUNK_SIZE, DescriptorReader, ImageRecord, Record, WidgetRecord, decode_images,
    decode_widgets, encode_images, encode_widgets,
};
pub use error::{CodecError, Result};
pub use wire::{ByteReader, WireKey};
