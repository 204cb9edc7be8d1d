//! Error type of the descriptor and commit codecs.

use overlay_core::SortKey;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors produced while reading or writing descriptor files and commit payloads.
pub enum CodecError {
    #[error("unexpected end of input at byte {offset}: need {needed} more, {available} left")]
    /// A record or field runs past the end of the buffer.
    Truncated {
        /// Byte offset the read started at.
        offset: usize,
        /// Bytes the read needed.
        needed: usize,
        /// Bytes that were left.
        available: usize,
    },

    #[error("commit payload has no separator between additions and deletions")]
    /// The `0` byte closing the addition list is missing.
    MissingSeparator,

    #[error("key {key} does not fit the wire format")]
    /// The coarse second of a key is negative or beyond `u32`.
    KeyOutOfRange {
        /// Offending key.
        key: SortKey,
    },

    #[error("{field} value {value} does not fit its wire field")]
    /// A numeric field exceeds its fixed width.
    FieldOverflow {
        /// Field name.
        field: &'static str,
        /// Value that was being written.
        value: u64,
    },

    #[error("widget type {0:?} is not a single non-zero byte")]
    /// Widget types are written as one byte, and `0` is reserved for the separator.
    InvalidWidgetType(char),

    #[error("item at {key} is not a widget; only widgets can be committed")]
    /// The commit payload carries widget records only.
    NotAWidget {
        /// Key of the rejected item.
        key: SortKey,
    },

    #[error("item at {key} is not an image")]
    /// An image descriptor was asked to hold a non-image item.
    NotAnImage {
        /// Key of the rejected item.
        key: SortKey,
    },

    #[error("deletion of {key} does not match any record")]
    /// A deleted key was not found in the descriptor being patched.
    UnmatchedDeletion {
        /// Key that was not found.
        key: SortKey,
    },

    #[error("{len} records share second {base}; offsets cannot be renumbered")]
    /// More records in one second than an `i8` offset can tell apart.
    GroupTooLarge {
        /// Coarse second of the group.
        base: u32,
        /// Number of records in the group.
        len: usize,
    },
}

/// Result alias used throughout `overlay-core-codec`.
pub type Result<T> = std::result::Result<T, CodecError>;
