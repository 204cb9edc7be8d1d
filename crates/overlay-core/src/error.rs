//! Error type of the overlay engine.

use thiserror::Error;

/// Boxed error produced by a bottom source's transport or storage.
pub type UpstreamError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
/// Errors produced by the overlay engine.
///
/// Every variant except [`OverlayError::Upstream`] is a programming error: the caller asked for
/// something the engine cannot do in its current state. Running out of data is never an error;
/// it shows up as a short page or a `false` load result instead.
pub enum OverlayError {
    #[error("edit handle is stale or does not resolve to an added item")]
    /// A bridge handle was used after the bridge it came from was mutated.
    InvalidHandle,

    #[error("highlight baseline has not been synchronized; load highlights before editing")]
    /// A mutator ran before the first highlight synchronization.
    HighlightsNotSynced,

    #[error("{0} is not supported by this data source")]
    /// A pagination direction/anchor the source does not serve.
    Unsupported(&'static str),

    #[error("virtual index {index} is out of range (size {size})")]
    /// A composite edit addressed a position that does not exist.
    IndexOutOfRange {
        /// Requested virtual index.
        index: usize,
        /// Virtual size at the time of the request.
        size: usize,
    },

    #[error("neighbor of the item at {index} is not loaded yet")]
    /// A reordering decision needs a neighbor the window has not resolved.
    NeighborUnknown {
        /// Virtual index of the item being reordered.
        index: usize,
    },

    #[error("bottom source returned {got} items for a window of {expected}")]
    /// The bottom source served fewer items than its own size promised.
    ShortRead {
        /// Items requested.
        expected: usize,
        /// Items returned.
        got: usize,
    },

    #[error(transparent)]
    /// Failure reported by the bottom source, passed through unchanged.
    Upstream(#[from] UpstreamError),
}

/// Result alias used throughout `overlay-core`.
pub type Result<T> = std::result::Result<T, OverlayError>;
