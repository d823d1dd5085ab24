//! Order book error types

use common::{Px, Qty, Side};
use thiserror::Error;

/// Errors raised by book mutations and reads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobError {
    /// Modify referenced a price with no resting level
    #[error("unknown {side} level at {price}")]
    UnknownLevel {
        /// Side of the book
        side: Side,
        /// Price that was not found
        price: Px,
    },

    /// Size below zero
    #[error("invalid size {size} for {side} level at {price}")]
    InvalidSize {
        /// Side of the book
        side: Side,
        /// Level price
        price: Px,
        /// Offending size
        size: Qty,
    },

    /// Best bid at or through best ask
    #[error("crossed book: bid {bid} >= ask {ask}")]
    CrossedBook {
        /// Best bid price
        bid: Px,
        /// Best ask price
        ask: Px,
    },
}
