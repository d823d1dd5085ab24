//! L2 limit order book: price-level sides and per-instrument quotes
//!
//! Books are keyed by price alone. Each side is a contiguous vector kept in
//! best-to-worst order, so every mutation is an O(depth) scan. Exchange depth
//! is small and bounded, which keeps the scan inside a few cache lines.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]

pub mod error;
pub mod price_levels;
pub mod quote;

pub use error::LobError;
pub use price_levels::{BookSide, LevelChange, LevelOp, PriceLevel};
pub use quote::{Bbo, BookChange, Crossed, Quote};
