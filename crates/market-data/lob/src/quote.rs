//! Two-sided quote for a single instrument

use crate::error::LobError;
use crate::price_levels::{BookSide, LevelChange, LevelOp, PriceLevel};
use common::{Px, Qty, Side, Ts};
use serde::{Deserialize, Serialize};

/// Best bid and ask prices at the moment a book became crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossed {
    /// Best bid price
    pub bid: Px,
    /// Best ask price
    pub ask: Px,
}

/// Result of applying one operation to a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookChange {
    /// Side that was mutated
    pub side: Side,
    /// What happened on that side
    pub change: LevelChange,
    /// Set when this mutation left the book crossed
    pub crossed: Option<Crossed>,
}

/// Top of book, only available while the book is not crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbo {
    /// Best bid (price, size)
    pub bid: Option<(Px, Qty)>,
    /// Best ask (price, size)
    pub ask: Option<(Px, Qty)>,
}

/// The bid and ask sides of one instrument
#[derive(Debug, Clone)]
pub struct Quote {
    bid: BookSide,
    ask: BookSide,
    last_update: Ts,
    sequence: u64,
}

impl Default for Quote {
    fn default() -> Self {
        Self::new()
    }
}

impl Quote {
    /// Create an empty quote
    #[must_use]
    pub fn new() -> Self {
        Self {
            bid: BookSide::new(Side::Bid),
            ask: BookSide::new(Side::Ask),
            last_update: Ts::default(),
            sequence: 0,
        }
    }

    /// Apply an operation to one side and check for a crossed book
    ///
    /// On error the quote is left untouched.
    ///
    /// # Errors
    /// Propagates `UnknownLevel` and `InvalidSize` from the side
    pub fn apply(&mut self, side: Side, op: LevelOp, ts: Ts) -> Result<BookChange, LobError> {
        let change = self.side_mut(side).apply(op)?;

        if change.is_mutation() {
            self.sequence += 1;
            self.last_update = ts;
        }

        // Only a mutation can create a violation; a no-op never re-reports one
        let crossed = if change.is_mutation() {
            self.crossed()
        } else {
            None
        };

        Ok(BookChange {
            side,
            change,
            crossed,
        })
    }

    /// Book side by [`Side`]
    #[inline]
    #[must_use]
    pub const fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bid,
            Side::Ask => &mut self.ask,
        }
    }

    /// Bid side
    #[inline]
    #[must_use]
    pub const fn bid(&self) -> &BookSide {
        &self.bid
    }

    /// Ask side
    #[inline]
    #[must_use]
    pub const fn ask(&self) -> &BookSide {
        &self.ask
    }

    /// Best bid level
    #[inline]
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bid.best_level()
    }

    /// Best ask level
    #[inline]
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.ask.best_level()
    }

    /// Bid and ask prices if the book is crossed
    #[must_use]
    pub fn crossed(&self) -> Option<Crossed> {
        let bid = self.bid.best_level()?.price();
        let ask = self.ask.best_level()?.price();
        (bid >= ask).then_some(Crossed { bid, ask })
    }

    /// Check if book is crossed
    #[inline]
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.crossed().is_some()
    }

    /// Top of book
    ///
    /// # Errors
    /// Returns `CrossedBook` while best bid >= best ask
    pub fn bbo(&self) -> Result<Bbo, LobError> {
        if let Some(Crossed { bid, ask }) = self.crossed() {
            return Err(LobError::CrossedBook { bid, ask });
        }
        Ok(Bbo {
            bid: self.bid.best_level().map(|l| (l.price(), l.size())),
            ask: self.ask.best_level().map(|l| (l.price(), l.size())),
        })
    }

    /// Spread in ticks; `None` if a side is empty, the book is crossed or
    /// the difference does not fit in a price
    #[must_use]
    pub fn spread(&self) -> Option<Px> {
        self.raw_spread().map(Px::from_i64)
    }

    /// Mid price (rounded down to a tick); `None` whenever [`Self::spread`] is
    #[must_use]
    pub fn mid(&self) -> Option<Px> {
        let bid = self.best_bid()?.price().as_i64();
        let half = self.raw_spread()? / 2;
        Some(Px::from_i64(bid + half))
    }

    fn raw_spread(&self) -> Option<i64> {
        let bid = self.best_bid()?.price();
        let ask = self.best_ask()?.price();
        if ask <= bid {
            return None;
        }
        ask.as_i64().checked_sub(bid.as_i64())
    }

    /// Timestamp of the last mutation
    #[inline]
    #[must_use]
    pub const fn last_update(&self) -> Ts {
        self.last_update
    }

    /// Number of mutations applied
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Remove all levels from both sides
    pub fn clear(&mut self) {
        self.bid.clear();
        self.ask.clear();
    }
}
