//! Price level management for one side of the order book

use crate::error::LobError;
use common::constants::DEFAULT_BOOK_DEPTH;
use common::{Px, Qty, Side};
use serde::{Deserialize, Serialize};

/// One aggregated price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    price: Px,
    size: Qty,
    /// Ordinal position within the side (0 = best)
    position: usize,
}

impl PriceLevel {
    /// Level price
    #[inline]
    #[must_use]
    pub const fn price(&self) -> Px {
        self.price
    }

    /// Aggregate size resting at this price
    #[inline]
    #[must_use]
    pub const fn size(&self) -> Qty {
        self.size
    }

    /// Ordinal position within the side (0 = best)
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }
}

/// A single L2 operation on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelOp {
    /// Level appeared (replace if the price already exists)
    New {
        /// Level price
        price: Px,
        /// Aggregate size
        size: Qty,
    },
    /// Level size changed
    Modify {
        /// Level price
        price: Px,
        /// New aggregate size
        size: Qty,
    },
    /// Level removed
    Delete {
        /// Level price
        price: Px,
    },
}

impl LevelOp {
    /// Price the operation targets
    #[must_use]
    pub const fn price(&self) -> Px {
        match self {
            Self::New { price, .. } | Self::Modify { price, .. } | Self::Delete { price } => *price,
        }
    }
}

/// Structural effect of a mutation on a side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    /// A new level was inserted
    Inserted {
        /// Position of the new level
        position: usize,
    },
    /// An existing level had its size overwritten
    Updated {
        /// Position of the level
        position: usize,
        /// Size before the update
        previous: Qty,
    },
    /// A level was removed
    Removed {
        /// Position the level occupied
        position: usize,
        /// Size before removal
        previous: Qty,
    },
    /// Nothing changed (e.g. delete of an absent level)
    Unchanged,
}

impl LevelChange {
    /// True if the side was structurally or numerically modified
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// True if the top of the side may have moved
    #[must_use]
    pub const fn touches_top(&self) -> bool {
        match self {
            Self::Inserted { position }
            | Self::Updated { position, .. }
            | Self::Removed { position, .. } => *position == 0,
            Self::Unchanged => false,
        }
    }
}

/// One side of the order book (bid or ask)
///
/// Levels are kept in a contiguous vector ordered best-first: descending
/// prices for bids, ascending for asks. Lookups and inserts scan linearly,
/// O(depth); no two levels share a price and no present level has size <= 0.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: Vec<PriceLevel>,
}

impl BookSide {
    /// Create a new empty side
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: Vec::with_capacity(DEFAULT_BOOK_DEPTH),
        }
    }

    /// Which side this is
    #[inline]
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Apply a single operation
    ///
    /// # Errors
    /// See [`Self::apply_new`] and [`Self::apply_modify`]
    pub fn apply(&mut self, op: LevelOp) -> Result<LevelChange, LobError> {
        match op {
            LevelOp::New { price, size } => self.apply_new(price, size),
            LevelOp::Modify { price, size } => self.apply_modify(price, size),
            LevelOp::Delete { price } => Ok(self.apply_delete(price)),
        }
    }

    /// Insert a level, or replace the size of an existing one
    ///
    /// Size zero removes the level.
    ///
    /// # Errors
    /// Returns `InvalidSize` for a negative size
    pub fn apply_new(&mut self, price: Px, size: Qty) -> Result<LevelChange, LobError> {
        self.check_size(price, size)?;
        if size.is_zero() {
            return Ok(self.apply_delete(price));
        }

        match self.search(price) {
            Ok(position) => Ok(self.overwrite(position, size)),
            Err(position) => {
                self.levels.insert(
                    position,
                    PriceLevel {
                        price,
                        size,
                        position,
                    },
                );
                self.renumber(position + 1);
                Ok(LevelChange::Inserted { position })
            }
        }
    }

    /// Overwrite the size of an existing level
    ///
    /// Size zero removes the level.
    ///
    /// # Errors
    /// Returns `UnknownLevel` if no level rests at `price`, `InvalidSize` for
    /// a negative size
    pub fn apply_modify(&mut self, price: Px, size: Qty) -> Result<LevelChange, LobError> {
        self.check_size(price, size)?;
        let position = self.search(price).map_err(|_| LobError::UnknownLevel {
            side: self.side,
            price,
        })?;

        if size.is_zero() {
            return Ok(self.remove(position));
        }
        Ok(self.overwrite(position, size))
    }

    /// Remove a level; absent levels are a no-op
    pub fn apply_delete(&mut self, price: Px) -> LevelChange {
        match self.search(price) {
            Ok(position) => self.remove(position),
            Err(_) => LevelChange::Unchanged,
        }
    }

    /// Best level (highest bid / lowest ask)
    #[inline]
    #[must_use]
    pub fn best_level(&self) -> Option<&PriceLevel> {
        self.levels.first()
    }

    /// Head of the ordered sequence
    #[inline]
    #[must_use]
    pub fn top_level(&self) -> Option<&PriceLevel> {
        self.best_level()
    }

    /// Level after `level` in best-to-worst order
    #[must_use]
    pub fn next_level(&self, level: &PriceLevel) -> Option<&PriceLevel> {
        let next = self.levels.get(level.position + 1)?;
        // Stale handles from before a mutation must not walk off-order
        self.side.is_better(level.price, next.price).then_some(next)
    }

    /// Level at ordinal position
    #[inline]
    #[must_use]
    pub fn level_at(&self, position: usize) -> Option<&PriceLevel> {
        self.levels.get(position)
    }

    /// Level resting at `price`
    #[must_use]
    pub fn find(&self, price: Px) -> Option<&PriceLevel> {
        self.search(price).ok().map(|position| &self.levels[position])
    }

    /// Iterate levels best-to-worst
    pub fn levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.iter()
    }

    /// Number of levels
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Check if side is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Total size over the best `max_levels` levels
    #[must_use]
    pub fn total_size(&self, max_levels: usize) -> Qty {
        self.levels
            .iter()
            .take(max_levels)
            .fold(Qty::ZERO, |acc, level| acc.saturating_add(level.size))
    }

    /// Clear all levels
    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Check ordering, uniqueness, positive sizes and position bookkeeping
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let ordered = self
            .levels
            .windows(2)
            .all(|pair| self.side.is_better(pair[0].price, pair[1].price));
        let sized = self.levels.iter().all(|level| level.size.is_positive());
        let numbered = self
            .levels
            .iter()
            .enumerate()
            .all(|(i, level)| level.position == i);
        ordered && sized && numbered
    }

    /// Index of `price`, or the insertion point that keeps ordering
    fn search(&self, price: Px) -> Result<usize, usize> {
        for (i, level) in self.levels.iter().enumerate() {
            if level.price == price {
                return Ok(i);
            }
            if self.side.is_better(price, level.price) {
                return Err(i);
            }
        }
        Err(self.levels.len())
    }

    fn overwrite(&mut self, position: usize, size: Qty) -> LevelChange {
        let level = &mut self.levels[position];
        let previous = level.size;
        level.size = size;
        LevelChange::Updated { position, previous }
    }

    fn remove(&mut self, position: usize) -> LevelChange {
        let removed = self.levels.remove(position);
        self.renumber(position);
        LevelChange::Removed {
            position,
            previous: removed.size,
        }
    }

    fn renumber(&mut self, from: usize) {
        for (i, level) in self.levels.iter_mut().enumerate().skip(from) {
            level.position = i;
        }
    }

    fn check_size(&self, price: Px, size: Qty) -> Result<(), LobError> {
        if size.as_i64() < 0 {
            return Err(LobError::InvalidSize {
                side: self.side,
                price,
                size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(ticks: i64) -> Px {
        Px::from_i64(ticks)
    }

    fn qty(units: i64) -> Qty {
        Qty::from_i64(units)
    }

    fn prices(side: &BookSide) -> Vec<i64> {
        side.levels().map(|l| l.price().as_i64()).collect()
    }

    #[test]
    fn test_new_then_modify_on_empty_ask() {
        let mut asks = BookSide::new(Side::Ask);
        assert_eq!(
            asks.apply_new(px(100), qty(10)),
            Ok(LevelChange::Inserted { position: 0 })
        );
        assert_eq!(
            asks.apply_modify(px(100), qty(5)),
            Ok(LevelChange::Updated {
                position: 0,
                previous: qty(10)
            })
        );

        let best = asks.best_level().copied();
        assert_eq!(best.map(|l| (l.price(), l.size())), Some((px(100), qty(5))));
    }

    #[test]
    fn test_ordering_per_side() {
        let mut bids = BookSide::new(Side::Bid);
        let mut asks = BookSide::new(Side::Ask);
        for p in [100, 102, 101, 99] {
            bids.apply_new(px(p), qty(1)).ok();
            asks.apply_new(px(p), qty(1)).ok();
        }
        assert_eq!(prices(&bids), vec![102, 101, 100, 99]);
        assert_eq!(prices(&asks), vec![99, 100, 101, 102]);
        assert!(bids.is_well_formed());
        assert!(asks.is_well_formed());
    }

    #[test]
    fn test_new_on_existing_price_replaces() {
        let mut bids = BookSide::new(Side::Bid);
        bids.apply_new(px(100), qty(10)).ok();
        let change = bids.apply_new(px(100), qty(3));
        assert_eq!(
            change,
            Ok(LevelChange::Updated {
                position: 0,
                previous: qty(10)
            })
        );
        assert_eq!(bids.depth(), 1);
        assert_eq!(bids.find(px(100)).map(PriceLevel::size), Some(qty(3)));
    }

    #[test]
    fn test_modify_unknown_level() {
        let mut bids = BookSide::new(Side::Bid);
        assert_eq!(
            bids.apply_modify(px(100), qty(5)),
            Err(LobError::UnknownLevel {
                side: Side::Bid,
                price: px(100)
            })
        );
        assert!(bids.is_empty());
    }

    #[test]
    fn test_delete_absent_level_is_noop() {
        let mut asks = BookSide::new(Side::Ask);
        asks.apply_new(px(101), qty(7)).ok();
        assert_eq!(asks.apply_delete(px(100)), LevelChange::Unchanged);
        assert_eq!(prices(&asks), vec![101]);
    }

    #[test]
    fn test_zero_size_removes_level() {
        let mut asks = BookSide::new(Side::Ask);
        asks.apply_new(px(100), qty(1)).ok();
        asks.apply_new(px(101), qty(1)).ok();
        assert_eq!(
            asks.apply_modify(px(100), Qty::ZERO),
            Ok(LevelChange::Removed {
                position: 0,
                previous: qty(1)
            })
        );
        assert_eq!(asks.apply_new(px(101), Qty::ZERO), Ok(LevelChange::Removed {
            position: 0,
            previous: qty(1)
        }));
        assert!(asks.is_empty());
    }

    #[test]
    fn test_negative_size_rejected() {
        let mut bids = BookSide::new(Side::Bid);
        assert!(matches!(
            bids.apply_new(px(100), qty(-1)),
            Err(LobError::InvalidSize { .. })
        ));
        assert!(bids.is_empty());
    }

    #[test]
    fn test_depth_traversal() {
        let mut bids = BookSide::new(Side::Bid);
        for p in [98, 100, 99] {
            bids.apply_new(px(p), qty(p)).ok();
        }

        let mut walked = Vec::new();
        let mut cursor = bids.top_level();
        while let Some(level) = cursor {
            walked.push(level.price().as_i64());
            cursor = bids.next_level(level);
        }
        assert_eq!(walked, vec![100, 99, 98]);
        assert_eq!(bids.level_at(1).map(PriceLevel::position), Some(1));
        assert_eq!(bids.total_size(2), qty(199));
    }

    #[test]
    fn test_change_touches_top() {
        let mut asks = BookSide::new(Side::Ask);
        assert!(asks.apply_new(px(100), qty(1)).is_ok_and(|c| c.touches_top()));
        assert!(asks.apply_new(px(105), qty(1)).is_ok_and(|c| !c.touches_top()));
        assert!(!asks.apply_delete(px(200)).is_mutation());
    }
}
