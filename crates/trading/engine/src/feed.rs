//! Feed records and a JSON-lines reader
//!
//! One record per line, prices and sizes in fixed-point units (1 = 0.0001):
//!
//! ```text
//! {"ts":1000,"instrument":2885,"update":{"type":"new","side":"bid","price":24505000,"size":1000000}}
//! {"ts":1001,"instrument":2885,"update":{"type":"trade","price":24505000,"size":50000,"aggressor":"ask"}}
//! ```

use crate::errors::FeedError;
use crate::events::{LevelEvent, MarketEvent, TradeEvent};
use common::{InstrumentId, Px, Qty, Side, Ts};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// The update carried by a feed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedUpdate {
    /// Level appeared
    New {
        /// Book side
        side: Side,
        /// Level price
        price: Px,
        /// Level size
        size: Qty,
    },
    /// Level size changed
    Modify {
        /// Book side
        side: Side,
        /// Level price
        price: Px,
        /// New size
        size: Qty,
    },
    /// Level removed
    Delete {
        /// Book side
        side: Side,
        /// Level price
        price: Px,
        /// Ignored
        #[serde(default)]
        size: Qty,
    },
    /// Trade print
    Trade {
        /// Trade price
        price: Px,
        /// Trade size
        size: Qty,
        /// Aggressor side if known
        #[serde(default)]
        aggressor: Option<Side>,
    },
}

/// One already-parsed update, in arrival order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// Exchange or capture time
    pub ts: Ts,
    /// Instrument the update applies to
    pub instrument: InstrumentId,
    /// The update
    pub update: FeedUpdate,
}

impl FeedRecord {
    /// Create a record
    #[must_use]
    pub const fn new(ts: Ts, instrument: InstrumentId, update: FeedUpdate) -> Self {
        Self {
            ts,
            instrument,
            update,
        }
    }

    /// Typed event for this record, stamped at `ts`
    #[must_use]
    pub fn to_event(&self, ts: Ts) -> MarketEvent {
        let instrument = self.instrument;
        let level = |side, price, size| LevelEvent {
            instrument,
            ts,
            side,
            price,
            size,
        };
        match self.update {
            FeedUpdate::New { side, price, size } => MarketEvent::NewLevel(level(side, price, size)),
            FeedUpdate::Modify { side, price, size } => {
                MarketEvent::ModifyLevel(level(side, price, size))
            }
            FeedUpdate::Delete { side, price, .. } => {
                MarketEvent::DeleteLevel(level(side, price, Qty::ZERO))
            }
            FeedUpdate::Trade {
                price,
                size,
                aggressor,
            } => MarketEvent::Trade(TradeEvent {
                instrument,
                ts,
                price,
                size,
                aggressor,
            }),
        }
    }
}

/// Iterator over JSON-lines feed records
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// yields an error and reading continues with the next line.
#[derive(Debug)]
pub struct FeedReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> FeedReader<R> {
    /// Read records from any buffered source
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl FeedReader<BufReader<File>> {
    /// Open a feed file
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened
    pub fn open(path: &Path) -> Result<Self, FeedError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for FeedReader<R> {
    type Item = Result<FeedRecord, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.line += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed).map_err(|source| FeedError::Malformed {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}
