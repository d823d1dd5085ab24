//! Market events dispatched by the bus

use common::{InstrumentId, Px, Qty, Side, Ts};
use lob::{Crossed, LevelOp, LobError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription key: one per [`MarketEvent`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// A price level appeared
    NewLevel,
    /// A price level changed size
    ModifyLevel,
    /// A price level was removed
    DeleteLevel,
    /// A print
    Trade,
    /// Data anomaly detected while applying an update
    Diagnostic,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 5] = [
        Self::NewLevel,
        Self::ModifyLevel,
        Self::DeleteLevel,
        Self::Trade,
        Self::Diagnostic,
    ];

    /// Kinds that mutate a book
    pub const BOOK: [Self; 3] = [Self::NewLevel, Self::ModifyLevel, Self::DeleteLevel];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NewLevel => "new_level",
            Self::ModifyLevel => "modify_level",
            Self::DeleteLevel => "delete_level",
            Self::Trade => "trade",
            Self::Diagnostic => "diagnostic",
        };
        f.write_str(name)
    }
}

/// Payload of the three book kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelEvent {
    /// Instrument whose book changed
    pub instrument: InstrumentId,
    /// Event time
    pub ts: Ts,
    /// Book side
    pub side: Side,
    /// Level price
    pub price: Px,
    /// Level size (zero for deletes)
    pub size: Qty,
}

/// Payload of a trade print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Traded instrument
    pub instrument: InstrumentId,
    /// Event time
    pub ts: Ts,
    /// Trade price
    pub price: Px,
    /// Trade size
    pub size: Qty,
    /// Aggressor side if the venue reports it
    pub aggressor: Option<Side>,
}

/// What went wrong with an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anomaly {
    /// A mutation left best bid >= best ask
    CrossedBook {
        /// Best bid price
        bid: Px,
        /// Best ask price
        ask: Px,
    },
    /// Modify for a price with no resting level
    UnknownLevel {
        /// Book side
        side: Side,
        /// Price that was not found
        price: Px,
    },
    /// Negative size
    InvalidSize {
        /// Book side
        side: Side,
        /// Level price
        price: Px,
        /// Offending size
        size: Qty,
    },
    /// Record for an instrument that is not in the universe
    UnknownInstrument,
}

impl From<LobError> for Anomaly {
    fn from(err: LobError) -> Self {
        match err {
            LobError::UnknownLevel { side, price } => Self::UnknownLevel { side, price },
            LobError::InvalidSize { side, price, size } => Self::InvalidSize { side, price, size },
            LobError::CrossedBook { bid, ask } => Self::CrossedBook { bid, ask },
        }
    }
}

impl From<Crossed> for Anomaly {
    fn from(crossed: Crossed) -> Self {
        Self::CrossedBook {
            bid: crossed.bid,
            ask: crossed.ask,
        }
    }
}

/// Payload of a diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// Instrument the anomaly was detected on
    pub instrument: InstrumentId,
    /// Time of the offending update
    pub ts: Ts,
    /// The anomaly
    pub anomaly: Anomaly,
}

/// A typed market event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Level appeared (or was replaced)
    NewLevel(LevelEvent),
    /// Level size changed
    ModifyLevel(LevelEvent),
    /// Level removed
    DeleteLevel(LevelEvent),
    /// Trade print
    Trade(TradeEvent),
    /// Data anomaly
    Diagnostic(DiagnosticEvent),
}

impl MarketEvent {
    /// Subscription kind of this event
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NewLevel(_) => EventKind::NewLevel,
            Self::ModifyLevel(_) => EventKind::ModifyLevel,
            Self::DeleteLevel(_) => EventKind::DeleteLevel,
            Self::Trade(_) => EventKind::Trade,
            Self::Diagnostic(_) => EventKind::Diagnostic,
        }
    }

    /// Instrument the event refers to
    #[must_use]
    pub const fn instrument(&self) -> InstrumentId {
        match self {
            Self::NewLevel(e) | Self::ModifyLevel(e) | Self::DeleteLevel(e) => e.instrument,
            Self::Trade(e) => e.instrument,
            Self::Diagnostic(e) => e.instrument,
        }
    }

    /// Event time
    #[must_use]
    pub const fn ts(&self) -> Ts {
        match self {
            Self::NewLevel(e) | Self::ModifyLevel(e) | Self::DeleteLevel(e) => e.ts,
            Self::Trade(e) => e.ts,
            Self::Diagnostic(e) => e.ts,
        }
    }

    /// Book operation implied by a book event
    #[must_use]
    pub const fn level_op(&self) -> Option<(Side, LevelOp)> {
        match self {
            Self::NewLevel(e) => Some((
                e.side,
                LevelOp::New {
                    price: e.price,
                    size: e.size,
                },
            )),
            Self::ModifyLevel(e) => Some((
                e.side,
                LevelOp::Modify {
                    price: e.price,
                    size: e.size,
                },
            )),
            Self::DeleteLevel(e) => Some((e.side, LevelOp::Delete { price: e.price })),
            Self::Trade(_) | Self::Diagnostic(_) => None,
        }
    }

    /// Diagnostic for `instrument` at `ts`
    #[must_use]
    pub const fn diagnostic(instrument: InstrumentId, ts: Ts, anomaly: Anomaly) -> Self {
        Self::Diagnostic(DiagnosticEvent {
            instrument,
            ts,
            anomaly,
        })
    }
}
