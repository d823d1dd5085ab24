//! Instrument definition and its reference-data record

use chrono::NaiveDate;
use common::{InstrumentId, Px};
use lob::Quote;
use serde::{Deserialize, Serialize};

/// Instrument type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    /// Equity/Stock instrument
    Equity,
    /// Index instrument
    Index,
    /// Future contract
    Future,
    /// Option contract
    Option,
}

impl InstrumentType {
    /// True for futures and options
    #[must_use]
    pub const fn is_derivative(&self) -> bool {
        matches!(self, Self::Future | Self::Option)
    }
}

/// Option type for derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Call option
    Call,
    /// Put option
    Put,
}

/// Reference-data record for one instrument, as delivered by a loader
///
/// Prices are decimals here and become fixed point when the universe is
/// built. Derivatives name their underlying by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Numeric instrument id
    pub id: InstrumentId,
    /// Trading symbol (e.g., "NIFTY24DEC24000CE")
    pub symbol: String,
    /// Exchange (e.g., "NSE", "NFO")
    pub exchange: String,
    /// Instrument type
    pub kind: InstrumentType,
    /// Tick size (minimum price movement)
    pub tick_size: f64,
    /// Lot size (minimum quantity)
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    /// Expiry date for derivatives
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    /// Strike price for options
    #[serde(default)]
    pub strike: Option<f64>,
    /// Option type (for options)
    #[serde(default)]
    pub option_type: Option<OptionType>,
    /// Symbol of the underlying (for derivatives)
    #[serde(default)]
    pub underlying: Option<String>,
}

const fn default_lot_size() -> u32 {
    1
}

impl InstrumentSpec {
    /// Spec for a cash instrument
    #[must_use]
    pub fn equity(id: u32, symbol: &str, exchange: &str, tick_size: f64) -> Self {
        Self {
            id: InstrumentId::new(id),
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            kind: InstrumentType::Equity,
            tick_size,
            lot_size: 1,
            expiry: None,
            strike: None,
            option_type: None,
            underlying: None,
        }
    }

    /// Spec for an index
    #[must_use]
    pub fn index(id: u32, symbol: &str, exchange: &str, tick_size: f64) -> Self {
        Self {
            kind: InstrumentType::Index,
            ..Self::equity(id, symbol, exchange, tick_size)
        }
    }

    /// Spec for a future on `underlying`
    #[must_use]
    pub fn future(
        id: u32,
        symbol: &str,
        exchange: &str,
        underlying: &str,
        expiry: NaiveDate,
        lot_size: u32,
    ) -> Self {
        Self {
            kind: InstrumentType::Future,
            lot_size,
            expiry: Some(expiry),
            underlying: Some(underlying.to_string()),
            ..Self::equity(id, symbol, exchange, 0.05)
        }
    }

    /// Spec for an option on `underlying`
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn option(
        id: u32,
        symbol: &str,
        exchange: &str,
        underlying: &str,
        expiry: NaiveDate,
        strike: f64,
        option_type: OptionType,
        lot_size: u32,
    ) -> Self {
        Self {
            kind: InstrumentType::Option,
            lot_size,
            expiry: Some(expiry),
            strike: Some(strike),
            option_type: Some(option_type),
            underlying: Some(underlying.to_string()),
            ..Self::equity(id, symbol, exchange, 0.05)
        }
    }
}

/// A tradable instrument with its live quote
///
/// Reference attributes are fixed once the universe is built. The quote is
/// exclusively owned and only mutated through the universe.
#[derive(Debug, Clone)]
pub struct Instrument {
    id: InstrumentId,
    symbol: String,
    exchange: String,
    kind: InstrumentType,
    tick_size: Px,
    lot_size: u32,
    expiry: Option<NaiveDate>,
    strike: Option<Px>,
    option_type: Option<OptionType>,
    underlying: Option<InstrumentId>,
    quote: Quote,
}

impl Instrument {
    pub(crate) fn from_spec(spec: &InstrumentSpec) -> Self {
        Self {
            id: spec.id,
            symbol: spec.symbol.clone(),
            exchange: spec.exchange.clone(),
            kind: spec.kind,
            tick_size: Px::new(spec.tick_size),
            lot_size: spec.lot_size,
            expiry: spec.expiry,
            strike: spec.strike.map(Px::new),
            option_type: spec.option_type,
            underlying: None,
            quote: Quote::new(),
        }
    }

    pub(crate) fn set_underlying(&mut self, underlying: InstrumentId) {
        self.underlying = Some(underlying);
    }

    pub(crate) fn quote_mut(&mut self) -> &mut Quote {
        &mut self.quote
    }

    /// Numeric id
    #[inline]
    #[must_use]
    pub const fn id(&self) -> InstrumentId {
        self.id
    }

    /// Trading symbol
    #[inline]
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Exchange
    #[inline]
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Instrument type
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> InstrumentType {
        self.kind
    }

    /// Minimum price increment
    #[inline]
    #[must_use]
    pub const fn tick_size(&self) -> Px {
        self.tick_size
    }

    /// Minimum tradable quantity
    #[inline]
    #[must_use]
    pub const fn lot_size(&self) -> u32 {
        self.lot_size
    }

    /// Expiry date (derivatives only)
    #[inline]
    #[must_use]
    pub const fn expiry(&self) -> Option<NaiveDate> {
        self.expiry
    }

    /// Strike price (options only)
    #[inline]
    #[must_use]
    pub const fn strike(&self) -> Option<Px> {
        self.strike
    }

    /// Call or put (options only)
    #[inline]
    #[must_use]
    pub const fn option_type(&self) -> Option<OptionType> {
        self.option_type
    }

    /// Id of the underlying instrument; a lookup key, not ownership
    #[inline]
    #[must_use]
    pub const fn underlying(&self) -> Option<InstrumentId> {
        self.underlying
    }

    /// Live book
    #[inline]
    #[must_use]
    pub const fn quote(&self) -> &Quote {
        &self.quote
    }
}
