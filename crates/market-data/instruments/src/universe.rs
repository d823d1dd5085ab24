//! Instrument universe: id and symbol lookups plus derivatives grouping

use crate::error::UniverseError;
use crate::instrument::{Instrument, InstrumentSpec, InstrumentType};
use crate::underlying::UnderlyingDetails;
use chrono::NaiveDate;
use common::constants::DEFAULT_UNIVERSE_CAPACITY;
use common::{InstrumentId, Px};
use lob::Quote;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Every instrument of a run, indexed by id and symbol
///
/// All lookups return `Option`; an unknown key is never an error.
#[derive(Debug, Default)]
pub struct Universe {
    instruments: Vec<Instrument>,
    by_id: FxHashMap<InstrumentId, usize>,
    by_symbol: FxHashMap<String, usize>,
    /// exchange -> underlying symbol -> details
    underlyings: FxHashMap<String, FxHashMap<String, UnderlyingDetails>>,
}

impl Universe {
    /// Load and build from a JSON array of [`InstrumentSpec`]
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the
    /// reference data is inconsistent
    pub fn from_json_file(path: &Path) -> Result<Self, UniverseError> {
        let data = std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        UniverseBuilder::from_json_str(&data)?.build()
    }

    /// Instrument by trading symbol
    #[must_use]
    pub fn instrument_by_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.by_symbol.get(symbol).map(|&i| &self.instruments[i])
    }

    /// Instrument by numeric id
    #[must_use]
    pub fn instrument_by_id(&self, id: InstrumentId) -> Option<&Instrument> {
        self.by_id.get(&id).map(|&i| &self.instruments[i])
    }

    /// Derivatives structure for an underlying on an exchange
    ///
    /// `exchange` is the exchange the derivatives trade on (e.g. "NFO").
    #[must_use]
    pub fn underlying_details(&self, exchange: &str, symbol: &str) -> Option<&UnderlyingDetails> {
        self.underlyings.get(exchange)?.get(symbol)
    }

    /// Call option instrument at (expiry, strike)
    #[must_use]
    pub fn call_option(
        &self,
        exchange: &str,
        symbol: &str,
        expiry: NaiveDate,
        strike: Px,
    ) -> Option<&Instrument> {
        let id = self
            .underlying_details(exchange, symbol)?
            .call_option(expiry, strike)?;
        self.instrument_by_id(id)
    }

    /// Put option instrument at (expiry, strike)
    #[must_use]
    pub fn put_option(
        &self,
        exchange: &str,
        symbol: &str,
        expiry: NaiveDate,
        strike: Px,
    ) -> Option<&Instrument> {
        let id = self
            .underlying_details(exchange, symbol)?
            .put_option(expiry, strike)?;
        self.instrument_by_id(id)
    }

    /// Futures on an underlying, nearest expiry first
    #[must_use]
    pub fn futures(&self, exchange: &str, symbol: &str) -> Vec<&Instrument> {
        self.underlying_details(exchange, symbol)
            .map(|details| {
                details
                    .futures()
                    .iter()
                    .filter_map(|f| self.instrument_by_id(f.instrument))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live book of an instrument
    #[must_use]
    pub fn quote(&self, id: InstrumentId) -> Option<&Quote> {
        self.instrument_by_id(id).map(Instrument::quote)
    }

    /// Mutable book of an instrument; the event bus is the only writer
    pub fn quote_mut(&mut self, id: InstrumentId) -> Option<&mut Quote> {
        let index = *self.by_id.get(&id)?;
        Some(self.instruments[index].quote_mut())
    }

    /// All instruments in load order
    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.iter()
    }

    /// All derivatives groupings
    pub fn underlyings(&self) -> impl Iterator<Item = &UnderlyingDetails> {
        self.underlyings
            .values()
            .flat_map(|by_symbol| by_symbol.values())
    }

    /// Number of instruments
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// True if no instrument is loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Empty every book; reference data is kept
    pub fn clear_books(&mut self) {
        for instrument in &mut self.instruments {
            instrument.quote_mut().clear();
        }
    }
}

/// Collects reference-data records and validates them into a [`Universe`]
#[derive(Debug, Default)]
pub struct UniverseBuilder {
    specs: Vec<InstrumentSpec>,
}

impl UniverseBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of [`InstrumentSpec`]
    ///
    /// # Errors
    /// Returns `Parse` if the input is not a valid spec array
    pub fn from_json_str(data: &str) -> Result<Self, UniverseError> {
        let specs: Vec<InstrumentSpec> = serde_json::from_str(data)?;
        Ok(Self { specs })
    }

    /// Add one record
    pub fn add(&mut self, spec: InstrumentSpec) -> &mut Self {
        self.specs.push(spec);
        self
    }

    /// Add one record (by value, for chaining)
    #[must_use]
    pub fn with(mut self, spec: InstrumentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Number of records collected
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// True if no record was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Validate every record and assemble the universe
    ///
    /// # Errors
    /// Returns the first inconsistency found: duplicate id or symbol,
    /// non-positive tick size, a derivative without a resolvable underlying,
    /// or a derivative missing expiry, strike or option type
    pub fn build(self) -> Result<Universe, UniverseError> {
        let capacity = self.specs.len().max(DEFAULT_UNIVERSE_CAPACITY);
        let mut universe = Universe {
            instruments: Vec::with_capacity(self.specs.len()),
            by_id: FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
            by_symbol: FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
            underlyings: FxHashMap::default(),
        };

        for spec in &self.specs {
            let instrument = Instrument::from_spec(spec);
            if !instrument.tick_size().is_positive() {
                return Err(UniverseError::InvalidTickSize {
                    symbol: spec.symbol.clone(),
                });
            }

            let index = universe.instruments.len();
            if universe.by_id.insert(spec.id, index).is_some() {
                return Err(UniverseError::DuplicateId(spec.id));
            }
            if universe.by_symbol.insert(spec.symbol.clone(), index).is_some() {
                return Err(UniverseError::DuplicateSymbol(spec.symbol.clone()));
            }
            universe.instruments.push(instrument);
        }

        // Derivatives resolve their underlying only once every symbol is known
        for (index, spec) in self.specs.iter().enumerate() {
            if spec.kind.is_derivative() {
                universe.link_derivative(index, spec)?;
            }
        }

        info!(
            instruments = universe.instruments.len(),
            underlyings = universe.underlyings().count(),
            "Universe built"
        );
        Ok(universe)
    }
}

impl Universe {
    fn link_derivative(&mut self, index: usize, spec: &InstrumentSpec) -> Result<(), UniverseError> {
        let underlying_symbol =
            spec.underlying
                .as_deref()
                .ok_or_else(|| UniverseError::MissingUnderlying {
                    symbol: spec.symbol.clone(),
                })?;
        let underlying = self
            .instrument_by_symbol(underlying_symbol)
            .map(Instrument::id)
            .ok_or_else(|| UniverseError::UnknownUnderlying {
                symbol: spec.symbol.clone(),
                underlying: underlying_symbol.to_string(),
            })?;
        let expiry = spec.expiry.ok_or_else(|| UniverseError::IncompleteDerivative {
            symbol: spec.symbol.clone(),
            field: "expiry",
        })?;

        let instrument = &mut self.instruments[index];
        instrument.set_underlying(underlying);
        let tick_size = instrument.tick_size();
        let strike = instrument.strike();
        let option_type = instrument.option_type();

        let details = self
            .underlyings
            .entry(spec.exchange.clone())
            .or_default()
            .entry(underlying_symbol.to_string())
            .or_insert_with(|| UnderlyingDetails::new(&spec.exchange, underlying_symbol, underlying));

        match spec.kind {
            InstrumentType::Future => details.insert_future(expiry, spec.id),
            InstrumentType::Option => {
                let strike = strike.ok_or_else(|| UniverseError::IncompleteDerivative {
                    symbol: spec.symbol.clone(),
                    field: "strike",
                })?;
                let option_type =
                    option_type.ok_or_else(|| UniverseError::IncompleteDerivative {
                        symbol: spec.symbol.clone(),
                        field: "option_type",
                    })?;
                if !strike.is_multiple_of(tick_size) {
                    warn!(symbol = %spec.symbol, %strike, %tick_size, "Strike is off the tick grid");
                }
                if !details.insert_option(expiry, strike, option_type, spec.id) {
                    return Err(UniverseError::DuplicateOption {
                        symbol: spec.symbol.clone(),
                    });
                }
            }
            InstrumentType::Equity | InstrumentType::Index => {}
        }

        debug!(symbol = %spec.symbol, underlying = %underlying_symbol, "Linked derivative");
        Ok(())
    }
}
