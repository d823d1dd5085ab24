//! Reference-data errors

use common::InstrumentId;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems found while building the universe
#[derive(Debug, Error)]
pub enum UniverseError {
    /// Two instruments share an id
    #[error("duplicate instrument id {0}")]
    DuplicateId(InstrumentId),

    /// Two instruments share a symbol
    #[error("duplicate instrument symbol {0}")]
    DuplicateSymbol(String),

    /// Future or option with no underlying symbol
    #[error("derivative {symbol} has no underlying")]
    MissingUnderlying {
        /// Derivative symbol
        symbol: String,
    },

    /// Underlying symbol is not part of the universe
    #[error("derivative {symbol} references unknown underlying {underlying}")]
    UnknownUnderlying {
        /// Derivative symbol
        symbol: String,
        /// Underlying symbol that failed to resolve
        underlying: String,
    },

    /// Derivative is missing a required attribute
    #[error("derivative {symbol} is missing {field}")]
    IncompleteDerivative {
        /// Derivative symbol
        symbol: String,
        /// Missing attribute
        field: &'static str,
    },

    /// Same underlying, expiry, strike and option type listed twice
    #[error("option {symbol} duplicates an existing chain entry")]
    DuplicateOption {
        /// Option symbol
        symbol: String,
    },

    /// Tick size zero or negative
    #[error("instrument {symbol} has non-positive tick size")]
    InvalidTickSize {
        /// Instrument symbol
        symbol: String,
    },

    /// Reference-data file could not be read
    #[error("failed to read reference data from {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Reference data is not valid JSON for [`crate::InstrumentSpec`]
    #[error("failed to parse reference data: {0}")]
    Parse(#[from] serde_json::Error),
}
