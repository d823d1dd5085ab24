//! Instrument reference data and the instrument universe
//!
//! The [`Universe`] owns every [`Instrument`] (and through it every
//! [`lob::Quote`]) for the life of a run. It is assembled once by
//! [`UniverseBuilder`] and treated as static reference data afterwards; only
//! book state changes, through [`Universe::quote_mut`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]

pub mod error;
pub mod instrument;
pub mod underlying;
pub mod universe;

pub use error::UniverseError;
pub use instrument::{Instrument, InstrumentSpec, InstrumentType, OptionType};
pub use underlying::{FutureContract, OptionChain, OptionPair, UnderlyingDetails};
pub use universe::{Universe, UniverseBuilder};
