//! Common types and configuration for the strategy runtime

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]

pub mod config;
pub mod constants;
pub mod types;

pub use config::{ConfigError, RuntimeConfig, StrategyConfig, StrategyEntry};
pub use types::*;
