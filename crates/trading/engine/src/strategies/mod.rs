//! Strategies shipped with the runtime

mod spread_watcher;

pub use spread_watcher::SpreadWatcher;

use crate::errors::EngineError;
use crate::strategy::SharedStrategy;
use std::cell::RefCell;
use std::rc::Rc;

/// Instantiate a built-in strategy by its config name
///
/// # Errors
/// Returns `UnknownStrategy` for names with no built-in implementation
pub fn create(name: &str) -> Result<SharedStrategy, EngineError> {
    match name {
        SpreadWatcher::NAME => Ok(Rc::new(RefCell::new(SpreadWatcher::new()))),
        other => Err(EngineError::UnknownStrategy(other.to_string())),
    }
}
