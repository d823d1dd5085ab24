//! Strategy plug-in contract

use crate::context::Context;
use crate::events::{EventKind, MarketEvent};
use crate::timer::TimerFire;
use common::StrategyConfig;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Strong handle kept by whoever owns a strategy
pub type SharedStrategy = Rc<RefCell<dyn Strategy>>;

/// Handle held by the bus and timers; never keeps a strategy alive
pub type WeakStrategy = Weak<RefCell<dyn Strategy>>;

/// A user strategy driven by the engine
///
/// All callbacks run on the engine thread, one at a time. A callback that
/// returns `Err` is reported and the engine carries on.
pub trait Strategy {
    /// Name used in logs and failure reports
    fn name(&self) -> &str;

    /// Called once at registration with the strategy's options
    ///
    /// Typical work: resolve instruments, subscribe, schedule timers.
    ///
    /// # Errors
    /// Any error aborts registration
    fn init(&mut self, config: &StrategyConfig, ctx: &mut Context<'_>) -> anyhow::Result<()>;

    /// Called for every event of a subscribed kind
    ///
    /// The book has already been updated when this runs.
    ///
    /// # Errors
    /// Errors are reported after the dispatch pass
    fn handle_event(
        &mut self,
        kind: EventKind,
        event: &MarketEvent,
        ctx: &mut Context<'_>,
    ) -> anyhow::Result<()>;

    /// Called by timers scheduled with the default callback
    ///
    /// # Errors
    /// Errors are reported after the timer tick
    fn on_timer(&mut self, _fire: &TimerFire, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}
