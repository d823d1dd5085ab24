//! Engine loop: merges feed records with timer deadlines on one thread

use crate::bus::{BusStats, EventBus, PublishReport};
use crate::context::Context;
use crate::errors::{DispatchFailure, EngineError, ErrorSink, FailureOrigin};
use crate::events::MarketEvent;
use crate::feed::FeedRecord;
use crate::strategy::{SharedStrategy, WeakStrategy};
use crate::timer::{DueTimer, TimerWheel};
use common::{StrategyConfig, Ts};
use instruments::Universe;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Upper bound on events drained from the outbox after one unit of work
const MAX_QUEUED_PER_UNIT: usize = 10_000;

/// Totals for one [`Engine::run`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Feed records processed
    pub records: u64,
    /// Handler invocations
    pub dispatched: u64,
    /// Reported failures
    pub failures: u64,
    /// Diagnostic events raised
    pub diagnostics: u64,
    /// Timer callbacks run
    pub timers_fired: u64,
    /// Engine time at the end of the run
    pub final_ts: Ts,
}

struct Registration {
    name: String,
    strategy: SharedStrategy,
}

/// Process-wide runtime state
///
/// Owns the universe, the bus, the timer wheel and every registered
/// strategy. Work is processed one unit at a time: a feed record with its
/// dispatches, or a due timer, each followed by any events the callbacks
/// queued.
pub struct Engine {
    universe: Universe,
    bus: EventBus,
    timers: TimerWheel,
    strategies: Vec<Registration>,
    records: u64,
    timers_fired: u64,
}

impl Engine {
    /// Create an engine over a built universe
    #[must_use]
    pub fn new(universe: Universe) -> Self {
        Self::with_bus(universe, EventBus::new())
    }

    /// Create an engine reporting handler failures to `sink`
    #[must_use]
    pub fn with_error_sink(universe: Universe, sink: Box<dyn ErrorSink>) -> Self {
        Self::with_bus(universe, EventBus::with_error_sink(sink))
    }

    /// Move the clock to `start` before any strategy schedules timers
    ///
    /// Timers created in `init` are relative to the engine clock, so a feed
    /// stamped in epoch time needs the clock anchored first. The clock never
    /// moves back.
    #[must_use]
    pub fn starting_at(mut self, start: Ts) -> Self {
        self.timers.advance_to(start);
        self
    }

    fn with_bus(universe: Universe, bus: EventBus) -> Self {
        Self {
            universe,
            bus,
            timers: TimerWheel::default(),
            strategies: Vec::new(),
            records: 0,
            timers_fired: 0,
        }
    }

    /// Register and initialise a strategy
    ///
    /// The engine keeps a strong reference until [`Self::deregister`] or
    /// [`Self::shutdown`].
    ///
    /// # Errors
    /// Returns `StrategyInit` if `init` fails (the strategy is not kept and
    /// anything it scheduled is withdrawn), `AlreadyRegistered` for a second
    /// registration of the same object
    pub fn register(
        &mut self,
        strategy: SharedStrategy,
        config: &StrategyConfig,
    ) -> Result<(), EngineError> {
        let mut guard = strategy
            .try_borrow_mut()
            .map_err(|_| EngineError::StrategyBusy)?;
        let name = guard.name().to_string();
        if self.strategies.iter().any(|r| Rc::ptr_eq(&r.strategy, &strategy)) {
            return Err(EngineError::AlreadyRegistered(name));
        }

        let weak = Rc::downgrade(&strategy);
        let mut ctx = Context::new(
            &self.universe,
            &mut self.timers,
            self.bus.deferred_mut(),
            weak.clone(),
        );
        let result = guard.init(config, &mut ctx);
        drop(ctx);
        drop(guard);

        if let Err(error) = result {
            self.bus.remove_subscriber(&weak);
            self.bus.clear_queued();
            self.timers.cancel_owned_by(&weak);
            return Err(EngineError::StrategyInit { name, error });
        }

        info!(strategy = %name, "Strategy registered");
        self.strategies.push(Registration { name, strategy });
        self.bus.apply_changes();
        self.drain_queued();
        Ok(())
    }

    /// Remove a strategy, its subscriptions and its timers
    pub fn deregister(&mut self, strategy: &SharedStrategy) -> bool {
        let Some(index) = self
            .strategies
            .iter()
            .position(|r| Rc::ptr_eq(&r.strategy, strategy))
        else {
            return false;
        };

        let registration = self.strategies.remove(index);
        let weak = Rc::downgrade(strategy);
        let subscriptions = self.bus.remove_subscriber(&weak);
        let timers = self.timers.cancel_owned_by(&weak);
        info!(strategy = %registration.name, subscriptions, timers, "Strategy deregistered");
        true
    }

    /// Process one feed record
    ///
    /// Timers due at or before the record fire first. A record stamped
    /// before the engine clock is processed at the current time.
    pub fn on_record(&mut self, record: &FeedRecord) -> PublishReport {
        let now = self.timers.now();
        let ts = if record.ts < now {
            warn!(
                instrument = %record.instrument,
                record_ts = %record.ts,
                now = %now,
                "Record timestamp went backwards"
            );
            now
        } else {
            record.ts
        };

        self.advance_to(ts);
        self.records += 1;
        self.publish(record.to_event(ts))
    }

    /// Publish an event as one unit of work, then drain queued events
    pub fn publish(&mut self, event: MarketEvent) -> PublishReport {
        let report = self
            .bus
            .publish(event, &mut self.universe, &mut self.timers);
        self.drain_queued();
        report
    }

    /// Fire every timer due at or before `ts` and move the clock there
    ///
    /// Returns the number of callbacks run. Timers whose owner has been
    /// released are dropped without counting.
    pub fn advance_to(&mut self, ts: Ts) -> usize {
        let mut fired = 0;
        while let Some(due) = self.timers.pop_due_until(ts) {
            if self.fire(&due) {
                fired += 1;
            }
            self.timers.complete(due);
            self.bus.apply_changes();
            self.drain_queued();
        }
        self.timers.advance_to(ts);
        self.timers_fired += fired as u64;
        fired
    }

    /// Feed every record, then optionally advance to `end`
    pub fn run<I>(&mut self, records: I, end: Option<Ts>) -> RunSummary
    where
        I: IntoIterator<Item = FeedRecord>,
    {
        let start = self.bus.stats();
        let (records_before, fired_before) = (self.records, self.timers_fired);

        for record in records {
            self.on_record(&record);
        }
        if let Some(end) = end {
            self.advance_to(end);
        }

        let stats = self.bus.stats();
        let summary = RunSummary {
            records: self.records - records_before,
            dispatched: stats.dispatched - start.dispatched,
            failures: stats.failures - start.failures,
            diagnostics: stats.diagnostics - start.diagnostics,
            timers_fired: self.timers_fired - fired_before,
            final_ts: self.timers.now(),
        };
        info!(?summary, "Run complete");
        summary
    }

    /// Drop every timer, subscription and strategy and empty all books
    pub fn shutdown(&mut self) {
        let strategies = self.strategies.len();
        let timers = self.timers.len();
        self.timers.clear();
        self.bus.clear();
        self.strategies.clear();
        self.universe.clear_books();
        info!(strategies, timers, "Engine shut down");
    }

    /// Engine time
    #[must_use]
    pub fn now(&self) -> Ts {
        self.timers.now()
    }

    /// Instruments and books
    #[must_use]
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// The bus (subscriptions, counters)
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Bus counters
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.bus.stats()
    }

    /// The timer wheel
    #[must_use]
    pub fn timers(&self) -> &TimerWheel {
        &self.timers
    }

    /// Names of registered strategies, in registration order
    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|r| r.name.as_str())
    }

    /// Run one timer callback; `false` if it could not run
    fn fire(&mut self, due: &DueTimer) -> bool {
        let origin = FailureOrigin::Timer(due.fire.id);
        let Some(owner) = due.owner.upgrade() else {
            // Owner gone: the timer dies with it
            debug!(timer = %due.fire.id, "Dropping timer of released strategy");
            self.timers.cancel(due.fire.id);
            return false;
        };
        let Ok(mut guard) = owner.try_borrow_mut() else {
            self.bus.report_failure(DispatchFailure::busy(origin));
            return false;
        };

        let weak: WeakStrategy = due.owner.clone();
        let mut ctx = Context::new(&self.universe, &mut self.timers, self.bus.deferred_mut(), weak);
        let result = (due.callback)(&mut *guard, &due.fire, &mut ctx);
        drop(ctx);

        if let Err(error) = result {
            let failure = DispatchFailure {
                strategy: Some(guard.name().to_string()),
                origin,
                error,
            };
            drop(guard);
            self.bus.report_failure(failure);
        }
        true
    }

    fn drain_queued(&mut self) {
        let mut drained = 0;
        while let Some(event) = self.bus.pop_queued() {
            if drained == MAX_QUEUED_PER_UNIT {
                warn!(dropped = self.bus.queued() + 1, "Queued event limit reached, dropping rest");
                self.bus.clear_queued();
                return;
            }
            self.bus.publish(event, &mut self.universe, &mut self.timers);
            drained += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, LevelEvent};
    use crate::strategy::Strategy;
    use crate::timer::{TimerFire, route_to_on_timer};
    use common::{InstrumentId, Px, Qty, Side};
    use instruments::{InstrumentSpec, UniverseBuilder};
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct Echo {
        seen: Vec<EventKind>,
        echoed: bool,
        fired: Vec<Ts>,
    }

    impl Strategy for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn init(&mut self, _config: &StrategyConfig, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            ctx.subscribe_all(&EventKind::ALL);
            ctx.add_deadline_timer(Duration::from_secs(1), 0);
            Ok(())
        }

        fn handle_event(
            &mut self,
            kind: EventKind,
            event: &MarketEvent,
            ctx: &mut Context<'_>,
        ) -> anyhow::Result<()> {
            self.seen.push(kind);
            if !self.echoed {
                self.echoed = true;
                if let MarketEvent::NewLevel(level) = event {
                    ctx.publish(MarketEvent::NewLevel(LevelEvent {
                        price: Px::from_i64(level.price.as_i64() - 1),
                        ..*level
                    }));
                }
            }
            Ok(())
        }

        fn on_timer(&mut self, fire: &TimerFire, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            assert_eq!(ctx.now(), fire.deadline);
            self.fired.push(fire.deadline);
            Ok(())
        }
    }

    fn engine() -> Engine {
        let universe = UniverseBuilder::new()
            .with(InstrumentSpec::equity(1, "RELIANCE", "NSE", 0.05))
            .build()
            .unwrap_or_default();
        Engine::new(universe)
    }

    #[test]
    fn test_republish_is_queued_behind_current_pass() -> Result<(), EngineError> {
        let mut engine = engine();
        let echo = Rc::new(RefCell::new(Echo::default()));
        engine.register(echo.clone(), &StrategyConfig::new())?;

        engine.publish(MarketEvent::NewLevel(LevelEvent {
            instrument: InstrumentId(1),
            ts: Ts(0),
            side: Side::Bid,
            price: Px::from_i64(100),
            size: Qty::from_i64(1),
        }));

        assert_eq!(echo.borrow().seen, vec![EventKind::NewLevel, EventKind::NewLevel]);
        assert_eq!(engine.universe().quote(InstrumentId(1)).map(|q| q.bid().depth()), Some(2));
        Ok(())
    }

    #[test]
    fn test_timer_sees_its_deadline_as_now() -> Result<(), EngineError> {
        let mut engine = engine();
        let echo = Rc::new(RefCell::new(Echo::default()));
        engine.register(echo.clone(), &StrategyConfig::new())?;

        assert_eq!(engine.advance_to(Ts::from_secs(10)), 1);
        assert_eq!(echo.borrow().fired, vec![Ts::from_secs(1)]);
        assert_eq!(engine.now(), Ts::from_secs(10));
        Ok(())
    }

    #[test]
    fn test_timer_of_released_owner_is_dropped() {
        let mut engine = engine();
        let released: SharedStrategy = Rc::new(RefCell::new(Echo::default()));
        let weak = Rc::downgrade(&released);
        let one_shot =
            engine
                .timers
                .add_deadline_timer(Duration::from_secs(1), weak.clone(), 0, route_to_on_timer);
        let periodic = engine
            .timers
            .add_periodic_timer(Duration::from_secs(1), weak, 1, route_to_on_timer);
        drop(released);

        assert_eq!(engine.advance_to(Ts::from_secs(5)), 0);
        assert!(!engine.timers().is_scheduled(one_shot));
        assert!(!periodic.is_some_and(|id| engine.timers().is_scheduled(id)));
        assert!(engine.timers().is_empty());
        assert_eq!(engine.stats().failures, 0);
    }

    #[test]
    fn test_double_registration_rejected() -> Result<(), EngineError> {
        let mut engine = engine();
        let echo = Rc::new(RefCell::new(Echo::default()));
        engine.register(echo.clone(), &StrategyConfig::new())?;
        assert!(matches!(
            engine.register(echo, &StrategyConfig::new()),
            Err(EngineError::AlreadyRegistered(_))
        ));
        Ok(())
    }
}
