//! Event bus: applies book updates and fans events out to strategies
//!
//! Single writer, single thread. `publish` applies the book mutation implied
//! by an event exactly once, then calls every live subscriber of the event's
//! kind in subscription order. Each pass walks a snapshot of the subscriber
//! list, so subscription changes made from handlers land after the pass.
//! Events published from handlers are queued and drained by the engine before
//! the next unit of work.

use crate::context::Context;
use crate::errors::{DispatchFailure, ErrorSink, FailureOrigin, TracingErrorSink};
use crate::events::{Anomaly, EventKind, MarketEvent};
use crate::strategy::WeakStrategy;
use crate::timer::TimerWheel;
use instruments::Universe;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Weak;
use tracing::{debug, warn};

/// Subscription change requested from inside a callback
#[derive(Debug)]
pub(crate) enum SubscriptionChange {
    Subscribe {
        kind: EventKind,
        subscriber: WeakStrategy,
    },
    Unsubscribe {
        kind: EventKind,
        subscriber: WeakStrategy,
    },
}

/// Work queued by callbacks until the current pass ends
#[derive(Debug, Default)]
pub(crate) struct Deferred {
    pub(crate) changes: Vec<SubscriptionChange>,
    pub(crate) outbox: VecDeque<MarketEvent>,
}

/// Outcome of one `publish` call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// A book was changed
    pub mutated: bool,
    /// Handler invocations
    pub dispatched: usize,
    /// Handlers that failed
    pub failures: usize,
    /// Diagnostic events raised by this publish
    pub diagnostics: usize,
}

/// Lifetime counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Events published
    pub published: u64,
    /// Handler invocations
    pub dispatched: u64,
    /// Reported failures
    pub failures: u64,
    /// Diagnostic events raised
    pub diagnostics: u64,
    /// Dead subscribers removed
    pub pruned: u64,
}

/// Ordered per-kind fan-out to strategies
pub struct EventBus {
    handlers: FxHashMap<EventKind, Vec<WeakStrategy>>,
    deferred: Deferred,
    failures: Vec<DispatchFailure>,
    sink: Box<dyn ErrorSink>,
    stats: BusStats,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.handlers.len())
            .field("queued", &self.deferred.outbox.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus that logs handler failures
    #[must_use]
    pub fn new() -> Self {
        Self::with_error_sink(Box::new(TracingErrorSink))
    }

    /// Create a bus reporting handler failures to `sink`
    #[must_use]
    pub fn with_error_sink(sink: Box<dyn ErrorSink>) -> Self {
        Self {
            handlers: FxHashMap::default(),
            deferred: Deferred::default(),
            failures: Vec::new(),
            sink,
            stats: BusStats::default(),
        }
    }

    /// Add `subscriber` to the end of `kind`'s list
    ///
    /// Returns `false` if it is already subscribed or has been dropped.
    pub fn subscribe(&mut self, kind: EventKind, subscriber: &WeakStrategy) -> bool {
        if subscriber.strong_count() == 0 {
            warn!(?kind, "Rejected subscription from dropped strategy");
            return false;
        }

        let list = self.handlers.entry(kind).or_default();
        if list.iter().any(|s| Weak::ptr_eq(s, subscriber)) {
            return false;
        }
        list.push(subscriber.clone());
        debug!(?kind, handler_count = list.len(), "Subscriber registered");
        true
    }

    /// Remove `subscriber` from `kind`'s list
    pub fn unsubscribe(&mut self, kind: EventKind, subscriber: &WeakStrategy) -> bool {
        let Some(list) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| !Weak::ptr_eq(s, subscriber));
        before != list.len()
    }

    /// Drop every subscription of `subscriber`, including queued ones
    pub fn remove_subscriber(&mut self, subscriber: &WeakStrategy) -> usize {
        let mut removed = 0;
        for list in self.handlers.values_mut() {
            let before = list.len();
            list.retain(|s| !Weak::ptr_eq(s, subscriber));
            removed += before - list.len();
        }
        self.deferred.changes.retain(|change| match change {
            SubscriptionChange::Subscribe { subscriber: s, .. }
            | SubscriptionChange::Unsubscribe { subscriber: s, .. } => !Weak::ptr_eq(s, subscriber),
        });
        removed
    }

    /// Whether `subscriber` receives `kind`
    #[must_use]
    pub fn is_subscribed(&self, kind: EventKind, subscriber: &WeakStrategy) -> bool {
        self.handlers
            .get(&kind)
            .is_some_and(|list| list.iter().any(|s| Weak::ptr_eq(s, subscriber)))
    }

    /// Live subscribers of `kind`
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers
            .get(&kind)
            .map_or(0, |list| list.iter().filter(|s| s.strong_count() > 0).count())
    }

    /// Apply `event` to its book and dispatch it
    ///
    /// Book kinds mutate the instrument's quote first. A rejected update is
    /// dispatched as a diagnostic instead of the original event; a mutation
    /// that crosses the book is followed by one `CrossedBook` diagnostic.
    pub fn publish(
        &mut self,
        event: MarketEvent,
        universe: &mut Universe,
        timers: &mut TimerWheel,
    ) -> PublishReport {
        self.stats.published += 1;
        let mut report = PublishReport::default();

        let (event, follow_up) = Self::apply(event, universe, &mut report);
        self.stats.diagnostics += report.diagnostics as u64;

        self.dispatch(&event, universe, timers, &mut report);
        if let Some(diagnostic) = follow_up {
            self.dispatch(&diagnostic, universe, timers, &mut report);
        }
        report
    }

    fn apply(
        event: MarketEvent,
        universe: &mut Universe,
        report: &mut PublishReport,
    ) -> (MarketEvent, Option<MarketEvent>) {
        let instrument = event.instrument();
        let ts = event.ts();

        let Some((side, op)) = event.level_op() else {
            if matches!(event, MarketEvent::Trade(_)) && universe.instrument_by_id(instrument).is_none() {
                warn!(%instrument, "Trade for unknown instrument");
                report.diagnostics += 1;
                return (
                    MarketEvent::diagnostic(instrument, ts, Anomaly::UnknownInstrument),
                    None,
                );
            }
            return (event, None);
        };

        let Some(quote) = universe.quote_mut(instrument) else {
            warn!(%instrument, kind = ?event.kind(), "Book update for unknown instrument");
            report.diagnostics += 1;
            return (
                MarketEvent::diagnostic(instrument, ts, Anomaly::UnknownInstrument),
                None,
            );
        };

        match quote.apply(side, op, ts) {
            Ok(change) => {
                report.mutated = change.change.is_mutation();
                let crossed = change.crossed.map(|crossed| {
                    warn!(%instrument, bid = %crossed.bid, ask = %crossed.ask, "Crossed book");
                    report.diagnostics += 1;
                    MarketEvent::diagnostic(instrument, ts, crossed.into())
                });
                (event, crossed)
            }
            Err(err) => {
                warn!(%instrument, error = %err, "Book update rejected");
                report.diagnostics += 1;
                (MarketEvent::diagnostic(instrument, ts, err.into()), None)
            }
        }
    }

    fn dispatch(
        &mut self,
        event: &MarketEvent,
        universe: &Universe,
        timers: &mut TimerWheel,
        report: &mut PublishReport,
    ) {
        let kind = event.kind();
        let snapshot = match self.handlers.get(&kind) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => {
                debug!(?kind, instrument = %event.instrument(), "No subscribers");
                self.apply_changes();
                return;
            }
        };

        let mut dispatched = 0;
        let mut dead = false;
        for subscriber in &snapshot {
            let Some(strategy) = subscriber.upgrade() else {
                dead = true;
                continue;
            };
            let Ok(mut guard) = strategy.try_borrow_mut() else {
                self.failures
                    .push(DispatchFailure::busy(FailureOrigin::Event(kind)));
                continue;
            };

            let mut ctx = Context::new(universe, timers, &mut self.deferred, subscriber.clone());
            let result = guard.handle_event(kind, event, &mut ctx);
            dispatched += 1;

            if let Err(error) = result {
                self.failures.push(DispatchFailure {
                    strategy: Some(guard.name().to_string()),
                    origin: FailureOrigin::Event(kind),
                    error,
                });
            }
        }
        debug!(?kind, instrument = %event.instrument(), dispatched, "Event dispatched");

        if dead {
            self.prune(kind);
        }
        report.dispatched += dispatched;
        report.failures += self.failures.len();
        self.stats.dispatched += dispatched as u64;
        self.flush_failures();
        self.apply_changes();
    }

    fn prune(&mut self, kind: EventKind) {
        if let Some(list) = self.handlers.get_mut(&kind) {
            let before = list.len();
            list.retain(|s| s.strong_count() > 0);
            self.stats.pruned += (before - list.len()) as u64;
        }
    }

    fn flush_failures(&mut self) {
        for failure in self.failures.drain(..) {
            self.sink.report(&failure);
            self.stats.failures += 1;
        }
    }

    /// Report a failure raised outside a dispatch pass (timer callbacks)
    pub(crate) fn report_failure(&mut self, failure: DispatchFailure) {
        self.sink.report(&failure);
        self.stats.failures += 1;
    }

    /// Apply subscription changes queued by callbacks, in request order
    pub(crate) fn apply_changes(&mut self) {
        let changes = std::mem::take(&mut self.deferred.changes);
        for change in changes {
            match change {
                SubscriptionChange::Subscribe { kind, subscriber } => {
                    self.subscribe(kind, &subscriber);
                }
                SubscriptionChange::Unsubscribe { kind, subscriber } => {
                    self.unsubscribe(kind, &subscriber);
                }
            }
        }
    }

    pub(crate) fn deferred_mut(&mut self) -> &mut Deferred {
        &mut self.deferred
    }

    /// Next event published from a callback
    pub(crate) fn pop_queued(&mut self) -> Option<MarketEvent> {
        self.deferred.outbox.pop_front()
    }

    pub(crate) fn clear_queued(&mut self) {
        self.deferred.outbox.clear();
    }

    /// Events waiting behind the current pass
    #[must_use]
    pub fn queued(&self) -> usize {
        self.deferred.outbox.len()
    }

    /// Lifetime counters
    #[must_use]
    pub const fn stats(&self) -> BusStats {
        self.stats
    }

    /// Drop all subscriptions and queued work
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.deferred.changes.clear();
        self.deferred.outbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LevelEvent, TradeEvent};
    use crate::strategy::{SharedStrategy, Strategy};
    use common::{InstrumentId, Px, Qty, Side, StrategyConfig, Ts};
    use instruments::{InstrumentSpec, UniverseBuilder};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(&'static str, MarketEvent)>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        fail: bool,
        unsubscribe_on_first: bool,
    }

    impl Strategy for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self, _config: &StrategyConfig, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
            Ok(())
        }

        fn handle_event(
            &mut self,
            kind: EventKind,
            event: &MarketEvent,
            ctx: &mut Context<'_>,
        ) -> anyhow::Result<()> {
            self.log.borrow_mut().push((self.name, *event));
            if self.unsubscribe_on_first {
                ctx.unsubscribe(kind);
            }
            if self.fail {
                anyhow::bail!("{} refuses {kind}", self.name);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSink(Rc<RefCell<Vec<String>>>);

    impl ErrorSink for CountingSink {
        fn report(&mut self, failure: &DispatchFailure) {
            self.0.borrow_mut().push(failure.error.to_string());
        }
    }

    fn recorder(name: &'static str, log: &Log) -> SharedStrategy {
        Rc::new(RefCell::new(Recorder {
            name,
            log: Rc::clone(log),
            fail: false,
            unsubscribe_on_first: false,
        }))
    }

    fn universe() -> Universe {
        UniverseBuilder::new()
            .with(InstrumentSpec::equity(1, "RELIANCE", "NSE", 0.05))
            .build()
            .unwrap_or_default()
    }

    fn level(side: Side, price: i64, size: i64) -> LevelEvent {
        LevelEvent {
            instrument: InstrumentId(1),
            ts: Ts(1),
            side,
            price: Px::from_i64(price),
            size: Qty::from_i64(size),
        }
    }

    fn names(log: &Log) -> Vec<&'static str> {
        log.borrow().iter().map(|(name, _)| *name).collect()
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let log = Log::default();
        let (a, b) = (recorder("a", &log), recorder("b", &log));
        let mut bus = EventBus::new();
        let mut universe = universe();
        let mut timers = TimerWheel::default();

        assert!(bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&b)));
        assert!(bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&a)));
        assert!(!bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&a)));

        for price in [100, 101, 102] {
            bus.publish(
                MarketEvent::NewLevel(level(Side::Bid, price, 1)),
                &mut universe,
                &mut timers,
            );
        }
        assert_eq!(names(&log), vec!["b", "a", "b", "a", "b", "a"]);
        assert_eq!(bus.stats().dispatched, 6);
    }

    #[test]
    fn test_dead_subscriber_rejected_and_pruned() {
        let log = Log::default();
        let mut bus = EventBus::new();
        let mut universe = universe();
        let mut timers = TimerWheel::default();

        let dropped = Rc::downgrade(&recorder("gone", &log));
        assert!(!bus.subscribe(EventKind::Trade, &dropped));

        let short_lived = recorder("short", &log);
        bus.subscribe(EventKind::Trade, &Rc::downgrade(&short_lived));
        drop(short_lived);

        let trade = MarketEvent::Trade(TradeEvent {
            instrument: InstrumentId(1),
            ts: Ts(1),
            price: Px::from_i64(100),
            size: Qty::from_i64(1),
            aggressor: None,
        });
        let report = bus.publish(trade, &mut universe, &mut timers);
        assert_eq!(report.dispatched, 0);
        assert_eq!(bus.stats().pruned, 1);
        assert_eq!(bus.subscriber_count(EventKind::Trade), 0);
    }

    #[test]
    fn test_failing_handler_does_not_stop_pass() {
        let log = Log::default();
        let reported = Rc::new(RefCell::new(Vec::new()));
        let failing: SharedStrategy = Rc::new(RefCell::new(Recorder {
            name: "failing",
            log: Rc::clone(&log),
            fail: true,
            unsubscribe_on_first: false,
        }));
        let healthy = recorder("healthy", &log);
        let mut bus = EventBus::with_error_sink(Box::new(CountingSink(Rc::clone(&reported))));
        let mut universe = universe();
        let mut timers = TimerWheel::default();

        bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&failing));
        bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&healthy));
        let report = bus.publish(
            MarketEvent::NewLevel(level(Side::Ask, 100, 5)),
            &mut universe,
            &mut timers,
        );

        assert_eq!(names(&log), vec!["failing", "healthy"]);
        assert_eq!(report.failures, 1);
        assert_eq!(reported.borrow().as_slice(), ["failing refuses new_level"]);
    }

    #[test]
    fn test_borrowed_subscriber_reported_as_busy() {
        let log = Log::default();
        let reported = Rc::new(RefCell::new(Vec::new()));
        let held = recorder("held", &log);
        let mut bus = EventBus::with_error_sink(Box::new(CountingSink(Rc::clone(&reported))));
        let mut universe = universe();
        let mut timers = TimerWheel::default();
        bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&held));

        let _guard = held.borrow();
        let report = bus.publish(
            MarketEvent::NewLevel(level(Side::Ask, 100, 5)),
            &mut universe,
            &mut timers,
        );
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.failures, 1);
        assert_eq!(reported.borrow().len(), 1);
    }

    #[test]
    fn test_unsubscribe_inside_handler_keeps_current_pass() {
        let log = Log::default();
        let quitter: SharedStrategy = Rc::new(RefCell::new(Recorder {
            name: "quitter",
            log: Rc::clone(&log),
            fail: false,
            unsubscribe_on_first: true,
        }));
        let stayer = recorder("stayer", &log);
        let mut bus = EventBus::new();
        let mut universe = universe();
        let mut timers = TimerWheel::default();

        bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&quitter));
        bus.subscribe(EventKind::NewLevel, &Rc::downgrade(&stayer));

        bus.publish(MarketEvent::NewLevel(level(Side::Bid, 99, 1)), &mut universe, &mut timers);
        bus.publish(MarketEvent::NewLevel(level(Side::Bid, 98, 1)), &mut universe, &mut timers);

        assert_eq!(names(&log), vec!["quitter", "stayer", "stayer"]);
        assert!(!bus.is_subscribed(EventKind::NewLevel, &Rc::downgrade(&quitter)));
    }

    #[test]
    fn test_unknown_modify_becomes_diagnostic() {
        let log = Log::default();
        let watcher = recorder("watcher", &log);
        let mut bus = EventBus::new();
        let mut universe = universe();
        let mut timers = TimerWheel::default();
        bus.subscribe(EventKind::ModifyLevel, &Rc::downgrade(&watcher));
        bus.subscribe(EventKind::Diagnostic, &Rc::downgrade(&watcher));

        let report = bus.publish(
            MarketEvent::ModifyLevel(level(Side::Ask, 100, 5)),
            &mut universe,
            &mut timers,
        );

        assert!(!report.mutated);
        assert_eq!(report.diagnostics, 1);
        let seen: Vec<MarketEvent> = log.borrow().iter().map(|(_, e)| *e).collect();
        assert_eq!(
            seen,
            vec![MarketEvent::diagnostic(
                InstrumentId(1),
                Ts(1),
                Anomaly::UnknownLevel {
                    side: Side::Ask,
                    price: Px::from_i64(100)
                }
            )]
        );
    }

    #[test]
    fn test_crossing_update_raises_one_diagnostic() {
        let log = Log::default();
        let watcher = recorder("watcher", &log);
        let mut bus = EventBus::new();
        let mut universe = universe();
        let mut timers = TimerWheel::default();
        bus.subscribe(EventKind::Diagnostic, &Rc::downgrade(&watcher));

        bus.publish(MarketEvent::NewLevel(level(Side::Ask, 100, 5)), &mut universe, &mut timers);
        let report = bus.publish(
            MarketEvent::NewLevel(level(Side::Bid, 101, 5)),
            &mut universe,
            &mut timers,
        );
        assert!(report.mutated);
        assert_eq!(report.diagnostics, 1);
        // Deleting an absent level while crossed is not a new violation
        bus.publish(MarketEvent::DeleteLevel(level(Side::Bid, 50, 0)), &mut universe, &mut timers);

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(bus.stats().diagnostics, 1);
    }

    #[test]
    fn test_trade_without_subscribers_is_noop() {
        let mut bus = EventBus::new();
        let mut universe = universe();
        let mut timers = TimerWheel::default();
        let report = bus.publish(
            MarketEvent::Trade(TradeEvent {
                instrument: InstrumentId(1),
                ts: Ts(1),
                price: Px::from_i64(100),
                size: Qty::from_i64(1),
                aggressor: Some(Side::Bid),
            }),
            &mut universe,
            &mut timers,
        );
        assert_eq!(report, PublishReport::default());
    }
}
