//! Per-callback view of the engine handed to strategies

use crate::bus::{Deferred, SubscriptionChange};
use crate::events::{EventKind, MarketEvent};
use crate::strategy::WeakStrategy;
use crate::timer::{TimerCallback, TimerId, TimerWheel, route_to_on_timer};
use common::Ts;
use instruments::Universe;
use std::time::Duration;

/// What a strategy may see and do from inside a callback
///
/// Reference data and books are read-only. Timer changes take effect at
/// once. Subscription changes and publishes are queued and applied when the
/// current dispatch pass ends.
pub struct Context<'a> {
    universe: &'a Universe,
    timers: &'a mut TimerWheel,
    deferred: &'a mut Deferred,
    subscriber: WeakStrategy,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        universe: &'a Universe,
        timers: &'a mut TimerWheel,
        deferred: &'a mut Deferred,
        subscriber: WeakStrategy,
    ) -> Self {
        Self {
            universe,
            timers,
            deferred,
            subscriber,
        }
    }

    /// Instruments, chains and books
    #[must_use]
    pub fn universe(&self) -> &'a Universe {
        self.universe
    }

    /// Engine time
    #[must_use]
    pub fn now(&self) -> Ts {
        self.timers.now()
    }

    /// One-shot timer routed to `on_timer`
    pub fn add_deadline_timer(&mut self, delay: Duration, token: u64) -> TimerId {
        self.add_deadline_timer_with(delay, token, route_to_on_timer)
    }

    /// One-shot timer with a custom callback
    pub fn add_deadline_timer_with(
        &mut self,
        delay: Duration,
        token: u64,
        callback: TimerCallback,
    ) -> TimerId {
        self.timers
            .add_deadline_timer(delay, self.subscriber.clone(), token, callback)
    }

    /// Periodic timer routed to `on_timer`; `None` for a zero period
    pub fn add_periodic_timer(&mut self, period: Duration, token: u64) -> Option<TimerId> {
        self.add_periodic_timer_with(period, token, route_to_on_timer)
    }

    /// Periodic timer with a custom callback; `None` for a zero period
    pub fn add_periodic_timer_with(
        &mut self,
        period: Duration,
        token: u64,
        callback: TimerCallback,
    ) -> Option<TimerId> {
        self.timers
            .add_periodic_timer(period, self.subscriber.clone(), token, callback)
    }

    /// Cancel a timer; safe from inside that timer's own callback
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Whether a timer is still pending
    #[must_use]
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.is_scheduled(id)
    }

    /// Subscribe the calling strategy to `kind`
    pub fn subscribe(&mut self, kind: EventKind) {
        self.deferred.changes.push(SubscriptionChange::Subscribe {
            kind,
            subscriber: self.subscriber.clone(),
        });
    }

    /// Subscribe the calling strategy to several kinds
    pub fn subscribe_all(&mut self, kinds: &[EventKind]) {
        for kind in kinds {
            self.subscribe(*kind);
        }
    }

    /// Unsubscribe the calling strategy from `kind`
    ///
    /// The current pass still completes; no later pass reaches the strategy.
    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.deferred.changes.push(SubscriptionChange::Unsubscribe {
            kind,
            subscriber: self.subscriber.clone(),
        });
    }

    /// Queue an event behind the current pass
    pub fn publish(&mut self, event: MarketEvent) {
        self.deferred.outbox.push_back(event);
    }
}
