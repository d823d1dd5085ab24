//! Timer wheel: deadline and periodic timers on the engine clock
//!
//! Timers live in a binary min-heap keyed by (deadline, insertion sequence)
//! with lazy deletion, plus an id -> entry map that is the source of truth.
//! Cancelling removes the map entry, so a cancelled timer never fires even if
//! its heap slot is still waiting to be popped. Ties fire in insertion order.
//!
//! The wheel does not invoke callbacks. The engine pops due timers, runs the
//! callback against the owning strategy and hands the timer back through
//! [`TimerWheel::complete`], which reschedules periodic timers.

use crate::context::Context;
use crate::strategy::{Strategy, WeakStrategy};
use common::Ts;
use common::constants::DEFAULT_TIMER_CAPACITY;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Weak;
use std::time::Duration;
use tracing::debug;

/// Cancelled heap slots tolerated before a rebuild is considered
const MIN_STALE_TO_COMPACT: usize = 64;

/// Function run when a timer fires; the token travels in [`TimerFire`]
pub type TimerCallback =
    fn(&mut dyn Strategy, &TimerFire, &mut Context<'_>) -> anyhow::Result<()>;

/// Default callback: routes to [`Strategy::on_timer`]
pub fn route_to_on_timer(
    strategy: &mut dyn Strategy,
    fire: &TimerFire,
    ctx: &mut Context<'_>,
) -> anyhow::Result<()> {
    strategy.on_timer(fire, ctx)
}

/// Handle to a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw id
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// What a callback learns about the firing timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    /// Timer id
    pub id: TimerId,
    /// Caller-supplied token
    pub token: u64,
    /// Deadline that was reached
    pub deadline: Ts,
    /// Period for periodic timers
    pub period: Option<Duration>,
}

/// A timer popped from the wheel and waiting to be run
#[derive(Debug)]
pub struct DueTimer {
    /// Firing details handed to the callback
    pub fire: TimerFire,
    /// Owning strategy
    pub owner: WeakStrategy,
    /// Callback to run
    pub callback: TimerCallback,
}

#[derive(Debug)]
struct TimerEntry {
    deadline: Ts,
    seq: u64,
    period: Option<Duration>,
    owner: WeakStrategy,
    token: u64,
    callback: TimerCallback,
}

/// Deadline-ordered timer store driven by the engine clock
#[derive(Debug)]
pub struct TimerWheel {
    now: Ts,
    next_id: u64,
    next_seq: u64,
    heap: BinaryHeap<Reverse<(Ts, u64, TimerId)>>,
    entries: FxHashMap<TimerId, TimerEntry>,
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new(Ts::default())
    }
}

impl TimerWheel {
    /// Create an empty wheel with its clock at `now`
    #[must_use]
    pub fn new(now: Ts) -> Self {
        Self {
            now,
            next_id: 1,
            next_seq: 0,
            heap: BinaryHeap::with_capacity(DEFAULT_TIMER_CAPACITY),
            entries: FxHashMap::default(),
        }
    }

    /// Current engine time
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Ts {
        self.now
    }

    /// Schedule a one-shot timer at `now + delay`
    pub fn add_deadline_timer(
        &mut self,
        delay: Duration,
        owner: WeakStrategy,
        token: u64,
        callback: TimerCallback,
    ) -> TimerId {
        let deadline = self.now.saturating_add(delay);
        self.insert(deadline, None, owner, token, callback)
    }

    /// Schedule a periodic timer, first firing at `now + period`
    ///
    /// Returns `None` for a zero period.
    pub fn add_periodic_timer(
        &mut self,
        period: Duration,
        owner: WeakStrategy,
        token: u64,
        callback: TimerCallback,
    ) -> Option<TimerId> {
        if period.is_zero() {
            return None;
        }
        let deadline = self.now.saturating_add(period);
        Some(self.insert(deadline, Some(period), owner, token, callback))
    }

    /// Cancel a timer; `false` if it already fired (one-shot) or is unknown
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let cancelled = self.entries.remove(&id).is_some();
        if cancelled {
            debug!(timer = %id, "Timer cancelled");
            self.compact();
        }
        cancelled
    }

    /// Cancel every timer owned by `owner`, returning how many were removed
    pub fn cancel_owned_by(&mut self, owner: &WeakStrategy) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !Weak::ptr_eq(&entry.owner, owner));
        self.compact();
        before - self.entries.len()
    }

    /// Move the clock forward; it never moves back
    pub fn advance_to(&mut self, ts: Ts) {
        if ts > self.now {
            self.now = ts;
        }
    }

    /// Pop the earliest timer whose deadline has been reached
    pub fn pop_due(&mut self) -> Option<DueTimer> {
        self.pop_due_until(self.now)
    }

    /// Pop the earliest timer with deadline <= `limit`, moving the clock to
    /// its deadline
    ///
    /// One-shot timers leave the wheel here. Periodic timers stay scheduled
    /// until [`Self::complete`], so they can be cancelled from their own
    /// callback.
    pub fn pop_due_until(&mut self, limit: Ts) -> Option<DueTimer> {
        while let Some(&Reverse((deadline, seq, id))) = self.heap.peek() {
            if deadline > limit {
                return None;
            }
            self.heap.pop();

            // Cancelled or rescheduled since this slot was pushed
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if entry.seq != seq {
                continue;
            }

            let due = Self::due(id, entry);
            if due.fire.period.is_none() {
                self.entries.remove(&id);
            }
            self.advance_to(deadline);
            return Some(due);
        }
        None
    }

    /// Finish a popped timer; periodic timers are rescheduled at
    /// `deadline + period` unless cancelled meanwhile
    pub fn complete(&mut self, due: DueTimer) {
        let Some(period) = due.fire.period else {
            return;
        };
        let seq = self.next_seq;
        let Some(entry) = self.entries.get_mut(&due.fire.id) else {
            return;
        };
        self.next_seq += 1;

        entry.deadline = due.fire.deadline.saturating_add(period);
        entry.seq = seq;
        self.heap.push(Reverse((entry.deadline, seq, due.fire.id)));
    }

    /// Earliest pending deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<Ts> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    /// Whether `id` is still scheduled
    #[must_use]
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of scheduled timers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is scheduled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every timer; the clock is kept
    pub fn clear(&mut self) {
        self.entries.clear();
        self.heap.clear();
    }

    fn insert(
        &mut self,
        deadline: Ts,
        period: Option<Duration>,
        owner: WeakStrategy,
        token: u64,
        callback: TimerCallback,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(Reverse((deadline, seq, id)));
        self.entries.insert(
            id,
            TimerEntry {
                deadline,
                seq,
                period,
                owner,
                token,
                callback,
            },
        );
        debug!(timer = %id, %deadline, ?period, "Timer scheduled");
        id
    }

    /// Rebuild the heap from live entries once cancelled slots dominate it
    fn compact(&mut self) {
        let stale = self.heap.len().saturating_sub(self.entries.len());
        if stale < MIN_STALE_TO_COMPACT || stale <= 2 * self.entries.len() {
            return;
        }
        self.heap = self
            .entries
            .iter()
            .map(|(id, entry)| Reverse((entry.deadline, entry.seq, *id)))
            .collect();
        debug!(dropped = stale, live = self.entries.len(), "Timer heap compacted");
    }

    fn due(id: TimerId, entry: &TimerEntry) -> DueTimer {
        DueTimer {
            fire: TimerFire {
                id,
                token: entry.token,
                deadline: entry.deadline,
                period: entry.period,
            },
            owner: entry.owner.clone(),
            callback: entry.callback,
        }
    }
}
