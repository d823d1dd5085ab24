//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use anyhow::bail;
use common::{InstrumentId, Px, Qty, Side, StrategyConfig, Ts};
use engine::{
    Context, DispatchFailure, ErrorSink, EventKind, FailureOrigin, FeedRecord, FeedUpdate,
    MarketEvent, Strategy, TimerFire, TimerId,
};
use instruments::{InstrumentSpec, Universe, UniverseBuilder};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub const RELIANCE: InstrumentId = InstrumentId(1);
pub const INFY: InstrumentId = InstrumentId(2);

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn universe() -> Universe {
    UniverseBuilder::new()
        .with(InstrumentSpec::equity(1, "RELIANCE", "NSE", 0.05))
        .with(InstrumentSpec::equity(2, "INFY", "NSE", 0.05))
        .build()
        .unwrap()
}

pub fn px(value: f64) -> Px {
    Px::new(value)
}

pub fn qty(value: f64) -> Qty {
    Qty::new(value)
}

pub fn secs(s: u64) -> Ts {
    Ts::from_secs(s)
}

pub fn new_level(ts: Ts, instrument: InstrumentId, side: Side, price: f64, size: f64) -> FeedRecord {
    FeedRecord::new(
        ts,
        instrument,
        FeedUpdate::New {
            side,
            price: px(price),
            size: qty(size),
        },
    )
}

pub fn modify_level(
    ts: Ts,
    instrument: InstrumentId,
    side: Side,
    price: f64,
    size: f64,
) -> FeedRecord {
    FeedRecord::new(
        ts,
        instrument,
        FeedUpdate::Modify {
            side,
            price: px(price),
            size: qty(size),
        },
    )
}

pub fn delete_level(ts: Ts, instrument: InstrumentId, side: Side, price: f64) -> FeedRecord {
    FeedRecord::new(
        ts,
        instrument,
        FeedUpdate::Delete {
            side,
            price: px(price),
            size: Qty::ZERO,
        },
    )
}

pub fn trade(ts: Ts, instrument: InstrumentId, price: f64, size: f64) -> FeedRecord {
    FeedRecord::new(
        ts,
        instrument,
        FeedUpdate::Trade {
            price: px(price),
            size: qty(size),
            aggressor: None,
        },
    )
}

/// Scriptable strategy that records everything it sees
#[derive(Default)]
pub struct Probe {
    pub name: String,
    pub kinds: Vec<EventKind>,
    pub log: Log,
    pub events: Vec<MarketEvent>,
    pub fires: Vec<(TimerFire, Ts)>,
    pub deadline: Option<Duration>,
    pub period: Option<Duration>,
    pub timer: Option<TimerId>,
    pub cancel_after: Option<usize>,
    pub unsubscribe_after_first: bool,
    pub fail_on_event: bool,
    pub fail_init: bool,
}

impl Probe {
    pub fn new(name: &str, kinds: &[EventKind], log: &Log) -> Self {
        Self {
            name: name.to_string(),
            kinds: kinds.to_vec(),
            log: Rc::clone(log),
            ..Self::default()
        }
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn kinds_seen(&self) -> Vec<EventKind> {
        self.events.iter().map(MarketEvent::kind).collect()
    }
}

impl Strategy for Probe {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _config: &StrategyConfig, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.subscribe_all(&self.kinds);
        if let Some(delay) = self.deadline {
            self.timer = Some(ctx.add_deadline_timer(delay, 7));
        }
        if let Some(period) = self.period {
            self.timer = ctx.add_periodic_timer(period, 8);
        }
        if self.fail_init {
            bail!("refusing to start");
        }
        Ok(())
    }

    fn handle_event(
        &mut self,
        kind: EventKind,
        event: &MarketEvent,
        ctx: &mut Context<'_>,
    ) -> anyhow::Result<()> {
        self.log.borrow_mut().push(format!("{}:{kind}", self.name));
        self.events.push(*event);
        if self.unsubscribe_after_first {
            ctx.unsubscribe(kind);
        }
        if self.fail_on_event {
            bail!("handler blew up");
        }
        Ok(())
    }

    fn on_timer(&mut self, fire: &TimerFire, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.log.borrow_mut().push(format!("{}:timer", self.name));
        self.fires.push((*fire, ctx.now()));
        if self.cancel_after == Some(self.fires.len()) {
            ctx.cancel_timer(fire.id);
        }
        Ok(())
    }
}

/// Error sink that keeps what it was given
#[derive(Default, Clone)]
pub struct CollectingSink {
    pub reports: Rc<RefCell<Vec<(Option<String>, FailureOrigin, String)>>>,
}

impl ErrorSink for CollectingSink {
    fn report(&mut self, failure: &DispatchFailure) {
        self.reports.borrow_mut().push((
            failure.strategy.clone(),
            failure.origin,
            failure.error.to_string(),
        ));
    }
}
