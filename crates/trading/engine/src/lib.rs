//! Single-threaded strategy runtime
//!
//! The [`Engine`] owns the instrument universe, an [`EventBus`] and a
//! [`TimerWheel`]. Feed records are applied to books and dispatched to
//! subscribed strategies; timers interleave with records in timestamp order.
//!
//! Execution model:
//! - One unit of work at a time, run to completion
//! - Strategies are `Rc<RefCell<_>>`; the bus and timers hold `Weak`
//! - Handler failures are isolated and reported after each pass

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]

pub mod bus;
pub mod context;
pub mod errors;
pub mod events;
pub mod feed;
pub mod runtime;
pub mod strategies;
pub mod strategy;
pub mod timer;

// Re-exports
pub use bus::{BusStats, EventBus, PublishReport};
pub use context::Context;
pub use errors::{
    DispatchFailure, EngineError, ErrorSink, FailureOrigin, FeedError, TracingErrorSink,
};
pub use events::{Anomaly, DiagnosticEvent, EventKind, LevelEvent, MarketEvent, TradeEvent};
pub use feed::{FeedReader, FeedRecord, FeedUpdate};
pub use runtime::{Engine, RunSummary};
pub use strategy::{SharedStrategy, Strategy, WeakStrategy};
pub use timer::{DueTimer, TimerCallback, TimerFire, TimerId, TimerWheel, route_to_on_timer};
