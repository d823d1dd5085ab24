//! Engine error types and handler-failure reporting

use crate::events::EventKind;
use crate::timer::TimerId;
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Fatal runtime errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// `Strategy::init` returned an error
    #[error("strategy '{name}' failed to initialise: {error:#}")]
    StrategyInit {
        /// Strategy name
        name: String,
        /// Error returned by the strategy
        error: anyhow::Error,
    },

    /// The same strategy object was registered twice
    #[error("strategy '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The strategy is borrowed elsewhere and cannot be initialised
    #[error("strategy is already borrowed")]
    StrategyBusy,

    /// Config names a strategy the binary does not know
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
}

/// Feed ingestion errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Reading the source failed
    #[error("feed read error: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a valid record
    #[error("malformed feed record on line {line}: {source}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// Decode error
        source: serde_json::Error,
    },
}

/// Where a failed callback was invoked from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// Event handler for this kind
    Event(EventKind),
    /// Timer callback
    Timer(TimerId),
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(kind) => write!(f, "{kind} handler"),
            Self::Timer(id) => write!(f, "timer {id}"),
        }
    }
}

/// One callback that failed during a dispatch pass or timer tick
#[derive(Debug)]
pub struct DispatchFailure {
    /// Strategy name, `None` if it could not be borrowed
    pub strategy: Option<String>,
    /// Handler or timer that failed
    pub origin: FailureOrigin,
    /// The error
    pub error: anyhow::Error,
}

impl DispatchFailure {
    pub(crate) fn busy(origin: FailureOrigin) -> Self {
        Self {
            strategy: None,
            origin,
            error: anyhow::Error::new(EngineError::StrategyBusy),
        }
    }
}

/// Receives handler failures after each pass
pub trait ErrorSink {
    /// Report one failure
    fn report(&mut self, failure: &DispatchFailure);
}

/// Default sink: logs every failure at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&mut self, failure: &DispatchFailure) {
        error!(
            strategy = failure.strategy.as_deref().unwrap_or("<borrowed>"),
            origin = %failure.origin,
            error = %failure.error,
            "Strategy callback failed"
        );
    }
}
