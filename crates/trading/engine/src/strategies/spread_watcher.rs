//! Watches the top of book of one instrument and logs periodic summaries

use crate::context::Context;
use crate::events::{Anomaly, EventKind, MarketEvent};
use crate::strategy::Strategy;
use crate::timer::{TimerFire, TimerId};
use anyhow::{Context as _, bail};
use common::{InstrumentId, Px, Qty, StrategyConfig};
use std::time::Duration;
use tracing::{debug, info, warn};

const REPORT_TOKEN: u64 = 1;

/// Tracks spread, traded volume and anomalies for a single instrument
#[derive(Debug, Default)]
pub struct SpreadWatcher {
    instrument: Option<InstrumentId>,
    report_timer: Option<TimerId>,
    book_updates: u64,
    trades: u64,
    volume: Qty,
    last_spread: Option<Px>,
    crossed: u64,
    reports: u64,
}

impl SpreadWatcher {
    /// Name used in runtime config
    pub const NAME: &'static str = "spread_watcher";

    /// Create an idle watcher; `init` binds it to an instrument
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instrument resolved at init
    #[must_use]
    pub const fn instrument(&self) -> Option<InstrumentId> {
        self.instrument
    }

    /// Book events seen for the watched instrument
    #[must_use]
    pub const fn book_updates(&self) -> u64 {
        self.book_updates
    }

    /// Trades seen for the watched instrument
    #[must_use]
    pub const fn trades(&self) -> u64 {
        self.trades
    }

    /// Summed trade size
    #[must_use]
    pub const fn volume(&self) -> Qty {
        self.volume
    }

    /// Spread after the last book event, `None` if one side was empty or crossed
    #[must_use]
    pub const fn last_spread(&self) -> Option<Px> {
        self.last_spread
    }

    /// Crossed-book diagnostics received
    #[must_use]
    pub const fn crossed(&self) -> u64 {
        self.crossed
    }

    /// Summaries logged so far
    #[must_use]
    pub const fn reports(&self) -> u64 {
        self.reports
    }
}

impl Strategy for SpreadWatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self, config: &StrategyConfig, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let symbol: String = config
            .try_get("symbol")?
            .unwrap_or_else(|| "RELIANCE".to_string());
        // Report interval in seconds
        let interval: u64 = config
            .try_get("my_param")
            .context("my_param must be a positive number of seconds")?
            .unwrap_or(42);
        if interval == 0 {
            bail!("my_param must be a positive number of seconds");
        }

        let instrument = ctx
            .universe()
            .instrument_by_symbol(&symbol)
            .with_context(|| format!("unknown symbol {symbol}"))?
            .id();
        self.instrument = Some(instrument);

        ctx.subscribe_all(&EventKind::ALL);
        self.report_timer =
            ctx.add_periodic_timer(Duration::from_secs(interval), REPORT_TOKEN);

        info!(%symbol, %instrument, interval_s = interval, "spread watcher started");
        Ok(())
    }

    fn handle_event(
        &mut self,
        kind: EventKind,
        event: &MarketEvent,
        ctx: &mut Context<'_>,
    ) -> anyhow::Result<()> {
        let Some(instrument) = self.instrument else {
            return Ok(());
        };
        if event.instrument() != instrument {
            return Ok(());
        }

        match event {
            MarketEvent::NewLevel(_) | MarketEvent::ModifyLevel(_) | MarketEvent::DeleteLevel(_) => {
                self.book_updates += 1;
                self.last_spread = ctx.universe().quote(instrument).and_then(|q| q.spread());
            }
            MarketEvent::Trade(trade) => {
                self.trades += 1;
                self.volume = self.volume.saturating_add(trade.size);
            }
            MarketEvent::Diagnostic(diag) => {
                if let Anomaly::CrossedBook { bid, ask } = diag.anomaly {
                    self.crossed += 1;
                    warn!(%instrument, %bid, %ask, "watched book crossed");
                }
            }
        }
        debug!(%instrument, %kind, "spread watcher event");
        Ok(())
    }

    fn on_timer(&mut self, fire: &TimerFire, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        if fire.token != REPORT_TOKEN {
            return Ok(());
        }
        self.reports += 1;
        let bbo = self
            .instrument
            .and_then(|id| ctx.universe().quote(id))
            .and_then(|q| q.bbo().ok());
        info!(
            ts = %ctx.now(),
            updates = self.book_updates,
            trades = self.trades,
            volume = %self.volume,
            spread = ?self.last_spread,
            bbo = ?bbo,
            crossed = self.crossed,
            "spread summary"
        );
        Ok(())
    }
}
