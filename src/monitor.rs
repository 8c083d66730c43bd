/// monitor.rs – Derived state owned by the main loop.
///
/// Applies each live poll result to the snapshot store and keeps the
/// reconciled rows, transition memory and rolling histories in step with it.
use chrono::{DateTime, Utc};

use crate::alerts::TransitionDetector;
use crate::history::SeriesTracker;
use crate::models::{AlertEvent, TradeSideMode};
use crate::reconcile::{self, ReconciledRow};
use crate::store::{PollSource, SnapshotStore, SourceUpdate};

pub struct Monitor {
    pub store: SnapshotStore,
    pub history: SeriesTracker,
    detector: TransitionDetector,
    rows: Vec<ReconciledRow>,
    pub started_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new(price_window: usize, pnl_window: usize) -> Self {
        Self {
            store: SnapshotStore::new(),
            history: SeriesTracker::new(price_window, pnl_window),
            detector: TransitionDetector::new(),
            rows: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Apply one update and return the alerts it caused.
    pub fn apply(&mut self, update: SourceUpdate, now: DateTime<Utc>) -> Vec<AlertEvent> {
        // Diff against the previous trade state before it is overwritten.
        let events = match &update {
            SourceUpdate::TradeState(ts) => self.detector.observe(ts, now),
            SourceUpdate::Ticks(ticks) => {
                self.history.record_prices(ticks);
                Vec::new()
            }
            _ => Vec::new(),
        };

        let source = self.store.apply(update);
        match source {
            PollSource::TradeState | PollSource::Ticks => {
                self.refresh_rows();
                if let Some(ts) = &self.store.trade_state {
                    self.history.record_pnl(ts, self.store.ticks.as_ref());
                }
            }
            PollSource::Selection | PollSource::TradeSideMode => self.refresh_rows(),
            _ => {}
        }
        events
    }

    /// Local mode override from the dashboard key binding.
    pub fn set_mode(&mut self, mode: TradeSideMode) {
        self.store.set_trade_side_mode(mode);
        self.refresh_rows();
    }

    fn refresh_rows(&mut self) {
        self.rows = match &self.store.selection {
            Some(selection) => reconcile::reconcile(
                selection,
                self.store.trade_state.as_ref(),
                self.store.ticks.as_ref(),
                self.store.trade_side_mode(),
            ),
            None => Vec::new(),
        };
    }

    pub fn rows(&self) -> &[ReconciledRow] {
        &self.rows
    }

    pub fn active_count(&self) -> usize {
        reconcile::active_count(self.store.trade_state.as_ref())
    }

    pub fn in_trade(&self) -> bool {
        reconcile::in_trade(self.store.trade_state.as_ref())
    }

    /// Sum of live PnL over rows that have one.
    pub fn live_pnl_total(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.pnl).sum()
    }
}
