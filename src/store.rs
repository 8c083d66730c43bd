/// store.rs – Latest value of every polled source.
///
/// Each field is overwritten wholesale by a successful poll of its source and
/// otherwise left alone: a failing source keeps showing its last good value.
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{
    BrokerStatus, EngineStatus, IndexQuote, Selection, StrategyConfigView, TickSnapshot,
    TodayPositions, TradeSideMode, TradeStateMap,
};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollSource {
    Status,
    TradeState,
    Selection,
    Ticks,
    Indices,
    StrategyConfig,
    Positions,
    Logs,
    TradeSideMode,
    Broker,
}

impl PollSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PollSource::Status => "status",
            PollSource::TradeState => "trade_state",
            PollSource::Selection => "selection",
            PollSource::Ticks => "ltp_snapshot",
            PollSource::Indices => "market_indices",
            PollSource::StrategyConfig => "strategy_config",
            PollSource::Positions => "positions",
            PollSource::Logs => "logs",
            PollSource::TradeSideMode => "trade_side_mode",
            PollSource::Broker => "broker_status",
        }
    }
}

impl std::fmt::Display for PollSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successful poll result.
#[derive(Debug, Clone)]
pub enum SourceUpdate {
    Status(EngineStatus),
    TradeState(TradeStateMap),
    Selection(Selection),
    Ticks(TickSnapshot),
    Indices(HashMap<String, IndexQuote>),
    StrategyConfig(StrategyConfigView),
    Positions(TodayPositions),
    Logs(Vec<String>),
    TradeSideMode(TradeSideMode),
    Broker(BrokerStatus),
}

impl SourceUpdate {
    pub fn source(&self) -> PollSource {
        match self {
            SourceUpdate::Status(_) => PollSource::Status,
            SourceUpdate::TradeState(_) => PollSource::TradeState,
            SourceUpdate::Selection(_) => PollSource::Selection,
            SourceUpdate::Ticks(_) => PollSource::Ticks,
            SourceUpdate::Indices(_) => PollSource::Indices,
            SourceUpdate::StrategyConfig(_) => PollSource::StrategyConfig,
            SourceUpdate::Positions(_) => PollSource::Positions,
            SourceUpdate::Logs(_) => PollSource::Logs,
            SourceUpdate::TradeSideMode(_) => PollSource::TradeSideMode,
            SourceUpdate::Broker(_) => PollSource::Broker,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    pub status: Option<EngineStatus>,
    pub trade_state: Option<TradeStateMap>,
    pub selection: Option<Selection>,
    pub ticks: Option<TickSnapshot>,
    pub indices: Option<HashMap<String, IndexQuote>>,
    pub strategy_config: Option<StrategyConfigView>,
    pub positions: Option<TodayPositions>,
    pub logs: Option<Vec<String>>,
    pub trade_side_mode: Option<TradeSideMode>,
    pub broker: Option<BrokerStatus>,
    updated_at: HashMap<PollSource, DateTime<Utc>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the field owned by the update's source.
    pub fn apply(&mut self, update: SourceUpdate) -> PollSource {
        let source = update.source();
        match update {
            SourceUpdate::Status(v) => self.status = Some(v),
            SourceUpdate::TradeState(v) => self.trade_state = Some(v),
            SourceUpdate::Selection(v) => self.selection = Some(v),
            SourceUpdate::Ticks(v) => self.ticks = Some(v),
            SourceUpdate::Indices(v) => self.indices = Some(v),
            SourceUpdate::StrategyConfig(v) => self.strategy_config = Some(v),
            SourceUpdate::Positions(v) => self.positions = Some(v),
            SourceUpdate::Logs(v) => self.logs = Some(v),
            SourceUpdate::TradeSideMode(v) => self.trade_side_mode = Some(v),
            SourceUpdate::Broker(v) => self.broker = Some(v),
        }
        self.updated_at.insert(source, Utc::now());
        source
    }

    /// Operator override applied before the backend confirms it; the next
    /// poll of the mode source replaces it either way.
    pub fn set_trade_side_mode(&mut self, mode: TradeSideMode) {
        self.trade_side_mode = Some(mode);
    }

    pub fn trade_side_mode(&self) -> TradeSideMode {
        self.trade_side_mode.unwrap_or_default()
    }

    pub fn trading_enabled(&self) -> bool {
        self.strategy_config
            .as_ref()
            .map(|c| c.trade_on)
            .unwrap_or(false)
    }

    pub fn trading_halted(&self) -> bool {
        self.status.as_ref().map(|s| s.trading_halted).unwrap_or(false)
    }

    pub fn updated_at(&self, source: PollSource) -> Option<DateTime<Utc>> {
        self.updated_at.get(&source).copied()
    }

    /// Seconds since the source last delivered, `None` if it never did.
    pub fn age_seconds(&self, source: PollSource, now: DateTime<Utc>) -> Option<i64> {
        self.updated_at(source)
            .map(|t| (now - t).num_seconds().max(0))
    }
}
