/// models.rs – Core data types shared across the monitor modules.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    CE,
    PE,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::CE => "CE",
            Side::PE => "PE",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CE" => Ok(Side::CE),
            "PE" => Ok(Side::PE),
            _ => Err(anyhow::anyhow!("Unknown side: {s}")),
        }
    }
}

/// Operator-selected filter over which option sides are traded and shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TradeSideMode {
    #[default]
    Both,
    Ce,
    Pe,
}

impl TradeSideMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSideMode::Both => "BOTH",
            TradeSideMode::Ce => "CE",
            TradeSideMode::Pe => "PE",
        }
    }

    pub fn includes(self, side: Side) -> bool {
        match self {
            TradeSideMode::Both => true,
            TradeSideMode::Ce => side == Side::CE,
            TradeSideMode::Pe => side == Side::PE,
        }
    }

    /// Cycle order used by the dashboard key binding.
    pub fn next(self) -> Self {
        match self {
            TradeSideMode::Both => TradeSideMode::Ce,
            TradeSideMode::Ce => TradeSideMode::Pe,
            TradeSideMode::Pe => TradeSideMode::Both,
        }
    }
}

impl std::fmt::Display for TradeSideMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSideMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BOTH" => Ok(TradeSideMode::Both),
            "CE" => Ok(TradeSideMode::Ce),
            "PE" => Ok(TradeSideMode::Pe),
            _ => Err(anyhow::anyhow!("Unknown trade side mode: {s}")),
        }
    }
}

/// Lifecycle of a slot as reported by the engine. The monitor never drives
/// these transitions, it only observes them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Armed,
    BuyPlaced,
    BuyFilled,
    Protected,
    InTrade,
    Exiting,
    SlHit,
    TpHit,
    Exited,
    Closed,
    Unknown(String),
}

impl PositionState {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "ARMED" => PositionState::Armed,
            "BUY_PLACED" => PositionState::BuyPlaced,
            "BUY_FILLED" => PositionState::BuyFilled,
            "PROTECTED" => PositionState::Protected,
            "IN_TRADE" => PositionState::InTrade,
            "EXITING" => PositionState::Exiting,
            "SL_HIT" => PositionState::SlHit,
            "TP_HIT" => PositionState::TpHit,
            "EXITED" => PositionState::Exited,
            "CLOSED" => PositionState::Closed,
            other => PositionState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PositionState::Armed => "ARMED",
            PositionState::BuyPlaced => "BUY_PLACED",
            PositionState::BuyFilled => "BUY_FILLED",
            PositionState::Protected => "PROTECTED",
            PositionState::InTrade => "IN_TRADE",
            PositionState::Exiting => "EXITING",
            PositionState::SlHit => "SL_HIT",
            PositionState::TpHit => "TP_HIT",
            PositionState::Exited => "EXITED",
            PositionState::Closed => "CLOSED",
            PositionState::Unknown(s) => s.as_str(),
        }
    }

    /// Order placed or held: the states for which live PnL is meaningful.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PositionState::BuyPlaced
                | PositionState::BuyFilled
                | PositionState::Protected
                | PositionState::InTrade
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionState::SlHit
                | PositionState::TpHit
                | PositionState::Exited
                | PositionState::Closed
        )
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// Canonical lookup key: uppercase with every whitespace character removed.
/// Sources disagree on casing and spacing, so all symbol joins go through this.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

// ---------------------------------------------------------------------------
// Trade state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    pub slot_id: String,
    pub symbol: Option<String>,
    pub state: PositionState,
    pub entry_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub quantity: Option<i64>,
    pub realized_pnl: Option<f64>,
    /// Engine flag raised once the target has been touched (trailing mode).
    pub tp_hit: bool,
}

/// slot_id → SlotState, ordered so alert dispatch order is stable.
pub type TradeStateMap = BTreeMap<String, SlotState>;

// ---------------------------------------------------------------------------
// Option selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedInstrument {
    pub symbol: String,
    pub strike: Option<f64>,
    pub side: Side,
    /// Backend timestamp string (`%Y-%m-%d %H:%M:%S`), shown verbatim.
    pub selected_at: Option<String>,
    /// Price attached by the selection endpoint; display fallback only.
    pub ltp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub ce: Vec<SelectedInstrument>,
    pub pe: Vec<SelectedInstrument>,
}

impl Selection {
    pub fn side(&self, side: Side) -> &[SelectedInstrument] {
        match side {
            Side::CE => &self.ce,
            Side::PE => &self.pe,
        }
    }

    pub fn len(&self) -> usize {
        self.ce.len() + self.pe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Price snapshots
// ---------------------------------------------------------------------------

/// normalized symbol → last traded price.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSnapshot {
    prices: HashMap<String, f64>,
}

impl TickSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, price: f64) {
        self.prices.insert(normalize_symbol(symbol), price);
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(&normalize_symbol(symbol)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.prices.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for TickSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut snap = TickSnapshot::new();
        for (symbol, price) in iter {
            snap.insert(symbol.as_ref(), price);
        }
        snap
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub ltp: Option<f64>,
    pub prev_close: Option<f64>,
}

impl IndexQuote {
    pub fn change(&self) -> Option<f64> {
        Some(self.ltp? - self.prev_close?)
    }

    pub fn change_pct(&self) -> Option<f64> {
        let prev = self.prev_close?;
        if prev == 0.0 {
            return None;
        }
        Some(self.change()? / prev * 100.0)
    }
}

// ---------------------------------------------------------------------------
// Engine / broker status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineStatus {
    pub engine_running: bool,
    pub backend: String,
    pub trading_halted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerStatus {
    pub connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyConfigView {
    pub trade_on: bool,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: Option<i64>,
    pub pnl: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodayPositions {
    pub open: Vec<BrokerPosition>,
    pub closed: Vec<BrokerPosition>,
}

impl TodayPositions {
    pub fn realised(&self) -> f64 {
        self.closed.iter().map(|p| p.pnl.unwrap_or(0.0)).sum()
    }

    pub fn unrealised(&self) -> f64 {
        self.open.iter().map(|p| p.pnl.unwrap_or(0.0)).sum()
    }

    pub fn total(&self) -> f64 {
        self.realised() + self.unrealised()
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    Entered,
    SlHit,
    TpHit,
    ClosedProfit,
    ClosedLoss,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Entered => "entered",
            AlertKind::SlHit => "sl_hit",
            AlertKind::TpHit => "tp_hit",
            AlertKind::ClosedProfit => "closed_profit",
            AlertKind::ClosedLoss => "closed_loss",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AlertKind::Entered => "Position Entered",
            AlertKind::SlHit => "Stop Loss Hit",
            AlertKind::TpHit => "Target Hit",
            AlertKind::ClosedProfit => "Closed in Profit",
            AlertKind::ClosedLoss => "Closed at Loss",
        }
    }

    pub fn level(self) -> ToastLevel {
        match self {
            AlertKind::Entered => ToastLevel::Info,
            AlertKind::TpHit | AlertKind::ClosedProfit => ToastLevel::Success,
            AlertKind::SlHit => ToastLevel::Danger,
            AlertKind::ClosedLoss => ToastLevel::Warning,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entered" => Ok(AlertKind::Entered),
            "sl_hit" => Ok(AlertKind::SlHit),
            "tp_hit" => Ok(AlertKind::TpHit),
            "closed_profit" => Ok(AlertKind::ClosedProfit),
            "closed_loss" => Ok(AlertKind::ClosedLoss),
            _ => Err(anyhow::anyhow!("Unknown alert kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub slot_id: String,
    pub symbol: Option<String>,
    pub price: Option<f64>,
    pub pnl: Option<f64>,
    pub at: DateTime<Utc>,
}

impl AlertEvent {
    /// One-line human summary used for toasts and the log panel.
    pub fn message(&self) -> String {
        let symbol = self.symbol.as_deref().unwrap_or("—");
        let mut msg = format!("{} {}", self.slot_id, symbol);
        if let Some(price) = self.price {
            msg.push_str(&format!(" @ {price:.2}"));
        }
        if let Some(pnl) = self.pnl {
            msg.push_str(&format!(" P&L ₹{pnl:+.2}"));
        }
        msg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Danger,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub level: ToastLevel,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Monitor session (one run)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub backend_url: String,
    pub alerts_fired: u32,
}
