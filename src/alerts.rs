/// alerts.rs – Trade-state transition detection and alert fan-out.
///
/// The detector diffs each trade-state poll against the previous one it saw
/// and emits at most one event per observed slot transition. The dispatcher
/// hands every event to its sinks (bell, toast board, journal).
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use tracing::{info, warn};

use crate::models::{AlertEvent, AlertKind, PositionState, SlotState, Toast, TradeStateMap};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Semantic meaning of `prev → cur` for one slot, `None` when the change
/// carries no alert (including no change at all).
pub fn classify(prev: &PositionState, cur: &SlotState) -> Option<AlertKind> {
    if *prev == cur.state {
        return None;
    }
    match (prev, &cur.state) {
        (PositionState::Armed, s) if s.is_active() => Some(AlertKind::Entered),
        (p, PositionState::SlHit) if p.is_active() => Some(AlertKind::SlHit),
        (p, PositionState::TpHit) if p.is_active() => Some(AlertKind::TpHit),
        (p, PositionState::Exited | PositionState::Closed) if p.is_active() => {
            match cur.realized_pnl {
                Some(pnl) if pnl > 0.0 => Some(AlertKind::ClosedProfit),
                _ => Some(AlertKind::ClosedLoss),
            }
        }
        _ => None,
    }
}

fn event_for(kind: AlertKind, slot: &SlotState, at: DateTime<Utc>) -> AlertEvent {
    let price = match kind {
        AlertKind::Entered => slot.entry_price,
        AlertKind::SlHit => slot.stop_loss_price,
        AlertKind::TpHit => slot.take_profit_price,
        AlertKind::ClosedProfit | AlertKind::ClosedLoss => None,
    };
    AlertEvent {
        kind,
        slot_id: slot.slot_id.clone(),
        symbol: slot.symbol.clone(),
        price,
        pnl: slot.realized_pnl,
        at,
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Remembers the last observed state of every slot for one comparison cycle.
#[derive(Debug, Default)]
pub struct TransitionDetector {
    previous: Option<HashMap<String, PositionState>>,
}

impl TransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against the previous poll and remember it. The first
    /// call only seeds memory; a slot seen for the first time is seeded too.
    pub fn observe(&mut self, current: &TradeStateMap, at: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        if let Some(previous) = &self.previous {
            for (slot_id, slot) in current {
                let Some(prev) = previous.get(slot_id) else {
                    continue;
                };
                if *prev == slot.state {
                    continue;
                }
                match classify(prev, slot) {
                    Some(kind) => {
                        info!("[{slot_id}] {prev} → {} ({kind})", slot.state);
                        events.push(event_for(kind, slot, at));
                    }
                    None => info!("[{slot_id}] {prev} → {}", slot.state),
                }
            }
        }
        self.previous = Some(
            current
                .iter()
                .map(|(id, s)| (id.clone(), s.state.clone()))
                .collect(),
        );
        events
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

pub trait AlertSink: Send {
    fn name(&self) -> &'static str;
    fn deliver(&mut self, event: &AlertEvent) -> Result<()>;
}

/// Audible cue: terminal bell, more rings for worse news.
pub struct BellSink<W: Write + Send> {
    out: W,
}

impl BellSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> BellSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn rings(kind: AlertKind) -> usize {
        match kind {
            AlertKind::Entered => 1,
            AlertKind::TpHit | AlertKind::ClosedProfit => 2,
            AlertKind::SlHit | AlertKind::ClosedLoss => 3,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> AlertSink for BellSink<W> {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn deliver(&mut self, event: &AlertEvent) -> Result<()> {
        let bells = "\x07".repeat(Self::rings(event.kind));
        self.out.write_all(bells.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Longest a toast may stay on screen.
pub const MAX_TOAST_SECONDS: u64 = 3_600;

/// Transient on-screen notifications.
#[derive(Debug)]
pub struct ToastBoard {
    ttl: Duration,
    max: usize,
    toasts: VecDeque<Toast>,
}

impl ToastBoard {
    /// `ttl_seconds` is clamped to [`MAX_TOAST_SECONDS`].
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds.min(MAX_TOAST_SECONDS) as i64),
            max: 5,
            toasts: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: &AlertEvent) {
        self.toasts.push_back(Toast {
            title: event.kind.title().to_string(),
            message: event.message(),
            level: event.kind.level(),
            expires_at: event.at + self.ttl,
        });
        while self.toasts.len() > self.max {
            self.toasts.pop_front();
        }
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.toasts.retain(|t| t.expires_at > now);
    }

    pub fn clear(&mut self) {
        self.toasts.clear();
    }

    pub fn active(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct AlertDispatcher {
    toasts: ToastBoard,
    sinks: Vec<Box<dyn AlertSink>>,
    fired: u32,
}

impl AlertDispatcher {
    pub fn new(toasts: ToastBoard) -> Self {
        Self {
            toasts,
            sinks: Vec::new(),
            fired: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Deliver each event once to the toast board and every sink. A failing
    /// sink is logged and skipped.
    pub fn dispatch(&mut self, events: &[AlertEvent]) {
        for event in events {
            self.toasts.push(event);
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.deliver(event) {
                    warn!("Alert sink {} failed: {e:#}", sink.name());
                }
            }
            self.fired += 1;
        }
    }

    pub fn toasts(&self) -> &ToastBoard {
        &self.toasts
    }

    pub fn toasts_mut(&mut self) -> &mut ToastBoard {
        &mut self.toasts
    }

    pub fn fired(&self) -> u32 {
        self.fired
    }
}
