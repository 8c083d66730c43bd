/// reconcile.rs – Join option selection, slot state and tick prices into one
/// row per selected instrument.
///
/// The selection is the universe of rows; the trade-state map says which slot
/// (if any) holds each instrument; the tick snapshot supplies live prices.
use std::collections::HashMap;

use crate::models::{
    normalize_symbol, PositionState, SelectedInstrument, Selection, Side, SlotState,
    TickSnapshot, TradeSideMode, TradeStateMap,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    /// 1-based position within its side's selection list.
    pub index: usize,
    pub side: Side,
    pub symbol: String,
    pub strike: Option<f64>,
    pub selected_at: Option<String>,
    /// Slot currently bound to this instrument, `None` if only selected.
    pub slot_id: Option<String>,
    pub state: PositionState,
    pub entry_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub quantity: Option<i64>,
    pub tp_hit: bool,
    /// Live tick price, falling back to the selection's own price.
    pub ltp: Option<f64>,
    /// Live PnL; only from the tick feed, never from the fallback.
    pub pnl: Option<f64>,
}

impl ReconciledRow {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn key(&self) -> String {
        normalize_symbol(&self.symbol)
    }
}

/// `(tick - entry) * qty`, defined for an active slot with both prices
/// present. An unreported quantity counts as 0 (an order not yet filled).
/// The CE/PE sign is already embedded in how prices are recorded.
pub fn live_pnl(slot: &SlotState, tick: Option<f64>) -> Option<f64> {
    if !slot.state.is_active() {
        return None;
    }
    let entry = slot.entry_price?;
    let tick = tick?;
    let qty = slot.quantity.unwrap_or(0);
    Some((tick - entry) * qty as f64)
}

/// normalized symbol → bound slot.
fn slots_by_symbol(trade_state: &TradeStateMap) -> HashMap<String, &SlotState> {
    let mut map = HashMap::new();
    for slot in trade_state.values() {
        if let Some(sym) = slot.symbol.as_deref() {
            let key = normalize_symbol(sym);
            if key.is_empty() {
                continue;
            }
            // Prefer an active binding when two slots report the same symbol.
            let keep_existing = map
                .get(&key)
                .map(|existing: &&SlotState| existing.state.is_active())
                .unwrap_or(false);
            if !keep_existing {
                map.insert(key, slot);
            }
        }
    }
    map
}

fn build_row(
    index: usize,
    inst: &SelectedInstrument,
    slot: Option<&SlotState>,
    ticks: Option<&TickSnapshot>,
) -> ReconciledRow {
    let tick = ticks.and_then(|t| t.price(&inst.symbol));
    match slot {
        Some(slot) => ReconciledRow {
            index,
            side: inst.side,
            symbol: inst.symbol.clone(),
            strike: inst.strike,
            selected_at: inst.selected_at.clone(),
            slot_id: Some(slot.slot_id.clone()),
            state: slot.state.clone(),
            entry_price: slot.entry_price,
            stop_loss_price: slot.stop_loss_price,
            take_profit_price: slot.take_profit_price,
            quantity: slot.quantity,
            tp_hit: slot.tp_hit,
            ltp: tick.or(inst.ltp),
            pnl: live_pnl(slot, tick),
        },
        None => ReconciledRow {
            index,
            side: inst.side,
            symbol: inst.symbol.clone(),
            strike: inst.strike,
            selected_at: inst.selected_at.clone(),
            slot_id: None,
            state: PositionState::Armed,
            entry_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            quantity: None,
            tp_hit: false,
            ltp: tick.or(inst.ltp),
            pnl: None,
        },
    }
}

/// One row per selected instrument of the sides `mode` keeps, CE first.
pub fn reconcile(
    selection: &Selection,
    trade_state: Option<&TradeStateMap>,
    ticks: Option<&TickSnapshot>,
    mode: TradeSideMode,
) -> Vec<ReconciledRow> {
    let empty = TradeStateMap::new();
    let by_symbol = slots_by_symbol(trade_state.unwrap_or(&empty));

    let mut rows = Vec::with_capacity(selection.len());
    for side in [Side::CE, Side::PE] {
        if !mode.includes(side) {
            continue;
        }
        for (i, inst) in selection.side(side).iter().enumerate() {
            let slot = by_symbol.get(&normalize_symbol(&inst.symbol)).copied();
            rows.push(build_row(i + 1, inst, slot, ticks));
        }
    }
    rows
}

/// Number of slots currently holding or placing a position.
pub fn active_count(trade_state: Option<&TradeStateMap>) -> usize {
    trade_state
        .map(|ts| ts.values().filter(|s| s.state.is_active()).count())
        .unwrap_or(0)
}

pub fn in_trade(trade_state: Option<&TradeStateMap>) -> bool {
    active_count(trade_state) > 0
}

/// Latest important engine log line for each slot: one containing `SLOT=<id>`
/// and a `[SIGNAL]`, `[TP]`, `[SL]` or `[STATE]` tag.
pub fn slot_activity<'a>(logs: &'a [String], slots: &[String]) -> Vec<(String, Option<&'a str>)> {
    const TAGS: [&str; 4] = ["[SIGNAL]", "[TP]", "[SL]", "[STATE]"];
    slots
        .iter()
        .map(|slot| {
            let needle = format!("SLOT={slot}");
            let hit = logs
                .iter()
                .rev()
                .find(|line| line.contains(&needle) && TAGS.iter().any(|t| line.contains(t)))
                .map(String::as_str);
            (slot.clone(), hit)
        })
        .collect()
}
