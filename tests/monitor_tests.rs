/// Integration tests for the monitor pipeline: payload parsing, snapshot
/// store, reconciliation, transition alerts and rolling histories.
///
/// The binary crate has no lib target, so the modules are pulled in with
/// `#[path]` includes.
#[path = "../src/models.rs"]
mod models;

#[path = "../src/api.rs"]
mod api;

#[path = "../src/alerts.rs"]
mod alerts;

#[path = "../src/history.rs"]
mod history;

#[path = "../src/reconcile.rs"]
mod reconcile;

#[path = "../src/store.rs"]
mod store;

#[path = "../src/monitor.rs"]
mod monitor;

use chrono::Utc;
use serde_json::json;

use models::{AlertKind, PositionState, Side, TradeSideMode};
use monitor::Monitor;
use store::SourceUpdate;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn trade_state(v: serde_json::Value) -> SourceUpdate {
    SourceUpdate::TradeState(api::parse_trade_state(&v))
}

fn selection() -> SourceUpdate {
    SourceUpdate::Selection(api::parse_selection(&json!({
        "CE": [
            { "tradingsymbol": "NIFTY24JUN22500CE", "strike": 22500, "selected_at": "2024-06-20 09:20:00" },
            { "tradingsymbol": "NIFTY24JUN22600CE", "strike": 22600 }
        ],
        "PE": [
            { "tradingsymbol": "NIFTY24JUN22400PE", "strike": 22400, "ltp": 88.0 }
        ]
    })))
}

fn ticks(v: serde_json::Value) -> SourceUpdate {
    SourceUpdate::Ticks(api::parse_ltp_snapshot(&v))
}

fn monitor() -> Monitor {
    Monitor::new(30, 10)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[test]
fn entry_fires_once_and_reports_live_pnl() {
    let mut m = monitor();
    let now = Utc::now();
    assert!(m.apply(selection(), now).is_empty());
    assert!(m
        .apply(ticks(json!({ "NIFTY24JUN22500CE": 125.50 })), now)
        .is_empty());
    assert!(m
        .apply(trade_state(json!({ "CE_1": { "state": "ARMED" } })), now)
        .is_empty());

    let filled = json!({
        "CE_1": {
            "state": "BUY_FILLED",
            "symbol": "NIFTY24JUN22500CE",
            "buy_price": 124.0,
            "sl_price": 110.0,
            "tp_price": 150.0,
            "qty": 75
        }
    });
    let events = m.apply(trade_state(filled.clone()), now);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::Entered);
    assert_eq!(events[0].slot_id, "CE_1");
    assert_eq!(events[0].price, Some(124.0));

    let row = m
        .rows()
        .iter()
        .find(|r| r.slot_id.as_deref() == Some("CE_1"))
        .expect("bound row");
    assert_eq!(row.pnl, Some(112.5));
    assert_eq!(row.stop_loss_price, Some(110.0));
    assert!(m.in_trade());
    assert_eq!(m.active_count(), 1);

    // Same state again: no duplicate alert.
    assert!(m.apply(trade_state(filled), now).is_empty());
}

#[test]
fn stop_loss_fires_once_with_realized_pnl() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(
        trade_state(json!({
            "CE_1": { "state": "BUY_FILLED", "symbol": "NIFTY24JUN22500CE", "buy_price": 124.0, "qty": 75 }
        })),
        now,
    );
    let events = m.apply(
        trade_state(json!({
            "CE_1": { "state": "SL_HIT", "symbol": "NIFTY24JUN22500CE", "buy_price": 124.0,
                      "sl_price": 90.67, "qty": 75, "realized_pnl": -2500 }
        })),
        now,
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::SlHit);
    assert_eq!(events[0].pnl, Some(-2500.0));
    assert!(!m.in_trade());
}

#[test]
fn first_poll_only_seeds_memory() {
    let mut m = monitor();
    let events = m.apply(
        trade_state(json!({
            "CE_1": { "state": "IN_TRADE" },
            "PE_1": { "state": "CLOSED", "realized_pnl": 400 }
        })),
        Utc::now(),
    );
    assert!(events.is_empty());
}

#[test]
fn slot_first_seen_later_is_seeded_silently() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(trade_state(json!({ "CE_1": "ARMED" })), now);
    let events = m.apply(
        trade_state(json!({ "CE_1": "ARMED", "PE_2": "IN_TRADE" })),
        now,
    );
    assert!(events.is_empty());

    let events = m.apply(
        trade_state(json!({ "CE_1": "ARMED", "PE_2": { "state": "TP_HIT", "realized_pnl": 900 } })),
        now,
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::TpHit);
}

#[test]
fn slot_without_state_never_fakes_an_entry() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(trade_state(json!({ "CE_1": { "symbol": "NIFTY24JUN22500CE" } })), now);
    let events = m.apply(trade_state(json!({ "CE_1": { "state": "IN_TRADE" } })), now);
    assert!(events.is_empty());

    // Once a real state is known, transitions alert as usual.
    let events = m.apply(trade_state(json!({ "CE_1": { "state": "SL_HIT" } })), now);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::SlHit);
}

#[test]
fn close_is_split_by_realized_pnl_sign() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(
        trade_state(json!({ "CE_1": "IN_TRADE", "PE_1": "PROTECTED" })),
        now,
    );
    let events = m.apply(
        trade_state(json!({
            "CE_1": { "state": "EXITED", "realized_pnl": 1200.0 },
            "PE_1": { "state": "CLOSED", "realized_pnl": "-300" }
        })),
        now,
    );
    let kinds: Vec<AlertKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![AlertKind::ClosedProfit, AlertKind::ClosedLoss]);
}

#[test]
fn every_slot_transition_is_evaluated_in_one_poll() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(
        trade_state(json!({ "CE_1": "ARMED", "CE_2": "ARMED", "PE_1": "IN_TRADE" })),
        now,
    );
    let events = m.apply(
        trade_state(json!({ "CE_1": "BUY_PLACED", "CE_2": "BUY_PLACED", "PE_1": "SL_HIT" })),
        now,
    );
    assert_eq!(events.len(), 3);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[test]
fn mode_filter_drops_pe_rows() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(selection(), now);
    assert_eq!(m.rows().len(), 3);

    m.apply(SourceUpdate::TradeSideMode(TradeSideMode::Ce), now);
    assert!(m.rows().iter().all(|r| r.side == Side::CE));
    assert_eq!(m.rows().len(), 2);

    m.set_mode(TradeSideMode::Pe);
    assert_eq!(m.rows().len(), 1);
    assert_eq!(m.rows()[0].side, Side::PE);
}

#[test]
fn symbol_join_ignores_case_and_whitespace() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(
        SourceUpdate::Selection(api::parse_selection(&json!({
            "CE": [{ "tradingsymbol": "nifty 123 ce" }],
            "PE": []
        }))),
        now,
    );
    m.apply(ticks(json!({ "NIFTY123CE": 125.5 })), now);
    m.apply(
        trade_state(json!({
            "CE_1": { "state": "IN_TRADE", "symbol": "Nifty123CE", "buy_price": 124, "qty": "75" }
        })),
        now,
    );
    let row = &m.rows()[0];
    assert_eq!(row.slot_id.as_deref(), Some("CE_1"));
    assert_eq!(row.ltp, Some(125.5));
    assert_eq!(row.pnl, Some(112.5));
}

#[test]
fn unpriced_instrument_falls_back_to_selection_ltp() {
    let mut m = monitor();
    m.apply(selection(), Utc::now());
    let pe = m.rows().iter().find(|r| r.side == Side::PE).expect("pe row");
    assert_eq!(pe.ltp, Some(88.0));
    assert_eq!(pe.state, PositionState::Armed);
    assert_eq!(pe.pnl, None);
}

// ---------------------------------------------------------------------------
// Histories
// ---------------------------------------------------------------------------

#[test]
fn pnl_history_skips_repeated_values_across_polls() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(selection(), now);
    m.apply(
        trade_state(json!({
            "CE_1": { "state": "IN_TRADE", "symbol": "NIFTY24JUN22500CE", "buy_price": 124, "qty": 75 }
        })),
        now,
    );
    for price in [125.5, 125.5, 126.0, 126.0, 125.5] {
        m.apply(ticks(json!({ "NIFTY24JUN22500CE": price })), now);
    }
    let pnls: Vec<f64> = m
        .history
        .pnls("NIFTY24JUN22500CE")
        .expect("pnl history")
        .iter()
        .copied()
        .collect();
    assert_eq!(pnls, vec![112.5, 150.0, 112.5]);
    assert_eq!(
        m.history.prices("NIFTY24JUN22500CE").map(|b| b.len()),
        Some(5)
    );
}

#[test]
fn pnl_history_covers_the_side_hidden_by_mode() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(selection(), now);
    m.apply(SourceUpdate::TradeSideMode(TradeSideMode::Ce), now);
    m.apply(
        trade_state(json!({
            "PE_1": { "state": "IN_TRADE", "symbol": "NIFTY24JUN22400PE", "buy_price": 100, "qty": 75 }
        })),
        now,
    );
    for price in [101.0, 102.0, 103.0] {
        m.apply(ticks(json!({ "NIFTY24JUN22400PE": price })), now);
    }
    assert!(m.rows().iter().all(|r| r.side == Side::CE));
    assert_eq!(
        m.history.pnls("NIFTY24JUN22400PE").map(|b| b.len()),
        Some(3)
    );

    m.set_mode(TradeSideMode::Both);
    let pe = m.rows().iter().find(|r| r.side == Side::PE).expect("pe row");
    assert_eq!(pe.pnl, Some(225.0));
}

#[test]
fn unreported_quantity_still_prices_an_open_order() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(selection(), now);
    m.apply(ticks(json!({ "NIFTY24JUN22500CE": 125.5 })), now);
    m.apply(
        trade_state(json!({
            "CE_1": { "state": "BUY_PLACED", "symbol": "NIFTY24JUN22500CE", "buy_price": 124 }
        })),
        now,
    );
    let row = m
        .rows()
        .iter()
        .find(|r| r.slot_id.as_deref() == Some("CE_1"))
        .expect("bound row");
    assert_eq!(row.pnl, Some(0.0));
    assert_eq!(row.ltp, Some(125.5));
}

#[test]
fn live_total_sums_priced_rows_only() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(selection(), now);
    assert_eq!(m.live_pnl_total(), 0.0);
    m.apply(
        ticks(json!({ "NIFTY24JUN22500CE": 125.5, "NIFTY24JUN22400PE": 90.0 })),
        now,
    );
    m.apply(
        trade_state(json!({
            "CE_1": { "state": "IN_TRADE", "symbol": "NIFTY24JUN22500CE", "buy_price": 124, "qty": 75 },
            "PE_1": { "state": "IN_TRADE", "symbol": "NIFTY24JUN22400PE", "buy_price": 100, "qty": 50 },
            "CE_2": { "state": "EXITED", "symbol": "NIFTY24JUN22600CE", "buy_price": 80, "qty": 75 }
        })),
        now,
    );
    // 112.5 on CE_1, -500 on PE_1, nothing for the exited slot.
    assert_eq!(m.live_pnl_total(), -387.5);

    let ce = m
        .rows()
        .iter()
        .find(|r| r.slot_id.as_deref() == Some("CE_1"))
        .expect("bound row");
    assert_eq!(ce.selected_at.as_deref(), Some("2024-06-20 09:20:00"));
}

#[test]
fn price_history_never_exceeds_window() {
    let mut m = monitor();
    let now = Utc::now();
    for i in 0..45 {
        m.apply(ticks(json!({ "BANKNIFTY48000PE": 200.0 + i as f64 })), now);
    }
    let prices = m.history.prices("BANKNIFTY48000PE").expect("prices");
    assert_eq!(prices.len(), 30);
    assert_eq!(prices.back(), Some(&244.0));
}

#[test]
fn failed_source_keeps_last_good_snapshot() {
    let mut m = monitor();
    let now = Utc::now();
    m.apply(ticks(json!({ "A": 1.0 })), now);
    // A failing poll forwards nothing; unrelated sources keep flowing.
    m.apply(SourceUpdate::Logs(vec!["[STATE] SLOT=CE_1 ARMED".into()]), now);
    assert_eq!(m.store.ticks.as_ref().and_then(|t| t.price("a")), Some(1.0));
}
