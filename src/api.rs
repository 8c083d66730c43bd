/// api.rs – Async client for the scalping engine's HTTP/JSON API.
///
/// Every read endpoint is idempotent and polled on a fixed cadence. Payloads
/// are parsed leniently: a field that is missing or not the expected type is
/// treated as absent rather than defaulted, so the reconciler can tell "no
/// data" apart from zero.
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{
    BrokerPosition, BrokerStatus, EngineStatus, IndexQuote, PositionState, SelectedInstrument,
    Selection, Side, SlotState, StrategyConfigView, TickSnapshot, TodayPositions,
    TradeSideMode, TradeStateMap,
};

// ---------------------------------------------------------------------------
// BackendClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BackendClient {
    pub base_url: String,
    http: Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GET {path} returned {status}: {}", body.trim());
        }
        resp.json::<Value>()
            .await
            .with_context(|| format!("parsing {path} response"))
    }

    // ------------------------------------------------------------------
    // Fast tier
    // ------------------------------------------------------------------

    pub async fn get_status(&self) -> Result<EngineStatus> {
        let v = self.get_json("/status").await?;
        serde_json::from_value(v).context("decoding engine status")
    }

    pub async fn get_trade_state(&self) -> Result<TradeStateMap> {
        let v = self.get_json("/trade/state").await?;
        Ok(parse_trade_state(&v))
    }

    pub async fn get_selection(&self) -> Result<Selection> {
        let v = self.get_json("/selection/current").await?;
        Ok(parse_selection(&v))
    }

    // ------------------------------------------------------------------
    // Ultra-fast tier
    // ------------------------------------------------------------------

    pub async fn get_ltp_snapshot(&self) -> Result<TickSnapshot> {
        let v = self.get_json("/ltp_snapshot").await?;
        Ok(parse_ltp_snapshot(&v))
    }

    pub async fn get_market_indices(&self) -> Result<HashMap<String, IndexQuote>> {
        let v = self.get_json("/market_indices").await?;
        Ok(parse_indices(&v))
    }

    // ------------------------------------------------------------------
    // Slow tier
    // ------------------------------------------------------------------

    pub async fn get_strategy_config(&self) -> Result<StrategyConfigView> {
        let v = self.get_json("/config/strategy").await?;
        Ok(StrategyConfigView {
            trade_on: v["trade_on"].as_bool().unwrap_or(false),
            raw: v,
        })
    }

    pub async fn get_today_positions(&self) -> Result<TodayPositions> {
        let v = self.get_json("/positions/today").await?;
        Ok(parse_positions(&v))
    }

    pub async fn get_logs(&self) -> Result<Vec<String>> {
        let v = self.get_json("/logs").await?;
        Ok(parse_logs(&v))
    }

    pub async fn get_trade_side_mode(&self) -> Result<TradeSideMode> {
        let v = self.get_json("/api/trade_side_mode").await?;
        Ok(v["mode"]
            .as_str()
            .and_then(|m| m.parse().ok())
            .unwrap_or_default())
    }

    pub async fn get_broker_status(&self) -> Result<BrokerStatus> {
        let v = self.get_json("/zerodha/status").await?;
        serde_json::from_value(v).context("decoding broker status")
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub async fn set_trade_side_mode(&self, mode: TradeSideMode) -> Result<()> {
        let url = format!("{}/api/trade_side_mode", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "mode": mode.as_str() }))
            .send()
            .await
            .context("POST /api/trade_side_mode")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("setting trade side mode returned {status}: {}", body.trim());
        }
        info!("Trade side mode set to {mode}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Accept JSON numbers and numeric strings; anything else is absent.
pub fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|x| x.is_finite())
}

fn value_as_i64(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_f64().filter(|x| x.fract() == 0.0).map(|x| x as i64))
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

fn first_f64(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| item.get(*k).and_then(value_as_f64))
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(|v| v.as_str()))
        .filter(|s| !s.trim().is_empty())
}

/// Normalize one slot payload. Older engines report a slot as a bare state
/// string; newer ones send an object. Both collapse into `SlotState` here so
/// nothing downstream has to branch on shape.
pub fn parse_slot(slot_id: &str, value: &Value) -> Option<SlotState> {
    match value {
        Value::String(label) => Some(SlotState {
            slot_id: slot_id.to_string(),
            state: PositionState::from_label(label),
            ..SlotState::default()
        }),
        Value::Object(_) => Some(SlotState {
            slot_id: slot_id.to_string(),
            symbol: first_str(value, &["symbol", "tradingsymbol"]).map(str::to_string),
            // No state, no slot: defaulting would fake an ARMED transition.
            state: first_str(value, &["state"]).map(PositionState::from_label)?,
            entry_price: first_f64(value, &["buy_price", "entry_price"]),
            stop_loss_price: first_f64(value, &["sl_price", "stop_loss_price"]),
            take_profit_price: first_f64(value, &["tp_price", "take_profit_price"]),
            quantity: ["qty", "quantity"]
                .iter()
                .find_map(|k| value.get(*k).and_then(value_as_i64)),
            realized_pnl: first_f64(value, &["realized_pnl", "pnl"]),
            tp_hit: value["tp_hit"].as_bool().unwrap_or(false),
        }),
        _ => None,
    }
}

pub fn parse_trade_state(v: &Value) -> TradeStateMap {
    let Some(obj) = v.as_object() else {
        return TradeStateMap::new();
    };
    obj.iter()
        .filter_map(|(slot_id, value)| {
            let slot = parse_slot(slot_id, value);
            if slot.is_none() {
                debug!("Ignoring malformed slot payload for {slot_id}");
            }
            slot.map(|s| (slot_id.clone(), s))
        })
        .collect()
}

fn parse_instruments(v: &Value, side: Side) -> Vec<SelectedInstrument> {
    v.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let symbol = first_str(item, &["tradingsymbol", "symbol"])?;
                    Some(SelectedInstrument {
                        symbol: symbol.to_string(),
                        strike: first_f64(item, &["strike"]),
                        side,
                        selected_at: first_str(item, &["selected_at"]).map(str::to_string),
                        ltp: first_f64(item, &["ltp"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_selection(v: &Value) -> Selection {
    Selection {
        ce: parse_instruments(&v["CE"], Side::CE),
        pe: parse_instruments(&v["PE"], Side::PE),
    }
}

pub fn parse_ltp_snapshot(v: &Value) -> TickSnapshot {
    let Some(obj) = v.as_object() else {
        return TickSnapshot::new();
    };
    obj.iter()
        .filter_map(|(symbol, price)| value_as_f64(price).map(|p| (symbol.as_str(), p)))
        .collect()
}

pub fn parse_indices(v: &Value) -> HashMap<String, IndexQuote> {
    let Some(obj) = v.as_object() else {
        return HashMap::new();
    };
    obj.iter()
        .filter(|(_, q)| q.is_object())
        .map(|(name, q)| {
            (
                name.to_uppercase(),
                IndexQuote {
                    ltp: first_f64(q, &["ltp"]),
                    prev_close: first_f64(q, &["prev_close", "close"]),
                },
            )
        })
        .collect()
}

fn parse_broker_positions(v: &Value) -> Vec<BrokerPosition> {
    v.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|p| {
                    Some(BrokerPosition {
                        symbol: first_str(p, &["tradingsymbol", "symbol"])?.to_string(),
                        quantity: ["quantity", "day_buy_quantity", "qty"]
                            .iter()
                            .find_map(|k| p.get(*k).and_then(value_as_i64)),
                        pnl: first_f64(p, &["pnl"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_positions(v: &Value) -> TodayPositions {
    TodayPositions {
        open: parse_broker_positions(&v["open"]),
        closed: parse_broker_positions(&v["closed"]),
    }
}

/// `/logs` answers either a bare array or `{ "logs": [...] }`.
pub fn parse_logs(v: &Value) -> Vec<String> {
    let items = match v {
        Value::Array(a) => a.as_slice(),
        Value::Object(o) => o
            .get("logs")
            .and_then(|l| l.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|l| l.as_str().map(str::to_string))
        .collect()
}
