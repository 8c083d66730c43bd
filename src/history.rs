/// history.rs – Bounded rolling price and PnL samples per symbol, for
/// sparklines and trend arrows.
use std::collections::{HashMap, VecDeque};

use crate::models::{normalize_symbol, TickSnapshot, TradeStateMap};
use crate::reconcile::live_pnl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Up => "↗",
            Trend::Down => "↘",
            Trend::Flat => "→",
        }
    }
}

fn push_bounded(buf: &mut VecDeque<f64>, value: f64, cap: usize) {
    buf.push_back(value);
    while buf.len() > cap {
        buf.pop_front();
    }
}

#[derive(Debug, Clone)]
pub struct SeriesTracker {
    price_window: usize,
    pnl_window: usize,
    prices: HashMap<String, VecDeque<f64>>,
    pnls: HashMap<String, VecDeque<f64>>,
}

impl SeriesTracker {
    pub fn new(price_window: usize, pnl_window: usize) -> Self {
        Self {
            price_window: price_window.max(1),
            pnl_window: pnl_window.max(1),
            prices: HashMap::new(),
            pnls: HashMap::new(),
        }
    }

    /// Append every price of a fresh tick snapshot.
    pub fn record_prices(&mut self, ticks: &TickSnapshot) {
        for (symbol, price) in ticks.iter() {
            if !price.is_finite() {
                continue;
            }
            let buf = self.prices.entry(symbol.to_string()).or_default();
            push_bounded(buf, price, self.price_window);
        }
    }

    /// Append live PnL for every active slot, whatever side the dashboard
    /// currently shows, skipping values equal to the last recorded sample.
    pub fn record_pnl(&mut self, trade_state: &TradeStateMap, ticks: Option<&TickSnapshot>) {
        for slot in trade_state.values() {
            let Some(key) = slot.symbol.as_deref().map(normalize_symbol) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            let Some(pnl) = live_pnl(slot, ticks.and_then(|t| t.price(&key))) else {
                continue;
            };
            let buf = self.pnls.entry(key).or_default();
            if buf.back() == Some(&pnl) {
                continue;
            }
            push_bounded(buf, pnl, self.pnl_window);
        }
    }

    pub fn prices(&self, symbol: &str) -> Option<&VecDeque<f64>> {
        self.prices.get(&normalize_symbol(symbol))
    }

    pub fn pnls(&self, symbol: &str) -> Option<&VecDeque<f64>> {
        self.pnls.get(&normalize_symbol(symbol))
    }

    /// Direction of the recorded PnL, first sample against last.
    pub fn pnl_trend(&self, symbol: &str) -> Option<Trend> {
        let buf = self.pnls(symbol)?;
        if buf.len() < 2 {
            return None;
        }
        let (first, last) = (*buf.front()?, *buf.back()?);
        Some(if last > first {
            Trend::Up
        } else if last < first {
            Trend::Down
        } else {
            Trend::Flat
        })
    }

    /// Change of the latest price against the oldest retained one.
    pub fn price_change(&self, symbol: &str) -> Option<f64> {
        let buf = self.prices(symbol)?;
        if buf.len() < 2 {
            return None;
        }
        Some(buf.back()? - buf.front()?)
    }
}
