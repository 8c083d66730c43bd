/// dashboard.rs – ratatui live terminal dashboard.
///
/// Layout:
///  ┌─ Header ──────────────────────────────────────────────────────────┐
///  │ Scalp Monitor │ Broker │ Engine │ Trading │ IN TRADE │ Mode │ ... │
///  ├─ Indices ─────────────────────────────────────────────────────────┤
///  │ NIFTY tile │ BANKNIFTY tile │ SENSEX tile                          │
///  ├─ Options ─────────────────────────┬─ Today's P&L ─────────────────┤
///  │ one row per selected instrument   ├─ Slot Activity ───────────────┤
///  │                                   ├─ Engine Logs ─────────────────┤
///  └───────────────────────────────────┴───────────────────────────────┘
/// Toasts are drawn over the top-right corner.
use chrono::{DateTime, Utc};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io::{self, Stdout};

use crate::alerts::ToastBoard;
use crate::config::DashboardConfig;
use crate::models::{PositionState, Side, ToastLevel};
use crate::monitor::Monitor;
use crate::reconcile::{self, ReconciledRow};
use crate::store::PollSource;

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key event handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashAction {
    Quit,
    CycleMode,
    ClearToasts,
}

/// Map a terminal event to an operator action.
pub fn handle_event(event: &Event) -> Option<DashAction> {
    let Event::Key(k) = event else {
        return None;
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    match k.code {
        KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(DashAction::Quit)
        }
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(DashAction::Quit),
        KeyCode::Char('m') | KeyCode::Char('M') => Some(DashAction::CycleMode),
        KeyCode::Char('c') => Some(DashAction::ClearToasts),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Borrowed read-only view of everything the dashboard draws.
pub struct DashboardView<'a> {
    pub monitor: &'a Monitor,
    pub toasts: &'a ToastBoard,
    pub config: &'a DashboardConfig,
    pub alerts_fired: u32,
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, view: &DashboardView<'_>) {
    let area = frame.size();

    // Outer layout: header | indices | body
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);

    render_header(frame, outer[0], view);
    render_indices(frame, outer[1], view);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(outer[2]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Length(view.config.slots.len() as u16 + 2),
            Constraint::Min(0),
        ])
        .split(body[1]);

    render_options(frame, body[0], view);
    render_pnl(frame, right[0], view);
    render_activity(frame, right[1], view);
    render_logs(frame, right[2], view);
    render_toasts(frame, area, view);
}

fn badge(label: &str, on: bool, on_color: Color, off_color: Color) -> Span<'static> {
    Span::styled(
        format!(" {label} "),
        Style::default()
            .fg(Color::Black)
            .bg(if on { on_color } else { off_color })
            .add_modifier(Modifier::BOLD),
    )
}

fn pnl_color(v: f64) -> Color {
    if v > 0.0 {
        Color::Green
    } else if v < 0.0 {
        Color::Red
    } else {
        Color::Gray
    }
}

/// Time of day from a backend `%Y-%m-%d %H:%M:%S` stamp.
fn selected_time(stamp: Option<&str>) -> String {
    match stamp.map(str::trim) {
        Some(s) if !s.is_empty() => s.rsplit(' ').next().unwrap_or(s).to_string(),
        _ => "—".into(),
    }
}

fn fmt_price(v: Option<f64>) -> String {
    v.map(|p| format!("{p:.2}")).unwrap_or_else(|| "—".into())
}

/// Text sparkline over the retained samples.
pub fn sparkline(values: &VecDeque<f64>) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    if values.is_empty() {
        return String::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    values
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                BARS[3]
            } else {
                let idx = ((v - lo) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let store = &view.monitor.store;
    let broker_up = store.broker.as_ref().map(|b| b.connected).unwrap_or(false);
    let engine_up = store
        .status
        .as_ref()
        .map(|s| s.engine_running)
        .unwrap_or(false);
    let trading = store.trading_enabled();
    let active = view.monitor.active_count();

    let secs = (view.now - view.monitor.started_at).num_seconds().max(0);
    let uptime = format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60);

    let mut spans = vec![
        Span::styled(
            "  Scalp Monitor  │ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        badge(
            if broker_up { "BROKER ●" } else { "BROKER ○" },
            broker_up,
            Color::Green,
            Color::Red,
        ),
        Span::raw(" "),
        badge(
            if engine_up { "ENGINE RUNNING" } else { "ENGINE STOPPED" },
            engine_up,
            Color::Green,
            Color::Red,
        ),
        Span::raw(" "),
        badge(
            if trading { "TRADING ON" } else { "TRADING OFF" },
            trading,
            Color::Green,
            Color::DarkGray,
        ),
        Span::raw(" "),
        if active > 0 {
            badge(&format!("IN TRADE ({active})"), true, Color::Yellow, Color::Gray)
        } else {
            badge("ARMED", false, Color::Yellow, Color::Gray)
        },
        Span::raw(" "),
        badge(
            &format!("MODE {}", store.trade_side_mode()),
            true,
            Color::Cyan,
            Color::Gray,
        ),
    ];
    if store.trading_halted() {
        spans.push(Span::raw(" "));
        spans.push(badge("HALTED", true, Color::Red, Color::Red));
    }
    spans.push(Span::raw(format!(
        "  │ Up: {uptime}  │ Alerts: {}",
        view.alerts_fired
    )));
    spans.push(Span::styled(
        "  [m] mode [c] clear [q] quit",
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Scalp Monitor "),
    );
    frame.render_widget(header, area);
}

// ---------------------------------------------------------------------------
// Index tiles
// ---------------------------------------------------------------------------

fn render_indices(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let names = &view.config.indices;
    if names.is_empty() {
        return;
    }
    let tiles = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            names
                .iter()
                .map(|_| Constraint::Ratio(1, names.len() as u32))
                .collect::<Vec<_>>(),
        )
        .split(area);

    for (name, tile) in names.iter().zip(tiles.iter()) {
        let quote = view
            .monitor
            .store
            .indices
            .as_ref()
            .and_then(|m| m.get(name.as_str()));
        let line = match quote {
            Some(q) => {
                let change = q.change();
                let color = change.map(pnl_color).unwrap_or(Color::Gray);
                Line::from(vec![
                    Span::styled(
                        fmt_price(q.ltp),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        match (change, q.change_pct()) {
                            (Some(c), Some(p)) => format!("{c:+.2} ({p:+.2}%)"),
                            (Some(c), None) => format!("{c:+.2}"),
                            _ => "—".into(),
                        },
                        Style::default().fg(color),
                    ),
                ])
            }
            None => Line::from(Span::styled("—", Style::default().fg(Color::DarkGray))),
        };
        let p = Paragraph::new(line)
            .block(Block::default().borders(Borders::ALL).title(format!(" {name} ")));
        frame.render_widget(p, *tile);
    }
}

// ---------------------------------------------------------------------------
// Options table
// ---------------------------------------------------------------------------

fn state_color(state: &PositionState) -> Color {
    match state {
        s if s.is_active() => Color::Yellow,
        PositionState::TpHit => Color::Green,
        PositionState::SlHit => Color::Red,
        PositionState::Exited | PositionState::Closed | PositionState::Exiting => Color::Gray,
        _ => Color::Cyan,
    }
}

fn option_row<'a>(row: &ReconciledRow, view: &DashboardView<'_>) -> Row<'a> {
    let history = &view.monitor.history;
    let spark = history
        .prices(&row.symbol)
        .map(sparkline)
        .unwrap_or_default();
    let pnl_cell = match row.pnl {
        Some(pnl) => {
            let arrow = history
                .pnl_trend(&row.symbol)
                .map(|t| t.arrow())
                .unwrap_or(" ");
            Cell::from(format!("{pnl:+.2} {arrow}"))
                .style(Style::default().fg(pnl_color(pnl)).add_modifier(Modifier::BOLD))
        }
        None => Cell::from("—"),
    };
    let state_label = if row.tp_hit && row.is_active() {
        format!("{} (TP)", row.state)
    } else {
        row.state.to_string()
    };

    Row::new(vec![
        Cell::from(format!("{}{}", row.side, row.index)).style(Style::default().fg(
            match row.side {
                Side::CE => Color::Green,
                Side::PE => Color::Red,
            },
        )),
        Cell::from(row.symbol.clone()),
        Cell::from(
            row.strike
                .map(|s| format!("{s:.0}"))
                .unwrap_or_else(|| "—".into()),
        ),
        Cell::from(selected_time(row.selected_at.as_deref())),
        Cell::from(row.slot_id.clone().unwrap_or_else(|| "—".into())),
        Cell::from(state_label).style(Style::default().fg(state_color(&row.state))),
        Cell::from(fmt_price(row.entry_price)),
        Cell::from(fmt_price(row.stop_loss_price)).style(Style::default().fg(Color::Red)),
        Cell::from(fmt_price(row.take_profit_price)).style(Style::default().fg(Color::Green)),
        Cell::from(fmt_price(row.ltp)).style(Style::default().fg(
            history
                .price_change(&row.symbol)
                .map(pnl_color)
                .unwrap_or(Color::White),
        )),
        Cell::from(spark).style(Style::default().fg(Color::Cyan)),
        pnl_cell,
    ])
}

fn render_options(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let header_cells = [
        "#", "Symbol", "Strike", "Since", "Slot", "State", "Entry", "SL", "TP", "LTP", "Trend", "P&L",
    ]
    .iter()
    .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = view
        .monitor
        .rows()
        .iter()
        .map(|r| option_row(r, view))
        .collect();

    let age = view
        .monitor
        .store
        .age_seconds(PollSource::Ticks, view.now)
        .map(|s| format!("ticks {s}s ago"))
        .unwrap_or_else(|| "no ticks".into());

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(16),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(format!(
        " Options ({}) │ {} ",
        view.monitor.rows().len(),
        age
    )));

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Today's P&L
// ---------------------------------------------------------------------------

fn render_pnl(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let live = view.monitor.live_pnl_total();
    let live_line = Line::from(vec![
        Span::raw("Live slots: "),
        Span::styled(format!("₹{live:+.2}"), Style::default().fg(pnl_color(live))),
    ]);
    let mut lines = match view.monitor.store.positions.as_ref() {
        Some(p) => {
            let (realised, unrealised, total) = (p.realised(), p.unrealised(), p.total());
            vec![
                Line::from(vec![
                    Span::raw("Realised:   "),
                    Span::styled(format!("₹{realised:+.2}"), Style::default().fg(pnl_color(realised))),
                ]),
                Line::from(vec![
                    Span::raw("Unrealised: "),
                    Span::styled(
                        format!("₹{unrealised:+.2}"),
                        Style::default().fg(pnl_color(unrealised)),
                    ),
                ]),
                Line::from(vec![
                    Span::raw("Total:      "),
                    Span::styled(
                        format!("₹{total:+.2}"),
                        Style::default()
                            .fg(pnl_color(total))
                            .add_modifier(Modifier::BOLD),
                    ),
                ]),
            ]
        }
        None => vec![Line::from(Span::styled(
            "waiting for positions…",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    lines.push(live_line);
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Today's P&L "),
    );
    frame.render_widget(p, area);
}

// ---------------------------------------------------------------------------
// Slot activity
// ---------------------------------------------------------------------------

fn render_activity(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let logs = view.monitor.store.logs.as_deref().unwrap_or(&[]);
    let items: Vec<ListItem> = reconcile::slot_activity(logs, &view.config.slots)
        .into_iter()
        .map(|(slot, line)| {
            let text = line.unwrap_or("—");
            let color = if text.contains("[SL]") {
                Color::Red
            } else if text.contains("[TP]") {
                Color::Green
            } else if text.contains("[SIGNAL]") {
                Color::Yellow
            } else {
                Color::Gray
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{slot:<5} "),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(text.to_string(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Slot Activity "),
    );
    frame.render_widget(list, area);
}

// ---------------------------------------------------------------------------
// Logs panel
// ---------------------------------------------------------------------------

fn render_logs(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let logs = view.monitor.store.logs.as_deref().unwrap_or(&[]);
    let items: Vec<ListItem> = logs
        .iter()
        .rev()
        .take(area.height as usize)
        .map(|line| {
            let color = if line.contains("ERROR") || line.contains("[SL]") {
                Color::Red
            } else if line.contains("WARN") {
                Color::Yellow
            } else if line.contains("[TP]") || line.contains("[SIGNAL]") {
                Color::Green
            } else {
                Color::Gray
            };
            ListItem::new(Line::from(Span::styled(
                line.clone(),
                Style::default().fg(color),
            )))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Engine Logs "))
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

// ---------------------------------------------------------------------------
// Toasts
// ---------------------------------------------------------------------------

fn render_toasts(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let width = 46.min(area.width);
    let mut y = area.y + 1;
    for toast in view.toasts.active() {
        if y + 4 > area.y + area.height {
            break;
        }
        let rect = Rect::new(area.x + area.width - width, y, width, 4);
        let color = match toast.level {
            ToastLevel::Success => Color::Green,
            ToastLevel::Danger => Color::Red,
            ToastLevel::Warning => Color::Yellow,
            ToastLevel::Info => Color::Cyan,
        };
        let p = Paragraph::new(Line::from(toast.message.clone())).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(Span::styled(
                    format!(" {} ", toast.title),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )),
        );
        frame.render_widget(Clear, rect);
        frame.render_widget(p, rect);
        y += 4;
    }
}
