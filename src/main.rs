/// main.rs – Entry point for the scalp monitor.
///
/// Starts one poll loop per backend source, then runs the single event loop
/// that applies poll results, fires alerts, redraws the dashboard and handles
/// keys. All monitor state is owned by that loop.
mod alerts;
mod api;
mod config;
mod dashboard;
mod database;
mod history;
mod models;
mod monitor;
mod poller;
mod reconcile;
mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use crossterm::event::EventStream;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use alerts::{AlertDispatcher, BellSink, ToastBoard};
use api::BackendClient;
use config::Settings;
use dashboard::{DashAction, DashboardView};
use database::{Database, JournalSink};
use models::MonitorSession;
use monitor::Monitor;
use poller::{start_polling, Polled, PollerGroup};
use store::{PollSource, SourceUpdate};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "scalp-monitor",
    about = "Live position monitor and alerting dashboard for an options scalping engine",
    version
)]
struct Cli {
    /// Disable the interactive dashboard and print logs to stdout instead.
    #[arg(long, default_value_t = false)]
    no_dashboard: bool,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Override backend.base_url.
    #[arg(long)]
    backend_url: Option<String>,

    /// Do not ring the terminal bell on alerts.
    #[arg(long, default_value_t = false)]
    no_bell: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load settings (YAML + env override), then CLI overrides
    let mut settings = Settings::load(&cli.config)?;
    if let Some(url) = cli.backend_url.clone() {
        settings.backend.base_url = url;
        settings.validate()?;
    }
    if cli.no_bell {
        settings.alerts.bell = false;
    }

    init_logging(&settings, cli.no_dashboard)?;

    info!("Backend: {}", settings.backend.base_url);

    // Open alert journal
    let db = Arc::new(Database::open(&settings.monitor.journal_path)?);
    info!("Alert journal opened: {}", settings.monitor.journal_path);

    let session = MonitorSession {
        session_id: Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        ended_at: None,
        backend_url: settings.backend.base_url.clone(),
        alerts_fired: 0,
    };
    db.upsert_session(&session)?;

    let client = BackendClient::new(
        &settings.backend.base_url,
        Duration::from_secs_f64(settings.backend.request_timeout_seconds),
    )?;

    // Alert fan-out
    let mut dispatcher = AlertDispatcher::new(ToastBoard::new(settings.alerts.toast_seconds))
        .with_sink(Box::new(JournalSink::new(
            Arc::clone(&db),
            session.session_id.clone(),
        )));
    if settings.alerts.bell {
        dispatcher = dispatcher.with_sink(Box::new(BellSink::stdout()));
    }

    // Poll loops
    let (tx, mut rx) = mpsc::channel::<Polled<SourceUpdate>>(256);
    let pollers = start_pollers(&settings, &client, &tx);
    drop(tx);
    info!("Started {} poll loop(s)", pollers.len());

    let mut monitor = Monitor::new(settings.history.price_window, settings.history.pnl_window);

    // Dashboard setup (unless --no-dashboard)
    let mut terminal = if !cli.no_dashboard {
        Some(dashboard::setup_terminal()?)
    } else {
        None
    };

    let refresh_ms = (settings.dashboard.refresh_rate * 1000.0) as u64;
    let mut dash_ticker = tokio::time::interval(Duration::from_millis(refresh_ms.max(50)));

    let mut event_stream = EventStream::new();

    info!("Monitor started.  Press 'q' to quit.");

    // -----------------------------------------------------------------------
    // Main event loop
    // -----------------------------------------------------------------------
    loop {
        if let Some(ref mut term) = terminal {
            let view = DashboardView {
                monitor: &monitor,
                toasts: dispatcher.toasts(),
                config: &settings.dashboard,
                alerts_fired: dispatcher.fired(),
                now: Utc::now(),
            };
            term.draw(|f| dashboard::render(f, &view))?;
        }

        tokio::select! {
            // ── Dashboard keyboard events ──────────────────────────────────
            Some(Ok(event)) = event_stream.next(), if terminal.is_some() => {
                match dashboard::handle_event(&event) {
                    Some(DashAction::Quit) => break,
                    Some(DashAction::CycleMode) => {
                        let mode = monitor.store.trade_side_mode().next();
                        monitor.set_mode(mode);
                        info!("Trade side mode → {mode}");
                        let client = client.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client.set_trade_side_mode(mode).await {
                                warn!("Failed to set trade side mode: {e:#}");
                            }
                        });
                    }
                    Some(DashAction::ClearToasts) => dispatcher.toasts_mut().clear(),
                    None => {}
                }
            }

            // ── Ctrl-C without a dashboard ─────────────────────────────────
            _ = tokio::signal::ctrl_c(), if terminal.is_none() => {
                info!("Interrupted");
                break;
            }

            // ── Dashboard refresh tick ─────────────────────────────────────
            _ = dash_ticker.tick() => {
                dispatcher.toasts_mut().prune(Utc::now());
            }

            // ── Poll result ────────────────────────────────────────────────
            polled = rx.recv() => {
                let Some(polled) = polled else {
                    warn!("All poll loops stopped");
                    break;
                };
                let source = polled.source;
                let Some(update) = polled.into_live() else {
                    debug!("Dropping {source} result from a cancelled loop");
                    continue;
                };
                let events = monitor.apply(update, Utc::now());
                for event in &events {
                    info!("ALERT {}: {}", event.kind.title(), event.message());
                }
                dispatcher.dispatch(&events);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Graceful shutdown
    // -----------------------------------------------------------------------
    pollers.cancel_all();

    if let Some(ref mut term) = terminal {
        dashboard::teardown_terminal(term)?;
    }

    let final_session = MonitorSession {
        ended_at: Some(Utc::now()),
        alerts_fired: dispatcher.fired(),
        ..session
    };
    db.upsert_session(&final_session)?;

    info!(
        "Session {} ended – alerts fired: {} – closed P&L in journal: {:+.2}",
        final_session.session_id,
        final_session.alerts_fired,
        db.session_closed_pnl(&final_session.session_id)
            .unwrap_or(0.0),
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// RUST_LOG wins over the configured level. While the dashboard owns the
/// terminal, logs go to the configured file instead of stdout.
fn init_logging(settings: &Settings, no_dashboard: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.monitor.log_level.to_lowercase()));

    if no_dashboard {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.monitor.log_file)
            .with_context(|| format!("opening log file {}", settings.monitor.log_file))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Poll loops
// ---------------------------------------------------------------------------

fn spawn_source<F, Fut>(
    group: &mut PollerGroup,
    tx: &mpsc::Sender<Polled<SourceUpdate>>,
    client: &BackendClient,
    source: PollSource,
    interval: Duration,
    fetch: F,
) where
    F: Fn(BackendClient) -> Fut + Send + 'static,
    Fut: Future<Output = Result<SourceUpdate>> + Send + 'static,
{
    let client = client.clone();
    group.push(start_polling(
        source.as_str(),
        interval,
        tx.clone(),
        move || fetch(client.clone()),
    ));
}

fn start_pollers(
    settings: &Settings,
    client: &BackendClient,
    tx: &mpsc::Sender<Polled<SourceUpdate>>,
) -> PollerGroup {
    let p = &settings.polling;
    let mut group = PollerGroup::new();

    // Fast tier
    spawn_source(&mut group, tx, client, PollSource::Status, p.fast(), |c| async move {
        c.get_status().await.map(SourceUpdate::Status)
    });
    spawn_source(&mut group, tx, client, PollSource::TradeState, p.fast(), |c| async move {
        c.get_trade_state().await.map(SourceUpdate::TradeState)
    });
    spawn_source(&mut group, tx, client, PollSource::Selection, p.fast(), |c| async move {
        c.get_selection().await.map(SourceUpdate::Selection)
    });

    // Price tier
    spawn_source(&mut group, tx, client, PollSource::Ticks, p.tick(), |c| async move {
        c.get_ltp_snapshot().await.map(SourceUpdate::Ticks)
    });
    spawn_source(&mut group, tx, client, PollSource::Indices, p.index(), |c| async move {
        c.get_market_indices().await.map(SourceUpdate::Indices)
    });

    // Slow tier
    spawn_source(&mut group, tx, client, PollSource::StrategyConfig, p.slow(), |c| async move {
        c.get_strategy_config().await.map(SourceUpdate::StrategyConfig)
    });
    spawn_source(&mut group, tx, client, PollSource::Positions, p.slow(), |c| async move {
        c.get_today_positions().await.map(SourceUpdate::Positions)
    });
    spawn_source(&mut group, tx, client, PollSource::Logs, p.slow(), |c| async move {
        c.get_logs().await.map(SourceUpdate::Logs)
    });
    spawn_source(&mut group, tx, client, PollSource::TradeSideMode, p.slow(), |c| async move {
        c.get_trade_side_mode().await.map(SourceUpdate::TradeSideMode)
    });
    spawn_source(&mut group, tx, client, PollSource::Broker, p.slow(), |c| async move {
        c.get_broker_status().await.map(SourceUpdate::Broker)
    });

    group
}
