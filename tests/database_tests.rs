/// Integration tests for the alert journal.
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::NamedTempFile;

// The binary crate doesn't expose a lib target, so modules are brought in
// with `#[path]` includes.

#[path = "../src/models.rs"]
mod models;

#[path = "../src/alerts.rs"]
mod alerts;

#[path = "../src/database.rs"]
mod database;

use alerts::{AlertDispatcher, AlertSink, ToastBoard};
use database::{Database, JournalSink};
use models::{AlertEvent, AlertKind, MonitorSession};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tmp_db() -> (NamedTempFile, Database) {
    let f = NamedTempFile::new().expect("tempfile");
    let db = Database::open(f.path().to_str().unwrap()).expect("open db");
    (f, db)
}

fn sample_session(id: &str) -> MonitorSession {
    MonitorSession {
        session_id: id.to_string(),
        started_at: Utc::now(),
        ended_at: None,
        backend_url: "http://127.0.0.1:8000".into(),
        alerts_fired: 0,
    }
}

fn sample_alert(kind: AlertKind, slot: &str, pnl: Option<f64>) -> AlertEvent {
    AlertEvent {
        kind,
        slot_id: slot.to_string(),
        symbol: Some("NIFTY24JUN22500CE".into()),
        price: Some(124.0),
        pnl,
        at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[test]
fn session_upsert_updates_end_and_count() {
    let (_f, db) = tmp_db();
    let s = sample_session("sess-1");
    db.upsert_session(&s).unwrap();

    let ended = MonitorSession {
        ended_at: Some(Utc::now()),
        alerts_fired: 4,
        ..s
    };
    db.upsert_session(&ended).unwrap();

    let sessions = db.get_sessions(10).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].alerts_fired, 4);
    assert!(sessions[0].ended_at.is_some());
    assert_eq!(sessions[0].backend_url, "http://127.0.0.1:8000");
}

#[test]
fn sessions_are_listed_newest_first() {
    let (_f, db) = tmp_db();
    let mut old = sample_session("old");
    old.started_at = Utc::now() - Duration::hours(2);
    db.upsert_session(&old).unwrap();
    db.upsert_session(&sample_session("new")).unwrap();

    let sessions = db.get_sessions(1).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "new");
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[test]
fn record_and_read_back_alerts() {
    let (_f, db) = tmp_db();
    db.upsert_session(&sample_session("s")).unwrap();
    db.record_alert(&sample_alert(AlertKind::Entered, "CE_1", None), Some("s"))
        .unwrap();
    db.record_alert(&sample_alert(AlertKind::SlHit, "CE_1", Some(-2500.0)), Some("s"))
        .unwrap();

    let recent = db.recent_alerts(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].kind, AlertKind::SlHit);
    assert_eq!(recent[0].pnl, Some(-2500.0));
    assert_eq!(recent[1].kind, AlertKind::Entered);
    assert_eq!(recent[1].symbol.as_deref(), Some("NIFTY24JUN22500CE"));
    assert_eq!(db.alert_count("s").unwrap(), 2);
}

#[test]
fn unknown_alert_kind_is_a_read_error() {
    let (f, db) = tmp_db();
    db.upsert_session(&sample_session("s")).unwrap();
    db.record_alert(&sample_alert(AlertKind::TpHit, "CE_1", Some(900.0)), Some("s"))
        .unwrap();

    let raw = rusqlite::Connection::open(f.path()).unwrap();
    raw.execute(
        "INSERT INTO alerts (session_id, kind, slot_id, fired_at) VALUES ('s', 'margin_call', 'PE_1', ?1)",
        [Utc::now().to_rfc3339()],
    )
    .unwrap();

    let err = db.recent_alerts(10).unwrap_err();
    assert!(format!("{err:#}").contains("margin_call"), "{err:#}");
    // The row still counts; it is the read that refuses it.
    assert_eq!(db.alert_count("s").unwrap(), 2);
}

#[test]
fn closed_pnl_sums_only_closing_alerts() {
    let (_f, db) = tmp_db();
    db.upsert_session(&sample_session("s")).unwrap();
    for (kind, pnl) in [
        (AlertKind::Entered, Some(999.0)),
        (AlertKind::TpHit, Some(1200.0)),
        (AlertKind::ClosedLoss, Some(-300.0)),
        (AlertKind::ClosedLoss, None),
    ] {
        db.record_alert(&sample_alert(kind, "PE_1", pnl), Some("s"))
            .unwrap();
    }
    assert!((db.session_closed_pnl("s").unwrap() - 900.0).abs() < 1e-9);
    assert_eq!(db.session_closed_pnl("other").unwrap(), 0.0);
}

#[test]
fn journal_sink_writes_under_its_session() {
    let (_f, db) = tmp_db();
    let db = Arc::new(db);
    db.upsert_session(&sample_session("s")).unwrap();

    let mut sink = JournalSink::new(Arc::clone(&db), "s");
    sink.deliver(&sample_alert(AlertKind::TpHit, "CE_2", Some(800.0)))
        .unwrap();

    assert_eq!(db.alert_count("s").unwrap(), 1);
    assert_eq!(sink.name(), "journal");
}

#[test]
fn dispatcher_journals_each_event_once() {
    let (_f, db) = tmp_db();
    let db = Arc::new(db);
    db.upsert_session(&sample_session("s")).unwrap();

    let mut dispatcher = AlertDispatcher::new(ToastBoard::new(5))
        .with_sink(Box::new(JournalSink::new(Arc::clone(&db), "s")));
    let events = vec![
        sample_alert(AlertKind::Entered, "CE_1", None),
        sample_alert(AlertKind::ClosedProfit, "CE_1", Some(450.0)),
    ];
    dispatcher.dispatch(&events);

    assert_eq!(db.alert_count("s").unwrap(), 2);
    assert_eq!(dispatcher.fired(), 2);
    assert_eq!(dispatcher.toasts().len(), 2);
}
