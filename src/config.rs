/// config.rs – Load settings from config.yaml + environment variables.
///
/// Environment variables always override YAML values; CLI flags override both.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::alerts::MAX_TOAST_SECONDS;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub log_level: String,
    /// Log destination while the dashboard owns the terminal.
    pub log_file: String,
    /// Path to the SQLite alert journal.
    pub journal_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
            log_file: "scalp-monitor.log".into(),
            journal_path: "scalp-monitor.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the engine's HTTP API.
    pub base_url: String,
    /// Transport timeout per request; the only bound on a hung fetch.
    pub request_timeout_seconds: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            request_timeout_seconds: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Engine status, trade state and option selection.
    pub fast_ms: u64,
    /// Logs, positions, strategy config, trade-side mode, broker status.
    pub slow_ms: u64,
    /// Tick price snapshot.
    pub tick_ms: u64,
    /// Market index snapshot.
    pub index_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_ms: 3_000,
            slow_ms: 15_000,
            tick_ms: 500,
            index_ms: 500,
        }
    }
}

impl PollingConfig {
    pub fn fast(&self) -> Duration {
        Duration::from_millis(self.fast_ms)
    }

    pub fn slow(&self) -> Duration {
        Duration::from_millis(self.slow_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn index(&self) -> Duration {
        Duration::from_millis(self.index_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Price samples kept per symbol.
    pub price_window: usize,
    /// PnL samples kept per symbol.
    pub pnl_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            price_window: 30,
            pnl_window: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Ring the terminal bell on trade transitions.
    pub bell: bool,
    /// How long a toast stays on screen.
    pub toast_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            bell: true,
            toast_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dashboard refresh rate in seconds.
    pub refresh_rate: f64,
    /// Slots listed in the activity panel.
    pub slots: Vec<String>,
    /// Index tiles shown in the header.
    pub indices: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 0.5,
            slots: vec!["CE_1".into(), "CE_2".into(), "PE_1".into(), "PE_2".into()],
            indices: vec!["NIFTY".into(), "BANKNIFTY".into(), "SENSEX".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorConfig,
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub history: HistoryConfig,
    pub alerts: AlertsConfig,
    pub dashboard: DashboardConfig,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = if std::path::Path::new(config_path).exists() {
            let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
            serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")?
        } else {
            Settings::default()
        };

        if let Ok(url) = std::env::var("SCALP_BACKEND_URL") {
            settings.backend.base_url = url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.monitor.log_level = level;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if url.is_empty() {
            bail!("backend.base_url must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("backend.base_url must start with http:// or https://");
        }
        validate_positive(
            "backend.request_timeout_seconds",
            self.backend.request_timeout_seconds,
        )?;
        validate_positive("dashboard.refresh_rate", self.dashboard.refresh_rate)?;

        for (name, v) in [
            ("polling.fast_ms", self.polling.fast_ms),
            ("polling.slow_ms", self.polling.slow_ms),
            ("polling.tick_ms", self.polling.tick_ms),
            ("polling.index_ms", self.polling.index_ms),
        ] {
            if v == 0 {
                bail!("{name} must be > 0");
            }
        }

        if self.history.price_window == 0 {
            bail!("history.price_window must be > 0");
        }
        if self.history.pnl_window == 0 {
            bail!("history.pnl_window must be > 0");
        }
        if self.alerts.toast_seconds == 0 || self.alerts.toast_seconds > MAX_TOAST_SECONDS {
            bail!("alerts.toast_seconds must be between 1 and {MAX_TOAST_SECONDS}");
        }
        if self.dashboard.slots.iter().any(|s| s.trim().is_empty()) {
            bail!("dashboard.slots entries must be non-empty");
        }

        Ok(())
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn default_cadences_match_dashboard_tiers() {
        let p = PollingConfig::default();
        assert_eq!(p.fast(), Duration::from_secs(3));
        assert_eq!(p.slow(), Duration::from_secs(15));
        assert_eq!(p.tick(), Duration::from_millis(500));
        assert_eq!(p.index(), Duration::from_millis(500));
    }

    #[test]
    fn validate_rejects_zero_tick_interval() {
        let mut settings = Settings::default();
        settings.polling.tick_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_backend() {
        let mut settings = Settings::default();
        settings.backend.base_url = "ftp://example.com".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_history_window() {
        let mut settings = Settings::default();
        settings.history.pnl_window = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_bounds_toast_seconds() {
        let mut settings = Settings::default();
        settings.alerts.toast_seconds = MAX_TOAST_SECONDS;
        assert!(settings.validate().is_ok());
        settings.alerts.toast_seconds = u64::MAX;
        assert!(settings.validate().is_err());
        settings.alerts.toast_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "polling:\n  tick_ms: 250\nhistory:\n  price_window: 60\n";
        let settings: Settings = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(settings.polling.tick_ms, 250);
        assert_eq!(settings.polling.fast_ms, 3_000);
        assert_eq!(settings.history.price_window, 60);
        assert_eq!(settings.history.pnl_window, 10);
        assert!(settings.validate().is_ok());
    }
}
