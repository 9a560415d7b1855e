//! ==============================================================================
//! panel.rs - owner of the history and connection status
//! ==============================================================================
//!
//! purpose:
//!     the single object the poll loop and the web server share. it wraps the
//!     device client and keeps all mutable state behind one lock:
//!
//!     ┌──────────────┐   refresh()    ┌──────────────┐
//!     │  poll loop   │ ─────────────► │              │ ──► device GET /
//!     └──────────────┘                │    Panel     │ ──► forwarder (optional)
//!     ┌──────────────┐   command()    │   (Clone)    │ ──► json / csv export
//!     │  web server  │ ─────────────► │              │
//!     └──────────────┘   view()       └──────┬───────┘
//!                                            │ Arc<RwLock<PanelState>>
//!                                     History + StatusBoard
//!
//! rules:
//!     - history only grows on a successful poll; failures touch status only
//!     - refreshes are serialized by refresh_lock (single writer)
//!     - network calls never happen while the state lock is held
//!
//! ==============================================================================

use crate::config::PanelConfig;
use crate::device::{DeviceClient, PollError};
use crate::domain::{Actuator, Command, ConnectionStatus, SensorReading, Severity, StatusBoard};
use crate::export;
use crate::forward::Forwarder;
use crate::history::History;

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct PanelState {
    pub history: History<SensorReading>,
    pub board: StatusBoard,
}

/// serializable picture of the panel for the api and the status page
#[derive(Clone, Debug, Serialize)]
pub struct PanelView {
    pub status: ConnectionStatus,
    pub status_label: String,
    pub severity: Severity,
    pub last_success: Option<DateTime<Local>>,
    pub latest: Option<SensorReading>,
    /// newest first
    pub recent: Vec<SensorReading>,
    pub history_len: usize,
    pub history_capacity: usize,
}

#[derive(Clone)]
pub struct Panel {
    device: DeviceClient,
    forwarder: Option<Forwarder>,
    json_path: Option<PathBuf>,
    csv_path: Option<PathBuf>,
    show_data: bool,
    state: Arc<RwLock<PanelState>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl Panel {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            device: DeviceClient::new(&config.device),
            forwarder: Forwarder::from_config(&config.forward),
            json_path: config.export.json_file(),
            csv_path: config.export.csv_file(),
            show_data: config.logging.show_sensor_data,
            state: Arc::new(RwLock::new(PanelState {
                history: History::new(config.polling.history_capacity),
                board: StatusBoard::default(),
            })),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// seed the history, e.g. from a json snapshot written by a previous run
    pub async fn restore(&self, readings: Vec<SensorReading>) {
        self.state.write().await.history.extend(readings);
    }

    /// seed the history from the export files of a previous run
    ///
    /// the json snapshot wins; the csv table is used when json export is off
    /// or its file is missing. returns how many readings were loaded.
    pub async fn restore_from_exports(&self) -> Result<usize, export::ExportError> {
        let json_path = self.json_path.clone().filter(|p| p.exists());
        let csv_path = self.csv_path.clone().filter(|p| p.exists());

        let readings = tokio::task::spawn_blocking(move || match (json_path, csv_path) {
            (Some(path), _) => export::read_json(&path).map(|r| (path, r)).map(Some),
            (None, Some(path)) => export::read_csv(&path).map(|r| (path, r)).map(Some),
            (None, None) => Ok(None),
        })
        .await??;

        let Some((path, readings)) = readings else {
            return Ok(0);
        };
        let count = readings.len();
        self.restore(readings).await;
        tracing::info!("restored {} readings from {}", count, path.display());
        Ok(count)
    }

    /// poll once and fold the outcome into history and status
    pub async fn refresh(&self) -> Result<SensorReading, PollError> {
        let _serial = self.refresh_lock.lock().await;

        let reading = match self.device.poll().await {
            Ok(reading) => reading,
            Err(e) => {
                self.state.write().await.board.poll_failed();
                tracing::warn!("poll of {} failed: {}", self.device.base_url(), e);
                return Err(e);
            }
        };

        if self.show_data {
            tracing::info!(
                "temp: {} | humidity: {} | button: {} | motor: {} | alarm: {}",
                fmt_value(reading.temperature, "°C"),
                fmt_value(reading.humidity, "%"),
                reading.button,
                reading.motor,
                reading.alarm,
            );
        }

        {
            let mut state = self.state.write().await;
            state.history.push(reading.clone());
            state.board.poll_succeeded(reading.timestamp);
        }

        if let Some(forwarder) = &self.forwarder {
            if !forwarder.send(&reading).await {
                self.state.write().await.board.send_failed();
            }
        }

        self.write_exports().await;
        Ok(reading)
    }

    /// switch an actuator; failure is recorded in the status
    pub async fn command(&self, command: Command) -> bool {
        let ok = match command.actuator {
            Actuator::Motor => self.device.set_motor(command.on).await,
            Actuator::Alarm => self.device.set_alarm(command.on).await,
        };
        if ok {
            tracing::info!("{} ok", command.describe());
        } else {
            self.state.write().await.board.command_failed(command);
        }
        ok
    }

    pub async fn clear_history(&self) {
        self.state.write().await.history.clear();
        tracing::info!("history cleared");
        self.write_exports().await;
    }

    pub async fn history(&self) -> Vec<SensorReading> {
        self.state.read().await.history.snapshot()
    }

    #[cfg(test)]
    pub async fn status(&self) -> StatusBoard {
        self.state.read().await.board.clone()
    }

    pub async fn view(&self, recent: usize) -> PanelView {
        let state = self.state.read().await;
        let status = state.board.status;
        PanelView {
            status,
            status_label: status.label(),
            severity: status.severity(),
            last_success: state.board.last_success,
            latest: state.history.latest().cloned(),
            recent: state.history.recent(recent),
            history_len: state.history.len(),
            history_capacity: state.history.capacity(),
        }
    }

    async fn write_exports(&self) {
        if self.json_path.is_none() && self.csv_path.is_none() {
            return;
        }
        let readings = self.history().await;
        let (json_path, csv_path) = (self.json_path.clone(), self.csv_path.clone());

        // offload blocking file io
        let result = tokio::task::spawn_blocking(move || -> Result<(), export::ExportError> {
            if let Some(path) = json_path {
                export::write_json(&path, &readings)?;
            }
            if let Some(path) = csv_path {
                export::write_csv(&path, &readings)?;
            }
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("export failed: {}", e),
            Err(e) => tracing::warn!("export task join error: {}", e),
        }
    }
}

fn fmt_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use axum::{http::StatusCode, routing::get, routing::post, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_for(base_url: &str) -> PanelConfig {
        let mut config = PanelConfig::default();
        config.device.address = base_url.to_string();
        config.device.poll_timeout_ms = 500;
        config.device.command_timeout_ms = 500;
        config.polling.history_capacity = 3;
        config.export.json_path = String::new();
        config.logging.show_sensor_data = false;
        config
    }

    /// device whose temperature counts up by one per poll
    fn counting_device() -> Router {
        let counter = Arc::new(AtomicUsize::new(0));
        Router::new()
            .route(
                "/",
                get(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        format!(
                            r#"[{{"Temperatura":{},"Umidade":50,"Botao":0,"Motor":1,"Alarme":0}}]"#,
                            n
                        )
                    }
                }),
            )
            .route("/motor1_l", get(|| async { "" }))
    }

    #[tokio::test]
    async fn test_refresh_appends_and_connects() {
        let url = mock::spawn(counting_device()).await;
        let panel = Panel::new(&config_for(&url));

        for _ in 0..5 {
            panel.refresh().await.unwrap();
        }
        let temps: Vec<Option<f64>> = panel.history().await.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![Some(2.0), Some(3.0), Some(4.0)]);

        let view = panel.view(2).await;
        assert_eq!(view.status, ConnectionStatus::Connected);
        assert_eq!(view.severity, Severity::Ok);
        assert!(view.last_success.is_some());
        assert_eq!(view.latest.unwrap().temperature, Some(4.0));
        assert_eq!(view.recent.len(), 2);
        assert_eq!(view.recent[0].temperature, Some(4.0));
        assert_eq!(view.history_len, 3);
        assert_eq!(view.history_capacity, 3);
    }

    #[tokio::test]
    async fn test_failed_poll_leaves_history() {
        let app = Router::new().route("/", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let url = mock::spawn(app).await;
        let panel = Panel::new(&config_for(&url));
        let sample = serde_json::json!({"Temperatura": 19.0});
        let seeded = SensorReading::from_device(&sample, Local::now());
        panel.restore(vec![seeded.clone()]).await;

        assert!(panel.refresh().await.is_err());
        assert_eq!(panel.history().await, vec![seeded]);
        let status = panel.status().await;
        assert_eq!(status.status, ConnectionStatus::Disconnected);
        assert!(status.last_success.is_none());
    }

    #[tokio::test]
    async fn test_command_failure_sets_status() {
        let url = mock::spawn(counting_device()).await;
        let panel = Panel::new(&config_for(&url));

        assert!(panel.command(Command::new(Actuator::Motor, false)).await);
        assert_eq!(panel.status().await.status, ConnectionStatus::Disconnected);

        let alarm_on = Command::new(Actuator::Alarm, true);
        assert!(!panel.command(alarm_on).await);
        let status = panel.status().await.status;
        assert_eq!(status, ConnectionStatus::CommandFailed { command: alarm_on });

        panel.refresh().await.unwrap();
        assert_eq!(panel.status().await.status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let url = mock::spawn(counting_device()).await;
        let panel = Panel::new(&config_for(&url));
        panel.refresh().await.unwrap();
        panel.refresh().await.unwrap();
        panel.clear_history().await;
        assert!(panel.history().await.is_empty());
        assert!(panel.view(10).await.latest.is_none());
    }

    #[tokio::test]
    async fn test_forward_failure_marks_send_failed() {
        let device = mock::spawn(counting_device()).await;
        let collector =
            Router::new().route("/in", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let upstream = mock::spawn(collector).await;
        let mut config = config_for(&device);
        config.forward.url = format!("{}/in", upstream);
        config.forward.timeout_ms = 500;
        let panel = Panel::new(&config);

        panel.refresh().await.unwrap();
        let view = panel.view(10).await;
        assert_eq!(view.status, ConnectionStatus::SendFailed);
        assert_eq!(view.severity, Severity::Warning);
        assert_eq!(view.history_len, 1);
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("device-panel-panel-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_refresh_writes_exports() {
        let dir = scratch_dir("write");
        let url = mock::spawn(counting_device()).await;
        let mut config = config_for(&url);
        config.export.json_path = dir.join("readings.json").display().to_string();
        config.export.csv_path = dir.join("readings.csv").display().to_string();
        let panel = Panel::new(&config);

        panel.refresh().await.unwrap();
        panel.refresh().await.unwrap();

        let from_json = export::read_json(&dir.join("readings.json")).unwrap();
        assert_eq!(from_json, panel.history().await);
        let csv = std::fs::read_to_string(dir.join("readings.csv")).unwrap();
        assert_eq!(export::parse_csv(&csv).len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_clear_rewrites_exports() {
        let dir = scratch_dir("clear");
        let url = mock::spawn(counting_device()).await;
        let mut config = config_for(&url);
        config.export.json_path = dir.join("readings.json").display().to_string();
        let panel = Panel::new(&config);

        panel.refresh().await.unwrap();
        assert_eq!(export::read_json(&dir.join("readings.json")).unwrap().len(), 1);

        panel.clear_history().await;
        assert!(export::read_json(&dir.join("readings.json")).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_restore_from_csv_when_json_missing() {
        let dir = scratch_dir("restore-csv");
        std::fs::create_dir_all(&dir).unwrap();
        let csv = "\
id,timestamp,date,time,temperature,humidity,button,motor,alarm
0,2025-03-14T09:00:00+00:00,,,21.5,40,0,1,0
1,2025-03-14T09:00:05+00:00,,,,41,1,1,0
";
        std::fs::write(dir.join("readings.csv"), csv).unwrap();

        let mut config = config_for(&mock::dead_url().await);
        config.export.json_path = dir.join("readings.json").display().to_string();
        config.export.csv_path = dir.join("readings.csv").display().to_string();
        let panel = Panel::new(&config);

        assert_eq!(panel.restore_from_exports().await.unwrap(), 2);
        let history = panel.history().await;
        assert_eq!(history[0].temperature, Some(21.5));
        assert!(history[0].motor);
        assert_eq!(history[1].temperature, None);
        assert!(history[1].button);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_restore_prefers_json() {
        let dir = scratch_dir("restore-json");
        let seeded = SensorReading::from_device(&serde_json::json!({"Umidade": 70}), Local::now());
        export::write_json(&dir.join("readings.json"), &[seeded.clone()]).unwrap();
        export::write_csv(&dir.join("readings.csv"), &[seeded.clone(), seeded.clone()]).unwrap();

        let mut config = config_for(&mock::dead_url().await);
        config.export.json_path = dir.join("readings.json").display().to_string();
        config.export.csv_path = dir.join("readings.csv").display().to_string();
        let panel = Panel::new(&config);

        assert_eq!(panel.restore_from_exports().await.unwrap(), 1);
        assert_eq!(panel.history().await, vec![seeded]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_restore_without_files() {
        let mut config = config_for(&mock::dead_url().await);
        config.export.csv_path = String::new();
        let panel = Panel::new(&config);
        assert_eq!(panel.restore_from_exports().await.unwrap(), 0);
        assert!(panel.history().await.is_empty());
    }
}
