//! ==============================================================================
//! server.rs - control api
//! ==============================================================================
//!
//! routes:
//!     GET  /                    minimal html status page
//!     GET  /api                 PanelView json
//!     GET  /api/history         full history json (oldest first)
//!     GET  /api/history.csv     history as csv
//!     POST /api/refresh         poll the device now (external trigger)
//!     POST /api/history/clear   drop all readings
//!     POST /api/motor?action=on|off
//!     POST /api/alarm?action=on|off
//!
//! relationships:
//!     - uses: panel.rs (all state access goes through the Panel handle)
//!     - uses: export.rs (csv body)
//!
//! ==============================================================================

use crate::domain::{Actuator, Command, SensorReading, Severity};
use crate::export;
use crate::panel::{Panel, PanelView};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct ApiState {
    pub panel: Panel,
    pub recent_rows: usize,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/api/history", get(history_handler))
        .route("/api/history.csv", get(csv_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/history/clear", post(clear_handler))
        .route("/api/motor", post(motor_handler))
        .route("/api/alarm", post(alarm_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// json api endpoint for programmatic access
async fn api_handler(State(state): State<ApiState>) -> Json<PanelView> {
    Json(state.panel.view(state.recent_rows).await)
}

async fn history_handler(State(state): State<ApiState>) -> Json<Vec<SensorReading>> {
    Json(state.panel.history().await)
}

async fn csv_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let body = export::to_csv(&state.panel.history().await);
    ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body)
}

async fn refresh_handler(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let outcome = state.panel.refresh().await;
    let view = state.panel.view(state.recent_rows).await;
    match outcome {
        Ok(_) => Json(serde_json::json!({"status": "ok", "panel": view})),
        Err(e) => Json(serde_json::json!({
            "status": "error",
            "message": e.to_string(),
            "panel": view,
        })),
    }
}

async fn clear_handler(State(state): State<ApiState>) -> Json<serde_json::Value> {
    state.panel.clear_history().await;
    Json(serde_json::json!({"status": "ok", "action": "clear"}))
}

/// actuator control params
#[derive(Deserialize)]
struct SwitchParams {
    action: String,
}

async fn motor_handler(
    State(state): State<ApiState>,
    Query(params): Query<SwitchParams>,
) -> Json<serde_json::Value> {
    switch(&state.panel, Actuator::Motor, &params.action).await
}

async fn alarm_handler(
    State(state): State<ApiState>,
    Query(params): Query<SwitchParams>,
) -> Json<serde_json::Value> {
    switch(&state.panel, Actuator::Alarm, &params.action).await
}

async fn switch(panel: &Panel, actuator: Actuator, action: &str) -> Json<serde_json::Value> {
    let on = match action {
        "on" => true,
        "off" => false,
        _ => return Json(serde_json::json!({"status": "error", "message": "unknown action"})),
    };
    let command = Command::new(actuator, on);
    if panel.command(command).await {
        Json(serde_json::json!({"status": "ok", "actuator": actuator.name(), "action": action}))
    } else {
        Json(serde_json::json!({
            "status": "error",
            "actuator": actuator.name(),
            "action": action,
            "message": format!("device did not accept: {}", command.describe()),
        }))
    }
}

async fn dashboard_handler(State(state): State<ApiState>) -> Html<String> {
    Html(render_status_page(&state.panel.view(state.recent_rows).await))
}

fn render_status_page(view: &PanelView) -> String {
    let dot = match view.severity {
        Severity::Ok => "#2ecc71",
        Severity::Warning => "#f1c40f",
        Severity::Error => "#e74c3c",
    };
    let mut status = html_escape(&view.status_label);
    if let Some(at) = view.last_success {
        status.push_str(&format!(" | last update: {}", at.format("%H:%M:%S")));
    }

    let current = match &view.latest {
        Some(r) => format!(
            "<p>Temperature: {}</p><p>Humidity: {}</p><p>Button: {}</p><p>Motor: {}</p><p>Alarm: {}</p>",
            opt(r.temperature, " °C"),
            opt(r.humidity, " %"),
            if r.button { "pressed" } else { "released" },
            if r.motor { "on" } else { "off" },
            if r.alarm { "active" } else { "inactive" },
        ),
        None => "<p>No data from device</p>".to_string(),
    };

    let rows: String = view
        .recent
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                r.timestamp.format("%H:%M:%S"),
                opt(r.temperature, ""),
                opt(r.humidity, ""),
                r.button as u8,
                r.motor as u8,
                r.alarm as u8,
            )
        })
        .collect();

    format!(
        r#"<!doctype html>
<html>
<head><title>device panel</title><meta http-equiv="refresh" content="5"></head>
<body style="font-family: system-ui; padding: 2rem;">
    <p><span style="color: {dot};">●</span> {status}</p>
    {current}
    <table>
        <thead><tr><th>time</th><th>temperature</th><th>humidity</th><th>button</th><th>motor</th><th>alarm</th></tr></thead>
        <tbody>{rows}</tbody>
    </table>
    <p style="color: #888;">{len}/{cap} readings kept</p>
</body>
</html>"#,
        len = view.history_len,
        cap = view.history_capacity,
    )
}

fn opt(value: Option<f64>, unit: &str) -> String {
    value.map(|v| format!("{:.1}{}", v, unit)).unwrap_or_else(|| "N/A".to_string())
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}
