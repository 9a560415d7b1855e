//! ==============================================================================
//! export.rs - json snapshot and csv table of the history
//! ==============================================================================
//!
//! json:
//!     pretty array of SensorReading, rewritten every poll cycle. reads back
//!     losslessly, so it can also seed the history at startup.
//!
//! csv:
//!     id,timestamp,date,time,temperature,humidity,button,motor,alarm
//!     absent temperature / humidity are empty cells, switches are 0/1.
//!     parse_csv() accepts the same layout and applies the sentinel rule
//!     from domain.rs to every cell; rows without a usable timestamp are
//!     skipped.
//!
//! both writers go through `<file>.tmp` + rename so a reader never sees a
//! half-written file.
//!
//! ==============================================================================

use crate::domain::{parse_bool, parse_f64, SensorReading};

use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

pub const CSV_HEADER: &str = "id,timestamp,date,time,temperature,humidity,button,motor,alarm";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("export task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io { path: path.display().to_string(), source }
}

pub fn write_json(path: &Path, readings: &[SensorReading]) -> Result<(), ExportError> {
    let body = serde_json::to_vec_pretty(readings)?;
    write_atomic(path, &body)
}

pub fn read_json(path: &Path) -> Result<Vec<SensorReading>, ExportError> {
    let body = std::fs::read(path).map_err(io_err(path))?;
    Ok(serde_json::from_slice(&body)?)
}

pub fn write_csv(path: &Path, readings: &[SensorReading]) -> Result<(), ExportError> {
    write_atomic(path, to_csv(readings).as_bytes())
}

pub fn to_csv(readings: &[SensorReading]) -> String {
    let mut out = String::with_capacity(64 * (readings.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for (id, r) in readings.iter().enumerate() {
        // writing to a String cannot fail
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            id,
            r.timestamp.to_rfc3339(),
            r.timestamp.format("%d/%m/%Y"),
            r.timestamp.format("%H:%M:%S"),
            r.temperature.map(|v| v.to_string()).unwrap_or_default(),
            r.humidity.map(|v| v.to_string()).unwrap_or_default(),
            r.button as u8,
            r.motor as u8,
            r.alarm as u8,
        );
    }
    out
}

pub fn read_csv(path: &Path) -> Result<Vec<SensorReading>, ExportError> {
    let text = std::fs::read_to_string(path).map_err(io_err(path))?;
    Ok(parse_csv(&text))
}

/// lenient reader for the layout written by to_csv()
pub fn parse_csv(text: &str) -> Vec<SensorReading> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = match lines.next() {
        Some(h) => h.split(',').map(|c| c.trim().to_ascii_lowercase()).collect(),
        None => return Vec::new(),
    };
    let col = |name: &str| header.iter().position(|h| h == name);
    let Some(ts_col) = col("timestamp") else {
        return Vec::new();
    };
    let (temp_col, hum_col) = (col("temperature"), col("humidity"));
    let (button_col, motor_col, alarm_col) = (col("button"), col("motor"), col("alarm"));

    lines
        .filter_map(|line| {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let cell = |i: Option<usize>| i.and_then(|i| cells.get(i).copied()).unwrap_or("");
            let timestamp = DateTime::parse_from_rfc3339(cell(Some(ts_col)))
                .ok()?
                .with_timezone(&Local);
            Some(SensorReading {
                timestamp,
                temperature: parse_f64(cell(temp_col)),
                humidity: parse_f64(cell(hum_col)),
                button: parse_bool(cell(button_col)),
                motor: parse_bool(cell(motor_col)),
                alarm: parse_bool(cell(alarm_col)),
            })
        })
        .collect()
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), ExportError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, body).map_err(io_err(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}
