//! ==============================================================================
//! domain.rs - readings, commands and connection status
//! ==============================================================================
//!
//! purpose:
//!     the plain data the rest of the host passes around. nothing in here
//!     touches the network; parsing the device payload lives here so it can
//!     be tested without a socket.
//!
//! sentinel rule:
//!     temperature / humidity that are missing or unreadable are ABSENT (None).
//!     button / motor / alarm that are missing or unreadable are FALSE.
//!     the same rule applies to the device payload and to csv imports.
//!
//! ==============================================================================

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// one snapshot of sensor + actuator values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// capture time, assigned by the host when the poll succeeds
    pub timestamp: DateTime<Local>,
    /// temperature in celsius
    pub temperature: Option<f64>,
    /// relative humidity (0-100%)
    pub humidity: Option<f64>,
    /// push button on the device
    pub button: bool,
    pub motor: bool,
    pub alarm: bool,
}

impl SensorReading {
    /// build a reading from one object of the device's json array
    ///
    /// keys follow the firmware: Temperatura, Umidade, Botao, Motor, Alarme.
    pub fn from_device(sample: &Value, timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            temperature: lenient_f64(sample.get("Temperatura")),
            humidity: lenient_f64(sample.get("Umidade")),
            button: lenient_bool(sample.get("Botao")),
            motor: lenient_bool(sample.get("Motor")),
            alarm: lenient_bool(sample.get("Alarme")),
        }
    }
}

/// number or numeric string; anything else (or nan/inf) is absent
pub fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_f64(s),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

pub fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// bool, non-zero number, or one of "1" / "true" / "on" / "high"
pub fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Some(Value::String(s)) => parse_bool(s),
        _ => false,
    }
}

pub fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "high"
    )
}

// ==============================================================================
// commands
// ==============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Motor,
    Alarm,
}

impl Actuator {
    pub fn name(self) -> &'static str {
        match self {
            Actuator::Motor => "motor",
            Actuator::Alarm => "alarm",
        }
    }
}

/// one actuator switch request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub actuator: Actuator,
    pub on: bool,
}

impl Command {
    pub fn new(actuator: Actuator, on: bool) -> Self {
        Self { actuator, on }
    }

    /// fixed firmware path for this command
    pub fn path(&self) -> &'static str {
        match (self.actuator, self.on) {
            (Actuator::Motor, true) => "/motor1_h",
            (Actuator::Motor, false) => "/motor1_l",
            (Actuator::Alarm, true) => "/alarme_h",
            (Actuator::Alarm, false) => "/alarme_l",
        }
    }

    pub fn describe(&self) -> String {
        let verb = if self.on { "on" } else { "off" };
        format!("switch {} {}", self.actuator.name(), verb)
    }
}

// ==============================================================================
// connection status
// ==============================================================================

/// last known outcome of talking to the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    CommandFailed { command: Command },
    /// device answered but the upstream forward failed
    SendFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

impl ConnectionStatus {
    pub fn label(&self) -> String {
        match self {
            ConnectionStatus::Disconnected => "Disconnected".to_string(),
            ConnectionStatus::Connected => "Connected".to_string(),
            ConnectionStatus::CommandFailed { command } => {
                format!("Failed to {}", command.describe())
            }
            ConnectionStatus::SendFailed => "Connected, upstream forward failed".to_string(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ConnectionStatus::Connected => Severity::Ok,
            ConnectionStatus::SendFailed => Severity::Warning,
            ConnectionStatus::Disconnected | ConnectionStatus::CommandFailed { .. } => {
                Severity::Error
            }
        }
    }
}

/// status plus the time of the last successful poll
#[derive(Clone, Debug, Default, Serialize)]
pub struct StatusBoard {
    pub status: ConnectionStatus,
    pub last_success: Option<DateTime<Local>>,
}

impl StatusBoard {
    pub fn poll_succeeded(&mut self, at: DateTime<Local>) {
        self.status = ConnectionStatus::Connected;
        self.last_success = Some(at);
    }

    pub fn poll_failed(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    pub fn command_failed(&mut self, command: Command) {
        self.status = ConnectionStatus::CommandFailed { command };
    }

    pub fn send_failed(&mut self) {
        self.status = ConnectionStatus::SendFailed;
    }
}
