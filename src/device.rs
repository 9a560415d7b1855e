//! ==============================================================================
//! device.rs - http client for the sensor device
//! ==============================================================================
//!
//! purpose:
//!     the only code that talks to the device. two operations:
//!     - poll(): GET / and turn the json array into a SensorReading
//!     - send_command(): GET one of the fixed actuator paths
//!
//! contract:
//!     nothing here panics or propagates a transport error upward as a crash.
//!     poll() returns a typed PollError, commands return plain bool.
//!     every request is bounded by its configured timeout; there is no retry.
//!
//! device api:
//!     GET /           -> [{"Temperatura":24.5,"Umidade":60,"Botao":1,"Motor":0,"Alarme":0}]
//!     GET /motor1_h   -> 200 (motor on)
//!     GET /motor1_l   -> 200 (motor off)
//!     GET /alarme_h   -> 200 (alarm on)
//!     GET /alarme_l   -> 200 (alarm off)
//!
//! ==============================================================================

use crate::config::DeviceConfig;
use crate::domain::{Actuator, Command, SensorReading};

use chrono::Local;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("device did not answer within {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("device answered with http {0}")]
    Status(StatusCode),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected payload: {0}")]
    Payload(&'static str),
}

#[derive(Clone)]
pub struct DeviceClient {
    base_url: String,
    client: reqwest::Client,
    poll_timeout: Duration,
    command_timeout: Duration,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            base_url: config.base_url(),
            client: reqwest::Client::new(),
            poll_timeout: config.poll_timeout(),
            command_timeout: config.command_timeout(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// one bounded GET of the device's sensor state
    pub async fn poll(&self) -> Result<SensorReading, PollError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(self.poll_timeout)
            .send()
            .await
            .map_err(|e| self.classify(e, self.poll_timeout))?;

        if response.status() != StatusCode::OK {
            return Err(PollError::Status(response.status()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(e, self.poll_timeout))?;
        parse_payload(&body)
    }

    pub async fn set_motor(&self, on: bool) -> bool {
        self.send_command(Command::new(Actuator::Motor, on)).await
    }

    pub async fn set_alarm(&self, on: bool) -> bool {
        self.send_command(Command::new(Actuator::Alarm, on)).await
    }

    /// true iff the device answered 200; no body contract
    pub async fn send_command(&self, command: Command) -> bool {
        let url = format!("{}{}", self.base_url, command.path());
        match self.client.get(&url).timeout(self.command_timeout).send().await {
            Ok(response) => {
                let ok = response.status() == StatusCode::OK;
                if !ok {
                    tracing::warn!(status = %response.status(), "{} rejected", command.describe());
                }
                ok
            }
            Err(e) => {
                let e = self.classify(e, self.command_timeout);
                tracing::warn!("{} failed: {}", command.describe(), e);
                false
            }
        }
    }

    fn classify(&self, e: reqwest::Error, timeout: Duration) -> PollError {
        if e.is_timeout() {
            PollError::Timeout(timeout)
        } else {
            PollError::Transport(e)
        }
    }
}

/// first element of the device's json array, stamped with the current time
pub fn parse_payload(body: &[u8]) -> Result<SensorReading, PollError> {
    let value: Value = serde_json::from_slice(body)?;
    let samples = value
        .as_array()
        .ok_or(PollError::Payload("expected a json array"))?;
    let first = samples.first().ok_or(PollError::Payload("empty array"))?;
    if !first.is_object() {
        return Err(PollError::Payload("expected an object in the array"));
    }
    Ok(SensorReading::from_device(first, Local::now()))
}
