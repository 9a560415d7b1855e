//! pushes each accepted reading to an upstream collector as json

use crate::config::ForwardConfig;
use crate::domain::SensorReading;

use std::time::Duration;

#[derive(Clone)]
pub struct Forwarder {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    /// None when no upstream url is configured
    pub fn from_config(config: &ForwardConfig) -> Option<Self> {
        config.target().map(|url| Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            timeout: config.timeout(),
        })
    }

    /// true iff the collector answered 2xx
    pub async fn send(&self, reading: &SensorReading) -> bool {
        match self.client.post(&self.url).timeout(self.timeout).json(reading).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "upstream rejected reading");
                false
            }
            Err(e) => {
                tracing::warn!("upstream forward failed: {}", e);
                false
            }
        }
    }
}
