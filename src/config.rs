//! Bridge configuration: broker endpoint, topics, timing, and wiring.
//!
//! Loaded once at startup from a TOML file. A missing file is replaced with
//! a written-out default so there is always a concrete config to edit.

use std::path::PathBuf;
use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sensor::Polarity;

const CONFIG_DIR: &str = "doorlink";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub topics: TopicConfig,
    pub timing: TimingConfig,
    pub gpio: GpioConfig,
    /// Publish the current state once at boot so dashboards are correct
    /// before the door first moves.
    pub publish_on_boot: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            topics: TopicConfig::default(),
            timing: TimingConfig::default(),
            gpio: GpioConfig::default(),
            publish_on_boot: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Broker session identifier; must be stable and unique per device.
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.29".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "doorlink-garage".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub status_topic: String,
    pub availability_topic: String,
    pub open_payload: String,
    pub closed_payload: String,
    pub online_payload: String,
    pub offline_payload: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            status_topic: "home/door/garage/state".to_string(),
            availability_topic: "home/door/garage/availability".to_string(),
            open_payload: "open".to_string(),
            closed_payload: "closed".to_string(),
            online_payload: "online".to_string(),
            offline_payload: "offline".to_string(),
        }
    }
}

impl TopicConfig {
    pub fn status_payload(&self, state: crate::sensor::DoorState) -> &str {
        match state {
            crate::sensor::DoorState::Open => &self.open_payload,
            crate::sensor::DoorState::Closed => &self.closed_payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_ms: u64,
    pub debounce_ms: u64,
    /// How long the session stays up after the last successful publish.
    pub window_secs: u64,
    /// Per-tick budget for bringing the radio link up. Deliberately short:
    /// a failed attempt retries next tick instead of stalling sampling.
    pub connect_timeout_ms: u64,
    /// Budget for the broker handshake and publish acknowledgements.
    pub session_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            debounce_ms: 40,
            window_secs: 60,
            connect_timeout_ms: 2_000,
            session_timeout_ms: 5_000,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub door_pin: u8,
    pub polarity: Polarity,
    pub radio_enable_pin: u8,
    pub radio_link_pin: u8,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            door_pin: 12,
            polarity: Polarity::ActiveLow,
            radio_enable_pin: 23,
            radio_link_pin: 24,
        }
    }
}

impl BridgeConfig {
    /// Loads the config from `path`, falling back to the default location.
    /// Writes out the defaults when no file exists yet.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => default_config_path()?,
        };

        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path.display(), e))?
        {
            info!(path = %path.display(), "no config file found, writing defaults");
            let config = Self::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
            }
            let content = toml::to_string_pretty(&config)
                .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| eyre!("Failed to write default config: {}", e))?;
            config.validate()?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.is_empty() {
            return Err(eyre!("mqtt.host must not be empty"));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(eyre!("mqtt.client_id must not be empty"));
        }
        if self.topics.status_topic.is_empty() || self.topics.availability_topic.is_empty() {
            return Err(eyre!("topics must not be empty"));
        }
        if self.topics.online_payload == self.topics.offline_payload {
            return Err(eyre!(
                "availability payloads must differ, both are {:?}",
                self.topics.online_payload
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| eyre!("No config directory available"))?;
    Ok(base.join(CONFIG_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        config.validate().unwrap();
        // Boot publish is on unless explicitly disabled.
        assert!(config.publish_on_boot);
    }

    #[test]
    fn boot_publish_defaults_on_when_absent_from_file() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert!(config.publish_on_boot);

        let config: BridgeConfig = toml::from_str("publish_on_boot = false").unwrap();
        assert!(!config.publish_on_boot);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [mqtt]
            host = "10.0.0.5"
            client_id = "doorlink-shed"

            [timing]
            window_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.mqtt.host, "10.0.0.5");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.timing.window_secs, 120);
        assert_eq!(config.timing.debounce_ms, 40);
        assert_eq!(config.topics.open_payload, "open");
        config.validate().unwrap();
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let mut config = BridgeConfig::default();
        config.mqtt.client_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn equal_availability_payloads_are_rejected() {
        let mut config = BridgeConfig::default();
        config.topics.offline_payload = config.topics.online_payload.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn polarity_parses_from_snake_case() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [gpio]
            door_pin = 17
            polarity = "active_high"
            "#,
        )
        .unwrap();
        assert_eq!(config.gpio.polarity, Polarity::ActiveHigh);
        assert_eq!(config.gpio.door_pin, 17);
    }
}
