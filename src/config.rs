use std::path::Path;

use anyhow::{Context as _, bail};
use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub push: PushConfig,
    pub console: Option<ConsoleConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PushConfig {
    pub payload: Option<String>,
    pub payload_hex: Option<String>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ConsoleConfig {
    pub quit_on_enter: Option<bool>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = toml::de::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn quit_on_enter(&self) -> bool {
        self.console
            .as_ref()
            .and_then(|c| c.quit_on_enter)
            .unwrap_or(true)
    }
}

impl PushConfig {
    /// The opaque bytes to push, from either the text or the hex form.
    pub fn payload_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = match (&self.payload, &self.payload_hex) {
            (Some(text), None) => text.as_bytes().to_vec(),
            (None, Some(encoded)) => {
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                hex::decode(compact).context("decoding push.payload_hex")?
            }
            (Some(_), Some(_)) => bail!("set only one of push.payload and push.payload_hex"),
            (None, None) => bail!("one of push.payload or push.payload_hex is required"),
        };
        if bytes.is_empty() {
            bail!("push payload is empty");
        }
        Ok(bytes)
    }
}
