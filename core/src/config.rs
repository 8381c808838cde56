// Manager construction settings
use std::time::Duration;

use serde::Deserialize;

use crate::bus::PublishPolicy;

/// Settings fixed at [`Manager`](crate::Manager) construction time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of every handler inbox; values below 1 are clamped to 1.
    pub buffer_size: usize,
    /// How long a publish may wait on a full inbox before dropping the
    /// event for it; `None` blocks indefinitely (the default).
    pub publish_timeout_ms: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16,
            publish_timeout_ms: None,
        }
    }
}

impl ManagerConfig {
    /// Defaults overlaid with `WEFT_BUFFER_SIZE` and
    /// `WEFT_PUBLISH_TIMEOUT_MS` when set.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = std::env::var("WEFT_BUFFER_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            cfg.buffer_size = n;
        }
        if let Some(ms) = std::env::var("WEFT_PUBLISH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            cfg.publish_timeout_ms = Some(ms);
        }
        cfg
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        match self.publish_timeout_ms {
            Some(ms) => PublishPolicy::Timeout(Duration::from_millis(ms)),
            None => PublishPolicy::Block,
        }
    }
}
