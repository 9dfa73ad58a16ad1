//! Notification fanout configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration for the notification engine and connection lifecycle.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Event bus topic all chat events are published on.
    /// A single well-known name shared by every instance.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Base name for the fanout subscription. The instance id is appended
    /// so every process holds its own subscription and sees every event,
    /// regardless of whether the bus broadcasts or load-balances.
    #[serde(default = "default_subscription")]
    pub subscription: String,

    /// Outbound frame buffer per connection.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,

    /// Seconds between expired-token sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds of connection age after which the token is re-verified
    /// against the issuing authority.
    #[serde(default = "default_revalidate_after")]
    pub revalidate_after_secs: u64,
}

impl NotificationsConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn revalidate_after(&self) -> Duration {
        Duration::from_secs(self.revalidate_after_secs)
    }

    /// Validate notifications configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.is_empty() || self.subscription.is_empty() {
            return Err(ValidationError::EmptyTopicName);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            subscription: default_subscription(),
            send_buffer: default_send_buffer(),
            sweep_interval_secs: default_sweep_interval(),
            revalidate_after_secs: default_revalidate_after(),
        }
    }
}

fn default_topic() -> String {
    "chat-events".to_string()
}

fn default_subscription() -> String {
    "chat-events.fanout".to_string()
}

fn default_send_buffer() -> usize {
    256
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_revalidate_after() -> u64 {
    600
}
