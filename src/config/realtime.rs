//! Real-time engine configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Timing and capacity settings for the connection engine
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Expected client heartbeat cadence, in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Missed-heartbeat multiplier before a user is considered offline
    #[serde(default = "default_timeout_factor")]
    pub heartbeat_timeout_factor: u32,

    /// How long zero-connection presence entries are retained, in seconds
    #[serde(default = "default_presence_grace")]
    pub presence_grace_secs: u64,

    /// Typing indicator lifetime without renewal, in milliseconds
    #[serde(default = "default_typing_ttl")]
    pub typing_ttl_ms: u64,

    /// Expiry sweep period, in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Per-connection outbound queue depth
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Per-channel pending mutation queue depth
    #[serde(default = "default_sequencer_queue")]
    pub sequencer_queue: usize,

    /// Idle channel actor retirement, in seconds
    #[serde(default = "default_sequencer_idle")]
    pub sequencer_idle_secs: u64,

    /// Wait on a full outbound queue before evicting, in milliseconds
    #[serde(default = "default_delivery_retry")]
    pub delivery_retry_ms: u64,

    /// Maximum message content length, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence after which a user is offline.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval() * self.heartbeat_timeout_factor
    }

    pub fn presence_grace(&self) -> Duration {
        Duration::from_secs(self.presence_grace_secs)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn sequencer_idle(&self) -> Duration {
        Duration::from_secs(self.sequencer_idle_secs)
    }

    pub fn delivery_retry(&self) -> Duration {
        Duration::from_millis(self.delivery_retry_ms)
    }

    /// Validate real-time configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidHeartbeatInterval);
        }
        if self.heartbeat_timeout_factor < 2 {
            return Err(ValidationError::InvalidTimeoutFactor);
        }
        if self.outbound_buffer == 0 {
            return Err(ValidationError::ZeroCapacity("outbound_buffer"));
        }
        if self.sequencer_queue == 0 {
            return Err(ValidationError::ZeroCapacity("sequencer_queue"));
        }
        if self.max_message_length == 0 {
            return Err(ValidationError::ZeroCapacity("max_message_length"));
        }
        if self.typing_ttl_ms == 0 {
            return Err(ValidationError::InvalidTypingTtl);
        }
        if self.sweep_interval_ms == 0 || self.sweep_interval_ms >= self.typing_ttl_ms {
            return Err(ValidationError::SweepIntervalTooLong);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_factor: default_timeout_factor(),
            presence_grace_secs: default_presence_grace(),
            typing_ttl_ms: default_typing_ttl(),
            sweep_interval_ms: default_sweep_interval(),
            outbound_buffer: default_outbound_buffer(),
            sequencer_queue: default_sequencer_queue(),
            sequencer_idle_secs: default_sequencer_idle(),
            delivery_retry_ms: default_delivery_retry(),
            max_message_length: default_max_message_length(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_timeout_factor() -> u32 {
    3
}

fn default_presence_grace() -> u64 {
    60
}

fn default_typing_ttl() -> u64 {
    5000
}

fn default_sweep_interval() -> u64 {
    250
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_sequencer_queue() -> usize {
    1024
}

fn default_sequencer_idle() -> u64 {
    300
}

fn default_delivery_retry() -> u64 {
    50
}

fn default_max_message_length() -> usize {
    4000
}
