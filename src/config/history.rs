//! History API configuration (client-side timelines)

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_PAGE_SIZE: u32 = 200;

/// Where and how timelines fetch message history
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// REST API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Messages per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Messages fetched on each side of a jump target
    #[serde(default = "default_context_radius")]
    pub context_radius: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl HistoryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate history configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::InvalidHistoryUrl);
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidPageSize);
        }
        if self.context_radius == 0 {
            return Err(ValidationError::InvalidContextRadius);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            context_radius: default_context_radius(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_context_radius() -> u32 {
    25
}

fn default_request_timeout() -> u64 {
    15
}
