//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `HUDDLE` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use huddle::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Listening on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod error;
mod history;
mod realtime;
mod server;

pub use auth::AuthConfig;
pub use error::{ConfigError, ValidationError};
pub use history::HistoryConfig;
pub use realtime::RealtimeConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listener (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Token verification
    pub auth: AuthConfig,

    /// Presence, typing, sequencing and delivery tunables
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// History API used by client timelines
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `HUDDLE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `HUDDLE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `HUDDLE__AUTH__JWT_SECRET=...` -> `auth.jwt_secret = ...`
    /// - `HUDDLE__REALTIME__TYPING_TTL_MS=5000` -> `realtime.typing_ttl_ms = 5000`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("HUDDLE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.realtime.validate()?;
        self.history.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("HUDDLE__AUTH__JWT_SECRET", "test-secret");
    }

    fn clear_env() {
        for key in [
            "HUDDLE__AUTH__JWT_SECRET",
            "HUDDLE__AUTH__JWT_ISSUER",
            "HUDDLE__SERVER__PORT",
            "HUDDLE__SERVER__ENVIRONMENT",
            "HUDDLE__REALTIME__TYPING_TTL_MS",
            "HUDDLE__HISTORY__PAGE_SIZE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("HUDDLE__AUTH__JWT_ISSUER", "huddle-auth");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.auth.jwt_secret.expose_secret(), "test-secret");
        assert_eq!(config.auth.jwt_issuer.as_deref(), Some("huddle-auth"));
    }

    #[test]
    fn test_missing_secret_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_defaults_validate() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.realtime.heartbeat_interval_secs, 15);
        assert_eq!(config.history.page_size, 50);
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("HUDDLE__SERVER__PORT", "3000");
        env::set_var("HUDDLE__REALTIME__TYPING_TTL_MS", "8000");
        env::set_var("HUDDLE__HISTORY__PAGE_SIZE", "100");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.realtime.typing_ttl_ms, 8000);
        assert_eq!(config.history.page_size, 100);
    }

    #[test]
    fn test_production_rejects_short_secret() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("HUDDLE__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert_eq!(config.validate(), Err(ValidationError::WeakJwtSecret));
    }
}
