//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **struct**: Custom data types that group related fields together
//! - **impl blocks**: Add methods to structs
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_ENGINE_HTTP_URL, JWT_SECRET, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, auth, engine, audio,
/// performance) makes it easier to understand and maintain as the relay grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
    pub audio: AudioConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
/// - `port = 8080`: Common development port (production often uses 80 or 443)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// Credential verification settings for long-lived connections.
///
/// ## Fields:
/// - `jwt_secret`: HS256 shared secret. Must match the secret the identity
///   provider signs session tokens with. Overridable via the JWT_SECRET
///   environment variable so the secret never has to live in config.toml.
/// - `cookie_name`: Cookie the browser presents the token in ("token" in the
///   reference deployment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub cookie_name: String,
}

/// AI engine endpoint settings.
///
/// ## Fields:
/// - `http_url`: Base URL for the engine's request/response endpoints
///   (the relay calls `POST {http_url}/interview/next`).
/// - `ws_url`: Base URL for the engine's streaming endpoint
///   (the relay dials `{ws_url}/ws/voice/{session_id}`).
/// - `request_timeout_ms`: Bounded wait for a text-endpoint reply. A call
///   that exceeds this is treated as an engine failure so a session can
///   never deadlock waiting on the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub http_url: String,
    pub ws_url: String,
    pub request_timeout_ms: u64,
}

/// Audio format settings shared by the relay and the voice client.
///
/// ## Format:
/// Linear 16-bit signed little-endian PCM, mono, 48kHz. Each WebSocket
/// binary message is exactly one frame; the transport delimits frames so no
/// length header is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    /// Samples per capture block (one outbound frame)
    pub frame_samples: usize,
    /// Outbound capture frames buffered before the capture callback starts dropping
    pub capture_queue_frames: usize,
}

/// Performance tuning configuration.
///
/// ## Tuning guidelines:
/// - Higher concurrent sessions: More candidates, but requires more memory
/// - Longer idle timeout: Reconnects resume further back, but idle
///   transcripts occupy memory longer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,  // usize = platform-specific unsigned integer (usually 64-bit)
    pub session_idle_timeout_secs: u64,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,                     // Common development port
            },
            auth: AuthConfig {
                jwt_secret: String::new(),          // Must come from JWT_SECRET or config.toml
                cookie_name: "token".to_string(),   // Cookie set by the identity provider
            },
            engine: EngineConfig {
                http_url: "http://127.0.0.1:8000".to_string(),
                ws_url: "ws://127.0.0.1:8000".to_string(),
                request_timeout_ms: 15_000,     // Bounded wait on the text endpoint
            },
            audio: AudioConfig {
                sample_rate: 48_000,    // 48kHz - the reference client's rate
                channels: 1,            // Mono audio
                bit_depth: 16,          // 16-bit PCM
                frame_samples: 4096,    // One capture block per frame
                capture_queue_frames: 32,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 100,      // Live interviews are cheap to hold in memory
                session_idle_timeout_secs: 7200,   // 2 hours, longer than any interview
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and JWT_SECRET
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_ENGINE_HTTP_URL=http://ai:8000`: Override engine base URL
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    /// - `JWT_SECRET=...`: Special case so the signing secret stays out of files
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_SERVER_HOST becomes server.host in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Handle special environment variables used by deployment platforms
        // These don't follow the APP_ prefix convention but are commonly used
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // The identity provider and the relay must agree on this secret
        if let Ok(secret) = env::var("JWT_SECRET") {
            settings = settings.set_override("auth.jwt_secret", secret)?;
        }

        // Build the final configuration and convert it back to our AppConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be used)
    /// - The JWT secret is present (connections can't be admitted without it)
    /// - Engine URLs are present and the request timeout is non-zero
    /// - Audio format matches what the wire protocol assumes (16-bit mono)
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(anyhow::anyhow!(
                "JWT secret is not set (set JWT_SECRET or auth.jwt_secret)"
            ));
        }

        if self.engine.http_url.is_empty() || self.engine.ws_url.is_empty() {
            return Err(anyhow::anyhow!("Engine URLs cannot be empty"));
        }

        if self.engine.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Engine request timeout must be greater than 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels != 1 {
            return Err(anyhow::anyhow!("Only mono audio is supported"));
        }

        if self.audio.bit_depth != 16 {
            return Err(anyhow::anyhow!("Only 16-bit PCM is supported"));
        }

        if self.audio.frame_samples == 0 {
            return Err(anyhow::anyhow!("Audio frame size must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// This method allows updating only some fields, not the entire configuration.
    /// For example, you can send just `{"engine": {"request_timeout_ms": 5000}}`
    /// to tighten the engine deadline. The JWT secret is deliberately not
    /// updatable at runtime: live connections were admitted under the current
    /// secret and a silent swap would strand them.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        // Parse the JSON string into a generic value
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        // Update server configuration if provided
        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;  // Convert u64 to u16 for port number
            }
        }

        // Update engine configuration if provided
        if let Some(engine) = partial_config.get("engine") {
            if let Some(http_url) = engine.get("http_url").and_then(|v| v.as_str()) {
                self.engine.http_url = http_url.to_string();
            }
            if let Some(ws_url) = engine.get("ws_url").and_then(|v| v.as_str()) {
                self.engine.ws_url = ws_url.to_string();
            }
            if let Some(timeout) = engine.get("request_timeout_ms").and_then(|v| v.as_u64()) {
                self.engine.request_timeout_ms = timeout;
            }
        }

        // Update performance configuration if provided
        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
            if let Some(idle) = performance.get("session_idle_timeout_secs").and_then(|v| v.as_u64()) {
                self.performance.session_idle_timeout_secs = idle;
            }
        }

        // Validate the updated configuration to ensure it's still valid
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;  // Import everything from the parent module

    fn config_with_secret() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "test-secret".to_string();
        config
    }

    /// Test that the default configuration has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.sample_rate, 48_000);
        // Defaults carry no secret, so validation must refuse to start
        assert!(config.validate().is_err());
        assert!(config_with_secret().validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = config_with_secret();
        config.server.port = 0;  // Invalid port
        // Validation should fail for port 0
        assert!(config.validate().is_err());

        let mut config = config_with_secret();
        config.audio.channels = 2;  // Stereo is not part of the wire format
        assert!(config.validate().is_err());

        let mut config = config_with_secret();
        config.engine.request_timeout_ms = 0;  // Would allow an unbounded wait
        assert!(config.validate().is_err());
    }

    /// Test that runtime configuration updates work correctly.
    #[test]
    fn test_config_update() {
        let mut config = config_with_secret();
        let json = r#"{"engine": {"request_timeout_ms": 5000}}"#;  // Update only the deadline
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.engine.request_timeout_ms, 5000);  // Deadline should be updated
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.engine.http_url, "http://127.0.0.1:8000");
    }

    /// Updates that would produce an unusable configuration are rejected whole.
    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = config_with_secret();
        let json = r#"{"engine": {"request_timeout_ms": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
