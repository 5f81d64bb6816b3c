//! Configuration loading (spec.md §6 "Configuration"/"Environment variables"):
//! a `HostConfig` loaded from a JSON file, layered with environment-variable
//! overrides for everything the file doesn't cover.
//!
//! Grounded on the teacher's config-loading convention across its server
//! crates: read the file, fall back to `Default` with a `tracing::warn!` on
//! any error, then let environment variables override individual fields.

use std::env;
use std::path::Path;

use mcphost_types::HostConfig;

/// Full runtime configuration: the MCP-facing `HostConfig` plus the bridge's
/// network/session/auth knobs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: HostConfig,
    pub mcp_path: String,
    pub port: u16,
    pub session_idle_ttl_ms: u64,
    pub sampling_timeout_ms: u64,
    pub api_keys: Vec<String>,
    pub auth_required_override: Option<bool>,
}

impl AppConfig {
    /// Loads `HostConfig` from `path`, falling back to
    /// `HostConfig::default()` with a warning on any read or parse error,
    /// then layers environment variable overrides on top.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let host = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse config file, using defaults");
                HostConfig::default()
            }),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read config file, using defaults");
                HostConfig::default()
            }
        };

        Self {
            host,
            mcp_path: env::var("MCPHOST_MCP_PATH").unwrap_or_else(|_| "/mcp".to_string()),
            port: env_parsed("MCPHOST_PORT", 3000),
            session_idle_ttl_ms: env_parsed("MCPHOST_SESSION_IDLE_TTL_MS", 3_600_000),
            // spec.md §6 documents this env var's own default as 30000 ms,
            // which conflicts with the Sampling Broker's documented default
            // deadline of 300 s (§4.2). Resolved in DESIGN.md: this layer's
            // fallback tracks the broker's default rather than re-deriving
            // a second, shorter one.
            sampling_timeout_ms: env_parsed("MCPHOST_SAMPLING_TIMEOUT_MS", 300_000),
            api_keys: env::var("MCPHOST_API_KEYS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            auth_required_override: env::var("MCPHOST_AUTH_REQUIRED")
                .ok()
                .and_then(|v| v.parse::<bool>().ok()),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/mcphost-test-config.json"));
        assert_eq!(config.mcp_path, "/mcp");
        assert_eq!(config.port, 3000);
        assert!(config.host.servers.is_empty());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_with_warning() {
        let dir = std::env::temp_dir().join("mcphost-config-test-malformed.json");
        std::fs::write(&dir, "not json").unwrap();
        let config = AppConfig::load(&dir);
        assert!(config.host.servers.is_empty());
        let _ = std::fs::remove_file(&dir);
    }
}
