//! Debug-mode detection
//!
//! Debug mode lets a client talk to an agent over plaintext without
//! certificates or tokens. It is only ever enabled explicitly, either through
//! the environment or through the client configuration.

use std::env;

/// Environment variable that turns debug mode on when set to `on`
pub const DEBUG_MODE_ENV: &str = "AGENTLINK_DEBUG_MODE";

/// Returns true when the environment or `config_flag` enables debug mode
pub fn is_debug_enabled(config_flag: bool) -> bool {
    env_enables(DEBUG_MODE_ENV) || config_flag
}

fn env_enables(var: &str) -> bool {
    env::var(var)
        .map(|value| value.trim().eq_ignore_ascii_case("on"))
        .unwrap_or(false)
}

/// Debug-mode switch carried by a connection cache.
///
/// The environment is read again on every call, so toggling the variable is
/// picked up by the next dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMode {
    env_var: String,
    config_flag: bool,
}

impl DebugMode {
    pub fn new(config_flag: bool) -> Self {
        Self {
            env_var: DEBUG_MODE_ENV.to_string(),
            config_flag,
        }
    }

    /// Read the toggle from a different environment variable
    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = env_var.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        env_enables(&self.env_var) || self.config_flag
    }
}

impl Default for DebugMode {
    fn default() -> Self {
        Self::new(false)
    }
}
