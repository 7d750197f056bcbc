//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Default quiescence window before an outgoing update is sent (ms).
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default key under which the delta is spliced into the block payload.
pub const DEFAULT_CONTENT_KEY: &str = "delta";

/// What to do with a pending outgoing update when the session closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Discard it and log.
    #[default]
    Drop,
    /// Send it immediately.
    Flush,
}

/// Configuration for a block editing session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Trailing-edge debounce window for outgoing updates, in ms.
    pub debounce_ms: u64,
    /// Fate of a pending update on teardown.
    pub teardown: TeardownPolicy,
    /// Payload key the delta is written under.
    pub content_key: SmolStr,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            teardown: TeardownPolicy::Drop,
            content_key: SmolStr::new_static(DEFAULT_CONTENT_KEY),
        }
    }
}

impl SyncConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// - `BLOCKTEXT_DEBOUNCE_MS`: debounce window in milliseconds
    /// - `BLOCKTEXT_TEARDOWN`: `drop` or `flush`
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = var("BLOCKTEXT_DEBOUNCE_MS") {
            match raw.trim().parse() {
                Ok(ms) => config.debounce_ms = ms,
                Err(_) => {
                    tracing::warn!(value = %raw, "invalid BLOCKTEXT_DEBOUNCE_MS, keeping default")
                }
            }
        }
        match var("BLOCKTEXT_TEARDOWN").as_deref().map(str::trim) {
            Some("flush") => config.teardown = TeardownPolicy::Flush,
            Some("drop") | None => {}
            Some(other) => {
                tracing::warn!(value = other, "unknown BLOCKTEXT_TEARDOWN, keeping default")
            }
        }
        config
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_ms = window.as_millis() as u64;
        self
    }

    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn with_content_key(mut self, key: impl Into<SmolStr>) -> Self {
        self.content_key = key.into();
        self
    }
}
