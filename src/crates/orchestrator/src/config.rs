//! Orchestrator configuration
//!
//! All recognized options with their defaults:
//!
//! | Option | Default | Effect |
//! |---|---|---|
//! | `turn_timeout_ms` | 60 000 | Max wall time for a single turn |
//! | `node_timeout_ms` | 15 000 | Default per-node deadline |
//! | `grace_ms` | 2 000 | Cancellation grace window |
//! | `history_depth` | 32 | Snapshots retained per session |
//! | `broadcast_buffer` | 256 | Subscriber queue capacity |
//! | `broadcast_history` | 100 | Events retained per session for replay |
//! | `session_ttl_ms` | 1 800 000 | Idle TTL before sweep |
//! | `sweep_interval_ms` | 60 000 | How often the sweeper runs |
//! | `intent_confidence_floor` | 0.30 | Below this, route to smalltalk |
//! | `default_privilege` | `standard` | Privilege assumed for registrations |
//!
//! Configuration loads from a TOML file and can be overridden per-field with
//! `AGENTGRAPH_*` environment variables (e.g. `AGENTGRAPH_TURN_TIMEOUT_MS`).

use crate::error::{OrchestratorError, Result};
use agentgraph_core::{Privilege, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete orchestrator configuration; see the [module docs](self) for the
/// option table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub turn_timeout_ms: u64,
    pub node_timeout_ms: u64,
    pub grace_ms: u64,
    pub history_depth: usize,
    pub broadcast_buffer: usize,
    pub broadcast_history: usize,
    pub session_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub intent_confidence_floor: f64,
    pub default_privilege: Privilege,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_timeout_ms: 60_000,
            node_timeout_ms: 15_000,
            grace_ms: 2_000,
            history_depth: 32,
            broadcast_buffer: 256,
            broadcast_history: 100,
            session_ttl_ms: 30 * 60 * 1000,
            sweep_interval_ms: 60_000,
            intent_confidence_floor: 0.30,
            default_privilege: Privilege::Standard,
        }
    }
}

impl OrchestratorConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!("failed to read {path:?}: {e}"))
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            OrchestratorError::Configuration(format!("failed to parse {path:?}: {e}"))
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `AGENTGRAPH_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        override_u64("AGENTGRAPH_TURN_TIMEOUT_MS", &mut self.turn_timeout_ms);
        override_u64("AGENTGRAPH_NODE_TIMEOUT_MS", &mut self.node_timeout_ms);
        override_u64("AGENTGRAPH_GRACE_MS", &mut self.grace_ms);
        override_usize("AGENTGRAPH_HISTORY_DEPTH", &mut self.history_depth);
        override_usize("AGENTGRAPH_BROADCAST_BUFFER", &mut self.broadcast_buffer);
        override_usize("AGENTGRAPH_BROADCAST_HISTORY", &mut self.broadcast_history);
        override_u64("AGENTGRAPH_SESSION_TTL_MS", &mut self.session_ttl_ms);
        override_u64("AGENTGRAPH_SWEEP_INTERVAL_MS", &mut self.sweep_interval_ms);
        if let Some(floor) = read_env("AGENTGRAPH_INTENT_CONFIDENCE_FLOOR") {
            if let Ok(value) = floor.parse::<f64>() {
                self.intent_confidence_floor = value;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.intent_confidence_floor) {
            return Err(OrchestratorError::Configuration(format!(
                "intent_confidence_floor {} outside [0, 1]",
                self.intent_confidence_floor
            )));
        }
        if self.history_depth == 0 || self.broadcast_buffer == 0 {
            return Err(OrchestratorError::Configuration(
                "history_depth and broadcast_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The subset the core runtime consumes
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            turn_timeout_ms: self.turn_timeout_ms,
            node_timeout_ms: self.node_timeout_ms,
            grace_ms: self.grace_ms,
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.session_ttl_ms as i64)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn override_u64(key: &str, slot: &mut u64) {
    if let Some(value) = read_env(key).and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}

fn override_usize(key: &str, slot: &mut usize) {
    if let Some(value) = read_env(key).and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}
