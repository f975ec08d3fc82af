//! Engine configuration
//!
//! Loaded from `engine.json` in the application data directory. Missing
//! fields take their defaults so older files keep loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Result;

const CONFIG_FILE: &str = "engine.json";

fn default_max_node_visits() -> u32 {
    1000
}

fn default_terminal_ttl_secs() -> u64 {
    5 * 60
}

fn default_mcp_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Node visits allowed in one run before it is failed as a runaway loop
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: u32,
    /// How long a finished execution stays available for reconnecting clients
    #[serde(default = "default_terminal_ttl_secs")]
    pub terminal_ttl_secs: u64,
    /// Per-request timeout for MCP servers
    #[serde(default = "default_mcp_timeout_secs")]
    pub mcp_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_node_visits: default_max_node_visits(),
            terminal_ttl_secs: default_terminal_ttl_secs(),
            mcp_timeout_secs: default_mcp_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn terminal_ttl(&self) -> Duration {
        Duration::from_secs(self.terminal_ttl_secs)
    }

    pub fn mcp_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_timeout_secs)
    }

    /// Load configuration from disk
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !fs::try_exists(&path).await? {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save configuration to disk
    pub async fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?).await?;
        log::info!("Engine configuration saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_node_visits, 1000);
        assert_eq!(config.terminal_ttl(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_round_trip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            max_node_visits: 10,
            ..EngineConfig::default()
        };
        config.save(dir.path()).await.unwrap();
        assert_eq!(EngineConfig::load(dir.path()).await.unwrap(), config);

        tokio::fs::write(dir.path().join(CONFIG_FILE), r#"{"mcpTimeoutSecs": 5}"#)
            .await
            .unwrap();
        let partial = EngineConfig::load(dir.path()).await.unwrap();
        assert_eq!(partial.mcp_timeout(), Duration::from_secs(5));
        assert_eq!(partial.max_node_visits, 1000);
    }
}
