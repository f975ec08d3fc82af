//! User settings document
//!
//! Stored as `settings.json` in the Drive root and optionally cached on
//! local disk. Every field has a serde default so older documents load.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Result;
use crate::file::FileStore;
use crate::paths::SETTINGS_FILE;

/// Key of the RAG setting that push-time registration writes into
pub const DEFAULT_RAG_STORE_KEY: &str = "gemihub";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiPlan {
    #[default]
    Paid,
    Free,
}

impl ApiPlan {
    /// Model used when neither the node nor the session picks one
    pub fn default_model(&self) -> &'static str {
        match self {
            ApiPlan::Paid => "gemini-2.5-pro",
            ApiPlan::Free => "gemini-2.5-flash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RagFileStatus {
    Registered,
    Pending,
}

/// Registration state of one file inside a RAG store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagFileInfo {
    pub checksum: String,
    /// Milliseconds since the Unix epoch
    pub uploaded_at: i64,
    pub file_id: Option<String>,
    pub status: RagFileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagSetting {
    pub store_id: Option<String>,
    pub store_name: Option<String>,
    pub store_ids: Vec<String>,
    pub is_external: bool,
    pub target_folders: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// File name -> registration state
    pub files: HashMap<String, RagFileInfo>,
}

impl RagSetting {
    /// Store ids to ground a model on
    pub fn grounding_store_ids(&self) -> Vec<String> {
        if self.is_external {
            return self.store_ids.clone();
        }
        self.store_id.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.files
            .values()
            .filter(|f| f.status == RagFileStatus::Pending)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub api_plan: ApiPlan,
    pub selected_model: Option<String>,
    pub system_prompt: Option<String>,
    pub rag_enabled: bool,
    pub rag_top_k: u32,
    pub rag_settings: HashMap<String, RagSetting>,
    pub selected_rag_setting: Option<String>,
    pub rag_registration_on_push: bool,
    pub mcp_servers: Vec<McpServerConfig>,
    pub max_function_calls: u32,
    pub function_call_warning_threshold: u32,
    pub sync_exclude_patterns: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            api_plan: ApiPlan::Paid,
            selected_model: None,
            system_prompt: None,
            rag_enabled: false,
            rag_top_k: 5,
            rag_settings: HashMap::new(),
            selected_rag_setting: None,
            rag_registration_on_push: false,
            mcp_servers: Vec::new(),
            max_function_calls: 20,
            function_call_warning_threshold: 5,
            sync_exclude_patterns: Vec::new(),
        }
    }
}

impl UserSettings {
    /// Load settings from a local directory, falling back to defaults
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !fs::try_exists(&path).await? {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save settings into a local directory
    pub async fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(SETTINGS_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?).await?;
        log::info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Load `settings.json` from the Drive root
    pub async fn load_from_drive(store: &dyn FileStore) -> Result<Self> {
        let Some(file) = store.find_by_exact_name(SETTINGS_FILE, None).await? else {
            return Ok(Self::default());
        };
        let contents = store.read_text(&file.id).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write `settings.json` to the Drive root
    pub async fn save_to_drive(&self, store: &dyn FileStore) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        match store.find_by_exact_name(SETTINGS_FILE, None).await? {
            Some(file) => {
                store
                    .update(&file.id, contents.as_bytes(), "application/json")
                    .await?;
            }
            None => {
                store
                    .create(
                        SETTINGS_FILE,
                        contents.as_bytes(),
                        store.root_folder_id(),
                        "application/json",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Enabled MCP servers whose names are listed
    pub fn mcp_servers_named(&self, names: &[&str]) -> Vec<&McpServerConfig> {
        self.mcp_servers
            .iter()
            .filter(|s| s.enabled && names.contains(&s.name.as_str()))
            .collect()
    }
}
