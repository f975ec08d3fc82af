//! File store collaborator interface
//!
//! User files live flat in a single root folder; their names may contain
//! `/` to express a virtual path (`notes/today.md`). Sub-folders of the
//! root hold history, trash and conflict backups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Metadata of a stored file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
}

/// Narrow interface over the cloud file store
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Id of the workspace root folder
    fn root_folder_id(&self) -> &str;

    /// Metadata for a file id, `None` if it does not exist
    async fn get(&self, file_id: &str) -> Result<Option<DriveFile>>;

    /// Raw content
    async fn read(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Content decoded as UTF-8
    async fn read_text(&self, file_id: &str) -> Result<String> {
        let bytes = self.read(file_id).await?;
        String::from_utf8(bytes).map_err(|_| StoreError::NotText(file_id.to_string()))
    }

    async fn create(
        &self,
        name: &str,
        content: &[u8],
        parent_id: &str,
        mime_type: &str,
    ) -> Result<DriveFile>;

    async fn update(&self, file_id: &str, content: &[u8], mime_type: &str) -> Result<DriveFile>;

    /// Files in `parent_id` whose name contains `query`
    async fn search(&self, parent_id: &str, query: &str) -> Result<Vec<DriveFile>>;

    /// File whose name equals `name` exactly, within `parent_id` or the root
    async fn find_by_exact_name(&self, name: &str, parent_id: Option<&str>) -> Result<Option<DriveFile>>;

    /// Files (not folders) directly inside `parent_id`
    async fn list(&self, parent_id: &str) -> Result<Vec<DriveFile>>;

    /// Id of the named sub-folder, created when missing
    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String>;

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> Result<DriveFile>;

    async fn rename(&self, file_id: &str, new_name: &str) -> Result<DriveFile>;

    /// Soft delete: move the file into the trash folder
    async fn delete(&self, file_id: &str) -> Result<()>;
}
