//! Object-store adapter (C5): per-generation folders, collision-safe
//! uploads, listing for the sync engine.
//!
//! The concrete provider SDK is out of scope per spec.md §1; `http_store`
//! speaks a generic REST surface against a configurable `base_url`, the same
//! shape the mail gateway's OAuth variant uses.

pub mod http_store;

use crate::error::CoreError;
use crate::models::StoredFile;
use async_trait::async_trait;

/// A file entry as returned by `list_folder_files`, ahead of download.
#[derive(Debug, Clone)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    pub size: u64,
}

/// The capability set the object store provides to C5/C6.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Ensure a folder named `name` exists under `parent_id`, returning its
    /// id. Concurrent calls with the same `(parent_id, name)` converge to
    /// the same id.
    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String, CoreError>;

    /// Upload `bytes` into `folder_id` under a collision-free derivative of
    /// `name`, returning the stored identifiers and links.
    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredFile, CoreError>;

    /// List the files in `folder_id`. Ordering is provider-native; callers
    /// that need deterministic order must sort client-side.
    async fn list_folder_files(&self, folder_id: &str) -> Result<Vec<FolderEntry>, CoreError>;

    /// Download a single file's bytes by id.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, CoreError>;
}

/// Selects which concrete `ObjectStore` variant to construct. The source
/// system speaks to a single cloud provider; this enum exists for the same
/// reason `GatewayKind` does, even though only one variant is implemented
/// today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Http,
}
