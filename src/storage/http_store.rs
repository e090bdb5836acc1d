//! Generic REST-backed `ObjectStore`.
//!
//! Folder/file shapes mirror the minimal metadata the system needs
//! (id, name, size, links) rather than any one provider's full schema.

use crate::error::CoreError;
use crate::models::StoredFile;
use crate::normalize::resolve_collision;
use crate::retry::with_backoff;
use crate::storage::{FolderEntry, ObjectStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpObjectStore {
    pub fn new(base_url: String, access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[derive(Serialize)]
struct EnsureFolderRequest<'a> {
    parent_id: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct FolderResponse {
    folder_id: String,
}

#[derive(Deserialize)]
struct FileListResponse {
    files: Vec<FileEntryResponse>,
}

#[derive(Deserialize)]
struct FileEntryResponse {
    id: String,
    name: String,
    size: u64,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
    name: String,
    view_link: String,
    download_link: String,
    sha256: Option<String>,
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String, CoreError> {
        let url = self.url("folders/ensure");
        let body = EnsureFolderRequest { parent_id, name };

        let response: FolderResponse = with_backoff(|| async {
            self.http
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await
                .map_err(|_| CoreError::DriveFolderMissing)
                .and_then(|r| if r.status().is_success() { Ok(r) } else { Err(CoreError::DriveFolderMissing) })
        })
        .await?
        .json()
        .await
        .map_err(|_| CoreError::DriveFolderMissing)?;

        Ok(response.folder_id)
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredFile, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::DriveAttachmentWithoutData);
        }

        let existing = self.list_folder_files(folder_id).await?;
        let now_millis = chrono::Utc::now().timestamp_millis();
        let final_name = resolve_collision(name, now_millis, |candidate| {
            existing.iter().any(|f| f.name == candidate)
        });

        let expected_hash = format!("{:x}", Sha256::digest(bytes));

        let url = self.url(&format!("folders/{folder_id}/files"));
        let response: UploadResponse = with_backoff(|| async {
            self.http
                .post(&url)
                .bearer_auth(&self.access_token)
                .query(&[("name", final_name.as_str()), ("content_type", content_type)])
                .body(bytes.to_vec())
                .send()
                .await
                .map_err(|e| CoreError::DriveUploadFailed(e.to_string()))
                .and_then(|r| {
                    if r.status().is_success() {
                        Ok(r)
                    } else if r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        Err(CoreError::DriveUploadFailed("quota exhausted".to_string()))
                    } else {
                        Err(CoreError::DriveUploadFailed(r.status().to_string()))
                    }
                })
        })
        .await?
        .json()
        .await
        .map_err(|e| CoreError::DriveUploadFailed(e.to_string()))?;

        if let Some(actual) = &response.sha256 {
            if actual != &expected_hash {
                return Err(CoreError::DriveUploadFailed(
                    "integrity confirmation mismatch".to_string(),
                ));
            }
        }

        Ok(StoredFile {
            id: response.id,
            name: response.name,
            folder_id: folder_id.to_string(),
            view_link: response.view_link,
            download_link: response.download_link,
        })
    }

    async fn list_folder_files(&self, folder_id: &str) -> Result<Vec<FolderEntry>, CoreError> {
        let url = self.url(&format!("folders/{folder_id}/files"));

        let response: FileListResponse = with_backoff(|| async {
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| CoreError::DriveListingFailed(e.to_string()))
                .and_then(|r| if r.status().is_success() { Ok(r) } else { Err(CoreError::DriveListingFailed(r.status().to_string())) })
        })
        .await?
        .json()
        .await
        .map_err(|e| CoreError::DriveListingFailed(e.to_string()))?;

        Ok(response
            .files
            .into_iter()
            .map(|f| FolderEntry {
                id: f.id,
                name: f.name,
                size: f.size,
            })
            .collect())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, CoreError> {
        let url = self.url(&format!("files/{file_id}/content"));

        let bytes = with_backoff(|| async {
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| CoreError::DriveDownloadFailed(e.to_string()))
                .and_then(|r| if r.status().is_success() { Ok(r) } else { Err(CoreError::DriveDownloadFailed(r.status().to_string())) })
        })
        .await?
        .bytes()
        .await
        .map_err(|e| CoreError::DriveDownloadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_builds_urls_without_double_slashes() {
        let store = HttpObjectStore::new("https://files.example.com/".to_string(), "token".to_string());
        assert_eq!(store.url("folders/ensure"), "https://files.example.com/folders/ensure");
    }
}
