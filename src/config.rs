//! Process-wide configuration, collected from environment variables once
//! at startup into a single typed struct.

use crate::error::CoreError;
use crate::mail::GatewayKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub mail_user: String,
    pub mail_subject_pattern: String,
    pub mail_transport: GatewayKind,
    pub processed_marker: String,
    pub attachments_folder_id: String,
    pub db_dsn: String,
    pub cache_provider: CacheProvider,
    pub cache_ttl_minutes: u64,
    pub branch_id: String,
    pub allowed_branches: Vec<String>,
    pub upcoming_window_days: i64,
    pub log_file_path: Option<String>,

    pub mail_oauth_base_url: String,
    pub mail_oauth_access_token: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_username: String,
    pub imap_password: String,
    pub object_store_base_url: String,
    pub object_store_access_token: String,
    pub cache_remote_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProvider {
    Memory,
    Remote,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        let branch_id = require_env("BRANCH_ID")?;
        let allowed_branches: Vec<String> = std::env::var("ALLOWED_BRANCHES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if !allowed_branches.is_empty() && !allowed_branches.contains(&branch_id) {
            return Err(CoreError::ConfigInvalid(format!(
                "BRANCH_ID {branch_id} is not a member of ALLOWED_BRANCHES"
            )));
        }

        let cache_provider = match std::env::var("CACHE_PROVIDER").as_deref() {
            Ok("remote") => CacheProvider::Remote,
            _ => CacheProvider::Memory,
        };

        Ok(Self {
            mail_user: require_env("MAIL_USER")?,
            mail_subject_pattern: require_env("MAIL_SUBJECT_PATTERN")?,
            mail_transport: GatewayKind::from_env_str(
                &std::env::var("MAIL_TRANSPORT").unwrap_or_default(),
            ),
            processed_marker: std::env::var("PROCESSED_MARKER").unwrap_or_else(|_| "Processed".to_string()),
            attachments_folder_id: require_env("ATTACHMENTS_FOLDER_ID")?,
            db_dsn: require_env("DB_DSN")?,
            cache_provider,
            cache_ttl_minutes: std::env::var("CACHE_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            branch_id,
            allowed_branches,
            upcoming_window_days: std::env::var("UPCOMING_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),

            mail_oauth_base_url: std::env::var("MAIL_OAUTH_BASE_URL").unwrap_or_default(),
            mail_oauth_access_token: std::env::var("MAIL_OAUTH_ACCESS_TOKEN").unwrap_or_default(),
            imap_host: std::env::var("IMAP_HOST").unwrap_or_default(),
            imap_port: std::env::var("IMAP_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(993),
            imap_username: std::env::var("IMAP_USERNAME").unwrap_or_default(),
            imap_password: std::env::var("IMAP_PASSWORD").unwrap_or_default(),
            object_store_base_url: std::env::var("OBJECT_STORE_BASE_URL").unwrap_or_default(),
            object_store_access_token: std::env::var("OBJECT_STORE_ACCESS_TOKEN").unwrap_or_default(),
            cache_remote_base_url: std::env::var("CACHE_REMOTE_BASE_URL").unwrap_or_default(),
        })
    }
}

fn require_env(key: &str) -> Result<String, CoreError> {
    std::env::var(key).map_err(|_| CoreError::ConfigInvalid(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn branch_id_must_be_allowed_when_allow_list_is_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("BRANCH_ID", "norte");
        std::env::set_var("ALLOWED_BRANCHES", "centro,sur");
        std::env::set_var("MAIL_USER", "m");
        std::env::set_var("MAIL_SUBJECT_PATTERN", "p");
        std::env::set_var("ATTACHMENTS_FOLDER_ID", "f");
        std::env::set_var("DB_DSN", "postgres://x");

        let result = Config::from_env();
        assert!(result.is_err());

        std::env::remove_var("BRANCH_ID");
        std::env::remove_var("ALLOWED_BRANCHES");
        std::env::remove_var("MAIL_USER");
        std::env::remove_var("MAIL_SUBJECT_PATTERN");
        std::env::remove_var("ATTACHMENTS_FOLDER_ID");
        std::env::remove_var("DB_DSN");
    }
}
