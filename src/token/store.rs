use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer credential identifying a bot frontend that may query the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceToken {
    pub token: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl ServiceToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() > exp).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokensFile {
    tokens: Vec<ServiceToken>,
}

/// File-backed token registry. Guard state is deliberately memory-only;
/// tokens are credentials and must survive a restart, so every mutation is
/// written straight back to disk.
pub struct ServiceTokenStore {
    file_path: PathBuf,
    tokens: Vec<ServiceToken>,
}

impl ServiceTokenStore {
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        let tokens = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let file: TokensFile = serde_json::from_str(&content)?;
            file.tokens
        } else {
            Vec::new()
        };

        Ok(ServiceTokenStore {
            file_path: path.to_path_buf(),
            tokens,
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let file = TokensFile {
            tokens: self.tokens.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.file_path, content)?;
        Ok(())
    }

    pub fn authorize(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.token == token && t.is_active())
    }

    pub fn issue(
        &mut self,
        label: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ServiceToken> {
        let token = ServiceToken {
            token: uuid::Uuid::new_v4().to_string(),
            label,
            created_at: Utc::now(),
            expires_at,
            revoked: false,
        };
        self.tokens.push(token.clone());
        self.save()?;
        Ok(token)
    }

    pub fn revoke(&mut self, token: &str) -> anyhow::Result<bool> {
        match self.tokens.iter_mut().find(|t| t.token == token) {
            Some(entry) => {
                entry.revoked = true;
                self.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn list(&self) -> &[ServiceToken] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::NamedTempFile;

    use super::*;

    fn temp_path() -> PathBuf {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        drop(file);
        path
    }

    #[test]
    fn test_load_or_create_empty() {
        let path = temp_path();
        let store = ServiceTokenStore::load_or_create(&path).unwrap();
        assert!(store.list().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_issue_and_authorize() {
        let path = temp_path();
        let mut store = ServiceTokenStore::load_or_create(&path).unwrap();
        let token = store.issue("phone-bot".to_string(), None).unwrap();
        assert!(store.authorize(&token.token));
        assert!(!store.authorize("nonexistent"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_revoked_token_rejected() {
        let path = temp_path();
        let mut store = ServiceTokenStore::load_or_create(&path).unwrap();
        let token = store.issue("phone-bot".to_string(), None).unwrap();
        assert!(store.revoke(&token.token).unwrap());
        assert!(!store.authorize(&token.token));
        assert!(!store.revoke("nonexistent").unwrap());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_expired_token_rejected() {
        let path = temp_path();
        let mut store = ServiceTokenStore::load_or_create(&path).unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        let token = store.issue("stale".to_string(), Some(past)).unwrap();
        assert!(!store.authorize(&token.token));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_tokens_survive_reload() {
        let path = temp_path();
        let value;
        {
            let mut store = ServiceTokenStore::load_or_create(&path).unwrap();
            value = store.issue("persistent".to_string(), None).unwrap().token;
        }
        let reloaded = ServiceTokenStore::load_or_create(&path).unwrap();
        assert!(reloaded.authorize(&value));
        let _ = fs::remove_file(&path);
    }
}
