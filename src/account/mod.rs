//! User profile cache
//!
//! The account store is remote and reached through an [`AccountClient`].
//! Screens share one [`ProfileCache`] that the shell owns and injects: the
//! profile is fetched on first use and only fetched again on an explicit
//! refresh or after invalidation (e.g. sign-out).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Account store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Request failed: {0}")]
    Request(String),
}

/// Profile of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub water_account: Option<String>,
    pub electricity_account: Option<String>,
}

/// Request/response access to the remote account store
#[async_trait]
pub trait AccountClient: Send + Sync {
    async fn fetch_profile(&self) -> Result<UserProfile, AccountError>;
}

/// Account client reading a profile document from disk
///
/// Used by the desktop shell, where the signed-in profile is synced to a local
/// file. A missing file means nobody is signed in.
pub struct JsonAccountClient {
    path: PathBuf,
}

impl JsonAccountClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AccountClient for JsonAccountClient {
    async fn fetch_profile(&self) -> Result<UserProfile, AccountError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AccountError::Unauthenticated)
            }
            Err(e) => return Err(AccountError::Request(e.to_string())),
        };
        serde_json::from_str(&contents).map_err(|e| AccountError::Request(e.to_string()))
    }
}

pub struct ProfileCache {
    client: Arc<dyn AccountClient>,
    cached: Mutex<Option<Arc<UserProfile>>>,
}

impl ProfileCache {
    pub fn new(client: Arc<dyn AccountClient>) -> Self {
        Self {
            client,
            cached: Mutex::new(None),
        }
    }

    /// Cached profile, fetching it on first use
    ///
    /// Concurrent callers wait for the same fetch rather than issuing their own.
    pub async fn get(&self) -> Result<Arc<UserProfile>, AccountError> {
        let mut guard = self.cached.lock().await;
        if let Some(profile) = guard.as_ref() {
            return Ok(profile.clone());
        }

        let profile = Arc::new(self.client.fetch_profile().await?);
        tracing::debug!("Fetched profile for {}", profile.id);
        *guard = Some(profile.clone());
        Ok(profile)
    }

    /// Fetch the profile again. The old value is kept if the fetch fails.
    pub async fn refresh(&self) -> Result<Arc<UserProfile>, AccountError> {
        let mut guard = self.cached.lock().await;
        let profile = Arc::new(self.client.fetch_profile().await?);
        tracing::debug!("Refreshed profile for {}", profile.id);
        *guard = Some(profile.clone());
        Ok(profile)
    }

    /// Forget the cached profile
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Cached profile without fetching
    pub async fn peek(&self) -> Option<Arc<UserProfile>> {
        self.cached.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl CountingClient {
        fn new(fail_after: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after,
            }
        }
    }

    #[async_trait]
    impl AccountClient for CountingClient {
        async fn fetch_profile(&self) -> Result<UserProfile, AccountError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_after.is_some_and(|n| call > n) {
                return Err(AccountError::Request("offline".to_string()));
            }
            Ok(UserProfile {
                id: "u-1".to_string(),
                display_name: format!("User v{call}"),
                email: "user@example.com".to_string(),
                water_account: Some("W-100".to_string()),
                electricity_account: None,
            })
        }
    }

    #[tokio::test]
    async fn test_fetches_once() {
        let client = Arc::new(CountingClient::new(None));
        let cache = ProfileCache::new(client.clone());

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_and_invalidate() {
        let client = Arc::new(CountingClient::new(None));
        let cache = ProfileCache::new(client.clone());

        assert_eq!(cache.get().await.unwrap().display_name, "User v1");
        assert_eq!(cache.refresh().await.unwrap().display_name, "User v2");
        assert_eq!(cache.get().await.unwrap().display_name, "User v2");

        cache.invalidate().await;
        assert!(cache.peek().await.is_none());
        assert_eq!(cache.get().await.unwrap().display_name, "User v3");
    }

    #[tokio::test]
    async fn test_json_client() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let client = JsonAccountClient::new(&path);

        assert_eq!(client.fetch_profile().await, Err(AccountError::Unauthenticated));

        std::fs::write(
            &path,
            r#"{"id":"u-2","displayName":"Ana","email":"ana@example.com","waterAccount":null,"electricityAccount":"E-7"}"#,
        )
        .unwrap();
        let profile = client.fetch_profile().await.unwrap();
        assert_eq!(profile.display_name, "Ana");
        assert_eq!(profile.electricity_account.as_deref(), Some("E-7"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_profile() {
        let client = Arc::new(CountingClient::new(Some(1)));
        let cache = ProfileCache::new(client);

        cache.get().await.unwrap();
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.peek().await.unwrap().display_name, "User v1");
    }
}
