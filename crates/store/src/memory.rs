//! In-memory credential store backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use gravlink_types::{
    AuthRecord, CredentialStore, GravlinkError, ProviderId, traits::Result,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// An in-memory [`CredentialStore`] for testing and ephemeral use.
///
/// Every `set` is also appended to a write log so callers can assert how
/// often (and with what) the adapter persisted.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    data: Mutex<HashMap<ProviderId, AuthRecord>>,
    writes: Mutex<Vec<(ProviderId, AuthRecord)>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|e| GravlinkError::Storage(format!("store lock poisoned: {e}")))
}

impl InMemoryCredentialStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with one record. Seeding is not logged as a write.
    #[must_use]
    pub fn with_record(provider: ProviderId, record: AuthRecord) -> Self {
        let store = Self::new();
        if let Ok(mut data) = store.data.lock() {
            data.insert(provider, record);
        }
        store
    }

    /// Returns every record passed to `set`, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<(ProviderId, AuthRecord)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, provider: &ProviderId) -> Result<Option<AuthRecord>> {
        Ok(lock(&self.data)?.get(provider).cloned())
    }

    async fn set(&self, provider: &ProviderId, record: &AuthRecord) -> Result<()> {
        lock(&self.data)?.insert(provider.clone(), record.clone());
        lock(&self.writes)?.push((provider.clone(), record.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravlink_types::{OAuthCredential, RefreshParts};

    fn oauth(refresh: &str, access: &str) -> AuthRecord {
        AuthRecord::OAuth(OAuthCredential {
            refresh: RefreshParts::parse(refresh),
            access: Some(access.into()),
            expires: Some(1),
        })
    }

    #[tokio::test]
    async fn test_set_and_load() {
        let store = InMemoryCredentialStore::new();
        let google = ProviderId::default();
        store.set(&google, &oauth("rt", "at")).await.unwrap();
        let loaded = store.load(&google).await.unwrap().unwrap();
        assert_eq!(loaded, oauth("rt", "at"));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemoryCredentialStore::new();
        assert!(store.load(&ProviderId::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_and_write_log() {
        let store = InMemoryCredentialStore::new();
        let google = ProviderId::default();
        store.set(&google, &oauth("rt", "first")).await.unwrap();
        store.set(&google, &oauth("rt", "second")).await.unwrap();
        assert_eq!(store.load(&google).await.unwrap(), Some(oauth("rt", "second")));
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_seed_is_not_a_write() {
        let google = ProviderId::default();
        let store = InMemoryCredentialStore::with_record(google.clone(), oauth("rt|p", "at"));
        assert!(store.load(&google).await.unwrap().is_some());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_providers_are_isolated() {
        let store = InMemoryCredentialStore::new();
        store
            .set(&ProviderId::new("google"), &oauth("a", "a"))
            .await
            .unwrap();
        assert!(store.load(&ProviderId::new("google-work")).await.unwrap().is_none());
    }
}
