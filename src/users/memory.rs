use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{normalize_email, StoreError, User, UserStore};

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

/// In-process store. Uniqueness is checked and applied under one write lock.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes an account, returning it if it existed.
    pub async fn remove(&self, id: Uuid) -> Option<User> {
        let mut inner = self.inner.write().await;
        let user = inner.by_id.remove(&id)?;
        inner.by_email.remove(&normalize_email(&user.email));
        Some(user)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn register(&self, user: &User) -> Result<(), StoreError> {
        let key = normalize_email(&user.email);
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(&key) {
            return Err(StoreError::EmailExists);
        }
        inner.by_email.insert(key, user.id);
        inner.by_id.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let inner = self.inner.read().await;
        inner
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| inner.by_id.get(id))
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }
}
