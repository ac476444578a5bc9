use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod repo;
pub mod repo_types;

pub use memory::MemoryUserStore;
pub use repo::PgUserStore;
pub use repo_types::{normalize_email, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already exists")]
    EmailExists,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence contract for user accounts.
///
/// `register` must check email uniqueness and insert atomically: of two
/// concurrent registrations for one email, exactly one succeeds and the
/// other gets [`StoreError::EmailExists`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn register(&self, user: &User) -> Result<(), StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError>;
}
