use std::fmt;

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string, never exposed
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Builds a fresh account with a new id and both timestamps set to now.
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Canonical form used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_hash() {
        let user = User::new("a".into(), "a@b.co".into(), "$argon2id$secret".into());
        let dbg = format!("{user:?}");
        assert!(!dbg.contains("$argon2id$secret"));
        assert!(dbg.contains("REDACTED"));
    }

    #[test]
    fn new_user_has_matching_timestamps() {
        let user = User::new("a".into(), "a@b.co".into(), "h".into());
        assert_eq!(user.created_at, user.updated_at);
        assert!(!user.id.is_nil());
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  JohnDoe@Hotmail.COM "), "johndoe@hotmail.com");
    }
}
