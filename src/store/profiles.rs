use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::model::{Profile, now_rfc3339};

/// Login material looked up by email.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password_hash: String,
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Store {
    pub fn create_profile(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Profile, StoreError> {
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_lowercase(),
            created_at: now_rfc3339(),
            updated_at: None,
        };

        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO profiles (id, name, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![profile.id, profile.name, profile.email, password_hash, profile.created_at],
        );
        match result {
            Ok(_) => Ok(profile),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn profile_by_id(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let conn = self.lock()?;
        let profile = conn
            .query_row(
                "SELECT id, name, email, created_at, updated_at FROM profiles WHERE id = ?1",
                [id],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        let conn = self.lock()?;
        let creds = conn
            .query_row(
                "SELECT id, password_hash FROM profiles WHERE email = ?1",
                [email.trim().to_lowercase()],
                |r| Ok(Credentials { user_id: r.get(0)?, password_hash: r.get(1)? }),
            )
            .optional()?;
        Ok(creds)
    }

    /// Rename a profile.  Returns `None` when the profile does not exist.
    pub fn update_profile_name(&self, id: &str, name: &str) -> Result<Option<Profile>, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("Name is required".into()));
        }
        {
            let conn = self.lock()?;
            let changed = conn.execute(
                "UPDATE profiles SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now_rfc3339(), id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.profile_by_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_case_insensitive_and_unique() {
        let store = Store::open_in_memory().unwrap();
        let p = store.create_profile(" Ann ", "Ann@Example.com", "h").unwrap();
        assert_eq!(p.name, "Ann");
        assert_eq!(p.email, "ann@example.com");

        let creds = store.credentials_by_email("ANN@example.com").unwrap().unwrap();
        assert_eq!(creds.user_id, p.id);
        assert_eq!(creds.password_hash, "h");

        let dup = store.create_profile("Other", "ann@example.com", "h2");
        assert!(matches!(dup, Err(StoreError::DuplicateEmail)));
    }

    #[test]
    fn rename_profile() {
        let store = Store::open_in_memory().unwrap();
        let p = store.create_profile("Ann", "ann@example.com", "h").unwrap();
        let renamed = store.update_profile_name(&p.id, "Annie").unwrap().unwrap();
        assert_eq!(renamed.name, "Annie");
        assert!(renamed.updated_at.is_some());

        assert!(store.update_profile_name("missing", "x").unwrap().is_none());
        assert!(store.update_profile_name(&p.id, "  ").is_err());
    }
}
