use rusqlite::{OptionalExtension, params};

use super::{Store, StoreError};

impl Store {
    /// Mark a token id as revoked until `expires_at` (unix seconds).
    /// Entries whose token has already expired are pruned on the way.
    pub fn revoke_token(&self, jti: &str, expires_at: i64, now: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM revoked_tokens WHERE expires_at < ?1", [now])?;
        conn.execute(
            "INSERT OR IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?1, ?2)",
            params![jti, expires_at],
        )?;
        Ok(())
    }

    pub fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let hit: Option<i64> = conn
            .query_row("SELECT 1 FROM revoked_tokens WHERE jti = ?1", [jti], |r| r.get(0))
            .optional()?;
        Ok(hit.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_and_prune() {
        let store = Store::open_in_memory().unwrap();
        store.revoke_token("old", 100, 50).unwrap();
        assert!(store.is_revoked("old").unwrap());

        // "old" expired at 100; revoking another token at t=200 prunes it.
        store.revoke_token("new", 1_000, 200).unwrap();
        assert!(!store.is_revoked("old").unwrap());
        assert!(store.is_revoked("new").unwrap());
    }
}
