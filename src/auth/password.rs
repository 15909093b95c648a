//! Argon2id password hashing (PHC string format).

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("password hashing failed: {e}"))
}

/// `false` for a wrong password and for an unparseable stored hash.
pub fn verify(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let h = hash("hunter22").unwrap();
        assert!(h.starts_with("$argon2id$"));
        assert!(verify("hunter22", &h));
        assert!(!verify("hunter23", &h));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        assert_ne!(hash("secret1").unwrap(), hash("secret1").unwrap());
    }

    #[test]
    fn corrupt_hash_never_verifies() {
        assert!(!verify("x", "not-a-phc-string"));
    }
}
