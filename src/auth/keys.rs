//! Token signing key: ed25519 keypair generation, persistence, and `key_id`
//! derivation.
//!
//! Layout under the key directory (default `work_dir/keys`):
//! ```text
//! keys/
//! ├── token_ed25519       (32-byte signing key seed, mode 0600)
//! └── token_ed25519.pub   (32-byte verifying key, mode 0644)
//! ```
//!
//! `key_id` is the first 8 hex characters of `SHA256(verifying_key_bytes)`
//! and is written into the `kid` header of every issued token.  The seed is
//! handed to `jsonwebtoken` as PKCS#8 DER; the verifying key as raw bytes.

use std::{fs, path::Path};

use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::error::AppError;

const SECRET_FILE: &str = "token_ed25519";
const PUBLIC_FILE: &str = "token_ed25519.pub";

/// Loaded signing keypair.
#[derive(Clone)]
pub struct SigningKeys {
    pub key_id: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Fresh in-memory keypair.  Tokens signed with it die with the process.
    pub fn generate() -> Result<Self, AppError> {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Result<Self, AppError> {
        let verifying_key = signing_key.verifying_key();
        let der = signing_key
            .to_pkcs8_der()
            .map_err(|e| AppError::Keys(format!("cannot encode signing key: {e}")))?;
        Ok(Self {
            key_id: compute_key_id(&verifying_key.to_bytes()),
            encoding: EncodingKey::from_ed_der(der.as_bytes()),
            decoding: DecodingKey::from_ed_der(verifying_key.as_bytes()),
            signing_key,
            verifying_key,
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Load the keypair from `dir`, creating it on first use.
pub fn setup(dir: &Path) -> Result<SigningKeys, AppError> {
    if dir.join(SECRET_FILE).exists() {
        let (seed, _) = load_keypair(dir)?;
        return SigningKeys::from_signing_key(SigningKey::from_bytes(&seed));
    }

    fs::create_dir_all(dir)
        .map_err(|e| AppError::Keys(format!("cannot create key dir: {e}")))?;
    let keys = SigningKeys::generate()?;
    save_keypair(dir, &keys.signing_key.to_bytes(), &keys.verifying_key.to_bytes())?;
    Ok(keys)
}

/// First 8 hex chars of `SHA256(verifying_key_bytes)`.
pub fn compute_key_id(verifying_key_bytes: &[u8; 32]) -> String {
    let digest = Sha256::digest(verifying_key_bytes);
    hex::encode(digest)[..8].to_string()
}

fn save_keypair(dir: &Path, seed: &[u8; 32], vk: &[u8; 32]) -> Result<(), AppError> {
    let secret_path = dir.join(SECRET_FILE);
    let pub_path = dir.join(PUBLIC_FILE);

    fs::write(&secret_path, seed)
        .map_err(|e| AppError::Keys(format!("cannot write {SECRET_FILE}: {e}")))?;
    fs::write(&pub_path, vk)
        .map_err(|e| AppError::Keys(format!("cannot write {PUBLIC_FILE}: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&secret_path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            AppError::Keys(format!("cannot set permissions on {SECRET_FILE}: {e}"))
        })?;
        fs::set_permissions(&pub_path, fs::Permissions::from_mode(0o644)).map_err(|e| {
            AppError::Keys(format!("cannot set permissions on {PUBLIC_FILE}: {e}"))
        })?;
    }

    Ok(())
}

fn load_keypair(dir: &Path) -> Result<([u8; 32], [u8; 32]), AppError> {
    let seed_bytes = fs::read(dir.join(SECRET_FILE))
        .map_err(|e| AppError::Keys(format!("cannot read {SECRET_FILE}: {e}")))?;
    let vk_bytes = fs::read(dir.join(PUBLIC_FILE))
        .map_err(|e| AppError::Keys(format!("cannot read {PUBLIC_FILE}: {e}")))?;

    let seed: [u8; 32] = seed_bytes
        .try_into()
        .map_err(|_| AppError::Keys(format!("{SECRET_FILE} is not 32 bytes")))?;
    let vk: [u8; 32] = vk_bytes
        .try_into()
        .map_err(|_| AppError::Keys(format!("{PUBLIC_FILE} is not 32 bytes")))?;

    let reconstructed = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
    if reconstructed != vk {
        return Err(AppError::Keys(
            "keypair mismatch: verifying key does not match signing key seed".into(),
        ));
    }

    Ok((seed, vk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_id_is_8_hex_chars() {
        let keys = SigningKeys::generate().unwrap();
        assert_eq!(keys.key_id.len(), 8);
        assert!(keys.key_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn setup_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("keys");
        let first = setup(&dir).unwrap();
        assert!(dir.join(SECRET_FILE).exists());
        assert!(dir.join(PUBLIC_FILE).exists());
        let second = setup(&dir).unwrap();
        assert_eq!(first.key_id, second.key_id);
    }

    #[test]
    fn reloaded_key_verifies_earlier_tokens() {
        use crate::auth::token::{self, TokenKind};

        let tmp = TempDir::new().unwrap();
        let first = setup(tmp.path()).unwrap();
        let issued = token::issue(&first, "u1", TokenKind::Access, crate::auth::unix_now(), 60).unwrap();
        let second = setup(tmp.path()).unwrap();
        assert_eq!(token::verify(&second, &issued, TokenKind::Access).unwrap().sub, "u1");
    }

    #[test]
    fn mismatched_keypair_rejected() {
        let tmp = TempDir::new().unwrap();
        let a = SigningKeys::generate().unwrap();
        let b = SigningKeys::generate().unwrap();
        save_keypair(tmp.path(), &a.signing_key.to_bytes(), &b.verifying_key.to_bytes()).unwrap();
        let err = setup(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("keypair mismatch"));
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        setup(tmp.path()).unwrap();
        let mode = fs::metadata(tmp.path().join(SECRET_FILE)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
