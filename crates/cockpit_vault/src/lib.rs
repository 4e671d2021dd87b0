use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

/// Application-scoped salt for the vault key derivation. Fixed so every
/// process derives the same key from SECRET_KEY.
const KDF_SALT: &[u8] = b"cockpit-credential-vault";
const KDF_ITERATIONS: u32 = 100_000;

/// Token layout version: 0x01 = AES-256-GCM, 12-byte nonce.
const TOKEN_VERSION: u8 = 0x01;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("SECRET_KEY not set for credential encryption")]
    MissingSecret,
    #[error("malformed vault token")]
    Format,
    #[error("failed to decrypt stored credential")]
    Decryption,
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

/// Encrypts and decrypts credential secrets with a key derived from the
/// application SECRET_KEY. Compromise of the database alone does not reveal
/// plaintext; plaintext is never logged.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    pub fn new(secret_key: &str) -> Result<Self, VaultError> {
        if secret_key.is_empty() {
            return Err(VaultError::MissingSecret);
        }
        let key_bytes = derive_key(secret_key);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .expect("AES-GCM encrypt");
        let mut token = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        URL_SAFE_NO_PAD.encode(token)
    }

    /// Fails with [`VaultError::Decryption`] on MAC mismatch — wrong key or
    /// tampered ciphertext. No fallback.
    pub fn decrypt(&self, token: &str) -> Result<String, VaultError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| VaultError::Format)?;
        if raw.len() < 1 + NONCE_LEN || raw[0] != TOKEN_VERSION {
            return Err(VaultError::Format);
        }
        let nonce = Nonce::from_slice(&raw[1..1 + NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &raw[1 + NONCE_LEN..])
            .map_err(|_| VaultError::Decryption)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
    }

    /// Decrypt with `self`, re-encrypt with `new`. The row-level building
    /// block of key rotation.
    pub fn reencrypt_for(&self, new: &EncryptionService, token: &str) -> Result<String, VaultError> {
        let plaintext = self.decrypt(token)?;
        Ok(new.encrypt(&plaintext))
    }
}

fn derive_key(secret: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut out);
    out
}

/// Outcome of rotating a set of tokens from an old key to a new one.
/// Individual failures are collected, not fatal; the caller decides whether
/// to commit.
#[derive(Debug, Default)]
pub struct RotationOutcome {
    pub rotated: Vec<(i64, String)>,
    pub failures: Vec<(i64, VaultError)>,
}

pub fn rotate_tokens(
    old: &EncryptionService,
    new: &EncryptionService,
    tokens: impl IntoIterator<Item = (i64, String)>,
) -> RotationOutcome {
    let mut outcome = RotationOutcome::default();
    for (id, token) in tokens {
        match old.reencrypt_for(new, &token) {
            Ok(rotated) => outcome.rotated.push((id, rotated)),
            Err(err) => {
                warn!(credential_id = id, "rotation failed: {err}");
                outcome.failures.push((id, err));
            }
        }
    }
    outcome
}

/// PBKDF2-SHA256 password hash with a random per-user salt, PHC string
/// format.
pub fn hash_password(password: &str) -> Result<String, VaultError> {
    let salt = SaltString::generate(&mut OsRng);
    Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| VaultError::PasswordHash(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Pbkdf2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let service = EncryptionService::new("unit-test-secret").unwrap();
        let token = service.encrypt("tacacs-password");
        assert_ne!(token, "tacacs-password");
        assert_eq!(service.decrypt(&token).unwrap(), "tacacs-password");
    }

    #[test]
    fn wrong_key_is_a_decryption_error() {
        let right = EncryptionService::new("key-one").unwrap();
        let wrong = EncryptionService::new("key-two").unwrap();
        let token = right.encrypt("secret");
        assert!(matches!(
            wrong.decrypt(&token),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let service = EncryptionService::new("unit-test-secret").unwrap();
        let token = service.encrypt("secret");
        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);
        assert!(matches!(
            service.decrypt(&tampered),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn malformed_tokens_are_format_errors() {
        let service = EncryptionService::new("unit-test-secret").unwrap();
        assert!(matches!(service.decrypt("@@@"), Err(VaultError::Format)));
        assert!(matches!(service.decrypt("AA"), Err(VaultError::Format)));
    }

    #[test]
    fn empty_secret_refused() {
        assert!(matches!(
            EncryptionService::new(""),
            Err(VaultError::MissingSecret)
        ));
    }

    #[test]
    fn rotation_moves_tokens_to_the_new_key() {
        let old = EncryptionService::new("old-key").unwrap();
        let new = EncryptionService::new("new-key").unwrap();
        let tokens = vec![(1, old.encrypt("a")), (2, old.encrypt("b"))];

        let outcome = rotate_tokens(&old, &new, tokens.clone());
        assert_eq!(outcome.rotated.len(), 2);
        assert!(outcome.failures.is_empty());
        for (_, rotated) in &outcome.rotated {
            assert!(new.decrypt(rotated).is_ok());
            assert!(old.decrypt(rotated).is_err());
        }

        // Second pass with the same keys: every token is already under the
        // new key, so the old key fails MAC on each row.
        let already_rotated = outcome
            .rotated
            .iter()
            .map(|(id, t)| (*id, t.clone()))
            .collect::<Vec<_>>();
        let second = rotate_tokens(&old, &new, already_rotated);
        assert!(second.rotated.is_empty());
        assert_eq!(second.failures.len(), 2);
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$pbkdf2-sha256$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }
}
