//! Encryption-key management and sealing/unsealing primitives.
//!
//! Grounded on `secure_storage.py::SecureCredentialStorage`: a Fernet
//! (AES-128-CBC + HMAC-SHA256) cipher keyed by a 256-bit secret fetched
//! from (or generated into) the OS credential store under a well-known
//! service/account pair (spec §4.1). There is no insecure fallback — a
//! missing keyring is a fatal [`IdentityError::SecureStorageUnavailable`].

use fernet::Fernet;
use tracing::info;

use crate::error::{IdentityError, IdentityResult};

/// Keyring service name under which the sealing key is stored.
const SERVICE_NAME: &str = "aim-sdk";
/// Keyring account/username under which the sealing key is stored.
const KEY_ACCOUNT: &str = "encryption-key";

/// Fetch the sealing key from the OS keyring, generating and persisting
/// one if absent.
///
/// # Errors
///
/// Returns [`IdentityError::SecureStorageUnavailable`] if the keyring
/// cannot be reached at all (no backend available on this platform).
pub fn load_or_generate_key() -> IdentityResult<Fernet> {
    let entry = keyring::Entry::new(SERVICE_NAME, KEY_ACCOUNT)
        .map_err(|e| IdentityError::SecureStorageUnavailable(e.to_string()))?;

    match entry.get_password() {
        Ok(key) => Fernet::new(&key).ok_or_else(|| {
            IdentityError::SecureStorageUnavailable(
                "keyring-stored encryption key is not valid Fernet key material".into(),
            )
        }),
        Err(keyring::Error::NoEntry) => {
            let key = Fernet::generate_key();
            entry
                .set_password(&key)
                .map_err(|e| IdentityError::SecureStorageUnavailable(e.to_string()))?;
            info!("generated new credential-sealing key in OS keyring");
            Fernet::new(&key).ok_or_else(|| {
                IdentityError::SecureStorageUnavailable(
                    "freshly generated Fernet key was rejected by Fernet::new".into(),
                )
            })
        },
        Err(e) => Err(IdentityError::SecureStorageUnavailable(e.to_string())),
    }
}

/// Seal `plaintext` with the given cipher, producing a Fernet token.
#[must_use]
pub fn seal(cipher: &Fernet, plaintext: &[u8]) -> String {
    cipher.encrypt(plaintext)
}

/// Unseal a Fernet token previously produced by [`seal`].
///
/// # Errors
///
/// Returns [`IdentityError::CorruptCredentials`] if `token` is not a
/// valid Fernet token under `cipher` (wrong key, truncated data, or
/// tampered ciphertext — the HMAC check fails in all three cases).
pub fn unseal(cipher: &Fernet, token: &str) -> IdentityResult<Vec<u8>> {
    cipher
        .decrypt(token)
        .map_err(|e| IdentityError::CorruptCredentials(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_unseal_round_trips() {
        let key = Fernet::generate_key();
        let cipher = Fernet::new(&key).unwrap();
        let token = seal(&cipher, b"secret payload");
        assert_eq!(unseal(&cipher, &token).unwrap(), b"secret payload");
    }

    #[test]
    fn unseal_with_wrong_key_fails() {
        let cipher_a = Fernet::new(&Fernet::generate_key()).unwrap();
        let cipher_b = Fernet::new(&Fernet::generate_key()).unwrap();
        let token = seal(&cipher_a, b"secret payload");
        assert!(unseal(&cipher_b, &token).is_err());
    }

    #[test]
    fn unseal_rejects_tampered_token() {
        let cipher = Fernet::new(&Fernet::generate_key()).unwrap();
        let mut token = seal(&cipher, b"secret payload");
        token.push('A');
        assert!(unseal(&cipher, &token).is_err());
    }
}
