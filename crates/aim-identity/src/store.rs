//! Identity Store (C1): sealed, multi-agent credential persistence.
//!
//! Contract (spec §4.1):
//! - Writes are always sealed (Fernet-equivalent cipher, keyring-sourced
//!   key), file mode restricted to owner read/write.
//! - Reads transparently migrate a legacy plaintext file to the sealed
//!   location, verifying decryption before deleting the plaintext —
//!   failures must not leave both files missing.
//! - Credentials for distinct agent names are independently addressable
//!   (spec §3 invariant ii); this store keeps them as entries in one
//!   sealed multi-agent map rather than one file per agent, mirroring
//!   the single `credentials.json` the Python source reads and writes.

use std::path::{Path, PathBuf};

use aim_core::AgentCredentials;
use fernet::Fernet;
use tracing::{debug, info, warn};

use crate::discovery::{resolve_credentials_path, set_owner_only_permissions};
use crate::error::{IdentityError, IdentityResult};
use crate::file_format::CredentialsFile;
use crate::sealed;

/// Sealed, multi-agent credential store.
pub struct IdentityStore {
    /// Legacy plaintext path (`~/.aim/credentials.json` or discovered
    /// equivalent). Read-and-migrated-away, never written fresh.
    plaintext_path: PathBuf,
    /// Sealed path, always `plaintext_path` with its extension replaced
    /// by `encrypted` (mirrors `secure_storage.py`'s `with_suffix`).
    sealed_path: PathBuf,
}

impl IdentityStore {
    /// Open the store at the discovered credentials location (spec
    /// §4.1's discovery order).
    ///
    /// # Errors
    ///
    /// Returns an error if discovery requires copying an embedded file up
    /// to the home location and that copy fails.
    pub fn discover() -> IdentityResult<Self> {
        let plaintext_path = resolve_credentials_path()?;
        Ok(Self::at(plaintext_path))
    }

    /// Open the store at an explicit path (primarily for tests).
    #[must_use]
    pub fn at(plaintext_path: PathBuf) -> Self {
        let sealed_path = plaintext_path.with_extension("encrypted");
        Self {
            plaintext_path,
            sealed_path,
        }
    }

    /// Read one named agent's credentials.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotFound`] if no credentials file exists
    /// or the named agent is absent from it, or
    /// [`IdentityError::CorruptCredentials`] if the sealed file cannot be
    /// decrypted.
    pub fn read(&self, name: &str) -> IdentityResult<AgentCredentials> {
        match self.load()? {
            CredentialsFile::Named(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| IdentityError::NotFound(Some(name.to_string()))),
            CredentialsFile::EmbeddedSdk(_) => Err(IdentityError::NotFound(Some(name.to_string()))),
        }
    }

    /// `true` if `name` has persisted credentials.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.read(name).is_ok()
    }

    /// Persist (insert or overwrite) one named agent's credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing file is corrupt, or if sealing
    /// and writing the updated file fails.
    pub fn write(&self, name: &str, credentials: AgentCredentials) -> IdentityResult<()> {
        let mut map = match self.load() {
            Ok(CredentialsFile::Named(map)) => map,
            Ok(CredentialsFile::EmbeddedSdk(_)) | Err(IdentityError::NotFound(_)) => {
                std::collections::BTreeMap::new()
            },
            Err(e) => return Err(e),
        };
        map.insert(name.to_string(), credentials);
        self.save(&CredentialsFile::Named(map))
    }

    /// Remove one named agent's credentials. A no-op if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing file is corrupt, or if rewriting
    /// the file fails.
    pub fn delete(&self, name: &str) -> IdentityResult<()> {
        let mut map = match self.load() {
            Ok(CredentialsFile::Named(map)) => map,
            Ok(CredentialsFile::EmbeddedSdk(_)) => return Ok(()),
            Err(IdentityError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        map.remove(name);
        self.save(&CredentialsFile::Named(map))
    }

    /// Load the decrypted file contents, migrating a plaintext legacy
    /// file to the sealed location on the way if needed.
    fn load(&self) -> IdentityResult<CredentialsFile> {
        if self.sealed_path.exists() {
            let cipher = sealed::load_or_generate_key()?;
            let ciphertext = std::fs::read_to_string(&self.sealed_path)?;
            let plaintext = sealed::unseal(&cipher, ciphertext.trim())?;
            return parse(&plaintext);
        }

        if self.plaintext_path.exists() {
            return self.migrate_plaintext();
        }

        Err(IdentityError::NotFound(None))
    }

    /// Encrypt the existing plaintext file to the sealed location,
    /// verify the round trip by decrypting it back, then delete the
    /// plaintext file. Failures never leave both files missing: the
    /// plaintext is only unlinked after the sealed file has been written
    /// *and* independently re-read successfully.
    fn migrate_plaintext(&self) -> IdentityResult<CredentialsFile> {
        let raw = std::fs::read(&self.plaintext_path)?;
        let parsed = parse(&raw)?;

        let cipher = sealed::load_or_generate_key()?;
        let token = sealed::seal(&cipher, &raw);
        atomic_write(&self.sealed_path, token.as_bytes())?;

        // Verify before deleting the legacy plaintext.
        let verify = std::fs::read_to_string(&self.sealed_path)?;
        let decrypted = sealed::unseal(&cipher, verify.trim())?;
        if decrypted != raw {
            return Err(IdentityError::CorruptCredentials(
                "sealed round-trip did not match source plaintext during migration".into(),
            ));
        }

        std::fs::remove_file(&self.plaintext_path)?;
        info!(path = %self.sealed_path.display(), "migrated legacy plaintext credentials to sealed storage");

        Ok(parsed)
    }

    /// Seal `file` and atomically write it to the sealed path.
    fn save(&self, file: &CredentialsFile) -> IdentityResult<()> {
        let json = serde_json::to_vec(file)
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
        let cipher = sealed::load_or_generate_key()?;
        let token = sealed::seal(&cipher, &json);
        atomic_write(&self.sealed_path, token.as_bytes())?;
        debug!(path = %self.sealed_path.display(), "wrote sealed credentials");
        Ok(())
    }
}

/// Load bootstrap OAuth credentials from an externally downloaded SDK
/// bundle, without going through [`IdentityStore`]'s sealed-map
/// machinery. Grounded on `oauth.py`'s module-level `load_sdk_credentials`,
/// used by the Token Manager (C2) the first time it runs against a
/// bundle that has never been opened by this store.
///
/// # Errors
///
/// Returns [`IdentityError::NotFound`] if no credentials file exists at
/// any discovery location, or [`IdentityError::Malformed`] if one exists
/// but isn't the single-agent embedded-SDK shape.
pub fn load_embedded_sdk_credentials() -> IdentityResult<crate::file_format::EmbeddedSdkCredentials> {
    let path = resolve_credentials_path()?;
    if !path.exists() {
        return Err(IdentityError::NotFound(None));
    }
    let raw = std::fs::read(&path)?;
    match parse(&raw)? {
        CredentialsFile::EmbeddedSdk(creds) => Ok(creds),
        CredentialsFile::Named(_) => Err(IdentityError::Malformed(
            "credentials file is a named-agent map, not an embedded SDK bundle".into(),
        )),
    }
}

fn parse(bytes: &[u8]) -> IdentityResult<CredentialsFile> {
    serde_json::from_slice(bytes).map_err(|e| IdentityError::Malformed(e.to_string()))
}

/// Write `contents` to `path` via a temp-file-then-rename so concurrent
/// readers never observe a partially written file (spec §5).
fn atomic_write(path: &Path, contents: &[u8]) -> IdentityResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    set_owner_only_permissions(&tmp_path)?;
    match std::fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "atomic rename failed, falling back to direct write");
            let _ = std::fs::remove_file(&tmp_path);
            std::fs::write(path, contents)?;
            set_owner_only_permissions(path)?;
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_crypto::KeyPair;
    use base64::Engine;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_credentials() -> AgentCredentials {
        let kp = KeyPair::generate();
        AgentCredentials {
            agent_id: Uuid::new_v4(),
            public_key: kp.export_public_key(),
            private_key: base64::engine::general_purpose::STANDARD
                .encode(kp.export_seed_and_public()),
            server_url: "https://aim.example.com".into(),
            refresh_token: None,
            access_token: None,
            sdk_token_id: None,
            status: None,
            trust_score: None,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));
        let creds = sample_credentials();
        store.write("agent-a", creds.clone()).unwrap();

        let read_back = store.read("agent-a").unwrap();
        assert_eq!(read_back.agent_id, creds.agent_id);
        assert!(!dir.path().join("credentials.json").exists());
        assert!(dir.path().join("credentials.encrypted").exists());
    }

    #[test]
    fn distinct_agent_names_are_independently_addressable() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));
        let a = sample_credentials();
        let b = sample_credentials();
        store.write("agent-a", a.clone()).unwrap();
        store.write("agent-b", b.clone()).unwrap();

        assert_eq!(store.read("agent-a").unwrap().agent_id, a.agent_id);
        assert_eq!(store.read("agent-b").unwrap().agent_id, b.agent_id);
    }

    #[test]
    fn unknown_agent_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));
        store.write("agent-a", sample_credentials()).unwrap();
        assert!(matches!(
            store.read("agent-missing"),
            Err(IdentityError::NotFound(Some(_)))
        ));
    }

    #[test]
    fn legacy_plaintext_is_migrated_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let plaintext_path = dir.path().join("credentials.json");
        let creds = sample_credentials();
        let mut map = std::collections::BTreeMap::new();
        map.insert("agent-a".to_string(), creds.clone());
        let file = CredentialsFile::Named(map);
        std::fs::write(&plaintext_path, serde_json::to_vec(&file).unwrap()).unwrap();

        let store = IdentityStore::at(plaintext_path.clone());
        let read_back = store.read("agent-a").unwrap();
        assert_eq!(read_back.agent_id, creds.agent_id);
        assert!(!plaintext_path.exists());
        assert!(plaintext_path.with_extension("encrypted").exists());
    }

    #[test]
    fn delete_removes_one_agent_without_disturbing_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));
        store.write("agent-a", sample_credentials()).unwrap();
        store.write("agent-b", sample_credentials()).unwrap();

        store.delete("agent-a").unwrap();
        assert!(!store.exists("agent-a"));
        assert!(store.exists("agent-b"));
    }

    #[test]
    fn corrupt_sealed_file_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let plaintext_path = dir.path().join("credentials.json");
        let sealed_path = plaintext_path.with_extension("encrypted");
        std::fs::write(&sealed_path, b"not a valid fernet token").unwrap();

        let store = IdentityStore::at(plaintext_path);
        assert!(matches!(
            store.read("agent-a"),
            Err(IdentityError::CorruptCredentials(_))
        ));
    }
}
