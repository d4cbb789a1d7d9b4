//! Credential file discovery (spec §4.1), grounded on
//! `oauth.py::_discover_credentials_path`.
//!
//! Resolution order: (1) user home `.aim/credentials.json`, (2) a
//! location bundled alongside the running binary — Rust's analogue of
//! the Python source's "SDK-package-embedded" directory, since a compiled
//! binary has no importable package root to inspect — (3) the current
//! working directory. On first resolution from location 2, the file is
//! copied to location 1 with owner-only permissions, matching the
//! Python source's transparent "install on first use" behavior.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::IdentityResult;

const CREDENTIALS_RELATIVE: &str = ".aim/credentials.json";

/// The credential file path to read/write, after applying discovery order
/// and any copy-up from the embedded location.
///
/// # Errors
///
/// Returns an error only if copying the embedded file up to the home
/// location fails partway (home directory unwritable, disk full, etc).
pub fn resolve_credentials_path() -> IdentityResult<PathBuf> {
    let home = home_credentials_path();

    if home.exists() {
        return Ok(home);
    }

    if let Some(embedded) = embedded_credentials_path() {
        if embedded.exists() {
            copy_up_to_home(&embedded, &home)?;
            return Ok(home);
        }
    }

    let cwd = std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CREDENTIALS_RELATIVE);
    if cwd.exists() {
        return Ok(cwd);
    }

    // Nothing exists anywhere; default to the home location for a fresh write.
    Ok(home)
}

/// `~/.aim/credentials.json`.
#[must_use]
pub fn home_credentials_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(CREDENTIALS_RELATIVE))
        .unwrap_or_else(|| PathBuf::from(CREDENTIALS_RELATIVE))
}

/// The directory alongside the running executable, joined with
/// `.aim/credentials.json` — this SDK's analogue of a downloaded SDK's
/// embedded credentials bundle.
#[must_use]
pub fn embedded_credentials_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    Some(dir.join(CREDENTIALS_RELATIVE))
}

fn copy_up_to_home(embedded: &Path, home: &Path) -> IdentityResult<()> {
    if let Some(parent) = home.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(embedded, home)?;
    set_owner_only_permissions(home)?;
    info!(from = %embedded.display(), to = %home.display(), "installed embedded SDK credentials");
    Ok(())
}

/// Restrict a file to owner read/write (`0o600`) on Unix; a no-op
/// elsewhere, matching the Python source's `os.chmod(path, 0o600)`.
pub fn set_owner_only_permissions(path: &Path) -> IdentityResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn copy_up_sets_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let embedded = dir.path().join("embedded.json");
        fs::write(&embedded, b"{}").unwrap();
        let home = dir.path().join("home").join("credentials.json");

        copy_up_to_home(&embedded, &home).unwrap();
        assert!(home.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&home).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
