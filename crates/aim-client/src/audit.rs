//! Local audit trail (spec §1: "recorded in a tamper-evident audit trail").
//!
//! The server is the authoritative audit store; this module keeps a
//! supplementary local record so an operator can inspect or replay what
//! an agent did even if the control plane is unreachable. Each entry is
//! chained to the previous one's signature (rather than a separate hash
//! function this workspace has no existing dependency on) and signed with
//! the agent's own Ed25519 key, so a truncated or edited log is
//! detectable by [`AuditLog::verify_chain`] without contacting the server.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use aim_crypto::{to_canonical_json, KeyPair, PublicKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{configuration, AimResult};

/// One signed, chained record in the local audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic position in this agent's log, starting at 0.
    pub sequence: u64,
    /// When this entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Short event name, e.g. `"verify_action"`, `"registered"`, `"revoked"`.
    pub event: String,
    /// Free-form event detail.
    pub detail: Value,
    /// Base64 signature of the entry immediately before this one, or
    /// `None` for the first entry. Chains the log so a spliced-out entry
    /// breaks verification of everything after it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_signature: Option<String>,
    /// Base64 Ed25519 signature over this entry minus this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Serialize)]
struct SigningView<'a> {
    sequence: u64,
    timestamp: DateTime<Utc>,
    event: &'a str,
    detail: &'a Value,
    previous_signature: &'a Option<String>,
}

impl AuditEntry {
    fn signing_payload(&self) -> AimResult<Vec<u8>> {
        let view = SigningView {
            sequence: self.sequence,
            timestamp: self.timestamp,
            event: &self.event,
            detail: &self.detail,
            previous_signature: &self.previous_signature,
        };
        to_canonical_json(&view).map_err(|e| configuration(e.to_string()))
    }
}

/// `~/.aim/audit/{agent_name}.jsonl`, the default location for an agent's
/// local audit trail, mirroring the credential discovery home location in
/// `aim-identity::discovery`.
#[must_use]
pub(crate) fn default_audit_path(agent_name: &str) -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".aim").join("audit").join(format!("{agent_name}.jsonl")))
        .unwrap_or_else(|| PathBuf::from(".aim").join("audit").join(format!("{agent_name}.jsonl")))
}

/// Append-only, sequentially signed JSONL audit log for one agent.
pub(crate) struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub(crate) fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append a signed entry recording `event`/`detail`, chained to the
    /// previous entry if one exists.
    pub(crate) fn append(&self, keypair: &KeyPair, event: &str, detail: Value) -> AimResult<AuditEntry> {
        let tail = self.last_entry()?;
        let mut entry = AuditEntry {
            sequence: tail.as_ref().map_or(0, |e| e.sequence + 1),
            timestamp: Utc::now(),
            event: event.to_string(),
            detail,
            previous_signature: tail.and_then(|e| e.signature),
            signature: None,
        };

        let payload = entry.signing_payload()?;
        entry.signature = Some(keypair.sign(&payload).to_base64());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| configuration(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| configuration(e.to_string()))?;
        let line = serde_json::to_string(&entry).map_err(|e| configuration(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| configuration(e.to_string()))?;

        Ok(entry)
    }

    /// Read back every entry in order.
    pub(crate) fn read_all(&self) -> AimResult<Vec<AuditEntry>> {
        let Ok(file) = std::fs::File::open(&self.path) else {
            return Ok(Vec::new());
        };
        BufReader::new(file)
            .lines()
            .map(|line| {
                let line = line.map_err(|e| configuration(e.to_string()))?;
                serde_json::from_str(&line).map_err(|e| configuration(e.to_string()))
            })
            .collect()
    }

    fn last_entry(&self) -> AimResult<Option<AuditEntry>> {
        Ok(self.read_all()?.into_iter().last())
    }

    /// Verify the whole chain: every entry's signature is valid under
    /// `public_key`, every entry (after the first) references the exact
    /// signature of the one before it, and sequence numbers are
    /// contiguous. Returns `Ok(true)` for an empty or untouched log.
    pub(crate) fn verify_chain(&self, public_key: &PublicKey) -> AimResult<bool> {
        let entries = self.read_all()?;
        let mut previous: Option<&AuditEntry> = None;

        for entry in &entries {
            let Some(signature) = &entry.signature else {
                return Ok(false);
            };
            let Ok(signature) = aim_crypto::Signature::from_base64(signature) else {
                return Ok(false);
            };
            let Ok(payload) = entry.signing_payload() else {
                return Ok(false);
            };
            if public_key.verify(&payload, &signature).is_err() {
                return Ok(false);
            }

            match previous {
                None => {
                    if entry.sequence != 0 || entry.previous_signature.is_some() {
                        return Ok(false);
                    }
                },
                Some(prev) => {
                    if entry.sequence != prev.sequence + 1 {
                        return Ok(false);
                    }
                    if entry.previous_signature.as_deref() != prev.signature.as_deref() {
                        return Ok(false);
                    }
                },
            }
            previous = Some(entry);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_entries_form_a_valid_chain() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = KeyPair::generate();
        let log = AuditLog::at(dir.path().join("audit.log"));

        log.append(&keypair, "registered", serde_json::json!({"agent": "svc-a"}))
            .unwrap();
        log.append(&keypair, "verify_action", serde_json::json!({"action_type": "read_files"}))
            .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].previous_signature, entries[0].signature);
        assert!(log.verify_chain(&keypair.export_public_key()).unwrap());
    }

    #[test]
    fn tampered_entry_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let keypair = KeyPair::generate();
        let log = AuditLog::at(path.clone());

        log.append(&keypair, "registered", serde_json::json!({})).unwrap();
        log.append(&keypair, "verify_action", serde_json::json!({"action_type": "read_files"}))
            .unwrap();

        let mut entries = log.read_all().unwrap();
        entries[1].detail = serde_json::json!({"action_type": "delete_all"});
        let rewritten: String = entries
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&path, rewritten + "\n").unwrap();

        assert!(!log.verify_chain(&keypair.export_public_key()).unwrap());
    }

    #[test]
    fn empty_log_verifies_trivially() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = KeyPair::generate();
        let log = AuditLog::at(dir.path().join("audit.log"));
        assert!(log.verify_chain(&keypair.export_public_key()).unwrap());
    }
}
