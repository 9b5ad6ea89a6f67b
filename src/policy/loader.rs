//! Policy loader: YAML policy files + agent-held `.pub` files -> `Policy`.

use crate::error::{Error, Result};
use crate::policy::fingerprint::both_fingerprints;
use crate::policy::{GroupName, KeyName, Policy};
use ssh_key::PublicKey;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Load a `Policy` from an auth directory (`*.yml`/`*.yaml` group files) and
/// a pubkey directory (`*.pub` agent-held public keys).
///
/// Multiple policy files are merged: a key listed under the same group in
/// two files is idempotent; under different groups it contributes each
/// group. A policy entry whose KeyName has no matching public key is
/// dropped with a diagnostic, never an error. Both MD5 and SHA-256
/// fingerprints are indexed for every bound key (see DESIGN.md).
pub fn load_policy(auth_dir: &Path, pubkey_dir: &Path) -> Result<Policy> {
    let key_fingerprints = load_key_fingerprints(pubkey_dir)?;
    let group_members = load_group_memberships(auth_dir)?;

    let mut policy: HashMap<String, HashSet<GroupName>> = HashMap::new();

    for (group, key_names) in &group_members {
        for key_name in key_names {
            match key_fingerprints.get(key_name) {
                Some((md5, sha256)) => {
                    policy.entry(md5.clone()).or_default().insert(group.clone());
                    policy.entry(sha256.clone()).or_default().insert(group.clone());
                }
                None => {
                    warn!(
                        group = %group,
                        key = %key_name,
                        "policy entry references unknown key name, dropping"
                    );
                }
            }
        }
    }

    info!(
        groups = group_members.len(),
        keys = key_fingerprints.len(),
        fingerprints = policy.len(),
        "policy loaded"
    );

    Ok(policy)
}

/// `KeyName -> (md5_fingerprint, sha256_fingerprint)` for every `.pub` file
/// in `pubkey_dir`.
fn load_key_fingerprints(pubkey_dir: &Path) -> Result<HashMap<KeyName, (String, String)>> {
    let mut fingerprints = HashMap::new();

    let entries = std::fs::read_dir(pubkey_dir).map_err(|e| {
        Error::Config(format!(
            "cannot read pubkey directory {}: {e}",
            pubkey_dir.display()
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::Config(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pub") {
            continue;
        }
        let key_name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        match PublicKey::from_openssh(contents.trim()) {
            Ok(key) => {
                let blob = key.to_bytes().map_err(Error::SshKey)?;
                let (md5, sha256) = both_fingerprints(&blob);
                info!(key = %key_name, path = %path.display(), "bound agent key to fingerprints");
                fingerprints.insert(key_name, (md5, sha256));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unparseable public key file, skipping");
            }
        }
    }

    Ok(fingerprints)
}

/// `GroupName -> [KeyName]` merged across every `*.yml`/`*.yaml` file in
/// `auth_dir`.
fn load_group_memberships(auth_dir: &Path) -> Result<HashMap<GroupName, HashSet<KeyName>>> {
    let mut merged: HashMap<GroupName, HashSet<KeyName>> = HashMap::new();

    let entries = std::fs::read_dir(auth_dir).map_err(|e| {
        Error::Config(format!(
            "cannot read auth directory {}: {e}",
            auth_dir.display()
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::Config(e.to_string()))?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if !is_yaml {
            continue;
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let file_groups: HashMap<GroupName, Vec<KeyName>> = serde_yaml::from_str(&contents)?;

        info!(path = %path.display(), groups = file_groups.len(), "loaded policy file");

        for (group, keys) in file_groups {
            let entry = merged.entry(group).or_default();
            for key in keys {
                entry.insert(key);
            }
        }
    }

    Ok(merged)
}
