//! Identity file loading (§3 Identity, §6 "identity"): a name → access
//! level + credential map consulted by `warden-api`'s auth layer only.
//! Loaded once at startup; there is no live-reload or provisioning here
//! (§1 scopes auth beyond the trust contract out of this implementation).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use warden_types::AccessLevel;

use crate::error::{ConfigError, ConfigResult};

/// How an identity proves itself to the API: `local` (trusts the peer
/// credential's uid from `SO_PEERCRED`) or `basic` (a hashed password
/// checked against an HTTP basic-auth header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credential {
    Local { uid: u32 },
    Basic { password_hash: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub access: AccessLevel,
    #[serde(flatten)]
    pub credential: Credential,
}

pub type IdentityMap = BTreeMap<String, IdentityEntry>;

/// The identity file is optional (§6): a missing file means every request
/// is unauthenticated, which the API's auth layer treats as `login-required`
/// for anything beyond what an empty policy allows.
pub fn load_identity(path: &Path) -> ConfigResult<IdentityMap> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(IdentityMap::new()),
        Err(source) => {
            return Err(ConfigError::IdentityRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_yaml::from_slice(&bytes).map_err(|source| ConfigError::IdentityParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Hashes a basic-auth password for storage in the identity file (§C
/// "Identity file"). `sha2` rather than a heavier bcrypt/argon2 dependency:
/// identity here is a policy hook, not a first-class credential store.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identity_file_loads_as_empty() {
        let map = load_identity(Path::new("/nonexistent/warden/identity")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn parses_local_and_basic_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");
        std::fs::write(
            &path,
            r#"
alice:
  access: admin
  local:
    uid: 1000
bob:
  access: read
  basic:
    password-hash: "abc123"
"#,
        )
        .unwrap();

        let map = load_identity(&path).unwrap();
        assert_eq!(map["alice"].access, AccessLevel::Admin);
        assert_eq!(map["alice"].credential, Credential::Local { uid: 1000 });
        assert_eq!(map["bob"].access, AccessLevel::Read);
        assert_eq!(
            map["bob"].credential,
            Credential::Basic {
                password_hash: "abc123".to_string()
            }
        );
    }

    #[test]
    fn hashing_is_deterministic_and_distinguishes_inputs() {
        assert_eq!(hash_password("hunter2"), hash_password("hunter2"));
        assert_ne!(hash_password("hunter2"), hash_password("hunter3"));
    }
}
