//! Credential material and the fixed credential matrix.

use crate::config::TargetConfig;

/// Opaque authentication material handed to the transport
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Private key file (secure protocol and secure copy)
    Key(std::path::PathBuf),
    /// Username and password
    Password { user: String, password: String },
}

// keep passwords out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Key(path) => f.debug_tuple("Key").field(path).finish(),
            Credential::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Whether the server is expected to accept a credential
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
}

/// One row of the credential matrix
#[derive(Clone, Debug)]
pub struct CredentialCase {
    /// Discrepancy label, e.g. `[key rsa]`
    pub label: String,
    pub credential: Credential,
    pub validity: Validity,
}

impl CredentialCase {
    fn key(config: &TargetConfig, label: &str, file_name: &str, validity: Validity) -> Self {
        Self {
            label: label.to_string(),
            credential: Credential::Key(config.key_path(file_name)),
            validity,
        }
    }
}

/// Password credential from the target configuration
#[must_use]
pub fn password(config: &TargetConfig) -> Credential {
    Credential::Password {
        user: config.user.clone(),
        password: config.password.clone(),
    }
}

/// The fixed set of credentials every secure-protocol run is checked against.
///
/// Valid keys and the password must reproduce the baseline home listing; the
/// deliberately corrupted keys must be rejected.
#[must_use]
pub fn matrix(config: &TargetConfig) -> Vec<CredentialCase> {
    vec![
        CredentialCase::key(config, "[key dsa]", "dsa.key", Validity::Valid),
        CredentialCase::key(config, "[key rsa]", "rsa.key", Validity::Valid),
        CredentialCase::key(config, "[key ecdsa]", "ecdsa.key", Validity::Valid),
        CredentialCase::key(config, "[key ecdsa 384]", "ecdsa.key.384", Validity::Valid),
        CredentialCase::key(config, "[key bad rsa]", "rsa.bad.key", Validity::Invalid),
        CredentialCase::key(
            config,
            "[key bad ed25519]",
            "ed25519.bad.key",
            Validity::Invalid,
        ),
        CredentialCase {
            label: "[sftp password]".to_string(),
            credential: password(config),
            validity: Validity::Valid,
        },
    ]
}
