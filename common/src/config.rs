//! Configuration types for the target server, output and tracing

use anyhow::anyhow;

/// Default key used for every secure-protocol and secure-copy call
pub const DEFAULT_KEY_FILE: &str = "ed25519.key";

/// Description of the server under test and of the local fixtures
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Hostname all forwarded ports are reachable on
    pub host: String,
    /// Secure transfer (SFTP) endpoint port, also used for secure copy
    pub sftp_port: u16,
    /// Plain transfer (FTP) control port
    pub ftp_port: u16,
    /// Port reserved for passive-mode plain transfers
    pub ftp_passive_port: u16,
    /// Directory holding the pre-generated key fixtures
    pub key_dir: std::path::PathBuf,
    /// Username for password authentication
    pub user: String,
    /// Password for password authentication
    pub password: String,
    /// Local file used as the canonical upload source
    pub test_file: std::path::PathBuf,
    /// Local scratch directory for downloaded artifacts (reset before every cycle)
    pub scratch_dir: std::path::PathBuf,
    /// Ceiling for a single remote call
    pub timeout: std::time::Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            sftp_port: 1234,
            ftp_port: 12345,
            ftp_passive_port: 5678,
            key_dir: std::path::PathBuf::from("pftpd-pojo-lib/src/test/resources/keys"),
            user: "user".to_string(),
            password: "test".to_string(),
            test_file: std::path::PathBuf::from("testfile"),
            scratch_dir: std::path::PathBuf::from("/tmp/pftpd-tests"),
            timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl TargetConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout.is_zero() {
            return Err(anyhow!("timeout must be greater than zero"));
        }
        let ports = [self.sftp_port, self.ftp_port, self.ftp_passive_port];
        for (idx, port) in ports.iter().enumerate() {
            if ports[idx + 1..].contains(port) {
                return Err(anyhow!(
                    "sftp, ftp and passive ftp ports must be distinct, got {} twice",
                    port
                ));
            }
        }
        if self.host.is_empty() {
            return Err(anyhow!("host must not be empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn key_path(&self, file_name: &str) -> std::path::PathBuf {
        self.key_dir.join(file_name)
    }

    #[must_use]
    pub fn default_key(&self) -> std::path::PathBuf {
        self.key_path(DEFAULT_KEY_FILE)
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Only log errors
    pub quiet: bool,
    /// Verbosity level: 0=INFO, 1=DEBUG, 2=TRACE
    pub verbose: u8,
    /// Print the final report as JSON instead of the text block
    pub json: bool,
}

/// Tracing configuration for debugging
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Debug log file path
    pub debug_log_file: Option<String>,
}
