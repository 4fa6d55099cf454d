//! Transport adapter: executes one remote operation and returns its raw output.
//!
//! The production implementation spawns `curl` (secure and plain transfer)
//! and `scp` (secure copy) with structured argument vectors. Every call is
//! bounded by the configured timeout; nothing is retried.

use anyhow::{Context, anyhow};
use tracing::instrument;

use crate::credential::Credential;
use crate::listing::Listing;
use crate::protocol::{Endpoint, Protocol, RemoteCommand};

/// What to do with a failed call (nonzero exit or timeout)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailureMode {
    /// Propagate as a hard failure
    Strict,
    /// Return an empty listing instead, used where rejection is the expected outcome
    Tolerant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// List the directory at the request path
    List,
    /// Issue remote commands against the request path; returns its listing
    Quote(Vec<RemoteCommand>),
    /// Upload a local file into the directory at the request path
    Upload { local: std::path::PathBuf },
    /// Download the file at the request path
    Download { local: std::path::PathBuf },
    /// Copy a local file to the remote path over secure copy
    ScpUpload { local: std::path::PathBuf },
    /// Copy the remote file at the request path to a local path over secure copy
    ScpDownload { local: std::path::PathBuf },
}

#[derive(Clone, Debug)]
pub struct Request {
    pub endpoint: Endpoint,
    /// Absolute remote path, directories end with `/`
    pub path: String,
    pub credential: Credential,
    pub operation: Operation,
    pub mode: FailureMode,
}

impl Request {
    #[must_use]
    pub fn new(endpoint: &Endpoint, path: &str, credential: &Credential, operation: Operation) -> Self {
        Self {
            endpoint: endpoint.clone(),
            path: path.to_string(),
            credential: credential.clone(),
            operation,
            mode: FailureMode::Strict,
        }
    }

    #[must_use]
    pub fn tolerant(mut self) -> Self {
        self.mode = FailureMode::Tolerant;
        self
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.endpoint.url(&self.path)
    }
}

/// Seam between the cycle engine and the network.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn execute(&self, request: &Request) -> anyhow::Result<Listing>;
}

/// Extra wall clock allowed on top of the tool's own timeout before the
/// process is killed
const KILL_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Fully resolved process invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: &'static str,
    pub args: Vec<std::ffi::OsString>,
}

impl Invocation {
    fn new(program: &'static str) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    fn arg(&mut self, arg: impl Into<std::ffi::OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }
}

/// Transport spawning `curl` and `scp`
#[derive(Clone, Debug)]
pub struct CurlTransport {
    timeout: std::time::Duration,
    kill_grace: std::time::Duration,
}

impl CurlTransport {
    #[must_use]
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            timeout,
            kill_grace: KILL_GRACE,
        }
    }

    #[cfg(test)]
    fn with_kill_grace(mut self, kill_grace: std::time::Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    /// `scp` only takes whole seconds, rounded up
    fn connect_timeout_secs(&self) -> u64 {
        let secs = self.timeout.as_secs() + u64::from(self.timeout.subsec_nanos() > 0);
        secs.max(1)
    }

    fn curl(&self, request: &Request) -> anyhow::Result<Invocation> {
        let mut invocation = Invocation::new("curl");
        invocation.arg("-v");
        let protocol = request.endpoint.protocol;
        if protocol == Protocol::SecureFileTransfer {
            invocation.arg("-k");
        }
        invocation
            .arg("--max-time")
            .arg(self.timeout.as_secs_f64().to_string());
        match (&request.credential, protocol) {
            (Credential::Key(key), Protocol::SecureFileTransfer) => {
                invocation.arg("--key").arg(key.as_os_str());
            }
            (Credential::Key(key), Protocol::PlainFileTransfer) => {
                return Err(anyhow!(
                    "key {:?} cannot authenticate a plain transfer, use a password",
                    key
                ));
            }
            (Credential::Password { user, password }, _) => {
                invocation.arg("--user").arg(format!("{user}:{password}"));
            }
        }
        match &request.operation {
            Operation::List => {}
            Operation::Quote(commands) => {
                for command in commands {
                    for rendered in command.render(protocol) {
                        invocation.arg("-Q").arg(rendered);
                    }
                }
            }
            Operation::Upload { local } => {
                invocation.arg("-T").arg(local.as_os_str());
            }
            Operation::Download { local } => {
                invocation.arg("-o").arg(local.as_os_str());
            }
            Operation::ScpUpload { .. } | Operation::ScpDownload { .. } => {
                return Err(anyhow!("secure copy is not a curl operation"));
            }
        }
        invocation.arg(request.url());
        Ok(invocation)
    }

    fn scp(&self, request: &Request) -> anyhow::Result<Invocation> {
        let Credential::Key(key) = &request.credential else {
            return Err(anyhow!("secure copy only supports key authentication"));
        };
        let mut invocation = Invocation::new("scp");
        invocation
            .arg("-i")
            .arg(key.as_os_str())
            .arg("-P")
            .arg(request.endpoint.port.to_string());
        for option in [
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "PreferredAuthentications=publickey",
        ] {
            invocation.arg("-o").arg(option);
        }
        invocation
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs()));
        let remote = format!("{}:{}", request.endpoint.host, request.path);
        match &request.operation {
            Operation::ScpUpload { local } => {
                invocation.arg(local.as_os_str()).arg(remote);
            }
            Operation::ScpDownload { local } => {
                invocation.arg(remote).arg(local.as_os_str());
            }
            _ => return Err(anyhow!("{:?} is not a secure copy operation", request.operation)),
        }
        Ok(invocation)
    }

    /// Builds the exact argument vector for a request
    pub fn invocation(&self, request: &Request) -> anyhow::Result<Invocation> {
        match request.operation {
            Operation::ScpUpload { .. } | Operation::ScpDownload { .. } => self.scp(request),
            _ => self.curl(request),
        }
    }
}

impl CurlTransport {
    /// Runs a resolved invocation under the call timeout and applies the
    /// request's failure mode. Failing to spawn is always an error.
    async fn run(&self, invocation: &Invocation, request: &Request) -> anyhow::Result<Listing> {
        tracing::debug!("running {} {:?}", invocation.program, &invocation.args);
        let mut command = tokio::process::Command::new(invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        let deadline = self.timeout + self.kill_grace;
        let output = match tokio::time::timeout(deadline, command.output()).await {
            Ok(output) => output.with_context(|| format!("failed to spawn {}", invocation.program))?,
            Err(_) => {
                if request.mode == FailureMode::Tolerant {
                    tracing::info!("{} timed out, tolerated", invocation.program);
                    return Ok(Listing::empty());
                }
                return Err(anyhow!(
                    "{} {} timed out after {}",
                    invocation.program,
                    request.url(),
                    humantime::format_duration(deadline)
                ));
            }
        };
        tracing::debug!("stderr:\n{}", String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            if request.mode == FailureMode::Tolerant {
                tracing::info!(
                    "{} failed with {:?}, tolerated",
                    invocation.program,
                    output.status.code()
                );
                return Ok(Listing::empty());
            }
            return Err(anyhow!(
                "{} {} failed, status code: {:?}\nstderr:\n{}",
                invocation.program,
                request.url(),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(Listing::new(output.stdout))
    }
}

impl Transport for CurlTransport {
    #[instrument(skip(self), fields(url = %request.url()))]
    async fn execute(&self, request: &Request) -> anyhow::Result<Listing> {
        let invocation = self.invocation(request)?;
        self.run(&invocation, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn sftp() -> Endpoint {
        Endpoint {
            protocol: Protocol::SecureFileTransfer,
            host: "localhost".into(),
            port: 1234,
        }
    }

    fn ftp() -> Endpoint {
        Endpoint {
            protocol: Protocol::PlainFileTransfer,
            host: "localhost".into(),
            port: 12345,
        }
    }

    fn key() -> Credential {
        Credential::Key("keys/ed25519.key".into())
    }

    fn password() -> Credential {
        Credential::Password {
            user: "user".into(),
            password: "test".into(),
        }
    }

    fn args(invocation: &Invocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn sftp_listing_uses_key() -> anyhow::Result<()> {
        let transport = CurlTransport::new(std::time::Duration::from_secs(5));
        let request = Request::new(&sftp(), "/storage/emulated/0/", &key(), Operation::List);
        let invocation = transport.invocation(&request)?;
        assert_eq!(invocation.program, "curl");
        assert_eq!(
            args(&invocation),
            vec![
                "-v",
                "-k",
                "--max-time",
                "5",
                "--key",
                "keys/ed25519.key",
                "sftp://localhost:1234/storage/emulated/0/",
            ]
        );
        Ok(())
    }

    #[test]
    fn ftp_rename_is_two_quoted_commands() -> anyhow::Result<()> {
        let transport = CurlTransport::new(std::time::Duration::from_secs(5));
        let request = Request::new(
            &ftp(),
            "/",
            &password(),
            Operation::Quote(vec![RemoteCommand::Rename {
                from: "test-dir-auto".into(),
                to: "test-dir-auto-renamed".into(),
            }]),
        );
        assert_eq!(
            args(&transport.invocation(&request)?),
            vec![
                "-v",
                "--max-time",
                "5",
                "--user",
                "user:test",
                "-Q",
                "RNFR test-dir-auto",
                "-Q",
                "RNTO test-dir-auto-renamed",
                "ftp://localhost:12345/",
            ]
        );
        Ok(())
    }

    #[test]
    fn quoted_command_with_spaces_stays_one_argument() -> anyhow::Result<()> {
        let transport = CurlTransport::new(std::time::Duration::from_secs(5));
        let request = Request::new(
            &sftp(),
            "/",
            &key(),
            Operation::Quote(vec![RemoteCommand::Rename {
                from: "a b".into(),
                to: "c d".into(),
            }]),
        );
        let rendered = args(&transport.invocation(&request)?);
        assert!(rendered.contains(&"RENAME a b c d".to_string()));
        Ok(())
    }

    #[test]
    fn upload_and_download_flags() -> anyhow::Result<()> {
        let transport = CurlTransport::new(std::time::Duration::from_secs(5));
        let upload = Request::new(
            &sftp(),
            "/d/",
            &key(),
            Operation::Upload {
                local: "testfile".into(),
            },
        );
        let rendered = args(&transport.invocation(&upload)?);
        assert_eq!(&rendered[rendered.len() - 3..], ["-T", "testfile", "sftp://localhost:1234/d/"]);
        let download = Request::new(
            &ftp(),
            "/d/testfile",
            &password(),
            Operation::Download {
                local: "/tmp/pftpd-tests/testfile".into(),
            },
        );
        let rendered = args(&transport.invocation(&download)?);
        assert_eq!(
            &rendered[rendered.len() - 3..],
            ["-o", "/tmp/pftpd-tests/testfile", "ftp://localhost:12345/d/testfile"]
        );
        Ok(())
    }

    #[test]
    fn scp_profile() -> anyhow::Result<()> {
        let transport = CurlTransport::new(std::time::Duration::from_secs(5));
        let request = Request::new(
            &sftp(),
            "/saf/test-dir/sub-dir/testfile",
            &key(),
            Operation::ScpDownload {
                local: "/tmp/pftpd-tests/testfile".into(),
            },
        );
        let invocation = transport.invocation(&request)?;
        assert_eq!(invocation.program, "scp");
        assert_eq!(
            args(&invocation),
            vec![
                "-i",
                "keys/ed25519.key",
                "-P",
                "1234",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "PreferredAuthentications=publickey",
                "-o",
                "ConnectTimeout=5",
                "localhost:/saf/test-dir/sub-dir/testfile",
                "/tmp/pftpd-tests/testfile",
            ]
        );
        Ok(())
    }

    #[test]
    fn mismatched_credentials_are_rejected() {
        let transport = CurlTransport::new(std::time::Duration::from_secs(5));
        let ftp_with_key = Request::new(&ftp(), "/", &key(), Operation::List);
        assert!(transport.invocation(&ftp_with_key).is_err());
        let scp_with_password = Request::new(
            &sftp(),
            "/f",
            &password(),
            Operation::ScpUpload {
                local: "testfile".into(),
            },
        );
        assert!(transport.invocation(&scp_with_password).is_err());
    }

    #[test]
    fn tolerant_flag() {
        let request = Request::new(&sftp(), "/", &key(), Operation::List);
        assert_eq!(request.mode, FailureMode::Strict);
        assert_eq!(request.tolerant().mode, FailureMode::Tolerant);
    }

    #[test]
    fn sub_second_timeouts_are_kept() -> anyhow::Result<()> {
        let transport = CurlTransport::new(std::time::Duration::from_millis(1500));
        let list = Request::new(&sftp(), "/", &key(), Operation::List);
        let rendered = args(&transport.invocation(&list)?);
        assert_eq!(&rendered[2..4], ["--max-time", "1.5"]);
        let scp = Request::new(
            &sftp(),
            "/f",
            &key(),
            Operation::ScpUpload {
                local: "testfile".into(),
            },
        );
        let rendered = args(&transport.invocation(&scp)?);
        assert!(rendered.contains(&"ConnectTimeout=2".to_string()));
        let short = CurlTransport::new(std::time::Duration::from_millis(200));
        assert_eq!(short.connect_timeout_secs(), 1);
        Ok(())
    }

    fn process(program: &'static str, args: &[&str]) -> Invocation {
        let mut invocation = Invocation::new(program);
        for arg in args {
            invocation.arg(*arg);
        }
        invocation
    }

    fn quick_transport() -> CurlTransport {
        CurlTransport::new(std::time::Duration::from_millis(100))
            .with_kill_grace(std::time::Duration::from_millis(100))
    }

    fn list_request() -> Request {
        Request::new(&sftp(), "/", &key(), Operation::List)
    }

    #[tokio::test]
    #[traced_test]
    async fn successful_process_returns_stdout() -> anyhow::Result<()> {
        let listing = quick_transport()
            .run(&process("sh", &["-c", "echo Android"]), &list_request())
            .await?;
        assert_eq!(listing.text(), Some("Android\n"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn nonzero_exit_fails_unless_tolerated() -> anyhow::Result<()> {
        let transport = quick_transport();
        let failing = process("false", &[]);
        let error = match transport.run(&failing, &list_request()).await {
            Ok(listing) => anyhow::bail!("expected a failure, got {:?}", listing),
            Err(error) => error,
        };
        assert!(format!("{error:#}").contains("failed, status code"));
        let listing = transport.run(&failing, &list_request().tolerant()).await?;
        assert_eq!(listing, Listing::empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn timeout_fails_unless_tolerated() -> anyhow::Result<()> {
        let transport = quick_transport();
        let hung = process("sh", &["-c", "sleep 10"]);
        let started = std::time::Instant::now();
        let error = match transport.run(&hung, &list_request()).await {
            Ok(listing) => anyhow::bail!("expected a timeout, got {:?}", listing),
            Err(error) => error,
        };
        assert!(format!("{error:#}").contains("timed out"));
        let listing = transport.run(&hung, &list_request().tolerant()).await?;
        assert!(listing.is_empty());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn spawn_failure_is_never_tolerated() {
        let transport = quick_transport();
        let missing = process("pfcheck-no-such-program", &[]);
        for request in [list_request(), list_request().tolerant()] {
            let error = transport
                .run(&missing, &request)
                .await
                .expect_err("spawning a missing program must fail");
            assert!(format!("{error:#}").contains("failed to spawn pfcheck-no-such-program"));
        }
    }
}
