//! Test-cycle engine.
//!
//! A cycle is a fixed, strictly ordered sequence of remote operations, each
//! followed by listing checks against the state the previous step produced.
//! Assertion failures are recorded and the cycle continues; infrastructure
//! failures end the cycle with an [`Error`] that still carries every
//! discrepancy gathered up to that point.

use tracing::instrument;

use crate::backend::StorageBackend;
use crate::config::TargetConfig;
use crate::credential::{self, Credential, Validity};
use crate::expect::{
    self, FIXTURE_FILE, FileState, HomeState, NEW_DIR, NEW_DIR_RENAMED, PRE_EXISTING_DIR,
    SUB_DIR, SUB_DIR_RENAMED, SubDirState,
};
use crate::fixture::{ScratchDir, TestFile};
use crate::listing::Listing;
use crate::path::{build_sub_path, dir_path, entry_path};
use crate::protocol::{Endpoint, Protocol, RemoteCommand};
use crate::report::Report;
use crate::transport::{Operation, Request, Transport};
use crate::verify::{Check, verify};

/// Error type for cycle operations that preserves the partial report
///
/// # Logging Convention
/// The Display implementation shows the full error chain of the source, so
/// `{}` and `{:#}` log the same text.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub report: Report,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, report: Report) -> Self {
        Error { source, report }
    }
}

/// Everything a cycle needs that does not change between cycles
#[derive(Debug)]
pub struct Harness<T> {
    pub transport: T,
    pub target: TargetConfig,
    pub test_file: TestFile,
    pub scratch: ScratchDir,
}

impl<T: Transport> Harness<T> {
    #[must_use]
    pub fn new(transport: T, target: TargetConfig, test_file: TestFile) -> Self {
        let scratch = ScratchDir::new(&target.scratch_dir);
        Self {
            transport,
            target,
            test_file,
            scratch,
        }
    }

    #[must_use]
    pub fn endpoint(&self, protocol: Protocol) -> Endpoint {
        let port = match protocol {
            Protocol::SecureFileTransfer => self.target.sftp_port,
            Protocol::PlainFileTransfer => self.target.ftp_port,
        };
        Endpoint {
            protocol,
            host: self.target.host.clone(),
            port,
        }
    }

    /// Default credential: the default key for the secure protocol and
    /// secure copy, the password for plain transfer
    #[must_use]
    pub fn credential(&self, protocol: Protocol) -> Credential {
        match protocol {
            Protocol::SecureFileTransfer => Credential::Key(self.target.default_key()),
            Protocol::PlainFileTransfer => credential::password(&self.target),
        }
    }
}

/// One backend, protocol and base path combination
pub struct Cycle<'a, T> {
    harness: &'a Harness<T>,
    backend: StorageBackend,
    protocol: Protocol,
    base_path: String,
    label: String,
}

impl<T> std::fmt::Debug for Cycle<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cycle")
            .field("backend", &self.backend)
            .field("protocol", &self.protocol)
            .field("base_path", &self.base_path)
            .field("label", &self.label)
            .finish()
    }
}

impl<'a, T: Transport> Cycle<'a, T> {
    #[must_use]
    pub fn new(
        harness: &'a Harness<T>,
        backend: StorageBackend,
        protocol: Protocol,
        base_path: &str,
        label: &str,
    ) -> Self {
        Self {
            harness,
            backend,
            protocol,
            base_path: base_path.to_string(),
            label: label.to_string(),
        }
    }

    fn tolerate_stray_entries(&self) -> bool {
        self.backend.capabilities().tolerates_stray_entries
    }

    fn finish(&self, result: anyhow::Result<()>, report: Report) -> Result<Report, Error> {
        match result {
            Ok(()) => Ok(report),
            Err(source) => {
                tracing::error!("{} failed: {:#}", &self.label, &source);
                Err(Error::new(source, report))
            }
        }
    }

    fn request(&self, path: &str, operation: Operation) -> Request {
        Request::new(
            &self.harness.endpoint(self.protocol),
            path,
            &self.harness.credential(self.protocol),
            operation,
        )
    }

    fn check(&self, report: &mut Report, listing: &Listing, checks: &[Check]) {
        report.extend(verify(&self.label, listing, checks));
    }

    async fn list(&self, segments: &[&str]) -> anyhow::Result<Listing> {
        let path = dir_path(&self.base_path, segments);
        tracing::info!("downloading listing: {}", path);
        self.harness
            .transport
            .execute(&self.request(&path, Operation::List))
            .await
    }

    /// Sends a remote command against the base path, returning its listing
    async fn quote(&self, command: RemoteCommand) -> anyhow::Result<Listing> {
        tracing::info!("sending {:?} to {}", &command, &self.base_path);
        self.harness
            .transport
            .execute(&self.request(&self.base_path, Operation::Quote(vec![command])))
            .await
    }

    async fn upload(&self, segments: &[&str]) -> anyhow::Result<()> {
        let path = dir_path(&self.base_path, segments);
        tracing::info!("uploading to: {}", path);
        let local = self.harness.test_file.path.clone();
        self.harness
            .transport
            .execute(&self.request(&path, Operation::Upload { local }))
            .await?;
        Ok(())
    }

    async fn download(
        &self,
        segments: &[&str],
        name: &str,
        report: &mut Report,
    ) -> anyhow::Result<()> {
        let path = format!("{}{}", dir_path(&self.base_path, segments), name);
        tracing::info!("downloading: {}", path);
        let local = self.harness.scratch.file(name);
        self.harness
            .transport
            .execute(&self.request(&path, Operation::Download { local }))
            .await?;
        self.check_download(name, report).await
    }

    async fn check_download(&self, name: &str, report: &mut Report) -> anyhow::Result<()> {
        if let Some(discrepancy) = self
            .harness
            .scratch
            .check_download(&self.label, name, self.harness.test_file.size)
            .await?
        {
            report.push(discrepancy);
        }
        Ok(())
    }

    /// Resets the scratch dir and checks the home baseline.
    ///
    /// Returns `false` when this check produced discrepancies; the rest of
    /// the cycle is then abandoned.
    async fn baseline(&self, report: &mut Report) -> anyhow::Result<bool> {
        self.harness.scratch.reset().await?;
        tracing::info!("checking home listing");
        let listing = self.list(&[]).await?;
        let found = verify(
            &self.label,
            &listing,
            &expect::home(HomeState::Baseline, self.tolerate_stray_entries()),
        );
        let clean = found.is_empty();
        report.extend(found);
        if !clean {
            tracing::warn!("{} abort due to errors in home listing", &self.label);
        }
        Ok(clean)
    }

    /// Mutating cycle: create, upload, download, rename, delete
    #[instrument(skip(self), fields(label = %self.label))]
    pub async fn full(&self) -> Result<Report, Error> {
        let mut report = Report::new();
        let result = self.full_steps(&mut report).await;
        self.finish(result, report)
    }

    async fn full_steps(&self, report: &mut Report) -> anyhow::Result<()> {
        if !self.baseline(report).await? {
            return Ok(());
        }
        let tolerate = self.tolerate_stray_entries();
        let file_name = self.harness.test_file.name.as_str();
        let renamed_file = expect::renamed_file_name(file_name);
        let size = self.harness.test_file.size;

        tracing::info!("creating dir: {}", NEW_DIR);
        let listing = self.quote(RemoteCommand::Mkdir(NEW_DIR.to_string())).await?;
        self.check(report, &listing, &expect::home(HomeState::Created, tolerate));

        tracing::info!("creating sub dir: {}", SUB_DIR);
        let sub = [NEW_DIR, SUB_DIR];
        self.quote(RemoteCommand::Mkdir(build_sub_path(&sub))).await?;
        let listing = self.list(&[NEW_DIR]).await?;
        self.check(report, &listing, &expect::sub_dir(SubDirState::Created));

        self.upload(&sub).await?;
        let listing = self.list(&sub).await?;
        self.check(report, &listing, &expect::file(FileState::Uploaded, file_name, size)?);

        self.download(&sub, file_name, report).await?;

        tracing::info!("renaming file: {} to {}", file_name, &renamed_file);
        self.quote(RemoteCommand::Rename {
            from: entry_path(&sub, file_name),
            to: entry_path(&sub, &renamed_file),
        })
        .await?;
        let listing = self.list(&sub).await?;
        self.check(report, &listing, &expect::file(FileState::Renamed, file_name, size)?);

        self.download(&sub, &renamed_file, report).await?;

        tracing::info!("renaming sub dir: {} to {}", SUB_DIR, SUB_DIR_RENAMED);
        self.quote(RemoteCommand::Rename {
            from: entry_path(&[NEW_DIR], SUB_DIR),
            to: entry_path(&[NEW_DIR], SUB_DIR_RENAMED),
        })
        .await?;
        let listing = self.list(&[NEW_DIR]).await?;
        self.check(report, &listing, &expect::sub_dir(SubDirState::Renamed));

        tracing::info!("renaming dir: {} to {}", NEW_DIR, NEW_DIR_RENAMED);
        self.quote(RemoteCommand::Rename {
            from: NEW_DIR.to_string(),
            to: NEW_DIR_RENAMED.to_string(),
        })
        .await?;
        let listing = self.list(&[]).await?;
        self.check(report, &listing, &expect::home(HomeState::Renamed, tolerate));

        let renamed_sub = [NEW_DIR_RENAMED, SUB_DIR_RENAMED];
        tracing::info!("removing file: {}", &renamed_file);
        self.quote(RemoteCommand::Delete(entry_path(&renamed_sub, &renamed_file)))
            .await?;
        let listing = self.list(&renamed_sub).await?;
        self.check(report, &listing, &expect::file(FileState::Gone, file_name, size)?);

        tracing::info!("removing sub dir: {}", SUB_DIR_RENAMED);
        self.quote(RemoteCommand::Rmdir(build_sub_path(&renamed_sub)))
            .await?;
        let listing = self.list(&[NEW_DIR_RENAMED]).await?;
        self.check(report, &listing, &expect::sub_dir(SubDirState::Gone));

        tracing::info!("removing dir: {}", NEW_DIR_RENAMED);
        let listing = self
            .quote(RemoteCommand::Rmdir(NEW_DIR_RENAMED.to_string()))
            .await?;
        self.check(report, &listing, &expect::home(HomeState::Baseline, tolerate));
        Ok(())
    }

    /// Non-mutating cycle over the pre-existing fixture tree
    #[instrument(skip(self), fields(label = %self.label))]
    pub async fn read_only(&self) -> Result<Report, Error> {
        let mut report = Report::new();
        let result = self.read_only_steps(&mut report).await;
        self.finish(result, report)
    }

    async fn read_only_steps(&self, report: &mut Report) -> anyhow::Result<()> {
        if !self.baseline(report).await? {
            return Ok(());
        }
        let listing = self.list(&[PRE_EXISTING_DIR]).await?;
        self.check(report, &listing, &expect::sub_dir(SubDirState::Created));

        let fixture = [PRE_EXISTING_DIR, SUB_DIR];
        let listing = self.list(&fixture).await?;
        self.check(
            report,
            &listing,
            &expect::file(FileState::Uploaded, FIXTURE_FILE, self.harness.test_file.size)?,
        );

        self.download(&fixture, FIXTURE_FILE, report).await
    }

    /// Creates the directory tree over the secure protocol, uploads through
    /// secure copy and verifies the listing, then removes the tree again.
    ///
    /// With `unasserted` set the listing check is replaced by a skipped check
    /// carrying that reason.
    #[instrument(skip(self), fields(label = %self.label))]
    pub async fn scp_upload(&self, unasserted: Option<&str>) -> Result<Report, Error> {
        let mut report = Report::new();
        let result = self.scp_upload_steps(unasserted, &mut report).await;
        self.finish(result, report)
    }

    async fn scp_upload_steps(
        &self,
        unasserted: Option<&str>,
        report: &mut Report,
    ) -> anyhow::Result<()> {
        let file_name = self.harness.test_file.name.as_str();
        let sub = [NEW_DIR, SUB_DIR];
        tracing::info!("creating dir: {}", NEW_DIR);
        self.quote(RemoteCommand::Mkdir(NEW_DIR.to_string())).await?;
        self.quote(RemoteCommand::Mkdir(build_sub_path(&sub))).await?;

        let remote = dir_path(&self.base_path, &sub);
        tracing::info!("scp upload {}", remote);
        let scp = Request::new(
            &self.harness.endpoint(Protocol::SecureFileTransfer),
            &remote,
            &self.harness.credential(Protocol::SecureFileTransfer),
            Operation::ScpUpload {
                local: self.harness.test_file.path.clone(),
            },
        );
        self.harness.transport.execute(&scp).await?;

        let listing = self.list(&sub).await?;
        match unasserted {
            None => self.check(
                report,
                &listing,
                &expect::file(FileState::Uploaded, file_name, self.harness.test_file.size)?,
            ),
            Some(reason) => report.skip(&self.label, reason),
        }

        tracing::info!("cleaning up: {}", NEW_DIR);
        self.quote(RemoteCommand::Delete(entry_path(&sub, file_name)))
            .await?;
        self.quote(RemoteCommand::Rmdir(build_sub_path(&sub))).await?;
        self.quote(RemoteCommand::Rmdir(NEW_DIR.to_string())).await?;
        Ok(())
    }

    /// Downloads the pre-existing fixture file through secure copy
    #[instrument(skip(self), fields(label = %self.label))]
    pub async fn scp_download(&self) -> Result<Report, Error> {
        let mut report = Report::new();
        let result = self.scp_download_steps(&mut report).await;
        self.finish(result, report)
    }

    async fn scp_download_steps(&self, report: &mut Report) -> anyhow::Result<()> {
        self.harness.scratch.reset().await?;
        let remote = format!(
            "{}{}",
            dir_path(&self.base_path, &[PRE_EXISTING_DIR, SUB_DIR]),
            FIXTURE_FILE
        );
        tracing::info!("scp download {}", remote);
        let scp = Request::new(
            &self.harness.endpoint(Protocol::SecureFileTransfer),
            &remote,
            &self.harness.credential(Protocol::SecureFileTransfer),
            Operation::ScpDownload {
                local: self.harness.scratch.file(FIXTURE_FILE),
            },
        );
        self.harness.transport.execute(&scp).await?;
        self.check_download(FIXTURE_FILE, report).await
    }

    /// Lists the base path once per credential of the credential matrix.
    ///
    /// Valid credentials must reproduce the home baseline; invalid ones are
    /// sent in tolerant mode and must produce no output at all.
    #[instrument(skip(self), fields(label = %self.label))]
    pub async fn credentials(&self) -> Result<Report, Error> {
        let mut report = Report::new();
        let result = self.credentials_steps(&mut report).await;
        self.finish(result, report)
    }

    async fn credentials_steps(&self, report: &mut Report) -> anyhow::Result<()> {
        let endpoint = self.harness.endpoint(Protocol::SecureFileTransfer);
        let baseline = expect::home(HomeState::Baseline, self.tolerate_stray_entries());
        for case in credential::matrix(&self.harness.target) {
            tracing::info!("{} listing {}", &case.label, &self.base_path);
            let request = Request::new(&endpoint, &self.base_path, &case.credential, Operation::List);
            match case.validity {
                Validity::Valid => {
                    let listing = self.harness.transport.execute(&request).await?;
                    report.extend(verify(&case.label, &listing, &baseline));
                }
                Validity::Invalid => {
                    let listing = self.harness.transport.execute(&request.tolerant()).await?;
                    report.extend(verify(&case.label, &listing, &[Check::empty()]));
                }
            }
        }
        Ok(())
    }
}
