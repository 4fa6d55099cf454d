//! Storage backends and their capability profiles.
//!
//! Known backend limitations are data here, never scattered special cases in
//! the cycles: the matrix driver consults [`Capabilities`] to decide what to
//! run, what to relax and what to flag as skipped.

use enum_map::{Enum, EnumMap, enum_map};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, clap::ValueEnum)]
pub enum StorageBackend {
    /// Direct filesystem access
    #[value(name = "fs")]
    DirectFilesystem,
    /// Filesystem access through a privileged (root) helper
    #[value(name = "root")]
    PrivilegedFilesystem,
    /// Document provider (storage access framework)
    #[value(name = "saf")]
    DocumentProvider,
    /// Read-only document provider
    #[value(name = "safro")]
    ReadOnlyDocumentProvider,
    /// Union of the other backends under synthetic mount points
    #[value(name = "virtual")]
    VirtualOverlay,
}

impl StorageBackend {
    /// Short tag used on the command line and in discrepancy labels
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            StorageBackend::DirectFilesystem => "fs",
            StorageBackend::PrivilegedFilesystem => "root",
            StorageBackend::DocumentProvider => "saf",
            StorageBackend::ReadOnlyDocumentProvider => "safro",
            StorageBackend::VirtualOverlay => "virtual",
        }
    }

    #[must_use]
    pub fn capabilities(self) -> Capabilities {
        capability_table()[self]
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// How a secure-copy sub-flow is treated on a backend
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScpSupport {
    /// Exercised and verified
    Asserted,
    /// Exercised, but its listing assertion is flagged instead of made
    Unasserted(&'static str),
    /// Not exercised at all, flagged in the report
    Skipped(&'static str),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Base path the backend's home directory is served under
    pub default_base_path: &'static str,
    /// Whether mutating cycles may run
    pub mutable: bool,
    /// Home listings may keep orphaned sub-directory entries after deletion
    pub tolerates_stray_entries: bool,
    pub scp_upload: ScpSupport,
    pub scp_download: ScpSupport,
}

const ROOT_SCP_UPLOAD: &str = "scp upload listing not asserted: privileged backend stores zero-length files";
const ROOT_SCP_DOWNLOAD: &str = "scp download skipped: privileged backend drops the connection on read";

/// The per-backend capability matrix
#[must_use]
pub fn capability_table() -> EnumMap<StorageBackend, Capabilities> {
    enum_map! {
        StorageBackend::DirectFilesystem => Capabilities {
            default_base_path: "/storage/emulated/0/",
            mutable: true,
            tolerates_stray_entries: false,
            scp_upload: ScpSupport::Asserted,
            scp_download: ScpSupport::Asserted,
        },
        StorageBackend::PrivilegedFilesystem => Capabilities {
            default_base_path: "/storage/emulated/0/",
            mutable: true,
            tolerates_stray_entries: false,
            scp_upload: ScpSupport::Unasserted(ROOT_SCP_UPLOAD),
            scp_download: ScpSupport::Skipped(ROOT_SCP_DOWNLOAD),
        },
        StorageBackend::DocumentProvider => Capabilities {
            default_base_path: "/",
            mutable: true,
            tolerates_stray_entries: true,
            scp_upload: ScpSupport::Asserted,
            scp_download: ScpSupport::Asserted,
        },
        StorageBackend::ReadOnlyDocumentProvider => Capabilities {
            default_base_path: "/",
            mutable: false,
            tolerates_stray_entries: true,
            scp_upload: ScpSupport::Skipped("scp upload skipped: backend is read-only"),
            scp_download: ScpSupport::Asserted,
        },
        StorageBackend::VirtualOverlay => Capabilities {
            default_base_path: "/",
            mutable: false,
            tolerates_stray_entries: true,
            scp_upload: ScpSupport::Skipped("scp upload skipped: overlay directories cannot be created over curl"),
            scp_download: ScpSupport::Asserted,
        },
    }
}

/// One constituent of the virtual overlay
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VirtualMount {
    /// Label tag, e.g. `fs` for `[virtual fs sftp]`
    pub tag: &'static str,
    pub base_path: &'static str,
    /// `None` when plain transfer is exercised, the skip reason otherwise
    pub plain_transfer: Option<&'static str>,
    pub scp_download: ScpSupport,
    /// Reason the whole mount is left out, if it is
    pub skipped: Option<&'static str>,
}

/// Mount the credential matrix runs against on the overlay
pub const VIRTUAL_CREDENTIAL_MOUNT: &str = "/fs/storage/emulated/0/";

/// Mounts of the virtual overlay, in execution order
#[must_use]
pub fn virtual_mounts() -> [VirtualMount; 4] {
    [
        VirtualMount {
            tag: "fs",
            base_path: VIRTUAL_CREDENTIAL_MOUNT,
            plain_transfer: Some("ftp skipped: curl cannot change into overlay directories"),
            scp_download: ScpSupport::Asserted,
            skipped: None,
        },
        VirtualMount {
            tag: "superuser",
            base_path: "/superuser/storage/emulated/0/",
            plain_transfer: None,
            scp_download: ScpSupport::Skipped(ROOT_SCP_DOWNLOAD),
            skipped: None,
        },
        VirtualMount {
            tag: "saf",
            base_path: "/saf/",
            plain_transfer: None,
            scp_download: ScpSupport::Asserted,
            skipped: None,
        },
        VirtualMount {
            tag: "rosaf",
            base_path: "/rosaf/",
            plain_transfer: None,
            scp_download: ScpSupport::Asserted,
            skipped: Some("skipped: read-only document provider unusable through the overlay"),
        },
    ]
}
