//! Backend matrix driver.
//!
//! [`plan`] is a pure function turning a backend selection into the ordered
//! list of flows to run (and checks to flag as skipped); [`execute`] runs that
//! plan against a [`Harness`] and merges everything into one report.

use tracing::instrument;

use crate::backend::{self, ScpSupport, StorageBackend};
use crate::cycle::{self, Cycle, Harness};
use crate::protocol::Protocol;
use crate::report::{Discrepancy, Report, Violation};
use crate::transport::Transport;

const PROTOCOLS: [Protocol; 2] = [Protocol::SecureFileTransfer, Protocol::PlainFileTransfer];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowKind {
    Full,
    ReadOnly,
    /// Secure-copy upload; with a reason its listing assertion is flagged instead
    ScpUpload { unasserted: Option<&'static str> },
    ScpDownload,
    Credentials,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flow {
    pub label: String,
    pub kind: FlowKind,
    pub protocol: Protocol,
    pub base_path: String,
    /// A failure is recorded as a discrepancy instead of aborting the run
    pub tolerant: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Run(Flow),
    Skip { label: String, reason: &'static str },
}

impl Step {
    fn run(label: String, kind: FlowKind, protocol: Protocol, base_path: &str, tolerant: bool) -> Self {
        Step::Run(Flow {
            label,
            kind,
            protocol,
            base_path: base_path.to_string(),
            tolerant,
        })
    }
}

fn scp_download(steps: &mut Vec<Step>, label: String, support: ScpSupport, base_path: &str, tolerant: bool) {
    match support {
        ScpSupport::Asserted | ScpSupport::Unasserted(_) => steps.push(Step::run(
            label,
            FlowKind::ScpDownload,
            Protocol::SecureFileTransfer,
            base_path,
            tolerant,
        )),
        ScpSupport::Skipped(reason) => steps.push(Step::Skip { label, reason }),
    }
}

fn plan_direct(backend: StorageBackend, read_only: bool) -> Vec<Step> {
    let caps = backend.capabilities();
    let tag = backend.tag();
    let base_path = caps.default_base_path;
    let mut steps = Vec::new();
    let mutating = caps.mutable && !read_only;
    for protocol in PROTOCOLS {
        let kind = if mutating {
            FlowKind::Full
        } else {
            FlowKind::ReadOnly
        };
        steps.push(Step::run(
            format!("[{tag} {}]", protocol.tag()),
            kind,
            protocol,
            base_path,
            false,
        ));
    }
    let scp_label = format!("[{tag} scp]");
    let scp_upload = |unasserted| {
        Step::run(
            scp_label.clone(),
            FlowKind::ScpUpload { unasserted },
            Protocol::SecureFileTransfer,
            base_path,
            false,
        )
    };
    // an explicit --ro run does not flag the upload it leaves out
    match (mutating, caps.scp_upload) {
        (true, ScpSupport::Asserted) => steps.push(scp_upload(None)),
        (true, ScpSupport::Unasserted(reason)) => steps.push(scp_upload(Some(reason))),
        (true, ScpSupport::Skipped(reason)) => steps.push(Step::Skip {
            label: scp_label.clone(),
            reason,
        }),
        (false, ScpSupport::Skipped(reason)) if !caps.mutable => steps.push(Step::Skip {
            label: scp_label.clone(),
            reason,
        }),
        (false, _) => {}
    }
    scp_download(&mut steps, scp_label, caps.scp_download, base_path, false);
    steps.push(Step::run(
        format!("[{tag} keys]"),
        FlowKind::Credentials,
        Protocol::SecureFileTransfer,
        base_path,
        false,
    ));
    steps
}

fn plan_virtual() -> Vec<Step> {
    let caps = StorageBackend::VirtualOverlay.capabilities();
    let mut steps = Vec::new();
    for mount in backend::virtual_mounts() {
        let tag = mount.tag;
        if let Some(reason) = mount.skipped {
            steps.push(Step::Skip {
                label: format!("[virtual {tag}]"),
                reason,
            });
            continue;
        }
        steps.push(Step::run(
            format!("[virtual {tag} sftp]"),
            FlowKind::ReadOnly,
            Protocol::SecureFileTransfer,
            mount.base_path,
            true,
        ));
        let ftp_label = format!("[virtual {tag} ftp]");
        match mount.plain_transfer {
            None => steps.push(Step::run(
                ftp_label,
                FlowKind::ReadOnly,
                Protocol::PlainFileTransfer,
                mount.base_path,
                true,
            )),
            Some(reason) => steps.push(Step::Skip {
                label: ftp_label,
                reason,
            }),
        }
        scp_download(
            &mut steps,
            format!("[virtual {tag} scp]"),
            mount.scp_download,
            mount.base_path,
            true,
        );
    }
    if let ScpSupport::Skipped(reason) = caps.scp_upload {
        steps.push(Step::Skip {
            label: "[virtual scp]".to_string(),
            reason,
        });
    }
    steps.push(Step::run(
        "[virtual keys]".to_string(),
        FlowKind::Credentials,
        Protocol::SecureFileTransfer,
        backend::VIRTUAL_CREDENTIAL_MOUNT,
        true,
    ));
    steps
}

/// Ordered flows for a backend selection
#[must_use]
pub fn plan(backend: StorageBackend, read_only: bool) -> Vec<Step> {
    match backend {
        StorageBackend::VirtualOverlay => plan_virtual(),
        _ => plan_direct(backend, read_only),
    }
}

async fn run_flow<T: Transport>(
    harness: &Harness<T>,
    backend: StorageBackend,
    flow: &Flow,
) -> Result<Report, cycle::Error> {
    let cycle = Cycle::new(harness, backend, flow.protocol, &flow.base_path, &flow.label);
    match flow.kind {
        FlowKind::Full => cycle.full().await,
        FlowKind::ReadOnly => cycle.read_only().await,
        FlowKind::ScpUpload { unasserted } => cycle.scp_upload(unasserted).await,
        FlowKind::ScpDownload => cycle.scp_download().await,
        FlowKind::Credentials => cycle.credentials().await,
    }
}

/// Runs every step of `steps` in order.
///
/// A failing tolerant flow contributes its partial report plus one `aborted`
/// discrepancy and the run goes on; a failing strict flow ends the run with
/// everything gathered so far attached to the error.
#[instrument(skip(harness, steps))]
pub async fn execute<T: Transport>(
    harness: &Harness<T>,
    backend: StorageBackend,
    steps: &[Step],
) -> Result<Report, cycle::Error> {
    let mut report = Report::new();
    for step in steps {
        let flow = match step {
            Step::Skip { label, reason } => {
                report.skip(label, reason);
                continue;
            }
            Step::Run(flow) => flow,
        };
        tracing::info!("running {:?} {}", &flow.kind, &flow.label);
        match run_flow(harness, backend, flow).await {
            Ok(flow_report) => report.merge(flow_report),
            Err(error) if flow.tolerant => {
                tracing::error!("{} aborted: {:#}", &flow.label, &error.source);
                report.merge(error.report);
                report.push(Discrepancy::new(
                    &flow.label,
                    Violation::Aborted {
                        message: format!("{:#}", error.source),
                    },
                ));
            }
            Err(error) => {
                report.merge(error.report);
                return Err(cycle::Error::new(error.source, report));
            }
        }
    }
    Ok(report)
}
