//! Conformance checks for the primitive ftpd gateway.
//!
//! The gateway exposes device storage over SFTP, FTP and secure copy, backed
//! by several storage implementations. This crate drives fixed cycles of
//! remote operations against a live server and verifies the observable
//! filesystem state after every step.
//!
//! # Layout
//!
//! - [`transport`] executes one remote operation (`curl` / `scp` processes)
//! - [`verify`] and [`expect`] describe and evaluate listing expectations
//! - [`cycle`] runs the full, read-only, secure-copy and credential cycles
//! - [`matrix`] decides which cycles run for a storage backend
//! - [`report`] collects discrepancies into the final report
//!
//! # Error handling
//!
//! Assertion failures are never errors: they are recorded as
//! [`report::Discrepancy`] values and execution continues. Infrastructure
//! failures are `anyhow` errors wrapped in [`cycle::Error`], which keeps the
//! partial report so nothing gathered before the failure is lost.

use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod backend;
pub mod config;
pub mod credential;
pub mod cycle;
pub mod expect;
pub mod fixture;
pub mod listing;
pub mod matrix;
pub mod path;
pub mod protocol;
pub mod report;
pub mod transport;
pub mod verify;

#[cfg(test)]
mod testutils;

pub use backend::StorageBackend;
pub use config::{OutputConfig, TargetConfig, TracingConfig};
pub use report::Report;

/// Generates a debug log filename from a prefix, unique per run
#[must_use]
pub fn generate_debug_log_filename(prefix: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
    format!("{}-{}-{}.log", prefix, timestamp, std::process::id())
}

/// Level from `-v`/`-q`, with `RUST_LOG` directives layered on top
fn stderr_filter(output: &OutputConfig) -> tracing_subscriber::EnvFilter {
    let env = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    verbosity_filter(output, env.as_deref())
}

fn verbosity_filter(output: &OutputConfig, env: Option<&str>) -> tracing_subscriber::EnvFilter {
    if output.quiet {
        return tracing_subscriber::EnvFilter::new("error");
    }
    let level = match output.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter = tracing_subscriber::EnvFilter::new(level);
    for directive in env.unwrap_or_default().split(',').map(str::trim) {
        if directive.is_empty() {
            continue;
        }
        match directive.parse::<tracing_subscriber::filter::Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(error) => eprintln!("ignoring log directive {directive:?}: {error}"),
        }
    }
    filter
}

fn setup_tracing(output: &OutputConfig, tracing: &TracingConfig) -> anyhow::Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter(output));
    let file_layer = match &tracing.debug_log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| anyhow::anyhow!("cannot create debug log file {:?}: {:#}", path, e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_filter(tracing_subscriber::EnvFilter::new("debug")),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {:#}", e))
}

fn print_report(report: &Report, json: bool) {
    if json {
        match report.to_json() {
            Ok(text) => println!("{text}"),
            Err(error) => tracing::error!("{:#}", error),
        }
    } else {
        print!("\n{report}");
    }
}

/// Runs `func` on a single-threaded runtime and prints its report to stdout.
///
/// The report is printed whether or not the run completed; a hard abort
/// prints whatever was gathered before it. Returns `None` on a hard abort so
/// the caller can exit with a nonzero status.
pub fn run<Fut>(
    output: OutputConfig,
    tracing: TracingConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Report>
where
    Fut: std::future::Future<Output = Result<Report, cycle::Error>>,
{
    if let Err(error) = setup_tracing(&output, &tracing) {
        eprintln!("{error:#}");
        return None;
    }
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("failed to create runtime: {:#}", error);
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(report) => {
            print_report(&report, output.json);
            Some(report)
        }
        Err(error) => {
            tracing::error!("run aborted: {}", &error);
            print_report(&error.report, output.json);
            if !output.json {
                println!("{} aborted {}\n{}", report::BANNER, report::BANNER, &error);
            }
            None
        }
    }
}
