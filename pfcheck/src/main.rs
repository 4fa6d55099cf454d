use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pfcheck",
    version,
    about = "End-to-end conformance checks for a running primitive ftpd server",
    long_about = "`pfcheck` drives scripted cycles of remote operations against a running primitive ftpd \
server over SFTP, FTP and scp and verifies the server's listings after every step.

The server's ports must already be reachable on --host (e.g. forwarded with `adb forward`).

EXAMPLE:
    # Full mutating run against the plain filesystem backend
    pfcheck --storage fs

    # Read-only run against the document provider backend, JSON report
    pfcheck --storage saf --ro --json

The report is printed to stdout: either a 'no errors' banner or one discrepancy per line. \
The exit status is 0 whenever the run completed, discrepancies or not."
)]
struct Args {
    // Selection
    /// Storage backend the server is configured with
    #[arg(long, value_enum, value_name = "TYPE", help_heading = "Selection")]
    storage: common::StorageBackend,

    /// Only run non-mutating cycles (implied for safro and virtual)
    #[arg(long = "ro", help_heading = "Selection")]
    read_only: bool,

    // Target
    /// Host all server ports are reachable on
    #[arg(long, value_name = "HOST", help_heading = "Target")]
    host: Option<String>,

    /// SFTP port, also used for scp
    #[arg(long, value_name = "PORT", help_heading = "Target")]
    sftp_port: Option<u16>,

    /// FTP control port
    #[arg(long, value_name = "PORT", help_heading = "Target")]
    ftp_port: Option<u16>,

    /// FTP passive mode port
    #[arg(long, value_name = "PORT", help_heading = "Target")]
    ftp_passive_port: Option<u16>,

    /// Timeout for a single remote call
    ///
    /// This option accepts a human readable duration, e.g. "500ms", "5s", "1min" etc.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration, help_heading = "Target")]
    timeout: Option<std::time::Duration>,

    // Fixtures & credentials
    /// Directory holding the key fixtures (rsa.key, ed25519.key, rsa.bad.key, ...)
    #[arg(long, value_name = "PATH", help_heading = "Fixtures & credentials")]
    key_dir: Option<std::path::PathBuf>,

    /// Local file used as upload source; the read-only fixture must have the same size
    #[arg(long, value_name = "PATH", help_heading = "Fixtures & credentials")]
    test_file: Option<std::path::PathBuf>,

    /// Local directory for downloaded files, deleted and recreated before every cycle
    #[arg(long, value_name = "PATH", help_heading = "Fixtures & credentials")]
    scratch_dir: Option<std::path::PathBuf>,

    /// Username for password authentication
    #[arg(long, value_name = "USER", help_heading = "Fixtures & credentials")]
    user: Option<String>,

    /// Password for password authentication
    #[arg(long, value_name = "PASSWORD", help_heading = "Fixtures & credentials")]
    password: Option<String>,

    // Progress & output
    /// Verbose level: -v DEBUG / -vv TRACE (default: INFO)
    ///
    /// RUST_LOG directives are added on top of this level, e.g. RUST_LOG=common::transport=trace.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, only log errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Print the report as JSON
    #[arg(long, help_heading = "Progress & output")]
    json: bool,

    /// Enable debug logging to a file with the given prefix
    #[arg(long, value_name = "PREFIX", help_heading = "Progress & output")]
    debug_log_prefix: Option<String>,
}

impl Args {
    fn target_config(&self) -> common::TargetConfig {
        let defaults = common::TargetConfig::default();
        common::TargetConfig {
            host: self.host.clone().unwrap_or(defaults.host),
            sftp_port: self.sftp_port.unwrap_or(defaults.sftp_port),
            ftp_port: self.ftp_port.unwrap_or(defaults.ftp_port),
            ftp_passive_port: self.ftp_passive_port.unwrap_or(defaults.ftp_passive_port),
            key_dir: self.key_dir.clone().unwrap_or(defaults.key_dir),
            user: self.user.clone().unwrap_or(defaults.user),
            password: self.password.clone().unwrap_or(defaults.password),
            test_file: self.test_file.clone().unwrap_or(defaults.test_file),
            scratch_dir: self.scratch_dir.clone().unwrap_or(defaults.scratch_dir),
            timeout: self.timeout.unwrap_or(defaults.timeout),
        }
    }
}

fn setup_error(source: anyhow::Error) -> common::cycle::Error {
    common::cycle::Error::new(source, common::Report::new())
}

#[instrument(skip(args), fields(storage = %args.storage))]
async fn async_main(args: Args) -> Result<common::Report, common::cycle::Error> {
    let target = args.target_config();
    target.validate().map_err(setup_error)?;
    let test_file = common::fixture::TestFile::load(&target.test_file)
        .await
        .map_err(setup_error)?;
    tracing::info!(
        "target {}: sftp {}, ftp {} (passive {}), timeout {}",
        &target.host,
        target.sftp_port,
        target.ftp_port,
        target.ftp_passive_port,
        humantime::format_duration(target.timeout)
    );
    if !args.storage.capabilities().mutable && !args.read_only {
        tracing::info!("{} backend: read-only cycles only", args.storage);
    }
    let transport = common::transport::CurlTransport::new(target.timeout);
    let harness = common::cycle::Harness::new(transport, target, test_file);
    let steps = common::matrix::plan(args.storage, args.read_only);
    common::matrix::execute(&harness, args.storage, &steps).await
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let debug_log_file = args.debug_log_prefix.as_ref().map(|prefix| {
        let filename = common::generate_debug_log_filename(prefix);
        eprintln!("pfcheck: Debug logging to file: {filename}");
        filename
    });
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        json: args.json,
    };
    let tracing = common::TracingConfig { debug_log_file };
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let res = common::run(output, tracing, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
