//! Discrepancies and the final report.
//!
//! A discrepancy is a recorded mismatch between the expected and the observed
//! remote state. Recording one never aborts anything: cycles keep going and
//! everything is merged into one [`Report`] that is printed at the very end.

use serde::Serialize;

/// Which listing an entry check was run against, only affects wording
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The base path ("home") listing
    Home,
    /// A directory below home
    Directory,
    /// A directory expected to hold files
    File,
}

impl Scope {
    fn noun(self) -> &'static str {
        match self {
            Scope::Home => "dir in home",
            Scope::Directory => "dir",
            Scope::File => "file",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Expected entry not in the listing
    Missing { scope: Scope, name: String },
    /// Forbidden entry in the listing
    Present { scope: Scope, name: String },
    /// No listing line matched the size/timestamp pattern
    NoMatchingLine { pattern: String },
    /// Output was produced where none was allowed
    NotEmpty,
    /// Downloaded artifact does not exist locally
    MissingLocalFile { name: String },
    /// Downloaded artifact has the wrong size
    LocalSizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
    /// A tolerant boundary caught an infrastructure failure
    Aborted { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// Identifies backend, protocol and flow, e.g. `[fs sftp]`
    pub label: String,
    #[serde(flatten)]
    pub violation: Violation,
}

impl Discrepancy {
    pub fn new(label: &str, violation: Violation) -> Self {
        Self {
            label: label.to_string(),
            violation,
        }
    }
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = &self.label;
        match &self.violation {
            Violation::Missing { scope, name } => {
                write!(f, "{label} missing {}: {name}", scope.noun())
            }
            Violation::Present { scope, name } => {
                write!(f, "{label} present {}: {name}", scope.noun())
            }
            Violation::NoMatchingLine { pattern } => {
                write!(f, "{label} wrong upload filesize: {pattern}")
            }
            Violation::NotEmpty => write!(f, "{label} not empty"),
            Violation::MissingLocalFile { name } => {
                write!(f, "{label} missing local file: {name}")
            }
            Violation::LocalSizeMismatch { name, actual, .. } => {
                write!(f, "{label} bad local filesize: {name}, size: {actual}")
            }
            Violation::Aborted { message } => write!(f, "{label} aborted: {message}"),
        }
    }
}

/// An assertion that was deliberately not made, kept visible in the report
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedCheck {
    pub label: String,
    pub reason: String,
}

impl std::fmt::Display for SkippedCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.label, self.reason)
    }
}

/// Append-only collection of discrepancies and skipped checks
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    discrepancies: Vec<Discrepancy>,
    skipped: Vec<SkippedCheck>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, discrepancy: Discrepancy) {
        tracing::warn!("discrepancy: {}", &discrepancy);
        self.discrepancies.push(discrepancy);
    }

    pub fn extend(&mut self, discrepancies: impl IntoIterator<Item = Discrepancy>) {
        for discrepancy in discrepancies {
            self.push(discrepancy);
        }
    }

    pub fn skip(&mut self, label: &str, reason: &str) {
        tracing::warn!("{} skipped: {}", label, reason);
        self.skipped.push(SkippedCheck {
            label: label.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Appends everything recorded in `other`, preserving order
    pub fn merge(&mut self, other: Report) {
        self.discrepancies.extend(other.discrepancies);
        self.skipped.extend(other.skipped);
    }

    pub fn discrepancies(&self) -> &[Discrepancy] {
        &self.discrepancies
    }

    pub fn skipped(&self) -> &[SkippedCheck] {
        &self.skipped
    }

    /// Number of discrepancies; skipped checks do not count
    pub fn len(&self) -> usize {
        self.discrepancies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discrepancies.is_empty()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("failed to serialize report: {:#}", e))
    }
}

impl std::ops::Add for Report {
    type Output = Self;
    fn add(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }
}

pub(crate) const BANNER: &str = "*****************************";

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.skipped.is_empty() {
            writeln!(f, "{BANNER} skipped checks {BANNER}")?;
            for skipped in &self.skipped {
                writeln!(f, "{skipped}")?;
            }
            writeln!(f)?;
        }
        if self.discrepancies.is_empty() {
            writeln!(f, "{BANNER} no errors {BANNER}")?;
        } else {
            writeln!(f, "{BANNER} errors {BANNER}")?;
            for discrepancy in &self.discrepancies {
                writeln!(f, "{discrepancy}")?;
            }
        }
        Ok(())
    }
}
