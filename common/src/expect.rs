//! Fixed remote names and the check sets describing the expected remote state
//! at each point of a cycle.

use crate::report::Scope;
use crate::verify::Check;

/// Entries every home listing must contain
pub const HOME_ENTRIES: [&str; 3] = ["Android", "DCIM", PRE_EXISTING_DIR];
/// Pre-existing fixture directory, holds `sub-dir/testfile`
pub const PRE_EXISTING_DIR: &str = "test-dir";
/// Pre-existing fixture file under `test-dir/sub-dir`, same bytes as the
/// local test file whatever that one is called
pub const FIXTURE_FILE: &str = "testfile";
pub const NEW_DIR: &str = "test-dir-auto";
pub const NEW_DIR_RENAMED: &str = "test-dir-auto-renamed";
pub const SUB_DIR: &str = "sub-dir";
pub const SUB_DIR_RENAMED: &str = "sub-dir-renamed";
pub const RENAMED_FILE_SUFFIX: &str = "-renamed";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HomeState {
    /// No created artifact is around
    Baseline,
    /// The new top directory exists under its original name
    Created,
    /// The new top directory exists under its renamed name
    Renamed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubDirState {
    Created,
    /// Renamed, the original name must no longer be an entry
    Renamed,
    Gone,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileState {
    Uploaded,
    /// Renamed in place, the original name must no longer be an entry
    Renamed,
    Gone,
}

/// Name the test file carries after the in-place rename
#[must_use]
pub fn renamed_file_name(name: &str) -> String {
    format!("{name}{RENAMED_FILE_SUFFIX}")
}

/// Checks for a home listing.
///
/// With `tolerate_stray_entries` the stray sub-directory absence check is left
/// out; document-provider backends may keep orphaned containers around.
#[must_use]
pub fn home(state: HomeState, tolerate_stray_entries: bool) -> Vec<Check> {
    let mut checks: Vec<Check> = HOME_ENTRIES
        .iter()
        .map(|name| Check::present(Scope::Home, name))
        .collect();
    match state {
        HomeState::Baseline => {
            checks.push(Check::absent(Scope::Home, NEW_DIR));
            checks.push(Check::absent(Scope::Home, NEW_DIR_RENAMED));
        }
        HomeState::Created => checks.push(Check::present(Scope::Home, NEW_DIR)),
        HomeState::Renamed => checks.push(Check::present(Scope::Home, NEW_DIR_RENAMED)),
    }
    if !tolerate_stray_entries {
        checks.push(Check::absent(Scope::Home, SUB_DIR));
    }
    checks
}

/// Checks for a depth-1 listing (the directory holding the sub-directory)
#[must_use]
pub fn sub_dir(state: SubDirState) -> Vec<Check> {
    match state {
        SubDirState::Created => vec![Check::present(Scope::Directory, SUB_DIR)],
        SubDirState::Renamed => vec![
            Check::present(Scope::Directory, SUB_DIR_RENAMED),
            Check::no_entry(Scope::Directory, SUB_DIR),
        ],
        SubDirState::Gone => vec![
            Check::absent(Scope::Directory, SUB_DIR),
            Check::absent(Scope::Directory, SUB_DIR_RENAMED),
        ],
    }
}

/// Checks for a depth-2 listing (the directory holding the file)
pub fn file(state: FileState, name: &str, size: u64) -> anyhow::Result<Vec<Check>> {
    let renamed = renamed_file_name(name);
    let checks = match state {
        FileState::Uploaded => vec![
            Check::present(Scope::File, name),
            Check::sized_entry(name, size)?,
        ],
        FileState::Renamed => vec![
            Check::present(Scope::File, &renamed),
            Check::sized_entry(&renamed, size)?,
            Check::no_entry(Scope::File, name),
        ],
        FileState::Gone => vec![
            Check::absent(Scope::File, name),
            Check::absent(Scope::File, &renamed),
        ],
    };
    Ok(checks)
}
