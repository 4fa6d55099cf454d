//! Listing verifier.
//!
//! Evaluates a set of [`Check`]s against one [`Listing`]. Every check is
//! evaluated, whatever the outcome of the ones before it, and each failure
//! becomes one [`Discrepancy`] carrying the caller's label.

use crate::listing::Listing;
use crate::report::{Discrepancy, Scope, Violation};

/// A declarative assertion against listing text
#[derive(Clone, Debug)]
pub enum Expectation {
    /// The text contains the exact substring
    Present(String),
    /// The text does not contain the substring
    Absent(String),
    /// No listing line names this entry (last field match, not substring)
    NoEntry(String),
    /// At least one line matches the pattern
    Matches(regex::Regex),
    /// Nothing was produced at all
    Empty,
}

impl Expectation {
    /// Pattern for a file line: `<anything> <size> <Mon dd hh:mm> <name>`.
    pub fn sized_entry(name: &str, size: u64) -> anyhow::Result<Self> {
        let pattern = format!(
            r"(?m)^(.*) {} (... .. ..:..) {}\r?$",
            size,
            regex::escape(name)
        );
        let regex = regex::Regex::new(&pattern)
            .map_err(|e| anyhow::anyhow!("invalid listing pattern {:?}: {:#}", pattern, e))?;
        Ok(Self::Matches(regex))
    }
}

#[derive(Clone, Debug)]
pub struct Check {
    pub scope: Scope,
    pub expectation: Expectation,
}

impl Check {
    pub fn present(scope: Scope, name: &str) -> Self {
        Self {
            scope,
            expectation: Expectation::Present(name.to_string()),
        }
    }

    pub fn absent(scope: Scope, name: &str) -> Self {
        Self {
            scope,
            expectation: Expectation::Absent(name.to_string()),
        }
    }

    pub fn no_entry(scope: Scope, name: &str) -> Self {
        Self {
            scope,
            expectation: Expectation::NoEntry(name.to_string()),
        }
    }

    pub fn sized_entry(name: &str, size: u64) -> anyhow::Result<Self> {
        Ok(Self {
            scope: Scope::File,
            expectation: Expectation::sized_entry(name, size)?,
        })
    }

    pub fn empty() -> Self {
        Self {
            scope: Scope::Home,
            expectation: Expectation::Empty,
        }
    }

    /// Evaluates this check, returning the violation if it does not hold
    #[must_use]
    pub fn evaluate(&self, listing: &Listing) -> Option<Violation> {
        let text = listing.text();
        match &self.expectation {
            Expectation::Present(name) => match text {
                Some(text) if text.contains(name.as_str()) => None,
                _ => Some(Violation::Missing {
                    scope: self.scope,
                    name: name.clone(),
                }),
            },
            Expectation::Absent(name) => match text {
                Some(text) if !text.contains(name.as_str()) => None,
                _ => Some(Violation::Present {
                    scope: self.scope,
                    name: name.clone(),
                }),
            },
            Expectation::NoEntry(name) => {
                if text.is_some() && !listing.entry_names().any(|entry| entry == name) {
                    None
                } else {
                    Some(Violation::Present {
                        scope: self.scope,
                        name: name.clone(),
                    })
                }
            }
            Expectation::Matches(regex) => match text {
                Some(text) if regex.is_match(text) => None,
                _ => Some(Violation::NoMatchingLine {
                    pattern: regex.as_str().to_string(),
                }),
            },
            Expectation::Empty => {
                if listing.is_empty() {
                    None
                } else {
                    Some(Violation::NotEmpty)
                }
            }
        }
    }
}

/// Evaluates all checks against `listing`, returning one discrepancy per failed check
#[must_use]
pub fn verify(label: &str, listing: &Listing, checks: &[Check]) -> Vec<Discrepancy> {
    tracing::debug!("{} verifying listing:\n{}", label, listing);
    checks
        .iter()
        .filter_map(|check| check.evaluate(listing))
        .map(|violation| Discrepancy::new(label, violation))
        .collect()
}
