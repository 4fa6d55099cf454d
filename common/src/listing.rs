/// Raw output of a remote call.
///
/// Kept as bytes: a listing that is not valid UTF-8 is still a result, it just
/// fails every textual expectation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    raw: Vec<u8>,
}

impl Listing {
    #[must_use]
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The listing as text, `None` when it is not valid UTF-8
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.raw).ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Entry names, taken as the last whitespace-delimited field of each line
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.text()
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().last())
    }
}

impl From<&str> for Listing {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

impl std::fmt::Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.raw))
    }
}
