//! Remote path composition.
//!
//! Remote paths are plain strings: they end up verbatim in URLs, in remote
//! sub-protocol commands and in `host:path` secure-copy operands, none of
//! which follow local `std::path` semantics.

/// Joins path segments with `/`, producing `""` for an empty list.
///
/// No leading or trailing separator is added; callers append a trailing `/`
/// where the protocol needs a directory marker.
///
/// ```
/// assert_eq!(common::path::build_sub_path(&["a", "b"]), "a/b");
/// assert_eq!(common::path::build_sub_path::<&str>(&[]), "");
/// ```
pub fn build_sub_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        if idx > 0 {
            path.push('/');
        }
        path.push_str(segment.as_ref());
    }
    path
}

/// Directory path relative to a base path, with the trailing `/` marker
/// curl needs to treat the URL as a directory listing.
pub fn dir_path<S: AsRef<str>>(base_path: &str, segments: &[S]) -> String {
    let sub_path = build_sub_path(segments);
    if sub_path.is_empty() {
        base_path.to_string()
    } else {
        format!("{base_path}{sub_path}/")
    }
}

/// Path of an entry inside a (possibly empty) sequence of directories.
pub fn entry_path<S: AsRef<str>>(segments: &[S], name: &str) -> String {
    let sub_path = build_sub_path(segments);
    if sub_path.is_empty() {
        name.to_string()
    } else {
        format!("{sub_path}/{name}")
    }
}
