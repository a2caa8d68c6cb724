//! Locations, paths and the helpers that convert between them and strings.

use std::fmt::{self, Display};

use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The key given to the very first entry of a history.
pub const DEFAULT_KEY: &str = "default";

/// The pathname, search and hash of a URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    /// A URL pathname, beginning with a `/`.
    pub pathname: String,
    /// A URL search string, beginning with a `?`, or empty.
    pub search: String,
    /// A URL fragment identifier, beginning with a `#`, or empty.
    pub hash: String,
}

impl Default for Path {
    fn default() -> Self {
        Self {
            pathname: String::from("/"),
            search: String::new(),
            hash: String::new(),
        }
    }
}

impl Path {
    /// Create a path from its three parts, normalizing the search and hash prefixes.
    pub fn new(pathname: impl Into<String>, search: &str, hash: &str) -> Self {
        Self {
            pathname: pathname.into(),
            search: normalize_search(search),
            hash: normalize_hash(hash),
        }
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&create_path(&PartialPath::from(self.clone())))
    }
}

/// A [`Path`] where every part may be missing.
///
/// Missing parts are filled in from the location the path is resolved against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialPath {
    /// The pathname, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,
    /// The search string, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// The hash, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl PartialPath {
    /// A partial path that only sets the pathname.
    pub fn pathname(pathname: impl Into<String>) -> Self {
        Self {
            pathname: Some(pathname.into()),
            ..Default::default()
        }
    }

    /// Set the search string.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set the hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }
}

impl From<Path> for PartialPath {
    fn from(path: Path) -> Self {
        Self {
            pathname: Some(path.pathname),
            search: Some(path.search),
            hash: Some(path.hash),
        }
    }
}

/// A navigation destination.
///
/// A string is parsed into its parts, while a [`PartialPath`] is taken as-is. The distinction
/// matters for validation: a `?` inside a manually specified pathname is an error, a `?` inside
/// a string is the start of the search.
#[derive(Clone, Debug, PartialEq)]
pub enum To {
    /// A path string such as `../settings?tab=2#top`.
    Str(String),
    /// A destination given part by part.
    Path(PartialPath),
    /// A complete location; its key is kept when it is pushed.
    Location(Location),
}

impl To {
    /// The destination as a [`PartialPath`], parsing strings.
    pub fn to_partial(&self) -> PartialPath {
        match self {
            To::Str(s) => parse_path(s),
            To::Path(p) => p.clone(),
            To::Location(l) => l.path().into(),
        }
    }

    /// Whether this is the empty string destination.
    pub fn is_empty_str(&self) -> bool {
        matches!(self, To::Str(s) if s.is_empty())
    }
}

impl From<&str> for To {
    fn from(s: &str) -> Self {
        To::Str(s.to_string())
    }
}

impl From<String> for To {
    fn from(s: String) -> Self {
        To::Str(s)
    }
}

impl From<&String> for To {
    fn from(s: &String) -> Self {
        To::Str(s.clone())
    }
}

impl From<PartialPath> for To {
    fn from(p: PartialPath) -> Self {
        To::Path(p)
    }
}

impl From<Path> for To {
    fn from(p: Path) -> Self {
        To::Path(p.into())
    }
}

impl From<&Location> for To {
    fn from(l: &Location) -> Self {
        To::Location(l.clone())
    }
}

impl From<Location> for To {
    fn from(l: Location) -> Self {
        To::Location(l)
    }
}

/// An entry in a history stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// A URL pathname, beginning with a `/`.
    pub pathname: String,
    /// A URL search string, beginning with a `?`, or empty.
    pub search: String,
    /// A URL fragment identifier, beginning with a `#`, or empty.
    pub hash: String,
    /// Arbitrary data associated with this entry.
    pub state: Option<Value>,
    /// A unique string associated with this entry.
    ///
    /// `"default"` for the initial entry.
    pub key: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            pathname: String::from("/"),
            search: String::new(),
            hash: String::new(),
            state: None,
            key: String::from(DEFAULT_KEY),
        }
    }
}

impl Location {
    /// The [`Path`] part of this location.
    pub fn path(&self) -> Path {
        Path {
            pathname: self.pathname.clone(),
            search: self.search.clone(),
            hash: self.hash.clone(),
        }
    }

    /// The location rendered as `pathname + search + hash`.
    pub fn href(&self) -> String {
        create_path(&PartialPath::from(self.path()))
    }
}

/// Build a location from `to`, resolved against the `current` pathname.
///
/// Parts missing from `to` default to `current`'s pathname and to an empty search and hash.
/// The key of a [`To::Location`] is kept, otherwise `key` is used, otherwise a fresh random key
/// is created.
pub fn create_location(
    current: &str,
    to: &To,
    state: Option<Value>,
    key: Option<String>,
) -> Location {
    let parsed = to.to_partial();
    let pathname = parsed.pathname.unwrap_or_else(|| current.to_string());
    Location {
        pathname: if pathname.starts_with('/') {
            pathname
        } else {
            format!("/{pathname}")
        },
        search: parsed.search.map(|s| normalize_search(&s)).unwrap_or_default(),
        hash: parsed.hash.map(|h| normalize_hash(&h)).unwrap_or_default(),
        state,
        key: match to {
            To::Location(l) => l.key.clone(),
            _ => key.unwrap_or_else(create_key),
        },
    }
}

/// Create a random key for a history entry.
pub fn create_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Render a partial path as a string, defaulting the pathname to `/`.
///
/// ```rust
/// # use waymark_history::{create_path, PartialPath};
/// let path = PartialPath::pathname("/a").with_search("b=1").with_hash("#c");
/// assert_eq!(create_path(&path), "/a?b=1#c");
/// ```
pub fn create_path(path: &PartialPath) -> String {
    let mut out = path.pathname.clone().unwrap_or_else(|| String::from("/"));
    if let Some(search) = &path.search {
        if !search.is_empty() && search != "?" {
            if !search.starts_with('?') {
                out.push('?');
            }
            out.push_str(search);
        }
    }
    if let Some(hash) = &path.hash {
        if !hash.is_empty() && hash != "#" {
            if !hash.starts_with('#') {
                out.push('#');
            }
            out.push_str(hash);
        }
    }
    out
}

/// Split a path string into its pathname, search and hash.
///
/// ```rust
/// # use waymark_history::parse_path;
/// let parsed = parse_path("/a/b?c=d#e");
/// assert_eq!(parsed.pathname.as_deref(), Some("/a/b"));
/// assert_eq!(parsed.search.as_deref(), Some("?c=d"));
/// assert_eq!(parsed.hash.as_deref(), Some("#e"));
/// ```
pub fn parse_path(path: &str) -> PartialPath {
    let mut parsed = PartialPath::default();
    let mut rest = path;

    if let Some(idx) = rest.find('#') {
        parsed.hash = Some(rest[idx..].to_string());
        rest = &rest[..idx];
    }
    if let Some(idx) = rest.find('?') {
        parsed.search = Some(rest[idx..].to_string());
        rest = &rest[..idx];
    }
    if !rest.is_empty() {
        parsed.pathname = Some(rest.to_string());
    }

    parsed
}

/// Ensure a search string is empty or starts with `?`.
pub fn normalize_search(search: &str) -> String {
    if search.is_empty() || search == "?" {
        String::new()
    } else if search.starts_with('?') {
        search.to_string()
    } else {
        format!("?{search}")
    }
}

/// Ensure a hash is empty or starts with `#`.
pub fn normalize_hash(hash: &str) -> String {
    if hash.is_empty() || hash == "#" {
        String::new()
    } else if hash.starts_with('#') {
        hash.to_string()
    } else {
        format!("#{hash}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_path_without_parts() {
        assert_eq!(parse_path(""), PartialPath::default());
        assert_eq!(parse_path("?a=b").pathname, None);
        assert_eq!(parse_path("#top").hash.as_deref(), Some("#top"));
    }

    #[test]
    fn hash_may_contain_question_marks() {
        let parsed = parse_path("/a#b?c");
        assert_eq!(parsed.pathname.as_deref(), Some("/a"));
        assert_eq!(parsed.search, None);
        assert_eq!(parsed.hash.as_deref(), Some("#b?c"));
    }

    #[test]
    fn create_path_skips_bare_markers() {
        let path = PartialPath::pathname("/a").with_search("?").with_hash("#");
        assert_eq!(create_path(&path), "/a");
        assert_eq!(create_path(&PartialPath::default()), "/");
    }

    #[test]
    fn create_location_inherits_pathname() {
        let loc = create_location(
            "/current",
            &To::Path(PartialPath::default().with_search("q=1")),
            None,
            Some("k".into()),
        );
        assert_eq!(loc.pathname, "/current");
        assert_eq!(loc.search, "?q=1");
        assert_eq!(loc.key, "k");
    }

    #[test]
    fn keys_are_random() {
        let a = create_key();
        let b = create_key();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert_ne!(a, DEFAULT_KEY);
    }
}
