use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Params;

/// A path pattern with its matching options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPattern {
    /// The pattern, e.g. `/users/:id`, `files/*` or `:lang?/about`.
    pub path: String,
    /// Compare static segments case-sensitively.
    pub case_sensitive: bool,
    /// Require the pattern to consume the whole pathname. When `false`, the pattern matches a
    /// prefix that ends on a segment boundary.
    pub end: bool,
}

impl PathPattern {
    /// A case-insensitive pattern that must match the whole pathname.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            case_sensitive: false,
            end: true,
        }
    }

    /// Set whether static segments compare case-sensitively.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set whether the pattern must consume the whole pathname.
    pub fn end(mut self, end: bool) -> Self {
        self.end = end;
        self
    }
}

impl From<&str> for PathPattern {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for PathPattern {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// The result of matching a pathname against a [`PathPattern`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMatch {
    /// Values of the dynamic segments. A splat is stored under `"*"`.
    pub params: Params,
    /// The portion of the pathname that was matched.
    pub pathname: String,
    /// The matched portion before any splat, without trailing slashes.
    pub pathname_base: String,
    /// The pattern that matched.
    pub pattern: PathPattern,
}

#[derive(Debug, PartialEq, Eq)]
enum PatternSegment {
    Static(String),
    Param {
        name: String,
        optional: bool,
        suffix: String,
    },
}

#[derive(Debug)]
struct CompiledPath {
    segments: Vec<PatternSegment>,
    splat: bool,
    // `/*` or `*`: the splat swallows everything after the leading slash
    root_splat: bool,
    // `""` or `/`: a non-ending pattern that only consumes the leading slash
    root: bool,
}

pub(crate) fn is_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn compile_path(path: &str) -> CompiledPath {
    if path != "*" && path.ends_with('*') && !path.ends_with("/*") {
        let fixed = format!("{}/*", path.trim_end_matches('*'));
        warn!(
            "Route path \"{path}\" will be treated as if it were \"{fixed}\" because the `*` \
             character must always follow a `/` in the pattern. To get rid of this warning, \
             please change the route path to \"{fixed}\"."
        );
    }

    let splat = path.ends_with('*');
    let base = path.trim_end_matches('*').trim_end_matches('/');
    let base = base.trim_start_matches('/');

    let segments = if base.is_empty() {
        Vec::new()
    } else {
        base.split('/').map(compile_segment).collect()
    };

    CompiledPath {
        segments,
        splat,
        root_splat: path == "*" || path == "/*",
        root: path.is_empty() || path == "/",
    }
}

fn compile_segment(segment: &str) -> PatternSegment {
    if let Some(rest) = segment.strip_prefix(':') {
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        let (name, tail) = rest.split_at(name_len);
        if is_param_name(name) {
            return match tail {
                "?" => PatternSegment::Param {
                    name: name.to_string(),
                    optional: true,
                    suffix: String::new(),
                },
                _ => PatternSegment::Param {
                    name: name.to_string(),
                    optional: false,
                    suffix: tail.to_string(),
                },
            };
        }
    }
    PatternSegment::Static(segment.to_string())
}

fn segment_eq(pattern: &str, segment: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        pattern == segment
    } else {
        pattern.to_lowercase() == segment.to_lowercase()
    }
}

/// Trim trailing slashes, keeping a lone `/`.
fn trim_trailing_slashes(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path.get(..1).unwrap_or_default().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Match `pathname` against `pattern`.
///
/// ```rust
/// # use waymark_router::{match_path, PathPattern};
/// let matched = match_path(&PathPattern::new("/users/:id"), "/users/42/").unwrap();
/// assert_eq!(matched.params["id"], "42");
/// assert_eq!(matched.pathname, "/users/42/");
/// assert_eq!(matched.pathname_base, "/users/42");
///
/// let prefix = PathPattern::new("/users").end(false);
/// assert_eq!(match_path(&prefix, "/users/42").unwrap().pathname, "/users");
/// assert!(match_path(&prefix, "/usersfoo").is_none());
/// ```
pub fn match_path(pattern: &PathPattern, pathname: &str) -> Option<PathMatch> {
    let compiled = compile_path(&pattern.path);
    if !pathname.starts_with('/') {
        return None;
    }

    let mut params = Params::new();
    let start = if compiled.segments.is_empty() { 1 } else { 0 };
    let (matched_len, splat_value) = walk(
        &compiled,
        pattern,
        pathname,
        0,
        start,
        &mut params,
    )?;

    let matched = &pathname[..matched_len];
    let mut pathname_base = trim_trailing_slashes(matched);
    if compiled.splat {
        let splat = splat_value.unwrap_or_default();
        pathname_base = trim_trailing_slashes(&matched[..matched.len() - splat.len()]);
        params.insert(String::from("*"), splat.replace("%2F", "/"));
    }

    Some(PathMatch {
        params,
        pathname: matched.to_string(),
        pathname_base,
        pattern: pattern.clone(),
    })
}

/// Match the segments from `idx` on, starting at byte `pos` of `pathname`.
///
/// Returns the length of the matched text and the splat. Optional params are tried with and then
/// without a value.
fn walk(
    compiled: &CompiledPath,
    pattern: &PathPattern,
    pathname: &str,
    idx: usize,
    pos: usize,
    params: &mut Params,
) -> Option<(usize, Option<String>)> {
    let Some(segment) = compiled.segments.get(idx) else {
        return match_tail(compiled, pattern, pathname, pos);
    };

    let value = pathname[pos..]
        .strip_prefix('/')
        .map(|rest| rest.split('/').next().unwrap_or_default());
    let next = pos + 1 + value.map(str::len).unwrap_or_default();

    match segment {
        PatternSegment::Static(expected) => {
            let value = value?;
            if !segment_eq(expected, value, pattern.case_sensitive) {
                return None;
            }
            walk(compiled, pattern, pathname, idx + 1, next, params)
        }
        PatternSegment::Param {
            name,
            optional,
            suffix,
        } => {
            let bound = value.and_then(|value| {
                if suffix.is_empty() {
                    return Some(value);
                }
                let split = value.len().checked_sub(suffix.len())?;
                if split == 0 || !value.is_char_boundary(split) {
                    return None;
                }
                segment_eq(suffix, &value[split..], pattern.case_sensitive)
                    .then(|| &value[..split])
            });

            if let Some(bound) = bound.filter(|bound| !bound.is_empty()) {
                let previous = params.insert(name.clone(), bound.replace("%2F", "/"));
                if let Some(found) = walk(compiled, pattern, pathname, idx + 1, next, params) {
                    return Some(found);
                }
                match previous {
                    Some(previous) => params.insert(name.clone(), previous),
                    None => params.remove(name),
                };
            }

            if *optional {
                walk(compiled, pattern, pathname, idx + 1, pos, params)
            } else {
                None
            }
        }
    }
}

fn match_tail(
    compiled: &CompiledPath,
    pattern: &PathPattern,
    pathname: &str,
    pos: usize,
) -> Option<(usize, Option<String>)> {
    let rest = &pathname[pos..];
    let only_slashes = rest.chars().all(|c| c == '/');

    if compiled.root_splat {
        Some((pathname.len(), Some(rest.to_string())))
    } else if compiled.splat {
        if rest.len() > 1 && rest.starts_with('/') {
            Some((pathname.len(), Some(rest[1..].to_string())))
        } else if only_slashes {
            Some((pathname.len(), None))
        } else {
            None
        }
    } else if pattern.end {
        only_slashes.then_some((pathname.len(), None))
    } else if compiled.root || rest.is_empty() || rest.starts_with('/') {
        Some((pos, None))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn static_segments_ignore_case() {
        assert!(match_path(&"/About".into(), "/about").is_some());
        assert!(match_path(&PathPattern::new("/About").case_sensitive(true), "/about").is_none());
    }

    #[test]
    fn trailing_slashes_are_tolerated_when_ending() {
        let m = match_path(&"/a/b".into(), "/a/b//").unwrap();
        assert_eq!(m.pathname, "/a/b//");
        assert_eq!(m.pathname_base, "/a/b");
        assert!(match_path(&"/a".into(), "/a/b").is_none());
    }

    #[test]
    fn params_bind_one_segment() {
        let m = match_path(&"/users/:id/posts/:post-id".into(), "/users/1/posts/x%2Fy").unwrap();
        assert_eq!(m.params, params(&[("id", "1"), ("post-id", "x/y")]));
        assert!(match_path(&"/users/:id".into(), "/users/").is_none());
        assert!(match_path(&"/users/:id".into(), "/users/1/2").is_none());
    }

    #[test]
    fn params_may_have_a_static_suffix() {
        let m = match_path(&"/files/:name.json".into(), "/files/data.json").unwrap();
        assert_eq!(m.params, params(&[("name", "data")]));
        assert!(match_path(&"/files/:name.json".into(), "/files/.json").is_none());
    }

    #[test]
    fn optional_params() {
        let pattern = PathPattern::new("/:lang?/about");
        let with = match_path(&pattern, "/en/about").unwrap();
        assert_eq!(with.params, params(&[("lang", "en")]));
        let without = match_path(&pattern, "/about").unwrap();
        assert_eq!(without.params, Params::new());
    }

    #[test]
    fn splats() {
        let m = match_path(&"/files/*".into(), "/files/a/b/c").unwrap();
        assert_eq!(m.params, params(&[("*", "a/b/c")]));
        assert_eq!(m.pathname, "/files/a/b/c");
        assert_eq!(m.pathname_base, "/files");

        let empty = match_path(&"/files/*".into(), "/files").unwrap();
        assert_eq!(empty.params, params(&[("*", "")]));

        let root = match_path(&"*".into(), "/anything/at/all").unwrap();
        assert_eq!(root.params, params(&[("*", "anything/at/all")]));
        assert_eq!(root.pathname_base, "/");
    }

    #[test]
    fn splat_without_slash_is_treated_as_slash_splat() {
        let m = match_path(&"/files*".into(), "/files/x").unwrap();
        assert_eq!(m.params, params(&[("*", "x")]));
        assert!(match_path(&"/files*".into(), "/filesx").is_none());
    }

    #[test]
    fn prefix_matching() {
        let pattern = PathPattern::new("/users").end(false);
        assert_eq!(match_path(&pattern, "/users/").unwrap().pathname, "/users");
        assert!(match_path(&pattern, "/usersx").is_none());

        let root = PathPattern::new("").end(false);
        let m = match_path(&root, "/anything").unwrap();
        assert_eq!(m.pathname, "/");
        assert_eq!(m.pathname_base, "/");
    }

    #[test]
    fn root_pattern() {
        let m = match_path(&"/".into(), "/").unwrap();
        assert_eq!(m.pathname, "/");
        assert!(match_path(&"/".into(), "/a").is_none());
        assert!(match_path(&"/".into(), "relative").is_none());
    }
}
