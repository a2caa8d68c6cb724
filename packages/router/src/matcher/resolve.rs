use waymark_history::{normalize_hash, normalize_search, PartialPath, Path, To};

use super::{path::is_param_name, RouteMatch};
use crate::{Params, RouterError};

/// Join path segments with `/`, collapsing repeated slashes.
///
/// ```rust
/// # use waymark_router::join_paths;
/// assert_eq!(join_paths(&["/", "courses", "/42/"]), "/courses/42/");
/// assert_eq!(join_paths(&["", "a"]), "/a");
/// ```
pub fn join_paths(paths: &[&str]) -> String {
    let joined = paths.join("/");
    let mut out = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Remove trailing slashes and make sure there is exactly one leading slash.
pub fn normalize_pathname(pathname: &str) -> String {
    format!(
        "/{}",
        pathname.trim_end_matches('/').trim_start_matches('/')
    )
}

/// Strip `basename` from `pathname`.
///
/// The comparison ignores case, and the basename must end on a segment boundary. Returns `None`
/// when the pathname is outside of the basename.
///
/// ```rust
/// # use waymark_router::strip_basename;
/// assert_eq!(strip_basename("/App/users", Some("/app")).as_deref(), Some("/users"));
/// assert_eq!(strip_basename("/app", Some("/app/")).as_deref(), Some("/"));
/// assert_eq!(strip_basename("/apple", Some("/app")), None);
/// ```
pub fn strip_basename(pathname: &str, basename: Option<&str>) -> Option<String> {
    let basename = match basename {
        None | Some("/") | Some("") => return Some(pathname.to_string()),
        Some(basename) => basename,
    };

    let basename = basename.trim_end_matches('/');
    let prefix = pathname.get(..basename.len())?;
    if prefix.to_lowercase() != basename.to_lowercase() {
        return None;
    }

    let rest = &pathname[basename.len()..];
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }

    Some(if rest.is_empty() {
        String::from("/")
    } else {
        rest.to_string()
    })
}

fn invalid_path_error(c: char, field: &str, dest: &str, path: &PartialPath) -> RouterError {
    let json = serde_json::to_string(path).unwrap_or_default();
    RouterError::NavigationTarget(format!(
        "Cannot include a '{c}' character in a manually specified `to.{field}` field [{json}].  \
         Please separate it out to the `to.{dest}` field. Alternatively you may provide the full \
         path as a string in <Link to=\"...\"> and the router will parse it for you."
    ))
}

/// Resolve a relative pathname against `from`, like a filesystem would.
fn resolve_pathname(relative: &str, from: &str) -> String {
    let mut segments: Vec<&str> = from.trim_end_matches('/').split('/').collect();
    for segment in relative.split('/') {
        match segment {
            ".." => {
                if segments.len() > 1 {
                    segments.pop();
                }
            }
            "." => {}
            segment => segments.push(segment),
        }
    }
    if segments.len() > 1 {
        segments.join("/")
    } else {
        String::from("/")
    }
}

/// Resolve `to` against the absolute pathname `from`.
///
/// ```rust
/// # use waymark_router::resolve_path;
/// let path = resolve_path(&"../b?x=1".into(), "/a/c");
/// assert_eq!(path.pathname, "/a/b");
/// assert_eq!(path.search, "?x=1");
/// ```
pub fn resolve_path(to: &To, from: &str) -> Path {
    let partial = to.to_partial();
    let pathname = match partial.pathname.as_deref() {
        Some(p) if !p.is_empty() => {
            if p.starts_with('/') {
                p.to_string()
            } else {
                resolve_pathname(p, from)
            }
        }
        _ => from.to_string(),
    };
    Path {
        pathname,
        search: normalize_search(partial.search.as_deref().unwrap_or_default()),
        hash: normalize_hash(partial.hash.as_deref().unwrap_or_default()),
    }
}

/// Resolve a navigation target against the pathnames of the current route hierarchy.
///
/// `route_pathnames` holds the pathname of every path contributing ancestor, outermost first (see
/// [`get_resolve_to_matches`]). Leading `..` segments walk up that hierarchy rather than the URL,
/// unless `is_path_relative` is set. Explicit trailing slashes, and the trailing slash of the
/// current location for `""` and `.`, are kept.
///
/// A [`To::Path`] may not contain a `?` or `#` in its pathname, nor a `#` in its search.
///
/// ```rust
/// # use waymark_router::resolve_to;
/// let path = resolve_to(
///     &"..".into(),
///     &["/courses".to_string(), "/courses/:id".to_string()],
///     "/courses/42",
///     false,
/// )
/// .unwrap();
/// assert_eq!(path.pathname, "/courses");
/// ```
pub fn resolve_to(
    to: &To,
    route_pathnames: &[String],
    current_pathname: &str,
    is_path_relative: bool,
) -> Result<Path, RouterError> {
    let mut partial = to.to_partial();
    if let To::Path(path) = to {
        if path.pathname.as_deref().is_some_and(|p| p.contains('?')) {
            return Err(invalid_path_error('?', "pathname", "search", path));
        }
        if path.pathname.as_deref().is_some_and(|p| p.contains('#')) {
            return Err(invalid_path_error('#', "pathname", "hash", path));
        }
        if path.search.as_deref().is_some_and(|s| s.contains('#')) {
            return Err(invalid_path_error('#', "search", "hash", path));
        }
    }

    let is_empty_path = to.is_empty_str() || partial.pathname.as_deref() == Some("");
    let to_pathname = if is_empty_path {
        Some(String::from("/"))
    } else {
        partial.pathname.clone()
    };

    let from = match &to_pathname {
        None => current_pathname.to_string(),
        Some(to_pathname) => {
            let mut index = route_pathnames.len() as isize - 1;
            if !is_path_relative && to_pathname.starts_with("..") {
                let mut segments: Vec<&str> = to_pathname.split('/').collect();
                while segments.first() == Some(&"..") {
                    segments.remove(0);
                    index -= 1;
                }
                partial.pathname = Some(segments.join("/"));
            }
            if index >= 0 {
                route_pathnames[index as usize].clone()
            } else {
                String::from("/")
            }
        }
    };

    let mut path = resolve_path(&To::Path(partial), &from);

    let explicit_trailing_slash = to_pathname
        .as_deref()
        .is_some_and(|p| p != "/" && p.ends_with('/'));
    let current_trailing_slash = (is_empty_path || to_pathname.as_deref() == Some("."))
        && current_pathname.ends_with('/');
    if !path.pathname.ends_with('/') && (explicit_trailing_slash || current_trailing_slash) {
        path.pathname.push('/');
    }

    Ok(path)
}

/// The matches that contribute to the URL: the root match and every match with a non-empty path.
pub fn get_path_contributing_matches(matches: &[RouteMatch]) -> Vec<&RouteMatch> {
    matches
        .iter()
        .enumerate()
        .filter(|(idx, m)| *idx == 0 || m.route.path.as_deref().is_some_and(|p| !p.is_empty()))
        .map(|(_, m)| m)
        .collect()
}

/// The pathnames [`resolve_to`] resolves relative targets against.
///
/// With `relative_splat_path`, the deepest match contributes its full pathname (including any
/// splat) so relative paths inside a splat route resolve against the URL.
pub fn get_resolve_to_matches(matches: &[RouteMatch], relative_splat_path: bool) -> Vec<String> {
    let contributing = get_path_contributing_matches(matches);
    let last = contributing.len().saturating_sub(1);
    contributing
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            if relative_splat_path && idx == last {
                m.pathname.clone()
            } else {
                m.pathname_base.clone()
            }
        })
        .collect()
}

/// Fill a path pattern with params.
///
/// Optional params and the splat may be missing, required params may not.
///
/// ```rust
/// # use waymark_router::{generate_path, Params};
/// let mut params = Params::new();
/// params.insert("id".into(), "42".into());
/// params.insert("*".into(), "a/b".into());
/// assert_eq!(generate_path("/users/:id/:tab?/*", &params).unwrap(), "/users/42/a/b");
/// ```
pub fn generate_path(pattern: &str, params: &Params) -> Result<String, RouterError> {
    let mut path = pattern.to_string();
    if path != "*" && path.ends_with('*') && !path.ends_with("/*") {
        tracing::warn!(
            "Route path \"{pattern}\" will be treated as if it were \"{}/*\"",
            pattern.trim_end_matches('*')
        );
        path = format!("{}/*", path.trim_end_matches('*'));
    }

    let prefix = if path.starts_with('/') { "/" } else { "" };
    let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let last = raw.len().saturating_sub(1);

    let mut segments = Vec::with_capacity(raw.len());
    for (idx, segment) in raw.iter().enumerate() {
        if idx == last && *segment == "*" {
            segments.push(params.get("*").cloned().unwrap_or_default());
            continue;
        }
        if let Some(name) = segment.strip_prefix(':') {
            let (name, optional) = match name.strip_suffix('?') {
                Some(name) => (name, true),
                None => (name, false),
            };
            if is_param_name(name) {
                match params.get(name) {
                    Some(value) => segments.push(value.clone()),
                    None if optional => {}
                    None => return Err(RouterError::MissingParam(name.to_string())),
                }
                continue;
            }
        }
        segments.push(segment.trim_end_matches('?').to_string());
    }

    segments.retain(|s| !s.is_empty());
    Ok(format!("{prefix}{}", segments.join("/")))
}

/// Whether the search contains an `index` param without a value.
pub(crate) fn has_naked_index_query(search: &str) -> bool {
    form_urlencoded::parse(search.trim_start_matches('?').as_bytes())
        .any(|(key, value)| key == "index" && value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pathnames(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn dot_dot_walks_the_route_hierarchy() {
        let routes = pathnames(&["/", "/courses", "/courses/42"]);
        let path = resolve_to(&"../new".into(), &routes, "/courses/42/details", false).unwrap();
        assert_eq!(path.pathname, "/courses/new");
    }

    #[test]
    fn dot_dot_is_a_plain_segment_when_path_relative() {
        let routes = pathnames(&["/", "/courses", "/courses/42"]);
        let path = resolve_to(&"..".into(), &routes, "/courses/42/details", true).unwrap();
        assert_eq!(path.pathname, "/courses");
    }

    #[test]
    fn too_many_dot_dots_stop_at_root() {
        let path = resolve_to(&"../../../x".into(), &pathnames(&["/a"]), "/a", false).unwrap();
        assert_eq!(path.pathname, "/x");
    }

    #[test]
    fn bare_segments_append() {
        let routes = pathnames(&["/", "/users"]);
        assert_eq!(
            resolve_to(&"42/edit".into(), &routes, "/users", false)
                .unwrap()
                .pathname,
            "/users/42/edit"
        );
        assert_eq!(
            resolve_to(&"./42".into(), &routes, "/users", false)
                .unwrap()
                .pathname,
            "/users/42"
        );
    }

    #[test]
    fn trailing_slashes_are_kept() {
        let routes = pathnames(&["/", "/users"]);
        assert_eq!(
            resolve_to(&"42/".into(), &routes, "/users", false).unwrap().pathname,
            "/users/42/"
        );
        assert_eq!(
            resolve_to(&".".into(), &routes, "/users/", false).unwrap().pathname,
            "/users/"
        );
        assert_eq!(
            resolve_to(&"".into(), &routes, "/users/", false).unwrap().pathname,
            "/users/"
        );
    }

    #[test]
    fn search_only_keeps_the_current_pathname() {
        let path = resolve_to(&"?page=2".into(), &pathnames(&["/"]), "/list", false).unwrap();
        assert_eq!(path, Path::new("/list", "?page=2", ""));
    }

    #[test]
    fn invalid_partial_paths_are_rejected() {
        let to = To::Path(PartialPath::pathname("/a?b=1"));
        let err = resolve_to(&to, &[], "/", false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot include a '?' character in a manually specified `to.pathname` field \
             [{\"pathname\":\"/a?b=1\"}].  Please separate it out to the `to.search` field. \
             Alternatively you may provide the full path as a string in <Link to=\"...\"> and \
             the router will parse it for you."
        );

        let to = To::Path(PartialPath::pathname("/a#top"));
        assert!(resolve_to(&to, &[], "/", false)
            .unwrap_err()
            .to_string()
            .contains("`to.hash` field"));

        let to = To::Path(PartialPath::pathname("/a").with_search("?x#y"));
        assert!(resolve_to(&to, &[], "/", false)
            .unwrap_err()
            .to_string()
            .contains("manually specified `to.search` field"));

        // strings are parsed instead
        assert!(resolve_to(&"/a?b=1#c".into(), &[], "/", false).is_ok());
    }

    #[test]
    fn join_and_normalize() {
        assert_eq!(join_paths(&["/a/", "/b//c"]), "/a/b/c");
        assert_eq!(normalize_pathname("a/b//"), "/a/b");
        assert_eq!(normalize_pathname("//"), "/");
    }

    #[test]
    fn basename_is_case_insensitive_and_segment_aware() {
        assert_eq!(strip_basename("/APP/x", Some("/app")).as_deref(), Some("/x"));
        assert_eq!(strip_basename("/app/", Some("/app")).as_deref(), Some("/"));
        assert_eq!(strip_basename("/other", Some("/app")), None);
        assert_eq!(strip_basename("/x", None).as_deref(), Some("/x"));
    }

    #[test]
    fn generate_path_requires_params() {
        assert_eq!(
            generate_path("/users/:id", &Params::new()),
            Err(RouterError::MissingParam("id".into()))
        );
        assert_eq!(generate_path("about?", &Params::new()).unwrap(), "about");
    }

    #[test]
    fn naked_index_query() {
        assert!(has_naked_index_query("?index"));
        assert!(has_naked_index_query("?a=1&index="));
        assert!(!has_naked_index_query("?index=1"));
    }
}
