//! Flattening the route tree into ranked branches, and matching a single branch.

use std::rc::Rc;

use tracing::trace;

use super::{
    path::{is_param_name, match_path, PathPattern},
    resolve::{join_paths, normalize_pathname},
    DataRoute, RouteMatch,
};
use crate::{Params, RouterError};

const STATIC_SEGMENT_VALUE: i32 = 10;
const DYNAMIC_SEGMENT_VALUE: i32 = 3;
const EMPTY_SEGMENT_VALUE: i32 = 1;
const INDEX_ROUTE_VALUE: i32 = 2;
const SPLAT_PENALTY: i32 = -2;

#[derive(Clone, Debug)]
pub(crate) struct RouteMeta {
    pub(crate) relative_path: String,
    pub(crate) case_sensitive: bool,
    pub(crate) children_index: usize,
    pub(crate) route: Rc<DataRoute>,
}

/// A root to leaf chain of routes, with the full path it matches.
#[derive(Clone, Debug)]
pub(crate) struct Branch {
    pub(crate) path: String,
    pub(crate) score: i32,
    pub(crate) routes_meta: Vec<RouteMeta>,
}

pub(crate) fn flatten_routes(
    routes: &[Rc<DataRoute>],
    branches: &mut Vec<Branch>,
    parents_meta: &[RouteMeta],
    parent_path: &str,
) -> Result<(), RouterError> {
    for (index, route) in routes.iter().enumerate() {
        match route.path.as_deref() {
            Some(path) if !path.is_empty() && path.contains('?') => {
                for exploded in explode_optional_segments(path) {
                    flatten_route(
                        route,
                        index,
                        Some(exploded),
                        branches,
                        parents_meta,
                        parent_path,
                    )?;
                }
            }
            _ => flatten_route(route, index, None, branches, parents_meta, parent_path)?,
        }
    }
    Ok(())
}

fn flatten_route(
    route: &Rc<DataRoute>,
    index: usize,
    relative_path: Option<String>,
    branches: &mut Vec<Branch>,
    parents_meta: &[RouteMeta],
    parent_path: &str,
) -> Result<(), RouterError> {
    let mut relative_path =
        relative_path.unwrap_or_else(|| route.path.clone().unwrap_or_default());

    if relative_path.starts_with('/') {
        let Some(rest) = relative_path.strip_prefix(parent_path) else {
            return Err(RouterError::InvalidRoute(format!(
                "Absolute route path \"{relative_path}\" nested under path \"{parent_path}\" is \
                 not valid. An absolute child route path must start with the combined path of \
                 all its parent routes."
            )));
        };
        relative_path = rest.to_string();
    }

    let path = join_paths(&[parent_path, &relative_path]);
    let mut routes_meta = parents_meta.to_vec();
    routes_meta.push(RouteMeta {
        relative_path,
        case_sensitive: route.case_sensitive,
        children_index: index,
        route: route.clone(),
    });

    if !route.children.is_empty() {
        debug_assert!(!route.index, "index routes are rejected at registration");
        flatten_routes(&route.children, branches, &routes_meta, &path)?;
    }

    // pathless layout routes only contribute their children
    if route.path.is_none() && !route.index {
        return Ok(());
    }

    branches.push(Branch {
        score: compute_score(&path, route.index),
        path,
        routes_meta,
    });
    Ok(())
}

/// Every variant of `path` with and without its optional segments, the required-only one last.
///
/// `/a/:b?/c?` becomes `/a/:b/c`, `/a/:b`, `/a/c`, `/a`.
pub(crate) fn explode_optional_segments(path: &str) -> Vec<String> {
    let mut segments = path.split('/');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let rest: Vec<&str> = segments.collect();

    let optional = first.ends_with('?');
    let required = first.strip_suffix('?').unwrap_or(first);

    if rest.is_empty() {
        return if optional {
            vec![required.to_string(), String::new()]
        } else {
            vec![required.to_string()]
        };
    }

    let rest_exploded = explode_optional_segments(&rest.join("/"));
    let mut result: Vec<String> = rest_exploded
        .iter()
        .map(|sub| {
            if sub.is_empty() {
                required.to_string()
            } else {
                format!("{required}/{sub}")
            }
        })
        .collect();
    if optional {
        result.extend(rest_exploded);
    }

    result
        .into_iter()
        .map(|exploded| {
            if path.starts_with('/') && exploded.is_empty() {
                String::from("/")
            } else {
                exploded
            }
        })
        .collect()
}

pub(crate) fn compute_score(path: &str, index: bool) -> i32 {
    let segments: Vec<&str> = path.split('/').collect();
    let mut score = segments.len() as i32;
    if segments.iter().any(|s| *s == "*") {
        score += SPLAT_PENALTY;
    }
    if index {
        score += INDEX_ROUTE_VALUE;
    }

    segments
        .iter()
        .filter(|s| **s != "*")
        .fold(score, |score, segment| {
            let dynamic = segment.strip_prefix(':').is_some_and(is_param_name);
            score
                + if dynamic {
                    DYNAMIC_SEGMENT_VALUE
                } else if segment.is_empty() {
                    EMPTY_SEGMENT_VALUE
                } else {
                    STATIC_SEGMENT_VALUE
                }
        })
}

/// Sort by descending score. Branches that only differ in their last route keep sibling order.
pub(crate) fn rank_route_branches(branches: &mut [Branch]) {
    branches.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            let a: Vec<usize> = a.routes_meta.iter().map(|m| m.children_index).collect();
            let b: Vec<usize> = b.routes_meta.iter().map(|m| m.children_index).collect();
            compare_indexes(&a, &b)
        })
    });
}

fn compare_indexes(a: &[usize], b: &[usize]) -> std::cmp::Ordering {
    let siblings = a.len() == b.len()
        && a[..a.len().saturating_sub(1)] == b[..b.len().saturating_sub(1)];
    match (siblings, a.last(), b.last()) {
        (true, Some(a), Some(b)) => a.cmp(b),
        _ => std::cmp::Ordering::Equal,
    }
}

pub(crate) fn match_route_branch(branch: &Branch, pathname: &str) -> Option<Vec<RouteMatch>> {
    let mut matched_params = Params::new();
    let mut matched_pathname = String::from("/");
    let mut matches = Vec::with_capacity(branch.routes_meta.len());

    for (idx, meta) in branch.routes_meta.iter().enumerate() {
        let end = idx == branch.routes_meta.len() - 1;
        let remaining = if matched_pathname == "/" {
            pathname
        } else {
            match pathname.get(matched_pathname.len()..) {
                Some(rest) if !rest.is_empty() => rest,
                _ => "/",
            }
        };

        let pattern = PathPattern::new(meta.relative_path.clone())
            .case_sensitive(meta.case_sensitive)
            .end(end);
        let Some(matched) = match_path(&pattern, remaining) else {
            trace!(branch = %branch.path, route = %meta.route.id, "branch did not match");
            return None;
        };

        matched_params.extend(matched.params);
        matches.push(RouteMatch {
            route: meta.route.clone(),
            params: matched_params.clone(),
            pathname: join_paths(&[&matched_pathname, &matched.pathname]),
            pathname_base: normalize_pathname(&join_paths(&[
                &matched_pathname,
                &matched.pathname_base,
            ])),
        });

        if matched.pathname_base != "/" {
            matched_pathname = join_paths(&[&matched_pathname, &matched.pathname_base]);
        }
    }

    Some(matches)
}
