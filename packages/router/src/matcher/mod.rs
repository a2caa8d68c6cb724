//! Route registration, ranking and matching.
//!
//! A [`RouteTree`] is built once from the [`Route`] definitions. Building assigns ids, flattens
//! the tree into root to leaf branches and ranks them by specificity, so [`match_routes`] only
//! has to try the branches in order.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::{Diagnostics, Params, RouterError};

mod branch;
mod path;
mod resolve;
mod route;

use branch::{flatten_routes, match_route_branch, rank_route_branches, Branch};
pub use path::*;
pub use resolve::*;
pub(crate) use resolve::has_naked_index_query;
pub use route::*;

/// A route that matched, and what it matched.
#[derive(Clone, Debug)]
pub struct RouteMatch {
    /// The route.
    pub route: Rc<DataRoute>,
    /// The params of the route and all of its ancestors.
    pub params: Params,
    /// The part of the URL the route matched.
    pub pathname: String,
    /// The part of the URL the route matched, before any splat and without trailing slashes.
    pub pathname_base: String,
}

impl RouteMatch {
    /// The id of the matched route.
    pub fn route_id(&self) -> &str {
        &self.route.id
    }
}

impl PartialEq for RouteMatch {
    fn eq(&self, other: &Self) -> bool {
        self.route.id == other.route.id
            && self.params == other.params
            && self.pathname == other.pathname
            && self.pathname_base == other.pathname_base
    }
}

/// A route patch: `children` are appended to the route `parent_id`, or to the root.
#[derive(Clone, Debug)]
pub struct RoutePatch {
    /// The route to add the children to. `None` adds them at the top level.
    pub parent_id: Option<String>,
    /// The routes to add.
    pub children: Vec<Route>,
}

/// The registered routes.
#[derive(Debug)]
pub struct RouteTree {
    source: Vec<Route>,
    routes: Vec<Rc<DataRoute>>,
    manifest: FxHashMap<String, Rc<DataRoute>>,
    branches: Vec<Branch>,
}

impl RouteTree {
    /// Register `routes`.
    ///
    /// Fails when two routes share an id, when an index route has children, or when an absolute
    /// child path doesn't start with the path of its parents.
    pub fn new(routes: Vec<Route>) -> Result<Self, RouterError> {
        Self::build(routes, &Diagnostics::new())
    }

    /// Register `routes`, reporting warnings to `diagnostics`.
    pub fn build(routes: Vec<Route>, diagnostics: &Diagnostics) -> Result<Self, RouterError> {
        Self::build_from(routes, None, diagnostics)
    }

    fn build_from(
        source: Vec<Route>,
        previous: Option<&RouteTree>,
        diagnostics: &Diagnostics,
    ) -> Result<Self, RouterError> {
        let mut manifest = FxHashMap::default();
        let routes = convert_routes(&source, &[], previous, &mut manifest, diagnostics)?;

        let mut branches = Vec::new();
        flatten_routes(&routes, &mut branches, &[], "")?;
        rank_route_branches(&mut branches);

        Ok(Self {
            source,
            routes,
            manifest,
            branches,
        })
    }

    /// A new tree with `children` added under `parent_id`.
    ///
    /// Routes that were already registered keep their ids, and whatever their lazy loaders
    /// already produced.
    pub fn patch(
        &self,
        parent_id: Option<&str>,
        children: Vec<Route>,
        diagnostics: &Diagnostics,
    ) -> Result<Self, RouterError> {
        let mut source = self.source.clone();
        match parent_id {
            None => source.extend(children),
            Some(parent_id) => {
                let parent = find_source_route(&mut source, &mut Vec::new(), parent_id)
                    .ok_or_else(|| RouterError::UnknownRoute(parent_id.to_string()))?;
                parent.children.extend(children);
            }
        }
        Self::build_from(source, Some(self), diagnostics)
    }

    /// The top level routes.
    pub fn routes(&self) -> &[Rc<DataRoute>] {
        &self.routes
    }

    /// The route with the id `id`.
    pub fn route(&self, id: &str) -> Option<&Rc<DataRoute>> {
        self.manifest.get(id)
    }

    /// The full path of every branch, most specific first.
    pub fn ranked_paths(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.path.as_str()).collect()
    }
}

fn convert_routes(
    routes: &[Route],
    parent_path: &[usize],
    previous: Option<&RouteTree>,
    manifest: &mut FxHashMap<String, Rc<DataRoute>>,
    diagnostics: &Diagnostics,
) -> Result<Vec<Rc<DataRoute>>, RouterError> {
    let mut converted = Vec::with_capacity(routes.len());
    for (index, route) in routes.iter().enumerate() {
        let mut tree_path = parent_path.to_vec();
        tree_path.push(index);
        let id = route.id.clone().unwrap_or_else(|| tree_id(&tree_path));

        if route.index && !route.children.is_empty() {
            return Err(RouterError::InvalidRoute(format!(
                "Cannot specify children on an index route (route \"{id}\")"
            )));
        }
        if manifest.contains_key(&id) {
            return Err(RouterError::DuplicateRouteId(id));
        }

        let children =
            convert_routes(&route.children, &tree_path, previous, manifest, diagnostics)?;
        let previous_route = previous.and_then(|tree| tree.route(&id)).map(Rc::as_ref);
        let data_route = Rc::new(DataRoute::from_route(
            route,
            id.clone(),
            children,
            previous_route,
            diagnostics,
        ));

        // a descendant may have claimed the id in the meantime
        if manifest.insert(id.clone(), data_route.clone()).is_some() {
            return Err(RouterError::DuplicateRouteId(id));
        }
        converted.push(data_route);
    }
    Ok(converted)
}

fn tree_id(tree_path: &[usize]) -> String {
    tree_path
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("-")
}

fn find_source_route<'a>(
    routes: &'a mut [Route],
    tree_path: &mut Vec<usize>,
    id: &str,
) -> Option<&'a mut Route> {
    for (index, route) in routes.iter_mut().enumerate() {
        tree_path.push(index);
        let route_id = route.id.clone().unwrap_or_else(|| tree_id(tree_path));
        if route_id == id {
            return Some(route);
        }
        if let Some(found) = find_source_route(&mut route.children, tree_path, id) {
            return Some(found);
        }
        tree_path.pop();
    }
    None
}

/// Percent-decode every segment of `path`, keeping encoded slashes encoded.
///
/// A malformed segment leaves the whole path undecoded.
pub(crate) fn decode_path(path: &str) -> String {
    let decoded: Result<Vec<String>, _> = path
        .split('/')
        .map(|segment| urlencoding::decode(segment).map(|s| s.replace('/', "%2F")))
        .collect();
    match decoded {
        Ok(segments) => segments.join("/"),
        Err(err) => {
            warn!(
                "The URL path \"{path}\" could not be decoded because it is a malformed URL \
                 segment. This is probably due to a bad percent encoding ({err})."
            );
            path.to_string()
        }
    }
}

/// Match `pathname` against the routes of `tree`.
///
/// Returns `None` when nothing matched, or when the pathname is outside of `basename`.
///
/// ```rust
/// # use waymark_router::{match_routes, Route, RouteTree};
/// let tree = RouteTree::new(vec![Route::new("/").children([
///     Route::new("users/:id").id("user"),
///     Route::new("users/new").id("new-user"),
/// ])])
/// .unwrap();
///
/// let matches = match_routes(&tree, "/app/users/new", Some("/app")).unwrap();
/// assert_eq!(matches[1].route_id(), "new-user");
/// assert!(match_routes(&tree, "/elsewhere", Some("/app")).is_none());
/// ```
pub fn match_routes(
    tree: &RouteTree,
    pathname: &str,
    basename: Option<&str>,
) -> Option<Vec<RouteMatch>> {
    let pathname = strip_basename(pathname, basename)?;
    let decoded = decode_path(&pathname);

    let matches = tree
        .branches
        .iter()
        .find_map(|branch| match_route_branch(branch, &decoded));
    match &matches {
        Some(matches) => trace!(
            pathname = %decoded,
            routes = ?matches.iter().map(RouteMatch::route_id).collect::<Vec<_>>(),
            "matched"
        ),
        None => trace!(pathname = %decoded, "no branch matched"),
    }
    matches
}

/// The match whose route catches errors thrown at `route_id`.
///
/// That is the closest match at or above `route_id` with an error boundary, or the root match when
/// there is none. Without a `route_id` the search starts at the deepest match.
pub fn find_nearest_boundary<'a>(
    matches: &'a [RouteMatch],
    route_id: Option<&str>,
) -> Option<&'a RouteMatch> {
    let eligible = match route_id.and_then(|id| matches.iter().position(|m| m.route.id == id)) {
        Some(idx) => &matches[..=idx],
        None => matches,
    };
    eligible
        .iter()
        .rev()
        .find(|m| m.route.has_error_boundary())
        .or_else(|| matches.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(matches: &[RouteMatch]) -> Vec<&str> {
        matches.iter().map(RouteMatch::route_id).collect()
    }

    #[test]
    fn ids_follow_the_tree_position() {
        let tree = RouteTree::new(vec![
            Route::new("/").children([Route::index(), Route::new("a").id("a")]),
            Route::new("/b"),
        ])
        .unwrap();
        assert!(tree.route("0").is_some());
        assert!(tree.route("0-0").is_some_and(|r| r.index));
        assert!(tree.route("a").is_some());
        assert!(tree.route("0-1").is_none());
        assert_eq!(tree.route("1").unwrap().path.as_deref(), Some("/b"));
    }

    #[test]
    fn registration_errors() {
        let duplicate = RouteTree::new(vec![
            Route::new("/a").id("x"),
            Route::new("/b").child(Route::new("c").id("x")),
        ]);
        assert_eq!(duplicate.unwrap_err(), RouterError::DuplicateRouteId("x".into()));

        let index_children = RouteTree::new(vec![Route::index().id("i").child(Route::new("x"))]);
        assert!(matches!(index_children, Err(RouterError::InvalidRoute(_))));

        let absolute = RouteTree::new(vec![Route::new("/a").child(Route::new("/b"))]);
        let Err(RouterError::InvalidRoute(message)) = absolute else {
            panic!("expected an invalid route error");
        };
        assert!(message.starts_with("Absolute route path \"/b\" nested under path \"/a\""));
    }

    #[test]
    fn ranking() {
        let tree = RouteTree::new(vec![
            Route::new("*"),
            Route::new("/users/:id"),
            Route::new("/users/new"),
            Route::new("/users").child(Route::index()),
        ])
        .unwrap();
        assert_eq!(
            tree.ranked_paths(),
            vec!["/users/new", "/users/:id", "/users/", "/users", "/*"]
        );
    }

    #[test]
    fn identical_siblings_keep_declaration_order() {
        let tree = RouteTree::new(vec![
            Route::new("/").children([Route::new("x").id("first"), Route::new("x").id("second")]),
        ])
        .unwrap();
        let matches = match_routes(&tree, "/x", None).unwrap();
        assert_eq!(ids(&matches), vec!["0", "first"]);
    }

    #[test]
    fn layout_routes_only_contribute_children() {
        let tree = RouteTree::new(vec![Route::layout()
            .id("layout")
            .child(Route::new("/about").id("about"))])
        .unwrap();
        assert!(match_routes(&tree, "/", None).is_none());
        assert_eq!(ids(&match_routes(&tree, "/about", None).unwrap()), vec!["layout", "about"]);
    }

    #[test]
    fn params_accumulate_down_the_chain() {
        let tree = RouteTree::new(vec![Route::new("/org/:org")
            .id("org")
            .child(Route::new("repo/:repo").id("repo"))])
        .unwrap();
        let matches = match_routes(&tree, "/org/acme/repo/site", None).unwrap();
        assert_eq!(matches[0].params.len(), 1);
        assert_eq!(matches[0].pathname, "/org/acme");
        assert_eq!(matches[1].params["org"], "acme");
        assert_eq!(matches[1].params["repo"], "site");
        assert_eq!(matches[1].pathname, "/org/acme/repo/site");
    }

    #[test]
    fn optional_segments_match_both_ways() {
        let tree = RouteTree::new(vec![Route::new("/:lang?/about").id("about")]).unwrap();
        let with = match_routes(&tree, "/en/about", None).unwrap();
        assert_eq!(with[0].params["lang"], "en");
        let without = match_routes(&tree, "/about", None).unwrap();
        assert!(without[0].params.is_empty());
    }

    #[test]
    fn segments_are_decoded() {
        let tree = RouteTree::new(vec![Route::new("/files/:name")]).unwrap();
        let matches = match_routes(&tree, "/files/a%20b%2Fc", None).unwrap();
        assert_eq!(matches[0].params["name"], "a b/c");
        assert_eq!(decode_path("/a/%E0%A4%A"), "/a/%E0%A4%A");
    }

    #[test]
    fn splat_captures_the_rest() {
        let tree = RouteTree::new(vec![Route::new("/docs").child(Route::new("*").id("splat"))])
            .unwrap();
        let matches = match_routes(&tree, "/docs/a/b", None).unwrap();
        assert_eq!(matches[1].params["*"], "a/b");
        assert_eq!(matches[1].pathname_base, "/docs");
    }

    #[test]
    fn nearest_boundary() {
        let tree = RouteTree::new(vec![Route::new("/").id("root").child(
            Route::new("a")
                .id("a")
                .error_boundary(true)
                .child(Route::new("b").id("b")),
        )])
        .unwrap();
        let matches = match_routes(&tree, "/a/b", None).unwrap();
        assert_eq!(find_nearest_boundary(&matches, Some("b")).unwrap().route_id(), "a");
        assert_eq!(find_nearest_boundary(&matches, Some("root")).unwrap().route_id(), "root");
        assert_eq!(find_nearest_boundary(&matches, None).unwrap().route_id(), "a");
        assert!(find_nearest_boundary(&[], None).is_none());
    }

    #[test]
    fn patches_keep_existing_ids() {
        let tree = RouteTree::new(vec![Route::new("/").child(Route::new("a"))]).unwrap();
        assert!(match_routes(&tree, "/b", None).is_none());

        let patched = tree
            .patch(Some("0"), vec![Route::new("b").id("b")], &Diagnostics::new())
            .unwrap();
        assert_eq!(ids(&match_routes(&patched, "/b", None).unwrap()), vec!["0", "b"]);
        assert!(patched.route("0-0").is_some());

        let unknown = tree.patch(Some("nope"), Vec::new(), &Diagnostics::new());
        assert_eq!(unknown.unwrap_err(), RouterError::UnknownRoute("nope".into()));
    }
}
