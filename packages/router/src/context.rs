//! Route scoped views of a router.
//!
//! A [`RouteContext`] is what a rendering layer hands to the content of a matched route: the
//! router, plus which route is asking. Relative paths resolve against that route, and the data
//! and errors returned are that route's.

use std::rc::Rc;

use serde_json::Value;
use waymark_history::{Location, Path, To};

use crate::{
    get_resolve_to_matches, join_paths, resolve_to, strip_basename, NavigateOptions, Params,
    PendingNavigation, RouteMatch, Router, RouterError, RouterState,
};

impl Router {
    /// A context for the matched route `route_id`.
    pub fn route_context(&self, route_id: &str) -> Result<RouteContext, RouterError> {
        if self.routes().route(route_id).is_none() {
            return Err(RouterError::UnknownRoute(route_id.to_string()));
        }
        Ok(RouteContext {
            router: self.clone(),
            route_id: Some(route_id.to_string()),
        })
    }

    /// A context outside of every route, e.g. for what renders the first [`outlet`].
    ///
    /// [`outlet`]: RouteContext::outlet
    pub fn root_context(&self) -> RouteContext {
        RouteContext {
            router: self.clone(),
            route_id: None,
        }
    }
}

/// A [`Router`] as seen from one of its matched routes.
///
/// Every accessor reads the router's current state. Route scoped accessors fail with
/// [`RouterError::ContextMisuse`] when the context has no route, when the route isn't matched
/// anymore, or when the router was disposed.
#[derive(Clone, Debug)]
pub struct RouteContext {
    router: Router,
    route_id: Option<String>,
}

impl RouteContext {
    /// The router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The route id, `None` for the root context.
    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// The committed location.
    pub fn location(&self) -> Result<Location, RouterError> {
        Ok(self.state("location")?.location.clone())
    }

    /// The matches from the root down to this route. All matches for the root context.
    pub fn matches(&self) -> Result<Vec<RouteMatch>, RouterError> {
        let state = self.state("matches")?;
        let end = match self.route_id {
            Some(_) => self.position(&state, "matches")? + 1,
            None => state.matches.len(),
        };
        Ok(state.matches[..end].to_vec())
    }

    /// The match of this route.
    pub fn route(&self) -> Result<RouteMatch, RouterError> {
        let state = self.state("route")?;
        let idx = self.position(&state, "route")?;
        Ok(state.matches[idx].clone())
    }

    /// The params of this route and its ancestors. The root context has none.
    pub fn params(&self) -> Result<Params, RouterError> {
        let state = self.state("params")?;
        match self.route_id {
            Some(_) => Ok(state.matches[self.position(&state, "params")?].params.clone()),
            None => Ok(Params::new()),
        }
    }

    /// Resolve `to` relative to this route, without the basename.
    pub fn resolved_path(&self, to: impl Into<To>) -> Result<Path, RouterError> {
        let to = to.into();
        let matches = self.matches()?;
        let router = &self.router;
        let location = router.state().location.clone();
        let current = strip_basename(&location.pathname, router.basename())
            .unwrap_or(location.pathname);
        let route_pathnames =
            get_resolve_to_matches(&matches, router.inner.future.relative_splat_path);
        resolve_to(&to, &route_pathnames, &current, false)
    }

    /// The href of `to`, resolved relative to this route, as the history renders it.
    pub fn href(&self, to: impl Into<To>) -> Result<String, RouterError> {
        let mut path = self.resolved_path(to)?;
        if let Some(basename) = self.router.basename() {
            path.pathname = if path.pathname == "/" {
                basename.to_string()
            } else {
                join_paths(&[basename, &path.pathname])
            };
        }
        Ok(self.router.create_href(&To::Path(path.into())))
    }

    /// The data of this route's loader.
    pub fn loader_data(&self) -> Result<Option<Value>, RouterError> {
        let state = self.state("loader_data")?;
        let route_id = self.matched_id(&state, "loader_data")?;
        Ok(state.loader_data(route_id).cloned())
    }

    /// The data of this route's action, when the last submission went to it.
    pub fn action_data(&self) -> Result<Option<Value>, RouterError> {
        let state = self.state("action_data")?;
        let route_id = self.matched_id(&state, "action_data")?;
        Ok(state
            .action_data
            .as_ref()
            .and_then(|data| data.get(route_id))
            .cloned())
    }

    /// The error this route caught.
    pub fn route_error(&self) -> Result<Option<RouterError>, RouterError> {
        let state = self.state("route_error")?;
        let route_id = self.matched_id(&state, "route_error")?;
        Ok(state.error(route_id).cloned())
    }

    /// Navigate relative to this route.
    pub fn navigate(
        &self,
        to: impl Into<To>,
        mut options: NavigateOptions,
    ) -> Result<PendingNavigation, RouterError> {
        self.state("navigate")?;
        if options.from_route_id.is_none() {
            options.from_route_id = self.route_id.clone();
        }
        self.router.navigate(to, options)
    }

    /// The context of the matched child route, if there is one.
    pub fn outlet(&self) -> Result<Option<RouteContext>, RouterError> {
        let state = self.state("outlet")?;
        let child = match self.route_id {
            Some(_) => state.matches.get(self.position(&state, "outlet")? + 1),
            None => state.matches.first(),
        };
        Ok(child.map(|child| RouteContext {
            router: self.router.clone(),
            route_id: Some(child.route.id.clone()),
        }))
    }

    fn state(&self, api: &'static str) -> Result<Rc<RouterState>, RouterError> {
        if self.router.is_disposed() {
            return Err(RouterError::ContextMisuse { api });
        }
        Ok(self.router.state())
    }

    fn position(&self, state: &RouterState, api: &'static str) -> Result<usize, RouterError> {
        let route_id = self
            .route_id
            .as_deref()
            .ok_or(RouterError::ContextMisuse { api })?;
        state
            .matches
            .iter()
            .position(|m| m.route.id == route_id)
            .ok_or(RouterError::ContextMisuse { api })
    }

    fn matched_id<'a>(
        &self,
        state: &'a RouterState,
        api: &'static str,
    ) -> Result<&'a str, RouterError> {
        let idx = self.position(state, api)?;
        Ok(&state.matches[idx].route.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataOutcome, Route, RouterConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use waymark_history::MemoryHistory;

    async fn router(path: &str, basename: Option<&str>) -> Router {
        let routes = vec![Route::new("/")
            .id("root")
            .loader(|_| async { Ok(DataOutcome::Data(json!("root"))) })
            .children([Route::new("courses/:id")
                .id("course")
                .loader(|args| async move { Ok(DataOutcome::Data(json!(args.params["id"]))) })
                .child(Route::new("lessons/:lesson").id("lesson"))])];
        let mut cfg = RouterConfig::new(routes)
            .history(Rc::new(MemoryHistory::with_initial_path(path)));
        if let Some(basename) = basename {
            cfg = cfg.basename(basename);
        }
        let router = Router::new(cfg).unwrap();
        router.initialize().await;
        router
    }

    #[tokio::test]
    async fn params_are_scoped_to_the_route() {
        let router = router("/courses/7/lessons/2", None).await;

        let root = router.route_context("root").unwrap();
        assert_eq!(root.params().unwrap(), Params::new());

        let course = router.route_context("course").unwrap();
        assert_eq!(course.params().unwrap()["id"], "7");
        assert!(!course.params().unwrap().contains_key("lesson"));

        let lesson = router.route_context("lesson").unwrap();
        assert_eq!(lesson.params().unwrap()["lesson"], "2");
        assert_eq!(lesson.params().unwrap()["id"], "7");
    }

    #[tokio::test]
    async fn data_and_outlets() {
        let router = router("/courses/7", None).await;
        let root = router.root_context();
        assert_eq!(root.params().unwrap(), Params::new());

        let first = root.outlet().unwrap().unwrap();
        assert_eq!(first.route_id(), Some("root"));
        assert_eq!(first.loader_data().unwrap(), Some(json!("root")));

        let course = first.outlet().unwrap().unwrap();
        assert_eq!(course.loader_data().unwrap(), Some(json!("7")));
        assert_eq!(course.action_data().unwrap(), None);
        assert_eq!(course.route_error().unwrap(), None);
        assert_eq!(course.outlet().unwrap().map(|c| c.route_id), None);
        assert_eq!(course.matches().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn relative_paths_and_hrefs() {
        let router = router("/app/courses/7/lessons/2", Some("/app")).await;
        let course = router.route_context("course").unwrap();

        assert_eq!(course.resolved_path("..").unwrap().pathname, "/");
        assert_eq!(course.resolved_path("edit").unwrap().pathname, "/courses/7/edit");
        assert_eq!(course.href("edit?draft=1").unwrap(), "/app/courses/7/edit?draft=1");
        assert_eq!(course.href("/").unwrap(), "/app");

        course.navigate("lessons/3", NavigateOptions::default()).unwrap().await;
        assert_eq!(course.location().unwrap().pathname, "/app/courses/7/lessons/3");
    }

    #[tokio::test]
    async fn misuse() {
        let router = router("/courses/7", None).await;
        let root = router.root_context();
        assert_eq!(
            root.loader_data(),
            Err(RouterError::ContextMisuse { api: "loader_data" })
        );

        // matched routes only
        let lesson = router.route_context("lesson").unwrap();
        assert_eq!(
            lesson.route_error(),
            Err(RouterError::ContextMisuse { api: "route_error" })
        );
        assert!(matches!(
            router.route_context("nope"),
            Err(RouterError::UnknownRoute(_))
        ));

        let course = router.route_context("course").unwrap();
        router.dispose();
        assert_eq!(
            course.location(),
            Err(RouterError::ContextMisuse { api: "location" })
        );
    }
}
