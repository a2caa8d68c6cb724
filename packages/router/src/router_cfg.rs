use std::{fmt, future::Future, rc::Rc};

use futures_util::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use waymark_history::History;

use crate::{
    DataStrategy, HydrationState, ParallelDataStrategy, Route, RouteError, RoutePatch,
};

/// The default for [`RouterConfig::max_redirects`].
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// Opt-in behavior changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FutureConfig {
    /// Resolve relative paths inside a splat route against the full URL instead of the route path.
    pub relative_splat_path: bool,
    /// Don't rerun loaders after an action failed with a 4xx or 5xx status.
    pub skip_action_error_revalidation: bool,
}

/// What [`RouterConfig::patch_routes_on_navigation`] is asked about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchArgs {
    /// The pathname that didn't match, including the basename.
    pub path: String,
}

/// Discovers routes for a location that didn't match.
pub type PatchRoutesFn =
    Rc<dyn Fn(PatchArgs) -> LocalBoxFuture<'static, Result<Vec<RoutePatch>, RouteError>>>;

/// Everything a [`Router`](crate::Router) is created from.
///
/// This follows the builder pattern:
///
/// ```rust
/// # use std::rc::Rc;
/// # use waymark_history::MemoryHistory;
/// # use waymark_router::{Route, RouterConfig, SequentialDataStrategy};
/// let cfg = RouterConfig::new(vec![Route::new("/")])
///     .history(Rc::new(MemoryHistory::with_initial_path("/app")))
///     .basename("/app")
///     .data_strategy(SequentialDataStrategy)
///     .max_redirects(5);
/// ```
pub struct RouterConfig {
    pub(crate) routes: Vec<Route>,
    pub(crate) history: Option<Rc<dyn History>>,
    pub(crate) basename: Option<String>,
    pub(crate) hydration_data: Option<HydrationState>,
    pub(crate) future: FutureConfig,
    pub(crate) data_strategy: Rc<dyn DataStrategy>,
    pub(crate) patch_routes_on_navigation: Option<PatchRoutesFn>,
    pub(crate) max_redirects: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            history: None,
            basename: None,
            hydration_data: None,
            future: FutureConfig::default(),
            data_strategy: Rc::new(ParallelDataStrategy),
            patch_routes_on_navigation: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl RouterConfig {
    /// A config for `routes`, with every option at its default.
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes,
            ..Default::default()
        }
    }

    /// The history the router reads and writes.
    ///
    /// Defaults to a [`MemoryHistory`](waymark_history::MemoryHistory) at `/`.
    pub fn history<H: History + 'static>(self, history: Rc<H>) -> Self {
        Self {
            history: Some(history),
            ..self
        }
    }

    /// The path the application is mounted at. Locations outside of it don't match.
    ///
    /// Defaults to `/`.
    pub fn basename(self, basename: impl Into<String>) -> Self {
        let basename = basename.into();
        Self {
            basename: (!basename.is_empty() && basename != "/").then_some(basename),
            ..self
        }
    }

    /// Data rendered elsewhere, e.g. on a server, for the initial location.
    pub fn hydration_data(self, hydration_data: HydrationState) -> Self {
        Self {
            hydration_data: Some(hydration_data),
            ..self
        }
    }

    /// Opt-in behavior changes.
    pub fn future(self, future: FutureConfig) -> Self {
        Self { future, ..self }
    }

    /// How loaders and actions are scheduled.
    ///
    /// Defaults to [`ParallelDataStrategy`].
    pub fn data_strategy(self, data_strategy: impl DataStrategy + 'static) -> Self {
        Self {
            data_strategy: Rc::new(data_strategy),
            ..self
        }
    }

    /// Called when a location doesn't match, to add the routes it needs.
    ///
    /// The router retries the match once after applying the returned patches.
    pub fn patch_routes_on_navigation<F, Fut>(self, patch: F) -> Self
    where
        F: Fn(PatchArgs) -> Fut + 'static,
        Fut: Future<Output = Result<Vec<RoutePatch>, RouteError>> + 'static,
    {
        Self {
            patch_routes_on_navigation: Some(Rc::new(move |args| patch(args).boxed_local())),
            ..self
        }
    }

    /// How many redirects in a row are followed before giving up with a
    /// [`RouterError::RedirectLoop`](crate::RouterError::RedirectLoop).
    ///
    /// Defaults to [`DEFAULT_MAX_REDIRECTS`].
    pub fn max_redirects(self, max_redirects: usize) -> Self {
        Self {
            max_redirects,
            ..self
        }
    }
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("routes", &self.routes)
            .field("basename", &self.basename)
            .field("hydration_data", &self.hydration_data)
            .field("future", &self.future)
            .field("max_redirects", &self.max_redirects)
            .finish_non_exhaustive()
    }
}
