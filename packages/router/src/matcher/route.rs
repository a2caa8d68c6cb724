use std::{
    any::Any,
    cell::OnceCell,
    fmt::{self, Debug},
    future::Future,
    rc::Rc,
};

use futures_util::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use waymark_history::Path;

use crate::{
    data::data_function, DataArgs, DataFunction, DataResult, Diagnostics, FormData, FormMethod,
    Params,
};

/// What a `should_revalidate` hook is asked about.
#[derive(Clone, Debug, PartialEq)]
pub struct ShouldRevalidateArgs {
    /// The location before the change.
    pub current_url: Path,
    /// The params of the route before the change.
    pub current_params: Params,
    /// The location after the change.
    pub next_url: Path,
    /// The params of the route after the change.
    pub next_params: Params,
    /// The method of the submission that triggered the revalidation, if any.
    pub form_method: Option<FormMethod>,
    /// Where that submission went.
    pub form_action: Option<String>,
    /// What that submission carried.
    pub form_data: Option<FormData>,
    /// The status of the action error response, if the action failed with one.
    pub action_status: Option<u16>,
    /// The data the action returned.
    pub action_result: Option<Value>,
    /// What the router would do without the hook.
    pub default_should_revalidate: bool,
}

/// Decides whether a route's loader reruns. See [`Route::should_revalidate`].
pub type ShouldRevalidateFn = Rc<dyn Fn(&ShouldRevalidateArgs) -> bool>;

/// Resolves the lazily loaded part of a route. See [`Route::lazy`].
pub type LazyFn = Rc<dyn Fn() -> LocalBoxFuture<'static, LazyRoute>>;

/// The render payload of a route.
///
/// The router never looks inside the payload; it only hands it to the rendering layer.
#[derive(Clone)]
pub enum RouteContent {
    /// The route renders nothing of its own, only its matched child.
    Outlet,
    /// A component to instantiate.
    Component(Rc<dyn Any>),
    /// A ready made element.
    Element(Rc<dyn Any>),
}

impl RouteContent {
    fn resolve(
        id: &str,
        component: Option<Rc<dyn Any>>,
        element: Option<Rc<dyn Any>>,
        diagnostics: &Diagnostics,
    ) -> Self {
        match (component, element) {
            (Some(component), Some(_)) => {
                diagnostics.warn_once(
                    &format!("component-and-element:{id}"),
                    format!(
                        "You should not include both `component` and `element` on your route \
                         \"{id}\" - `component` will be used."
                    ),
                );
                RouteContent::Component(component)
            }
            (Some(component), None) => RouteContent::Component(component),
            (None, Some(element)) => RouteContent::Element(element),
            (None, None) => RouteContent::Outlet,
        }
    }

    /// Whether this is [`RouteContent::Outlet`].
    pub fn is_outlet(&self) -> bool {
        matches!(self, RouteContent::Outlet)
    }

    /// The payload, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            RouteContent::Outlet => None,
            RouteContent::Component(c) | RouteContent::Element(c) => c.downcast_ref(),
        }
    }
}

impl Debug for RouteContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteContent::Outlet => "Outlet",
            RouteContent::Component(_) => "Component",
            RouteContent::Element(_) => "Element",
        })
    }
}

/// A route definition.
///
/// Routes follow the builder pattern:
///
/// ```rust
/// # use waymark_router::{DataOutcome, Route};
/// # use serde_json::json;
/// let routes = vec![Route::new("/")
///     .id("root")
///     .error_boundary(true)
///     .children([
///         Route::index().element("home"),
///         Route::new("courses/:id").loader(|args| async move {
///             Ok(DataOutcome::Data(json!({ "id": args.params["id"] })))
///         }),
///     ])];
/// ```
#[derive(Clone, Default)]
pub struct Route {
    pub(crate) id: Option<String>,
    pub(crate) path: Option<String>,
    pub(crate) index: bool,
    pub(crate) case_sensitive: bool,
    pub(crate) children: Vec<Route>,
    pub(crate) loader: Option<DataFunction>,
    pub(crate) action: Option<DataFunction>,
    pub(crate) error_boundary: bool,
    pub(crate) error_element: Option<Rc<dyn Any>>,
    pub(crate) component: Option<Rc<dyn Any>>,
    pub(crate) element: Option<Rc<dyn Any>>,
    pub(crate) lazy: Option<LazyFn>,
    pub(crate) should_revalidate: Option<ShouldRevalidateFn>,
    pub(crate) handle: Option<Value>,
}

impl Route {
    /// A route matching `path`, relative to its parent unless it starts with `/`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// An index route, rendered at its parent's path. Index routes can't have children.
    pub fn index() -> Self {
        Self {
            index: true,
            ..Default::default()
        }
    }

    /// A route without a path. It only groups its children, e.g. under a common layout or boundary.
    pub fn layout() -> Self {
        Self::default()
    }

    /// Set the id. Routes without one get an id from their position, e.g. `0-1`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Compare static segments case-sensitively.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Add children.
    pub fn children(mut self, children: impl IntoIterator<Item = Route>) -> Self {
        self.children.extend(children);
        self
    }

    /// Add a child.
    pub fn child(mut self, child: Route) -> Self {
        self.children.push(child);
        self
    }

    /// Set the loader, which provides the data of the route on navigation.
    pub fn loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn(DataArgs) -> Fut + 'static,
        Fut: Future<Output = DataResult> + 'static,
    {
        self.loader = Some(data_function(loader));
        self
    }

    /// Set the action, which handles mutation submissions to the route.
    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(DataArgs) -> Fut + 'static,
        Fut: Future<Output = DataResult> + 'static,
    {
        self.action = Some(data_function(action));
        self
    }

    /// Make the route catch the errors of itself and its descendants.
    pub fn error_boundary(mut self, error_boundary: bool) -> Self {
        self.error_boundary = error_boundary;
        self
    }

    /// Render `element` when an error is caught here. Implies [`Route::error_boundary`].
    pub fn error_element<T: Any>(mut self, element: T) -> Self {
        self.error_element = Some(Rc::new(element));
        self
    }

    /// Render `component` for this route.
    pub fn component<T: Any>(mut self, component: T) -> Self {
        self.component = Some(Rc::new(component));
        self
    }

    /// Render `element` for this route. A [`Route::component`] takes precedence.
    pub fn element<T: Any>(mut self, element: T) -> Self {
        self.element = Some(Rc::new(element));
        self
    }

    /// Load part of the route the first time it is needed.
    ///
    /// The future runs once, before the first loader or action of the route. Properties it returns
    /// never override properties set on the route itself.
    pub fn lazy<F, Fut>(mut self, lazy: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = LazyRoute> + 'static,
    {
        self.lazy = Some(Rc::new(move || lazy().boxed_local()));
        self
    }

    /// Decide whether the loader reruns when the router would otherwise skip it, or skip it
    /// when the router would rerun it.
    pub fn should_revalidate(
        mut self,
        should_revalidate: impl Fn(&ShouldRevalidateArgs) -> bool + 'static,
    ) -> Self {
        self.should_revalidate = Some(Rc::new(should_revalidate));
        self
    }

    /// Attach arbitrary data for the rendering layer.
    pub fn handle(mut self, handle: Value) -> Self {
        self.handle = Some(handle);
        self
    }

    /// The explicitly set id.
    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The path.
    pub fn get_path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// The lazily loaded part of a route.
#[derive(Clone, Default)]
pub struct LazyRoute {
    loader: Option<DataFunction>,
    action: Option<DataFunction>,
    error_boundary: Option<bool>,
    content: Option<RouteContent>,
    should_revalidate: Option<ShouldRevalidateFn>,
}

impl LazyRoute {
    /// Nothing to add.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a loader.
    pub fn loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn(DataArgs) -> Fut + 'static,
        Fut: Future<Output = DataResult> + 'static,
    {
        self.loader = Some(data_function(loader));
        self
    }

    /// Provide an action.
    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(DataArgs) -> Fut + 'static,
        Fut: Future<Output = DataResult> + 'static,
    {
        self.action = Some(data_function(action));
        self
    }

    /// Provide the error boundary flag.
    pub fn error_boundary(mut self, error_boundary: bool) -> Self {
        self.error_boundary = Some(error_boundary);
        self
    }

    /// Provide a component.
    pub fn component<T: Any>(mut self, component: T) -> Self {
        self.content = Some(RouteContent::Component(Rc::new(component)));
        self
    }

    /// Provide an element.
    pub fn element<T: Any>(mut self, element: T) -> Self {
        self.content = Some(RouteContent::Element(Rc::new(element)));
        self
    }

    /// Provide a `should_revalidate` hook.
    pub fn should_revalidate(
        mut self,
        should_revalidate: impl Fn(&ShouldRevalidateArgs) -> bool + 'static,
    ) -> Self {
        self.should_revalidate = Some(Rc::new(should_revalidate));
        self
    }
}

/// A registered route.
///
/// Created from a [`Route`] when a [`RouteTree`](crate::RouteTree) is built, and immutable after
/// that except for the write-once result of its lazy loader.
pub struct DataRoute {
    /// The id, either given or derived from the position in the tree.
    pub id: String,
    /// The path pattern.
    pub path: Option<String>,
    /// Whether this is an index route.
    pub index: bool,
    /// Whether static segments compare case-sensitively.
    pub case_sensitive: bool,
    /// The child routes.
    pub children: Vec<Rc<DataRoute>>,
    /// Arbitrary data for the rendering layer.
    pub handle: Option<Value>,
    loader: Option<DataFunction>,
    action: Option<DataFunction>,
    has_error_boundary: bool,
    content: RouteContent,
    error_content: Option<Rc<dyn Any>>,
    should_revalidate: Option<ShouldRevalidateFn>,
    lazy: Option<LazyFn>,
    lazy_resolved: Rc<OnceCell<LazyRoute>>,
}

impl DataRoute {
    pub(crate) fn from_route(
        route: &Route,
        id: String,
        children: Vec<Rc<DataRoute>>,
        previous: Option<&DataRoute>,
        diagnostics: &Diagnostics,
    ) -> Self {
        let content = RouteContent::resolve(
            &id,
            route.component.clone(),
            route.element.clone(),
            diagnostics,
        );
        Self {
            path: route.path.clone(),
            index: route.index,
            case_sensitive: route.case_sensitive,
            children,
            handle: route.handle.clone(),
            loader: route.loader.clone(),
            action: route.action.clone(),
            has_error_boundary: route.error_boundary || route.error_element.is_some(),
            content,
            error_content: route.error_element.clone(),
            should_revalidate: route.should_revalidate.clone(),
            lazy: route.lazy.clone(),
            // a rebuilt tree keeps what the lazy loader already produced
            lazy_resolved: previous
                .map(|previous| previous.lazy_resolved.clone())
                .unwrap_or_default(),
            id,
        }
    }

    fn lazy(&self) -> Option<&LazyRoute> {
        self.lazy_resolved.get()
    }

    /// The loader, including one provided by the lazy loader.
    pub fn loader(&self) -> Option<DataFunction> {
        self.loader
            .clone()
            .or_else(|| self.lazy().and_then(|lazy| lazy.loader.clone()))
    }

    /// Whether the route has a loader right now.
    pub fn has_loader(&self) -> bool {
        self.loader().is_some()
    }

    /// The action, including one provided by the lazy loader.
    pub fn action(&self) -> Option<DataFunction> {
        self.action
            .clone()
            .or_else(|| self.lazy().and_then(|lazy| lazy.action.clone()))
    }

    /// Whether the route has an action right now.
    pub fn has_action(&self) -> bool {
        self.action().is_some()
    }

    /// Whether errors of this route and its descendants are caught here.
    pub fn has_error_boundary(&self) -> bool {
        self.has_error_boundary
            || self
                .lazy()
                .and_then(|lazy| lazy.error_boundary)
                .unwrap_or(false)
    }

    /// What the route renders.
    pub fn content(&self) -> RouteContent {
        match (&self.content, self.lazy().and_then(|lazy| lazy.content.clone())) {
            (RouteContent::Outlet, Some(lazy)) => lazy,
            (content, _) => content.clone(),
        }
    }

    /// What the route renders when it caught an error.
    pub fn error_content(&self) -> Option<Rc<dyn Any>> {
        self.error_content.clone()
    }

    /// The `should_revalidate` hook.
    pub fn should_revalidate(&self) -> Option<ShouldRevalidateFn> {
        self.should_revalidate
            .clone()
            .or_else(|| self.lazy().and_then(|lazy| lazy.should_revalidate.clone()))
    }

    /// Whether the route has a lazy part that hasn't been loaded yet.
    pub fn is_lazy_pending(&self) -> bool {
        self.lazy.is_some() && self.lazy_resolved.get().is_none()
    }

    /// Load the lazy part of the route, if there is one that wasn't loaded yet.
    pub(crate) async fn resolve_lazy(&self, diagnostics: &Diagnostics) {
        let Some(lazy) = self.lazy.clone() else {
            return;
        };
        if self.lazy_resolved.get().is_some() {
            return;
        }

        let resolved = lazy().await;

        let overrides = [
            ("loader", self.loader.is_some() && resolved.loader.is_some()),
            ("action", self.action.is_some() && resolved.action.is_some()),
            (
                "hasErrorBoundary",
                self.has_error_boundary && resolved.error_boundary.is_some(),
            ),
            (
                "content",
                !self.content.is_outlet() && resolved.content.is_some(),
            ),
            (
                "shouldRevalidate",
                self.should_revalidate.is_some() && resolved.should_revalidate.is_some(),
            ),
        ];
        for (property, overridden) in overrides {
            if overridden {
                diagnostics.warn_once(
                    &format!("lazy-override:{}:{property}", self.id),
                    format!(
                        "Route \"{}\" has a static property \"{property}\" defined but its lazy \
                         function is also returning a value for this property. The lazy route \
                         property \"{property}\" will be ignored.",
                        self.id
                    ),
                );
            }
        }

        // a concurrent resolution may have won the race, its result is as good as ours
        let _ = self.lazy_resolved.set(resolved);
    }
}

impl Debug for DataRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRoute")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("has_loader", &self.has_loader())
            .field("has_action", &self.has_action())
            .field("has_error_boundary", &self.has_error_boundary())
            .field("content", &self.content())
            .field("children", &self.children)
            .finish()
    }
}
