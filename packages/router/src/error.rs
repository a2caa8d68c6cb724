use crate::RouteError;

/// Everything that can go wrong inside the router.
///
/// Errors raised while resolving a target (`NavigationTarget`, `UnknownRoute`, `Disposed`, ...)
/// are returned to the caller and never enter the router state. Errors raised by loaders and
/// actions are caught per route and committed into [`RouterState::errors`](crate::RouterState),
/// keyed by the nearest error boundary.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RouterError {
    /// The navigation target was malformed, e.g. a `?` inside a manually specified pathname.
    #[error("{0}")]
    NavigationTarget(String),

    /// No route matched the location.
    #[error("no route matches the location \"{pathname}\"")]
    NoMatch {
        /// The pathname that didn't match.
        pathname: String,
    },

    /// A loader failed.
    #[error("the loader of route \"{route_id}\" failed: {source}")]
    Loader {
        /// The route whose loader failed.
        route_id: String,
        /// What the loader returned.
        #[source]
        source: RouteError,
    },

    /// An action failed.
    #[error("the action of route \"{route_id}\" failed: {source}")]
    Action {
        /// The route whose action failed.
        route_id: String,
        /// What the action returned.
        #[source]
        source: RouteError,
    },

    /// Too many redirects were followed in a row.
    #[error("followed more than {limit} redirects, the last one to \"{location}\"")]
    RedirectLoop {
        /// The configured limit.
        limit: usize,
        /// The redirect target that was not followed.
        location: String,
    },

    /// A route scoped API was used without a route, or on a router that was disposed.
    #[error("`{api}` may only be used within the context of a matched route of a live router")]
    ContextMisuse {
        /// The API that was misused.
        api: &'static str,
    },

    /// Two routes were registered with the same id.
    #[error("found a route id collision on id \"{0}\", route ids must be unique")]
    DuplicateRouteId(String),

    /// A route definition is invalid.
    #[error("{0}")]
    InvalidRoute(String),

    /// A path pattern needed a param that wasn't provided.
    #[error("missing \":{0}\" param")]
    MissingParam(String),

    /// The router was disposed.
    #[error("the router was disposed")]
    Disposed,

    /// No route with this id exists.
    #[error("no route with the id \"{0}\" exists")]
    UnknownRoute(String),
}

impl RouterError {
    /// The error a loader or action produced, if this error wraps one.
    pub fn route_error(&self) -> Option<&RouteError> {
        match self {
            RouterError::Loader { source, .. } | RouterError::Action { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The HTTP-like status of the error, if it wraps an error response.
    pub fn status(&self) -> Option<u16> {
        self.route_error().and_then(RouteError::status)
    }
}
