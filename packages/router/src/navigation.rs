//! Types relating to navigation.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::{FormData, FormMethod};

/// What a relative navigation target is resolved against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelativeRoutingType {
    /// The route hierarchy: `..` goes to the parent route.
    #[default]
    Route,
    /// The URL: `..` removes one segment.
    Path,
}

/// How to navigate.
///
/// This implements [`Default`] and follows the builder pattern:
///
/// ```rust
/// # use waymark_router::{FormData, FormMethod, NavigateOptions};
/// let options = NavigateOptions::default()
///     .replace(true)
///     .form_method(FormMethod::Post)
///     .form_data(FormData::new().with("title", "Rust"));
/// assert_eq!(options.replace, Some(true));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing a new one.
    ///
    /// When unset, a mutation submitted to the current location replaces, everything else pushes.
    pub replace: Option<bool>,
    /// State to store with the new history entry.
    pub state: Option<Value>,
    /// Resolve relative targets against this route instead of the deepest match.
    pub from_route_id: Option<String>,
    /// How relative targets are resolved.
    pub relative: RelativeRoutingType,
    /// The method of a submission.
    pub form_method: Option<FormMethod>,
    /// The form of a submission.
    pub form_data: Option<FormData>,
    /// Ask the rendering layer not to reset the scroll position.
    pub prevent_scroll_reset: bool,
    /// Accepted for compatibility. Updates are always published synchronously.
    pub flush_sync: bool,
}

impl NavigateOptions {
    /// Set [`replace`](Self::replace).
    pub fn replace(self, replace: bool) -> Self {
        Self {
            replace: Some(replace),
            ..self
        }
    }

    /// Set [`state`](Self::state).
    pub fn state(self, state: Value) -> Self {
        Self {
            state: Some(state),
            ..self
        }
    }

    /// Set [`from_route_id`](Self::from_route_id).
    pub fn from_route_id(self, route_id: impl Into<String>) -> Self {
        Self {
            from_route_id: Some(route_id.into()),
            ..self
        }
    }

    /// Set [`relative`](Self::relative).
    pub fn relative(self, relative: RelativeRoutingType) -> Self {
        Self { relative, ..self }
    }

    /// Set [`form_method`](Self::form_method).
    pub fn form_method(self, form_method: FormMethod) -> Self {
        Self {
            form_method: Some(form_method),
            ..self
        }
    }

    /// Set [`form_data`](Self::form_data).
    pub fn form_data(self, form_data: FormData) -> Self {
        Self {
            form_data: Some(form_data),
            ..self
        }
    }

    /// Set [`prevent_scroll_reset`](Self::prevent_scroll_reset).
    pub fn prevent_scroll_reset(self, prevent_scroll_reset: bool) -> Self {
        Self {
            prevent_scroll_reset,
            ..self
        }
    }
}

/// How to fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchOptions {
    /// How a relative `href` is resolved.
    pub relative: RelativeRoutingType,
    /// The method of a submission.
    pub form_method: Option<FormMethod>,
    /// The form of a submission.
    pub form_data: Option<FormData>,
    /// Ask the rendering layer not to reset the scroll position, should the fetch redirect.
    pub prevent_scroll_reset: bool,
    /// Accepted for compatibility. Updates are always published synchronously.
    pub flush_sync: bool,
}

impl FetchOptions {
    /// Set [`relative`](Self::relative).
    pub fn relative(self, relative: RelativeRoutingType) -> Self {
        Self { relative, ..self }
    }

    /// Set [`form_method`](Self::form_method).
    pub fn form_method(self, form_method: FormMethod) -> Self {
        Self {
            form_method: Some(form_method),
            ..self
        }
    }

    /// Set [`form_data`](Self::form_data).
    pub fn form_data(self, form_data: FormData) -> Self {
        Self {
            form_data: Some(form_data),
            ..self
        }
    }
}

/// The asynchronous rest of a navigation, fetch or revalidation.
///
/// Everything that can happen synchronously, like resolving the target and publishing the
/// `loading` state, already happened when this is returned. The loaders and actions only run
/// while this future is polled. A future whose work was superseded resolves without committing.
#[must_use = "navigations make no progress unless the returned future is awaited"]
pub struct PendingNavigation {
    future: LocalBoxFuture<'static, ()>,
}

impl PendingNavigation {
    pub(crate) fn new(future: impl Future<Output = ()> + 'static) -> Self {
        Self {
            future: future.boxed_local(),
        }
    }

    pub(crate) fn ready() -> Self {
        Self::new(futures_util::future::ready(()))
    }
}

impl Future for PendingNavigation {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.future.poll_unpin(cx)
    }
}

impl fmt::Debug for PendingNavigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingNavigation").finish_non_exhaustive()
    }
}
