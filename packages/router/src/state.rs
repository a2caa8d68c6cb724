use std::collections::BTreeMap;

use serde_json::Value;
use waymark_history::{Action, Location};

use crate::{RouteMatch, RouterError, Submission};

/// The navigation the router is working on.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Navigation {
    /// Nothing is in flight.
    #[default]
    Idle,

    /// Loaders for `location` are running.
    Loading {
        /// Where the navigation goes.
        location: Location,
        /// The submission, for GET submissions and for the loaders that run after an action.
        submission: Option<Submission>,
    },

    /// The action for `location` is running.
    Submitting {
        /// Where the navigation goes.
        location: Location,
        /// What was submitted.
        submission: Submission,
    },
}

impl Navigation {
    /// Whether nothing is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self, Navigation::Idle)
    }

    /// Whether loaders are running.
    pub fn is_loading(&self) -> bool {
        matches!(self, Navigation::Loading { .. })
    }

    /// Whether an action is running.
    pub fn is_submitting(&self) -> bool {
        matches!(self, Navigation::Submitting { .. })
    }

    /// Where the navigation goes.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Navigation::Idle => None,
            Navigation::Loading { location, .. } | Navigation::Submitting { location, .. } => {
                Some(location)
            }
        }
    }

    /// What the navigation submitted.
    pub fn submission(&self) -> Option<&Submission> {
        match self {
            Navigation::Idle => None,
            Navigation::Loading { submission, .. } => submission.as_ref(),
            Navigation::Submitting { submission, .. } => Some(submission),
        }
    }
}

/// Whether a [`Router::revalidate`](crate::Router::revalidate) call is in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevalidationState {
    /// No revalidation is in flight.
    #[default]
    Idle,
    /// Loaders are rerunning.
    Loading,
}

/// The phase of a fetcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetcherStatus {
    /// Done, or never started.
    #[default]
    Idle,
    /// A loader runs, or the loaders after an action.
    Loading,
    /// An action runs.
    Submitting,
}

/// A fetcher, as published in [`RouterState::fetchers`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetcherState {
    /// The phase.
    pub state: FetcherStatus,
    /// The data of the last completed load or action.
    pub data: Option<Value>,
    /// What the fetcher submitted, while it is submitting.
    pub submission: Option<Submission>,
}

impl FetcherState {
    pub(crate) fn idle(data: Option<Value>) -> Self {
        Self {
            state: FetcherStatus::Idle,
            data,
            submission: None,
        }
    }

    pub(crate) fn loading(data: Option<Value>, submission: Option<Submission>) -> Self {
        Self {
            state: FetcherStatus::Loading,
            data,
            submission,
        }
    }

    pub(crate) fn submitting(data: Option<Value>, submission: Submission) -> Self {
        Self {
            state: FetcherStatus::Submitting,
            data,
            submission: Some(submission),
        }
    }
}

/// A snapshot of the router.
///
/// Snapshots are immutable. The router replaces its snapshot atomically and then tells its
/// subscribers about it, so a subscriber always sees a consistent set of matches, data and errors.
#[derive(Clone, Debug, PartialEq)]
pub struct RouterState {
    /// How the router got to [`location`](Self::location).
    pub history_action: Action,

    /// The committed location, including the basename.
    pub location: Location,

    /// The matches of [`location`](Self::location), root first.
    ///
    /// Trimmed to the error boundary when there are errors. Empty when nothing matched.
    pub matches: Vec<RouteMatch>,

    /// Whether the data of the initial location is available.
    pub initialized: bool,

    /// The navigation in flight.
    pub navigation: Navigation,

    /// Whether a revalidation is in flight.
    pub revalidation: RevalidationState,

    /// Loader data, by route id.
    pub loader_data: BTreeMap<String, Value>,

    /// Action data of the last submission, by route id.
    pub action_data: Option<BTreeMap<String, Value>>,

    /// Errors, by the id of the error boundary that caught them.
    pub errors: Option<BTreeMap<String, RouterError>>,

    /// Every live fetcher, by key.
    pub fetchers: BTreeMap<String, FetcherState>,

    /// Whether the committed navigation asked not to reset the scroll position.
    pub prevent_scroll_reset: bool,
}

impl RouterState {
    /// A [`RouterError::NoMatch`] when the committed location didn't match any route.
    pub fn match_error(&self) -> Option<RouterError> {
        (self.initialized && self.matches.is_empty()).then(|| RouterError::NoMatch {
            pathname: self.location.pathname.clone(),
        })
    }

    /// The ids of the matched routes, root first.
    pub fn route_ids(&self) -> Vec<&str> {
        self.matches.iter().map(RouteMatch::route_id).collect()
    }

    /// The loader data of a route.
    pub fn loader_data(&self, route_id: &str) -> Option<&Value> {
        self.loader_data.get(route_id)
    }

    /// The error caught by a route.
    pub fn error(&self, route_id: &str) -> Option<&RouterError> {
        self.errors.as_ref().and_then(|errors| errors.get(route_id))
    }

    /// The state of a fetcher. Unknown fetchers are idle.
    pub fn fetcher(&self, key: &str) -> FetcherState {
        self.fetchers.get(key).cloned().unwrap_or_default()
    }
}
