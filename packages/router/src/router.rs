use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};
use waymark_history::{create_location, Action, History, MemoryHistory, To};

use crate::{
    match_routes,
    service::{normalize_submission, trim_matches, Attempt, Phase, RouterInner},
    Diagnostics, HydrationState, Navigation, NavigateOptions, PendingNavigation, RevalidationState,
    RouteMatch, RouteTree, RouterConfig, RouterError, RouterState,
};

/// A data router.
///
/// The router owns the [`RouterState`]: it matches locations against its routes, runs loaders
/// and actions, follows redirects, and commits the result atomically. Cloning a router is cheap,
/// all clones share the same state.
///
/// Nothing runs in the background. Operations that need to load data return a
/// [`PendingNavigation`] that does the work while it is awaited.
///
/// ```rust
/// # use waymark_history::MemoryHistory;
/// # use std::rc::Rc;
/// # use waymark_router::{NavigateOptions, Route, Router, RouterConfig};
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let router = Router::new(
///     RouterConfig::new(vec![
///         Route::new("/").child(Route::new("about")),
///     ])
///     .history(Rc::new(MemoryHistory::default())),
/// )?;
/// router.initialize().await;
///
/// router.navigate("/about", NavigateOptions::default())?.await;
/// assert_eq!(router.state().location.pathname, "/about");
/// assert_eq!(router.state().route_ids(), vec!["0", "0-0"]);
/// # Ok::<_, waymark_router::RouterError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct Router {
    pub(crate) inner: Rc<RouterInner>,
}

impl Router {
    /// Create a router.
    ///
    /// Fails when the routes can't be registered. The router starts out with the matches of the
    /// current history location, and is [`initialized`](RouterState::initialized) right away when
    /// none of them needs to load (or everything was hydrated).
    pub fn new(cfg: RouterConfig) -> Result<Self, RouterError> {
        let RouterConfig {
            routes,
            history,
            basename,
            hydration_data,
            future,
            data_strategy,
            patch_routes_on_navigation,
            max_redirects,
        } = cfg;

        let diagnostics = Rc::new(Diagnostics::new());
        let tree = RouteTree::build(routes, &diagnostics)?;
        let history =
            history.unwrap_or_else(|| Rc::new(MemoryHistory::default()) as Rc<dyn History>);
        let state = initial_state(
            &tree,
            history.as_ref(),
            basename.as_deref(),
            hydration_data,
            patch_routes_on_navigation.is_some(),
            &diagnostics,
        );
        debug!(
            location = %state.location.href(),
            routes = ?state.route_ids(),
            initialized = state.initialized,
            "created router"
        );

        let (pop_tx, pop_rx) = unbounded();
        Ok(Self {
            inner: Rc::new(RouterInner {
                history,
                tree: RefCell::new(Rc::new(tree)),
                basename,
                future,
                strategy: data_strategy,
                patch_routes: patch_routes_on_navigation,
                max_redirects,
                diagnostics,
                state: RefCell::new(Rc::new(state)),
                subscribers: RefCell::new(Vec::new()),
                next_subscriber: Cell::new(0),
                navigation_id: Cell::new(0),
                active: RefCell::new(None),
                revalidation_required: Cell::new(false),
                restarts: RefCell::new(FxHashMap::default()),
                fetch_tokens: RefCell::new(FxHashMap::default()),
                next_fetch_token: Cell::new(0),
                pop_tx: RefCell::new(Some(pop_tx)),
                pop_rx: RefCell::new(Some(pop_rx)),
                listener: Cell::new(None),
                disposed: Cell::new(false),
            }),
        })
    }

    /// Start listening to the history, and load the data of the initial location if needed.
    pub fn initialize(&self) -> PendingNavigation {
        let inner = &self.inner;
        if inner.disposed.get() {
            return PendingNavigation::ready();
        }
        inner.listen_history();

        let state = inner.state();
        if state.initialized {
            return PendingNavigation::ready();
        }
        inner.start(
            Attempt::navigation(state.location.clone(), state.history_action),
            false,
        )
    }

    /// Navigate to `to`.
    ///
    /// `to` is resolved against the matched routes (or the route `options.from_route_id`) first,
    /// and an invalid target is returned as an error without touching the state. Otherwise the
    /// navigation is published right away and any earlier navigation is superseded.
    pub fn navigate(
        &self,
        to: impl Into<To>,
        options: NavigateOptions,
    ) -> Result<PendingNavigation, RouterError> {
        let inner = &self.inner;
        inner.ensure_live()?;
        let to = to.into();
        let state = inner.state();

        let path = inner.normalize_to(
            &state,
            &to,
            options.from_route_id.as_deref(),
            options.relative,
        )?;
        let (path, submission) = normalize_submission(
            path,
            options.form_method,
            options.form_data.as_ref(),
            false,
        );

        // submitting to the current URL replaces the entry unless asked otherwise
        let replace = options.replace.unwrap_or_else(|| {
            submission.as_ref().is_some_and(|submission| {
                submission.form_method.is_mutation()
                    && submission.form_action
                        == format!("{}{}", state.location.pathname, state.location.search)
            })
        });
        let location = create_location(
            &state.location.pathname,
            &To::Path(path.into()),
            options.state,
            None,
        );

        let action = if replace { Action::Replace } else { Action::Push };
        let attempt = Attempt {
            submission,
            prevent_scroll_reset: options.prevent_scroll_reset,
            replace_requested: options.replace == Some(true),
            ..Attempt::navigation(location, action)
        };
        Ok(inner.start(attempt, false))
    }

    /// Move through the history by `delta` entries.
    ///
    /// The history reports the move back to the router, which navigates to the new entry. The
    /// returned future drives that navigation.
    pub fn go(&self, delta: isize) -> PendingNavigation {
        let inner = &self.inner;
        if inner.disposed.get() {
            return PendingNavigation::ready();
        }
        inner.listen_history();
        inner.history.go(delta);

        let mut pops = Vec::new();
        if let Some(rx) = inner.pop_rx.borrow_mut().as_mut() {
            while let Ok(pending) = rx.try_recv() {
                pops.push(pending);
            }
        }
        trace!(delta, pops = pops.len(), "moved through the history");
        PendingNavigation::new(async move {
            for pending in pops {
                pending.await;
            }
        })
    }

    /// Drive the navigations started by history changes the router didn't make itself, like the
    /// browser's back button.
    ///
    /// Resolves once the router is disposed. Only the first call gets to drive them, later calls
    /// resolve right away.
    pub async fn run(&self) {
        let Some(mut rx) = self.inner.pop_rx.borrow_mut().take() else {
            return;
        };
        while let Some(pending) = rx.next().await {
            pending.await;
        }
    }

    /// Rerun the loaders of the current location.
    ///
    /// A navigation in flight is restarted so it loads everything, or, while it is submitting,
    /// loads everything once the action settled.
    pub fn revalidate(&self) -> PendingNavigation {
        let inner = &self.inner;
        if inner.disposed.get() {
            return PendingNavigation::ready();
        }
        inner.update(|state| state.revalidation = RevalidationState::Loading);

        let active = inner.active.borrow().clone();
        match active {
            Some(active) if active.phase == Phase::Submitting => {
                inner.revalidation_required.set(true);
                PendingNavigation::ready()
            }
            Some(active) => {
                inner.revalidation_required.set(true);
                inner.restart(active)
            }
            None => inner.start(Attempt::revalidation(&inner.state()), true),
        }
    }

    /// Call `subscriber` with every new state.
    pub fn subscribe(&self, subscriber: impl Fn(&RouterState) + 'static) -> Unsubscribe {
        let inner = &self.inner;
        let id = inner.next_subscriber.get();
        inner.next_subscriber.set(id + 1);
        inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(subscriber)));
        Unsubscribe {
            inner: Rc::downgrade(inner),
            id,
        }
    }

    /// The current state.
    pub fn state(&self) -> Rc<RouterState> {
        self.inner.state()
    }

    /// The href of `to` in the history, e.g. with a leading `#` for a hash history.
    pub fn create_href(&self, to: &To) -> String {
        self.inner.history.create_href(to)
    }

    /// The registered routes, including any patched in.
    pub fn routes(&self) -> Rc<RouteTree> {
        self.inner.tree()
    }

    /// The basename the router is mounted at.
    pub fn basename(&self) -> Option<&str> {
        self.inner.basename.as_deref()
    }

    /// The history the router navigates.
    pub fn history(&self) -> Rc<dyn History> {
        self.inner.history.clone()
    }

    /// The one-time warnings the router emitted.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Stop the router.
    ///
    /// Work in flight is abandoned, subscribers are dropped and the history isn't listened to
    /// anymore. Every later operation is a no-op or fails with [`RouterError::Disposed`].
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }
        debug!("disposing router");
        inner.pop_tx.borrow_mut().take();
        if let Some(listener) = inner.listener.take() {
            inner.history.unlisten(listener);
        }
        inner.subscribers.borrow_mut().clear();
        inner.navigation_id.set(inner.navigation_id.get() + 1);
        inner.active.borrow_mut().take();
        inner.restarts.borrow_mut().clear();
        inner.fetch_tokens.borrow_mut().clear();
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("basename", &self.inner.basename)
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

/// Returned by [`Router::subscribe`].
#[derive(Debug)]
pub struct Unsubscribe {
    inner: Weak<RouterInner>,
    id: usize,
}

impl Unsubscribe {
    /// Stop calling the subscriber.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

fn initial_state(
    tree: &RouteTree,
    history: &dyn History,
    basename: Option<&str>,
    hydration: Option<HydrationState>,
    can_patch: bool,
    diagnostics: &Diagnostics,
) -> RouterState {
    let location = history.location();
    let matches = match_routes(tree, &location.pathname, basename);

    let (loader_data, action_data, errors) = match &hydration {
        Some(hydration) => (
            hydration.loader_data.clone(),
            hydration.action_data.clone(),
            hydration.revive_errors(),
        ),
        None => (BTreeMap::new(), None, None),
    };

    if let (Some(hydrated), Some(matches)) = (
        hydration.as_ref().and_then(|h| h.matches.as_ref()),
        matches.as_ref(),
    ) {
        let route_ids: Vec<&str> = matches.iter().map(RouteMatch::route_id).collect();
        if hydrated.iter().map(String::as_str).ne(route_ids.iter().copied()) {
            diagnostics.warn_once(
                "hydration-matches",
                format!(
                    "The hydrated routes {hydrated:?} don't match the routes {route_ids:?} of \
                     \"{}\"",
                    location.pathname
                ),
            );
        }
    }

    let initialized = match &matches {
        None => {
            if !can_patch {
                diagnostics.warn_once(
                    &format!("no-match:{}", location.pathname),
                    format!("No routes matched location \"{}\"", location.pathname),
                );
            }
            !can_patch
        }
        Some(matches) if matches.iter().any(|m| m.route.is_lazy_pending()) => false,
        Some(matches) if !matches.iter().any(|m| m.route.has_loader()) => true,
        Some(matches) => {
            hydration.is_some() && is_hydrated(matches, &loader_data, errors.as_ref())
        }
    };

    let matches = trim_matches(matches.unwrap_or_default(), errors.as_ref());
    RouterState {
        history_action: history.action(),
        location,
        matches,
        initialized,
        navigation: Navigation::Idle,
        revalidation: RevalidationState::Idle,
        loader_data,
        action_data,
        errors,
        fetchers: BTreeMap::new(),
        prevent_scroll_reset: false,
    }
}

/// Whether every loader that has to run before the first error (or at all, without errors) has
/// its data or error already.
fn is_hydrated(
    matches: &[RouteMatch],
    loader_data: &BTreeMap<String, Value>,
    errors: Option<&BTreeMap<String, RouterError>>,
) -> bool {
    let relevant = match errors {
        Some(errors) => match matches.iter().position(|m| errors.contains_key(&m.route.id)) {
            Some(idx) => &matches[..=idx],
            None => &matches[..0],
        },
        None => matches,
    };
    relevant.iter().all(|m| {
        !m.route.has_loader()
            || loader_data.contains_key(&m.route.id)
            || errors.is_some_and(|errors| errors.contains_key(&m.route.id))
    })
}
