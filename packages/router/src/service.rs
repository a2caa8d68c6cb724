use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, error, trace, warn};
use waymark_history::{
    create_location, create_path, Action, History, HistoryUpdate, ListenerId, Location,
    PartialPath, Path, To,
};

use crate::{
    find_nearest_boundary, get_path_contributing_matches, get_resolve_to_matches, join_paths,
    match_routes,
    matcher::{has_naked_index_query, RoutePatch},
    resolve_to, strip_basename, DataArgs, DataCall, DataOutcome, DataRequest, DataResult,
    DataStrategy, Diagnostics, ErrorResponse, FetcherState, FormData, FormMethod, FutureConfig,
    Navigation, PatchArgs, PatchRoutesFn, PendingNavigation, Redirect, RelativeRoutingType,
    RevalidationState, RouteMatch, RouteTree, RouterError, RouterState, ShouldRevalidateArgs,
    Submission,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AttemptKind {
    /// Moves to a new location and writes history.
    Navigation,
    /// Reruns loaders in place.
    Revalidation,
}

/// One try at reaching a location. Redirects produce a new attempt.
#[derive(Clone, Debug)]
pub(crate) struct Attempt {
    pub(crate) location: Location,
    pub(crate) action: Action,
    pub(crate) submission: Option<Submission>,
    pub(crate) kind: AttemptKind,
    pub(crate) redirects: usize,
    pub(crate) prevent_scroll_reset: bool,
    pub(crate) replace_requested: bool,
    pub(crate) patched: bool,
}

impl Attempt {
    pub(crate) fn navigation(location: Location, action: Action) -> Self {
        Self {
            location,
            action,
            submission: None,
            kind: AttemptKind::Navigation,
            redirects: 0,
            prevent_scroll_reset: false,
            replace_requested: action == Action::Replace,
            patched: false,
        }
    }

    pub(crate) fn revalidation(state: &RouterState) -> Self {
        Self {
            kind: AttemptKind::Revalidation,
            ..Self::navigation(state.location.clone(), state.history_action)
        }
    }

    fn mutation(&self) -> Option<&Submission> {
        self.submission
            .as_ref()
            .filter(|submission| submission.form_method.is_mutation())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Loading,
    Submitting,
}

#[derive(Clone, Debug)]
pub(crate) struct ActiveNavigation {
    pub(crate) attempt: Attempt,
    pub(crate) phase: Phase,
}

/// How the action of a submission settled.
pub(crate) enum ActionOutcome {
    Data {
        route_id: String,
        data: Value,
    },
    Error {
        boundary_id: String,
        error: RouterError,
    },
}

impl ActionOutcome {
    fn status(&self) -> Option<u16> {
        match self {
            ActionOutcome::Data { .. } => None,
            ActionOutcome::Error { error, .. } => error.status(),
        }
    }
}

/// Everything a commit replaces, besides the location.
#[derive(Default)]
pub(crate) struct Outcome {
    pub(crate) matches: Vec<RouteMatch>,
    pub(crate) loader_data: BTreeMap<String, Value>,
    pub(crate) action_data: Option<BTreeMap<String, Value>>,
    pub(crate) errors: Option<BTreeMap<String, RouterError>>,
}

type Subscriber = Rc<dyn Fn(&RouterState)>;

/// The shared core of a [`Router`](crate::Router).
///
/// Navigations, fetchers and revalidations run as futures that hold on to this. Every future
/// compares its navigation id (or, for fetchers, its per-key token) with the current one after
/// each await, and quietly ends when it has been superseded. A navigation superseded by its own
/// restart waits for the restarted one instead.
pub(crate) struct RouterInner {
    pub(crate) history: Rc<dyn History>,
    pub(crate) tree: RefCell<Rc<RouteTree>>,
    pub(crate) basename: Option<String>,
    pub(crate) future: FutureConfig,
    pub(crate) strategy: Rc<dyn DataStrategy>,
    pub(crate) patch_routes: Option<PatchRoutesFn>,
    pub(crate) max_redirects: usize,
    pub(crate) diagnostics: Rc<Diagnostics>,
    pub(crate) state: RefCell<Rc<RouterState>>,
    pub(crate) subscribers: RefCell<Vec<(usize, Subscriber)>>,
    pub(crate) next_subscriber: Cell<usize>,
    pub(crate) navigation_id: Cell<u64>,
    pub(crate) active: RefCell<Option<ActiveNavigation>>,
    pub(crate) revalidation_required: Cell<bool>,
    /// Restarted navigations, keyed by the id they superseded.
    pub(crate) restarts: RefCell<FxHashMap<u64, Shared<PendingNavigation>>>,
    pub(crate) fetch_tokens: RefCell<FxHashMap<String, u64>>,
    pub(crate) next_fetch_token: Cell<u64>,
    pub(crate) pop_tx: RefCell<Option<UnboundedSender<PendingNavigation>>>,
    pub(crate) pop_rx: RefCell<Option<UnboundedReceiver<PendingNavigation>>>,
    pub(crate) listener: Cell<Option<ListenerId>>,
    pub(crate) disposed: Cell<bool>,
}

impl RouterInner {
    pub(crate) fn state(&self) -> Rc<RouterState> {
        self.state.borrow().clone()
    }

    pub(crate) fn tree(&self) -> Rc<RouteTree> {
        self.tree.borrow().clone()
    }

    pub(crate) fn ensure_live(&self) -> Result<(), RouterError> {
        if self.disposed.get() {
            Err(RouterError::Disposed)
        } else {
            Ok(())
        }
    }

    fn is_current(&self, id: u64) -> bool {
        !self.disposed.get() && self.navigation_id.get() == id
    }

    fn next_navigation_id(&self) -> u64 {
        let id = self.navigation_id.get() + 1;
        self.navigation_id.set(id);
        id
    }

    pub(crate) fn is_fetch_current(&self, key: &str, token: u64) -> bool {
        !self.disposed.get() && self.fetch_tokens.borrow().get(key) == Some(&token)
    }

    pub(crate) fn next_fetch_token(&self, key: &str) -> u64 {
        let token = self.next_fetch_token.get() + 1;
        self.next_fetch_token.set(token);
        self.fetch_tokens.borrow_mut().insert(key.to_string(), token);
        token
    }

    /// Replace the state through `f` and tell the subscribers.
    pub(crate) fn update(&self, f: impl FnOnce(&mut RouterState)) {
        let mut next = RouterState::clone(&self.state());
        f(&mut next);
        *self.state.borrow_mut() = Rc::new(next);
        self.notify();
    }

    fn notify(&self) {
        // subscribers may subscribe, unsubscribe or read the state
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        let state = self.state();
        for subscriber in subscribers {
            subscriber(&state);
        }
    }

    pub(crate) fn listen_history(self: &Rc<Self>) {
        if self.listener.get().is_some() || self.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(self);
        let id = self.history.listen(Rc::new(move |update: &HistoryUpdate| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // pushes and replaces are written by the router itself
            if update.action != Action::Pop {
                return;
            }
            debug!(location = %update.location.href(), delta = ?update.delta, "history pop");
            let pending = inner.start(Attempt::navigation(update.location.clone(), Action::Pop), false);
            let tx = inner.pop_tx.borrow();
            if let Some(tx) = tx.as_ref() {
                let _ = tx.unbounded_send(pending);
            }
        }));
        self.listener.set(Some(id));
    }

    /// Start `attempt` under a fresh navigation id, superseding whatever was in flight.
    pub(crate) fn start(self: &Rc<Self>, attempt: Attempt, revalidate_all: bool) -> PendingNavigation {
        let id = self.next_navigation_id();
        debug!(
            id,
            action = %attempt.action,
            location = %attempt.location.href(),
            kind = ?attempt.kind,
            "starting navigation"
        );
        match self.begin(id, attempt, revalidate_all) {
            Some(rest) => PendingNavigation::new(rest),
            None => PendingNavigation::ready(),
        }
    }

    /// Restart an in-flight navigation so it reruns every loader.
    ///
    /// The future of the restarted navigation is shared with the one it replaced, so awaiting
    /// either of them drives it to its commit.
    pub(crate) fn restart(self: &Rc<Self>, active: ActiveNavigation) -> PendingNavigation {
        let superseded = self.navigation_id.get();
        let mut attempt = active.attempt;
        // the action already ran
        if attempt.mutation().is_some() {
            attempt.submission = None;
        }
        let restarted = self.start(attempt, true).shared();
        self.restarts
            .borrow_mut()
            .insert(superseded, restarted.clone());
        PendingNavigation::new(restarted)
    }

    /// Wait for the navigation that restarted `id`, if there is one.
    async fn follow_restart(&self, id: u64) {
        let restarted = self.restarts.borrow_mut().remove(&id);
        if let Some(restarted) = restarted {
            trace!(id, "following the restarted navigation");
            restarted.await;
        }
    }

    fn begin(
        self: &Rc<Self>,
        id: u64,
        attempt: Attempt,
        revalidate_all: bool,
    ) -> Option<LocalBoxFuture<'static, ()>> {
        if attempt.kind == AttemptKind::Navigation {
            *self.active.borrow_mut() = Some(ActiveNavigation {
                attempt: attempt.clone(),
                phase: Phase::Loading,
            });
        }
        self.step(id, attempt, revalidate_all)
    }

    /// Run the synchronous part of an attempt and return the rest, if there is any.
    fn step(
        self: &Rc<Self>,
        id: u64,
        attempt: Attempt,
        revalidate_all: bool,
    ) -> Option<LocalBoxFuture<'static, ()>> {
        let tree = self.tree();
        let Some(matches) =
            match_routes(&tree, &attempt.location.pathname, self.basename.as_deref())
        else {
            return self.no_match(id, attempt, revalidate_all);
        };
        let state = self.state();

        if attempt.kind == AttemptKind::Navigation
            && state.initialized
            && !revalidate_all
            && !self.revalidation_required.get()
            && attempt.mutation().is_none()
            && is_hash_change_only(&state.location, &attempt.location)
        {
            trace!(id, "only the hash changed");
            let outcome = Outcome {
                matches,
                loader_data: state.loader_data.clone(),
                action_data: None,
                errors: state.errors.clone(),
            };
            self.commit(id, &attempt, outcome);
            return None;
        }

        if let Some(submission) = attempt.mutation().cloned() {
            self.publish_navigation(
                &attempt,
                Phase::Submitting,
                Navigation::Submitting {
                    location: attempt.location.clone(),
                    submission: submission.clone(),
                },
            );
            let inner = self.clone();
            return Some(
                async move {
                    inner.submit(id, attempt, matches, submission).await
                }
                .boxed_local(),
            );
        }

        self.load(id, attempt, matches, revalidate_all, None)
    }

    fn no_match(
        self: &Rc<Self>,
        id: u64,
        mut attempt: Attempt,
        revalidate_all: bool,
    ) -> Option<LocalBoxFuture<'static, ()>> {
        let pathname = attempt.location.pathname.clone();

        if let Some(patch) = self.patch_routes.clone().filter(|_| !attempt.patched) {
            attempt.patched = true;
            self.publish_navigation(
                &attempt,
                Phase::Loading,
                Navigation::Loading {
                    location: attempt.location.clone(),
                    submission: attempt.submission.clone(),
                },
            );
            let inner = self.clone();
            return Some(
                async move {
                    inner.discover_routes(&patch, &pathname).await;
                    if !inner.is_current(id) {
                        return inner.follow_restart(id).await;
                    }
                    if let Some(rest) = inner.step(id, attempt, revalidate_all) {
                        rest.await;
                    }
                }
                .boxed_local(),
            );
        }

        self.diagnostics.warn_once(
            &format!("no-match:{pathname}"),
            format!("No routes matched location \"{pathname}\""),
        );
        self.commit(id, &attempt, Outcome::default());
        None
    }

    async fn discover_routes(&self, patch: &PatchRoutesFn, pathname: &str) {
        let patches = match patch(PatchArgs {
            path: pathname.to_string(),
        })
        .await
        {
            Ok(patches) => patches,
            Err(err) => {
                error!(%err, pathname, "route discovery failed");
                return;
            }
        };

        let mut tree = self.tree();
        for RoutePatch {
            parent_id,
            children,
        } in patches
        {
            match tree.patch(parent_id.as_deref(), children, &self.diagnostics) {
                Ok(patched) => tree = Rc::new(patched),
                Err(err) => error!(%err, ?parent_id, "could not apply a route patch"),
            }
        }
        *self.tree.borrow_mut() = tree;
    }

    async fn submit(
        self: &Rc<Self>,
        id: u64,
        mut attempt: Attempt,
        matches: Vec<RouteMatch>,
        submission: Submission,
    ) {
        let Some(target) = action_target(&matches, &attempt.location.search).cloned() else {
            return;
        };
        let route_id = target.route.id.clone();
        debug!(id, route = %route_id, method = %submission.form_method, "running action");

        let request = DataRequest {
            path: attempt.location.path(),
            method: submission.form_method,
            form_data: Some(submission.form_data.clone()),
        };
        let results = self
            .strategy
            .run(vec![self.action_call(&target, request)])
            .await;
        if !self.is_current(id) {
            trace!(id, route = %route_id, "discarding a superseded action result");
            return self.follow_restart(id).await;
        }
        let Some((_, result)) = results.into_iter().next() else {
            return;
        };

        let outcome = match result {
            Ok(DataOutcome::Redirect(redirect)) => {
                return self
                    .redirect(id, attempt, &matches, &route_id, redirect)
                    .await;
            }
            Ok(DataOutcome::Data(data)) => ActionOutcome::Data {
                route_id: route_id.clone(),
                data,
            },
            Err(source) => {
                error!(route = %route_id, %source, "action failed");
                let boundary_id = boundary_id(&matches, &route_id);
                // let the user go back to the form
                if !attempt.replace_requested {
                    attempt.action = Action::Push;
                }
                ActionOutcome::Error {
                    boundary_id,
                    error: RouterError::Action { route_id, source },
                }
            }
        };

        // loaders revalidate after any action
        if let Some(rest) = self.load(id, attempt, matches, true, Some(outcome)) {
            rest.await;
        }
    }

    /// Decide which loaders run, and run them. Commits right away when nothing needs to load.
    fn load(
        self: &Rc<Self>,
        id: u64,
        attempt: Attempt,
        matches: Vec<RouteMatch>,
        revalidate_all: bool,
        action: Option<ActionOutcome>,
    ) -> Option<LocalBoxFuture<'static, ()>> {
        let state = self.state();
        let revalidate_all = revalidate_all
            || self.revalidation_required.get()
            || attempt.kind == AttemptKind::Revalidation;
        let to_load =
            self.matches_to_load(&state, &attempt, &matches, revalidate_all, action.as_ref());
        trace!(
            id,
            routes = ?to_load.iter().map(RouteMatch::route_id).collect::<Vec<_>>(),
            "loaders to run"
        );

        if to_load.is_empty() {
            let outcome = self.settle(&state, matches, BTreeMap::new(), action);
            self.commit(id, &attempt, outcome);
            return None;
        }

        self.publish_navigation(
            &attempt,
            Phase::Loading,
            Navigation::Loading {
                location: attempt.location.clone(),
                submission: attempt.submission.clone(),
            },
        );

        let request = DataRequest {
            path: attempt.location.path(),
            method: FormMethod::Get,
            form_data: None,
        };
        let calls = to_load
            .iter()
            .map(|m| self.loader_call(m, request.clone()))
            .collect();
        let run = self.strategy.run(calls);
        let inner = self.clone();

        Some(
            async move {
                let results = run.await;
                if !inner.is_current(id) {
                    trace!(id, "discarding superseded loader results");
                    return inner.follow_restart(id).await;
                }

                let (loaded, redirect) = split_redirect(results);
                if let Some((route_id, redirect)) = redirect {
                    return inner
                        .redirect(id, attempt, &matches, &route_id, redirect)
                        .await;
                }

                let state = inner.state();
                let outcome = inner.settle(&state, matches, loaded, action);
                inner.commit(id, &attempt, outcome);
            }
            .boxed_local(),
        )
    }

    pub(crate) fn matches_to_load(
        &self,
        state: &RouterState,
        attempt: &Attempt,
        matches: &[RouteMatch],
        revalidate_all: bool,
        action: Option<&ActionOutcome>,
    ) -> Vec<RouteMatch> {
        let action_status = action.and_then(ActionOutcome::status);
        let skip_revalidation = self.future.skip_action_error_revalidation
            && action_status.is_some_and(|status| status >= 400);

        // nothing at or below a failed action's boundary loads, and on the initial load nothing
        // below the boundary of a hydrated error
        let boundary = match (action, state.initialized, &state.errors) {
            (Some(ActionOutcome::Error { boundary_id, .. }), _, _) => {
                matches.iter().position(|m| m.route.id == *boundary_id)
            }
            (_, false, Some(errors)) => matches
                .iter()
                .position(|m| errors.contains_key(&m.route.id))
                .map(|idx| idx + 1),
            _ => None,
        };
        let candidates = &matches[..boundary.unwrap_or(matches.len())];

        let current_url = state.location.path();
        let next_url = attempt.location.path();
        let action_result = match action {
            Some(ActionOutcome::Data { data, .. }) => Some(data.clone()),
            _ => None,
        };

        candidates
            .iter()
            .enumerate()
            .filter(|(idx, m)| {
                let route = &m.route;
                if route.is_lazy_pending() {
                    return true;
                }
                if !route.has_loader() {
                    return false;
                }
                if !state.initialized {
                    let has_error = state
                        .errors
                        .as_ref()
                        .is_some_and(|errors| errors.contains_key(&route.id));
                    return !state.loader_data.contains_key(&route.id) && !has_error;
                }

                let Some(current) = state
                    .matches
                    .get(*idx)
                    .filter(|current| current.route.id == route.id)
                else {
                    return true;
                };
                if !state.loader_data.contains_key(&route.id) {
                    return true;
                }

                let default_should_revalidate = !skip_revalidation
                    && (revalidate_all
                        || (current_url.pathname == next_url.pathname
                            && current_url.search == next_url.search)
                        || current_url.search != next_url.search
                        || is_new_route_instance(current, m));

                match route.should_revalidate() {
                    Some(should_revalidate) => should_revalidate(&ShouldRevalidateArgs {
                        current_url: current_url.clone(),
                        current_params: current.params.clone(),
                        next_url: next_url.clone(),
                        next_params: m.params.clone(),
                        form_method: attempt.submission.as_ref().map(|s| s.form_method),
                        form_action: attempt.submission.as_ref().map(|s| s.form_action.clone()),
                        form_data: attempt.submission.as_ref().map(|s| s.form_data.clone()),
                        action_status,
                        action_result: action_result.clone(),
                        default_should_revalidate,
                    }),
                    None => default_should_revalidate,
                }
            })
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Turn settled loader results into what gets committed.
    pub(crate) fn settle(
        &self,
        state: &RouterState,
        matches: Vec<RouteMatch>,
        mut loaded: BTreeMap<String, DataResult>,
        action: Option<ActionOutcome>,
    ) -> Outcome {
        let mut errors = BTreeMap::new();
        let mut action_data = None;

        // hydrated errors of routes that didn't load again stay
        if !state.initialized {
            if let Some(hydrated) = &state.errors {
                for m in &matches {
                    if let Some(error) = hydrated.get(&m.route.id) {
                        errors.insert(m.route.id.clone(), error.clone());
                    }
                }
            }
        }

        match action {
            Some(ActionOutcome::Data { route_id, data }) => {
                action_data = Some(BTreeMap::from([(route_id, data)]));
            }
            Some(ActionOutcome::Error { boundary_id, error }) => {
                errors.insert(boundary_id, error);
            }
            None => {}
        }

        let mut new_data: BTreeMap<String, Option<Value>> = BTreeMap::new();
        for m in &matches {
            let route_id = &m.route.id;
            let Some(result) = loaded.remove(route_id) else {
                continue;
            };
            match result {
                Ok(DataOutcome::Data(data)) => {
                    new_data.insert(route_id.clone(), Some(data));
                }
                Ok(DataOutcome::Redirect(_)) => {}
                Err(source) => {
                    error!(route = %route_id, %source, "loader failed");
                    errors
                        .entry(boundary_id(&matches, route_id))
                        .or_insert_with(|| RouterError::Loader {
                            route_id: route_id.clone(),
                            source,
                        });
                    new_data.insert(route_id.clone(), None);
                }
            }
        }

        let errors = (!errors.is_empty()).then_some(errors);
        let matches = trim_matches(matches, errors.as_ref());
        let loader_data = merge_loader_data(&state.loader_data, &new_data, &matches, errors.as_ref());

        Outcome {
            matches,
            loader_data,
            action_data,
            errors,
        }
    }

    async fn redirect(
        self: &Rc<Self>,
        id: u64,
        attempt: Attempt,
        matches: &[RouteMatch],
        route_id: &str,
        redirect: Redirect,
    ) {
        let location = self.normalize_redirect(&attempt.location.path(), matches, route_id, &redirect.location);
        let redirects = attempt.redirects + 1;

        if redirects > self.max_redirects {
            warn!(limit = self.max_redirects, %location, "too many redirects");
            let state = self.state();
            let errors = BTreeMap::from([(
                boundary_id(matches, matches.last().map_or(route_id, RouteMatch::route_id)),
                RouterError::RedirectLoop {
                    limit: self.max_redirects,
                    location,
                },
            )]);
            let matches = trim_matches(matches.to_vec(), Some(&errors));
            let loader_data =
                merge_loader_data(&state.loader_data, &BTreeMap::new(), &matches, Some(&errors));
            let outcome = Outcome {
                matches,
                loader_data,
                action_data: None,
                errors: Some(errors),
            };
            self.commit(id, &attempt, outcome);
            return;
        }

        let action = if redirect.replace || matches!(attempt.action, Action::Replace | Action::Pop)
        {
            Action::Replace
        } else {
            Action::Push
        };
        // 307 and 308 repeat the submission at the new location
        let submission = attempt
            .mutation()
            .filter(|_| matches!(redirect.status, 307 | 308))
            .map(|submission| Submission {
                form_action: strip_hash(&location),
                ..submission.clone()
            });
        let revalidate_all = attempt.mutation().is_some();

        let next = Attempt {
            location: create_location(&attempt.location.pathname, &To::Str(location), None, None),
            action,
            submission,
            kind: AttemptKind::Navigation,
            redirects,
            prevent_scroll_reset: attempt.prevent_scroll_reset,
            replace_requested: action == Action::Replace,
            patched: false,
        };
        let next_id = self.next_navigation_id();
        debug!(
            from = id,
            id = next_id,
            location = %next.location.href(),
            status = redirect.status,
            "following redirect"
        );
        if let Some(rest) = self.begin(next_id, next, revalidate_all) {
            rest.await;
        }
    }

    /// Resolve a redirect location against the route that redirected, including the basename.
    pub(crate) fn normalize_redirect(
        &self,
        from: &Path,
        matches: &[RouteMatch],
        route_id: &str,
        location: &str,
    ) -> String {
        let location = strip_origin(location);
        let end = matches
            .iter()
            .position(|m| m.route.id == route_id)
            .map_or(matches.len(), |idx| idx + 1);
        let current = strip_basename(&from.pathname, self.basename.as_deref())
            .unwrap_or_else(|| from.pathname.clone());
        let route_pathnames = get_resolve_to_matches(&matches[..end], self.future.relative_splat_path);

        match resolve_to(&To::Str(location.clone()), &route_pathnames, &current, false) {
            Ok(path) => create_path(&PartialPath::from(self.prepend_basename(path))),
            Err(err) => {
                warn!(%err, %location, "could not resolve the redirect location");
                location
            }
        }
    }

    fn prepend_basename(&self, mut path: Path) -> Path {
        if let Some(basename) = &self.basename {
            path.pathname = if path.pathname == "/" {
                basename.clone()
            } else {
                join_paths(&[basename, &path.pathname])
            };
        }
        path
    }

    /// Resolve a navigation or fetch target against the committed matches.
    pub(crate) fn normalize_to(
        &self,
        state: &RouterState,
        to: &To,
        from_route_id: Option<&str>,
        relative: RelativeRoutingType,
    ) -> Result<Path, RouterError> {
        let (contextual, active) = match from_route_id {
            Some(route_id) => match state.matches.iter().position(|m| m.route.id == route_id) {
                Some(idx) => (&state.matches[..=idx], state.matches.get(idx)),
                None => (&state.matches[..], None),
            },
            None => (&state.matches[..], state.matches.last()),
        };

        let dot = To::Str(String::from("."));
        let targets_current = to.is_empty_str() || matches!(to, To::Str(s) if s == ".");
        let target = if to.is_empty_str() { &dot } else { to };

        let current = strip_basename(&state.location.pathname, self.basename.as_deref())
            .unwrap_or_else(|| state.location.pathname.clone());
        let mut path = resolve_to(
            target,
            &get_resolve_to_matches(contextual, self.future.relative_splat_path),
            &current,
            relative == RelativeRoutingType::Path,
        )?;

        // `?index` tells an index route apart from its parent at the same URL
        if let Some(active) = active.filter(|_| targets_current) {
            let naked_index = has_naked_index_query(&path.search);
            if active.route.index && !naked_index {
                path.search = match path.search.strip_prefix('?') {
                    Some(rest) if !rest.is_empty() => format!("?index&{rest}"),
                    _ => String::from("?index"),
                };
            } else if !active.route.index && naked_index {
                path.search = without_naked_index(&path.search);
            }
        }

        Ok(self.prepend_basename(path))
    }

    pub(crate) fn loader_call(&self, m: &RouteMatch, request: DataRequest) -> DataCall {
        let route = m.route.clone();
        let diagnostics = self.diagnostics.clone();
        let args = DataArgs {
            request,
            params: m.params.clone(),
        };
        DataCall {
            route_id: route.id.clone(),
            future: async move {
                route.resolve_lazy(&diagnostics).await;
                match route.loader() {
                    Some(loader) => loader(args).await,
                    None => Ok(DataOutcome::Data(Value::Null)),
                }
            }
            .boxed_local(),
        }
    }

    pub(crate) fn action_call(&self, m: &RouteMatch, request: DataRequest) -> DataCall {
        let route = m.route.clone();
        let diagnostics = self.diagnostics.clone();
        let args = DataArgs {
            request,
            params: m.params.clone(),
        };
        DataCall {
            route_id: route.id.clone(),
            future: async move {
                route.resolve_lazy(&diagnostics).await;
                match route.action() {
                    Some(action) => action(args).await,
                    None => Err(ErrorResponse::method_not_allowed(
                        args.request.method,
                        &args.request.path.pathname,
                        &route.id,
                    )
                    .into()),
                }
            }
            .boxed_local(),
        }
    }

    fn publish_navigation(&self, attempt: &Attempt, phase: Phase, navigation: Navigation) {
        if attempt.kind != AttemptKind::Navigation {
            return;
        }
        *self.active.borrow_mut() = Some(ActiveNavigation {
            attempt: attempt.clone(),
            phase,
        });
        self.update(|state| state.navigation = navigation);
    }

    /// Atomically replace the state with the outcome of `attempt`, write history and notify.
    fn commit(&self, id: u64, attempt: &Attempt, outcome: Outcome) {
        if !self.is_current(id) {
            return;
        }
        let previous = self.state();
        let Outcome {
            matches,
            loader_data,
            action_data,
            errors,
        } = outcome;
        debug!(
            id,
            action = %attempt.action,
            location = %attempt.location.href(),
            routes = ?matches.iter().map(RouteMatch::route_id).collect::<Vec<_>>(),
            errors = errors.as_ref().map_or(0, BTreeMap::len),
            "committing navigation"
        );

        let next = RouterState {
            history_action: attempt.action,
            location: attempt.location.clone(),
            matches,
            initialized: true,
            navigation: Navigation::Idle,
            revalidation: RevalidationState::Idle,
            loader_data,
            action_data,
            errors,
            fetchers: previous.fetchers.clone(),
            prevent_scroll_reset: attempt.prevent_scroll_reset,
        };
        self.active.borrow_mut().take();
        self.restarts.borrow_mut().clear();
        self.revalidation_required.set(false);
        *self.state.borrow_mut() = Rc::new(next);

        if attempt.kind == AttemptKind::Navigation {
            let to = To::Location(attempt.location.clone());
            match attempt.action {
                Action::Push => self.history.push(&to, attempt.location.state.clone()),
                Action::Replace => self.history.replace(&to, attempt.location.state.clone()),
                Action::Pop => {}
            }
        }

        self.notify();
    }

    pub(crate) fn set_fetcher(&self, key: &str, fetcher: FetcherState) {
        self.update(|state| {
            state.fetchers.insert(key.to_string(), fetcher);
        });
    }

    /// Drop the fetcher `key` and show `error` at the boundary of `route_id`.
    pub(crate) fn set_fetcher_error(&self, key: &str, route_id: &str, error: RouterError) {
        error!(key, route = route_id, %error, "fetcher failed");
        self.fetch_tokens.borrow_mut().remove(key);
        let boundary = boundary_id(&self.state().matches, route_id);
        self.update(|state| {
            state.fetchers.remove(key);
            state
                .errors
                .get_or_insert_with(BTreeMap::new)
                .insert(boundary, error);
        });
    }

    /// Rerun the active loaders after a fetcher action, outside of any navigation.
    pub(crate) async fn revalidate_after_fetch(
        self: &Rc<Self>,
        submission: &Submission,
        route_id: &str,
        data: &Value,
    ) {
        let navigation_id = self.navigation_id.get();
        let state = self.state();
        let attempt = Attempt {
            submission: Some(submission.clone()),
            ..Attempt::revalidation(&state)
        };
        let action = ActionOutcome::Data {
            route_id: route_id.to_string(),
            data: data.clone(),
        };
        let to_load = self.matches_to_load(&state, &attempt, &state.matches, true, Some(&action));
        if to_load.is_empty() {
            return;
        }

        let request = DataRequest {
            path: state.location.path(),
            method: FormMethod::Get,
            form_data: None,
        };
        let calls = to_load
            .iter()
            .map(|m| self.loader_call(m, request.clone()))
            .collect();
        let results = self.strategy.run(calls).await;

        // a navigation started meanwhile and loads for itself
        if self.disposed.get() || self.navigation_id.get() != navigation_id {
            trace!("discarding loader results of a fetcher revalidation");
            return;
        }

        let (loaded, redirect) = split_redirect(results);
        if let Some((route_id, redirect)) = redirect {
            let location =
                self.normalize_redirect(&state.location.path(), &state.matches, &route_id, &redirect.location);
            let action = if redirect.replace {
                Action::Replace
            } else {
                Action::Push
            };
            let attempt = Attempt::navigation(
                create_location(&state.location.pathname, &To::Str(location), None, None),
                action,
            );
            return self.start(attempt, true).await;
        }

        let current = self.state();
        let outcome = self.settle(&current, state.matches.clone(), loaded, None);
        self.update(|state| {
            state.matches = outcome.matches;
            state.loader_data = outcome.loader_data;
            state.errors = outcome.errors;
        });
    }
}

/// The route a submission to `matches` goes to.
///
/// That is the deepest match that contributes to the URL, unless the deepest match is an index
/// route and the search carries a bare `index` param.
pub(crate) fn action_target<'a>(matches: &'a [RouteMatch], search: &str) -> Option<&'a RouteMatch> {
    if let Some(last) = matches.last() {
        if last.route.index && has_naked_index_query(search) {
            return Some(last);
        }
    }
    get_path_contributing_matches(matches).last().copied()
}

/// The id of the route catching errors of `route_id`.
fn boundary_id(matches: &[RouteMatch], route_id: &str) -> String {
    find_nearest_boundary(matches, Some(route_id))
        .map_or_else(|| route_id.to_string(), |m| m.route.id.clone())
}

/// Drop every match below the shallowest route that caught an error.
pub(crate) fn trim_matches(
    mut matches: Vec<RouteMatch>,
    errors: Option<&BTreeMap<String, RouterError>>,
) -> Vec<RouteMatch> {
    if let Some(errors) = errors {
        if let Some(idx) = matches.iter().position(|m| errors.contains_key(&m.route.id)) {
            matches.truncate(idx + 1);
        }
    }
    matches
}

/// Keep the data of unchanged routes, take the new data of reloaded ones, drop the rest.
fn merge_loader_data(
    previous: &BTreeMap<String, Value>,
    loaded: &BTreeMap<String, Option<Value>>,
    matches: &[RouteMatch],
    errors: Option<&BTreeMap<String, RouterError>>,
) -> BTreeMap<String, Value> {
    let mut merged = BTreeMap::new();
    for m in matches {
        let route_id = &m.route.id;
        match loaded.get(route_id) {
            Some(Some(data)) => {
                merged.insert(route_id.clone(), data.clone());
            }
            Some(None) => {}
            None => {
                if let Some(data) = previous.get(route_id).filter(|_| m.route.has_loader()) {
                    merged.insert(route_id.clone(), data.clone());
                }
            }
        }
        if errors.is_some_and(|errors| errors.contains_key(route_id)) {
            break;
        }
    }
    merged
}

type SplitResults = (BTreeMap<String, DataResult>, Option<(String, Redirect)>);

/// Separate the first redirect from the other results.
fn split_redirect(results: Vec<(String, DataResult)>) -> SplitResults {
    let mut loaded = BTreeMap::new();
    let mut redirect = None;
    for (route_id, result) in results {
        match result {
            Ok(DataOutcome::Redirect(target)) => {
                redirect.get_or_insert((route_id, target));
            }
            result => {
                loaded.insert(route_id, result);
            }
        }
    }
    (loaded, redirect)
}

fn is_hash_change_only(current: &Location, next: &Location) -> bool {
    if current.pathname != next.pathname || current.search != next.search {
        return false;
    }
    if current.hash.is_empty() {
        return !next.hash.is_empty();
    }
    current.hash == next.hash || !next.hash.is_empty()
}

fn is_new_route_instance(current: &RouteMatch, next: &RouteMatch) -> bool {
    let splat_changed = current
        .route
        .path
        .as_deref()
        .is_some_and(|path| path.ends_with('*'))
        && current.params.get("*") != next.params.get("*");
    current.pathname != next.pathname || splat_changed
}

/// Normalize a submission: mutations keep their path, GET submissions move the form into the
/// search.
pub(crate) fn normalize_submission(
    mut path: Path,
    form_method: Option<FormMethod>,
    form_data: Option<&FormData>,
    fetcher: bool,
) -> (Path, Option<Submission>) {
    if form_data.is_none() && !form_method.is_some_and(FormMethod::is_mutation) {
        return (path, None);
    }

    let submission = Submission {
        form_method: form_method.unwrap_or_default(),
        form_action: create_path(&PartialPath {
            pathname: Some(path.pathname.clone()),
            search: Some(path.search.clone()),
            hash: None,
        }),
        form_data: form_data.cloned().unwrap_or_default(),
    };
    if submission.form_method.is_mutation() {
        return (path, Some(submission));
    }

    let mut query = submission.form_data.to_query();
    if fetcher && has_naked_index_query(&path.search) {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str("index=");
    }
    path.search = if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    (path, Some(submission))
}

fn without_naked_index(search: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            form_urlencoded::parse(search.trim_start_matches('?').as_bytes())
                .filter(|(key, value)| key != "index" || !value.is_empty()),
        )
        .finish();
    if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    }
}

fn strip_hash(href: &str) -> String {
    href.split('#').next().unwrap_or_default().to_string()
}

/// Reduce an absolute http(s) URL to its path. Everything else is returned as-is.
fn strip_origin(location: &str) -> String {
    match url::Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let mut path = url.path().to_string();
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            if let Some(fragment) = url.fragment() {
                path.push('#');
                path.push_str(fragment);
            }
            trace!(location, %path, "treating an absolute redirect as a path");
            path
        }
        _ => location.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use waymark_history::create_location;

    fn location(href: &str) -> Location {
        create_location("/", &To::from(href), None, None)
    }

    #[test]
    fn hash_changes() {
        assert!(is_hash_change_only(&location("/a"), &location("/a#x")));
        assert!(is_hash_change_only(&location("/a#x"), &location("/a#y")));
        assert!(is_hash_change_only(&location("/a#x"), &location("/a#x")));
        assert!(!is_hash_change_only(&location("/a#x"), &location("/a")));
        assert!(!is_hash_change_only(&location("/a"), &location("/a")));
        assert!(!is_hash_change_only(&location("/a"), &location("/a?q#x")));
    }

    #[test]
    fn get_submissions_move_into_the_search() {
        let form = FormData::new().with("q", "rust lang");
        let (path, submission) = normalize_submission(
            Path::new("/search", "?old=1", "#top"),
            None,
            Some(&form),
            false,
        );
        assert_eq!(path.search, "?q=rust+lang");
        let submission = submission.unwrap();
        assert_eq!(submission.form_method, FormMethod::Get);
        assert_eq!(submission.form_action, "/search?old=1");

        let (path, _) = normalize_submission(Path::new("/s", "?index", ""), None, Some(&form), true);
        assert_eq!(path.search, "?q=rust+lang&index=");
    }

    #[test]
    fn mutations_keep_their_path() {
        let (path, submission) =
            normalize_submission(Path::new("/a", "?x=1", ""), Some(FormMethod::Post), None, false);
        assert_eq!(path.search, "?x=1");
        assert_eq!(submission.unwrap().form_data, FormData::new());

        let (_, none) = normalize_submission(Path::new("/a", "", ""), Some(FormMethod::Get), None, false);
        assert_eq!(none, None);
    }

    #[test]
    fn naked_index_removal() {
        assert_eq!(without_naked_index("?index&a=1"), "?a=1");
        assert_eq!(without_naked_index("?index"), "");
        assert_eq!(without_naked_index("?index=2"), "?index=2");
    }

    #[test]
    fn origins_are_stripped() {
        assert_eq!(strip_origin("https://example.com/a/b?c=1#d"), "/a/b?c=1#d");
        assert_eq!(strip_origin("/relative"), "/relative");
        assert_eq!(strip_origin("../up"), "../up");
    }
}
