//! Fetchers load or submit data for a route without navigating.
//!
//! Every fetcher is identified by a key. Starting a fetch on a key supersedes whatever the key
//! was doing before: results of the older fetch are ignored.

use std::rc::Rc;

use tracing::{debug, trace};
use waymark_history::{create_location, Action, Path, To};

use crate::{
    match_routes,
    service::{action_target, normalize_submission, Attempt, Phase, RouterInner},
    DataOutcome, DataRequest, ErrorResponse, FetchOptions, FetcherState, FormMethod,
    PendingNavigation, Redirect, RouteMatch, Router, RouterError, Submission,
};

impl Router {
    /// Load `href` with the fetcher `key`, or submit to it when `options` carry a mutation.
    ///
    /// `href` is resolved relative to the route `route_id`, which is also where errors are
    /// reported when the fetch fails.
    pub fn fetch(
        &self,
        key: impl Into<String>,
        route_id: &str,
        href: impl Into<To>,
        options: FetchOptions,
    ) -> Result<PendingNavigation, RouterError> {
        let inner = &self.inner;
        inner.ensure_live()?;
        if inner.tree().route(route_id).is_none() {
            return Err(RouterError::UnknownRoute(route_id.to_string()));
        }
        let key = key.into();
        let state = inner.state();

        let path = inner.normalize_to(&state, &href.into(), Some(route_id), options.relative)?;
        let tree = inner.tree();
        let Some(matches) = match_routes(&tree, &path.pathname, inner.basename.as_deref()) else {
            let error = RouterError::Loader {
                route_id: route_id.to_string(),
                source: ErrorResponse::not_found(&path.pathname).into(),
            };
            inner.set_fetcher_error(&key, route_id, error);
            return Ok(PendingNavigation::ready());
        };

        let (path, submission) = normalize_submission(
            path,
            options.form_method,
            options.form_data.as_ref(),
            true,
        );
        let Some(target) = action_target(&matches, &path.search).cloned() else {
            return Ok(PendingNavigation::ready());
        };
        debug!(%key, route = route_id, target = %target.route.id, href = %path, "fetching");

        let fetch = Fetch {
            key,
            route_id: route_id.to_string(),
            path,
            matches,
            target,
        };
        Ok(match submission {
            Some(submission) if submission.form_method.is_mutation() => {
                if !fetch.target.route.has_action() && !fetch.target.route.is_lazy_pending() {
                    let error = RouterError::Action {
                        route_id: fetch.target.route.id.clone(),
                        source: ErrorResponse::method_not_allowed(
                            submission.form_method,
                            &fetch.path.pathname,
                            &fetch.target.route.id,
                        )
                        .into(),
                    };
                    inner.set_fetcher_error(&fetch.key, &fetch.route_id, error);
                    return Ok(PendingNavigation::ready());
                }
                fetch.submit(inner, submission)
            }
            submission => fetch.load(inner, submission),
        })
    }

    /// The state of the fetcher `key`. Unknown fetchers are idle.
    pub fn get_fetcher(&self, key: &str) -> FetcherState {
        self.inner.state().fetcher(key)
    }

    /// Forget the fetcher `key`, abandoning whatever it is doing.
    pub fn delete_fetcher(&self, key: &str) {
        let inner = &self.inner;
        inner.fetch_tokens.borrow_mut().remove(key);
        if inner.state().fetchers.contains_key(key) {
            inner.update(|state| {
                state.fetchers.remove(key);
            });
        }
    }
}

struct Fetch {
    key: String,
    route_id: String,
    path: Path,
    matches: Vec<RouteMatch>,
    target: RouteMatch,
}

impl Fetch {
    fn load(self, inner: &Rc<RouterInner>, submission: Option<Submission>) -> PendingNavigation {
        let token = inner.next_fetch_token(&self.key);
        let previous = inner.state().fetcher(&self.key).data;
        inner.set_fetcher(&self.key, FetcherState::loading(previous, submission));

        let request = DataRequest {
            path: self.path.clone(),
            method: FormMethod::Get,
            form_data: None,
        };
        let run = inner.strategy.run(vec![inner.loader_call(&self.target, request)]);
        let inner = inner.clone();

        PendingNavigation::new(async move {
            let results = run.await;
            if !inner.is_fetch_current(&self.key, token) {
                trace!(key = %self.key, "discarding a superseded fetcher result");
                return;
            }
            let Some((_, result)) = results.into_iter().next() else {
                return;
            };
            match result {
                Ok(DataOutcome::Data(data)) => {
                    inner.set_fetcher(&self.key, FetcherState::idle(Some(data)));
                }
                Ok(DataOutcome::Redirect(redirect)) => {
                    inner.set_fetcher(&self.key, FetcherState::idle(None));
                    self.follow_redirect(&inner, redirect, false).await;
                }
                Err(source) => {
                    let error = RouterError::Loader {
                        route_id: self.target.route.id.clone(),
                        source,
                    };
                    inner.set_fetcher_error(&self.key, &self.route_id, error);
                }
            }
        })
    }

    fn submit(self, inner: &Rc<RouterInner>, submission: Submission) -> PendingNavigation {
        let token = inner.next_fetch_token(&self.key);
        let previous = inner.state().fetcher(&self.key).data;
        inner.set_fetcher(
            &self.key,
            FetcherState::submitting(previous, submission.clone()),
        );

        let request = DataRequest {
            path: self.path.clone(),
            method: submission.form_method,
            form_data: Some(submission.form_data.clone()),
        };
        let run = inner.strategy.run(vec![inner.action_call(&self.target, request)]);
        let inner = inner.clone();

        PendingNavigation::new(async move {
            let results = run.await;
            if !inner.is_fetch_current(&self.key, token) {
                trace!(key = %self.key, "discarding a superseded fetcher action");
                return;
            }
            let Some((_, result)) = results.into_iter().next() else {
                return;
            };
            let data = match result {
                Ok(DataOutcome::Data(data)) => data,
                Ok(DataOutcome::Redirect(redirect)) => {
                    inner.set_fetcher(&self.key, FetcherState::idle(None));
                    return self.follow_redirect(&inner, redirect, true).await;
                }
                Err(source) => {
                    let error = RouterError::Action {
                        route_id: self.target.route.id.clone(),
                        source,
                    };
                    return inner.set_fetcher_error(&self.key, &self.route_id, error);
                }
            };

            inner.set_fetcher(
                &self.key,
                FetcherState::loading(Some(data.clone()), Some(submission.clone())),
            );

            // a navigation in flight reloads everything instead
            let active = inner.active.borrow().clone();
            match active {
                Some(active) => {
                    inner.revalidation_required.set(true);
                    if active.phase == Phase::Loading {
                        inner.restart(active).await;
                    }
                }
                None => {
                    inner
                        .revalidate_after_fetch(&submission, &self.target.route.id, &data)
                        .await;
                }
            }

            if inner.is_fetch_current(&self.key, token) {
                inner.set_fetcher(&self.key, FetcherState::idle(Some(data)));
            }
        })
    }

    /// Navigate to where a fetcher's loader or action redirected.
    async fn follow_redirect(&self, inner: &Rc<RouterInner>, redirect: Redirect, revalidate_all: bool) {
        let location = inner.normalize_redirect(
            &self.path,
            &self.matches,
            &self.target.route.id,
            &redirect.location,
        );
        let action = if redirect.replace {
            Action::Replace
        } else {
            Action::Push
        };
        debug!(key = %self.key, %location, status = redirect.status, "fetcher redirected");
        let current = inner.state().location.pathname.clone();
        let attempt = Attempt {
            redirects: 1,
            ..Attempt::navigation(
                create_location(&current, &To::Str(location), None, None),
                action,
            )
        };
        inner.start(attempt, revalidate_all).await;
    }
}
