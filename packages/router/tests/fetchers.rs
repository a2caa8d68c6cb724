use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use futures_channel::oneshot;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use waymark_history::MemoryHistory;
use waymark_router::*;

fn data(value: Value) -> DataResult {
    Ok(DataOutcome::Data(value))
}

fn counted(
    calls: &Rc<Cell<usize>>,
    value: Value,
) -> impl Fn(DataArgs) -> futures_util::future::Ready<DataResult> {
    let calls = calls.clone();
    move |_| {
        calls.set(calls.get() + 1);
        futures_util::future::ready(data(value.clone()))
    }
}

async fn start(routes: Vec<Route>, path: &str) -> (Router, Rc<MemoryHistory>) {
    let history = Rc::new(MemoryHistory::with_initial_path(path));
    let router = Router::new(RouterConfig::new(routes).history(history.clone())).unwrap();
    router.initialize().await;
    (router, history)
}

fn post(form_data: FormData) -> FetchOptions {
    FetchOptions::default()
        .form_method(FormMethod::Post)
        .form_data(form_data)
}

#[tokio::test]
async fn loads_go_through_loading_to_idle() {
    let routes = vec![Route::new("/").id("root").child(
        Route::new("items")
            .id("items")
            .loader(|_| async { data(json!(["a", "b"])) }),
    )];
    let (router, _) = start(routes, "/").await;

    let pending = router
        .fetch("items", "root", "/items", FetchOptions::default())
        .unwrap();
    assert_eq!(router.get_fetcher("items").state, FetcherStatus::Loading);
    assert_eq!(router.get_fetcher("items").data, None);

    pending.await;
    assert_eq!(
        router.get_fetcher("items"),
        FetcherState {
            state: FetcherStatus::Idle,
            data: Some(json!(["a", "b"])),
            submission: None,
        }
    );
    // fetching never navigates
    assert_eq!(router.state().location.pathname, "/");
    assert!(router.state().navigation.is_idle());
}

#[tokio::test]
async fn a_new_fetch_supersedes_the_old_one_on_the_same_key() {
    let (release, gate) = oneshot::channel::<()>();
    let gate = RefCell::new(Some(gate));
    let routes = vec![Route::new("/").id("root").children([
        Route::new("slow").loader(move |_| {
            let gate = gate.borrow_mut().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                data(json!("slow"))
            }
        }),
        Route::new("fast").loader(|_| async { data(json!("fast")) }),
    ])];
    let (router, _) = start(routes, "/").await;

    let slow = router
        .fetch("k", "root", "/slow", FetchOptions::default())
        .unwrap();
    router
        .fetch("k", "root", "/fast", FetchOptions::default())
        .unwrap()
        .await;
    assert_eq!(router.get_fetcher("k").data, Some(json!("fast")));

    release.send(()).unwrap();
    slow.await;
    assert_eq!(router.get_fetcher("k").data, Some(json!("fast")));
    assert_eq!(router.get_fetcher("k").state, FetcherStatus::Idle);
}

#[tokio::test]
async fn fetching_from_an_unknown_route_fails() {
    let (router, _) = start(vec![Route::new("/").id("root")], "/").await;
    let result = router.fetch("k", "nope", "/", FetchOptions::default());
    assert!(matches!(result, Err(RouterError::UnknownRoute(id)) if id == "nope"));
    assert!(router.state().fetchers.is_empty());
}

#[tokio::test]
async fn unmatched_hrefs_report_a_404_at_the_boundary() {
    let routes = vec![Route::new("/").id("root").child(Route::new("a").id("a"))];
    let (router, _) = start(routes, "/a").await;

    router
        .fetch("k", "a", "/missing", FetchOptions::default())
        .unwrap()
        .await;

    let state = router.state();
    assert_eq!(state.error("root").and_then(RouterError::status), Some(404));
    // the page itself stays where it was
    assert_eq!(state.location.pathname, "/a");
    assert_eq!(state.route_ids(), vec!["root", "a"]);
    assert!(!state.fetchers.contains_key("k"));
}

#[tokio::test]
async fn fetcher_errors_merge_into_existing_errors() {
    let routes = vec![Route::new("/").id("root").child(
        Route::layout()
            .id("shell")
            .error_boundary(true)
            .child(Route::new("inner").id("inner").loader(|_| async {
                Err(RouteError::from(anyhow::anyhow!("inner failed")))
            })),
    )];
    let (router, _) = start(routes, "/inner").await;
    assert_eq!(router.state().route_ids(), vec!["root", "shell"]);

    router
        .fetch("k", "root", "/missing", FetchOptions::default())
        .unwrap()
        .await;

    let state = router.state();
    assert_eq!(state.error("root").and_then(RouterError::status), Some(404));
    assert!(matches!(
        state.error("shell"),
        Some(RouterError::Loader { route_id, .. }) if route_id == "inner"
    ));
    assert_eq!(state.route_ids(), vec!["root", "shell"]);
}

#[tokio::test]
async fn fetcher_actions_revalidate_the_page() {
    let root_calls = Rc::new(Cell::new(0));
    let todo_calls = Rc::new(Cell::new(0));
    let routes = vec![Route::new("/")
        .id("root")
        .loader(counted(&root_calls, json!("root")))
        .child(
            Route::new("todos")
                .id("todos")
                .loader(counted(&todo_calls, json!(["write tests"])))
                .action(|args| async move {
                    let title = args.request.form_data.and_then(|f| f.get("title").map(String::from));
                    data(json!({ "created": title }))
                }),
        )];
    let (router, history) = start(routes, "/todos").await;
    assert_eq!((root_calls.get(), todo_calls.get()), (1, 1));

    let pending = router
        .fetch("new-todo", "todos", "/todos", post(FormData::new().with("title", "ship it")))
        .unwrap();
    let submitting = router.get_fetcher("new-todo");
    assert_eq!(submitting.state, FetcherStatus::Submitting);
    assert_eq!(
        submitting.submission.map(|s| (s.form_method, s.form_action)),
        Some((FormMethod::Post, "/todos".to_string()))
    );

    pending.await;
    assert_eq!((root_calls.get(), todo_calls.get()), (2, 2));
    assert_eq!(
        router.get_fetcher("new-todo"),
        FetcherState {
            state: FetcherStatus::Idle,
            data: Some(json!({ "created": "ship it" })),
            submission: None,
        }
    );
    let state = router.state();
    assert_eq!(state.location.pathname, "/todos");
    assert_eq!(state.action_data, None);
    assert_eq!(history.entries().len(), 1);
}

#[tokio::test]
async fn fetcher_redirects_navigate() {
    let routes = vec![Route::new("/").id("root").children([
        Route::new("check").loader(|_| async { Ok(DataOutcome::redirect("/done")) }),
        Route::new("done").id("done"),
    ])];
    let (router, history) = start(routes, "/").await;

    router
        .fetch("k", "root", "/check", FetchOptions::default())
        .unwrap()
        .await;

    let state = router.state();
    assert_eq!(state.location.pathname, "/done");
    assert_eq!(state.route_ids(), vec!["root", "done"]);
    assert_eq!(state.fetcher("k").state, FetcherStatus::Idle);
    assert_eq!(state.fetcher("k").data, None);
    assert_eq!(
        history
            .entries()
            .into_iter()
            .map(|l| l.pathname)
            .collect::<Vec<_>>(),
        vec!["/", "/done"]
    );
}

#[tokio::test]
async fn submitting_to_a_route_without_an_action_is_a_405() {
    let routes = vec![Route::new("/").id("root").child(
        Route::new("view")
            .id("view")
            .loader(|_| async { data(json!("view")) }),
    )];
    let (router, _) = start(routes, "/").await;

    // fails synchronously, there is nothing to await
    let _ = router
        .fetch("k", "root", "/view", post(FormData::new().with("a", "1")))
        .unwrap();

    let state = router.state();
    let error = state.error("root").unwrap();
    assert_eq!(error.status(), Some(405));
    assert!(matches!(error, RouterError::Action { route_id, .. } if route_id == "view"));
    assert!(state.fetchers.is_empty());
}

#[tokio::test]
async fn deleted_fetchers_ignore_their_results() {
    let (release, gate) = oneshot::channel::<()>();
    let gate = RefCell::new(Some(gate));
    let routes = vec![Route::new("/").id("root").child(Route::new("slow").loader(move |_| {
        let gate = gate.borrow_mut().take();
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            data(json!("slow"))
        }
    }))];
    let (router, _) = start(routes, "/").await;

    let pending = router
        .fetch("k", "root", "/slow", FetchOptions::default())
        .unwrap();
    assert!(router.state().fetchers.contains_key("k"));

    router.delete_fetcher("k");
    assert!(!router.state().fetchers.contains_key("k"));

    release.send(()).unwrap();
    pending.await;
    assert!(!router.state().fetchers.contains_key("k"));
    assert_eq!(router.get_fetcher("k"), FetcherState::default());
}
