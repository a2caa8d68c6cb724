use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use waymark_history::MemoryHistory;
use waymark_router::*;

fn counted(
    calls: &Rc<Cell<usize>>,
    value: Value,
) -> impl Fn(DataArgs) -> futures_util::future::Ready<DataResult> {
    let calls = calls.clone();
    move |_| {
        calls.set(calls.get() + 1);
        futures_util::future::ready(Ok(DataOutcome::Data(value.clone())))
    }
}

struct Calls {
    root: Rc<Cell<usize>>,
    child: Rc<Cell<usize>>,
}

impl Calls {
    fn get(&self) -> (usize, usize) {
        (self.root.get(), self.child.get())
    }
}

fn routes() -> (Vec<Route>, Calls) {
    let calls = Calls {
        root: Rc::new(Cell::new(0)),
        child: Rc::new(Cell::new(0)),
    };
    let routes = vec![Route::new("/")
        .id("root")
        .loader(counted(&calls.root, json!("root")))
        .child(
            Route::new("a")
                .id("a")
                .loader(counted(&calls.child, json!("a"))),
        )];
    (routes, calls)
}

fn router(path: &str, hydration: Option<HydrationState>) -> (Router, Calls) {
    let (routes, calls) = routes();
    let mut cfg =
        RouterConfig::new(routes).history(Rc::new(MemoryHistory::with_initial_path(path)));
    if let Some(hydration) = hydration {
        cfg = cfg.hydration_data(hydration);
    }
    (Router::new(cfg).unwrap(), calls)
}

#[tokio::test]
async fn fully_hydrated_routers_skip_the_initial_load() {
    let (router, calls) = router(
        "/a",
        Some(HydrationState {
            loader_data: BTreeMap::from([
                ("root".to_string(), json!("server root")),
                ("a".to_string(), json!("server a")),
            ]),
            ..Default::default()
        }),
    );
    assert!(router.state().initialized);

    router.initialize().await;
    let state = router.state();
    assert_eq!(calls.get(), (0, 0));
    assert_eq!(state.loader_data("a"), Some(&json!("server a")));
    assert!(state.navigation.is_idle());
}

#[tokio::test]
async fn partial_hydration_loads_only_what_is_missing() {
    let (router, calls) = router(
        "/a",
        Some(HydrationState {
            loader_data: BTreeMap::from([("root".to_string(), json!("server root"))]),
            ..Default::default()
        }),
    );
    assert!(!router.state().initialized);

    let pending = router.initialize();
    assert_eq!(
        router.state().navigation.location().map(|l| l.pathname.as_str()),
        Some("/a")
    );
    pending.await;

    let state = router.state();
    assert!(state.initialized);
    assert_eq!(calls.get(), (0, 1));
    assert_eq!(state.loader_data("root"), Some(&json!("server root")));
    assert_eq!(state.loader_data("a"), Some(&json!("a")));
}

#[tokio::test]
async fn hydrated_errors_trim_the_matches() {
    let hydration: HydrationState = serde_json::from_value(json!({
        "loaderData": {},
        "errors": {
            "root": { "__type": "RouteErrorResponse", "status": 404, "statusText": "Not Found", "data": "gone" }
        }
    }))
    .unwrap();
    let (router, calls) = router("/a", Some(hydration));

    let state = router.state();
    assert!(state.initialized);
    assert_eq!(state.route_ids(), vec!["root"]);
    assert_eq!(state.error("root").and_then(RouterError::status), Some(404));

    router.initialize().await;
    assert_eq!(calls.get(), (0, 0));
}

#[tokio::test]
async fn hydrated_errors_survive_the_initial_load() {
    let hydration: HydrationState = serde_json::from_value(json!({
        "errors": { "a": { "__type": "Error", "message": "exploded" } }
    }))
    .unwrap();
    let (router, calls) = router("/a", Some(hydration));
    assert!(!router.state().initialized);

    router.initialize().await;

    let state = router.state();
    assert_eq!(calls.get(), (1, 0));
    assert_eq!(state.loader_data("root"), Some(&json!("root")));
    assert_eq!(
        state
            .error("a")
            .and_then(RouterError::route_error)
            .map(ToString::to_string),
        Some("exploded".to_string())
    );
    assert_eq!(state.route_ids(), vec!["root", "a"]);
}

#[tokio::test]
async fn mismatched_hydration_is_reported() {
    let hydration: HydrationState = serde_json::from_str(
        r#"{ "loaderData": { "root": "r", "b": "b" }, "matches": ["root", "b"] }"#,
    )
    .unwrap();
    let (router, _) = router("/a", Some(hydration));

    assert_eq!(
        router.diagnostics().emitted(),
        vec![r#"The hydrated routes ["root", "b"] don't match the routes ["root", "a"] of "/a""#]
    );
}

#[tokio::test]
async fn without_hydration_the_initial_load_is_published() {
    let (router, calls) = router("/a", None);
    assert!(!router.state().initialized);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let recorder = seen.clone();
    router.subscribe(move |state| {
        recorder
            .borrow_mut()
            .push((state.initialized, state.navigation.is_loading()));
    });

    router.initialize().await;

    assert_eq!(*seen.borrow(), vec![(false, true), (true, false)]);
    assert_eq!(calls.get(), (1, 1));
}
