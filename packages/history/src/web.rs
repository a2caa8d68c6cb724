use std::{cell::RefCell, rc::Rc};

use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::{prelude::Closure, JsCast, JsValue};
use web_sys::{History as WebSysHistory, PopStateEvent, Window};

use crate::{BrowserHistory, BrowserHistoryOptions, HashHistory, HistoryError, NativeHistory};

fn to_js(state: &Value) -> Result<JsValue, HistoryError> {
    state
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| HistoryError::Platform(err.to_string()))
}

fn platform_error(err: JsValue) -> HistoryError {
    HistoryError::Platform(format!("{err:?}"))
}

/// A [`NativeHistory`] on top of a browser window, via the
/// [History API](https://developer.mozilla.org/en-US/docs/Web/API/History_API).
pub struct WebWindow {
    window: Window,
    history: WebSysHistory,
    listeners: RefCell<Vec<Closure<dyn FnMut(PopStateEvent)>>>,
}

impl WebWindow {
    /// Wrap the global `window`.
    ///
    /// Fails when there is no window (e.g. inside a web worker) or it has no history.
    pub fn new() -> Result<Self, HistoryError> {
        let window = web_sys::window()
            .ok_or_else(|| HistoryError::Platform(String::from("no global `window`")))?;
        let history = window.history().map_err(platform_error)?;
        Ok(Self {
            window,
            history,
            listeners: RefCell::new(Vec::new()),
        })
    }
}

impl Drop for WebWindow {
    fn drop(&mut self) {
        for listener in self.listeners.borrow_mut().drain(..) {
            let _ = self
                .window
                .remove_event_listener_with_callback("popstate", listener.as_ref().unchecked_ref());
        }
    }
}

impl NativeHistory for WebWindow {
    fn href(&self) -> String {
        let location = self.window.location();
        let pathname = location.pathname().unwrap_or_else(|_| String::from("/"));
        let search = location.search().unwrap_or_default();
        let hash = location.hash().unwrap_or_default();
        format!("{pathname}{search}{hash}")
    }

    fn entry_state(&self) -> Option<Value> {
        let state = self.history.state().ok()?;
        if state.is_null() || state.is_undefined() {
            return None;
        }
        serde_wasm_bindgen::from_value(state).ok()
    }

    fn push_state(&self, state: Value, url: &str) -> Result<(), HistoryError> {
        let state = to_js(&state)?;
        self.history
            .push_state_with_url(&state, "", Some(url))
            .map_err(platform_error)
    }

    fn replace_state(&self, state: Value, url: &str) -> Result<(), HistoryError> {
        let state = to_js(&state)?;
        self.history
            .replace_state_with_url(&state, "", Some(url))
            .map_err(platform_error)
    }

    fn assign(&self, url: &str) {
        if let Err(err) = self.window.location().assign(url) {
            tracing::error!("failed to load `{url}`: {err:?}");
        }
    }

    fn go(&self, delta: isize) {
        if let Err(err) = self.history.go_with_delta(delta as i32) {
            tracing::error!("failed to go {delta} entries: {err:?}");
        }
    }

    fn on_pop(&self, callback: Rc<dyn Fn()>) {
        let listener = Closure::<dyn FnMut(PopStateEvent)>::new(move |_: PopStateEvent| callback());
        if let Err(err) = self
            .window
            .add_event_listener_with_callback("popstate", listener.as_ref().unchecked_ref())
        {
            tracing::error!("failed to listen for `popstate`: {err:?}");
            return;
        }
        self.listeners.borrow_mut().push(listener);
    }
}

/// A [`BrowserHistory`] on the global window.
pub fn web_browser_history(
    options: BrowserHistoryOptions,
) -> Result<BrowserHistory<WebWindow>, HistoryError> {
    Ok(BrowserHistory::new(WebWindow::new()?, options))
}

/// A [`HashHistory`] on the global window.
pub fn web_hash_history() -> Result<HashHistory<WebWindow>, HistoryError> {
    Ok(HashHistory::new(WebWindow::new()?))
}
