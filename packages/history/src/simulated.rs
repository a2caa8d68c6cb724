use std::{cell::RefCell, rc::Rc};

use serde_json::Value;

use crate::{HistoryError, NativeHistory};

struct SimulatedEntry {
    href: String,
    state: Option<Value>,
}

#[derive(Default)]
struct SimulatedCore {
    entries: Vec<SimulatedEntry>,
    index: usize,
    reject_writes: bool,
}

/// An in-process stand-in for a browser window's history stack.
///
/// Clones share the same stack, so a test can hold on to one clone while a [`BrowserHistory`] or
/// [`HashHistory`] owns the other. Unlike a real browser, pop callbacks run synchronously inside
/// [`NativeHistory::go`].
///
/// [`BrowserHistory`]: crate::BrowserHistory
/// [`HashHistory`]: crate::HashHistory
#[derive(Clone)]
pub struct SimulatedWindow {
    core: Rc<RefCell<SimulatedCore>>,
    callbacks: Rc<RefCell<Vec<Rc<dyn Fn()>>>>,
}

impl Default for SimulatedWindow {
    fn default() -> Self {
        Self::new("/")
    }
}

impl SimulatedWindow {
    /// Create a window whose only entry is at `href`.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            core: Rc::new(RefCell::new(SimulatedCore {
                entries: vec![SimulatedEntry {
                    href: href.into(),
                    state: None,
                }],
                index: 0,
                reject_writes: false,
            })),
            callbacks: Default::default(),
        }
    }

    /// Press the back button.
    pub fn back(&self) {
        self.go(-1)
    }

    /// Press the forward button.
    pub fn forward(&self) {
        self.go(1)
    }

    /// The number of entries in the stack.
    pub fn len(&self) -> usize {
        self.core.borrow().entries.len()
    }

    /// A window always has at least one entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Make `push_state` and `replace_state` fail, like a browser refusing to store a state object.
    pub fn reject_state_writes(&self, reject: bool) {
        self.core.borrow_mut().reject_writes = reject;
    }

    fn write(&self, push: bool, state: Option<Value>, url: &str) -> Result<(), HistoryError> {
        let mut core = self.core.borrow_mut();
        if core.reject_writes {
            return Err(HistoryError::Platform(format!(
                "the state for `{url}` could not be stored"
            )));
        }
        let entry = SimulatedEntry {
            href: url.to_string(),
            state,
        };
        if push {
            let index = core.index + 1;
            core.entries.truncate(index);
            core.entries.push(entry);
            core.index = index;
        } else {
            let index = core.index;
            core.entries[index] = entry;
        }
        Ok(())
    }
}

impl NativeHistory for SimulatedWindow {
    fn href(&self) -> String {
        let core = self.core.borrow();
        core.entries[core.index].href.clone()
    }

    fn entry_state(&self) -> Option<Value> {
        let core = self.core.borrow();
        core.entries[core.index].state.clone()
    }

    fn push_state(&self, state: Value, url: &str) -> Result<(), HistoryError> {
        self.write(true, Some(state), url)
    }

    fn replace_state(&self, state: Value, url: &str) -> Result<(), HistoryError> {
        self.write(false, Some(state), url)
    }

    fn assign(&self, url: &str) {
        let mut core = self.core.borrow_mut();
        let index = core.index + 1;
        core.entries.truncate(index);
        core.entries.push(SimulatedEntry {
            href: url.to_string(),
            state: None,
        });
        core.index = index;
    }

    fn go(&self, delta: isize) {
        let moved = {
            let mut core = self.core.borrow_mut();
            let last = core.entries.len() as isize - 1;
            let target = (core.index as isize + delta).clamp(0, last) as usize;
            let moved = target != core.index;
            core.index = target;
            moved
        };

        if moved {
            let callbacks = self.callbacks.borrow().clone();
            for callback in callbacks {
                callback();
            }
        }
    }

    fn on_pop(&self, callback: Rc<dyn Fn()>) {
        self.callbacks.borrow_mut().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn go_fires_pop_callbacks_only_when_moving() {
        let window = SimulatedWindow::new("/a");
        window.push_state(Value::Null, "/b").unwrap();
        let pops = Rc::new(Cell::new(0));
        let counter = pops.clone();
        window.on_pop(Rc::new(move || counter.set(counter.get() + 1)));

        window.forward();
        assert_eq!(pops.get(), 0);
        window.back();
        assert_eq!(window.href(), "/a");
        assert_eq!(pops.get(), 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn rejected_writes_leave_the_stack_alone() {
        let window = SimulatedWindow::new("/a");
        window.reject_state_writes(true);
        assert!(window.replace_state(Value::Null, "/b").is_err());
        assert_eq!(window.href(), "/a");
    }
}
