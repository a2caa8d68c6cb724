#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

use std::{
    cell::RefCell,
    fmt::{self, Display},
    rc::Rc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod error;
pub use error::*;

mod location;
pub use location::*;

mod memory;
pub use memory::*;

mod native;
pub use native::*;

mod simulated;
pub use simulated::*;

#[cfg(feature = "web")]
mod web;
#[cfg(feature = "web")]
pub use web::*;

/// The kind of change that produced the current location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// A change to an arbitrary index in the stack, e.g. the back or forward button.
    ///
    /// This is also the action of a freshly created history.
    #[default]
    Pop,
    /// A new entry was added to the stack.
    Push,
    /// The current entry was replaced.
    Replace,
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Pop => "POP",
            Action::Push => "PUSH",
            Action::Replace => "REPLACE",
        })
    }
}

/// What a history [`Listener`] is told about a change.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryUpdate {
    /// The kind of change.
    pub action: Action,
    /// The location after the change.
    pub location: Location,
    /// How far the cursor moved, if known. `None` for pushes and replaces.
    pub delta: Option<isize>,
}

/// A callback that observes a [`History`].
pub type Listener = Rc<dyn Fn(&HistoryUpdate)>;

/// Identifies a [`Listener`] registered with [`History::listen`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// An integration with some kind of navigation history.
///
/// Implementations keep their state behind interior mutability, so a history can be shared through
/// an [`Rc`] between the router and whoever else wants to observe it.
///
/// Listeners must be called synchronously, in registration order, exactly once for every push,
/// replace and effective pop. Calling [`History::go`] with a delta that doesn't move the cursor must
/// not notify anyone.
pub trait History {
    /// The current location.
    ///
    /// ```rust
    /// # use waymark_history::{History, MemoryHistory};
    /// let history = MemoryHistory::default();
    /// assert_eq!(history.location().pathname, "/");
    ///
    /// history.push(&"/path".into(), None);
    /// assert_eq!(history.location().pathname, "/path");
    /// ```
    #[must_use]
    fn location(&self) -> Location;

    /// The action that produced the current location.
    #[must_use]
    fn action(&self) -> Action;

    /// Add a new entry to the stack, discarding every entry after the current one.
    fn push(&self, to: &To, state: Option<Value>);

    /// Replace the current entry.
    fn replace(&self, to: &To, state: Option<Value>);

    /// Move the cursor by `delta` entries.
    fn go(&self, delta: isize);

    /// Register a listener. It is called after every change until it is removed with
    /// [`History::unlisten`].
    fn listen(&self, listener: Listener) -> ListenerId;

    /// Remove a listener. Removing an unknown listener does nothing.
    fn unlisten(&self, id: ListenerId);

    /// The href that would be shown to the user for `to`.
    #[must_use]
    fn create_href(&self, to: &To) -> String;

    /// Parse `to` through a URL parser, yielding the path the platform would store.
    ///
    /// Unsafe characters in the pathname get percent-encoded in the process.
    fn encode_location(&self, to: &To) -> Path {
        encode_location(&self.create_href(to))
    }

    /// Check whether there is a previous entry.
    ///
    /// If an implementation cannot know this, it should return [`true`].
    #[must_use]
    fn can_go_back(&self) -> bool {
        true
    }

    /// Check whether there is a following entry.
    ///
    /// If an implementation cannot know this, it should return [`true`].
    #[must_use]
    fn can_go_forward(&self) -> bool {
        true
    }
}

/// Run `href` through a URL parser and return its path parts.
///
/// Relative hrefs are parsed against `http://localhost`. An href that can't be parsed is returned
/// as-is, split into its parts.
///
/// ```rust
/// # use waymark_history::encode_location;
/// let path = encode_location("/a b?c=d#e");
/// assert_eq!(path.pathname, "/a%20b");
/// assert_eq!(path.search, "?c=d");
/// assert_eq!(path.hash, "#e");
/// ```
pub fn encode_location(href: &str) -> Path {
    let base = if href.starts_with('/') {
        format!("http://localhost{href}")
    } else {
        href.to_string()
    };

    match url::Url::parse(&base) {
        Ok(url) => Path::new(
            url.path(),
            url.query().unwrap_or_default(),
            url.fragment().unwrap_or_default(),
        ),
        Err(err) => {
            tracing::warn!("failed to encode `{href}`: {err}");
            let parsed = parse_path(href);
            Path::new(
                parsed.pathname.unwrap_or_else(|| String::from("/")),
                parsed.search.as_deref().unwrap_or_default(),
                parsed.hash.as_deref().unwrap_or_default(),
            )
        }
    }
}

/// A list of [`Listener`]s, called in registration order.
///
/// The list is copied before the listeners run, so a listener may register or remove listeners
/// (including itself) while it is being called.
#[derive(Default)]
pub struct Listeners {
    next_id: RefCell<usize>,
    entries: RefCell<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    /// Add a listener.
    pub fn add(&self, listener: Listener) -> ListenerId {
        let mut next = self.next_id.borrow_mut();
        let id = ListenerId(*next);
        *next += 1;
        self.entries.borrow_mut().push((id, listener));
        id
    }

    /// Remove a listener.
    pub fn remove(&self, id: ListenerId) {
        self.entries.borrow_mut().retain(|(other, _)| *other != id);
    }

    /// How many listeners are registered.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Call every listener with `update`.
    pub fn notify(&self, update: &HistoryUpdate) {
        let listeners: Vec<Listener> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn action_display() {
        assert_eq!(Action::Pop.to_string(), "POP");
        assert_eq!(Action::Push.to_string(), "PUSH");
        assert_eq!(Action::Replace.to_string(), "REPLACE");
        assert_eq!(serde_json::to_string(&Action::Replace).unwrap(), "\"REPLACE\"");
    }

    #[test]
    fn listeners_may_unlisten_themselves() {
        let listeners = Rc::new(Listeners::default());
        let calls = Rc::new(RefCell::new(Vec::new()));

        let own_id = Rc::new(RefCell::new(None));
        let first = {
            let listeners = listeners.clone();
            let calls = calls.clone();
            let own_id = own_id.clone();
            listeners.clone().add(Rc::new(move |_: &HistoryUpdate| {
                calls.borrow_mut().push("first");
                if let Some(id) = *own_id.borrow() {
                    listeners.remove(id);
                }
            }))
        };
        *own_id.borrow_mut() = Some(first);
        {
            let calls = calls.clone();
            listeners.add(Rc::new(move |_: &HistoryUpdate| calls.borrow_mut().push("second")));
        }

        let update = HistoryUpdate {
            action: Action::Push,
            location: Location::default(),
            delta: None,
        };
        listeners.notify(&update);
        listeners.notify(&update);

        assert_eq!(*calls.borrow(), vec!["first", "second", "second"]);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn encode_location_keeps_absolute_urls() {
        let path = encode_location("https://example.com/x?y#z");
        assert_eq!(path, Path::new("/x", "?y", "#z"));
    }
}
