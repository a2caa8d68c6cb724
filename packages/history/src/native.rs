//! Histories backed by a platform history stack, such as the one of a browser window.
//!
//! The platform is reached through the [`NativeHistory`] trait, so the same [`BrowserHistory`] and
//! [`HashHistory`] logic runs on top of `web_sys` (with the `web` feature) and on top of the
//! in-process [`SimulatedWindow`](crate::SimulatedWindow).

use std::{
    cell::Cell,
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::{
    create_location, create_path, encode_location, parse_path, Action, History, HistoryError,
    HistoryUpdate, Listener, ListenerId, Listeners, Location, Path, To, DEFAULT_KEY,
};

/// The platform side of a URL backed history.
pub trait NativeHistory {
    /// The current URL without its origin, e.g. `/app/page?x=1#top`.
    fn href(&self) -> String;

    /// The state stored with the current platform entry.
    fn entry_state(&self) -> Option<Value>;

    /// Add an entry with `state` at `url`.
    fn push_state(&self, state: Value, url: &str) -> Result<(), HistoryError>;

    /// Overwrite the current entry.
    fn replace_state(&self, state: Value, url: &str) -> Result<(), HistoryError>;

    /// Load `url` as a completely new document. Used when writing state fails.
    fn assign(&self, url: &str);

    /// Move through the platform stack. The move is reported through the [`NativeHistory::on_pop`]
    /// callbacks.
    fn go(&self, delta: isize);

    /// Register a callback for entries activated by [`NativeHistory::go`] or the user.
    fn on_pop(&self, callback: Rc<dyn Fn()>);
}

/// What a URL backed history stores in the platform entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryState {
    /// The user state passed to `push`/`replace`.
    pub usr: Option<Value>,
    /// The location key.
    pub key: String,
    /// The position of the entry, counted from the entry the history was created on.
    pub idx: usize,
}

impl EntryState {
    fn read<N: NativeHistory>(native: &N) -> Option<Self> {
        native
            .entry_state()
            .and_then(|state| serde_json::from_value(state).ok())
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Path,
    Hash,
}

struct UrlHistoryCore<N> {
    native: N,
    mode: Mode,
    prefix: Option<String>,
    index: Cell<usize>,
    action: Cell<Action>,
    listeners: Listeners,
}

impl<N: NativeHistory + 'static> UrlHistoryCore<N> {
    fn new(native: N, mode: Mode, prefix: Option<String>) -> Rc<Self> {
        let prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        let core = Rc::new(Self {
            native,
            mode,
            prefix,
            index: Cell::new(0),
            action: Cell::new(Action::Pop),
            listeners: Listeners::default(),
        });

        if mode == Mode::Hash {
            core.normalize_hash_path();
        }

        match EntryState::read(&core.native) {
            Some(state) => core.index.set(state.idx),
            None => {
                // stamp the entry we were created on so later pops can compute a delta
                let location = core.location();
                let state = EntryState {
                    usr: location.state.clone(),
                    key: location.key.clone(),
                    idx: 0,
                };
                let url = core.native.href();
                if let Err(err) = core.native.replace_state(state.to_value(), &url) {
                    warn!("failed to stamp the initial history entry: {err}");
                }
            }
        }

        let weak: Weak<Self> = Rc::downgrade(&core);
        core.native.on_pop(Rc::new(move || {
            if let Some(core) = weak.upgrade() {
                core.handle_pop();
            }
        }));

        core
    }

    fn normalize_hash_path(&self) {
        let href = self.native.href();
        let fragment = href.split_once('#').map(|(_, f)| f).unwrap_or_default();
        if fragment.is_empty() || fragment.starts_with('/') {
            return;
        }

        warn!("hash path `{fragment}` does not start with a `/`, replacing it with `/{fragment}`");
        let base = href.split_once('#').map(|(b, _)| b).unwrap_or(&href);
        let url = format!("{base}#/{fragment}");
        let state = self.native.entry_state().unwrap_or(Value::Null);
        if let Err(err) = self.native.replace_state(state, &url) {
            error!("failed to normalize the hash path: {err}");
        }
    }

    /// The path part the router cares about, still including search and hash.
    fn app_path(&self) -> String {
        let href = self.native.href();
        match self.mode {
            Mode::Path => match &self.prefix {
                Some(prefix) => strip_prefix(&href, prefix).unwrap_or(href),
                None => href,
            },
            Mode::Hash => href
                .split_once('#')
                .map(|(_, fragment)| fragment.to_string())
                .unwrap_or_default(),
        }
    }

    fn location(&self) -> Location {
        let parsed = parse_path(&self.app_path());
        let entry = EntryState::read(&self.native);
        let (state, key) = match entry {
            Some(entry) => (entry.usr, entry.key),
            None => (None, String::from(DEFAULT_KEY)),
        };
        let to = To::Path(crate::PartialPath {
            pathname: Some(parsed.pathname.unwrap_or_else(|| String::from("/"))),
            search: parsed.search,
            hash: parsed.hash,
        });
        create_location("/", &to, state, Some(key))
    }

    fn href(&self, to: &To) -> String {
        let path = match to {
            To::Str(s) => s.clone(),
            other => create_path(&other.to_partial()),
        };
        match self.mode {
            Mode::Path => match &self.prefix {
                Some(prefix) if path.starts_with('/') => format!("{prefix}{path}"),
                _ => path,
            },
            Mode::Hash => {
                let href = self.native.href();
                let base = href.split_once('#').map(|(b, _)| b).unwrap_or(&href);
                format!("{base}#{path}")
            }
        }
    }

    fn write(&self, action: Action, to: &To, state: Option<Value>) {
        let current = self.location();
        let location = create_location(&current.pathname, to, state, None);
        let idx = match action {
            Action::Push => self.index.get() + 1,
            _ => self.index.get(),
        };
        let entry = EntryState {
            usr: location.state.clone(),
            key: location.key.clone(),
            idx,
        };
        let url = self.href(&To::Path(location.path().into()));

        let written = match action {
            Action::Push => self.native.push_state(entry.to_value(), &url),
            _ => self.native.replace_state(entry.to_value(), &url),
        };

        if let Err(err) = written {
            // the entry can't be written, so the only option left is a full page load
            error!("failed to {action} `{url}`: {err}");
            self.native.assign(&url);
            return;
        }

        self.index.set(idx);
        self.action.set(action);
        self.listeners.notify(&HistoryUpdate {
            action,
            location,
            delta: None,
        });
    }

    fn handle_pop(&self) {
        let location = self.location();
        let delta = match EntryState::read(&self.native) {
            Some(entry) => {
                let delta = entry.idx as isize - self.index.get() as isize;
                self.index.set(entry.idx);
                Some(delta)
            }
            None => None,
        };
        self.action.set(Action::Pop);
        self.listeners.notify(&HistoryUpdate {
            action: Action::Pop,
            location,
            delta,
        });
    }
}

fn strip_prefix(href: &str, prefix: &str) -> Option<String> {
    let rest = href.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(String::from("/"))
    } else if rest.starts_with(['/', '?', '#']) {
        Some(if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        })
    } else {
        None
    }
}

/// Options for a [`BrowserHistory`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserHistoryOptions {
    /// A path the app is mounted under. It is stripped from locations and added back to hrefs.
    pub prefix: Option<String>,
}

/// A [`History`] that keeps the location in the pathname of the platform URL.
///
/// # Prefix
/// This history supports a prefix, which can be used for apps that aren't located at the root of
/// their domain. Locations never contain the prefix; hrefs always do.
pub struct BrowserHistory<N: NativeHistory> {
    core: Rc<UrlHistoryCore<N>>,
}

impl<N: NativeHistory + 'static> BrowserHistory<N> {
    /// Create a [`BrowserHistory`] on top of `native`.
    pub fn new(native: N, options: BrowserHistoryOptions) -> Self {
        Self {
            core: UrlHistoryCore::new(native, Mode::Path, options.prefix),
        }
    }

    /// The platform this history writes to.
    pub fn native(&self) -> &N {
        &self.core.native
    }
}

/// A [`History`] that keeps the location in the fragment of the platform URL, e.g.
/// `/index.html#/page?x=1`.
pub struct HashHistory<N: NativeHistory> {
    core: Rc<UrlHistoryCore<N>>,
}

impl<N: NativeHistory + 'static> HashHistory<N> {
    /// Create a [`HashHistory`] on top of `native`.
    ///
    /// A fragment that doesn't start with a `/` is rewritten, e.g. `#page` becomes `#/page`.
    pub fn new(native: N) -> Self {
        Self {
            core: UrlHistoryCore::new(native, Mode::Hash, None),
        }
    }

    /// The platform this history writes to.
    pub fn native(&self) -> &N {
        &self.core.native
    }
}

macro_rules! impl_url_history {
    ($ty:ident) => {
        impl<N: NativeHistory + 'static> History for $ty<N> {
            fn location(&self) -> Location {
                self.core.location()
            }

            fn action(&self) -> Action {
                self.core.action.get()
            }

            fn push(&self, to: &To, state: Option<Value>) {
                self.core.write(Action::Push, to, state)
            }

            fn replace(&self, to: &To, state: Option<Value>) {
                self.core.write(Action::Replace, to, state)
            }

            fn go(&self, delta: isize) {
                self.core.native.go(delta)
            }

            fn listen(&self, listener: Listener) -> ListenerId {
                self.core.listeners.add(listener)
            }

            fn unlisten(&self, id: ListenerId) {
                self.core.listeners.remove(id)
            }

            fn create_href(&self, to: &To) -> String {
                self.core.href(to)
            }

            fn encode_location(&self, to: &To) -> Path {
                encode_location(&create_path(&to.to_partial()))
            }

            fn can_go_back(&self) -> bool {
                self.core.index.get() > 0
            }
        }
    };
}

impl_url_history!(BrowserHistory);
impl_url_history!(HashHistory);
