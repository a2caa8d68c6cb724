use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    create_location, create_path, Action, History, HistoryUpdate, Listener, ListenerId,
    Listeners, Location, To, DEFAULT_KEY,
};

/// How a [`MemoryHistory`] starts out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryHistoryOptions {
    /// The initial stack. An empty list means a single entry at `/`.
    pub initial_entries: Vec<String>,
    /// The index of the current entry. Defaults to the last entry; out of range values are clamped.
    pub initial_index: Option<usize>,
}

struct MemoryHistoryState {
    entries: Vec<Location>,
    index: usize,
    action: Action,
}

/// A [`History`] that stores all entries in memory.
///
/// Useful outside the browser and in tests.
pub struct MemoryHistory {
    state: RefCell<MemoryHistoryState>,
    listeners: Listeners,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(MemoryHistoryOptions::default())
    }
}

impl MemoryHistory {
    /// Create a [`MemoryHistory`] from its initial entries.
    ///
    /// ```rust
    /// # use waymark_history::{History, MemoryHistory, MemoryHistoryOptions};
    /// let history = MemoryHistory::new(MemoryHistoryOptions {
    ///     initial_entries: vec!["/".into(), "/about".into()],
    ///     initial_index: Some(0),
    /// });
    /// assert_eq!(history.location().pathname, "/");
    /// assert_eq!(history.location().key, "default");
    /// assert!(history.can_go_forward());
    /// ```
    pub fn new(options: MemoryHistoryOptions) -> Self {
        let mut paths = options.initial_entries;
        if paths.is_empty() {
            paths.push(String::from("/"));
        }

        let entries: Vec<Location> = paths
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let key = (idx == 0).then(|| String::from(DEFAULT_KEY));
                create_location("/", &To::from(path), None, key)
            })
            .collect();

        let last = entries.len() - 1;
        let index = options.initial_index.unwrap_or(last).min(last);

        Self {
            state: RefCell::new(MemoryHistoryState {
                entries,
                index,
                action: Action::Pop,
            }),
            listeners: Listeners::default(),
        }
    }

    /// Create a [`MemoryHistory`] with a single entry at `path`.
    pub fn with_initial_path(path: impl ToString) -> Self {
        Self::new(MemoryHistoryOptions {
            initial_entries: vec![path.to_string()],
            initial_index: None,
        })
    }

    /// The index of the current entry.
    pub fn index(&self) -> usize {
        self.state.borrow().index
    }

    /// The number of entries in the stack.
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    /// A memory history always holds at least one entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// A copy of every entry in the stack.
    pub fn entries(&self) -> Vec<Location> {
        self.state.borrow().entries.clone()
    }

    fn notify(&self, action: Action, delta: Option<isize>) {
        let location = self.location();
        self.listeners.notify(&HistoryUpdate {
            action,
            location,
            delta,
        });
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let state = self.state.borrow();
        state.entries[state.index].clone()
    }

    fn action(&self) -> Action {
        self.state.borrow().action
    }

    fn push(&self, to: &To, state: Option<Value>) {
        {
            let mut write = self.state.borrow_mut();
            let current = write.entries[write.index].pathname.clone();
            let next = create_location(&current, to, state, None);
            let index = write.index + 1;
            write.entries.truncate(index);
            write.entries.push(next);
            write.index = index;
            write.action = Action::Push;
        }
        self.notify(Action::Push, None);
    }

    fn replace(&self, to: &To, state: Option<Value>) {
        {
            let mut write = self.state.borrow_mut();
            let index = write.index;
            let current = write.entries[index].pathname.clone();
            write.entries[index] = create_location(&current, to, state, None);
            write.action = Action::Replace;
        }
        self.notify(Action::Replace, None);
    }

    fn go(&self, delta: isize) {
        let moved = {
            let mut write = self.state.borrow_mut();
            let last = write.entries.len() as isize - 1;
            let target = (write.index as isize).saturating_add(delta).clamp(0, last) as usize;
            if target == write.index {
                None
            } else {
                let moved = target as isize - write.index as isize;
                write.index = target;
                write.action = Action::Pop;
                Some(moved)
            }
        };

        match moved {
            Some(moved) => self.notify(Action::Pop, Some(moved)),
            None => tracing::trace!("go({delta}) left the memory history where it was"),
        }
    }

    fn listen(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.remove(id)
    }

    fn create_href(&self, to: &To) -> String {
        match to {
            To::Str(s) => s.clone(),
            other => create_path(&other.to_partial()),
        }
    }

    fn can_go_back(&self) -> bool {
        self.state.borrow().index > 0
    }

    fn can_go_forward(&self) -> bool {
        let state = self.state.borrow();
        state.index + 1 < state.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use pretty_assertions::assert_eq;

    fn history(entries: &[&str], index: Option<usize>) -> MemoryHistory {
        MemoryHistory::new(MemoryHistoryOptions {
            initial_entries: entries.iter().map(|s| s.to_string()).collect(),
            initial_index: index,
        })
    }

    fn record(history: &MemoryHistory) -> Rc<RefCell<Vec<(Action, String, Option<isize>)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        history.listen(Rc::new(move |update: &HistoryUpdate| {
            sink.borrow_mut().push((
                update.action,
                update.location.pathname.clone(),
                update.delta,
            ))
        }));
        log
    }

    #[test]
    fn initial_index_defaults_to_last() {
        let h = history(&["/a", "/b", "/c"], None);
        assert_eq!(h.index(), 2);
        assert_eq!(h.location().pathname, "/c");
        assert_eq!(h.action(), Action::Pop);
    }

    #[test]
    fn initial_index_is_clamped() {
        let h = history(&["/a", "/b"], Some(9));
        assert_eq!(h.index(), 1);
    }

    #[test]
    fn first_entry_has_default_key() {
        let h = history(&["/a?x=1#y", "/b"], Some(0));
        let loc = h.location();
        assert_eq!(loc.key, DEFAULT_KEY);
        assert_eq!(loc.search, "?x=1");
        assert_eq!(loc.hash, "#y");
        assert_ne!(h.entries()[1].key, DEFAULT_KEY);
    }

    #[test]
    fn push_truncates_forward_entries() {
        let h = history(&["/a", "/b", "/c"], Some(0));
        let log = record(&h);
        h.push(&"/d".into(), None);

        let paths: Vec<_> = h.entries().into_iter().map(|l| l.pathname).collect();
        assert_eq!(paths, vec!["/a", "/d"]);
        assert_eq!(h.index(), 1);
        assert!(!h.can_go_forward());
        assert_eq!(*log.borrow(), vec![(Action::Push, "/d".to_string(), None)]);
    }

    #[test]
    fn relative_push_resolves_against_current() {
        let h = history(&["/a"], None);
        h.push(&"?q=1".into(), Some(serde_json::json!({ "from": "a" })));
        let loc = h.location();
        assert_eq!(loc.pathname, "/a");
        assert_eq!(loc.search, "?q=1");
        assert_eq!(loc.state, Some(serde_json::json!({ "from": "a" })));
    }

    #[test]
    fn replace_keeps_length() {
        let h = history(&["/a", "/b"], None);
        let log = record(&h);
        let before = h.location().key;
        h.replace(&"/c".into(), None);

        assert_eq!(h.len(), 2);
        assert_eq!(h.location().pathname, "/c");
        assert_ne!(h.location().key, before);
        assert_eq!(h.action(), Action::Replace);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn go_clamps_and_skips_noops() {
        let h = history(&["/a", "/b", "/c"], Some(1));
        let log = record(&h);

        h.go(-5);
        assert_eq!(h.index(), 0);
        h.go(-1);
        assert_eq!(h.index(), 0);
        h.go(10);
        assert_eq!(h.index(), 2);
        h.go(0);

        assert_eq!(
            *log.borrow(),
            vec![
                (Action::Pop, "/a".to_string(), Some(-1)),
                (Action::Pop, "/c".to_string(), Some(2)),
            ]
        );
    }

    #[test]
    fn extreme_deltas_saturate() {
        let h = history(&["/a", "/b", "/c"], Some(1));
        h.go(isize::MAX);
        assert_eq!(h.index(), 2);
        h.go(isize::MIN);
        assert_eq!(h.index(), 0);
        h.go(isize::MAX);
        assert_eq!(h.location().pathname, "/c");
    }

    #[test]
    fn back_then_forward_restores_keys() {
        let h = MemoryHistory::default();
        h.push(&"/a".into(), None);
        let a = h.location();
        h.push(&"/b".into(), None);
        let b = h.location();
        assert_ne!(a.key, b.key);
        assert_ne!(a.key, DEFAULT_KEY);
        assert_ne!(b.key, DEFAULT_KEY);

        h.go(-1);
        assert_eq!(h.location(), a);
        assert_eq!(h.location().pathname, "/a");
        assert_ne!(h.location().key, b.key);
        assert!(h.can_go_back());
        h.go(1);
        assert_eq!(h.location(), b);
    }

    #[test]
    fn unlisten_stops_notifications() {
        let h = MemoryHistory::default();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let id = h.listen(Rc::new(move |_: &HistoryUpdate| *counter.borrow_mut() += 1));
        h.push(&"/a".into(), None);
        h.unlisten(id);
        h.push(&"/b".into(), None);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn hrefs() {
        let h = MemoryHistory::default();
        assert_eq!(h.create_href(&"/a?b".into()), "/a?b");
        assert_eq!(
            h.create_href(&To::Path(crate::PartialPath::pathname("/x").with_hash("y"))),
            "/x#y"
        );
        assert_eq!(h.encode_location(&"/a b".into()).pathname, "/a%20b");
    }
}
