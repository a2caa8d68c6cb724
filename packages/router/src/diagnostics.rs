use std::cell::RefCell;

use rustc_hash::FxHashSet;
use tracing::warn;

/// De-duplicates the warnings a router emits.
///
/// Every router owns one, so tests can inspect and [`reset`](Diagnostics::reset) it without
/// touching other routers.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: RefCell<FxHashSet<String>>,
    emitted: RefCell<Vec<String>>,
}

impl Diagnostics {
    /// Create an empty set of diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `message` as a warning unless a warning with the same `key` was already emitted.
    ///
    /// Returns whether the warning was emitted.
    pub fn warn_once(&self, key: &str, message: impl AsRef<str>) -> bool {
        if !self.seen.borrow_mut().insert(key.to_string()) {
            return false;
        }
        let message = message.as_ref();
        warn!("{message}");
        self.emitted.borrow_mut().push(message.to_string());
        true
    }

    /// Every warning emitted since creation or the last [`reset`](Diagnostics::reset).
    pub fn emitted(&self) -> Vec<String> {
        self.emitted.borrow().clone()
    }

    /// Forget every emitted warning, so they may be emitted again.
    pub fn reset(&self) {
        self.seen.borrow_mut().clear();
        self.emitted.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_deduplicated_until_reset() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.warn_once("a", "first"));
        assert!(!diagnostics.warn_once("a", "again"));
        assert!(diagnostics.warn_once("b", "second"));
        assert_eq!(diagnostics.emitted(), vec!["first", "second"]);

        diagnostics.reset();
        assert!(diagnostics.emitted().is_empty());
        assert!(diagnostics.warn_once("a", "first"));
    }
}
