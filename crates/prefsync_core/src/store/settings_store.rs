//! Observable in-memory preference replica.
//!
//! # Responsibility
//! - Hold the current `PreferenceSet` of one window.
//! - Notify observers synchronously after every effective mutation.
//! - Separate local mutations (`merge`) from inbound ones (`apply_remote`).
//!
//! # Invariants
//! - Observers run in registration order before the mutating call returns.
//! - One notification per effective call, however many fields changed.
//! - `apply_remote` never reaches local-change watchers.
//! - No internal borrow is held while observers run, so observers may read
//!   or mutate the store re-entrantly.

use crate::model::preferences::{PreferencePatch, PreferenceSet};
use std::cell::RefCell;
use std::rc::Rc;

/// Handle returned by observer registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Origin of one effective mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// UI or host code called `merge`.
    Local,
    /// A sibling window's state arrived via `apply_remote`.
    Remote,
}

type Observer = Rc<dyn Fn(&PreferenceSet)>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ObserverScope {
    AnyChange,
    LocalOnly,
}

struct ObserverEntry {
    id: ObserverId,
    scope: ObserverScope,
    handler: Observer,
}

struct StoreState {
    current: PreferenceSet,
    observers: Vec<ObserverEntry>,
    next_observer_id: u64,
}

/// Reactive preference container for one window process.
///
/// Cloning yields another handle to the same replica. The handle is `!Send`:
/// a replica lives on its window's single cooperative task queue.
#[derive(Clone)]
pub struct SettingsStore {
    state: Rc<RefCell<StoreState>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    /// Creates a replica holding `PreferenceSet::default()`.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StoreState {
                current: PreferenceSet::default(),
                observers: Vec::new(),
                next_observer_id: 1,
            })),
        }
    }

    /// Returns the current snapshot.
    pub fn get(&self) -> PreferenceSet {
        self.state.borrow().current
    }

    pub fn font_size(&self) -> i64 {
        self.get().font_size
    }

    pub fn word_wrap(&self) -> bool {
        self.get().word_wrap
    }

    /// Applies a local mutation.
    ///
    /// Notifies every observer (including local-change watchers) once when
    /// state changed. Returns whether state changed.
    pub fn merge(&self, patch: PreferencePatch) -> bool {
        self.apply(patch, ChangeOrigin::Local)
    }

    /// Applies state received from another window.
    ///
    /// Same merge semantics as [`SettingsStore::merge`], but local-change
    /// watchers are skipped so the change is never re-broadcast.
    pub fn apply_remote(&self, patch: PreferencePatch) -> bool {
        self.apply(patch, ChangeOrigin::Remote)
    }

    pub fn set_font_size(&self, font_size: i64) -> bool {
        self.merge(PreferencePatch::new().with_font_size(font_size))
    }

    pub fn set_word_wrap(&self, word_wrap: bool) -> bool {
        self.merge(PreferencePatch::new().with_word_wrap(word_wrap))
    }

    /// Registers an observer for every effective change, local or remote.
    pub fn on_change(&self, handler: impl Fn(&PreferenceSet) + 'static) -> ObserverId {
        self.register(ObserverScope::AnyChange, Rc::new(handler))
    }

    /// Registers an observer for local changes only.
    pub fn on_local_change(&self, handler: impl Fn(&PreferenceSet) + 'static) -> ObserverId {
        self.register(ObserverScope::LocalOnly, Rc::new(handler))
    }

    /// Deregisters one observer. Returns `false` for unknown ids.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.observers.len();
        state.observers.retain(|entry| entry.id != id);
        state.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    fn register(&self, scope: ObserverScope, handler: Observer) -> ObserverId {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_observer_id);
        state.next_observer_id += 1;
        state.observers.push(ObserverEntry { id, scope, handler });
        id
    }

    fn apply(&self, patch: PreferencePatch, origin: ChangeOrigin) -> bool {
        let (snapshot, handlers) = {
            let mut state = self.state.borrow_mut();
            if !state.current.apply(&patch) {
                return false;
            }
            let handlers = state
                .observers
                .iter()
                .filter(|entry| {
                    origin == ChangeOrigin::Local || entry.scope == ObserverScope::AnyChange
                })
                .map(|entry| Rc::clone(&entry.handler))
                .collect::<Vec<_>>();
            (state.current, handlers)
        };

        for handler in handlers {
            handler(&snapshot);
        }
        true
    }
}
