//! Saturated P-automaton
//!
//! Unweighted automaton over stack symbols, with the two behaviors post*
//! saturation relies on:
//! - epsilon transitions: `(p, eps, q)` makes every present and future
//!   outgoing transition of `q` available from `p`;
//! - transition listeners: per-state in/out listeners and whole-automaton
//!   listeners with replay-then-live delivery.
//!
//! Insertion is idempotent. Derived work is driven by an internal queue so
//! listener callbacks always run with the automaton lock released and
//! insertion never recurses.

use super::states::StackSymbol;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

/// One automaton transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition<L, S> {
    pub source: S,
    pub label: L,
    pub target: S,
}

pub type TransitionListener<L, S> = Arc<dyn Fn(&Transition<L, S>) + Send + Sync>;

/// State requirements.
pub trait AutomatonState: Clone + Eq + Hash + Send + Sync + 'static {}

impl<S: Clone + Eq + Hash + Send + Sync + 'static> AutomatonState for S {}

struct AutomatonInner<L, S> {
    /// All inserted transitions, including not-yet-processed ones (dedup).
    transitions: FxHashSet<Transition<L, S>>,
    /// Processed adjacency; listeners replay from these.
    outgoing: FxHashMap<S, Vec<Transition<L, S>>>,
    incoming: FxHashMap<S, Vec<Transition<L, S>>>,
    /// States with an epsilon transition into the key state.
    eps_predecessors: FxHashMap<S, Vec<S>>,
    in_listeners: FxHashMap<S, Vec<TransitionListener<L, S>>>,
    out_listeners: FxHashMap<S, Vec<TransitionListener<L, S>>>,
    any_listeners: Vec<TransitionListener<L, S>>,
    pending: VecDeque<Transition<L, S>>,
    draining: bool,
}

/// An incrementally saturated automaton.
pub struct PAutomaton<L, S> {
    inner: Mutex<AutomatonInner<L, S>>,
}

impl<L: StackSymbol, S: AutomatonState> Default for PAutomaton<L, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: StackSymbol, S: AutomatonState> PAutomaton<L, S> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AutomatonInner {
                transitions: FxHashSet::default(),
                outgoing: FxHashMap::default(),
                incoming: FxHashMap::default(),
                eps_predecessors: FxHashMap::default(),
                in_listeners: FxHashMap::default(),
                out_listeners: FxHashMap::default(),
                any_listeners: Vec::new(),
                pending: VecDeque::new(),
                draining: false,
            }),
        }
    }

    /// Insert a transition; returns whether it was new. Epsilon closure and
    /// listener notification happen before the outermost insertion returns.
    pub fn add_transition(&self, transition: Transition<L, S>) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.transitions.insert(transition.clone()) {
                return false;
            }
            if transition.label.is_epsilon() {
                inner
                    .eps_predecessors
                    .entry(transition.target.clone())
                    .or_default()
                    .push(transition.source.clone());
            }
            inner.pending.push_back(transition);
            if inner.draining {
                return true;
            }
            inner.draining = true;
        }
        self.drain();
        true
    }

    fn drain(&self) {
        loop {
            let transition = {
                let mut inner = self.inner.lock();
                match inner.pending.pop_front() {
                    Some(t) => t,
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            let (derived, listeners) = {
                let mut inner = self.inner.lock();
                inner
                    .outgoing
                    .entry(transition.source.clone())
                    .or_default()
                    .push(transition.clone());
                inner
                    .incoming
                    .entry(transition.target.clone())
                    .or_default()
                    .push(transition.clone());

                let mut derived = Vec::new();
                if transition.label.is_epsilon() {
                    // Everything reachable from the target is reachable
                    // from the source without input.
                    if let Some(outs) = inner.outgoing.get(&transition.target) {
                        for t in outs {
                            derived.push(Transition {
                                source: transition.source.clone(),
                                label: t.label.clone(),
                                target: t.target.clone(),
                            });
                        }
                    }
                } else if let Some(eps_preds) = inner.eps_predecessors.get(&transition.source) {
                    for pred in eps_preds {
                        derived.push(Transition {
                            source: pred.clone(),
                            label: transition.label.clone(),
                            target: transition.target.clone(),
                        });
                    }
                }

                let mut listeners: Vec<TransitionListener<L, S>> = Vec::new();
                if let Some(ls) = inner.out_listeners.get(&transition.source) {
                    listeners.extend(ls.iter().cloned());
                }
                if let Some(ls) = inner.in_listeners.get(&transition.target) {
                    listeners.extend(ls.iter().cloned());
                }
                listeners.extend(inner.any_listeners.iter().cloned());
                (derived, listeners)
            };
            for t in derived {
                // Queued behind the current drain; never recurses.
                self.add_transition(t);
            }
            for listener in listeners {
                listener(&transition);
            }
        }
    }

    /// Listen for transitions into `state`. Already-processed transitions
    /// are replayed immediately.
    pub fn on_in_transition(&self, state: S, listener: TransitionListener<L, S>) {
        let replay = {
            let mut inner = self.inner.lock();
            let replay = inner.incoming.get(&state).cloned().unwrap_or_default();
            inner.in_listeners.entry(state).or_default().push(listener.clone());
            replay
        };
        for transition in replay {
            listener(&transition);
        }
    }

    /// Listen for transitions out of `state`, replay-then-live.
    pub fn on_out_transition(&self, state: S, listener: TransitionListener<L, S>) {
        let replay = {
            let mut inner = self.inner.lock();
            let replay = inner.outgoing.get(&state).cloned().unwrap_or_default();
            inner.out_listeners.entry(state).or_default().push(listener.clone());
            replay
        };
        for transition in replay {
            listener(&transition);
        }
    }

    /// Listen for every transition, replay-then-live.
    pub fn on_any_transition(&self, listener: TransitionListener<L, S>) {
        let replay = {
            let mut inner = self.inner.lock();
            inner.any_listeners.push(listener.clone());
            let mut all: Vec<Transition<L, S>> = Vec::new();
            for ts in inner.outgoing.values() {
                all.extend(ts.iter().cloned());
            }
            all
        };
        for transition in replay {
            listener(&transition);
        }
    }

    /// Processed outgoing transitions of a state.
    pub fn outgoing_of(&self, state: &S) -> Vec<Transition<L, S>> {
        self.inner.lock().outgoing.get(state).cloned().unwrap_or_default()
    }

    /// Processed incoming transitions of a state.
    pub fn incoming_of(&self, state: &S) -> Vec<Transition<L, S>> {
        self.inner.lock().incoming.get(state).cloned().unwrap_or_default()
    }

    pub fn transition_count(&self) -> usize {
        self.inner.lock().transitions.len()
    }
}

impl<L, S> std::fmt::Debug for PAutomaton<L, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PAutomaton").finish_non_exhaustive()
    }
}
