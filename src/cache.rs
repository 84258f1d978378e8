//! Cache store for delayed automata.
//!
//! A delayed view computes each state's expansion at most once per cache
//! lifetime and records it here. Entries fill monotonically: the start
//! state, then per-state final weights and arc lists, each field written
//! once. Under memory pressure the store evicts whole entries in
//! least-recently-accessed order; because expansion is a pure function of
//! the operands and tables, a re-expansion after eviction reproduces the
//! identical record.

use std::mem;
use std::path::PathBuf;
use std::rc::Rc;

use crate::arc::{Arc, StateId};
use crate::semiring::Semiring;

/// Cache configuration for a delayed view.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Enable eviction.
    pub gc: bool,
    /// Byte ceiling for cached arcs. `0` retains only the most recently
    /// expanded state.
    pub gc_limit: usize,
    /// On-disk spill path. Accepted but currently unused.
    pub file_list: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            gc: true,
            gc_limit: 1 << 20,
            file_list: None,
        }
    }
}

#[derive(Debug)]
struct CacheEntry<W> {
    final_weight: Option<W>,
    arcs: Option<Rc<Vec<Arc<W>>>>,
    access: u64,
}

impl<W> CacheEntry<W> {
    fn new() -> Self {
        Self {
            final_weight: None,
            arcs: None,
            access: 0,
        }
    }
}

/// Memoizes per-state expansions of a delayed automaton.
#[derive(Debug)]
pub struct CacheStore<W: Semiring> {
    entries: Vec<CacheEntry<W>>,
    // Outer option: has the start been computed at all.
    start: Option<Option<StateId>>,
    opts: CacheOptions,
    cache_size: usize,
    access_counter: u64,
}

impl<W: Semiring> CacheStore<W> {
    /// Creates an empty store with the given options.
    pub fn new(opts: CacheOptions) -> Self {
        Self {
            entries: Vec::new(),
            start: None,
            opts,
            cache_size: 0,
            access_counter: 0,
        }
    }

    fn entry_mut(&mut self, state: StateId) -> &mut CacheEntry<W> {
        if state >= self.entries.len() {
            self.entries.resize_with(state + 1, CacheEntry::new);
        }
        self.access_counter += 1;
        let access = self.access_counter;
        let entry = &mut self.entries[state];
        entry.access = access;
        entry
    }

    /// Whether the start state has been computed.
    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }

    /// Records the computed start state.
    pub fn set_start(&mut self, start: Option<StateId>) {
        self.start = Some(start);
    }

    /// The computed start state.
    ///
    /// # Panics
    ///
    /// Panics if the start has not been recorded.
    pub fn start(&self) -> Option<StateId> {
        self.start.expect("cache: start not computed")
    }

    /// Whether the final weight of `state` has been computed.
    pub fn has_final(&self, state: StateId) -> bool {
        self.entries
            .get(state)
            .is_some_and(|entry| entry.final_weight.is_some())
    }

    /// Records the final weight of `state`.
    pub fn set_final(&mut self, state: StateId, weight: W) {
        self.entry_mut(state).final_weight = Some(weight);
    }

    /// The cached final weight of `state`, if computed.
    pub fn final_weight(&mut self, state: StateId) -> Option<W> {
        if !self.has_final(state) {
            return None;
        }
        self.entry_mut(state).final_weight.clone()
    }

    /// Whether the arcs of `state` have been expanded.
    pub fn has_arcs(&self, state: StateId) -> bool {
        self.entries
            .get(state)
            .is_some_and(|entry| entry.arcs.is_some())
    }

    /// The cached arc list of `state`, if expanded.
    pub fn arcs(&mut self, state: StateId) -> Option<Rc<Vec<Arc<W>>>> {
        if !self.has_arcs(state) {
            return None;
        }
        self.entry_mut(state).arcs.clone()
    }

    /// Commits a completed expansion of `state` and returns the shared
    /// list. Runs eviction if the configured ceiling is now exceeded.
    ///
    /// # Panics
    ///
    /// Panics if `state` is already expanded: an expanded arc list is
    /// immutable for the lifetime of its entry.
    pub fn set_arcs(&mut self, state: StateId, arcs: Vec<Arc<W>>) -> Rc<Vec<Arc<W>>> {
        let bytes = arc_bytes::<W>(arcs.len());
        let shared = Rc::new(arcs);
        let entry = self.entry_mut(state);
        assert!(entry.arcs.is_none(), "cache: state {state} expanded twice");
        entry.arcs = Some(Rc::clone(&shared));
        self.cache_size += bytes;
        if self.opts.gc && self.cache_size > self.opts.gc_limit {
            self.evict(state);
        }
        shared
    }

    /// Bytes of arc storage currently cached.
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Number of states with a cached arc list.
    pub fn num_expanded(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.arcs.is_some())
            .count()
    }

    // Evicts expanded entries in least-recently-accessed order until the
    // byte count is back under the ceiling. The state whose expansion just
    // completed and any entry whose arc list is still referenced outside
    // the cache (a live snapshot pins it) are skipped.
    fn evict(&mut self, current: StateId) {
        let mut victims: Vec<(u64, StateId)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(state, entry)| {
                let arcs = entry.arcs.as_ref()?;
                if state == current || Rc::strong_count(arcs) > 1 {
                    None
                } else {
                    Some((entry.access, state))
                }
            })
            .collect();
        victims.sort_unstable();
        for (_, state) in victims {
            if self.cache_size <= self.opts.gc_limit {
                break;
            }
            let entry = &mut self.entries[state];
            if let Some(arcs) = entry.arcs.take() {
                self.cache_size -= arc_bytes::<W>(arcs.len());
            }
            entry.final_weight = None;
        }
    }
}

#[inline]
fn arc_bytes<W>(count: usize) -> usize {
    count * mem::size_of::<Arc<W>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semiring::TropicalWeight;

    fn arcs(n: usize) -> Vec<Arc<TropicalWeight>> {
        (0..n)
            .map(|i| Arc::new(i, i, TropicalWeight::one(), 0))
            .collect()
    }

    #[test]
    fn test_start_slot() {
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions::default());
        assert!(!cache.has_start());
        cache.set_start(Some(3));
        assert!(cache.has_start());
        assert_eq!(cache.start(), Some(3));
    }

    #[test]
    fn test_monotonic_fill() {
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions::default());
        assert!(!cache.has_final(0));
        cache.set_final(0, TropicalWeight::new(1.0));
        assert!(cache.has_final(0));
        assert!(!cache.has_arcs(0));
        cache.set_arcs(0, arcs(2));
        assert_eq!(cache.arcs(0).unwrap().len(), 2);
        assert_eq!(cache.final_weight(0), Some(TropicalWeight::new(1.0)));
    }

    #[test]
    #[should_panic(expected = "expanded twice")]
    fn test_double_expansion_rejected() {
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions::default());
        cache.set_arcs(0, arcs(1));
        cache.set_arcs(0, arcs(1));
    }

    #[test]
    fn test_no_eviction_when_gc_disabled() {
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions {
            gc: false,
            gc_limit: 0,
            ..Default::default()
        });
        for state in 0..10 {
            cache.set_arcs(state, arcs(4));
        }
        assert_eq!(cache.num_expanded(), 10);
    }

    #[test]
    fn test_gc_limit_zero_retains_last_expansion() {
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions {
            gc: true,
            gc_limit: 0,
            ..Default::default()
        });
        for state in 0..10 {
            cache.set_arcs(state, arcs(4));
        }
        assert_eq!(cache.num_expanded(), 1);
        assert!(cache.has_arcs(9));
        assert!(!cache.has_arcs(0));
    }

    #[test]
    fn test_lru_order() {
        let per_state = arc_bytes::<TropicalWeight>(4);
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions {
            gc: true,
            gc_limit: 3 * per_state,
            ..Default::default()
        });
        cache.set_arcs(0, arcs(4));
        cache.set_arcs(1, arcs(4));
        cache.set_arcs(2, arcs(4));
        // Touch state 0 so state 1 becomes the least recently used.
        let _ = cache.arcs(0);
        cache.set_arcs(3, arcs(4));
        assert!(cache.has_arcs(0));
        assert!(!cache.has_arcs(1));
        assert!(cache.has_arcs(2));
        assert!(cache.has_arcs(3));
    }

    #[test]
    fn test_pinned_entries_survive() {
        let mut cache = CacheStore::<TropicalWeight>::new(CacheOptions {
            gc: true,
            gc_limit: 0,
            ..Default::default()
        });
        let pinned = cache.set_arcs(0, arcs(4));
        cache.set_arcs(1, arcs(4));
        cache.set_arcs(2, arcs(4));
        // State 0 is pinned by the outstanding snapshot, state 2 is the
        // current expansion; state 1 is evicted.
        assert!(cache.has_arcs(0));
        assert!(!cache.has_arcs(1));
        assert!(cache.has_arcs(2));
        drop(pinned);
        cache.set_arcs(3, arcs(4));
        assert!(!cache.has_arcs(0));
    }
}
