//! Interning of composition state tuples.

use rustc_hash::FxHashMap;

use crate::arc::StateId;
use crate::compose::filter::FilterState;

/// A composition state: one state from each operand plus the filter state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateTuple {
    /// State in operand 1.
    pub state1: StateId,
    /// State in operand 2.
    pub state2: StateId,
    /// Filter state carried by this composition state.
    pub filter_state: FilterState,
}

impl StateTuple {
    /// Creates a tuple.
    pub fn new(state1: StateId, state2: StateId, filter_state: FilterState) -> Self {
        Self {
            state1,
            state2,
            filter_state,
        }
    }
}

/// Default ceiling on interned tuples.
pub const DEFAULT_STATE_TABLE_LIMIT: usize = (1 << 31) - 1;

/// Interns composition tuples to dense state ids.
///
/// Ids are issued in insertion order starting at 0 and are stable for the
/// table's lifetime. Exceeding the configured ceiling sets a sticky error
/// bit; interning continues to function so callers can observe the error
/// lazily.
#[derive(Debug)]
pub struct ComposeStateTable {
    tuples: Vec<StateTuple>,
    ids: FxHashMap<StateTuple, StateId>,
    limit: usize,
    error: bool,
}

impl ComposeStateTable {
    /// Creates a table with the default ceiling.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_STATE_TABLE_LIMIT)
    }

    /// Creates a table that errors once more than `limit` tuples exist.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            tuples: Vec::new(),
            ids: FxHashMap::default(),
            limit,
            error: false,
        }
    }

    /// The id for `tuple`, interning it if new.
    pub fn find_or_insert(&mut self, tuple: StateTuple) -> StateId {
        if let Some(&id) = self.ids.get(&tuple) {
            return id;
        }
        if self.tuples.len() >= self.limit {
            self.error = true;
        }
        let id = self.tuples.len();
        self.tuples.push(tuple.clone());
        self.ids.insert(tuple, id);
        id
    }

    /// The tuple interned under `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never issued.
    pub fn tuple(&self, id: StateId) -> &StateTuple {
        &self.tuples[id]
    }

    /// Number of interned tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Sticky error bit: set once the ceiling has been exceeded.
    pub fn error(&self) -> bool {
        self.error
    }
}

impl Default for ComposeStateTable {
    fn default() -> Self {
        Self::new()
    }
}
