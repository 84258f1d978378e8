//! Label matchers.
//!
//! A matcher binds to one automaton and one match side (input or output
//! labels) and enumerates, for a requested label, the arcs of the current
//! state carrying it. Every matcher also synthesizes the implicit
//! non-consuming self-loop: `find(0)` yields the loop `⟨0, 0, one, s⟩`
//! first, then any real epsilon arcs, while `find(NO_LABEL)` yields only
//! the real epsilon arcs. This is the mechanism by which epsilon moves on
//! one composition operand pair with moves on the other.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::arc::{Arc, Label, StateId, EPSILON, NO_LABEL, NO_STATE};
use crate::fst::{Arcs, Fst};
use crate::properties::{
    I_LABEL_SORTED, NOT_I_LABEL_SORTED, NOT_O_LABEL_SORTED, O_LABEL_SORTED,
};
use crate::semiring::Semiring;

/// Which side of an automaton a matcher operates on, or the aggregate
/// capabilities the composition engine derives from its two matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Matches on input labels.
    Input,
    /// Matches on output labels.
    Output,
    /// Both sides can match (engine-level aggregate).
    Both,
    /// No matching possible.
    None,
    /// Capability not yet established.
    Unknown,
}

/// Capability flag: the matcher yields arcs only for labels explicitly
/// requested through `find`; the composition engine must make this
/// matcher the match side.
pub const REQUIRE_MATCH: u32 = 1 << 0;

/// Priority value demanding that this side perform the matching.
pub const REQUIRE_PRIORITY: isize = -1;

/// Per-state label matcher over one automaton.
///
/// The trait is object safe; the composition engine stores its matchers
/// as `Box<dyn Matcher<W>>` and hands them snapshots to search, so
/// dispatch costs fall on state changes rather than on the inner
/// enumeration loop.
pub trait Matcher<W: Semiring> {
    /// The side this matcher matches on. With `test` set, the matcher may
    /// probe the automaton's properties to settle an `Unknown` answer.
    fn match_type(&self, test: bool) -> MatchType;

    /// Positions the matcher on `state`.
    fn set_state(&mut self, state: StateId);

    /// Begins enumeration of arcs matching `label` at the current state;
    /// returns whether any match exists.
    fn find(&mut self, label: Label) -> bool;

    /// Whether enumeration is exhausted.
    fn done(&self) -> bool;

    /// The current matched arc.
    ///
    /// # Panics
    ///
    /// May panic if the enumeration is done.
    fn value(&self) -> &Arc<W>;

    /// Advances the enumeration.
    fn next(&mut self);

    /// Hint used by composition to pick which side drives iteration;
    /// smaller is cheaper, [`REQUIRE_PRIORITY`] demands the match side.
    fn priority(&self, state: StateId) -> isize;

    /// Static capability bits ([`REQUIRE_MATCH`]).
    fn flags(&self) -> u32 {
        0
    }

    /// Properties this matcher guarantees on top of the automaton's own.
    fn properties(&self, inprops: u64) -> u64 {
        inprops
    }

    /// Whether the matcher has entered an error state.
    fn error(&self) -> bool {
        false
    }
}

fn side_label<W: Semiring>(arc: &Arc<W>, side: MatchType) -> Label {
    match side {
        MatchType::Input => arc.ilabel,
        _ => arc.olabel,
    }
}

fn loop_arc<W: Semiring>(side: MatchType) -> Arc<W> {
    match side {
        MatchType::Input => Arc::new(NO_LABEL, EPSILON, W::one(), NO_STATE),
        _ => Arc::new(EPSILON, NO_LABEL, W::one(), NO_STATE),
    }
}

/// Matcher over arc-sorted automata, using binary search.
///
/// Rejects automata lacking the relevant sort property: `match_type`
/// reports `None` when the property is known false and `Unknown` when it
/// has not been established (pass `test` to force the check).
pub struct SortedMatcher<W: Semiring> {
    fst: Rc<dyn Fst<W>>,
    side: MatchType,
    state: StateId,
    arcs: Arcs<W>,
    pos: usize,
    end: usize,
    current_loop: bool,
    loop_arc: Arc<W>,
}

impl<W: Semiring> SortedMatcher<W> {
    /// Creates a matcher over `fst` matching on `side`.
    ///
    /// # Panics
    ///
    /// Panics unless `side` is `Input` or `Output`.
    pub fn new(fst: Rc<dyn Fst<W>>, side: MatchType) -> Self {
        assert!(
            matches!(side, MatchType::Input | MatchType::Output),
            "SortedMatcher: match side must be Input or Output"
        );
        Self {
            fst,
            side,
            state: NO_STATE,
            arcs: Arcs::empty(),
            pos: 0,
            end: 0,
            current_loop: false,
            loop_arc: loop_arc(side),
        }
    }
}

impl<W: Semiring> Matcher<W> for SortedMatcher<W> {
    fn match_type(&self, test: bool) -> MatchType {
        let (sorted, unsorted) = match self.side {
            MatchType::Input => (I_LABEL_SORTED, NOT_I_LABEL_SORTED),
            _ => (O_LABEL_SORTED, NOT_O_LABEL_SORTED),
        };
        let props = self.fst.properties(sorted | unsorted, test);
        if props & sorted != 0 {
            self.side
        } else if props & unsorted != 0 {
            MatchType::None
        } else {
            MatchType::Unknown
        }
    }

    fn set_state(&mut self, state: StateId) {
        if state == self.state {
            return;
        }
        self.state = state;
        self.arcs = self.fst.arcs(state);
        self.loop_arc.nextstate = state;
        self.pos = 0;
        self.end = 0;
        self.current_loop = false;
    }

    fn find(&mut self, label: Label) -> bool {
        self.current_loop = label == EPSILON;
        let match_label = if label == NO_LABEL { EPSILON } else { label };
        let slice = self.arcs.as_slice();
        let side = self.side;
        self.pos = slice.partition_point(|arc| side_label(arc, side) < match_label);
        self.end = slice.partition_point(|arc| side_label(arc, side) <= match_label);
        self.current_loop || self.pos < self.end
    }

    fn done(&self) -> bool {
        !self.current_loop && self.pos >= self.end
    }

    fn value(&self) -> &Arc<W> {
        if self.current_loop {
            &self.loop_arc
        } else {
            self.arcs.get(self.pos).expect("SortedMatcher: done")
        }
    }

    fn next(&mut self) {
        if self.current_loop {
            self.current_loop = false;
        } else {
            self.pos += 1;
        }
    }

    fn priority(&self, state: StateId) -> isize {
        self.fst.num_arcs(state) as isize
    }
}

type LabelIndex = FxHashMap<Label, SmallVec<[u32; 4]>>;

/// Matcher for unsorted automata, backed by a lazily built per-state
/// label → arc-position index.
///
/// Indexes are built on first visit to a state and retained for the
/// matcher's lifetime, so revisits are O(1) per lookup.
pub struct HashMatcher<W: Semiring> {
    fst: Rc<dyn Fst<W>>,
    side: MatchType,
    state: StateId,
    arcs: Arcs<W>,
    index: FxHashMap<StateId, Rc<LabelIndex>>,
    current_index: Rc<LabelIndex>,
    positions: SmallVec<[u32; 4]>,
    pos: usize,
    current_loop: bool,
    loop_arc: Arc<W>,
}

impl<W: Semiring> HashMatcher<W> {
    /// Creates a matcher over `fst` matching on `side`.
    ///
    /// # Panics
    ///
    /// Panics unless `side` is `Input` or `Output`.
    pub fn new(fst: Rc<dyn Fst<W>>, side: MatchType) -> Self {
        assert!(
            matches!(side, MatchType::Input | MatchType::Output),
            "HashMatcher: match side must be Input or Output"
        );
        Self {
            fst,
            side,
            state: NO_STATE,
            arcs: Arcs::empty(),
            index: FxHashMap::default(),
            current_index: Rc::new(LabelIndex::default()),
            positions: SmallVec::new(),
            pos: 0,
            current_loop: false,
            loop_arc: loop_arc(side),
        }
    }
}

impl<W: Semiring> Matcher<W> for HashMatcher<W> {
    fn match_type(&self, _test: bool) -> MatchType {
        self.side
    }

    fn set_state(&mut self, state: StateId) {
        if state == self.state {
            return;
        }
        self.state = state;
        self.arcs = self.fst.arcs(state);
        self.loop_arc.nextstate = state;
        self.positions.clear();
        self.pos = 0;
        self.current_loop = false;
        if let Some(index) = self.index.get(&state) {
            self.current_index = Rc::clone(index);
            return;
        }
        let mut index = LabelIndex::default();
        for (position, arc) in self.arcs.as_slice().iter().enumerate() {
            index
                .entry(side_label(arc, self.side))
                .or_default()
                .push(position as u32);
        }
        let index = Rc::new(index);
        self.index.insert(state, Rc::clone(&index));
        self.current_index = index;
    }

    fn find(&mut self, label: Label) -> bool {
        self.current_loop = label == EPSILON;
        let match_label = if label == NO_LABEL { EPSILON } else { label };
        self.positions = self
            .current_index
            .get(&match_label)
            .cloned()
            .unwrap_or_default();
        self.pos = 0;
        self.current_loop || !self.positions.is_empty()
    }

    fn done(&self) -> bool {
        !self.current_loop && self.pos >= self.positions.len()
    }

    fn value(&self) -> &Arc<W> {
        if self.current_loop {
            &self.loop_arc
        } else {
            let position = self.positions[self.pos] as usize;
            self.arcs.get(position).expect("HashMatcher: done")
        }
    }

    fn next(&mut self) {
        if self.current_loop {
            self.current_loop = false;
        } else {
            self.pos += 1;
        }
    }

    fn priority(&self, state: StateId) -> isize {
        self.fst.num_arcs(state) as isize
    }
}

/// Picks the cheapest capable matcher for `fst` on `side`: the sorted
/// matcher when the relevant sort property is known to hold, the lookup
/// matcher otherwise.
pub fn default_matcher<W: Semiring>(fst: Rc<dyn Fst<W>>, side: MatchType) -> Box<dyn Matcher<W>> {
    let sorted = match side {
        MatchType::Input => I_LABEL_SORTED,
        _ => O_LABEL_SORTED,
    };
    if fst.properties(sorted, true) & sorted != 0 {
        Box::new(SortedMatcher::new(fst, side))
    } else {
        Box::new(HashMatcher::new(fst, side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{arc_sort, ArcSortType};
    use crate::fst::MutableFst;
    use crate::semiring::TropicalWeight;
    use crate::vector_fst::VectorFst;

    fn fixture() -> VectorFst<TropicalWeight> {
        let mut fst = VectorFst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(1, 5, TropicalWeight::one(), s1));
        fst.add_arc(s0, Arc::new(2, 4, TropicalWeight::new(0.5), s1));
        fst.add_arc(s0, Arc::new(2, 3, TropicalWeight::one(), s0));
        fst.add_arc(s0, Arc::new(4, 2, TropicalWeight::one(), s1));
        fst.add_arc(s0, Arc::new(0, 1, TropicalWeight::one(), s1));
        fst
    }

    fn collect_labels<W: Semiring>(matcher: &mut dyn Matcher<W>, label: Label) -> Vec<Label> {
        let mut labels = Vec::new();
        if matcher.find(label) {
            while !matcher.done() {
                labels.push(matcher.value().ilabel);
                matcher.next();
            }
        }
        labels
    }

    #[test]
    fn test_sorted_matcher_finds_range() {
        let mut fst = fixture();
        arc_sort(&mut fst, ArcSortType::ILabel);
        let mut matcher = SortedMatcher::new(
            Rc::new(fst) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        assert_eq!(matcher.match_type(false), MatchType::Input);
        matcher.set_state(0);

        assert_eq!(collect_labels(&mut matcher, 2), vec![2, 2]);
        assert_eq!(collect_labels(&mut matcher, 4), vec![4]);
        assert!(!matcher.find(9));
    }

    #[test]
    fn test_sorted_matcher_epsilon_loop_first() {
        let mut fst = fixture();
        arc_sort(&mut fst, ArcSortType::ILabel);
        let mut matcher = SortedMatcher::new(
            Rc::new(fst) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        matcher.set_state(0);

        // find(0) yields the synthetic loop first, then the real epsilon.
        assert!(matcher.find(EPSILON));
        assert_eq!(matcher.value().ilabel, NO_LABEL);
        assert_eq!(matcher.value().nextstate, 0);
        matcher.next();
        assert!(!matcher.done());
        assert_eq!(matcher.value().ilabel, EPSILON);
        assert_eq!(matcher.value().olabel, 1);
        matcher.next();
        assert!(matcher.done());

        // find(NO_LABEL) yields only the real epsilon.
        assert!(matcher.find(NO_LABEL));
        assert_eq!(matcher.value().ilabel, EPSILON);
        matcher.next();
        assert!(matcher.done());
    }

    #[test]
    fn test_sorted_matcher_rejects_unsorted() {
        let fst = fixture();
        let matcher = SortedMatcher::new(
            Rc::new(fst) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        assert_eq!(matcher.match_type(false), MatchType::Unknown);
        assert_eq!(matcher.match_type(true), MatchType::None);
    }

    #[test]
    fn test_hash_matcher_unsorted() {
        let fst = fixture();
        let mut matcher = HashMatcher::new(
            Rc::new(fst) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        assert_eq!(matcher.match_type(true), MatchType::Input);
        matcher.set_state(0);

        // Declared arc order is preserved within a label.
        assert!(matcher.find(2));
        assert_eq!(matcher.value().olabel, 4);
        matcher.next();
        assert_eq!(matcher.value().olabel, 3);
        matcher.next();
        assert!(matcher.done());
    }

    #[test]
    fn test_hash_matcher_output_side() {
        let fst = fixture();
        let mut matcher = HashMatcher::new(
            Rc::new(fst) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Output,
        );
        matcher.set_state(0);
        assert!(matcher.find(4));
        assert_eq!(matcher.value().ilabel, 2);
        matcher.next();
        assert!(matcher.done());
        assert!(!matcher.find(9));
    }

    #[test]
    fn test_priority_is_arity() {
        let fst = fixture();
        let matcher = HashMatcher::new(
            Rc::new(fst) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        assert_eq!(matcher.priority(0), 5);
        assert_eq!(matcher.priority(1), 0);
    }

    #[test]
    fn test_default_matcher_selection() {
        let mut sorted = fixture();
        arc_sort(&mut sorted, ArcSortType::ILabel);
        let chosen = default_matcher(
            Rc::new(sorted) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        assert_eq!(chosen.match_type(false), MatchType::Input);

        let unsorted = fixture();
        let chosen = default_matcher(
            Rc::new(unsorted) as Rc<dyn Fst<TropicalWeight>>,
            MatchType::Input,
        );
        // The lookup matcher is always capable on its side.
        assert_eq!(chosen.match_type(false), MatchType::Input);
    }
}
