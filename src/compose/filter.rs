//! Composition filters.
//!
//! A filter is a small DFA consulted on every candidate arc pair during
//! expansion. Its job is epsilon ordering: when both operands can move on
//! epsilons, unrestricted pairing produces the same composite path several
//! times over, once per interleaving. The filter rejects all but one
//! interleaving and threads its own state through the composition tuple.
//!
//! During expansion the side that stays put is represented by a synthetic
//! arc carrying [`NO_LABEL`] on the composed label, so filters distinguish
//! "operand 1 idles" (`arc1.olabel == NO_LABEL`) from "operand 1 moves on
//! a real output epsilon" (`arc1.olabel == EPSILON`).

use std::rc::Rc;

use crate::arc::{Arc, StateId, EPSILON, NO_LABEL, NO_STATE};
use crate::fst::Fst;
use crate::matcher::MatchType;
use crate::semiring::Semiring;

/// State of a composition filter.
///
/// `NoState` is the rejection value returned by
/// [`ComposeFilter::filter_arc`]; it never appears inside an interned
/// composition tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterState {
    /// The candidate arc pair is forbidden.
    NoState,
    /// The single state of a stateless filter.
    Trivial,
    /// A small-integer filter state.
    Int(u8),
}

/// Which predefined composition filter to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    /// [`SequenceComposeFilter`] unless a lookahead matcher is in play
    /// (none exist in this core, so `Auto` always means sequence).
    #[default]
    Auto,
    /// [`NullComposeFilter`].
    Null,
    /// [`TrivialComposeFilter`].
    Trivial,
    /// [`SequenceComposeFilter`].
    Sequence,
    /// [`AltSequenceComposeFilter`].
    AltSequence,
    /// [`MatchComposeFilter`].
    Match,
}

/// Epsilon-ordering DFA consulted on every candidate arc pair.
pub trait ComposeFilter<W: Semiring> {
    /// The filter state carried by the composition start tuple.
    fn start(&self) -> FilterState;

    /// Positions the filter on a composition tuple before its pairs are
    /// submitted.
    fn set_state(&mut self, state1: StateId, state2: StateId, filter_state: FilterState);

    /// Judges an ordered pair of arcs; `arc1` is always the operand-1 arc.
    /// May rewrite the arcs' labels; returns the successor filter state or
    /// [`FilterState::NoState`] to reject the pair.
    fn filter_arc(&mut self, arc1: &mut Arc<W>, arc2: &mut Arc<W>) -> FilterState;

    /// May rewrite the operand final weights before they are multiplied.
    fn filter_final(&self, final1: &mut W, final2: &mut W);

    /// Property delta applied on top of the inferred composition
    /// properties.
    fn properties(&self, inprops: u64) -> u64 {
        inprops
    }

    /// Whether [`filter_arc`](ComposeFilter::filter_arc) may rewrite the
    /// label on the given side; gates the fast-path matcher over the
    /// composition.
    fn rewrites_labels(&self, match_type: MatchType) -> bool {
        let _ = match_type;
        false
    }
}

/// Accepts every pair. Admits redundant epsilon paths, so the composition
/// is correct only up to path multiplicity in non-idempotent semirings.
#[derive(Debug, Default)]
pub struct NullComposeFilter;

impl<W: Semiring> ComposeFilter<W> for NullComposeFilter {
    fn start(&self) -> FilterState {
        FilterState::Trivial
    }

    fn set_state(&mut self, _state1: StateId, _state2: StateId, _filter_state: FilterState) {}

    fn filter_arc(&mut self, _arc1: &mut Arc<W>, _arc2: &mut Arc<W>) -> FilterState {
        FilterState::Trivial
    }

    fn filter_final(&self, _final1: &mut W, _final2: &mut W) {}
}

/// Accepts a pair only when neither side carries the idle marker on the
/// composed label: epsilons pair only with real epsilon arcs on the other
/// side.
#[derive(Debug, Default)]
pub struct TrivialComposeFilter;

impl<W: Semiring> ComposeFilter<W> for TrivialComposeFilter {
    fn start(&self) -> FilterState {
        FilterState::Trivial
    }

    fn set_state(&mut self, _state1: StateId, _state2: StateId, _filter_state: FilterState) {}

    fn filter_arc(&mut self, arc1: &mut Arc<W>, arc2: &mut Arc<W>) -> FilterState {
        if arc1.olabel == NO_LABEL || arc2.ilabel == NO_LABEL {
            FilterState::NoState
        } else {
            FilterState::Trivial
        }
    }

    fn filter_final(&self, _final1: &mut W, _final2: &mut W) {}
}

/// Requires output epsilons of operand 1 to be consumed before input
/// epsilons of operand 2.
///
/// Filter state 0 permits either side's epsilons; once operand 2 consumes
/// an input epsilon while operand 1 still has output epsilons available,
/// state 1 forbids returning to operand 1's epsilons.
pub struct SequenceComposeFilter<W: Semiring> {
    fst1: Rc<dyn Fst<W>>,
    state1: StateId,
    state2: StateId,
    filter_state: FilterState,
    // All arcs at state1 are output epsilons and state1 is not final.
    all_eps1: bool,
    // No arc at state1 is an output epsilon.
    no_eps1: bool,
}

impl<W: Semiring> SequenceComposeFilter<W> {
    /// Creates the filter; it inspects operand 1 at each composition
    /// state.
    pub fn new(fst1: Rc<dyn Fst<W>>) -> Self {
        Self {
            fst1,
            state1: NO_STATE,
            state2: NO_STATE,
            filter_state: FilterState::NoState,
            all_eps1: false,
            no_eps1: true,
        }
    }
}

impl<W: Semiring> ComposeFilter<W> for SequenceComposeFilter<W> {
    fn start(&self) -> FilterState {
        FilterState::Int(0)
    }

    fn set_state(&mut self, state1: StateId, state2: StateId, filter_state: FilterState) {
        if self.state1 == state1 && self.state2 == state2 && self.filter_state == filter_state {
            return;
        }
        self.state1 = state1;
        self.state2 = state2;
        self.filter_state = filter_state;
        let num_arcs = self.fst1.num_arcs(state1);
        let num_eps = self.fst1.num_output_epsilons(state1);
        let is_final = !self.fst1.final_weight(state1).is_zero();
        self.all_eps1 = num_arcs == num_eps && !is_final;
        self.no_eps1 = num_eps == 0;
    }

    fn filter_arc(&mut self, arc1: &mut Arc<W>, arc2: &mut Arc<W>) -> FilterState {
        if arc1.olabel == NO_LABEL {
            // Operand 1 idles while operand 2 consumes an input epsilon.
            if self.all_eps1 {
                FilterState::NoState
            } else if self.no_eps1 {
                FilterState::Int(0)
            } else {
                FilterState::Int(1)
            }
        } else if arc2.ilabel == NO_LABEL {
            // Operand 1 consumes an output epsilon while operand 2 idles.
            if self.filter_state != FilterState::Int(0) {
                FilterState::NoState
            } else {
                FilterState::Int(0)
            }
        } else if arc1.olabel == EPSILON {
            // A real epsilon:epsilon pairing duplicates the two-step path.
            FilterState::NoState
        } else {
            FilterState::Int(0)
        }
    }

    fn filter_final(&self, _final1: &mut W, _final2: &mut W) {}
}

/// Mirror image of [`SequenceComposeFilter`]: input epsilons of operand 2
/// are consumed before output epsilons of operand 1.
pub struct AltSequenceComposeFilter<W: Semiring> {
    fst2: Rc<dyn Fst<W>>,
    state1: StateId,
    state2: StateId,
    filter_state: FilterState,
    all_eps2: bool,
    no_eps2: bool,
}

impl<W: Semiring> AltSequenceComposeFilter<W> {
    /// Creates the filter; it inspects operand 2 at each composition
    /// state.
    pub fn new(fst2: Rc<dyn Fst<W>>) -> Self {
        Self {
            fst2,
            state1: NO_STATE,
            state2: NO_STATE,
            filter_state: FilterState::NoState,
            all_eps2: false,
            no_eps2: true,
        }
    }
}

impl<W: Semiring> ComposeFilter<W> for AltSequenceComposeFilter<W> {
    fn start(&self) -> FilterState {
        FilterState::Int(0)
    }

    fn set_state(&mut self, state1: StateId, state2: StateId, filter_state: FilterState) {
        if self.state1 == state1 && self.state2 == state2 && self.filter_state == filter_state {
            return;
        }
        self.state1 = state1;
        self.state2 = state2;
        self.filter_state = filter_state;
        let num_arcs = self.fst2.num_arcs(state2);
        let num_eps = self.fst2.num_input_epsilons(state2);
        let is_final = !self.fst2.final_weight(state2).is_zero();
        self.all_eps2 = num_arcs == num_eps && !is_final;
        self.no_eps2 = num_eps == 0;
    }

    fn filter_arc(&mut self, arc1: &mut Arc<W>, arc2: &mut Arc<W>) -> FilterState {
        if arc2.ilabel == NO_LABEL {
            // Operand 2 idles while operand 1 consumes an output epsilon.
            if self.all_eps2 {
                FilterState::NoState
            } else if self.no_eps2 {
                FilterState::Int(0)
            } else {
                FilterState::Int(1)
            }
        } else if arc1.olabel == NO_LABEL {
            // Operand 2 consumes an input epsilon while operand 1 idles.
            if self.filter_state != FilterState::Int(0) {
                FilterState::NoState
            } else {
                FilterState::Int(0)
            }
        } else if arc1.olabel == EPSILON {
            FilterState::NoState
        } else {
            FilterState::Int(0)
        }
    }

    fn filter_final(&self, _final1: &mut W, _final2: &mut W) {}
}

/// Symmetric, state-aware filter.
///
/// State 0 means no epsilon run is underway; states 1 and 2 mean operand 1
/// (resp. operand 2) is consuming an epsilon run, and switching sides mid
/// run is forbidden. Real epsilon:epsilon pairings are taken in state 0
/// only.
pub struct MatchComposeFilter<W: Semiring> {
    fst1: Rc<dyn Fst<W>>,
    fst2: Rc<dyn Fst<W>>,
    state1: StateId,
    state2: StateId,
    filter_state: FilterState,
    all_eps1: bool,
    all_eps2: bool,
    no_eps1: bool,
    no_eps2: bool,
}

impl<W: Semiring> MatchComposeFilter<W> {
    /// Creates the filter; it inspects both operands at each composition
    /// state.
    pub fn new(fst1: Rc<dyn Fst<W>>, fst2: Rc<dyn Fst<W>>) -> Self {
        Self {
            fst1,
            fst2,
            state1: NO_STATE,
            state2: NO_STATE,
            filter_state: FilterState::NoState,
            all_eps1: false,
            all_eps2: false,
            no_eps1: true,
            no_eps2: true,
        }
    }
}

impl<W: Semiring> ComposeFilter<W> for MatchComposeFilter<W> {
    fn start(&self) -> FilterState {
        FilterState::Int(0)
    }

    fn set_state(&mut self, state1: StateId, state2: StateId, filter_state: FilterState) {
        if self.state1 == state1 && self.state2 == state2 && self.filter_state == filter_state {
            return;
        }
        self.state1 = state1;
        self.state2 = state2;
        self.filter_state = filter_state;
        let na1 = self.fst1.num_arcs(state1);
        let ne1 = self.fst1.num_output_epsilons(state1);
        let fin1 = !self.fst1.final_weight(state1).is_zero();
        self.all_eps1 = na1 == ne1 && !fin1;
        self.no_eps1 = ne1 == 0;
        let na2 = self.fst2.num_arcs(state2);
        let ne2 = self.fst2.num_input_epsilons(state2);
        let fin2 = !self.fst2.final_weight(state2).is_zero();
        self.all_eps2 = na2 == ne2 && !fin2;
        self.no_eps2 = ne2 == 0;
    }

    fn filter_arc(&mut self, arc1: &mut Arc<W>, arc2: &mut Arc<W>) -> FilterState {
        let fs = self.filter_state;
        if arc2.ilabel == NO_LABEL {
            // Epsilon on operand 1, operand 2 idle.
            if fs == FilterState::Int(0) {
                if self.no_eps2 {
                    FilterState::Int(0)
                } else if self.all_eps2 {
                    FilterState::NoState
                } else {
                    FilterState::Int(1)
                }
            } else if fs == FilterState::Int(1) {
                FilterState::Int(1)
            } else {
                FilterState::NoState
            }
        } else if arc1.olabel == NO_LABEL {
            // Epsilon on operand 2, operand 1 idle.
            if fs == FilterState::Int(0) {
                if self.no_eps1 {
                    FilterState::Int(0)
                } else if self.all_eps1 {
                    FilterState::NoState
                } else {
                    FilterState::Int(2)
                }
            } else if fs == FilterState::Int(2) {
                FilterState::Int(2)
            } else {
                FilterState::NoState
            }
        } else if arc1.olabel == EPSILON {
            // Real epsilon on both sides.
            if fs == FilterState::Int(0) {
                FilterState::Int(0)
            } else {
                FilterState::NoState
            }
        } else {
            FilterState::Int(0)
        }
    }

    fn filter_final(&self, _final1: &mut W, _final2: &mut W) {}
}
