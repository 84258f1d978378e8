//! Mutable random-access automaton store.

use std::cell::Cell;
use std::rc::Rc;

use crate::arc::{Arc, StateId, EPSILON};
use crate::fst::{Arcs, ExpandedFst, Fst, MutableFst};
use crate::properties::{
    compute_properties, known, ADD_ARC_PROPERTIES, ADD_STATE_PROPERTIES,
    DELETE_STATES_PROPERTIES, ERROR, NULL_PROPERTIES, SCAN_PROPERTIES, SET_FINAL_PROPERTIES,
    SET_START_PROPERTIES,
};
use crate::semiring::Semiring;
use crate::symbol_table::SymbolTable;

#[derive(Debug, Clone)]
struct VectorState<W> {
    final_weight: W,
    // Shared so that `arcs()` snapshots are reference bumps; mutation goes
    // through `Rc::make_mut`, cloning only when a snapshot is still live.
    arcs: Rc<Vec<Arc<W>>>,
}

impl<W: Semiring> VectorState<W> {
    fn new() -> Self {
        Self {
            final_weight: W::zero(),
            arcs: Rc::new(Vec::new()),
        }
    }
}

/// A mutable, materialized automaton backed by an indexed state table with
/// append-only arc lists.
///
/// This is both the store callers build automata in and the realization
/// target for delayed views. Per-state arc lists are handed out as shared
/// snapshots, so holding an [`Arcs`] iterator across mutation observes the
/// pre-mutation arcs rather than aliasing them.
#[derive(Debug, Clone)]
pub struct VectorFst<W: Semiring> {
    states: Vec<VectorState<W>>,
    start: Option<StateId>,
    isymbols: Option<Rc<SymbolTable>>,
    osymbols: Option<Rc<SymbolTable>>,
    properties: Cell<u64>,
}

impl<W: Semiring> VectorFst<W> {
    /// Creates an empty automaton with no start state.
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            start: None,
            isymbols: None,
            osymbols: None,
            properties: Cell::new(NULL_PROPERTIES),
        }
    }

    fn state(&self, state: StateId) -> &VectorState<W> {
        &self.states[state]
    }

    fn mask_properties(&self, preserved: u64) {
        self.properties.set(self.properties.get() & preserved);
    }

    /// Structural equality up to weight quantization: same start, finals,
    /// and arc lists, with weights compared at `delta`.
    pub fn approx_eq(&self, other: &Self, delta: f32) -> bool {
        if self.start != other.start || self.states.len() != other.states.len() {
            return false;
        }
        for s in 0..self.states.len() {
            if !self.states[s]
                .final_weight
                .approx_eq(&other.states[s].final_weight, delta)
            {
                return false;
            }
            let a = self.states[s].arcs.as_slice();
            let b = other.states[s].arcs.as_slice();
            if a.len() != b.len() {
                return false;
            }
            for (x, y) in a.iter().zip(b) {
                if x.ilabel != y.ilabel
                    || x.olabel != y.olabel
                    || x.nextstate != y.nextstate
                    || !x.weight.approx_eq(&y.weight, delta)
                {
                    return false;
                }
            }
        }
        true
    }
}

impl<W: Semiring> Default for VectorFst<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Semiring> Fst<W> for VectorFst<W> {
    fn start(&self) -> Option<StateId> {
        self.start
    }

    fn final_weight(&self, state: StateId) -> W {
        self.state(state).final_weight.clone()
    }

    fn num_arcs(&self, state: StateId) -> usize {
        self.state(state).arcs.len()
    }

    fn arcs(&self, state: StateId) -> Arcs<W> {
        Arcs::new(Rc::clone(&self.state(state).arcs))
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.state(state)
            .arcs
            .iter()
            .filter(|arc| arc.ilabel == EPSILON)
            .count()
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.state(state)
            .arcs
            .iter()
            .filter(|arc| arc.olabel == EPSILON)
            .count()
    }

    fn properties(&self, mask: u64, test: bool) -> u64 {
        let props = self.properties.get();
        if test && !known(props, mask & SCAN_PROPERTIES) {
            let computed = compute_properties(self);
            self.properties.set(props | computed);
        }
        self.properties.get() & mask
    }

    fn input_symbols(&self) -> Option<&Rc<SymbolTable>> {
        self.isymbols.as_ref()
    }

    fn output_symbols(&self) -> Option<&Rc<SymbolTable>> {
        self.osymbols.as_ref()
    }
}

impl<W: Semiring> ExpandedFst<W> for VectorFst<W> {
    fn num_states(&self) -> usize {
        self.states.len()
    }
}

impl<W: Semiring> MutableFst<W> for VectorFst<W> {
    fn add_state(&mut self) -> StateId {
        self.states.push(VectorState::new());
        self.mask_properties(ADD_STATE_PROPERTIES);
        self.states.len() - 1
    }

    fn set_start(&mut self, state: StateId) {
        assert!(state < self.states.len(), "set_start: no such state");
        self.start = Some(state);
        self.mask_properties(SET_START_PROPERTIES);
    }

    fn set_final(&mut self, state: StateId, weight: W) {
        assert!(state < self.states.len(), "set_final: no such state");
        self.states[state].final_weight = weight;
        self.mask_properties(SET_FINAL_PROPERTIES);
    }

    fn add_arc(&mut self, state: StateId, arc: Arc<W>) {
        assert!(state < self.states.len(), "add_arc: no such state");
        assert!(
            arc.nextstate < self.states.len(),
            "add_arc: nextstate {} exceeds the current maximum state id",
            arc.nextstate
        );
        Rc::make_mut(&mut self.states[state].arcs).push(arc);
        self.mask_properties(ADD_ARC_PROPERTIES);
    }

    fn reserve_states(&mut self, additional: usize) {
        self.states.reserve(additional);
    }

    fn delete_states(&mut self, states: &[StateId]) {
        if states.is_empty() {
            return;
        }
        let n = self.states.len();
        let mut deleted = vec![false; n];
        for &s in states {
            assert!(s < n, "delete_states: no such state");
            deleted[s] = true;
        }

        // Dense renumbering of the survivors, in order.
        let mut remap = vec![None; n];
        let mut next = 0;
        for s in 0..n {
            if !deleted[s] {
                remap[s] = Some(next);
                next += 1;
            }
        }

        let old_states = std::mem::take(&mut self.states);
        self.states.reserve(next);
        for (s, state) in old_states.into_iter().enumerate() {
            if remap[s].is_none() {
                continue;
            }
            let arcs = state
                .arcs
                .iter()
                .filter_map(|arc| {
                    remap[arc.nextstate].map(|nextstate| Arc {
                        nextstate,
                        ..arc.clone()
                    })
                })
                .collect::<Vec<_>>();
            self.states.push(VectorState {
                final_weight: state.final_weight,
                arcs: Rc::new(arcs),
            });
        }
        self.start = self.start.and_then(|s| remap[s]);
        self.mask_properties(DELETE_STATES_PROPERTIES);
    }

    fn delete_all_states(&mut self) {
        self.states.clear();
        self.start = None;
        let sticky = self.properties.get() & ERROR;
        self.properties.set(NULL_PROPERTIES | sticky);
    }

    fn set_input_symbols(&mut self, symbols: Option<Rc<SymbolTable>>) {
        self.isymbols = symbols;
    }

    fn set_output_symbols(&mut self, symbols: Option<Rc<SymbolTable>>) {
        self.osymbols = symbols;
    }

    fn set_properties(&mut self, props: u64, mask: u64) {
        let old = self.properties.get();
        self.properties
            .set((old & !mask) | (props & mask) | (old & ERROR));
    }

    fn arcs_mut(&mut self, state: StateId) -> &mut Vec<Arc<W>> {
        assert!(state < self.states.len(), "arcs_mut: no such state");
        Rc::make_mut(&mut self.states[state].arcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{ACCESSIBLE, I_LABEL_SORTED, NOT_I_LABEL_SORTED, UNWEIGHTED};
    use crate::semiring::TropicalWeight;

    fn weight(value: f32) -> TropicalWeight {
        TropicalWeight::new(value)
    }

    #[test]
    fn test_build_and_query() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, weight(0.5));
        fst.add_arc(s0, Arc::new(1, 2, weight(1.0), s1));

        assert_eq!(fst.start(), Some(s0));
        assert_eq!(fst.num_states(), 2);
        assert_eq!(fst.num_arcs(s0), 1);
        assert!(fst.final_weight(s0).is_zero());
        assert_eq!(fst.final_weight(s1), weight(0.5));
        let arcs: Vec<_> = fst.arcs(s0).collect();
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].olabel, 2);
    }

    #[test]
    #[should_panic(expected = "nextstate")]
    fn test_add_arc_rejects_unknown_nextstate() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight::one(), 5));
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight::one(), s0));

        let snapshot = fst.arcs(s0);
        fst.add_arc(s0, Arc::new(2, 2, TropicalWeight::one(), s0));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(fst.num_arcs(s0), 2);
    }

    #[test]
    fn test_delete_states_renumbers_densely() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        let s3 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s3, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight::one(), s1));
        fst.add_arc(s0, Arc::new(2, 2, TropicalWeight::one(), s2));
        fst.add_arc(s2, Arc::new(3, 3, TropicalWeight::one(), s3));

        fst.delete_states(&[s1]);

        assert_eq!(fst.num_states(), 3);
        assert_eq!(fst.start(), Some(0));
        // The arc into the deleted state is dropped; the arc into old s2
        // now targets the renumbered id 1.
        let arcs: Vec<_> = fst.arcs(0).collect();
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].ilabel, 2);
        assert_eq!(arcs[0].nextstate, 1);
        assert_eq!(fst.final_weight(2), TropicalWeight::one());
    }

    #[test]
    fn test_delete_start_state() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.delete_states(&[s0]);
        assert_eq!(fst.start(), None);
        assert_eq!(fst.num_states(), 1);
    }

    #[test]
    fn test_properties_tested_on_demand() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(2, 2, TropicalWeight::one(), s1));
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight::one(), s1));

        // Untested: sortedness unknown after add_arc.
        let mask = I_LABEL_SORTED | NOT_I_LABEL_SORTED;
        assert_eq!(fst.properties(mask, false), 0);
        // Tested: the scan discovers the out-of-order labels.
        assert_eq!(fst.properties(mask, true), NOT_I_LABEL_SORTED);
        assert_eq!(fst.properties(UNWEIGHTED, true), UNWEIGHTED);
    }

    #[test]
    fn test_error_property_is_sticky() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        fst.set_properties(ERROR, ERROR);
        fst.set_properties(0, ERROR);
        assert_eq!(fst.properties(ERROR, false), ERROR);
        let s = fst.add_state();
        fst.set_start(s);
        assert_eq!(fst.properties(ERROR, false), ERROR);
    }

    #[test]
    fn test_set_properties_masked() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        fst.set_properties(ACCESSIBLE, ACCESSIBLE | UNWEIGHTED);
        let props = fst.properties(ACCESSIBLE, false);
        assert_eq!(props & ACCESSIBLE, ACCESSIBLE);
    }

    #[test]
    fn test_approx_eq() {
        let mut a = VectorFst::<TropicalWeight>::new();
        let s0 = a.add_state();
        let s1 = a.add_state();
        a.set_start(s0);
        a.set_final(s1, weight(1.0));
        a.add_arc(s0, Arc::new(1, 2, weight(0.25), s1));
        let mut b = a.clone();
        assert!(a.approx_eq(&b, 1e-6));
        b.add_arc(s0, Arc::new(3, 3, weight(0.0), s1));
        assert!(!a.approx_eq(&b, 1e-6));
    }
}
