//! Union, concatenation and closure.
//!
//! Eager epsilon-arc constructions on a mutable store. Each modifies its
//! first argument in place.

use crate::arc::{Arc, EPSILON};
use crate::fst::{ExpandedFst, MutableFst};
use crate::properties::{
    closure_properties, concat_properties, union_properties, ALL_PROPERTIES, EPSILONS,
    I_EPSILONS, O_EPSILONS,
};
use crate::semiring::Semiring;

/// Whether closure admits the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureType {
    /// `T*`: the empty string is accepted.
    Star,
    /// `T+`: at least one iteration is required.
    Plus,
}

// Copies `src` into `dst` with all state ids offset by the current state
// count of `dst`; returns the offset.
fn append_fst<W, F, G>(dst: &mut F, src: &G) -> usize
where
    W: Semiring,
    F: MutableFst<W>,
    G: ExpandedFst<W>,
{
    let offset = dst.num_states();
    dst.reserve_states(src.num_states());
    for _ in 0..src.num_states() {
        dst.add_state();
    }
    for state in src.states() {
        let final_weight = src.final_weight(state);
        if !final_weight.is_zero() {
            dst.set_final(state + offset, final_weight);
        }
        for arc in src.arcs(state) {
            dst.add_arc(
                state + offset,
                Arc {
                    nextstate: arc.nextstate + offset,
                    ..arc
                },
            );
        }
    }
    offset
}

/// Unions `fst2` into `fst1`: the result accepts a path iff either
/// operand does, with the original weight.
pub fn union<W, F, G>(fst1: &mut F, fst2: &G)
where
    W: Semiring,
    F: MutableFst<W>,
    G: ExpandedFst<W>,
{
    let props1 = fst1.properties(ALL_PROPERTIES, false);
    let props2 = fst2.properties(ALL_PROPERTIES, false);
    let Some(start2) = fst2.start() else {
        return;
    };
    let offset = append_fst(fst1, fst2);
    let mut props = union_properties(props1, props2);
    match fst1.start() {
        Some(start1) => {
            fst1.add_arc(start1, Arc::new(EPSILON, EPSILON, W::one(), start2 + offset));
            props |= EPSILONS | I_EPSILONS | O_EPSILONS;
        }
        None => fst1.set_start(start2 + offset),
    }
    fst1.set_properties(props, ALL_PROPERTIES);
}

/// Concatenates `fst2` onto `fst1`: every final state of `fst1` continues
/// into `fst2`'s start, carrying its final weight onto the connecting
/// epsilon arc.
pub fn concat<W, F, G>(fst1: &mut F, fst2: &G)
where
    W: Semiring,
    F: MutableFst<W>,
    G: ExpandedFst<W>,
{
    let props1 = fst1.properties(ALL_PROPERTIES, false);
    let props2 = fst2.properties(ALL_PROPERTIES, false);
    let Some(start2) = fst2.start() else {
        // Concatenation with the empty language is empty.
        for state in fst1.states() {
            let weight = fst1.final_weight(state);
            if !weight.is_zero() {
                fst1.set_final(state, W::zero());
            }
        }
        return;
    };
    let num_states1 = fst1.num_states();
    let offset = append_fst(fst1, fst2);
    for state in 0..num_states1 {
        let weight = fst1.final_weight(state);
        if !weight.is_zero() {
            fst1.set_final(state, W::zero());
            fst1.add_arc(state, Arc::new(EPSILON, EPSILON, weight, start2 + offset));
        }
    }
    let props = concat_properties(props1, props2);
    fst1.set_properties(props, ALL_PROPERTIES);
}

/// Closes `fst` under repetition: every final state loops back to the
/// start, weighted by its final weight. `Star` additionally makes the
/// empty string acceptable through a fresh start state.
pub fn closure<W, F>(fst: &mut F, closure_type: ClosureType)
where
    W: Semiring,
    F: MutableFst<W>,
{
    let props = fst.properties(ALL_PROPERTIES, false);
    let Some(start) = fst.start() else {
        if closure_type == ClosureType::Star {
            let new_start = fst.add_state();
            fst.set_start(new_start);
            fst.set_final(new_start, W::one());
        }
        return;
    };
    let mut added_epsilons = false;
    for state in fst.states() {
        let weight = fst.final_weight(state);
        if !weight.is_zero() {
            fst.add_arc(state, Arc::new(EPSILON, EPSILON, weight, start));
            added_epsilons = true;
        }
    }
    if closure_type == ClosureType::Star {
        let new_start = fst.add_state();
        fst.set_final(new_start, W::one());
        fst.add_arc(new_start, Arc::new(EPSILON, EPSILON, W::one(), start));
        fst.set_start(new_start);
        added_epsilons = true;
    }
    let mut new_props = closure_properties(props);
    if added_epsilons {
        new_props |= EPSILONS | I_EPSILONS | O_EPSILONS;
    }
    fst.set_properties(new_props, ALL_PROPERTIES);
}
