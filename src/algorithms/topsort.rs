//! Topological sorting of acyclic automata.

use crate::arc::{Arc, StateId};
use crate::fst::{Arcs, ExpandedFst, MutableFst};
use crate::properties::{
    ACYCLIC, CYCLIC, INITIAL_ACYCLIC, NOT_TOP_SORTED, TOP_SORTED,
};
use crate::semiring::Semiring;

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Grey,
    Black,
}

struct Frame<W> {
    state: StateId,
    arcs: Arcs<W>,
}

// Depth-first traversal from the start state and then any remaining
// unvisited states, in numeric order. Records finishing times and whether
// a back arc (a grey target) exists.
fn dfs_finish_order<W, F>(fst: &F) -> (Vec<StateId>, bool)
where
    W: Semiring,
    F: ExpandedFst<W> + ?Sized,
{
    let num_states = fst.num_states();
    let mut color = vec![Color::White; num_states];
    let mut finish: Vec<StateId> = Vec::with_capacity(num_states);
    let mut acyclic = true;

    let roots = fst.start().into_iter().chain(fst.states());
    for root in roots {
        if color[root] != Color::White {
            continue;
        }
        let mut frames: Vec<Frame<W>> = Vec::new();
        color[root] = Color::Grey;
        frames.push(Frame {
            state: root,
            arcs: fst.arcs(root),
        });
        while let Some(frame) = frames.last_mut() {
            let state = frame.state;
            if let Some(arc) = frame.arcs.next() {
                let target = arc.nextstate;
                match color[target] {
                    Color::White => {
                        color[target] = Color::Grey;
                        frames.push(Frame {
                            state: target,
                            arcs: fst.arcs(target),
                        });
                    }
                    Color::Grey => acyclic = false,
                    Color::Black => {}
                }
                continue;
            }
            frames.pop();
            color[state] = Color::Black;
            finish.push(state);
        }
    }
    (finish, acyclic)
}

/// Reorders states so that `order[s]` becomes the id of old state `s`.
///
/// `order` must be a permutation of `0..num_states()`. The start state and
/// all arcs are remapped accordingly.
pub fn state_sort<W, F>(fst: &mut F, order: &[StateId])
where
    W: Semiring,
    F: MutableFst<W>,
{
    let num_states = fst.num_states();
    assert_eq!(order.len(), num_states, "state_sort: order length mismatch");

    let start = fst.start().map(|s| order[s]);
    let mut finals: Vec<(StateId, W)> = Vec::new();
    let mut arcs: Vec<(StateId, Vec<Arc<W>>)> = Vec::with_capacity(num_states);
    for state in 0..num_states {
        let final_weight = fst.final_weight(state);
        if !final_weight.is_zero() {
            finals.push((order[state], final_weight));
        }
        let remapped = fst
            .arcs(state)
            .map(|arc| Arc {
                nextstate: order[arc.nextstate],
                ..arc
            })
            .collect();
        arcs.push((order[state], remapped));
    }

    let isymbols = fst.input_symbols().cloned();
    let osymbols = fst.output_symbols().cloned();
    fst.delete_all_states();
    fst.set_input_symbols(isymbols);
    fst.set_output_symbols(osymbols);
    fst.reserve_states(num_states);
    for _ in 0..num_states {
        fst.add_state();
    }
    if let Some(start) = start {
        fst.set_start(start);
    }
    for (state, weight) in finals {
        fst.set_final(state, weight);
    }
    for (state, state_arcs) in arcs {
        for arc in state_arcs {
            fst.add_arc(state, arc);
        }
    }
}

/// Topologically sorts the automaton if it is acyclic, renumbering states
/// so every arc leads from a lower to a higher id; a cyclic automaton is
/// left unchanged. Returns whether the automaton is acyclic.
pub fn top_sort<W, F>(fst: &mut F) -> bool
where
    W: Semiring,
    F: MutableFst<W>,
{
    let (finish, acyclic) = dfs_finish_order(fst);
    if acyclic {
        let mut order = vec![0; fst.num_states()];
        for (position, &state) in finish.iter().rev().enumerate() {
            order[state] = position;
        }
        state_sort(fst, &order);
        fst.set_properties(
            ACYCLIC | INITIAL_ACYCLIC | TOP_SORTED,
            ACYCLIC | CYCLIC | INITIAL_ACYCLIC | TOP_SORTED | NOT_TOP_SORTED,
        );
    } else {
        fst.set_properties(CYCLIC | NOT_TOP_SORTED, CYCLIC | ACYCLIC | TOP_SORTED | NOT_TOP_SORTED);
    }
    acyclic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::Fst;
    use crate::semiring::TropicalWeight;
    use crate::vector_fst::VectorFst;

    type W = TropicalWeight;

    #[test]
    fn test_top_sort_orders_arcs_forward() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        // Start in the middle of the id space.
        fst.set_start(s2);
        fst.set_final(s1, W::one());
        fst.add_arc(s2, Arc::new(1, 1, W::one(), s0));
        fst.add_arc(s0, Arc::new(2, 2, W::one(), s1));

        assert!(top_sort(&mut fst));
        assert_eq!(fst.start(), Some(0));
        for state in fst.states() {
            for arc in fst.arcs(state) {
                assert!(arc.nextstate > state);
            }
        }
        assert_eq!(fst.properties(TOP_SORTED, false), TOP_SORTED);
    }

    #[test]
    fn test_top_sort_leaves_cyclic_input_unchanged() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, W::one());
        fst.add_arc(s0, Arc::new(1, 1, W::one(), s1));
        fst.add_arc(s1, Arc::new(2, 2, W::one(), s0));
        let before = fst.clone();

        assert!(!top_sort(&mut fst));
        assert!(fst.approx_eq(&before, 1e-6));
        assert_eq!(fst.properties(CYCLIC, false), CYCLIC);
    }

    #[test]
    fn test_state_sort_permutes() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, W::new(2.0));
        fst.add_arc(s0, Arc::new(1, 1, W::new(0.5), s1));

        state_sort(&mut fst, &[1, 0]);
        assert_eq!(fst.start(), Some(1));
        assert_eq!(fst.final_weight(0), W::new(2.0));
        let arcs: Vec<_> = fst.arcs(1).collect();
        assert_eq!(arcs[0].nextstate, 0);
    }
}
