//! Trimming of unsuccessful paths.

use crate::arc::StateId;
use crate::fst::{Arcs, ExpandedFst, MutableFst};
use crate::properties::{
    ACCESSIBLE, COACCESSIBLE, NOT_ACCESSIBLE, NOT_COACCESSIBLE,
};
use crate::semiring::Semiring;

struct Frame<W> {
    state: StateId,
    arcs: Arcs<W>,
}

// Single-DFS Tarjan SCC from the start state, marking accessibility and
// co-accessibility. Unvisited states are inaccessible. Co-accessibility
// propagates from final states through finished arcs and across whole
// strongly connected components when they are popped.
fn scc_visit<W, F>(fst: &F, access: &mut [bool], coaccess: &mut [bool])
where
    W: Semiring,
    F: ExpandedFst<W> + ?Sized,
{
    const UNVISITED: usize = usize::MAX;

    let Some(start) = fst.start() else {
        return;
    };
    let num_states = fst.num_states();
    let mut dfnumber = vec![UNVISITED; num_states];
    let mut lowlink = vec![UNVISITED; num_states];
    let mut onstack = vec![false; num_states];
    let mut scc_stack: Vec<StateId> = Vec::new();
    let mut frames: Vec<Frame<W>> = Vec::new();
    let mut nvisited = 0;

    dfnumber[start] = nvisited;
    lowlink[start] = nvisited;
    nvisited += 1;
    onstack[start] = true;
    scc_stack.push(start);
    access[start] = true;
    frames.push(Frame {
        state: start,
        arcs: fst.arcs(start),
    });

    while let Some(frame) = frames.last_mut() {
        let state = frame.state;
        if let Some(arc) = frame.arcs.next() {
            let target = arc.nextstate;
            if dfnumber[target] == UNVISITED {
                dfnumber[target] = nvisited;
                lowlink[target] = nvisited;
                nvisited += 1;
                onstack[target] = true;
                scc_stack.push(target);
                access[target] = true;
                frames.push(Frame {
                    state: target,
                    arcs: fst.arcs(target),
                });
            } else {
                if onstack[target] && dfnumber[target] < lowlink[state] {
                    lowlink[state] = dfnumber[target];
                }
                if coaccess[target] {
                    coaccess[state] = true;
                }
            }
            continue;
        }

        // All arcs of `state` processed.
        frames.pop();
        if !fst.final_weight(state).is_zero() {
            coaccess[state] = true;
        }
        if dfnumber[state] == lowlink[state] {
            // Root of a strongly connected component: one co-accessible
            // member makes the whole component co-accessible.
            let mut scc_coaccess = false;
            let mut index = scc_stack.len();
            loop {
                index -= 1;
                let member = scc_stack[index];
                if coaccess[member] {
                    scc_coaccess = true;
                }
                if member == state {
                    break;
                }
            }
            loop {
                let member = scc_stack.pop().expect("scc stack underflow");
                if scc_coaccess {
                    coaccess[member] = true;
                }
                onstack[member] = false;
                if member == state {
                    break;
                }
            }
        }
        if let Some(parent) = frames.last() {
            let parent = parent.state;
            if coaccess[state] {
                coaccess[parent] = true;
            }
            if lowlink[state] < lowlink[parent] {
                lowlink[parent] = lowlink[state];
            }
        }
    }
}

/// Removes states that are not on a successful path: every surviving
/// state is both reachable from the start and able to reach a final
/// state. Remaining states are renumbered densely.
///
/// O(V + E) time, O(V) auxiliary space. A sticky error property on the
/// input is left untouched.
pub fn connect<W, F>(fst: &mut F)
where
    W: Semiring,
    F: MutableFst<W>,
{
    let num_states = fst.num_states();
    let mut access = vec![false; num_states];
    let mut coaccess = vec![false; num_states];
    scc_visit(fst, &mut access, &mut coaccess);

    let dstates: Vec<StateId> = (0..num_states)
        .filter(|&s| !access[s] || !coaccess[s])
        .collect();
    fst.delete_states(&dstates);
    fst.set_properties(
        ACCESSIBLE | COACCESSIBLE,
        ACCESSIBLE | NOT_ACCESSIBLE | COACCESSIBLE | NOT_COACCESSIBLE,
    );
}
