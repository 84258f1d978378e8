//! Arc sorting.

use crate::fst::MutableFst;
use crate::properties::{
    I_LABEL_SORTED, NOT_I_LABEL_SORTED, NOT_O_LABEL_SORTED, O_LABEL_SORTED,
};
use crate::semiring::Semiring;

/// Which label to sort a state's arcs by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcSortType {
    /// Sort by input label.
    ILabel,
    /// Sort by output label.
    OLabel,
}

/// Stably sorts every state's arcs by the chosen label and records the
/// corresponding sorted property. Required before handing the automaton
/// to the sorted matcher on that side.
pub fn arc_sort<W, F>(fst: &mut F, sort_type: ArcSortType)
where
    W: Semiring,
    F: MutableFst<W>,
{
    for state in fst.states() {
        let arcs = fst.arcs_mut(state);
        match sort_type {
            ArcSortType::ILabel => arcs.sort_by_key(|arc| arc.ilabel),
            ArcSortType::OLabel => arcs.sort_by_key(|arc| arc.olabel),
        }
    }
    match sort_type {
        ArcSortType::ILabel => {
            // Reordering says nothing about the other side's order.
            fst.set_properties(
                I_LABEL_SORTED,
                I_LABEL_SORTED | NOT_I_LABEL_SORTED | O_LABEL_SORTED | NOT_O_LABEL_SORTED,
            );
        }
        ArcSortType::OLabel => {
            fst.set_properties(
                O_LABEL_SORTED,
                O_LABEL_SORTED | NOT_O_LABEL_SORTED | I_LABEL_SORTED | NOT_I_LABEL_SORTED,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::Arc;
    use crate::fst::Fst;
    use crate::semiring::TropicalWeight;
    use crate::vector_fst::VectorFst;

    type W = TropicalWeight;

    #[test]
    fn test_arc_sort_by_ilabel_is_stable() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.add_arc(s0, Arc::new(3, 1, W::one(), s0));
        fst.add_arc(s0, Arc::new(1, 2, W::one(), s0));
        fst.add_arc(s0, Arc::new(1, 3, W::one(), s0));

        arc_sort(&mut fst, ArcSortType::ILabel);

        let pairs: Vec<_> = fst.arcs(s0).map(|a| (a.ilabel, a.olabel)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (3, 1)]);
        assert_eq!(
            fst.properties(I_LABEL_SORTED, false),
            I_LABEL_SORTED
        );
    }

    #[test]
    fn test_arc_sort_by_olabel() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.add_arc(s0, Arc::new(1, 9, W::one(), s0));
        fst.add_arc(s0, Arc::new(2, 4, W::one(), s0));

        arc_sort(&mut fst, ArcSortType::OLabel);

        let olabels: Vec<_> = fst.arcs(s0).map(|a| a.olabel).collect();
        assert_eq!(olabels, vec![4, 9]);
        assert_eq!(
            fst.properties(O_LABEL_SORTED, false),
            O_LABEL_SORTED
        );
    }
}
