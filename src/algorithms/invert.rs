//! Inversion of a transduction.

use crate::fst::MutableFst;
use crate::properties::{invert_properties, ALL_PROPERTIES};
use crate::semiring::Semiring;

/// Exchanges input and output labels on every arc, making the automaton
/// transduce its former outputs to its former inputs. Symbol tables are
/// swapped along with the labels. Applying it twice restores the
/// original.
pub fn invert<W, F>(fst: &mut F)
where
    W: Semiring,
    F: MutableFst<W>,
{
    let props = fst.properties(ALL_PROPERTIES, false);
    for state in fst.states() {
        for arc in fst.arcs_mut(state) {
            std::mem::swap(&mut arc.ilabel, &mut arc.olabel);
        }
    }
    let isymbols = fst.input_symbols().cloned();
    let osymbols = fst.output_symbols().cloned();
    fst.set_input_symbols(osymbols);
    fst.set_output_symbols(isymbols);
    fst.set_properties(invert_properties(props), ALL_PROPERTIES);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::Arc;
    use crate::fst::Fst;
    use crate::semiring::TropicalWeight;
    use crate::symbol_table::SymbolTable;
    use crate::vector_fst::VectorFst;
    use std::rc::Rc;

    type W = TropicalWeight;

    #[test]
    fn test_invert_swaps_labels_and_symbols() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, W::one());
        fst.add_arc(s0, Arc::new(1, 2, W::new(0.5), s1));
        let mut syms = SymbolTable::new("in");
        syms.add_symbol("<eps>");
        fst.set_input_symbols(Some(Rc::new(syms)));

        invert(&mut fst);

        let arcs: Vec<_> = fst.arcs(s0).collect();
        assert_eq!(arcs[0].ilabel, 2);
        assert_eq!(arcs[0].olabel, 1);
        assert!(fst.input_symbols().is_none());
        assert_eq!(fst.output_symbols().unwrap().name(), "in");
    }

    #[test]
    fn test_invert_is_an_involution() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, W::new(1.5));
        fst.add_arc(s0, Arc::new(1, 2, W::new(0.5), s1));
        fst.add_arc(s0, Arc::new(0, 3, W::one(), s1));
        let original = fst.clone();

        invert(&mut fst);
        invert(&mut fst);
        assert!(fst.approx_eq(&original, 1e-6));
    }
}
