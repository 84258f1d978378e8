//! Delayed composition.
//!
//! [`ComposeFst`] realizes the relational product of two transducers as a
//! delayed automaton: composition states are interned (operand-state,
//! operand-state, filter-state) tuples, and a state's outgoing arcs are
//! synthesized the first time anything asks for them, then memoized in a
//! [`CacheStore`]. If operand 1 transduces `x` to `y` with weight `a` and
//! operand 2 transduces `y` to `z` with weight `b`, the composition
//! transduces `x` to `z` with weight `times(a, b)`.
//!
//! The output side of operand 1 or the input side of operand 2 must admit
//! matching (sorted arcs for the sorted matcher, any arcs for the lookup
//! matcher); epsilon interleavings are disambiguated by a
//! [`ComposeFilter`]. Errors never unwind out of queries: they set the
//! sticky error property and the view reports an empty automaton.

pub mod filter;
pub mod state_table;

use std::cell::RefCell;
use std::rc::Rc;

use crate::arc::{Arc, Label, StateId, EPSILON, NO_LABEL, NO_STATE};
use crate::cache::{CacheOptions, CacheStore};
use crate::config;
use crate::fst::{Arcs, Fst, MutableFst};
use crate::matcher::{default_matcher, MatchType, Matcher, REQUIRE_MATCH, REQUIRE_PRIORITY};
use crate::properties::{
    compose_properties, known_properties, ALL_PROPERTIES, ERROR, UNWEIGHTED,
};
use crate::semiring::{Semiring, COMMUTATIVE};
use crate::symbol_table::SymbolTable;
use crate::vector_fst::VectorFst;

pub use filter::{
    AltSequenceComposeFilter, ComposeFilter, FilterKind, FilterState, MatchComposeFilter,
    NullComposeFilter, SequenceComposeFilter, TrivialComposeFilter,
};
pub use state_table::{ComposeStateTable, StateTuple, DEFAULT_STATE_TABLE_LIMIT};

use crate::algorithms::connect;

/// Configuration for a composition.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Which epsilon filter to use.
    pub filter: FilterKind,
    /// Trim the result after materializing (eager composition only).
    pub connect: bool,
    /// Cache configuration for the delayed view.
    pub cache: CacheOptions,
    /// Check operand symbol-table compatibility at construction.
    pub compat_symbols: bool,
    /// Ceiling on interned composition states.
    pub state_table_limit: usize,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            filter: FilterKind::Auto,
            connect: true,
            cache: CacheOptions::default(),
            compat_symbols: config::global().compat_symbols,
            state_table_limit: DEFAULT_STATE_TABLE_LIMIT,
        }
    }
}

/// Explicit collaborators for a composition. Any field left `None` is
/// constructed by the engine; provided instances are owned by it.
pub struct ComposeFstOptions<W: Semiring> {
    /// Matcher over operand 1 (conventionally on its output side).
    pub matcher1: Option<Box<dyn Matcher<W>>>,
    /// Matcher over operand 2 (conventionally on its input side).
    pub matcher2: Option<Box<dyn Matcher<W>>>,
    /// Composition filter instance.
    pub filter: Option<Box<dyn ComposeFilter<W>>>,
    /// State table instance.
    pub state_table: Option<ComposeStateTable>,
}

impl<W: Semiring> Default for ComposeFstOptions<W> {
    fn default() -> Self {
        Self {
            matcher1: None,
            matcher2: None,
            filter: None,
            state_table: None,
        }
    }
}

fn make_filter<W: Semiring>(
    kind: FilterKind,
    fst1: Rc<dyn Fst<W>>,
    fst2: Rc<dyn Fst<W>>,
) -> Box<dyn ComposeFilter<W>> {
    match kind {
        // No lookahead matchers exist in this core, so Auto is Sequence.
        FilterKind::Auto | FilterKind::Sequence => Box::new(SequenceComposeFilter::new(fst1)),
        FilterKind::Null => Box::new(NullComposeFilter),
        FilterKind::Trivial => Box::new(TrivialComposeFilter),
        FilterKind::AltSequence => Box::new(AltSequenceComposeFilter::new(fst2)),
        FilterKind::Match => Box::new(MatchComposeFilter::new(fst1, fst2)),
    }
}

struct ComposeFstImpl<W: Semiring> {
    fst1: Rc<dyn Fst<W>>,
    fst2: Rc<dyn Fst<W>>,
    matcher1: Box<dyn Matcher<W>>,
    matcher2: Box<dyn Matcher<W>>,
    filter: Box<dyn ComposeFilter<W>>,
    state_table: ComposeStateTable,
    cache: CacheStore<W>,
    match_type: MatchType,
    properties: u64,
}

impl<W: Semiring> ComposeFstImpl<W> {
    fn new(
        fst1: Rc<dyn Fst<W>>,
        fst2: Rc<dyn Fst<W>>,
        config: &ComposeConfig,
        options: ComposeFstOptions<W>,
    ) -> Self {
        let matcher1 = options
            .matcher1
            .unwrap_or_else(|| default_matcher(Rc::clone(&fst1), MatchType::Output));
        let matcher2 = options
            .matcher2
            .unwrap_or_else(|| default_matcher(Rc::clone(&fst2), MatchType::Input));
        let filter = options
            .filter
            .unwrap_or_else(|| make_filter(config.filter, Rc::clone(&fst1), Rc::clone(&fst2)));
        let state_table = options
            .state_table
            .unwrap_or_else(|| ComposeStateTable::with_limit(config.state_table_limit));

        let mut this = Self {
            fst1,
            fst2,
            matcher1,
            matcher2,
            filter,
            state_table,
            cache: CacheStore::new(config.cache.clone()),
            match_type: MatchType::None,
            properties: 0,
        };

        if config.compat_symbols && !this.symbols_compatible() {
            this.properties |= ERROR;
        }

        this.set_match_type();
        if this.match_type == MatchType::None {
            this.properties |= ERROR;
        }

        if W::PROPERTIES & COMMUTATIVE == 0 {
            let unweighted1 = this.fst1.properties(UNWEIGHTED, true) & UNWEIGHTED != 0;
            let unweighted2 = this.fst2.properties(UNWEIGHTED, true) & UNWEIGHTED != 0;
            if !(unweighted1 && unweighted2) {
                this.properties |= ERROR;
            }
        }

        let fprops1 = this.fst1.properties(ALL_PROPERTIES, false);
        let fprops2 = this.fst2.properties(ALL_PROPERTIES, false);
        let mprops1 = this.matcher1.properties(fprops1);
        let mprops2 = this.matcher2.properties(fprops2);
        let error = this.properties & ERROR;
        this.properties = this
            .filter
            .properties(compose_properties(mprops1, mprops2))
            | error;
        if this.state_table.error() {
            this.properties |= ERROR;
        }
        this
    }

    // The composition requires the left operand's output table and the
    // right operand's input table to both be absent or to carry equal
    // labeled fingerprints.
    fn symbols_compatible(&self) -> bool {
        match (self.fst1.output_symbols(), self.fst2.input_symbols()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.labeled_checksum() == b.labeled_checksum(),
            _ => false,
        }
    }

    // Mirrors the matcher capability negotiation: a matcher that requires
    // explicit matching forces its side; otherwise capabilities are probed
    // cheaply first and by property test second.
    fn set_match_type(&mut self) {
        if self.matcher1.flags() & REQUIRE_MATCH != 0
            && self.matcher1.match_type(true) != MatchType::Output
        {
            self.match_type = MatchType::None;
            return;
        }
        if self.matcher2.flags() & REQUIRE_MATCH != 0
            && self.matcher2.match_type(true) != MatchType::Input
        {
            self.match_type = MatchType::None;
            return;
        }
        let type1 = self.matcher1.match_type(false);
        let type2 = self.matcher2.match_type(false);
        self.match_type = if type1 == MatchType::Output && type2 == MatchType::Input {
            MatchType::Both
        } else if type1 == MatchType::Output {
            MatchType::Output
        } else if type2 == MatchType::Input {
            MatchType::Input
        } else if self.matcher1.match_type(true) == MatchType::Output {
            MatchType::Output
        } else if self.matcher2.match_type(true) == MatchType::Input {
            MatchType::Input
        } else {
            MatchType::None
        };
    }

    fn error(&self) -> bool {
        self.properties & ERROR != 0
    }

    fn refresh_error(&mut self) {
        // Logical aggregation; the operands are queried without testing.
        let error = self.fst1.properties(ERROR, false) != 0
            || self.fst2.properties(ERROR, false) != 0
            || self.matcher1.error()
            || self.matcher2.error()
            || self.state_table.error();
        if error {
            self.properties |= ERROR;
        }
    }

    fn start(&mut self) -> Option<StateId> {
        if !self.cache.has_start() {
            let start = self.compute_start();
            self.cache.set_start(start);
        }
        self.cache.start()
    }

    fn compute_start(&mut self) -> Option<StateId> {
        if self.error() {
            return None;
        }
        let start1 = self.fst1.start()?;
        let start2 = self.fst2.start()?;
        let filter_start = self.filter.start();
        Some(
            self.state_table
                .find_or_insert(StateTuple::new(start1, start2, filter_start)),
        )
    }

    fn final_weight(&mut self, state: StateId) -> W {
        if !self.cache.has_final(state) {
            let weight = self.compute_final(state);
            self.cache.set_final(state, weight);
        }
        self.cache
            .final_weight(state)
            .expect("compose: final weight just computed")
    }

    fn compute_final(&mut self, state: StateId) -> W {
        if self.error() {
            return W::zero();
        }
        let tuple = self.state_table.tuple(state).clone();
        let mut final1 = self.fst1.final_weight(tuple.state1);
        if final1.is_zero() {
            return final1;
        }
        let mut final2 = self.fst2.final_weight(tuple.state2);
        if final2.is_zero() {
            return final2;
        }
        self.filter
            .set_state(tuple.state1, tuple.state2, tuple.filter_state);
        self.filter.filter_final(&mut final1, &mut final2);
        final1.times(&final2)
    }

    fn expanded_arcs(&mut self, state: StateId) -> Rc<Vec<Arc<W>>> {
        if !self.cache.has_arcs(state) {
            self.expand(state);
        }
        self.cache
            .arcs(state)
            .expect("compose: arcs just expanded")
    }

    // Synthesizes the outgoing arcs of a composition state. The side with
    // the cheaper matching drives iteration; the other side is queried by
    // label.
    fn expand(&mut self, state: StateId) {
        if self.error() {
            self.cache.set_arcs(state, Vec::new());
            return;
        }
        let tuple = self.state_table.tuple(state).clone();
        self.filter
            .set_state(tuple.state1, tuple.state2, tuple.filter_state);
        let match_input = self.match_input(tuple.state1, tuple.state2);
        if self.error() {
            self.cache.set_arcs(state, Vec::new());
            return;
        }

        let mut arcs = Vec::new();
        {
            let Self {
                fst1,
                fst2,
                matcher1,
                matcher2,
                filter,
                state_table,
                ..
            } = self;
            if match_input {
                ordered_expand(
                    matcher2.as_mut(),
                    filter.as_mut(),
                    state_table,
                    tuple.state2,
                    fst1.as_ref(),
                    tuple.state1,
                    true,
                    &mut arcs,
                );
            } else {
                ordered_expand(
                    matcher1.as_mut(),
                    filter.as_mut(),
                    state_table,
                    tuple.state1,
                    fst2.as_ref(),
                    tuple.state2,
                    false,
                    &mut arcs,
                );
            }
        }
        if self.state_table.error() {
            self.properties |= ERROR;
        }
        self.cache.set_arcs(state, arcs);
    }

    // Decides which operand performs the matching for this composition
    // state. A side whose matcher requires matching always matches; both
    // requiring it is an error. Otherwise the side with fewer arcs drives
    // iteration, ties in favor of operand 1 driving.
    fn match_input(&mut self, state1: StateId, state2: StateId) -> bool {
        match self.match_type {
            MatchType::Input => true,
            MatchType::Output => false,
            _ => {
                let priority1 = self.matcher1.priority(state1);
                let priority2 = self.matcher2.priority(state2);
                if priority1 == REQUIRE_PRIORITY && priority2 == REQUIRE_PRIORITY {
                    self.properties |= ERROR;
                    return true;
                }
                if priority1 == REQUIRE_PRIORITY {
                    return false;
                }
                if priority2 == REQUIRE_PRIORITY {
                    return true;
                }
                priority1 <= priority2
            }
        }
    }
}

// Expands one composition state: `matcher_a` is positioned on `state_a`
// and queried by label for each arc leaving `state_b` of the driven
// operand, the synthetic non-consuming self-loop first. `match_input`
// says whether the matched side is operand 2's input (operand 1 driving).
#[allow(clippy::too_many_arguments)]
fn ordered_expand<W: Semiring>(
    matcher_a: &mut dyn Matcher<W>,
    filter: &mut dyn ComposeFilter<W>,
    state_table: &mut ComposeStateTable,
    state_a: StateId,
    fst_b: &dyn Fst<W>,
    state_b: StateId,
    match_input: bool,
    arcs: &mut Vec<Arc<W>>,
) {
    matcher_a.set_state(state_a);

    let loop_arc = if match_input {
        Arc::new(EPSILON, NO_LABEL, W::one(), state_b)
    } else {
        Arc::new(NO_LABEL, EPSILON, W::one(), state_b)
    };
    match_arc(matcher_a, filter, state_table, &loop_arc, match_input, arcs);

    for arc_b in fst_b.arcs(state_b) {
        match_arc(matcher_a, filter, state_table, &arc_b, match_input, arcs);
    }
}

// Matches a single driven arc against the matching side and emits the
// accepted pairs in matcher iteration order.
fn match_arc<W: Semiring>(
    matcher_a: &mut dyn Matcher<W>,
    filter: &mut dyn ComposeFilter<W>,
    state_table: &mut ComposeStateTable,
    arc_b: &Arc<W>,
    match_input: bool,
    arcs: &mut Vec<Arc<W>>,
) {
    let label = if match_input { arc_b.olabel } else { arc_b.ilabel };
    if !matcher_a.find(label) {
        return;
    }
    while !matcher_a.done() {
        let arc_a = matcher_a.value().clone();
        matcher_a.next();
        // Operand 1's arc is always the first filter argument.
        let (mut arc1, mut arc2) = if match_input {
            (arc_b.clone(), arc_a)
        } else {
            (arc_a, arc_b.clone())
        };
        let filter_state = filter.filter_arc(&mut arc1, &mut arc2);
        if filter_state == FilterState::NoState {
            continue;
        }
        let nextstate = state_table.find_or_insert(StateTuple::new(
            arc1.nextstate,
            arc2.nextstate,
            filter_state,
        ));
        arcs.push(Arc::new(
            arc1.ilabel,
            arc2.olabel,
            arc1.weight.times(&arc2.weight),
            nextstate,
        ));
    }
}

/// Delayed composition of two transducers.
///
/// The view borrows nothing: operands are held by shared ownership, so a
/// `ComposeFst` can itself be an operand of a further composition (the
/// ownership graph is a DAG terminating in concrete stores). All mutable
/// machinery — matchers, filter, state table, cache — is per-instance, so
/// distinct compositions over the same operands are independent.
pub struct ComposeFst<W: Semiring> {
    isymbols: Option<Rc<SymbolTable>>,
    osymbols: Option<Rc<SymbolTable>>,
    inner: RefCell<ComposeFstImpl<W>>,
}

impl<W: Semiring> ComposeFst<W> {
    /// Composes `fst1` with `fst2` under the default configuration.
    pub fn new(fst1: impl Fst<W> + 'static, fst2: impl Fst<W> + 'static) -> Self {
        Self::with_config(fst1, fst2, ComposeConfig::default())
    }

    /// Composes with an explicit configuration.
    pub fn with_config(
        fst1: impl Fst<W> + 'static,
        fst2: impl Fst<W> + 'static,
        config: ComposeConfig,
    ) -> Self {
        Self::with_options(fst1, fst2, config, ComposeFstOptions::default())
    }

    /// Composes with explicit matchers, filter or state table; the engine
    /// takes ownership of whatever is provided.
    pub fn with_options(
        fst1: impl Fst<W> + 'static,
        fst2: impl Fst<W> + 'static,
        config: ComposeConfig,
        options: ComposeFstOptions<W>,
    ) -> Self {
        let fst1: Rc<dyn Fst<W>> = Rc::new(fst1);
        let fst2: Rc<dyn Fst<W>> = Rc::new(fst2);
        let isymbols = fst1.input_symbols().cloned();
        let osymbols = fst2.output_symbols().cloned();
        let inner = ComposeFstImpl::new(fst1, fst2, &config, options);
        Self {
            isymbols,
            osymbols,
            inner: RefCell::new(inner),
        }
    }

    /// Number of composition states discovered so far.
    pub fn num_known_states(&self) -> usize {
        self.inner.borrow().state_table.len()
    }

    /// Iterator over composition state ids in discovery order, expanding
    /// states as it advances so every reachable state is produced.
    pub fn states(&self) -> ComposeStateIter<'_, W> {
        ComposeStateIter {
            fst: self,
            state: 0,
            started: false,
        }
    }

    /// The composition tuple interned under `state`.
    pub fn state_tuple(&self, state: StateId) -> StateTuple {
        self.inner.borrow().state_table.tuple(state).clone()
    }

    /// A fast-path matcher over the composition for the given side, when
    /// both component matchers support that side and the filter does not
    /// rewrite its labels. The matcher defers to the component matchers
    /// instead of expanding composition states.
    pub fn init_matcher(&self, match_type: MatchType) -> Option<ComposeFstMatcher<'_, W>> {
        if !matches!(match_type, MatchType::Input | MatchType::Output) {
            return None;
        }
        let inner = self.inner.borrow();
        if inner.matcher1.match_type(false) != match_type
            || inner.matcher2.match_type(false) != match_type
        {
            return None;
        }
        if inner.filter.rewrites_labels(match_type) {
            return None;
        }
        let matcher1 = default_matcher(Rc::clone(&inner.fst1), match_type);
        let matcher2 = default_matcher(Rc::clone(&inner.fst2), match_type);
        drop(inner);
        Some(ComposeFstMatcher::new(self, matcher1, matcher2, match_type))
    }

    /// Materializes the composition into a mutable store, preserving the
    /// dense composition state ids. The result is not trimmed.
    pub fn materialize(&self) -> VectorFst<W> {
        let mut ofst = VectorFst::new();
        ofst.set_input_symbols(self.isymbols.clone());
        ofst.set_output_symbols(self.osymbols.clone());

        let start = self.start();
        if let Some(start) = start {
            debug_assert_eq!(start, 0, "composition start is the first interned id");
            // Expanding a state may discover new ones; the snapshots also
            // pin every expansion so nothing is recomputed below.
            let mut snapshots: Vec<Arcs<W>> = Vec::new();
            let mut state = 0;
            while state < self.num_known_states() {
                snapshots.push(self.arcs(state));
                state += 1;
            }

            ofst.reserve_states(snapshots.len());
            for _ in 0..snapshots.len() {
                ofst.add_state();
            }
            ofst.set_start(start);
            for (state, snapshot) in snapshots.into_iter().enumerate() {
                for arc in snapshot {
                    ofst.add_arc(state, arc);
                }
                let final_weight = self.final_weight(state);
                if !final_weight.is_zero() {
                    ofst.set_final(state, final_weight);
                }
            }
        }

        let props = {
            let mut inner = self.inner.borrow_mut();
            inner.refresh_error();
            inner.properties
        };
        ofst.set_properties(props, known_properties(props));
        ofst
    }
}

impl<W: Semiring> Fst<W> for ComposeFst<W> {
    fn start(&self) -> Option<StateId> {
        self.inner.borrow_mut().start()
    }

    fn final_weight(&self, state: StateId) -> W {
        self.inner.borrow_mut().final_weight(state)
    }

    fn num_arcs(&self, state: StateId) -> usize {
        self.inner.borrow_mut().expanded_arcs(state).len()
    }

    fn arcs(&self, state: StateId) -> Arcs<W> {
        Arcs::new(self.inner.borrow_mut().expanded_arcs(state))
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.inner
            .borrow_mut()
            .expanded_arcs(state)
            .iter()
            .filter(|arc| arc.ilabel == EPSILON)
            .count()
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.inner
            .borrow_mut()
            .expanded_arcs(state)
            .iter()
            .filter(|arc| arc.olabel == EPSILON)
            .count()
    }

    fn properties(&self, mask: u64, _test: bool) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.refresh_error();
        inner.properties & mask
    }

    fn input_symbols(&self) -> Option<&Rc<SymbolTable>> {
        self.isymbols.as_ref()
    }

    fn output_symbols(&self) -> Option<&Rc<SymbolTable>> {
        self.osymbols.as_ref()
    }
}

/// State iterator over a delayed composition.
///
/// Each step expands the state it yields, which may discover further
/// states; iteration ends once no undiscovered state remains. On a
/// composition with a cycle-free reachable part this visits exactly the
/// states a materialization would contain.
pub struct ComposeStateIter<'a, W: Semiring> {
    fst: &'a ComposeFst<W>,
    state: StateId,
    started: bool,
}

impl<W: Semiring> Iterator for ComposeStateIter<'_, W> {
    type Item = StateId;

    fn next(&mut self) -> Option<StateId> {
        if !self.started {
            self.started = true;
            self.fst.start()?;
        }
        if self.state >= self.fst.num_known_states() {
            return None;
        }
        let state = self.state;
        // Expanding interns this state's successors.
        let _ = self.fst.arcs(state);
        self.state += 1;
        Some(state)
    }
}

/// Matcher over a composition that defers to matchers on the operands.
pub struct ComposeFstMatcher<'a, W: Semiring> {
    fst: &'a ComposeFst<W>,
    matcher1: Box<dyn Matcher<W>>,
    matcher2: Box<dyn Matcher<W>>,
    match_type: MatchType,
    state: StateId,
    tuple: StateTuple,
    current_loop: bool,
    loop_arc: Arc<W>,
    arc: Arc<W>,
}

impl<'a, W: Semiring> ComposeFstMatcher<'a, W> {
    fn new(
        fst: &'a ComposeFst<W>,
        matcher1: Box<dyn Matcher<W>>,
        matcher2: Box<dyn Matcher<W>>,
        match_type: MatchType,
    ) -> Self {
        let loop_arc = match match_type {
            MatchType::Input => Arc::new(NO_LABEL, EPSILON, W::one(), NO_STATE),
            _ => Arc::new(EPSILON, NO_LABEL, W::one(), NO_STATE),
        };
        Self {
            fst,
            matcher1,
            matcher2,
            match_type,
            state: NO_STATE,
            tuple: StateTuple::new(NO_STATE, NO_STATE, FilterState::NoState),
            current_loop: false,
            loop_arc,
            arc: Arc::new(NO_LABEL, NO_LABEL, W::one(), NO_STATE),
        }
    }

    // Judges one operand arc pair through the shared filter and, on
    // acceptance, interns the successor tuple and stores the composite
    // arc.
    fn match_arc_pair(
        fst: &ComposeFst<W>,
        tuple: &StateTuple,
        out: &mut Arc<W>,
        mut arc1: Arc<W>,
        mut arc2: Arc<W>,
    ) -> bool {
        let mut inner = fst.inner.borrow_mut();
        let inner = &mut *inner;
        inner
            .filter
            .set_state(tuple.state1, tuple.state2, tuple.filter_state);
        let filter_state = inner.filter.filter_arc(&mut arc1, &mut arc2);
        if filter_state == FilterState::NoState {
            return false;
        }
        let nextstate = inner.state_table.find_or_insert(StateTuple::new(
            arc1.nextstate,
            arc2.nextstate,
            filter_state,
        ));
        *out = Arc::new(
            arc1.ilabel,
            arc2.olabel,
            arc1.weight.times(&arc2.weight),
            nextstate,
        );
        true
    }

    // The shared find/advance protocol: with `Some(label)` it starts a
    // fresh enumeration, with `None` it continues the current one. The
    // matching-side matcher leads; for each of its arcs the other matcher
    // enumerates candidate continuations.
    fn search(&mut self, label: Option<Label>) -> bool {
        let match_input = self.match_type == MatchType::Input;
        let Self {
            fst,
            matcher1,
            matcher2,
            tuple,
            arc,
            ..
        } = self;
        let (matcher_a, matcher_b) = if match_input {
            (matcher1, matcher2)
        } else {
            (matcher2, matcher1)
        };

        if let Some(label) = label {
            if !matcher_a.find(label) {
                return false;
            }
            let bridge = if match_input {
                matcher_a.value().olabel
            } else {
                matcher_a.value().ilabel
            };
            matcher_b.find(bridge);
        }

        while !matcher_a.done() || !matcher_b.done() {
            if matcher_b.done() {
                // Advance the lead matcher to its next arc with any
                // continuation on the other side.
                matcher_a.next();
                while !matcher_a.done() {
                    let bridge = if match_input {
                        matcher_a.value().olabel
                    } else {
                        matcher_a.value().ilabel
                    };
                    if matcher_b.find(bridge) {
                        break;
                    }
                    matcher_a.next();
                }
            }
            while !matcher_b.done() {
                let arc_a = matcher_a.value().clone();
                let arc_b = matcher_b.value().clone();
                matcher_b.next();
                let (arc1, arc2) = if match_input {
                    (arc_a, arc_b)
                } else {
                    (arc_b, arc_a)
                };
                if Self::match_arc_pair(*fst, tuple, arc, arc1, arc2) {
                    return true;
                }
            }
        }
        false
    }
}

impl<W: Semiring> Matcher<W> for ComposeFstMatcher<'_, W> {
    fn match_type(&self, test: bool) -> MatchType {
        let type1 = self.matcher1.match_type(test);
        let type2 = self.matcher2.match_type(test);
        if type1 == MatchType::None || type2 == MatchType::None {
            return MatchType::None;
        }
        let unknown1 = type1 == MatchType::Unknown;
        let unknown2 = type2 == MatchType::Unknown;
        if (unknown1 && unknown2)
            || (unknown1 && type2 == self.match_type)
            || (type1 == self.match_type && unknown2)
        {
            return MatchType::Unknown;
        }
        if type1 == self.match_type && type2 == self.match_type {
            self.match_type
        } else {
            MatchType::None
        }
    }

    fn set_state(&mut self, state: StateId) {
        if state == self.state {
            return;
        }
        self.state = state;
        self.tuple = self.fst.state_tuple(state);
        self.matcher1.set_state(self.tuple.state1);
        self.matcher2.set_state(self.tuple.state2);
        self.loop_arc.nextstate = state;
        self.current_loop = false;
    }

    fn find(&mut self, label: Label) -> bool {
        self.current_loop = label == EPSILON;
        let found = self.search(Some(label));
        self.current_loop || found
    }

    fn done(&self) -> bool {
        !self.current_loop && self.matcher1.done() && self.matcher2.done()
    }

    fn value(&self) -> &Arc<W> {
        if self.current_loop {
            &self.loop_arc
        } else {
            &self.arc
        }
    }

    fn next(&mut self) {
        if self.current_loop {
            self.current_loop = false;
        } else {
            self.search(None);
        }
    }

    fn priority(&self, state: StateId) -> isize {
        self.fst.num_arcs(state) as isize
    }
}

/// Eagerly composes two transducers into a mutable store.
///
/// Equivalent to materializing a [`ComposeFst`] that caches only its most
/// recent expansion, then trimming. Construction failures surface as the
/// sticky error property on the result, which is then empty.
pub fn compose<W: Semiring>(
    fst1: impl Fst<W> + 'static,
    fst2: impl Fst<W> + 'static,
) -> VectorFst<W> {
    compose_with_config(fst1, fst2, ComposeConfig::default())
}

/// Eagerly composes under an explicit configuration.
pub fn compose_with_config<W: Semiring>(
    fst1: impl Fst<W> + 'static,
    fst2: impl Fst<W> + 'static,
    mut config: ComposeConfig,
) -> VectorFst<W> {
    let trim = config.connect;
    // Cache only the last expanded state: materialization visits each
    // composition state once.
    config.cache.gc = true;
    config.cache.gc_limit = 0;
    let delayed = ComposeFst::with_config(fst1, fst2, config);
    let mut ofst = delayed.materialize();
    if trim {
        connect(&mut ofst);
    }
    ofst
}
