//! # libwfst
//!
//! Weighted finite-state transducers with delayed, cache-backed
//! composition.
//!
//! The crate centers on [`compose::ComposeFst`], a delayed view whose
//! states are synthesized on first access: matching is delegated to
//! per-operand [`matcher::Matcher`]s, epsilon interleavings are
//! disambiguated by a [`compose::ComposeFilter`], composition tuples are
//! interned by a state table and expansions are memoized in a
//! [`cache::CacheStore`] with optional LRU eviction. Around the core sit
//! the mutable store [`vector_fst::VectorFst`], the property algebra,
//! symbol tables with labeled fingerprints, binary serialization and the
//! supporting passes (connect, invert, topological and arc sorting,
//! union, concatenation, closure).
//!
//! ## Example
//!
//! ```rust,ignore
//! use libwfst::prelude::*;
//!
//! let mut a = VectorFst::<TropicalWeight>::new();
//! let s0 = a.add_state();
//! let s1 = a.add_state();
//! a.set_start(s0);
//! a.set_final(s1, TropicalWeight::one());
//! a.add_arc(s0, Arc::new(1, 2, TropicalWeight::new(0.5), s1));
//!
//! let mut b = VectorFst::<TropicalWeight>::new();
//! let t0 = b.add_state();
//! let t1 = b.add_state();
//! b.set_start(t0);
//! b.set_final(t1, TropicalWeight::one());
//! b.add_arc(t0, Arc::new(2, 3, TropicalWeight::new(0.25), t1));
//!
//! let composed = compose(a, b);
//! assert_eq!(composed.num_states(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod arc;
pub mod cache;
pub mod compose;
pub mod config;
pub mod fst;
pub mod io;
pub mod matcher;
pub mod properties;
pub mod semiring;
pub mod symbol_table;
pub mod vector_fst;

/// Common imports for convenient usage.
pub mod prelude {
    pub use crate::algorithms::{
        arc_sort, closure, concat, connect, invert, top_sort, union, ArcSortType, ClosureType,
    };
    pub use crate::arc::{Arc, Label, StateId, EPSILON, NO_LABEL, NO_STATE};
    pub use crate::cache::CacheOptions;
    pub use crate::compose::{
        compose, compose_with_config, ComposeConfig, ComposeFst, ComposeFstOptions, FilterKind,
    };
    pub use crate::fst::{ExpandedFst, Fst, MutableFst};
    pub use crate::matcher::{HashMatcher, MatchType, Matcher, SortedMatcher};
    pub use crate::semiring::{LogWeight, Semiring, TropicalWeight, DELTA};
    pub use crate::symbol_table::SymbolTable;
    pub use crate::vector_fst::VectorFst;
}
