//! Algorithms over materialized automata.

mod arc_sort;
mod connect;
mod invert;
mod rational;
mod topsort;

pub use arc_sort::{arc_sort, ArcSortType};
pub use connect::connect;
pub use invert::invert;
pub use rational::{closure, concat, union, ClosureType};
pub use topsort::{state_sort, top_sort};
