//! Alias-aware lattice elements for flow-sensitive static analysis.
//!
//! This library provides the lattice core for analyses that attach facts to
//! abstract memory locations while the set of locations a variable may denote
//! changes across the program. It is generic over the client's fact type and
//! makes no assumptions about the program representation being analyzed.
//!
//! * The `alias` module defines [`Label`](alias::Label), an opaque identity
//!   for one abstract memory location, and [`AliasingSet`](alias::AliasingSet),
//!   the set of labels a variable may denote at a program point.
//! * The `fact` module defines the [`Fact`](fact::Fact) trait every client
//!   lattice value implements.
//! * The `tuple` module maps labels to facts with strong/weak updates and a
//!   copy-on-write freeze discipline.
//! * The `disjoint` module groups client keys into aliasing classes with a
//!   union-find partition, storing one fact per class.
//! * The `fixed_point` module is a worklist driver that iterates a transfer
//!   function over a flow graph until the lattice values stabilize.
//!
//! Lattice elements come in frozen and mutable flavors as distinct types.
//! A frozen [`Tuple`](tuple::Tuple) is cheap to clone and hand to several
//! successor program points; [`Tuple::mutable_copy`](tuple::Tuple::mutable_copy)
//! is the only way to obtain a [`MutableTuple`](tuple::MutableTuple) that
//! accepts updates, and freezing it back is a one-way, compile-time-checked
//! transition.
//!
//! Every instance belongs to exactly one in-flight fixpoint computation.
//! Never share a tuple, or its backing maps, across two concurrently running
//! computations.

pub mod alias;
pub mod disjoint;
mod error;
pub mod fact;
pub mod fixed_point;
pub mod tuple;

#[cfg(test)]
mod test_lattice;

pub use crate::error::{Error, Result};

/// Shared-ownership wrapper for the frozen, cheaply-clonable structures.
pub type RC<T> = std::rc::Rc<T>;
