//! The lattice contract client analysis facts implement.

use crate::Result;
use std::fmt::Debug;

/// A client-supplied analysis fact: one element of the client's lattice.
///
/// The lattice core never interprets fact contents; it only copies, joins,
/// and compares them. `Clone` must be deep enough that mutating a clone
/// cannot affect the original.
///
/// Tuples implement `Fact` themselves, so a tuple of facts is again a fact
/// and plugs into the fixpoint driver, or into another tuple, unchanged.
pub trait Fact: Clone + Debug {
    /// Least upper bound of `self` and `other`.
    ///
    /// Must be commutative and associative up to the lattice's equivalence,
    /// and idempotent: `f.join(&f)` is equivalent to `f`.
    fn join(&self, other: &Self) -> Result<Self>;

    /// Partial-order test: true if `self` carries at least as much
    /// information as `other`. Used by the fixpoint driver to detect
    /// convergence.
    fn at_least_as_precise(&self, other: &Self) -> bool;
}
