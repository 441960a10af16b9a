//! Labels, aliasing sets, and the alias oracle interface.
//!
//! A [`Label`] is an opaque identity for one abstract memory location: an
//! allocation site, a parameter, a field, or a summary node standing for
//! several run-time objects. Labels are created exactly once through a
//! [`LabelContext`] and never mutated; the lattice treats them purely as keys.
//!
//! An [`AliasingSet`] is the immutable, non-empty set of labels a variable or
//! expression may denote at a program point. Aliasing sets are produced by an
//! external alias analysis implementing [`AliasOracle`]; this crate does not
//! validate that analysis, it only consumes its output.

use crate::{Error, Result, RC};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_ANALYSIS: AtomicU64 = AtomicU64::new(0);

/// Identifies one alias-analysis instance.
///
/// Lattice elements remember the analysis their labels came from, so that
/// joining elements built against different analyses fails fast instead of
/// silently mixing incomparable locations.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct AnalysisId(u64);

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "analysis-{}", self.0)
    }
}

/// Allocator for the labels of one alias-analysis instance.
///
/// A context is owned by the alias oracle for one per-method analysis run.
/// Label indices are never reused, so label identity is equivalent to
/// reference equality.
#[derive(Debug)]
pub struct LabelContext {
    analysis: AnalysisId,
    next_label: Cell<u64>,
}

impl LabelContext {
    pub fn new() -> LabelContext {
        LabelContext {
            analysis: AnalysisId(NEXT_ANALYSIS.fetch_add(1, AtomicOrdering::Relaxed)),
            next_label: Cell::new(0),
        }
    }

    /// The identity of the analysis this context belongs to.
    pub fn analysis(&self) -> AnalysisId {
        self.analysis
    }

    /// Create a label for a precise location, such as a single allocation
    /// site or a parameter.
    pub fn label<S: Into<String>>(&self, name: S) -> Label {
        self.create(name.into(), false)
    }

    /// Create a summary label, which may represent multiple concrete objects
    /// (for example an allocation inside a loop). Updates through a summary
    /// label are always weak.
    pub fn summary<S: Into<String>>(&self, name: S) -> Label {
        self.create(name.into(), true)
    }

    fn create(&self, name: String, summary: bool) -> Label {
        let index = self.next_label.get();
        self.next_label.set(index + 1);
        Label(RC::new(LabelData {
            analysis: self.analysis,
            index,
            name,
            summary,
        }))
    }
}

impl Default for LabelContext {
    fn default() -> LabelContext {
        LabelContext::new()
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct LabelData {
    analysis: AnalysisId,
    index: u64,
    name: String,
    summary: bool,
}

/// An opaque identity for one abstract memory location.
///
/// Cheap to clone. Equality, ordering, and hashing are by identity (the
/// creating analysis and the label index), never by name.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Label(RC<LabelData>);

impl Label {
    /// The name given to this label when it was created. For debugging and
    /// display only; names carry no identity.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether this label may represent multiple concrete objects.
    pub fn is_summary(&self) -> bool {
        self.0.summary
    }

    /// The analysis this label was created by.
    pub fn analysis(&self) -> AnalysisId {
        self.0.analysis
    }

    fn key(&self) -> (AnalysisId, u64) {
        (self.0.analysis, self.0.index)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Label) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Label) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Label) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.summary {
            write!(f, "{}*", self.0.name)
        } else {
            write!(f, "{}", self.0.name)
        }
    }
}

/// The set of labels a variable may denote at a program point.
///
/// Immutable and never empty. Stored in canonical order, so two aliasing
/// sets compare equal whenever they contain the same labels, regardless of
/// construction order; this is what lets them key the derivation cache.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AliasingSet {
    labels: RC<Vec<Label>>,
}

impl AliasingSet {
    /// Create an aliasing set from the given labels. Duplicates are removed.
    ///
    /// Fails with [`Error::EmptyAliasingSet`] if no labels are given: a
    /// variable always denotes at least one location, so an empty set is a
    /// bug in the caller.
    pub fn new<I: IntoIterator<Item = Label>>(labels: I) -> Result<AliasingSet> {
        let mut labels: Vec<Label> = labels.into_iter().collect();
        labels.sort();
        labels.dedup();
        if labels.is_empty() {
            return Err(Error::EmptyAliasingSet);
        }
        Ok(AliasingSet {
            labels: RC::new(labels),
        })
    }

    /// Create an aliasing set holding exactly one label.
    pub fn singleton(label: Label) -> AliasingSet {
        AliasingSet {
            labels: RC::new(vec![label]),
        }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false: construction rejects empty label sets.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// True if this set contains exactly one label, i.e. the variable is
    /// known to denote exactly one location and a strong update is valid.
    pub fn is_singleton(&self) -> bool {
        self.labels.len() == 1
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.labels.binary_search(label).is_ok()
    }

    /// True if this set and the other share any label.
    pub fn overlaps(&self, other: &AliasingSet) -> bool {
        self.labels.iter().any(|label| other.contains(label))
    }

    pub fn iter(&self) -> std::slice::Iter<Label> {
        self.labels.iter()
    }
}

impl fmt::Display for AliasingSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.labels
                .iter()
                .map(|label| format!("{}", label))
                .collect::<Vec<String>>()
                .join(", ")
        )
    }
}

/// The alias analysis this crate consumes.
///
/// An oracle is itself a flow analysis producing a monotone abstraction of
/// which locations each variable may denote at each program point. The
/// lattice core does not validate its soundness; it only uses its output as
/// tuple keys.
pub trait AliasOracle {
    /// The client's variable representation.
    type Variable;
    /// The client's program point representation.
    type Location;

    /// The identity of this oracle's analysis. All labels in the returned
    /// aliasing sets must be created by a context with this identity.
    fn analysis(&self) -> AnalysisId;

    /// The set of labels `variable` may denote at `location`.
    fn aliasing_set(
        &self,
        variable: &Self::Variable,
        location: &Self::Location,
    ) -> Result<AliasingSet>;
}
