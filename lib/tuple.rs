//! The label-indexed lattice: a partial map from labels to client facts.
//!
//! A [`Tuple`] attaches one fact to every abstract memory location it knows
//! about and keeps that information consistent as the aliasing sets of
//! variables overlap. Reading through an aliasing set joins the facts of all
//! member labels; writing performs a strong update when exactly one
//! non-summary location can be affected and a weak update otherwise.
//!
//! Tuples follow a copy-on-write discipline. A `Tuple` is frozen: it only
//! supports reads, joins, and precision comparisons, and cloning it is cheap
//! because clones share the underlying fact map. The only way to change
//! analysis information is [`Tuple::mutable_copy`], which deep-copies the
//! facts into a [`MutableTuple`]; freezing that copy back is a one-way
//! transition. A transfer function that wants to update the tuple should
//! call `mutable_copy` once, up front, and return the frozen result.
//!
//! The distinguished bottom tuple means "this program point is not
//! reachable" and is the identity of `join`. It is distinct from a reachable
//! tuple that happens to map nothing, which means "reachable, but nothing is
//! known yet".

use crate::alias::{AliasingSet, AnalysisId, Label};
use crate::fact::Fact;
use crate::{Error, Result, RC};
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;

/// What a tuple reports for an aliasing set none of whose labels has a
/// stored fact. Chosen at construction time.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum UnknownPolicy<F> {
    /// Fail with [`Error::UnknownAliasingSet`]. Use this when every location
    /// the checker reads must have been written first, so an unknown set is
    /// a checker bug.
    Strict,
    /// Report the given fact. Use this when unknown locations legitimately
    /// occur, e.g. the first read of a never-written field.
    Default(F),
}

impl<F: Fact> UnknownPolicy<F> {
    fn resolve(&self, objects: &AliasingSet) -> Result<F> {
        match self {
            UnknownPolicy::Strict => Err(Error::UnknownAliasingSet(objects.to_string())),
            UnknownPolicy::Default(fact) => Ok(fact.clone()),
        }
    }
}

/// The facts of a reachable tuple, plus the cache of facts already derived
/// for whole aliasing sets.
///
/// The explicit bounds keep the skipped cache field from dragging an
/// `F: Default` requirement into the derived `Deserialize` impl.
#[derive(Debug, Deserialize, Serialize)]
#[serde(bound(
    serialize = "F: serde::Serialize",
    deserialize = "F: serde::Deserialize<'de>"
))]
struct Facts<F: Fact> {
    #[serde(with = "info_serde")]
    info: FxHashMap<Label, F>,
    #[serde(skip)]
    derived: RefCell<FxHashMap<AliasingSet, F>>,
}

/// The fact map serialized as a sequence of pairs: labels are structured
/// keys, which map-as-object formats cannot represent.
mod info_serde {
    use crate::alias::Label;
    use rustc_hash::FxHashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<F, S>(info: &FxHashMap<Label, F>, serializer: S) -> Result<S::Ok, S::Error>
    where
        F: Serialize,
        S: Serializer,
    {
        let entries: Vec<(&Label, &F)> = info.iter().collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, F, D>(deserializer: D) -> Result<FxHashMap<Label, F>, D::Error>
    where
        F: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries: Vec<(Label, F)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

impl<F: Fact> Facts<F> {
    fn new(info: FxHashMap<Label, F>) -> Facts<F> {
        Facts {
            info,
            derived: RefCell::new(FxHashMap::default()),
        }
    }

    fn get(&self, objects: &AliasingSet, policy: &UnknownPolicy<F>) -> Result<F> {
        if let Some(cached) = self.derived.borrow().get(objects) {
            return Ok(cached.clone());
        }
        match self.derive(objects)? {
            Some(fact) => {
                self.derived
                    .borrow_mut()
                    .insert(objects.clone(), fact.clone());
                Ok(fact)
            }
            // The policy result is not derived information; never cache it.
            None => policy.resolve(objects),
        }
    }

    /// Join of the stored facts of the individual member labels, or `None`
    /// if no member label has a stored fact.
    fn derive(&self, objects: &AliasingSet) -> Result<Option<F>> {
        let mut derived: Option<F> = None;
        for label in objects.iter() {
            if let Some(fact) = self.info.get(label) {
                derived = Some(match derived {
                    Some(d) => d.join(fact)?,
                    None => fact.clone(),
                });
            }
        }
        Ok(derived)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
enum State<F: Fact> {
    Bottom,
    Reachable(RC<Facts<F>>),
}

/// A frozen label-indexed lattice element.
///
/// Cloning shares the fact map and is cheap; use it to hand the same value
/// to several successor program points. Call [`Tuple::mutable_copy`] to
/// obtain a copy that accepts updates.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Tuple<F: Fact> {
    analysis: AnalysisId,
    policy: UnknownPolicy<F>,
    state: State<F>,
}

impl<F: Fact> Tuple<F> {
    /// A frozen, reachable tuple which maps nothing yet.
    pub fn new(analysis: AnalysisId, policy: UnknownPolicy<F>) -> Tuple<F> {
        Tuple {
            analysis,
            policy,
            state: State::Reachable(RC::new(Facts::new(FxHashMap::default()))),
        }
    }

    /// The bottom tuple: the value of an unreachable program point and the
    /// identity element of [`Tuple::join`].
    pub fn bottom(analysis: AnalysisId, policy: UnknownPolicy<F>) -> Tuple<F> {
        Tuple {
            analysis,
            policy,
            state: State::Bottom,
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self.state, State::Bottom)
    }

    /// The analysis whose labels key this tuple.
    pub fn analysis(&self) -> AnalysisId {
        self.analysis
    }

    fn facts(&self) -> Option<&Facts<F>> {
        match &self.state {
            State::Bottom => None,
            State::Reachable(facts) => Some(facts),
        }
    }

    /// Analysis information for the given aliasing set.
    ///
    /// On the bottom tuple this resolves straight to the unknown policy.
    /// Otherwise the result is the join of the stored facts of all member
    /// labels, memoized per aliasing set, or the policy result if no member
    /// label has a stored fact.
    pub fn get(&self, objects: &AliasingSet) -> Result<F> {
        match self.facts() {
            None => self.policy.resolve(objects),
            Some(facts) => facts.get(objects, &self.policy),
        }
    }

    /// The labels this tuple has information for.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.facts().into_iter().flat_map(|facts| facts.info.keys())
    }

    /// The label/fact pairs this tuple stores.
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &F)> {
        self.facts().into_iter().flat_map(|facts| facts.info.iter())
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.facts()
            .map(|facts| facts.info.contains_key(label))
            .unwrap_or(false)
    }

    /// A mutable, independent copy of this tuple. Every stored fact is
    /// copied, so changes to the copy cannot affect this tuple.
    ///
    /// Copying the bottom tuple yields a fresh reachable tuple that maps
    /// nothing: "unreachable" becomes "reachable but empty". Callers that
    /// need to preserve bottom must check [`Tuple::is_bottom`] first.
    pub fn mutable_copy(&self) -> MutableTuple<F> {
        let info = match self.facts() {
            None => FxHashMap::default(),
            Some(facts) => facts.info.clone(),
        };
        MutableTuple {
            analysis: self.analysis,
            policy: self.policy.clone(),
            facts: Facts::new(info),
        }
    }

    /// Join this tuple with another at a control-flow merge point.
    ///
    /// Bottom is the identity: joining with it returns the other operand.
    /// Otherwise the result maps every label present in either operand, to
    /// the join of both facts where both operands store one, and to a copy
    /// of the single stored fact where only one does — a label absent from
    /// one path contributes no information to the merge, so what the other
    /// path knows is preserved.
    pub fn join(&self, other: &Tuple<F>) -> Result<Tuple<F>> {
        if self.analysis != other.analysis {
            return Err(Error::AnalysisMismatch);
        }
        let self_facts = match self.facts() {
            None => return Ok(other.clone()),
            Some(facts) => facts,
        };
        let other_facts = match other.facts() {
            None => return Ok(self.clone()),
            Some(facts) => facts,
        };

        debug!(
            "joining tuples with {} and {} labels",
            self_facts.info.len(),
            other_facts.info.len()
        );

        let mut info =
            FxHashMap::with_capacity_and_hasher(self_facts.info.len(), Default::default());
        for (label, fact) in &self_facts.info {
            let joined = match other_facts.info.get(label) {
                Some(other_fact) => fact.join(other_fact)?,
                None => fact.clone(),
            };
            info.insert(label.clone(), joined);
        }
        for (label, fact) in &other_facts.info {
            if !self_facts.info.contains_key(label) {
                info.insert(label.clone(), fact.clone());
            }
        }

        Ok(Tuple {
            analysis: self.analysis,
            policy: self.policy.clone(),
            state: State::Reachable(RC::new(Facts::new(info))),
        })
    }

    /// True if this tuple carries at least as much information as `other`.
    ///
    /// Bottom is at least as precise as everything; nothing but bottom is at
    /// least as precise as bottom. Otherwise every fact stored here must be
    /// at least as precise as `other`'s fact for the same label (a label
    /// `other` does not store is maximally imprecise there and satisfied
    /// automatically), and every label `other` stores must be stored here.
    pub fn at_least_as_precise(&self, other: &Tuple<F>) -> bool {
        debug_assert_eq!(self.analysis, other.analysis);
        if self.analysis != other.analysis {
            return false;
        }
        let self_facts = match self.facts() {
            None => return true,
            Some(facts) => facts,
        };
        let other_facts = match other.facts() {
            None => return false,
            Some(facts) => facts,
        };

        for (label, fact) in &self_facts.info {
            if let Some(other_fact) = other_facts.info.get(label) {
                if !fact.at_least_as_precise(other_fact) {
                    return false;
                }
            }
        }
        for label in other_facts.info.keys() {
            if !self_facts.info.contains_key(label) {
                // Other knows about a location this tuple does not.
                return false;
            }
        }
        true
    }
}

impl<F: Fact> Fact for Tuple<F> {
    fn join(&self, other: &Self) -> Result<Self> {
        Tuple::join(self, other)
    }

    fn at_least_as_precise(&self, other: &Self) -> bool {
        Tuple::at_least_as_precise(self, other)
    }
}

impl<F: Fact> fmt::Display for Tuple<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.facts() {
            None => write!(f, "BOTTOM"),
            Some(facts) => {
                let mut entries: Vec<(&Label, &F)> = facts.info.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                write!(
                    f,
                    "{{{}}}",
                    entries
                        .iter()
                        .map(|(label, fact)| format!("{}: {:?}", label, fact))
                        .collect::<Vec<String>>()
                        .join(", ")
                )
            }
        }
    }
}

/// The mutable form of [`Tuple`], obtained through [`Tuple::mutable_copy`].
///
/// A mutable tuple is never bottom and is owned by exactly one transfer
/// function at a time; [`MutableTuple::freeze`] turns it back into a
/// shareable [`Tuple`].
#[derive(Debug)]
pub struct MutableTuple<F: Fact> {
    analysis: AnalysisId,
    policy: UnknownPolicy<F>,
    facts: Facts<F>,
}

impl<F: Fact> MutableTuple<F> {
    /// A fresh mutable tuple which maps nothing yet.
    pub fn new(analysis: AnalysisId, policy: UnknownPolicy<F>) -> MutableTuple<F> {
        MutableTuple {
            analysis,
            policy,
            facts: Facts::new(FxHashMap::default()),
        }
    }

    pub fn analysis(&self) -> AnalysisId {
        self.analysis
    }

    /// Analysis information for the given aliasing set, with the same
    /// derivation and caching behavior as [`Tuple::get`].
    pub fn get(&self, objects: &AliasingSet) -> Result<F> {
        self.facts.get(objects, &self.policy)
    }

    /// Set the analysis information for the given aliasing set.
    ///
    /// A singleton set of a non-summary label is a strong update: the
    /// checker knows exactly which location changed, so its fact is replaced
    /// outright. Any other set is a weak update: the checker cannot tell
    /// which of the possible locations was touched, so each one either
    /// receives the fact (if it had none) or has the fact joined into its
    /// previous one — no location may lose information it already had.
    ///
    /// Fails with [`Error::AnalysisMismatch`] if any label in the set was
    /// created by a different alias analysis; letting such a label into the
    /// fact map would make later joins compare labels from unrelated label
    /// spaces without noticing.
    pub fn put(&mut self, objects: &AliasingSet, fact: F) -> Result<()> {
        for label in objects.iter() {
            if label.analysis() != self.analysis {
                return Err(Error::AnalysisMismatch);
            }
        }

        self.facts.derived.get_mut().clear();

        let labels = objects.labels();
        if objects.is_singleton() && !labels[0].is_summary() {
            // strong update
            self.facts.info.insert(labels[0].clone(), fact.clone());
            // The cache was just cleared; this exact fact is what any get
            // for the same set must observe.
            self.facts.derived.get_mut().insert(objects.clone(), fact);
        } else {
            for label in labels {
                let updated = match self.facts.info.get(label) {
                    Some(previous) => previous.join(&fact)?,
                    None => fact.clone(),
                };
                self.facts.info.insert(label.clone(), updated);
            }
        }
        Ok(())
    }

    /// Drop the information of every label the filter rejects. Used to
    /// discard locations that went dead, e.g. after a scope ends.
    pub fn retain<P: FnMut(&Label) -> bool>(&mut self, mut keep: P) {
        self.facts.derived.get_mut().clear();
        self.facts.info.retain(|label, _| keep(label));
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.facts.info.keys()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.facts.info.contains_key(label)
    }

    /// Freeze this tuple. The result is immutable and cheap to share.
    pub fn freeze(self) -> Tuple<F> {
        Tuple {
            analysis: self.analysis,
            policy: self.policy,
            state: State::Reachable(RC::new(self.facts)),
        }
    }
}
