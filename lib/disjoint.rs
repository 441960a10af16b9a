//! Disjoint-set lattice elements: one fact per aliasing class of keys.
//!
//! Where [`tuple`](crate::tuple) expects the aliasing relation to be handed
//! in wholesale as aliasing sets, [`DisjointTuple`] discovers it
//! incrementally: client keys (typically variables) are grouped into
//! equivalence classes with a union-find partition, and one fact is stored
//! per class representative. Assignments that alias two variables call
//! [`MutableDisjointTuple::union`]; an assignment that gives a variable a
//! definitely-fresh value calls [`MutableDisjointTuple::singleton`], the
//! sole de-aliasing operation.
//!
//! Joining two disjoint-set tuples reconciles the partitions as well as the
//! facts: the result merges every class either operand merged and never
//! splits one, since losing a tracked aliasing relationship is unsound while
//! keeping one unnecessarily only loses precision. The resulting partition
//! is a common coarsening of both inputs.
//!
//! The freeze discipline matches the label-indexed tuple: [`DisjointTuple`]
//! is frozen and cheap to clone, and all mutation happens on a
//! [`MutableDisjointTuple`] obtained through
//! [`DisjointTuple::mutable_copy`].

use crate::fact::Fact;
use crate::{Error, Result, RC};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

fn fact_for<K, F>(
    representatives: &FxHashMap<K, K>,
    facts: &FxHashMap<K, F>,
    bottom: &F,
    key: &K,
) -> F
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    representatives
        .get(key)
        .and_then(|rep| facts.get(rep))
        .cloned()
        .unwrap_or_else(|| bottom.clone())
}

fn same_set<K>(representatives: &FxHashMap<K, K>, key1: &K, key2: &K) -> Result<bool>
where
    K: Clone + Eq + Hash + Debug,
{
    let rep1 = representatives
        .get(key1)
        .ok_or_else(|| Error::UnknownKey(format!("{:?}", key1)))?;
    let rep2 = representatives
        .get(key2)
        .ok_or_else(|| Error::UnknownKey(format!("{:?}", key2)))?;
    Ok(rep1 == rep2)
}

/// Merge `from`'s class into `into`'s, joining the class facts and
/// re-rooting every member of the absorbed class.
fn merge_classes<K, F>(
    representatives: &mut FxHashMap<K, K>,
    facts: &mut FxHashMap<K, F>,
    into: &K,
    from: &K,
    bottom: &F,
) -> Result<()>
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    let members: Vec<K> = representatives
        .iter()
        .filter(|(_, rep)| *rep == from)
        .map(|(key, _)| key.clone())
        .collect();
    for member in members {
        representatives.insert(member, into.clone());
    }

    let from_fact = facts.remove(from);
    let joined = match (facts.get(into), from_fact) {
        (Some(into_fact), Some(from_fact)) => into_fact.join(&from_fact)?,
        (Some(into_fact), None) => into_fact.clone(),
        (None, Some(from_fact)) => from_fact,
        (None, None) => bottom.clone(),
    };
    facts.insert(into.clone(), joined);
    Ok(())
}

/// A frozen disjoint-set lattice element.
///
/// Cloning shares the partition and fact maps and is cheap. Facts are stored
/// only under class representatives; looking up any key first resolves its
/// representative.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DisjointTuple<K, F>
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    bottom: F,
    representatives: RC<FxHashMap<K, K>>,
    facts: RC<FxHashMap<K, F>>,
}

impl<K, F> DisjointTuple<K, F>
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    /// An empty element tracking no keys. `bottom` is what [`get`] reports
    /// for unknown keys and the information a class starts out with when it
    /// is created without an explicit fact.
    ///
    /// [`get`]: DisjointTuple::get
    pub fn new(bottom: F) -> DisjointTuple<K, F> {
        DisjointTuple {
            bottom,
            representatives: RC::new(FxHashMap::default()),
            facts: RC::new(FxHashMap::default()),
        }
    }

    /// The fact for the class containing `key`, or the bottom fact if the
    /// key is unknown.
    pub fn get(&self, key: &K) -> F {
        fact_for(&self.representatives, &self.facts, &self.bottom, key)
    }

    /// The representative of `key`'s class, or `None` if the key is
    /// unknown.
    pub fn representative(&self, key: &K) -> Option<&K> {
        self.representatives.get(key)
    }

    /// Whether the two keys are in the same aliasing class.
    ///
    /// Fails on a key this element has never seen: querying aliasing for an
    /// untracked key is a caller bug, not a lattice condition.
    pub fn in_same_set(&self, key1: &K, key2: &K) -> Result<bool> {
        same_set(&self.representatives, key1, key2)
    }

    /// Every key this element tracks.
    pub fn known_keys(&self) -> impl Iterator<Item = &K> {
        self.representatives.keys()
    }

    /// The representative of every class.
    pub fn set_representatives(&self) -> FxHashSet<K> {
        self.representatives.values().cloned().collect()
    }

    /// A mutable, independent copy; changes to it cannot affect this
    /// element.
    pub fn mutable_copy(&self) -> MutableDisjointTuple<K, F> {
        MutableDisjointTuple {
            bottom: self.bottom.clone(),
            representatives: (*self.representatives).clone(),
            facts: (*self.facts).clone(),
        }
    }

    /// The classes of the partition, each as a list of member keys.
    fn classes(&self) -> Vec<Vec<K>> {
        let mut classes: FxHashMap<&K, Vec<K>> = FxHashMap::default();
        for (key, rep) in self.representatives.iter() {
            classes.entry(rep).or_default().push(key.clone());
        }
        classes.into_values().collect()
    }

    /// Join this element with another at a control-flow merge point.
    ///
    /// The resulting partition is a common coarsening of both inputs: every
    /// class the other operand merged is merged here too, and no class is
    /// ever split. Facts of colliding classes are joined, and the other
    /// operand's per-key facts are joined in afterwards.
    pub fn join(&self, other: &DisjointTuple<K, F>) -> Result<DisjointTuple<K, F>> {
        let mut representatives = (*self.representatives).clone();
        let mut facts = (*self.facts).clone();

        debug!(
            "joining partitions with {} and {} keys",
            representatives.len(),
            other.representatives.len()
        );

        for class in other.classes() {
            // `anchor` is a member of this class already placed in the new
            // partition; every other member must end up in its class.
            let mut anchor: Option<K> = None;
            for key in class {
                let known = representatives.get(&key).cloned();
                match (known, anchor.clone()) {
                    (None, None) => {
                        representatives.insert(key.clone(), key.clone());
                        facts.insert(key.clone(), self.bottom.clone());
                        anchor = Some(key);
                    }
                    (None, Some(a)) => {
                        // Previously unknown key: joins the anchor's class
                        // and contributes no information.
                        let rep = representatives[&a].clone();
                        representatives.insert(key, rep);
                    }
                    (Some(_), None) => anchor = Some(key),
                    (Some(rep), Some(a)) => {
                        let anchor_rep = representatives[&a].clone();
                        if anchor_rep != rep {
                            merge_classes(
                                &mut representatives,
                                &mut facts,
                                &anchor_rep,
                                &rep,
                                &self.bottom,
                            )?;
                        }
                    }
                }
            }
        }

        // Fold the other operand's information into the coarsened
        // partition. For keys the other operand does not track this joins
        // in bottom, which changes nothing.
        let keys: Vec<K> = representatives.keys().cloned().collect();
        for key in keys {
            let rep = representatives[&key].clone();
            let other_fact = other.get(&key);
            let joined = match facts.get(&rep) {
                Some(fact) => fact.join(&other_fact)?,
                None => other_fact,
            };
            facts.insert(rep, joined);
        }

        Ok(DisjointTuple {
            bottom: self.bottom.clone(),
            representatives: RC::new(representatives),
            facts: RC::new(facts),
        })
    }

    /// True if this element carries at least as much information as
    /// `other`: it tracks every key `other` tracks, it considers distinct
    /// every pair of keys `other` considers distinct, and each class fact is
    /// at least as precise.
    pub fn at_least_as_precise(&self, other: &DisjointTuple<K, F>) -> bool {
        for key in other.representatives.keys() {
            if !self.representatives.contains_key(key) {
                return false;
            }
        }
        for key1 in other.representatives.keys() {
            for key2 in other.representatives.keys() {
                let other_same = other.representatives[key1] == other.representatives[key2];
                let self_same = self.representatives[key1] == self.representatives[key2];
                if !other_same && self_same {
                    // This element aliases keys the other keeps apart.
                    return false;
                }
            }
        }
        for key in other.representatives.keys() {
            if !self.get(key).at_least_as_precise(&other.get(key)) {
                return false;
            }
        }
        true
    }
}

impl<K, F> Fact for DisjointTuple<K, F>
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    fn join(&self, other: &Self) -> Result<Self> {
        DisjointTuple::join(self, other)
    }

    fn at_least_as_precise(&self, other: &Self) -> bool {
        DisjointTuple::at_least_as_precise(self, other)
    }
}

/// The mutable form of [`DisjointTuple`], obtained through
/// [`DisjointTuple::mutable_copy`].
#[derive(Debug)]
pub struct MutableDisjointTuple<K, F>
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    bottom: F,
    representatives: FxHashMap<K, K>,
    facts: FxHashMap<K, F>,
}

impl<K, F> MutableDisjointTuple<K, F>
where
    K: Clone + Eq + Hash + Debug,
    F: Fact,
{
    /// A fresh mutable element tracking no keys.
    pub fn new(bottom: F) -> MutableDisjointTuple<K, F> {
        MutableDisjointTuple {
            bottom,
            representatives: FxHashMap::default(),
            facts: FxHashMap::default(),
        }
    }

    /// Remove `key` from its current class, if any.
    ///
    /// If `key` was the representative of a class with further members, the
    /// class is re-rooted at one of them and keeps its fact.
    fn detach(&mut self, key: &K) {
        let rep = match self.representatives.get(key) {
            None => return,
            Some(rep) => rep.clone(),
        };
        if rep != *key {
            // A plain member; the class keeps its representative and fact.
            self.representatives.remove(key);
            return;
        }
        let members: Vec<K> = self
            .representatives
            .iter()
            .filter(|(member, r)| *r == key && *member != key)
            .map(|(member, _)| member.clone())
            .collect();
        let fact = self.facts.remove(key);
        self.representatives.remove(key);
        if let Some(new_rep) = members.first().cloned() {
            for member in members {
                self.representatives.insert(member, new_rep.clone());
            }
            if let Some(fact) = fact {
                self.facts.insert(new_rep, fact);
            }
        }
    }

    /// Make `key` its own class holding `fact`.
    ///
    /// This models an assignment that gives a variable a definitely-fresh,
    /// unaliased value, and is the only operation that takes a key out of a
    /// larger class. A class that was rooted at `key` is re-rooted at one of
    /// its remaining members first and keeps its information.
    pub fn singleton(&mut self, key: K, fact: F) {
        self.detach(&key);
        self.representatives.insert(key.clone(), key.clone());
        self.facts.insert(key, fact);
    }

    /// Move `key` into the class containing `set_key`, leaving that class's
    /// fact unchanged: the newly added key contributes no new information.
    ///
    /// If `set_key` is unknown, a new class containing both keys is created
    /// with bottom information.
    pub fn add_key_to_set(&mut self, key: K, set_key: K) {
        match self.representatives.get(&set_key).cloned() {
            Some(rep) => {
                if self.representatives.get(&key) == Some(&rep) {
                    return;
                }
                self.detach(&key);
                self.representatives.insert(key, rep);
            }
            None => {
                self.detach(&key);
                self.representatives.insert(key, set_key.clone());
                self.representatives
                    .insert(set_key.clone(), set_key.clone());
                self.facts.insert(set_key, self.bottom.clone());
            }
        }
    }

    /// Merge the classes containing the two keys, joining their facts.
    /// Unlike [`add_key_to_set`], both sides' information matters.
    ///
    /// Fails on unknown keys; a no-op when the keys are already aliased.
    ///
    /// [`add_key_to_set`]: MutableDisjointTuple::add_key_to_set
    pub fn union(&mut self, key1: &K, key2: &K) -> Result<()> {
        let rep1 = self
            .representatives
            .get(key1)
            .cloned()
            .ok_or_else(|| Error::UnknownKey(format!("{:?}", key1)))?;
        let rep2 = self
            .representatives
            .get(key2)
            .cloned()
            .ok_or_else(|| Error::UnknownKey(format!("{:?}", key2)))?;
        if rep1 == rep2 {
            return Ok(());
        }
        merge_classes(
            &mut self.representatives,
            &mut self.facts,
            &rep1,
            &rep2,
            &self.bottom,
        )
    }

    /// Replace the fact of the class containing `key`. An unknown key is
    /// inserted as a new singleton class holding `fact`.
    pub fn put(&mut self, key: K, fact: F) {
        match self.representatives.get(&key).cloned() {
            Some(rep) => {
                self.facts.insert(rep, fact);
            }
            None => self.singleton(key, fact),
        }
    }

    /// The fact for the class containing `key`, or the bottom fact if the
    /// key is unknown.
    pub fn get(&self, key: &K) -> F {
        fact_for(&self.representatives, &self.facts, &self.bottom, key)
    }

    pub fn representative(&self, key: &K) -> Option<&K> {
        self.representatives.get(key)
    }

    /// Whether the two keys are in the same aliasing class; fails on
    /// unknown keys.
    pub fn in_same_set(&self, key1: &K, key2: &K) -> Result<bool> {
        same_set(&self.representatives, key1, key2)
    }

    pub fn known_keys(&self) -> impl Iterator<Item = &K> {
        self.representatives.keys()
    }

    /// Freeze this element. The result is immutable and cheap to share.
    pub fn freeze(self) -> DisjointTuple<K, F> {
        DisjointTuple {
            bottom: self.bottom,
            representatives: RC::new(self.representatives),
            facts: RC::new(self.facts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_lattice::TestFact;

    fn empty() -> MutableDisjointTuple<&'static str, TestFact> {
        MutableDisjointTuple::new(TestFact::Bottom)
    }

    #[test]
    fn unknown_key_is_bottom() {
        let sets = empty();
        assert_eq!(sets.get(&"x"), TestFact::Bottom);
        assert_eq!(sets.representative(&"x"), None);
    }

    #[test]
    fn union_joins_facts_and_aliases_keys() {
        let mut sets = empty();
        sets.singleton("a", TestFact::Value(1));
        sets.singleton("b", TestFact::Value(2));
        assert!(!sets.in_same_set(&"a", &"b").unwrap());

        sets.union(&"a", &"b").unwrap();
        assert!(sets.in_same_set(&"a", &"b").unwrap());
        assert_eq!(sets.get(&"a"), TestFact::Top);
        assert_eq!(sets.get(&"b"), TestFact::Top);

        // Union on keys already in the same class is a no-op.
        sets.union(&"b", &"a").unwrap();
        assert_eq!(sets.get(&"a"), TestFact::Top);
    }

    #[test]
    fn union_of_unknown_key_fails() {
        let mut sets = empty();
        sets.singleton("a", TestFact::Value(1));
        match sets.union(&"a", &"b") {
            Err(Error::UnknownKey(_)) => {}
            other => panic!("expected UnknownKey, got {:?}", other),
        }
        match sets.in_same_set(&"b", &"a") {
            Err(Error::UnknownKey(_)) => {}
            other => panic!("expected UnknownKey, got {:?}", other),
        }
    }

    #[test]
    fn partition_stays_valid() {
        let mut sets = empty();
        sets.singleton("a", TestFact::Value(1));
        sets.singleton("b", TestFact::Value(2));
        sets.singleton("c", TestFact::Value(3));
        sets.union(&"a", &"b").unwrap();
        sets.add_key_to_set("d", "a");
        sets.singleton("b", TestFact::Value(4));
        let sets = sets.freeze();

        let keys: Vec<&str> = sets.known_keys().cloned().collect();
        for key in &keys {
            let rep = sets.representative(key).unwrap();
            assert_eq!(sets.representative(rep), Some(rep));
        }
        for key1 in &keys {
            for key2 in &keys {
                assert_eq!(
                    sets.in_same_set(key1, key2).unwrap(),
                    sets.in_same_set(key2, key1).unwrap()
                );
            }
        }
    }

    #[test]
    fn singleton_reroots_a_former_representative() {
        let mut sets = empty();
        sets.singleton("a", TestFact::Value(1));
        sets.singleton("b", TestFact::Value(2));
        sets.union(&"a", &"b").unwrap(); // class {a, b} with fact Top

        sets.singleton("a", TestFact::Value(9));
        assert!(!sets.in_same_set(&"a", &"b").unwrap());
        assert_eq!(sets.get(&"a"), TestFact::Value(9));
        // b keeps the class information it had.
        assert_eq!(sets.get(&"b"), TestFact::Top);
        assert_eq!(sets.representative(&"b"), Some(&"b"));
    }

    #[test]
    fn add_key_to_set_preserves_the_set_fact() {
        let mut sets = empty();
        sets.singleton("s", TestFact::Value(5));
        sets.singleton("k", TestFact::Value(7));
        sets.add_key_to_set("k", "s");

        assert!(sets.in_same_set(&"k", &"s").unwrap());
        // k contributes no information; its old fact is gone.
        assert_eq!(sets.get(&"k"), TestFact::Value(5));
        assert_eq!(sets.get(&"s"), TestFact::Value(5));
    }

    #[test]
    fn add_key_to_unknown_set_key_starts_at_bottom() {
        let mut sets = empty();
        sets.add_key_to_set("k", "s");
        assert!(sets.in_same_set(&"k", &"s").unwrap());
        assert_eq!(sets.get(&"k"), TestFact::Bottom);
    }

    #[test]
    fn put_updates_the_whole_class() {
        let mut sets = empty();
        sets.singleton("a", TestFact::Value(1));
        sets.singleton("b", TestFact::Value(2));
        sets.union(&"a", &"b").unwrap();

        sets.put("b", TestFact::Value(8));
        assert_eq!(sets.get(&"a"), TestFact::Value(8));

        // Unknown keys become fresh singleton classes.
        sets.put("z", TestFact::Value(3));
        assert_eq!(sets.get(&"z"), TestFact::Value(3));
        assert!(!sets.in_same_set(&"z", &"a").unwrap());
    }

    #[test]
    fn mutating_a_copy_leaves_the_frozen_original_alone() {
        let mut sets = empty();
        sets.singleton("a", TestFact::Value(1));
        sets.singleton("b", TestFact::Value(2));
        let frozen = sets.freeze();

        let mut copy = frozen.mutable_copy();
        copy.union(&"a", &"b").unwrap();
        copy.put("a", TestFact::Value(9));

        assert!(!frozen.in_same_set(&"a", &"b").unwrap());
        assert_eq!(frozen.get(&"a"), TestFact::Value(1));
        assert_eq!(copy.get(&"b"), TestFact::Value(9));
    }

    #[test]
    fn join_merges_classes_the_other_operand_merged() {
        let mut left = empty();
        left.singleton("a", TestFact::Value(1));
        left.singleton("b", TestFact::Value(2));
        let left = left.freeze();

        let mut right = empty();
        right.singleton("a", TestFact::Value(1));
        right.singleton("b", TestFact::Value(2));
        right.union(&"a", &"b").unwrap();
        right.singleton("c", TestFact::Value(3));
        let right = right.freeze();

        let joined = left.join(&right).unwrap();
        // Aliased in either operand means aliased in the result.
        assert!(joined.in_same_set(&"a", &"b").unwrap());
        assert_eq!(joined.get(&"a"), TestFact::Top);
        // Keys tracked by only one operand survive.
        assert_eq!(joined.get(&"c"), TestFact::Value(3));
        assert!(!joined.in_same_set(&"c", &"a").unwrap());

        // The result aliases keys `left` keeps distinct, so it is not at
        // least as precise as `left`.
        assert!(!joined.at_least_as_precise(&left));
        // `right` was already a coarsening of `left` plus the extra key, so
        // the join is equivalent to it.
        assert!(right.at_least_as_precise(&joined));
        assert!(joined.at_least_as_precise(&right));
    }

    #[test]
    fn join_is_commutative_up_to_equivalence() {
        let mut left = empty();
        left.singleton("a", TestFact::Value(1));
        left.singleton("b", TestFact::Value(1));
        left.union(&"a", &"b").unwrap();
        let left = left.freeze();

        let mut right = empty();
        right.singleton("b", TestFact::Value(1));
        right.singleton("c", TestFact::Value(4));
        let right = right.freeze();

        let lr = left.join(&right).unwrap();
        let rl = right.join(&left).unwrap();
        for key in [&"a", &"b", &"c"] {
            assert_eq!(lr.get(key), rl.get(key));
        }
        assert!(lr.at_least_as_precise(&rl));
        assert!(rl.at_least_as_precise(&lr));
    }

    #[test]
    fn serde_round_trip() {
        let mut sets = MutableDisjointTuple::<String, TestFact>::new(TestFact::Bottom);
        sets.singleton("a".to_string(), TestFact::Value(1));
        sets.singleton("b".to_string(), TestFact::Value(2));
        sets.union(&"a".to_string(), &"b".to_string()).unwrap();
        let sets = sets.freeze();

        let json = serde_json::to_string(&sets).unwrap();
        let back: DisjointTuple<String, TestFact> = serde_json::from_str(&json).unwrap();
        assert!(back.in_same_set(&"a".to_string(), &"b".to_string()).unwrap());
        assert_eq!(back.get(&"a".to_string()), TestFact::Top);
        assert_eq!(back.get(&"c".to_string()), TestFact::Bottom);
    }

    #[test]
    fn precision_requires_knowing_the_other_keys() {
        let mut small = empty();
        small.singleton("a", TestFact::Value(1));
        let small = small.freeze();

        let mut big = empty();
        big.singleton("a", TestFact::Value(1));
        big.singleton("b", TestFact::Value(2));
        let big = big.freeze();

        assert!(big.at_least_as_precise(&small));
        assert!(!small.at_least_as_precise(&big));
    }
}
