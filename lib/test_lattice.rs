//! A minimal flat lattice used as the fact type in tests.

use crate::fact::Fact;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Bottom < Value(n) < Top, with distinct values incomparable.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub(crate) enum TestFact {
    Bottom,
    Value(u64),
    Top,
}

impl Fact for TestFact {
    fn join(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (TestFact::Bottom, fact) | (fact, TestFact::Bottom) => fact.clone(),
            (TestFact::Top, _) | (_, TestFact::Top) => TestFact::Top,
            (TestFact::Value(a), TestFact::Value(b)) => {
                if a == b {
                    TestFact::Value(*a)
                } else {
                    TestFact::Top
                }
            }
        })
    }

    fn at_least_as_precise(&self, other: &Self) -> bool {
        match (self, other) {
            (TestFact::Bottom, _) => true,
            (_, TestFact::Top) => true,
            (a, b) => a == b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_order_agree() {
        let facts = [TestFact::Bottom, TestFact::Value(1), TestFact::Value(2), TestFact::Top];
        for a in &facts {
            for b in &facts {
                let joined = a.join(b).unwrap();
                assert!(joined.at_least_as_precise(&joined));
                assert!(a.at_least_as_precise(&joined));
                assert!(b.at_least_as_precise(&joined));
                assert_eq!(joined, b.join(a).unwrap());
            }
        }
    }
}
