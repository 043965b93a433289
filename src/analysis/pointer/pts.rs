//! Points-to sets.

use std::collections::BTreeSet;

use super::elements::CsObjId;

/// A set of context-sensitive heap objects.
///
/// Points-to sets grow monotonically during the analysis and are never
/// shared between pointers; every pointer owns its own set.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PointsToSet(BTreeSet<CsObjId>);

impl PointsToSet {
    /// Create an empty set.
    pub fn new() -> PointsToSet {
        PointsToSet::default()
    }

    /// Create a set containing a single object.
    pub fn singleton(obj: CsObjId) -> PointsToSet {
        let mut set = PointsToSet::new();
        set.add(obj);
        set
    }

    /// Add an object. Returns whether the set changed.
    pub fn add(&mut self, obj: CsObjId) -> bool {
        self.0.insert(obj)
    }

    /// Returns whether the object is in the set.
    pub fn contains(&self, obj: CsObjId) -> bool {
        self.0.contains(&obj)
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of objects in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the objects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = CsObjId> + '_ {
        self.0.iter().copied()
    }

    /// The objects of `self` that are not in `other`.
    pub fn difference(&self, other: &PointsToSet) -> PointsToSet {
        PointsToSet(self.0.difference(&other.0).copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_difference() {
        let mut set = PointsToSet::new();
        assert!(set.add(CsObjId(1)));
        assert!(!set.add(CsObjId(1)));
        set.add(CsObjId(2));

        let other = PointsToSet::singleton(CsObjId(2));
        let delta = set.difference(&other);
        assert_eq!(delta.iter().collect::<Vec<_>>(), vec![CsObjId(1)]);
        assert!(other.difference(&set).is_empty());
    }
}
