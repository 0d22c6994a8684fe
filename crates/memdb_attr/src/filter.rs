//! Precomputed query descriptors.

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeId;
use crate::signature::Signature;

/// A reusable query over table signatures: match tables whose schema is a
/// superset of the inclusive set and shares nothing with the exclusive set.
///
/// Construction sorts the ids and allocates both signatures, which is the
/// expensive part — build a `FilterSet` once and reuse it across many
/// queries rather than rebuilding it per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSet {
    inclusive: Signature,
    exclusive: Signature,
    inclusive_ids: Vec<AttributeId>,
    exclusive_ids: Vec<AttributeId>,
}

impl FilterSet {
    /// Build a filter from inclusive and exclusive attribute sets.
    ///
    /// Duplicates collapse and construction order is irrelevant.
    #[must_use]
    pub fn new(inclusive: &[AttributeId], exclusive: &[AttributeId]) -> Self {
        let mut inclusive_ids = inclusive.to_vec();
        inclusive_ids.sort_unstable();
        inclusive_ids.dedup();

        let mut exclusive_ids = exclusive.to_vec();
        exclusive_ids.sort_unstable();
        exclusive_ids.dedup();

        Self {
            inclusive: Signature::from_ids(&inclusive_ids),
            exclusive: Signature::from_ids(&exclusive_ids),
            inclusive_ids,
            exclusive_ids,
        }
    }

    /// Convenience constructor for a filter with no exclusions.
    #[must_use]
    pub fn with(inclusive: &[AttributeId]) -> Self {
        Self::new(inclusive, &[])
    }

    /// The mask a matching table's signature must be a superset of.
    #[must_use]
    pub fn inclusive(&self) -> &Signature {
        &self.inclusive
    }

    /// The mask a matching table's signature must share no bit with.
    #[must_use]
    pub fn exclusive(&self) -> &Signature {
        &self.exclusive
    }

    /// The inclusive attributes in ascending id order. Datasets resolve
    /// their column views in exactly this order.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeId] {
        &self.inclusive_ids
    }
}

/// Equality is over the sorted id sets rather than the signatures, so
/// filters built from the same logical sets in any construction order
/// compare equal — including filters with no exclusions, where signature
/// comparison alone would refuse to match two empties.
impl PartialEq for FilterSet {
    fn eq(&self, other: &Self) -> bool {
        self.inclusive_ids == other.inclusive_ids && self.exclusive_ids == other.exclusive_ids
    }
}

impl Eq for FilterSet {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<AttributeId> {
        raw.iter().copied().map(AttributeId::from_raw).collect()
    }

    #[test]
    fn test_construction_order_is_irrelevant() {
        let a = FilterSet::new(&ids(&[3, 1, 2]), &ids(&[9, 8]));
        let b = FilterSet::new(&ids(&[2, 3, 1]), &ids(&[8, 9]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_filters_without_exclusions_compare_equal() {
        let a = FilterSet::with(&ids(&[4, 7]));
        let b = FilterSet::new(&ids(&[7, 4]), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_sets_are_unequal() {
        let a = FilterSet::with(&ids(&[1, 2]));
        let b = FilterSet::with(&ids(&[1, 3]));
        assert_ne!(a, b);

        let c = FilterSet::new(&ids(&[1, 2]), &ids(&[5]));
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicates_collapse() {
        let filter = FilterSet::new(&ids(&[2, 2, 1]), &[]);
        let attrs: Vec<u32> = filter.attributes().iter().map(|id| id.id()).collect();
        assert_eq!(attrs, vec![1, 2]);
    }

    #[test]
    fn test_signatures_reflect_the_sets() {
        let filter = FilterSet::new(&ids(&[1, 2]), &ids(&[3]));
        assert!(filter.inclusive().contains(AttributeId::from_raw(1)));
        assert!(filter.inclusive().contains(AttributeId::from_raw(2)));
        assert!(filter.exclusive().contains(AttributeId::from_raw(3)));
        assert!(!filter.exclusive().contains(AttributeId::from_raw(1)));
    }
}
