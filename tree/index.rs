use crate::{
	error::UnknownEntityError,
	stats::{Stats, StatsMap},
};
use std::collections::BTreeMap;

/// One element of an entity's rating list: the id of the counterpart entity, the raw rating, and the bias-corrected rating.
///
/// In the item index the counterpart is a user and in the user index it is an item. The unbiased value starts out equal to the raw rating and is adjusted once, after the index is sorted, when user biases are computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingEntry {
	pub id: usize,
	pub rating: f64,
	pub rating_unbiased: f64,
}

impl RatingEntry {
	pub fn new(id: usize, rating: f64) -> Self {
		Self {
			id,
			rating,
			rating_unbiased: rating,
		}
	}
}

/// A half-open range `[left, right)` into one entity's rating list, denoting the contiguous slice that belongs to one tree node.
///
/// Bounds are recomputed for the children whenever a node is split, never mutated in place.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Bound {
	pub left: usize,
	pub right: usize,
}

impl Bound {
	pub fn new(left: usize, right: usize) -> Self {
		Self { left, right }
	}

	pub fn len(&self) -> usize {
		self.right - self.left
	}

	pub fn is_empty(&self) -> bool {
		self.right == self.left
	}
}

/// Sorted per-entity rating lists, the substrate for all partitioning.
///
/// The index is built once by appending entries, then `sort_all` must be called before any range operation. Entity enumeration order is ascending id, which downstream code relies on for determinism.
#[derive(Debug, Default)]
pub struct RatingIndex {
	index: BTreeMap<usize, Vec<RatingEntry>>,
}

impl RatingIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// The number of indexed entities.
	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	/// Append an entry to an entity's list. Order does not matter until `sort_all` runs.
	pub fn insert(&mut self, entity_id: usize, entry: RatingEntry) {
		self.index.entry(entity_id).or_insert_with(Vec::new).push(entry)
	}

	/// Stable-sort every entity's list by counterpart id. This is a required precondition for every range operation below.
	pub fn sort_all(&mut self) {
		for entry in self.index.values_mut() {
			entry.sort_by(|lhs, rhs| {
				lhs.id
					.cmp(&rhs.id)
					.then(lhs.rating.partial_cmp(&rhs.rating).unwrap())
			});
		}
	}

	pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
		self.index.keys().copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = (usize, &[RatingEntry])> {
		self.index.iter().map(|(id, entry)| (*id, entry.as_slice()))
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Vec<RatingEntry>)> {
		self.index.iter_mut().map(|(id, entry)| (*id, entry))
	}

	/// Look up one entity's full rating list. An absent id is an error, never an empty slice.
	pub fn entry(&self, entity_id: usize) -> Result<&[RatingEntry], UnknownEntityError> {
		self.index
			.get(&entity_id)
			.map(|entry| entry.as_slice())
			.ok_or(UnknownEntityError(entity_id))
	}

	pub(crate) fn entry_mut(
		&mut self,
		entity_id: usize,
	) -> Result<&mut [RatingEntry], UnknownEntityError> {
		self.index
			.get_mut(&entity_id)
			.map(|entry| entry.as_mut_slice())
			.ok_or(UnknownEntityError(entity_id))
	}

	/// Accumulate every rating of the given entity into `stats`, keyed by counterpart id.
	pub fn update_stats(
		&self,
		stats: &mut StatsMap,
		entity_id: usize,
	) -> Result<(), UnknownEntityError> {
		for entry in self.entry(entity_id)? {
			stats.entry(entry.id).or_insert_with(Stats::default).update(entry);
		}
		Ok(())
	}

	/// Statistics over the whole index, keyed by counterpart id. This is how the root node's stats are computed from the user index.
	pub fn all_stats(&self) -> StatsMap {
		let mut stats = StatsMap::new();
		for (_, entry) in self.iter() {
			for rating in entry {
				stats.entry(rating.id).or_insert_with(Stats::default).update(rating);
			}
		}
		stats
	}

	/// Statistics over the `bound` sub-range of one entity's list, keyed by counterpart id.
	pub fn aggregate(&self, entity_id: usize, bound: Bound) -> Result<StatsMap, UnknownEntityError> {
		let entry = self.entry(entity_id)?;
		let mut stats = StatsMap::new();
		for rating in &entry[bound.left..bound.right] {
			stats.entry(rating.id).or_insert_with(Stats::default).update(rating);
		}
		Ok(stats)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_fixture::fixture_ratings;

	fn fixture_index() -> (RatingIndex, RatingIndex) {
		let mut item_index = RatingIndex::new();
		let mut user_index = RatingIndex::new();
		for rating in fixture_ratings() {
			item_index.insert(rating.item_id, RatingEntry::new(rating.user_id, rating.value));
			user_index.insert(rating.user_id, RatingEntry::new(rating.item_id, rating.value));
		}
		item_index.sort_all();
		user_index.sort_all();
		(item_index, user_index)
	}

	#[test]
	fn test_index_shape() {
		let (item_index, user_index) = fixture_index();
		assert_eq!(item_index.len(), 7);
		assert_eq!(user_index.len(), 11);
		let item_sizes: Vec<usize> = (0..7).map(|i| item_index.entry(i).unwrap().len()).collect();
		assert_eq!(item_sizes, vec![3, 4, 3, 5, 2, 2, 4]);
		let user_sizes: Vec<usize> =
			(0..11).map(|u| user_index.entry(u).unwrap().len()).collect();
		assert_eq!(user_sizes, vec![3, 4, 2, 2, 2, 1, 2, 2, 2, 2, 1]);
		// Entries are sorted ascending by counterpart id.
		assert_eq!(item_index.entry(0).unwrap()[1], RatingEntry::new(6, 5.0));
		assert_eq!(item_index.entry(1).unwrap()[3], RatingEntry::new(7, 4.0));
		assert_eq!(item_index.entry(3).unwrap()[4], RatingEntry::new(9, 1.0));
		assert_eq!(user_index.entry(0).unwrap()[2], RatingEntry::new(3, 5.0));
		assert_eq!(user_index.entry(10).unwrap()[0], RatingEntry::new(0, 5.0));
	}

	#[test]
	fn test_absent_entity_is_an_error() {
		let (item_index, _) = fixture_index();
		let error = item_index.entry(99).unwrap_err();
		assert_eq!(error.0, 99);
		let mut stats = StatsMap::new();
		assert!(item_index.update_stats(&mut stats, 99).is_err());
		assert!(item_index.aggregate(99, Bound::new(0, 0)).is_err());
	}

	#[test]
	fn test_all_stats() {
		let (_, user_index) = fixture_index();
		let stats = user_index.all_stats();
		let sums: Vec<f64> = (0..7).map(|i| stats[&i].sum).collect();
		let sum2s: Vec<f64> = (0..7).map(|i| stats[&i].sum2).collect();
		let counts: Vec<i64> = (0..7).map(|i| stats[&i].count).collect();
		assert_eq!(sums, vec![14.0, 13.0, 10.0, 13.0, 6.0, 6.0, 14.0]);
		assert_eq!(sum2s, vec![66.0, 51.0, 38.0, 47.0, 20.0, 26.0, 58.0]);
		assert_eq!(counts, vec![3, 4, 3, 5, 2, 2, 4]);
	}

	#[test]
	fn test_aggregate_sub_range() {
		let (item_index, _) = fixture_index();
		// Item 3's list is [(0,5), (1,1), (4,4), (7,2), (9,1)].
		let stats = item_index.aggregate(3, Bound::new(1, 4)).unwrap();
		assert_eq!(stats.len(), 3);
		assert_eq!(stats[&1].sum, 1.0);
		assert_eq!(stats[&4].sum, 4.0);
		assert_eq!(stats[&7].sum, 2.0);
		let full = item_index.aggregate(3, Bound::new(0, 5)).unwrap();
		assert_eq!(full.values().map(|stats| stats.count).sum::<i64>(), 5);
	}
}
