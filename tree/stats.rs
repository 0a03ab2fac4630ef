use crate::index::RatingEntry;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running rating statistics for one item within one node: raw and bias-corrected sums, sums of squares, and the observation count.
///
/// Splitting decisions use the bias-corrected sums so that per-user rating scale does not dominate the split choice; predictions use the raw sums.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Stats {
	pub sum: f64,
	pub sum_unbiased: f64,
	pub sum2: f64,
	pub sum2_unbiased: f64,
	pub count: i64,
}

/// Per-item statistics for one node, keyed by item id.
pub type StatsMap = BTreeMap<usize, Stats>;

impl Stats {
	/// Accumulate one observation.
	pub fn update(&mut self, entry: &RatingEntry) {
		self.sum += entry.rating;
		self.sum_unbiased += entry.rating_unbiased;
		self.sum2 += entry.rating * entry.rating;
		self.sum2_unbiased += entry.rating_unbiased * entry.rating_unbiased;
		self.count += 1;
	}

	/// Subtract another record componentwise. Used to derive residual statistics for the UNKNOWN branch.
	pub fn subtract(&mut self, other: &Stats) {
		self.sum -= other.sum;
		self.sum_unbiased -= other.sum_unbiased;
		self.sum2 -= other.sum2;
		self.sum2_unbiased -= other.sum2_unbiased;
		self.count -= other.count;
	}

	/// The bias-corrected squared error of this item's ratings around their mean.
	pub fn squared_error(&self) -> f64 {
		debug_assert!(self.count > 0);
		let count = self.count.to_f64().unwrap();
		self.sum2_unbiased - self.sum_unbiased * self.sum_unbiased / count
	}

	/// The plain average rating.
	pub fn prediction(&self) -> f64 {
		debug_assert!(self.count > 0);
		self.sum / self.count.to_f64().unwrap()
	}

	/// The average rating shrunk toward the parent node's prediction, weighted by `h_smooth`.
	pub fn smoothed_prediction(&self, parent_prediction: f64, h_smooth: f64) -> f64 {
		(self.sum + h_smooth * parent_prediction) / (self.count.to_f64().unwrap() + h_smooth)
	}

	/// The average bias-corrected rating, the statistic item rankings are sorted by.
	pub fn score(&self) -> f64 {
		debug_assert!(self.count > 0);
		self.sum_unbiased / self.count.to_f64().unwrap()
	}

	pub fn smoothed_score(&self, parent_score: f64, h_smooth: f64) -> f64 {
		(self.sum_unbiased + h_smooth * parent_score) / (self.count.to_f64().unwrap() + h_smooth)
	}
}

/// The bias-corrected squared error summed over a stats map, skipping entries without observations.
pub fn squared_error(stats: &StatsMap) -> f64 {
	stats
		.values()
		.filter(|stats| stats.count > 0)
		.map(|stats| stats.squared_error())
		.sum()
}

/// Derive the UNKNOWN branch's statistics as the parent's stats minus every known group's stats.
///
/// All maps are keyed by item id, so one lock-step pass with a cursor per known group suffices. Items whose residual count drops to zero are left out entirely.
pub fn subtract_known_groups(parent: &StatsMap, known_groups: &[StatsMap]) -> StatsMap {
	let mut cursors: Vec<_> = known_groups
		.iter()
		.map(|group| group.iter().peekable())
		.collect();
	let mut unknown = StatsMap::new();
	for (item_id, stats) in parent {
		let mut residual = *stats;
		for cursor in cursors.iter_mut() {
			if let Some((group_item_id, group_stats)) = cursor.peek() {
				if *group_item_id == item_id {
					residual.subtract(group_stats);
					cursor.next();
				}
			}
		}
		if residual.count > 0 {
			unknown.insert(*item_id, residual);
		}
	}
	unknown
}

/// Rank a node's items by their score, best first. Ties break toward the smaller item id so rankings are deterministic.
pub fn build_ranking(stats: &StatsMap) -> Vec<usize> {
	let mut items_by_score: Vec<(usize, f64)> = stats
		.iter()
		.map(|(item_id, stats)| (*item_id, stats.score()))
		.collect();
	sort_by_score_desc(&mut items_by_score);
	items_by_score.into_iter().map(|(item_id, _)| item_id).collect()
}

/// Rank the items of the parent's score map by this node's smoothed scores, falling back to the parent's score for items the node has no observations for.
pub fn build_smoothed_ranking(
	stats: &StatsMap,
	parent_scores: &BTreeMap<usize, f64>,
	h_smooth: f64,
) -> Vec<usize> {
	let mut items_by_score: Vec<(usize, f64)> = parent_scores
		.iter()
		.map(|(item_id, parent_score)| {
			let score = match stats.get(item_id) {
				Some(stats) => stats.smoothed_score(*parent_score, h_smooth),
				None => *parent_score,
			};
			(*item_id, score)
		})
		.collect();
	sort_by_score_desc(&mut items_by_score);
	items_by_score.into_iter().map(|(item_id, _)| item_id).collect()
}

pub(crate) fn sort_by_score_desc(items_by_score: &mut [(usize, f64)]) {
	items_by_score.sort_by(|lhs, rhs| {
		rhs.1
			.partial_cmp(&lhs.1)
			.unwrap()
			.then_with(|| lhs.0.cmp(&rhs.0))
	});
}
