use crate::stats::{build_ranking, build_smoothed_ranking, squared_error, StatsMap};
use fnv::FnvHashMap;
use icebreaker_metrics::RankingMetric;
use std::collections::BTreeMap;

/// The criterion that scores nodes and drives splitter selection. Higher quality is better, and a split is only committed when the summed quality of its groups beats the quality of the undivided node.
pub trait Objective: Send + Sync {
	/// Whether the trainer has to materialize the set of users owned by each node. Quality criteria that only look at rating statistics can skip this bookkeeping.
	fn needs_user_sets(&self) -> bool;

	/// The quality of a node given its per-item statistics and, when user sets are materialized, the users it owns.
	///
	/// `parent_scores` is the parent node's cached score map. It is `None` at the root and for the groups of a root split, which are scored on their own unsmoothed rankings; everywhere else, criteria that rank items smooth a node's scores toward the parent's before evaluating.
	fn quality(
		&self,
		stats: &StatsMap,
		users: Option<&[usize]>,
		parent_scores: Option<&BTreeMap<usize, f64>>,
		h_smooth: f64,
	) -> f64;
}

/// Scores a node by the negative bias-corrected squared error of its ratings, so that minimizing within-node variance maximizes quality.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegressionObjective;

impl Objective for RegressionObjective {
	fn needs_user_sets(&self) -> bool {
		false
	}

	fn quality(
		&self,
		stats: &StatsMap,
		_users: Option<&[usize]>,
		_parent_scores: Option<&BTreeMap<usize, f64>>,
		_h_smooth: f64,
	) -> f64 {
		-squared_error(stats)
	}
}

/// Held-out relevance judgments used to score rankings: one relevance map per user, plus each user's best achievable ranking, precomputed once.
#[derive(Debug, Default)]
pub struct RelevanceIndex {
	relevance: FnvHashMap<usize, FnvHashMap<usize, f64>>,
	best_rankings: FnvHashMap<usize, Vec<usize>>,
}

impl RelevanceIndex {
	pub fn new(ratings: &[crate::Rating]) -> Self {
		let mut relevance: FnvHashMap<usize, FnvHashMap<usize, f64>> = FnvHashMap::default();
		for rating in ratings {
			relevance
				.entry(rating.user_id)
				.or_insert_with(FnvHashMap::default)
				.insert(rating.item_id, rating.value);
		}
		let best_rankings = relevance
			.iter()
			.map(|(user_id, relevance)| {
				let mut items_by_relevance: Vec<(usize, f64)> = relevance
					.iter()
					.map(|(item_id, relevance)| (*item_id, *relevance))
					.collect();
				crate::stats::sort_by_score_desc(&mut items_by_relevance);
				let ranking = items_by_relevance
					.into_iter()
					.map(|(item_id, _)| item_id)
					.collect();
				(*user_id, ranking)
			})
			.collect();
		Self {
			relevance,
			best_rankings,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.relevance.is_empty()
	}

	/// Sum the metric over the given users, holding the node's ranking fixed. Users without relevance judgments contribute zero.
	pub fn evaluate_users<M>(&self, metric: &M, ranking: &[usize], users: &[usize]) -> f64
	where
		M: RankingMetric,
	{
		users
			.iter()
			.filter_map(|user_id| {
				let relevance = self.relevance.get(user_id)?;
				let best_ranking = self.best_rankings.get(user_id)?;
				Some(metric.evaluate(ranking, best_ranking, relevance))
			})
			.sum()
	}
}

/// Scores a node by how well its item ranking serves the users it owns, measured against held-out relevance with the given metric.
#[derive(Debug)]
pub struct RankingObjective<M> {
	pub relevance: RelevanceIndex,
	pub metric: M,
}

impl<M> RankingObjective<M>
where
	M: RankingMetric,
{
	pub fn new(relevance: RelevanceIndex, metric: M) -> Self {
		Self { relevance, metric }
	}
}

impl<M> Objective for RankingObjective<M>
where
	M: RankingMetric,
{
	fn needs_user_sets(&self) -> bool {
		true
	}

	fn quality(
		&self,
		stats: &StatsMap,
		users: Option<&[usize]>,
		parent_scores: Option<&BTreeMap<usize, f64>>,
		h_smooth: f64,
	) -> f64 {
		let users = users.unwrap_or(&[]);
		let ranking = match parent_scores {
			Some(parent_scores) => build_smoothed_ranking(stats, parent_scores, h_smooth),
			None => build_ranking(stats),
		};
		self.relevance.evaluate_users(&self.metric, &ranking, users)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::stats::Stats;
	use icebreaker_metrics::Precision;

	#[test]
	fn test_regression_quality() {
		let stats: StatsMap = vec![(
			0,
			Stats {
				sum: 6.0,
				sum_unbiased: 2.0,
				sum2: 20.0,
				sum2_unbiased: 4.0,
				count: 2,
			},
		)]
		.into_iter()
		.collect();
		let quality = RegressionObjective.quality(&stats, None, None, 0.0);
		// -(4 - 2^2 / 2)
		assert!((quality - (-2.0)).abs() < f64::EPSILON);
	}

	#[test]
	fn test_relevance_index_best_rankings() {
		let ratings = vec![
			crate::Rating::new(0, 1, 2.0),
			crate::Rating::new(0, 2, 5.0),
			crate::Rating::new(0, 3, 5.0),
			crate::Rating::new(1, 1, 4.0),
		];
		let index = RelevanceIndex::new(&ratings);
		// Ties break toward the smaller item id.
		assert_eq!(index.best_rankings[&0], vec![2, 3, 1]);
		assert_eq!(index.best_rankings[&1], vec![1]);
	}

	#[test]
	fn test_ranking_quality_ignores_users_without_relevance() {
		let ratings = vec![crate::Rating::new(0, 1, 5.0), crate::Rating::new(0, 2, 1.0)];
		let index = RelevanceIndex::new(&ratings);
		let metric = Precision {
			k: 1,
			relevance_threshold: 4.0,
		};
		let with_stranger = index.evaluate_users(&metric, &[1, 2], &[0, 7]);
		let alone = index.evaluate_users(&metric, &[1, 2], &[0]);
		assert!((with_stranger - alone).abs() < f64::EPSILON);
		assert!((alone - 1.0).abs() < f64::EPSILON);
	}
}
