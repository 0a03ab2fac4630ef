use crate::{
	error::Error,
	index::{Bound, RatingIndex},
	objective::Objective,
	stats::{subtract_known_groups, StatsMap},
	tree::ChildRole,
	LOVED_THRESHOLD,
};
use rand::{rngs::StdRng, Rng};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Everything an evaluation of one candidate splitter needs to know about the node being split.
pub(crate) struct SplitContext<'a, O> {
	pub item_index: &'a RatingIndex,
	pub user_index: &'a RatingIndex,
	pub objective: &'a O,
	pub node_stats: &'a StatsMap,
	pub node_users: Option<&'a [usize]>,
	pub node_num_users: usize,
	pub node_quality: f64,
	/// The node's cached score map, or `None` when the node is the root. Root split groups are scored on their own unsmoothed rankings.
	pub node_scores: Option<&'a BTreeMap<usize, f64>>,
	pub h_smooth: f64,
}

/// One group a split would route users into, ready to become a child node.
pub(crate) struct GroupEvaluation {
	pub role: ChildRole,
	pub num_users: usize,
	/// The users of this group, sorted ascending. Always present for the LOVED and HATED groups; for the UNKNOWN group only when the node's user set is materialized.
	pub users: Option<Vec<usize>>,
	pub stats: StatsMap,
	pub quality: f64,
}

/// The outcome of evaluating one candidate splitter: the groups it induces and their summed quality.
pub(crate) struct SplitEvaluation {
	pub splitter_id: usize,
	/// The candidate's position in the candidate list, used to break quality ties deterministically.
	pub position: usize,
	pub quality: f64,
	pub groups: Vec<GroupEvaluation>,
}

/// Partition the node's users by their answer about one candidate item and score the resulting groups.
///
/// The LOVED and HATED groups are read off the splitter's rating slice; the UNKNOWN group's statistics are derived by subtracting both from the node's, which avoids touching the typically much larger set of users who never rated the splitter. Returns `None` when the slice is empty.
pub(crate) fn evaluate_candidate<O>(
	ctx: &SplitContext<O>,
	splitter_id: usize,
	bound: Bound,
	position: usize,
) -> Result<Option<SplitEvaluation>, Error>
where
	O: Objective,
{
	let entry = ctx
		.item_index
		.entry(splitter_id)
		.map_err(Error::unknown_item)?;
	let slice = &entry[bound.left..bound.right];
	let mut loved_users = Vec::new();
	let mut hated_users = Vec::new();
	for rating in slice {
		if rating.rating >= LOVED_THRESHOLD {
			loved_users.push(rating.id);
		} else {
			hated_users.push(rating.id);
		}
	}
	if loved_users.is_empty() && hated_users.is_empty() {
		return Ok(None);
	}
	let loved_stats = group_stats(ctx.user_index, &loved_users)?;
	let hated_stats = group_stats(ctx.user_index, &hated_users)?;
	let unknown_stats =
		subtract_known_groups(ctx.node_stats, &[loved_stats.clone(), hated_stats.clone()]);
	let unknown_num_users = ctx.node_num_users - loved_users.len() - hated_users.len();
	let unknown_users = ctx
		.node_users
		.map(|users| sorted_difference(users, &loved_users, &hated_users));
	let mut quality = 0.0;
	let mut groups = Vec::with_capacity(3);
	if !loved_users.is_empty() {
		let group_quality = ctx.objective.quality(
			&loved_stats,
			Some(&loved_users),
			ctx.node_scores,
			ctx.h_smooth,
		);
		quality += group_quality;
		groups.push(GroupEvaluation {
			role: ChildRole::Loved,
			num_users: loved_users.len(),
			users: Some(loved_users),
			stats: loved_stats,
			quality: group_quality,
		});
	}
	if !hated_users.is_empty() {
		let group_quality = ctx.objective.quality(
			&hated_stats,
			Some(&hated_users),
			ctx.node_scores,
			ctx.h_smooth,
		);
		quality += group_quality;
		groups.push(GroupEvaluation {
			role: ChildRole::Hated,
			num_users: hated_users.len(),
			users: Some(hated_users),
			stats: hated_stats,
			quality: group_quality,
		});
	}
	if unknown_num_users > 0 {
		let group_quality = ctx.objective.quality(
			&unknown_stats,
			unknown_users.as_deref(),
			ctx.node_scores,
			ctx.h_smooth,
		);
		quality += group_quality;
		groups.push(GroupEvaluation {
			role: ChildRole::Unknown,
			num_users: unknown_num_users,
			users: unknown_users,
			stats: unknown_stats,
			quality: group_quality,
		});
	}
	Ok(Some(SplitEvaluation {
		splitter_id,
		position,
		quality,
		groups,
	}))
}

/// Evaluate every candidate in parallel and keep the best one. Quality ties break toward the candidate that appears first, so the outcome does not depend on how the work was scheduled.
pub(crate) fn choose_best_split<O>(
	ctx: &SplitContext<O>,
	candidates: &[(usize, Bound)],
) -> Result<Option<SplitEvaluation>, Error>
where
	O: Objective,
{
	candidates
		.par_iter()
		.enumerate()
		.map(|(position, (splitter_id, bound))| {
			evaluate_candidate(ctx, *splitter_id, *bound, position)
		})
		.try_reduce(|| None, |best, candidate| Ok(pick_better(best, candidate)))
}

/// Draw one candidate with probability proportional to `max(0, quality - node quality) ^ rand_coeff` and evaluate it.
///
/// When no candidate improves on the node every weight is zero and the draw falls back to uniform to stay well defined; the caller rejects the result anyway because it cannot beat the node.
pub(crate) fn choose_random_split<O>(
	ctx: &SplitContext<O>,
	candidates: &[(usize, Bound)],
	rand_coeff: f64,
	rng: &mut StdRng,
) -> Result<Option<SplitEvaluation>, Error>
where
	O: Objective,
{
	if candidates.is_empty() {
		return Ok(None);
	}
	let qualities: Vec<Option<f64>> = candidates
		.par_iter()
		.map(|(splitter_id, bound)| {
			evaluate_candidate(ctx, *splitter_id, *bound, 0)
				.map(|evaluation| evaluation.map(|evaluation| evaluation.quality))
		})
		.collect::<Result<Vec<_>, Error>>()?;
	let weights: Vec<f64> = qualities
		.iter()
		.map(|quality| match quality {
			Some(quality) => (quality - ctx.node_quality).max(0.0).powf(rand_coeff),
			None => 0.0,
		})
		.collect();
	let total: f64 = weights.iter().sum();
	let position = if total > 0.0 {
		let mut draw = rng.gen_range(0.0, total);
		let mut position = weights.len() - 1;
		for (index, weight) in weights.iter().enumerate() {
			if draw < *weight {
				position = index;
				break;
			}
			draw -= weight;
		}
		position
	} else {
		rng.gen_range(0, candidates.len())
	};
	let (splitter_id, bound) = candidates[position];
	evaluate_candidate(ctx, splitter_id, bound, position)
}

fn pick_better(
	best: Option<SplitEvaluation>,
	candidate: Option<SplitEvaluation>,
) -> Option<SplitEvaluation> {
	match (best, candidate) {
		(None, candidate) => candidate,
		(best, None) => best,
		(Some(best), Some(candidate)) => {
			let candidate_wins = candidate
				.quality
				.partial_cmp(&best.quality)
				.unwrap()
				.then_with(|| best.position.cmp(&candidate.position))
				== std::cmp::Ordering::Greater;
			if candidate_wins {
				Some(candidate)
			} else {
				Some(best)
			}
		}
	}
}

/// Aggregate the full rating lists of a sorted set of users into one stats map keyed by item id.
fn group_stats(user_index: &RatingIndex, users: &[usize]) -> Result<StatsMap, Error> {
	let mut stats = StatsMap::new();
	for user_id in users {
		user_index
			.update_stats(&mut stats, *user_id)
			.map_err(Error::unknown_user)?;
	}
	Ok(stats)
}

/// All elements of the sorted slice `users` that appear in neither of the two sorted exclusion slices.
fn sorted_difference(users: &[usize], first: &[usize], second: &[usize]) -> Vec<usize> {
	let mut difference = Vec::with_capacity(users.len() - first.len() - second.len());
	let mut first = first.iter().peekable();
	let mut second = second.iter().peekable();
	for user_id in users {
		while first.peek().map_or(false, |excluded| **excluded < *user_id) {
			first.next();
		}
		while second.peek().map_or(false, |excluded| **excluded < *user_id) {
			second.next();
		}
		let excluded = first.peek().map_or(false, |excluded| **excluded == *user_id)
			|| second.peek().map_or(false, |excluded| **excluded == *user_id);
		if !excluded {
			difference.push(*user_id);
		}
	}
	difference
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		index::RatingEntry,
		objective::{RankingObjective, RegressionObjective, RelevanceIndex},
		stats::{build_ranking, squared_error},
	};
	use icebreaker_metrics::Precision;

	fn build_indexes(ratings: &[(usize, usize, f64)]) -> (RatingIndex, RatingIndex) {
		let mut item_index = RatingIndex::new();
		let mut user_index = RatingIndex::new();
		for (user_id, item_id, value) in ratings {
			item_index.insert(*item_id, RatingEntry::new(*user_id, *value));
			user_index.insert(*user_id, RatingEntry::new(*item_id, *value));
		}
		item_index.sort_all();
		user_index.sort_all();
		(item_index, user_index)
	}

	fn small_dataset() -> (RatingIndex, RatingIndex) {
		build_indexes(&[
			(0, 0, 5.0),
			(0, 1, 4.0),
			(1, 0, 1.0),
			(1, 1, 2.0),
			(2, 0, 4.0),
			(2, 2, 1.0),
			(3, 2, 5.0),
		])
	}

	fn context<'a>(
		item_index: &'a RatingIndex,
		user_index: &'a RatingIndex,
		node_stats: &'a StatsMap,
	) -> SplitContext<'a, RegressionObjective> {
		SplitContext {
			item_index,
			user_index,
			objective: &RegressionObjective,
			node_stats,
			node_users: None,
			node_num_users: 4,
			node_quality: -squared_error(node_stats),
			node_scores: None,
			h_smooth: 0.0,
		}
	}

	#[test]
	fn test_evaluate_candidate_groups() {
		let (item_index, user_index) = small_dataset();
		let node_stats = user_index.all_stats();
		let ctx = context(&item_index, &user_index, &node_stats);
		let evaluation = evaluate_candidate(&ctx, 0, Bound::new(0, 3), 0)
			.unwrap()
			.unwrap();
		assert_eq!(evaluation.splitter_id, 0);
		let roles: Vec<ChildRole> = evaluation.groups.iter().map(|group| group.role).collect();
		assert_eq!(
			roles,
			vec![ChildRole::Loved, ChildRole::Hated, ChildRole::Unknown]
		);
		assert_eq!(
			evaluation.groups[0].users.as_deref(),
			Some(&[0, 2][..])
		);
		assert_eq!(evaluation.groups[1].users.as_deref(), Some(&[1][..]));
		assert_eq!(evaluation.groups[2].num_users, 1);
		assert!(evaluation.groups[2].users.is_none());
		// Users 0 and 2 both rated item 0, so the LOVED group's variance there is (5^2 + 4^2) - 9^2 / 2.
		assert!((evaluation.groups[0].quality - (-0.5)).abs() < 1e-12);
		assert!((evaluation.quality - (-0.5)).abs() < 1e-12);
		// The three groups' stats add back up to the node's.
		for (item_id, stats) in &node_stats {
			let total: i64 = evaluation
				.groups
				.iter()
				.filter_map(|group| group.stats.get(item_id))
				.map(|stats| stats.count)
				.sum();
			let sum: f64 = evaluation
				.groups
				.iter()
				.filter_map(|group| group.stats.get(item_id))
				.map(|stats| stats.sum)
				.sum();
			assert_eq!(total, stats.count);
			assert!((sum - stats.sum).abs() < 1e-12);
		}
	}

	#[test]
	fn test_choose_best_split_prefers_lowest_error() {
		let (item_index, user_index) = small_dataset();
		let node_stats = user_index.all_stats();
		let ctx = context(&item_index, &user_index, &node_stats);
		let candidates = vec![
			(0, Bound::new(0, 3)),
			(1, Bound::new(0, 2)),
			(2, Bound::new(0, 2)),
		];
		let best = choose_best_split(&ctx, &candidates).unwrap().unwrap();
		// Splitting on item 0 leaves the least variance in its groups.
		assert_eq!(best.splitter_id, 0);
		assert!((best.quality - (-0.5)).abs() < 1e-12);
	}

	#[test]
	fn test_choose_best_split_tie_breaks_on_position() {
		let (item_index, user_index) = small_dataset();
		let node_stats = user_index.all_stats();
		let ctx = context(&item_index, &user_index, &node_stats);
		let candidates = vec![(1, Bound::new(0, 2)), (1, Bound::new(0, 2))];
		let best = choose_best_split(&ctx, &candidates).unwrap().unwrap();
		assert_eq!(best.position, 0);
	}

	#[test]
	fn test_evaluate_candidate_empty_slice() {
		let (item_index, user_index) = small_dataset();
		let node_stats = user_index.all_stats();
		let ctx = context(&item_index, &user_index, &node_stats);
		assert!(evaluate_candidate(&ctx, 0, Bound::new(1, 1), 0)
			.unwrap()
			.is_none());
	}

	#[test]
	fn test_root_split_groups_are_scored_without_smoothing() {
		let (item_index, user_index) = small_dataset();
		let ratings: Vec<crate::Rating> = [
			(0, 0, 5.0),
			(0, 1, 4.0),
			(1, 0, 1.0),
			(1, 1, 2.0),
			(2, 0, 4.0),
			(2, 2, 1.0),
			(3, 2, 5.0),
		]
		.iter()
		.map(|(user_id, item_id, value)| crate::Rating::new(*user_id, *item_id, *value))
		.collect();
		let objective = RankingObjective::new(
			RelevanceIndex::new(&ratings),
			Precision {
				k: 2,
				relevance_threshold: 4.0,
			},
		);
		let node_stats = user_index.all_stats();
		let node_users = vec![0, 1, 2, 3];
		let ctx = SplitContext {
			item_index: &item_index,
			user_index: &user_index,
			objective: &objective,
			node_stats: &node_stats,
			node_users: Some(&node_users),
			node_num_users: 4,
			node_quality: 0.0,
			node_scores: None,
			// Smoothing this strong would flatten every group ranking toward the parent's if it applied at the root.
			h_smooth: 1e9,
		};
		let evaluation = evaluate_candidate(&ctx, 0, Bound::new(0, 3), 0)
			.unwrap()
			.unwrap();
		for group in &evaluation.groups {
			let ranking = build_ranking(&group.stats);
			let expected = objective.relevance.evaluate_users(
				&objective.metric,
				&ranking,
				group.users.as_deref().unwrap(),
			);
			assert!((group.quality - expected).abs() < 1e-12);
		}
	}

	#[test]
	fn test_sorted_difference() {
		assert_eq!(
			sorted_difference(&[0, 1, 2, 3, 4, 5], &[1, 4], &[2]),
			vec![0, 3, 5]
		);
		assert_eq!(sorted_difference(&[0, 1], &[], &[]), vec![0, 1]);
	}
}
