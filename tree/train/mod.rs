use crate::{
	error::Error,
	index::{Bound, RatingEntry, RatingIndex},
	objective::{Objective, RankingObjective, RegressionObjective, RelevanceIndex},
	tree::{ChildRole, Node, Tree},
	Rating, TrainOptions, TrainProgress,
};
use fnv::FnvHashMap;
use icebreaker_metrics::RankingMetric;
use icebreaker_util::progress_counter::ProgressCounter;
use itertools::Itertools;
use num_traits::ToPrimitive;
use rand::{rngs::StdRng, SeedableRng};
use split::{choose_best_split, choose_random_split, SplitContext, SplitEvaluation};

pub mod partition;
mod split;

/// Train an interview tree that minimizes the bias-corrected squared error of the ratings within each node.
pub fn train(
	ratings: &[Rating],
	options: &TrainOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<Tree, Error> {
	train_inner(ratings, None, RegressionObjective, options, update_progress)
}

/// Like [`train`], but only the listed items may be asked about.
pub fn train_with_candidates(
	ratings: &[Rating],
	candidate_item_ids: &[usize],
	options: &TrainOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<Tree, Error> {
	train_inner(
		ratings,
		Some(candidate_item_ids),
		RegressionObjective,
		options,
		update_progress,
	)
}

/// Train an interview tree that maximizes a ranking metric over held-out relevance judgments.
///
/// Ranking queries read the score caches, so this path always keeps them regardless of `cache_enabled`.
pub fn train_ranking<M>(
	ratings: &[Rating],
	heldout_ratings: &[Rating],
	metric: M,
	options: &TrainOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<Tree, Error>
where
	M: RankingMetric,
{
	let mut options = options.clone();
	options.cache_enabled = true;
	let objective = RankingObjective::new(RelevanceIndex::new(heldout_ratings), metric);
	train_inner(ratings, None, objective, &options, update_progress)
}

/// Like [`train_ranking`], but only the listed items may be asked about.
pub fn train_ranking_with_candidates<M>(
	ratings: &[Rating],
	heldout_ratings: &[Rating],
	candidate_item_ids: &[usize],
	metric: M,
	options: &TrainOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<Tree, Error>
where
	M: RankingMetric,
{
	let mut options = options.clone();
	options.cache_enabled = true;
	let objective = RankingObjective::new(RelevanceIndex::new(heldout_ratings), metric);
	train_inner(
		ratings,
		Some(candidate_item_ids),
		objective,
		&options,
		update_progress,
	)
}

fn train_inner<O>(
	ratings: &[Rating],
	candidate_restriction: Option<&[usize]>,
	objective: O,
	options: &TrainOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<Tree, Error>
where
	O: Objective,
{
	if ratings.is_empty() {
		return Err(Error::EmptyTrainingSet);
	}
	let init_progress = ProgressCounter::new(ratings.len().to_u64().unwrap());
	update_progress(TrainProgress::Initializing(init_progress.clone()));
	let trainer = Trainer::new(
		ratings,
		candidate_restriction,
		objective,
		options,
		&init_progress,
	);
	let train_progress = ProgressCounter::new(ratings.len().to_u64().unwrap());
	update_progress(TrainProgress::Training(train_progress.clone()));
	match options.n_threads {
		None => trainer.train(&train_progress),
		Some(n_threads) => {
			let pool = rayon::ThreadPoolBuilder::new()
				.num_threads(n_threads)
				.build()?;
			pool.install(move || trainer.train(&train_progress))
		}
	}
}

struct Trainer<O> {
	objective: O,
	options: TrainOptions,
	item_index: RatingIndex,
	user_index: RatingIndex,
	/// Sorted, deduplicated item ids that splits are restricted to, if any.
	candidate_restriction: Option<Vec<usize>>,
	/// For every unfinished node, the slice of each item's rating list that belongs to it.
	node_bounds: FnvHashMap<usize, FnvHashMap<usize, Bound>>,
	tree: Tree,
	rng: Option<StdRng>,
}

impl<O> Trainer<O>
where
	O: Objective,
{
	fn new(
		ratings: &[Rating],
		candidate_restriction: Option<&[usize]>,
		objective: O,
		options: &TrainOptions,
		progress: &ProgressCounter,
	) -> Self {
		let mut item_index = RatingIndex::new();
		let mut user_index = RatingIndex::new();
		let mut rating_total = 0.0;
		for rating in ratings {
			item_index.insert(rating.item_id, RatingEntry::new(rating.user_id, rating.value));
			user_index.insert(rating.user_id, RatingEntry::new(rating.item_id, rating.value));
			rating_total += rating.value;
			progress.inc(1);
		}
		item_index.sort_all();
		user_index.sort_all();
		let global_mean = rating_total / ratings.len().to_f64().unwrap();
		apply_user_biases(&mut user_index, global_mean, options.bias_regularization);
		let candidate_restriction = candidate_restriction.map(|item_ids| {
			let mut item_ids = item_ids.to_vec();
			item_ids.sort_unstable();
			item_ids.dedup();
			item_ids
		});
		let rng = if options.randomize {
			Some(match options.seed {
				Some(seed) => StdRng::seed_from_u64(seed),
				None => StdRng::from_entropy(),
			})
		} else {
			None
		};
		Self {
			objective,
			options: options.clone(),
			item_index,
			user_index,
			candidate_restriction,
			node_bounds: FnvHashMap::default(),
			tree: Tree { nodes: Vec::new() },
			rng,
		}
	}

	fn train(mut self, progress: &ProgressCounter) -> Result<Tree, Error> {
		let root_stats = self.user_index.all_stats();
		let num_ratings = root_stats
			.values()
			.map(|stats| stats.count)
			.sum::<i64>()
			.to_usize()
			.unwrap();
		progress.set_total(num_ratings.to_u64().unwrap());
		let users = if self.objective.needs_user_sets() {
			Some(self.user_index.keys().collect::<Vec<usize>>())
		} else {
			None
		};
		let quality =
			self.objective
				.quality(&root_stats, users.as_deref(), None, self.options.h_smooth);
		self.tree.nodes.push(Node {
			id: 0,
			parent: None,
			children: Vec::new(),
			splitter_id: None,
			level: 1,
			quality,
			split_quality: None,
			num_users: self.user_index.len(),
			num_ratings,
			stats: root_stats,
			users,
			predictions: None,
			scores: None,
			ranking: None,
		});
		self.tree.cache_predictions(0, self.options.h_smooth);
		self.tree.cache_ranking(0);
		let root_bounds = self
			.item_index
			.iter()
			.map(|(item_id, entry)| (item_id, Bound::new(0, entry.len())))
			.collect();
		self.node_bounds.insert(0, root_bounds);
		let mut stack = vec![0];
		while let Some(node_id) = stack.pop() {
			match self.try_split(node_id)? {
				Some(child_ids) => stack.extend(child_ids),
				None => {
					self.node_bounds.remove(&node_id);
					progress.inc(self.tree.nodes[node_id].num_ratings.to_u64().unwrap());
				}
			}
		}
		if !self.options.cache_enabled {
			self.tree.free_cache();
		}
		Ok(self.tree)
	}

	/// Split the node if some candidate's groups beat its quality, returning the new child ids, or `None` to finish it as a leaf.
	fn try_split(&mut self, node_id: usize) -> Result<Option<Vec<usize>>, Error> {
		{
			let node = &self.tree.nodes[node_id];
			if node.level >= self.options.max_depth
				|| node.num_ratings < self.options.min_ratings_per_node
				|| node.num_users < 2
			{
				return Ok(None);
			}
		}
		let candidates = self.candidates(node_id);
		if candidates.is_empty() {
			return Ok(None);
		}
		let node = &self.tree.nodes[node_id];
		let ctx = SplitContext {
			item_index: &self.item_index,
			user_index: &self.user_index,
			objective: &self.objective,
			node_stats: &node.stats,
			node_users: node.users.as_deref(),
			node_num_users: node.num_users,
			node_quality: node.quality,
			// At the root each group is scored on its own ranking; deeper splits smooth group rankings toward the node's scores.
			node_scores: if node.level > 1 { node.scores.as_ref() } else { None },
			h_smooth: self.options.h_smooth,
		};
		let evaluation = match self.rng.as_mut() {
			Some(rng) => choose_random_split(&ctx, &candidates, self.options.rand_coeff, rng)?,
			None => choose_best_split(&ctx, &candidates)?,
		};
		let evaluation = match evaluation {
			Some(evaluation) if evaluation.quality > self.tree.nodes[node_id].quality => evaluation,
			_ => return Ok(None),
		};
		self.split(node_id, evaluation).map(Some)
	}

	/// The splittable items of a node: those with a nonempty slice, narrowed by the candidate restriction, then capped to the `top_pop` most rated ones.
	fn candidates(&self, node_id: usize) -> Vec<(usize, Bound)> {
		let bounds = &self.node_bounds[&node_id];
		let mut candidates: Vec<(usize, Bound)> = bounds
			.iter()
			.filter(|(_, bound)| !bound.is_empty())
			.map(|(item_id, bound)| (*item_id, *bound))
			.filter(|(item_id, _)| match &self.candidate_restriction {
				Some(restriction) => restriction.binary_search(item_id).is_ok(),
				None => true,
			})
			.sorted_by_key(|(item_id, _)| *item_id)
			.collect();
		let top_pop = self.options.top_pop;
		if top_pop > 0 && candidates.len() > top_pop {
			candidates.sort_by(|lhs, rhs| {
				rhs.1
					.len()
					.cmp(&lhs.1.len())
					.then_with(|| lhs.0.cmp(&rhs.0))
			});
			candidates.truncate(top_pop);
			candidates.sort_unstable_by_key(|(item_id, _)| *item_id);
		}
		candidates
	}

	/// Commit a chosen split: reorder every item slice of the node by group, hand each group's chunk to a new child, and cache the children's predictions.
	fn split(&mut self, node_id: usize, evaluation: SplitEvaluation) -> Result<Vec<usize>, Error> {
		let parent_bounds = self.node_bounds.remove(&node_id).unwrap();
		let known_groups: Vec<&[usize]> = evaluation
			.groups
			.iter()
			.filter(|group| group.role != ChildRole::Unknown)
			.map(|group| group.users.as_deref().unwrap())
			.collect();
		let num_known = known_groups.len();
		// One chunk per known group, then the trailing chunk for users who never rated the splitter.
		let mut chunk_bounds: Vec<FnvHashMap<usize, Bound>> =
			vec![FnvHashMap::default(); num_known + 1];
		for (item_id, bound) in &parent_bounds {
			let entry = self
				.item_index
				.entry_mut(*item_id)
				.map_err(Error::unknown_item)?;
			let range = &mut entry[bound.left..bound.right];
			let bounds = partition::sort_by_group(range, bound.left, &known_groups);
			for (chunk, bound) in chunk_bounds.iter_mut().zip(bounds) {
				chunk.insert(*item_id, bound);
			}
		}
		let mut child_ids = Vec::with_capacity(evaluation.groups.len());
		let mut next_known = 0;
		for group in evaluation.groups.into_iter() {
			let chunk_index = if group.role == ChildRole::Unknown {
				num_known
			} else {
				let chunk_index = next_known;
				next_known += 1;
				chunk_index
			};
			let bounds = std::mem::take(&mut chunk_bounds[chunk_index]);
			let child_id = self.tree.nodes.len();
			let num_ratings = group
				.stats
				.values()
				.map(|stats| stats.count)
				.sum::<i64>()
				.to_usize()
				.unwrap();
			let users = if self.objective.needs_user_sets() {
				group.users
			} else {
				None
			};
			self.tree.nodes.push(Node {
				id: child_id,
				parent: Some(node_id),
				children: Vec::new(),
				splitter_id: None,
				level: self.tree.nodes[node_id].level + 1,
				quality: group.quality,
				split_quality: None,
				num_users: group.num_users,
				num_ratings,
				stats: group.stats,
				users,
				predictions: None,
				scores: None,
				ranking: None,
			});
			self.tree.nodes[node_id].children.push((group.role, child_id));
			self.tree.cache_predictions(child_id, self.options.h_smooth);
			self.tree.cache_ranking(child_id);
			self.node_bounds.insert(child_id, bounds);
			child_ids.push(child_id);
		}
		let parent = &mut self.tree.nodes[node_id];
		parent.splitter_id = Some(evaluation.splitter_id);
		parent.split_quality = Some(evaluation.quality);
		Ok(child_ids)
	}
}

/// Shrink every user's ratings by their regularized mean, so that systematically generous or harsh raters do not dominate split decisions.
fn apply_user_biases(user_index: &mut RatingIndex, global_mean: f64, regularization: f64) {
	for (_, entries) in user_index.iter_mut() {
		let sum: f64 = entries.iter().map(|entry| entry.rating).sum();
		let count = entries.len().to_f64().unwrap();
		let bias = (sum + regularization * global_mean) / (count + regularization);
		for entry in entries.iter_mut() {
			entry.rating_unbiased = entry.rating - bias;
		}
	}
}
