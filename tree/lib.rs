/*!
This crate implements decision-tree interviews for cold-start recommendation. Training partitions the users of a rating matrix into a ternary tree: each inner node asks about one item, the splitter, and routes a user to the LOVED, HATED, or UNKNOWN child depending on their answer. Serving walks the tree with whatever ratings are already known and reads item predictions and rankings off the node it lands on.

Call [`train`](fn.train.html) to grow a tree that minimizes rating variance within nodes, or [`train_ranking`](fn.train_ranking.html) to grow one that maximizes a ranking metric from the `icebreaker_metrics` crate over held-out relevance judgments.
*/

mod error;
mod index;
mod objective;
mod stats;
mod train;
mod tree;

#[cfg(test)]
mod test_fixture;

pub use self::{
	error::{Error, UnknownEntityError},
	index::{Bound, RatingEntry, RatingIndex},
	objective::{Objective, RankingObjective, RegressionObjective, RelevanceIndex},
	stats::{Stats, StatsMap},
	train::{
		partition::sort_by_group, train, train_ranking, train_ranking_with_candidates,
		train_with_candidates,
	},
	tree::{ChildRole, Node, Tree},
};

use icebreaker_util::progress_counter::ProgressCounter;
use serde::{Deserialize, Serialize};

/// Ratings at or above this value count as loving the item; everything below counts as hating it.
pub const LOVED_THRESHOLD: f64 = 4.0;

/// One observed rating of an item by a user.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Rating {
	pub user_id: usize,
	pub item_id: usize,
	pub value: f64,
}

impl Rating {
	pub fn new(user_id: usize, item_id: usize, value: f64) -> Self {
		Self {
			user_id,
			item_id,
			value,
		}
	}
}

/// These are the options passed to the train functions.
#[derive(Clone, Debug)]
pub struct TrainOptions {
	/// This regularizes the per-user rating bias toward the global mean rating. A user's bias is `(sum of their ratings + bias_regularization * global mean) / (their rating count + bias_regularization)`, so larger values trust individual users less.
	pub bias_regularization: f64,
	/// This controls how strongly a node's predictions are shrunk toward its parent's. A node's prediction for an item is `(sum of its ratings + h_smooth * parent prediction) / (its rating count + h_smooth)`.
	pub h_smooth: f64,
	/// This is the maximum depth of the tree, counting the root as level one.
	pub max_depth: u32,
	/// Nodes with fewer ratings than this become leaves without considering a split.
	pub min_ratings_per_node: usize,
	/// If this is nonzero, only the `top_pop` most rated items of a node are considered as its splitter.
	pub top_pop: usize,
	/// This is the number of threads to train with. The default is `None`, which trains on the shared worker pool.
	pub n_threads: Option<usize>,
	/// If this is true, each node's splitter is drawn at random with probability proportional to how much the candidate improves on the node, instead of always taking the best candidate.
	pub randomize: bool,
	/// This is the exponent applied to each candidate's improvement when `randomize` is true. Larger values concentrate the draw on the best candidates.
	pub rand_coeff: f64,
	/// If this is false, the per-node prediction, score, and ranking caches are dropped after training, leaving a tree that can only be traversed.
	pub cache_enabled: bool,
	/// This seeds the random splitter draws so randomized training can be reproduced. The default is `None`, which seeds from entropy.
	pub seed: Option<u64>,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			bias_regularization: 7.0,
			h_smooth: 100.0,
			max_depth: 6,
			min_ratings_per_node: 200_000,
			top_pop: 0,
			n_threads: None,
			randomize: false,
			rand_coeff: 10.0,
			cache_enabled: true,
			seed: None,
		}
	}
}

/// The progress of a call to one of the train functions, reported once per phase through the progress callback. Poll the counter to observe the phase advancing.
#[derive(Clone, Debug)]
pub enum TrainProgress {
	Initializing(ProgressCounter),
	Training(ProgressCounter),
}
