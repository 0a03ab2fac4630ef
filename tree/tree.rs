use crate::{
	error::Error,
	stats::{sort_by_score_desc, StatsMap},
	LOVED_THRESHOLD,
};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which answer to a node's question a child handles.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ChildRole {
	/// The user rated the splitter at or above [`LOVED_THRESHOLD`].
	Loved,
	/// The user rated the splitter below [`LOVED_THRESHOLD`].
	Hated,
	/// The user has not rated the splitter.
	Unknown,
}

/// One node of the interview tree.
///
/// A node owns the users routed to it and summarizes their ratings in `stats`. Inner nodes carry the splitter item their question asks about; leaves have `splitter_id == None`. The `predictions`, `scores`, and `ranking` fields are caches filled in during training and can be dropped with [`Tree::free_cache`].
#[derive(Debug, Deserialize, Serialize)]
pub struct Node {
	pub id: usize,
	pub parent: Option<usize>,
	pub children: Vec<(ChildRole, usize)>,
	/// The item this node's question asks about, if the node was split.
	pub splitter_id: Option<usize>,
	/// Depth of the node, where the root is at level 1.
	pub level: u32,
	/// The objective's score for this node. Children only exist where their summed quality beats this.
	pub quality: f64,
	/// The summed quality of the groups this node was split into, if it was.
	pub split_quality: Option<f64>,
	pub num_users: usize,
	pub num_ratings: usize,
	pub stats: StatsMap,
	/// The users owned by this node. Only materialized when the objective asks for it.
	pub users: Option<Vec<usize>>,
	/// Smoothed average rating per item.
	pub predictions: Option<BTreeMap<usize, f64>>,
	/// Smoothed bias-corrected average rating per item.
	pub scores: Option<BTreeMap<usize, f64>>,
	/// All items ordered by score, best first.
	pub ranking: Option<Vec<usize>>,
}

impl Node {
	pub fn is_leaf(&self) -> bool {
		self.splitter_id.is_none()
	}

	pub fn child(&self, role: ChildRole) -> Option<usize> {
		self.children
			.iter()
			.find(|(child_role, _)| *child_role == role)
			.map(|(_, child_id)| *child_id)
	}
}

/// The trained interview tree, stored as an arena of nodes with the root at index zero.
///
/// Deserialization rejects an empty arena, so a `Tree` always has a root.
#[derive(Debug, Deserialize, Serialize)]
#[serde(try_from = "TreeNodes")]
pub struct Tree {
	pub(crate) nodes: Vec<Node>,
}

#[derive(Deserialize)]
struct TreeNodes {
	nodes: Vec<Node>,
}

impl std::convert::TryFrom<TreeNodes> for Tree {
	type Error = Error;

	fn try_from(data: TreeNodes) -> Result<Self, Error> {
		if data.nodes.is_empty() {
			return Err(Error::EmptyTree);
		}
		Ok(Tree { nodes: data.nodes })
	}
}

impl Tree {
	pub fn root(&self) -> &Node {
		&self.nodes[0]
	}

	pub fn get(&self, node_id: usize) -> Result<&Node, Error> {
		self.nodes.get(node_id).ok_or(Error::UnknownNode(node_id))
	}

	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub fn num_nodes(&self) -> usize {
		self.nodes.len()
	}

	/// Conduct the interview against an already-known set of ratings and return the id of the node it ends at.
	///
	/// At each inner node the splitter's rating routes to the LOVED or HATED child, or to the UNKNOWN child when the item was never rated. Descent stops early when the branch a rating asks for was never grown.
	pub fn traverse(&self, ratings: &FnvHashMap<usize, f64>) -> usize {
		let mut node_id = 0;
		loop {
			let node = &self.nodes[node_id];
			let splitter_id = match node.splitter_id {
				Some(splitter_id) => splitter_id,
				None => return node_id,
			};
			let role = match ratings.get(&splitter_id) {
				Some(rating) if *rating >= LOVED_THRESHOLD => ChildRole::Loved,
				Some(_) => ChildRole::Hated,
				None => ChildRole::Unknown,
			};
			match node.child(role) {
				Some(child_id) => node_id = child_id,
				None => return node_id,
			}
		}
	}

	/// The cached rating prediction a node makes for an item.
	pub fn predict(&self, node_id: usize, item_id: usize) -> Result<f64, Error> {
		let node = self.get(node_id)?;
		let predictions = node.predictions.as_ref().ok_or(Error::NotCached)?;
		predictions
			.get(&item_id)
			.copied()
			.ok_or(Error::UnknownItem(item_id))
	}

	/// The cached ranking of a node's best `len` items, best first. Shorter rankings are returned whole.
	pub fn ranking(&self, node_id: usize, len: usize) -> Result<&[usize], Error> {
		let node = self.get(node_id)?;
		let ranking = node.ranking.as_deref().ok_or(Error::NotCached)?;
		Ok(&ranking[0..usize::min(len, ranking.len())])
	}

	/// Order the given items by a node's cached scores, best first. Every item must be known to the tree.
	pub fn rank(&self, node_id: usize, item_ids: &[usize]) -> Result<Vec<usize>, Error> {
		let node = self.get(node_id)?;
		let scores = node.scores.as_ref().ok_or(Error::NotCached)?;
		let mut items_by_score = Vec::with_capacity(item_ids.len());
		for item_id in item_ids {
			let score = scores
				.get(item_id)
				.copied()
				.ok_or(Error::UnknownItem(*item_id))?;
			items_by_score.push((*item_id, score));
		}
		sort_by_score_desc(&mut items_by_score);
		Ok(items_by_score.into_iter().map(|(item_id, _)| item_id).collect())
	}

	/// Drop every node's prediction, score, and ranking caches. Queries that read them will fail afterwards.
	pub fn free_cache(&mut self) {
		for node in self.nodes.iter_mut() {
			node.predictions = None;
			node.scores = None;
			node.ranking = None;
		}
	}

	/// Drop the per-node statistics and user sets that were only needed during training.
	pub fn release_temporaries(&mut self) {
		for node in self.nodes.iter_mut() {
			node.stats = StatsMap::new();
			node.users = None;
		}
	}

	/// Fill a node's prediction and score maps. The root averages its own stats; every other node covers exactly the items of its parent's maps, shrinking its own averages toward the parent's values and inheriting them outright for items it has no observations for.
	pub(crate) fn cache_predictions(&mut self, node_id: usize, h_smooth: f64) {
		let (predictions, scores) = match self.nodes[node_id].parent {
			None => {
				let node = &self.nodes[node_id];
				let predictions = node
					.stats
					.iter()
					.map(|(item_id, stats)| (*item_id, stats.prediction()))
					.collect();
				let scores = node
					.stats
					.iter()
					.map(|(item_id, stats)| (*item_id, stats.score()))
					.collect();
				(predictions, scores)
			}
			Some(parent_id) => {
				let parent = &self.nodes[parent_id];
				let node = &self.nodes[node_id];
				let parent_predictions = parent.predictions.as_ref().unwrap();
				let parent_scores = parent.scores.as_ref().unwrap();
				let predictions = parent_predictions
					.iter()
					.map(|(item_id, parent_prediction)| {
						let prediction = match node.stats.get(item_id) {
							Some(stats) => stats.smoothed_prediction(*parent_prediction, h_smooth),
							None => *parent_prediction,
						};
						(*item_id, prediction)
					})
					.collect();
				let scores = parent_scores
					.iter()
					.map(|(item_id, parent_score)| {
						let score = match node.stats.get(item_id) {
							Some(stats) => stats.smoothed_score(*parent_score, h_smooth),
							None => *parent_score,
						};
						(*item_id, score)
					})
					.collect();
				(predictions, scores)
			}
		};
		let node = &mut self.nodes[node_id];
		node.predictions = Some(predictions);
		node.scores = Some(scores);
	}

	/// Fill a node's ranking cache from its score map. Ties break toward the smaller item id.
	pub(crate) fn cache_ranking(&mut self, node_id: usize) {
		let node = &mut self.nodes[node_id];
		let scores = node.scores.as_ref().unwrap();
		let mut items_by_score: Vec<(usize, f64)> = scores
			.iter()
			.map(|(item_id, score)| (*item_id, *score))
			.collect();
		sort_by_score_desc(&mut items_by_score);
		node.ranking = Some(items_by_score.into_iter().map(|(item_id, _)| item_id).collect());
	}
}
