use thiserror::Error;

/// The error returned by [`RatingIndex`](crate::RatingIndex) when an entity id is not present.
///
/// This is deliberately not an empty result: downstream code relies on the difference between "rated by nobody we know of" and "not indexed at all".
#[derive(Clone, Copy, Debug, Error)]
#[error("entity id {0} is not present in the index")]
pub struct UnknownEntityError(pub usize);

/// The errors surfaced by training and by the query interface.
///
/// Domain-level termination conditions during training, like a node with fewer than two users or a split that does not improve quality, are not errors: growth simply stops at that node.
#[derive(Debug, Error)]
pub enum Error {
	#[error("item id {0} is not present in the item index")]
	UnknownItem(usize),
	#[error("user id {0} is not present in the user index")]
	UnknownUser(usize),
	#[error("node id {0} is out of bounds")]
	UnknownNode(usize),
	#[error("predictions were not cached for this node")]
	NotCached,
	#[error("the training set is empty")]
	EmptyTrainingSet,
	#[error("the tree has no nodes")]
	EmptyTree,
	#[error("failed to build the worker pool: {0}")]
	ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
	pub(crate) fn unknown_item(error: UnknownEntityError) -> Self {
		Error::UnknownItem(error.0)
	}

	pub(crate) fn unknown_user(error: UnknownEntityError) -> Self {
		Error::UnknownUser(error.0)
	}
}
