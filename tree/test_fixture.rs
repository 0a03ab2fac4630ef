use crate::Rating;

/// A small rating matrix of eleven users over seven items whose tree, index, and partition outcomes are known exactly, shared by tests across the crate.
pub fn fixture_ratings() -> Vec<Rating> {
	vec![
		(0, 0, 4.0),
		(0, 1, 1.0),
		(0, 3, 5.0),
		(1, 1, 3.0),
		(1, 2, 2.0),
		(1, 3, 1.0),
		(1, 6, 4.0),
		(2, 5, 1.0),
		(2, 6, 5.0),
		(3, 1, 5.0),
		(3, 4, 2.0),
		(4, 2, 5.0),
		(4, 3, 4.0),
		(5, 6, 1.0),
		(6, 0, 5.0),
		(6, 6, 4.0),
		(7, 1, 4.0),
		(7, 3, 2.0),
		(8, 4, 4.0),
		(8, 5, 5.0),
		(9, 2, 3.0),
		(9, 3, 1.0),
		(10, 0, 5.0),
	]
	.into_iter()
	.map(|(user_id, item_id, value)| Rating {
		user_id,
		item_id,
		value,
	})
	.collect()
}
