use crate::index::{Bound, RatingEntry};

/// Reorder one entity's rating slice so that entries belonging to the same group become contiguous, and return the bound of each chunk.
///
/// `groups` holds the sorted entity ids of each known group; entries matching none of them land in a trailing chunk. The reorder is stable within each chunk, and `start` is the offset of `range` within the full list so the returned bounds index into it directly. One bound per group is returned, plus one for the trailing chunk.
///
/// Both `range` and every group must be sorted ascending by id, which lets a single cursor per group classify all entries in one pass.
pub fn sort_by_group(range: &mut [RatingEntry], start: usize, groups: &[&[usize]]) -> Vec<Bound> {
	let num_chunks = groups.len() + 1;
	let mut chunks: Vec<Vec<RatingEntry>> = vec![Vec::new(); num_chunks];
	let mut cursors = vec![0; groups.len()];
	for entry in range.iter() {
		let mut chunk = groups.len();
		for (group_index, group) in groups.iter().enumerate() {
			let cursor = &mut cursors[group_index];
			while *cursor < group.len() && group[*cursor] < entry.id {
				*cursor += 1;
			}
			if *cursor < group.len() && group[*cursor] == entry.id {
				chunk = group_index;
				break;
			}
		}
		chunks[chunk].push(*entry);
	}
	let mut bounds = Vec::with_capacity(num_chunks);
	let mut offset = start;
	let mut write = range.iter_mut();
	for chunk in chunks {
		debug_assert!(chunk.windows(2).all(|pair| pair[0].id <= pair[1].id));
		bounds.push(Bound::new(offset, offset + chunk.len()));
		offset += chunk.len();
		for entry in chunk {
			*write.next().unwrap() = entry;
		}
	}
	bounds
}
