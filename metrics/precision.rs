use crate::RankingMetric;
use fnv::FnvHashMap;
use num_traits::ToPrimitive;

/// The precision at `k` is the fraction of the first `k` ranked items whose relevance reaches `relevance_threshold`.
#[derive(Clone, Copy, Debug)]
pub struct Precision {
	pub k: usize,
	pub relevance_threshold: f64,
}

impl Default for Precision {
	fn default() -> Self {
		Self {
			k: 10,
			relevance_threshold: 4.0,
		}
	}
}

impl RankingMetric for Precision {
	fn evaluate(
		&self,
		ranking: &[usize],
		_best_ranking: &[usize],
		relevance: &FnvHashMap<usize, f64>,
	) -> f64 {
		let length = usize::min(self.k, ranking.len());
		if length == 0 {
			return 0.0;
		}
		let relevant_count = ranking[0..length]
			.iter()
			.filter(|item| {
				relevance
					.get(item)
					.map(|relevance| *relevance >= self.relevance_threshold)
					.unwrap_or(false)
			})
			.count();
		relevant_count.to_f64().unwrap() / length.to_f64().unwrap()
	}
}
