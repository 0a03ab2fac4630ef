use crate::RankingMetric;
use fnv::FnvHashMap;
use num_traits::ToPrimitive;

/// The average precision at `k` averages the precision at every rank that holds a relevant item, normalized by the user's total number of relevant items.
#[derive(Clone, Copy, Debug)]
pub struct AveragePrecision {
	pub k: usize,
	pub relevance_threshold: f64,
}

impl Default for AveragePrecision {
	fn default() -> Self {
		Self {
			k: 10,
			relevance_threshold: 4.0,
		}
	}
}

impl RankingMetric for AveragePrecision {
	fn evaluate(
		&self,
		ranking: &[usize],
		_best_ranking: &[usize],
		relevance: &FnvHashMap<usize, f64>,
	) -> f64 {
		let relevant_total = relevance
			.values()
			.filter(|relevance| **relevance >= self.relevance_threshold)
			.count();
		if relevant_total == 0 {
			return 0.0;
		}
		let length = usize::min(self.k, ranking.len());
		let mut precision_sum = 0.0;
		let mut relevant_count = 0;
		for (rank, item) in ranking[0..length].iter().enumerate() {
			let relevant = relevance
				.get(item)
				.map(|relevance| *relevance >= self.relevance_threshold)
				.unwrap_or(false);
			if relevant {
				relevant_count += 1;
				precision_sum +=
					relevant_count.to_f64().unwrap() / (rank + 1).to_f64().unwrap();
			}
		}
		precision_sum / relevant_total.to_f64().unwrap()
	}
}
