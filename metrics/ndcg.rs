use crate::RankingMetric;
use fnv::FnvHashMap;
use num_traits::ToPrimitive;

/// The normalized discounted cumulative gain at `k` compares the exponential-gain DCG of the predicted ranking against the DCG of the best achievable ranking of the same items.
#[derive(Clone, Copy, Debug)]
pub struct Ndcg {
	pub k: usize,
}

impl Default for Ndcg {
	fn default() -> Self {
		Self { k: 10 }
	}
}

impl Ndcg {
	fn dcg(&self, ranking: &[usize], relevance: &FnvHashMap<usize, f64>) -> f64 {
		let length = usize::min(self.k, ranking.len());
		ranking[0..length]
			.iter()
			.enumerate()
			.map(|(rank, item)| {
				let relevance = relevance.get(item).copied().unwrap_or(0.0);
				let gain = 2f64.powf(relevance) - 1.0;
				gain / (rank + 2).to_f64().unwrap().log2()
			})
			.sum()
	}
}

impl RankingMetric for Ndcg {
	fn evaluate(
		&self,
		ranking: &[usize],
		best_ranking: &[usize],
		relevance: &FnvHashMap<usize, f64>,
	) -> f64 {
		let best_dcg = self.dcg(best_ranking, relevance);
		if best_dcg == 0.0 {
			return 0.0;
		}
		self.dcg(ranking, relevance) / best_dcg
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_ndcg() {
		let relevance: FnvHashMap<usize, f64> =
			vec![(1, 3.0), (2, 2.0), (3, 1.0)].into_iter().collect();
		let metric = Ndcg::default();
		let best = [1, 2, 3];
		// The best ranking scores exactly one.
		assert!((metric.evaluate(&best, &best, &relevance) - 1.0).abs() < f64::EPSILON);
		// A worse ranking scores strictly less.
		let reversed = metric.evaluate(&[3, 2, 1], &best, &relevance);
		assert!(reversed > 0.0 && reversed < 1.0);
		// An all-zero best ranking yields zero instead of dividing by zero.
		let zero: FnvHashMap<usize, f64> = vec![(1, 0.0)].into_iter().collect();
		assert!((metric.evaluate(&[1], &[1], &zero) - 0.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_ndcg_cutoff() {
		let relevance: FnvHashMap<usize, f64> =
			vec![(1, 3.0), (2, 2.0), (3, 5.0)].into_iter().collect();
		let metric = Ndcg { k: 2 };
		// Item 3 sits past the cutoff in both rankings, so only the first two ranks count.
		let value = metric.evaluate(&[1, 2, 3], &[3, 1, 2], &relevance);
		let dcg = (2f64.powf(3.0) - 1.0) / 2f64.log2() + (2f64.powf(2.0) - 1.0) / 3f64.log2();
		let best_dcg = (2f64.powf(5.0) - 1.0) / 2f64.log2() + (2f64.powf(3.0) - 1.0) / 3f64.log2();
		assert!((value - dcg / best_dcg).abs() < 1e-12);
	}
}
