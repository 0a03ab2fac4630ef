use crate::RankingMetric;
use fnv::FnvHashMap;

/// The half-life utility at `k` discounts each item's relevance by powers of two over rank buckets of `half_life - 1` positions, normalized by the utility of the best achievable ranking.
///
/// The discount exponent is the integer division `(rank - 1) / (half_life - 1)`, so ranks within the same bucket share a discount. Half-lives below two would make the bucket width zero, so they are treated as two.
#[derive(Clone, Copy, Debug)]
pub struct Hlu {
	pub k: usize,
	pub half_life: u32,
}

impl Default for Hlu {
	fn default() -> Self {
		Self { k: 10, half_life: 5 }
	}
}

impl Hlu {
	fn utility(&self, ranking: &[usize], relevance: &FnvHashMap<usize, f64>) -> f64 {
		let bucket_width = u32::max(self.half_life, 2) - 1;
		let length = usize::min(self.k, ranking.len());
		ranking[0..length]
			.iter()
			.enumerate()
			.map(|(rank, item)| {
				let relevance = relevance.get(item).copied().unwrap_or(0.0);
				let exponent = rank as u32 / bucket_width;
				relevance / 2f64.powi(exponent as i32)
			})
			.sum()
	}
}

impl RankingMetric for Hlu {
	fn evaluate(
		&self,
		ranking: &[usize],
		best_ranking: &[usize],
		relevance: &FnvHashMap<usize, f64>,
	) -> f64 {
		let best_utility = self.utility(best_ranking, relevance);
		if best_utility == 0.0 {
			return 0.0;
		}
		self.utility(ranking, relevance) / best_utility
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_hlu() {
		let relevance: FnvHashMap<usize, f64> =
			vec![(1, 4.0), (2, 2.0)].into_iter().collect();
		let metric = Hlu::default();
		let best = [1, 2];
		assert!((metric.evaluate(&best, &best, &relevance) - 1.0).abs() < f64::EPSILON);
		let swapped = metric.evaluate(&[2, 1], &best, &relevance);
		// Within the first half-life bucket ranks share a discount, so swapping scores the same.
		assert!((swapped - 1.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_hlu_buckets() {
		// With half_life = 2 each rank halves the utility.
		let relevance: FnvHashMap<usize, f64> =
			vec![(1, 4.0), (2, 4.0), (3, 4.0)].into_iter().collect();
		let metric = Hlu { k: 10, half_life: 2 };
		let utility = metric.utility(&[1, 2, 3], &relevance);
		assert!((utility - (4.0 + 2.0 + 1.0)).abs() < f64::EPSILON);
	}

	#[test]
	fn test_hlu_clamps_degenerate_half_lives() {
		let relevance: FnvHashMap<usize, f64> =
			vec![(1, 4.0), (2, 4.0), (3, 4.0)].into_iter().collect();
		let reference = Hlu { k: 10, half_life: 2 };
		let expected = reference.evaluate(&[3, 2, 1], &[1, 2, 3], &relevance);
		for half_life in 0..2 {
			let metric = Hlu { k: 10, half_life };
			let evaluated = metric.evaluate(&[3, 2, 1], &[1, 2, 3], &relevance);
			assert!((evaluated - expected).abs() < f64::EPSILON);
		}
	}
}
