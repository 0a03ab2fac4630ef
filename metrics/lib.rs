/*!
This crate implements the ranking quality metrics used to score interview tree splits: [`Precision`](struct.Precision.html), [`AveragePrecision`](struct.AveragePrecision.html), [`Ndcg`](struct.Ndcg.html), and [`Hlu`](struct.Hlu.html), all behind the [`RankingMetric`](trait.RankingMetric.html) trait, along with a streaming [`Rmse`](struct.Rmse.html) for offline rating-prediction evaluation.
*/

mod average_precision;
mod hlu;
mod ndcg;
mod precision;
mod rmse;

pub use self::average_precision::AveragePrecision;
pub use self::hlu::Hlu;
pub use self::ndcg::Ndcg;
pub use self::precision::Precision;
pub use self::rmse::Rmse;

use fnv::FnvHashMap;

/**
The `RankingMetric` trait scores one user's predicted ranking against that user's held-out relevance judgments.

`ranking` is the predicted order of items, best first, and may contain items the user has no judgment for, which count as zero relevance. `best_ranking` holds the judged items sorted by descending relevance. Metrics that are already normalized per item, like precision, ignore `best_ranking`.
*/
pub trait RankingMetric: Send + Sync {
	fn evaluate(
		&self,
		ranking: &[usize],
		best_ranking: &[usize],
		relevance: &FnvHashMap<usize, f64>,
	) -> f64;
}
