use num_traits::ToPrimitive;

/// The root mean squared error between predicted and actual ratings, computed in a streaming manner so that chunks evaluated on separate threads can be merged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rmse {
	sum_squared_error: f64,
	n: usize,
}

impl Rmse {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn update(&mut self, prediction: f64, actual: f64) {
		self.sum_squared_error += (actual - prediction).powi(2);
		self.n += 1;
	}

	pub fn merge(&mut self, other: Self) {
		self.sum_squared_error += other.sum_squared_error;
		self.n += other.n;
	}

	/// The RMSE over everything seen so far, or `None` if nothing was seen.
	pub fn finalize(self) -> Option<f64> {
		if self.n == 0 {
			return None;
		}
		Some((self.sum_squared_error / self.n.to_f64().unwrap()).sqrt())
	}
}
