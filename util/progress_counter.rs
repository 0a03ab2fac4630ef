use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/// A cheaply cloneable counter that can be advanced from worker threads while a supervising thread reads it to report progress.
#[derive(Clone, Debug, Default)]
pub struct ProgressCounter {
	current: Arc<AtomicU64>,
	total: Arc<AtomicU64>,
}

impl ProgressCounter {
	pub fn new(total: u64) -> Self {
		Self {
			current: Arc::new(AtomicU64::new(0)),
			total: Arc::new(AtomicU64::new(total)),
		}
	}

	pub fn total(&self) -> u64 {
		self.total.load(Ordering::Relaxed)
	}

	/// Replace the total. Useful when the amount of work is only known after counting has already started.
	pub fn set_total(&self, total: u64) {
		self.total.store(total, Ordering::Relaxed)
	}

	pub fn get(&self) -> u64 {
		self.current.load(Ordering::Relaxed)
	}

	pub fn set(&self, value: u64) {
		self.current.store(value, Ordering::Relaxed)
	}

	pub fn inc(&self, amount: u64) {
		self.current.fetch_add(amount, Ordering::Relaxed);
	}

	/// The completed fraction in `[0, 1]`, or `0` if the total is zero.
	pub fn fraction(&self) -> f32 {
		let total = self.total();
		if total == 0 {
			return 0.0;
		}
		self.get() as f32 / total as f32
	}
}

#[test]
fn test_progress_counter() {
	let counter = ProgressCounter::new(10);
	counter.inc(3);
	let clone = counter.clone();
	clone.inc(2);
	assert_eq!(counter.get(), 5);
	assert!((counter.fraction() - 0.5).abs() < f32::EPSILON);
	counter.set_total(0);
	assert_eq!(counter.fraction(), 0.0);
}
