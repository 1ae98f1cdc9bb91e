use crate::memory::*;

/// SSE value the monitor starts from, so that the first iteration always counts as a change.
pub(crate) const INITIAL_PREVIOUS_SSE: f64 = 1e300;

/// State of a running k-means calculation, as decided by the [`ConvergenceMonitor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
	Running,
	/// Terminal
	Converged,
}

/// Decides after each reduction whether the calculation continues.
///
/// The relative change of the global SSE is `|current - previous| / previous` (or divided by 1,
/// when `previous` is not positive). Once it drops below the threshold, the monitor is
/// [`Phase::Converged`] and stays there. Every other check moves `previous` forward and counts
/// one more completed iteration.
///
/// Exactly one unit per run owns the monitor; all other units learn the decision through the
/// following barrier or collective.
#[derive(Clone, Debug)]
pub struct ConvergenceMonitor<T: Primitive> {
	threshold: T,
	previous_sse: T,
	current_sse: T,
	iteration: usize,
	phase: Phase,
}
impl<T: Primitive> ConvergenceMonitor<T> {
	pub fn new(threshold: T) -> Self {
		Self {
			threshold,
			previous_sse: T::from(INITIAL_PREVIOUS_SSE).unwrap_or_else(T::max_value),
			current_sse: T::zero(),
			iteration: 0,
			phase: Phase::Running,
		}
	}

	pub fn relative_change(previous: T, current: T) -> T {
		let denominator = if previous > T::zero() { previous } else { T::one() };
		(current - previous).abs() / denominator
	}

	/// Feed the SSE of the iteration that just finished its reduction.
	/// ## Returns
	/// - **true** if the calculation should continue
	/// - **false** if it converged with this iteration
	pub fn next(&mut self, sse: T) -> bool {
		if self.phase == Phase::Converged {
			return false;
		}
		self.current_sse = sse;
		if Self::relative_change(self.previous_sse, sse) < self.threshold {
			self.phase = Phase::Converged;
			return false;
		}
		self.previous_sse = sse;
		self.iteration += 1;
		true
	}

	pub fn phase(&self) -> Phase { self.phase }
	pub fn converged(&self) -> bool { self.phase == Phase::Converged }
	/// Completed (non-terminal) iterations so far.
	pub fn iteration(&self) -> usize { self.iteration }
	/// Most recently reported SSE.
	pub fn sse(&self) -> T { self.current_sse }
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test] fn test_relative_threshold_f32() { test_relative_threshold::<f32>(); }
	#[test] fn test_relative_threshold_f64() { test_relative_threshold::<f64>(); }

	fn test_relative_threshold<T: Primitive>() {
		let t = |v: f64| T::from(v).unwrap();
		{
			let mut monitor = ConvergenceMonitor::new(t(1e-4));
			assert_eq!(monitor.next(t(3000.0)), true);
			assert_eq!(monitor.next(t(3000.0)), false);
			assert_eq!(monitor.iteration(), 1);
			assert_eq!(monitor.phase(), Phase::Converged);
		}
		{ // 0.1 / 3000 ≈ 3.3e-5 < 1e-4
			let mut monitor = ConvergenceMonitor::new(t(1e-4));
			assert_eq!(monitor.next(t(3000.0)), true);
			assert_eq!(monitor.next(t(2999.9)), false);
		}
		{ // 0.6 / 3000 = 2e-4 >= 1e-4
			let mut monitor = ConvergenceMonitor::new(t(1e-4));
			assert_eq!(monitor.next(t(3000.0)), true);
			assert_eq!(monitor.next(t(2999.4)), true);
			assert_eq!(monitor.iteration(), 2);
		}
		{
			let mut monitor = ConvergenceMonitor::new(t(1e-4));
			assert_eq!(monitor.next(t(3000.0)), true);
			assert_eq!(monitor.next(t(2000.0)), true);
			assert_eq!(monitor.next(t(1990.0)), true);
			assert_eq!(monitor.next(t(1989.99)), false);
			assert_eq!(monitor.iteration(), 3);
			assert_eq!(monitor.sse(), t(1989.99));
		}
	}

	#[test]
	fn increase_counts_as_change() {
		let mut monitor = ConvergenceMonitor::new(1e-4f64);
		assert!(monitor.next(100.0));
		assert!(monitor.next(150.0));
		assert!(!monitor.next(150.0));
	}

	#[test]
	fn zero_previous_divides_by_one() {
		assert_eq!(ConvergenceMonitor::<f64>::relative_change(0.0, 0.5), 0.5);
		let mut monitor = ConvergenceMonitor::new(1e-4f64);
		assert!(monitor.next(0.0));
		assert!(!monitor.next(0.0));
	}

	#[test]
	fn converged_is_terminal() {
		let mut monitor = ConvergenceMonitor::new(1e-4f64);
		assert!(monitor.next(10.0));
		assert!(!monitor.next(10.0));
		assert!(!monitor.next(1.0));
		assert_eq!(monitor.iteration(), 1);
		assert_eq!(monitor.sse(), 10.0);
	}
}
