use std::ops::Range;

/// What the distributed partitioner does with the `N mod P` samples that do not fill a whole share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RemainderPolicy {
	/// Trailing samples are not processed (and get no assignment).
	#[default]
	Drop,
	/// The last worker processes its share plus the remainder.
	AssignToLast,
}

/// Split `sample_cnt` samples into `units` contiguous ranges whose sizes differ by at most one.
/// The first `sample_cnt % units` ranges carry the extra element.
pub fn balanced(sample_cnt: usize, units: usize) -> Vec<Range<usize>> {
	assert!(units > 0, "at least one execution unit is required");
	let (base, extra) = (sample_cnt / units, sample_cnt % units);
	let mut start = 0;
	(0..units).map(|u| {
		let len = base + (u < extra) as usize;
		let range = start..start + len;
		start += len;
		range
	}).collect()
}

/// Split `sample_cnt` samples into `units` ranges of exactly `sample_cnt / units` elements each,
/// treating the remainder according to `policy`.
pub fn even_split(sample_cnt: usize, units: usize, policy: RemainderPolicy) -> Vec<Range<usize>> {
	assert!(units > 0, "at least one execution unit is required");
	let share = sample_cnt / units;
	let remainder = sample_cnt % units;
	(0..units).map(|u| {
		let start = u * share;
		let end = match policy {
			RemainderPolicy::AssignToLast if u + 1 == units => start + share + remainder,
			_ => start + share,
		};
		start..end
	}).collect()
}

/// Number of samples covered by a set of ranges.
pub fn covered(ranges: &[Range<usize>]) -> usize {
	ranges.iter().map(|r| r.len()).sum()
}


#[cfg(test)]
mod tests {
	use super::*;

	fn assert_contiguous(ranges: &[Range<usize>], end: usize) {
		let mut expected_start = 0;
		for r in ranges {
			assert_eq!(r.start, expected_start);
			expected_start = r.end;
		}
		assert_eq!(expected_start, end);
	}

	#[test]
	fn balanced_ten_by_three() {
		let ranges = balanced(10, 3);
		assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
	}

	#[test]
	fn balanced_covers_everything() {
		for n in 0..60 {
			for p in 1..12 {
				let ranges = balanced(n, p);
				assert_eq!(ranges.len(), p);
				assert_contiguous(&ranges, n);
				let max = ranges.iter().map(|r| r.len()).max().unwrap();
				let min = ranges.iter().map(|r| r.len()).min().unwrap();
				assert!(max - min <= 1, "n={} p={} sizes differ by {}", n, p, max - min);
			}
		}
	}

	#[test]
	fn balanced_more_units_than_samples() {
		let ranges = balanced(2, 4);
		assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);
	}

	#[test]
	fn even_split_drops_remainder() {
		let ranges = even_split(10, 3, RemainderPolicy::Drop);
		assert_eq!(ranges, vec![0..3, 3..6, 6..9]);
		assert_eq!(covered(&ranges), 9);
	}

	#[test]
	fn even_split_assigns_remainder_to_last() {
		let ranges = even_split(10, 3, RemainderPolicy::AssignToLast);
		assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
		assert_contiguous(&ranges, 10);
	}

	#[test]
	fn even_split_divisible_is_policy_independent() {
		for p in [1, 2, 4, 8] {
			assert_eq!(even_split(64, p, RemainderPolicy::Drop), even_split(64, p, RemainderPolicy::AssignToLast));
			assert_contiguous(&even_split(64, p, RemainderPolicy::Drop), 64);
		}
	}
}
