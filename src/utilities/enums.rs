#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Execution strategy for the start-bin loop of the pulse search.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kernel {
	Auto,
	Scalar,
	Parallel,
}

impl Default for Kernel {
	fn default() -> Self {
		Kernel::Auto
	}
}

impl Kernel {
	#[inline(always)]
	pub const fn is_parallel(self) -> bool {
		matches!(self, Kernel::Parallel)
	}
}

/// Sign constraint applied by the directional pulse search.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
	/// Flux decrease (transit-like).
	Dip,
	/// Flux increase.
	Blip,
	/// Either sign; only the degenerate-weight guard applies.
	Best,
}

impl Direction {
	/// Multiplier used by the acceptance gate: `-1`, `+1` or `0`.
	#[inline(always)]
	pub const fn sign(self) -> f64 {
		match self {
			Direction::Dip => -1.0,
			Direction::Blip => 1.0,
			Direction::Best => 0.0,
		}
	}

	pub fn from_sign(sign: i32) -> Option<Self> {
		match sign {
			-1 => Some(Direction::Dip),
			0 => Some(Direction::Best),
			1 => Some(Direction::Blip),
			_ => None,
		}
	}
}

/// Whether the window `[i, i + nbins_max_dur]` includes its last bin.
///
/// `Inclusive` scans end bins up to and including `i + nbins_max_dur`;
/// `Exclusive` stops one bin earlier, which is the behaviour of the older
/// single-direction kernel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DurationBound {
	Inclusive,
	Exclusive,
}

impl Default for DurationBound {
	fn default() -> Self {
		DurationBound::Inclusive
	}
}

impl DurationBound {
	/// One past the last end bin considered for a window starting at `start`.
	#[inline(always)]
	pub fn end_exclusive(self, start: usize, max_dur: usize, nbins: usize) -> usize {
		let reach = match self {
			DurationBound::Inclusive => start + max_dur + 1,
			DurationBound::Exclusive => start + max_dur,
		};
		reach.min(nbins)
	}
}

/// Treatment of NaN flux samples while phase binning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NanPolicy {
	/// Every sample is binned; a NaN flux poisons its bin mean.
	Propagate,
	/// NaN-flux samples are stepped over and excluded from every bin.
	Skip,
}

impl Default for NanPolicy {
	fn default() -> Self {
		NanPolicy::Skip
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_duration_bound_end() {
		assert_eq!(DurationBound::Inclusive.end_exclusive(3, 4, 100), 8);
		assert_eq!(DurationBound::Exclusive.end_exclusive(3, 4, 100), 7);
		assert_eq!(DurationBound::Inclusive.end_exclusive(98, 4, 100), 100);
	}

	#[test]
	fn test_direction_signs() {
		for d in [Direction::Dip, Direction::Blip, Direction::Best] {
			assert_eq!(Direction::from_sign(d.sign() as i32), Some(d));
		}
		assert_eq!(Direction::from_sign(2), None);
	}
}
