//! Lane planning
//!
//! Deterministic min-batch/max-concurrency policy: decides how many lanes
//! to open and which contiguous block of scenarios each lane runs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Assignment of scenario positions to worker lanes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanePlan {
    lanes: Vec<Range<usize>>,
}

impl LanePlan {
    /// Compute the lane assignment for `n` scenarios
    ///
    /// Every lane but possibly the last receives at least `min_sim`
    /// scenarios, and no more than `max_concurrent` lanes are opened.
    /// GUI mode always produces a single lane.
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if `min_sim` or `max_concurrent` is zero
    pub fn compute(n: usize, min_sim: usize, max_concurrent: usize, gui: bool) -> Result<Self> {
        if min_sim == 0 {
            return Err(Error::invalid("min_sim must be >= 1"));
        }
        if max_concurrent == 0 {
            return Err(Error::invalid("max_concurrent must be >= 1"));
        }
        if n == 0 {
            return Ok(Self { lanes: Vec::new() });
        }

        let lane_count = if gui {
            1
        } else {
            n.div_ceil(min_sim).clamp(1, max_concurrent)
        };

        let sizes: Vec<usize> = if n >= lane_count * min_sim {
            let base = n / lane_count;
            let extra = n % lane_count;
            (0..lane_count)
                .map(|k| base + usize::from(k < extra))
                .collect()
        } else {
            let mut sizes = vec![min_sim; lane_count - 1];
            sizes.push(n - min_sim * (lane_count - 1));
            sizes
        };

        let mut start = 0;
        let lanes = sizes
            .into_iter()
            .map(|size| {
                let lane = start..start + size;
                start += size;
                lane
            })
            .collect();

        Ok(Self { lanes })
    }

    /// Scenario position ranges, one per lane
    #[inline]
    #[must_use]
    pub fn lanes(&self) -> &[Range<usize>] {
        &self.lanes
    }

    /// Number of lanes
    #[inline]
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Scenarios per lane
    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        self.lanes.iter().map(ExactSizeIterator::len).collect()
    }

    /// Total scenarios covered
    #[must_use]
    pub fn total(&self) -> usize {
        self.lanes.iter().map(ExactSizeIterator::len).sum()
    }

    /// True when no lane is opened
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

impl fmt::Display for LanePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lanes.is_empty() {
            return f.write_str("no lanes");
        }
        for (k, lane) in self.lanes.iter().enumerate() {
            if k > 0 {
                f.write_str("\n")?;
            }
            write!(
                f,
                "lane {k}: scenarios {}..={} ({})",
                lane.start,
                lane.end - 1,
                lane.len()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamps_to_max_concurrent() {
        let plan = LanePlan::compute(5, 2, 2, false).unwrap();
        assert_eq!(plan.sizes(), vec![3, 2]);
        assert_eq!(plan.lanes(), &[0..3, 3..5]);
    }

    #[test]
    fn one_scenario_per_lane() {
        let plan = LanePlan::compute(3, 1, 3, false).unwrap();
        assert_eq!(plan.sizes(), vec![1, 1, 1]);
    }

    #[test]
    fn remainder_goes_to_last_lane() {
        let plan = LanePlan::compute(7, 3, 8, false).unwrap();
        assert_eq!(plan.sizes(), vec![3, 3, 1]);
    }

    #[test]
    fn min_sim_above_n_gives_single_lane() {
        let plan = LanePlan::compute(4, 10, 8, false).unwrap();
        assert_eq!(plan.sizes(), vec![4]);
    }

    #[test]
    fn gui_forces_single_lane() {
        let plan = LanePlan::compute(4, 1, 8, true).unwrap();
        assert_eq!(plan.sizes(), vec![4]);
    }

    #[test]
    fn empty_matrix_opens_no_lanes() {
        let plan = LanePlan::compute(0, 1, 4, false).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "no lanes");
    }

    #[test]
    fn zero_parameters_rejected() {
        assert!(matches!(
            LanePlan::compute(3, 0, 2, false),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            LanePlan::compute(3, 1, 0, false),
            Err(Error::InvalidParameter(_))
        ));
        assert!(LanePlan::compute(0, 1, 0, false).is_err());
    }

    #[test]
    fn display_lists_lanes() {
        let plan = LanePlan::compute(5, 2, 2, false).unwrap();
        assert_eq!(
            plan.to_string(),
            "lane 0: scenarios 0..=2 (3)\nlane 1: scenarios 3..=4 (2)"
        );
    }

    proptest! {
        #[test]
        fn plan_covers_every_scenario_once(
            n in 0usize..200,
            min_sim in 1usize..20,
            max_concurrent in 1usize..16,
            gui in any::<bool>(),
        ) {
            let plan = LanePlan::compute(n, min_sim, max_concurrent, gui).unwrap();

            prop_assert_eq!(plan.total(), n);
            prop_assert!(plan.lane_count() <= max_concurrent);
            if gui {
                prop_assert!(plan.lane_count() <= 1);
            }

            let sizes = plan.sizes();
            if let Some((_, head)) = sizes.split_last() {
                prop_assert!(head.iter().all(|&len| len >= min_sim));
            }
            prop_assert!(sizes.iter().all(|&len| len > 0));

            let mut next = 0;
            for lane in plan.lanes() {
                prop_assert_eq!(lane.start, next);
                next = lane.end;
            }
            prop_assert_eq!(next, n);
        }
    }
}
