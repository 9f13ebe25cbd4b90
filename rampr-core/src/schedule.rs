use std::time::Duration;

use crate::config::Stage;

/// Piecewise-linear VU target over the stage timeline.
///
/// The target ramps linearly from the previous stage's target (or `start`
/// before the first stage) to each stage's declared target, rounded
/// half-up to the nearest integer. At an exact stage boundary the declared
/// target is returned exactly.
#[derive(Debug, Clone)]
pub struct RampingVuSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampingVuSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Highest target the schedule can command; the worker pool size.
    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start)
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed == Duration::ZERO {
            return self.start;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        };

        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };

        let stage = &self.stages[idx];
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        let end_target = stage.target;

        if stage_duration.is_zero() {
            return end_target;
        }

        let frac = stage_elapsed.as_secs_f64() / stage_duration.as_secs_f64();
        let exact = start_target as f64 + (end_target as f64 - start_target as f64) * frac;

        // Round half-up.
        (exact + 0.5).floor().max(0.0) as u64
    }

    /// How long a parked worker (`vu_index` above the current target) should
    /// wait before rechecking the schedule.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        // Conservative default.
        let default_sleep = Duration::from_millis(50);

        if self.stages.is_empty() {
            return default_sleep;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return Duration::ZERO;
        }

        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        };

        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };

        let stage = &self.stages[idx];
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        let end_target = stage.target;

        // Already active: a short sleep picks up ramp-down promptly.
        if vu_index <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        // Target not increasing: this worker cannot activate within this stage.
        if end_target <= start_target {
            return stage_end.saturating_sub(elapsed).min(default_sleep);
        }

        if vu_index > end_target {
            return stage_end.saturating_sub(elapsed).min(default_sleep);
        }

        // Target is increasing: wake roughly when the ramp reaches this index.
        let delta = end_target as f64 - start_target as f64;
        let needed = (vu_index as f64 - start_target as f64) / delta;
        let needed = Duration::from_secs_f64(stage_duration.as_secs_f64() * needed.clamp(0.0, 1.0));
        let wait = needed.saturating_sub(stage_elapsed);

        wait.min(default_sleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn boundaries_hit_declared_targets_exactly() {
        let s = RampingVuSchedule::new(0, vec![stage(3, 2), stage(5, 5), stage(2, 0)]);

        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(3)), 2);
        assert_eq!(s.target_at(Duration::from_secs(8)), 5);
        assert_eq!(s.target_at(Duration::from_secs(10)), 0);
        assert!(s.is_done(Duration::from_secs(10)));
        assert_eq!(s.total_duration(), Duration::from_secs(10));
        assert_eq!(s.max_target(), 5);
    }

    #[test]
    fn interpolation_rounds_half_up() {
        // 0 -> 5 over 10s: exact target at 5s is 2.5, which rounds to 3.
        let s = RampingVuSchedule::new(0, vec![stage(10, 5)]);
        assert_eq!(s.target_at(Duration::from_secs(5)), 3);
        assert_eq!(s.target_at(Duration::from_secs(2)), 1);
        assert_eq!(s.target_at(Duration::from_secs(1)), 1); // 0.5 rounds up
    }

    #[test]
    fn ramp_down_interpolates_towards_zero() {
        let s = RampingVuSchedule::new(4, vec![stage(4, 0)]);
        assert_eq!(s.target_at(Duration::ZERO), 4);
        assert_eq!(s.target_at(Duration::from_secs(2)), 2);
        assert_eq!(s.target_at(Duration::from_secs(4)), 0);
    }

    #[test]
    fn single_stage_with_matching_start_holds_constant() {
        let s = RampingVuSchedule::new(3, vec![stage(7, 3)]);
        for ms in [0u64, 1, 1000, 3500, 6999] {
            assert_eq!(s.target_at(Duration::from_millis(ms)), 3);
        }
    }

    #[test]
    fn target_after_schedule_end_is_final_target() {
        let s = RampingVuSchedule::new(0, vec![stage(1, 2)]);
        assert_eq!(s.target_at(Duration::from_secs(5)), 2);
    }

    #[test]
    fn mid_run_zero_target_is_valid() {
        let s = RampingVuSchedule::new(0, vec![stage(2, 4), stage(2, 0), stage(2, 4)]);
        assert_eq!(s.target_at(Duration::from_secs(4)), 0);
        // And it comes back up afterwards.
        assert_eq!(s.target_at(Duration::from_secs(6)), 4);
    }

    #[test]
    fn recheck_is_short_for_active_workers_and_bounded_for_parked() {
        let s = RampingVuSchedule::new(0, vec![stage(10, 5)]);

        // Active worker polls quickly.
        let w = s.next_recheck_in(Duration::from_secs(5), 1);
        assert_eq!(w, Duration::from_millis(1));

        // Parked worker never waits more than the conservative cap.
        let w = s.next_recheck_in(Duration::from_secs(1), 5);
        assert!(w <= Duration::from_millis(50));

        // Past the end there is nothing to wait for.
        assert_eq!(s.next_recheck_in(Duration::from_secs(10), 1), Duration::ZERO);
    }
}
