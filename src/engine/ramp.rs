//! Ramp profile: ordered stages of target virtual-user counts.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// A ramp segment: move to `target` units over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    RampingToStage(usize),
    SteadyAtStage(usize),
    Completed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => f.write_str("idle"),
            SchedulerState::RampingToStage(i) => write!(f, "ramping to stage {}", i + 1),
            SchedulerState::SteadyAtStage(i) => write!(f, "steady at stage {}", i + 1),
            SchedulerState::Completed => f.write_str("completed"),
        }
    }
}

/// Where the ramp is at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampPosition {
    pub stage: usize,
    pub target: u64,
    pub ramping: bool,
}

impl RampPosition {
    pub fn state(&self) -> SchedulerState {
        if self.ramping {
            SchedulerState::RampingToStage(self.stage)
        } else {
            SchedulerState::SteadyAtStage(self.stage)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampProfile {
    start_target: u64,
    stages: Vec<Stage>,
    total: Duration,
}

impl RampProfile {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        Self::with_start_target(0, stages)
    }

    pub fn with_start_target(start_target: u64, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let mut total = Duration::ZERO;
        for (index, stage) in stages.iter().enumerate() {
            total = total
                .checked_add(stage.duration)
                .ok_or_else(|| ConfigError::InvalidStage {
                    index,
                    reason: "total duration overflows".to_string(),
                })?;
        }
        if total.is_zero() {
            return Err(ConfigError::InvalidStage {
                index: stages.len() - 1,
                reason: "total duration must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            start_target,
            stages,
            total,
        })
    }

    /// Constant load: `vus` units for `duration`.
    pub fn constant(vus: u64, duration: Duration) -> Result<Self, ConfigError> {
        Self::with_start_target(vus, vec![Stage::new(duration, vus)])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start_target)
    }

    /// Target at `elapsed`, linearly interpolated from the previous stage's
    /// target. Returns `None` once every stage has elapsed.
    pub fn position(&self, elapsed: Duration) -> Option<RampPosition> {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.start_target;

        for (index, stage) in self.stages.iter().enumerate() {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let fraction =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let from = previous as f64;
                let to = stage.target as f64;
                let target = (from + (to - from) * fraction).round() as u64;
                return Some(RampPosition {
                    stage: index,
                    target,
                    ramping: previous != stage.target,
                });
            }
            stage_start = stage_end;
            previous = stage.target;
        }

        None
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn profile() -> RampProfile {
        RampProfile::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(secs(40), 50),
            Stage::new(secs(10), 0),
        ])
        .unwrap()
    }

    #[test]
    fn test_linear_interpolation_between_stages() {
        let profile = profile();
        assert_eq!(profile.total_duration(), secs(60));
        assert_eq!(profile.max_target(), 50);

        let at = |s: f64| profile.position(Duration::from_secs_f64(s)).unwrap();
        assert_eq!(at(0.0).target, 0);
        assert_eq!(at(5.0).target, 5);
        assert_eq!(at(5.0).state(), SchedulerState::RampingToStage(0));
        assert_eq!(at(10.0).target, 10);
        assert_eq!(at(30.0).target, 30);
        assert_eq!(at(49.9).target, 50);
        assert_eq!(at(50.0).target, 50);
        assert_eq!(at(55.0).target, 25);
        assert_eq!(at(55.0).state(), SchedulerState::RampingToStage(2));
        assert!(profile.position(secs(60)).is_none());
    }

    #[test]
    fn test_steady_stage_and_zero_length_stage() {
        let profile = RampProfile::new(vec![
            Stage::new(Duration::ZERO, 20),
            Stage::new(secs(30), 20),
        ])
        .unwrap();
        let pos = profile.position(secs(1)).unwrap();
        assert_eq!(pos.target, 20);
        assert_eq!(pos.state(), SchedulerState::SteadyAtStage(1));

        let constant = RampProfile::constant(50, secs(60)).unwrap();
        assert_eq!(constant.position(Duration::ZERO).unwrap().target, 50);
        assert!(!constant.position(secs(59)).unwrap().ramping);
    }

    #[test]
    fn test_invalid_profiles() {
        assert!(matches!(RampProfile::new(vec![]), Err(ConfigError::NoStages)));
        assert!(matches!(
            RampProfile::new(vec![Stage::new(Duration::ZERO, 5)]),
            Err(ConfigError::InvalidStage { .. })
        ));
        assert!(matches!(
            RampProfile::new(vec![
                Stage::new(Duration::MAX, 1),
                Stage::new(secs(1), 1)
            ]),
            Err(ConfigError::InvalidStage { index: 1, .. })
        ));
    }
}
