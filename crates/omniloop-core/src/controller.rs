//! Feedback controller: measure, decide, optionally re-measure, report.
//!
//! ```text
//! Init -> BaselineMeasured -> Accepted
//!                          \-> Optimizing -> Done
//! ```
//!
//! Exactly one optimization attempt is made. There is no search and no retry.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::LoopConfig;
use crate::descriptor::synthesize;
use crate::error::{LoopError, Result};
use crate::oracle::Oracle;
use crate::report::LoopOutcome;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    BaselineMeasured,
    /// Terminal: baseline within threshold.
    Accepted,
    Optimizing,
    /// Terminal: optimized descriptor measured.
    Done,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Accepted | LoopState::Done)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Init => "init",
            LoopState::BaselineMeasured => "baseline-measured",
            LoopState::Accepted => "accepted",
            LoopState::Optimizing => "optimizing",
            LoopState::Done => "done",
        };
        f.write_str(name)
    }
}

/// `baseline / optimized` as a real ratio. A zero optimized latency is an oracle defect.
pub fn compute_speedup(baseline_latency: u64, optimized_latency: u64) -> Result<f64> {
    if optimized_latency == 0 {
        return Err(LoopError::DivideByZero { baseline_latency });
    }
    Ok(baseline_latency as f64 / optimized_latency as f64)
}

/// Drives one before/after comparison against an [`Oracle`].
pub struct FeedbackController<O> {
    config: LoopConfig,
    oracle: O,
    descriptor_path: PathBuf,
    state: LoopState,
}

impl<O: Oracle> FeedbackController<O> {
    /// Create a controller that writes descriptors to `descriptor_path`.
    pub fn new(config: LoopConfig, oracle: O, descriptor_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            oracle,
            descriptor_path: descriptor_path.into(),
            state: LoopState::Init,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }

    /// Run the loop to a terminal state.
    ///
    /// Any error aborts the run; the controller stays in the state it had
    /// reached when the error occurred.
    pub fn run(&mut self) -> Result<LoopOutcome> {
        if self.state != LoopState::Init {
            return Err(LoopError::InvalidParameter {
                name: "controller state",
                value: format!("{} (a controller runs once)", self.state),
            });
        }
        self.config.validate()?;

        let baseline_stride = self.config.bad_stride;
        let baseline_latency = self.measure_stride(baseline_stride)?;
        info!(stride = baseline_stride, latency = baseline_latency, "baseline measured");
        self.transition(LoopState::BaselineMeasured);

        if !self.config.exceeds_threshold(baseline_latency) {
            self.transition(LoopState::Accepted);
            info!(
                latency = baseline_latency,
                threshold = self.config.threshold,
                "kernel already optimized"
            );
            return Ok(LoopOutcome {
                threshold: self.config.threshold,
                baseline_stride,
                baseline_latency,
                optimized_stride: None,
                optimized_latency: None,
                speedup: None,
                optimized: false,
            });
        }

        warn!(
            latency = baseline_latency,
            threshold = self.config.threshold,
            "high latency detected, optimizing access pattern"
        );
        self.transition(LoopState::Optimizing);

        let optimized_stride = self.config.good_stride;
        let optimized_latency = self.measure_stride(optimized_stride)?;
        let speedup = compute_speedup(baseline_latency, optimized_latency)?;
        let optimized = optimized_latency < baseline_latency;
        info!(
            stride = optimized_stride,
            latency = optimized_latency,
            speedup,
            improved = optimized,
            "optimized kernel measured"
        );
        self.transition(LoopState::Done);

        Ok(LoopOutcome {
            threshold: self.config.threshold,
            baseline_stride,
            baseline_latency,
            optimized_stride: Some(optimized_stride),
            optimized_latency: Some(optimized_latency),
            speedup: Some(speedup),
            optimized,
        })
    }

    fn measure_stride(&mut self, stride: u32) -> Result<u64> {
        let written = synthesize(stride, self.config.instruction_count, &self.descriptor_path)?;
        Ok(self.oracle.measure(written.path())?.latency)
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{ScriptedOracle, ScriptedResponse};

    fn controller(
        dir: &tempfile::TempDir,
        config: LoopConfig,
        oracle: ScriptedOracle,
    ) -> FeedbackController<ScriptedOracle> {
        FeedbackController::new(config, oracle, dir.path().join("temp.ptx"))
    }

    #[test]
    fn speedup_is_real_valued() {
        assert_eq!(compute_speedup(150, 5).unwrap(), 30.0);
        assert_eq!(compute_speedup(3, 2).unwrap(), 1.5);
        assert!(matches!(
            compute_speedup(120, 0),
            Err(LoopError::DivideByZero { baseline_latency: 120 })
        ));
    }

    #[test]
    fn high_baseline_triggers_single_optimization() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([150, 5]));

        let outcome = ctl.run().unwrap();
        assert_eq!(ctl.state(), LoopState::Done);
        assert_eq!(outcome.baseline_latency, 150);
        assert_eq!(outcome.optimized_latency, Some(5));
        assert_eq!(outcome.speedup, Some(30.0));
        assert!(outcome.optimized);

        let strides: Vec<u32> = ctl.oracle().observed().iter().map(|d| d.stride()).collect();
        assert_eq!(strides, vec![32, 1]);
        assert!(ctl.oracle().observed().iter().all(|d| d.len() == 32));
    }

    #[test]
    fn low_baseline_is_accepted_without_second_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([40]));

        let outcome = ctl.run().unwrap();
        assert_eq!(ctl.state(), LoopState::Accepted);
        assert!(ctl.state().is_terminal());
        assert_eq!(outcome.baseline_latency, 40);
        assert_eq!(outcome.optimized_latency, None);
        assert_eq!(outcome.speedup, None);
        assert!(!outcome.optimized);
        assert_eq!(ctl.oracle().calls(), 1);
    }

    #[test]
    fn threshold_boundary() {
        let dir = tempfile::tempdir().unwrap();

        let mut at = controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([100]));
        at.run().unwrap();
        assert_eq!(at.state(), LoopState::Accepted);

        let mut above =
            controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([101, 50]));
        let outcome = above.run().unwrap();
        assert_eq!(above.state(), LoopState::Done);
        assert_eq!(outcome.optimized_latency, Some(50));
    }

    #[test]
    fn custom_policy_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoopConfig {
            bad_stride: 16,
            good_stride: 2,
            instruction_count: 8,
            threshold: 10,
        };
        let mut ctl = controller(&dir, config, ScriptedOracle::latencies([11, 4]));

        let outcome = ctl.run().unwrap();
        assert_eq!(outcome.baseline_stride, 16);
        assert_eq!(outcome.optimized_stride, Some(2));
        assert_eq!(outcome.threshold, 10);
        assert_eq!(outcome.speedup, Some(2.75));

        let observed = ctl.oracle().observed();
        assert_eq!(observed[0].stride(), 16);
        assert_eq!(observed[1].stride(), 2);
        assert!(observed.iter().all(|d| d.len() == 8));
    }

    #[test]
    fn non_improving_second_sample_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([150, 150]));

        let outcome = ctl.run().unwrap();
        assert_eq!(ctl.state(), LoopState::Done);
        assert_eq!(outcome.speedup, Some(1.0));
        assert!(!outcome.optimized);
    }

    #[test]
    fn zero_optimized_latency_is_divide_by_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([120, 0]));

        let err = ctl.run().unwrap_err();
        assert!(matches!(err, LoopError::DivideByZero { baseline_latency: 120 }));
        assert_eq!(ctl.state(), LoopState::Optimizing);
    }

    #[test]
    fn oracle_failure_aborts_without_regeneration() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new([ScriptedResponse::Fail {
            status: 1,
            stderr: "GPU unavailable".into(),
        }]);
        let mut ctl = controller(&dir, LoopConfig::default(), oracle);

        let err = ctl.run().unwrap_err();
        assert!(err.to_string().contains("GPU unavailable"));
        assert_eq!(ctl.state(), LoopState::Init);
        assert_eq!(ctl.oracle().calls(), 1);

        let on_disk = std::fs::read_to_string(ctl.descriptor_path()).unwrap();
        assert!(on_disk.lines().all(|l| l == "LD.SHARED:32"));
    }

    #[test]
    fn decode_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new([ScriptedResponse::Raw("latency=150".into())]);
        let mut ctl = controller(&dir, LoopConfig::default(), oracle);

        let err = ctl.run().unwrap_err();
        assert_eq!(err.kind(), "MeasurementDecodeError");
        assert!(err.to_string().contains("latency=150"));
    }

    #[test]
    fn invalid_config_rejected_before_measuring() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoopConfig {
            good_stride: 0,
            ..LoopConfig::default()
        };
        let mut ctl = controller(&dir, config, ScriptedOracle::latencies([150, 5]));

        assert!(matches!(ctl.run(), Err(LoopError::InvalidParameter { .. })));
        assert_eq!(ctl.oracle().calls(), 0);
    }

    #[test]
    fn controller_runs_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&dir, LoopConfig::default(), ScriptedOracle::latencies([40, 40]));
        ctl.run().unwrap();
        assert!(ctl.run().is_err());
        assert_eq!(ctl.into_oracle().calls(), 1);
    }
}
