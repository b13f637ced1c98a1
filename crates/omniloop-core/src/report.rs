//! Outcome of a feedback-loop run and its renderings.

use std::fmt;

use serde::Serialize;

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Baseline was within the threshold; no second measurement.
    AlreadyOptimized,
    /// The optimized descriptor measured strictly faster.
    Improved,
    /// The optimized descriptor was measured but did not beat the baseline.
    NotImproved,
}

/// Summary of one before/after comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub threshold: u64,
    pub baseline_stride: u32,
    pub baseline_latency: u64,
    pub optimized_stride: Option<u32>,
    pub optimized_latency: Option<u64>,
    /// `baseline_latency / optimized_latency`.
    pub speedup: Option<f64>,
    /// True only when a second sample was taken and it beat the baseline.
    pub optimized: bool,
}

impl LoopOutcome {
    pub fn verdict(&self) -> Verdict {
        match (self.optimized_latency, self.optimized) {
            (None, _) => Verdict::AlreadyOptimized,
            (Some(_), true) => Verdict::Improved,
            (Some(_), false) => Verdict::NotImproved,
        }
    }

    /// Whether the baseline triggered the optimization attempt.
    pub fn optimization_attempted(&self) -> bool {
        self.optimized_latency.is_some()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "baseline_latency": self.baseline_latency,
            "optimized_latency": self.optimized_latency,
            "speedup": self.speedup,
            "optimized": self.optimized,
            "threshold": self.threshold,
            "baseline_stride": self.baseline_stride,
            "optimized_stride": self.optimized_stride,
            "verdict": self.verdict(),
        })
    }
}

impl fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Feedback Loop Report ===")?;
        writeln!(
            f,
            "Baseline (stride {}): {} cycles",
            self.baseline_stride, self.baseline_latency
        )?;
        writeln!(f, "Threshold: {} cycles", self.threshold)?;
        writeln!(f)?;

        let (Some(stride), Some(latency)) = (self.optimized_stride, self.optimized_latency) else {
            writeln!(f, "Kernel is already optimized.")?;
            return Ok(());
        };

        writeln!(
            f,
            "High latency detected ({} > {}).",
            self.baseline_latency, self.threshold
        )?;
        writeln!(f, "Optimized (stride {stride}): {latency} cycles")?;
        if let Some(speedup) = self.speedup {
            writeln!(f, "Speedup: {speedup:.1}x")?;
        }
        writeln!(f)?;
        match self.verdict() {
            Verdict::Improved => writeln!(f, "Optimization successful.")?,
            Verdict::NotImproved => writeln!(
                f,
                "Optimization did not improve latency ({latency} >= {}).",
                self.baseline_latency
            )?,
            Verdict::AlreadyOptimized => {}
        }
        Ok(())
    }
}
