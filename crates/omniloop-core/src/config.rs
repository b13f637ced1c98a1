//! Demonstration policy for the feedback loop.

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

/// Stride used for the baseline descriptor: every access lands in the same bank.
pub const REFERENCE_BAD_STRIDE: u32 = 32;
/// Stride used for the optimized descriptor: conflict-free access.
pub const REFERENCE_GOOD_STRIDE: u32 = 1;
/// Number of access operations per descriptor.
pub const REFERENCE_INSTRUCTION_COUNT: usize = 32;
/// Baseline latency (cycles) above which the loop attempts an optimization.
pub const REFERENCE_THRESHOLD: u64 = 100;

/// The fixed before/after policy driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Adversarial stride measured first.
    pub bad_stride: u32,
    /// Favorable stride measured when the baseline exceeds the threshold.
    pub good_stride: u32,
    /// Operations per synthesized descriptor.
    pub instruction_count: usize,
    /// Latency threshold in cycles. Optimization triggers on `latency > threshold`.
    pub threshold: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            bad_stride: REFERENCE_BAD_STRIDE,
            good_stride: REFERENCE_GOOD_STRIDE,
            instruction_count: REFERENCE_INSTRUCTION_COUNT,
            threshold: REFERENCE_THRESHOLD,
        }
    }
}

impl LoopConfig {
    /// Reject strides and counts the synthesizer cannot encode.
    pub fn validate(&self) -> Result<()> {
        if self.bad_stride == 0 {
            return Err(LoopError::InvalidParameter {
                name: "bad stride",
                value: self.bad_stride.to_string(),
            });
        }
        if self.good_stride == 0 {
            return Err(LoopError::InvalidParameter {
                name: "good stride",
                value: self.good_stride.to_string(),
            });
        }
        if self.instruction_count == 0 {
            return Err(LoopError::InvalidParameter {
                name: "instruction count",
                value: self.instruction_count.to_string(),
            });
        }
        Ok(())
    }

    /// Whether a baseline latency calls for the optimization attempt.
    pub fn exceeds_threshold(&self, latency: u64) -> bool {
        latency > self.threshold
    }
}
