//! Closed-loop latency optimization harness.
//!
//! Synthesizes a shared-memory access descriptor, submits it to an external
//! latency oracle, and, when the measured latency exceeds a threshold,
//! synthesizes a conflict-free descriptor and reports the speedup:
//!
//! 1. [`descriptor::synthesize`] writes a uniform-stride descriptor to disk.
//! 2. An [`oracle::Oracle`] measures it (normally a [`oracle::SubprocessOracle`]).
//! 3. [`controller::FeedbackController`] applies the threshold policy from
//!    [`config::LoopConfig`] and produces a [`report::LoopOutcome`].

pub mod config;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod oracle;
pub mod report;

// Re-exports for convenience.
pub use config::LoopConfig;
pub use controller::{compute_speedup, FeedbackController, LoopState};
pub use descriptor::{synthesize, AccessOp, Opcode, SerializedDescriptor, WorkloadDescriptor};
pub use error::{LoopError, Result};
pub use oracle::{
    decode_measurement, Measurement, Oracle, OracleCommand, ScriptedOracle, ScriptedResponse,
    SubprocessOracle,
};
pub use report::{LoopOutcome, Verdict};

/// Default descriptor file name inside the oracle's working directory.
pub const DEFAULT_DESCRIPTOR_NAME: &str = "temp.ptx";
