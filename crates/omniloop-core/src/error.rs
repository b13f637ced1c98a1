//! Feedback-loop errors.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can abort a feedback-loop run.
///
/// None of these are recovered locally: every variant terminates the run.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The serialized descriptor could not be written.
    #[error("cannot write descriptor to {path}: {source}")]
    DescriptorWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stride, count, or threshold is outside its accepted range.
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    /// A serialized descriptor does not follow the `OPCODE:STRIDE` format.
    #[error("malformed descriptor at line {line}: {detail}")]
    InvalidDescriptor { line: usize, detail: String },

    /// The oracle process could not be started or waited on.
    #[error("failed to run oracle `{program}`: {source}")]
    OracleLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The oracle exited with a non-zero status.
    #[error("oracle execution failed ({}):\n{stderr}", describe_status(.status))]
    OracleExecution { status: Option<i32>, stderr: String },

    /// The oracle did not finish within the configured timeout.
    #[error("oracle did not finish within {timeout:?}")]
    OracleTimeout { timeout: Duration },

    /// The oracle's stdout is not a measurement record.
    #[error("cannot decode oracle measurement: {reason}\nraw output: {raw}")]
    MeasurementDecode { reason: String, raw: String },

    /// The optimized measurement reported zero latency.
    #[error("oracle reported zero optimized latency (baseline {baseline_latency} cycles); speedup is undefined")]
    DivideByZero { baseline_latency: u64 },
}

impl LoopError {
    /// Name of the failure class this error belongs to.
    pub fn kind(&self) -> &'static str {
        match self {
            LoopError::DescriptorWrite { .. } => "IOError",
            LoopError::InvalidParameter { .. } => "InvalidParameter",
            LoopError::InvalidDescriptor { .. } => "InvalidDescriptor",
            LoopError::OracleLaunch { .. }
            | LoopError::OracleExecution { .. }
            | LoopError::OracleTimeout { .. } => "OracleExecutionError",
            LoopError::MeasurementDecode { .. } => "MeasurementDecodeError",
            LoopError::DivideByZero { .. } => "DivideByZero",
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Result type alias for feedback-loop operations.
pub type Result<T> = std::result::Result<T, LoopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_carries_stderr_verbatim() {
        let err = LoopError::OracleExecution {
            status: Some(1),
            stderr: "GPU unavailable\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit status 1"));
        assert!(msg.contains("GPU unavailable"));
        assert_eq!(err.kind(), "OracleExecutionError");
    }

    #[test]
    fn decode_error_echoes_raw_output() {
        let err = LoopError::MeasurementDecode {
            reason: "missing field `latency`".into(),
            raw: "{\"cycles\": 3}".into(),
        };
        assert!(err.to_string().contains("{\"cycles\": 3}"));
        assert_eq!(err.kind(), "MeasurementDecodeError");
    }

    #[test]
    fn signal_termination_is_described() {
        let err = LoopError::OracleExecution {
            status: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
