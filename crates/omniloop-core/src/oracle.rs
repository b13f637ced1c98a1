//! Measurement oracle: trait, subprocess backend, and scripted test double.
//!
//! The oracle receives the path of a serialized descriptor as its single
//! argument and prints one JSON record with a `latency` field on stdout.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, error};

use crate::descriptor::WorkloadDescriptor;
use crate::error::{LoopError, Result};

/// Interval between exit checks while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single latency measurement reported by the oracle.
///
/// Fields other than `latency` are ignored when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Measurement {
    /// Simulated latency in cycles.
    pub latency: u64,
}

/// Decode the oracle's captured stdout into a [`Measurement`].
///
/// The output must be a single JSON object; arrays and scalars are rejected
/// even when they would line up positionally with the record's fields.
pub fn decode_measurement(raw: &str) -> Result<Measurement> {
    let decode_error = |reason: String| LoopError::MeasurementDecode {
        reason,
        raw: raw.to_string(),
    };
    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).map_err(|e| decode_error(e.to_string()))?;
    if !value.is_object() {
        return Err(decode_error(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| decode_error(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A source of latency measurements for serialized descriptors.
pub trait Oracle {
    /// Measure the descriptor stored at `descriptor`.
    fn measure(&mut self, descriptor: &Path) -> Result<Measurement>;
}

/// How to launch the external oracle process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleCommand {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the descriptor path.
    pub args: Vec<String>,
    /// Working directory for the oracle process.
    pub working_dir: Option<PathBuf>,
    /// Kill the oracle if it runs longer than this. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl OracleCommand {
    /// Run `program` with the descriptor path as its only argument.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// The reference oracle: `cargo run --quiet -- <descriptor>` inside `dir`.
    pub fn cargo_run(dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "cargo".into(),
            args: vec!["run".into(), "--quiet".into(), "--".into()],
            working_dir: Some(dir.into()),
            timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering of the full command line for a descriptor.
    pub fn display_for(&self, descriptor: &Path) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.push(descriptor.display().to_string());
        parts.join(" ")
    }
}

/// An oracle backed by an external process, re-invoked on every measurement.
#[derive(Debug, Clone)]
pub struct SubprocessOracle {
    command: OracleCommand,
}

impl SubprocessOracle {
    pub fn new(command: OracleCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &OracleCommand {
        &self.command
    }

    fn launch_error(&self, source: std::io::Error) -> LoopError {
        LoopError::OracleLaunch {
            program: self.command.program.clone(),
            source,
        }
    }

    fn run(&self, descriptor: &Path) -> Result<Output> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg(descriptor)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.command.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %self.command.display_for(descriptor), "invoking oracle");
        match self.command.timeout {
            None => cmd.output().map_err(|e| self.launch_error(e)),
            Some(timeout) => {
                let child = cmd.spawn().map_err(|e| self.launch_error(e))?;
                self.wait_with_timeout(child, timeout)
            }
        }
    }

    fn wait_with_timeout(&self, mut child: Child, timeout: Duration) -> Result<Output> {
        // Drain both pipes concurrently so a chatty oracle cannot fill a pipe and stall.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(|e| self.launch_error(e))? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                error!(?timeout, "oracle timed out");
                return Err(LoopError::OracleTimeout { timeout });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(Output {
            status,
            stdout: self.collect(stdout)?,
            stderr: self.collect(stderr)?,
        })
    }

    fn collect(&self, reader: thread::JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
        reader
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("oracle pipe reader panicked")))
            .map_err(|e| self.launch_error(e))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

impl Oracle for SubprocessOracle {
    fn measure(&mut self, descriptor: &Path) -> Result<Measurement> {
        let output = self.run(descriptor)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(status = ?output.status.code(), "oracle exited with failure");
            return Err(LoopError::OracleExecution {
                status: output.status.code(),
                stderr,
            });
        }

        decode_measurement(&String::from_utf8_lossy(&output.stdout))
    }
}

/// One canned reply from a [`ScriptedOracle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Report this latency.
    Latency(u64),
    /// Pretend the oracle printed this text; decoded like real output.
    Raw(String),
    /// Pretend the oracle exited with `status` and wrote `stderr`.
    Fail { status: i32, stderr: String },
}

/// In-process oracle that replays scripted responses in order.
///
/// Every descriptor it is asked to measure is read back from disk and
/// recorded, so tests can check what the controller synthesized.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: VecDeque<ScriptedResponse>,
    observed: Vec<WorkloadDescriptor>,
}

impl ScriptedOracle {
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            observed: Vec::new(),
        }
    }

    /// Convenience constructor for a sequence of successful latencies.
    pub fn latencies(latencies: impl IntoIterator<Item = u64>) -> Self {
        Self::new(latencies.into_iter().map(ScriptedResponse::Latency))
    }

    /// Descriptors measured so far, in call order.
    pub fn observed(&self) -> &[WorkloadDescriptor] {
        &self.observed
    }

    /// Number of `measure` calls made so far.
    pub fn calls(&self) -> usize {
        self.observed.len()
    }
}

impl Oracle for ScriptedOracle {
    fn measure(&mut self, descriptor: &Path) -> Result<Measurement> {
        let text = fs::read_to_string(descriptor).map_err(|source| LoopError::OracleLaunch {
            program: "scripted-oracle".into(),
            source,
        })?;
        self.observed.push(WorkloadDescriptor::parse(&text)?);

        match self.responses.pop_front() {
            Some(ScriptedResponse::Latency(latency)) => Ok(Measurement { latency }),
            Some(ScriptedResponse::Raw(raw)) => decode_measurement(&raw),
            Some(ScriptedResponse::Fail { status, stderr }) => Err(LoopError::OracleExecution {
                status: Some(status),
                stderr,
            }),
            None => Err(LoopError::OracleExecution {
                status: Some(1),
                stderr: "scripted oracle has no responses left".into(),
            }),
        }
    }
}
