//! Workload descriptors: synthesis, serialization, and parsing.
//!
//! A descriptor is a fixed-length run of shared-memory loads that all use the
//! same stride. On disk it is one `OPCODE:STRIDE` line per operation:
//!
//! ```text
//! LD.SHARED:32
//! LD.SHARED:32
//! ...
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{LoopError, Result};

/// Instruction kinds a descriptor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Load from shared memory.
    SharedLoad,
}

impl Opcode {
    /// The literal written to the serialized descriptor.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::SharedLoad => "LD.SHARED",
        }
    }

    fn from_mnemonic(text: &str) -> Option<Self> {
        match text {
            "LD.SHARED" => Some(Opcode::SharedLoad),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A single memory-access operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOp {
    pub opcode: Opcode,
    pub stride: u32,
}

/// An ordered sequence of uniform-stride access operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    ops: Vec<AccessOp>,
}

impl WorkloadDescriptor {
    /// Build a descriptor of `count` shared loads, all with `stride`.
    pub fn uniform(stride: u32, count: usize) -> Result<Self> {
        if stride == 0 {
            return Err(LoopError::InvalidParameter {
                name: "stride",
                value: stride.to_string(),
            });
        }
        if count == 0 {
            return Err(LoopError::InvalidParameter {
                name: "instruction count",
                value: count.to_string(),
            });
        }
        let op = AccessOp {
            opcode: Opcode::SharedLoad,
            stride,
        };
        Ok(Self {
            ops: vec![op; count],
        })
    }

    /// Parse the line-oriented serialized form.
    ///
    /// Blank lines, unknown opcodes, non-positive strides and mixed strides
    /// are all rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut ops = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let (mnemonic, stride) =
                line.split_once(':').ok_or_else(|| LoopError::InvalidDescriptor {
                    line: line_no,
                    detail: format!("expected OPCODE:STRIDE, found {line:?}"),
                })?;
            let opcode =
                Opcode::from_mnemonic(mnemonic).ok_or_else(|| LoopError::InvalidDescriptor {
                    line: line_no,
                    detail: format!("unknown opcode {mnemonic:?}"),
                })?;
            let stride = stride
                .parse::<u32>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| LoopError::InvalidDescriptor {
                    line: line_no,
                    detail: format!("stride must be a positive integer, found {stride:?}"),
                })?;
            if let Some(first) = ops.first().map(|op: &AccessOp| op.stride) {
                if first != stride {
                    return Err(LoopError::InvalidDescriptor {
                        line: line_no,
                        detail: format!("stride {stride} differs from descriptor stride {first}"),
                    });
                }
            }
            ops.push(AccessOp { opcode, stride });
        }
        if ops.is_empty() {
            return Err(LoopError::InvalidDescriptor {
                line: 0,
                detail: "descriptor has no operations".into(),
            });
        }
        Ok(Self { ops })
    }

    /// The stride shared by every operation.
    pub fn stride(&self) -> u32 {
        self.ops[0].stride
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Always false: a descriptor holds at least one operation.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[AccessOp] {
        &self.ops
    }

    /// Encode as `OPCODE:STRIDE` lines, each newline-terminated.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.ops.len() * 16);
        for op in &self.ops {
            out.push_str(op.opcode.mnemonic());
            out.push(':');
            out.push_str(&op.stride.to_string());
            out.push('\n');
        }
        out
    }
}

/// A descriptor that has been written to disk for the oracle to read.
#[derive(Debug, Clone)]
pub struct SerializedDescriptor {
    pub path: PathBuf,
    pub descriptor: WorkloadDescriptor,
}

impl SerializedDescriptor {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Synthesize a uniform descriptor and write it to `destination`.
///
/// The destination is overwritten in place. Callers must finish measuring one
/// descriptor before synthesizing the next into the same location.
pub fn synthesize(stride: u32, count: usize, destination: &Path) -> Result<SerializedDescriptor> {
    let descriptor = WorkloadDescriptor::uniform(stride, count)?;
    fs::write(destination, descriptor.serialize()).map_err(|source| {
        LoopError::DescriptorWrite {
            path: destination.to_path_buf(),
            source,
        }
    })?;
    info!(
        path = %destination.display(),
        stride,
        count,
        "descriptor synthesized"
    );
    Ok(SerializedDescriptor {
        path: destination.to_path_buf(),
        descriptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_writes_one_line_per_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp.ptx");

        let written = synthesize(32, 32, &path).unwrap();
        assert_eq!(written.descriptor.len(), 32);
        assert_eq!(written.path(), path.as_path());

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 32);
        assert!(lines.iter().all(|l| *l == "LD.SHARED:32"));
        assert!(text.ends_with('\n'));
        assert!(!text.contains("\n\n"));
    }

    #[test]
    fn synthesize_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ptx");
        let b = dir.path().join("b.ptx");
        for (stride, count) in [(1, 1), (7, 3), (32, 32), (64, 5)] {
            synthesize(stride, count, &a).unwrap();
            synthesize(stride, count, &b).unwrap();
            assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
        }
    }

    #[test]
    fn synthesize_overwrites_previous_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp.ptx");
        synthesize(32, 32, &path).unwrap();
        synthesize(1, 4, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "LD.SHARED:1\n".repeat(4));
    }

    #[test]
    fn synthesize_reports_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("temp.ptx");
        let err = synthesize(1, 32, &path).unwrap_err();
        assert!(matches!(err, LoopError::DescriptorWrite { .. }));
        assert_eq!(err.kind(), "IOError");
        assert!(!path.exists());
    }

    #[test]
    fn zero_stride_or_count_rejected() {
        assert!(matches!(
            WorkloadDescriptor::uniform(0, 32),
            Err(LoopError::InvalidParameter { name: "stride", .. })
        ));
        assert!(matches!(
            WorkloadDescriptor::uniform(1, 0),
            Err(LoopError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn serialized_form_parses_back() {
        let original = WorkloadDescriptor::uniform(32, 32).unwrap();
        let parsed = WorkloadDescriptor::parse(&original.serialize()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.stride(), 32);
        assert!(parsed.ops().iter().all(|op| op.opcode == Opcode::SharedLoad));
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        let cases = [
            ("", 0),
            ("LD.SHARED:1\n\nLD.SHARED:1\n", 2),
            ("LD.SHARED\n", 1),
            ("MMA.SYNC:1\n", 1),
            ("LD.SHARED:0\n", 1),
            ("LD.SHARED:-4\n", 1),
            ("LD.SHARED:1\nLD.SHARED:2\n", 2),
        ];
        for (text, line) in cases {
            match WorkloadDescriptor::parse(text) {
                Err(LoopError::InvalidDescriptor { line: l, .. }) => {
                    assert_eq!(l, line, "wrong line for {text:?}")
                }
                other => panic!("expected InvalidDescriptor for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn opcode_display_matches_mnemonic() {
        assert_eq!(Opcode::SharedLoad.to_string(), "LD.SHARED");
    }
}
