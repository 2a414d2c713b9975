//! Error type shared by the VM, the loader, and every plugin.

use serde_json::Value;
use thiserror::Error;

/// One unwound activation, recorded while an error propagates out of `exec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub frame_name: String,
    pub pc: isize,
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("unknown op: {0}")]
    UnknownOp(String),
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("no {role} registered for scheme '{scheme}' and media type {}", media_type.as_deref().unwrap_or("(none)"))]
    MissingPlugin {
        role: &'static str,
        scheme: String,
        media_type: Option<String>,
    },
    #[error("invalid procedure: {0}")]
    InvalidProcedure(String),
    #[error("invalid parameters for op '{op}': {message}")]
    InvalidParams { op: String, message: String },
    #[error("invalid uri '{uri}': {message}")]
    InvalidUri { uri: String, message: String },
    #[error("stack overflow: call depth exceeded {0}")]
    StackOverflow(usize),
    #[error("cannot pop {needed} value(s) from a stack of depth {available}")]
    StackUnderflow { needed: usize, available: usize },
    #[error("unterminated {0} statement")]
    Unterminated(&'static str),
    #[error("unbound else")]
    UnboundElse,
    #[error("repeat without begin")]
    RepeatWithoutBegin,
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("{scope} variable has not been set: {key}")]
    MissingVariable { scope: &'static str, key: String },
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("{media_type} codec error: {message}")]
    Codec {
        media_type: &'static str,
        message: String,
    },
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{uri}: {message}")]
    Provider { uri: String, message: String },
    #[error("invalid test filter: {0}")]
    InvalidFilter(#[from] regex::Error),
    #[error("include cycle through {0}")]
    IncludeCycle(String),
    #[error("check {check} of test '{test}' failed: expected {expected}, got {actual}")]
    CheckFailed {
        test: String,
        check: usize,
        expected: Value,
        actual: Value,
    },
    #[error("{source}\nStack trace (most recent call last):{}", format_frames(frames))]
    WithStackTrace {
        source: Box<VmError>,
        frames: Vec<StackFrame>,
    },
}

impl VmError {
    /// Record that the error unwound through `frame`. Frames accumulate
    /// innermost first, so the first call wraps and later calls append.
    pub fn in_frame(self, frame: StackFrame) -> Self {
        match self {
            VmError::WithStackTrace { source, mut frames } => {
                frames.push(frame);
                VmError::WithStackTrace { source, frames }
            }
            other => VmError::WithStackTrace {
                source: Box::new(other),
                frames: vec![frame],
            },
        }
    }

    /// The error underneath any stack-trace wrapper.
    pub fn root(&self) -> &VmError {
        match self {
            VmError::WithStackTrace { source, .. } => source.root(),
            other => other,
        }
    }

    /// Frames recorded while unwinding, innermost first.
    pub fn frames(&self) -> &[StackFrame] {
        match self {
            VmError::WithStackTrace { frames, .. } => frames,
            _ => &[],
        }
    }

    /// Check if the error message contains a specific string (works through the WithStackTrace wrapper).
    pub fn message_contains(&self, needle: &str) -> bool {
        self.root().to_string().contains(needle)
    }

    pub(crate) fn params(op: &str, message: impl Into<String>) -> Self {
        VmError::InvalidParams {
            op: op.to_string(),
            message: message.into(),
        }
    }

    /// An I/O failure in a getter, putter or deleter.
    pub fn provider(uri: &str, message: impl std::fmt::Display) -> Self {
        VmError::Provider {
            uri: uri.to_string(),
            message: message.to_string(),
        }
    }
}

fn format_frames(frames: &[StackFrame]) -> String {
    let mut trace = String::new();
    for (i, frame) in frames.iter().rev().enumerate() {
        trace.push_str(&format!(
            "\n  #{}: {} (pc {})",
            i, frame.frame_name, frame.pc
        ));
    }
    trace
}

pub type Result<T, E = VmError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_frame_wraps_once_and_appends() {
        let err = VmError::UnknownOp("nope".into())
            .in_frame(StackFrame {
                frame_name: "sq".into(),
                pc: 1,
            })
            .in_frame(StackFrame {
                frame_name: "root".into(),
                pc: 4,
            });
        assert!(matches!(err.root(), VmError::UnknownOp(name) if name == "nope"));
        assert_eq!(err.frames().len(), 2);
        assert_eq!(err.frames()[0].frame_name, "sq");
        let rendered = err.to_string();
        assert!(rendered.starts_with("unknown op: nope"));
        assert!(rendered.contains("#0: root (pc 4)"));
        assert!(rendered.contains("#1: sq (pc 1)"));
    }

    #[test]
    fn message_contains_sees_through_wrapper() {
        let err = VmError::Unterminated("begin").in_frame(StackFrame {
            frame_name: "root".into(),
            pc: 0,
        });
        assert!(err.message_contains("unterminated begin"));
        assert!(!err.message_contains("unterminated if"));
    }

    #[test]
    fn missing_plugin_names_scheme_and_media_type() {
        let err = VmError::MissingPlugin {
            role: "getter",
            scheme: "s3".into(),
            media_type: None,
        };
        assert_eq!(
            err.to_string(),
            "no getter registered for scheme 's3' and media type (none)"
        );
    }
}
