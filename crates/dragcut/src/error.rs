//! Error and warning types for the compiler pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where in the input an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Zero-based index of the drawing entity in document order.
    pub entity: usize,
    /// Byte offset into the input, when the format has one.
    pub offset: Option<usize>,
}

impl SourceLocation {
    pub fn entity(entity: usize) -> Self {
        Self {
            entity,
            offset: None,
        }
    }

    pub fn with_offset(entity: usize, offset: usize) -> Self {
        Self {
            entity,
            offset: Some(offset),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "entity {} (byte {})", self.entity, offset),
            None => write!(f, "entity {}", self.entity),
        }
    }
}

/// Errors raised while reading a drawing.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The input could not be parsed as the declared format.
    #[error("malformed input at {location}: {reason}")]
    MalformedInput {
        location: SourceLocation,
        reason: String,
    },

    /// The input holds an entity outside the supported subset.
    #[error("unsupported geometry `{kind}` at {location}")]
    UnsupportedGeometry {
        kind: String,
        location: SourceLocation,
    },

    /// Physical units of the drawing cannot be determined.
    #[error("cannot resolve drawing units: {reason}")]
    UnitResolution { reason: String },

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors of a compilation run.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Import(#[from] ImportError),

    /// Flattening hit its subdivision bound more often than allowed.
    #[error("flattening exceeded its subdivision bound {count} times (limit {limit})")]
    FlattenDivergence { count: usize, limit: usize },

    /// A drawing vertex or a move leaves the machine's working envelope.
    #[error("{} reaches ({x:.3}, {y:.3}) outside the working envelope", offender(.move_index, .path))]
    OutOfBounds {
        /// Index into the compiled move list; `None` for a drawing vertex.
        move_index: Option<usize>,
        x: f64,
        y: f64,
        /// Source index of the offending path.
        path: Option<usize>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("compilation cancelled")]
    Cancelled,
}

/// Failure to render the SVG preview.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to write preview SVG: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("preview SVG is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn offender(move_index: &Option<usize>, path: &Option<usize>) -> String {
    match (move_index, path) {
        (Some(index), _) => format!("move {index}"),
        (None, Some(path)) => format!("path {path}"),
        (None, None) => "a point".to_string(),
    }
}

/// Recoverable anomalies. Each one is logged and returned alongside the program.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum CompileWarning {
    /// A curve piece was still out of tolerance at the subdivision bound.
    #[error("path {path}: curve still {deviation:.4} mm off its chord at depth {depth}")]
    FlattenDivergence {
        path: usize,
        depth: u32,
        deviation: f64,
    },

    /// A vertex too close to its predecessor to define a tangent was skipped.
    #[error("path {path}: skipped vertex {vertex} with no usable tangent")]
    DegenerateTangent { path: usize, vertex: usize },

    /// An unsupported entity was left out of the job.
    #[error("skipped unsupported `{kind}` at {location}")]
    SkippedElement {
        kind: String,
        location: SourceLocation,
    },
}
