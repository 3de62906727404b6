//! Error types for BVH construction, encoding and traversal.

use thiserror::Error;

use crate::geom::PrimitiveKind;

/// Main error type for molray operations.
///
/// Validation errors are reported at the build/flatten boundary. The
/// consistency variants mean the tree and the primitive arrays disagree,
/// which only a bug in construction or flattening can cause.
#[derive(Error, Debug)]
pub enum Error {
    /// Triangle index buffer does not describe whole triangles
    #[error("Triangle index buffer length {len} is not a multiple of 3")]
    InvalidIndexCount { len: usize },

    /// Triangle references a vertex past the end of the position buffer
    #[error("Triangle {triangle} references vertex {vertex} but only {count} positions exist")]
    VertexOutOfRange {
        triangle: usize,
        vertex: u32,
        count: usize,
    },

    /// Primitive index or count beyond what the packed encodings address
    #[error("Primitive index {index} exceeds the addressable range")]
    IndexOverflow { index: usize },

    /// Array does not fit in a texture of the addressable size
    #[error("{elements} elements need a {width}x{height} layout, exceeding the maximum dimension {max_dim}")]
    LayoutOverflow {
        elements: usize,
        max_dim: usize,
        width: usize,
        height: usize,
    },

    /// Configuration values that can never produce a valid layout
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Primitive type tag outside {0, 1, 2}
    #[error("Unknown primitive type tag {0}")]
    UnknownPrimitiveTag(u32),

    /// Leaf references a primitive the geometry does not have
    #[error("{kind} {index} out of range (count: {count})")]
    PrimitiveOutOfRange {
        kind: PrimitiveKind,
        index: u32,
        count: usize,
    },

    /// Child index or leaf range outside the node/reference arrays
    #[error("Node reference {index} out of range (count: {count})")]
    NodeOutOfRange { index: usize, count: usize },

    /// Tree structure that no build can produce (leaf naming a missing
    /// primitive record, or a traversal revisiting nodes)
    #[error("Malformed tree: {0}")]
    MalformedTree(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a malformed tree error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedTree(msg.into())
    }

    /// Create an invalid settings error.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }

    /// True for errors that indicate a broken tree rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::UnknownPrimitiveTag(_)
                | Self::PrimitiveOutOfRange { .. }
                | Self::NodeOutOfRange { .. }
                | Self::MalformedTree(_)
        )
    }
}

/// Result type alias for molray operations.
pub type Result<T> = std::result::Result<T, Error>;
