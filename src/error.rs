use std::fmt;
use thiserror::Error;

use crate::Dimensionality;

/// crate specific Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Where a requested key was looked up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    /// A coordinate matrix in the data source
    Coordinates,
    /// A categorical column
    Annotation,
    /// A continuous per-point column
    ObsColumn,
    /// A gene in the variable-name index
    Gene,
    /// An expression layer (or the default matrix)
    Layer,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::Coordinates => "coordinates",
            AttributeKind::Annotation => "annotation",
            AttributeKind::ObsColumn => "continuous obs",
            AttributeKind::Gene => "gene",
            AttributeKind::Layer => "layer",
        };
        f.write_str(name)
    }
}

/// crate specific Error enum
#[derive(Error, Debug)]
pub enum Error {
    /// The coordinate matrix has a column count the requested mode can not encode
    #[error("a coordinate matrix with {columns} column(s) can not be encoded in {mode} mode")]
    Shape {
        columns: usize,
        mode: Dimensionality,
    },

    /// An attribute does not hold exactly one entry per point
    #[error("'{key}' has {found} entries, the dataset has {expected} points")]
    LengthMismatch {
        key: String,
        expected: usize,
        found: usize,
    },

    /// An expression matrix whose buffers contradict its shape
    #[error("expression matrix '{layer}' is malformed: {reason}")]
    MalformedMatrix { layer: String, reason: &'static str },

    /// A requested key is absent from the data source
    #[error("{kind} '{key}' not found")]
    MissingAttribute { kind: AttributeKind, key: String },

    /// A continuous key resolves to non-numeric data
    #[error("obs '{key}' is not numeric (found {found} values)")]
    TypeMismatch { key: String, found: &'static str },

    /// A coordinate is NaN or infinite and can not be quantized
    #[error("coordinate at row {row}, axis {axis} is not finite")]
    NonFiniteCoordinate { row: usize, axis: usize },

    /// A gene key produced the same name as an obs key
    #[error("continuous key '{0}' was produced twice")]
    KeyCollision(String),

    /// The buffer handed to the reader is not a LAS point cloud
    #[error("not a point cloud buffer: {0}")]
    NotAPointCloud(&'static str),

    /// [las::Error]
    #[error(transparent)]
    LasError(#[from] las::Error),

    /// [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// [serde_json::Error]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn missing(kind: AttributeKind, key: impl Into<String>) -> Self {
        Error::MissingAttribute {
            kind,
            key: key.into(),
        }
    }

    /// Fails unless `found` entries cover every one of `expected` points
    pub(crate) fn check_len(key: &str, expected: usize, found: usize) -> Result<()> {
        if expected != found {
            return Err(Error::LengthMismatch {
                key: key.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }
}
