use thiserror::Error;

/// Errors raised by dataset construction, transformation and persistence.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Measurement array has the wrong number of axes.
    #[error("measurements must have {expected} dimensions ({layout}), got {found}")]
    Dimension {
        expected: usize,
        found: usize,
        layout: &'static str,
    },

    /// A descriptor column disagrees with the size of its axis.
    #[error("{table}['{name}'] has {found} entries but the axis has {expected}")]
    DescriptorLength {
        table: &'static str,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("no descriptor '{name}' in {table}")]
    UnknownDescriptor { table: &'static str, name: String },

    /// Capability not provided by this dataset type.
    #[error("{operation} is not implemented for {kind}")]
    NotImplemented {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("type of dataset not recognized: '{0}'")]
    UnknownType(String),

    #[error("file format not understood: '{0}'")]
    UnknownFormat(String),

    #[error("time bin {index} does not match any time sample")]
    EmptyBin { index: usize },

    #[error("{table}['{name}'] holds non-numeric value '{value}'")]
    NonNumericDescriptor {
        table: &'static str,
        name: String,
        value: String,
    },

    #[error("descriptor '{name}' exists in both obs and time descriptors")]
    DescriptorConflict { name: String },

    /// JSON has no encoding for NaN or infinity.
    #[error("{field} holds NaN or infinite values, which {format} cannot store")]
    NonFinite {
        format: &'static str,
        field: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, DatasetError>;
