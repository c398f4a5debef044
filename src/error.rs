// error.rs - Error taxonomy shared by scoring, permutation and aggregation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GadgetsError {
    /// Malformed candidate indices. Fatal to one evaluation only.
    #[error("Invalid candidate SNP set {snps:?}: {reason}")]
    InvalidCandidateSet { snps: Vec<usize>, reason: String },

    /// No family is informative for the requested SNP set.
    #[error("No informative families for SNP set {0:?}")]
    InsufficientData(Vec<usize>),

    #[error("Annotation table has {found} rows but preprocessing used {expected} SNP columns")]
    AnnotationMismatch { expected: usize, found: usize },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed file '{path}': {message}")]
    Format { path: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Null calibration error: {0}")]
    Calibration(String),
}

impl GadgetsError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        GadgetsError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn format(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        GadgetsError::Format {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GadgetsError>;
