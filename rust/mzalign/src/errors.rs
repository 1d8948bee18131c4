use std::path::PathBuf;
use thiserror::Error;

/// Problems with the scans handed to the engine for one sample.
///
/// These are isolated to the sample that produced them, the rest of
/// the batch keeps going.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Sample '{sample_id}' has no scans")]
    EmptyScanStore { sample_id: String },

    #[error(
        "Sample '{sample_id}': scan {index} has retention time {rt} which is not after the previous scan ({previous})"
    )]
    UnsortedScans {
        sample_id: String,
        index: usize,
        rt: f64,
        previous: f64,
    },

    #[error("Scan at rt={rt}: expected the same number of mz and intensity values, got {mz_len} and {intensity_len}")]
    MismatchedArrays {
        rt: f64,
        mz_len: usize,
        intensity_len: usize,
    },

    #[error("Scan at rt={rt}: m/z values are not sorted ascending at position {index}")]
    UnsortedMz { rt: f64, index: usize },

    #[error("Non-finite or negative value in {context}: {value}")]
    InvalidValue { context: &'static str, value: f64 },

    #[error("Failed to read scans from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse scans from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Invalid configuration. Raised before any processing starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{field}' must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("Parameter '{field}' is out of range, got {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error("Sample id '{0}' appears more than once in the batch")]
    DuplicateSampleId(String),

    #[error("Unable to build the worker pool: {0}")]
    ThreadPool(String),
}

/// Broken alignment invariants. These indicate a logic defect and are
/// never patched over.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentInconsistency {
    #[error("Aligned feature {cluster} holds more than one feature from sample {sample}")]
    DuplicateSample { cluster: usize, sample: usize },

    #[error("Feature {feature} of sample {sample} was assigned to more than one aligned feature")]
    FeatureClaimedTwice { sample: usize, feature: usize },

    #[error("Feature {feature} of sample {sample} was not assigned to any aligned feature")]
    FeatureUnassigned { sample: usize, feature: usize },

    #[error("Aligned feature {cluster} has {got} sample slots, expected {expected}")]
    SlotCountMismatch {
        cluster: usize,
        got: usize,
        expected: usize,
    },
}

#[derive(Error, Debug)]
pub enum MzAlignError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Alignment(#[from] AlignmentInconsistency),

    #[error("No sample produced any feature ({failed} of {total} samples failed)")]
    NoFeatures { failed: usize, total: usize },
}
