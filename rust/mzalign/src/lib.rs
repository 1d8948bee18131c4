#![doc = include_str!("../README.md")]

// Declare modules
pub mod alignment;
pub mod errors;
pub mod feature_table;
pub mod gap_filling;
pub mod grouping;
pub mod io;
pub mod models;
pub mod params;
pub mod peak_picking;
pub mod pipeline;
pub mod roi_extraction;
pub mod targeted;
pub mod utils;

// Re-export main structures
pub use crate::alignment::{
    Aligner,
    Alignment,
    DriftCurve,
};
pub use crate::feature_table::FeatureTable;
pub use crate::gap_filling::GapFiller;
pub use crate::grouping::IsotopeAdductGrouper;
pub use crate::models::{
    AlignedFeature,
    Feature,
    Peak,
    Roi,
    SampleSlot,
    Scan,
    ScanStore,
};
pub use crate::params::PipelineParams;
pub use crate::peak_picking::PeakPicker;
pub use crate::pipeline::{
    BatchOutput,
    BatchSummary,
    Pipeline,
};
pub use crate::roi_extraction::RoiExtractor;
pub use crate::utils::TupleRange;

// Re-export errors
pub use crate::errors::{
    AlignmentInconsistency,
    InputError,
    MzAlignError,
    ParameterError,
};
