pub mod aligned_feature;
pub mod feature;
pub mod mass_offsets;
pub mod peak;
pub mod roi;
pub mod scan_store;
pub mod tolerance;

pub use aligned_feature::{
    AlignedFeature,
    SampleSlot,
};
pub use feature::{
    AdductLink,
    Feature,
};
pub use peak::Peak;
pub use roi::{
    Roi,
    RoiPoint,
};
pub use scan_store::{
    Chromatogram,
    Scan,
    ScanStore,
};
pub use tolerance::{
    MzTolerance,
    RtTolerance,
    Tolerance,
};
