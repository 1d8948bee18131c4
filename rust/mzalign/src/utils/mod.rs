pub mod dsu;
pub mod math;
pub mod smoothing;
pub mod streaming_calculators;
pub mod tuple_range;

pub use tuple_range::{
    binary_search_range_by_key,
    TupleRange,
};
