use crate::errors::ParameterError;
use crate::utils::TupleRange;
use serde::{
    Deserialize,
    Serialize,
};

/// m/z tolerance, either in daltons or in parts-per-million.
///
/// Convention: the window is expressed as positive distances below and
/// above the value, so `Absolute((0.01, 0.01))` around 300.0 is
/// `[299.99, 300.01]`.
///
/// ```
/// use mzalign::models::tolerance::MzTolerance;
///
/// let tol = MzTolerance::Ppm((10.0, 10.0));
/// let range = tol.range(500.0);
/// assert!((range.start() - 499.995).abs() < 1e-9);
/// assert!((range.end() - 500.005).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MzTolerance {
    #[serde(rename = "da")]
    Absolute((f64, f64)),
    #[serde(rename = "ppm")]
    Ppm((f64, f64)),
}

impl Default for MzTolerance {
    fn default() -> Self {
        MzTolerance::Absolute((0.01, 0.01))
    }
}

impl MzTolerance {
    pub fn range(&self, mz: f64) -> TupleRange<f64> {
        let (below, above) = self.offsets(mz);
        TupleRange::from_center(mz, below, above)
    }

    /// Mean of the two sides, in daltons at this m/z. Used to normalize
    /// distances.
    pub fn half_width(&self, mz: f64) -> f64 {
        let (below, above) = self.offsets(mz);
        (below + above) / 2.0
    }

    fn offsets(&self, mz: f64) -> (f64, f64) {
        match self {
            MzTolerance::Absolute((low, high)) => (*low, *high),
            MzTolerance::Ppm((low, high)) => (mz * low / 1e6, mz * high / 1e6),
        }
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ParameterError> {
        let (low, high) = match self {
            MzTolerance::Absolute(x) => *x,
            MzTolerance::Ppm(x) => *x,
        };
        check_positive(field, low)?;
        check_positive(field, high)
    }
}

/// Retention time tolerance. Internally everything is in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum RtTolerance {
    #[serde(rename = "seconds")]
    Seconds((f64, f64)),
    #[serde(rename = "minutes")]
    Minutes((f64, f64)),
}

impl RtTolerance {
    pub fn seconds(below: f64, above: f64) -> Self {
        RtTolerance::Seconds((below, above))
    }

    /// (below, above) in seconds.
    pub fn offsets_seconds(&self) -> (f64, f64) {
        match self {
            RtTolerance::Seconds((low, high)) => (*low, *high),
            RtTolerance::Minutes((low, high)) => (low * 60.0, high * 60.0),
        }
    }

    pub fn range(&self, rt_seconds: f64) -> TupleRange<f64> {
        let (below, above) = self.offsets_seconds();
        TupleRange::from_center(rt_seconds, below, above)
    }

    pub fn half_width(&self) -> f64 {
        let (below, above) = self.offsets_seconds();
        (below + above) / 2.0
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ParameterError> {
        let (low, high) = self.offsets_seconds();
        check_positive(field, low)?;
        check_positive(field, high)
    }
}

/// Tolerance in both dimensions of a feature.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Tolerance {
    pub mz: MzTolerance,
    pub rt: RtTolerance,
}

impl Tolerance {
    pub fn contains(&self, center_mz: f64, center_rt: f64, mz: f64, rt: f64) -> bool {
        self.mz.range(center_mz).contains(mz) && self.rt.range(center_rt).contains(rt)
    }

    /// Euclidean distance with each axis scaled by its tolerance, so the
    /// edge of the window sits at about 1.0 on either axis.
    pub fn normalized_distance(&self, center_mz: f64, center_rt: f64, mz: f64, rt: f64) -> f64 {
        let dmz = (mz - center_mz) / self.mz.half_width(center_mz);
        let drt = (rt - center_rt) / self.rt.half_width();
        (dmz * dmz + drt * drt).sqrt()
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ParameterError> {
        self.mz.validate(field)?;
        self.rt.validate(field)
    }
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NonPositive { field, value })
    }
}
