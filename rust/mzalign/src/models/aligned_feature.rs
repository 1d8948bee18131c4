use serde::Serialize;

/// Per-sample cell of an aligned feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SampleSlot {
    /// A feature of this sample was clustered here.
    Detected {
        feature_id: usize,
        value: f64,
        mz: f64,
        rt_seconds: f64,
    },
    /// Recovered from the raw scans by gap filling. `rt_seconds` is in the
    /// sample's own time frame.
    Filled { value: f64, rt_seconds: f64 },
    /// Gap filling looked and found nothing above the floor.
    BelowDetectionLimit,
    /// Not attempted (yet).
    Missing,
}

impl SampleSlot {
    pub fn value(&self) -> Option<f64> {
        match self {
            SampleSlot::Detected { value, .. } | SampleSlot::Filled { value, .. } => Some(*value),
            SampleSlot::BelowDetectionLimit => Some(0.0),
            SampleSlot::Missing => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            SampleSlot::Detected { .. } => "detected",
            SampleSlot::Filled { .. } => "filled",
            SampleSlot::BelowDetectionLimit => "below_detection_limit",
            SampleSlot::Missing => "missing",
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, SampleSlot::Detected { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, SampleSlot::Missing)
    }
}

/// The same chemical signal across the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedFeature {
    pub id: usize,
    /// Intensity weighted centroid of the member features.
    pub mz: f64,
    /// Intensity weighted centroid of the drift-corrected retention times
    /// (reference sample's time frame).
    pub rt_seconds: f64,
    /// One slot per sample, in batch order.
    pub slots: Vec<SampleSlot>,
    /// Annotations taken from the most intense member.
    pub charge: Option<u8>,
    pub isotope_count: usize,
    pub adduct: Option<String>,
    pub mean_snr: f64,
    pub mean_symmetry: f64,
}

impl AlignedFeature {
    pub fn num_detected(&self) -> usize {
        self.slots.iter().filter(|s| s.is_detected()).count()
    }

    pub fn num_filled(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SampleSlot::Filled { .. }))
            .count()
    }

    /// (sample index, feature id) of every detected member.
    pub fn members(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots.iter().enumerate().filter_map(|(sample, slot)| match slot {
            SampleSlot::Detected { feature_id, .. } => Some((sample, *feature_id)),
            _ => None,
        })
    }
}
