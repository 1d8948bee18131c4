use serde::Serialize;

/// A chromatographic peak resolved from one ROI.
///
/// Boundaries and apex are scan indices into the sample's scan store,
/// with matching retention times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    pub roi_id: usize,
    /// Intensity weighted m/z of the observed points inside the bounds.
    pub mz: f64,
    pub mz_std: f64,
    pub apex_scan: usize,
    pub left_scan: usize,
    pub right_scan: usize,
    pub apex_rt: f64,
    pub left_rt: f64,
    pub right_rt: f64,
    pub apex_intensity: f64,
    /// Mean of the three most intense points inside the bounds.
    pub top3_height: f64,
    pub area: f64,
    pub snr: f64,
    /// Ratio of the shorter to the longer half-width at half maximum.
    pub symmetry: f64,
    pub width_scans: usize,
    /// Raw (scan index, intensity) between the bounds.
    #[serde(skip)]
    pub profile: Vec<(usize, f64)>,
}

impl Peak {
    pub fn width_seconds(&self) -> f64 {
        self.right_rt - self.left_rt
    }

    /// Intensities of the two profiles over the scans they share.
    pub fn shared_profile(&self, other: &Peak) -> (Vec<f64>, Vec<f64>) {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut j = 0;
        for (scan, intensity) in self.profile.iter() {
            while j < other.profile.len() && other.profile[j].0 < *scan {
                j += 1;
            }
            if j < other.profile.len() && other.profile[j].0 == *scan {
                a.push(*intensity);
                b.push(other.profile[j].1);
            }
        }
        (a, b)
    }
}
