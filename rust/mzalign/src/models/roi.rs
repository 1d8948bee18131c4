use crate::utils::TupleRange;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoiPoint {
    pub scan_index: usize,
    pub rt_seconds: f64,
    pub mz: f64,
    pub intensity: f64,
    /// False for scans where the ion was not seen (gaps and the baseline
    /// padding at both ends). Those carry zero intensity.
    pub observed: bool,
}

/// A candidate ion trace: one point per non-empty scan over a contiguous
/// window of scans, all within `mz_range` of the representative m/z.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roi {
    pub id: usize,
    /// Intensity weighted mean of the observed points.
    pub mz: f64,
    /// Tolerance window around `mz` the ROI was built with.
    pub mz_range: TupleRange<f64>,
    pub points: Vec<RoiPoint>,
}

impl Roi {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_observed(&self) -> usize {
        self.points.iter().filter(|p| p.observed).count()
    }

    pub fn observed(&self) -> impl Iterator<Item = &RoiPoint> {
        self.points.iter().filter(|p| p.observed)
    }

    pub fn rt_seconds(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.rt_seconds).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }

    /// Retention time span of the observed points.
    pub fn rt_range(&self) -> Option<TupleRange<f64>> {
        let first = self.observed().next()?.rt_seconds;
        let last = self.observed().last()?.rt_seconds;
        TupleRange::try_new(first, last).ok()
    }

    pub fn apex(&self) -> Option<&RoiPoint> {
        self.observed()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity).then_with(|| b.scan_index.cmp(&a.scan_index)))
    }

    /// Largest run of unobserved points between two observed ones. Empty
    /// scans have no point in a ROI, so they never count.
    pub fn longest_gap(&self) -> usize {
        let mut longest = 0;
        let mut run = 0;
        let mut seen_observed = false;
        for p in self.points.iter() {
            if p.observed {
                if seen_observed {
                    longest = longest.max(run);
                }
                seen_observed = true;
                run = 0;
            } else {
                run += 1;
            }
        }
        longest
    }

    /// Intensity weighted standard deviation of the observed m/z values.
    pub fn mz_std(&self) -> f64 {
        let total: f64 = self.observed().map(|p| p.intensity).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let var = self
            .observed()
            .map(|p| p.intensity * (p.mz - self.mz).powi(2))
            .sum::<f64>()
            / total;
        var.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(scan_index: usize, intensity: f64, observed: bool) -> RoiPoint {
        RoiPoint {
            scan_index,
            rt_seconds: scan_index as f64,
            mz: 200.0,
            intensity,
            observed,
        }
    }

    #[test]
    fn test_gaps_and_apex() {
        let roi = Roi {
            id: 0,
            mz: 200.0,
            mz_range: TupleRange::around(200.0, 0.01),
            points: vec![
                point(3, 0.0, false),
                point(4, 10.0, true),
                point(5, 0.0, false),
                point(6, 0.0, false),
                point(7, 30.0, true),
                point(8, 30.0, true),
                point(9, 0.0, false),
            ],
        };
        assert_eq!(roi.num_observed(), 3);
        assert_eq!(roi.longest_gap(), 2);
        assert_eq!(roi.apex().map(|p| p.scan_index), Some(7));
        let range = roi.rt_range().unwrap();
        assert_eq!(range.as_tuple(), (4.0, 8.0));
        assert_eq!(roi.mz_std(), 0.0);
    }
}
