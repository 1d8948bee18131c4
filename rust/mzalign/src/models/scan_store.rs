use crate::errors::InputError;
use crate::utils::{
    binary_search_range_by_key,
    TupleRange,
};

/// A single MS1 spectrum. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    rt_seconds: f64,
    mz: Vec<f64>,
    intensity: Vec<f64>,
}

impl Scan {
    /// Builds a scan, checking that both arrays have the same length,
    /// all values are finite, intensities are non-negative and m/z is
    /// sorted ascending.
    pub fn try_new(rt_seconds: f64, mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self, InputError> {
        if !rt_seconds.is_finite() {
            return Err(InputError::InvalidValue {
                context: "scan retention time",
                value: rt_seconds,
            });
        }
        if mz.len() != intensity.len() {
            return Err(InputError::MismatchedArrays {
                rt: rt_seconds,
                mz_len: mz.len(),
                intensity_len: intensity.len(),
            });
        }
        if let Some(bad) = mz.iter().find(|x| !x.is_finite() || **x < 0.0) {
            return Err(InputError::InvalidValue {
                context: "scan m/z",
                value: *bad,
            });
        }
        if let Some(bad) = intensity.iter().find(|x| !x.is_finite() || **x < 0.0) {
            return Err(InputError::InvalidValue {
                context: "scan intensity",
                value: *bad,
            });
        }
        if let Some(pos) = mz.windows(2).position(|w| w[0] > w[1]) {
            return Err(InputError::UnsortedMz {
                rt: rt_seconds,
                index: pos + 1,
            });
        }
        Ok(Self {
            rt_seconds,
            mz,
            intensity,
        })
    }

    pub fn rt_seconds(&self) -> f64 {
        self.rt_seconds
    }

    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    pub fn mz_index_range(&self, mz_range: TupleRange<f64>) -> std::ops::Range<usize> {
        binary_search_range_by_key(&self.mz, mz_range, |x| *x)
    }

    /// Index of the point closest to `mz` inside `mz_range`, if any.
    /// Equidistant points resolve to the more intense one.
    pub fn closest_peak(&self, mz: f64, mz_range: TupleRange<f64>) -> Option<usize> {
        self.mz_index_range(mz_range).min_by(|&a, &b| {
            let da = (self.mz[a] - mz).abs();
            let db = (self.mz[b] - mz).abs();
            da.total_cmp(&db)
                .then_with(|| self.intensity[b].total_cmp(&self.intensity[a]))
        })
    }

    /// Largest intensity inside the window, 0 when nothing matches.
    pub fn max_intensity_in(&self, mz_range: TupleRange<f64>) -> f64 {
        let range = self.mz_index_range(mz_range);
        self.intensity[range].iter().copied().fold(0.0, f64::max)
    }

    pub fn total_intensity(&self) -> f64 {
        self.intensity.iter().sum()
    }

    fn retain_intensity(&self, min_intensity: f64) -> Self {
        let (mz, intensity) = self
            .mz
            .iter()
            .zip(self.intensity.iter())
            .filter(|(_, i)| **i >= min_intensity)
            .map(|(m, i)| (*m, *i))
            .unzip();
        Self {
            rt_seconds: self.rt_seconds,
            mz,
            intensity,
        }
    }
}

/// A matched point from a range query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRef {
    pub scan_index: usize,
    pub rt_seconds: f64,
    pub mz: f64,
    pub intensity: f64,
}

/// Intensity over retention time, one entry per scan in the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chromatogram {
    pub scan_indices: Vec<usize>,
    pub rt_seconds: Vec<f64>,
    pub intensities: Vec<f64>,
}

impl Chromatogram {
    pub fn len(&self) -> usize {
        self.rt_seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rt_seconds.is_empty()
    }

    pub fn max_intensity(&self) -> f64 {
        self.intensities.iter().copied().fold(0.0, f64::max)
    }

    /// (rt, intensity) of the most intense scan.
    pub fn apex(&self) -> Option<(f64, f64)> {
        self.intensities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(i, v)| (self.rt_seconds[i], *v))
    }
}

/// All scans of one sample, ordered by retention time.
#[derive(Debug, Clone)]
pub struct ScanStore {
    sample_id: String,
    scans: Vec<Scan>,
}

impl ScanStore {
    /// Retention times must be strictly increasing. An empty store is
    /// valid here; whether it is usable is up to the caller.
    pub fn try_new(sample_id: impl Into<String>, scans: Vec<Scan>) -> Result<Self, InputError> {
        let sample_id = sample_id.into();
        for (i, w) in scans.windows(2).enumerate() {
            if w[1].rt_seconds <= w[0].rt_seconds {
                return Err(InputError::UnsortedScans {
                    sample_id,
                    index: i + 1,
                    rt: w[1].rt_seconds,
                    previous: w[0].rt_seconds,
                });
            }
        }
        Ok(Self { sample_id, scans })
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn num_points(&self) -> usize {
        self.scans.iter().map(|s| s.len()).sum()
    }

    pub fn rt_seconds(&self, scan_index: usize) -> Option<f64> {
        self.scans.get(scan_index).map(|s| s.rt_seconds)
    }

    /// First and last retention time.
    pub fn rt_span(&self) -> Option<TupleRange<f64>> {
        let first = self.scans.first()?.rt_seconds;
        let last = self.scans.last()?.rt_seconds;
        TupleRange::try_new(first, last).ok()
    }

    pub fn scan_index_range(&self, rt_range: TupleRange<f64>) -> std::ops::Range<usize> {
        binary_search_range_by_key(&self.scans, rt_range, |s| s.rt_seconds)
    }

    /// Every point inside both windows, in (scan, m/z) order.
    pub fn query(
        &self,
        mz_range: TupleRange<f64>,
        rt_range: TupleRange<f64>,
    ) -> impl Iterator<Item = PointRef> + '_ {
        self.scan_index_range(rt_range).flat_map(move |scan_index| {
            let scan = &self.scans[scan_index];
            scan.mz_index_range(mz_range).map(move |i| PointRef {
                scan_index,
                rt_seconds: scan.rt_seconds,
                mz: scan.mz[i],
                intensity: scan.intensity[i],
            })
        })
    }

    /// Extracted ion chromatogram: per scan in the rt window, the most
    /// intense point in the m/z window (0 when none).
    pub fn extract_chromatogram(
        &self,
        mz_range: TupleRange<f64>,
        rt_range: TupleRange<f64>,
    ) -> Chromatogram {
        let range = self.scan_index_range(rt_range);
        let mut out = Chromatogram {
            scan_indices: Vec::with_capacity(range.len()),
            rt_seconds: Vec::with_capacity(range.len()),
            intensities: Vec::with_capacity(range.len()),
        };
        for scan_index in range {
            let scan = &self.scans[scan_index];
            out.scan_indices.push(scan_index);
            out.rt_seconds.push(scan.rt_seconds);
            out.intensities.push(scan.max_intensity_in(mz_range));
        }
        out
    }

    pub fn base_peak_chromatogram(&self) -> Chromatogram {
        self.whole_run_chromatogram(|s| s.intensity.iter().copied().fold(0.0, f64::max))
    }

    pub fn total_ion_chromatogram(&self) -> Chromatogram {
        self.whole_run_chromatogram(|s| s.total_intensity())
    }

    fn whole_run_chromatogram(&self, f: impl Fn(&Scan) -> f64) -> Chromatogram {
        Chromatogram {
            scan_indices: (0..self.scans.len()).collect(),
            rt_seconds: self.scans.iter().map(|s| s.rt_seconds).collect(),
            intensities: self.scans.iter().map(f).collect(),
        }
    }

    /// Copy of the store without the points below `min_intensity`.
    pub fn filter_intensity(&self, min_intensity: f64) -> Self {
        Self {
            sample_id: self.sample_id.clone(),
            scans: self
                .scans
                .iter()
                .map(|s| s.retain_intensity(min_intensity))
                .collect(),
        }
    }

    /// Drops the scans outside `rt_range`.
    pub fn restrict_rt(self, rt_range: TupleRange<f64>) -> Self {
        let range = self.scan_index_range(rt_range);
        let Self { sample_id, scans } = self;
        let scans = scans.into_iter().skip(range.start).take(range.len()).collect();
        Self { sample_id, scans }
    }
}
