#![allow(dead_code)]

use mzalign::{
    Scan,
    ScanStore,
};
use rand::rngs::StdRng;
use rand::{
    Rng,
    SeedableRng,
};

/// A Gaussian elution profile at one m/z.
#[derive(Debug, Clone, Copy)]
pub struct Compound {
    pub mz: f64,
    pub rt: f64,
    pub height: f64,
    pub sigma: f64,
}

impl Compound {
    pub fn new(mz: f64, rt: f64, height: f64) -> Self {
        Self {
            mz,
            rt,
            height,
            sigma: 3.0,
        }
    }

    pub fn shifted(self, seconds: f64) -> Self {
        Self {
            rt: self.rt + seconds,
            ..self
        }
    }

    fn intensity_at(&self, rt: f64) -> f64 {
        self.height * (-(rt - self.rt).powi(2) / (2.0 * self.sigma * self.sigma)).exp()
    }
}

pub const NUM_SCANS: usize = 600;
pub const NOISE_MAX: f64 = 200.0;

/// One scan per second. Every scan carries a handful of noise points
/// below `NOISE_MAX` at random m/z, plus the compounds wherever their
/// profile is above 1 count.
pub fn synthetic_store(sample_id: &str, compounds: &[Compound], seed: u64) -> ScanStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let scans = (0..NUM_SCANS)
        .map(|i| {
            let rt = i as f64;
            let mut points: Vec<(f64, f64)> = (0..5)
                .map(|_| (rng.random_range(100.0..1000.0), rng.random_range(0.0..NOISE_MAX)))
                .collect();
            for c in compounds {
                let v = c.intensity_at(rt);
                if v > 1.0 {
                    points.push((c.mz, v));
                }
            }
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let (mz, intensity) = points.into_iter().unzip();
            Scan::try_new(rt, mz, intensity).unwrap()
        })
        .collect();
    ScanStore::try_new(sample_id, scans).unwrap()
}

pub fn noise_only_store(sample_id: &str, seed: u64) -> ScanStore {
    synthetic_store(sample_id, &[], seed)
}
