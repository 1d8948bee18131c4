//! Recovers values for samples where alignment found no feature.
//!
//! The raw scans are revisited around the consensus position of each
//! aligned feature. A lenient intensity floor decides between a filled
//! value and an explicit "below detection limit".

use crate::alignment::DriftCurve;
use crate::models::tolerance::MzTolerance;
use crate::models::{
    AlignedFeature,
    SampleSlot,
    ScanStore,
};
use crate::params::{
    GapFillParams,
    Quantity,
};
use crate::utils::math::trapezoid_area;
use crate::utils::TupleRange;
use rayon::prelude::*;
use tracing::info;

pub struct GapFiller {
    mz_tolerance: MzTolerance,
    rt_half_window: f64,
    min_intensity: f64,
    quantity: Quantity,
}

impl GapFiller {
    pub fn new(params: &GapFillParams, mz_tolerance: MzTolerance, quantity: Quantity) -> Self {
        Self {
            mz_tolerance,
            rt_half_window: params.rt_half_window_seconds,
            min_intensity: params.min_intensity,
            quantity,
        }
    }

    /// Fills every `Missing` slot in place. Other slots are left alone,
    /// so running this twice changes nothing the second time.
    ///
    /// `stores[i]` and `curves[i]` belong to slot `i`.
    pub fn fill(&self, features: &mut [AlignedFeature], stores: &[ScanStore], curves: &[DriftCurve]) {
        let filled: usize = features
            .par_iter_mut()
            .map(|feature| {
                let (mz, rt) = (feature.mz, feature.rt_seconds);
                let mut count = 0;
                for (sample, slot) in feature.slots.iter_mut().enumerate() {
                    if !slot.is_missing() {
                        continue;
                    }
                    let (Some(store), Some(curve)) = (stores.get(sample), curves.get(sample)) else {
                        continue;
                    };
                    *slot = self.fill_slot(store, curve, mz, rt);
                    if matches!(slot, SampleSlot::Filled { .. }) {
                        count += 1;
                    }
                }
                count
            })
            .sum();
        info!("Gap filling recovered {} values", filled);
    }

    /// Value for one sample at a consensus (m/z, reference rt).
    pub fn fill_slot(&self, store: &ScanStore, curve: &DriftCurve, mz: f64, consensus_rt: f64) -> SampleSlot {
        let rt = curve.uncorrect(consensus_rt);
        let mz_range = self.mz_tolerance.range(mz);
        let rt_range = TupleRange::around(rt, self.rt_half_window);
        let chrom = store.extract_chromatogram(mz_range, rt_range);

        let Some((apex_rt, apex)) = chrom.apex() else {
            return SampleSlot::BelowDetectionLimit;
        };
        if apex < self.min_intensity {
            return SampleSlot::BelowDetectionLimit;
        }
        let value = match self.quantity {
            Quantity::Area => trapezoid_area(&chrom.rt_seconds, &chrom.intensities),
            Quantity::Height => apex,
        };
        SampleSlot::Filled {
            value,
            rt_seconds: apex_rt,
        }
    }
}
