//! End to end batch processing.
//!
//! Samples fan out on a rayon pool, each running extraction, peak picking
//! and grouping against its own scans. Their features are joined by the
//! aligner and the gaps are filled from the raw scans again.

use crate::alignment::{
    Aligner,
    Alignment,
    DriftCurve,
};
use crate::errors::{
    InputError,
    MzAlignError,
    ParameterError,
};
use crate::feature_table::FeatureTable;
use crate::gap_filling::GapFiller;
use crate::grouping::IsotopeAdductGrouper;
use crate::models::{
    Feature,
    ScanStore,
};
use crate::params::PipelineParams;
use crate::peak_picking::PeakPicker;
use crate::roi_extraction::RoiExtractor;
use crate::utils::TupleRange;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{
    info,
    warn,
};

/// Everything one sample produced before alignment.
#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub sample_id: String,
    pub num_scans: usize,
    pub num_rois: usize,
    pub num_peaks: usize,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSummary {
    pub sample_id: String,
    pub status: SampleStatus,
    pub num_scans: usize,
    pub num_rois: usize,
    pub num_peaks: usize,
    pub num_features: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub samples: Vec<SampleSummary>,
    pub reference_sample: Option<String>,
    pub num_aligned_features: usize,
    pub num_filled: usize,
}

impl BatchSummary {
    pub fn num_failed(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| s.status == SampleStatus::Failed)
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    pub table: FeatureTable,
    pub summary: BatchSummary,
    /// Per-sample features of the samples that made it into the table,
    /// in column order.
    #[serde(skip)]
    pub sample_features: Vec<Vec<Feature>>,
    /// Column index of the drift reference.
    pub reference_sample: Option<usize>,
    /// Per-column retention time correction onto the reference.
    pub drift_curves: Vec<DriftCurve>,
}

pub struct Pipeline {
    params: PipelineParams,
    extractor: RoiExtractor,
    picker: PeakPicker,
    grouper: IsotopeAdductGrouper,
    aligner: Aligner,
}

impl Pipeline {
    pub fn new(params: PipelineParams) -> Result<Self, ParameterError> {
        params.validate()?;
        Ok(Self {
            extractor: RoiExtractor::new(params.roi.clone()),
            picker: PeakPicker::new(params.peaks.clone()),
            grouper: IsotopeAdductGrouper::new(params.grouping.clone()),
            aligner: Aligner::new(params.alignment.clone()),
            params,
        })
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Extraction, peak picking and grouping for one sample.
    #[tracing::instrument(level = "debug", skip_all, fields(sample_id = store.sample_id()))]
    pub fn process_sample(&self, sample_index: usize, store: &ScanStore) -> Result<SampleResult, InputError> {
        if store.is_empty() {
            return Err(InputError::EmptyScanStore {
                sample_id: store.sample_id().to_string(),
            });
        }

        let rois = match self.params.roi.rt_range {
            Some((start, end)) => {
                let range = TupleRange::try_new(start, end).map_err(|_| InputError::InvalidValue {
                    context: "roi.rt_range",
                    value: start,
                })?;
                self.extractor
                    .extract_within(store, store.scan_index_range(range))
            }
            None => self.extractor.extract(store),
        };
        let peaks: Vec<_> = rois.iter().flat_map(|roi| self.picker.pick(roi)).collect();
        let num_peaks = peaks.len();
        let features = self.grouper.group(sample_index, peaks);

        info!(
            "Sample '{}': {} scans, {} ROIs, {} peaks, {} features",
            store.sample_id(),
            store.len(),
            rois.len(),
            num_peaks,
            features.len()
        );
        Ok(SampleResult {
            sample_id: store.sample_id().to_string(),
            num_scans: store.len(),
            num_rois: rois.len(),
            num_peaks,
            features,
        })
    }

    /// Processes the whole batch.
    ///
    /// Samples that fail are reported in the summary and left out of the
    /// table. The batch fails only when no sample produced a feature.
    pub fn run(&self, stores: Vec<ScanStore>) -> Result<BatchOutput, MzAlignError> {
        let mut seen = HashSet::new();
        for store in stores.iter() {
            if !seen.insert(store.sample_id()) {
                return Err(ParameterError::DuplicateSampleId(store.sample_id().to_string()).into());
            }
        }

        match self.params.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ParameterError::ThreadPool(e.to_string()))?;
                pool.install(|| self.run_inner(stores))
            }
            None => self.run_inner(stores),
        }
    }

    fn run_inner(&self, stores: Vec<ScanStore>) -> Result<BatchOutput, MzAlignError> {
        let start = Instant::now();
        let total = stores.len();
        let results: Vec<Result<SampleResult, InputError>> = stores
            .par_iter()
            .enumerate()
            .map(|(i, store)| self.process_sample(i, store))
            .collect();
        info!("Processed {} samples in {:?}", total, start.elapsed());

        let mut summaries = Vec::with_capacity(total);
        let mut kept_stores = Vec::new();
        let mut sample_features = Vec::new();
        for (store, result) in stores.into_iter().zip(results) {
            match result {
                Ok(res) => {
                    summaries.push(SampleSummary {
                        sample_id: res.sample_id,
                        status: SampleStatus::Ok,
                        num_scans: res.num_scans,
                        num_rois: res.num_rois,
                        num_peaks: res.num_peaks,
                        num_features: res.features.len(),
                        error: None,
                    });
                    let column = kept_stores.len();
                    let features: Vec<Feature> = res
                        .features
                        .into_iter()
                        .map(|mut f| {
                            f.sample_index = column;
                            f
                        })
                        .collect();
                    sample_features.push(features);
                    kept_stores.push(store);
                }
                Err(e) => {
                    warn!("Sample '{}' failed: {}", store.sample_id(), e);
                    summaries.push(SampleSummary {
                        sample_id: store.sample_id().to_string(),
                        status: SampleStatus::Failed,
                        num_scans: store.len(),
                        num_rois: 0,
                        num_peaks: 0,
                        num_features: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let failed = total - kept_stores.len();
        if sample_features.iter().all(|f| f.is_empty()) {
            return Err(MzAlignError::NoFeatures { failed, total });
        }

        let Alignment {
            mut features,
            drift_curves,
            reference_sample,
        } = self.aligner.align(&sample_features)?;

        if self.params.gap_filling.enabled {
            let filler = GapFiller::new(
                &self.params.gap_filling,
                self.params.gap_fill_mz_tolerance(),
                self.params.alignment.quantity,
            );
            filler.fill(&mut features, &kept_stores, &drift_curves);
        }

        let sample_ids: Vec<String> = kept_stores.iter().map(|s| s.sample_id().to_string()).collect();
        let summary = BatchSummary {
            reference_sample: reference_sample.map(|i| sample_ids[i].clone()),
            num_aligned_features: features.len(),
            num_filled: features.iter().map(|f| f.num_filled()).sum(),
            samples: summaries,
        };
        info!(
            "Batch done: {} aligned features, {} filled values, {} of {} samples failed",
            summary.num_aligned_features, summary.num_filled, failed, total
        );

        Ok(BatchOutput {
            table: FeatureTable::new(sample_ids, features),
            summary,
            sample_features,
            reference_sample,
            drift_curves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scan;

    fn store(id: &str, peak_mz: Option<f64>) -> ScanStore {
        let scans = (0..40)
            .map(|i| {
                let rt = i as f64;
                let mut mz = vec![150.0];
                let mut intensity = vec![20.0];
                if let Some(m) = peak_mz {
                    mz.push(m);
                    intensity.push(1e5 * (-(rt - 20.0).powi(2) / 18.0).exp());
                }
                Scan::try_new(rt, mz, intensity).unwrap()
            })
            .collect();
        ScanStore::try_new(id, scans).unwrap()
    }

    #[test]
    fn test_invalid_params_are_rejected_up_front() {
        let mut params = PipelineParams::default();
        params.peaks.min_snr = -1.0;
        assert!(Pipeline::new(params).is_err());
    }

    #[test]
    fn test_duplicate_sample_ids() {
        let pipeline = Pipeline::new(PipelineParams::default()).unwrap();
        let err = pipeline
            .run(vec![store("a", Some(300.0)), store("a", Some(300.0))])
            .unwrap_err();
        assert!(matches!(
            err,
            MzAlignError::Parameter(ParameterError::DuplicateSampleId(_))
        ));
    }

    #[test]
    fn test_empty_sample_is_isolated() {
        let pipeline = Pipeline::new(PipelineParams::default()).unwrap();
        let empty = ScanStore::try_new("empty", vec![]).unwrap();
        let out = pipeline.run(vec![store("a", Some(300.0)), empty]).unwrap();
        assert_eq!(out.table.sample_ids, vec!["a".to_string()]);
        assert_eq!(out.summary.num_failed(), 1);
        assert_eq!(out.summary.samples[1].status, SampleStatus::Failed);
        assert_eq!(out.table.len(), 1);
    }

    #[test]
    fn test_noise_only_batch_fails() {
        let pipeline = Pipeline::new(PipelineParams::default()).unwrap();
        let err = pipeline.run(vec![store("a", None), store("b", None)]).unwrap_err();
        assert!(matches!(err, MzAlignError::NoFeatures { failed: 0, total: 2 }));
    }

    #[test]
    fn test_rt_range_keeps_sample_scan_indices() {
        let mut params = PipelineParams::default();
        params.roi.rt_range = Some((10.0, 35.0));
        let pipeline = Pipeline::new(params).unwrap();
        let sample = store("a", Some(300.0));
        let result = pipeline.process_sample(0, &sample).unwrap();
        assert_eq!(result.features.len(), 1);
        let peak = &result.features[0].peak;
        assert_eq!(peak.apex_scan, 20);
        assert_eq!(sample.rt_seconds(peak.apex_scan), Some(peak.apex_rt));
        assert_eq!(sample.rt_seconds(peak.left_scan), Some(peak.left_rt));
        assert_eq!(sample.rt_seconds(peak.right_scan), Some(peak.right_rt));
        assert!(peak.left_rt >= 10.0 && peak.right_rt <= 35.0);
    }

    #[test]
    fn test_explicit_thread_count() {
        let params = PipelineParams {
            threads: Some(2),
            ..Default::default()
        };
        let pipeline = Pipeline::new(params).unwrap();
        let out = pipeline
            .run(vec![store("a", Some(300.0)), store("b", Some(300.002))])
            .unwrap();
        assert_eq!(out.table.len(), 1);
        assert_eq!(out.table.features[0].num_detected(), 2);
    }
}
