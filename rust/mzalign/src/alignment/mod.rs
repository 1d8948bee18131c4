//! Cross-sample alignment.
//!
//! Two stages: every sample's retention times are first mapped onto a
//! reference sample through a drift curve, then the representative
//! features of all samples are clustered greedily so that each aligned
//! feature holds at most one feature per sample.

mod clustering;
pub mod drift;

use crate::errors::AlignmentInconsistency;
use crate::models::{
    AlignedFeature,
    Feature,
    SampleSlot,
};
use crate::params::AlignmentParams;
use crate::utils::streaming_calculators::RunningStatsCalculator;
use clustering::{
    greedy_cluster,
    ClusterInput,
};
pub use drift::{
    fit_drift_curve,
    AnchorPoint,
    DriftCurve,
    DriftFitError,
};
use serde::Serialize;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Debug, Clone, Serialize)]
pub struct Alignment {
    pub features: Vec<AlignedFeature>,
    /// One curve per sample, sample rt to reference rt.
    pub drift_curves: Vec<DriftCurve>,
    pub reference_sample: Option<usize>,
}

pub struct Aligner {
    params: AlignmentParams,
}

impl Aligner {
    pub fn new(params: AlignmentParams) -> Self {
        Self { params }
    }

    /// Aligns the representative features of every sample.
    ///
    /// `samples[i]` holds all features of sample `i`, indexed by their
    /// `id`. Non-representative isotopes and adducts ride along with
    /// their representative and are not clustered on their own.
    pub fn align(&self, samples: &[Vec<Feature>]) -> Result<Alignment, AlignmentInconsistency> {
        let reps: Vec<Vec<&Feature>> = samples
            .iter()
            .map(|features| features.iter().filter(|f| f.is_representative).collect())
            .collect();

        let reference = select_reference(&reps);
        let drift_curves = self.fit_curves(&reps, reference);

        let inputs: Vec<ClusterInput> = reps
            .iter()
            .enumerate()
            .flat_map(|(sample, features)| {
                let curve = &drift_curves[sample];
                features.iter().map(move |f| ClusterInput {
                    sample,
                    feature_id: f.id,
                    mz: f.mz(),
                    rt: curve.correct(f.rt_seconds()),
                    intensity: f.intensity(),
                })
            })
            .collect();

        let clusters = greedy_cluster(&inputs, &self.params.tolerance);
        let mut features = Vec::with_capacity(clusters.len());
        for (cluster_idx, cluster) in clusters.iter().enumerate() {
            features.push(self.build_aligned(cluster_idx, cluster, &inputs, samples)?);
        }
        features.sort_by(|a, b| {
            a.mz.total_cmp(&b.mz)
                .then_with(|| a.rt_seconds.total_cmp(&b.rt_seconds))
                .then_with(|| a.members().next().cmp(&b.members().next()))
        });
        for (id, feature) in features.iter_mut().enumerate() {
            feature.id = id;
        }

        check_invariants(&features, samples)?;
        info!(
            "Aligned {} representative features from {} samples into {} features",
            inputs.len(),
            samples.len(),
            features.len()
        );

        Ok(Alignment {
            features,
            drift_curves,
            reference_sample: reference,
        })
    }

    fn fit_curves(&self, reps: &[Vec<&Feature>], reference: Option<usize>) -> Vec<DriftCurve> {
        let identity = vec![DriftCurve::identity(); reps.len()];
        let Some(reference) = reference else {
            return identity;
        };
        if self.params.max_rt_drift_seconds == 0.0 || reps.len() < 2 {
            return identity;
        }

        let mut reference_anchors: Vec<&Feature> = reps[reference]
            .iter()
            .copied()
            .filter(|f| f.peak.snr >= self.params.anchor_min_snr)
            .collect();
        reference_anchors.sort_by(|a, b| a.mz().total_cmp(&b.mz()));

        reps.iter()
            .enumerate()
            .map(|(sample, features)| {
                if sample == reference {
                    return DriftCurve::identity();
                }
                let anchors = self.match_anchors(features, &reference_anchors);
                match fit_drift_curve(
                    &anchors,
                    self.params.grid_bins,
                    self.params.min_anchor_points,
                    self.params.max_rt_drift_seconds,
                ) {
                    Ok(curve) => curve,
                    Err(e) => {
                        warn!(
                            "Sample {} keeps its own retention times ({} anchors): {}",
                            sample,
                            anchors.len(),
                            e
                        );
                        DriftCurve::identity()
                    }
                }
            })
            .collect()
    }

    /// Pairs of (sample rt, reference rt) for features that match exactly
    /// one reference feature, where that reference feature is matched by
    /// nothing else.
    fn match_anchors(&self, features: &[&Feature], reference: &[&Feature]) -> Vec<AnchorPoint> {
        let max_drift = self.params.max_rt_drift_seconds;

        let mut matched_by: Vec<Option<usize>> = vec![None; reference.len()];
        let mut ambiguous = vec![false; reference.len()];
        for (i, f) in features.iter().enumerate() {
            if f.peak.snr < self.params.anchor_min_snr {
                continue;
            }
            let range = self.params.tolerance.mz.range(f.mz());
            let lo = reference.partition_point(|r| r.mz() < range.start());
            let hi = reference.partition_point(|r| r.mz() <= range.end());
            let mut hits = (lo..hi)
                .filter(|&r| (f.rt_seconds() - reference[r].rt_seconds()).abs() <= max_drift);
            let (Some(r), None) = (hits.next(), hits.next()) else {
                continue;
            };
            if matched_by[r].is_some() {
                ambiguous[r] = true;
            } else {
                matched_by[r] = Some(i);
            }
        }

        let anchors: Vec<AnchorPoint> = matched_by
            .iter()
            .zip(ambiguous.iter())
            .enumerate()
            .filter_map(|(r, (m, &amb))| match (m, amb) {
                (Some(i), false) => Some(AnchorPoint {
                    x: features[*i].rt_seconds(),
                    y: reference[r].rt_seconds(),
                    weight: 1.0,
                }),
                _ => None,
            })
            .collect();
        debug!("Matched {} anchors", anchors.len());
        anchors
    }

    fn build_aligned(
        &self,
        cluster_idx: usize,
        cluster: &clustering::Cluster,
        inputs: &[ClusterInput],
        samples: &[Vec<Feature>],
    ) -> Result<AlignedFeature, AlignmentInconsistency> {
        let mut slots = vec![SampleSlot::Missing; samples.len()];
        let mut snr = RunningStatsCalculator::default();
        let mut symmetry = RunningStatsCalculator::default();
        let mut strongest: Option<&Feature> = None;

        for &m in cluster.members.iter() {
            let input = &inputs[m];
            let feature = &samples[input.sample][input.feature_id];
            if !slots[input.sample].is_missing() {
                return Err(AlignmentInconsistency::DuplicateSample {
                    cluster: cluster_idx,
                    sample: input.sample,
                });
            }
            slots[input.sample] = SampleSlot::Detected {
                feature_id: feature.id,
                value: feature.quantity(self.params.quantity),
                mz: feature.mz(),
                rt_seconds: feature.rt_seconds(),
            };
            snr.add(1.0, feature.peak.snr);
            symmetry.add(1.0, feature.peak.symmetry);
            let stronger = strongest.map_or(true, |s| {
                feature
                    .intensity()
                    .total_cmp(&s.intensity())
                    .then_with(|| s.mz().total_cmp(&feature.mz()))
                    .is_gt()
            });
            if stronger {
                strongest = Some(feature);
            }
        }

        Ok(AlignedFeature {
            id: cluster_idx,
            mz: cluster.mz,
            rt_seconds: cluster.rt,
            slots,
            charge: strongest.and_then(|f| f.charge),
            isotope_count: strongest.map(|f| f.group_size).unwrap_or(1),
            adduct: strongest.and_then(|f| f.adduct.clone()),
            mean_snr: snr.mean().unwrap_or(0.0),
            mean_symmetry: symmetry.mean().unwrap_or(0.0),
        })
    }
}

/// The sample with the most representative features, lowest index on
/// ties. `None` when no sample has any.
fn select_reference(reps: &[Vec<&Feature>]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (sample, features) in reps.iter().enumerate() {
        if features.is_empty() {
            continue;
        }
        if best.map_or(true, |(_, n)| features.len() > n) {
            best = Some((sample, features.len()));
        }
    }
    best.map(|(sample, _)| sample)
}

/// Every aligned feature has one slot per sample, and every
/// representative feature is claimed by exactly one aligned feature.
pub fn check_invariants(
    features: &[AlignedFeature],
    samples: &[Vec<Feature>],
) -> Result<(), AlignmentInconsistency> {
    let mut claimed: Vec<Vec<bool>> = samples.iter().map(|f| vec![false; f.len()]).collect();
    for feature in features {
        if feature.slots.len() != samples.len() {
            return Err(AlignmentInconsistency::SlotCountMismatch {
                cluster: feature.id,
                got: feature.slots.len(),
                expected: samples.len(),
            });
        }
        for (sample, feature_id) in feature.members() {
            let Some(flag) = claimed[sample].get_mut(feature_id) else {
                return Err(AlignmentInconsistency::FeatureUnassigned {
                    sample,
                    feature: feature_id,
                });
            };
            if *flag {
                return Err(AlignmentInconsistency::FeatureClaimedTwice {
                    sample,
                    feature: feature_id,
                });
            }
            *flag = true;
        }
    }
    for (sample, features) in samples.iter().enumerate() {
        for f in features.iter().filter(|f| f.is_representative) {
            if !claimed[sample][f.id] {
                return Err(AlignmentInconsistency::FeatureUnassigned {
                    sample,
                    feature: f.id,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tolerance::{
        MzTolerance,
        RtTolerance,
        Tolerance,
    };
    use crate::models::Peak;

    fn feature(sample: usize, id: usize, mz: f64, rt: f64, intensity: f64) -> Feature {
        Feature {
            sample_index: sample,
            id,
            peak: Peak {
                roi_id: id,
                mz,
                mz_std: 0.0,
                apex_scan: 10,
                left_scan: 8,
                right_scan: 12,
                apex_rt: rt,
                left_rt: rt - 2.0,
                right_rt: rt + 2.0,
                apex_intensity: intensity,
                top3_height: intensity,
                area: intensity * 3.0,
                snr: 50.0,
                symmetry: 0.9,
                width_scans: 5,
                profile: Vec::new(),
            },
            group_id: id,
            isotope_index: 0,
            group_size: 1,
            charge: None,
            adduct: None,
            adduct_links: Vec::new(),
            is_representative: true,
        }
    }

    fn params() -> AlignmentParams {
        AlignmentParams {
            tolerance: Tolerance {
                mz: MzTolerance::Absolute((0.005, 0.005)),
                rt: RtTolerance::seconds(2.0, 2.0),
            },
            max_rt_drift_seconds: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_single_features_align() {
        let samples = vec![
            vec![feature(0, 0, 300.1000, 100.0, 1e4)],
            vec![feature(1, 0, 300.1003, 100.0, 1e4)],
        ];
        let out = Aligner::new(params()).align(&samples).unwrap();
        assert_eq!(out.features.len(), 1);
        let f = &out.features[0];
        assert!(f.mz > 300.1000 && f.mz < 300.1003);
        assert_eq!(f.num_detected(), 2);
        assert_eq!(f.members().collect::<Vec<_>>(), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_unique_features_keep_missing_slots() {
        let samples = vec![
            vec![feature(0, 0, 300.1, 100.0, 1e4), feature(0, 1, 410.2, 50.0, 1e4)],
            vec![feature(1, 0, 300.1, 100.5, 1e4)],
        ];
        let out = Aligner::new(params()).align(&samples).unwrap();
        assert_eq!(out.features.len(), 2);
        assert!(out.features[0].mz < out.features[1].mz);
        assert!(out.features[1].slots[1].is_missing());
        assert_eq!(out.reference_sample, Some(0));
    }

    #[test]
    fn test_non_representatives_are_not_clustered() {
        let mut isotope = feature(0, 1, 301.1, 100.0, 1e3);
        isotope.is_representative = false;
        let samples = vec![vec![feature(0, 0, 300.1, 100.0, 1e4), isotope]];
        let out = Aligner::new(params()).align(&samples).unwrap();
        assert_eq!(out.features.len(), 1);
    }

    #[test]
    fn test_drift_is_corrected_before_clustering() {
        // Sample 1 elutes 8 s late everywhere; the rt tolerance is 2 s.
        let n = 30;
        let reference: Vec<Feature> = (0..n)
            .map(|i| feature(0, i, 100.0 + i as f64 * 7.3, 60.0 + i as f64 * 15.0, 1e5))
            .collect();
        let shifted: Vec<Feature> = (0..n)
            .map(|i| feature(1, i, 100.0 + i as f64 * 7.3, 68.0 + i as f64 * 15.0, 1e5))
            .collect();
        let samples = vec![reference, shifted];

        let mut p = params();
        p.max_rt_drift_seconds = 20.0;
        p.grid_bins = 15;
        let out = Aligner::new(p).align(&samples).unwrap();
        assert!(out.drift_curves[0].is_identity());
        assert!(!out.drift_curves[1].is_identity());
        assert_eq!(out.features.len(), n);
        assert!(out.features.iter().all(|f| f.num_detected() == 2));
    }

    #[test]
    fn test_off_trend_anchor_does_not_break_matching() {
        // 60 pairs 3 s apart plus one legitimate pair 25 s apart that
        // stretches the reference time axis past the sample one.
        let n = 60;
        let mut reference: Vec<Feature> = (0..n)
            .map(|i| feature(0, i, 100.0 + i as f64 * 7.3, 60.0 + i as f64 * 10.0, 1e5))
            .collect();
        let mut sample: Vec<Feature> = (0..n)
            .map(|i| feature(1, i, 100.0 + i as f64 * 7.3, 63.0 + i as f64 * 10.0, 1e5))
            .collect();
        reference.push(feature(0, n, 555.55, 675.0, 1e5));
        sample.push(feature(1, n, 555.55, 650.0, 1e5));

        let out = Aligner::new(AlignmentParams::default())
            .align(&[reference, sample])
            .unwrap();
        let curve = &out.drift_curves[1];
        assert!(!curve.is_identity());
        for x in (63..=653).step_by(10) {
            let x = x as f64;
            assert!((curve.correct(x) - (x - 3.0)).abs() < 1.0, "{x}");
        }
        let paired = out
            .features
            .iter()
            .filter(|f| f.mz < 550.0 && f.num_detected() == 2)
            .count();
        assert_eq!(paired, n);
    }

    #[test]
    fn test_invariant_violation_is_reported() {
        let samples = vec![vec![feature(0, 0, 300.1, 100.0, 1e4)]];
        let broken = AlignedFeature {
            id: 0,
            mz: 300.1,
            rt_seconds: 100.0,
            slots: vec![],
            charge: None,
            isotope_count: 1,
            adduct: None,
            mean_snr: 0.0,
            mean_symmetry: 0.0,
        };
        assert_eq!(
            check_invariants(&[broken], &samples),
            Err(AlignmentInconsistency::SlotCountMismatch {
                cluster: 0,
                got: 0,
                expected: 1
            })
        );
        assert_eq!(
            check_invariants(&[], &samples),
            Err(AlignmentInconsistency::FeatureUnassigned {
                sample: 0,
                feature: 0
            })
        );
    }
}
