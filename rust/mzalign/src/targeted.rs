use crate::models::tolerance::Tolerance;
use crate::models::AlignedFeature;
use serde::{
    Deserialize,
    Serialize,
};

/// A compound to look up in a finished feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub mz: f64,
    /// When absent only the m/z is checked.
    #[serde(default)]
    pub rt_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetHit {
    pub name: String,
    pub target_mz: f64,
    pub target_rt_seconds: Option<f64>,
    pub feature_id: Option<usize>,
    pub mz: Option<f64>,
    pub rt_seconds: Option<f64>,
    pub mz_error_ppm: Option<f64>,
    pub n_detected: usize,
}

/// Largest per-sample value of the feature, detected or filled.
fn strength(feature: &AlignedFeature) -> f64 {
    feature
        .slots
        .iter()
        .filter_map(|s| s.value())
        .fold(0.0, f64::max)
}

/// For every target, the strongest aligned feature within tolerance.
///
/// `features` must be sorted by m/z, as the aligner leaves them.
pub fn search(features: &[AlignedFeature], targets: &[Target], tolerance: &Tolerance) -> Vec<TargetHit> {
    targets
        .iter()
        .map(|target| {
            let mz_range = tolerance.mz.range(target.mz);
            let lo = features.partition_point(|f| f.mz < mz_range.start());
            let hi = features.partition_point(|f| f.mz <= mz_range.end());
            let best = features[lo..hi]
                .iter()
                .filter(|f| {
                    target
                        .rt_seconds
                        .map_or(true, |rt| tolerance.rt.range(rt).contains(f.rt_seconds))
                })
                .max_by(|a, b| strength(a).total_cmp(&strength(b)).then_with(|| b.id.cmp(&a.id)));

            TargetHit {
                name: target.name.clone(),
                target_mz: target.mz,
                target_rt_seconds: target.rt_seconds,
                feature_id: best.map(|f| f.id),
                mz: best.map(|f| f.mz),
                rt_seconds: best.map(|f| f.rt_seconds),
                mz_error_ppm: best.map(|f| (f.mz - target.mz) / target.mz * 1e6),
                n_detected: best.map(|f| f.num_detected()).unwrap_or(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tolerance::{
        MzTolerance,
        RtTolerance,
    };
    use crate::models::SampleSlot;

    fn feature(id: usize, mz: f64, rt: f64, value: f64) -> AlignedFeature {
        AlignedFeature {
            id,
            mz,
            rt_seconds: rt,
            slots: vec![SampleSlot::Detected {
                feature_id: id,
                value,
                mz,
                rt_seconds: rt,
            }],
            charge: None,
            isotope_count: 1,
            adduct: None,
            mean_snr: 10.0,
            mean_symmetry: 1.0,
        }
    }

    fn tolerance() -> Tolerance {
        Tolerance {
            mz: MzTolerance::Absolute((0.01, 0.01)),
            rt: RtTolerance::seconds(10.0, 10.0),
        }
    }

    #[test]
    fn test_strongest_match_wins() {
        let features = vec![
            feature(0, 195.080, 60.0, 1e4),
            feature(1, 195.088, 120.0, 5e4),
            feature(2, 195.090, 300.0, 2e4),
        ];
        let targets = vec![Target {
            name: "caffeine".into(),
            mz: 195.0877,
            rt_seconds: None,
        }];
        let hits = search(&features, &targets, &tolerance());
        assert_eq!(hits[0].feature_id, Some(1));
        assert_eq!(hits[0].n_detected, 1);
    }

    #[test]
    fn test_retention_time_restricts_matches() {
        let features = vec![feature(0, 195.088, 120.0, 5e4), feature(1, 195.090, 300.0, 2e4)];
        let targets = vec![
            Target {
                name: "late".into(),
                mz: 195.0877,
                rt_seconds: Some(305.0),
            },
            Target {
                name: "absent".into(),
                mz: 500.0,
                rt_seconds: None,
            },
        ];
        let hits = search(&features, &targets, &tolerance());
        assert_eq!(hits[0].feature_id, Some(1));
        assert_eq!(hits[1].feature_id, None);
        assert_eq!(hits[1].mz_error_ppm, None);
    }
}
