//! The batch result: one row per aligned feature, one column per sample.

use crate::models::{
    AlignedFeature,
    Feature,
    SampleSlot,
};
use serde::Serialize;
use std::io::Write;

const FIXED_COLUMNS: [&str; 10] = [
    "feature_id",
    "mz",
    "rt_seconds",
    "charge",
    "isotope_count",
    "adduct",
    "mean_snr",
    "mean_symmetry",
    "n_detected",
    "n_filled",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    pub sample_ids: Vec<String>,
    pub features: Vec<AlignedFeature>,
}

impl FeatureTable {
    pub fn new(sample_ids: Vec<String>, features: Vec<AlignedFeature>) -> Self {
        Self {
            sample_ids,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Column of per-sample values, `None` where the slot is missing.
    pub fn sample_values(&self, sample: usize) -> Vec<Option<f64>> {
        self.features
            .iter()
            .map(|f| f.slots.get(sample).and_then(SampleSlot::value))
            .collect()
    }

    fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|s| s.to_string()).collect();
        header.extend(self.sample_ids.iter().cloned());
        header.extend(self.sample_ids.iter().map(|s| format!("{s}_status")));
        header
    }

    /// Writes the table as CSV. Detected and filled values are numbers,
    /// below-detection-limit is `0` and missing is an empty cell.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for f in self.features.iter() {
            let mut record = vec![
                f.id.to_string(),
                format!("{:.6}", f.mz),
                format!("{:.3}", f.rt_seconds),
                f.charge.map(|c| c.to_string()).unwrap_or_default(),
                f.isotope_count.to_string(),
                f.adduct.clone().unwrap_or_default(),
                format!("{:.3}", f.mean_snr),
                format!("{:.3}", f.mean_symmetry),
                f.num_detected().to_string(),
                f.num_filled().to_string(),
            ];
            record.extend(
                f.slots
                    .iter()
                    .map(|s| s.value().map(|v| v.to_string()).unwrap_or_default()),
            );
            record.extend(f.slots.iter().map(|s| s.status().to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SampleReportRow<'a> {
    feature_id: usize,
    mz: f64,
    rt_seconds: f64,
    left_rt: f64,
    right_rt: f64,
    apex_intensity: f64,
    top3_height: f64,
    area: f64,
    snr: f64,
    symmetry: f64,
    group_id: usize,
    isotope_index: u8,
    charge: Option<u8>,
    adduct: Option<&'a str>,
    is_representative: bool,
}

/// Per-sample feature list, one row per feature.
pub fn write_sample_report<W: Write>(features: &[Feature], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for f in features {
        wtr.serialize(SampleReportRow {
            feature_id: f.id,
            mz: f.mz(),
            rt_seconds: f.rt_seconds(),
            left_rt: f.peak.left_rt,
            right_rt: f.peak.right_rt,
            apex_intensity: f.peak.apex_intensity,
            top3_height: f.peak.top3_height,
            area: f.peak.area,
            snr: f.peak.snr,
            symmetry: f.peak.symmetry,
            group_id: f.group_id,
            isotope_index: f.isotope_index,
            charge: f.charge,
            adduct: f.adduct.as_deref(),
            is_representative: f.is_representative,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FeatureTable {
        FeatureTable::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![AlignedFeature {
                id: 0,
                mz: 300.1,
                rt_seconds: 100.0,
                slots: vec![
                    SampleSlot::Detected {
                        feature_id: 2,
                        value: 1500.0,
                        mz: 300.1,
                        rt_seconds: 100.0,
                    },
                    SampleSlot::BelowDetectionLimit,
                    SampleSlot::Missing,
                ],
                charge: Some(1),
                isotope_count: 2,
                adduct: Some("[M+H]+".into()),
                mean_snr: 12.0,
                mean_symmetry: 0.8,
            }],
        )
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        table().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "feature_id,mz,rt_seconds,charge,isotope_count,adduct,mean_snr,mean_symmetry,n_detected,n_filled,a,b,c,a_status,b_status,c_status"
        );
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[10], "1500");
        assert_eq!(row[11], "0");
        assert_eq!(row[12], "");
        assert_eq!(row[13], "detected");
        assert_eq!(row[14], "below_detection_limit");
        assert_eq!(row[15], "missing");
    }

    #[test]
    fn test_sample_values() {
        assert_eq!(table().sample_values(1), vec![Some(0.0)]);
        assert_eq!(table().sample_values(2), vec![None]);
    }
}
