//! JSON interchange for scan data.
//!
//! ```json
//! {"sample_id": "qc_01", "scans": [{"rt_seconds": 0.5, "mz": [...], "intensity": [...]}]}
//! ```

use crate::errors::InputError;
use crate::models::{
    Scan,
    ScanStore,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub rt_seconds: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStoreRecord {
    pub sample_id: String,
    pub scans: Vec<ScanRecord>,
}

impl TryFrom<ScanStoreRecord> for ScanStore {
    type Error = InputError;

    fn try_from(record: ScanStoreRecord) -> Result<Self, Self::Error> {
        let scans = record
            .scans
            .into_iter()
            .map(|s| Scan::try_new(s.rt_seconds, s.mz, s.intensity))
            .collect::<Result<Vec<_>, _>>()?;
        ScanStore::try_new(record.sample_id, scans)
    }
}

impl From<&ScanStore> for ScanStoreRecord {
    fn from(store: &ScanStore) -> Self {
        Self {
            sample_id: store.sample_id().to_string(),
            scans: store
                .scans()
                .iter()
                .map(|s| ScanRecord {
                    rt_seconds: s.rt_seconds(),
                    mz: s.mz().to_vec(),
                    intensity: s.intensity().to_vec(),
                })
                .collect(),
        }
    }
}

pub fn read_scan_store_json(path: &Path) -> Result<ScanStore, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record: ScanStoreRecord =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let store = ScanStore::try_from(record)?;
    debug!(
        "Read {} scans ({} points) for sample '{}' from {}",
        store.len(),
        store.num_points(),
        store.sample_id(),
        path.display()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_converts_and_validates() {
        let json = r#"{"sample_id": "a", "scans": [
            {"rt_seconds": 1.0, "mz": [100.0, 200.0], "intensity": [10.0, 20.0]},
            {"rt_seconds": 2.0, "mz": [], "intensity": []}
        ]}"#;
        let record: ScanStoreRecord = serde_json::from_str(json).unwrap();
        let store = ScanStore::try_from(record).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.num_points(), 2);

        let back = ScanStoreRecord::from(&store);
        assert_eq!(back.scans[0].mz, vec![100.0, 200.0]);
    }

    #[test]
    fn test_bad_record_is_an_input_error() {
        let json = r#"{"sample_id": "a", "scans": [
            {"rt_seconds": 1.0, "mz": [100.0], "intensity": [10.0, 20.0]}
        ]}"#;
        let record: ScanStoreRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            ScanStore::try_from(record),
            Err(InputError::MismatchedArrays { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = read_scan_store_json(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, InputError::Io { .. }));
    }
}
