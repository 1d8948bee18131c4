//! Region-of-interest extraction.
//!
//! Scans are swept in retention time order while a pool of open ROIs is
//! kept sorted by representative m/z. ROIs live in an arena and are only
//! referenced by index, the sorted pool is a `Vec` of those indices.

use crate::models::roi::{
    Roi,
    RoiPoint,
};
use crate::models::scan_store::ScanStore;
use crate::models::tolerance::MzTolerance;
use crate::params::RoiParams;
use crate::utils::streaming_calculators::RunningStatsCalculator;
use crate::utils::TupleRange;
use std::ops::Range;
use tracing::debug;

#[derive(Debug)]
struct OpenRoi {
    centroid: RunningStatsCalculator,
    seed_mz: f64,
    min_mz: f64,
    max_mz: f64,
    points: Vec<RoiPoint>,
    last_scan: usize,
    last_intensity: f64,
    /// Non-empty scans since the last accepted point.
    missed: usize,
}

impl OpenRoi {
    fn seed(scan_index: usize, rt_seconds: f64, mz: f64, intensity: f64) -> Self {
        let mut centroid = RunningStatsCalculator::default();
        centroid.add(intensity, mz);
        Self {
            centroid,
            seed_mz: mz,
            min_mz: mz,
            max_mz: mz,
            points: vec![RoiPoint {
                scan_index,
                rt_seconds,
                mz,
                intensity,
                observed: true,
            }],
            last_scan: scan_index,
            last_intensity: intensity,
            missed: 0,
        }
    }

    fn mz(&self) -> f64 {
        self.centroid.mean().unwrap_or(self.seed_mz)
    }

    /// Distance to the representative m/z if the point can join without
    /// pushing any existing point out of tolerance.
    fn accepts(&self, tol: &MzTolerance, mz: f64, intensity: f64) -> Option<f64> {
        let rep = self.mz();
        if !tol.range(rep).contains(mz) {
            return None;
        }
        let new_rep = if self.centroid.weight() > 0.0 {
            self.centroid.peek_add(intensity, mz)
        } else if intensity > 0.0 {
            mz
        } else {
            rep
        };
        let range = tol.range(new_rep);
        if range.contains(self.min_mz.min(mz)) && range.contains(self.max_mz.max(mz)) {
            Some((mz - rep).abs())
        } else {
            None
        }
    }

    fn extend(&mut self, store: &ScanStore, scan_index: usize, mz: f64, intensity: f64) {
        let scans = store.scans();
        for gap_scan in ((self.last_scan + 1)..scan_index).filter(|&s| !scans[s].is_empty()) {
            self.points.push(RoiPoint {
                scan_index: gap_scan,
                rt_seconds: scans[gap_scan].rt_seconds(),
                mz: f64::NAN,
                intensity: 0.0,
                observed: false,
            });
        }
        self.points.push(RoiPoint {
            scan_index,
            rt_seconds: scans[scan_index].rt_seconds(),
            mz,
            intensity,
            observed: true,
        });
        self.centroid.add(intensity, mz);
        self.min_mz = self.min_mz.min(mz);
        self.max_mz = self.max_mz.max(mz);
        self.last_scan = scan_index;
        self.last_intensity = intensity;
        self.missed = 0;
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    roi_intensity: f64,
    point: usize,
    roi: usize,
}

/// Builds ROIs from a scan store.
#[derive(Debug, Clone)]
pub struct RoiExtractor {
    params: RoiParams,
}

impl RoiExtractor {
    pub fn new(params: RoiParams) -> Self {
        Self { params }
    }

    pub fn extract(&self, store: &ScanStore) -> Vec<Roi> {
        self.extract_within(store, 0..store.len())
    }

    /// Sweeps only `scans`, a window of scan indices. Points keep the
    /// indices of the full store and padding never leaves the window.
    pub fn extract_within(&self, store: &ScanStore, scans: Range<usize>) -> Vec<Roi> {
        let tol = self.params.mz_tolerance;
        let max_gap = self.params.max_gap;
        let end = scans.end.min(store.len());
        let scans = scans.start.min(end)..end;

        let mut arena: Vec<OpenRoi> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        for (scan_index, scan) in store.scans()[scans.clone()]
            .iter()
            .enumerate()
            .map(|(offset, scan)| (scans.start + offset, scan))
        {
            if scan.is_empty() {
                continue;
            }

            // Empty scans were skipped above, so only scans that had
            // something to offer count as misses. Closed ROIs simply stay
            // in the arena.
            open.retain(|&idx| arena[idx].missed <= max_gap);

            let points: Vec<usize> = (0..scan.len())
                .filter(|&i| scan.intensity()[i] >= self.params.min_intensity)
                .collect();
            if points.is_empty() {
                for &idx in open.iter() {
                    arena[idx].missed += 1;
                }
                continue;
            }

            let mut candidates: Vec<Candidate> = Vec::new();
            for (point_pos, &i) in points.iter().enumerate() {
                let mz = scan.mz()[i];
                let intensity = scan.intensity()[i];
                let span = tol.range(mz).width();
                let window = TupleRange::around(mz, span);
                let lo = open.partition_point(|&r| arena[r].mz() < window.start());
                let hi = lo + open[lo..].partition_point(|&r| arena[r].mz() <= window.end());
                for &roi in open[lo..hi].iter() {
                    if let Some(distance) = arena[roi].accepts(&tol, mz, intensity) {
                        candidates.push(Candidate {
                            distance,
                            roi_intensity: arena[roi].last_intensity,
                            point: point_pos,
                            roi,
                        });
                    }
                }
            }

            candidates.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| b.roi_intensity.total_cmp(&a.roi_intensity))
                    .then_with(|| a.point.cmp(&b.point))
                    .then_with(|| a.roi.cmp(&b.roi))
            });

            let mut point_taken = vec![false; points.len()];
            let mut roi_taken: Vec<usize> = Vec::new();
            for cand in candidates {
                if point_taken[cand.point] || roi_taken.contains(&cand.roi) {
                    continue;
                }
                point_taken[cand.point] = true;
                roi_taken.push(cand.roi);
                let i = points[cand.point];
                arena[cand.roi].extend(store, scan_index, scan.mz()[i], scan.intensity()[i]);
            }

            for &idx in open.iter() {
                if !roi_taken.contains(&idx) {
                    arena[idx].missed += 1;
                }
            }

            for (point_pos, &i) in points.iter().enumerate() {
                if point_taken[point_pos] {
                    continue;
                }
                arena.push(OpenRoi::seed(
                    scan_index,
                    scan.rt_seconds(),
                    scan.mz()[i],
                    scan.intensity()[i],
                ));
                open.push(arena.len() - 1);
            }

            open.sort_by(|&a, &b| arena[a].mz().total_cmp(&arena[b].mz()).then_with(|| a.cmp(&b)));
        }

        let num_seeded = arena.len();
        let mut rois: Vec<Roi> = arena
            .into_iter()
            .filter(|r| r.points.iter().filter(|p| p.observed).count() >= self.params.min_length)
            .map(|r| self.finish(r, store, &scans))
            .collect();
        rois.sort_by(|a, b| {
            a.mz.total_cmp(&b.mz)
                .then_with(|| a.points[0].scan_index.cmp(&b.points[0].scan_index))
        });
        for (id, roi) in rois.iter_mut().enumerate() {
            roi.id = id;
        }

        debug!(
            "Sample {}: seeded {} ROIs, kept {} with at least {} scans",
            store.sample_id(),
            num_seeded,
            rois.len(),
            self.params.min_length
        );
        rois
    }

    /// Freezes an open ROI: fixes its representative m/z and pads both
    /// ends with one unobserved scan when the window has one.
    fn finish(&self, open: OpenRoi, store: &ScanStore, window: &Range<usize>) -> Roi {
        let mz = open.mz();
        let mut points = open.points;
        for p in points.iter_mut().filter(|p| !p.observed) {
            p.mz = mz;
        }

        let first_scan = points[0].scan_index;
        let last_scan = open.last_scan;
        if first_scan > window.start {
            if let Some(rt) = store.rt_seconds(first_scan - 1) {
                points.insert(
                    0,
                    RoiPoint {
                        scan_index: first_scan - 1,
                        rt_seconds: rt,
                        mz,
                        intensity: 0.0,
                        observed: false,
                    },
                );
            }
        }
        if let Some(rt) = store.rt_seconds(last_scan + 1).filter(|_| last_scan + 1 < window.end) {
            points.push(RoiPoint {
                scan_index: last_scan + 1,
                rt_seconds: rt,
                mz,
                intensity: 0.0,
                observed: false,
            });
        }

        Roi {
            id: 0,
            mz,
            mz_range: self.params.mz_tolerance.range(mz),
            points,
        }
    }
}
