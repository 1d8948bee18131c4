//! Peak picking and deconvolution inside a single ROI.

use crate::models::peak::Peak;
use crate::models::roi::Roi;
use crate::params::PeakPickingParams;
use crate::utils::math::{
    mean_of_top_n,
    median,
    trapezoid_area,
};
use crate::utils::smoothing::gaussian_smooth;
use crate::utils::streaming_calculators::RunningStatsCalculator;

#[derive(Debug, Clone)]
pub struct PeakPicker {
    params: PeakPickingParams,
}

impl PeakPicker {
    pub fn new(params: PeakPickingParams) -> Self {
        Self { params }
    }

    /// Resolves the peaks of one ROI, ordered by apex.
    pub fn pick(&self, roi: &Roi) -> Vec<Peak> {
        if roi.is_empty() {
            return Vec::new();
        }
        let raw = roi.intensities();
        let rts = roi.rt_seconds();
        let smoothed = gaussian_smooth(&raw, self.params.smoothing_window);

        let maxima = local_maxima(&smoothed, self.params.min_height);
        let maxima = merge_shallow_maxima(&smoothed, maxima, self.params.valley_merge_ratio);
        let valleys: Vec<usize> = maxima
            .windows(2)
            .map(|w| valley_between(&smoothed, w[0], w[1]))
            .collect();

        let mut peaks = Vec::with_capacity(maxima.len());
        for (k, &max_idx) in maxima.iter().enumerate() {
            let left_limit = if k == 0 { 0 } else { valleys[k - 1] };
            let right_limit = valleys.get(k).copied().unwrap_or(smoothed.len() - 1);
            let threshold = smoothed[max_idx] * self.params.boundary_fraction;
            let left = walk_down(&smoothed, max_idx, left_limit, threshold, Direction::Left);
            let right = walk_down(&smoothed, max_idx, right_limit, threshold, Direction::Right);

            if let Some(peak) = self.build_peak(roi, &raw, &rts, left, right) {
                peaks.push(peak);
            }
        }
        peaks
    }

    fn build_peak(&self, roi: &Roi, raw: &[f64], rts: &[f64], left: usize, right: usize) -> Option<Peak> {
        let apex = (left..=right).max_by(|&a, &b| raw[a].total_cmp(&raw[b]).then_with(|| b.cmp(&a)))?;
        let apex_intensity = raw[apex];

        // A maximum sitting on the edge of the trace is a truncated signal.
        if apex == left || apex == right {
            return None;
        }
        let width_scans = right - left + 1;
        if width_scans < self.params.min_width_scans || apex_intensity < self.params.min_height {
            return None;
        }

        let outside: Vec<f64> = raw
            .iter()
            .enumerate()
            .filter(|(i, v)| (*i < left || *i > right) && **v > 0.0)
            .map(|(_, v)| *v)
            .collect();
        let noise = median(&outside)
            .unwrap_or(0.0)
            .max(self.params.noise_floor);
        let snr = apex_intensity / noise;
        if snr < self.params.min_snr {
            return None;
        }

        let mut mz_calc = RunningStatsCalculator::default();
        for p in roi.points[left..=right].iter().filter(|p| p.observed) {
            mz_calc.add(p.intensity, p.mz);
        }
        let mz = mz_calc.mean().unwrap_or(roi.mz);
        let total: f64 = mz_calc.weight();
        let mz_std = if total > 0.0 {
            (roi.points[left..=right]
                .iter()
                .filter(|p| p.observed)
                .map(|p| p.intensity * (p.mz - mz).powi(2))
                .sum::<f64>()
                / total)
                .sqrt()
        } else {
            0.0
        };

        Some(Peak {
            roi_id: roi.id,
            mz,
            mz_std,
            apex_scan: roi.points[apex].scan_index,
            left_scan: roi.points[left].scan_index,
            right_scan: roi.points[right].scan_index,
            apex_rt: rts[apex],
            left_rt: rts[left],
            right_rt: rts[right],
            apex_intensity,
            top3_height: mean_of_top_n(&raw[left..=right], 3),
            area: trapezoid_area(&rts[left..=right], &raw[left..=right]),
            snr,
            symmetry: symmetry(raw, rts, apex, left, right),
            width_scans,
            profile: roi.points[left..=right]
                .iter()
                .map(|p| (p.scan_index, p.intensity))
                .collect(),
        })
    }
}

/// Strict local maxima at or above `min_height`. A plateau counts once,
/// at its first index.
fn local_maxima(trace: &[f64], min_height: f64) -> Vec<usize> {
    let n = trace.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        let v = trace[i];
        let mut j = i;
        while j + 1 < n && trace[j + 1] == v {
            j += 1;
        }
        let rises = i == 0 || trace[i - 1] < v;
        let falls = j + 1 == n || trace[j + 1] < v;
        if rises && falls && v >= min_height {
            out.push(i);
        }
        i = j + 1;
    }
    out
}

/// Index of the lowest point strictly between two maxima.
fn valley_between(trace: &[f64], a: usize, b: usize) -> usize {
    (a..=b)
        .min_by(|&x, &y| trace[x].total_cmp(&trace[y]).then_with(|| x.cmp(&y)))
        .unwrap_or(a)
}

/// Drops the lower of two neighbouring maxima while the valley between
/// them is too shallow to call them separate peaks.
fn merge_shallow_maxima(trace: &[f64], mut maxima: Vec<usize>, ratio: f64) -> Vec<usize> {
    loop {
        let shallow = maxima.windows(2).enumerate().find_map(|(k, w)| {
            let valley = trace[valley_between(trace, w[0], w[1])];
            let lower = trace[w[0]].min(trace[w[1]]);
            if valley > ratio * lower {
                // Keep the taller one; ties keep the earlier.
                Some(if trace[w[1]] > trace[w[0]] { k } else { k + 1 })
            } else {
                None
            }
        });
        match shallow {
            Some(k) => {
                maxima.remove(k);
            }
            None => return maxima,
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Left,
    Right,
}

/// Moves away from the apex while the trace keeps falling, stopping at
/// the threshold, at `limit`, or where the trace starts rising again.
fn walk_down(trace: &[f64], start: usize, limit: usize, threshold: f64, dir: Direction) -> usize {
    let mut pos = start;
    loop {
        if pos == limit || trace[pos] <= threshold {
            return pos;
        }
        let next = match dir {
            Direction::Left => pos - 1,
            Direction::Right => pos + 1,
        };
        if trace[next] > trace[pos] {
            return pos;
        }
        pos = next;
    }
}

/// min/max of the left and right half-widths at half the apex height.
fn symmetry(raw: &[f64], rts: &[f64], apex: usize, left: usize, right: usize) -> f64 {
    let half = raw[apex] / 2.0;

    let mut i = apex;
    while i > left && raw[i - 1] > half {
        i -= 1;
    }
    let left_rt = if i > left {
        interpolate_crossing(rts[i - 1], raw[i - 1], rts[i], raw[i], half)
    } else {
        rts[left]
    };

    let mut j = apex;
    while j < right && raw[j + 1] > half {
        j += 1;
    }
    let right_rt = if j < right {
        interpolate_crossing(rts[j], raw[j], rts[j + 1], raw[j + 1], half)
    } else {
        rts[right]
    };

    let left_hw = rts[apex] - left_rt;
    let right_hw = right_rt - rts[apex];
    let longest = left_hw.max(right_hw);
    if longest <= 0.0 {
        1.0
    } else {
        left_hw.min(right_hw).max(0.0) / longest
    }
}

fn interpolate_crossing(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    if (y1 - y0).abs() < f64::EPSILON {
        return (x0 + x1) / 2.0;
    }
    x0 + (level - y0) * (x1 - x0) / (y1 - y0)
}
