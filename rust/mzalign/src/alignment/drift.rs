//! Retention time drift correction.
//!
//! Anchor pairs (sample rt, reference rt) are binned on a coarse grid and
//! only the cells that dominate both their row and their column are kept
//! (the Calib-RT filter, <https://doi.org/10.1093/bioinformatics/btae417>).
//! Each kept cell stands for the weighted centroid of its own anchors, and
//! the heaviest chain of centroids ascending in both axes becomes the knots
//! of a monotone piecewise-linear curve.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const MIN_SLOPE_DENOMINATOR: f64 = 1e-9;
const WEIGHT_EPSILON: f64 = 1e-9;
/// Slack when comparing a fitted curve against the identity, so rounding
/// in the centroids does not discard an exact fit.
const WRMSE_SLACK: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriftFitError {
    #[error("Not enough anchor points ({0})")]
    InsufficientPoints(usize),
    #[error("Anchor points span a zero-width range")]
    ZeroRange,
    #[error("Unsupported anchor weight {0}")]
    UnsupportedWeight(f64),
    #[error("Fitted curve does not beat the identity (WRMSE {fitted:.3}s vs {identity:.3}s)")]
    NoImprovement { fitted: f64, identity: f64 },
}

/// A (sample rt, reference rt) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnchorPoint {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct CellStats {
    weight: f64,
    sum_x: f64,
    sum_y: f64,
}

impl CellStats {
    fn add(&mut self, p: &AnchorPoint) {
        self.weight += p.weight;
        self.sum_x += p.weight * p.x;
        self.sum_y += p.weight * p.y;
    }

    fn centroid(&self) -> AnchorPoint {
        AnchorPoint {
            x: self.sum_x / self.weight,
            y: self.sum_y / self.weight,
            weight: self.weight,
        }
    }
}

/// Occupied cells of a `bins` x `bins` grid, keyed by (row, column).
fn bin_anchors(
    anchors: &[AnchorPoint],
    bins: usize,
    x_range: (f64, f64),
    y_range: (f64, f64),
) -> Result<BTreeMap<(usize, usize), CellStats>, DriftFitError> {
    let x_span = x_range.1 - x_range.0;
    let y_span = y_range.1 - y_range.0;
    if bins == 0 || x_span <= 0.0 || y_span <= 0.0 {
        return Err(DriftFitError::ZeroRange);
    }
    let bin_of = |v: f64, lo: f64, span: f64| (((v - lo) / span * bins as f64) as usize).min(bins - 1);

    let mut cells: BTreeMap<(usize, usize), CellStats> = BTreeMap::new();
    for p in anchors {
        if !p.weight.is_finite() || p.weight < 0.0 {
            return Err(DriftFitError::UnsupportedWeight(p.weight));
        }
        if p.weight == 0.0 || !p.x.is_finite() || !p.y.is_finite() {
            continue;
        }
        let key = (bin_of(p.y, y_range.0, y_span), bin_of(p.x, x_range.0, x_span));
        cells.entry(key).or_default().add(p);
    }
    Ok(cells)
}

/// Centroids of the cells that carry the largest weight of both their row
/// and their column. Ties all survive.
fn dominant_cells(cells: &BTreeMap<(usize, usize), CellStats>) -> Vec<AnchorPoint> {
    let mut row_max: BTreeMap<usize, f64> = BTreeMap::new();
    let mut col_max: BTreeMap<usize, f64> = BTreeMap::new();
    for (&(row, col), stats) in cells.iter() {
        let r = row_max.entry(row).or_insert(0.0);
        *r = r.max(stats.weight);
        let c = col_max.entry(col).or_insert(0.0);
        *c = c.max(stats.weight);
    }
    cells
        .iter()
        .filter(|(key, stats)| {
            stats.weight >= row_max[&key.0] - WEIGHT_EPSILON
                && stats.weight >= col_max[&key.1] - WEIGHT_EPSILON
        })
        .map(|(_, stats)| stats.centroid())
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct ChainScore {
    weight: f64,
    /// Summed absolute change of the offset `y - x` along the chain.
    roughness: f64,
}

impl ChainScore {
    fn beats(&self, other: &ChainScore) -> bool {
        if (self.weight - other.weight).abs() > WEIGHT_EPSILON {
            self.weight > other.weight
        } else {
            self.roughness < other.roughness
        }
    }
}

/// Heaviest chain of nodes strictly ascending in both x and y. Between
/// equally heavy chains the one whose offset moves least wins.
fn heaviest_monotone_chain(mut nodes: Vec<AnchorPoint>) -> Vec<AnchorPoint> {
    if nodes.is_empty() {
        return nodes;
    }
    nodes.sort_by(|a, b| a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y)));

    let mut scores: Vec<ChainScore> = Vec::with_capacity(nodes.len());
    let mut prev: Vec<Option<usize>> = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let mut score = ChainScore {
            weight: node.weight,
            roughness: 0.0,
        };
        let mut link = None;
        for (j, before) in nodes[..i].iter().enumerate() {
            if !(node.x > before.x && node.y > before.y) {
                continue;
            }
            let step = ((node.y - node.x) - (before.y - before.x)).abs();
            let candidate = ChainScore {
                weight: scores[j].weight + node.weight,
                roughness: scores[j].roughness + step,
            };
            if candidate.beats(&score) {
                score = candidate;
                link = Some(j);
            }
        }
        scores.push(score);
        prev.push(link);
    }

    let mut end = 0;
    for i in 1..nodes.len() {
        if scores[i].beats(&scores[end]) {
            end = i;
        }
    }

    let mut chain = Vec::new();
    let mut cur = Some(end);
    while let Some(i) = cur {
        chain.push(nodes[i]);
        cur = prev[i];
    }
    chain.reverse();
    chain
}

/// Monotone mapping from a sample's retention times onto the reference
/// sample's.
///
/// Between knots the curve is linear. Outside the knots the offset of
/// the nearest knot is held constant. Every correction is clamped to
/// `max_shift`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftCurve {
    knots: Vec<(f64, f64)>,
    max_shift: f64,
}

impl DriftCurve {
    pub fn identity() -> Self {
        Self {
            knots: Vec::new(),
            max_shift: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.knots.is_empty()
    }

    pub fn knots(&self) -> &[(f64, f64)] {
        &self.knots
    }

    /// Knots must ascend strictly in both coordinates.
    fn from_knots(knots: Vec<(f64, f64)>, max_shift: f64) -> Self {
        Self { knots, max_shift }
    }

    /// Sample rt to reference rt.
    pub fn correct(&self, rt: f64) -> f64 {
        self.map(rt, |k| k.0, |k| k.1)
    }

    /// Reference rt back to sample rt.
    pub fn uncorrect(&self, rt: f64) -> f64 {
        self.map(rt, |k| k.1, |k| k.0)
    }

    fn map(&self, v: f64, from: impl Fn(&(f64, f64)) -> f64, to: impl Fn(&(f64, f64)) -> f64) -> f64 {
        let (Some(first), Some(last)) = (self.knots.first(), self.knots.last()) else {
            return v;
        };
        let mapped = if v <= from(first) {
            v + (to(first) - from(first))
        } else if v >= from(last) {
            v + (to(last) - from(last))
        } else {
            let i = self.knots.partition_point(|k| from(k) < v);
            let (a, b) = (&self.knots[i - 1], &self.knots[i]);
            let slope = (to(b) - to(a)) / (from(b) - from(a)).max(MIN_SLOPE_DENOMINATOR);
            to(a) + (v - from(a)) * slope
        };
        v + (mapped - v).clamp(-self.max_shift, self.max_shift)
    }

    /// Weighted root mean square residual of the anchors.
    pub fn wrmse(&self, anchors: &[AnchorPoint]) -> f64 {
        let mut total = 0.0;
        let mut weight = 0.0;
        for p in anchors {
            let err = self.correct(p.x) - p.y;
            total += err * err * p.weight;
            weight += p.weight;
        }
        if weight == 0.0 {
            f64::NAN
        } else {
            (total / weight).sqrt()
        }
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min.is_finite() && max.is_finite() {
        Some((min, max))
    } else {
        None
    }
}

/// A curve that fits the anchors worse than leaving the times alone is
/// rejected.
fn check_improvement(curve: DriftCurve, anchors: &[AnchorPoint]) -> Result<DriftCurve, DriftFitError> {
    let fitted = curve.wrmse(anchors);
    let identity = DriftCurve::identity().wrmse(anchors);
    if fitted > identity + WRMSE_SLACK {
        return Err(DriftFitError::NoImprovement { fitted, identity });
    }
    debug!(
        "Drift curve with {} knots from {} anchors, WRMSE {:.3}s (identity {:.3}s)",
        curve.knots.len(),
        anchors.len(),
        fitted,
        identity
    );
    Ok(curve)
}

/// Fits a drift curve through the anchors.
pub fn fit_drift_curve(
    anchors: &[AnchorPoint],
    grid_bins: usize,
    min_points: usize,
    max_shift: f64,
) -> Result<DriftCurve, DriftFitError> {
    if anchors.len() < min_points.max(2) {
        return Err(DriftFitError::InsufficientPoints(anchors.len()));
    }
    let x_range = finite_range(anchors.iter().map(|p| p.x)).ok_or(DriftFitError::ZeroRange)?;
    let y_range = finite_range(anchors.iter().map(|p| p.y)).ok_or(DriftFitError::ZeroRange)?;

    let cells = bin_anchors(anchors, grid_bins, x_range, y_range)?;
    let chain = heaviest_monotone_chain(dominant_cells(&cells));
    if chain.len() < 2 {
        return Err(DriftFitError::InsufficientPoints(chain.len()));
    }

    let curve = DriftCurve::from_knots(chain.iter().map(|p| (p.x, p.y)).collect(), max_shift);
    check_improvement(curve, anchors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shifted_anchors(n: usize, shift: impl Fn(f64) -> f64) -> Vec<AnchorPoint> {
        (0..n)
            .map(|i| {
                let x = 60.0 + i as f64 * 12.0;
                AnchorPoint {
                    x,
                    y: x + shift(x),
                    weight: 1.0,
                }
            })
            .collect()
    }

    fn anchor(x: f64, y: f64) -> AnchorPoint {
        AnchorPoint { x, y, weight: 1.0 }
    }

    #[test]
    fn test_constant_shift_is_recovered() {
        let anchors = shifted_anchors(40, |_| -5.0);
        let curve = fit_drift_curve(&anchors, 20, 10, 30.0).unwrap();
        for x in [30.0, 70.0, 200.0, 400.0, 700.0] {
            let err = curve.correct(x) - (x - 5.0);
            assert!(err.abs() < 1e-6, "{x}: {err}");
        }
        assert!(curve.wrmse(&anchors) < 1e-6);
    }

    #[test]
    fn test_curve_is_monotone_and_invertible() {
        let anchors = shifted_anchors(50, |x| 0.02 * x);
        let curve = fit_drift_curve(&anchors, 25, 10, 60.0).unwrap();
        let mut last = f64::NEG_INFINITY;
        for i in 0..700 {
            let x = i as f64;
            let y = curve.correct(x);
            assert!(y >= last);
            last = y;
            let back = curve.uncorrect(y);
            assert!((back - x).abs() < 1e-6, "{x} -> {y} -> {back}");
        }
    }

    #[test]
    fn test_shift_is_clamped() {
        let anchors = shifted_anchors(30, |_| 100.0);
        let curve = fit_drift_curve(&anchors, 10, 10, 5.0).unwrap();
        assert!((curve.correct(200.0) - 205.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_anchors() {
        let anchors = shifted_anchors(3, |_| 1.0);
        assert_eq!(
            fit_drift_curve(&anchors, 10, 10, 5.0),
            Err(DriftFitError::InsufficientPoints(3))
        );
        assert_eq!(DriftCurve::identity().correct(12.5), 12.5);
    }

    #[test]
    fn test_path_ignores_outliers() {
        let mut anchors = shifted_anchors(40, |_| 0.0);
        anchors.push(anchor(100.0, 500.0));
        let curve = fit_drift_curve(&anchors, 20, 10, 1000.0).unwrap();
        for x in [100.0, 300.0, 500.0] {
            assert!((curve.correct(x) - x).abs() < 1e-6, "{x}");
        }
    }

    #[test]
    fn test_unequal_axis_ranges_keep_knots_on_the_anchors() {
        // True shift +3 s. The two off-trend anchors stretch the reference
        // axis well past the sample axis.
        let mut anchors: Vec<AnchorPoint> = (0..60)
            .map(|i| {
                let x = 60.0 + i as f64 * 10.0;
                anchor(x, x + 3.0)
            })
            .collect();
        anchors.push(anchor(300.0, 325.0));
        anchors.push(anchor(645.0, 680.0));

        let curve = fit_drift_curve(&anchors, 50, 10, 30.0).unwrap();
        for x in (60..=650).step_by(5) {
            let x = x as f64;
            let err = curve.correct(x) - (x + 3.0);
            assert!(err.abs() < 0.5, "{x}: {err}");
        }
    }

    #[test]
    fn test_curve_worse_than_identity_is_rejected() {
        let anchors = shifted_anchors(20, |_| 0.0);
        let off = DriftCurve::from_knots(vec![(0.0, 20.0), (1000.0, 1020.0)], 30.0);
        assert!(matches!(
            check_improvement(off, &anchors),
            Err(DriftFitError::NoImprovement { .. })
        ));
        let exact = DriftCurve::from_knots(vec![(0.0, 0.0), (1000.0, 1000.0)], 30.0);
        assert!(check_improvement(exact, &anchors).is_ok());
    }

    #[test]
    fn test_cells_report_their_anchor_centroid() {
        let anchors = vec![anchor(10.0, 12.0), anchor(14.0, 16.0), anchor(90.0, 95.0)];
        let cells = bin_anchors(&anchors, 2, (10.0, 90.0), (12.0, 95.0)).unwrap();
        let mut kept = dominant_cells(&cells);
        kept.sort_by(|a, b| a.x.total_cmp(&b.x));
        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].x, kept[0].y, kept[0].weight), (12.0, 14.0, 2.0));
        assert_eq!((kept[1].x, kept[1].y), (90.0, 95.0));
    }
}
