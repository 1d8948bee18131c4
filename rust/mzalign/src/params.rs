//! Configuration for every stage of the engine.
//!
//! All structs deserialize from JSON with per-field defaults, so a config
//! file only needs to mention what it changes. [`PipelineParams::validate`]
//! is the single place where values are checked; the stages themselves
//! trust what they are given.

use crate::errors::ParameterError;
use crate::models::mass_offsets::{
    default_adducts,
    default_isotope_spacings,
    IonMode,
    MassOffset,
};
use crate::models::tolerance::{
    check_positive,
    MzTolerance,
    RtTolerance,
    Tolerance,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoiParams {
    pub mz_tolerance: MzTolerance,
    /// Points below this intensity are treated as absent.
    pub min_intensity: f64,
    /// Minimum number of observed scans for a ROI to be kept.
    pub min_length: usize,
    /// Consecutive scans a ROI may go unmatched before it is closed.
    pub max_gap: usize,
    /// Optional retention time window (seconds) to restrict the sweep to.
    pub rt_range: Option<(f64, f64)>,
}

impl Default for RoiParams {
    fn default() -> Self {
        Self {
            mz_tolerance: MzTolerance::Absolute((0.01, 0.01)),
            min_intensity: 1000.0,
            min_length: 5,
            max_gap: 2,
            rt_range: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PeakPickingParams {
    /// Width (in scans) of the smoothing kernel. 1 disables smoothing.
    pub smoothing_window: usize,
    pub min_height: f64,
    pub min_snr: f64,
    pub min_width_scans: usize,
    /// Boundaries stop once the smoothed trace falls to this fraction of
    /// the apex.
    pub boundary_fraction: f64,
    /// Neighbouring maxima separated by a valley higher than this fraction
    /// of the lower apex are treated as one peak.
    pub valley_merge_ratio: f64,
    /// Lower bound for the noise estimate used in S/N.
    pub noise_floor: f64,
}

impl Default for PeakPickingParams {
    fn default() -> Self {
        Self {
            smoothing_window: 3,
            min_height: 5000.0,
            min_snr: 3.0,
            min_width_scans: 3,
            boundary_fraction: 0.05,
            valley_merge_ratio: 0.8,
            noise_floor: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupingParams {
    pub mz_tolerance: MzTolerance,
    pub rt_tolerance: RtTolerance,
    pub max_charge: u8,
    /// Minimum profile correlation for two peaks to be isotopologues.
    pub min_correlation: f64,
    pub ion_mode: IonMode,
    pub isotope_spacings: Vec<MassOffset>,
    /// When empty, the default adduct table for `ion_mode` is used.
    pub adducts: Vec<MassOffset>,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            mz_tolerance: MzTolerance::Absolute((0.005, 0.005)),
            rt_tolerance: RtTolerance::seconds(3.0, 3.0),
            max_charge: 3,
            min_correlation: 0.8,
            ion_mode: IonMode::Positive,
            isotope_spacings: default_isotope_spacings(),
            adducts: Vec::new(),
        }
    }
}

impl GroupingParams {
    pub fn adduct_table(&self) -> Vec<MassOffset> {
        if self.adducts.is_empty() {
            default_adducts(self.ion_mode)
        } else {
            self.adducts.clone()
        }
    }
}

/// Which number goes into the per-sample slots of the feature table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    #[default]
    Area,
    Height,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlignmentParams {
    pub tolerance: Tolerance,
    /// Largest retention time correction applied to any sample. 0
    /// disables drift correction.
    pub max_rt_drift_seconds: f64,
    pub grid_bins: usize,
    pub min_anchor_points: usize,
    pub anchor_min_snr: f64,
    pub quantity: Quantity,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            tolerance: Tolerance {
                mz: MzTolerance::Absolute((0.01, 0.01)),
                rt: RtTolerance::seconds(6.0, 6.0),
            },
            max_rt_drift_seconds: 30.0,
            grid_bins: 50,
            min_anchor_points: 10,
            anchor_min_snr: 10.0,
            quantity: Quantity::Area,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GapFillParams {
    pub enabled: bool,
    /// Defaults to the alignment m/z tolerance.
    pub mz_tolerance: Option<MzTolerance>,
    pub rt_half_window_seconds: f64,
    /// Lenient floor; anything at or above it counts as signal.
    pub min_intensity: f64,
}

impl Default for GapFillParams {
    fn default() -> Self {
        Self {
            enabled: true,
            mz_tolerance: None,
            rt_half_window_seconds: 6.0,
            min_intensity: 300.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineParams {
    pub roi: RoiParams,
    pub peaks: PeakPickingParams,
    pub grouping: GroupingParams,
    pub alignment: AlignmentParams,
    pub gap_filling: GapFillParams,
    /// Worker threads for per-sample processing. `None` uses every core.
    pub threads: Option<usize>,
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ParameterError::OutOfRange {
            field,
            value,
            expected: "[0, 1)",
        })
    }
}

fn check_at_least_one(field: &'static str, value: usize) -> Result<(), ParameterError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ParameterError::OutOfRange {
            field,
            value: value as f64,
            expected: ">= 1",
        })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::OutOfRange {
            field,
            value,
            expected: ">= 0",
        })
    }
}

impl RoiParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.mz_tolerance.validate("roi.mz_tolerance")?;
        check_non_negative("roi.min_intensity", self.min_intensity)?;
        check_at_least_one("roi.min_length", self.min_length)?;
        if let Some((start, end)) = self.rt_range {
            if !(start.is_finite() && end.is_finite() && start < end) {
                return Err(ParameterError::Inconsistent(format!(
                    "roi.rt_range must be an increasing pair, got ({start}, {end})"
                )));
            }
        }
        Ok(())
    }
}

impl PeakPickingParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        check_at_least_one("peaks.smoothing_window", self.smoothing_window)?;
        check_positive("peaks.min_height", self.min_height)?;
        check_non_negative("peaks.min_snr", self.min_snr)?;
        check_at_least_one("peaks.min_width_scans", self.min_width_scans)?;
        check_fraction("peaks.boundary_fraction", self.boundary_fraction)?;
        if !(self.valley_merge_ratio.is_finite()
            && self.valley_merge_ratio > 0.0
            && self.valley_merge_ratio <= 1.0)
        {
            return Err(ParameterError::OutOfRange {
                field: "peaks.valley_merge_ratio",
                value: self.valley_merge_ratio,
                expected: "(0, 1]",
            });
        }
        check_positive("peaks.noise_floor", self.noise_floor)
    }
}

impl GroupingParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.mz_tolerance.validate("grouping.mz_tolerance")?;
        self.rt_tolerance.validate("grouping.rt_tolerance")?;
        check_at_least_one("grouping.max_charge", self.max_charge as usize)?;
        if !(self.min_correlation.is_finite() && (-1.0..=1.0).contains(&self.min_correlation)) {
            return Err(ParameterError::OutOfRange {
                field: "grouping.min_correlation",
                value: self.min_correlation,
                expected: "[-1, 1]",
            });
        }
        for offset in self.isotope_spacings.iter() {
            check_positive("grouping.isotope_spacings", offset.mass)?;
        }
        for offset in self.adducts.iter() {
            if !offset.mass.is_finite() {
                return Err(ParameterError::OutOfRange {
                    field: "grouping.adducts",
                    value: offset.mass,
                    expected: "finite mass",
                });
            }
        }
        Ok(())
    }
}

impl AlignmentParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.tolerance.validate("alignment.tolerance")?;
        check_non_negative("alignment.max_rt_drift_seconds", self.max_rt_drift_seconds)?;
        check_non_negative("alignment.anchor_min_snr", self.anchor_min_snr)?;
        if self.max_rt_drift_seconds > 0.0 {
            check_at_least_one("alignment.grid_bins", self.grid_bins)?;
            if self.min_anchor_points < 2 {
                return Err(ParameterError::OutOfRange {
                    field: "alignment.min_anchor_points",
                    value: self.min_anchor_points as f64,
                    expected: ">= 2",
                });
            }
        }
        Ok(())
    }
}

impl GapFillParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if let Some(tol) = &self.mz_tolerance {
            tol.validate("gap_filling.mz_tolerance")?;
        }
        check_positive("gap_filling.rt_half_window_seconds", self.rt_half_window_seconds)?;
        check_non_negative("gap_filling.min_intensity", self.min_intensity)
    }
}

impl PipelineParams {
    /// Checks every value and the relations between stages.
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.roi.validate()?;
        self.peaks.validate()?;
        self.grouping.validate()?;
        self.alignment.validate()?;
        self.gap_filling.validate()?;
        if let Some(threads) = self.threads {
            check_at_least_one("threads", threads)?;
        }
        if self.gap_filling.enabled && self.gap_filling.min_intensity > self.peaks.min_height {
            return Err(ParameterError::Inconsistent(format!(
                "gap_filling.min_intensity ({}) must not exceed peaks.min_height ({})",
                self.gap_filling.min_intensity, self.peaks.min_height
            )));
        }
        Ok(())
    }

    pub fn gap_fill_mz_tolerance(&self) -> MzTolerance {
        self.gap_filling
            .mz_tolerance
            .unwrap_or(self.alignment.tolerance.mz)
    }
}
