use super::peak::Peak;
use crate::params::Quantity;
use serde::Serialize;

/// Another isotope group of the same sample that looks like a different
/// adduct of the same neutral molecule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdductLink {
    pub group_id: usize,
    /// Adduct hypothesis for this group.
    pub adduct: String,
    /// Adduct hypothesis for the linked group.
    pub other_adduct: String,
    pub neutral_mass: f64,
}

/// A peak promoted to a per-sample feature, annotated with its isotope
/// group and adduct hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub sample_index: usize,
    /// Position in the sample's feature list.
    pub id: usize,
    pub peak: Peak,
    pub group_id: usize,
    /// 0 for the monoisotopic member.
    pub isotope_index: u8,
    /// Members of the isotope group, this feature included.
    pub group_size: usize,
    /// `None` when nothing constrains the charge (singletons).
    pub charge: Option<u8>,
    pub adduct: Option<String>,
    pub adduct_links: Vec<AdductLink>,
    pub is_representative: bool,
}

impl Feature {
    pub fn mz(&self) -> f64 {
        self.peak.mz
    }

    pub fn rt_seconds(&self) -> f64 {
        self.peak.apex_rt
    }

    pub fn intensity(&self) -> f64 {
        self.peak.apex_intensity
    }

    pub fn quantity(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Area => self.peak.area,
            Quantity::Height => self.peak.apex_intensity,
        }
    }
}
