use serde::{
    Deserialize,
    Serialize,
};

pub const PROTON_MASS: f64 = 1.007276;
pub const C13_SPACING: f64 = 1.003355;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IonMode {
    #[default]
    Positive,
    Negative,
}

/// A named mass difference. For isotopes this is the spacing between
/// consecutive isotopologues (at charge 1), for adducts it is the mass
/// added to the neutral molecule to form the ion (already corrected for
/// the electron).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MassOffset {
    pub name: String,
    pub mass: f64,
}

impl MassOffset {
    pub fn new(name: &str, mass: f64) -> Self {
        Self {
            name: name.to_string(),
            mass,
        }
    }
}

pub fn default_isotope_spacings() -> Vec<MassOffset> {
    vec![
        MassOffset::new("13C", C13_SPACING),
        MassOffset::new("15N", 0.997035),
        MassOffset::new("2H", 1.006277),
        MassOffset::new("18O", 2.004246),
        MassOffset::new("34S", 1.995796),
        MassOffset::new("37Cl", 1.997050),
    ]
}

pub fn default_adducts(mode: IonMode) -> Vec<MassOffset> {
    match mode {
        IonMode::Positive => vec![
            MassOffset::new("[M+H]+", 1.007276),
            MassOffset::new("[M+Na]+", 22.989218),
            MassOffset::new("[M+K]+", 38.963158),
            MassOffset::new("[M+NH4]+", 18.033823),
            MassOffset::new("[M+H-H2O]+", -17.003289),
        ],
        IonMode::Negative => vec![
            MassOffset::new("[M-H]-", -1.007276),
            MassOffset::new("[M+Cl]-", 34.969402),
            MassOffset::new("[M+HCOO]-", 44.998201),
            MassOffset::new("[M+CH3COO]-", 59.013851),
            MassOffset::new("[M-H-H2O]-", -19.01839),
        ],
    }
}

/// Neutral mass of an ion observed at `mz`, assuming one copy of the
/// adduct per charge (`[M+2H]2+` for `[M+H]+` at charge 2).
pub fn neutral_mass(mz: f64, charge: u8, adduct: &MassOffset) -> f64 {
    (mz - adduct.mass) * charge.max(1) as f64
}
