//! Isotope and adduct grouping within one sample.
//!
//! Peaks are nodes, mass-difference compatibilities are edges kept in an
//! adjacency list. Isotope edges are resolved into groups through
//! union-find; adduct relations only become cross-links between groups.

use crate::models::feature::{
    AdductLink,
    Feature,
};
use crate::models::mass_offsets::{
    neutral_mass,
    MassOffset,
    C13_SPACING,
};
use crate::models::peak::Peak;
use crate::params::GroupingParams;
use crate::utils::dsu::Dsu;
use crate::utils::math::pearson_correlation;
use std::collections::BTreeMap;
use tracing::debug;

/// Minimum shared scans before profile correlation is used as evidence.
const MIN_SHARED_SCANS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct IsotopeEdge {
    /// Lighter peak.
    lo: usize,
    /// Heavier peak.
    hi: usize,
    /// Bit `z` set when the spacing fits charge `z`.
    charges: u32,
}

fn lowest_charge(mask: u32) -> Option<u8> {
    if mask == 0 {
        None
    } else {
        Some(mask.trailing_zeros() as u8)
    }
}

#[derive(Debug, Clone)]
pub struct IsotopeAdductGrouper {
    params: GroupingParams,
    adducts: Vec<MassOffset>,
}

impl IsotopeAdductGrouper {
    pub fn new(params: GroupingParams) -> Self {
        let adducts = params.adduct_table();
        Self { params, adducts }
    }

    /// Groups the peaks of one sample and promotes them to features.
    ///
    /// Features come out sorted by retention time, then m/z; `Feature::id`
    /// is the position in that order.
    pub fn group(&self, sample_index: usize, mut peaks: Vec<Peak>) -> Vec<Feature> {
        peaks.sort_by(|a, b| {
            a.apex_rt
                .total_cmp(&b.apex_rt)
                .then_with(|| a.mz.total_cmp(&b.mz))
        });

        let edges = self.isotope_edges(&peaks);
        let (groups, charges) = resolve_charges(peaks.len(), edges);

        let mut group_of = vec![0usize; peaks.len()];
        let mut representative = vec![false; peaks.len()];
        let mut isotope_index = vec![0u8; peaks.len()];
        let mut group_size = vec![1usize; peaks.len()];
        let mut charge_of: Vec<Option<u8>> = vec![None; peaks.len()];

        for (group_id, members) in groups.iter().enumerate() {
            let charge = charges[group_id];
            let mono_mz = members
                .iter()
                .map(|&i| peaks[i].mz)
                .fold(f64::INFINITY, f64::min);
            let rep = members
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    peaks[a]
                        .apex_intensity
                        .total_cmp(&peaks[b].apex_intensity)
                        .then_with(|| peaks[b].mz.total_cmp(&peaks[a].mz))
                })
                .unwrap_or(members[0]);
            representative[rep] = true;
            for &i in members {
                group_of[i] = group_id;
                group_size[i] = members.len();
                charge_of[i] = charge;
                let z = charge.unwrap_or(1) as f64;
                let steps = ((peaks[i].mz - mono_mz) * z / C13_SPACING).round();
                isotope_index[i] = steps.clamp(0.0, u8::MAX as f64) as u8;
            }
        }

        let links = self.adduct_links(&peaks, &groups, &charges);
        let num_links: usize = links.iter().map(|l| l.len()).sum();
        debug!(
            "Sample {}: {} peaks in {} groups, {} adduct cross-links",
            sample_index,
            peaks.len(),
            groups.len(),
            num_links / 2
        );

        peaks
            .into_iter()
            .enumerate()
            .map(|(id, peak)| {
                let g = group_of[id];
                let adduct_links = links[g].clone();
                Feature {
                    sample_index,
                    id,
                    peak,
                    group_id: g,
                    isotope_index: isotope_index[id],
                    group_size: group_size[id],
                    charge: charge_of[id],
                    adduct: consensus_adduct(&adduct_links),
                    adduct_links,
                    is_representative: representative[id],
                }
            })
            .collect()
    }

    fn isotope_edges(&self, peaks: &[Peak]) -> Vec<IsotopeEdge> {
        let mut edges = Vec::new();
        for i in 0..peaks.len() {
            let rt_window = self.params.rt_tolerance.range(peaks[i].apex_rt);
            for j in (i + 1)..peaks.len() {
                if peaks[j].apex_rt > rt_window.end() {
                    break;
                }
                let (lo, hi) = if peaks[i].mz <= peaks[j].mz { (i, j) } else { (j, i) };
                let charges = self.compatible_charges(peaks[lo].mz, peaks[hi].mz);
                if charges == 0 || !self.coelutes(&peaks[lo], &peaks[hi]) {
                    continue;
                }
                edges.push(IsotopeEdge { lo, hi, charges });
            }
        }
        edges
    }

    fn compatible_charges(&self, lo_mz: f64, hi_mz: f64) -> u32 {
        let mut mask = 0u32;
        for z in 1..=self.params.max_charge.min(31) {
            for spacing in self.params.isotope_spacings.iter() {
                let expected = lo_mz + spacing.mass / z as f64;
                if self.params.mz_tolerance.range(expected).contains(hi_mz) {
                    mask |= 1 << z;
                }
            }
        }
        mask
    }

    fn coelutes(&self, a: &Peak, b: &Peak) -> bool {
        let (x, y) = a.shared_profile(b);
        if x.len() < MIN_SHARED_SCANS {
            return true;
        }
        match pearson_correlation(&x, &y) {
            Some(r) => r >= self.params.min_correlation,
            None => true,
        }
    }

    fn adduct_links(
        &self,
        peaks: &[Peak],
        groups: &[Vec<usize>],
        charges: &[Option<u8>],
    ) -> Vec<Vec<AdductLink>> {
        let mut links: Vec<Vec<AdductLink>> = vec![Vec::new(); groups.len()];
        // (rt, mono m/z) of each group, taken from its lightest member.
        let anchors: Vec<(f64, f64)> = groups
            .iter()
            .map(|members| {
                members
                    .iter()
                    .map(|&i| (peaks[i].apex_rt, peaks[i].mz))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .unwrap_or((f64::NAN, f64::NAN))
            })
            .collect();
        let mut by_rt: Vec<usize> = (0..groups.len()).collect();
        by_rt.sort_by(|&a, &b| anchors[a].0.total_cmp(&anchors[b].0).then_with(|| a.cmp(&b)));

        for (pos, &a) in by_rt.iter().enumerate() {
            let rt_window = self.params.rt_tolerance.range(anchors[a].0);
            for &b in by_rt[pos + 1..].iter() {
                if anchors[b].0 > rt_window.end() {
                    break;
                }
                let za = charges[a].unwrap_or(1);
                let zb = charges[b].unwrap_or(1);
                let found = self.adducts.iter().find_map(|xa| {
                    let mass_a = neutral_mass(anchors[a].1, za, xa);
                    let tol = self.params.mz_tolerance.range(mass_a);
                    self.adducts
                        .iter()
                        .filter(|xb| xb.name != xa.name)
                        .find(|xb| tol.contains(neutral_mass(anchors[b].1, zb, xb)))
                        .map(|xb| (xa, xb, mass_a))
                });
                if let Some((xa, xb, mass)) = found {
                    links[a].push(AdductLink {
                        group_id: b,
                        adduct: xa.name.clone(),
                        other_adduct: xb.name.clone(),
                        neutral_mass: mass,
                    });
                    links[b].push(AdductLink {
                        group_id: a,
                        adduct: xb.name.clone(),
                        other_adduct: xa.name.clone(),
                        neutral_mass: mass,
                    });
                }
            }
        }
        for group_links in links.iter_mut() {
            group_links.sort_by_key(|l| l.group_id);
        }
        links
    }
}

/// The adduct most of a group's cross-links agree on. `None` without
/// links or when the top hypotheses tie.
fn consensus_adduct(links: &[AdductLink]) -> Option<String> {
    let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
    for link in links {
        *votes.entry(link.adduct.as_str()).or_insert(0) += 1;
    }
    let top = votes.values().copied().max()?;
    let mut leaders = votes.iter().filter(|(_, &n)| n == top).map(|(name, _)| *name);
    match (leaders.next(), leaders.next()) {
        (Some(name), None) => Some(name.to_string()),
        _ => None,
    }
}

/// Connected components of the isotope graph with one charge per
/// component.
///
/// A component keeps the lowest charge shared by all its edges. When no
/// charge is shared, the charge fitting most edges wins (lowest on ties)
/// and the edges that disagree are cut before recomputing.
fn resolve_charges(n: usize, mut edges: Vec<IsotopeEdge>) -> (Vec<Vec<usize>>, Vec<Option<u8>>) {
    loop {
        let mut dsu = Dsu::new(n);
        for e in edges.iter() {
            dsu.union(e.lo, e.hi);
        }
        let groups = dsu.groups();
        let mut group_of = vec![0usize; n];
        for (g, members) in groups.iter().enumerate() {
            for &i in members {
                group_of[i] = g;
            }
        }

        let mut shared = vec![u32::MAX; groups.len()];
        let mut has_edges = vec![false; groups.len()];
        for e in edges.iter() {
            let g = group_of[e.lo];
            shared[g] &= e.charges;
            has_edges[g] = true;
        }

        let mut cut = false;
        for g in 0..groups.len() {
            if !has_edges[g] || shared[g] != 0 {
                continue;
            }
            let mut best: Option<(usize, u32)> = None;
            for z in 1..32u32 {
                let count = edges
                    .iter()
                    .filter(|e| group_of[e.lo] == g && e.charges & (1 << z) != 0)
                    .count();
                if count > 0 && best.map_or(true, |(c, _)| count > c) {
                    best = Some((count, z));
                }
            }
            if let Some((_, z)) = best {
                edges.retain(|e| group_of[e.lo] != g || e.charges & (1 << z) != 0);
                cut = true;
            }
        }

        if !cut {
            let charges = (0..groups.len())
                .map(|g| if has_edges[g] { lowest_charge(shared[g]) } else { None })
                .collect();
            return (groups, charges);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mass_offsets::IonMode;
    use crate::models::tolerance::{
        MzTolerance,
        RtTolerance,
    };

    fn peak(mz: f64, apex_rt: f64, height: f64, shape_seed: u32) -> Peak {
        let apex_scan = (apex_rt / 2.0) as usize;
        let profile: Vec<(usize, f64)> = (0..11)
            .map(|k| {
                let d = k as f64 - 5.0;
                let wobble = 1.0 + 0.05 * (((k as u32 * 7 + shape_seed) % 5) as f64 - 2.0) / 2.0;
                (apex_scan - 5 + k, height * (-(d * d) / 6.0).exp() * wobble)
            })
            .collect();
        Peak {
            roi_id: 0,
            mz,
            mz_std: 0.0,
            apex_scan,
            left_scan: apex_scan - 5,
            right_scan: apex_scan + 5,
            apex_rt,
            left_rt: apex_rt - 10.0,
            right_rt: apex_rt + 10.0,
            apex_intensity: height,
            top3_height: height,
            area: height * 10.0,
            snr: 100.0,
            symmetry: 1.0,
            width_scans: 11,
            profile,
        }
    }

    fn grouper() -> IsotopeAdductGrouper {
        IsotopeAdductGrouper::new(GroupingParams {
            mz_tolerance: MzTolerance::Absolute((0.003, 0.003)),
            rt_tolerance: RtTolerance::seconds(3.0, 3.0),
            max_charge: 3,
            min_correlation: 0.8,
            ion_mode: IonMode::Positive,
            ..GroupingParams::default()
        })
    }

    #[test]
    fn test_singly_charged_series() {
        let peaks = vec![
            peak(301.1410, 100.0, 2e5, 0),
            peak(302.1444, 100.0, 3e4, 1),
            peak(303.1477, 100.0, 4e3, 2),
            peak(450.2000, 300.0, 1e5, 3),
        ];
        let features = grouper().group(0, peaks);
        assert_eq!(features.len(), 4);
        let series: Vec<_> = features.iter().filter(|f| f.mz() < 400.0).collect();
        assert!(series.iter().all(|f| f.group_id == series[0].group_id));
        assert!(series.iter().all(|f| f.charge == Some(1) && f.group_size == 3));
        let idx: Vec<u8> = series.iter().map(|f| f.isotope_index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
        assert_eq!(series.iter().filter(|f| f.is_representative).count(), 1);
        assert!(series[0].is_representative);

        let lone = features.iter().find(|f| f.mz() > 400.0).unwrap();
        assert_ne!(lone.group_id, series[0].group_id);
        assert!(lone.is_representative);
        assert_eq!(lone.charge, None);
    }

    #[test]
    fn test_doubly_charged_series() {
        let peaks = vec![
            peak(500.2500, 80.0, 1e5, 0),
            peak(500.7517, 80.0, 6e4, 1),
            peak(501.2534, 80.0, 2e4, 2),
        ];
        let features = grouper().group(0, peaks);
        assert!(features.iter().all(|f| f.charge == Some(2)));
        assert_eq!(
            features.iter().map(|f| f.isotope_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_ambiguous_spacing_prefers_lowest_charge() {
        // 0.9975 fits 15N at z=1 and 34S at z=2.
        let peaks = vec![peak(200.0, 50.0, 1e5, 0), peak(200.9975, 50.0, 1e4, 1)];
        let features = grouper().group(0, peaks);
        assert_eq!(features[0].group_id, features[1].group_id);
        assert_eq!(features[0].charge, Some(1));
    }

    #[test]
    fn test_uncorrelated_profiles_are_not_isotopes() {
        let a = peak(301.1410, 100.0, 2e5, 0);
        let mut b = peak(302.1444, 100.0, 3e4, 1);
        // Flip the profile so it rises where the other falls.
        let values: Vec<f64> = b.profile.iter().map(|x| x.1).collect();
        for (k, p) in b.profile.iter_mut().enumerate() {
            p.1 = 3e4 - values[k] + (k as f64) * 1e3;
        }
        let features = grouper().group(0, vec![a, b]);
        assert_ne!(features[0].group_id, features[1].group_id);
    }

    #[test]
    fn test_adducts_are_linked_not_merged() {
        let neutral = 194.080376;
        let peaks = vec![
            peak(neutral + 1.007276, 120.0, 1e5, 0),
            peak(neutral + 22.989218, 121.0, 5e4, 1),
        ];
        let features = grouper().group(0, peaks);
        assert_ne!(features[0].group_id, features[1].group_id);
        assert!(features.iter().all(|f| f.is_representative));
        let h = features.iter().find(|f| f.mz() < 200.0).unwrap();
        assert_eq!(h.adduct.as_deref(), Some("[M+H]+"));
        assert_eq!(h.adduct_links.len(), 1);
        let na = features.iter().find(|f| f.mz() > 200.0).unwrap();
        assert_eq!(na.adduct.as_deref(), Some("[M+Na]+"));
        assert_eq!(na.adduct_links[0].group_id, h.group_id);
    }

    #[test]
    fn test_agreeing_links_set_the_adduct() {
        let neutral = 194.080376;
        let peaks = vec![
            peak(neutral + 1.007276, 120.0, 1e5, 0),
            peak(neutral + 22.989218, 120.5, 5e4, 1),
            peak(neutral + 38.963158, 121.0, 2e4, 2),
        ];
        let features = grouper().group(0, peaks);
        let names: Vec<Option<&str>> = features.iter().map(|f| f.adduct.as_deref()).collect();
        assert_eq!(names, vec![Some("[M+H]+"), Some("[M+Na]+"), Some("[M+K]+")]);
        assert!(features.iter().all(|f| f.adduct_links.len() == 2));
    }

    #[test]
    fn test_conflicting_links_leave_the_adduct_unset() {
        // 300.0 is [M+H]+ next to the first partner but [M+Na]+ next to
        // the second.
        let p = 300.0;
        let as_sodium = p - 1.007276 + 22.989218;
        let as_potassium = p - 22.989218 + 38.963158;
        let peaks = vec![
            peak(p, 60.0, 1e5, 0),
            peak(as_potassium, 60.0, 5e4, 1),
            peak(as_sodium, 60.0, 5e4, 2),
        ];
        let features = grouper().group(0, peaks);
        let center = features.iter().find(|f| (f.mz() - p).abs() < 1e-6).unwrap();
        assert_eq!(center.adduct_links.len(), 2);
        assert_eq!(center.adduct, None);
        let sodium = features.iter().find(|f| (f.mz() - as_sodium).abs() < 1e-6).unwrap();
        assert_eq!(sodium.adduct.as_deref(), Some("[M+Na]+"));
        let potassium = features.iter().find(|f| (f.mz() - as_potassium).abs() < 1e-6).unwrap();
        assert_eq!(potassium.adduct.as_deref(), Some("[M+K]+"));
    }

    #[test]
    fn test_adducts_outside_the_rt_window_are_not_linked() {
        let neutral = 194.080376;
        let peaks = vec![
            peak(neutral + 1.007276, 120.0, 1e5, 0),
            peak(neutral + 22.989218, 140.0, 5e4, 1),
        ];
        let features = grouper().group(0, peaks);
        assert!(features.iter().all(|f| f.adduct_links.is_empty() && f.adduct.is_none()));
    }

    #[test]
    fn test_conflicting_charges_cut_the_odd_edge() {
        let edges = vec![
            IsotopeEdge { lo: 0, hi: 1, charges: 1 << 1 },
            IsotopeEdge { lo: 1, hi: 2, charges: 1 << 1 },
            IsotopeEdge { lo: 2, hi: 3, charges: 1 << 2 },
        ];
        let (groups, charges) = resolve_charges(4, edges);
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3]]);
        assert_eq!(charges, vec![Some(1), None]);
    }
}
