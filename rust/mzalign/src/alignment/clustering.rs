use crate::models::tolerance::Tolerance;
use crate::utils::streaming_calculators::RunningStatsCalculator;

/// One representative feature, with its retention time already drift
/// corrected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterInput {
    pub sample: usize,
    pub feature_id: usize,
    pub mz: f64,
    pub rt: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    /// Indices into the input slice.
    pub members: Vec<usize>,
    pub mz: f64,
    pub rt: f64,
}

impl Cluster {
    fn seed(idx: usize, input: &ClusterInput) -> Self {
        Self {
            members: vec![idx],
            mz: input.mz,
            rt: input.rt,
        }
    }

    fn recompute(&mut self, inputs: &[ClusterInput]) {
        let mut mz = RunningStatsCalculator::default();
        let mut rt = RunningStatsCalculator::default();
        for &m in self.members.iter() {
            mz.add(inputs[m].intensity, inputs[m].mz);
            rt.add(inputs[m].intensity, inputs[m].rt);
        }
        if let (Some(mz), Some(rt)) = (mz.mean(), rt.mean()) {
            self.mz = mz;
            self.rt = rt;
        } else if let Some(&first) = self.members.first() {
            self.mz = inputs[first].mz;
            self.rt = inputs[first].rt;
        }
    }
}

/// Greedy clustering with at most one input per sample in each cluster.
///
/// Inputs are visited in a fixed total order: descending intensity, then
/// ascending m/z, sample and feature id. Each input joins the nearest
/// cluster whose centroid is within tolerance. When that cluster already
/// holds the same sample, the closer of the two stays and the other one
/// starts a cluster of its own.
pub fn greedy_cluster(inputs: &[ClusterInput], tolerance: &Tolerance) -> Vec<Cluster> {
    let mut visit: Vec<usize> = (0..inputs.len()).collect();
    visit.sort_by(|&a, &b| {
        let (x, y) = (&inputs[a], &inputs[b]);
        y.intensity
            .total_cmp(&x.intensity)
            .then_with(|| x.mz.total_cmp(&y.mz))
            .then_with(|| x.sample.cmp(&y.sample))
            .then_with(|| x.feature_id.cmp(&y.feature_id))
    });

    let mut clusters: Vec<Cluster> = Vec::new();
    // Cluster ids sorted by centroid m/z.
    let mut by_mz: Vec<usize> = Vec::new();

    for idx in visit {
        let input = &inputs[idx];
        let span = tolerance.mz.range(input.mz).width();
        let lo = by_mz.partition_point(|&c| clusters[c].mz < input.mz - span);
        let hi = lo + by_mz[lo..].partition_point(|&c| clusters[c].mz <= input.mz + span);

        let best = by_mz[lo..hi]
            .iter()
            .copied()
            .filter(|&c| tolerance.contains(clusters[c].mz, clusters[c].rt, input.mz, input.rt))
            .map(|c| {
                let d = tolerance.normalized_distance(clusters[c].mz, clusters[c].rt, input.mz, input.rt);
                (c, d)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let Some((c, distance)) = best else {
            insert_cluster(&mut clusters, &mut by_mz, Cluster::seed(idx, input));
            continue;
        };

        let rival = clusters[c]
            .members
            .iter()
            .position(|&m| inputs[m].sample == input.sample);
        let seed = match rival {
            None => {
                clusters[c].members.push(idx);
                None
            }
            Some(pos) => {
                let rival_idx = clusters[c].members[pos];
                let rival = &inputs[rival_idx];
                let rival_distance =
                    tolerance.normalized_distance(clusters[c].mz, clusters[c].rt, rival.mz, rival.rt);
                if distance < rival_distance {
                    clusters[c].members[pos] = idx;
                    Some(rival_idx)
                } else {
                    Some(idx)
                }
            }
        };

        if seed != Some(idx) {
            clusters[c].recompute(inputs);
            reposition(&clusters, &mut by_mz, c);
        }
        if let Some(s) = seed {
            insert_cluster(&mut clusters, &mut by_mz, Cluster::seed(s, &inputs[s]));
        }
    }
    clusters
}

fn insert_cluster(clusters: &mut Vec<Cluster>, by_mz: &mut Vec<usize>, cluster: Cluster) {
    let id = clusters.len();
    let mz = cluster.mz;
    clusters.push(cluster);
    let pos = by_mz.partition_point(|&c| clusters[c].mz < mz || (clusters[c].mz == mz && c < id));
    by_mz.insert(pos, id);
}

fn reposition(clusters: &[Cluster], by_mz: &mut Vec<usize>, id: usize) {
    if let Some(old) = by_mz.iter().position(|&c| c == id) {
        by_mz.remove(old);
    }
    let mz = clusters[id].mz;
    let pos = by_mz.partition_point(|&c| clusters[c].mz < mz || (clusters[c].mz == mz && c < id));
    by_mz.insert(pos, id);
}
