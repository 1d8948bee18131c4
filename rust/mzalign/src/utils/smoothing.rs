/// Gaussian-weighted moving average over `window` points.
///
/// The kernel spans `window / 2` points on each side with
/// `sigma = window / 4`, and is renormalized at the edges so the ends of
/// the trace are not pulled towards zero. A window of 0 or 1 returns the
/// input unchanged. Even windows behave like the next odd one.
pub fn gaussian_smooth(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    if half == 0 || values.len() < 2 {
        return values.to_vec();
    }

    let sigma = (window as f64 / 4.0).max(0.5);
    let kernel: Vec<f64> = (0..=half)
        .map(|k| (-((k * k) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();

    let len = values.len();
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(len - 1);
        let mut acc = 0.0;
        let mut norm = 0.0;
        for (j, v) in values.iter().enumerate().take(hi + 1).skip(lo) {
            let w = kernel[i.abs_diff(j)];
            acc += w * v;
            norm += w;
        }
        out.push(acc / norm);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_one_is_identity() {
        let x = [1.0, 5.0, 2.0];
        assert_eq!(gaussian_smooth(&x, 1), x.to_vec());
        assert_eq!(gaussian_smooth(&x, 0), x.to_vec());
    }

    #[test]
    fn test_constant_trace_is_preserved() {
        let x = [3.0; 10];
        let out = gaussian_smooth(&x, 5);
        for v in out {
            assert!((v - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_spike_is_spread_and_keeps_apex() {
        let x = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
        let out = gaussian_smooth(&x, 3);
        assert!(out[3] < 10.0);
        assert!(out[2] > 0.0 && out[4] > 0.0);
        assert!((out[2] - out[4]).abs() < 1e-12);
        let argmax = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|x| x.0);
        assert_eq!(argmax, Some(3));
    }
}
