/// Trapezoidal integral of `ys` over `xs`. Slices of different length are
/// truncated to the shorter one.
pub fn trapezoid_area(xs: &[f64], ys: &[f64]) -> f64 {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) * 0.5)
        .sum()
}

/// Median of the values, `None` when empty. Does not need sorted input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Pearson correlation. Returns `None` for fewer than two points or when
/// either side has no variance.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_a = a[..n].iter().sum::<f64>() / nf;
    let mean_b = b[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(b[..n].iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Mean of the `n` largest values (fewer if the slice is shorter).
pub fn mean_of_top_n(values: &[f64], n: usize) -> f64 {
    if values.is_empty() || n == 0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let take = n.min(sorted.len());
    sorted[..take].iter().sum::<f64>() / take as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trapezoid_triangle() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 0.0];
        assert_eq!(trapezoid_area(&xs, &ys), 10.0);
        assert_eq!(trapezoid_area(&xs[..1], &ys[..1]), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_pearson() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson_correlation(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson_correlation(&a, &c).unwrap() + 1.0).abs() < 1e-12);
        assert!(pearson_correlation(&a, &[1.0, 1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_mean_of_top_n() {
        assert_eq!(mean_of_top_n(&[1.0, 5.0, 3.0, 4.0], 3), 4.0);
        assert_eq!(mean_of_top_n(&[2.0], 3), 2.0);
    }
}
