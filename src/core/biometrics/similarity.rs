// src/core/biometrics/similarity.rs
//! Vector metrics shared by the matchers. Callers check dimensionality
//! first; every function here assumes `a.len() == b.len()`.

const EPSILON: f64 = 1e-10;

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Cosine similarity; 0 when either vector has zero length.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let denominator = norm(a) * norm(b);
    if denominator < EPSILON {
        return 0.0;
    }
    dot(a, b) / denominator
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

pub fn manhattan(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Pearson correlation; a zero-variance input correlates at 0.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    if n < 2 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denominator = (var_a * var_b).sqrt();
    if denominator < EPSILON {
        return 0.0;
    }
    (covariance / denominator).clamp(-1.0, 1.0)
}

/// Maps a distance onto (0, 1].
pub fn inverse(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Maps a correlation from [-1, 1] onto [0, 1].
pub fn rescale_correlation(correlation: f64) -> f64 {
    (correlation + 1.0) / 2.0
}

/// Scales `values` to unit length in place; zero vectors are left alone.
pub fn l2_normalize(values: &mut [f64]) {
    let length = norm(values);
    if length > EPSILON {
        values.iter_mut().for_each(|v| *v /= length);
    }
}

/// Zero-pads or truncates to exactly `len` entries.
pub fn fit_length(mut values: Vec<f64>, len: usize) -> Vec<f64> {
    values.resize(len, 0.0);
    values
}
