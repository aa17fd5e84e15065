// src/core/biometrics/stats.rs
//! Thin wrappers over `statrs` that return 0 for empty input instead of NaN,
//! so extracted feature vectors never carry non-finite values.

use statrs::statistics::{Data, OrderStatistics, Statistics};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Statistics::mean(values)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Statistics::population_std_dev(values)
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Statistics::population_variance(values)
}

pub fn min(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Statistics::min(values)
}

pub fn max(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Statistics::max(values)
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).median()
}

/// Quantile using the statrs (R-8) estimator, `tau` in [0, 1].
pub fn quantile(values: &[f64], tau: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).quantile(tau.clamp(0.0, 1.0))
}

/// Mean, standard deviation, median, min and max, in that order.
pub fn summary(values: &[f64]) -> [f64; 5] {
    [mean(values), std_dev(values), median(values), min(values), max(values)]
}
