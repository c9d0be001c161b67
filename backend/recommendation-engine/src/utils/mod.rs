// Utility functions for recommendation-engine

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Standardize scores; `epsilon` keeps a constant vector finite
pub fn z_scores(values: &[f64], epsilon: f64) -> Vec<f64> {
    let m = mean(values);
    let s = std_dev(values);
    values.iter().map(|v| (v - m) / (s + epsilon)).collect()
}

/// Round to the nearest integer, halves to the even neighbour
pub fn round_half_even(value: f64) -> f64 {
    let rounded = value.round();
    if (value - value.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - value.signum()
    } else {
        rounded
    }
}
