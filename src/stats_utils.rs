use statrs::statistics::{Data, Median};

/// Median of the input values
///
/// Even-length input returns the mean of the two central values. Empty input returns NaN, all
/// clonecn callers guarantee at least one value.
///
pub fn get_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    Data::new(values.to_vec()).median()
}

pub fn get_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
