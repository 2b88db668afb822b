//! Statistical helpers shared by adapters, metrics and ranking.
//!
//! Non-finite inputs propagate as `NaN` so callers can decide whether a
//! value is usable.

/// Minimum threshold for standard deviation to avoid division by zero.
/// Values below this threshold are treated as zero variance.
pub const MIN_STD_THRESHOLD: f64 = 1e-10;

/// Statistics used to standardise a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardizeResult {
    /// The computed mean of the input values.
    pub mean: f64,
    /// The computed sample standard deviation (N-1 denominator).
    pub std: f64,
    /// Whether scaling was applied (false if variance was too low).
    pub applied: bool,
}

impl StandardizeResult {
    /// Applies the stored transform to a new value.
    ///
    /// Adapters fit the statistics on training rows and reuse them on
    /// validation rows, so validation data never influences the scaling.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        if self.applied {
            (value - self.mean) / self.std
        } else {
            value - self.mean
        }
    }

    /// Reverses [`apply`](Self::apply).
    #[inline]
    pub fn invert(&self, value: f64) -> f64 {
        if self.applied {
            value * self.std + self.mean
        } else {
            value + self.mean
        }
    }
}

/// Standardize a slice of f64 values to z-scores (mean=0, std=1).
///
/// Uses sample standard deviation (N-1 denominator). If the standard deviation
/// is below [`MIN_STD_THRESHOLD`] the values are only centred.
///
/// # Edge Cases
///
/// - Empty input: returns an empty vector with mean=NaN, std=NaN
/// - Single value: returns [0.0] with std=0.0, applied=false
///
/// # Examples
///
/// ```
/// use ronda_traits::stats::standardize;
///
/// let (z, result) = standardize(&[1.0, 2.0, 3.0, 4.0, 5.0]);
/// assert!(result.applied);
/// assert!((result.mean - 3.0).abs() < 1e-10);
/// assert!(z[2].abs() < 1e-10);
/// ```
pub fn standardize(values: &[f64]) -> (Vec<f64>, StandardizeResult) {
    let (mean, std) = mean_std(values);
    let result = StandardizeResult {
        mean,
        std,
        applied: std > MIN_STD_THRESHOLD,
    };
    (values.iter().map(|&v| result.apply(v)).collect(), result)
}

/// Arithmetic mean and sample standard deviation.
///
/// Returns `(NaN, NaN)` for empty input and a standard deviation of `0.0` for
/// a single value.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    (mean, variance.sqrt())
}

/// Ranks starting at 1, ties receiving the average of the ranks they span.
///
/// # Examples
///
/// ```
/// use ronda_traits::stats::average_ranks;
///
/// assert_eq!(average_ranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
/// ```
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[indices[j + 1]] == values[indices[i]] {
            j += 1;
        }
        // positions i..=j share rank (i+1 + j+1) / 2
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &indices[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation; `NaN` when either side has zero variance or the
/// lengths differ.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return f64::NAN;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom < MIN_STD_THRESHOLD {
        f64::NAN
    } else {
        sxy / denom
    }
}

/// Linear-interpolated quantile of `values` at `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
