//! Validated per-asset time series.
//!
//! A [`TimeSeriesFrame`] is built by the feature-engineering collaborator and
//! consumed read-only by the engine. Construction enforces the data contract:
//! strictly increasing timestamps, consistent shapes, and (when availability
//! timestamps are supplied) no feature that becomes known after its row.
//! Transformations never mutate a frame; they return a new one.
//!
//! Adapters never receive a frame directly. They receive a [`FrameView`], a
//! borrowed row range with an optional column subset, so a model fitted on a
//! training window cannot read rows beyond it.

use std::collections::HashSet;
use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use polars::prelude::{DataFrame, DataType};

use crate::{AssetId, Date, Result, RondaError, Task};

/// Days between 0001-01-01 and the Unix epoch; polars stores dates as days since epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Prediction target of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Continuous values for forecasting pipelines.
    Continuous(Array1<f64>),
    /// Class labels in `0..n_classes` for classification pipelines.
    Categorical {
        /// Label per row.
        labels: Array1<usize>,
        /// Number of distinct classes the frame may contain.
        n_classes: usize,
    },
}

impl Target {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(values) => values.len(),
            Self::Categorical { labels, .. } => labels.len(),
        }
    }

    /// Whether the target has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The task implied by the target kind.
    pub const fn task(&self) -> Task {
        match self {
            Self::Continuous(_) => Task::Regression,
            Self::Categorical { .. } => Task::Classification,
        }
    }

    /// Number of classes, for categorical targets.
    pub const fn n_classes(&self) -> Option<usize> {
        match self {
            Self::Continuous(_) => None,
            Self::Categorical { n_classes, .. } => Some(*n_classes),
        }
    }

    fn slice(&self, rows: Range<usize>) -> Self {
        match self {
            Self::Continuous(values) => Self::Continuous(values.slice(s![rows]).to_owned()),
            Self::Categorical { labels, n_classes } => Self::Categorical {
                labels: labels.slice(s![rows]).to_owned(),
                n_classes: *n_classes,
            },
        }
    }
}

/// Column mapping used by [`TimeSeriesFrame::from_dataframe`].
#[derive(Debug, Clone)]
pub struct FrameColumns {
    /// Date column (polars `Date` or anything castable to days since epoch).
    pub date: String,
    /// Feature columns, in order.
    pub features: Vec<String>,
    /// Target column.
    pub target: String,
    /// Whether the target is continuous or categorical.
    pub task: Task,
}

/// Ordered, validated observations for one asset.
///
/// # Example
///
/// ```
/// use ndarray::{Array1, Array2};
/// use ronda_traits::{Date, Target, TimeSeriesFrame};
///
/// let timestamps: Vec<Date> = (1..=3)
///     .map(|d| Date::from_ymd_opt(2024, 1, d).unwrap())
///     .collect();
/// let frame = TimeSeriesFrame::new(
///     "AAPL",
///     timestamps,
///     vec!["ret_1d".to_string()],
///     Array2::zeros((3, 1)),
///     Target::Continuous(Array1::from_vec(vec![1.0, 2.0, 3.0])),
/// )
/// .unwrap();
/// assert_eq!(frame.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    asset: AssetId,
    timestamps: Vec<Date>,
    feature_names: Vec<String>,
    features: Array2<f64>,
    target: Target,
    available_at: Option<Vec<Date>>,
}

impl TimeSeriesFrame {
    /// Creates a validated frame.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] when the frame is empty,
    /// shapes disagree, timestamps are not strictly increasing, feature names
    /// repeat, or categorical labels fall outside `0..n_classes`.
    pub fn new(
        asset: impl Into<AssetId>,
        timestamps: Vec<Date>,
        feature_names: Vec<String>,
        features: Array2<f64>,
        target: Target,
    ) -> Result<Self> {
        let frame = Self {
            asset: asset.into(),
            timestamps,
            feature_names,
            features,
            target,
            available_at: None,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Attaches per-row feature availability timestamps.
    ///
    /// Row `t` is leak-free when its features were available at or before
    /// `timestamps[t]`.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] when any feature row
    /// becomes available after its own timestamp.
    pub fn with_availability(mut self, available_at: Vec<Date>) -> Result<Self> {
        self.available_at = Some(available_at);
        self.validate()?;
        Ok(self)
    }

    /// Builds a frame from a polars DataFrame.
    ///
    /// Missing feature or target values become `NaN` and are rejected later by
    /// adapters that cannot train on them.
    ///
    /// # Errors
    ///
    /// Returns a polars error for missing or non-castable columns and
    /// [`RondaError::DataContractViolation`] for invalid dates, negative class
    /// labels, or any violation detected by [`validate`](Self::validate).
    pub fn from_dataframe(
        asset: impl Into<AssetId>,
        df: &DataFrame,
        columns: &FrameColumns,
    ) -> Result<Self> {
        let days = df
            .column(&columns.date)?
            .as_materialized_series()
            .cast(&DataType::Int32)?;
        let timestamps = days
            .i32()?
            .into_iter()
            .enumerate()
            .map(|(row, d)| {
                d.and_then(|d| Date::from_num_days_from_ce_opt(d + UNIX_EPOCH_DAYS_FROM_CE))
                    .ok_or_else(|| {
                        RondaError::DataContractViolation(format!(
                            "row {row}: missing or invalid date in column '{}'",
                            columns.date
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut features = Array2::from_elem((timestamps.len(), columns.features.len()), f64::NAN);
        for (j, name) in columns.features.iter().enumerate() {
            for (i, value) in float_column(df, name)?.into_iter().enumerate() {
                features[[i, j]] = value;
            }
        }

        let target = match columns.task {
            Task::Regression => Target::Continuous(Array1::from_vec(float_column(
                df,
                &columns.target,
            )?)),
            Task::Classification => {
                let raw = df
                    .column(&columns.target)?
                    .as_materialized_series()
                    .cast(&DataType::Int64)?;
                let labels = raw
                    .i64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, label)| match label {
                        Some(label) if label >= 0 => Ok(label as usize),
                        _ => Err(RondaError::DataContractViolation(format!(
                            "row {row}: missing or negative class label"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let n_classes = labels.iter().max().map_or(2, |max| (max + 1).max(2));
                Target::Categorical {
                    labels: Array1::from_vec(labels),
                    n_classes,
                }
            }
        };

        Self::new(
            asset,
            timestamps,
            columns.features.clone(),
            features,
            target,
        )
    }

    /// Builds a classification frame whose label is whether the next price is higher.
    ///
    /// The final row has no observed next price, so it is dropped rather than
    /// labelled.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] when fewer than two rows
    /// are supplied or `prices` does not match the timestamps.
    pub fn direction_labels(
        asset: impl Into<AssetId>,
        timestamps: Vec<Date>,
        feature_names: Vec<String>,
        features: Array2<f64>,
        prices: &[f64],
    ) -> Result<Self> {
        let n = timestamps.len();
        if n < 2 || prices.len() != n {
            return Err(RondaError::DataContractViolation(format!(
                "direction labels need at least two rows and one price per row (rows: {n}, prices: {})",
                prices.len()
            )));
        }

        let labels: Array1<usize> = prices
            .windows(2)
            .map(|w| usize::from(w[1] > w[0]))
            .collect();

        Self::new(
            asset,
            timestamps[..n - 1].to_vec(),
            feature_names,
            features.slice(s![..n - 1, ..]).to_owned(),
            Target::Categorical {
                labels,
                n_classes: 2,
            },
        )
    }

    /// Checks the data contract.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] describing the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        let n = self.timestamps.len();
        let violation = |msg: String| {
            Err(RondaError::DataContractViolation(format!(
                "{}: {msg}",
                self.asset
            )))
        };

        if n == 0 {
            return violation("frame is empty".to_string());
        }
        if self.features.nrows() != n {
            return violation(format!(
                "feature matrix has {} rows, expected {n}",
                self.features.nrows()
            ));
        }
        if self.features.ncols() != self.feature_names.len() {
            return violation(format!(
                "feature matrix has {} columns but {} names",
                self.features.ncols(),
                self.feature_names.len()
            ));
        }
        if self.target.len() != n {
            return violation(format!(
                "target has {} rows, expected {n}",
                self.target.len()
            ));
        }

        let mut seen = HashSet::with_capacity(self.feature_names.len());
        if let Some(dup) = self.feature_names.iter().find(|name| !seen.insert(name.as_str())) {
            return violation(format!("duplicate feature name '{dup}'"));
        }

        if let Some(pos) = self.timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return violation(format!(
                "timestamps not strictly increasing at row {} ({} follows {})",
                pos + 1,
                self.timestamps[pos + 1],
                self.timestamps[pos]
            ));
        }

        if let Target::Categorical { labels, n_classes } = &self.target {
            if *n_classes < 2 {
                return violation(format!("categorical target needs at least 2 classes, got {n_classes}"));
            }
            if let Some(row) = labels.iter().position(|&label| label >= *n_classes) {
                return violation(format!(
                    "row {row}: label {} outside 0..{n_classes}",
                    labels[row]
                ));
            }
        }

        if let Some(available_at) = &self.available_at {
            if available_at.len() != n {
                return violation(format!(
                    "{} availability timestamps for {n} rows",
                    available_at.len()
                ));
            }
            if let Some(row) = available_at
                .iter()
                .zip(&self.timestamps)
                .position(|(available, stamp)| available > stamp)
            {
                return violation(format!(
                    "row {row}: features available at {} after row timestamp {}",
                    available_at[row], self.timestamps[row]
                ));
            }
        }

        Ok(())
    }

    /// Returns the asset identifier.
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Returns the ordered timestamps.
    pub fn timestamps(&self) -> &[Date] {
        &self.timestamps
    }

    /// Returns the feature names.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Returns the full feature matrix.
    pub const fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Returns the target.
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the task implied by the target.
    pub const fn task(&self) -> Task {
        self.target.task()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the frame has no rows. Validated frames never are.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Column index of a feature.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Borrows a row range.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the range is reversed or
    /// extends beyond the frame.
    pub fn view(&self, rows: Range<usize>) -> Result<FrameView<'_>> {
        if rows.start > rows.end || rows.end > self.len() {
            return Err(RondaError::InvalidConfig(format!(
                "row range {rows:?} outside frame of {} rows",
                self.len()
            )));
        }
        Ok(FrameView {
            frame: self,
            rows,
            columns: None,
        })
    }

    /// Returns a new frame restricted to a row range.
    ///
    /// # Errors
    ///
    /// Returns an error when the range is invalid or empty.
    pub fn slice(&self, rows: Range<usize>) -> Result<Self> {
        self.view(rows.clone())?;
        let frame = Self {
            asset: self.asset.clone(),
            timestamps: self.timestamps[rows.clone()].to_vec(),
            feature_names: self.feature_names.clone(),
            features: self.features.slice(s![rows.clone(), ..]).to_owned(),
            target: self.target.slice(rows.clone()),
            available_at: self.available_at.as_ref().map(|a| a[rows].to_vec()),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Returns a new frame with the last `n` rows (all rows when `n` exceeds the length).
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] when `n` is zero.
    pub fn tail(&self, n: usize) -> Result<Self> {
        let len = self.len();
        self.slice(len.saturating_sub(n)..len)
    }

    /// Returns a new frame keeping only the named features, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for unknown feature names.
    pub fn select_features(&self, names: &[&str]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.feature_index(name).ok_or_else(|| {
                    RondaError::InvalidConfig(format!("unknown feature '{name}' for {}", self.asset))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let frame = Self {
            asset: self.asset.clone(),
            timestamps: self.timestamps.clone(),
            feature_names: names.iter().map(|n| (*n).to_string()).collect(),
            features: self.features.select(Axis(1), &indices),
            target: self.target.clone(),
            available_at: self.available_at.clone(),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Returns a new frame whose continuous target is differenced `order` times.
    ///
    /// Each differencing pass drops the first row of every column so features
    /// stay aligned with the differenced target.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for categorical targets or when
    /// the frame has no more than `order` rows.
    pub fn difference(&self, order: usize) -> Result<Self> {
        let Target::Continuous(values) = &self.target else {
            return Err(RondaError::InvalidConfig(
                "cannot difference a categorical target".to_string(),
            ));
        };
        if self.len() <= order {
            return Err(RondaError::InvalidConfig(format!(
                "cannot difference {} rows {order} times",
                self.len()
            )));
        }

        let mut diffed = values.to_vec();
        for _ in 0..order {
            diffed = diffed.windows(2).map(|w| w[1] - w[0]).collect();
        }

        let frame = Self {
            asset: self.asset.clone(),
            timestamps: self.timestamps[order..].to_vec(),
            feature_names: self.feature_names.clone(),
            features: self.features.slice(s![order.., ..]).to_owned(),
            target: Target::Continuous(Array1::from_vec(diffed)),
            available_at: self.available_at.as_ref().map(|a| a[order..].to_vec()),
        };
        frame.validate()?;
        Ok(frame)
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// A borrowed window of a frame handed to adapters.
///
/// One-step-ahead prediction at validation row `i` may read the actual targets
/// of validation rows `< i`; those values were observed before row `i` was due.
#[derive(Debug, Clone)]
pub struct FrameView<'a> {
    frame: &'a TimeSeriesFrame,
    rows: Range<usize>,
    columns: Option<Vec<usize>>,
}

impl<'a> FrameView<'a> {
    /// Restricts the view to a subset of feature columns (frame column indices).
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for out-of-range column indices.
    pub fn with_columns(mut self, columns: Vec<usize>) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|&&c| c >= self.frame.n_features()) {
            return Err(RondaError::InvalidConfig(format!(
                "feature column {bad} outside 0..{}",
                self.frame.n_features()
            )));
        }
        self.columns = Some(columns);
        Ok(self)
    }

    /// Returns the asset identifier.
    pub fn asset(&self) -> &'a str {
        let frame: &'a TimeSeriesFrame = self.frame;
        frame.asset()
    }

    /// Row range within the parent frame.
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Number of rows in the view.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the view has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Task of the parent frame.
    pub const fn task(&self) -> Task {
        self.frame.task()
    }

    /// Timestamps of the viewed rows.
    pub fn timestamps(&self) -> &'a [Date] {
        let frame: &'a TimeSeriesFrame = self.frame;
        &frame.timestamps[self.rows.clone()]
    }

    /// Selected frame column indices, or `None` when all columns are visible.
    pub fn columns(&self) -> Option<&[usize]> {
        self.columns.as_deref()
    }

    /// Number of visible feature columns.
    pub fn n_features(&self) -> usize {
        self.columns
            .as_ref()
            .map_or(self.frame.n_features(), Vec::len)
    }

    /// Names of the visible feature columns.
    pub fn feature_names(&self) -> Vec<&'a str> {
        let frame: &'a TimeSeriesFrame = self.frame;
        match &self.columns {
            None => frame.feature_names.iter().map(String::as_str).collect(),
            Some(cols) => cols.iter().map(|&c| frame.feature_names[c].as_str()).collect(),
        }
    }

    /// Visible features of the viewed rows, as an owned matrix.
    pub fn features(&self) -> Array2<f64> {
        let rows = self.frame.features.slice(s![self.rows.clone(), ..]);
        match &self.columns {
            None => rows.to_owned(),
            Some(cols) => rows.select(Axis(1), cols),
        }
    }

    /// Continuous target of the viewed rows.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] for categorical frames.
    pub fn continuous_target(&self) -> Result<ArrayView1<'a, f64>> {
        let frame: &'a TimeSeriesFrame = self.frame;
        match &frame.target {
            Target::Continuous(values) => Ok(values.slice(s![self.rows.clone()])),
            Target::Categorical { .. } => Err(RondaError::DataContractViolation(format!(
                "{}: continuous target required, frame is categorical",
                frame.asset
            ))),
        }
    }

    /// Class labels of the viewed rows.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::DataContractViolation`] for continuous frames.
    pub fn labels(&self) -> Result<ArrayView1<'a, usize>> {
        let frame: &'a TimeSeriesFrame = self.frame;
        match &frame.target {
            Target::Categorical { labels, .. } => Ok(labels.slice(s![self.rows.clone()])),
            Target::Continuous(_) => Err(RondaError::DataContractViolation(format!(
                "{}: categorical target required, frame is continuous",
                frame.asset
            ))),
        }
    }

    /// Number of classes for categorical frames.
    pub const fn n_classes(&self) -> Option<usize> {
        self.frame.target.n_classes()
    }

    /// Target values as `f64`, whichever the target kind.
    pub fn target_values(&self) -> Vec<f64> {
        match &self.frame.target {
            Target::Continuous(values) => values.slice(s![self.rows.clone()]).to_vec(),
            Target::Categorical { labels, .. } => labels
                .slice(s![self.rows.clone()])
                .iter()
                .map(|&l| l as f64)
                .collect(),
        }
    }

    /// Ensures the view can be trained on.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when the view has fewer than
    /// `min_rows` rows or any visible feature or continuous target is not finite.
    pub fn ensure_trainable(&self, min_rows: usize) -> Result<()> {
        if self.len() < min_rows {
            return Err(RondaError::ModelFit(format!(
                "{}: {} training rows, need at least {min_rows}",
                self.asset(),
                self.len()
            )));
        }
        if let Some((row, col)) = self
            .features()
            .indexed_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(idx, _)| idx)
        {
            return Err(RondaError::ModelFit(format!(
                "{}: non-finite feature at training row {row}, column {col}",
                self.asset()
            )));
        }
        if let Ok(target) = self.continuous_target()
            && let Some(row) = target.iter().position(|v| !v.is_finite())
        {
            return Err(RondaError::ModelFit(format!(
                "{}: non-finite target at training row {row}",
                self.asset()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    fn frame(n: usize) -> TimeSeriesFrame {
        let features = Array2::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f64);
        let target = Target::Continuous(Array1::from_shape_fn(n, |i| (i * i) as f64));
        TimeSeriesFrame::new(
            "TEST",
            dates(n),
            vec!["a".to_string(), "b".to_string()],
            features,
            target,
        )
        .unwrap()
    }

    #[test]
    fn test_new_valid_frame() {
        let f = frame(5);
        assert_eq!(f.len(), 5);
        assert_eq!(f.n_features(), 2);
        assert_eq!(f.task(), Task::Regression);
        assert_eq!(f.asset(), "TEST");
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let mut stamps = dates(4);
        stamps.swap(1, 2);
        let result = TimeSeriesFrame::new(
            "TEST",
            stamps,
            vec![],
            Array2::zeros((4, 0)),
            Target::Continuous(Array1::zeros(4)),
        );
        assert!(matches!(result, Err(RondaError::DataContractViolation(_))));
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let mut stamps = dates(3);
        stamps[2] = stamps[1];
        let result = TimeSeriesFrame::new(
            "TEST",
            stamps,
            vec![],
            Array2::zeros((3, 0)),
            Target::Continuous(Array1::zeros(3)),
        );
        assert!(matches!(result, Err(RondaError::DataContractViolation(_))));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let result = TimeSeriesFrame::new(
            "TEST",
            dates(3),
            vec!["a".to_string()],
            Array2::zeros((2, 1)),
            Target::Continuous(Array1::zeros(3)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_label_out_of_range() {
        let result = TimeSeriesFrame::new(
            "TEST",
            dates(3),
            vec![],
            Array2::zeros((3, 0)),
            Target::Categorical {
                labels: Array1::from_vec(vec![0, 1, 2]),
                n_classes: 2,
            },
        );
        assert!(matches!(result, Err(RondaError::DataContractViolation(_))));
    }

    #[test]
    fn test_availability_leak_detected() {
        let stamps = dates(3);
        let mut available = stamps.clone();
        available[1] = stamps[2];
        let result = frame(3).with_availability(available);
        assert!(matches!(result, Err(RondaError::DataContractViolation(_))));

        let ok = frame(3).with_availability(dates(3));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_view_bounds() {
        let f = frame(10);
        let view = f.view(2..5).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.timestamps().len(), 3);
        assert_eq!(view.continuous_target().unwrap().to_vec(), vec![4.0, 9.0, 16.0]);
        assert!(f.view(5..11).is_err());
    }

    #[test]
    fn test_view_columns() {
        let f = frame(4);
        let view = f.view(0..4).unwrap().with_columns(vec![1]).unwrap();
        assert_eq!(view.n_features(), 1);
        assert_eq!(view.feature_names(), vec!["b"]);
        let x = view.features();
        assert_eq!(x.shape(), &[4, 1]);
        assert_relative_eq!(x[[2, 0]], 21.0);
        assert!(f.view(0..4).unwrap().with_columns(vec![2]).is_err());
    }

    #[test]
    fn test_ensure_trainable() {
        let f = frame(6);
        assert!(f.view(0..6).unwrap().ensure_trainable(5).is_ok());
        assert!(matches!(
            f.view(0..3).unwrap().ensure_trainable(5),
            Err(RondaError::ModelFit(_))
        ));

        let mut features = Array2::zeros((3, 1));
        features[[1, 0]] = f64::NAN;
        let bad = TimeSeriesFrame::new(
            "NAN",
            dates(3),
            vec!["x".to_string()],
            features,
            Target::Continuous(Array1::zeros(3)),
        )
        .unwrap();
        assert!(matches!(
            bad.view(0..3).unwrap().ensure_trainable(1),
            Err(RondaError::ModelFit(_))
        ));
    }

    #[test]
    fn test_difference_produces_new_frame() {
        let f = frame(5);
        let d = f.difference(1).unwrap();
        assert_eq!(d.len(), 4);
        assert_eq!(d.timestamps()[0], f.timestamps()[1]);
        match d.target() {
            Target::Continuous(values) => assert_eq!(values.to_vec(), vec![1.0, 3.0, 5.0, 7.0]),
            Target::Categorical { .. } => panic!("expected continuous"),
        }
        // source untouched
        assert_eq!(f.len(), 5);

        let d2 = f.difference(2).unwrap();
        match d2.target() {
            Target::Continuous(values) => assert_eq!(values.to_vec(), vec![2.0, 2.0, 2.0]),
            Target::Categorical { .. } => panic!("expected continuous"),
        }
    }

    #[test]
    fn test_select_features() {
        let f = frame(3);
        let selected = f.select_features(&["b"]).unwrap();
        assert_eq!(selected.feature_names(), &["b".to_string()]);
        assert_relative_eq!(selected.features()[[1, 0]], 11.0);
        assert!(f.select_features(&["missing"]).is_err());
    }

    #[test]
    fn test_slice() {
        let f = frame(6);
        let s = f.slice(2..4).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.timestamps()[0], f.timestamps()[2]);
        assert!(f.slice(3..3).is_err());
    }

    #[test]
    fn test_tail() {
        let f = frame(5);
        let t = f.tail(2).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.timestamps()[0], f.timestamps()[3]);
        assert_eq!(f.tail(10).unwrap().len(), 5);
        assert!(f.tail(0).is_err());
    }

    #[test]
    fn test_direction_labels_drop_last_row() {
        let prices = [10.0, 11.0, 10.5, 10.5, 12.0];
        let f = TimeSeriesFrame::direction_labels(
            "UP",
            dates(5),
            vec!["x".to_string()],
            Array2::zeros((5, 1)),
            &prices,
        )
        .unwrap();
        assert_eq!(f.len(), 4);
        assert_eq!(f.task(), Task::Classification);
        assert_eq!(f.view(0..4).unwrap().labels().unwrap().to_vec(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_from_dataframe() {
        use polars::prelude::*;

        let df = df! {
            "date" => dates(3),
            "x" => &[1.0, 2.0, 3.0],
            "y" => &[0.1, 0.2, 0.3],
        }
        .unwrap();
        let columns = FrameColumns {
            date: "date".to_string(),
            features: vec!["x".to_string()],
            target: "y".to_string(),
            task: Task::Regression,
        };
        let f = TimeSeriesFrame::from_dataframe("DF", &df, &columns).unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f.timestamps()[0], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_relative_eq!(f.features()[[2, 0]], 3.0);
    }
}
