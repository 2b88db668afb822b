//! Explicit evaluation context: the frames and adapters a pipeline runs over.

use std::collections::BTreeMap;
use std::sync::Arc;

use ronda_models::AdapterRegistry;
use ronda_traits::{AssetId, Result, RondaError, TimeSeriesFrame};

/// Asset-keyed collection of shared, read-only frames.
#[derive(Debug, Clone, Default)]
pub struct FrameRegistry {
    frames: BTreeMap<AssetId, Arc<TimeSeriesFrame>>,
}

impl FrameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a frame under its asset identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the asset is already present.
    pub fn insert(&mut self, frame: TimeSeriesFrame) -> Result<()> {
        let asset = frame.asset().to_string();
        if self.frames.contains_key(&asset) {
            return Err(RondaError::InvalidConfig(format!(
                "asset '{asset}' is already registered"
            )));
        }
        self.frames.insert(asset, Arc::new(frame));
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    pub fn with(mut self, frame: TimeSeriesFrame) -> Result<Self> {
        self.insert(frame)?;
        Ok(self)
    }

    /// Frame of one asset.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for unknown assets.
    pub fn get(&self, asset: &str) -> Result<Arc<TimeSeriesFrame>> {
        self.frames
            .get(asset)
            .cloned()
            .ok_or_else(|| RondaError::InvalidConfig(format!("unknown asset '{asset}'")))
    }

    /// Asset identifiers in order.
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Everything a pipeline reads: frames per asset and the adapter registry.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    /// Frames per asset
    pub frames: FrameRegistry,
    /// Registered model adapters
    pub adapters: AdapterRegistry,
}

impl EvaluationContext {
    /// Create a new context.
    pub const fn new(frames: FrameRegistry, adapters: AdapterRegistry) -> Self {
        Self { frames, adapters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use ndarray::{Array1, Array2};
    use ronda_traits::Target;

    fn frame(asset: &str) -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        TimeSeriesFrame::new(
            asset,
            (0..3).map(|i| start + Duration::days(i)).collect(),
            vec![],
            Array2::zeros((3, 0)),
            Target::Continuous(Array1::from_vec(vec![1.0, 2.0, 3.0])),
        )
        .unwrap()
    }

    #[test]
    fn test_frame_registry() {
        let frames = FrameRegistry::new()
            .with(frame("MSFT"))
            .unwrap()
            .with(frame("AAPL"))
            .unwrap();
        assert_eq!(frames.assets().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
        assert_eq!(frames.get("AAPL").unwrap().len(), 3);
        assert!(matches!(frames.get("TSLA"), Err(RondaError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_asset() {
        let mut frames = FrameRegistry::new();
        frames.insert(frame("AAPL")).unwrap();
        assert!(frames.insert(frame("AAPL")).is_err());
        assert_eq!(frames.len(), 1);
    }
}
