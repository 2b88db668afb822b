//! Adapter registry for discovering and grouping available models.
//!
//! The registry is an explicit value built by the caller and passed into the
//! evaluation context; nothing registers itself globally.

use std::collections::BTreeMap;
use std::sync::Arc;

use ronda_traits::{Capability, ModelAdapter, ModelFamily, Result, RondaError, SearchSpace, Task};
use serde::{Deserialize, Serialize};

const CAPABILITIES: [Capability; 5] = [
    Capability::PointForecast,
    Capability::PredictionInterval,
    Capability::ClassProbabilities,
    Capability::MultiStep,
    Capability::Stochastic,
];

/// Metadata about a registered adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Unique model name
    pub name: String,

    /// Family classification
    pub family: ModelFamily,

    /// Regression or classification
    pub task: Task,

    /// Human-readable family description
    pub description: String,

    /// Declared capabilities
    pub capabilities: Vec<Capability>,

    /// Longest horizon served, `None` when unbounded
    pub max_horizon: Option<usize>,
}

#[derive(Debug, Clone)]
struct Entry {
    adapter: Arc<dyn ModelAdapter>,
    space: SearchSpace,
}

/// Name-keyed collection of adapters and their search spaces.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    entries: BTreeMap<String, Entry>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter with its default search space.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the name is taken or the
    /// adapter's default space is invalid.
    pub fn register<A: ModelAdapter + 'static>(&mut self, adapter: A) -> Result<()> {
        self.register_shared(Arc::new(adapter))
    }

    /// Registers an already shared adapter.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_shared(&mut self, adapter: Arc<dyn ModelAdapter>) -> Result<()> {
        let name = adapter.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(RondaError::InvalidConfig(format!(
                "model '{name}' is already registered"
            )));
        }
        let space = adapter.default_space();
        space.validate()?;
        self.entries.insert(name, Entry { adapter, space });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with<A: ModelAdapter + 'static>(mut self, adapter: A) -> Result<Self> {
        self.register(adapter)?;
        Ok(self)
    }

    /// Replaces the search space of a registered model.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::UnknownModel`] for unregistered names and
    /// [`RondaError::InvalidConfig`] for invalid spaces.
    pub fn set_space(&mut self, name: &str, space: SearchSpace) -> Result<()> {
        space.validate()?;
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| RondaError::UnknownModel(name.to_string()))?;
        entry.space = space;
        Ok(())
    }

    /// Looks up an adapter by name.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::UnknownModel`] when the name is not registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ModelAdapter>> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.adapter))
            .ok_or_else(|| RondaError::UnknownModel(name.to_string()))
    }

    /// Search space of a registered model.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::UnknownModel`] when the name is not registered.
    pub fn space(&self, name: &str) -> Result<&SearchSpace> {
        self.entries
            .get(name)
            .map(|e| &e.space)
            .ok_or_else(|| RondaError::UnknownModel(name.to_string()))
    }

    /// All adapters of one family, in name order.
    pub fn by_family(&self, family: ModelFamily) -> Vec<Arc<dyn ModelAdapter>> {
        self.entries
            .values()
            .filter(|e| e.adapter.family() == family)
            .map(|e| Arc::clone(&e.adapter))
            .collect()
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get information about all registered adapters.
    #[must_use]
    pub fn available_models(&self) -> Vec<AdapterInfo> {
        self.entries
            .values()
            .map(|e| {
                let adapter = &e.adapter;
                AdapterInfo {
                    name: adapter.name().to_string(),
                    family: adapter.family(),
                    task: adapter.task(),
                    description: adapter.family().description().to_string(),
                    capabilities: CAPABILITIES
                        .into_iter()
                        .filter(|c| adapter.supports(*c))
                        .collect(),
                    max_horizon: adapter.max_horizon(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markov::MarkovChainAdapter;
    use crate::statistical::{Autoregressive, StatisticalAdapter};

    fn registry() -> AdapterRegistry {
        AdapterRegistry::new()
            .with(StatisticalAdapter::with_defaults(Autoregressive))
            .unwrap()
            .with(MarkovChainAdapter::default())
            .unwrap()
    }

    #[test]
    fn test_lookup() {
        let reg = registry();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("arima").unwrap().family(), ModelFamily::Statistical);
        assert!(matches!(reg.get("prophet"), Err(RondaError::UnknownModel(_))));
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["arima", "markov_chain"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut reg = registry();
        let result = reg.register(MarkovChainAdapter::default());
        assert!(matches!(result, Err(RondaError::InvalidConfig(_))));
    }

    #[test]
    fn test_by_family() {
        let reg = registry();
        assert_eq!(reg.by_family(ModelFamily::Markov).len(), 1);
        assert!(reg.by_family(ModelFamily::DeepSequence).is_empty());
    }

    #[test]
    fn test_space_override() {
        let mut reg = registry();
        assert_eq!(reg.space("arima").unwrap().len(), 2);
        reg.set_space("arima", SearchSpace::new().int("order", 1, 2))
            .unwrap();
        assert_eq!(reg.space("arima").unwrap().len(), 1);
        assert!(reg.set_space("nope", SearchSpace::new()).is_err());
        assert!(
            reg.set_space("arima", SearchSpace::new().int("order", 3, 1))
                .is_err()
        );
    }

    #[test]
    fn test_available_models() {
        let info = registry().available_models();
        let arima = info.iter().find(|i| i.name == "arima").unwrap();
        assert!(arima.capabilities.contains(&Capability::PredictionInterval));
        assert!(!arima.description.is_empty());
        assert_eq!(arima.max_horizon, None);
    }
}
