// registry.rs - Registry of fitness aggregation strategies

use super::traits::FitnessAggregation;
use super::{MinConsistency, SquaredSum};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_AGGREGATION: &str = "squared-sum";

pub struct AggregationRegistry {
    strategies: HashMap<String, Arc<dyn FitnessAggregation>>,
}

impl AggregationRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };

        registry.register("squared-sum", Arc::new(SquaredSum));
        registry.register("min-consistency", Arc::new(MinConsistency));

        registry
    }

    /// Register a new strategy
    pub fn register(&mut self, name: &str, strategy: Arc<dyn FitnessAggregation>) {
        self.strategies.insert(name.to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FitnessAggregation>> {
        self.strategies.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Names sorted for stable help output
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list(&self) -> Vec<(String, &'static str)> {
        let mut list: Vec<(String, &'static str)> = self
            .strategies
            .iter()
            .map(|(name, s)| (name.clone(), s.description()))
            .collect();
        list.sort();
        list
    }
}

impl Default for AggregationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
