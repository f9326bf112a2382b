//! Store factory registry

use keel_db::StoreFactory;
use std::collections::HashMap;

/// Mapping from schema name to the factory that opens its store.
///
/// Built once and handed to [`crate::Runner::new`]; never mutated afterwards.
#[derive(Default)]
pub struct StoreFactories {
    factories: HashMap<String, Box<dyn StoreFactory>>,
}

impl StoreFactories {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `schema`, replacing any previous one.
    pub fn register(mut self, schema: impl Into<String>, factory: impl StoreFactory + 'static) -> Self {
        self.factories.insert(schema.into(), Box::new(factory));
        self
    }

    /// Factory for `schema`, if registered.
    pub fn get(&self, schema: &str) -> Option<&dyn StoreFactory> {
        self.factories.get(schema).map(|f| f.as_ref())
    }

    /// Registered schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
