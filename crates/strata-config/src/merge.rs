//! Combining the base and service layers.
//!
//! The merge is shallow: a top-level key present in the service layer
//! replaces the base value outright, whether it is a scalar, an array or a
//! nested table. Nested tables are never merged field by field.

use std::collections::BTreeMap;

use toml::{Table, Value};

use crate::{ConfigLayer, LayerName};

/// Result of merging layers, with the origin of every top-level key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedConfig {
    values: Table,
    origins: BTreeMap<String, LayerName>,
}

impl MergedConfig {
    /// Merge layers by name. Argument order does not matter: `Service`
    /// outranks `Base` regardless of position, and a later layer with the
    /// same name overrides an earlier one.
    pub fn from_layers(layers: &[ConfigLayer]) -> Self {
        let mut ordered: Vec<&ConfigLayer> = layers.iter().collect();
        // Stable sort keeps same-named layers in caller order.
        ordered.sort_by_key(|layer| layer.name);

        let mut merged = Self::default();
        for layer in ordered {
            merged.overlay(layer.name, &layer.values);
        }
        merged
    }

    fn overlay(&mut self, name: LayerName, values: &Table) {
        for (key, value) in values {
            self.values.insert(key.clone(), value.clone());
            self.origins.insert(key.clone(), name);
        }
    }

    /// The merged mapping.
    pub fn values(&self) -> &Table {
        &self.values
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Which layer supplied a top-level key.
    pub fn origin(&self, key: &str) -> Option<LayerName> {
        self.origins.get(key).copied()
    }

    /// Origins of all top-level keys, sorted by key.
    pub fn origins(&self) -> &BTreeMap<String, LayerName> {
        &self.origins
    }

    /// Consume into the raw mapping.
    pub fn into_values(self) -> Table {
        self.values
    }
}

/// Merge `service` over `base` at the top level.
pub fn merge_layers(base: &Table, service: &Table) -> Table {
    let mut merged = MergedConfig::default();
    merged.overlay(LayerName::Base, base);
    merged.overlay(LayerName::Service, service);
    merged.into_values()
}
