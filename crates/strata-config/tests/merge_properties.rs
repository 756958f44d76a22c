//! Property tests for layer precedence.

use proptest::prelude::*;
use strata_config::{merge_layers, ConfigLayer, LayerName, MergedConfig};
use toml::{Table, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        any::<bool>().prop_map(Value::Boolean),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Table(m.into_iter().collect())),
        ]
    })
}

fn table() -> impl Strategy<Value = Table> {
    prop::collection::btree_map("[a-z]{1,6}", value(), 0..6).prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn disjoint_layers_merge_to_union(base in table(), service in table()) {
        let service: Table = service
            .into_iter()
            .filter(|(k, _)| !base.contains_key(k))
            .collect();
        let merged = merge_layers(&base, &service);

        prop_assert_eq!(merged.len(), base.len() + service.len());
        for (k, v) in base.iter().chain(service.iter()) {
            prop_assert_eq!(merged.get(k), Some(v));
        }
    }

    #[test]
    fn service_value_wins_for_shared_keys(base in table(), service in table()) {
        let merged = merge_layers(&base, &service);

        for (k, v) in &service {
            prop_assert_eq!(merged.get(k), Some(v));
        }
        for (k, v) in &base {
            if !service.contains_key(k) {
                prop_assert_eq!(merged.get(k), Some(v));
            }
        }
    }

    #[test]
    fn precedence_ignores_argument_order(base in table(), service in table()) {
        let base = ConfigLayer::loaded(LayerName::Base, "base.toml", base);
        let service = ConfigLayer::loaded(LayerName::Service, "svc.toml", service);

        let forward = MergedConfig::from_layers(&[base.clone(), service.clone()]);
        let reversed = MergedConfig::from_layers(&[service.clone(), base.clone()]);

        prop_assert_eq!(&forward, &reversed);
        prop_assert_eq!(forward.values(), &merge_layers(&base.values, &service.values));
    }
}
