//! Keyed list reconciliation.
//!
//! Given the children a chain currently holds (by key) and the new source
//! collection, decide which children survive, which are created and which
//! leave. Survivors keep their identity; only their item value and position
//! change.
//!
//! Reconciliation is a pure function over keys and handles so the runtime
//! can apply the plan (and fire hooks) in a fixed order:
//!
//! 1. Surviving children get their new element and position
//! 2. Entering children are created
//! 3. Enter hooks, then update hooks for all survivors in collection order
//! 4. Exit hooks, then destruction of exiting children
//!
//! # Example
//!
//! ```ignore
//! let existing = [(ItemKey::Field("1".into()), a), (ItemKey::Field("2".into()), b)];
//! let items = vec![json!({"id": 2}), json!({"id": 3})];
//! let plan = reconcile(existing, &items, Some("id"))?;
//! // plan.updating = [b], plan.entering = [key "3"], plan.exiting = [a]
//! ```

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::types::{ItemKey, ListMeta};

/// A surviving child and its new place.
#[derive(Debug, Clone, PartialEq)]
pub struct Updating<N> {
    pub node: N,
    pub meta: ListMeta,
}

/// A child to create for element `meta.index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entering {
    pub meta: ListMeta,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<N> {
    pub updating: Vec<Updating<N>>,
    pub entering: Vec<Entering>,
    pub exiting: Vec<N>,
    /// Every key of the new collection, in collection order.
    pub order: Vec<ItemKey>,
}

/// Reconcile `existing` children against `items`.
///
/// Keys are read from `key_field`, or are positional when it is `None`.
/// A key occurring twice in `items` is returned as the error.
pub fn reconcile<N>(
    existing: impl IntoIterator<Item = (ItemKey, N)>,
    items: &[Value],
    key_field: Option<&str>,
) -> Result<Reconciliation<N>, ItemKey>
where
    N: Copy,
{
    let mut current: HashMap<ItemKey, N> = HashMap::new();
    let mut current_order: Vec<ItemKey> = Vec::new();
    for (key, node) in existing {
        current_order.push(key.clone());
        current.insert(key, node);
    }

    let mut seen: HashSet<ItemKey> = HashSet::with_capacity(items.len());
    let mut updating = Vec::new();
    let mut entering = Vec::new();
    let mut order = Vec::with_capacity(items.len());

    for (index, element) in items.iter().enumerate() {
        let key = ItemKey::for_element(element, index, key_field);
        if !seen.insert(key.clone()) {
            return Err(key);
        }
        order.push(key.clone());

        let meta = ListMeta::new(key, index);
        match current.get(&meta.key) {
            Some(node) => updating.push(Updating { node: *node, meta }),
            None => entering.push(Entering { meta }),
        }
    }

    let exiting = current_order
        .into_iter()
        .filter(|key| !seen.contains(key))
        .filter_map(|key| current.get(&key).copied())
        .collect();

    Ok(Reconciliation {
        updating,
        entering,
        exiting,
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(k: &str) -> ItemKey {
        ItemKey::Field(k.to_string())
    }

    #[test]
    fn test_keyed_reconcile_keeps_identity() {
        let existing = [(field("1"), 10u32), (field("2"), 20), (field("3"), 30)];
        let items = vec![json!({"id": 2}), json!({"id": 3}), json!({"id": 4})];

        let plan = reconcile(existing, &items, Some("id")).unwrap();

        let survivors: Vec<u32> = plan.updating.iter().map(|u| u.node).collect();
        assert_eq!(survivors, vec![20, 30]);
        assert_eq!(plan.updating[0].meta.index, 0);
        assert!(!plan.updating[0].meta.odd);
        assert!(plan.updating[1].meta.odd);
        assert_eq!(plan.entering.len(), 1);
        assert_eq!(plan.entering[0].meta.key, field("4"));
        assert_eq!(plan.entering[0].meta.index, 2);
        assert_eq!(plan.exiting, vec![10]);
        assert_eq!(plan.order, vec![field("2"), field("3"), field("4")]);
    }

    #[test]
    fn test_positional_keys() {
        let existing = [(ItemKey::Index(0), 'a'), (ItemKey::Index(1), 'b'), (ItemKey::Index(2), 'c')];
        let items = vec![json!("x"), json!("y")];

        let plan = reconcile(existing, &items, None).unwrap();
        assert_eq!(plan.updating.len(), 2);
        assert!(plan.entering.is_empty());
        assert_eq!(plan.exiting, vec!['c']);
    }

    #[test]
    fn test_parity_is_recomputed() {
        let existing = [(field("a"), 1u8), (field("b"), 2)];
        let items = vec![json!({"k": "b"}), json!({"k": "a"})];

        let plan = reconcile(existing, &items, Some("k")).unwrap();
        let b = &plan.updating[0];
        assert_eq!((b.node, b.meta.index, b.meta.odd), (2, 0, false));
        let a = &plan.updating[1];
        assert_eq!((a.node, a.meta.index, a.meta.odd), (1, 1, true));
        assert!(plan.entering.is_empty() && plan.exiting.is_empty());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let items = vec![json!({"id": 1}), json!({"id": 1})];
        let err = reconcile(Vec::<(ItemKey, u8)>::new(), &items, Some("id")).unwrap_err();
        assert_eq!(err, field("1"));
    }

    #[test]
    fn test_empty_collection_exits_everything() {
        let existing = [(field("1"), 1u8), (field("2"), 2)];
        let plan = reconcile(existing, &[], Some("id")).unwrap();
        assert_eq!(plan.exiting, vec![1, 2]);
        assert!(plan.order.is_empty());
    }
}
