//! The Shipping Aggregator.
//!
//! Pure computation: given what each store in the cart sells and offers, and the buyer's selections, work out the
//! shipping cost per store and in total. Amounts are integer kobo throughout.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use settlement_common::Kobo;
use thiserror::Error;

use crate::db_types::{ShippingMethod, StoreId};

/// One store's share of the cart, from the shipping point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreShipping {
    pub store_id: StoreId,
    pub has_physical_items: bool,
    pub methods: Vec<ShippingMethod>,
}

impl StoreShipping {
    /// Only stores shipping physical goods, with at least one shipping method set up, need the buyer to choose.
    pub fn requires_selection(&self) -> bool {
        self.has_physical_items && !self.methods.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub per_store: BTreeMap<StoreId, Option<ShippingMethod>>,
    pub total: Kobo,
}

impl ShippingQuote {
    pub fn method_for(&self, store_id: &StoreId) -> Option<&ShippingMethod> {
        self.per_store.get(store_id).and_then(|m| m.as_ref())
    }

    pub fn cost_for(&self, store_id: &StoreId) -> Kobo {
        self.method_for(store_id).map(|m| m.cost).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShippingError {
    #[error("A shipping method must be selected for stores: {}", display_stores(.0))]
    MissingShippingSelection(Vec<StoreId>),
    #[error("Store {store_id} does not offer shipping method {method_id}")]
    InvalidSelection { store_id: StoreId, method_id: String },
    #[error("Shipping method {0} has a negative cost")]
    NegativeCost(String),
    #[error("The shipping total overflowed")]
    Overflow,
}

fn display_stores(stores: &[StoreId]) -> String {
    stores.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

pub fn stores_requiring_selection(stores: &[StoreShipping]) -> Vec<StoreId> {
    stores.iter().filter(|s| s.requires_selection()).map(|s| s.store_id.clone()).collect()
}

/// Resolves the buyer's shipping selections and totals them.
///
/// Every store that [requires a selection](StoreShipping::requires_selection) must have one. A selection for a store
/// that doesn't need one is honoured if the store offers that method. Selections for stores that are not in the cart
/// are ignored.
pub fn aggregate(
    stores: &[StoreShipping],
    selections: &BTreeMap<StoreId, String>,
) -> Result<ShippingQuote, ShippingError> {
    let missing = stores
        .iter()
        .filter(|s| s.requires_selection() && !selections.contains_key(&s.store_id))
        .map(|s| s.store_id.clone())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ShippingError::MissingShippingSelection(missing));
    }
    let mut quote = ShippingQuote::default();
    for store in stores {
        let method = match selections.get(&store.store_id) {
            Some(method_id) => {
                let method = store.methods.iter().find(|m| &m.id == method_id).cloned().ok_or_else(|| {
                    ShippingError::InvalidSelection { store_id: store.store_id.clone(), method_id: method_id.clone() }
                })?;
                if method.cost.value() < 0 {
                    return Err(ShippingError::NegativeCost(method.id));
                }
                quote.total = quote.total.checked_add(method.cost).ok_or(ShippingError::Overflow)?;
                Some(method)
            },
            None => None,
        };
        quote.per_store.insert(store.store_id.clone(), method);
    }
    Ok(quote)
}

#[cfg(test)]
mod test {
    use super::*;

    fn method(id: &str, cost: i64) -> ShippingMethod {
        ShippingMethod { id: id.into(), name: format!("{id} delivery"), cost: Kobo::from(cost), estimated_days: Some(3) }
    }

    fn stores() -> Vec<StoreShipping> {
        vec![
            StoreShipping {
                store_id: "books".into(),
                has_physical_items: true,
                methods: vec![method("standard", 150_000), method("express", 300_000)],
            },
            // Sells e-books only
            StoreShipping { store_id: "ebooks".into(), has_physical_items: false, methods: vec![method("post", 1)] },
            // Physical goods, but no shipping configured
            StoreShipping { store_id: "market".into(), has_physical_items: true, methods: vec![] },
        ]
    }

    #[test]
    fn only_physical_stores_with_methods_need_a_selection() {
        assert_eq!(stores_requiring_selection(&stores()), vec![StoreId::from("books")]);
    }

    #[test]
    fn missing_selection_is_rejected() {
        let err = aggregate(&stores(), &BTreeMap::new()).unwrap_err();
        assert_eq!(err, ShippingError::MissingShippingSelection(vec!["books".into()]));
    }

    #[test]
    fn totals_are_integer_sums() {
        let mut selections = BTreeMap::new();
        selections.insert(StoreId::from("books"), "express".to_string());
        selections.insert(StoreId::from("ebooks"), "post".to_string());
        let quote = aggregate(&stores(), &selections).unwrap();
        assert_eq!(quote.total, Kobo::from(300_001));
        assert_eq!(quote.cost_for(&"books".into()), Kobo::from(300_000));
        assert_eq!(quote.cost_for(&"market".into()), Kobo::from(0));
        assert!(quote.method_for(&"market".into()).is_none());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let mut selections = BTreeMap::new();
        selections.insert(StoreId::from("books"), "teleport".to_string());
        let err = aggregate(&stores(), &selections).unwrap_err();
        assert!(matches!(err, ShippingError::InvalidSelection { method_id, .. } if method_id == "teleport"));
    }
}
