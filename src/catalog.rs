//! Static mapping from Dodo product ids to the plan and credits they grant.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::models::plan::PlanTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Product {
    pub plan: PlanTier,
    pub credits: i64,
    /// Display price in whole US dollars.
    pub price: u32,
}

pub static DODO_PRODUCTS: Lazy<ProductCatalog> = Lazy::new(|| {
    ProductCatalog::from_entries([
        (
            "pdt_UQVM7C1CCtMCSP1MFCx9m",
            Product {
                plan: PlanTier::Professional,
                credits: 60,
                price: 15,
            },
        ),
        (
            "pdt_cPLJVSbDTlp397NpGKoS4",
            Product {
                plan: PlanTier::Growth,
                credits: 300,
                price: 49,
            },
        ),
        (
            "pdt_vNXSWmxxgNRt1TzHQZDni",
            Product {
                plan: PlanTier::Enterprise,
                credits: 999_999,
                price: 999,
            },
        ),
    ])
});

#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: HashMap<String, Product>,
}

impl ProductCatalog {
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Product)>,
        K: Into<String>,
    {
        Self {
            products: entries
                .into_iter()
                .map(|(id, product)| (id.into(), product))
                .collect(),
        }
    }

    pub fn resolve(&self, product_id: &str) -> Option<Product> {
        self.products.get(product_id).copied()
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.products.contains_key(product_id)
    }

    /// Product ids ordered by price, for pricing listings.
    pub fn entries(&self) -> Vec<(&str, Product)> {
        let mut out: Vec<_> = self
            .products
            .iter()
            .map(|(id, product)| (id.as_str(), *product))
            .collect();
        out.sort_by_key(|(_, product)| product.price);
        out
    }
}
