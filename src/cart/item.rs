// Cart line items

use crate::storage::Keyed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product as handed to the cart by a product screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Seller details, opaque to the cart
    #[serde(default)]
    pub store: serde_json::Value,
    pub price: f64,
    #[serde(default)]
    pub discounted_price: Option<f64>,
    /// Stock snapshot taken by the caller; not re-checked later
    pub stock_available: u32,
}

/// Persisted cart entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub store: serde_json::Value,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<f64>,
    pub quantity: u32,
    pub stock_available: u32,
    pub date_added: DateTime<Utc>,
}

impl Keyed for CartItem {
    fn key(&self) -> &str {
        &self.id
    }
}

impl CartItem {
    /// New entry with quantity 1
    pub fn from_product(product: CartProduct, date_added: DateTime<Utc>) -> Self {
        Self {
            id: product.id,
            title: product.title,
            image: product.image,
            store: product.store,
            price: product.price,
            discounted_price: product.discounted_price,
            quantity: 1,
            stock_available: product.stock_available,
            date_added,
        }
    }

    /// Price actually charged per unit
    pub fn unit_price(&self) -> f64 {
        self.discounted_price.unwrap_or(self.price)
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price() * f64::from(self.quantity)
    }

    pub fn remaining_stock(&self) -> u32 {
        self.stock_available.saturating_sub(self.quantity)
    }

    pub fn at_stock_limit(&self) -> bool {
        self.quantity >= self.stock_available
    }
}
