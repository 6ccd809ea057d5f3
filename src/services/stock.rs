use crate::entities::{order_item, product, variant_stock};
use crate::errors::ServiceError;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// One product (or variant combination) that cannot be fulfilled.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockShortfall {
    pub product_id: Uuid,
    /// Missing when the product row itself no longer exists.
    pub product_name: Option<String>,
    pub required: i64,
    pub available: i64,
}

/// Outcome of checking an order's items against current stock. All shortfalls
/// are reported at once so the storefront can show the full picture.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockCheckResult {
    pub order_id: Uuid,
    pub in_stock: bool,
    pub out_of_stock_items: Vec<StockShortfall>,
}

/// Normalized variant selection: option name -> chosen value.
type VariantKey = BTreeMap<String, String>;

/// Reads the structured options column; falls back to the legacy
/// "Name: Value, Name: Value" label for rows written before the column
/// existed.
fn variant_key_for_item(item: &order_item::Model) -> Option<VariantKey> {
    if let Some(options) = &item.variant_options {
        let key = options_to_key(options);
        if !key.is_empty() {
            return Some(key);
        }
    }
    item.variant_label
        .as_deref()
        .and_then(parse_variant_label)
}

fn options_to_key(options: &Value) -> VariantKey {
    match options {
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect(),
        _ => VariantKey::new(),
    }
}

/// Parses the legacy comma-separated label. Values keep any colons after the
/// first separator ("Engraving: To: Mum" parses as {"Engraving": "To: Mum"}).
fn parse_variant_label(label: &str) -> Option<VariantKey> {
    let mut key = VariantKey::new();
    for part in label.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, value) = part.split_once(':')?;
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return None;
        }
        key.insert(name.to_string(), value.to_string());
    }
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[derive(Clone)]
pub struct StockService {
    db: Arc<DatabaseConnection>,
}

impl StockService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Checks every item of an order against current stock and reports all
    /// shortfalls. Quantities for the same product/variant are summed across
    /// duplicate lines before comparing.
    #[instrument(skip(self))]
    pub async fn check_order(&self, order_id: Uuid) -> Result<StockCheckResult, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        if items.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "Order {} has no items",
                order_id
            )));
        }

        // Sum required quantities per product and variant selection.
        let mut required: BTreeMap<(Uuid, Option<VariantKey>), i64> = BTreeMap::new();
        for item in &items {
            let key = (item.product_id, variant_key_for_item(item));
            *required.entry(key).or_insert(0) += i64::from(item.quantity);
        }

        let mut shortfalls = Vec::new();
        for ((product_id, variant), needed) in required {
            let product = product::Entity::find_by_id(product_id)
                .one(&*self.db)
                .await?;

            let Some(product) = product else {
                shortfalls.push(StockShortfall {
                    product_id,
                    product_name: None,
                    required: needed,
                    available: 0,
                });
                continue;
            };

            let available = if product.has_variants {
                match &variant {
                    Some(key) => self.variant_stock(product_id, key).await?,
                    // Variant product ordered without a selection; nothing to
                    // match against, treat as unavailable.
                    None => 0,
                }
            } else {
                i64::from(product.stock)
            };

            let available = if product.is_active { available } else { 0 };

            if available < needed {
                shortfalls.push(StockShortfall {
                    product_id,
                    product_name: Some(product.name),
                    required: needed,
                    available,
                });
            }
        }

        Ok(StockCheckResult {
            order_id,
            in_stock: shortfalls.is_empty(),
            out_of_stock_items: shortfalls,
        })
    }

    /// Finds the variant row whose options map equals the selection exactly.
    async fn variant_stock(&self, product_id: Uuid, key: &VariantKey) -> Result<i64, ServiceError> {
        let rows = variant_stock::Entity::find()
            .filter(variant_stock::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;

        Ok(rows
            .iter()
            .find(|row| &options_to_key(&row.options) == key)
            .map(|row| i64::from(row.stock))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(pairs: &[(&str, &str)]) -> VariantKey {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn legacy_label_parses_into_options() {
        assert_eq!(
            parse_variant_label("Size: M, Color: Gold"),
            Some(key(&[("Size", "M"), ("Color", "Gold")]))
        );
        assert_eq!(
            parse_variant_label("Ring Size: 7"),
            Some(key(&[("Ring Size", "7")]))
        );
        // Value keeps colons beyond the first separator.
        assert_eq!(
            parse_variant_label("Engraving: To: Mum"),
            Some(key(&[("Engraving", "To: Mum")]))
        );
        assert_eq!(parse_variant_label(""), None);
        assert_eq!(parse_variant_label("no separator"), None);
    }

    #[test]
    fn structured_options_take_precedence_over_label() {
        let item = order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Ring".into(),
            quantity: 1,
            unit_price: rust_decimal_macros::dec!(100),
            variant_options: Some(json!({"Size": "M"})),
            variant_label: Some("Size: L".into()),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(variant_key_for_item(&item), Some(key(&[("Size", "M")])));
    }

    #[test]
    fn label_used_when_options_column_is_empty() {
        let item = order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Ring".into(),
            quantity: 1,
            unit_price: rust_decimal_macros::dec!(100),
            variant_options: None,
            variant_label: Some("Size: L, Color: Rose".into()),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(
            variant_key_for_item(&item),
            Some(key(&[("Size", "L"), ("Color", "Rose")]))
        );
    }

    #[test]
    fn option_order_does_not_affect_matching() {
        let a = options_to_key(&json!({"Color": "Gold", "Size": "M"}));
        let b = options_to_key(&json!({"Size": "M", "Color": "Gold"}));
        assert_eq!(a, b);
    }
}
