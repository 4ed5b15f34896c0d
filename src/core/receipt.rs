//! Receipt normalization - Turns an extracted receipt guess into atomic line items.
//!
//! The extraction service returns loosely shaped JSON: numbers may arrive as strings, as
//! `null`, or not at all. Reading goes through [`RawReceipt::from_value`], where every field
//! is resolved to an `Option` explicitly, and [`normalize`] then applies the defaults:
//!
//! - quantity defaults to 1 and is floored to a whole number of at least 1
//! - each row of quantity `q` becomes `q` line items of quantity 1
//! - `total_price` per unit is `(totalWithTip ?? totalWithTax ?? 0) / q`
//! - `unit_price` per unit is `(totalPrice ?? 0) / q`
//!
//! Only an unusable top-level shape (not an object, `items` not a list, an item that is not
//! an object) is reported as [`Error::MalformedInput`].

use crate::errors::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use tracing::{debug, warn};

/// Name given to items the receipt did not name.
pub const DEFAULT_ITEM_NAME: &str = "Item";
/// Place name used when the merchant is unreadable.
pub const DEFAULT_MERCHANT: &str = "Unknown";

/// One receipt row as reported by the extraction service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    /// Item name
    pub name: Option<String>,
    /// Extra detail
    pub description: Option<String>,
    /// Number of units on the row
    pub quantity: Option<f64>,
    /// Listed price of one unit (informational, not used for splitting)
    pub unit_price: Option<f64>,
    /// Listed price of the whole row
    pub total_price: Option<f64>,
    /// Row price including its share of tax
    pub total_with_tax: Option<f64>,
    /// Row price including its share of tax and tip
    pub total_with_tip: Option<f64>,
}

/// Receipt-level money fields as reported by the extraction service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTotals {
    /// Subtotal before tax and tip
    pub subtotal: Option<f64>,
    /// Tax
    pub tax: Option<f64>,
    /// Tip
    pub tip: Option<f64>,
    /// Grand total
    pub total: Option<f64>,
}

/// A whole extracted receipt with every field still optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReceipt {
    /// Merchant or place name
    pub merchant: Option<String>,
    /// Receipt rows in source order
    pub items: Vec<RawItem>,
    /// Receipt totals
    pub totals: RawTotals,
}

/// A single-quantity line item ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLineItem {
    /// Item name
    pub name: String,
    /// Extra detail, empty when none
    pub description: String,
    /// Always 1
    pub quantity: i32,
    /// Listed price of this unit
    pub unit_price: f64,
    /// Tax/tip-adjusted cost of this unit
    pub total_price: f64,
}

/// Normalizer output: the expense fields plus its exploded line items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedReceipt {
    /// Merchant or place name
    pub place_name: String,
    /// Receipt subtotal
    pub subtotal: f64,
    /// Receipt tax
    pub tax_amount: f64,
    /// Receipt tip
    pub tip_amount: f64,
    /// Receipt grand total
    pub total_amount: f64,
    /// Line items, source order, each row's units adjacent
    pub items: Vec<NormalizedLineItem>,
}

/// Seam for the external vision service.
///
/// Implementations take an image (usually a data URL) and return the service's raw text
/// reply, which is expected to contain a JSON receipt somewhere inside it.
pub trait ReceiptExtractor {
    /// Sends the image to the service and returns its reply text.
    fn extract(&self, image_data: &str) -> impl Future<Output = Result<String>> + Send;
}

impl RawReceipt {
    /// Reads a receipt out of arbitrary JSON, resolving each field leniently.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::malformed("Receipt data must be a JSON object"))?;

        let items = match object.get("items") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(rows)) => rows
                .iter()
                .enumerate()
                .map(|(index, row)| RawItem::from_value(index, row))
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::malformed("Receipt items must be a list")),
        };

        let totals = match object.get("totals") {
            Some(Value::Object(totals)) => RawTotals::from_map(totals),
            None | Some(Value::Null) => RawTotals::default(),
            Some(other) => {
                warn!("Ignoring receipt totals of unexpected shape: {}", other);
                RawTotals::default()
            }
        };

        Ok(Self {
            merchant: lenient_text(object.get("merchant")),
            items,
            totals,
        })
    }
}

impl RawItem {
    fn from_value(index: usize, value: &Value) -> Result<Self> {
        let row = value
            .as_object()
            .ok_or_else(|| Error::malformed(format!("Receipt item {index} is not an object")))?;
        Ok(Self {
            name: lenient_text(row.get("name")),
            description: lenient_text(row.get("description")),
            quantity: lenient_number(row.get("quantity")),
            unit_price: lenient_number(row.get("unitPrice")),
            total_price: lenient_number(row.get("totalPrice")),
            total_with_tax: lenient_number(row.get("totalWithTax")),
            total_with_tip: lenient_number(row.get("totalWithTip")),
        })
    }

    /// Tax/tip-adjusted price of the whole row.
    #[must_use]
    pub fn effective_price(&self) -> f64 {
        self.total_with_tip.or(self.total_with_tax).unwrap_or(0.0)
    }
}

impl RawTotals {
    fn from_map(totals: &Map<String, Value>) -> Self {
        Self {
            subtotal: lenient_number(totals.get("subtotal")),
            tax: lenient_number(totals.get("tax")),
            tip: lenient_number(totals.get("tip")),
            total: lenient_number(totals.get("total")),
        }
    }
}

/// Numbers and numeric strings become `Some`; anything else, including NaN, is `None`.
fn lenient_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Non-blank strings (and numbers, printed) become `Some`.
fn lenient_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whole number of units a row explodes into.
fn resolve_quantity(quantity: Option<f64>, max_quantity: u32) -> Result<u32> {
    let Some(q) = quantity.filter(|q| *q >= 1.0) else {
        return Ok(1);
    };
    let q = q.floor();
    if q > f64::from(max_quantity) {
        return Err(Error::malformed(format!(
            "Item quantity {q} exceeds the limit of {max_quantity}"
        )));
    }
    // Cast safety: q is a whole number in [1, max_quantity].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(q as u32)
}

/// Explodes every row into single-quantity line items and defaults the totals.
///
/// # Errors
/// Returns [`Error::MalformedInput`] if a row's quantity is above `max_quantity`.
pub fn normalize(raw: &RawReceipt, max_quantity: u32) -> Result<NormalizedReceipt> {
    let mut items = Vec::new();
    for row in &raw.items {
        let quantity = resolve_quantity(row.quantity, max_quantity)?;
        let divisor = f64::from(quantity);
        let total_price = row.effective_price() / divisor;
        let unit_price = row.total_price.unwrap_or(0.0) / divisor;
        let name = row
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string());
        let description = row.description.clone().unwrap_or_default();

        items.extend((0..quantity).map(|_| NormalizedLineItem {
            name: name.clone(),
            description: description.clone(),
            quantity: 1,
            unit_price,
            total_price,
        }));
    }

    debug!(
        "Normalized {} receipt rows into {} line items",
        raw.items.len(),
        items.len()
    );

    Ok(NormalizedReceipt {
        place_name: raw
            .merchant
            .clone()
            .unwrap_or_else(|| DEFAULT_MERCHANT.to_string()),
        subtotal: raw.totals.subtotal.unwrap_or(0.0),
        tax_amount: raw.totals.tax.unwrap_or(0.0),
        tip_amount: raw.totals.tip.unwrap_or(0.0),
        total_amount: raw.totals.total.unwrap_or(0.0),
        items,
    })
}

/// Reads and normalizes a receipt given as JSON.
pub fn normalize_value(value: &Value, max_quantity: u32) -> Result<NormalizedReceipt> {
    normalize(&RawReceipt::from_value(value)?, max_quantity)
}

/// Parses JSON text into a value, mapping syntax errors to [`Error::MalformedInput`].
pub fn parse_receipt_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| Error::malformed(format!("Invalid receipt data: {e}")))
}

/// Pulls the outermost `{...}` block out of an extraction reply and parses it.
///
/// Replies sometimes wrap the JSON in prose or code fences; everything from the first `{`
/// to the last `}` is taken. Without braces the whole reply is parsed as-is.
pub fn extract_receipt_json(content: &str) -> Result<Value> {
    let candidate = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };
    parse_receipt_json(candidate)
        .inspect_err(|_| warn!("Failed to parse extraction reply: {}", content))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use serde_json::json;

    const MAX: u32 = 500;

    #[test]
    fn test_pizza_scenario() {
        let raw = json!({
            "merchant": "Luigi's",
            "items": [{"name": "Pizza", "quantity": 2, "totalPrice": 20, "totalWithTax": 22}],
            "totals": {"subtotal": 20, "tax": 2, "tip": 0, "total": 22}
        });

        let receipt = normalize_value(&raw, MAX).unwrap();
        assert_eq!(receipt.place_name, "Luigi's");
        assert_eq!(receipt.items.len(), 2);
        for item in &receipt.items {
            assert_eq!(item.name, "Pizza");
            assert_eq!(item.quantity, 1);
            assert_eq!(item.unit_price, 10.0);
            assert_eq!(item.total_price, 11.0);
        }
        assert_eq!(receipt.total_amount, 22.0);
    }

    #[test]
    fn test_explosion_preserves_effective_price() {
        for q in 1..=7 {
            let raw = json!({"items": [{"name": "Taco", "quantity": q, "totalWithTip": 17.35}]});
            let receipt = normalize_value(&raw, MAX).unwrap();
            assert_eq!(receipt.items.len(), q);
            assert!(receipt.items.iter().all(|i| i.quantity == 1));
            let sum: f64 = receipt.items.iter().map(|i| i.total_price).sum();
            assert!((sum - 17.35).abs() < 1e-6, "q={q} sum={sum}");
        }
    }

    #[test]
    fn test_tip_preferred_over_tax() {
        let raw = json!({"items": [{"totalPrice": 10, "totalWithTax": 11, "totalWithTip": 13}]});
        let receipt = normalize_value(&raw, MAX).unwrap();
        assert_eq!(receipt.items[0].total_price, 13.0);
        assert_eq!(receipt.items[0].unit_price, 10.0);
    }

    #[test]
    fn test_missing_fields_degrade_to_defaults() {
        let raw = json!({"items": [{}]});
        let receipt = normalize_value(&raw, MAX).unwrap();

        assert_eq!(receipt.place_name, DEFAULT_MERCHANT);
        assert_eq!(receipt.subtotal, 0.0);
        assert_eq!(receipt.tax_amount, 0.0);
        assert_eq!(receipt.tip_amount, 0.0);
        assert_eq!(receipt.total_amount, 0.0);
        assert_eq!(receipt.items.len(), 1);
        let item = &receipt.items[0];
        assert_eq!(item.name, DEFAULT_ITEM_NAME);
        assert_eq!(item.description, "");
        assert_eq!(item.unit_price, 0.0);
        assert_eq!(item.total_price, 0.0);
    }

    #[test]
    fn test_untrusted_numbers_are_coerced_or_dropped() {
        let raw = json!({
            "items": [
                {"name": "Soda", "quantity": "3", "totalPrice": "4.50", "totalWithTax": null, "totalWithTip": "n/a"},
                {"name": "Fries", "quantity": -4, "totalPrice": true},
                {"name": "Wings", "quantity": 2.9, "totalWithTax": 6}
            ],
            "totals": {"subtotal": "abc", "total": "12.5"}
        });
        let receipt = normalize_value(&raw, MAX).unwrap();

        // Soda: 3 units, no usable effective price
        assert_eq!(receipt.items[..3].iter().filter(|i| i.name == "Soda").count(), 3);
        assert_eq!(receipt.items[0].unit_price, 1.5);
        assert_eq!(receipt.items[0].total_price, 0.0);
        // Fries: non-positive quantity is treated as 1
        assert_eq!(receipt.items[3].name, "Fries");
        assert_eq!(receipt.items[3].unit_price, 0.0);
        // Wings: 2.9 floors to 2
        assert_eq!(receipt.items.len(), 6);
        assert_eq!(receipt.items[4].total_price, 3.0);

        assert_eq!(receipt.subtotal, 0.0);
        assert_eq!(receipt.total_amount, 12.5);
    }

    #[test]
    fn test_zero_tip_is_kept() {
        let raw = json!({"items": [{"totalWithTax": 9, "totalWithTip": 0}]});
        let receipt = normalize_value(&raw, MAX).unwrap();
        assert_eq!(receipt.items[0].total_price, 0.0);
    }

    #[test]
    fn test_blank_name_gets_placeholder() {
        let raw = json!({"merchant": "  ", "items": [{"name": "   ", "description": null}]});
        let receipt = normalize_value(&raw, MAX).unwrap();
        assert_eq!(receipt.items[0].name, DEFAULT_ITEM_NAME);
        assert_eq!(receipt.place_name, DEFAULT_MERCHANT);
    }

    #[test]
    fn test_missing_items_is_empty_receipt() {
        let receipt = normalize_value(&json!({"merchant": "Cafe"}), MAX).unwrap();
        assert!(receipt.items.is_empty());
    }

    #[test]
    fn test_malformed_shapes_are_rejected() {
        for raw in [
            json!([1, 2, 3]),
            json!("receipt"),
            json!({"items": {"name": "Pizza"}}),
            json!({"items": [42]}),
        ] {
            let result = normalize_value(&raw, MAX);
            assert!(
                matches!(result, Err(Error::MalformedInput { .. })),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_odd_totals_shape_degrades() {
        let receipt = normalize_value(&json!({"totals": "22.00"}), MAX).unwrap();
        assert_eq!(receipt.total_amount, 0.0);
    }

    #[test]
    fn test_quantity_above_limit_is_rejected() {
        let raw = json!({"items": [{"name": "Napkin", "quantity": 1_000_000}]});
        assert!(matches!(
            normalize_value(&raw, MAX),
            Err(Error::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_extract_receipt_json_strips_prose() {
        let reply = "Here is the receipt:\n```json\n{\"merchant\": \"Deli\", \"items\": []}\n```\nThanks!";
        let value = extract_receipt_json(reply).unwrap();
        assert_eq!(value["merchant"], "Deli");
    }

    #[test]
    fn test_extract_receipt_json_without_json() {
        let result = extract_receipt_json("I could not read this image.");
        assert!(matches!(result, Err(Error::MalformedInput { .. })));
    }
}
