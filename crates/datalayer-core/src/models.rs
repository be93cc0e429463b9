//! Core data models for the datalayer event bridge.
//!
//! Storefront inputs (`Product`, `Cart`, `Order`, `Listing`) are supplied by the
//! caller already resolved. Outputs (`ItemRecord`, `EventEnvelope`) are the
//! canonical shapes pushed to the client queue and persisted to the Event Log.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::money;

// =============================================================================
// STOREFRONT INPUTS
// =============================================================================

/// Product type as the storefront reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    #[default]
    Simple,
    Variable,
    Variation,
    Grouped,
    External,
}

/// One attribute selected on a variation product (`pa_color` = `Red`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationAttribute {
    pub name: String,
    pub value: String,
}

/// A storefront product snapshot.
///
/// Every optional accessor degrades to an empty value in the item record;
/// nothing here is required beyond `id` and `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub kind: ProductKind,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub weight: Option<Decimal>,
    /// Names of the assigned category terms, in taxonomy order.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Custom product attributes (`brand`, `material`, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Selected attributes, only meaningful for `ProductKind::Variation`.
    #[serde(default)]
    pub variation_attributes: Vec<VariationAttribute>,
    /// Free-form product meta copied into `custom_fields`.
    #[serde(default)]
    pub meta: BTreeMap<String, JsonValue>,
}

impl Product {
    /// Minimal product with a name and price; everything else empty.
    pub fn new(id: u64, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ProductKind::Simple,
            price: Some(price),
            sku: None,
            length: None,
            width: None,
            height: None,
            weight: None,
            categories: Vec::new(),
            attributes: BTreeMap::new(),
            variation_attributes: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Unit price, zero when the storefront has none.
    pub fn unit_price(&self) -> Decimal {
        self.price.unwrap_or(Decimal::ZERO)
    }
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

/// Shopper cart with the totals the storefront computed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub contents_total: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
}

impl Cart {
    /// Sum of unit price times quantity across all lines.
    pub fn line_subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(|line| line.product.unit_price() * Decimal::from(line.quantity))
            .sum()
    }
}

/// One order line. The product may have been deleted since the order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(default)]
    pub product: Option<Product>,
    pub quantity: u32,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Storefront order number, used as the transaction id.
    pub number: String,
    pub currency: String,
    pub total: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
}

/// Kind of product listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Shop,
    Category,
    Tag,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Shop => "shop",
            ListingKind::Category => "category",
            ListingKind::Tag => "tag",
        }
    }
}

/// Identity of a listing view: which archive, which term, which page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Listing {
    pub kind: ListingKind,
    /// Term slug; empty for the shop page.
    #[serde(default)]
    pub slug: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

// =============================================================================
// ITEM RECORD
// =============================================================================

/// Product dimensions; missing values are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: String,
    pub width: String,
    pub height: String,
}

/// Canonical representation of one product or line item inside an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: u64,
    pub name: String,
    pub list_name: String,
    pub brand: String,
    /// Category names joined with `/`.
    pub category: String,
    pub variant: String,
    /// 1-based rank inside the containing list, string encoded.
    pub list_position: String,
    #[serde(with = "money::amount")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(rename = "SKU")]
    pub sku: String,
    pub dimensions: Dimensions,
    #[serde(with = "money::optional")]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, JsonValue>,
}

// =============================================================================
// EVENT ENVELOPE
// =============================================================================

/// Name of an emitted analytics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    ViewItem,
    ViewItemList,
    ViewCart,
    AddToCart,
    RemoveFromCart,
    BeginCheckout,
    AddShippingInfo,
    AddPaymentInfo,
    Purchase,
    Refund,
    Search,
    ApplyCoupon,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::ViewItem => "view_item",
            EventName::ViewItemList => "view_item_list",
            EventName::ViewCart => "view_cart",
            EventName::AddToCart => "add_to_cart",
            EventName::RemoveFromCart => "remove_from_cart",
            EventName::BeginCheckout => "begin_checkout",
            EventName::AddShippingInfo => "add_shipping_info",
            EventName::AddPaymentInfo => "add_payment_info",
            EventName::Purchase => "purchase",
            EventName::Refund => "refund",
            EventName::Search => "search",
            EventName::ApplyCoupon => "apply_coupon",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view_item" => Ok(EventName::ViewItem),
            "view_item_list" => Ok(EventName::ViewItemList),
            "view_cart" => Ok(EventName::ViewCart),
            "add_to_cart" => Ok(EventName::AddToCart),
            "remove_from_cart" => Ok(EventName::RemoveFromCart),
            "begin_checkout" => Ok(EventName::BeginCheckout),
            "add_shipping_info" => Ok(EventName::AddShippingInfo),
            "add_payment_info" => Ok(EventName::AddPaymentInfo),
            "purchase" => Ok(EventName::Purchase),
            "refund" => Ok(EventName::Refund),
            "search" => Ok(EventName::Search),
            "apply_coupon" => Ok(EventName::ApplyCoupon),
            other => Err(Error::InvalidInput(format!("unknown event name: {}", other))),
        }
    }
}

/// Transaction-level body of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventModel {
    pub transaction_id: String,
    /// Site URL of the emitting storefront.
    pub affiliation: String,
    #[serde(with = "money::optional")]
    pub value: Option<Decimal>,
    pub currency: String,
    #[serde(with = "money::optional")]
    pub shipping: Option<Decimal>,
    #[serde(with = "money::optional")]
    pub tax: Option<Decimal>,
    pub items: Vec<ItemRecord>,
    pub event_source: String,
    /// Event specific fields (`payment_type`, `shipping_method`, `coupon`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Actor fields; both empty for anonymous shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
}

/// The canonical event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: EventName,
    #[serde(rename = "eventModel")]
    pub event_model: EventModel,
    #[serde(default)]
    pub customer: Customer,
}

// =============================================================================
// LOG STORES
// =============================================================================

/// A persisted Event Log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: i64,
    pub event_time: DateTime<Utc>,
    pub event_name: String,
    pub user_id: Option<i64>,
    pub user_role: Option<String>,
    /// The serialized envelope.
    pub event_data: JsonValue,
}

/// Fields supplied when appending to the Event Log.
#[derive(Debug, Clone)]
pub struct NewEventLogEntry {
    pub event_name: String,
    pub user_id: Option<i64>,
    pub user_role: Option<String>,
    pub event_data: JsonValue,
}

impl NewEventLogEntry {
    /// Build a log row from an envelope, copying the actor fields out.
    pub fn from_envelope(envelope: &EventEnvelope) -> crate::Result<Self> {
        Ok(Self {
            event_name: envelope.event.as_str().to_string(),
            user_id: envelope.customer.user_id.map(|id| id as i64),
            user_role: envelope.customer.user_role.clone(),
            event_data: serde_json::to_value(envelope)?,
        })
    }
}

/// A persisted Error Log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: i64,
    pub error_time: DateTime<Utc>,
    pub error_message: String,
}

/// One page of log rows plus the table total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage<T> {
    pub logs: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_event_name_round_trip() {
        for name in [
            EventName::ViewItem,
            EventName::AddToCart,
            EventName::AddPaymentInfo,
            EventName::ApplyCoupon,
        ] {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
            let json = serde_json::to_value(name).unwrap();
            assert_eq!(json, serde_json::json!(name.as_str()));
        }
    }

    #[test]
    fn test_event_name_unknown() {
        let err = "checkout".parse::<EventName>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_cart_line_subtotal() {
        let cart = Cart {
            lines: vec![
                CartLine {
                    product: Product::new(1, "Mug", dec("4.50")),
                    quantity: 2,
                },
                CartLine {
                    product: Product::new(2, "Tea", dec("10.00")),
                    quantity: 1,
                },
            ],
            ..Default::default()
        };
        assert_eq!(cart.line_subtotal(), dec("19.00"));
    }

    #[test]
    fn test_unit_price_defaults_to_zero() {
        let mut product = Product::new(3, "Free sample", dec("1"));
        product.price = None;
        assert_eq!(product.unit_price(), Decimal::ZERO);
    }

    #[test]
    fn test_product_deserializes_with_defaults() {
        let product: Product =
            serde_json::from_str(r#"{"id": 7, "name": "Plain"}"#).unwrap();
        assert_eq!(product.kind, ProductKind::Simple);
        assert!(product.price.is_none());
        assert!(product.categories.is_empty());
    }

    #[test]
    fn test_listing_page_defaults_to_one() {
        let listing: Listing = serde_json::from_str(r#"{"kind": "category"}"#).unwrap();
        assert_eq!(listing.page, 1);
        assert_eq!(listing.slug, "");
        assert_eq!(listing.kind.as_str(), "category");
    }

    #[test]
    fn test_customer_skips_absent_fields() {
        let json = serde_json::to_value(Customer::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
