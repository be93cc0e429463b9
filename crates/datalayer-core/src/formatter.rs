//! Item and envelope formatting.
//!
//! Both formatters are pure: they read the product/context they are given and
//! return a new value. Dispatching is the caller's decision.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::identity::RequestContext;
use crate::models::{Dimensions, EventEnvelope, EventModel, EventName, ItemRecord, Product, ProductKind};
use crate::money;

/// Every item record is reported as part of this list.
pub const DEFAULT_LIST_NAME: &str = "Order";

/// Source marker written into every envelope this pipeline builds.
pub const DEFAULT_EVENT_SOURCE: &str = "plugin";

/// Attribute names the brand is read from, in lookup order.
const BRAND_ATTRIBUTES: [&str; 2] = ["brand", "pa_brand"];

/// Normalize a product into an item record.
///
/// `quantity` and `list_position` are taken as given; callers clamp them.
pub fn format_product_item(product: &Product, quantity: u32, list_position: u32) -> ItemRecord {
    let brand = BRAND_ATTRIBUTES
        .iter()
        .find_map(|name| product.attributes.get(*name))
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_default();

    let variant = if product.kind == ProductKind::Variation {
        product
            .variation_attributes
            .iter()
            .map(|attr| attr.value.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        String::new()
    };

    trace!(product_id = product.id, quantity, list_position, "Formatting item");

    ItemRecord {
        id: product.id,
        name: product.name.clone(),
        list_name: DEFAULT_LIST_NAME.to_string(),
        brand,
        category: product.categories.join("/"),
        variant,
        list_position: list_position.to_string(),
        price: product.unit_price(),
        quantity,
        sku: non_empty(product.sku.as_deref()),
        dimensions: Dimensions {
            length: non_empty(product.length.as_deref()),
            width: non_empty(product.width.as_deref()),
            height: non_empty(product.height.as_deref()),
        },
        weight: product.weight,
        custom_fields: product.meta.clone(),
    }
}

/// Blank, missing and zero-like values all become the empty string.
fn non_empty(value: Option<&str>) -> String {
    match value.map(str::trim) {
        None | Some("") | Some("0") => String::new(),
        Some(v) => v.to_string(),
    }
}

/// Builder for an `EventEnvelope`.
///
/// Unset amounts stay empty; set amounts are rounded to the context's price
/// decimals when the envelope is built.
#[derive(Debug, Clone)]
pub struct EventModelBuilder {
    event: EventName,
    transaction_id: String,
    value: Option<Decimal>,
    currency: String,
    shipping: Option<Decimal>,
    tax: Option<Decimal>,
    items: Vec<ItemRecord>,
    event_source: String,
    extra: BTreeMap<String, JsonValue>,
}

impl EventModelBuilder {
    pub fn new(event: EventName) -> Self {
        Self {
            event,
            transaction_id: String::new(),
            value: None,
            currency: String::new(),
            shipping: None,
            tax: None,
            items: Vec::new(),
            event_source: DEFAULT_EVENT_SOURCE.to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = id.into();
        self
    }

    pub fn value(mut self, value: Decimal) -> Self {
        self.value = Some(value);
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn shipping(mut self, shipping: Decimal) -> Self {
        self.shipping = Some(shipping);
        self
    }

    pub fn tax(mut self, tax: Decimal) -> Self {
        self.tax = Some(tax);
        self
    }

    pub fn items(mut self, items: Vec<ItemRecord>) -> Self {
        self.items = items;
        self
    }

    pub fn event_source(mut self, source: impl Into<String>) -> Self {
        self.event_source = source.into();
        self
    }

    /// Merge an event specific field into `eventModel`.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Attach site and actor from `ctx` and produce the envelope.
    pub fn build(self, ctx: &RequestContext) -> EventEnvelope {
        let identity = ctx.resolve();
        let decimals = ctx.price_decimals;
        let round = |amount: Option<Decimal>| amount.map(|a| money::round(a, decimals));

        let items = self
            .items
            .into_iter()
            .map(|mut item| {
                item.price = money::round(item.price, decimals);
                item
            })
            .collect();

        EventEnvelope {
            event: self.event,
            event_model: EventModel {
                transaction_id: self.transaction_id,
                affiliation: identity.site_url.clone(),
                value: round(self.value),
                currency: self.currency,
                shipping: round(self.shipping),
                tax: round(self.tax),
                items,
                event_source: self.event_source,
                extra: self.extra,
            },
            customer: identity.customer(),
        }
    }
}
