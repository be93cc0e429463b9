//! Storefront lifecycle triggers and the envelopes they produce.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::formatter::{format_product_item, EventModelBuilder};
use crate::identity::RequestContext;
use crate::models::{Cart, CartLine, EventEnvelope, EventName, ItemRecord, Listing, Order, Product};

/// `event_source` written by every lifecycle-generated envelope.
pub const PIPELINE_EVENT_SOURCE: &str = "datalayer-events";

/// Payment type reported when the shopper has not chosen one yet.
pub const UNKNOWN_PAYMENT_TYPE: &str = "unknown";

/// A storefront trigger, carrying the already-resolved domain objects it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ViewItem {
        product: Product,
    },
    ViewItemList {
        listing: Listing,
        products: Vec<Product>,
    },
    AddToCart {
        product: Product,
        quantity: u32,
    },
    ViewCart {
        cart: Cart,
    },
    RemoveFromCart {
        line: CartLine,
    },
    BeginCheckout {
        cart: Cart,
    },
    AddShippingInfo {
        cart: Cart,
        shipping_method: String,
    },
    AddPaymentInfo {
        cart: Cart,
        #[serde(default)]
        payment_method: Option<String>,
    },
    Purchase {
        order: Order,
    },
    Refund {
        order: Order,
        amount: Decimal,
    },
    Search {
        term: String,
    },
    ApplyCoupon {
        code: String,
    },
}

impl LifecycleEvent {
    pub fn event_name(&self) -> EventName {
        match self {
            LifecycleEvent::ViewItem { .. } => EventName::ViewItem,
            LifecycleEvent::ViewItemList { .. } => EventName::ViewItemList,
            LifecycleEvent::AddToCart { .. } => EventName::AddToCart,
            LifecycleEvent::ViewCart { .. } => EventName::ViewCart,
            LifecycleEvent::RemoveFromCart { .. } => EventName::RemoveFromCart,
            LifecycleEvent::BeginCheckout { .. } => EventName::BeginCheckout,
            LifecycleEvent::AddShippingInfo { .. } => EventName::AddShippingInfo,
            LifecycleEvent::AddPaymentInfo { .. } => EventName::AddPaymentInfo,
            LifecycleEvent::Purchase { .. } => EventName::Purchase,
            LifecycleEvent::Refund { .. } => EventName::Refund,
            LifecycleEvent::Search { .. } => EventName::Search,
            LifecycleEvent::ApplyCoupon { .. } => EventName::ApplyCoupon,
        }
    }

    /// Build the envelope for this trigger.
    ///
    /// Listing items are formatted directly here; callers holding a list cache
    /// use [`view_item_list_envelope`] with cached items instead.
    pub fn build_envelope(&self, ctx: &RequestContext) -> EventEnvelope {
        let builder = EventModelBuilder::new(self.event_name()).event_source(PIPELINE_EVENT_SOURCE);

        match self {
            LifecycleEvent::ViewItem { product } => builder
                .value(product.unit_price())
                .currency(&ctx.currency)
                .items(vec![format_product_item(product, 1, 1)])
                .build(ctx),

            LifecycleEvent::ViewItemList { products, .. } => {
                view_item_list_envelope(format_listing(products), ctx)
            }

            LifecycleEvent::AddToCart { product, quantity } => builder
                .value(product.unit_price() * Decimal::from(*quantity))
                .currency(&ctx.currency)
                .items(vec![format_product_item(product, *quantity, 1)])
                .build(ctx),

            LifecycleEvent::ViewCart { cart } => builder
                .value(cart.contents_total)
                .currency(&ctx.currency)
                .shipping(cart.shipping_total)
                .tax(cart.tax_total)
                .items(format_cart_lines(&cart.lines))
                .build(ctx),

            LifecycleEvent::RemoveFromCart { line } => builder
                .value(line.product.unit_price() * Decimal::from(line.quantity))
                .currency(&ctx.currency)
                .items(vec![format_product_item(&line.product, line.quantity, 1)])
                .build(ctx),

            LifecycleEvent::BeginCheckout { cart } => checkout_builder(builder, cart, ctx).build(ctx),

            LifecycleEvent::AddShippingInfo {
                cart,
                shipping_method,
            } => checkout_builder(builder, cart, ctx)
                .extra("shipping_method", shipping_method.as_str())
                .build(ctx),

            LifecycleEvent::AddPaymentInfo {
                cart,
                payment_method,
            } => {
                let payment_type = payment_method
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(UNKNOWN_PAYMENT_TYPE);
                checkout_builder(builder, cart, ctx)
                    .extra("payment_type", payment_type)
                    .build(ctx)
            }

            LifecycleEvent::Purchase { order } => builder
                .transaction_id(&order.number)
                .value(order.total)
                .currency(&order.currency)
                .shipping(order.shipping_total)
                .tax(order.tax_total)
                .items(format_order_lines(order))
                .build(ctx),

            LifecycleEvent::Refund { order, amount } => builder
                .transaction_id(&order.number)
                .value(*amount)
                .currency(&order.currency)
                .build(ctx),

            LifecycleEvent::Search { term } => builder.extra("search_term", term.as_str()).build(ctx),

            LifecycleEvent::ApplyCoupon { code } => builder.extra("coupon", code.as_str()).build(ctx),
        }
    }
}

/// Envelope for a listing view built from already formatted items.
pub fn view_item_list_envelope(items: Vec<ItemRecord>, ctx: &RequestContext) -> EventEnvelope {
    EventModelBuilder::new(EventName::ViewItemList)
        .event_source(PIPELINE_EVENT_SOURCE)
        .currency(&ctx.currency)
        .items(items)
        .build(ctx)
}

/// Format a listing page; each product's rank becomes its list position.
pub fn format_listing(products: &[Product]) -> Vec<ItemRecord> {
    products
        .iter()
        .enumerate()
        .map(|(index, product)| format_product_item(product, 1, index as u32 + 1))
        .collect()
}

fn format_cart_lines(lines: &[CartLine]) -> Vec<ItemRecord> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| format_product_item(&line.product, line.quantity, index as u32 + 1))
        .collect()
}

fn format_order_lines(order: &Order) -> Vec<ItemRecord> {
    let mut items = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        match &line.product {
            Some(product) => {
                let position = items.len() as u32 + 1;
                items.push(format_product_item(product, line.quantity, position));
            }
            None => warn!(
                subsystem = "pipeline",
                order_number = %order.number,
                "Skipping order line without a product"
            ),
        }
    }
    items
}

fn checkout_builder(builder: EventModelBuilder, cart: &Cart, ctx: &RequestContext) -> EventModelBuilder {
    builder
        .transaction_id(generate_transaction_id())
        .value(cart.line_subtotal())
        .currency(&ctx.currency)
        .shipping(cart.shipping_total)
        .tax(cart.tax_total)
        .items(format_cart_lines(&cart.lines))
}

static LAST_TRANSACTION_MICROS: AtomicU64 = AtomicU64::new(0);

/// Time based checkout id: `order_` followed by 13 hex chars (8 for seconds,
/// 5 for microseconds). Ids are strictly increasing within a process.
pub fn generate_transaction_id() -> String {
    let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
    let previous = LAST_TRANSACTION_MICROS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    let micros = now.max(previous + 1);
    format!("order_{:08x}{:05x}", micros / 1_000_000, micros % 1_000_000)
}
