//! Client bridge: browser-originated triggers answered with server-formatted data.
//!
//! Every request carries a bridge token that is verified before any action
//! runs. Actions are stateless; nothing is remembered between calls.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use datalayer_core::{
    format_product_item, Cart, CartLine, Error, LifecycleEvent, NoticeStateRepository, Product,
    ProductCatalog, RequestContext, SiteIdentity,
};

use super::dispatcher::PendingEvents;
use super::pipeline::EventPipeline;
use super::tokens::BridgeTokens;

/// Longest client error message stored verbatim.
pub const MAX_JS_ERROR_LEN: usize = 2000;

/// A bridge call as posted by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRequest {
    pub action: String,
    #[serde(default, alias = "authorizationToken", alias = "nonce")]
    pub token: Option<String>,
    #[serde(default)]
    pub payload: JsonValue,
}

/// Tagged bridge result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BridgeResponse {
    pub fn ok(data: Option<JsonValue>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            message: None,
        }
    }

    pub fn fail(err: &BridgeError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.code().to_string()),
            message: Some(err.to_string()),
        }
    }
}

/// Why a bridge call failed.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid or missing authorization token")]
    InvalidToken,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("administrator capability required")]
    Forbidden,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidToken => "invalid_token",
            BridgeError::InvalidInput(_) => "invalid_input",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::Forbidden => "forbidden",
            BridgeError::UnknownAction(_) => "unknown_action",
            BridgeError::Internal(_) => "internal_error",
        }
    }
}

impl From<Error> for BridgeError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => BridgeError::InvalidInput(msg),
            Error::Unauthorized(_) => BridgeError::InvalidToken,
            Error::Forbidden(_) => BridgeError::Forbidden,
            e if e.is_lookup_failure() => BridgeError::NotFound(e.to_string()),
            other => BridgeError::Internal(other.to_string()),
        }
    }
}

/// Shop-wide settings every bridge request shares.
#[derive(Debug, Clone)]
pub struct ShopContext {
    pub site: SiteIdentity,
    pub currency: String,
    pub price_decimals: u32,
}

/// Routes bridge actions to the pipeline.
#[derive(Clone)]
pub struct ClientBridge {
    tokens: Option<BridgeTokens>,
    catalog: Arc<dyn ProductCatalog>,
    notices: Arc<dyn NoticeStateRepository>,
    pipeline: EventPipeline,
    shop: ShopContext,
}

impl ClientBridge {
    pub fn new(
        tokens: Option<BridgeTokens>,
        catalog: Arc<dyn ProductCatalog>,
        notices: Arc<dyn NoticeStateRepository>,
        pipeline: EventPipeline,
        shop: ShopContext,
    ) -> Self {
        Self {
            tokens,
            catalog,
            notices,
            pipeline,
            shop,
        }
    }

    pub fn tokens(&self) -> Option<&BridgeTokens> {
        self.tokens.as_ref()
    }

    /// Handle one call. `admin_id` is set when the caller also presented an
    /// administrator credential.
    pub async fn handle(&self, request: BridgeRequest, admin_id: Option<&str>) -> BridgeResponse {
        match self.route(&request, admin_id).await {
            Ok(data) => BridgeResponse::ok(data),
            Err(err) => {
                debug!(
                    subsystem = "bridge",
                    action = %request.action,
                    code = err.code(),
                    "Bridge call rejected"
                );
                BridgeResponse::fail(&err)
            }
        }
    }

    async fn route(&self, request: &BridgeRequest, admin_id: Option<&str>) -> Result<Option<JsonValue>, BridgeError> {
        // Authorization runs before anything else, including action lookup.
        let tokens = self.tokens.as_ref().ok_or(BridgeError::InvalidToken)?;
        let token = request.token.as_deref().ok_or(BridgeError::InvalidToken)?;
        let claims = tokens.verify(token).map_err(|_| BridgeError::InvalidToken)?;

        let ctx = RequestContext::new(self.shop.site.clone(), self.shop.currency.clone())
            .with_actor(claims.actor)
            .with_price_decimals(self.shop.price_decimals);

        match request.action.as_str() {
            "add_to_cart" => self.cart_change(&request.payload, &ctx, true).await,
            "remove_from_cart" => self.cart_change(&request.payload, &ctx, false).await,
            "get_product_data" => self.product_data(&request.payload).await,
            "add_payment_info" => self.payment_info(&request.payload, &ctx).await,
            "log_js_error" => self.log_js_error(&request.payload).await,
            "dismiss_errors" => self.dismiss_errors(admin_id).await,
            other => Err(BridgeError::UnknownAction(other.to_string())),
        }
    }

    async fn cart_change(&self, payload: &JsonValue, ctx: &RequestContext, add: bool) -> Result<Option<JsonValue>, BridgeError> {
        let product_id = product_id(payload, "productId")?;
        let quantity = quantity(payload, "quantity")?;
        let product = self.lookup(product_id).await?;

        let kind = if add {
            LifecycleEvent::AddToCart { product, quantity }
        } else {
            LifecycleEvent::RemoveFromCart {
                line: CartLine { product, quantity },
            }
        };
        self.dispatch(&kind, ctx).await
    }

    async fn product_data(&self, payload: &JsonValue) -> Result<Option<JsonValue>, BridgeError> {
        let product_id = product_id(payload, "productId")?;
        let product = self.lookup(product_id).await?;
        let item = format_product_item(&product, 1, 1);
        let data = serde_json::to_value(item).map_err(|e| BridgeError::Internal(e.to_string()))?;
        Ok(Some(data))
    }

    async fn payment_info(&self, payload: &JsonValue, ctx: &RequestContext) -> Result<Option<JsonValue>, BridgeError> {
        let payment_method = payload
            .get("paymentType")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        let raw_lines = payload
            .get("lines")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| BridgeError::InvalidInput("lines must be an array".to_string()))?;

        let mut lines = Vec::with_capacity(raw_lines.len());
        for raw in raw_lines {
            let id = product_id(raw, "productId")?;
            let qty = quantity(raw, "quantity")?;
            lines.push((id, qty));
        }

        let mut cart = Cart::default();
        for (id, qty) in lines {
            let product = self.lookup(id).await?;
            cart.lines.push(CartLine {
                product,
                quantity: qty,
            });
        }
        cart.contents_total = cart.line_subtotal();
        cart.shipping_total = decimal_field(payload, "shipping")?.unwrap_or(Decimal::ZERO);
        cart.tax_total = decimal_field(payload, "tax")?.unwrap_or(Decimal::ZERO);

        self.dispatch(&LifecycleEvent::AddPaymentInfo { cart, payment_method }, ctx)
            .await
    }

    async fn log_js_error(&self, payload: &JsonValue) -> Result<Option<JsonValue>, BridgeError> {
        let message = match payload.get("message") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => payload.to_string(),
        };
        let message: String = message.chars().take(MAX_JS_ERROR_LEN).collect();
        self.pipeline
            .dispatcher()
            .record_error(&format!("JS error: {}", message))
            .await;
        Ok(None)
    }

    async fn dismiss_errors(&self, admin_id: Option<&str>) -> Result<Option<JsonValue>, BridgeError> {
        let admin_id = admin_id.ok_or(BridgeError::Forbidden)?;
        self.notices.dismiss(admin_id).await?;
        Ok(None)
    }

    /// Resolve a product; a miss is a data inconsistency and goes to the Error Log.
    async fn lookup(&self, product_id: u64) -> Result<Product, BridgeError> {
        match self.catalog.get(product_id).await? {
            Some(product) => Ok(product),
            None => {
                let err = Error::ProductNotFound(product_id);
                self.pipeline.dispatcher().record_error(&err.to_string()).await;
                Err(err.into())
            }
        }
    }

    async fn dispatch(&self, kind: &LifecycleEvent, ctx: &RequestContext) -> Result<Option<JsonValue>, BridgeError> {
        let mut sink = PendingEvents::new();
        self.pipeline.handle_lifecycle_event(kind, ctx, &mut sink).await?;
        let envelope = sink
            .drain()
            .pop()
            .ok_or_else(|| BridgeError::Internal("no envelope produced".to_string()))?;
        let data = serde_json::to_value(envelope).map_err(|e| BridgeError::Internal(e.to_string()))?;
        Ok(Some(data))
    }
}

/// Integer field given as a JSON number or numeric string.
fn int_field(payload: &JsonValue, field: &str) -> Result<Option<i64>, BridgeError> {
    match payload.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| BridgeError::InvalidInput(format!("{} must be an integer", field))),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BridgeError::InvalidInput(format!("{} must be an integer", field))),
        Some(_) => Err(BridgeError::InvalidInput(format!("{} must be an integer", field))),
    }
}

fn product_id(payload: &JsonValue, field: &str) -> Result<u64, BridgeError> {
    match int_field(payload, field)? {
        Some(id) if id > 0 => Ok(id as u64),
        _ => Err(BridgeError::InvalidInput(
            "Product ID is missing or invalid".to_string(),
        )),
    }
}

/// Missing quantity means one; anything below one is rejected.
fn quantity(payload: &JsonValue, field: &str) -> Result<u32, BridgeError> {
    match int_field(payload, field)? {
        None => Ok(1),
        Some(q) if q >= 1 => u32::try_from(q)
            .map_err(|_| BridgeError::InvalidInput("quantity is too large".to_string())),
        Some(_) => Err(BridgeError::InvalidInput(
            "quantity must be at least 1".to_string(),
        )),
    }
}

fn decimal_field(payload: &JsonValue, field: &str) -> Result<Option<Decimal>, BridgeError> {
    let invalid = || BridgeError::InvalidInput(format!("{} must be a number", field));
    match payload.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n.to_string().parse().map(Some).map_err(|_| invalid()),
        Some(JsonValue::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(BridgeError::InvalidToken.code(), "invalid_token");
        assert_eq!(BridgeError::InvalidInput("x".into()).code(), "invalid_input");
        assert_eq!(BridgeError::NotFound("x".into()).code(), "not_found");
        assert_eq!(BridgeError::Forbidden.code(), "forbidden");
        assert_eq!(BridgeError::UnknownAction("x".into()).code(), "unknown_action");
        assert_eq!(BridgeError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn test_core_errors_map_to_codes() {
        assert_eq!(BridgeError::from(Error::ProductNotFound(1)).code(), "not_found");
        assert_eq!(BridgeError::from(Error::InvalidInput("x".into())).code(), "invalid_input");
        assert_eq!(BridgeError::from(Error::Cache("x".into())).code(), "internal_error");
    }

    #[test]
    fn test_product_id_validation() {
        assert_eq!(product_id(&json!({"productId": 42}), "productId").unwrap(), 42);
        assert_eq!(product_id(&json!({"productId": "42"}), "productId").unwrap(), 42);
        for bad in [json!({"productId": 0}), json!({"productId": -3}), json!({}), json!({"productId": "x"})] {
            assert_eq!(product_id(&bad, "productId").unwrap_err().code(), "invalid_input");
        }
    }

    #[test]
    fn test_quantity_validation() {
        assert_eq!(quantity(&json!({}), "quantity").unwrap(), 1);
        assert_eq!(quantity(&json!({"quantity": 3}), "quantity").unwrap(), 3);
        assert!(quantity(&json!({"quantity": 0}), "quantity").is_err());
        assert!(quantity(&json!({"quantity": 1.5}), "quantity").is_err());
    }

    #[test]
    fn test_request_accepts_token_aliases() {
        let req: BridgeRequest = serde_json::from_value(json!({
            "action": "add_to_cart",
            "authorizationToken": "abc",
            "payload": {"productId": 1}
        }))
        .unwrap();
        assert_eq!(req.token.as_deref(), Some("abc"));

        let req: BridgeRequest = serde_json::from_value(json!({"action": "x"})).unwrap();
        assert!(req.token.is_none());
        assert!(req.payload.is_null());
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(BridgeResponse::ok(Some(json!({"a": 1})))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"a": 1}}));

        let fail = serde_json::to_value(BridgeResponse::fail(&BridgeError::InvalidToken)).unwrap();
        assert_eq!(fail["success"], json!(false));
        assert_eq!(fail["error"], json!("invalid_token"));
    }
}
