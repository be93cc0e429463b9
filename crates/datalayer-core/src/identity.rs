//! Site and actor resolution.
//!
//! Every formatter call receives a `RequestContext` built fresh for the
//! current request. There is no process-wide "current user".

use serde::{Deserialize, Serialize};

use crate::models::Customer;

/// Static identity of the storefront emitting events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteIdentity {
    #[serde(rename = "siteUrl")]
    pub site_url: String,
    #[serde(rename = "siteName")]
    pub site_name: String,
}

impl SiteIdentity {
    pub fn new(site_url: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
            site_name: site_name.into(),
        }
    }
}

/// An authenticated shopper or operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: u64,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(user_id: u64, roles: Vec<String>) -> Self {
        Self { user_id, roles }
    }

    /// Roles joined the way the storefront reports them (`customer, subscriber`).
    pub fn role_list(&self) -> String {
        self.roles.join(", ")
    }
}

/// Ambient state of one request, passed explicitly through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub site: SiteIdentity,
    pub actor: Option<Actor>,
    /// Shop currency code used for envelopes that carry no order currency.
    pub currency: String,
    /// Decimals money amounts are rounded to.
    pub price_decimals: u32,
}

impl RequestContext {
    pub fn new(site: SiteIdentity, currency: impl Into<String>) -> Self {
        Self {
            site,
            actor: None,
            currency: currency.into(),
            price_decimals: crate::money::DEFAULT_PRICE_DECIMALS,
        }
    }

    pub fn with_actor(mut self, actor: Option<Actor>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_price_decimals(mut self, decimals: u32) -> Self {
        self.price_decimals = decimals;
        self
    }

    /// Resolve site and actor for this request.
    pub fn resolve(&self) -> ResolvedIdentity {
        ResolvedIdentity {
            site_url: self.site.site_url.clone(),
            site_name: self.site.site_name.clone(),
            actor: self.actor.clone(),
        }
    }
}

/// Output of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub site_url: String,
    pub site_name: String,
    pub actor: Option<Actor>,
}

impl ResolvedIdentity {
    /// Envelope customer block; empty when the actor is anonymous.
    pub fn customer(&self) -> Customer {
        match &self.actor {
            Some(actor) => Customer {
                user_id: Some(actor.user_id),
                user_role: Some(actor.role_list()),
            },
            None => Customer::default(),
        }
    }
}
