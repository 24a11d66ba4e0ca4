//! formsync autofill – default stem length and price for line-item rows.
//!
//! Handler A (product changed) fetches the customer's default stem length
//! and, on success, calls Handler B (stem length changed) directly, which
//! fetches the price. Every lookup is scoped to the row the change happened
//! in.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use formsync_core::{classes, ids, with_form, FieldRef, RequestTicket, Scalar, SharedForm, TicketBook};
use formsync_http::{dispatch, ClientConfig, Request, Transport, TransportError};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutofillConfig {
    pub defaults_endpoint: String,
    pub pricing_endpoint: String,
    /// Form-level customer field.
    pub customer: FieldRef,
    pub csrf_cookie: String,
    pub csrf_header: String,
    pub timeout: Option<Duration>,
}

impl AutofillConfig {
    pub fn from_client(cfg: &ClientConfig) -> Self {
        Self {
            defaults_endpoint: cfg.endpoints.defaults.clone(),
            pricing_endpoint: cfg.endpoints.pricing.clone(),
            customer: FieldRef::id(ids::CUSTOMER),
            csrf_cookie: cfg.csrf_cookie.clone(),
            csrf_header: cfg.csrf_header.clone(),
            timeout: cfg.timeout(),
        }
    }
}

impl Default for AutofillConfig {
    fn default() -> Self { Self::from_client(&ClientConfig::default()) }
}

#[derive(Debug, thiserror::Error)]
enum AutofillError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("decode: {0}")]
    Decode(String),
    #[error("server reported no success")]
    Unsuccessful,
    #[error("response lacks {0}")]
    Missing(&'static str),
}

#[derive(Debug, Deserialize)]
struct DefaultsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    stem_length_cm: Scalar,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    price: Scalar,
}

/// What a handler did to its row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutofillOutcome {
    /// Preconditions not met; nothing requested, nothing written.
    Skipped { reason: String },
    /// Handler A wrote the default and ran the price lookup.
    StemLengthSet { stem_length: String, pricing: Box<AutofillOutcome> },
    PriceSet { price: String },
    /// Lookup answered without a usable price; price field emptied.
    PriceCleared,
    Failed { error: String },
    Superseded,
}

pub struct RowAutofill {
    cfg: AutofillConfig,
    form: SharedForm,
    transport: Arc<dyn Transport>,
    tickets: TicketBook,
}

impl RowAutofill {
    pub fn new(cfg: AutofillConfig, form: SharedForm, transport: Arc<dyn Transport>) -> Self {
        Self { cfg, form, transport, tickets: TicketBook::new() }
    }

    pub fn config(&self) -> &AutofillConfig { &self.cfg }

    /// Handler A: product changed in `row`.
    pub async fn on_product_change(&self, row: usize) -> AutofillOutcome {
        let customer = self.read(&self.cfg.customer);
        let product = self.read(&FieldRef::row(row, classes::PRODUCT));
        let stem_at = FieldRef::row(row, classes::STEM_LENGTH);
        if customer.is_empty() || product.is_empty() {
            // lookups in flight for the old inputs must not land
            self.tickets.invalidate(&stem_at.to_string());
            self.tickets.invalidate(&FieldRef::row(row, classes::PRICE).to_string());
            debug!(row, "autofill: defaults skipped, customer or product missing");
            return skipped("customer or product missing");
        }

        let ticket = self.tickets.issue(&stem_at.to_string(), &product);
        let cookies = with_form(&self.form, |f| f.cookie().to_string());
        let req = Request::form(self.cfg.defaults_endpoint.clone())
            .param("customer_id", customer.as_str())
            .param("product_id", product.as_str())
            .with_csrf(&cookies, &self.cfg.csrf_cookie, &self.cfg.csrf_header);

        let res = dispatch(self.transport.as_ref(), req, self.cfg.timeout).await;
        if !self.tickets.is_current(&ticket) || !self.unchanged(row, &customer, &product, None) {
            return superseded(row, &ticket, "defaults");
        }

        match res.map_err(AutofillError::from).and_then(stem_length_from) {
            Ok(stem_length) => {
                if let Err(e) = with_form(&self.form, |f| f.input_mut(&stem_at).map(|i| i.set_value(stem_length.as_str()))) {
                    warn!(field = %stem_at, error = %e, "autofill: stem length field unavailable");
                    return AutofillOutcome::Failed { error: e.to_string() };
                }
                info!(row, customer = %customer, product = %product, stem_length = %stem_length, "autofill: default stem length set");
                let pricing = self.on_stem_length_change(row).await;
                AutofillOutcome::StemLengthSet { stem_length, pricing: Box::new(pricing) }
            }
            Err(e) => {
                warn!(row, customer = %customer, product = %product, error = %e, "autofill: defaults lookup failed");
                AutofillOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Handler B: stem length changed in `row`.
    pub async fn on_stem_length_change(&self, row: usize) -> AutofillOutcome {
        let customer = self.read(&self.cfg.customer);
        let product = self.read(&FieldRef::row(row, classes::PRODUCT));
        let stem_at = FieldRef::row(row, classes::STEM_LENGTH);
        let price_at = FieldRef::row(row, classes::PRICE);
        // the stem length now in the row beats a default still in flight
        self.tickets.invalidate(&stem_at.to_string());
        let stem_length = with_form(&self.form, |f| {
            f.input(&stem_at).ok().filter(|i| i.numeric().is_some()).map(|i| i.value().trim().to_string())
        });
        let Some(stem_length) = stem_length.filter(|_| !customer.is_empty() && !product.is_empty()) else {
            self.tickets.invalidate(&price_at.to_string());
            debug!(row, "autofill: pricing skipped, customer, product or stem length missing");
            return skipped("customer, product or stem length missing");
        };

        let ticket = self.tickets.issue(&price_at.to_string(), &stem_length);
        let req = Request::query(self.cfg.pricing_endpoint.clone())
            .param("customer_id", customer.as_str())
            .param("product_id", product.as_str())
            .param("stem_length", stem_length.as_str());

        let res = dispatch(self.transport.as_ref(), req, self.cfg.timeout).await;
        if !self.tickets.is_current(&ticket) || !self.unchanged(row, &customer, &product, Some(&stem_length)) {
            return superseded(row, &ticket, "pricing");
        }

        let (price, outcome) = match res.map_err(AutofillError::from).and_then(price_from) {
            Ok(Some(price)) => {
                info!(row, customer = %customer, product = %product, stem_length = %stem_length, price = %price, "autofill: price set");
                (price.clone(), AutofillOutcome::PriceSet { price })
            }
            Ok(None) => {
                info!(row, customer = %customer, product = %product, stem_length = %stem_length, "autofill: no price, cleared");
                (String::new(), AutofillOutcome::PriceCleared)
            }
            Err(e) => {
                warn!(row, customer = %customer, product = %product, error = %e, "autofill: pricing lookup failed");
                (String::new(), AutofillOutcome::Failed { error: e.to_string() })
            }
        };
        // a stale price is worse than none
        if let Err(e) = with_form(&self.form, |f| f.input_mut(&price_at).map(|i| i.set_value(price))) {
            warn!(field = %price_at, error = %e, "autofill: price field unavailable");
        }
        outcome
    }

    /// Whether the row still holds the inputs a lookup was issued for.
    fn unchanged(&self, row: usize, customer: &str, product: &str, stem_length: Option<&str>) -> bool {
        self.read(&self.cfg.customer) == customer
            && self.read(&FieldRef::row(row, classes::PRODUCT)) == product
            && stem_length.map_or(true, |s| self.read(&FieldRef::row(row, classes::STEM_LENGTH)).trim() == s)
    }

    fn read(&self, at: &FieldRef) -> String {
        with_form(&self.form, |f| f.value(at)).unwrap_or_else(|e| {
            warn!(field = %at, error = %e, "autofill: field lookup failed");
            String::new()
        })
    }
}

fn skipped(reason: &str) -> AutofillOutcome { AutofillOutcome::Skipped { reason: reason.to_string() } }

fn superseded(row: usize, ticket: &RequestTicket, lookup: &'static str) -> AutofillOutcome {
    counter!("formsync_superseded_total", 1u64);
    debug!(row, lookup, tag = %ticket.tag(), generation = ticket.generation(), "autofill: response superseded");
    AutofillOutcome::Superseded
}

fn stem_length_from(body: serde_json::Value) -> Result<String, AutofillError> {
    let r: DefaultsResponse = serde_json::from_value(body).map_err(|e| AutofillError::Decode(e.to_string()))?;
    if !r.success {
        return Err(AutofillError::Unsuccessful);
    }
    match r.stem_length_cm {
        Scalar::Number(n) => Ok(n.to_string()),
        Scalar::Text(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(AutofillError::Missing("stem_length_cm")),
    }
}

/// `Ok(None)` when the server answered but offered no usable price.
fn price_from(body: serde_json::Value) -> Result<Option<String>, AutofillError> {
    let r: PricingResponse = serde_json::from_value(body).map_err(|e| AutofillError::Decode(e.to_string()))?;
    if !r.success {
        return Ok(None);
    }
    Ok(match r.price {
        Scalar::Number(n) => Some(n.to_string()),
        Scalar::Text(s) if s.trim().parse::<f64>().map(|v| v.is_finite()).unwrap_or(false) => Some(s.trim().to_string()),
        _ => None,
    })
}
