//! formsync sync – keeps a dependent select consistent with its parent field.
//!
//! One `DependentFieldSync` per parent/child pair. The branch and order
//! dropdowns differ only in their `SyncConfig`.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use formsync_core::{csrf, with_form, CoreError, FieldRef, OptionFormat, SelectField, SharedForm, TicketBook};
use formsync_http::{dispatch, Endpoints, Request, RequestStyle, Transport, TransportError};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

/// What varies between dependent dropdowns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub endpoint: String,
    /// Parameter carrying the parent value.
    pub param: String,
    pub style: RequestStyle,
    pub format: OptionFormat,
    /// Plural noun for the loading and error placeholders ("branches").
    pub noun: String,
    /// Disable the child while the parent is empty.
    pub disable_when_empty: bool,
    pub timeout: Option<Duration>,
    /// Cookie and header for the CSRF token sent with `Form` requests.
    pub csrf_cookie: String,
    pub csrf_header: String,
}

impl SyncConfig {
    /// Customer → branch.
    pub fn branches(endpoints: &Endpoints) -> Self {
        Self {
            endpoint: endpoints.branches.clone(),
            param: "customer_id".into(),
            style: RequestStyle::Query,
            format: OptionFormat::Name,
            noun: "branches".into(),
            disable_when_empty: false,
            timeout: None,
            csrf_cookie: csrf::DEFAULT_COOKIE.into(),
            csrf_header: csrf::DEFAULT_HEADER.into(),
        }
    }

    /// Payment → outstanding order.
    pub fn orders(endpoints: &Endpoints) -> Self {
        Self {
            endpoint: endpoints.orders.clone(),
            param: "payment_id".into(),
            style: RequestStyle::Query,
            format: OptionFormat::OrderSummary,
            noun: "orders".into(),
            disable_when_empty: false,
            timeout: None,
            csrf_cookie: csrf::DEFAULT_COOKIE.into(),
            csrf_header: csrf::DEFAULT_HEADER.into(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    pub fn with_style(mut self, style: RequestStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_csrf(mut self, cookie: impl Into<String>, header: impl Into<String>) -> Self {
        self.csrf_cookie = cookie.into();
        self.csrf_header = header.into();
        self
    }

    pub fn disable_when_empty(mut self, on: bool) -> Self {
        self.disable_when_empty = on;
        self
    }

    pub fn loading_label(&self) -> String { format!("Loading {}…", self.noun) }
    pub fn error_label(&self) -> String { format!("Error loading {}", self.noun) }
}

#[derive(Debug, thiserror::Error)]
enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Record(#[from] CoreError),
}

/// Result of one sync, for logs and tests. Failures already landed in the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Parent empty; child reset to the placeholder.
    Cleared,
    Populated { options: usize, preserved: bool },
    Failed { error: String },
    /// A newer sync for the same child was issued while this one was in flight.
    Superseded,
}

pub struct DependentFieldSync {
    cfg: SyncConfig,
    form: SharedForm,
    parent: FieldRef,
    child: FieldRef,
    transport: Arc<dyn Transport>,
    tickets: TicketBook,
}

impl DependentFieldSync {
    pub fn new(
        cfg: SyncConfig,
        form: SharedForm,
        parent: FieldRef,
        child: FieldRef,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self { cfg, form, parent, child, transport, tickets: TicketBook::new() }
    }

    pub fn config(&self) -> &SyncConfig { &self.cfg }
    pub fn parent(&self) -> &FieldRef { &self.parent }
    pub fn child(&self) -> &FieldRef { &self.child }

    /// Parent change: read the parent fresh, no preserved selection.
    pub async fn on_parent_change(&self) -> SyncOutcome {
        let parent = self.read(&self.parent);
        self.sync(&parent, None).await
    }

    /// Page ready: when the parent already holds a value (editing a saved
    /// record), refresh the child and keep its saved value if still offered.
    /// Returns `None` when there was nothing to do.
    pub async fn initialize(&self) -> Option<SyncOutcome> {
        let parent = self.read(&self.parent);
        if parent.is_empty() {
            return None;
        }
        let existing = self.read(&self.child);
        let preserve = (!existing.is_empty()).then_some(existing);
        Some(self.sync(&parent, preserve.as_deref()).await)
    }

    /// Recompute the child's options for `parent_value`.
    pub async fn sync(&self, parent_value: &str, preserve: Option<&str>) -> SyncOutcome {
        let key = self.child.to_string();
        if parent_value.is_empty() {
            self.tickets.invalidate(&key);
            let disabled = self.cfg.disable_when_empty;
            self.update_child(|f| f.reset(disabled));
            debug!(child = %self.child, disabled, "sync: parent cleared");
            return SyncOutcome::Cleared;
        }

        let ticket = self.tickets.issue(&key, parent_value);
        let loading = self.cfg.loading_label();
        self.update_child(|f| f.show_loading(&loading));

        let t0 = Instant::now();
        let mut req = Request::new(self.cfg.style, self.cfg.endpoint.clone()).param(self.cfg.param.clone(), parent_value);
        if self.cfg.style == RequestStyle::Form {
            let cookies = with_form(&self.form, |f| f.cookie().to_string());
            req = req.with_csrf(&cookies, &self.cfg.csrf_cookie, &self.cfg.csrf_header);
        }
        let res = dispatch(self.transport.as_ref(), req, self.cfg.timeout).await;

        if !self.tickets.is_current(&ticket) {
            counter!("formsync_superseded_total", 1u64);
            debug!(child = %self.child, parent = %ticket.tag(), generation = ticket.generation(), "sync: response superseded");
            return SyncOutcome::Superseded;
        }

        let entries = res
            .map_err(SyncError::from)
            .and_then(|body| self.cfg.format.entries(&body).map_err(SyncError::from));
        match entries {
            Ok(entries) => {
                let options = entries.len();
                let mut preserved = false;
                self.update_child(|f| {
                    f.populate(entries, preserve);
                    preserved = preserve.map(|p| f.value() == p).unwrap_or(false);
                });
                info!(
                    child = %self.child, parent = %parent_value, options, preserved,
                    took_ms = %t0.elapsed().as_millis(), "sync: options loaded"
                );
                SyncOutcome::Populated { options, preserved }
            }
            Err(e) => {
                warn!(
                    child = %self.child, parent = %parent_value, endpoint = %self.cfg.endpoint,
                    error = %e, "sync: failed to load options"
                );
                let label = self.cfg.error_label();
                self.update_child(|f| f.show_error(&label));
                SyncOutcome::Failed { error: e.to_string() }
            }
        }
    }

    fn read(&self, at: &FieldRef) -> String {
        with_form(&self.form, |f| f.value(at)).unwrap_or_else(|e| {
            warn!(field = %at, error = %e, "sync: field lookup failed");
            String::new()
        })
    }

    fn update_child(&self, op: impl FnOnce(&mut SelectField)) {
        with_form(&self.form, |f| match f.select_mut(&self.child) {
            Ok(field) => op(field),
            Err(e) => warn!(field = %self.child, error = %e, "sync: child field unavailable"),
        });
    }
}
