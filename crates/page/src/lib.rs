//! formsync page façade.
//!
//! Binds the synchronizers and the row autofill to one admin form and routes
//! change events to them. Frontends (the CLI, an embedding webview) talk to
//! `AdminPage` only.

#![forbid(unsafe_code)]

use std::sync::Arc;

use formsync_core::{classes, ids, with_form, CoreResult, FieldRef, SharedForm};
use formsync_http::{ClientConfig, Transport};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

pub use formsync_autofill::{AutofillConfig, AutofillOutcome, RowAutofill};
pub use formsync_sync::{DependentFieldSync, SyncConfig, SyncOutcome};

/// What a trigger caused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    Synced { child: FieldRef, outcome: SyncOutcome },
    Autofilled { row: usize, outcome: AutofillOutcome },
}

pub struct AdminPage {
    form: SharedForm,
    syncs: Vec<DependentFieldSync>,
    autofill: Option<RowAutofill>,
}

impl AdminPage {
    pub fn new(form: SharedForm) -> Self { Self { form, syncs: Vec::new(), autofill: None } }

    pub fn with_sync(mut self, sync: DependentFieldSync) -> Self {
        self.syncs.push(sync);
        self
    }

    pub fn with_autofill(mut self, autofill: RowAutofill) -> Self {
        self.autofill = Some(autofill);
        self
    }

    /// The stock wiring: customer→branch and payment→order where both fields
    /// are present, plus row autofill.
    pub fn standard(form: SharedForm, transport: Arc<dyn Transport>, cfg: &ClientConfig) -> Self {
        let has = |id: &str| with_form(&form, |f| f.field(&FieldRef::id(id)).is_ok());
        let mut page = Self::new(form.clone());
        let pairs = [
            (ids::CUSTOMER, ids::BRANCH, SyncConfig::branches(&cfg.endpoints)),
            (ids::PAYMENT, ids::ORDER, SyncConfig::orders(&cfg.endpoints)),
        ];
        for (parent, child, sync_cfg) in pairs {
            if has(parent) && has(child) {
                let sync_cfg = sync_cfg.with_timeout(cfg.timeout()).with_csrf(cfg.csrf_cookie.as_str(), cfg.csrf_header.as_str());
                page = page.with_sync(DependentFieldSync::new(
                    sync_cfg,
                    form.clone(),
                    FieldRef::id(parent),
                    FieldRef::id(child),
                    transport.clone(),
                ));
            }
        }
        let autofill = RowAutofill::new(AutofillConfig::from_client(cfg), form, transport);
        info!(syncs = page.syncs.len(), "page: standard wiring");
        page.with_autofill(autofill)
    }

    pub fn form(&self) -> &SharedForm { &self.form }
    pub fn syncs(&self) -> &[DependentFieldSync] { &self.syncs }

    /// Page-ready trigger: refresh every child whose parent is already set.
    pub async fn ready(&self) -> Vec<PageEvent> {
        let runs = self.syncs.iter().map(|s| async move {
            s.initialize().await.map(|outcome| PageEvent::Synced { child: s.child().clone(), outcome })
        });
        let runs: Vec<Option<PageEvent>> = stream::iter(runs).buffered(self.syncs.len().max(1)).collect().await;
        runs.into_iter().flatten().collect()
    }

    /// Route a change on `target` to its handler. `None` when nothing listens.
    pub async fn dispatch_change(&self, target: &FieldRef) -> Option<PageEvent> {
        match target {
            FieldRef::Id(_) => {
                let sync = self.syncs.iter().find(|s| s.parent() == target)?;
                let outcome = sync.on_parent_change().await;
                Some(PageEvent::Synced { child: sync.child().clone(), outcome })
            }
            FieldRef::Row { row, class } => {
                let autofill = self.autofill.as_ref()?;
                let outcome = match class.as_str() {
                    classes::PRODUCT => autofill.on_product_change(*row).await,
                    classes::STEM_LENGTH => autofill.on_stem_length_change(*row).await,
                    _ => {
                        debug!(field = %target, "page: no handler");
                        return None;
                    }
                };
                Some(PageEvent::Autofilled { row: *row, outcome })
            }
        }
    }

    /// Set `target` to `value` as a user would, then fire its change event.
    pub async fn change(&self, target: &FieldRef, value: &str) -> CoreResult<Option<PageEvent>> {
        with_form(&self.form, |f| f.set_value(target, value))?;
        Ok(self.dispatch_change(target).await)
    }
}
