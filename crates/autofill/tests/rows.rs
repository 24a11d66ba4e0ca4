#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use formsync_autofill::{AutofillConfig, AutofillOutcome, RowAutofill};
use formsync_core::{classes, ids, shared, with_form, FieldRef, Form, Row, SelectField, SharedForm, PLACEHOLDER_LABEL};
use formsync_http::{MockRoute, MockTransport, RequestStyle, TransportError};
use serde_json::json;

const DEFAULTS: &str = "/orders/get-defaults/";
const PRICING: &str = "/orders/get-customer-pricing/";

fn line_item_form(customer: Option<&str>, rows: usize, cookie: &str) -> SharedForm {
    let customers = SelectField::with_options([("", PLACEHOLDER_LABEL), ("C1", "Acme")], customer);
    let mut f = Form::new().with_field(ids::CUSTOMER, customers).with_cookie(cookie);
    for _ in 0..rows {
        f.push_row(Row::line_item([("P1", "Rose"), ("P2", "Tulip")]));
    }
    shared(f)
}

fn set(form: &SharedForm, at: FieldRef, value: &str) {
    with_form(form, |f| f.set_value(&at, value)).expect("set field");
}

fn get(form: &SharedForm, row: usize, class: &str) -> String {
    with_form(form, |f| f.value(&FieldRef::row(row, class))).expect("row field")
}

fn autofill(form: &SharedForm, t: Arc<MockTransport>) -> RowAutofill {
    RowAutofill::new(AutofillConfig::default(), form.clone(), t)
}

#[tokio::test]
async fn default_stem_length_chains_into_pricing() {
    let form = line_item_form(Some("C1"), 1, "csrftoken=abc%20def");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    let t = Arc::new(
        MockTransport::new()
            .route(MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 45})))
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": 12.5}))),
    );
    let a = autofill(&form, t.clone());

    let out = a.on_product_change(0).await;
    assert_eq!(
        out,
        AutofillOutcome::StemLengthSet {
            stem_length: "45".into(),
            pricing: Box::new(AutofillOutcome::PriceSet { price: "12.5".into() }),
        }
    );
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "45");
    assert_eq!(get(&form, 0, classes::PRICE), "12.5");

    let defaults = t.requests_to(DEFAULTS);
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].style, RequestStyle::Form);
    assert_eq!(defaults[0].param_value("customer_id"), Some("C1"));
    assert_eq!(defaults[0].param_value("product_id"), Some("P1"));
    assert_eq!(defaults[0].header_value("X-CSRFToken"), Some("abc def"));

    let pricing = t.requests_to(PRICING);
    assert_eq!(pricing.len(), 1);
    assert_eq!(pricing[0].style, RequestStyle::Query);
    assert_eq!(pricing[0].param_value("customer_id"), Some("C1"));
    assert_eq!(pricing[0].param_value("product_id"), Some("P1"));
    assert_eq!(pricing[0].param_value("stem_length"), Some("45"));
}

#[tokio::test]
async fn missing_customer_skips_without_request() {
    let form = line_item_form(None, 1, "");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    let t = Arc::new(MockTransport::new());
    let a = autofill(&form, t.clone());
    assert!(matches!(a.on_product_change(0).await, AutofillOutcome::Skipped { .. }));
    assert!(t.requests().is_empty());
}

#[tokio::test]
async fn missing_csrf_cookie_still_requests() {
    let form = line_item_form(Some("C1"), 1, "sessionid=1");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P2");
    let t = Arc::new(MockTransport::new().route(MockRoute::ok(DEFAULTS, json!({"success": false}))));
    let a = autofill(&form, t.clone());
    assert!(matches!(a.on_product_change(0).await, AutofillOutcome::Failed { .. }));
    let sent = t.requests_to(DEFAULTS);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header_value("X-CSRFToken"), None);
}

#[tokio::test]
async fn failed_defaults_leave_stem_length_untouched() {
    let form = line_item_form(Some("C1"), 1, "csrftoken=t");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(0, classes::STEM_LENGTH), "50");
    let t = Arc::new(MockTransport::new().route(MockRoute::fail(DEFAULTS, TransportError::Network("refused".into()))));
    let a = autofill(&form, t.clone());
    assert!(matches!(a.on_product_change(0).await, AutofillOutcome::Failed { .. }));
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "50");
    assert!(t.requests_to(PRICING).is_empty());
}

#[tokio::test]
async fn unsuccessful_pricing_clears_stale_price() {
    let form = line_item_form(Some("C1"), 1, "");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(0, classes::STEM_LENGTH), "60");
    set(&form, FieldRef::row(0, classes::PRICE), "9.99");
    let t = Arc::new(MockTransport::new().route(MockRoute::ok(PRICING, json!({"success": false}))));
    let a = autofill(&form, t);
    assert_eq!(a.on_stem_length_change(0).await, AutofillOutcome::PriceCleared);
    assert_eq!(get(&form, 0, classes::PRICE), "");
}

#[tokio::test]
async fn pricing_failure_clears_price() {
    let form = line_item_form(Some("C1"), 1, "");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(0, classes::STEM_LENGTH), "60");
    set(&form, FieldRef::row(0, classes::PRICE), "9.99");
    let t = Arc::new(MockTransport::new().route(MockRoute::fail(
        PRICING,
        TransportError::Status { status: 502, path: PRICING.into() },
    )));
    let a = autofill(&form, t);
    assert!(matches!(a.on_stem_length_change(0).await, AutofillOutcome::Failed { .. }));
    assert_eq!(get(&form, 0, classes::PRICE), "");
}

#[tokio::test]
async fn non_numeric_stem_length_skips_pricing() {
    let form = line_item_form(Some("C1"), 1, "");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(0, classes::STEM_LENGTH), "long");
    set(&form, FieldRef::row(0, classes::PRICE), "4.00");
    let t = Arc::new(MockTransport::new());
    let a = autofill(&form, t.clone());
    assert!(matches!(a.on_stem_length_change(0).await, AutofillOutcome::Skipped { .. }));
    assert_eq!(get(&form, 0, classes::PRICE), "4.00");
    assert!(t.requests().is_empty());
}

#[tokio::test]
async fn rows_do_not_cross_update() {
    let form = line_item_form(Some("C1"), 2, "csrftoken=t");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(1, classes::PRODUCT), "P2");
    set(&form, FieldRef::row(1, classes::PRICE), "7.00");
    let t = Arc::new(
        MockTransport::new()
            .route(MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 40})).when("product_id", "P1"))
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": "2.50"})).when("product_id", "P1")),
    );
    let a = autofill(&form, t);
    a.on_product_change(0).await;
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "40");
    assert_eq!(get(&form, 0, classes::PRICE), "2.50");
    assert_eq!(get(&form, 1, classes::STEM_LENGTH), "");
    assert_eq!(get(&form, 1, classes::PRICE), "7.00");
}

#[tokio::test]
async fn later_pricing_wins_within_a_row() {
    let form = line_item_form(Some("C1"), 1, "");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(0, classes::STEM_LENGTH), "40");
    let t = Arc::new(
        MockTransport::new()
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": 1.0})).when("stem_length", "40").delay_ms(150))
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": 2.0})).when("stem_length", "80").delay_ms(10)),
    );
    let a = autofill(&form, t);

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        set(&form, FieldRef::row(0, classes::STEM_LENGTH), "80");
        a.on_stem_length_change(0).await
    };
    let (first, second) = tokio::join!(a.on_stem_length_change(0), second);
    assert_eq!(first, AutofillOutcome::Superseded);
    assert_eq!(second, AutofillOutcome::PriceSet { price: "2.0".into() });
    assert_eq!(get(&form, 0, classes::PRICE), "2.0");
}

#[tokio::test]
async fn clearing_product_drops_pending_default() {
    let form = line_item_form(Some("C1"), 1, "csrftoken=t");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    let t = Arc::new(
        MockTransport::new()
            .route(MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 45})).delay_ms(100))
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": 9.5}))),
    );
    let a = autofill(&form, t.clone());

    // the field is emptied but no handler runs yet
    let clear = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        set(&form, FieldRef::row(0, classes::PRODUCT), "");
    };
    let (first, _) = tokio::join!(a.on_product_change(0), clear);
    assert_eq!(first, AutofillOutcome::Superseded);
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "");
    assert_eq!(get(&form, 0, classes::PRICE), "");
    assert!(t.requests_to(PRICING).is_empty());
}

#[tokio::test]
async fn skipped_product_change_invalidates_pending_default() {
    let form = line_item_form(Some("C1"), 1, "csrftoken=t");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    let t = Arc::new(MockTransport::new().route(
        MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 45})).delay_ms(100),
    ));
    let a = autofill(&form, t);

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        set(&form, FieldRef::id(ids::CUSTOMER), "");
        a.on_product_change(0).await
    };
    let (first, second) = tokio::join!(a.on_product_change(0), second);
    assert_eq!(first, AutofillOutcome::Superseded);
    assert!(matches!(second, AutofillOutcome::Skipped { .. }));
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "");
}

#[tokio::test]
async fn clearing_stem_length_drops_pending_price() {
    let form = line_item_form(Some("C1"), 1, "");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    set(&form, FieldRef::row(0, classes::STEM_LENGTH), "40");
    let t = Arc::new(MockTransport::new().route(MockRoute::ok(PRICING, json!({"success": true, "price": 9.5})).delay_ms(100)));
    let a = autofill(&form, t);

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        set(&form, FieldRef::row(0, classes::STEM_LENGTH), "");
        a.on_stem_length_change(0).await
    };
    let (first, second) = tokio::join!(a.on_stem_length_change(0), second);
    assert_eq!(first, AutofillOutcome::Superseded);
    assert!(matches!(second, AutofillOutcome::Skipped { .. }));
    assert_eq!(get(&form, 0, classes::PRICE), "");
}

#[tokio::test]
async fn user_stem_length_beats_pending_default() {
    let form = line_item_form(Some("C1"), 1, "csrftoken=t");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    let t = Arc::new(
        MockTransport::new()
            .route(MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 45})).delay_ms(100))
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": 3.0})).when("stem_length", "70")),
    );
    let a = autofill(&form, t.clone());

    let edit = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        set(&form, FieldRef::row(0, classes::STEM_LENGTH), "70");
        a.on_stem_length_change(0).await
    };
    let (first, edit) = tokio::join!(a.on_product_change(0), edit);
    assert_eq!(first, AutofillOutcome::Superseded);
    assert_eq!(edit, AutofillOutcome::PriceSet { price: "3.0".into() });
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "70");
    assert_eq!(get(&form, 0, classes::PRICE), "3.0");
    assert_eq!(t.requests_to(PRICING).len(), 1);
}

#[tokio::test]
async fn later_product_wins_within_a_row() {
    let form = line_item_form(Some("C1"), 1, "csrftoken=t");
    set(&form, FieldRef::row(0, classes::PRODUCT), "P1");
    let t = Arc::new(
        MockTransport::new()
            .route(MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 45})).when("product_id", "P1").delay_ms(150))
            .route(MockRoute::ok(DEFAULTS, json!({"success": true, "stem_length_cm": 60})).when("product_id", "P2").delay_ms(10))
            .route(MockRoute::ok(PRICING, json!({"success": true, "price": "5.00"}))),
    );
    let a = autofill(&form, t);

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        set(&form, FieldRef::row(0, classes::PRODUCT), "P2");
        a.on_product_change(0).await
    };
    let (first, second) = tokio::join!(a.on_product_change(0), second);
    assert_eq!(first, AutofillOutcome::Superseded);
    assert_eq!(
        second,
        AutofillOutcome::StemLengthSet {
            stem_length: "60".into(),
            pricing: Box::new(AutofillOutcome::PriceSet { price: "5.00".into() }),
        }
    );
    assert_eq!(get(&form, 0, classes::STEM_LENGTH), "60");
}
