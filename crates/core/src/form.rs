//! DOM-like field tree: top-level fields by id, line-item rows by class.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult, InputField, SelectField};

/// Ids of the top-level fields the server templates render.
pub mod ids {
    pub const CUSTOMER: &str = "id_customer";
    pub const BRANCH: &str = "id_branch";
    pub const PAYMENT: &str = "id_payment";
    pub const ORDER: &str = "id_order";
}

/// Classes of the fields inside a line-item row.
pub mod classes {
    pub const PRODUCT: &str = "product-select";
    pub const STEM_LENGTH: &str = "stem-length-input";
    pub const PRICE: &str = "price-input";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Field {
    Select(SelectField),
    Input(InputField),
}

impl Field {
    pub fn value(&self) -> &str {
        match self {
            Field::Select(s) => s.value(),
            Field::Input(i) => i.value(),
        }
    }
}

impl From<SelectField> for Field {
    fn from(v: SelectField) -> Self { Field::Select(v) }
}

impl From<InputField> for Field {
    fn from(v: InputField) -> Self { Field::Input(v) }
}

/// Address of a field: a top-level id, or a class inside a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRef {
    Id(String),
    Row { row: usize, class: String },
}

impl FieldRef {
    pub fn id(id: impl Into<String>) -> Self { FieldRef::Id(id.into()) }
    pub fn row(row: usize, class: impl Into<String>) -> Self { FieldRef::Row { row, class: class.into() } }

    /// Row index for row-scoped refs.
    pub fn row_index(&self) -> Option<usize> {
        match self {
            FieldRef::Row { row, .. } => Some(*row),
            FieldRef::Id(_) => None,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Id(id) => write!(f, "#{}", id),
            FieldRef::Row { row, class } => write!(f, "row[{}].{}", row, class),
        }
    }
}

/// One line item. Fields are keyed by class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    fields: BTreeMap<String, Field>,
}

impl Row {
    pub fn new() -> Self { Self::default() }

    /// Product select offering `products` (value, label), plus empty stem
    /// length and price inputs.
    pub fn line_item<'a>(products: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let opts = std::iter::once(("", crate::PLACEHOLDER_LABEL)).chain(products);
        Self::new()
            .with_field(classes::PRODUCT, SelectField::with_options(opts, None))
            .with_field(classes::STEM_LENGTH, InputField::default())
            .with_field(classes::PRICE, InputField::default())
    }

    pub fn with_field(mut self, class: impl Into<String>, field: impl Into<Field>) -> Self {
        self.fields.insert(class.into(), field.into());
        self
    }

    pub fn get(&self, class: &str) -> Option<&Field> { self.fields.get(class) }
    pub fn get_mut(&mut self, class: &str) -> Option<&mut Field> { self.fields.get_mut(class) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    fields: BTreeMap<String, Field>,
    rows: Vec<Row>,
    /// Ambient cookie string (`name=value; name2=value2`).
    cookie: String,
}

impl Form {
    pub fn new() -> Self { Self::default() }

    pub fn with_field(mut self, id: impl Into<String>, field: impl Into<Field>) -> Self {
        self.insert(id, field);
        self
    }

    pub fn with_row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, field: impl Into<Field>) { self.fields.insert(id.into(), field.into()); }

    /// Append a row and return its index.
    pub fn push_row(&mut self, row: Row) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn rows(&self) -> &[Row] { &self.rows }
    pub fn cookie(&self) -> &str { &self.cookie }
    pub fn set_cookie(&mut self, cookie: impl Into<String>) { self.cookie = cookie.into(); }

    pub fn field(&self, at: &FieldRef) -> CoreResult<&Field> {
        let found = match at {
            FieldRef::Id(id) => self.fields.get(id),
            FieldRef::Row { row, class } => self.rows.get(*row).and_then(|r| r.get(class)),
        };
        found.ok_or_else(|| CoreError::UnknownField(at.to_string()))
    }

    pub fn field_mut(&mut self, at: &FieldRef) -> CoreResult<&mut Field> {
        let found = match at {
            FieldRef::Id(id) => self.fields.get_mut(id),
            FieldRef::Row { row, class } => self.rows.get_mut(*row).and_then(|r| r.get_mut(class)),
        };
        found.ok_or_else(|| CoreError::UnknownField(at.to_string()))
    }

    pub fn value(&self, at: &FieldRef) -> CoreResult<String> { Ok(self.field(at)?.value().to_string()) }

    pub fn select(&self, at: &FieldRef) -> CoreResult<&SelectField> {
        match self.field(at)? {
            Field::Select(s) => Ok(s),
            Field::Input(_) => Err(wrong_kind(at, "select")),
        }
    }

    pub fn select_mut(&mut self, at: &FieldRef) -> CoreResult<&mut SelectField> {
        match self.field_mut(at)? {
            Field::Select(s) => Ok(s),
            Field::Input(_) => Err(wrong_kind(at, "select")),
        }
    }

    pub fn input(&self, at: &FieldRef) -> CoreResult<&InputField> {
        match self.field(at)? {
            Field::Input(i) => Ok(i),
            Field::Select(_) => Err(wrong_kind(at, "input")),
        }
    }

    pub fn input_mut(&mut self, at: &FieldRef) -> CoreResult<&mut InputField> {
        match self.field_mut(at)? {
            Field::Input(i) => Ok(i),
            Field::Select(_) => Err(wrong_kind(at, "input")),
        }
    }

    /// Set a field the way a user would: pick an option or type a value.
    pub fn set_value(&mut self, at: &FieldRef, value: &str) -> CoreResult<()> {
        match self.field_mut(at)? {
            Field::Select(s) => {
                if s.select(value) {
                    Ok(())
                } else {
                    Err(CoreError::UnknownOption { field: at.to_string(), value: value.to_string() })
                }
            }
            Field::Input(i) => {
                i.set_value(value);
                Ok(())
            }
        }
    }
}

fn wrong_kind(at: &FieldRef, expected: &'static str) -> CoreError {
    CoreError::WrongKind { field: at.to_string(), expected }
}

/// Form shared between the page and its handlers. Never hold the lock across an await.
pub type SharedForm = Arc<Mutex<Form>>;

pub fn shared(form: Form) -> SharedForm { Arc::new(Mutex::new(form)) }

/// Run `f` with the form locked. A poisoned lock still yields the form; the
/// tree has no cross-field invariant a panicking writer could break.
pub fn with_form<R>(form: &SharedForm, f: impl FnOnce(&mut Form) -> R) -> R {
    let mut guard = form.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}
