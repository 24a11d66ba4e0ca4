//! Option records served by the list endpoints and how they become labels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// JSON scalar rendered as text. Ids arrive as numbers, decimals usually as strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    #[default]
    Null,
}

impl Scalar {
    pub fn is_null(&self) -> bool { matches!(self, Scalar::Null) }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Null => Ok(()),
        }
    }
}

/// `{id, name}` from get-branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: Scalar,
    pub name: String,
}

/// Outstanding order from get-orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Scalar,
    #[serde(default)]
    pub invoice_code: Scalar,
    #[serde(default)]
    pub total_amount: Scalar,
    #[serde(default)]
    pub currency: Scalar,
    #[serde(default)]
    pub outstanding_amount: Scalar,
}

impl OrderRecord {
    pub fn label(&self) -> String {
        format!(
            "{} - {} {} (Outstanding: {})",
            self.invoice_code, self.total_amount, self.currency, self.outstanding_amount
        )
    }
}

/// How a record returned by a list endpoint turns into `(value, label)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionFormat {
    /// Plain `name` (branches).
    Name,
    /// `code - amount currency (Outstanding: X)` (orders).
    OrderSummary,
}

impl OptionFormat {
    pub fn entry(&self, record: &serde_json::Value) -> CoreResult<(String, String)> {
        let (id, label) = match self {
            OptionFormat::Name => {
                let r: BranchRecord = decode(record)?;
                (r.id, r.name)
            }
            OptionFormat::OrderSummary => {
                let r: OrderRecord = decode(record)?;
                let label = r.label();
                (r.id, label)
            }
        };
        if id.is_null() {
            return Err(CoreError::Record("record id is null".into()));
        }
        Ok((id.to_string(), label))
    }

    /// Entries for a whole response body, which must be a JSON array.
    pub fn entries(&self, body: &serde_json::Value) -> CoreResult<Vec<(String, String)>> {
        let items = body
            .as_array()
            .ok_or_else(|| CoreError::Record(format!("expected a list, got {}", kind_of(body))))?;
        items.iter().map(|r| self.entry(r)).collect()
    }
}

fn decode<T: serde::de::DeserializeOwned>(v: &serde_json::Value) -> CoreResult<T> {
    T::deserialize(v).map_err(|e| CoreError::Record(e.to_string()))
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}
