//! formsync core types
//!
//! The field tree the form helpers operate on, the option records served by
//! the admin endpoints, and the request tickets used to drop superseded
//! responses.

#![forbid(unsafe_code)]

pub mod csrf;
pub mod field;
pub mod form;
pub mod records;
pub mod ticket;

pub use field::{FieldState, InputField, SelectField, SelectOption, PLACEHOLDER_LABEL};
pub use form::{classes, ids, shared, with_form, Field, FieldRef, Form, Row, SharedForm};
pub use records::{BranchRecord, OptionFormat, OrderRecord, Scalar};
pub use ticket::{RequestTicket, TicketBook};

/// Errors raised while addressing the field tree or decoding records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("field {field} is not a {expected}")]
    WrongKind { field: String, expected: &'static str },
    #[error("no option with value {value:?} in {field}")]
    UnknownOption { field: String, value: String },
    #[error("malformed record: {0}")]
    Record(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

pub mod prelude {
    pub use super::{
        with_form, CoreError, CoreResult, Field, FieldRef, FieldState, Form, InputField, OptionFormat, Row,
        SelectField, SelectOption, SharedForm,
    };
}
