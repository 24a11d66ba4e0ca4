//! Select and input fields.
//!
//! A `SelectField` keeps at most one option selected at any time. "No
//! selection" is the empty-value placeholder being selected.

use serde::{Deserialize, Serialize};

/// Label of the empty-value option meaning "nothing selected".
pub const PLACEHOLDER_LABEL: &str = "---------";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
    pub disabled: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self { value: value.into(), label: label.into(), selected: false, disabled: false }
    }

    pub fn placeholder() -> Self { Self::new("", PLACEHOLDER_LABEL) }

    pub fn is_placeholder(&self) -> bool { self.value.is_empty() }
}

/// Lifecycle of a dependent select.
///
/// `Empty -> Loading -> {Populated | Error}`, and back to `Loading` on every
/// new parent value. A cleared parent returns the field to `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    #[default]
    Empty,
    Loading,
    Populated,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectField {
    options: Vec<SelectOption>,
    disabled: bool,
    loading: bool,
    state: FieldState,
}

impl Default for SelectField {
    fn default() -> Self { Self::new() }
}

impl SelectField {
    /// A field holding only the selected placeholder.
    pub fn new() -> Self {
        let mut placeholder = SelectOption::placeholder();
        placeholder.selected = true;
        Self { options: vec![placeholder], disabled: false, loading: false, state: FieldState::Empty }
    }

    /// A field as rendered by the server, e.g. when editing a saved record.
    ///
    /// Options are taken in order; `selected` picks one of them, falling back
    /// to the placeholder when it is absent.
    pub fn with_options<I, V, L>(options: I, selected: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<String>,
        L: Into<String>,
    {
        let options: Vec<SelectOption> = options.into_iter().map(|(v, l)| SelectOption::new(v, l)).collect();
        let state = if options.iter().any(|o| !o.is_placeholder()) { FieldState::Populated } else { FieldState::Empty };
        let mut field = Self { options, disabled: false, loading: false, state };
        field.mark_selected(selected.unwrap_or(""));
        field
    }

    pub fn options(&self) -> &[SelectOption] { &self.options }
    pub fn state(&self) -> FieldState { self.state }
    pub fn is_disabled(&self) -> bool { self.disabled }
    pub fn is_loading(&self) -> bool { self.loading }
    pub fn set_disabled(&mut self, disabled: bool) { self.disabled = disabled; }

    pub fn selected(&self) -> Option<&SelectOption> { self.options.iter().find(|o| o.selected) }

    /// Current value; empty when nothing (or the placeholder) is selected.
    pub fn value(&self) -> &str { self.selected().map(|o| o.value.as_str()).unwrap_or("") }

    /// Select the option carrying `value`. Returns false (and leaves the
    /// selection alone) when no enabled option matches.
    pub fn select(&mut self, value: &str) -> bool {
        if !self.options.iter().any(|o| o.value == value && !o.disabled) {
            return false;
        }
        for o in self.options.iter_mut() {
            o.selected = o.value == value;
        }
        true
    }

    /// Single selected placeholder, not loading.
    pub fn reset(&mut self, disabled: bool) {
        *self = Self::new();
        self.disabled = disabled;
    }

    /// Single "loading" placeholder; the field is disabled until a response lands.
    pub fn show_loading(&mut self, label: &str) {
        let mut opt = SelectOption::new("", label);
        opt.selected = true;
        self.options = vec![opt];
        self.disabled = true;
        self.loading = true;
        self.state = FieldState::Loading;
    }

    /// Replace all options with the placeholder followed by `entries`.
    ///
    /// `preserve` is re-selected when one of the entries carries it,
    /// otherwise the placeholder is selected.
    pub fn populate(&mut self, entries: Vec<(String, String)>, preserve: Option<&str>) {
        let mut options = Vec::with_capacity(entries.len() + 1);
        options.push(SelectOption::placeholder());
        options.extend(entries.into_iter().map(|(v, l)| SelectOption::new(v, l)));
        self.options = options;
        self.disabled = false;
        self.loading = false;
        self.state = FieldState::Populated;
        self.mark_selected(preserve.unwrap_or(""));
    }

    /// Single disabled error placeholder; the field stays disabled.
    pub fn show_error(&mut self, label: &str) {
        let mut opt = SelectOption::new("", label);
        opt.selected = true;
        opt.disabled = true;
        self.options = vec![opt];
        self.disabled = true;
        self.loading = false;
        self.state = FieldState::Error;
    }

    fn mark_selected(&mut self, value: &str) {
        let target = if self.options.iter().any(|o| o.value == value) { value } else { "" };
        let mut done = false;
        for o in self.options.iter_mut() {
            // first match only, so duplicate values never yield two selections
            o.selected = !done && o.value == target;
            done |= o.selected;
        }
    }
}

/// Free-text input (stem length, price).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    value: String,
    disabled: bool,
}

impl InputField {
    pub fn new(value: impl Into<String>) -> Self { Self { value: value.into(), disabled: false } }

    pub fn value(&self) -> &str { &self.value }
    pub fn set_value(&mut self, value: impl Into<String>) { self.value = value.into(); }
    pub fn clear(&mut self) { self.value.clear(); }
    pub fn is_disabled(&self) -> bool { self.disabled }
    pub fn set_disabled(&mut self, disabled: bool) { self.disabled = disabled; }

    /// Finite number held by the field, if any.
    pub fn numeric(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}
