//! Request-scoped form binding and validation.
//!
//! A form is bound only to a non-empty `POST` body. Unbound forms render
//! their initial values and never report errors. Field errors are keyed by
//! field name; [`NON_FIELD_ERRORS`] holds errors that span the whole form.

use axum::http::Method;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub mod account;
pub mod auth;
pub mod notifications;

pub use account::{AccountInitial, AccountSettingsForm, AccountUpdate};
pub use auth::AuthenticationForm;
pub use notifications::{NotificationForm, NotificationSettingsForm};

pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";

/// Submitted `application/x-www-form-urlencoded` values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData(HashMap<String, String>);

impl FormData {
    #[must_use]
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(values)
    }

    /// Bind request values the way a browser submission is treated: only a
    /// `POST` with at least one field produces bound data.
    #[must_use]
    pub fn bind(method: &Method, values: Option<HashMap<String, String>>) -> Option<Self> {
        if *method != Method::POST {
            return None;
        }
        values.filter(|values| !values.is_empty()).map(Self)
    }

    /// Raw submitted value.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Trimmed value, `None` when missing or blank.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw(name).map(str::trim).filter(|value| !value.is_empty())
    }

    /// Checkbox semantics: absent means unchecked.
    #[must_use]
    pub fn checked(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|value| !matches!(value, "0" | "false" | "off"))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for FormData {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Vec<String> {
        self.0.get(name).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn non_field(&self) -> Vec<String> {
        self.field(NON_FIELD_ERRORS)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Renderable state of one field.
#[derive(Clone, Debug, Serialize)]
pub struct FieldView {
    pub name: String,
    pub label: &'static str,
    pub widget: &'static str,
    pub value: serde_json::Value,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FieldView {
    #[must_use]
    pub fn new(name: impl Into<String>, label: &'static str, widget: &'static str) -> Self {
        Self {
            name: name.into(),
            label,
            widget,
            value: serde_json::Value::Null,
            errors: Vec::new(),
            help_text: None,
            choices: Vec::new(),
        }
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub fn errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    #[must_use]
    pub fn help_text(mut self, help_text: &'static str) -> Self {
        self.help_text = Some(help_text);
        self
    }

    #[must_use]
    pub fn choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }
}

/// Renderable state of a whole form.
#[derive(Clone, Debug, Serialize)]
pub struct FormView {
    pub title: String,
    pub prefix: Option<String>,
    pub is_bound: bool,
    pub fields: Vec<FieldView>,
    pub non_field_errors: Vec<String>,
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Clean an email field, recording errors. Returns `Some("")` for a blank
/// optional field.
pub(crate) fn clean_email(
    data: &FormData,
    name: &str,
    required: bool,
    errors: &mut FormErrors,
) -> Option<String> {
    let Some(value) = data.get(name) else {
        if required {
            errors.add(name, REQUIRED);
            return None;
        }
        return Some(String::new());
    };
    let email = normalize_email(value);
    if valid_email(&email) {
        Some(email)
    } else {
        errors.add(name, INVALID_EMAIL);
        None
    }
}
