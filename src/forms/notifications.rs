//! Notification preference forms.
//!
//! The base form and every plugin-contributed form share the
//! [`NotificationForm`] contract so the notification page can treat them as
//! one heterogeneous list.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{clean_email, FieldView, FormData, FormErrors, FormView};
use crate::storage::{User, UserOptionStore, UserOptions};

pub const ALERT_EMAIL_OPTION: &str = "alert_email";

#[async_trait]
pub trait NotificationForm: Send + Sync {
    /// Run validation and remember the outcome. Unbound forms are invalid.
    fn is_valid(&mut self) -> bool;

    fn view(&self) -> FormView;

    /// Persist the cleaned values. Implementations must refuse to save a form
    /// that has not validated.
    async fn save(&self, options: &dyn UserOptionStore) -> Result<()>;
}

/// Base notification settings, always shown first.
pub struct NotificationSettingsForm {
    user: User,
    data: Option<FormData>,
    initial_alert_email: String,
    errors: FormErrors,
    cleaned: Option<String>,
}

impl NotificationSettingsForm {
    #[must_use]
    pub fn new(user: &User, options: &UserOptions, data: Option<FormData>) -> Self {
        let initial_alert_email = options
            .get(ALERT_EMAIL_OPTION)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            user: user.clone(),
            data,
            initial_alert_email,
            errors: FormErrors::default(),
            cleaned: None,
        }
    }
}

#[async_trait]
impl NotificationForm for NotificationSettingsForm {
    fn is_valid(&mut self) -> bool {
        self.errors.clear();
        self.cleaned = None;
        let Some(data) = &self.data else {
            return false;
        };
        self.cleaned = clean_email(data, ALERT_EMAIL_OPTION, false, &mut self.errors);
        self.cleaned.is_some()
    }

    fn view(&self) -> FormView {
        let value = match &self.data {
            Some(data) => data.raw(ALERT_EMAIL_OPTION).unwrap_or_default().to_string(),
            None => self.initial_alert_email.clone(),
        };
        FormView {
            title: "General".to_string(),
            prefix: None,
            is_bound: self.data.is_some(),
            fields: vec![FieldView::new(ALERT_EMAIL_OPTION, "Alert email", "email")
                .value(value)
                .help_text(
                    "Designate an alternative email address to send email notifications to.",
                )
                .errors(self.errors.field(ALERT_EMAIL_OPTION))],
            non_field_errors: self.errors.non_field(),
        }
    }

    async fn save(&self, options: &dyn UserOptionStore) -> Result<()> {
        let alert_email = self
            .cleaned
            .as_ref()
            .ok_or_else(|| anyhow!("notification settings saved before validation"))?;
        let value = (!alert_email.is_empty()).then(|| Value::String(alert_email.clone()));
        options
            .set_option(self.user.id, ALERT_EMAIL_OPTION, value)
            .await
    }
}
