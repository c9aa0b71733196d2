//! Built-in mail plugin.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{form_factory, FormFactory, NotificationFormProvider};
use crate::{
    forms::{FieldView, FormData, FormErrors, FormView, NotificationForm},
    storage::{User, UserOptionStore, UserOptions},
};

pub const SUBSCRIBE_BY_DEFAULT: &str = "subscribe_by_default";

#[derive(Clone, Copy, Debug, Default)]
pub struct MailPlugin;

impl NotificationFormProvider for MailPlugin {
    fn slug(&self) -> &str {
        "mail"
    }

    fn title(&self) -> &str {
        "Mail"
    }

    fn notification_forms(&self) -> Result<Vec<FormFactory>> {
        Ok(vec![form_factory(|plugin, user, options, data| {
            Ok(Some(Box::new(MailNotificationForm::new(
                &plugin, user, options, data,
            ))))
        })])
    }
}

/// Opt-in to mail notifications for new projects.
pub struct MailNotificationForm {
    prefix: String,
    title: String,
    user_id: uuid::Uuid,
    data: Option<FormData>,
    initial: bool,
    errors: FormErrors,
    cleaned: Option<bool>,
}

impl MailNotificationForm {
    #[must_use]
    pub fn new(
        plugin: &Arc<dyn NotificationFormProvider>,
        user: &User,
        options: &UserOptions,
        data: Option<&FormData>,
    ) -> Self {
        let initial = options
            .get(&option_key(plugin.slug()))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Self {
            prefix: plugin.slug().to_string(),
            title: plugin.title().to_string(),
            user_id: user.id,
            data: data.cloned(),
            initial,
            errors: FormErrors::default(),
            cleaned: None,
        }
    }

    fn field_name(&self) -> String {
        format!("{}-{SUBSCRIBE_BY_DEFAULT}", self.prefix)
    }
}

fn option_key(slug: &str) -> String {
    format!("{slug}:{SUBSCRIBE_BY_DEFAULT}")
}

#[async_trait]
impl NotificationForm for MailNotificationForm {
    fn is_valid(&mut self) -> bool {
        self.errors.clear();
        self.cleaned = self
            .data
            .as_ref()
            .map(|data| data.checked(&self.field_name()));
        self.cleaned.is_some()
    }

    fn view(&self) -> FormView {
        let checked = self
            .data
            .as_ref()
            .map_or(self.initial, |data| data.checked(&self.field_name()));
        FormView {
            title: self.title.clone(),
            prefix: Some(self.prefix.clone()),
            is_bound: self.data.is_some(),
            fields: vec![
                FieldView::new(self.field_name(), "Automatically subscribe", "checkbox")
                    .value(checked)
                    .help_text("Send me notifications for new projects I join.")
                    .errors(self.errors.field(SUBSCRIBE_BY_DEFAULT)),
            ],
            non_field_errors: self.errors.non_field(),
        }
    }

    async fn save(&self, options: &dyn UserOptionStore) -> Result<()> {
        let subscribe = self
            .cleaned
            .ok_or_else(|| anyhow!("mail notification settings saved before validation"))?;
        options
            .set_option(
                self.user_id,
                &option_key(&self.prefix),
                Some(Value::Bool(subscribe)),
            )
            .await
    }
}
