//! Plugin registry and notification form discovery.
//!
//! Flow Overview:
//! 1) Ask every registered provider for its notification form factories.
//! 2) Call each factory with the provider, the user, their options and the
//!    submitted data.
//! 3) Skip whatever fails or yields nothing; keep registry order.

use anyhow::Result;
use std::sync::Arc;

use crate::{
    forms::{FormData, NotificationForm},
    storage::{User, UserOptions},
};

pub mod mail;
mod safe;

pub use mail::MailPlugin;
pub use safe::safe_execute;

/// Builds one notification form for a user. `Ok(None)` means the provider
/// has nothing to offer this user.
pub type FormFactory = Box<
    dyn Fn(
            Arc<dyn NotificationFormProvider>,
            &User,
            &UserOptions,
            Option<&FormData>,
        ) -> Result<Option<Box<dyn NotificationForm>>>
        + Send
        + Sync,
>;

/// Box a closure as a [`FormFactory`].
pub fn form_factory<F>(factory: F) -> FormFactory
where
    F: Fn(
            Arc<dyn NotificationFormProvider>,
            &User,
            &UserOptions,
            Option<&FormData>,
        ) -> Result<Option<Box<dyn NotificationForm>>>
        + Send
        + Sync
        + 'static,
{
    Box::new(factory)
}

/// An extension that may contribute notification settings forms.
pub trait NotificationFormProvider: Send + Sync {
    /// Stable identifier, also used as the field prefix of its forms.
    fn slug(&self) -> &str;

    fn title(&self) -> &str;

    /// Providers without notification settings keep the default.
    /// # Errors
    /// Implementations may fail; callers treat failures as "no forms".
    fn notification_forms(&self) -> Result<Vec<FormFactory>> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn NotificationFormProvider>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, plugin: Arc<dyn NotificationFormProvider>) -> Self {
        self.register(plugin);
        self
    }

    pub fn register(&mut self, plugin: Arc<dyn NotificationFormProvider>) {
        self.plugins.push(plugin);
    }

    /// Registered plugins in registration order.
    #[must_use]
    pub fn all(&self) -> &[Arc<dyn NotificationFormProvider>] {
        &self.plugins
    }

    /// Collect every plugin-contributed notification form.
    #[must_use]
    pub fn notification_forms(
        &self,
        user: &User,
        options: &UserOptions,
        data: Option<&FormData>,
    ) -> Vec<Box<dyn NotificationForm>> {
        let mut forms = Vec::new();
        for plugin in &self.plugins {
            let slug = plugin.slug().to_string();
            let factories = safe_execute(&format!("{slug}.notification_forms"), || {
                plugin.notification_forms()
            })
            .unwrap_or_default();

            for factory in factories {
                let form = safe_execute(&format!("{slug}.notification_form"), || {
                    factory(plugin.clone(), user, options, data)
                })
                .flatten();
                if let Some(form) = form {
                    forms.push(form);
                }
            }
        }
        forms
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|plugin| plugin.slug()))
            .finish()
    }
}
