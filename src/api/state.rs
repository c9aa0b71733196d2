//! Shared server state and configuration.

use std::{sync::Arc, time::Duration};

use super::render::{JsonRenderer, Renderer};
use crate::{
    plugins::PluginRegistry,
    storage::{SessionStore, UserOptionStore, UserStore},
};

const DEFAULT_SESSION_TTL_SECONDS: u64 = 14 * 24 * 60 * 60;
const DEFAULT_LANGUAGE: &str = "en";

pub const SESSION_COOKIE_NAME: &str = "accounts_session";
pub const CSRF_COOKIE_NAME: &str = "csrftoken";
pub const TEST_COOKIE_NAME: &str = "testcookie";
pub const TEST_COOKIE_VALUE: &str = "worked";
pub const DEFAULT_LANGUAGE_COOKIE_NAME: &str = "accounts_language";

#[derive(Clone, Debug)]
pub struct AccountsConfig {
    default_redirect: String,
    languages: Vec<String>,
    default_language: String,
    language_cookie_name: String,
    session_ttl_seconds: u64,
    cookie_secure: bool,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_redirect: "/".to_string(),
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            default_language: DEFAULT_LANGUAGE.to_string(),
            language_cookie_name: DEFAULT_LANGUAGE_COOKIE_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_default_redirect(mut self, target: String) -> Self {
        self.default_redirect = target;
        self
    }

    /// Empty lists are ignored; the default language is always accepted.
    #[must_use]
    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        let languages: Vec<String> = languages
            .into_iter()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();
        if !languages.is_empty() {
            self.languages = languages;
        }
        self.ensure_default_language();
        self
    }

    #[must_use]
    pub fn with_default_language(mut self, language: String) -> Self {
        self.default_language = language;
        self.ensure_default_language();
        self
    }

    #[must_use]
    pub fn with_language_cookie_name(mut self, name: String) -> Self {
        self.language_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    fn ensure_default_language(&mut self) {
        if !self.languages.contains(&self.default_language) {
            self.languages.insert(0, self.default_language.clone());
        }
    }

    #[must_use]
    pub fn default_redirect(&self) -> &str {
        &self.default_redirect
    }

    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    #[must_use]
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    #[must_use]
    pub fn language_cookie_name(&self) -> &str {
        &self.language_cookie_name
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

/// Everything the handlers share, installed as an `Extension`.
pub struct AccountsState {
    config: AccountsConfig,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    options: Arc<dyn UserOptionStore>,
    plugins: PluginRegistry,
    renderer: Arc<dyn Renderer>,
}

impl AccountsState {
    /// Build state around one store that implements every storage trait.
    #[must_use]
    pub fn new<S>(config: AccountsConfig, store: Arc<S>) -> Self
    where
        S: UserStore + SessionStore + UserOptionStore + 'static,
    {
        Self {
            config,
            users: store.clone(),
            sessions: store.clone(),
            options: store,
            plugins: PluginRegistry::new(),
            renderer: Arc::new(JsonRenderer),
        }
    }

    #[must_use]
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AccountsConfig {
        &self.config
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &dyn UserOptionStore {
        self.options.as_ref()
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    #[must_use]
    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }
}

impl std::fmt::Debug for AccountsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountsState")
            .field("config", &self.config)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}
