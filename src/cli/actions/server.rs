use crate::{
    api::{self, AccountsConfig, AccountsState},
    plugins::{MailPlugin, PluginRegistry},
    storage::PgStore,
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub default_redirect: String,
    pub languages: Vec<String>,
    pub default_language: String,
    pub language_cookie_name: String,
    pub session_ttl_seconds: u64,
    pub cookie_secure: bool,
}

impl Args {
    fn config(&self) -> AccountsConfig {
        AccountsConfig::new()
            .with_default_redirect(self.default_redirect.clone())
            .with_languages(self.languages.clone())
            .with_default_language(self.default_language.clone())
            .with_language_cookie_name(self.language_cookie_name.clone())
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_cookie_secure(self.cookie_secure)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.config();
    debug!("Account pages configuration: {:?}", config);

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let plugins = PluginRegistry::new().with(Arc::new(MailPlugin));
    let state = AccountsState::new(config, Arc::new(PgStore::new(pool))).with_plugins(plugins);

    api::new(args.port, Arc::new(state)).await
}
