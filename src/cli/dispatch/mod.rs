//! Map parsed CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::accounts;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let accounts_opts = accounts::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        default_redirect: accounts_opts.default_redirect,
        languages: accounts_opts.languages,
        default_language: accounts_opts.default_language,
        language_cookie_name: accounts_opts.language_cookie_name,
        session_ttl_seconds: accounts_opts.session_ttl_seconds,
        cookie_secure: accounts_opts.cookie_secure,
    }))
}
