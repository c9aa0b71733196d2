use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};

use crate::api::state::DEFAULT_LANGUAGE_COOKIE_NAME;

pub const ARG_DEFAULT_REDIRECT: &str = "default-redirect";
pub const ARG_LANGUAGES: &str = "languages";
pub const ARG_DEFAULT_LANGUAGE: &str = "default-language";
pub const ARG_LANGUAGE_COOKIE_NAME: &str = "language-cookie-name";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub default_redirect: String,
    pub languages: Vec<String>,
    pub default_language: String,
    pub language_cookie_name: String,
    pub session_ttl_seconds: u64,
    pub cookie_secure: bool,
}

impl Options {
    /// Parse account page arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value is empty or the default redirect is not a
    /// local path.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let default_redirect = read_required(ARG_DEFAULT_REDIRECT)?;
        if !default_redirect.starts_with('/') {
            anyhow::bail!("--{ARG_DEFAULT_REDIRECT} must be a local path, got: {default_redirect}");
        }

        let languages = matches
            .get_many::<String>(ARG_LANGUAGES)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            default_redirect,
            languages,
            default_language: read_required(ARG_DEFAULT_LANGUAGE)?,
            language_cookie_name: read_required(ARG_LANGUAGE_COOKIE_NAME)?,
            session_ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(1_209_600),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DEFAULT_REDIRECT)
                .long(ARG_DEFAULT_REDIRECT)
                .help("Where to send users after login and logout")
                .env("ACCOUNTS_DEFAULT_REDIRECT")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_LANGUAGES)
                .long(ARG_LANGUAGES)
                .help("Languages offered on the settings page, comma separated")
                .env("ACCOUNTS_LANGUAGES")
                .value_delimiter(',')
                .default_value("en"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_LANGUAGE)
                .long(ARG_DEFAULT_LANGUAGE)
                .help("Language used when neither the session nor the user chose one")
                .env("ACCOUNTS_DEFAULT_LANGUAGE")
                .default_value("en"),
        )
        .arg(
            Arg::new(ARG_LANGUAGE_COOKIE_NAME)
                .long(ARG_LANGUAGE_COOKIE_NAME)
                .help("Cookie carrying the language for clients without a cookie session")
                .env("ACCOUNTS_LANGUAGE_COOKIE_NAME")
                .default_value(DEFAULT_LANGUAGE_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("ACCOUNTS_SESSION_TTL_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark cookies Secure (serve over HTTPS)")
                .env("ACCOUNTS_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
