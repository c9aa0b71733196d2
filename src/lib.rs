//! # Accounts (Account Management Views)
//!
//! `accounts` serves the user-facing account pages of a web application:
//! login, logout, account settings and notification preferences.
//!
//! ## Request Flow
//!
//! Every handler follows the same single pass:
//!
//! 1. Bind the request body to a form (only non-empty `POST` bodies bind).
//! 2. Validate the submitted fields.
//! 3. Persist the cleaned data through the storage traits, then redirect.
//! 4. Otherwise re-render the page with the form and its errors.
//!
//! ## Sessions
//!
//! Sessions are server-side records keyed by the SHA-256 hash of a random
//! token. The raw token only ever lives in the `accounts_session` cookie or a
//! bearer header.
//!
//! ## Notification Plugins
//!
//! Notification settings aggregate a base form with forms contributed by
//! registered [`plugins::NotificationFormProvider`]s. Provider failures are
//! isolated per provider so a broken plugin never takes the page down, and
//! forms are committed all-or-nothing.

pub mod api;
pub mod cli;
pub mod forms;
pub mod plugins;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
