use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

use super::{
    handlers::{health, login, logout, notifications, settings},
    render::Page,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        logout::logout,
        settings::settings,
        notifications::notifications,
    ),
    components(schemas(health::Health, Page)),
    tags(
        (name = "accounts", description = "Login, logout and account settings pages"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

/// `OpenAPI` document served at `/api-docs/openapi.json`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = env!("CARGO_PKG_LICENSE").trim();
    if identifier.is_empty() {
        return None;
    }
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => {
            let name = name.trim();
            let email = rest.trim_end_matches('>').trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        }
        None => (Some(author), None),
    }
}
