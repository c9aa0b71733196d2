//! Credential form for the login page.

use anyhow::Result;
use secrecy::SecretString;

use super::{normalize_email, FieldView, FormData, FormErrors, FormView, NON_FIELD_ERRORS, REQUIRED};
use crate::storage::{password::verify_password, User, UserStore};

pub const INVALID_LOGIN: &str =
    "Please enter a correct email and password. Note that both fields are case-sensitive.";
pub const INACTIVE: &str = "This account is inactive.";

pub struct AuthenticationForm {
    data: Option<FormData>,
    errors: FormErrors,
    user: Option<User>,
}

impl AuthenticationForm {
    #[must_use]
    pub fn new(data: Option<FormData>) -> Self {
        Self {
            data,
            errors: FormErrors::default(),
            user: None,
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.data.is_some()
    }

    /// Validate the credentials against the user store.
    ///
    /// Unbound forms are never valid. Unknown emails and wrong passwords
    /// share one message so the form does not reveal which accounts exist.
    /// # Errors
    /// Returns an error only when the store lookup fails.
    pub async fn is_valid(&mut self, users: &dyn UserStore) -> Result<bool> {
        self.errors.clear();
        self.user = None;

        let Some(data) = &self.data else {
            return Ok(false);
        };

        let username = data.get("username").map(normalize_email);
        let password = data
            .raw("password")
            .filter(|value| !value.is_empty())
            .map(|value| SecretString::from(value.to_string()));

        if username.is_none() {
            self.errors.add("username", REQUIRED);
        }
        if password.is_none() {
            self.errors.add("password", REQUIRED);
        }
        let (Some(username), Some(password)) = (username, password) else {
            return Ok(false);
        };

        match users.find_by_email(&username).await? {
            Some(user) if verify_password(&user.password_hash, &password) => {
                if user.is_active {
                    self.user = Some(user);
                } else {
                    self.errors.add(NON_FIELD_ERRORS, INACTIVE);
                }
            }
            _ => self.errors.add(NON_FIELD_ERRORS, INVALID_LOGIN),
        }

        Ok(self.errors.is_empty())
    }

    /// The authenticated user, available after a successful validation.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    /// The password is never echoed back.
    #[must_use]
    pub fn view(&self) -> FormView {
        let username = self
            .data
            .as_ref()
            .and_then(|data| data.get("username"))
            .unwrap_or_default();
        FormView {
            title: "Sign in".to_string(),
            prefix: None,
            is_bound: self.is_bound(),
            fields: vec![
                FieldView::new("username", "Email", "email")
                    .value(username)
                    .errors(self.errors.field("username")),
                FieldView::new("password", "Password", "password")
                    .value("")
                    .errors(self.errors.field("password")),
            ],
            non_field_errors: self.errors.non_field(),
        }
    }
}
