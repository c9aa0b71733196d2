//! Profile form for the account settings page.

use anyhow::{anyhow, Result};
use secrecy::SecretString;

use super::{clean_email, FieldView, FormData, FormErrors, FormView, REQUIRED};
use crate::storage::{
    password::{hash_password, verify_password},
    User, UserStore,
};

pub const FIRST_NAME_MAX_CHARS: usize = 30;
pub const EMAIL_TAKEN: &str = "That email address is already in use.";
pub const WRONG_PASSWORD: &str = "The password you entered is not correct.";
pub const INVALID_LANGUAGE: &str = "Select a valid choice.";

/// Values shown when the form is unbound.
#[derive(Clone, Debug, Default)]
pub struct AccountInitial {
    pub email: String,
    pub first_name: String,
    pub language: String,
}

/// Cleaned submission.
#[derive(Debug)]
pub struct AccountUpdate {
    pub email: String,
    pub first_name: String,
    pub language: String,
    new_password: Option<SecretString>,
}

impl AccountUpdate {
    #[must_use]
    pub fn changes_password(&self) -> bool {
        self.new_password.is_some()
    }
}

pub struct AccountSettingsForm {
    user: User,
    data: Option<FormData>,
    initial: AccountInitial,
    languages: Vec<String>,
    errors: FormErrors,
    cleaned: Option<AccountUpdate>,
}

impl AccountSettingsForm {
    #[must_use]
    pub fn new(
        user: User,
        data: Option<FormData>,
        initial: AccountInitial,
        languages: Vec<String>,
    ) -> Self {
        Self {
            user,
            data,
            initial,
            languages,
            errors: FormErrors::default(),
            cleaned: None,
        }
    }

    /// Validate the submission. The email must not belong to another account
    /// and a new password needs the current one.
    /// # Errors
    /// Returns an error only when the store lookup fails.
    pub async fn is_valid(&mut self, users: &dyn UserStore) -> Result<bool> {
        self.errors.clear();
        self.cleaned = None;

        let Some(data) = &self.data else {
            return Ok(false);
        };
        let mut errors = FormErrors::default();

        let email = clean_email(data, "email", true, &mut errors);
        if let Some(email) = &email {
            if let Some(other) = users.find_by_email(email).await? {
                if other.id != self.user.id {
                    errors.add("email", EMAIL_TAKEN);
                }
            }
        }

        let first_name = data.get("first_name").unwrap_or_default().to_string();
        if first_name.chars().count() > FIRST_NAME_MAX_CHARS {
            errors.add(
                "first_name",
                format!("Ensure this value has at most {FIRST_NAME_MAX_CHARS} characters."),
            );
        }

        let language = match data.get("language") {
            None => {
                errors.add("language", REQUIRED);
                None
            }
            Some(code) if self.languages.iter().any(|known| known == code) => {
                Some(code.to_string())
            }
            Some(_) => {
                errors.add("language", INVALID_LANGUAGE);
                None
            }
        };

        let new_password = data
            .raw("new_password")
            .filter(|value| !value.is_empty())
            .map(|value| SecretString::from(value.to_string()));
        if new_password.is_some() {
            match data.raw("old_password").filter(|value| !value.is_empty()) {
                None => errors.add("old_password", REQUIRED),
                Some(old) => {
                    if !verify_password(
                        &self.user.password_hash,
                        &SecretString::from(old.to_string()),
                    ) {
                        errors.add("old_password", WRONG_PASSWORD);
                    }
                }
            }
        }

        if let (true, Some(email), Some(language)) = (errors.is_empty(), email, language) {
            self.cleaned = Some(AccountUpdate {
                email,
                first_name,
                language,
                new_password,
            });
        }
        self.errors = errors;

        Ok(self.cleaned.is_some())
    }

    #[must_use]
    pub fn cleaned(&self) -> Option<&AccountUpdate> {
        self.cleaned.as_ref()
    }

    #[must_use]
    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    /// Persist the cleaned values onto the user record.
    /// # Errors
    /// Fails when called before a successful [`Self::is_valid`], or when the
    /// store rejects the update.
    pub async fn save(&self, users: &dyn UserStore) -> Result<User> {
        let update = self
            .cleaned
            .as_ref()
            .ok_or_else(|| anyhow!("account settings saved before validation"))?;

        let mut user = self.user.clone();
        user.email.clone_from(&update.email);
        user.first_name.clone_from(&update.first_name);
        user.locale = Some(update.language.clone());
        if let Some(password) = &update.new_password {
            user.password_hash = hash_password(password)?;
        }
        users.save(&user).await?;
        Ok(user)
    }

    #[must_use]
    pub fn view(&self) -> FormView {
        let value = |name: &str, initial: &str| -> String {
            match &self.data {
                Some(data) => data.raw(name).unwrap_or_default().to_string(),
                None => initial.to_string(),
            }
        };
        FormView {
            title: "Account".to_string(),
            prefix: None,
            is_bound: self.data.is_some(),
            fields: vec![
                FieldView::new("email", "Email", "email")
                    .value(value("email", &self.initial.email))
                    .errors(self.errors.field("email")),
                FieldView::new("first_name", "Name", "text")
                    .value(value("first_name", &self.initial.first_name))
                    .errors(self.errors.field("first_name")),
                FieldView::new("language", "Language", "select")
                    .value(value("language", &self.initial.language))
                    .choices(self.languages.clone())
                    .errors(self.errors.field("language")),
                FieldView::new("old_password", "Current password", "password")
                    .value("")
                    .help_text("Required when setting a new password.")
                    .errors(self.errors.field("old_password")),
                FieldView::new("new_password", "New password", "password")
                    .value("")
                    .errors(self.errors.field("new_password")),
            ],
            non_field_errors: self.errors.non_field(),
        }
    }
}
