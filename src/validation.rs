//! Input validation for registration, login and profile updates.
//!
//! Errors are collected per field so a form can show all of them at once.

use serde::Serialize;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const PASSWORD_MIN_CHARS: usize = 6;
const EMAIL_MAX_LEN: usize = 254;
const EMAIL_LOCAL_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("validation failed on {} field(s)", .0.len())]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: &'static str) {
        self.0.push(FieldError { field, message });
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Validated registration input. `email` is normalized and `name` trimmed.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Validated profile changes. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Structural email check: one `@`, a non-empty local part, and a dotted
/// domain of alphanumeric/hyphen labels with a TLD of at least two letters.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > EMAIL_MAX_LEN || email.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > EMAIL_LOCAL_MAX_LEN || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

fn check_name(errors: &mut ValidationErrors, name: &str) {
    let len = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        errors.push("name", "Name must be between 2 and 50 characters");
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !is_valid_email(email) {
        errors.push("email", "Please provide a valid email");
    }
}

pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
) -> Result<Registration, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let name = name.trim();
    let email = normalize_email(email);

    check_name(&mut errors, name);
    check_email(&mut errors, &email);
    if password.chars().count() < PASSWORD_MIN_CHARS {
        errors.push("password", "Password must be at least 6 characters long");
    }

    errors.into_result(Registration {
        name: name.to_string(),
        email,
        password: password.to_string(),
    })
}

/// Validate login input and return the normalized email.
pub fn validate_login(email: &str, password: &str) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let email = normalize_email(email);

    check_email(&mut errors, &email);
    if password.is_empty() {
        errors.push("password", "Password is required");
    }

    errors.into_result(email)
}

pub fn validate_profile(
    name: Option<&str>,
    email: Option<&str>,
) -> Result<ProfileChanges, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let name = name.map(str::trim);
    let email = email.map(normalize_email);

    if let Some(name) = name {
        check_name(&mut errors, name);
    }
    if let Some(email) = &email {
        check_email(&mut errors, email);
    }

    errors.into_result(ProfileChanges {
        name: name.map(str::to_string),
        email,
    })
}
