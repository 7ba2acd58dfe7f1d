//! Form inputs and field-level validation.
//!
//! Validation never touches storage. Checks that need a repository (group
//! existence, username availability) live in the owning service and append to
//! the same [`FieldErrors`].

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Deserialize;

use crate::domain::entities::USERNAME_MAX_CHARS;
use crate::infra::uploads::image_extension;

pub const NON_FIELD_ERRORS: &str = "__all__";
pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const INVALID_CHOICE_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE_MESSAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

const PASSWORD_MIN_CHARS: usize = 8;

/// Validation messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<&'static str, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        self.errors
            .iter()
            .map(|(field, messages)| (*field, messages.as_slice()))
    }

    /// `Ok(value)` when no error was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// An uploaded file, fully buffered.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct PostFormInput {
    pub text: String,
    /// Raw group choice; empty means "no group".
    pub group: Option<String>,
    pub image: Option<ImageUpload>,
}

/// Post form data that passed the storage-independent checks.
#[derive(Debug, Clone)]
pub struct PostFormData {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<ImageUpload>,
}

impl PostFormInput {
    /// The group id the form points at, if it names one that parses.
    pub fn group_id(&self) -> Option<i64> {
        self.group.as_deref().map(str::trim)?.parse().ok()
    }

    pub fn validate(&self) -> Result<PostFormData, FieldErrors> {
        let mut errors = FieldErrors::new();

        let text = required(&self.text);
        if text.is_none() {
            errors.add("text", REQUIRED_MESSAGE);
        }

        let group_id = match self.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("group", INVALID_CHOICE_MESSAGE);
                    None
                }
            },
        };

        if let Some(image) = self.image.as_ref()
            && !is_image(&image.data)
        {
            errors.add("image", INVALID_IMAGE_MESSAGE);
        }

        errors.into_result(PostFormData {
            text: text.unwrap_or_default(),
            group_id,
            image: self.image.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentFormInput {
    pub text: String,
}

impl CommentFormInput {
    pub fn validate(&self) -> Result<String, FieldErrors> {
        required(&self.text).ok_or_else(|| FieldErrors::single("text", REQUIRED_MESSAGE))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupFormInput {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone)]
pub struct SignupFormData {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignupFormInput {
    pub fn validate(&self) -> Result<SignupFormData, FieldErrors> {
        let mut errors = FieldErrors::new();

        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", REQUIRED_MESSAGE);
        } else if username.chars().count() > USERNAME_MAX_CHARS {
            errors.add(
                "username",
                format!("Ensure this value has at most {USERNAME_MAX_CHARS} characters."),
            );
        } else if !username
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '.' | '@' | '+' | '-' | '_'))
        {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let email = self.email.trim();
        if !email.is_empty() && !looks_like_email(email) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED_MESSAGE);
        } else if self.password1.chars().count() < PASSWORD_MIN_CHARS {
            errors.add(
                "password1",
                format!("This password is too short. It must contain at least {PASSWORD_MIN_CHARS} characters."),
            );
        }
        if self.password2.is_empty() {
            errors.add("password2", REQUIRED_MESSAGE);
        } else if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        errors.into_result(SignupFormData {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password: self.password1.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginFormInput {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

impl LoginFormInput {
    pub fn validate(&self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", REQUIRED_MESSAGE);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED_MESSAGE);
        }
        errors.into_result((username.to_string(), self.password.clone()))
    }
}

fn required(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_image(data: &[u8]) -> bool {
    image_extension(data).is_some()
        && matches!(imagesize::blob_size(data), Ok(size) if size.width > 0 && size.height > 0)
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
