//! Field-level input checks. A [`Validator`] collects every failure so the
//! caller gets all of them in one response.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

static EMAIL: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.add_error(field, "is required");
        }
        self
    }

    /// Length bounds in characters, inclusive.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let len = value.chars().count();
        if len < min || len > max {
            self.add_error(
                field,
                format!("must be between {} and {} characters long", min, max),
            );
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !email_regex().is_match(value) {
            self.add_error(field, "must be a valid email address");
        }
        self
    }

    pub fn range(&mut self, field: &str, value: i64, min: i64, max: i64) -> &mut Self {
        if value < min || value > max {
            self.add_error(field, format!("must be between {} and {}", min, max));
        }
        self
    }

    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) -> &mut Self {
        if !allowed.contains(&value) {
            self.add_error(field, format!("must be one of: {}", allowed.join(", ")));
        }
        self
    }

    /// At least one entry, and no blank entries.
    pub fn non_empty_list(&mut self, field: &str, values: &[String]) -> &mut Self {
        if values.is_empty() {
            self.add_error(field, "must contain at least one item");
        } else if values.iter().any(|v| v.trim().is_empty()) {
            self.add_error(field, "must not contain blank items");
        }
        self
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}
