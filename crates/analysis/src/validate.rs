use serde::Serialize;
use thiserror::Error;

pub const MAX_TEXT_LEN: usize = 255;

/// One violated field, addressed by a dotted path such as `[2].market_share`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request: {}", describe(.0))]
pub struct ValidationError(pub Vec<FieldError>);

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shape checks that serde alone cannot express (ranges, non-empty names).
pub trait Validate {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>);

    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        self.collect_errors("", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError(errors))
        }
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        for (idx, item) in self.iter().enumerate() {
            item.collect_errors(&format!("{prefix}[{idx}]"), errors);
        }
    }
}

impl<T: Validate> Validate for Option<T> {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        if let Some(inner) = self {
            inner.collect_errors(prefix, errors);
        }
    }
}

pub fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

pub fn check_name(prefix: &str, name: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field_path(prefix, name), "must not be empty"));
    }
    check_max_len(prefix, name, Some(value), errors);
}

pub fn check_max_len(prefix: &str, name: &str, value: Option<&str>, errors: &mut Vec<FieldError>) {
    if let Some(value) = value {
        if value.chars().count() > MAX_TEXT_LEN {
            errors.push(FieldError::new(
                field_path(prefix, name),
                format!("must be at most {MAX_TEXT_LEN} characters"),
            ));
        }
    }
}

pub fn check_finite(prefix: &str, name: &str, value: f64, errors: &mut Vec<FieldError>) {
    if !value.is_finite() {
        errors.push(FieldError::new(field_path(prefix, name), "must be a finite number"));
    }
}

/// Shares are fractions of a market, so they live in `0..=1`.
pub fn check_fraction(prefix: &str, name: &str, value: f64, errors: &mut Vec<FieldError>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(FieldError::new(
            field_path(prefix, name),
            "must be between 0 and 1",
        ));
    }
}

pub fn check_non_negative(
    prefix: &str,
    name: &str,
    value: Option<f64>,
    errors: &mut Vec<FieldError>,
) {
    if let Some(value) = value {
        if !value.is_finite() || value < 0.0 {
            errors.push(FieldError::new(
                field_path(prefix, name),
                "must be a non-negative number",
            ));
        }
    }
}
