//! Field-level admission violations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldErrorKind {
    /// Value is malformed or breaks a rule
    Invalid,
    /// Value is missing
    Required,
    /// Value is well-formed but not allowed in this context
    Forbidden,
    /// Value repeats another one
    Duplicate,
    /// Value is not one of the supported options
    NotSupported,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FieldErrorKind::Invalid => "Invalid value",
            FieldErrorKind::Required => "Required value",
            FieldErrorKind::Forbidden => "Forbidden",
            FieldErrorKind::Duplicate => "Duplicate value",
            FieldErrorKind::NotSupported => "Unsupported value",
        };
        f.write_str(text)
    }
}

/// One violation on one field of a pool record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path (e.g., "spec.routes[1].gw")
    pub field: String,
    pub kind: FieldErrorKind,
    /// Offending value, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub detail: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        kind: FieldErrorKind,
        value: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            value,
            detail: detail.into(),
        }
    }

    pub fn invalid(
        field: impl Into<String>,
        value: impl fmt::Display,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(field, FieldErrorKind::Invalid, Some(value.to_string()), detail)
    }

    pub fn required(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(field, FieldErrorKind::Required, None, detail)
    }

    pub fn forbidden(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(field, FieldErrorKind::Forbidden, None, detail)
    }

    pub fn duplicate(field: impl Into<String>, value: impl fmt::Display) -> Self {
        Self::new(field, FieldErrorKind::Duplicate, Some(value.to_string()), "")
    }

    pub fn not_supported(
        field: impl Into<String>,
        value: impl fmt::Display,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(field, FieldErrorKind::NotSupported, Some(value.to_string()), detail)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)?;
        if let Some(value) = &self.value {
            write!(f, ": {:?}", value)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// All violations found in one admission request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.0.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// First violation on `field`
    pub fn find(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field == field)
    }

    /// `Ok` when nothing was found, otherwise an admission error
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::Admission(self))
        }
    }
}

impl From<FieldError> for FieldErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("no violations"),
            [single] => write!(f, "{}", single),
            many => {
                f.write_str("[")?;
                for (i, error) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", error)?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_display() {
        let err = FieldError::invalid("spec.gateway", "10.1.0.1", "not in subnet 10.0.0.0/24");
        assert_eq!(
            err.to_string(),
            "spec.gateway: Invalid value: \"10.1.0.1\": not in subnet 10.0.0.0/24"
        );
        assert_eq!(
            FieldError::required("spec.ipVersion", "").to_string(),
            "spec.ipVersion: Required value"
        );
    }

    #[test]
    fn test_aggregate_into_result() {
        let mut errors = FieldErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.push(FieldError::forbidden("spec.ips", "10.0.0.5 is still allocated"));
        errors.push(FieldError::duplicate("spec.routes[1].dst", "10.96.0.0/12"));
        assert_eq!(errors.len(), 2);
        assert!(errors.find("spec.ips").is_some());

        let err = errors.into_result().unwrap_err();
        assert!(err.to_string().starts_with("admission denied: [spec.ips: Forbidden"));
    }

    #[test]
    fn test_serializes_as_list() {
        let errors =
            FieldErrors::from(FieldError::not_supported("spec.ipVersion", 5, "must be 4 or 6"));
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json[0]["field"], "spec.ipVersion");
        assert_eq!(json[0]["kind"], "NotSupported");
        assert_eq!(json[0]["value"], "5");
    }
}
