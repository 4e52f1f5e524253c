//! Validation report types.

use serde::{Deserialize, Serialize};

/// The check categories, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Schema,
    Semantic,
    Dependency,
    Security,
    Quota,
    Conflict,
}

impl CheckCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CheckCategory::Schema => "schema",
            CheckCategory::Semantic => "semantic",
            CheckCategory::Dependency => "dependency",
            CheckCategory::Security => "security",
            CheckCategory::Quota => "quota",
            CheckCategory::Conflict => "conflict",
        }
    }
}

/// A single validation failure with its category and the failing
/// resource/field reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub category: CheckCategory,
    /// Name of the resource the error refers to.
    pub resource: String,
    /// Field within the resource, or empty for resource-level errors.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        category: CheckCategory,
        resource: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            resource: resource.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All failures from the first failing check category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub category: CheckCategory,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// One-line summary for logs and error responses.
    pub fn summary(&self) -> String {
        format!(
            "{} check failed with {} error(s): {}",
            self.category.label(),
            self.errors.len(),
            self.errors
                .first()
                .map(|e| e.message.as_str())
                .unwrap_or("")
        )
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}
