//! The individual validation checks, one module per category.

pub mod conflict;
pub mod dependency;
pub mod quota;
pub mod schema;
pub mod security;
pub mod semantic;

use armada_types::{ConfigSpec, ValidationContext};

use crate::report::ValidationError;

/// Signature shared by every check: pure over spec + read-only context.
pub type CheckFn = fn(&ConfigSpec, &ValidationContext) -> Vec<ValidationError>;
