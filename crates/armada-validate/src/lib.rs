//! armada-validate — configuration validation pipeline.
//!
//! Runs a proposed [`ConfigSpec`] through an ordered chain of independent
//! checks before a version is accepted:
//!
//! ```text
//! schema → semantic → dependency → security → quota → conflict
//! ```
//!
//! The first failing check short-circuits the chain; all failures from
//! that one category are batched into a single [`ValidationReport`].
//! Validation is a pure function over the spec plus a read-only
//! [`ValidationContext`] — it has no side effects.
//!
//! [`ConfigSpec`]: armada_types::ConfigSpec
//! [`ValidationContext`]: armada_types::ValidationContext

pub mod checks;
pub mod report;

pub use report::{CheckCategory, ValidationError, ValidationReport};

use armada_types::{ConfigSpec, ValidationContext};
use tracing::debug;

/// Run the full check chain over a proposed spec.
///
/// Returns `Ok(())` when every check passes, or the report of the first
/// failing category.
pub fn validate(spec: &ConfigSpec, ctx: &ValidationContext) -> Result<(), ValidationReport> {
    let chain: [(CheckCategory, checks::CheckFn); 6] = [
        (CheckCategory::Schema, checks::schema::check),
        (CheckCategory::Semantic, checks::semantic::check),
        (CheckCategory::Dependency, checks::dependency::check),
        (CheckCategory::Security, checks::security::check),
        (CheckCategory::Quota, checks::quota::check),
        (CheckCategory::Conflict, checks::conflict::check),
    ];

    for (category, check) in chain {
        let errors = check(spec, ctx);
        if !errors.is_empty() {
            debug!(
                category = %category.label(),
                count = errors.len(),
                "validation failed"
            );
            return Err(ValidationReport { category, errors });
        }
    }

    Ok(())
}
