//! Conflict check — listener address claims within the node scope.

use std::collections::HashSet;

use armada_types::{ConfigSpec, ValidationContext};

use crate::report::{CheckCategory, ValidationError};

pub fn check(spec: &ConfigSpec, ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let claimed: HashSet<(&str, u16)> = ctx
        .claimed_addresses
        .iter()
        .map(|(addr, port)| (addr.as_str(), *port))
        .collect();

    let mut own = HashSet::new();
    for listener in &spec.listeners {
        let key = (listener.address.as_str(), listener.port);

        if claimed.contains(&key) {
            errors.push(ValidationError::new(
                CheckCategory::Conflict,
                &listener.name,
                "address",
                format!(
                    "{}:{} is already claimed by another active configuration",
                    listener.address, listener.port
                ),
            ));
        }
        if !own.insert(key) {
            errors.push(ValidationError::new(
                CheckCategory::Conflict,
                &listener.name,
                "address",
                format!(
                    "{}:{} is claimed twice within this configuration",
                    listener.address, listener.port
                ),
            ));
        }
    }

    errors
}
