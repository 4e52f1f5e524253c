//! Dependency check — template chains, secret and service references.

use std::collections::HashSet;

use armada_types::{ConfigSpec, EndpointSource, ValidationContext};

use crate::report::{CheckCategory, ValidationError};

pub fn check(spec: &ConfigSpec, ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Template chain: every link resolvable, no cycles.
    if let Some(template) = &spec.template {
        let mut visited = HashSet::new();
        let mut current = Some(template.clone());

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                errors.push(ValidationError::new(
                    CheckCategory::Dependency,
                    &name,
                    "template",
                    format!("template chain contains a cycle through {name:?}"),
                ));
                break;
            }
            match ctx.templates.get(&name) {
                Some(parent) => current = parent.template.clone(),
                None => {
                    errors.push(ValidationError::new(
                        CheckCategory::Dependency,
                        &name,
                        "template",
                        format!("template {name:?} is not resolvable"),
                    ));
                    break;
                }
            }
        }
    }

    // Secret references: declared secrets and listener certificates.
    let known_secrets: HashSet<&str> = ctx.known_secrets.iter().map(String::as_str).collect();
    for secret in &spec.secrets {
        if !known_secrets.contains(secret.name.as_str()) {
            errors.push(ValidationError::new(
                CheckCategory::Dependency,
                &secret.name,
                "name",
                format!("secret {:?} is not resolvable", secret.name),
            ));
        }
    }
    for listener in &spec.listeners {
        if let Some(tls) = &listener.tls {
            if !known_secrets.contains(tls.cert_name.as_str()) {
                errors.push(ValidationError::new(
                    CheckCategory::Dependency,
                    &listener.name,
                    "cert_name",
                    format!("certificate secret {:?} is not resolvable", tls.cert_name),
                ));
            }
        }
    }

    // Service references resolvable through discovery.
    let known_services: HashSet<&str> = ctx.known_services.iter().map(String::as_str).collect();
    for cluster in &spec.clusters {
        if let EndpointSource::Service { service } = &cluster.endpoints {
            if !known_services.contains(service.as_str()) {
                errors.push(ValidationError::new(
                    CheckCategory::Dependency,
                    &cluster.name,
                    "service",
                    format!("service {service:?} is not resolvable"),
                ));
            }
        }
    }

    errors
}
