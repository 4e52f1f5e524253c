//! Semantic check — references within the spec resolve to each other.

use std::collections::HashSet;

use armada_types::{ConfigSpec, EndpointSource, ValidationContext};

use crate::report::{CheckCategory, ValidationError};

pub fn check(spec: &ConfigSpec, _ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let cluster_names: HashSet<&str> = spec.clusters.iter().map(|c| c.name.as_str()).collect();
    let route_names: HashSet<&str> = spec.routes.iter().map(|r| r.name.as_str()).collect();

    for listener in &spec.listeners {
        if !route_names.contains(listener.route_config.as_str()) {
            errors.push(ValidationError::new(
                CheckCategory::Semantic,
                &listener.name,
                "route_config",
                format!(
                    "listener references unknown route configuration {:?}",
                    listener.route_config
                ),
            ));
        }
    }

    for route in &spec.routes {
        for vhost in &route.virtual_hosts {
            for rule in &vhost.rules {
                if !cluster_names.contains(rule.cluster.as_str()) {
                    errors.push(ValidationError::new(
                        CheckCategory::Semantic,
                        &route.name,
                        "cluster",
                        format!("route references unknown cluster {:?}", rule.cluster),
                    ));
                }
            }
        }
    }

    for cluster in &spec.clusters {
        if let EndpointSource::Static { endpoints } = &cluster.endpoints {
            if endpoints.is_empty() {
                errors.push(ValidationError::new(
                    CheckCategory::Semantic,
                    &cluster.name,
                    "endpoints",
                    "static cluster has no endpoints".to_string(),
                ));
            }
        }
    }

    errors
}
