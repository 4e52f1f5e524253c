//! Quota check — per-tenant resource counts.

use armada_types::{ConfigSpec, ValidationContext};

use crate::report::{CheckCategory, ValidationError};

pub fn check(spec: &ConfigSpec, ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let over = |kind: &str, field: &str, count: usize, limit: usize| {
        ValidationError::new(
            CheckCategory::Quota,
            &ctx.tenant_id,
            field,
            format!("tenant exceeds {kind} quota: {count} > {limit}"),
        )
    };

    if spec.listeners.len() > ctx.quota.max_listeners {
        errors.push(over(
            "listener",
            "listeners",
            spec.listeners.len(),
            ctx.quota.max_listeners,
        ));
    }
    if spec.routes.len() > ctx.quota.max_routes {
        errors.push(over("route", "routes", spec.routes.len(), ctx.quota.max_routes));
    }
    if spec.clusters.len() > ctx.quota.max_clusters {
        errors.push(over(
            "cluster",
            "clusters",
            spec.clusters.len(),
            ctx.quota.max_clusters,
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_types::*;

    #[test]
    fn within_quota_passes() {
        let spec = ConfigSpec::default();
        assert!(check(&spec, &ValidationContext::default()).is_empty());
    }

    #[test]
    fn over_listener_quota_fails() {
        let spec = ConfigSpec {
            listeners: vec![ListenerSpec {
                name: "l".to_string(),
                address: "0.0.0.0".to_string(),
                port: 8080,
                route_config: "r".to_string(),
                tls: None,
            }],
            ..Default::default()
        };
        let ctx = ValidationContext {
            quota: QuotaLimits {
                max_listeners: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let errors = check(&spec, &ctx);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("listener quota"));
    }
}
