//! Schema check — names, addresses, ports, duplicates.

use std::collections::HashSet;
use std::sync::OnceLock;

use armada_types::{ConfigSpec, ValidationContext};
use regex::Regex;

use crate::report::{CheckCategory, ValidationError};

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9._-]*[a-z0-9])?$").expect("name regex"))
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3}(\.\d{1,3}){3}|[a-z0-9]([a-z0-9.-]*[a-z0-9])?)$")
            .expect("address regex")
    })
}

pub fn check(spec: &ConfigSpec, _ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let err = |resource: &str, field: &str, message: String| {
        ValidationError::new(CheckCategory::Schema, resource, field, message)
    };

    let check_name = |name: &str, errors: &mut Vec<ValidationError>| {
        if name.is_empty() {
            errors.push(err(name, "name", "name must not be empty".to_string()));
        } else if !name_re().is_match(name) {
            errors.push(err(
                name,
                "name",
                format!("name {name:?} is not a valid resource name"),
            ));
        }
    };

    for listener in &spec.listeners {
        check_name(&listener.name, &mut errors);
        if listener.port == 0 {
            errors.push(err(&listener.name, "port", "port must be non-zero".to_string()));
        }
        if !address_re().is_match(&listener.address) {
            errors.push(err(
                &listener.name,
                "address",
                format!("address {:?} is not a valid bind address", listener.address),
            ));
        }
    }

    for route in &spec.routes {
        check_name(&route.name, &mut errors);
        for vhost in &route.virtual_hosts {
            if vhost.domains.is_empty() {
                errors.push(err(
                    &route.name,
                    "domains",
                    format!("virtual host {:?} has no domains", vhost.name),
                ));
            }
            for rule in &vhost.rules {
                if !rule.prefix.starts_with('/') {
                    errors.push(err(
                        &route.name,
                        "prefix",
                        format!("route prefix {:?} must start with '/'", rule.prefix),
                    ));
                }
            }
        }
    }

    for cluster in &spec.clusters {
        check_name(&cluster.name, &mut errors);
        if cluster.connect_timeout_ms == 0 {
            errors.push(err(
                &cluster.name,
                "connect_timeout_ms",
                "connect timeout must be non-zero".to_string(),
            ));
        }
    }

    // Duplicate names within each resource type.
    for (kind, names) in [
        ("listener", spec.listeners.iter().map(|l| &l.name).collect::<Vec<_>>()),
        ("route", spec.routes.iter().map(|r| &r.name).collect()),
        ("cluster", spec.clusters.iter().map(|c| &c.name).collect()),
        ("secret", spec.secrets.iter().map(|s| &s.name).collect()),
    ] {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                errors.push(err(
                    name,
                    "name",
                    format!("duplicate {kind} name {name:?}"),
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_types::*;

    fn listener(name: &str, port: u16) -> ListenerSpec {
        ListenerSpec {
            name: name.to_string(),
            address: "0.0.0.0".to_string(),
            port,
            route_config: "r".to_string(),
            tls: None,
        }
    }

    #[test]
    fn accepts_well_formed_spec() {
        let spec = ConfigSpec {
            listeners: vec![listener("ingress", 8080)],
            ..Default::default()
        };
        assert!(check(&spec, &ValidationContext::default()).is_empty());
    }

    #[test]
    fn rejects_zero_port() {
        let spec = ConfigSpec {
            listeners: vec![listener("ingress", 0)],
            ..Default::default()
        };
        let errors = check(&spec, &ValidationContext::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "port");
    }

    #[test]
    fn rejects_malformed_names() {
        let spec = ConfigSpec {
            listeners: vec![listener("Not Valid", 8080)],
            ..Default::default()
        };
        assert!(!check(&spec, &ValidationContext::default()).is_empty());
    }

    #[test]
    fn rejects_duplicate_cluster_names() {
        let cluster = ClusterSpec {
            name: "backend".to_string(),
            endpoints: EndpointSource::Static { endpoints: vec![] },
            lb_policy: LbPolicy::RoundRobin,
            connect_timeout_ms: 250,
        };
        let spec = ConfigSpec {
            clusters: vec![cluster.clone(), cluster],
            ..Default::default()
        };
        let errors = check(&spec, &ValidationContext::default());
        assert!(errors.iter().any(|e| e.message.contains("duplicate cluster")));
    }

    #[test]
    fn rejects_prefix_without_slash() {
        let spec = ConfigSpec {
            routes: vec![RouteSpec {
                name: "r".to_string(),
                virtual_hosts: vec![VirtualHostSpec {
                    name: "v".to_string(),
                    domains: vec!["*".to_string()],
                    rules: vec![RouteRule {
                        prefix: "api".to_string(),
                        cluster: "c".to_string(),
                        timeout_ms: None,
                    }],
                }],
            }],
            ..Default::default()
        };
        let errors = check(&spec, &ValidationContext::default());
        assert!(errors.iter().any(|e| e.field == "prefix"));
    }
}
